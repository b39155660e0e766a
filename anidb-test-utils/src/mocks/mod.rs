//! Mock implementations for testing

mod transport;

pub use transport::{MockReply, MockTransport};
