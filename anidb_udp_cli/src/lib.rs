//! AniDB UDP CLI library
//!
//! Configuration handling shared by the `anidb-udp` binary and its tests.

pub mod config;
