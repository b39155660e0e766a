//! Idle monitor
//!
//! Runs every `idle_check_interval` while the socket is bound: lifts elapsed
//! pauses and bans, keeps an idle session alive with PING and logs out a
//! session that has carried no real traffic for too long.

use super::UdpConnectionHandler;
use super::state::elapsed_since;
use chrono::Utc;
use log::{debug, trace, warn};
use std::sync::Weak;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval};

impl UdpConnectionHandler {
    pub(super) async fn start_monitor(&self) {
        let mut monitor = self.monitor.lock().await;
        if monitor.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let period = self.settings.idle_check_interval();
        debug!("Starting AniDB idle monitor (every {period:?})");
        *monitor = Some(tokio::spawn(run_monitor(self.this.clone(), period)));
    }

    pub(super) async fn stop_monitor(&self) {
        if let Some(task) = self.monitor.lock().await.take() {
            task.abort();
            debug!("Stopped AniDB idle monitor");
        }
    }

    /// Whether the idle monitor task is running
    pub async fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// One pass of the idle monitor
    pub async fn check_idle(&self) {
        let now = Instant::now();
        let (session_id, blocked, ping_due, logout_due) = {
            let mut state = self.state.write().await;
            let mut events = Vec::new();
            events.extend(state.clear_elapsed_pause(now));
            events.extend(state.clear_expired_ban(Utc::now()));
            self.emit(events);

            let ping_interval = self.settings.ping_interval();
            let idle_for = |at| elapsed_since(now, at).is_none_or(|idle| idle >= ping_interval);
            (
                state.session_id().map(str::to_string),
                state.ban.is_some() || state.is_paused(now),
                idle_for(state.last_message_at) && idle_for(state.last_ping_at),
                elapsed_since(now, state.last_non_ping_at)
                    .is_some_and(|idle| idle > self.settings.force_logout_after()),
            )
        };

        let Some(session_id) = session_id else {
            return;
        };

        if ping_due && !blocked {
            trace!("AniDB connection idle; sending keepalive");
            match self.round_trip(&self.commands.ping()).await {
                Ok(response) if response.code.invalidates_session() => {
                    self.reconnect_in_background(session_id);
                }
                Ok(response) => trace!("Keepalive answered with {}", response.code),
                Err(e) => warn!("AniDB keepalive failed: {e}"),
            }
        }

        if logout_due {
            debug!(
                "No AniDB traffic for over {:?}; logging out",
                self.settings.force_logout_after()
            );
            self.force_logout().await;
        }
    }

    /// Rebuild the connection on a separate task; the monitor cannot stop itself
    fn reconnect_in_background(&self, stale_session: String) {
        if let Some(handler) = self.this.upgrade() {
            tokio::spawn(async move {
                handler.reconnect(Some(stale_session)).await;
            });
        }
    }
}

async fn run_monitor(handler: Weak<UdpConnectionHandler>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(handler) = handler.upgrade() else {
            break;
        };
        handler.check_idle().await;
    }
}
