//! Periodic background refresh of the wallet state.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

use crate::{data_api::WalletEngine, state::WalletState};

/// A running auto-sync task. Dropping the handle stops the task.
///
/// Each tick performs a non-forced [`WalletState::refresh_wallet`]. Failures are logged and
/// otherwise ignored: background refreshes never surface errors to the user.
#[derive(Debug)]
pub struct AutoSync {
    handle: JoinHandle<()>,
}

impl AutoSync {
    /// Starts refreshing `state` every `period`, beginning one period from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<E>(state: WalletState<E>, period: Duration) -> Self
    where
        E: WalletEngine + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match state.refresh_wallet(false).await {
                    Ok(true) => trace!("Background refresh complete"),
                    Ok(false) => trace!("Background refresh skipped"),
                    Err(e) => debug!("Background refresh failed: {}", e),
                }
            }
        });
        AutoSync { handle }
    }

    /// Starts auto-sync with the state's configured interval, unless it is disabled.
    pub fn from_config<E>(state: &WalletState<E>) -> Option<Self>
    where
        E: WalletEngine + 'static,
    {
        let period = state.config().auto_sync_interval()?;
        Some(Self::spawn(state.clone(), period))
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
