//! Wallet client configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use bitcoinz_protocol::{value::Zatoshis, DEFAULT_TX_EXPIRY_DELTA};

/// The lightwalletd server used when none is configured.
pub const DEFAULT_SERVER_URI: &str = "https://lightd.btcz.rocks:9067";

/// The fee assumed for a send when the engine does not report one: 0.00001 BTCZ.
pub const DEFAULT_FEE: Zatoshis = Zatoshis::const_from_u64(1_000);

/// Settings for a [`crate::state::WalletState`].
///
/// Every field has a default, so a configuration file only needs to name the values it
/// overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub server_uri: String,
    /// The fee added to every send when checking it against the spendable balance.
    pub default_fee: Zatoshis,
    /// Seconds between background refreshes. `0` disables auto-sync.
    pub auto_sync_interval: u64,
    /// Seconds within which a non-forced refresh is skipped.
    pub min_refresh_interval: u64,
    /// Number of transactions revealed per page of history.
    pub page_size: usize,
    /// Number of transactions in the recent-activity view.
    pub recent_limit: usize,
    /// Blocks after which an unreported local send is marked failed.
    pub pending_expiry_delta: u32,
    /// Where labels, contacts and memo read flags are persisted, if anywhere.
    pub annotations_path: Option<PathBuf>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        WalletConfig {
            server_uri: DEFAULT_SERVER_URI.to_string(),
            default_fee: DEFAULT_FEE,
            auto_sync_interval: 30,
            min_refresh_interval: 5,
            page_size: 50,
            recent_limit: 5,
            pending_expiry_delta: DEFAULT_TX_EXPIRY_DELTA,
            annotations_path: None,
        }
    }
}

impl WalletConfig {
    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn auto_sync_interval(&self) -> Option<Duration> {
        (self.auto_sync_interval > 0).then(|| Duration::from_secs(self.auto_sync_interval))
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval)
    }
}
