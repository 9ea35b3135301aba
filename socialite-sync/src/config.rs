//! Refresh configuration.

use crate::error::SyncResult;
use serde::{Deserialize, Serialize};
use socialite_storage::SettingsManager;
use std::time::Duration;

/// Settings key holding the serialized [`OrchestratorConfig`].
pub const CONFIG_KEY: &str = "orchestrator";

/// Refresh cadence. Each one refreshes a different slice of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// News feed and notifications.
    Dynamic,
    /// Friends, own profile and stream filters.
    Moderate,
    /// Albums and photos of the user and the most interesting friends.
    Infrequent,
}

impl Cadence {
    pub const ALL: [Cadence; 3] = [Cadence::Dynamic, Cadence::Moderate, Cadence::Infrequent];
}

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub dynamic_interval_secs: u64,
    pub moderate_interval_secs: u64,
    pub infrequent_interval_secs: u64,
    /// Each interval is stretched or shrunk by up to this fraction.
    pub jitter_fraction: f64,
    /// Stories fetched per feed refresh.
    pub feed_count: usize,
    /// Stories fetched by the quick first pass of a session.
    pub quick_feed_count: usize,
    /// Stories retained in the feed after a merge.
    pub max_feed_items: usize,
    /// Friends whose albums the infrequent cadence refreshes.
    pub interesting_people: usize,
    pub photos_per_album: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dynamic_interval_secs: 3 * 60,
            moderate_interval_secs: 15 * 60,
            infrequent_interval_secs: 60 * 60,
            jitter_fraction: 0.1,
            feed_count: 100,
            quick_feed_count: 20,
            max_feed_items: 250,
            interesting_people: 5,
            photos_per_album: 50,
        }
    }
}

impl OrchestratorConfig {
    /// Un-jittered interval of a cadence.
    pub fn interval(&self, cadence: Cadence) -> Duration {
        Duration::from_secs(match cadence {
            Cadence::Dynamic => self.dynamic_interval_secs,
            Cadence::Moderate => self.moderate_interval_secs,
            Cadence::Infrequent => self.infrequent_interval_secs,
        })
    }

    /// Stores this configuration in `settings`.
    pub fn save(&self, settings: &SettingsManager) -> SyncResult<()> {
        settings.set(CONFIG_KEY, self)?;
        Ok(())
    }
}

/// Loads the orchestrator configuration; absent keys take their defaults.
pub fn load_config(settings: &SettingsManager) -> SyncResult<OrchestratorConfig> {
    Ok(settings.get_or_default(CONFIG_KEY)?)
}
