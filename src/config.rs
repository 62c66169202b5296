use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime configuration for the telemetry core.
///
/// The channel id and read key identify the ThingSpeak channel the harvester
/// publishes to. Interval and timeout values are explicit here rather than
/// inherited from client defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub channel_id: String,
    pub read_api_key: String,
    pub base_url: String,
    /// Cadence of the repeating data fetch.
    pub poll_interval: Duration,
    /// Cadence of the staleness re-evaluation, faster than the data poll so
    /// a silent sensor is flagged promptly.
    pub freshness_interval: Duration,
    /// Cadence of the simulated pressure-grid animation.
    pub grid_tick_interval: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_id: String::from("2995641"),
            read_api_key: String::from("JAEGUGJX3K7ICOHQ"),
            base_url: String::from("https://api.thingspeak.com"),
            poll_interval: Duration::from_secs(30),
            freshness_interval: Duration::from_secs(10),
            grid_tick_interval: Duration::from_millis(800),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    #[allow(dead_code)]
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(channel) = std::env::var("ECOSTEP_CHANNEL_ID") {
            config.channel_id = channel;
        }

        if let Ok(key) = std::env::var("ECOSTEP_READ_API_KEY") {
            config.read_api_key = key;
        }

        if let Ok(base) = std::env::var("ECOSTEP_API_BASE") {
            config.base_url = base;
        }

        if let Ok(secs) = std::env::var("ECOSTEP_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs.parse()?);
        }

        Ok(config)
    }
}
