use thiserror::Error;

/// Errors produced by the telemetry layer.
///
/// Empty feed windows are deliberately NOT represented here: a channel with
/// no rows is valid data and aggregates to zeroed output.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("telemetry API returned HTTP {status} for {url}")]
    Http {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("transport failure talking to the telemetry API: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },
    #[error("unparseable created_at value '{value}' in feed entry")]
    MalformedRecord { value: String },
}

impl TelemetryError {
    /// True for failures the next poll tick is expected to clear on its own
    /// (connectivity, server-side errors). Malformed records indicate a
    /// channel misconfiguration and are worth louder logging.
    pub fn is_transient(&self) -> bool {
        matches!(self, TelemetryError::Http { .. } | TelemetryError::Transport { .. })
    }
}
