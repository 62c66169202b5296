//! HTTP client for the ThingSpeak data-logging API.
//!
//! One GET per call, no retries here: recovery from a failed fetch is the
//! poll scheduler's next tick, not a backoff loop inside the client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::errors::TelemetryError;
use crate::reading::{normalize_window, FieldId, RawFeed, ReadingWindow};

/// Relative time range for a field-series request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    Minutes(u32),
    Days(u32),
}

impl RangeSpec {
    fn query_pair(self) -> (&'static str, String) {
        match self {
            RangeSpec::Minutes(m) => ("minutes", m.to_string()),
            RangeSpec::Days(d) => ("days", d.to_string()),
        }
    }
}

/// Top-level response shape of both feed endpoints.
#[derive(Debug, Deserialize)]
pub struct FeedsResponse {
    #[serde(default)]
    pub feeds: Vec<RawFeed>,
}

/// Seam between the poll scheduler and the network, so scheduler behavior is
/// testable against a canned source.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch_latest_readings(&self, results: usize)
        -> Result<ReadingWindow, TelemetryError>;

    async fn fetch_field_series(
        &self,
        field: FieldId,
        results: usize,
        range: Option<RangeSpec>,
    ) -> Result<ReadingWindow, TelemetryError>;
}

pub struct TelemetryClient {
    http: reqwest::Client,
    base_url: String,
    channel_id: String,
    read_api_key: String,
}

impl TelemetryClient {
    pub fn new(config: &Config) -> Result<Self, TelemetryError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            channel_id: config.channel_id.clone(),
            read_api_key: config.read_api_key.clone(),
        })
    }

    fn feeds_url(&self) -> String {
        format!("{}/channels/{}/feeds.json", self.base_url, self.channel_id)
    }

    fn field_url(&self, field: FieldId) -> String {
        format!(
            "{}/channels/{}/fields/{}.json",
            self.base_url,
            self.channel_id,
            field.index()
        )
    }

    async fn get_window(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<ReadingWindow, TelemetryError> {
        debug!("GET {}", url);
        let response = self.http.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Http { status, url });
        }

        let body: FeedsResponse = response.json().await?;
        debug!("received {} feed entries from {}", body.feeds.len(), url);
        normalize_window(&body.feeds)
    }
}

#[async_trait]
impl TelemetrySource for TelemetryClient {
    async fn fetch_latest_readings(
        &self,
        results: usize,
    ) -> Result<ReadingWindow, TelemetryError> {
        let query = vec![
            ("api_key", self.read_api_key.clone()),
            ("results", results.to_string()),
        ];
        self.get_window(self.feeds_url(), &query).await
    }

    async fn fetch_field_series(
        &self,
        field: FieldId,
        results: usize,
        range: Option<RangeSpec>,
    ) -> Result<ReadingWindow, TelemetryError> {
        let mut query = vec![
            ("api_key", self.read_api_key.clone()),
            ("results", results.to_string()),
        ];
        if let Some(range) = range {
            let (key, value) = range.query_pair();
            query.push((key, value));
        }
        self.get_window(self.field_url(field), &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TelemetryClient {
        let config = Config {
            channel_id: "2995641".to_string(),
            base_url: "https://api.thingspeak.com/".to_string(),
            ..Config::default()
        };
        TelemetryClient::new(&config).unwrap()
    }

    #[test]
    fn feeds_url_has_channel_path() {
        assert_eq!(
            client().feeds_url(),
            "https://api.thingspeak.com/channels/2995641/feeds.json"
        );
    }

    #[test]
    fn field_url_uses_wire_index() {
        assert_eq!(
            client().field_url(FieldId::Temperature),
            "https://api.thingspeak.com/channels/2995641/fields/3.json"
        );
    }

    #[test]
    fn range_spec_renders_relative_query_pairs() {
        assert_eq!(RangeSpec::Days(7).query_pair(), ("days", "7".to_string()));
        assert_eq!(
            RangeSpec::Minutes(60).query_pair(),
            ("minutes", "60".to_string())
        );
    }

    #[test]
    fn feeds_response_tolerates_missing_feeds_key() {
        let body: FeedsResponse = serde_json::from_str("{\"channel\":{}}").unwrap();
        assert!(body.feeds.is_empty());
    }

    #[test]
    fn feeds_response_parses_mixed_value_types() {
        let body: FeedsResponse = serde_json::from_str(
            r#"{"feeds":[
                {"created_at":"2024-01-03T08:00:00Z","field1":"2.5","field2":3},
                {"created_at":"2024-01-03T08:01:00Z","field1":2.7}
            ]}"#,
        )
        .unwrap();
        let window = normalize_window(&body.feeds).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].events, 3);
        assert!((window[1].voltage - 2.7).abs() < 1e-9);
    }
}
