use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Global metrics instance
pub static METRICS: Lazy<Mutex<PollMetrics>> = Lazy::new(|| Mutex::new(PollMetrics::new()));

/// Counters for the polling/animation runtime.
#[derive(Debug, Default)]
pub struct PollMetrics {
    pub polls_attempted: u64,
    pub polls_succeeded: u64,
    pub polls_failed: u64,
    pub records_parsed: u64,
    pub stale_completions_discarded: u64,
    pub grid_ticks: u64,
    pub start_time: Option<Instant>,
}

impl PollMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_poll_attempt(&mut self) {
        self.polls_attempted += 1;
    }

    pub fn record_poll_success(&mut self, records: u64) {
        self.polls_succeeded += 1;
        self.records_parsed += records;
    }

    pub fn record_poll_failure(&mut self) {
        self.polls_failed += 1;
    }

    pub fn record_stale_discard(&mut self) {
        self.stale_completions_discarded += 1;
    }

    pub fn record_grid_tick(&mut self) {
        self.grid_ticks += 1;
    }

    pub fn uptime(&self) -> Duration {
        self.start_time
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    pub fn print_summary(&self) {
        println!("\n========== Telemetry Runtime Summary ==========");
        println!("Uptime: {:.2?}", self.uptime());
        println!("Polls Attempted: {}", self.polls_attempted);
        println!("Polls Succeeded: {}", self.polls_succeeded);
        println!("Polls Failed: {}", self.polls_failed);
        println!("Records Parsed: {}", self.records_parsed);
        println!("Stale Completions Discarded: {}", self.stale_completions_discarded);
        println!("Grid Ticks: {}", self.grid_ticks);
        println!("===============================================");
    }
}
