//! Poll scheduler and dashboard runtime.
//!
//! Owns the three repeating timers (data poll, staleness check, grid
//! animation) as scoped tokio tasks: `start()` spawns them, `stop()` aborts
//! them, and nothing touches shared state after teardown. Fetch completions
//! commit behind a monotonically increasing sequence number so a slow, stale
//! response can never overwrite fresher data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::aggregate::{aggregate_by_day_of_week, aggregate_by_time_of_day};
use crate::client::{RangeSpec, TelemetrySource};
use crate::config::Config;
use crate::errors::TelemetryError;
use crate::freshness::Clock;
use crate::grid::{GridMode, TickInput};
use crate::metrics::METRICS;
use crate::reading::{FieldId, ReadingWindow};
use crate::state::{DashboardState, Snapshot};

/// Advisory shown while fetches fail and the dashboard keeps serving the
/// last-known-good derived state.
pub const FAILED_FETCH_ADVISORY: &str = "failed to connect, showing last-known/sample data";

/// User-selected window for the real-time chart and the aggregations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimePeriod {
    Hour,
    #[default]
    Day,
    Week,
}

impl TimePeriod {
    /// Result count requested from the feeds endpoint for this window.
    pub fn results(self) -> usize {
        match self {
            TimePeriod::Hour => 60,
            TimePeriod::Day => 96,
            TimePeriod::Week => 168,
        }
    }

    pub fn range(self) -> RangeSpec {
        match self {
            TimePeriod::Hour => RangeSpec::Minutes(60),
            TimePeriod::Day => RangeSpec::Minutes(1440),
            TimePeriod::Week => RangeSpec::Days(7),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimePeriod::Hour => "hour",
            TimePeriod::Day => "day",
            TimePeriod::Week => "week",
        }
    }
}

impl std::str::FromStr for TimePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hour" => Ok(TimePeriod::Hour),
            "day" => Ok(TimePeriod::Day),
            "week" => Ok(TimePeriod::Week),
            other => Err(format!(
                "unknown time period '{other}', expected hour, day or week"
            )),
        }
    }
}

pub type SharedState = Arc<RwLock<DashboardState>>;

/// The dashboard runtime: shared state plus the timer tasks that feed it.
pub struct Dashboard {
    state: SharedState,
    source: Arc<dyn TelemetrySource>,
    clock: Arc<dyn Clock>,
    config: Config,
    period_tx: watch::Sender<TimePeriod>,
    seq: Arc<AtomicU64>,
    tasks: Vec<JoinHandle<()>>,
}

impl Dashboard {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        clock: Arc<dyn Clock>,
        config: Config,
        period: TimePeriod,
    ) -> Self {
        let state = Arc::new(RwLock::new(DashboardState {
            period,
            ..DashboardState::default()
        }));
        let (period_tx, _) = watch::channel(period);

        Self {
            state,
            source,
            clock,
            config,
            period_tx,
            seq: Arc::new(AtomicU64::new(0)),
            tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.read().snapshot()
    }

    /// Spawn the poll, freshness and grid timers. Idempotent while running.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }

        info!(
            poll = ?self.config.poll_interval,
            freshness = ?self.config.freshness_interval,
            grid = ?self.config.grid_tick_interval,
            "starting telemetry runtime"
        );

        self.tasks.push(tokio::spawn(poll_loop(
            Arc::clone(&self.state),
            Arc::clone(&self.source),
            Arc::clone(&self.clock),
            self.period_tx.subscribe(),
            Arc::clone(&self.seq),
            self.config.poll_interval,
        )));
        self.tasks.push(tokio::spawn(freshness_loop(
            Arc::clone(&self.state),
            Arc::clone(&self.clock),
            self.config.freshness_interval,
        )));
        self.tasks.push(tokio::spawn(grid_loop(
            Arc::clone(&self.state),
            self.config.grid_tick_interval,
        )));
    }

    /// Abort every timer task. Guaranteed quiescence: no callback runs after
    /// this returns.
    pub fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        info!("stopping telemetry runtime");
        for task in self.tasks.drain(..) {
            task.abort();
        }
        // A fetch aborted mid-flight never gets to decrement its counter.
        self.state.write().fetches_in_flight = 0;
    }

    /// Switch the chart window. Triggers an immediate out-of-cycle fetch in
    /// addition to the running interval.
    pub fn set_period(&self, period: TimePeriod) {
        self.state.write().period = period;
        self.period_tx.send_if_modified(|current| {
            if *current != period {
                *current = period;
                true
            } else {
                false
            }
        });
    }

    pub fn toggle_simulation(&self) -> GridMode {
        self.state.write().grid.toggle_mode()
    }

    /// Manual cell edit; only honored while the simulation is paused.
    pub fn toggle_cell(&self, row: usize, col: usize) -> bool {
        self.state.write().grid.toggle_cell(row, col)
    }

    pub fn reset_grid(&self) {
        let mut state = self.state.write();
        state.grid.reset();
        state.feedback = Default::default();
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    state: SharedState,
    source: Arc<dyn TelemetrySource>,
    clock: Arc<dyn Clock>,
    mut period_rx: watch::Receiver<TimePeriod>,
    seq: Arc<AtomicU64>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = period_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!("time period changed, fetching out of cycle");
            }
        }

        let period = *period_rx.borrow_and_update();
        let fetch_seq = seq.fetch_add(1, Ordering::SeqCst) + 1;
        run_poll_cycle(&state, source.as_ref(), clock.as_ref(), period, fetch_seq).await;
    }
}

async fn run_poll_cycle(
    state: &SharedState,
    source: &dyn TelemetrySource,
    clock: &dyn Clock,
    period: TimePeriod,
    fetch_seq: u64,
) {
    METRICS.lock().record_poll_attempt();
    state.write().fetches_in_flight += 1;

    let outcome = fetch_period_windows(source, period).await;

    let mut state = state.write();
    state.fetches_in_flight = state.fetches_in_flight.saturating_sub(1);
    match outcome {
        Ok((window, series)) => {
            apply_success(&mut state, fetch_seq, window, series, clock.now())
        }
        Err(error) => apply_failure(&mut state, fetch_seq, &error),
    }
}

async fn fetch_period_windows(
    source: &dyn TelemetrySource,
    period: TimePeriod,
) -> Result<(ReadingWindow, ReadingWindow), TelemetryError> {
    let window = source.fetch_latest_readings(period.results()).await?;
    let series = source
        .fetch_field_series(FieldId::Voltage, period.results(), Some(period.range()))
        .await?;
    Ok((window, series))
}

/// Commit one successful fetch, unless a newer one already landed.
pub fn apply_success(
    state: &mut DashboardState,
    fetch_seq: u64,
    window: ReadingWindow,
    series: ReadingWindow,
    now: DateTime<Utc>,
) {
    if fetch_seq <= state.last_committed_seq {
        debug!(
            fetch_seq,
            committed = state.last_committed_seq,
            "discarding stale fetch completion"
        );
        METRICS.lock().record_stale_discard();
        return;
    }
    state.last_committed_seq = fetch_seq;

    // Aggregations are recomputed wholesale from the fresh window; there is
    // no incremental update path.
    state.daily = aggregate_by_day_of_week(&window);
    state.buckets = aggregate_by_time_of_day(&window);
    state.voltage_series = series
        .iter()
        .map(|r| (r.timestamp, r.field_value(FieldId::Voltage)))
        .collect();

    if let Some(latest) = window.last() {
        if state.live.absorb(latest.clone()) {
            debug!(voltage = latest.voltage, "absorbed new reading");
        }
        state.connection.record_update(latest.timestamp, now);
    }

    state.advisory = None;
    METRICS.lock().record_poll_success(window.len() as u64);
}

/// A failed fetch keeps every piece of last-known-good derived state and the
/// connection flag; only the advisory changes. Staleness decays on its own
/// schedule through the freshness monitor.
pub fn apply_failure(state: &mut DashboardState, fetch_seq: u64, error: &TelemetryError) {
    if error.is_transient() {
        warn!(fetch_seq, %error, "poll failed, keeping last-known data");
    } else {
        error!(fetch_seq, %error, "poll returned malformed data");
    }
    METRICS.lock().record_poll_failure();
    state.advisory = Some(FAILED_FETCH_ADVISORY.to_string());
}

async fn freshness_loop(state: SharedState, clock: Arc<dyn Clock>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        let now = clock.now();
        let mut state = state.write();
        let was_connected = state.connection.is_connected;
        state.connection.refresh(now);
        if was_connected && !state.connection.is_connected {
            info!("telemetry link went stale");
        }
    }
}

async fn grid_loop(state: SharedState, interval: Duration) {
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        let mut state = state.write();
        let input = TickInput {
            voltage: state.live.latest().map(|r| r.voltage).unwrap_or(0.0),
            connected: state.connection.is_connected,
            fetch_in_flight: state.fetch_in_flight(),
        };
        let feedback = state.grid.tick(input, &mut rng);
        state.feedback = feedback;
        METRICS.lock().record_grid_tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Reading;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn reading(secs: i64, voltage: f64) -> Reading {
        Reading {
            timestamp: at(secs),
            voltage,
            events: 1,
            temperature: 20.0,
            humidity: 50.0,
            light: 100,
        }
    }

    #[test]
    fn period_parsing_and_request_shapes() {
        assert_eq!("hour".parse::<TimePeriod>().unwrap(), TimePeriod::Hour);
        assert_eq!("WEEK".parse::<TimePeriod>().unwrap(), TimePeriod::Week);
        assert!("fortnight".parse::<TimePeriod>().is_err());

        assert_eq!(TimePeriod::Hour.range(), RangeSpec::Minutes(60));
        assert_eq!(TimePeriod::Week.range(), RangeSpec::Days(7));
        assert_eq!(TimePeriod::Day.results(), 96);
    }

    #[test]
    fn stale_completion_is_discarded() {
        let mut state = DashboardState::default();

        // Completions arrive in order 1, 3, then the delayed 2.
        apply_success(&mut state, 1, vec![reading(0, 1.0)], vec![], at(0));
        apply_success(&mut state, 3, vec![reading(60, 3.0)], vec![], at(60));
        apply_success(&mut state, 2, vec![reading(30, 2.0)], vec![], at(60));

        assert_eq!(state.live.latest().unwrap().voltage, 3.0);
        assert_eq!(state.last_committed_seq, 3);
    }

    #[test]
    fn failure_preserves_state_and_sets_advisory() {
        let mut state = DashboardState::default();
        apply_success(&mut state, 1, vec![reading(0, 2.5)], vec![], at(0));
        assert!(state.connection.is_connected);
        let daily_before = state.daily;

        let error = TelemetryError::Http {
            status: reqwest::StatusCode::BAD_GATEWAY,
            url: "http://example.invalid".to_string(),
        };
        apply_failure(&mut state, 2, &error);

        assert_eq!(state.advisory.as_deref(), Some(FAILED_FETCH_ADVISORY));
        assert_eq!(state.live.latest().unwrap().voltage, 2.5);
        assert_eq!(state.daily, daily_before);
        // Fetch failure alone never flips the link offline.
        assert!(state.connection.is_connected);
    }

    #[test]
    fn success_clears_the_advisory() {
        let mut state = DashboardState::default();
        let error = TelemetryError::Http {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            url: "http://example.invalid".to_string(),
        };
        apply_failure(&mut state, 1, &error);
        assert!(state.advisory.is_some());

        apply_success(&mut state, 2, vec![reading(0, 1.0)], vec![], at(0));
        assert!(state.advisory.is_none());
    }

    #[test]
    fn empty_window_commits_baseline_aggregates() {
        let mut state = DashboardState::default();
        apply_success(&mut state, 1, vec![reading(0, 2.0)], vec![], at(0));
        apply_success(&mut state, 2, vec![], vec![], at(30));

        // Aggregates recomputed from the empty window...
        assert!(state.daily.iter().all(|d| d.average == 0.0));
        assert!(state.buckets.iter().all(|b| b.count == 1));
        // ...but the last live reading and connection survive.
        assert_eq!(state.live.latest().unwrap().voltage, 2.0);
        assert!(state.connection.last_update.is_some());
    }

    #[test]
    fn voltage_series_follows_the_series_window() {
        let mut state = DashboardState::default();
        let series = vec![reading(0, 1.0), reading(30, 1.5)];
        apply_success(&mut state, 1, vec![reading(30, 1.5)], series, at(30));

        assert_eq!(state.voltage_series.len(), 2);
        assert_eq!(state.voltage_series[1], (at(30), 1.5));
    }

    struct FakeSource {
        calls: AtomicU64,
        window: ReadingWindow,
    }

    impl FakeSource {
        fn new(window: ReadingWindow) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                window,
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TelemetrySource for FakeSource {
        async fn fetch_latest_readings(
            &self,
            _results: usize,
        ) -> Result<ReadingWindow, TelemetryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.window.clone())
        }

        async fn fetch_field_series(
            &self,
            _field: FieldId,
            _results: usize,
            _range: Option<RangeSpec>,
        ) -> Result<ReadingWindow, TelemetryError> {
            Ok(self.window.clone())
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn test_config() -> Config {
        Config {
            poll_interval: Duration::from_secs(30),
            freshness_interval: Duration::from_secs(10),
            grid_tick_interval: Duration::from_millis(800),
            ..Config::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_immediately_then_on_interval() {
        let source = FakeSource::new(vec![reading(0, 2.5)]);
        let clock = Arc::new(FixedClock(at(0)));
        let mut dashboard = Dashboard::new(
            source.clone(),
            clock,
            test_config(),
            TimePeriod::Day,
        );

        dashboard.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls(), 1);

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.latest.as_ref().unwrap().voltage, 2.5);
        assert!(snapshot.connection.is_connected);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(source.calls(), 2);

        dashboard.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn period_change_fetches_out_of_cycle() {
        let source = FakeSource::new(vec![reading(0, 2.5)]);
        let clock = Arc::new(FixedClock(at(0)));
        let mut dashboard = Dashboard::new(
            source.clone(),
            clock,
            test_config(),
            TimePeriod::Day,
        );

        dashboard.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls(), 1);

        dashboard.set_period(TimePeriod::Week);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(dashboard.snapshot().period, TimePeriod::Week);

        // Re-selecting the same period is not a change.
        dashboard.set_period(TimePeriod::Week);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls(), 2);

        dashboard.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_silences_every_timer() {
        let source = FakeSource::new(vec![reading(0, 2.5)]);
        let clock = Arc::new(FixedClock(at(0)));
        let mut dashboard = Dashboard::new(
            source.clone(),
            clock,
            test_config(),
            TimePeriod::Day,
        );

        dashboard.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        dashboard.stop();

        let calls_after_stop = source.calls();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(source.calls(), calls_after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn grid_animates_while_connected() {
        let source = FakeSource::new(vec![reading(0, 2.5)]);
        let clock = Arc::new(FixedClock(at(0)));
        let mut dashboard = Dashboard::new(
            source.clone(),
            clock,
            test_config(),
            TimePeriod::Day,
        );

        dashboard.start();
        // Let the first poll land, then a stretch of 800ms grid ticks.
        tokio::time::sleep(Duration::from_secs(20)).await;

        let snapshot = dashboard.snapshot();
        assert!(snapshot.connection.is_connected);
        let total: f64 = snapshot.grid.iter().flatten().sum();
        assert!(total >= 0.0);
        for cell in snapshot.grid.iter().flatten() {
            assert!((0.0..=100.0).contains(cell));
        }

        dashboard.stop();
    }
}
