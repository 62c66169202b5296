//! Shared derived state the view layer reads.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::aggregate::{
    aggregate_by_day_of_week, aggregate_by_time_of_day, DailyAverage, TimeOfDayBucket,
};
use crate::freshness::ConnectionState;
use crate::grid::{GridEngine, GridMode, LiveFeedback, GRID_SIZE};
use crate::poller::TimePeriod;
use crate::reading::Reading;

/// Length of the rolling voltage trace behind the mini sparkline.
pub const VOLTAGE_HISTORY_LEN: usize = 20;

/// Latest reading plus the fixed-length voltage trace.
#[derive(Debug, Clone)]
pub struct LiveMetrics {
    latest: Option<Reading>,
    voltage_history: VecDeque<f64>,
}

impl Default for LiveMetrics {
    fn default() -> Self {
        Self {
            latest: None,
            voltage_history: std::iter::repeat(0.0).take(VOLTAGE_HISTORY_LEN).collect(),
        }
    }
}

impl LiveMetrics {
    /// Take in a freshly fetched reading. A reading carrying the same
    /// timestamp as the stored one is an unchanged poll and is dropped;
    /// returns whether anything was absorbed.
    pub fn absorb(&mut self, reading: Reading) -> bool {
        if self
            .latest
            .as_ref()
            .is_some_and(|current| current.timestamp == reading.timestamp)
        {
            return false;
        }

        self.voltage_history.pop_front();
        self.voltage_history.push_back(reading.voltage);
        self.latest = Some(reading);
        true
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.latest.as_ref()
    }

    pub fn voltage_history(&self) -> Vec<f64> {
        self.voltage_history.iter().copied().collect()
    }
}

/// All mutable dashboard state, owned behind one lock by the runtime.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub live: LiveMetrics,
    pub daily: [DailyAverage; 7],
    pub buckets: [TimeOfDayBucket; 4],
    pub connection: ConnectionState,
    pub voltage_series: Vec<(DateTime<Utc>, f64)>,
    pub advisory: Option<String>,
    pub grid: GridEngine,
    pub feedback: LiveFeedback,
    pub period: TimePeriod,
    /// Number of fetches currently on the wire.
    pub fetches_in_flight: u32,
    /// Sequence number of the newest committed fetch; older completions are
    /// discarded instead of overwriting fresher data.
    pub last_committed_seq: u64,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            live: LiveMetrics::default(),
            daily: aggregate_by_day_of_week(&[]),
            buckets: aggregate_by_time_of_day(&[]),
            connection: ConnectionState::default(),
            voltage_series: Vec::new(),
            advisory: None,
            grid: GridEngine::new(),
            feedback: LiveFeedback::default(),
            period: TimePeriod::default(),
            fetches_in_flight: 0,
            last_committed_seq: 0,
        }
    }
}

impl DashboardState {
    pub fn fetch_in_flight(&self) -> bool {
        self.fetches_in_flight > 0
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            latest: self.live.latest().cloned(),
            voltage_history: self.live.voltage_history(),
            daily_averages: self.daily,
            time_of_day: self.buckets,
            connection: self.connection,
            grid: *self.grid.cells(),
            grid_mode: self.grid.mode(),
            feedback: self.feedback,
            voltage_series: self.voltage_series.clone(),
            advisory: self.advisory.clone(),
            period: self.period,
        }
    }
}

/// Read-only view bundle handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub latest: Option<Reading>,
    pub voltage_history: Vec<f64>,
    pub daily_averages: [DailyAverage; 7],
    pub time_of_day: [TimeOfDayBucket; 4],
    pub connection: ConnectionState,
    pub grid: [[f64; GRID_SIZE]; GRID_SIZE],
    pub grid_mode: GridMode,
    pub feedback: LiveFeedback,
    pub voltage_series: Vec<(DateTime<Utc>, f64)>,
    pub advisory: Option<String>,
    pub period: TimePeriod,
}
