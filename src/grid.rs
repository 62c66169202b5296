//! Simulated 8x8 piezoelectric pressure grid.
//!
//! The real sensor mat only reports a single harvested-voltage scalar, so the
//! dashboard synthesizes a plausible-looking activation grid from it: canned
//! footstep-shaped stamps scaled by the live voltage, decaying every tick.

use rand::Rng;

pub const GRID_SIZE: usize = 8;

/// Intensity lost by every active cell per tick.
const DECAY_STEP: f64 = 5.0;
/// Below this voltage the harvester is effectively idle; no new activations.
const MIN_ACTIVATION_VOLTAGE: f64 = 0.1;
const MAX_INTENSITY: f64 = 100.0;
const PATTERN_SCALE: f64 = 30.0;
const RANDOM_SCALE: f64 = 25.0;
/// Value a manually toggled cell lights up with while paused.
const MANUAL_TOGGLE_VALUE: f64 = 80.0;
const PATTERN_PROBABILITY: f64 = 0.5;
/// Chance of nudging each stamped cell by one row/col, emulating foot drift.
const JITTER_PROBABILITY: f64 = 0.2;
const EXTRA_CELL_PROBABILITY: f64 = 0.2;

const BATTERY_CHARGE_STEP: f64 = 0.1;
const BATTERY_DRAIN_STEP: f64 = 0.02;
const INITIAL_BATTERY_LEVEL: f64 = 78.0;
/// Divisor turning summed cell intensity into the 0-100 pressure gauge.
const PRESSURE_GAUGE_DIVISOR: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridMode {
    Simulating,
    Paused,
}

/// A named spatial stamp: `(row, col, weight)` triples relative to the full
/// grid. Tagged data, not behavior; the engine is pattern-agnostic.
#[derive(Debug, Clone, Copy)]
pub struct PressurePattern {
    pub name: &'static str,
    pub cells: &'static [(usize, usize, f64)],
}

pub const PRESSURE_PATTERNS: [PressurePattern; 3] = [
    PressurePattern {
        name: "heel",
        cells: &[
            (5, 3, 0.9),
            (5, 4, 0.9),
            (6, 3, 1.0),
            (6, 4, 1.0),
            (7, 3, 0.8),
            (7, 4, 0.8),
        ],
    },
    PressurePattern {
        name: "ball-of-foot",
        cells: &[
            (3, 2, 0.8),
            (3, 3, 1.0),
            (3, 4, 1.0),
            (3, 5, 0.8),
            (4, 3, 0.9),
            (4, 4, 0.9),
        ],
    },
    PressurePattern {
        name: "toe",
        cells: &[(1, 3, 0.7), (1, 4, 0.7), (2, 3, 0.6), (2, 4, 0.6), (0, 4, 0.5)],
    },
];

/// Everything the engine needs to know about the outside world for one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    pub voltage: f64,
    pub connected: bool,
    pub fetch_in_flight: bool,
}

/// Derived grid-side gauges published alongside the cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveFeedback {
    pub pressure_pct: f64,
    pub battery_level: f64,
    pub active_cells: usize,
}

impl Default for LiveFeedback {
    fn default() -> Self {
        Self {
            pressure_pct: 0.0,
            battery_level: INITIAL_BATTERY_LEVEL,
            active_cells: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridEngine {
    cells: [[f64; GRID_SIZE]; GRID_SIZE],
    mode: GridMode,
    battery_level: f64,
}

impl Default for GridEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GridEngine {
    pub fn new() -> Self {
        Self {
            cells: [[0.0; GRID_SIZE]; GRID_SIZE],
            mode: GridMode::Simulating,
            battery_level: INITIAL_BATTERY_LEVEL,
        }
    }

    pub fn mode(&self) -> GridMode {
        self.mode
    }

    pub fn cells(&self) -> &[[f64; GRID_SIZE]; GRID_SIZE] {
        &self.cells
    }

    pub fn toggle_mode(&mut self) -> GridMode {
        self.mode = match self.mode {
            GridMode::Simulating => GridMode::Paused,
            GridMode::Paused => GridMode::Simulating,
        };
        self.mode
    }

    /// Clear the grid and gauges back to their initial values.
    pub fn reset(&mut self) {
        self.cells = [[0.0; GRID_SIZE]; GRID_SIZE];
        self.battery_level = INITIAL_BATTERY_LEVEL;
    }

    /// Manual demonstration edit, only honored while paused: flips a cell
    /// between dark and a fixed bright value. Returns whether it applied.
    pub fn toggle_cell(&mut self, row: usize, col: usize) -> bool {
        if self.mode != GridMode::Paused || row >= GRID_SIZE || col >= GRID_SIZE {
            return false;
        }
        self.cells[row][col] = if self.cells[row][col] > 0.0 {
            0.0
        } else {
            MANUAL_TOGGLE_VALUE
        };
        true
    }

    /// One animation step. No-op while paused; clears the grid while the
    /// sensor system is offline; otherwise decays and maybe stamps new
    /// activation scaled by the live voltage.
    pub fn tick<R: Rng + ?Sized>(&mut self, input: TickInput, rng: &mut R) -> LiveFeedback {
        if self.mode == GridMode::Paused {
            return self.feedback_idle();
        }

        if !input.connected {
            self.cells = [[0.0; GRID_SIZE]; GRID_SIZE];
            return self.feedback_idle();
        }

        for row in self.cells.iter_mut() {
            for cell in row.iter_mut() {
                *cell = (*cell - DECAY_STEP).max(0.0);
            }
        }

        let can_activate = input.voltage >= MIN_ACTIVATION_VOLTAGE && !input.fetch_in_flight;
        if can_activate {
            if rng.gen_bool(PATTERN_PROBABILITY) {
                let pattern = PRESSURE_PATTERNS[rng.gen_range(0..PRESSURE_PATTERNS.len())];
                self.stamp_pattern(pattern, input.voltage, rng);
            }
            if rng.gen_bool(EXTRA_CELL_PROBABILITY) {
                let row = rng.gen_range(0..GRID_SIZE);
                let col = rng.gen_range(0..GRID_SIZE);
                self.stamp(row, col, input.voltage * RANDOM_SCALE);
            }
        }

        self.feedback_after_tick()
    }

    fn stamp_pattern<R: Rng + ?Sized>(&mut self, pattern: PressurePattern, voltage: f64, rng: &mut R) {
        for &(row, col, weight) in pattern.cells {
            let (mut row, mut col) = (row as i64, col as i64);
            if rng.gen_bool(JITTER_PROBABILITY) {
                row += rng.gen_range(-1..=1);
                col += rng.gen_range(-1..=1);
            }
            let row = row.clamp(0, GRID_SIZE as i64 - 1) as usize;
            let col = col.clamp(0, GRID_SIZE as i64 - 1) as usize;
            self.stamp(row, col, voltage * PATTERN_SCALE * weight);
        }
    }

    fn stamp(&mut self, row: usize, col: usize, intensity: f64) {
        self.cells[row][col] = intensity.clamp(0.0, MAX_INTENSITY);
    }

    fn total_intensity(&self) -> f64 {
        self.cells.iter().flatten().sum()
    }

    fn active_cells(&self) -> usize {
        self.cells.iter().flatten().filter(|&&c| c > 0.0).count()
    }

    // Gauges for ticks that generated or retained pressure: charge while the
    // mat is active, drain while it sits idle.
    fn feedback_after_tick(&mut self) -> LiveFeedback {
        let total = self.total_intensity();
        if total > 0.0 {
            self.battery_level = (self.battery_level + BATTERY_CHARGE_STEP).min(100.0);
        } else {
            self.battery_level = (self.battery_level - BATTERY_DRAIN_STEP).max(0.0);
        }
        LiveFeedback {
            pressure_pct: (total / PRESSURE_GAUGE_DIVISOR).min(100.0),
            battery_level: self.battery_level,
            active_cells: self.active_cells(),
        }
    }

    fn feedback_idle(&self) -> LiveFeedback {
        LiveFeedback {
            pressure_pct: (self.total_intensity() / PRESSURE_GAUGE_DIVISOR).min(100.0),
            battery_level: self.battery_level,
            active_cells: self.active_cells(),
        }
    }
}
