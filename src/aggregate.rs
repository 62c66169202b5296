//! Pure folds from a reading window into chart-ready shapes.
//!
//! Both aggregators are total over any window: an empty window yields the
//! zeroed/floored baseline instead of failing, and identical input always
//! yields identical output.

use chrono::{Datelike, Timelike, Weekday};

use crate::reading::Reading;

/// Mon..Sun, the order every weekly collection is emitted in.
pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Cosmetic bar color for a weekday. Carries no meaning beyond display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorTag {
    Emerald,
    Blue,
    Violet,
}

impl ColorTag {
    pub fn for_weekday(day: Weekday) -> Self {
        match day {
            Weekday::Wed | Weekday::Sat => ColorTag::Blue,
            Weekday::Sun => ColorTag::Violet,
            _ => ColorTag::Emerald,
        }
    }

    pub fn css_color(self) -> &'static str {
        match self {
            ColorTag::Emerald => "#10b981",
            ColorTag::Blue => "#3b82f6",
            ColorTag::Violet => "#8b5cf6",
        }
    }
}

/// Average voltage for one day of week, on the 0-100+ display scale the
/// weekly bar chart renders (raw volts x100, 2 decimals).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyAverage {
    pub weekday: Weekday,
    pub average: f64,
    pub color: ColorTag,
}

/// Time-of-day classification of a reading, by UTC hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketId {
    MorningPeak,
    LunchPeriod,
    Afternoon,
    EveningNight,
}

impl BucketId {
    pub const ALL: [BucketId; 4] = [
        BucketId::MorningPeak,
        BucketId::LunchPeriod,
        BucketId::Afternoon,
        BucketId::EveningNight,
    ];

    pub fn classify(hour: u32) -> Self {
        match hour {
            7..=10 => BucketId::MorningPeak,
            12..=14 => BucketId::LunchPeriod,
            15..=18 => BucketId::Afternoon,
            _ => BucketId::EveningNight,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BucketId::MorningPeak => "Morning Peak (7-10 AM)",
            BucketId::LunchPeriod => "Lunch Period (12-2 PM)",
            BucketId::Afternoon => "Afternoon (3-6 PM)",
            BucketId::EveningNight => "Evening/Night",
        }
    }

    fn position(self) -> usize {
        match self {
            BucketId::MorningPeak => 0,
            BucketId::LunchPeriod => 1,
            BucketId::Afternoon => 2,
            BucketId::EveningNight => 3,
        }
    }
}

/// Activity count for one time-of-day bucket. The distribution chart cannot
/// render a zero-area slice, so folded counts carry a floor of 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDayBucket {
    pub id: BucketId,
    pub count: u32,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fold a window into one entry per day of week, Mon..Sun.
///
/// Days with no observations average to 0 rather than dropping out, so the
/// bar chart always has seven bars.
pub fn aggregate_by_day_of_week(window: &[Reading]) -> [DailyAverage; 7] {
    let mut sums = [0.0f64; 7];
    let mut counts = [0u32; 7];

    for reading in window {
        let slot = reading.timestamp.weekday().num_days_from_monday() as usize;
        sums[slot] += reading.voltage;
        counts[slot] += 1;
    }

    WEEK.map(|weekday| {
        let slot = weekday.num_days_from_monday() as usize;
        let average = if counts[slot] > 0 {
            round2(sums[slot] / counts[slot] as f64 * 100.0)
        } else {
            0.0
        };
        DailyAverage {
            weekday,
            average,
            color: ColorTag::for_weekday(weekday),
        }
    })
}

/// Fold a window into the four fixed time-of-day buckets, floor applied.
pub fn aggregate_by_time_of_day(window: &[Reading]) -> [TimeOfDayBucket; 4] {
    let mut counts = [0u32; 4];

    for reading in window {
        counts[BucketId::classify(reading.timestamp.hour()).position()] += 1;
    }

    BucketId::ALL.map(|id| TimeOfDayBucket {
        id,
        count: counts[id.position()].max(1),
    })
}
