use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of measurement units used by catalog entries and BoQ items.
/// There are no implicit conversions between physical units; only time
/// units convert, through [`TimeConversionConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    CubicMeter,
    SquareMeter,
    Meter,
    Ton,
    Piece,
    Hour,
    Day,
    Week,
    Month,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::CubicMeter => "m3",
            Unit::SquareMeter => "m2",
            Unit::Meter => "m",
            Unit::Ton => "ton",
            Unit::Piece => "piece",
            Unit::Hour => "hour",
            Unit::Day => "day",
            Unit::Week => "week",
            Unit::Month => "month",
        }
    }

    pub fn from_str(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "m3" | "m\u{b3}" => Some(Unit::CubicMeter),
            "m2" | "m\u{b2}" => Some(Unit::SquareMeter),
            "m" => Some(Unit::Meter),
            "ton" | "t" => Some(Unit::Ton),
            "piece" | "pc" | "each" => Some(Unit::Piece),
            "hour" | "hr" | "h" => Some(Unit::Hour),
            "day" | "d" => Some(Unit::Day),
            "week" | "wk" => Some(Unit::Week),
            "month" | "mo" => Some(Unit::Month),
            _ => None,
        }
    }

    pub fn time_unit(&self) -> Option<TimeUnit> {
        match self {
            Unit::Hour => Some(TimeUnit::Hour),
            Unit::Day => Some(TimeUnit::Day),
            Unit::Week => Some(TimeUnit::Week),
            Unit::Month => Some(TimeUnit::Month),
            _ => None,
        }
    }

    pub fn is_time(&self) -> bool {
        self.time_unit().is_some()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time units carry a fixed conversion table; everything else is opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Hour,
    Day,
    Week,
    Month,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
        }
    }
}

/// Working-time ratios used to convert between rate tiers. The defaults
/// (8h days, 5d weeks, 22d months) are contractual constants, not wall
/// clock durations, and are exposed so a host can override them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeConversionConfig {
    pub hours_per_day: f64,
    pub days_per_week: f64,
    pub days_per_month: f64,
}

impl Default for TimeConversionConfig {
    fn default() -> Self {
        Self {
            hours_per_day: 8.0,
            days_per_week: 5.0,
            days_per_month: 22.0,
        }
    }
}

impl TimeConversionConfig {
    /// Number of working hours in one unit of `unit`.
    pub fn hours_in(&self, unit: TimeUnit) -> f64 {
        match unit {
            TimeUnit::Hour => 1.0,
            TimeUnit::Day => self.hours_per_day,
            TimeUnit::Week => self.hours_per_day * self.days_per_week,
            TimeUnit::Month => self.hours_per_day * self.days_per_month,
        }
    }

    /// Convert a rate expressed per `from` into a rate per `to`.
    pub fn convert_rate(&self, rate: f64, from: TimeUnit, to: TimeUnit) -> f64 {
        let per_hour = rate / self.hours_in(from);
        per_hour * self.hours_in(to)
    }
}
