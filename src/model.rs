use serde::{Deserialize, Serialize};
use std::fmt;

pub const ONE_DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;
pub const ONE_WEEK_MILLIS: i64 = 7 * ONE_DAY_MILLIS;

/// One temperature observation for a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub location: String,
    pub temperature: f64,
    /// Epoch millis, assigned at ingestion time.
    pub timestamp: i64,
}

/// Retention class of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    Day,
    Week,
}

impl WindowKind {
    pub const ALL: [WindowKind; 2] = [WindowKind::Day, WindowKind::Week];

    /// Token embedded in composite keys.
    pub fn token(self) -> &'static str {
        match self {
            WindowKind::Day => "lastDay",
            WindowKind::Week => "lastWeek",
        }
    }

    /// Length of the query window.
    pub fn period_millis(self) -> i64 {
        match self {
            WindowKind::Day => ONE_DAY_MILLIS,
            WindowKind::Week => ONE_WEEK_MILLIS,
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
