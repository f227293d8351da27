//! Pipeline data types

use std::collections::BTreeMap;

use crate::core::constants::{HIGH_RESOLUTION_SECS, STANDARD_RESOLUTION_SECS};

/// One observed measurement, flattened out of a metric family.
///
/// Labels never contain `__name__`; the name is held separately.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp_ms: i64,
}

impl Sample {
    pub fn new(
        name: impl Into<String>,
        labels: BTreeMap<String, String>,
        value: f64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            name: name.into(),
            labels,
            value,
            timestamp_ms,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// CloudWatch storage resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 1 second
    High,
    /// 60 seconds
    Standard,
}

impl Resolution {
    pub fn seconds(self) -> i32 {
        match self {
            Resolution::High => HIGH_RESOLUTION_SECS,
            Resolution::Standard => STANDARD_RESOLUTION_SECS,
        }
    }
}

/// A provider-ready point: at most 10 dimensions, value within CloudWatch's range
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub metric_name: String,
    pub value: f64,
    pub timestamp_ms: i64,
    pub dimensions: Vec<Dimension>,
    pub resolution: Resolution,
    pub unit: String,
}
