//! Sample to CloudWatch data point conversion

use crate::core::config::SelectionConfig;
use crate::core::constants::{
    DEFAULT_UNIT, HIGH_RES_LABEL, MAX_DIMENSIONS, UNIT_LABEL, VALUE_MAX_EXPONENT,
    VALUE_MIN_EXPONENT,
};
use crate::domain::filter::MetricFilter;
use crate::domain::types::{DataPoint, Dimension, Resolution, Sample};

/// CloudWatch rejects values outside roughly 2^-260..2^260 in magnitude; zero is fine
pub fn is_valid_value(value: f64) -> bool {
    if !value.is_finite() {
        return false;
    }
    if value == 0.0 {
        return true;
    }
    let magnitude = value.abs();
    magnitude > 2f64.powi(VALUE_MIN_EXPONENT) && magnitude < 2f64.powi(VALUE_MAX_EXPONENT)
}

#[derive(Debug, Clone, Copy)]
pub struct Transformer<'a> {
    config: &'a SelectionConfig,
    filter: MetricFilter<'a>,
}

impl<'a> Transformer<'a> {
    pub fn new(config: &'a SelectionConfig) -> Self {
        Self {
            config,
            filter: MetricFilter::new(config),
        }
    }

    /// Convert one sample.
    ///
    /// Returns nothing for values CloudWatch cannot store, one point normally,
    /// and a second point with substituted dimension values when substitutions
    /// are configured and the sample carries label dimensions.
    pub fn transform(&self, sample: &Sample) -> Vec<DataPoint> {
        if !is_valid_value(sample.value) {
            tracing::trace!(metric = %sample.name, value = sample.value, "Dropping unpublishable value");
            return Vec::new();
        }

        let extras = &self.config.extra_dimensions;
        let policy = self.filter.dimension_policy(&sample.name);
        let dimensions: Vec<Dimension> = sample
            .labels
            .iter()
            .filter(|(name, value)| {
                !value.is_empty()
                    && policy.allows(name)
                    && !extras.iter().any(|extra| &extra.name == *name)
            })
            .take(MAX_DIMENSIONS.saturating_sub(extras.len()))
            .map(|(name, value)| Dimension::new(name.as_str(), value.as_str()))
            .collect();

        let resolution = if self.config.force_high_res || sample.labels.contains_key(HIGH_RES_LABEL)
        {
            Resolution::High
        } else {
            Resolution::Standard
        };
        let unit = sample
            .label(UNIT_LABEL)
            .filter(|unit| !unit.is_empty())
            .unwrap_or(DEFAULT_UNIT)
            .to_string();

        let point = |dimensions: Vec<Dimension>| DataPoint {
            metric_name: sample.name.clone(),
            value: sample.value,
            timestamp_ms: sample.timestamp_ms,
            dimensions: dimensions.into_iter().chain(extras.iter().cloned()).collect(),
            resolution,
            unit: unit.clone(),
        };

        let substitutions = &self.config.dimension_substitutions;
        if substitutions.is_empty() || dimensions.is_empty() {
            return vec![point(dimensions)];
        }

        let substituted = dimensions
            .iter()
            .map(|dim| match substitutions.get(&dim.name) {
                Some(value) => Dimension::new(dim.name.as_str(), value.as_str()),
                None => dim.clone(),
            })
            .collect();
        vec![point(dimensions), point(substituted)]
    }
}
