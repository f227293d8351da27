//! Metric and label eligibility

use std::collections::BTreeSet;

use crate::core::config::SelectionConfig;
use crate::core::constants::{HIGH_RES_LABEL, METRIC_NAME_LABEL, UNIT_LABEL};
use crate::utils::glob::{GlobPattern, any_matches};

/// Metric name pattern paired with the label names it selects
#[derive(Debug, Clone)]
pub struct MatcherRule {
    pattern: GlobPattern,
    labels: BTreeSet<String>,
}

impl MatcherRule {
    pub fn new(pattern: GlobPattern, labels: impl IntoIterator<Item = String>) -> Self {
        Self {
            pattern,
            labels: labels.into_iter().collect(),
        }
    }

    pub fn matches(&self, metric_name: &str) -> bool {
        self.pattern.matches(metric_name)
    }

    pub fn pattern(&self) -> &GlobPattern {
        &self.pattern
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }
}

/// Labels that steer the bridge and never become dimensions
pub fn is_reserved_label(name: &str) -> bool {
    name == METRIC_NAME_LABEL || name == HIGH_RES_LABEL || name == UNIT_LABEL
}

#[derive(Debug, Clone, Copy)]
pub struct MetricFilter<'a> {
    config: &'a SelectionConfig,
}

impl<'a> MetricFilter<'a> {
    pub fn new(config: &'a SelectionConfig) -> Self {
        Self { config }
    }

    /// Exclusion wins over inclusion. No include patterns means include all.
    pub fn should_publish(&self, metric_name: &str) -> bool {
        if any_matches(&self.config.exclude_metrics, metric_name) {
            return false;
        }
        self.config.include_metrics.is_empty()
            || any_matches(&self.config.include_metrics, metric_name)
    }

    /// Label restrictions for one metric; the first matching rule on each side applies
    pub fn dimension_policy(&self, metric_name: &str) -> DimensionPolicy<'a> {
        let first = |rules: &'a [MatcherRule]| {
            rules
                .iter()
                .find(|rule| rule.matches(metric_name))
                .map(MatcherRule::labels)
        };
        DimensionPolicy {
            include: first(&self.config.include_dimensions),
            exclude: first(&self.config.exclude_dimensions),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DimensionPolicy<'a> {
    include: Option<&'a BTreeSet<String>>,
    exclude: Option<&'a BTreeSet<String>>,
}

impl DimensionPolicy<'_> {
    pub fn allows(&self, label: &str) -> bool {
        if is_reserved_label(label) {
            return false;
        }
        if self.exclude.is_some_and(|set| set.contains(label)) {
            return false;
        }
        self.include.is_none_or(|set| set.contains(label))
    }
}
