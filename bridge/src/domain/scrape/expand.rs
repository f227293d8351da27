//! Flatten metric families into samples

use std::collections::BTreeMap;

use super::proto::{Metric, MetricFamily, MetricType};
use crate::core::constants::METRIC_NAME_LABEL;
use crate::domain::types::Sample;

/// Expand one family into samples.
///
/// Summaries yield one sample per quantile plus `_sum` and `_count`.
/// Histograms yield one `_bucket` sample per bucket plus `_sum` and `_count`;
/// an `le="+Inf"` bucket is added when the exposition omitted it.
/// `default_ts` applies to metrics without their own timestamp.
pub fn expand_family(family: &MetricFamily, default_ts: i64) -> Vec<Sample> {
    let name = family.family_name();
    let ty = family.metric_type();
    let mut samples = Vec::new();

    for metric in &family.metric {
        let labels = base_labels(metric);
        let ts = metric.timestamp_ms.unwrap_or(default_ts);

        match ty {
            MetricType::Counter => match metric.counter {
                Some(c) => samples.push(Sample::new(name, labels, c.value.unwrap_or_default(), ts)),
                None => skip(name, ty),
            },
            MetricType::Gauge => match metric.gauge {
                Some(g) => samples.push(Sample::new(name, labels, g.value.unwrap_or_default(), ts)),
                None => skip(name, ty),
            },
            MetricType::Untyped => match metric.untyped {
                Some(u) => samples.push(Sample::new(name, labels, u.value.unwrap_or_default(), ts)),
                None => skip(name, ty),
            },
            MetricType::Summary => {
                let Some(summary) = &metric.summary else {
                    skip(name, ty);
                    continue;
                };
                for q in &summary.quantile {
                    let mut labels = labels.clone();
                    labels.insert(
                        "quantile".to_string(),
                        format_float(q.quantile.unwrap_or_default()),
                    );
                    samples.push(Sample::new(name, labels, q.value.unwrap_or_default(), ts));
                }
                samples.push(Sample::new(
                    format!("{}_sum", name),
                    labels.clone(),
                    summary.sample_sum.unwrap_or_default(),
                    ts,
                ));
                samples.push(Sample::new(
                    format!("{}_count", name),
                    labels,
                    summary.sample_count.unwrap_or_default() as f64,
                    ts,
                ));
            }
            MetricType::Histogram | MetricType::GaugeHistogram => {
                let Some(histogram) = &metric.histogram else {
                    skip(name, ty);
                    continue;
                };
                let count = histogram
                    .sample_count_float
                    .unwrap_or_else(|| histogram.sample_count.unwrap_or_default() as f64);
                let bucket_name = format!("{}_bucket", name);

                let mut saw_inf = false;
                for bucket in &histogram.bucket {
                    let upper = bucket.upper_bound.unwrap_or_default();
                    saw_inf |= upper == f64::INFINITY;
                    let value = bucket
                        .cumulative_count_float
                        .unwrap_or_else(|| bucket.cumulative_count.unwrap_or_default() as f64);
                    let mut labels = labels.clone();
                    labels.insert("le".to_string(), format_float(upper));
                    samples.push(Sample::new(bucket_name.clone(), labels, value, ts));
                }
                if !saw_inf {
                    let mut labels = labels.clone();
                    labels.insert("le".to_string(), format_float(f64::INFINITY));
                    samples.push(Sample::new(bucket_name, labels, count, ts));
                }

                samples.push(Sample::new(
                    format!("{}_sum", name),
                    labels.clone(),
                    histogram.sample_sum.unwrap_or_default(),
                    ts,
                ));
                samples.push(Sample::new(format!("{}_count", name), labels, count, ts));
            }
        }
    }

    samples
}

fn base_labels(metric: &Metric) -> BTreeMap<String, String> {
    metric
        .label
        .iter()
        .filter_map(|pair| {
            let name = pair.name.as_deref()?;
            if name == METRIC_NAME_LABEL {
                return None;
            }
            Some((name.to_string(), pair.value.clone().unwrap_or_default()))
        })
        .collect()
}

fn skip(family: &str, ty: MetricType) {
    tracing::debug!(family, ?ty, "Metric payload does not match family type, skipping");
}

/// Render a float the way exposition label values spell it
fn format_float(value: f64) -> String {
    if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else if value.is_nan() {
        "NaN".to_string()
    } else {
        shortest_general(value)
    }
}

/// Shortest round-trip digits, switching to `d.ddde±XX` when the decimal
/// exponent is below -4 or at least 6 (`%g` with shortest precision)
fn shortest_general(value: f64) -> String {
    let scientific = format!("{:e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return value.to_string();
    };

    if (-4..6).contains(&exponent) {
        value.to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}
