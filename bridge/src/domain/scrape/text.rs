//! Prometheus text exposition format (version 0.0.4)
//!
//! Produces the same `MetricFamily` messages as the protobuf path so the rest
//! of the pipeline sees one shape. `_sum`, `_count` and `_bucket` series are
//! folded back into their declared summary or histogram family.

use std::collections::HashMap;

use super::proto::{
    Bucket, Counter, Gauge, Histogram, LabelPair, Metric, MetricFamily, MetricType, Quantile,
    Summary, Untyped,
};
use crate::domain::error::DecodeError;

/// Parse a whole text payload.
///
/// A malformed line poisons only the family it belongs to; every other
/// family is still returned, in order of first appearance.
pub fn parse_text(input: &str) -> Vec<Result<MetricFamily, DecodeError>> {
    let mut parser = TextParser::default();
    for (idx, line) in input.lines().enumerate() {
        parser.line(idx + 1, line);
    }
    parser.finish()
}

/// What a sample line contributes to its family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Value,
    Sum,
    Count,
    Bucket,
}

#[derive(Default)]
struct FamilyBuilder {
    family: MetricFamily,
    declared: bool,
    error: Option<DecodeError>,
    /// Summary/histogram metric index keyed by its sorted label set
    series: HashMap<Vec<(String, String)>, usize>,
}

impl FamilyBuilder {
    fn new(name: &str) -> Self {
        Self {
            family: MetricFamily {
                name: Some(name.to_string()),
                r#type: Some(MetricType::Untyped as i32),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn fail(&mut self, line: usize, reason: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(DecodeError::Family {
                family: self.family.family_name().to_string(),
                line,
                reason: reason.into(),
            });
        }
    }

    fn is_complex(&self) -> bool {
        matches!(
            self.family.metric_type(),
            MetricType::Summary | MetricType::Histogram | MetricType::GaugeHistogram
        )
    }

    fn series_metric(&mut self, labels: Vec<(String, String)>) -> &mut Metric {
        let next = self.family.metric.len();
        let idx = *self.series.entry(labels.clone()).or_insert(next);
        if idx == next {
            let mut metric = Metric {
                label: to_label_pairs(labels),
                ..Default::default()
            };
            match self.family.metric_type() {
                MetricType::Summary => metric.summary = Some(Summary::default()),
                _ => metric.histogram = Some(Histogram::default()),
            }
            self.family.metric.push(metric);
        }
        &mut self.family.metric[idx]
    }

    fn add_sample(&mut self, role: Role, sample: ParsedSample) -> Result<(), String> {
        let ParsedSample {
            mut labels,
            value,
            timestamp_ms,
        } = sample;

        let metric = match (self.family.metric_type(), role) {
            (MetricType::Counter, Role::Value) => Metric {
                counter: Some(Counter { value: Some(value) }),
                ..plain_metric(labels)
            },
            (MetricType::Gauge, Role::Value) => Metric {
                gauge: Some(Gauge { value: Some(value) }),
                ..plain_metric(labels)
            },
            (MetricType::Untyped, Role::Value) => Metric {
                untyped: Some(Untyped { value: Some(value) }),
                ..plain_metric(labels)
            },
            (MetricType::Summary, Role::Value) => {
                let quantile = take_label(&mut labels, "quantile")
                    .ok_or("summary sample without 'quantile' label")?;
                let quantile = parse_float(&quantile)
                    .ok_or_else(|| format!("invalid quantile '{}'", quantile))?;
                let metric = self.series_metric(labels);
                set_timestamp(metric, timestamp_ms);
                if let Some(summary) = metric.summary.as_mut() {
                    summary.quantile.push(Quantile {
                        quantile: Some(quantile),
                        value: Some(value),
                    });
                }
                return Ok(());
            }
            (MetricType::Histogram | MetricType::GaugeHistogram, Role::Bucket) => {
                let le = take_label(&mut labels, "le")
                    .ok_or("histogram bucket without 'le' label")?;
                let upper_bound =
                    parse_float(&le).ok_or_else(|| format!("invalid bucket bound '{}'", le))?;
                let metric = self.series_metric(labels);
                set_timestamp(metric, timestamp_ms);
                if let Some(histogram) = metric.histogram.as_mut() {
                    histogram.bucket.push(Bucket {
                        cumulative_count: None,
                        cumulative_count_float: Some(value),
                        upper_bound: Some(upper_bound),
                    });
                }
                return Ok(());
            }
            (_, Role::Sum | Role::Count) if self.is_complex() => {
                let metric = self.series_metric(labels);
                set_timestamp(metric, timestamp_ms);
                if let Some(summary) = metric.summary.as_mut() {
                    match role {
                        Role::Sum => summary.sample_sum = Some(value),
                        _ => summary.sample_count = Some(value as u64),
                    }
                }
                if let Some(histogram) = metric.histogram.as_mut() {
                    match role {
                        Role::Sum => histogram.sample_sum = Some(value),
                        _ => histogram.sample_count = Some(value as u64),
                    }
                }
                return Ok(());
            }
            (ty, _) => {
                return Err(format!("sample does not fit {} family", type_name(ty)));
            }
        };

        let mut metric = metric;
        set_timestamp(&mut metric, timestamp_ms);
        self.family.metric.push(metric);
        Ok(())
    }
}

#[derive(Default)]
struct TextParser {
    families: Vec<FamilyBuilder>,
    index: HashMap<String, usize>,
    line_errors: Vec<(usize, DecodeError)>,
}

impl TextParser {
    fn family_mut(&mut self, name: &str) -> &mut FamilyBuilder {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                self.families.push(FamilyBuilder::new(name));
                self.index.insert(name.to_string(), self.families.len() - 1);
                self.families.len() - 1
            }
        };
        &mut self.families[idx]
    }

    fn line_error(&mut self, line: usize, reason: impl Into<String>) {
        let pos = self.families.len();
        self.line_errors.push((
            pos,
            DecodeError::Line {
                line,
                reason: reason.into(),
            },
        ));
    }

    fn line(&mut self, line_no: usize, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }
        if let Some(comment) = line.strip_prefix('#') {
            self.comment(line_no, comment);
            return;
        }

        let mut cursor = Cursor::new(line);
        let Some(name) = cursor.take_name(true) else {
            self.line_error(line_no, "expected metric name");
            return;
        };

        let (idx, role) = self.resolve(name);
        let builder = &mut self.families[idx];
        if builder.error.is_some() {
            return;
        }
        let result = parse_sample(&mut cursor).and_then(|sample| builder.add_sample(role, sample));
        if let Err(reason) = result {
            builder.fail(line_no, reason);
        }
    }

    fn comment(&mut self, line_no: usize, comment: &str) {
        let (keyword, rest) = split_token(comment);
        if keyword != "HELP" && keyword != "TYPE" {
            return;
        }

        let (name, rest) = split_token(rest);
        if Cursor::new(name).take_name(true) != Some(name) {
            self.line_error(line_no, format!("invalid metric name in {} line", keyword));
            return;
        }

        let builder = self.family_mut(name);
        if keyword == "HELP" {
            builder.family.help = Some(unescape_help(rest));
            return;
        }

        let ty = match rest.trim() {
            "counter" => MetricType::Counter,
            "gauge" => MetricType::Gauge,
            "summary" => MetricType::Summary,
            "histogram" => MetricType::Histogram,
            "gaugehistogram" => MetricType::GaugeHistogram,
            "untyped" | "unknown" => MetricType::Untyped,
            other => {
                builder.fail(line_no, format!("unknown metric type '{}'", other));
                return;
            }
        };
        if builder.declared || !builder.family.metric.is_empty() {
            builder.fail(line_no, "TYPE line after samples or a previous TYPE line");
            return;
        }
        builder.declared = true;
        builder.family.r#type = Some(ty as i32);
    }

    /// Map a sample name to the family it belongs to
    fn resolve(&mut self, name: &str) -> (usize, Role) {
        if let Some(&idx) = self.index.get(name) {
            return (idx, Role::Value);
        }

        for (suffix, role) in [
            ("_bucket", Role::Bucket),
            ("_sum", Role::Sum),
            ("_count", Role::Count),
        ] {
            let Some(base) = name.strip_suffix(suffix) else {
                continue;
            };
            if let Some(&idx) = self.index.get(base) {
                let ty = self.families[idx].family.metric_type();
                let fits = match ty {
                    MetricType::Histogram | MetricType::GaugeHistogram => true,
                    MetricType::Summary => role != Role::Bucket,
                    _ => false,
                };
                if fits {
                    return (idx, role);
                }
            }
        }

        self.family_mut(name);
        (self.families.len() - 1, Role::Value)
    }

    fn finish(self) -> Vec<Result<MetricFamily, DecodeError>> {
        let mut line_errors = self.line_errors.into_iter().peekable();
        let mut out = Vec::with_capacity(self.families.len());

        for (pos, builder) in self.families.into_iter().enumerate() {
            while let Some((_, err)) = line_errors.next_if(|(p, _)| *p <= pos) {
                out.push(Err(err));
            }
            out.push(match builder.error {
                Some(err) => Err(err),
                None => Ok(builder.family),
            });
        }
        out.extend(line_errors.map(|(_, err)| Err(err)));
        out
    }
}

struct ParsedSample {
    labels: Vec<(String, String)>,
    value: f64,
    timestamp_ms: Option<i64>,
}

fn parse_sample(cursor: &mut Cursor<'_>) -> Result<ParsedSample, String> {
    let labels = if cursor.peek() == Some('{') {
        cursor.bump();
        parse_labels(cursor)?
    } else {
        Vec::new()
    };

    let rest = cursor.rest();
    if !rest.starts_with([' ', '\t']) {
        return Err("expected whitespace before value".to_string());
    }

    let mut tokens = rest.split_whitespace();
    let value = tokens.next().ok_or("missing value")?;
    let value = parse_float(value).ok_or_else(|| format!("invalid value '{}'", value))?;
    let timestamp_ms = match tokens.next() {
        Some(ts) => Some(
            ts.parse::<i64>()
                .map_err(|_| format!("invalid timestamp '{}'", ts))?,
        ),
        None => None,
    };
    if tokens.next().is_some() {
        return Err("unexpected trailing data".to_string());
    }

    let mut sorted = labels.clone();
    sorted.sort();
    if sorted.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err("duplicate label name".to_string());
    }

    Ok(ParsedSample {
        labels: sorted,
        value,
        timestamp_ms,
    })
}

/// Parse `name="value",...}` with the opening brace already consumed
fn parse_labels(cursor: &mut Cursor<'_>) -> Result<Vec<(String, String)>, String> {
    let mut labels = Vec::new();
    loop {
        cursor.skip_ws();
        if cursor.peek() == Some('}') {
            cursor.bump();
            return Ok(labels);
        }

        let name = cursor.take_name(false).ok_or("expected label name")?;
        cursor.skip_ws();
        if cursor.bump() != Some('=') {
            return Err(format!("expected '=' after label '{}'", name));
        }
        cursor.skip_ws();
        if cursor.bump() != Some('"') {
            return Err(format!("expected '\"' to open value of label '{}'", name));
        }

        let mut value = String::new();
        loop {
            match cursor.bump() {
                Some('"') => break,
                Some('\\') => match cursor.bump() {
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some('n') => value.push('\n'),
                    Some(c) => return Err(format!("invalid escape sequence '\\{}'", c)),
                    None => return Err("unterminated label value".to_string()),
                },
                Some(c) => value.push(c),
                None => return Err("unterminated label value".to_string()),
            }
        }
        labels.push((name.to_string(), value));

        cursor.skip_ws();
        match cursor.bump() {
            Some(',') => continue,
            Some('}') => return Ok(labels),
            _ => return Err("expected ',' or '}' after label value".to_string()),
        }
    }
}

struct Cursor<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Self { s, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.s[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.bump();
        }
    }

    fn rest(&self) -> &'a str {
        &self.s[self.pos..]
    }

    /// Metric names also allow ':'; label names do not
    fn take_name(&mut self, metric: bool) -> Option<&'a str> {
        let start = self.pos;
        let valid = |c: char, first: bool| {
            c == '_'
                || c.is_ascii_alphabetic()
                || (metric && c == ':')
                || (!first && c.is_ascii_digit())
        };

        match self.peek() {
            Some(c) if valid(c, true) => {
                self.bump();
            }
            _ => return None,
        }
        while matches!(self.peek(), Some(c) if valid(c, false)) {
            self.bump();
        }
        Some(&self.s[start..self.pos])
    }
}

fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn unescape_help(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Float parsing with the exposition spellings of the special values
pub(crate) fn parse_float(s: &str) -> Option<f64> {
    match s {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => s.parse::<f64>().ok(),
    }
}

fn take_label(labels: &mut Vec<(String, String)>, name: &str) -> Option<String> {
    let pos = labels.iter().position(|(k, _)| k == name)?;
    Some(labels.remove(pos).1)
}

fn to_label_pairs(labels: Vec<(String, String)>) -> Vec<LabelPair> {
    labels
        .into_iter()
        .map(|(name, value)| LabelPair {
            name: Some(name),
            value: Some(value),
        })
        .collect()
}

fn plain_metric(labels: Vec<(String, String)>) -> Metric {
    Metric {
        label: to_label_pairs(labels),
        ..Default::default()
    }
}

fn set_timestamp(metric: &mut Metric, timestamp_ms: Option<i64>) {
    if timestamp_ms.is_some() {
        metric.timestamp_ms = timestamp_ms;
    }
}

fn type_name(ty: MetricType) -> &'static str {
    match ty {
        MetricType::Counter => "counter",
        MetricType::Gauge => "gauge",
        MetricType::Summary => "summary",
        MetricType::Untyped => "untyped",
        MetricType::Histogram => "histogram",
        MetricType::GaugeHistogram => "gaugehistogram",
    }
}
