use crate::{
    config::ScanConfig,
    equation_engine::CompiledExpression,
    events::{elapsed_ms, AnalysisEvent, EventContext, EventLevel, EventSink, NullSink},
    normalize::{normalize, NormalizedExpression, Rejection},
    scan::{find_extrema, find_inflections, find_zeros, Extrema, Point},
    traits::RealFunction,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Colors handed to overlay expressions that did not bring their own.
pub const OVERLAY_PALETTE: [&str; 6] = [
    "#007bff", "#dc3545", "#28a745", "#fd7e14", "#6f42c1", "#17a2b8",
];

pub fn palette_color(index: usize) -> &'static str {
    OVERLAY_PALETTE[index % OVERLAY_PALETTE.len()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionInput {
    pub text: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl ExpressionInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Features of one expression over the configured domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Text as entered.
    pub expression: String,
    pub canonical: String,
    /// `f(0)`, if defined.
    pub y_intercept: Option<f64>,
    pub zeros: Vec<f64>,
    pub maxima: Vec<Point>,
    pub minima: Vec<Point>,
    pub inflections: Vec<Point>,
    pub color: Option<String>,
}

impl AnalysisRecord {
    fn empty(normalized: NormalizedExpression, color: Option<String>) -> Self {
        Self {
            expression: normalized.original,
            canonical: normalized.canonical,
            y_intercept: None,
            zeros: Vec::new(),
            maxima: Vec::new(),
            minima: Vec::new(),
            inflections: Vec::new(),
            color,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("invalid expression '{expression}': {rejection}")]
    InvalidExpression {
        expression: String,
        rejection: Rejection,
    },
    #[error("invalid expressions in batch: {}", offenders.join(", "))]
    InvalidBatch { offenders: Vec<String> },
}

/// Runs normalization and the scanner passes, reporting progress to `S`.
#[derive(Debug, Clone)]
pub struct Analyzer<S = NullSink> {
    config: ScanConfig,
    sink: S,
}

impl Analyzer<NullSink> {
    pub fn new(config: ScanConfig) -> Self {
        Self::with_sink(config, NullSink)
    }
}

impl Default for Analyzer<NullSink> {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}

impl<S: EventSink> Analyzer<S> {
    /// `config` is used as given; callers taking it from outside should run
    /// [`ScanConfig::validate`] first.
    pub fn with_sink(config: ScanConfig, sink: S) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn analyze(&self, input: &ExpressionInput) -> Result<AnalysisRecord, AnalysisError> {
        let normalized = normalize(&input.text);
        if let Some(rejection) = normalized.rejection.clone() {
            self.report_rejection(&normalized, &rejection, "analysis");
            return Err(AnalysisError::InvalidExpression {
                expression: normalized.original,
                rejection,
            });
        }
        Ok(self.scan(normalized, input.color.clone(), "analysis"))
    }

    /// Analyzes several expressions for an overlay plot.
    ///
    /// Nothing is scanned unless every input is valid. Records follow input
    /// order and each carries a color, taken from the palette by position
    /// when the input has none.
    pub fn analyze_batch(
        &self,
        inputs: &[ExpressionInput],
    ) -> Result<Vec<AnalysisRecord>, AnalysisError> {
        let started = Utc::now();
        let normalized: Vec<NormalizedExpression> =
            inputs.iter().map(|input| normalize(&input.text)).collect();

        let mut offenders = Vec::new();
        for expression in &normalized {
            if let Some(rejection) = &expression.rejection {
                self.report_rejection(expression, rejection, "batch");
                offenders.push(expression.original.clone());
            }
        }
        if !offenders.is_empty() {
            self.sink.emit(
                AnalysisEvent::new(
                    EventLevel::Warning,
                    "batch rejected",
                    "analyze_batch",
                    "batch",
                )
                .with_context(EventContext {
                    batch_size: Some(inputs.len()),
                    found: Some(offenders.len()),
                    reason: Some(offenders.join(", ")),
                    ..EventContext::default()
                }),
            );
            return Err(AnalysisError::InvalidBatch { offenders });
        }

        let records: Vec<AnalysisRecord> = normalized
            .into_iter()
            .zip(inputs)
            .enumerate()
            .map(|(index, (expression, input))| {
                let color = input
                    .color
                    .clone()
                    .unwrap_or_else(|| palette_color(index).to_string());
                self.scan(expression, Some(color), "batch")
            })
            .collect();

        self.sink.emit(
            AnalysisEvent::new(EventLevel::Info, "batch analyzed", "analyze_batch", "batch")
                .with_context(EventContext {
                    batch_size: Some(records.len()),
                    duration_ms: Some(elapsed_ms(started)),
                    ..EventContext::default()
                }),
        );
        Ok(records)
    }

    fn scan(
        &self,
        normalized: NormalizedExpression,
        color: Option<String>,
        mode: &str,
    ) -> AnalysisRecord {
        let started = Utc::now();
        let compiled = match CompiledExpression::compile(&normalized.canonical) {
            Ok(compiled) => compiled,
            Err(err) => {
                log::warn!("could not parse '{}': {}", normalized.canonical, err);
                self.sink.emit(
                    AnalysisEvent::new(
                        EventLevel::Warning,
                        "expression could not be parsed",
                        "compile",
                        mode,
                    )
                    .with_context(EventContext {
                        expression: Some(normalized.original.clone()),
                        canonical: Some(normalized.canonical.clone()),
                        reason: Some(err.to_string()),
                        ..EventContext::default()
                    }),
                );
                return AnalysisRecord::empty(normalized, color);
            }
        };

        let config = &self.config;
        let mut record = AnalysisRecord::empty(normalized, color);
        record.y_intercept = compiled.value_at(0.0);
        record.zeros = self.run_pass("find_zeros", mode, config.zero_step, Vec::len, || {
            find_zeros(&compiled, config)
        });
        let extrema = self.run_pass(
            "find_extrema",
            mode,
            config.extrema_step,
            |extrema: &Extrema| extrema.maxima.len() + extrema.minima.len(),
            || find_extrema(&compiled, config),
        );
        record.maxima = extrema.maxima;
        record.minima = extrema.minima;
        record.inflections = self.run_pass(
            "find_inflections",
            mode,
            config.inflection_step,
            Vec::len,
            || find_inflections(&compiled, config),
        );

        self.sink.emit(
            AnalysisEvent::new(EventLevel::Info, "analysis finished", "analyze", mode)
                .with_context(EventContext {
                    expression: Some(record.expression.clone()),
                    canonical: Some(record.canonical.clone()),
                    duration_ms: Some(elapsed_ms(started)),
                    value: record.y_intercept,
                    ..EventContext::default()
                }),
        );
        record
    }

    fn run_pass<T>(
        &self,
        function: &str,
        mode: &str,
        step: f64,
        found: impl FnOnce(&T) -> usize,
        pass: impl FnOnce() -> T,
    ) -> T {
        let started = Utc::now();
        let result = pass();
        self.sink.emit(
            AnalysisEvent::new(EventLevel::Debug, "scan pass finished", function, mode)
                .with_context(EventContext {
                    samples: Some(self.config.sweep(step).count()),
                    found: Some(found(&result)),
                    duration_ms: Some(elapsed_ms(started)),
                    ..EventContext::default()
                }),
        );
        result
    }

    fn report_rejection(&self, normalized: &NormalizedExpression, rejection: &Rejection, mode: &str) {
        log::debug!("rejected '{}': {}", normalized.original, rejection);
        self.sink.emit(
            AnalysisEvent::new(EventLevel::Warning, "expression rejected", "normalize", mode)
                .with_context(EventContext {
                    expression: Some(normalized.original.clone()),
                    canonical: Some(normalized.canonical.clone()),
                    reason: Some(rejection.to_string()),
                    ..EventContext::default()
                }),
        );
    }
}
