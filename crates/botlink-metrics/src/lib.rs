//! Metrics infrastructure for the botlink stack.
//!
//! This crate declares every metric emitted by the frame assembler, the
//! overwrite queues and the script client as structured [`Metric`] constants,
//! and re-exports the `metrics` crate so callers record through one facade.
//!
//! # Example
//!
//! ```rust,ignore
//! use botlink_metrics::{describe_metrics, metric_defs};
//!
//! // Initialize metric descriptions at startup
//! describe_metrics();
//!
//! metrics::counter!(metric_defs::FRAMES_ASSEMBLED.name, "kind" => "length_prefixed").increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use botlink_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const FRAMES: Metric = Metric::counter("botlink.test.frames")
///     .with_description("Frames seen")
///     .with_unit(Unit::Count)
///     .with_labels(&["kind"]);
///
/// assert_eq!(FRAMES.name, "botlink.test.frames");
/// assert_eq!(FRAMES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "botlink.frame.assembled").
    pub name: &'static str,
    /// The kind of metric (counter, gauge, histogram).
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    ///
    /// This should be called once at startup for each metric.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the link stack.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Frame Assembly
    // ========================================================================

    /// Complete, validated frames emitted by an assembler.
    ///
    /// Labels: kind
    pub const FRAMES_ASSEMBLED: Metric = Metric::counter("botlink.frame.assembled")
        .with_description("Validated frames emitted by the frame assembler")
        .with_unit(Unit::Count)
        .with_labels(&["kind"]);

    /// In-progress accumulations discarded by an assembler.
    ///
    /// Labels: reason (header_checksum, body_checksum, bad_tail, overflow, unknown_layout)
    pub const FRAMES_DROPPED: Metric = Metric::counter("botlink.frame.dropped")
        .with_description("Partial frames discarded by the frame assembler")
        .with_unit(Unit::Count)
        .with_labels(&["reason"]);

    /// Retained input trimmed because an assembler fell behind its transport.
    pub const INPUT_TRIMMED: Metric = Metric::counter("botlink.frame.input_trimmed_bytes")
        .with_description("Retained input bytes trimmed by the frame assembler")
        .with_unit(Unit::Bytes);

    /// Size of length-prefixed frames produced by the encoder.
    pub const FRAME_ENCODED_SIZE: Metric = Metric::histogram("botlink.frame.encoded_size_bytes")
        .with_description("Size of encoded length-prefixed frames")
        .with_unit(Unit::Bytes);

    // ========================================================================
    // Queues
    // ========================================================================

    /// Times an overwrite queue was cleared because it was full.
    ///
    /// Labels: queue (rx, tx)
    pub const QUEUE_OVERFLOWS: Metric = Metric::counter("botlink.queue.overflows")
        .with_description("Overwrite queue clears caused by a full queue")
        .with_unit(Unit::Count)
        .with_labels(&["queue"]);

    /// Items currently held by an overwrite queue.
    ///
    /// Labels: queue (rx, tx)
    pub const QUEUE_DEPTH: Metric = Metric::gauge("botlink.queue.depth")
        .with_description("Items held by an overwrite queue")
        .with_unit(Unit::Count)
        .with_labels(&["queue"]);

    // ========================================================================
    // Script Protocol
    // ========================================================================

    /// Script requests sent.
    ///
    /// Labels: service (notify, request)
    pub const SCRIPT_REQUESTS: Metric = Metric::counter("botlink.script.requests")
        .with_description("Script commands handed to the transport")
        .with_unit(Unit::Count)
        .with_labels(&["service"]);

    /// Script requests retransmitted after a reply timeout.
    pub const SCRIPT_RETRANSMISSIONS: Metric = Metric::counter("botlink.script.retransmissions")
        .with_description("Script requests retransmitted after a reply timeout")
        .with_unit(Unit::Count);

    /// Script requests that exhausted every attempt without a reply.
    pub const SCRIPT_EXHAUSTED: Metric = Metric::counter("botlink.script.exhausted")
        .with_description("Script requests that received no reply after all attempts")
        .with_unit(Unit::Count);

    /// Time from first transmission to a decoded reply.
    pub const SCRIPT_ROUND_TRIP: Metric = Metric::histogram("botlink.script.round_trip_ms")
        .with_description("Script request round-trip time in milliseconds")
        .with_unit(Unit::Milliseconds);

    /// All metric definitions.
    pub const ALL: &[&Metric] = &[
        &FRAMES_ASSEMBLED,
        &FRAMES_DROPPED,
        &INPUT_TRIMMED,
        &FRAME_ENCODED_SIZE,
        &QUEUE_OVERFLOWS,
        &QUEUE_DEPTH,
        &SCRIPT_REQUESTS,
        &SCRIPT_RETRANSMISSIONS,
        &SCRIPT_EXHAUSTED,
        &SCRIPT_ROUND_TRIP,
    ];
}

/// Registers descriptions for every metric in [`metric_defs::ALL`].
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
