use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const NAMESPACE: &str = "sre_performance";

/// Label names shared by every series, in `SeriesLabels` order.
pub const LABEL_NAMES: [&str; 2] = ["budget_name", "service_name"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Series {
    SliMeasurement,
    SloTarget,
    SloAvailable,
    SliValidEvents,
    SliGoodEvents,
    SliBadEvents,
    CalculationDuration,
    CalculationErrors,
}

/// How `observe` folds a value into a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    /// Value replaces the previous one
    Gauge,
    /// Value is added to the previous one, never reset
    IncrementingGauge,
    /// Value is recorded as one histogram observation
    Histogram,
}

impl Series {
    pub const ALL: [Series; 8] = [
        Series::SliMeasurement,
        Series::SloTarget,
        Series::SloAvailable,
        Series::SliValidEvents,
        Series::SliGoodEvents,
        Series::SliBadEvents,
        Series::CalculationDuration,
        Series::CalculationErrors,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Series::SliMeasurement => "sli_measurement",
            Series::SloTarget => "slo_target",
            Series::SloAvailable => "slo_budget_available",
            Series::SliValidEvents => "sli_valid_events",
            Series::SliGoodEvents => "sli_good_events",
            Series::SliBadEvents => "sli_bad_events",
            Series::CalculationDuration => "calculation_duration_seconds",
            Series::CalculationErrors => "calculation_errors",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Series::SliMeasurement => "SLI measurement",
            Series::SloTarget => "SLO targets",
            Series::SloAvailable => "SLO available budget",
            Series::SliValidEvents => "SLI valid events",
            Series::SliGoodEvents => "SLI good events",
            Series::SliBadEvents => "SLI bad events",
            Series::CalculationDuration => "duration of calculation",
            Series::CalculationErrors => "errors in calculations",
        }
    }

    pub fn kind(&self) -> SeriesKind {
        match self {
            Series::CalculationDuration => SeriesKind::Histogram,
            Series::CalculationErrors => SeriesKind::IncrementingGauge,
            _ => SeriesKind::Gauge,
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", NAMESPACE, self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesLabels<'a> {
    pub budget: &'a str,
    pub objective: &'a str,
}

impl<'a> SeriesLabels<'a> {
    pub fn new(budget: &'a str, objective: &'a str) -> Self {
        Self { budget, objective }
    }

    pub fn values(&self) -> [&'a str; 2] {
        [self.budget, self.objective]
    }
}

/// Destination for computed SLO series.
///
/// Implementations must tolerate concurrent calls from every budget worker.
pub trait MetricSink: Send + Sync {
    fn observe(&self, series: Series, labels: &SeriesLabels<'_>, value: f64);
}

pub type DynSink = Arc<dyn MetricSink>;
