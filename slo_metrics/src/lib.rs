pub mod sink;
pub mod registry;
pub mod recorder;
pub mod summary;

pub use sink::{DynSink, MetricSink, Series, SeriesKind, SeriesLabels};
pub use registry::PrometheusSink;
pub use recorder::{Observation, RecordingSink};
pub use summary::{EvaluationSummary, ObjectiveStatus, SummaryRow};
