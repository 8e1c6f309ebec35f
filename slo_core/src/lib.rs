pub mod backend;
pub mod objective;
pub mod expression;
pub mod calculation;
pub mod evaluator;
pub mod error;

pub use backend::{DynBackend, QueryBackend, Sample};
pub use objective::{Budget, Objective, ObjectiveSpec, Strategy};
pub use expression::{DistributionCut, ExpressionSli, GoodBadRatio, QueryStage, RenderedQuery};
pub use calculation::Calculation;
pub use evaluator::{Evaluator, MAX_CALCULATION_DURATION};
pub use error::{Result, SloError};

// Re-export commonly used types
pub use async_trait::async_trait;
