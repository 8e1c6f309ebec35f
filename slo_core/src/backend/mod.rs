pub mod prometheus;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use prometheus::{PrometheusBackend, PrometheusConfig};

/// One element of an instant vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    /// Unix seconds
    pub timestamp: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(value: f64) -> Self {
        Self {
            labels: BTreeMap::new(),
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            value,
        }
    }
}

/// Time-series backend able to run instant queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Evaluate `expr` at the current time and return the instant vector
    async fn query(&self, expr: &str) -> Result<Vec<Sample>>;

    /// Get the name of this backend
    fn name(&self) -> &str;
}

pub type DynBackend = Arc<dyn QueryBackend>;
