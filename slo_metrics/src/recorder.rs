use crate::sink::{MetricSink, Series, SeriesLabels};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub series: Series,
    pub budget: String,
    pub objective: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// In-memory sink keeping every observation in arrival order.
///
/// Clones share the same buffer, so a clone handed to a worker can be
/// inspected afterwards through any other handle.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    observations: Arc<RwLock<Vec<Observation>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent value for one series and label pair.
    pub fn latest(&self, series: Series, budget: &str, objective: &str) -> Option<f64> {
        self.read()
            .iter()
            .rev()
            .find(|o| o.series == series && o.budget == budget && o.objective == objective)
            .map(|o| o.value)
    }

    pub fn count(&self, series: Series, budget: &str, objective: &str) -> usize {
        self.read()
            .iter()
            .filter(|o| o.series == series && o.budget == budget && o.objective == objective)
            .count()
    }

    /// Sum of all values recorded for one series and label pair.
    pub fn total(&self, series: Series, budget: &str, objective: &str) -> f64 {
        self.read()
            .iter()
            .filter(|o| o.series == series && o.budget == budget && o.objective == objective)
            .map(|o| o.value)
            .sum()
    }

    /// Distinct `(budget, objective)` pairs in first-seen order.
    pub fn label_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();

        for observation in self.read().iter() {
            let seen = pairs
                .iter()
                .any(|(b, o)| *b == observation.budget && *o == observation.objective);
            if !seen {
                pairs.push((observation.budget.clone(), observation.objective.clone()));
            }
        }

        pairs
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    // a panicking writer cannot leave a half-pushed Vec behind
    fn read(&self) -> RwLockReadGuard<'_, Vec<Observation>> {
        self.observations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Observation>> {
        self.observations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MetricSink for RecordingSink {
    fn observe(&self, series: Series, labels: &SeriesLabels<'_>, value: f64) {
        self.write().push(Observation {
            series,
            budget: labels.budget.to_string(),
            objective: labels.objective.to_string(),
            value,
            timestamp: Utc::now(),
        });
    }
}
