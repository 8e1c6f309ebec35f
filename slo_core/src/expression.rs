//! PromQL construction for each SLI strategy.
//!
//! All rendering is plain text substitution. Selectors are not parsed, so a
//! malformed selector yields a malformed query that the backend rejects.

use crate::objective::{Budget, Strategy};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

const WINDOW_PLACEHOLDER: &str = "[window]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStage {
    Expression,
    Good,
    Valid,
    Ratio,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryStage::Expression => "expression",
            QueryStage::Good => "good",
            QueryStage::Valid => "valid",
            QueryStage::Ratio => "ratio",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedQuery {
    pub stage: QueryStage,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionSli {
    #[serde(rename = "query", alias = "query_template")]
    pub query_template: String,
}

impl ExpressionSli {
    pub fn new(query_template: impl Into<String>) -> Self {
        Self {
            query_template: query_template.into(),
        }
    }

    pub fn render(&self, budget: &Budget) -> String {
        self.query_template
            .replace(WINDOW_PLACEHOLDER, &budget.window_clause())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodBadRatio {
    #[serde(rename = "good", alias = "good_query")]
    pub good_query: String,
    #[serde(rename = "valid", alias = "valid_query")]
    pub valid_query: String,
}

impl GoodBadRatio {
    pub fn new(good_query: impl Into<String>, valid_query: impl Into<String>) -> Self {
        Self {
            good_query: good_query.into(),
            valid_query: valid_query.into(),
        }
    }

    pub fn render_good(&self, budget: &Budget) -> String {
        increase_over_window(&self.good_query, budget)
    }

    pub fn render_valid(&self, budget: &Budget) -> String {
        increase_over_window(&self.valid_query, budget)
    }

    pub fn render_ratio(&self, budget: &Budget) -> String {
        format!("{}/{}", self.render_good(budget), self.render_valid(budget))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionCut {
    #[serde(rename = "bucket", alias = "bucket_selector")]
    pub bucket_selector: String,
    /// Exact `le` label value, e.g. `"0.5"`
    #[serde(deserialize_with = "threshold_label")]
    pub threshold: String,
}

impl DistributionCut {
    pub fn new(bucket_selector: impl Into<String>, threshold: impl Into<String>) -> Self {
        Self {
            bucket_selector: bucket_selector.into(),
            threshold: threshold.into(),
        }
    }

    /// Adds `le="<threshold>"` to the last label matcher block.
    pub fn render_good(&self, budget: &Budget) -> String {
        let query = increase_over_window(&self.bucket_selector, budget);

        match query.rfind('}') {
            Some(pos) => format!(
                "{}, le=\"{}\"{}",
                &query[..pos],
                self.threshold,
                &query[pos..]
            ),
            None => query,
        }
    }

    /// Swaps the histogram `_bucket` series for its `_count` sibling.
    pub fn render_valid(&self, budget: &Budget) -> String {
        increase_over_window(&self.bucket_selector, budget).replacen("_bucket{", "_count{", 1)
    }

    pub fn render_ratio(&self, budget: &Budget) -> String {
        format!("{}/{}", self.render_good(budget), self.render_valid(budget))
    }
}

impl Strategy {
    /// Every query this strategy may send for `budget`, in evaluation order.
    pub fn rendered_queries(&self, budget: &Budget) -> Vec<RenderedQuery> {
        let rendered = |stage, query| RenderedQuery { stage, query };

        match self {
            Strategy::Expression(expression) => {
                vec![rendered(QueryStage::Expression, expression.render(budget))]
            }
            Strategy::GoodBadRatio(ratio) => vec![
                rendered(QueryStage::Good, ratio.render_good(budget)),
                rendered(QueryStage::Valid, ratio.render_valid(budget)),
                rendered(QueryStage::Ratio, ratio.render_ratio(budget)),
            ],
            Strategy::DistributionCut(cut) => vec![
                rendered(QueryStage::Valid, cut.render_valid(budget)),
                rendered(QueryStage::Good, cut.render_good(budget)),
                rendered(QueryStage::Ratio, cut.render_ratio(budget)),
            ],
        }
    }
}

fn increase_over_window(selector: &str, budget: &Budget) -> String {
    format!("sum(increase({}{}))", selector, budget.window_clause())
}

/// Accepts the threshold either as a string or as a bare YAML/JSON number.
fn threshold_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Threshold {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Threshold::deserialize(deserializer)? {
        Threshold::Text(text) => text,
        Threshold::Integer(value) => value.to_string(),
        Threshold::Float(value) => value.to_string(),
    })
}
