use crate::error::{Result, SloError};
use crate::expression::{DistributionCut, ExpressionSli, GoodBadRatio};
use serde::{Deserialize, Serialize};

/// Error-budget tracking window, e.g. 28 days.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub struct Budget {
    pub name: String,
    #[serde(alias = "window_seconds")]
    pub windowseconds: u64,
}

impl Budget {
    pub fn new(name: impl Into<String>, window_seconds: u64) -> Result<Self> {
        let budget = Self {
            name: name.into(),
            windowseconds: window_seconds,
        };
        budget.validate()?;
        Ok(budget)
    }

    pub fn window_seconds(&self) -> u64 {
        self.windowseconds
    }

    /// PromQL range selector covering the whole budget window, `[<n>s]`.
    pub fn window_clause(&self) -> String {
        format!("[{}s]", self.windowseconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SloError::InvalidConfig("Budget name cannot be empty".to_string()));
        }

        if self.windowseconds == 0 {
            return Err(SloError::InvalidConfig(format!(
                "Budget '{}' window must be > 0 seconds",
                self.name
            )));
        }

        Ok(())
    }
}

/// How an objective's SLI is computed.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Raw PromQL expression with a `[window]` placeholder
    Expression(ExpressionSli),

    /// Ratio of good events to valid events
    GoodBadRatio(GoodBadRatio),

    /// Share of histogram observations at or below a bucket threshold
    DistributionCut(DistributionCut),
}

impl Strategy {
    pub fn kind(&self) -> &'static str {
        match self {
            Strategy::Expression(_) => "expression",
            Strategy::GoodBadRatio(_) => "good_bad_ratio",
            Strategy::DistributionCut(_) => "distribution_cut",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ObjectiveSpec", into = "ObjectiveSpec")]
pub struct Objective {
    pub name: String,
    pub goal: f64,
    pub strategy: Strategy,
}

impl Objective {
    pub fn new(name: impl Into<String>, goal: f64, strategy: Strategy) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(SloError::InvalidConfig("Objective name cannot be empty".to_string()));
        }

        // also rejects NaN
        if !(goal > 0.0 && goal <= 1.0) {
            return Err(SloError::InvalidConfig(format!(
                "Objective '{}' goal must be in (0, 1], got {}",
                name, goal
            )));
        }

        Ok(Self {
            name,
            goal,
            strategy,
        })
    }

    pub fn expression(name: impl Into<String>, goal: f64, query: impl Into<String>) -> Result<Self> {
        Self::new(name, goal, Strategy::Expression(ExpressionSli::new(query)))
    }

    pub fn good_bad_ratio(
        name: impl Into<String>,
        goal: f64,
        good: impl Into<String>,
        valid: impl Into<String>,
    ) -> Result<Self> {
        Self::new(name, goal, Strategy::GoodBadRatio(GoodBadRatio::new(good, valid)))
    }

    pub fn distribution_cut(
        name: impl Into<String>,
        goal: f64,
        bucket: impl Into<String>,
        threshold: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            name,
            goal,
            Strategy::DistributionCut(DistributionCut::new(bucket, threshold)),
        )
    }
}

/// On-disk shape of an objective: one optional block per strategy, exactly
/// one of which must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct ObjectiveSpec {
    pub name: String,
    pub goal: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<ExpressionSli>,
    #[serde(default, alias = "good_bad_ratio", skip_serializing_if = "Option::is_none")]
    pub goodbadratio: Option<GoodBadRatio>,
    #[serde(default, alias = "distribution_cut", skip_serializing_if = "Option::is_none")]
    pub distributioncut: Option<DistributionCut>,
}

impl ObjectiveSpec {
    pub fn to_strategy(&self) -> Result<Strategy> {
        let mut strategies = Vec::new();

        if let Some(expression) = &self.expression {
            strategies.push(Strategy::Expression(expression.clone()));
        }
        if let Some(ratio) = &self.goodbadratio {
            strategies.push(Strategy::GoodBadRatio(ratio.clone()));
        }
        if let Some(cut) = &self.distributioncut {
            strategies.push(Strategy::DistributionCut(cut.clone()));
        }

        match strategies.len() {
            1 => Ok(strategies.remove(0)),
            0 => Err(SloError::InvalidConfig(format!(
                "Objective '{}' has no calculation strategy (expression, goodbadratio or distributioncut)",
                self.name
            ))),
            _ => Err(SloError::InvalidConfig(format!(
                "Objective '{}' must set exactly one calculation strategy, found {}",
                self.name,
                strategies.len()
            ))),
        }
    }
}

impl TryFrom<ObjectiveSpec> for Objective {
    type Error = SloError;

    fn try_from(spec: ObjectiveSpec) -> Result<Self> {
        let strategy = spec.to_strategy()?;
        Objective::new(spec.name, spec.goal, strategy)
    }
}

impl From<Objective> for ObjectiveSpec {
    fn from(objective: Objective) -> Self {
        let mut spec = ObjectiveSpec {
            name: objective.name,
            goal: objective.goal,
            ..Default::default()
        };

        match objective.strategy {
            Strategy::Expression(expression) => spec.expression = Some(expression),
            Strategy::GoodBadRatio(ratio) => spec.goodbadratio = Some(ratio),
            Strategy::DistributionCut(cut) => spec.distributioncut = Some(cut),
        }

        spec
    }
}
