use crate::scheduler::RetryPolicy;
use serde::{Deserialize, Serialize};
use slo_core::{Budget, Objective, SloError, MAX_CALCULATION_DURATION};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_INTERVAL_SECONDS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("At least one budget must be configured")]
    NoBudgets,

    #[error("At least one service level objective must be configured")]
    NoObjectives,

    #[error("Duplicate budget name '{0}'")]
    DuplicateBudget(String),

    #[error("Duplicate objective name '{0}'")]
    DuplicateObjective(String),

    #[error("Interval must be > 0 seconds")]
    ZeroInterval,

    #[error(transparent)]
    Invalid(#[from] SloError),
}

/// Contents of the configuration file.
///
/// Keys follow the lowercase form (`windowseconds`,
/// `servicelevelobjectives`); snake_case aliases are accepted as well.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct ExporterConfig {
    #[serde(default)]
    pub budgets: Vec<Budget>,
    #[serde(default, alias = "service_level_objectives", alias = "objectives")]
    pub servicelevelobjectives: Vec<Objective>,
    #[serde(default, alias = "interval_seconds", skip_serializing_if = "Option::is_none")]
    pub intervalseconds: Option<u64>,
    #[serde(
        with = "humantime_serde_option",
        default,
        alias = "retry_backoff",
        skip_serializing_if = "Option::is_none"
    )]
    pub retrybackoff: Option<Duration>,
    #[serde(
        with = "humantime_serde_option",
        default,
        alias = "graceful_shutdown_period",
        skip_serializing_if = "Option::is_none"
    )]
    pub gracefulshutdownperiod: Option<Duration>,
}

impl ExporterConfig {
    pub fn builder() -> ExporterConfigBuilder {
        ExporterConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budgets.is_empty() {
            return Err(ConfigError::NoBudgets);
        }

        if self.servicelevelobjectives.is_empty() {
            return Err(ConfigError::NoObjectives);
        }

        if self.intervalseconds == Some(0) {
            return Err(ConfigError::ZeroInterval);
        }

        let mut budget_names = HashSet::new();
        for budget in &self.budgets {
            budget.validate()?;
            if !budget_names.insert(budget.name.as_str()) {
                return Err(ConfigError::DuplicateBudget(budget.name.clone()));
            }
        }

        let mut objective_names = HashSet::new();
        for objective in &self.servicelevelobjectives {
            if !objective_names.insert(objective.name.as_str()) {
                return Err(ConfigError::DuplicateObjective(objective.name.clone()));
            }
        }

        Ok(())
    }

    /// Resolves file overrides against command-line defaults.
    pub fn into_engine_config(self, default_interval_seconds: u64) -> Result<EngineConfig, ConfigError> {
        self.validate()?;

        let interval_seconds = self.intervalseconds.unwrap_or(default_interval_seconds);
        if interval_seconds == 0 {
            return Err(ConfigError::ZeroInterval);
        }

        let mut retry = RetryPolicy::default();
        if let Some(backoff) = self.retrybackoff {
            retry.max_backoff = backoff;
        }

        Ok(EngineConfig {
            budgets: self.budgets,
            objectives: self.servicelevelobjectives.into(),
            interval: Duration::from_secs(interval_seconds),
            retry,
            max_calculation: MAX_CALCULATION_DURATION,
        })
    }
}

/// Validated runtime configuration, built once at startup and shared by
/// every budget worker.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub budgets: Vec<Budget>,
    pub objectives: Arc<[Objective]>,
    /// Configured tick interval before capping by each budget window
    pub interval: Duration,
    pub retry: RetryPolicy,
    pub max_calculation: Duration,
}

#[derive(Default)]
pub struct ExporterConfigBuilder {
    budgets: Vec<Budget>,
    objectives: Vec<Objective>,
    interval_seconds: Option<u64>,
    retry_backoff: Option<Duration>,
}

impl ExporterConfigBuilder {
    pub fn budget(mut self, budget: Budget) -> Self {
        self.budgets.push(budget);
        self
    }

    pub fn objective(mut self, objective: Objective) -> Self {
        self.objectives.push(objective);
        self
    }

    pub fn interval_seconds(mut self, seconds: u64) -> Self {
        self.interval_seconds = Some(seconds);
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = Some(backoff);
        self
    }

    pub fn build(self) -> ExporterConfig {
        ExporterConfig {
            budgets: self.budgets,
            servicelevelobjectives: self.objectives,
            intervalseconds: self.interval_seconds,
            retrybackoff: self.retry_backoff,
            gracefulshutdownperiod: None,
        }
    }
}

mod humantime_serde_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<String>::deserialize(deserializer)?;
        opt.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
