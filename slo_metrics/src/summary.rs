use crate::recorder::RecordingSink;
use crate::sink::Series;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveStatus {
    Met,
    Breached,
    Failed,
}

impl std::fmt::Display for ObjectiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectiveStatus::Met => f.write_str("met"),
            ObjectiveStatus::Breached => f.write_str("breached"),
            ObjectiveStatus::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
pub struct SummaryRow {
    #[tabled(rename = "Budget")]
    pub budget: String,
    #[tabled(rename = "Objective")]
    pub objective: String,
    #[tabled(rename = "Target", display_with = "display_option")]
    pub target: Option<f64>,
    #[tabled(rename = "SLI", display_with = "display_option")]
    pub sli: Option<f64>,
    #[tabled(rename = "Good", display_with = "display_count")]
    pub good: Option<f64>,
    #[tabled(rename = "Bad", display_with = "display_count")]
    pub bad: Option<f64>,
    #[tabled(rename = "Valid", display_with = "display_count")]
    pub valid: Option<f64>,
    #[tabled(rename = "Budget left", display_with = "display_option")]
    pub available: Option<f64>,
    #[tabled(rename = "Errors")]
    pub errors: u64,
    #[tabled(rename = "Status")]
    pub status: ObjectiveStatus,
}

/// Snapshot of the latest published values per `(budget, objective)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub rows: Vec<SummaryRow>,
}

impl EvaluationSummary {
    pub fn from_recording(sink: &RecordingSink) -> Self {
        let rows = sink
            .label_pairs()
            .into_iter()
            .map(|(budget, objective)| {
                let latest = |series| sink.latest(series, &budget, &objective);

                let target = latest(Series::SloTarget);
                let sli = latest(Series::SliMeasurement);
                // an undefined (NaN) SLI never counts as met
                let status = match (sli, target) {
                    (None, _) => ObjectiveStatus::Failed,
                    (Some(sli), Some(target)) if sli >= target => ObjectiveStatus::Met,
                    (Some(_), Some(_)) => ObjectiveStatus::Breached,
                    (Some(_), None) => ObjectiveStatus::Met,
                };

                SummaryRow {
                    target,
                    sli,
                    good: latest(Series::SliGoodEvents),
                    bad: latest(Series::SliBadEvents),
                    valid: latest(Series::SliValidEvents),
                    available: latest(Series::SloAvailable),
                    errors: sink.total(Series::CalculationErrors, &budget, &objective) as u64,
                    status,
                    budget,
                    objective,
                }
            })
            .collect();

        Self { rows }
    }

    pub fn count(&self, status: ObjectiveStatus) -> usize {
        self.rows.iter().filter(|row| row.status == status).count()
    }

    pub fn to_table(&self) -> String {
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn display_option(value: &Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.6}", v),
        None => "-".to_string(),
    }
}

fn display_count(value: &Option<f64>) -> String {
    match value {
        Some(v) => format!("{}", v.trunc() as i64),
        None => "-".to_string(),
    }
}
