use crate::{ui, CheckArgs};
use anyhow::{bail, Context, Result};
use futures::future::join_all;
use slo_core::Evaluator;
use slo_engine::{config::DEFAULT_INTERVAL_SECONDS, load_config_from_file, BudgetWorker};
use slo_metrics::{EvaluationSummary, ObjectiveStatus, RecordingSink};
use std::sync::Arc;
use tracing::info;

/// Runs a single tick for every budget against the live backend.
pub async fn execute(args: CheckArgs) -> Result<()> {
    let engine = load_config_from_file(&args.config)
        .await?
        .into_engine_config(DEFAULT_INTERVAL_SECONDS)
        .context("invalid configuration")?;

    let evaluator = Evaluator::new(Arc::new(args.backend.build()?));
    let recording = RecordingSink::new();

    let mut workers: Vec<BudgetWorker> = engine
        .budgets
        .iter()
        .cloned()
        .map(|budget| {
            BudgetWorker::new(budget, &engine, evaluator.clone(), Arc::new(recording.clone()))
        })
        .collect();

    info!(budgets = workers.len(), "Evaluating objectives once");

    join_all(workers.iter_mut().map(|worker| async move {
        worker.publish_targets();
        worker.tick().await
    }))
    .await;

    let summary = EvaluationSummary::from_recording(&recording);

    if args.json {
        println!("{}", summary.to_json()?);
    } else {
        ui::print_header("=== SLO Check ===");
        println!("{}", summary.to_table());

        let breached = summary.count(ObjectiveStatus::Breached);
        if breached > 0 {
            ui::print_warning(&format!("{} objective(s) below target", breached));
        }
    }

    let failed = summary.count(ObjectiveStatus::Failed);
    if failed > 0 {
        bail!("{} objective(s) could not be evaluated", failed);
    }

    if !args.json {
        ui::print_success("All objectives evaluated");
    }

    Ok(())
}
