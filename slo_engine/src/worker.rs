use crate::{
    config::EngineConfig,
    scheduler::{RetryPolicy, Scheduler},
};
use slo_core::{Budget, Calculation, Evaluator, Objective};
use slo_metrics::{DynSink, Series, SeriesLabels};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Evaluates every objective against one budget, tick after tick.
pub struct BudgetWorker {
    budget: Budget,
    objectives: Arc<[Objective]>,
    evaluator: Evaluator,
    sink: DynSink,
    scheduler: Scheduler,
    max_calculation: Duration,
}

/// Outcome of one pass over the objectives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub published: usize,
    pub abandoned: usize,
}

impl BudgetWorker {
    pub fn new(
        budget: Budget,
        config: &EngineConfig,
        evaluator: Evaluator,
        sink: DynSink,
    ) -> Self {
        let scheduler = Scheduler::for_budget(config.interval, &budget, config.retry);

        Self {
            budget,
            objectives: Arc::clone(&config.objectives),
            evaluator,
            sink,
            scheduler,
            max_calculation: config.max_calculation,
        }
    }

    pub fn interval(&self) -> Duration {
        self.scheduler.interval()
    }

    /// Runs until `cancel` fires. Cancellation is honoured between ticks
    /// only; an evaluation in flight finishes or hits its deadline first.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            budget = %self.budget.name,
            interval = ?self.interval(),
            objectives = self.objectives.len(),
            "Starting worker"
        );

        self.publish_targets();

        loop {
            if cancel.is_cancelled() {
                info!(budget = %self.budget.name, "Worker stopped");
                return;
            }

            let report = self.tick().await;
            debug!(
                budget = %self.budget.name,
                published = report.published,
                abandoned = report.abandoned,
                "Tick complete"
            );

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.interval()) => {}
            }
        }
    }

    pub fn publish_targets(&self) {
        for objective in self.objectives.iter() {
            let labels = SeriesLabels::new(&self.budget.name, &objective.name);
            self.sink.observe(Series::SloTarget, &labels, objective.goal);
        }
    }

    /// One sequential pass; a failing objective never blocks the others.
    pub async fn tick(&mut self) -> TickReport {
        let objectives = Arc::clone(&self.objectives);
        let mut report = TickReport::default();

        for objective in objectives.iter() {
            match self.evaluate_objective(objective).await {
                Some(_) => report.published += 1,
                None => report.abandoned += 1,
            }
        }

        report
    }

    /// Evaluates with retries and publishes on success. Returns `None` when
    /// the objective was abandoned for this tick.
    pub async fn evaluate_objective(&mut self, objective: &Objective) -> Option<Calculation> {
        let started = Instant::now();
        let deadline = started + self.max_calculation;
        let policy: RetryPolicy = *self.scheduler.retry_policy();
        let mut attempt: u32 = 0;

        let calculation = loop {
            attempt += 1;

            let err = match self
                .evaluator
                .evaluate(&self.budget, objective, deadline)
                .await
            {
                Ok(calculation) => break calculation,
                Err(err) => err,
            };

            error!(
                budget = %self.budget.name,
                objective = %objective.name,
                attempt,
                error = %err,
                "Error in calculation"
            );
            self.sink.observe(
                Series::CalculationErrors,
                &SeriesLabels::new(&self.budget.name, &objective.name),
                1.0,
            );

            if !policy.should_retry(attempt, &err) {
                warn!(
                    budget = %self.budget.name,
                    objective = %objective.name,
                    attempts = attempt,
                    retryable = err.is_retryable(),
                    "Giving up on objective until next tick"
                );
                return None;
            }

            tokio::time::sleep(self.scheduler.next_backoff()).await;
        };

        self.publish(objective, &calculation, started.elapsed());

        Some(calculation)
    }

    fn publish(&self, objective: &Objective, calculation: &Calculation, elapsed: Duration) {
        let labels = SeriesLabels::new(&self.budget.name, &objective.name);

        self.sink.observe(Series::SliMeasurement, &labels, calculation.result());
        self.sink.observe(Series::SliGoodEvents, &labels, calculation.good());
        self.sink.observe(Series::SliValidEvents, &labels, calculation.valid());
        self.sink.observe(Series::SliBadEvents, &labels, calculation.bad());
        self.sink.observe(
            Series::SloAvailable,
            &labels,
            calculation.available(objective.goal),
        );

        self.sink
            .observe(Series::CalculationDuration, &labels, elapsed.as_secs_f64());
    }
}

/// Spawns one independent worker per configured budget.
pub fn spawn_workers(
    config: &EngineConfig,
    evaluator: Evaluator,
    sink: DynSink,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    config
        .budgets
        .iter()
        .map(|budget| {
            let worker = BudgetWorker::new(
                budget.clone(),
                config,
                evaluator.clone(),
                Arc::clone(&sink),
            );
            tokio::spawn(worker.run(cancel.clone()))
        })
        .collect()
}
