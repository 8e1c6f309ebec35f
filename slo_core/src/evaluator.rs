use crate::{
    backend::{DynBackend, Sample},
    calculation::Calculation,
    error::{Result, SloError},
    expression::QueryStage,
    objective::{Budget, Objective, Strategy},
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound for one objective's evaluation, retries included.
pub const MAX_CALCULATION_DURATION: Duration = Duration::from_secs(120);

/// Runs an objective's strategy against the backend.
///
/// Holds no per-evaluation state: every call starts from a fresh
/// [`Calculation`]. Query failures are returned as-is, wrapped with the stage
/// that failed. Retrying is left to the caller.
#[derive(Clone)]
pub struct Evaluator {
    backend: DynBackend,
}

impl Evaluator {
    pub fn new(backend: DynBackend) -> Self {
        Self { backend }
    }

    pub async fn evaluate(
        &self,
        budget: &Budget,
        objective: &Objective,
        deadline: Instant,
    ) -> Result<Calculation> {
        let mut calculation = Calculation::new();
        let query = Deadline::new(self, deadline);

        match &objective.strategy {
            Strategy::Expression(expression) => {
                let samples = query
                    .run(QueryStage::Expression, &expression.render(budget))
                    .await?;

                // no sample means the objective cannot be shown to hold
                calculation.result = samples.first().map(|s| s.value).unwrap_or(0.0);
            }
            Strategy::GoodBadRatio(ratio) => {
                calculation.set_good(&query.run(QueryStage::Good, &ratio.render_good(budget)).await?);
                calculation.set_valid(&query.run(QueryStage::Valid, &ratio.render_valid(budget)).await?);
                calculation.compute_bad();

                if calculation.bad == 0.0 {
                    calculation.result = 1.0;
                } else {
                    let samples = query
                        .run(QueryStage::Ratio, &ratio.render_ratio(budget))
                        .await?;
                    warn_on_missing_ratio(objective, &samples);
                    calculation.set_ratio(&samples);
                }
            }
            Strategy::DistributionCut(cut) => {
                calculation.set_valid(&query.run(QueryStage::Valid, &cut.render_valid(budget)).await?);
                calculation.set_good(&query.run(QueryStage::Good, &cut.render_good(budget)).await?);
                calculation.compute_bad();

                if calculation.bad == 0.0 {
                    calculation.result = 1.0;
                } else {
                    let samples = query
                        .run(QueryStage::Ratio, &cut.render_ratio(budget))
                        .await?;
                    warn_on_missing_ratio(objective, &samples);
                    calculation.set_ratio(&samples);
                }
            }
        }

        debug!(
            budget = %budget.name,
            objective = %objective.name,
            "{}",
            calculation
        );

        Ok(calculation)
    }
}

/// Binds queries to the evaluation deadline.
struct Deadline<'a> {
    evaluator: &'a Evaluator,
    deadline: Instant,
    allowance: Duration,
}

impl<'a> Deadline<'a> {
    fn new(evaluator: &'a Evaluator, deadline: Instant) -> Self {
        Self {
            evaluator,
            deadline,
            allowance: deadline.saturating_duration_since(Instant::now()),
        }
    }

    async fn run(&self, stage: QueryStage, expr: &str) -> Result<Vec<Sample>> {
        let outcome = tokio::time::timeout_at(self.deadline, self.evaluator.backend.query(expr)).await;

        match outcome {
            Ok(Ok(samples)) => Ok(samples),
            Ok(Err(e)) => Err(SloError::at_stage(stage, e)),
            Err(_) => Err(SloError::at_stage(
                stage,
                SloError::DeadlineExceeded(self.allowance),
            )),
        }
    }
}

fn warn_on_missing_ratio(objective: &Objective, samples: &[Sample]) {
    if samples.is_empty() {
        warn!(
            objective = %objective.name,
            "Ratio query returned no samples while bad events exist, reporting full compliance"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockQueryBackend;
    use mockall::{predicate, Sequence};
    use std::sync::Arc;

    fn budget() -> Budget {
        Budget::new("1m", 60).unwrap()
    }

    fn deadline() -> Instant {
        Instant::now() + MAX_CALCULATION_DURATION
    }

    fn values(values: &[f64]) -> Vec<Sample> {
        values.iter().copied().map(Sample::new).collect()
    }

    fn evaluator(mock: MockQueryBackend) -> Evaluator {
        Evaluator::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn test_expression_uses_first_sample() {
        let mut mock = MockQueryBackend::new();
        mock.expect_query()
            .with(predicate::eq("avg_over_time(up[60s])"))
            .times(1)
            .returning(|_| Ok(values(&[0.97, 0.5])));

        let objective = Objective::expression("uptime", 0.99, "avg_over_time(up[window])").unwrap();
        let calculation = evaluator(mock)
            .evaluate(&budget(), &objective, deadline())
            .await
            .unwrap();

        assert_eq!(calculation.result(), 0.97);
    }

    #[tokio::test]
    async fn test_expression_empty_vector_is_zero() {
        let mut mock = MockQueryBackend::new();
        mock.expect_query().times(1).returning(|_| Ok(vec![]));

        let objective = Objective::expression("uptime", 0.99, "up[window]").unwrap();
        let calculation = evaluator(mock)
            .evaluate(&budget(), &objective, deadline())
            .await
            .unwrap();

        assert_eq!(calculation.result(), 0.0);
    }

    #[tokio::test]
    async fn test_good_bad_ratio_without_bad_events_skips_ratio_query() {
        let objective = Objective::good_bad_ratio("api", 0.999, "ok_total", "all_total").unwrap();
        let budget = budget();
        let ratio_query = match &objective.strategy {
            Strategy::GoodBadRatio(ratio) => ratio.render_ratio(&budget),
            _ => unreachable!(),
        };

        let mut mock = MockQueryBackend::new();
        mock.expect_query()
            .withf(|expr| expr == "sum(increase(ok_total[60s]))")
            .times(1)
            .returning(|_| Ok(values(&[500.0])));
        mock.expect_query()
            .withf(|expr| expr == "sum(increase(all_total[60s]))")
            .times(1)
            .returning(|_| Ok(values(&[500.0])));
        mock.expect_query()
            .withf(move |expr| expr == ratio_query)
            .times(0)
            .returning(|_| Ok(vec![]));

        let calculation = evaluator(mock)
            .evaluate(&budget, &objective, deadline())
            .await
            .unwrap();

        assert_eq!(calculation.result(), 1.0);
        assert_eq!(calculation.bad(), 0.0);
        assert_eq!(calculation.good(), 500.0);
    }

    #[tokio::test]
    async fn test_good_bad_ratio_queries_in_order() {
        let mut seq = Sequence::new();
        let mut mock = MockQueryBackend::new();
        mock.expect_query()
            .withf(|expr| expr == "sum(increase(ok_total[60s]))")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(values(&[990.0])));
        mock.expect_query()
            .withf(|expr| expr == "sum(increase(all_total[60s]))")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(values(&[1000.0])));
        mock.expect_query()
            .withf(|expr| expr.contains("/"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(values(&[0.99])));

        let objective = Objective::good_bad_ratio("api", 0.999, "ok_total", "all_total").unwrap();
        let calculation = evaluator(mock)
            .evaluate(&budget(), &objective, deadline())
            .await
            .unwrap();

        assert_eq!(calculation.result(), 0.99);
        assert_eq!(calculation.bad(), 10.0);
        assert!((calculation.available(0.999) - (-9.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_ratio_reports_full_compliance() {
        let mut mock = MockQueryBackend::new();
        mock.expect_query()
            .withf(|expr| expr.contains("ok_total") && !expr.contains("/"))
            .returning(|_| Ok(values(&[90.0])));
        mock.expect_query()
            .withf(|expr| expr.contains("all_total") && !expr.contains("/"))
            .returning(|_| Ok(values(&[100.0])));
        mock.expect_query()
            .withf(|expr| expr.contains("/"))
            .times(1)
            .returning(|_| Ok(vec![]));

        let objective = Objective::good_bad_ratio("api", 0.9, "ok_total", "all_total").unwrap();
        let calculation = evaluator(mock)
            .evaluate(&budget(), &objective, deadline())
            .await
            .unwrap();

        assert_eq!(calculation.result(), 1.0);
        assert_eq!(calculation.bad(), 10.0);
    }

    #[tokio::test]
    async fn test_distribution_cut_queries_valid_first() {
        let mut seq = Sequence::new();
        let mut mock = MockQueryBackend::new();
        mock.expect_query()
            .withf(|expr| expr == "sum(increase(latency_count{job=\"x\"}[60s]))")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(values(&[200.0])));
        mock.expect_query()
            .withf(|expr| expr == "sum(increase(latency_bucket{job=\"x\", le=\"0.5\"}[60s]))")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(values(&[200.0])));

        let objective =
            Objective::distribution_cut("latency", 0.95, "latency_bucket{job=\"x\"}", "0.5").unwrap();
        let calculation = evaluator(mock)
            .evaluate(&budget(), &objective, deadline())
            .await
            .unwrap();

        // the mock has no ratio expectation, a third query would panic
        assert_eq!(calculation.result(), 1.0);
        assert_eq!(calculation.valid(), 200.0);
    }

    #[tokio::test]
    async fn test_distribution_cut_with_bad_events_queries_ratio() {
        let mut mock = MockQueryBackend::new();
        mock.expect_query()
            .withf(|expr| expr.contains("/"))
            .times(1)
            .returning(|_| Ok(values(&[0.75])));
        mock.expect_query()
            .withf(|expr| expr.contains("_count{") && !expr.contains("/"))
            .times(1)
            .returning(|_| Ok(values(&[400.0])));
        mock.expect_query()
            .withf(|expr| expr.contains("le=\"0.5\"") && !expr.contains("/"))
            .times(1)
            .returning(|_| Ok(values(&[300.0])));

        let objective =
            Objective::distribution_cut("latency", 0.95, "latency_bucket{job=\"x\"}", "0.5").unwrap();
        let calculation = evaluator(mock)
            .evaluate(&budget(), &objective, deadline())
            .await
            .unwrap();

        assert_eq!(calculation.result(), 0.75);
        assert_eq!(calculation.bad(), 100.0);
    }

    #[tokio::test]
    async fn test_query_error_is_wrapped_with_stage() {
        let mut mock = MockQueryBackend::new();
        mock.expect_query()
            .times(1)
            .returning(|_| Err(SloError::Transport("connection refused".to_string())));

        let objective = Objective::good_bad_ratio("api", 0.999, "ok_total", "all_total").unwrap();
        let err = evaluator(mock)
            .evaluate(&budget(), &objective, deadline())
            .await
            .unwrap_err();

        assert!(matches!(err, SloError::Stage { stage: QueryStage::Good, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_passed_deadline_fails_query() {
        struct Stalled;

        #[async_trait::async_trait]
        impl crate::backend::QueryBackend for Stalled {
            async fn query(&self, _expr: &str) -> Result<Vec<Sample>> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(vec![])
            }

            fn name(&self) -> &str {
                "stalled"
            }
        }

        let objective = Objective::expression("uptime", 0.99, "up[window]").unwrap();
        let err = Evaluator::new(Arc::new(Stalled))
            .evaluate(&budget(), &objective, Instant::now() + Duration::from_millis(20))
            .await
            .unwrap_err();

        match err {
            SloError::Stage { stage, source } => {
                assert_eq!(stage, QueryStage::Expression);
                assert!(matches!(*source, SloError::DeadlineExceeded(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
