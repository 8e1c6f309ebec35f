use crate::sink::{MetricSink, Series, SeriesKind, SeriesLabels, LABEL_NAMES, NAMESPACE};
use anyhow::Result;
use prometheus::{Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;

/// Publishes SLO series into a Prometheus registry for scraping.
#[derive(Clone)]
pub struct PrometheusSink {
    registry: Registry,
    gauges: HashMap<Series, GaugeVec>,
    durations: HistogramVec,
}

impl PrometheusSink {
    pub fn new() -> prometheus::Result<Self> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> prometheus::Result<Self> {
        let mut gauges = HashMap::new();

        for series in Series::ALL {
            if series.kind() == SeriesKind::Histogram {
                continue;
            }

            let gauge = GaugeVec::new(
                Opts::new(series.name(), series.help()).namespace(NAMESPACE),
                &LABEL_NAMES,
            )?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(series, gauge);
        }

        let durations = HistogramVec::new(
            HistogramOpts::new(
                Series::CalculationDuration.name(),
                Series::CalculationDuration.help(),
            )
            .namespace(NAMESPACE),
            &LABEL_NAMES,
        )?;
        registry.register(Box::new(durations.clone()))?;

        Ok(Self {
            registry,
            gauges,
            durations,
        })
    }

    /// Adds the process collector (CPU, memory, file descriptors).
    pub fn with_process_metrics(self) -> prometheus::Result<Self> {
        #[cfg(target_os = "linux")]
        self.registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(self)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl MetricSink for PrometheusSink {
    fn observe(&self, series: Series, labels: &SeriesLabels<'_>, value: f64) {
        let label_values = labels.values();

        match series.kind() {
            SeriesKind::Histogram => {
                self.durations
                    .with_label_values(&label_values)
                    .observe(value);
            }
            SeriesKind::Gauge => {
                if let Some(gauge) = self.gauges.get(&series) {
                    gauge.with_label_values(&label_values).set(value);
                }
            }
            SeriesKind::IncrementingGauge => {
                if let Some(gauge) = self.gauges.get(&series) {
                    gauge.with_label_values(&label_values).add(value);
                }
            }
        }
    }
}
