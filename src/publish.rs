//! Publisher seam. Durable storage, semantic publication and retry on
//! transient failure all live with external collaborators behind this
//! trait; the core's contract ends at producing a well-formed, idempotent
//! record.

use anyhow::Result;

use crate::types::{AccidentRecord, PatternReport};

#[async_trait::async_trait]
pub trait RecordPublisher: Send + Sync {
    async fn publish_accident(&self, record: &AccidentRecord) -> Result<()>;
    async fn publish_pattern(&self, report: &PatternReport) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Default publisher: structured log lines only. Deployments wire a real
/// context-broker publisher here.
pub struct TracingPublisher;

#[async_trait::async_trait]
impl RecordPublisher for TracingPublisher {
    async fn publish_accident(&self, record: &AccidentRecord) -> Result<()> {
        tracing::info!(
            target: "publish",
            id = %record.id,
            sensor = %record.sensor_id,
            severity = ?record.severity,
            confidence = record.confidence,
            methods = ?record.contributing_methods,
            "accident emitted"
        );
        Ok(())
    }

    async fn publish_pattern(&self, report: &PatternReport) -> Result<()> {
        tracing::info!(
            target: "publish",
            sensor = %report.window.sensor_id,
            metric = report.window.metric.as_str(),
            window = report.window.window_type.as_str(),
            samples = report.window.sample_count,
            anomalies = report.anomalies.len(),
            forecasts = report.forecasts.len(),
            "pattern report emitted"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
