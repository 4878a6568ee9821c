//! Remote tracker posting events as JSON to a tracking service.

use super::{EventSink, ExperimentTracker, SinkRun, TrackedRun, TrackerEvent};
use crate::error::SweepError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct HttpTracker {
    project: String,
    entity: Option<String>,
    sink: Arc<HttpSink>,
}

struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSink {
    /// URL an event is posted to.
    fn route(&self, event: &TrackerEvent) -> String {
        let base = &self.endpoint;
        match event {
            TrackerEvent::RunStarted { .. } => format!("{base}/runs"),
            TrackerEvent::Watch { run_id, .. } => format!("{base}/runs/{run_id}/watch"),
            TrackerEvent::Log { run_id, .. } => format!("{base}/runs/{run_id}/log"),
            TrackerEvent::RunFinished { run_id, .. } => format!("{base}/runs/{run_id}/finish"),
        }
    }
}

#[async_trait]
impl EventSink for HttpSink {
    async fn send(&self, event: &TrackerEvent) -> Result<(), SweepError> {
        let url = self.route(event);
        let mut request = self.client.post(&url).json(event);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SweepError::tracker(format!(
                "POST {url} returned {status}: {body}"
            )));
        }
        debug!(url = %url, "Tracker event delivered");
        Ok(())
    }
}

impl HttpTracker {
    pub fn new(
        endpoint: &str,
        project: &str,
        entity: Option<String>,
        api_key: Option<String>,
    ) -> Result<Self, SweepError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SweepError::tracker(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            project: project.to_string(),
            entity,
            sink: Arc::new(HttpSink {
                client,
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_key,
            }),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.sink.endpoint
    }
}

#[async_trait]
impl ExperimentTracker for HttpTracker {
    fn project(&self) -> &str {
        &self.project
    }

    async fn start_run(
        &self,
        name: &str,
        config: BTreeMap<String, Value>,
    ) -> Result<Box<dyn TrackedRun>, SweepError> {
        let sink: Arc<dyn EventSink> = self.sink.clone();
        let run = SinkRun::start(sink, &self.project, self.entity.clone(), name, config).await?;
        Ok(Box::new(run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_routes() {
        let tracker =
            HttpTracker::new("https://track.example.com/api/", "sweep", None, None).unwrap();
        assert_eq!(tracker.endpoint(), "https://track.example.com/api");
        let id = Uuid::nil();
        let started = TrackerEvent::RunStarted {
            run_id: id,
            project: "sweep".into(),
            entity: None,
            name: "run_0".into(),
            config: BTreeMap::new(),
            timestamp: Utc::now(),
        };
        assert_eq!(tracker.sink.route(&started), "https://track.example.com/api/runs");
        let log = TrackerEvent::Log {
            run_id: id,
            step: 0,
            values: BTreeMap::new(),
        };
        assert_eq!(
            tracker.sink.route(&log),
            format!("https://track.example.com/api/runs/{id}/log")
        );
        let finished = TrackerEvent::RunFinished {
            run_id: id,
            summary: BTreeMap::new(),
            timestamp: Utc::now(),
        };
        assert!(tracker.sink.route(&finished).ends_with("/finish"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let tracker = HttpTracker::new("http://127.0.0.1:9", "sweep", None, None).unwrap();
        assert!(tracker.start_run("run_0", BTreeMap::new()).await.is_err());
    }
}
