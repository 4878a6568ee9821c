//! Experiment tracking: one run per trained `(combination, seed)`.
//!
//! Backends only need to deliver [`TrackerEvent`]s somewhere; the shared
//! [`SinkRun`] turns the run-level calls into events.

pub mod http;
pub mod jsonl;

use crate::config::{TrackerBackend, TrackerConfig};
use crate::error::SweepError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub use http::HttpTracker;
pub use jsonl::JsonlTracker;

/// One tracker event, serialized with an `event` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    RunStarted {
        run_id: Uuid,
        project: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<String>,
        name: String,
        config: BTreeMap<String, Value>,
        timestamp: DateTime<Utc>,
    },
    Watch {
        run_id: Uuid,
        model: String,
        criterion: String,
    },
    Log {
        run_id: Uuid,
        step: usize,
        #[serde(with = "crate::float_repr::map")]
        values: BTreeMap<String, f64>,
    },
    RunFinished {
        run_id: Uuid,
        summary: BTreeMap<String, Value>,
        timestamp: DateTime<Utc>,
    },
}

impl TrackerEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::Watch { run_id, .. }
            | Self::Log { run_id, .. }
            | Self::RunFinished { run_id, .. } => *run_id,
        }
    }
}

/// Where events end up.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: &TrackerEvent) -> Result<(), SweepError>;
}

/// An experiment-tracking service.
#[async_trait]
pub trait ExperimentTracker: Send + Sync {
    fn project(&self) -> &str;

    async fn start_run(
        &self,
        name: &str,
        config: BTreeMap<String, Value>,
    ) -> Result<Box<dyn TrackedRun>, SweepError>;
}

/// A single open run.
#[async_trait]
pub trait TrackedRun: Send {
    fn id(&self) -> Uuid;

    async fn watch(&mut self, model: &str, criterion: &str) -> Result<(), SweepError>;

    async fn log(&mut self, step: usize, values: BTreeMap<String, f64>) -> Result<(), SweepError>;

    async fn finish(&mut self, summary: BTreeMap<String, Value>) -> Result<(), SweepError>;
}

/// Run handle backed by any [`EventSink`]. Calls after `finish` are errors.
pub struct SinkRun {
    id: Uuid,
    sink: Arc<dyn EventSink>,
    finished: bool,
}

impl SinkRun {
    /// Emit `RunStarted` and return the open run.
    pub async fn start(
        sink: Arc<dyn EventSink>,
        project: &str,
        entity: Option<String>,
        name: &str,
        config: BTreeMap<String, Value>,
    ) -> Result<Self, SweepError> {
        let id = Uuid::new_v4();
        sink.send(&TrackerEvent::RunStarted {
            run_id: id,
            project: project.to_string(),
            entity,
            name: name.to_string(),
            config,
            timestamp: Utc::now(),
        })
        .await?;
        Ok(Self {
            id,
            sink,
            finished: false,
        })
    }

    fn ensure_open(&self) -> Result<(), SweepError> {
        if self.finished {
            return Err(SweepError::tracker(format!("run {} already finished", self.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl TrackedRun for SinkRun {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn watch(&mut self, model: &str, criterion: &str) -> Result<(), SweepError> {
        self.ensure_open()?;
        self.sink
            .send(&TrackerEvent::Watch {
                run_id: self.id,
                model: model.to_string(),
                criterion: criterion.to_string(),
            })
            .await
    }

    async fn log(&mut self, step: usize, values: BTreeMap<String, f64>) -> Result<(), SweepError> {
        self.ensure_open()?;
        self.sink
            .send(&TrackerEvent::Log {
                run_id: self.id,
                step,
                values,
            })
            .await
    }

    async fn finish(&mut self, summary: BTreeMap<String, Value>) -> Result<(), SweepError> {
        self.ensure_open()?;
        self.finished = true;
        self.sink
            .send(&TrackerEvent::RunFinished {
                run_id: self.id,
                summary,
                timestamp: Utc::now(),
            })
            .await
    }
}

/// Keeps every event in memory. Handy for tests and dry runs.
#[derive(Default)]
pub struct RecordingTracker {
    project: String,
    events: Arc<RecordingSink>,
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<TrackerEvent>>,
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, event: &TrackerEvent) -> Result<(), SweepError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

impl RecordingTracker {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            events: Arc::default(),
        }
    }

    pub async fn events(&self) -> Vec<TrackerEvent> {
        self.events.events.lock().await.clone()
    }
}

#[async_trait]
impl ExperimentTracker for RecordingTracker {
    fn project(&self) -> &str {
        &self.project
    }

    async fn start_run(
        &self,
        name: &str,
        config: BTreeMap<String, Value>,
    ) -> Result<Box<dyn TrackedRun>, SweepError> {
        let sink: Arc<dyn EventSink> = self.events.clone();
        let run = SinkRun::start(sink, &self.project, None, name, config).await?;
        Ok(Box::new(run))
    }
}

/// Build the configured tracker, or `None` when tracking is disabled.
pub fn build_tracker(
    config: &TrackerConfig,
) -> Result<Option<Arc<dyn ExperimentTracker>>, SweepError> {
    if !config.enabled {
        return Ok(None);
    }
    let tracker: Arc<dyn ExperimentTracker> = match config.backend {
        TrackerBackend::Jsonl => Arc::new(JsonlTracker::new(
            &config.log_dir,
            &config.project,
            config.entity.clone(),
        )),
        TrackerBackend::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                SweepError::Config("tracker.endpoint is required for the http backend".into())
            })?;
            let api_key = config
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok());
            Arc::new(HttpTracker::new(
                endpoint,
                &config.project,
                config.entity.clone(),
                api_key,
            )?)
        }
    };
    Ok(Some(tracker))
}
