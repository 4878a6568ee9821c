//! Local tracker: appends one JSON event per line to `<dir>/<project>.jsonl`.

use super::{EventSink, ExperimentTracker, SinkRun, TrackedRun, TrackerEvent};
use crate::error::SweepError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub struct JsonlTracker {
    project: String,
    entity: Option<String>,
    sink: Arc<JsonlSink>,
}

struct JsonlSink {
    path: PathBuf,
    // Serializes appends from concurrent runs.
    lock: Mutex<()>,
}

#[async_trait]
impl EventSink for JsonlSink {
    async fn send(&self, event: &TrackerEvent) -> Result<(), SweepError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

impl JsonlTracker {
    pub fn new(dir: &Path, project: &str, entity: Option<String>) -> Self {
        Self {
            project: project.to_string(),
            entity,
            sink: Arc::new(JsonlSink {
                path: dir.join(format!("{project}.jsonl")),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.sink.path
    }

    /// Read every event logged so far.
    pub async fn read_events(&self) -> Result<Vec<TrackerEvent>, SweepError> {
        let raw = match tokio::fs::read_to_string(&self.sink.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(SweepError::from))
            .collect()
    }
}

#[async_trait]
impl ExperimentTracker for JsonlTracker {
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
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_events_appended_as_lines() {
        let dir = TempDir::new().unwrap();
        let tracker = JsonlTracker::new(&dir.path().join("runs"), "sweep", Some("lab".into()));
        assert!(tracker.read_events().await.unwrap().is_empty());

        for name in ["run_0", "run_1"] {
            let mut run = tracker.start_run(name, BTreeMap::new()).await.unwrap();
            run.log(0, BTreeMap::from([("train/mse".into(), 2.0)]))
                .await
                .unwrap();
            run.finish(BTreeMap::new()).await.unwrap();
        }

        let raw = std::fs::read_to_string(tracker.path()).unwrap();
        assert_eq!(raw.lines().count(), 6);

        let events = tracker.read_events().await.unwrap();
        match &events[0] {
            TrackerEvent::RunStarted {
                project, entity, ..
            } => {
                assert_eq!(project, "sweep");
                assert_eq!(entity.as_deref(), Some("lab"));
            }
            other => panic!("unexpected first event {other:?}"),
        }
        assert_ne!(events[0].run_id(), events[3].run_id());
    }

    #[tokio::test]
    async fn test_diverged_values_read_back() {
        let dir = TempDir::new().unwrap();
        let tracker = JsonlTracker::new(dir.path(), "sweep", None);
        let mut run = tracker.start_run("run_0", BTreeMap::new()).await.unwrap();
        run.log(
            0,
            BTreeMap::from([
                ("train/mse".into(), f64::NAN),
                ("val/mse".into(), f64::INFINITY),
            ]),
        )
        .await
        .unwrap();
        run.finish(BTreeMap::new()).await.unwrap();

        let raw = std::fs::read_to_string(tracker.path()).unwrap();
        assert!(raw.contains(r#""train/mse":"NaN""#));

        let events = tracker.read_events().await.unwrap();
        match &events[1] {
            TrackerEvent::Log { values, .. } => {
                assert!(values["train/mse"].is_nan());
                assert_eq!(values["val/mse"], f64::INFINITY);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
