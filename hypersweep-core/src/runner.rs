//! The sweep runner: trains every combination once per seed and tabulates
//! the outcome.

use crate::config::SweepConfig;
use crate::error::SweepError;
use crate::float_repr;
use crate::hyperparams::{Device, HyperValue, Hyperparameters, keys};
use crate::results::{Cell, ResultTable, SEED_COLUMN, TIME_COLUMN, save_table};
use crate::search::{Combination, RandomSearch, grid_combinations};
use crate::tracking::{ExperimentTracker, TrackedRun};
use crate::training::{
    DataLoader, DataLoaderBuilder, Dataset, FitHistory, FitOptions, HistoryIndex, Model,
    ModelFactory, Split,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const TRAIN_LOSS_COLUMN: &str = "train_loss";
pub const VAL_LOSS_COLUMN: &str = "val_loss";

/// Everything one combination shares across its seeds.
struct PreparedCombination {
    saved: Vec<(String, HyperValue)>,
    factory: Arc<dyn ModelFactory>,
    model_params: Hyperparameters,
    train_loader: Arc<dyn DataLoader>,
    val_loader: Arc<dyn DataLoader>,
    options: FitOptions,
    history_index: HistoryIndex,
    stream_history: bool,
}

/// Values recorded for a single seed.
struct SeedOutcome {
    seed: Option<u64>,
    seconds: f64,
    loss: (f64, f64),
    metrics: Vec<(String, f64, f64)>,
}

/// Runs grid or randomized searches over a fixed train/validation split.
pub struct SweepRunner {
    train: Arc<Dataset>,
    val: Arc<Dataset>,
    loader_builder: Arc<dyn DataLoaderBuilder>,
    keys_to_save: Vec<String>,
    results_path: PathBuf,
    shuffle: bool,
    device: Device,
    seeds: Option<Vec<u64>>,
    save_loss_values: bool,
    tracker: Option<Arc<dyn ExperimentTracker>>,
    show_progress: bool,
}

impl SweepRunner {
    pub fn new(
        train: Dataset,
        val: Dataset,
        loader_builder: Arc<dyn DataLoaderBuilder>,
        keys_to_save: Vec<String>,
        results_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            train: Arc::new(train),
            val: Arc::new(val),
            loader_builder,
            keys_to_save,
            results_path: results_path.into(),
            shuffle: true,
            device: Device::Cpu,
            seeds: None,
            save_loss_values: false,
            tracker: None,
            show_progress: false,
        }
    }

    /// Take the search and output settings from `config`. The tracker is
    /// attached separately with [`SweepRunner::with_tracker`].
    pub fn apply_config(self, config: &SweepConfig) -> Self {
        Self {
            results_path: config.output.results_path.clone(),
            shuffle: config.search.shuffle,
            device: config.search.device,
            seeds: config.search.seeds.clone(),
            save_loss_values: config.search.save_loss_values,
            show_progress: config.search.show_progress,
            ..self
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_seeds(mut self, seeds: Option<Vec<u64>>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_save_loss_values(mut self, save: bool) -> Self {
        self.save_loss_values = save;
        self
    }

    pub fn with_tracker(mut self, tracker: Option<Arc<dyn ExperimentTracker>>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    /// Train every `training x model` pair.
    pub async fn grid_search(
        &self,
        model_grid: &[Hyperparameters],
        training_grid: &[Hyperparameters],
    ) -> Result<ResultTable, SweepError> {
        let combinations = grid_combinations(training_grid, model_grid);
        info!(
            combinations = combinations.len(),
            "Starting grid search"
        );
        self.collect_results(&combinations).await
    }

    /// Train `search.n_run` distinct sampled pairs.
    pub async fn randomized_search(&self, search: &RandomSearch) -> Result<ResultTable, SweepError> {
        let combinations = search.combinations()?;
        info!(
            combinations = combinations.len(),
            "Starting randomized search"
        );
        self.collect_results(&combinations).await
    }

    fn empty_table(&self) -> ResultTable {
        let mut columns = self.keys_to_save.clone();
        columns.push(TIME_COLUMN.to_string());
        columns.push(SEED_COLUMN.to_string());
        if self.save_loss_values {
            columns.push(TRAIN_LOSS_COLUMN.to_string());
            columns.push(VAL_LOSS_COLUMN.to_string());
        }
        ResultTable::with_columns(columns)
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            bar.set_style(style);
        }
        Some(bar)
    }

    fn prepare(&self, combination: &Combination) -> Result<PreparedCombination, SweepError> {
        let training = &combination.training;
        training.criterion()?;
        let history_index = match training.early_stopper()? {
            Some(stopper) => HistoryIndex::BeforePatience(stopper.patience),
            None => HistoryIndex::Last,
        };

        if self.tracker.is_some() && !training.contains(keys::TRACKER_INTERACTION) {
            warn!(
                combination = combination.index,
                flag = keys::TRACKER_INTERACTION,
                "Tracker configured but nothing will be logged per epoch; \
                 add the training flag to stream history"
            );
        }

        let total = combination.total();
        let saved = self
            .keys_to_save
            .iter()
            .map(|k| total.require(k).map(|v| (k.clone(), v.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let loader_params = self.loader_builder.resolve_parameters(&total)?;
        let train_loader = self.loader_builder.create(
            Arc::clone(&self.train),
            self.shuffle,
            self.device,
            &loader_params,
        )?;
        let val_loader =
            self.loader_builder
                .create(Arc::clone(&self.val), false, self.device, &loader_params)?;

        let options = FitOptions::from_hyperparameters(&training.without(keys::BATCH_SIZE), None)?;

        Ok(PreparedCombination {
            saved,
            factory: combination.model.model_factory()?,
            model_params: combination.model.without(keys::MODEL_CLASS),
            train_loader,
            val_loader,
            options,
            history_index,
            stream_history: training.flag(keys::TRACKER_INTERACTION),
        })
    }

    /// Train and record every combination, then persist the table to the
    /// results path.
    pub async fn collect_results(
        &self,
        combinations: &[Combination],
    ) -> Result<ResultTable, SweepError> {
        let mut table = self.empty_table();
        let seeds: Vec<Option<u64>> = match &self.seeds {
            Some(seeds) => seeds.iter().copied().map(Some).collect(),
            None => vec![None],
        };
        let progress = self.progress_bar(combinations.len());
        let mut run_idx = 0usize;

        for combination in combinations {
            info!(
                combination = combination.index,
                total = combinations.len(),
                hyperparameters = %combination.total(),
                "Training combination"
            );
            let prepared = self.prepare(combination)?;

            for seed in &seeds {
                let outcome = self.run_seed(&prepared, *seed, run_idx).await?;
                table.push_row(self.row(&prepared, &outcome));
                run_idx += 1;
            }

            if let Some(bar) = &progress {
                bar.inc(1);
            }
        }

        if let Some(bar) = progress {
            bar.finish_and_clear();
        }

        save_table(&table, &self.results_path)?;
        info!(
            rows = table.len(),
            path = %self.results_path.display(),
            "Results saved"
        );
        Ok(table)
    }

    async fn run_seed(
        &self,
        prepared: &PreparedCombination,
        seed: Option<u64>,
        run_idx: usize,
    ) -> Result<SeedOutcome, SweepError> {
        let model = prepared
            .factory
            .build(&prepared.model_params, self.device, seed)?;

        let mut run = match &self.tracker {
            Some(tracker) => {
                let mut config: BTreeMap<String, Value> = prepared
                    .saved
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                if let Some(seed) = seed {
                    config.insert(SEED_COLUMN.to_string(), Value::from(seed));
                }
                let mut run = tracker.start_run(&format!("run_{run_idx}"), config).await?;
                if let Err(e) = run
                    .watch(prepared.factory.name(), prepared.options.criterion.name())
                    .await
                {
                    fail_run(run.as_mut(), &e).await;
                    return Err(e);
                }
                Some(run)
            }
            None => None,
        };

        let fitted = fit_blocking(model, prepared, seed)
            .await
            .and_then(|(history, seconds)| {
                let outcome = record(&history, prepared, seed, seconds)?;
                Ok((history, outcome))
            });
        let (history, outcome) = match fitted {
            Ok(fitted) => fitted,
            Err(e) => {
                if let Some(run) = run.as_mut() {
                    fail_run(run.as_mut(), &e).await;
                }
                return Err(e);
            }
        };
        debug!(
            run = run_idx,
            seed,
            seconds = outcome.seconds,
            epochs = history.epochs_completed,
            stopped_early = history.stopped_early,
            "Fit finished"
        );

        if let Some(run) = run.as_mut() {
            finish_run(run.as_mut(), &history, prepared, &outcome).await?;
        }
        Ok(outcome)
    }

    fn row(&self, prepared: &PreparedCombination, outcome: &SeedOutcome) -> Vec<(String, Cell)> {
        let mut row: Vec<(String, Cell)> = prepared
            .saved
            .iter()
            .map(|(k, v)| (k.clone(), v.to_cell()))
            .collect();
        row.push((TIME_COLUMN.to_string(), Cell::Float(outcome.seconds)));
        let seed = match outcome.seed {
            Some(seed) => i64::try_from(seed)
                .map(Cell::Int)
                .unwrap_or_else(|_| Cell::Text(seed.to_string())),
            None => Cell::Null,
        };
        row.push((SEED_COLUMN.to_string(), seed));
        if self.save_loss_values {
            row.push((TRAIN_LOSS_COLUMN.to_string(), Cell::Float(outcome.loss.0)));
            row.push((VAL_LOSS_COLUMN.to_string(), Cell::Float(outcome.loss.1)));
        }
        for (name, train, val) in &outcome.metrics {
            row.push((format!("{name}_train"), Cell::Float(*train)));
            row.push((format!("{name}_val"), Cell::Float(*val)));
        }
        row
    }
}

/// Run the synchronous `fit` on the blocking pool and time it.
async fn fit_blocking(
    mut model: Box<dyn Model>,
    prepared: &PreparedCombination,
    seed: Option<u64>,
) -> Result<(FitHistory, f64), SweepError> {
    let train = Arc::clone(&prepared.train_loader);
    let val = Arc::clone(&prepared.val_loader);
    let options = prepared.options.clone().with_seed(seed);
    tokio::task::spawn_blocking(move || -> Result<(FitHistory, f64), SweepError> {
        let start = Instant::now();
        let history = model.fit(train.as_ref(), val.as_ref(), &options)?;
        Ok((history, start.elapsed().as_secs_f64()))
    })
    .await
    .map_err(|e| SweepError::training(format!("fit task failed: {e}")))?
}

fn record(
    history: &FitHistory,
    prepared: &PreparedCombination,
    seed: Option<u64>,
    seconds: f64,
) -> Result<SeedOutcome, SweepError> {
    let index = prepared.history_index;
    let read = |name: &str| -> Result<(f64, f64), SweepError> {
        Ok((
            history.value_at(Split::Train, name, index)?,
            history.value_at(Split::Val, name, index)?,
        ))
    };
    let loss = read(prepared.options.criterion.name())?;
    let metrics = prepared
        .options
        .metrics
        .iter()
        .map(|m| read(m.name()).map(|(t, v)| (m.name().to_string(), t, v)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SeedOutcome {
        seed,
        seconds,
        loss,
        metrics,
    })
}

async fn finish_run(
    run: &mut dyn TrackedRun,
    history: &FitHistory,
    prepared: &PreparedCombination,
    outcome: &SeedOutcome,
) -> Result<(), SweepError> {
    if prepared.stream_history {
        for epoch in 0..history.epochs_completed {
            run.log(epoch, history.epoch_values(epoch)).await?;
        }
    }
    let mut summary = BTreeMap::new();
    summary.insert(TIME_COLUMN.to_string(), float_repr::to_value(outcome.seconds));
    summary.insert(TRAIN_LOSS_COLUMN.to_string(), float_repr::to_value(outcome.loss.0));
    summary.insert(VAL_LOSS_COLUMN.to_string(), float_repr::to_value(outcome.loss.1));
    for (name, train, val) in &outcome.metrics {
        summary.insert(format!("{name}_train"), float_repr::to_value(*train));
        summary.insert(format!("{name}_val"), float_repr::to_value(*val));
    }
    run.finish(summary).await
}

/// Close a run whose fit failed. The fit error is the one reported.
async fn fail_run(run: &mut dyn TrackedRun, error: &SweepError) {
    let mut summary = BTreeMap::new();
    summary.insert("error".to_string(), Value::from(error.to_string()));
    if let Err(e) = run.finish(summary).await {
        warn!(run = %run.id(), error = %e, "Failed to close tracker run");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::load_table;
    use crate::tracking::{RecordingTracker, TrackerEvent};
    use crate::training::{
        BatchLoaderBuilder, EarlyStopper, LinearRegressorFactory, MeanAbsoluteError, Metric,
        RootMeanSquaredError, SyntheticRegression,
    };
    use crate::wrappers::{Criterion, MseLoss, OptimizerWrapper, SgdConstructor};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn runner(dir: &TempDir, keys: &[&str]) -> SweepRunner {
        let data = SyntheticRegression {
            n_samples: 64,
            n_features: 2,
            ..Default::default()
        };
        let (train, val) = data.train_val().unwrap();
        SweepRunner::new(
            train,
            val,
            Arc::new(BatchLoaderBuilder),
            keys.iter().map(|k| k.to_string()).collect(),
            dir.path().join("results.csv"),
        )
    }

    fn training(lr: f64) -> Hyperparameters {
        let optimizer = OptimizerWrapper::new(
            SgdConstructor,
            "",
            Some(Hyperparameters::new().with("lr", lr)),
        )
        .unwrap();
        let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(MeanAbsoluteError)];
        Hyperparameters::new()
            .with("criterion", Criterion::new("mse", MseLoss))
            .with("optimizer", optimizer)
            .with("batch_size", 16)
            .with("num_epochs", 3)
            .with("metrics", metrics)
            .with("lr", lr)
    }

    fn model() -> Hyperparameters {
        let factory: Arc<dyn ModelFactory> = Arc::new(LinearRegressorFactory);
        Hyperparameters::new()
            .with("model_class", factory)
            .with("input_dim", 2)
    }

    #[tokio::test]
    async fn test_grid_search_rows_per_seed() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir, &["lr", "input_dim"])
            .with_seeds(Some(vec![1, 2]))
            .with_save_loss_values(true);
        let table = runner
            .grid_search(&[model()], &[training(0.1), training(0.01)])
            .await
            .unwrap();

        assert_eq!(
            table.columns(),
            &[
                "lr",
                "input_dim",
                "time",
                "seed",
                "train_loss",
                "val_loss",
                "mae_train",
                "mae_val"
            ]
        );
        assert_eq!(table.len(), 4);
        let seeds: Vec<&Cell> = table.column("seed").unwrap();
        assert_eq!(
            seeds,
            vec![&Cell::Int(1), &Cell::Int(2), &Cell::Int(1), &Cell::Int(2)]
        );
        let lrs = table.column("lr").unwrap();
        assert_eq!(lrs[0], &Cell::Float(0.1));
        assert_eq!(lrs[3], &Cell::Float(0.01));
        assert!(table.column("val_loss").unwrap().iter().all(|c| c.as_f64().is_some()));

        assert_eq!(load_table(runner.results_path()).unwrap(), table);
    }

    #[tokio::test]
    async fn test_unseeded_runs_once_with_null_seed() {
        let dir = TempDir::new().unwrap();
        let table = runner(&dir, &["lr"])
            .grid_search(&[model()], &[training(0.1)])
            .await
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.column("seed").unwrap(), vec![&Cell::Null]);
        assert!(table.column("train_loss").is_none());
    }

    #[tokio::test]
    async fn test_same_seed_reproduces_losses() {
        let dir = TempDir::new().unwrap();
        let table = runner(&dir, &["lr"])
            .with_seeds(Some(vec![7, 7]))
            .grid_search(&[model()], &[training(0.05)])
            .await
            .unwrap();
        let mae = table.column("mae_val").unwrap();
        assert_eq!(mae[0], mae[1]);
    }

    #[tokio::test]
    async fn test_missing_criterion_fails() {
        let dir = TempDir::new().unwrap();
        let bad = training(0.1).without("criterion");
        let err = runner(&dir, &["lr"])
            .grid_search(&[model()], &[bad])
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::MissingHyperparameter(k) if k == "criterion"));
    }

    #[tokio::test]
    async fn test_missing_saved_key_fails() {
        let dir = TempDir::new().unwrap();
        let err = runner(&dir, &["momentum"])
            .grid_search(&[model()], &[training(0.1)])
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::MissingHyperparameter(k) if k == "momentum"));
    }

    #[tokio::test]
    async fn test_early_stopper_history_index() {
        let dir = TempDir::new().unwrap();
        let stopper_training = training(0.1)
            .with("early_stopper", EarlyStopper::new(50, 0.0))
            .with("num_epochs", 2);
        let table = runner(&dir, &["lr"])
            .with_seeds(Some(vec![3]))
            .with_save_loss_values(true)
            .grid_search(&[model()], &[stopper_training.clone()])
            .await
            .unwrap();
        // Patience exceeds the history, so the first epoch is recorded.
        let first = table.column("train_loss").unwrap()[0].as_f64().unwrap();

        let dir2 = TempDir::new().unwrap();
        let one_epoch = stopper_training
            .without("early_stopper")
            .with("num_epochs", 1);
        let baseline = runner(&dir2, &["lr"])
            .with_seeds(Some(vec![3]))
            .with_save_loss_values(true)
            .grid_search(&[model()], &[one_epoch])
            .await
            .unwrap();
        let expected = baseline.column("train_loss").unwrap()[0].as_f64().unwrap();
        assert!((first - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_tracker_runs_and_streamed_history() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(RecordingTracker::new("demo"));
        let shared: Arc<dyn ExperimentTracker> = tracker.clone();
        runner(&dir, &["lr"])
            .with_seeds(Some(vec![1, 2]))
            .with_tracker(Some(shared))
            .grid_search(
                &[model()],
                &[training(0.1).with("tracker_interaction", true), training(0.2)],
            )
            .await
            .unwrap();

        let events = tracker.events().await;
        let names: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                TrackerEvent::RunStarted { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["run_0", "run_1", "run_2", "run_3"]);

        let logs = events
            .iter()
            .filter(|e| matches!(e, TrackerEvent::Log { .. }))
            .count();
        // 3 epochs for each of the two seeds of the flagged combination.
        assert_eq!(logs, 6);

        match &events[0] {
            TrackerEvent::RunStarted { config, .. } => {
                assert_eq!(config["lr"], Value::from(0.1));
                assert_eq!(config["seed"], Value::from(1u64));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_swept_lr_changes_training() {
        let dir = TempDir::new().unwrap();
        // Same optimizer wrapper everywhere; only the top-level lr differs.
        let fixed = |lr: f64| training(0.1).with("lr", lr);
        let table = runner(&dir, &["lr"])
            .with_seeds(Some(vec![4]))
            .with_save_loss_values(true)
            .grid_search(&[model()], &[fixed(0.1), fixed(0.001)])
            .await
            .unwrap();
        let losses: Vec<f64> = table
            .column("val_loss")
            .unwrap()
            .iter()
            .filter_map(|c| c.as_f64())
            .collect();
        assert_eq!(losses.len(), 2);
        assert!(losses[0] < losses[1], "{losses:?}");
    }

    #[tokio::test]
    async fn test_metric_missing_from_a_combination_is_null() {
        let dir = TempDir::new().unwrap();
        let rmse: Vec<Arc<dyn Metric>> = vec![Arc::new(RootMeanSquaredError)];
        let table = runner(&dir, &["lr"])
            .with_seeds(Some(vec![1]))
            .grid_search(
                &[model()],
                &[training(0.1), training(0.05).with("metrics", rmse)],
            )
            .await
            .unwrap();
        assert_eq!(
            table.columns(),
            &["lr", "time", "seed", "mae_train", "mae_val", "rmse_train", "rmse_val"]
        );
        assert!(table.column("mae_val").unwrap()[0].as_f64().is_some());
        assert_eq!(table.column("mae_train").unwrap()[1], &Cell::Null);
        assert_eq!(table.column("mae_val").unwrap()[1], &Cell::Null);
        assert_eq!(table.column("rmse_train").unwrap()[0], &Cell::Null);
        assert_eq!(table.column("rmse_val").unwrap()[0], &Cell::Null);
        assert!(table.column("rmse_val").unwrap()[1].as_f64().is_some());
    }

    #[tokio::test]
    async fn test_failed_fit_still_closes_tracker_run() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(RecordingTracker::new("demo"));
        let shared: Arc<dyn ExperimentTracker> = tracker.clone();
        // Data has two features, so the fit fails on the first batch.
        let wrong_width = model().with("input_dim", 3);
        let err = runner(&dir, &["lr"])
            .with_tracker(Some(shared))
            .grid_search(&[wrong_width], &[training(0.1)])
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::Model(_)));

        let events = tracker.events().await;
        match events.last() {
            Some(TrackerEvent::RunFinished { summary, .. }) => {
                assert!(summary["error"].as_str().unwrap().contains("features"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    /// Delegates to a recording tracker but rejects every `watch`.
    struct NoWatchTracker(Arc<RecordingTracker>);

    struct NoWatchRun(Box<dyn TrackedRun>);

    #[async_trait::async_trait]
    impl TrackedRun for NoWatchRun {
        fn id(&self) -> uuid::Uuid {
            self.0.id()
        }

        async fn watch(&mut self, _model: &str, _criterion: &str) -> Result<(), SweepError> {
            Err(SweepError::tracker("watch rejected"))
        }

        async fn log(&mut self, step: usize, values: BTreeMap<String, f64>) -> Result<(), SweepError> {
            self.0.log(step, values).await
        }

        async fn finish(&mut self, summary: BTreeMap<String, Value>) -> Result<(), SweepError> {
            self.0.finish(summary).await
        }
    }

    #[async_trait::async_trait]
    impl ExperimentTracker for NoWatchTracker {
        fn project(&self) -> &str {
            self.0.project()
        }

        async fn start_run(
            &self,
            name: &str,
            config: BTreeMap<String, Value>,
        ) -> Result<Box<dyn TrackedRun>, SweepError> {
            Ok(Box::new(NoWatchRun(self.0.start_run(name, config).await?)))
        }
    }

    #[tokio::test]
    async fn test_failed_watch_still_closes_tracker_run() {
        let dir = TempDir::new().unwrap();
        let recording = Arc::new(RecordingTracker::new("demo"));
        let shared: Arc<dyn ExperimentTracker> = Arc::new(NoWatchTracker(recording.clone()));
        let err = runner(&dir, &["lr"])
            .with_tracker(Some(shared))
            .grid_search(&[model()], &[training(0.1)])
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::Tracker(_)));

        let events = recording.events().await;
        assert_eq!(events.len(), 2);
        match &events[1] {
            TrackerEvent::RunFinished { summary, .. } => {
                assert!(summary["error"].as_str().unwrap().contains("watch rejected"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_randomized_search_end_to_end() {
        use crate::search::{Sampler, SearchSpace};
        let dir = TempDir::new().unwrap();
        let base = training(0.1);
        let mut training_space = SearchSpace::new();
        for (key, value) in base.iter() {
            if key != "lr" {
                training_space.insert(key, Sampler::Fixed(value.clone()));
            }
        }
        let training_space = training_space.with("lr", Sampler::choice([0.1, 0.05, 0.01]));
        let mut model_space = SearchSpace::new();
        for (key, value) in model().iter() {
            model_space.insert(key, Sampler::Fixed(value.clone()));
        }
        let search = RandomSearch::new(model_space, training_space, 3).with_seed(Some(5));
        let table = runner(&dir, &["lr"])
            .randomized_search(&search)
            .await
            .unwrap();
        assert_eq!(table.len(), 3);
        let mut lrs: Vec<f64> = table
            .column("lr")
            .unwrap()
            .iter()
            .filter_map(|c| c.as_f64())
            .collect();
        lrs.sort_by(f64::total_cmp);
        assert_eq!(lrs, vec![0.01, 0.05, 0.1]);
    }

    #[test]
    fn test_apply_config() {
        let dir = TempDir::new().unwrap();
        let mut config = SweepConfig::default();
        config.search.shuffle = false;
        config.search.seeds = Some(vec![4]);
        config.search.save_loss_values = true;
        config.output.results_path = dir.path().join("out.json");
        let runner = runner(&dir, &["lr"]).apply_config(&config);
        assert!(!runner.shuffle);
        assert_eq!(runner.seeds, Some(vec![4]));
        assert!(runner.save_loss_values);
        assert_eq!(runner.results_path(), dir.path().join("out.json"));
    }
}
