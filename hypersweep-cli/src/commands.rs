//! Subcommand handlers.

use crate::render;
use hypersweep_core::config::{RandomConfig, SweepConfig, load_config};
use hypersweep_core::plan::{Registry, Strategy, SweepPlan};
use hypersweep_core::results::{self, Direction};
use hypersweep_core::training::BatchLoaderBuilder;
use hypersweep_core::{Device, ResultTable, SweepRunner, build_tracker};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Train every combination of a sweep plan and save the results
    Run {
        /// Sweep plan (TOML)
        plan: PathBuf,

        /// Results file (.csv or .json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Comma-separated seeds; each combination is trained once per seed
        #[arg(long, value_delimiter = ',')]
        seeds: Option<Vec<u64>>,

        /// Device: cpu, cuda or cuda:N
        #[arg(long)]
        device: Option<String>,

        /// Record train_loss and val_loss columns
        #[arg(long)]
        save_loss_values: bool,

        /// Do not shuffle the training loader
        #[arg(long)]
        no_shuffle: bool,

        /// Seed for randomized-search sampling
        #[arg(long)]
        sampler_seed: Option<u64>,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },
    /// List the combinations a plan would train
    Plan {
        /// Sweep plan (TOML)
        plan: PathBuf,

        /// Seed for randomized-search sampling
        #[arg(long)]
        sampler_seed: Option<u64>,
    },
    /// Aggregate a results file per hyperparameter combination
    Summary {
        /// Results file (.csv or .json)
        results: PathBuf,

        /// Columns to group by (defaults to the saved hyperparameters)
        #[arg(long = "by")]
        by: Vec<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show the combination with the best mean value of a column
    Best {
        /// Results file (.csv or .json)
        results: PathBuf,

        /// Column to rank by
        #[arg(short, long, default_value = "val_loss")]
        column: String,

        /// Larger is better
        #[arg(long)]
        maximize: bool,

        /// Columns to group by (defaults to the saved hyperparameters)
        #[arg(long = "by")]
        by: Vec<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the merged configuration
    Show,
}

pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            plan,
            output,
            seeds,
            device,
            save_loss_values,
            no_shuffle,
            sampler_seed,
            progress,
        } => {
            let mut config = load_workspace_config(workspace)?;
            if let Some(output) = output {
                config.output.results_path = output;
            }
            if seeds.is_some() {
                config.search.seeds = seeds;
            }
            if let Some(device) = device {
                config.search.device = device.parse::<Device>()?;
            }
            config.search.save_loss_values |= save_loss_values;
            config.search.shuffle &= !no_shuffle;
            config.search.show_progress |= progress;
            if sampler_seed.is_some() {
                config.random.sampler_seed = sampler_seed;
            }
            let table = run_plan(&plan, config, workspace).await?;
            println!("{}", render::table(&table));
            Ok(())
        }
        Commands::Plan { plan, sampler_seed } => {
            let config = load_workspace_config(workspace)?;
            let random = RandomConfig {
                sampler_seed: sampler_seed.or(config.random.sampler_seed),
                ..config.random
            };
            let plan = SweepPlan::load(&plan)?;
            let combinations = plan.combinations(&Registry::with_builtins(), &random)?;
            println!("{}", render::combinations(&combinations));
            Ok(())
        }
        Commands::Summary { results, by, json } => {
            let table = results::load_table(&results)?;
            let groups = results::summarize(&table, &by);
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                println!("{}", render::summary(&groups));
            }
            Ok(())
        }
        Commands::Best {
            results,
            column,
            maximize,
            by,
        } => {
            let table = results::load_table(&results)?;
            let groups = results::summarize(&table, &by);
            let direction = if maximize {
                Direction::Maximize
            } else {
                Direction::Minimize
            };
            match results::best(&groups, &column, direction) {
                Some(best) => println!("{}", render::summary(std::slice::from_ref(best))),
                None => anyhow::bail!("no group has numeric values in column '{column}'"),
            }
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load_workspace_config(workspace: &Path) -> anyhow::Result<SweepConfig> {
    load_config(Some(workspace), None).map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn in_workspace(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

async fn run_plan(
    plan_path: &Path,
    mut config: SweepConfig,
    workspace: &Path,
) -> anyhow::Result<ResultTable> {
    config.output.results_path = in_workspace(workspace, &config.output.results_path);
    config.tracker.log_dir = in_workspace(workspace, &config.tracker.log_dir);

    let plan = SweepPlan::load(plan_path)?;
    let registry = Registry::with_builtins();
    let tracker = build_tracker(&config.tracker)?;
    let (train, val) = plan.datasets()?;
    info!(
        plan = %plan_path.display(),
        strategy = ?plan.strategy,
        train_rows = train.len(),
        val_rows = val.len(),
        "Running sweep plan"
    );

    let runner = SweepRunner::new(
        train,
        val,
        Arc::new(BatchLoaderBuilder),
        plan.keys_to_save.clone(),
        config.output.results_path.clone(),
    )
    .apply_config(&config)
    .with_tracker(tracker);

    let table = match plan.strategy {
        Strategy::Grid => {
            runner
                .grid_search(&plan.model_grid(&registry)?, &plan.training_grid(&registry)?)
                .await?
        }
        Strategy::Random => {
            runner
                .randomized_search(&plan.random_search(&registry, &config.random)?)
                .await?
        }
    };
    Ok(table)
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".hypersweep");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&SweepConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_workspace_config(workspace)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
