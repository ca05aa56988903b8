//! Benchmark driver for `numasim`

// Modules
mod args;

// Imports
use {
	anyhow::Context,
	args::Args,
	clap::Parser,
	itertools::Itertools,
	numasim::{presets, results_table, Comparison, Engine, RawConfig, SimulationConfig, Simulator, ThreadResult},
	numasim_util::logger,
	std::{
		fs,
		path::Path,
		time::{Instant, SystemTime, UNIX_EPOCH},
	},
};

fn main() -> Result<(), anyhow::Error> {
	// Get arguments
	let args = Args::parse();
	logger::pre_init::debug(format!("Args: {args:?}"));

	// Initialize logging
	logger::init(args.log_file.as_deref(), args.log_file_append);

	// Then check the sub-command
	let engine = Simulator::new();
	match args.sub_cmd {
		args::SubCmd::Run(cmd) => self::run(&engine, &cmd),
		args::SubCmd::Compare(cmd) => self::compare(&engine, &cmd),
	}
}

/// Experiment
#[derive(Debug)]
#[derive(serde::Deserialize)]
struct Experiment {
	name: String,

	#[serde(default)]
	config: RawConfig,
}

/// Experiments run when no experiments file is given
const DEFAULT_EXPERIMENTS: [&str; 3] = ["baseline_4n_ft", "baseline_4n_int", "stress_8n_rand"];

/// Summary of a single experiment
#[derive(Debug)]
#[derive(serde::Serialize)]
struct ExperimentSummary {
	experiment: String,
	config:     SimulationConfig,
	metrics:    ExperimentMetrics,
	timestamp:  u64,
}

/// Metrics of a single experiment
#[derive(Debug)]
#[derive(serde::Serialize)]
struct ExperimentMetrics {
	local_access_ratio: f64,
	avg_latency:        f64,
	avg_latency_error:  f64,
	duration_ms:        f64,
}

fn run(engine: &dyn Engine, cmd: &args::Run) -> Result<(), anyhow::Error> {
	let experiments = match &cmd.experiments_file {
		Some(experiments_file) => {
			let experiments_file = fs::File::open(experiments_file).context("Unable to open experiments file")?;
			serde_json::from_reader::<_, Vec<Experiment>>(experiments_file).context("Unable to parse experiments file")?
		},
		None => DEFAULT_EXPERIMENTS
			.iter()
			.filter_map(|&name| presets::find(name))
			.map(|preset| Experiment {
				name:   preset.name.to_owned(),
				config: preset.config.into(),
			})
			.collect(),
	};

	fs::create_dir_all(&cmd.output_dir).context("Unable to create output directory")?;

	let mut summaries = vec![];
	let mut failed = vec![];
	for experiment in experiments {
		let mut config = experiment.config.resolve();
		if let (None, Some(seed)) = (config.seed, cmd.seed) {
			config = config.with_seed(seed);
		}

		tracing::info!("Running: {}...", experiment.name);
		match self::run_experiment(engine, &cmd.output_dir, &experiment.name, &config) {
			Ok(summary) => {
				tracing::info!(
					"Completed: LAR={:.4}, Latency={:.2} ± {:.2}ns",
					summary.metrics.local_access_ratio,
					summary.metrics.avg_latency,
					summary.metrics.avg_latency_error
				);
				summaries.push(summary);
			},
			Err(err) => {
				tracing::error!("Experiment {} failed: {err:?}", experiment.name);
				failed.push(experiment.name);
			},
		}
	}

	let summary_path = cmd.output_dir.join("benchmark_summary.json");
	let summary_file = fs::File::create(&summary_path).context("Unable to create summary file")?;
	serde_json::to_writer_pretty(summary_file, &summaries).context("Unable to write summary file")?;

	match failed.is_empty() {
		true => tracing::info!("All experiments completed, summary written to {summary_path:?}"),
		false => tracing::warn!(
			"Experiments failed: {}. Summary written to {summary_path:?}",
			failed.iter().join(", ")
		),
	}

	Ok(())
}

/// Runs a single experiment, writing its raw results to `output_dir` as JSON and as a table
fn run_experiment(
	engine: &dyn Engine,
	output_dir: &Path,
	name: &str,
	config: &SimulationConfig,
) -> Result<ExperimentSummary, anyhow::Error> {
	let start = Instant::now();
	let output = engine.run(config).context("Unable to run simulation")?;
	let duration = start.elapsed();

	let results_path = output_dir.join(format!("{name}.json"));
	let results_file = fs::File::create(&results_path).context("Unable to create results file")?;
	serde_json::to_writer_pretty::<_, [ThreadResult]>(results_file, &output.results)
		.context("Unable to write results file")?;

	let table_path = output_dir.join(format!("{name}.csv"));
	fs::write(&table_path, results_table::to_text(&output.results)).context("Unable to write results table")?;

	let time_stats = output.time_stats();
	let timestamp = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map_or(0, |duration| duration.as_secs());

	Ok(ExperimentSummary {
		experiment: name.to_owned(),
		config: *config,
		metrics: ExperimentMetrics {
			local_access_ratio: output.totals().local_ratio(),
			avg_latency:        time_stats.mean(),
			avg_latency_error:  time_stats.error(),
			duration_ms:        duration.as_secs_f64() * 1000.0,
		},
		timestamp,
	})
}

fn compare(engine: &dyn Engine, cmd: &args::Compare) -> Result<(), anyhow::Error> {
	let parse = |arg: &str| -> Result<SimulationConfig, anyhow::Error> {
		let config = match presets::find(arg) {
			Some(preset) => preset.config,
			None => serde_json::from_str::<RawConfig>(arg)
				.with_context(|| format!("{arg:?} is neither a preset nor a JSON config"))?
				.resolve(),
		};

		Ok(match (config.seed, cmd.seed) {
			(None, Some(seed)) => config.with_seed(seed),
			_ => config,
		})
	};
	let baseline = parse(&cmd.baseline).context("Unable to parse baseline")?;
	let candidate = parse(&cmd.candidate).context("Unable to parse candidate")?;

	let comparison = Comparison::run(engine, &baseline, &candidate).context("Unable to compare")?;
	let comparison = serde_json::to_string_pretty(&comparison).context("Unable to serialize comparison")?;
	println!("{comparison}");

	Ok(())
}
