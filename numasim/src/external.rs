//! External engine.
//!
//! Delegates the simulation to an external program, which writes its
//! results (see [`results_table`]) to a known file.
//!
//! Runs of the same engine are serialized, since they all share the
//! results file.

// Imports
use {
	crate::{results_table, Engine, SimulationConfig, ThreadResult},
	anyhow::Context,
	std::{
		env,
		fs,
		io,
		path::PathBuf,
		process::Command,
		sync::{Arc, Mutex, PoisonError},
	},
};

/// External engine configuration
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ExternalEngineConfig {
	/// Program to run
	pub program: PathBuf,

	/// Arguments to the program
	#[serde(default)]
	pub args: Vec<String>,

	/// Working directory of the program
	#[serde(default)]
	pub working_dir: Option<PathBuf>,

	/// Results file written by the program.
	///
	/// Relative paths are relative to `working_dir`, if set.
	/// The program also receives the absolute path as `NUMASIM_RESULTS_FILE`.
	pub results_file: PathBuf,

	/// Format of the results file
	#[serde(default)]
	pub results_format: ResultsFormat,
}

/// Results file format
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultsFormat {
	/// Comma-separated table with a header line
	#[default]
	Table,

	/// JSON array of records
	Records,
}

/// External engine
#[derive(Clone, Debug)]
pub struct ExternalEngine {
	/// Config
	config: ExternalEngineConfig,

	/// Held for the whole of each run
	run_lock: Arc<Mutex<()>>,
}

impl ExternalEngine {
	/// Creates a new external engine
	pub fn new(config: ExternalEngineConfig) -> Self {
		Self {
			config,
			run_lock: Arc::new(Mutex::new(())),
		}
	}

	/// Returns the absolute path of the results file
	fn results_path(&self) -> Result<PathBuf, anyhow::Error> {
		let path = match &self.config.working_dir {
			Some(working_dir) => working_dir.join(&self.config.results_file),
			None => self.config.results_file.clone(),
		};

		match path.is_absolute() {
			true => Ok(path),
			false => Ok(env::current_dir()
				.context("Unable to get current directory")?
				.join(path)),
		}
	}

	/// Runs the program for `config` and parses its results
	fn run_program(&self, config: &SimulationConfig) -> Result<Vec<ThreadResult>, anyhow::Error> {
		let _run_guard = self.run_lock.lock().unwrap_or_else(PoisonError::into_inner);

		// Note: A file left over from a previous run must never be read as this run's results
		let results_path = self.results_path()?;
		match fs::remove_file(&results_path) {
			Ok(()) => tracing::debug!(?results_path, "Removed stale engine results"),
			Err(err) if err.kind() == io::ErrorKind::NotFound => (),
			Err(err) => return Err(err).with_context(|| format!("Unable to remove stale engine results {results_path:?}")),
		}

		let mut command = Command::new(&self.config.program);
		command
			.args(&self.config.args)
			.env("NUMASIM_NODES", config.nodes.to_string())
			.env("NUMASIM_THREADS", config.threads.to_string())
			.env("NUMASIM_BLOCKS", config.blocks.to_string())
			.env("NUMASIM_POLICY", config.policy.name())
			.env("NUMASIM_PINNING", config.pinning.to_string())
			.env("NUMASIM_RESULTS_FILE", &results_path);
		if let Some(seed) = config.seed {
			command.env("NUMASIM_SEED", seed.to_string());
		}
		if let Some(working_dir) = &self.config.working_dir {
			command.current_dir(working_dir);
		}

		tracing::debug!(?command, "Running external engine");
		let output = command
			.output()
			.with_context(|| format!("Unable to run engine {:?}", self.config.program))?;
		anyhow::ensure!(
			output.status.success(),
			"Engine exited with {}: {}",
			output.status,
			String::from_utf8_lossy(&output.stderr).trim()
		);

		let results = fs::read_to_string(&results_path)
			.with_context(|| format!("Unable to read engine results {results_path:?}"))?;
		let results = match self.config.results_format {
			ResultsFormat::Table => results_table::parse_text(&results),
			ResultsFormat::Records => results_table::parse_json_records(&results),
		}
		.context("Unable to parse engine results")?;
		self::check_results(config, &results)?;

		Ok(results)
	}
}

/// Checks that `results`, sorted by thread, cover every thread of `config` exactly once
/// with all of its accesses.
fn check_results(config: &SimulationConfig, results: &[ThreadResult]) -> Result<(), anyhow::Error> {
	anyhow::ensure!(
		results.len() == config.threads,
		"Engine reported {} threads, expected {}",
		results.len(),
		config.threads
	);

	for (idx, result) in results.iter().enumerate() {
		anyhow::ensure!(
			result.thread == idx,
			"Engine reported thread {} where thread {idx} was expected",
			result.thread
		);
		anyhow::ensure!(
			result.local + result.remote == config.blocks,
			"Engine reported {} accesses for thread {idx}, expected {}",
			result.local + result.remote,
			config.blocks
		);
	}

	Ok(())
}

impl Engine for ExternalEngine {
	fn results(&self, config: &SimulationConfig) -> Result<Box<dyn Iterator<Item = ThreadResult> + Send>, anyhow::Error> {
		let results = self.run_program(config)?;
		Ok(Box::new(results.into_iter()))
	}
}

#[cfg(all(test, unix))]
mod tests {
	use {
		super::*,
		crate::{Comparison, Policy},
		std::path::Path,
	};

	/// Creates an empty scratch directory for a test
	fn scratch_dir(name: &str) -> PathBuf {
		let dir = std::env::temp_dir().join(format!("numasim-{name}-{}", std::process::id()));
		let _ = fs::remove_dir_all(&dir);
		fs::create_dir_all(&dir).expect("Unable to create scratch directory");
		dir
	}

	fn engine(dir: &Path, script: &str) -> ExternalEngine {
		ExternalEngine::new(ExternalEngineConfig {
			program:        "sh".into(),
			args:           vec!["-c".to_owned(), script.to_owned()],
			working_dir:    Some(dir.to_owned()),
			results_file:   "results.csv".into(),
			results_format: ResultsFormat::Table,
		})
	}

	fn config(threads: usize) -> SimulationConfig {
		SimulationConfig {
			nodes: 4,
			threads,
			blocks: 20,
			policy: Policy::FirstTouch,
			pinning: true,
			seed: None,
		}
	}

	#[test]
	fn reads_results() {
		let dir = self::scratch_dir("reads-results");
		let script = r#"
			echo thread,local,remote,time > results.csv
			i=0
			while [ "$i" -lt "$NUMASIM_THREADS" ]; do
				echo "$i,$NUMASIM_BLOCKS,0,$((NUMASIM_BLOCKS * 10))" >> results.csv
				i=$((i + 1))
			done
		"#;

		let output = self::engine(&dir, script).run(&config(3)).expect("Unable to run engine");
		assert_eq!(output.results.len(), 3);
		for (idx, result) in output.results.iter().enumerate() {
			assert_eq!(*result, ThreadResult {
				thread: idx,
				local:  20,
				remote: 0,
				time:   200,
			});
		}
	}

	#[test]
	fn results_file_from_env() {
		let dir = self::scratch_dir("results-file-from-env");
		let engine = ExternalEngine::new(ExternalEngineConfig {
			program:        "sh".into(),
			args:           vec![
				"-c".to_owned(),
				r#"printf 'thread,local,remote,time\n0,20,0,200\n' > "$NUMASIM_RESULTS_FILE""#.to_owned(),
			],
			working_dir:    None,
			results_file:   dir.join("out.csv"),
			results_format: ResultsFormat::Table,
		});

		let output = engine.run(&config(1)).expect("Unable to run engine");
		assert_eq!(output.totals().local, 20);
	}

	#[test]
	fn reads_records() {
		let dir = self::scratch_dir("reads-records");
		let script = r#"echo '[{"thread": 1, "local": "15", "remote": 5, "time": 300}, {"thread": 0, "local": 20, "remote": 0, "time": 200}]' > results.json"#;
		let engine = ExternalEngine::new(ExternalEngineConfig {
			results_file: "results.json".into(),
			results_format: ResultsFormat::Records,
			..self::engine(&dir, script).config
		});

		let output = engine.run(&config(2)).expect("Unable to run engine");
		assert_eq!(output.results, [
			ThreadResult {
				thread: 0,
				local:  20,
				remote: 0,
				time:   200,
			},
			ThreadResult {
				thread: 1,
				local:  15,
				remote: 5,
				time:   300,
			},
		]);
	}

	#[test]
	fn compared_runs_read_their_own_results() {
		let dir = self::scratch_dir("compared-runs");

		// Baseline writes first and keeps running while the candidate would overwrite the file
		let script = r#"
			if [ "$NUMASIM_BLOCKS" = 10 ]; then
				printf 'thread,local,remote,time\n0,10,0,100\n' > results.csv
				sleep 1
			else
				sleep 0.5
				printf 'thread,local,remote,time\n0,20,0,200\n' > results.csv
			fi
		"#;
		let engine = self::engine(&dir, script);
		let baseline = SimulationConfig { blocks: 10, ..config(1) };
		let candidate = config(1);

		let comparison = Comparison::run(&engine, &baseline, &candidate).expect("Unable to compare");
		assert_eq!(comparison.baseline.local, 10);
		assert_eq!(comparison.candidate.local, 20);
		assert!((comparison.diff.local - 100.0).abs() < 1e-9);
		assert!((comparison.diff.time - 100.0).abs() < 1e-9);
	}

	#[test]
	fn stale_results_are_not_read() {
		let dir = self::scratch_dir("stale-results");
		fs::write(dir.join("results.csv"), "thread,local,remote,time\n0,20,0,200\n").expect("Unable to write results");

		let err = self::engine(&dir, "true")
			.run(&config(1))
			.expect_err("Engine should fail");
		assert!(format!("{err:#}").contains("Unable to read engine results"));
	}

	#[test]
	fn nonzero_exit() {
		let dir = self::scratch_dir("nonzero-exit");
		let err = self::engine(&dir, "echo out of memory >&2; exit 3")
			.run(&config(1))
			.expect_err("Engine should fail");
		assert!(format!("{err:#}").contains("out of memory"));
	}

	#[test]
	fn missing_results() {
		let dir = self::scratch_dir("missing-results");
		assert!(self::engine(&dir, "true").run(&config(1)).is_err());
	}

	#[test]
	fn row_count_mismatch() {
		let dir = self::scratch_dir("row-count-mismatch");
		let script = "printf 'thread,local,remote,time\\n0,20,0,200\\n' > results.csv";
		let err = self::engine(&dir, script)
			.run(&config(4))
			.expect_err("Engine should fail");
		assert!(format!("{err:#}").contains("expected 4"));
	}

	#[test]
	fn duplicate_threads() {
		let dir = self::scratch_dir("duplicate-threads");
		let script = "printf 'thread,local,remote,time\\n0,20,0,200\\n0,20,0,200\\n0,20,0,200\\n' > results.csv";
		let err = self::engine(&dir, script)
			.run(&config(3))
			.expect_err("Engine should fail");
		assert!(format!("{err:#}").contains("where thread 1 was expected"));
	}

	#[test]
	fn access_count_mismatch() {
		let dir = self::scratch_dir("access-count-mismatch");
		let script = "printf 'thread,local,remote,time\\n0,20,0,200\\n1,12,3,300\\n' > results.csv";
		let err = self::engine(&dir, script)
			.run(&config(2))
			.expect_err("Engine should fail");
		assert!(format!("{err:#}").contains("15 accesses for thread 1, expected 20"));
	}
}
