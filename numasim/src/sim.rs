//! Simulator

// Imports
use {
	crate::{thread_sim, LatencyMatrix, SimulationConfig, ThreadResult},
	rand::{rngs::StdRng, SeedableRng},
	std::{num::NonZeroUsize, ops::Range, thread},
};

/// Source of per-thread results for a configuration.
///
/// Results are always produced in ascending thread order.
pub trait Engine: Send + Sync {
	/// Returns the results of running `config`, in ascending thread order.
	///
	/// The iterator may produce the results lazily.
	fn results(&self, config: &SimulationConfig) -> Result<Box<dyn Iterator<Item = ThreadResult> + Send>, anyhow::Error>;

	/// Runs `config` to completion
	fn run(&self, config: &SimulationConfig) -> Result<RunOutput, anyhow::Error> {
		let results = self.results(config)?.collect();
		Ok(RunOutput {
			config: *config,
			results,
		})
	}
}

/// Built-in simulator
#[derive(Clone, Copy, Debug, Default)]
pub struct Simulator;

impl Simulator {
	/// Minimum number of threads per worker before a run is split across workers
	pub const MIN_THREADS_PER_WORKER: usize = 256;

	/// Creates a new simulator
	pub fn new() -> Self {
		Self
	}

	/// Returns a lazy iterator over all thread results of `config`
	pub fn iter(&self, config: &SimulationConfig) -> RunIter {
		let seed = config.seed.unwrap_or_else(rand::random);
		let latencies = LatencyMatrix::new(config.nodes);
		tracing::debug!(?config, seed, "Starting run with latencies:\n{latencies}");

		RunIter {
			config: *config,
			seed,
			latencies,
			threads: 0..config.threads,
		}
	}

	/// Runs `config` to completion, splitting the threads across workers if there's enough of them.
	pub fn run_parallel(&self, config: &SimulationConfig) -> RunOutput {
		let workers = thread::available_parallelism()
			.map_or(1, NonZeroUsize::get)
			.min(config.threads / Self::MIN_THREADS_PER_WORKER)
			.max(1);

		let run = self.iter(config);
		let results = match workers {
			1 => run.collect(),
			_ => {
				let chunk_size = config.threads.div_ceil(workers);
				let run = &run;

				// Note: Each chunk is a contiguous, ascending range of threads, so
				//       joining them in spawn order keeps the results ordered.
				thread::scope(|s| {
					let handles = (0..config.threads)
						.step_by(chunk_size)
						.map(|start| {
							let threads = start..(start + chunk_size).min(config.threads);
							s.spawn(move || threads.map(|thread| run.simulate(thread)).collect::<Vec<_>>())
						})
						.collect::<Vec<_>>();

					handles
						.into_iter()
						.flat_map(|handle| match handle.join() {
							Ok(results) => results,
							Err(payload) => std::panic::resume_unwind(payload),
						})
						.collect()
				})
			},
		};

		RunOutput {
			config: *config,
			results,
		}
	}
}

impl Engine for Simulator {
	fn results(&self, config: &SimulationConfig) -> Result<Box<dyn Iterator<Item = ThreadResult> + Send>, anyhow::Error> {
		Ok(Box::new(self.iter(config)))
	}

	fn run(&self, config: &SimulationConfig) -> Result<RunOutput, anyhow::Error> {
		Ok(self.run_parallel(config))
	}
}

/// Lazy iterator over the thread results of a run
#[derive(Clone, Debug)]
pub struct RunIter {
	/// Config
	config: SimulationConfig,

	/// Run seed
	seed: u64,

	/// Latencies, shared by all threads
	latencies: LatencyMatrix,

	/// Remaining threads
	threads: Range<usize>,
}

impl RunIter {
	/// Returns the seed of this run
	pub fn seed(&self) -> u64 {
		self.seed
	}

	/// Simulates thread `thread`.
	///
	/// Each thread draws from its own generator, derived from the run seed and
	/// the thread index, so the result doesn't depend on which threads were
	/// simulated before it.
	fn simulate(&self, thread: usize) -> ThreadResult {
		let mut rng = StdRng::seed_from_u64(self.seed ^ (thread as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
		let home_node = thread_sim::home_node(&self.config, thread, &mut rng);
		thread_sim::simulate_thread(&self.config, thread, home_node, &self.latencies, &mut rng)
	}
}

impl Iterator for RunIter {
	type Item = ThreadResult;

	fn next(&mut self) -> Option<Self::Item> {
		let thread = self.threads.next()?;
		Some(self.simulate(thread))
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.threads.size_hint()
	}
}

impl ExactSizeIterator for RunIter {}

/// Output of a run
#[derive(Clone, Debug)]
pub struct RunOutput {
	/// Config the run was performed with
	pub config: SimulationConfig,

	/// Results, in ascending thread order
	pub results: Vec<ThreadResult>,
}

impl RunOutput {
	/// Returns the totals over all threads
	pub fn totals(&self) -> RunTotals {
		RunTotals::from_results(&self.results)
	}

	/// Returns the statistics of the per-thread access time
	pub fn time_stats(&self) -> average::Variance {
		self.results.iter().map(|result| result.time as f64).collect()
	}
}

/// Totals over all threads of a run
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RunTotals {
	pub local:  u64,
	pub remote: u64,
	pub time:   u64,
}

impl RunTotals {
	/// Reduces `results` into totals
	pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ThreadResult>) -> Self {
		results.into_iter().fold(Self::default(), |totals, result| Self {
			local:  totals.local + result.local as u64,
			remote: totals.remote + result.remote as u64,
			time:   totals.time + result.time,
		})
	}

	/// Returns the fraction of accesses that were local, or 0 if there were none
	pub fn local_ratio(&self) -> f64 {
		match self.local + self.remote {
			0 => 0.0,
			total => self.local as f64 / total as f64,
		}
	}
}

#[cfg(test)]
mod tests {
	use {super::*, crate::Policy};

	fn config(nodes: usize, threads: usize, blocks: usize, policy: Policy, pinning: bool) -> SimulationConfig {
		SimulationConfig {
			nodes,
			threads,
			blocks,
			policy,
			pinning,
			seed: Some(0x5eed),
		}
	}

	#[test]
	fn first_touch_pinned() {
		let output = Simulator::new()
			.run(&config(4, 2, 10, Policy::FirstTouch, true))
			.expect("Simulator can't fail");
		assert_eq!(output.results, [
			ThreadResult {
				thread: 0,
				local:  10,
				remote: 0,
				time:   100,
			},
			ThreadResult {
				thread: 1,
				local:  10,
				remote: 0,
				time:   100,
			},
		]);
		assert_eq!(output.totals(), RunTotals {
			local:  20,
			remote: 0,
			time:   200,
		});
		assert_eq!(output.totals().local_ratio(), 1.0);
	}

	#[test]
	fn ordered_and_complete() {
		for policy in Policy::ALL {
			for pinning in [true, false] {
				let config = config(5, 37, 64, policy, pinning);
				let output = Simulator::new().run(&config).expect("Simulator can't fail");

				assert_eq!(output.results.len(), 37);
				for (idx, result) in output.results.iter().enumerate() {
					assert_eq!(result.thread, idx);
					assert_eq!(result.local + result.remote, 64);
				}
				if policy == Policy::FirstTouch {
					assert!(output.results.iter().all(|result| result.remote == 0));
				}
			}
		}
	}

	#[test]
	fn interleaved_same_home_same_split() {
		let output = Simulator::new()
			.run(&config(3, 9, 20, Policy::Interleaved, true))
			.expect("Simulator can't fail");
		for (lhs, rhs) in output.results.iter().zip(&output.results[3..]) {
			assert_eq!((lhs.local, lhs.remote, lhs.time), (rhs.local, rhs.remote, rhs.time));
		}
	}

	#[test]
	fn seeded_runs_reproduce() {
		let config = config(8, 16, 50, Policy::Random, false);
		let lhs = Simulator::new().run(&config).expect("Simulator can't fail");
		let rhs = Simulator::new().run(&config).expect("Simulator can't fail");
		assert_eq!(lhs.results, rhs.results);
	}

	#[test]
	fn parallel_matches_sequential() {
		let config = config(8, 4 * Simulator::MIN_THREADS_PER_WORKER + 3, 16, Policy::Random, false);
		let parallel = Simulator::new().run_parallel(&config);
		let sequential = Simulator::new().iter(&config).collect::<Vec<_>>();
		assert_eq!(parallel.results, sequential);
	}

	#[test]
	fn iter_is_exact() {
		let run = Simulator::new().iter(&config(2, 7, 1, Policy::Random, true));
		assert_eq!(run.len(), 7);
		assert_eq!(run.seed(), 0x5eed);
	}

	#[test]
	fn empty_totals() {
		assert_eq!(RunTotals::from_results(std::iter::empty()), RunTotals::default());
		assert_eq!(RunTotals::default().local_ratio(), 0.0);
	}
}
