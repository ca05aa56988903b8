//! Per-thread simulation

// Imports
use {
	crate::{LatencyMatrix, SimulationConfig},
	rand::Rng,
};

/// Result of simulating a single thread
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ThreadResult {
	/// Thread index
	pub thread: usize,

	/// Accesses that landed on the thread's home node
	pub local: usize,

	/// Accesses that landed on any other node
	pub remote: usize,

	/// Sum of all access latencies
	pub time: u64,
}

/// Picks the home node of thread `thread`.
///
/// Pinned threads are homed on `thread mod nodes`, while unpinned
/// threads draw their home node from `rng`.
pub fn home_node<R: Rng + ?Sized>(config: &SimulationConfig, thread: usize, rng: &mut R) -> usize {
	match config.pinning {
		true => thread % config.nodes,
		false => rng.gen_range(0..config.nodes),
	}
}

/// Simulates all `config.blocks` accesses of thread `thread`, homed on `home_node`.
pub fn simulate_thread<R: Rng + ?Sized>(
	config: &SimulationConfig,
	thread: usize,
	home_node: usize,
	latencies: &LatencyMatrix,
	rng: &mut R,
) -> ThreadResult {
	let mut result = ThreadResult {
		thread,
		local: 0,
		remote: 0,
		time: 0,
	};

	for access_idx in 0..config.blocks {
		let node = config.policy.resolve_node(access_idx, home_node, config.nodes, rng);
		match node == home_node {
			true => result.local += 1,
			false => result.remote += 1,
		}
		result.time += latencies.get(home_node, node);
	}

	tracing::trace!(?result, home_node, "Simulated thread");
	result
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::Policy,
		rand::{rngs::StdRng, SeedableRng},
	};

	fn config(nodes: usize, blocks: usize, policy: Policy) -> SimulationConfig {
		SimulationConfig {
			nodes,
			threads: 1,
			blocks,
			policy,
			pinning: true,
			seed: None,
		}
	}

	#[test]
	fn first_touch_is_all_local() {
		let config = config(4, 10, Policy::FirstTouch);
		let latencies = LatencyMatrix::new(4);
		let mut rng = StdRng::seed_from_u64(0);

		let result = simulate_thread(&config, 1, 1, &latencies, &mut rng);
		assert_eq!(result, ThreadResult {
			thread: 1,
			local:  10,
			remote: 0,
			time:   100,
		});
	}

	#[test]
	fn interleaved_two_nodes() {
		let config = config(2, 4, Policy::Interleaved);
		let latencies = LatencyMatrix::new(2);
		let mut rng = StdRng::seed_from_u64(0);

		let result = simulate_thread(&config, 0, 0, &latencies, &mut rng);
		assert_eq!(result, ThreadResult {
			thread: 0,
			local:  2,
			remote: 2,
			time:   110,
		});
	}

	#[test]
	fn random_accounts_every_access() {
		let config = config(8, 256, Policy::Random);
		let latencies = LatencyMatrix::new(8);
		let mut rng = StdRng::seed_from_u64(3);

		for home in 0..8 {
			let result = simulate_thread(&config, home, home, &latencies, &mut rng);
			assert_eq!(result.local + result.remote, 256);
			assert!(result.time >= 256 * 10);
		}
	}

	#[test]
	fn pinned_home_nodes() {
		let mut rng = StdRng::seed_from_u64(0);
		let config = SimulationConfig {
			threads: 6,
			..config(4, 1, Policy::Random)
		};
		let homes = (0..6).map(|thread| home_node(&config, thread, &mut rng)).collect::<Vec<_>>();
		assert_eq!(homes, [0, 1, 2, 3, 0, 1]);
	}

	#[test]
	fn unpinned_home_nodes_in_range() {
		let mut rng = StdRng::seed_from_u64(0);
		let config = SimulationConfig {
			pinning: false,
			..config(3, 1, Policy::Random)
		};
		for thread in 0..100 {
			assert!(home_node(&config, thread, &mut rng) < 3);
		}
	}
}
