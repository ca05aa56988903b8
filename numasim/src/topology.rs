//! Node topology

// Imports
use std::fmt;

/// Latency of an access to the accessing thread's own node
pub const LOCAL_LATENCY: u64 = 10;

/// Base latency of an access to any other node
pub const REMOTE_BASE_LATENCY: u64 = 30;

/// Additional latency per node of distance
pub const HOP_LATENCY: u64 = 15;

/// Node-to-node latency matrix.
///
/// Square, symmetric, with [`LOCAL_LATENCY`] on the diagonal and
/// `REMOTE_BASE_LATENCY + HOP_LATENCY * |i - j|` everywhere else.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct LatencyMatrix {
	/// Number of nodes
	nodes: usize,

	/// Latencies, row-major
	latencies: Vec<u64>,
}

impl LatencyMatrix {
	/// Builds the latency matrix for `nodes` nodes
	pub fn new(nodes: usize) -> Self {
		let latencies = (0..nodes)
			.flat_map(|from| (0..nodes).map(move |to| self::latency_between(from, to)))
			.collect();

		Self { nodes, latencies }
	}

	/// Returns the number of nodes
	pub fn nodes(&self) -> usize {
		self.nodes
	}

	/// Returns the latency of an access from node `from` to memory on node `to`.
	///
	/// # Panics
	/// Panics if either node is out of range.
	pub fn get(&self, from: usize, to: usize) -> u64 {
		assert!(
			from < self.nodes && to < self.nodes,
			"Node out of range: {from} -> {to} ({} nodes)",
			self.nodes
		);
		self.latencies[from * self.nodes + to]
	}

	/// Returns an iterator over all rows
	pub fn rows(&self) -> impl ExactSizeIterator<Item = &[u64]> + '_ {
		// Note: `chunks_exact` panics on a chunk size of 0
		self.latencies.chunks_exact(self.nodes.max(1))
	}
}

fn latency_between(from: usize, to: usize) -> u64 {
	match from == to {
		true => LOCAL_LATENCY,
		false => REMOTE_BASE_LATENCY + HOP_LATENCY * from.abs_diff(to) as u64,
	}
}

impl serde::Serialize for LatencyMatrix {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_seq(self.rows())
	}
}

impl fmt::Display for LatencyMatrix {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for row in self.rows() {
			for latency in row {
				write!(f, "{latency:4} ")?;
			}
			writeln!(f)?;
		}

		Ok(())
	}
}
