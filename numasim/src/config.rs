//! Simulation configuration

// Imports
use {
	crate::Policy,
	serde_json::Value,
	std::collections::HashMap,
};

/// Simulation configuration.
///
/// Always within range: built by [`RawConfig::resolve`], which clamps and
/// defaults every field, so nothing downstream re-validates it.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize)]
pub struct SimulationConfig {
	/// Number of nodes, `1..=8`
	pub nodes: usize,

	/// Number of threads, at least 1
	pub threads: usize,

	/// Accesses per thread, `1..=256`
	pub blocks: usize,

	/// Placement policy
	pub policy: Policy,

	/// Whether threads are pinned to node `thread mod nodes`
	pub pinning: bool,

	/// Seed for all randomness in the run.
	///
	/// If `None`, the run is seeded from entropy.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub seed: Option<u64>,
}

impl SimulationConfig {
	/// Maximum number of nodes
	pub const MAX_NODES: usize = 8;

	/// Maximum accesses per thread
	pub const MAX_BLOCKS: usize = 256;

	pub const DEFAULT_NODES: usize = 4;
	pub const DEFAULT_THREADS: usize = 4;
	pub const DEFAULT_BLOCKS: usize = 20;

	/// Sets the seed
	#[must_use]
	pub fn with_seed(self, seed: u64) -> Self {
		Self {
			seed: Some(seed),
			..self
		}
	}
}

impl Default for SimulationConfig {
	fn default() -> Self {
		Self {
			nodes:   Self::DEFAULT_NODES,
			threads: Self::DEFAULT_THREADS,
			blocks:  Self::DEFAULT_BLOCKS,
			policy:  Policy::default(),
			pinning: true,
			seed:    None,
		}
	}
}

/// Unvalidated configuration, as received from a client.
///
/// Every field is optional and may be a number, a string or a boolean.
#[derive(Clone, Debug, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
	pub nodes:   Value,
	pub threads: Value,
	pub blocks:  Value,
	pub policy:  Value,
	pub pinning: Value,
	pub seed:    Value,
}

impl RawConfig {
	/// Builds a raw config from query parameters
	pub fn from_query(params: &HashMap<String, String>) -> Self {
		let get = |name: &str| params.get(name).map_or(Value::Null, |value| Value::String(value.clone()));
		Self {
			nodes:   get("nodes"),
			threads: get("threads"),
			blocks:  get("blocks"),
			policy:  get("policy"),
			pinning: get("pinning"),
			seed:    get("seed"),
		}
	}

	/// Clamps and defaults this config
	pub fn resolve(&self) -> SimulationConfig {
		self.resolve_capped(usize::MAX)
	}

	/// Clamps and defaults this config, additionally capping the thread count at `max_threads`
	pub fn resolve_capped(&self, max_threads: usize) -> SimulationConfig {
		let int_or = |value: &Value, default: usize| value.coerce_i64().unwrap_or(default as i64);

		let nodes = int_or(&self.nodes, SimulationConfig::DEFAULT_NODES).clamp(1, SimulationConfig::MAX_NODES as i64);
		let threads = int_or(&self.threads, SimulationConfig::DEFAULT_THREADS).max(1);
		let blocks = int_or(&self.blocks, SimulationConfig::DEFAULT_BLOCKS).clamp(1, SimulationConfig::MAX_BLOCKS as i64);

		let policy = match &self.policy {
			Value::Null => Policy::default(),
			Value::String(name) => Policy::from_name(name),
			value => Policy::from_name(&value.to_string()),
		};

		let config = SimulationConfig {
			nodes: nodes as usize,
			threads: usize::try_from(threads).unwrap_or(usize::MAX).min(max_threads.max(1)),
			blocks: blocks as usize,
			policy,
			pinning: self.pinning.coerce_bool().unwrap_or(true),
			seed: self.seed.coerce_u64(),
		};
		tracing::trace!(raw = ?self, ?config, "Resolved config");

		config
	}
}

impl From<SimulationConfig> for RawConfig {
	fn from(config: SimulationConfig) -> Self {
		Self {
			nodes:   config.nodes.into(),
			threads: config.threads.into(),
			blocks:  config.blocks.into(),
			policy:  config.policy.name().into(),
			pinning: config.pinning.into(),
			seed:    config.seed.map_or(Value::Null, Value::from),
		}
	}
}

/// Lenient conversions for client-supplied values
#[extend::ext(name = CoerceValue)]
impl Value {
	/// Interprets this value as an integer, truncating fractions.
	fn coerce_i64(&self) -> Option<i64> {
		match self {
			Value::Number(number) => number
				.as_i64()
				.or_else(|| number.as_f64().filter(|value| value.is_finite()).map(|value| value as i64)),
			Value::String(s) => {
				let s = s.trim();
				s.parse::<i64>()
					.ok()
					.or_else(|| s.parse::<f64>().ok().filter(|value| value.is_finite()).map(|value| value as i64))
			},
			_ => None,
		}
	}

	/// Interprets this value as an unsigned integer, without truncation
	fn coerce_u64(&self) -> Option<u64> {
		match self {
			Value::Number(number) => number.as_u64(),
			Value::String(s) => s.trim().parse().ok(),
			_ => None,
		}
	}

	/// Interprets this value as a boolean.
	///
	/// Only the literal string `"false"` is false amongst strings.
	fn coerce_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(value) => Some(*value),
			Value::String(s) => Some(s != "false"),
			Value::Number(number) => Some(number.as_f64() != Some(0.0)),
			_ => None,
		}
	}
}
