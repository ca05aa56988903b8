//! Memory placement policies

// Imports
use {rand::Rng, std::fmt};

/// Memory placement policy
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
	/// Every access lands on a uniformly random node
	#[default]
	Random,

	/// Every access lands on the accessing thread's home node
	FirstTouch,

	/// Access `i` lands on node `i mod nodes`
	Interleaved,
}

impl Policy {
	/// All policies
	pub const ALL: [Self; 3] = [Self::Random, Self::FirstTouch, Self::Interleaved];

	/// Parses a policy from its name.
	///
	/// Unknown names fall back to [`Policy::Random`].
	// TODO: Reject unknown names once clients stop relying on the fallback.
	pub fn from_name(name: &str) -> Self {
		match name {
			"first_touch" => Self::FirstTouch,
			"interleaved" => Self::Interleaved,
			"random" => Self::Random,
			_ => {
				tracing::debug!(?name, "Unknown policy, falling back to random");
				Self::Random
			},
		}
	}

	/// Returns this policy's name
	pub fn name(self) -> &'static str {
		match self {
			Self::Random => "random",
			Self::FirstTouch => "first_touch",
			Self::Interleaved => "interleaved",
		}
	}

	/// Resolves which node access `access_idx` of a thread homed on `home_node` lands on.
	///
	/// `rng` is only used by [`Policy::Random`].
	pub fn resolve_node<R: Rng + ?Sized>(self, access_idx: usize, home_node: usize, nodes: usize, rng: &mut R) -> usize {
		match self {
			Self::FirstTouch => home_node,
			Self::Interleaved => access_idx % nodes,
			Self::Random => rng.gen_range(0..nodes),
		}
	}
}

impl fmt::Display for Policy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.pad(self.name())
	}
}
