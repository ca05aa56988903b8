//! Preset configurations

// Imports
use crate::{Policy, SimulationConfig};

/// Preset configuration
#[derive(Clone, Copy, Debug)]
#[derive(serde::Serialize)]
pub struct Preset {
	/// Name
	pub name: &'static str,

	/// Description
	pub description: &'static str,

	/// Config
	pub config: SimulationConfig,
}

const fn config(nodes: usize, threads: usize, blocks: usize, policy: Policy, pinning: bool) -> SimulationConfig {
	SimulationConfig {
		nodes,
		threads,
		blocks,
		policy,
		pinning,
		seed: None,
	}
}

/// All presets
pub static PRESETS: [Preset; 6] = [
	Preset {
		name:        "ideal",
		description: "Max locality, best performance",
		config:      self::config(4, 4, 20, Policy::FirstTouch, true),
	},
	Preset {
		name:        "stress",
		description: "Distributed memory, high traffic",
		config:      self::config(8, 16, 100, Policy::Interleaved, false),
	},
	Preset {
		name:        "worst",
		description: "Random access, high latency",
		config:      self::config(4, 8, 50, Policy::Random, false),
	},
	Preset {
		name:        "baseline_4n_ft",
		description: "First touch baseline on 4 nodes",
		config:      self::config(4, 4, 20, Policy::FirstTouch, true),
	},
	Preset {
		name:        "baseline_4n_int",
		description: "Interleaved baseline on 4 nodes",
		config:      self::config(4, 4, 20, Policy::Interleaved, true),
	},
	Preset {
		name:        "stress_8n_rand",
		description: "Random placement stress on 8 nodes",
		config:      self::config(8, 16, 50, Policy::Random, false),
	},
];

/// Finds a preset by name
pub fn find(name: &str) -> Option<&'static Preset> {
	PRESETS.iter().find(|preset| preset.name == name)
}

#[cfg(test)]
mod tests {
	use {super::*, crate::RawConfig};

	#[test]
	fn presets_are_resolved() {
		for preset in &PRESETS {
			assert_eq!(RawConfig::from(preset.config).resolve(), preset.config, "{}", preset.name);
		}
	}

	#[test]
	fn lookup() {
		assert_eq!(find("ideal").map(|preset| preset.config.policy), Some(Policy::FirstTouch));
		assert!(find("nonexistent").is_none());
	}
}
