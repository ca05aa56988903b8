//! Configuration

// Imports
use {
	numasim::{api::StreamSettings, ExternalEngineConfig},
	std::{
		net::{Ipv4Addr, SocketAddr},
		time::Duration,
	},
};

/// Configuration
#[derive(Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
	/// Address to listen on
	pub bind: SocketAddr,

	/// Maximum number of threads of a single run
	pub max_threads: usize,

	/// Streaming configuration
	pub stream: StreamConfig,

	/// Engine
	pub engine: EngineConfig,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			bind:        SocketAddr::from((Ipv4Addr::LOCALHOST, 5000)),
			max_threads: numasim::api::ApiState::DEFAULT_MAX_THREADS,
			stream:      StreamConfig::default(),
			engine:      EngineConfig::Simulator,
		}
	}
}

/// Streaming configuration
#[derive(Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StreamConfig {
	pub paced_delay_ms:    u64,
	pub flush_interval_ms: u64,
	pub channel_capacity:  usize,
}

impl StreamConfig {
	/// Returns the stream settings of this config
	pub fn settings(&self) -> StreamSettings {
		StreamSettings {
			paced_delay:      Duration::from_millis(self.paced_delay_ms),
			flush_interval:   Duration::from_millis(self.flush_interval_ms),
			channel_capacity: self.channel_capacity,
		}
	}
}

impl Default for StreamConfig {
	fn default() -> Self {
		let settings = StreamSettings::default();
		Self {
			paced_delay_ms:    settings.paced_delay.as_millis() as u64,
			flush_interval_ms: settings.flush_interval.as_millis() as u64,
			channel_capacity:  settings.channel_capacity,
		}
	}
}

/// Engine configuration
#[derive(Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineConfig {
	/// Built-in simulator
	Simulator,

	/// External program
	External(ExternalEngineConfig),
}
