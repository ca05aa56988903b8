//! NUMA locality simulator (`numasim`)
//!
//! Models how many of each thread's memory accesses land on its own node
//! and how long they take, under a given placement policy.

// Modules
pub mod api;
pub mod compare;
pub mod config;
pub mod external;
pub mod policy;
pub mod presets;
pub mod results_table;
pub mod sim;
pub mod stream;
pub mod thread_sim;
pub mod topology;

// Exports
pub use self::{
	compare::Comparison,
	config::{RawConfig, SimulationConfig},
	external::{ExternalEngine, ExternalEngineConfig, ResultsFormat},
	policy::Policy,
	sim::{Engine, RunOutput, RunTotals, Simulator},
	stream::{DispatchMode, StreamDispatcher, StreamEvent},
	thread_sim::ThreadResult,
	topology::LatencyMatrix,
};
