//! Scenario comparison

// Imports
use {
	crate::{Engine, RunTotals, SimulationConfig},
	anyhow::Context,
	std::{cmp, thread},
};

/// Comparison of a candidate run (`B`) against a baseline run (`A`)
#[derive(Clone, Debug)]
#[derive(serde::Serialize)]
pub struct Comparison {
	/// Baseline totals
	#[serde(rename = "A")]
	pub baseline: RunTotals,

	/// Candidate totals
	#[serde(rename = "B")]
	pub candidate: RunTotals,

	/// Percentage change of the candidate against the baseline
	pub diff: Diff,

	/// Whether each change is an improvement
	pub verdicts: Verdicts,

	/// Configs of both runs
	pub configs: Configs,
}

impl Comparison {
	/// Runs `baseline` and `candidate` concurrently on `engine` and compares them
	pub fn run(engine: &dyn Engine, baseline: &SimulationConfig, candidate: &SimulationConfig) -> Result<Self, anyhow::Error> {
		let (baseline_output, candidate_output) = thread::scope(|s| {
			let candidate_handle = s.spawn(|| engine.run(candidate));
			let baseline_output = engine.run(baseline);
			let candidate_output = match candidate_handle.join() {
				Ok(output) => output,
				Err(payload) => std::panic::resume_unwind(payload),
			};

			(baseline_output, candidate_output)
		});
		let baseline_output = baseline_output.context("Unable to run baseline")?;
		let candidate_output = candidate_output.context("Unable to run candidate")?;

		Ok(Self::from_totals(
			baseline_output.totals(),
			candidate_output.totals(),
			Configs {
				baseline:  *baseline,
				candidate: *candidate,
			},
		))
	}

	/// Compares two already computed totals
	pub fn from_totals(baseline: RunTotals, candidate: RunTotals, configs: Configs) -> Self {
		let diff = Diff {
			local:  self::percent_change(baseline.local, candidate.local),
			remote: self::percent_change(baseline.remote, candidate.remote),
			time:   self::percent_change(baseline.time, candidate.time),
		};
		let verdicts = Verdicts {
			local:  Verdict::new(Metric::Local, baseline.local, candidate.local),
			remote: Verdict::new(Metric::Remote, baseline.remote, candidate.remote),
			time:   Verdict::new(Metric::Time, baseline.time, candidate.time),
		};
		tracing::debug!(?baseline, ?candidate, ?diff, "Compared runs");

		Self {
			baseline,
			candidate,
			diff,
			verdicts,
			configs,
		}
	}
}

/// Returns the percentage change from `baseline` to `candidate`, or 0 if `baseline` is 0
pub fn percent_change(baseline: u64, candidate: u64) -> f64 {
	match baseline {
		0 => 0.0,
		_ => (candidate as f64 - baseline as f64) / baseline as f64 * 100.0,
	}
}

/// Configs of a comparison
#[derive(Clone, Copy, Debug)]
#[derive(serde::Serialize)]
pub struct Configs {
	#[serde(rename = "A")]
	pub baseline: SimulationConfig,

	#[serde(rename = "B")]
	pub candidate: SimulationConfig,
}

/// Percentage change of each metric
#[derive(Clone, Copy, Debug)]
#[derive(serde::Serialize)]
pub struct Diff {
	pub local:  f64,
	pub remote: f64,
	pub time:   f64,
}

/// Verdict of each metric
#[derive(Clone, Copy, Debug)]
#[derive(serde::Serialize)]
pub struct Verdicts {
	pub local:  Verdict,
	pub remote: Verdict,
	pub time:   Verdict,
}

/// Compared metric
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Metric {
	Local,
	Remote,
	Time,
}

impl Metric {
	/// Returns whether an increase of this metric is an improvement
	pub fn higher_is_better(self) -> bool {
		match self {
			Self::Local => true,
			Self::Remote | Self::Time => false,
		}
	}
}

/// Whether a change is for the better
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
	Improved,
	Regressed,
	Neutral,
}

impl Verdict {
	/// Judges the change of `metric` from `baseline` to `candidate`
	pub fn new(metric: Metric, baseline: u64, candidate: u64) -> Self {
		match candidate.cmp(&baseline) {
			cmp::Ordering::Equal => Self::Neutral,
			cmp::Ordering::Greater if metric.higher_is_better() => Self::Improved,
			cmp::Ordering::Less if !metric.higher_is_better() => Self::Improved,
			_ => Self::Regressed,
		}
	}
}
