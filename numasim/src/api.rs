//! HTTP API.
//!
//! Routes:
//! - `POST /simulate`: Runs a configuration, returning all thread results.
//! - `GET /simulate/stream`: Same, but as server-sent events (`result`s, then `end`).
//!   With `mode=batched`, results are grouped into `batch` events.
//! - `POST /compare`: Compares configuration `B` against baseline `A`.
//! - `GET /topology`: Latency matrix for `nodes`.
//! - `GET /presets`: Preset configurations.

// Imports
use {
	crate::{
		presets,
		stream::{DispatchMode, StreamDispatcher, StreamEvent},
		Comparison,
		Engine,
		LatencyMatrix,
		RawConfig,
		SimulationConfig,
		ThreadResult,
	},
	anyhow::Context,
	axum::{
		body::Bytes,
		extract::{Query, State},
		http::StatusCode,
		response::{
			sse::{Event, KeepAlive, Sse},
			IntoResponse,
			Json,
			Response,
		},
		routing::{get, post},
		Router,
	},
	futures::{stream::BoxStream, StreamExt},
	serde_json::json,
	std::{collections::HashMap, sync::Arc, time::Duration},
	tokio::sync::{mpsc, oneshot},
	tokio_stream::wrappers::ReceiverStream,
};

/// Shared state of all routes
#[derive(Clone)]
pub struct ApiState {
	/// Engine producing the results
	pub engine: Arc<dyn Engine>,

	/// Maximum number of threads of a single run
	pub max_threads: usize,

	/// Streaming settings
	pub stream: StreamSettings,
}

impl ApiState {
	/// Default maximum number of threads of a single run
	pub const DEFAULT_MAX_THREADS: usize = 65536;

	/// Creates a new state with default limits and stream settings
	pub fn new(engine: Arc<dyn Engine>) -> Self {
		Self {
			engine,
			max_threads: Self::DEFAULT_MAX_THREADS,
			stream: StreamSettings::default(),
		}
	}

	/// Resolves a client config
	fn resolve(&self, raw: &RawConfig) -> SimulationConfig {
		raw.resolve_capped(self.max_threads)
	}
}

/// Streaming settings
#[derive(Clone, Copy, Debug)]
pub struct StreamSettings {
	/// Delay after each result, in paced mode
	pub paced_delay: Duration,

	/// Flush interval, in batched mode
	pub flush_interval: Duration,

	/// Event channel capacity
	pub channel_capacity: usize,
}

impl Default for StreamSettings {
	fn default() -> Self {
		Self {
			paced_delay:      DispatchMode::DEFAULT_PACED_DELAY,
			flush_interval:   DispatchMode::DEFAULT_FLUSH_INTERVAL,
			channel_capacity: StreamDispatcher::DEFAULT_CHANNEL_CAPACITY,
		}
	}
}

/// Creates the router with all routes
pub fn router(state: ApiState) -> Router {
	Router::new()
		.route("/simulate", post(self::simulate))
		.route("/simulate/stream", get(self::simulate_stream))
		.route("/compare", post(self::compare))
		.route("/topology", get(self::topology))
		.route("/presets", get(self::presets))
		.with_state(state)
}

/// Runs a configuration to completion
async fn simulate(State(state): State<ApiState>, body: Bytes) -> Result<impl IntoResponse, ApiError> {
	let raw = self::parse_body::<RawConfig>(&body)?;
	let config = state.resolve(&raw);
	tracing::debug!(?config, "Running batch simulation");

	let engine = Arc::clone(&state.engine);
	let output = tokio::task::spawn_blocking(move || engine.run(&config))
		.await
		.context("Simulation task panicked")?
		.context("Unable to run simulation")?;

	Ok(Json(output.results))
}

/// Streams the results of a configuration
async fn simulate_stream(State(state): State<ApiState>, Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
	let config = state.resolve(&RawConfig::from_query(&params));
	let mode = match params.get("mode").map(String::as_str) {
		Some("batched") => DispatchMode::Batched {
			flush_interval: state.stream.flush_interval,
		},
		_ => DispatchMode::Paced {
			delay: state.stream.paced_delay,
		},
	};
	tracing::debug!(?config, ?mode, "Streaming simulation");

	let results = self::produce_results(Arc::clone(&state.engine), config, state.stream.channel_capacity).await;
	let events: BoxStream<'static, StreamEvent> = match results {
		Ok(results) => StreamDispatcher::new(mode)
			.with_channel_capacity(state.stream.channel_capacity)
			.dispatch(results)
			.boxed(),
		Err(err) => StreamDispatcher::failed(&err).boxed(),
	};

	Sse::new(events.map(|event| self::sse_event(&event))).keep_alive(KeepAlive::default())
}

/// Produces the results of `config` on a blocking thread, as they're simulated.
///
/// Resolves once the engine has started producing results. Production stops
/// once the returned stream is dropped.
async fn produce_results(
	engine: Arc<dyn Engine>,
	config: SimulationConfig,
	channel_capacity: usize,
) -> Result<ReceiverStream<ThreadResult>, anyhow::Error> {
	let (started_tx, started_rx) = oneshot::channel();
	let (results_tx, results_rx) = mpsc::channel(channel_capacity.max(1));

	tokio::task::spawn_blocking(move || {
		let results = match engine.results(&config) {
			Ok(results) => results,
			Err(err) => {
				let _ = started_tx.send(Err(err));
				return;
			},
		};
		let _ = started_tx.send(Ok(()));

		for result in results {
			if results_tx.blocking_send(result).is_err() {
				tracing::debug!("Results are no longer being consumed, stopping simulation");
				break;
			}
		}
	});

	started_rx
		.await
		.context("Simulation task panicked")?
		.context("Unable to run simulation")?;

	Ok(ReceiverStream::new(results_rx))
}

/// Converts a stream event into a server-sent event
fn sse_event(event: &StreamEvent) -> Result<Event, axum::Error> {
	let sse_event = Event::default().event(event.name());
	match event {
		StreamEvent::Result(result) => sse_event.json_data(result),
		StreamEvent::Batch(results) => sse_event.json_data(results),
		StreamEvent::End { code } => sse_event.json_data(json!({ "code": code })),
		StreamEvent::Error { message } => sse_event.json_data(json!({ "message": message })),
	}
}

/// Comparison request
#[derive(Debug, Default)]
#[derive(serde::Deserialize)]
struct CompareRequest {
	#[serde(rename = "A", alias = "baseline", default)]
	baseline: RawConfig,

	#[serde(rename = "B", alias = "candidate", default)]
	candidate: RawConfig,
}

/// Compares two configurations
async fn compare(State(state): State<ApiState>, body: Bytes) -> Result<impl IntoResponse, ApiError> {
	let request = self::parse_body::<CompareRequest>(&body)?;
	let baseline = state.resolve(&request.baseline);
	let candidate = state.resolve(&request.candidate);
	tracing::debug!(?baseline, ?candidate, "Comparing simulations");

	let engine = Arc::clone(&state.engine);
	let comparison = tokio::task::spawn_blocking(move || Comparison::run(&*engine, &baseline, &candidate))
		.await
		.context("Comparison task panicked")?
		.context("Unable to compare simulations")?;

	Ok(Json(comparison))
}

/// Returns the latency matrix
async fn topology(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
	let config = RawConfig::from_query(&params).resolve();
	Json(LatencyMatrix::new(config.nodes))
}

/// Returns all presets
async fn presets() -> impl IntoResponse {
	Json(&presets::PRESETS)
}

/// Parses a JSON body, treating an empty body as the default
fn parse_body<T: serde::de::DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(T::default());
	}

	serde_json::from_slice(body).map_err(|err| ApiError::BadRequest(format!("Invalid request body: {err}")))
}

/// Request error
#[derive(Debug)]
pub enum ApiError {
	/// Malformed request
	BadRequest(String),

	/// The request couldn't be completed
	Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
	fn from(err: anyhow::Error) -> Self {
		Self::Internal(err)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, message) = match self {
			Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
			Self::Internal(err) => {
				tracing::warn!(?err, "Request failed");
				(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
			},
		};

		(status, Json(json!({ "error": message }))).into_response()
	}
}
