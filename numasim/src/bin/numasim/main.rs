//! NUMA locality simulator server (`numasim`)

// Modules
mod args;
mod config;

// Imports
use {
	self::{
		args::Args,
		config::{Config, EngineConfig},
	},
	anyhow::Context,
	clap::Parser,
	numasim::{api, Engine, ExternalEngine, Simulator},
	numasim_util::logger,
	std::{fs, sync::Arc},
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
	// Get arguments
	let args = Args::parse();
	logger::pre_init::debug(format!("Args: {args:?}"));

	// Initialize logging
	logger::init(args.log_file.as_deref(), args.log_file_append);

	// Read the config file
	let mut config = match &args.config_file {
		Some(config_file) => {
			let config_file = fs::File::open(config_file).context("Unable to open config file")?;
			serde_json::from_reader::<_, Config>(config_file).context("Unable to parse config file")?
		},
		None => Config::default(),
	};
	if let Some(bind) = args.bind {
		config.bind = bind;
	}
	tracing::debug!(?config, "Loaded config");

	// Create the engine
	let engine: Arc<dyn Engine> = match config.engine {
		EngineConfig::Simulator => Arc::new(Simulator::new()),
		EngineConfig::External(engine_config) => {
			tracing::info!(program = ?engine_config.program, "Using external engine");
			Arc::new(ExternalEngine::new(engine_config))
		},
	};

	// Then serve
	let state = api::ApiState {
		engine,
		max_threads: config.max_threads,
		stream: config.stream.settings(),
	};
	let listener = tokio::net::TcpListener::bind(config.bind)
		.await
		.with_context(|| format!("Unable to bind to {}", config.bind))?;
	tracing::info!("Listening on http://{}", config.bind);

	axum::serve(listener, api::router(state))
		.with_graceful_shutdown(self::shutdown_signal())
		.await
		.context("Unable to serve")?;

	tracing::info!("Shut down");
	Ok(())
}

/// Resolves once the process is asked to shut down
async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::warn!(?err, "Unable to listen for shutdown signal");
		std::future::pending::<()>().await;
	}
}
