use revenue_ledger::chain::{Chain, JsonRpcChainClient};
use revenue_ledger::channel::{Channel, MemoryChannel, WsChannel};
use revenue_ledger::config::AppConfig;
use revenue_ledger::events::LoggingEventHandler;
use revenue_ledger::merkle::TreeBuilder;
use revenue_ledger::operator::{Operator, OperatorPool};
use revenue_ledger::store::FileBlockStore;
use revenue_ledger::watcher::Watcher;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting revenue ledger service");

	let config = match AppConfig::load(std::env::args().nth(1).map(PathBuf::from)) {
		Ok(config) => config,
		Err(e) => {
			error!("Failed to load configuration: {}", e);
			std::process::exit(1);
		}
	};

	let chain: Arc<dyn Chain> =
		match JsonRpcChainClient::new(config.rpc_url.clone(), config.operator_address) {
			Ok(client) => Arc::new(client),
			Err(e) => {
				error!("Failed to create chain client: {}", e);
				std::process::exit(1);
			}
		};
	info!("Created chain client for {}", config.rpc_url);

	if config.channel_url.is_none() {
		warn!("No channel_url configured, units only see joins published in-process");
	}

	let operators = config
		.units
		.iter()
		.map(|unit| {
			let channel: Arc<dyn Channel> = match &config.channel_url {
				Some(url) => Arc::new(WsChannel::new(url.clone())),
				None => Arc::new(MemoryChannel::new()),
			};
			let store = Arc::new(FileBlockStore::new(config.unit_data_dir(unit)));
			let builder = TreeBuilder::new(config.max_workers, unit.worker_threshold);
			let mut watcher =
				Watcher::new(unit.watcher_config(), chain.clone(), channel, store, builder);
			watcher.register_handler(Box::new(LoggingEventHandler::new(unit.name.clone())));
			Operator::new(watcher, unit.operator_config())
		})
		.collect();

	let pool = match OperatorPool::start_all(operators).await {
		Ok(pool) => pool,
		Err(e) => {
			error!("Failed to start: {}", e);
			std::process::exit(1);
		}
	};
	for (name, e) in pool.failed() {
		warn!("Unit {} is not running: {}", name, e);
	}

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let running = tokio::spawn(pool.run(shutdown_rx));

	match tokio::signal::ctrl_c().await {
		Ok(()) => info!("Shutdown requested, finishing in-flight commits"),
		Err(e) => error!("Failed to listen for shutdown signal: {}", e),
	}
	let _ = shutdown_tx.send(true);

	match running.await {
		Ok(Ok(())) => info!("Revenue ledger service stopped"),
		Ok(Err(e)) => error!("Revenue ledger service stopped with error: {}", e),
		Err(e) => error!("Revenue ledger service task failed: {}", e),
	}
}
