//! Supervision of several ledger units.
//!
//! Units start concurrently. A unit that fails to start is logged and left out; the pool only
//! fails when no unit could be started.

use super::service::Operator;
use super::types::OperatorError;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub struct OperatorPool {
	operators: Vec<Operator>,
	failed: Vec<(String, OperatorError)>,
}

impl OperatorPool {
	pub async fn start_all(operators: Vec<Operator>) -> Result<Self, OperatorError> {
		let total = operators.len();
		let started = join_all(operators.into_iter().map(|mut operator| async move {
			let result = operator.start().await;
			(operator, result)
		}))
		.await;

		let mut running = Vec::new();
		let mut failed = Vec::new();
		for (mut operator, result) in started {
			match result {
				Ok(()) => running.push(operator),
				Err(e) => {
					error!("[{}] Failed to start: {}", operator.name(), e);
					if let Err(e) = operator.watcher_mut().stop().await {
						warn!("[{}] Cleanup after failed start: {}", operator.name(), e);
					}
					failed.push((operator.name().to_string(), e));
				}
			}
		}

		if running.is_empty() && total > 0 {
			return Err(OperatorError::AllUnitsFailed(total));
		}
		info!(
			"Started {} of {} ledger units",
			running.len(),
			total
		);
		Ok(Self {
			operators: running,
			failed,
		})
	}

	pub fn running(&self) -> usize {
		self.operators.len()
	}

	pub fn failed(&self) -> &[(String, OperatorError)] {
		&self.failed
	}

	pub fn operators(&self) -> &[Operator] {
		&self.operators
	}

	/// Run every unit on its own task until `shutdown` flips.
	pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), OperatorError> {
		let tasks = self.operators.into_iter().map(|mut operator| {
			let shutdown = shutdown.clone();
			tokio::spawn(async move {
				let name = operator.name().to_string();
				if let Err(e) = operator.run(shutdown).await {
					error!("[{}] Operator stopped with error: {}", name, e);
				}
			})
		});
		for joined in join_all(tasks).await {
			if let Err(e) = joined {
				error!("Operator task failed: {}", e);
			}
		}
		Ok(())
	}
}
