mod common;

use common::{Harness, MockChain, block_ms, member};
use revenue_ledger::chain::ChainError;
use revenue_ledger::ledger::LedgerError;
use revenue_ledger::merkle::{leaf_hash, root_from_path};
use revenue_ledger::operator::{Operator, OperatorConfig, OperatorError, OperatorPool};
use revenue_ledger::store::BlockStore;
use revenue_ledger::watcher::{WatcherError, WatcherStatus};

use ethereum_types::U256;
use std::time::Duration;
use tokio::sync::watch;

async fn started(h: &Harness, config: OperatorConfig) -> Operator {
	let mut operator = Operator::new(h.watcher("alpha"), config);
	operator.start().await.unwrap();
	operator
}

fn funded_harness() -> Harness {
	let h = Harness::new();
	h.join(&[member(1), member(2), member(3)], 5_000);
	h.chain.push_transfer(2, 300);
	h.chain.set_block(3);
	h
}

#[tokio::test]
async fn published_root_verifies_member_balances() {
	let h = funded_harness();
	let mut operator = started(&h, OperatorConfig::default()).await;

	operator.publish_block(3).unwrap();
	let outcome = operator.next_outcome().await.unwrap().unwrap();
	assert_eq!(outcome.block_number, 3);
	assert_eq!(h.chain.commits(), vec![(3, outcome.root_hash)]);
	assert_eq!(outcome.ledger.get_root_hash_at(3).await.unwrap(), outcome.root_hash);

	for i in 1..=3 {
		let proof = outcome.ledger.get_proof_at(&member(i), 3).await.unwrap();
		let leaf = leaf_hash(&member(i), U256::from(100), 3);
		assert_eq!(root_from_path(leaf, &proof), outcome.root_hash);
	}

	operator.reconcile(outcome).await.unwrap();
	let watcher = operator.watcher();
	assert_eq!(watcher.last_published_block(), 3);
	assert_eq!(watcher.ledger().current_block(), h.chain.head());
	assert_eq!(watcher.ledger().latest_block().unwrap().block_number, 3);
	assert!(h.store.block_exists(3).await.unwrap());
	assert_eq!(h.store.load_state().await.unwrap().unwrap().last_published_block, 3);
}

#[tokio::test]
async fn duplicate_and_older_blocks_are_rejected() {
	let h = funded_harness();
	let mut operator = started(&h, OperatorConfig::default()).await;
	operator.publish_block(3).unwrap();
	operator.next_outcome().await.unwrap().unwrap();

	let publisher = operator.publisher().unwrap().clone();
	assert_eq!(publisher.last_published_block().await, 3);
	for block in [3, 2] {
		assert!(matches!(
			publisher.publish_block(block).await,
			Err(OperatorError::AlreadyPublished {
				last_published: 3,
				..
			})
		));
	}
	assert_eq!(h.chain.commits().len(), 1);
}

#[tokio::test]
async fn queued_publishes_commit_in_order() {
	let h = funded_harness();
	h.chain.push_transfer(4, 30);
	h.chain.set_block(6);
	let mut operator = started(&h, OperatorConfig::default()).await;

	operator.publish_block(4).unwrap();
	operator.publish_block(6).unwrap();
	assert_eq!(operator.pending_publishes(), 2);

	let first = operator.next_outcome().await.unwrap().unwrap();
	let second = operator.next_outcome().await.unwrap().unwrap();
	assert_eq!(first.block_number, 4);
	assert_eq!(second.block_number, 6);
	let committed: Vec<u64> = h.chain.commits().iter().map(|(block, _)| *block).collect();
	assert_eq!(committed, vec![4, 6]);
	assert_eq!(second.ledger.retained_block_numbers(), vec![6, 4]);
	assert!(operator.next_outcome().await.is_none());
}

#[tokio::test]
async fn failed_commit_can_be_retried() {
	let h = funded_harness();
	let mut operator = started(&h, OperatorConfig::default()).await;

	h.chain.set_fail_commits(true);
	operator.publish_block(3).unwrap();
	assert!(matches!(
		operator.next_outcome().await.unwrap(),
		Err(OperatorError::ChainError(ChainError::TransactionFailed(_)))
	));
	let publisher = operator.publisher().unwrap().clone();
	assert_eq!(publisher.last_published_block().await, 0);

	h.chain.set_fail_commits(false);
	operator.publish_block(3).unwrap();
	let outcome = operator.next_outcome().await.unwrap().unwrap();
	assert_eq!(outcome.block_number, 3);
	assert_eq!(publisher.last_published_block().await, 3);
}

#[tokio::test]
async fn publish_waits_for_block_interval() {
	let h = funded_harness();
	let config = OperatorConfig {
		min_interval_blocks: 5,
		..OperatorConfig::default()
	};
	let mut operator = started(&h, config).await;

	assert!(!operator.maybe_publish(3));
	assert!(operator.maybe_publish(5));
	assert!(!operator.maybe_publish(7));
	assert!(operator.maybe_publish(10));
	let blocks: Vec<u64> = [
		operator.next_outcome().await.unwrap().unwrap(),
		operator.next_outcome().await.unwrap().unwrap(),
	]
	.iter()
	.map(|outcome| outcome.block_number)
	.collect();
	assert_eq!(blocks, vec![5, 10]);

	let h = funded_harness();
	let watch_only = OperatorConfig {
		publish_enabled: false,
		..OperatorConfig::default()
	};
	let mut operator = started(&h, watch_only).await;
	assert!(!operator.maybe_publish(100));
}

#[tokio::test]
async fn reconcile_keeps_messages_after_finalized_point() {
	let h = Harness::new();
	h.join(&[member(1)], 5_000);
	h.chain.push_transfer(2, 100);
	h.chain.set_block(3);
	let mut operator = started(&h, OperatorConfig::default()).await;

	h.join(&[member(2)], block_ms(3) + 1_000);
	let message = tokio::time::timeout(Duration::from_secs(5), operator.watcher_mut().next_message())
		.await
		.unwrap()
		.unwrap();
	operator.watcher_mut().handle_message(message).await.unwrap();

	operator.publish_block(3).unwrap();
	let outcome = operator.next_outcome().await.unwrap().unwrap();
	assert!(matches!(
		outcome.ledger.get_member_at(&member(2), 3).await,
		Err(LedgerError::MemberNotFound { block_number: 3, .. })
	));

	operator.reconcile(outcome).await.unwrap();
	let watcher = operator.watcher();
	assert!(watcher.ledger().get_member(&member(2)).unwrap().active);
	assert_eq!(
		watcher.message_cache().lock().pruned_up_to(),
		Some(block_ms(3))
	);
}

#[tokio::test]
async fn run_publishes_on_new_revenue_and_shuts_down() {
	let h = funded_harness();
	let config = OperatorConfig {
		poll_interval: Duration::from_millis(10),
		..OperatorConfig::default()
	};
	let mut operator = started(&h, config).await;
	h.chain.push_transfer(4, 30);

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let task = tokio::spawn(async move {
		let result = operator.run(shutdown_rx).await;
		(operator, result)
	});

	tokio::time::timeout(Duration::from_secs(5), async {
		while h.chain.commits().is_empty() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.unwrap();
	assert_eq!(h.chain.commits()[0].0, 4);

	shutdown_tx.send(true).unwrap();
	let (operator, result) = task.await.unwrap();
	result.unwrap();
	assert_eq!(operator.watcher().status(), WatcherStatus::Stopped);
	assert_eq!(operator.watcher().last_published_block(), 4);
}

#[tokio::test]
async fn pool_isolates_failed_units() {
	let good = funded_harness();
	let bad = Harness::with_chain(MockChain::without_contract());
	let pool = OperatorPool::start_all(vec![
		Operator::new(good.watcher("good"), OperatorConfig::default()),
		Operator::new(bad.watcher("bad"), OperatorConfig::default()),
	])
	.await
	.unwrap();

	assert_eq!(pool.running(), 1);
	assert_eq!(pool.operators()[0].name(), "good");
	assert_eq!(pool.failed().len(), 1);
	assert_eq!(pool.failed()[0].0, "bad");
	assert!(matches!(
		pool.failed()[0].1,
		OperatorError::WatcherError(WatcherError::NotAContract(_))
	));

	let bad_again = Harness::with_chain(MockChain::without_contract());
	let all_bad = OperatorPool::start_all(vec![
		Operator::new(bad.watcher("bad"), OperatorConfig::default()),
		Operator::new(bad_again.watcher("worse"), OperatorConfig::default()),
	])
	.await;
	assert!(matches!(all_bad, Err(OperatorError::AllUnitsFailed(2))));
}

#[tokio::test(start_paused = true)]
async fn commit_waits_for_finality_delay() {
	let h = funded_harness();
	let config = OperatorConfig {
		finality_wait: Duration::from_secs(60),
		..OperatorConfig::default()
	};
	let mut operator = started(&h, config).await;

	let queued_at = tokio::time::Instant::now();
	operator.publish_block(3).unwrap();
	tokio::time::sleep(Duration::from_secs(59)).await;
	assert!(h.chain.commits().is_empty());

	let outcome = operator.next_outcome().await.unwrap().unwrap();
	assert!(queued_at.elapsed() >= Duration::from_secs(60));
	assert_eq!(h.chain.commits(), vec![(3, outcome.root_hash)]);
}

#[tokio::test]
async fn restarted_watcher_resumes_from_published_block() {
	let h = funded_harness();
	let mut operator = started(&h, OperatorConfig::default()).await;
	operator.publish_block(3).unwrap();
	let outcome = operator.next_outcome().await.unwrap().unwrap();
	operator.reconcile(outcome).await.unwrap();
	operator.shutdown().await.unwrap();
	assert!(h.store.load_block(3).await.unwrap().exact);

	// lands in the block that mined the commit
	h.chain.push_transfer(4, 30);
	let mut watcher = h.watcher("alpha");
	watcher.start().await.unwrap();

	assert_eq!(watcher.ledger().retained_block_numbers(), vec![3]);
	assert_eq!(watcher.ledger().current_block(), 4);
	assert_eq!(watcher.ledger().get_total_earnings(), U256::from(330));
	assert_eq!(
		watcher.ledger().get_member(&member(1)).unwrap().earnings,
		U256::from(110)
	);
	assert_eq!(watcher.last_published_block(), 3);
}
