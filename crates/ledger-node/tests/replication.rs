use std::time::Duration;

use ledger_core::pow::find_nonce;
use ledger_core::{Block, Ledger, ReplaceOutcome};
use ledger_node::{launch, BlockEvent, EventOutcome, NodeConfig, RunningNode};
use tokio_util::sync::CancellationToken;

async fn start(id: &str) -> anyhow::Result<RunningNode> {
    launch(NodeConfig::ephemeral(id), CancellationToken::new()).await
}

/// Make `a` and `b` members of each other's cluster.
fn connect(a: &RunningNode, b: &RunningNode) {
    a.gossip.add_peer(b.as_peer());
    b.gossip.add_peer(a.as_peer());
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

fn mine_at(ledger: &Ledger, difficulty: u32) -> Block {
    let mut block = ledger.candidate(vec![]);
    block.difficulty = difficulty;
    find_nonce(&mut block);
    block
}

#[tokio::test]
async fn test_own_and_stale_announcements_are_ignored() -> anyhow::Result<()> {
    let a = start("a").await?;
    a.node.mine(vec![]).await?;
    let tip = a.node.ledger().last();

    let echo = BlockEvent::new_block(tip.clone(), "a");
    assert_eq!(a.node.handle_block_event(echo).await, EventOutcome::Echo);

    let stale = BlockEvent::new_block(tip, "b");
    assert_eq!(
        a.node.handle_block_event(stale).await,
        EventOutcome::Stale { index: 1, height: 1 }
    );
    assert_eq!(a.node.ledger().height(), 1);
    a.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_bad_block_is_rejected_then_good_block_appends() -> anyhow::Result<()> {
    let a = start("a").await?;
    let good = mine_at(a.node.ledger(), 0);
    let mut bad = good.clone();
    bad.nonce += 1;

    let outcome = a
        .node
        .handle_block_event(BlockEvent::new_block(bad, "b"))
        .await;
    assert!(matches!(outcome, EventOutcome::Rejected { index: 1, .. }));
    assert_eq!(a.node.ledger().height(), 0);

    let outcome = a
        .node
        .handle_block_event(BlockEvent::new_block(good, "b"))
        .await;
    assert_eq!(outcome, EventOutcome::Appended { index: 1 });
    a.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_mined_block_reaches_peer() -> anyhow::Result<()> {
    let a = start("a").await?;
    let b = start("b").await?;
    connect(&a, &b);

    let block = a.node.mine(vec![]).await?;
    let ledger = b.node.ledger().clone();
    assert!(eventually(|| ledger.height() == 1).await);
    assert_eq!(ledger.last(), block);

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_sync_adopts_higher_work_chain() -> anyhow::Result<()> {
    let a = start("a").await?;
    let b = start("b").await?;

    // A is longer, B carries more work.
    a.node.mine(vec![]).await?;
    a.node.mine(vec![]).await?;
    let heavy = mine_at(b.node.ledger(), 4);
    b.node.ledger().append(heavy)?;
    connect(&a, &b);

    let outcome = a.node.sync_from(&b.as_peer()).await?;
    assert!(matches!(
        outcome,
        ReplaceOutcome::Replaced {
            old_height: 2,
            new_height: 1,
            ..
        }
    ));
    assert_eq!(a.node.ledger().snapshot(), b.node.ledger().snapshot());

    let outcome = b.node.sync_from_id("a").await?;
    assert!(matches!(outcome, ReplaceOutcome::NotBetter { .. }));

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_gap_announcement_triggers_sync() -> anyhow::Result<()> {
    let a = start("a").await?;
    let b = start("b").await?;

    a.node.mine(vec![]).await?;
    for _ in 0..3 {
        b.node.mine(vec![]).await?;
    }
    connect(&a, &b);

    // Index 4 lands on A at height 1.
    b.node.mine(vec![]).await?;
    let (la, lb) = (a.node.ledger().clone(), b.node.ledger().clone());
    assert!(eventually(|| la.height() == 4).await);
    assert_eq!(la.snapshot(), lb.snapshot());

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_joining_node_syncs_on_start() -> anyhow::Result<()> {
    let a = start("a").await?;
    for _ in 0..3 {
        a.node.mine(vec![]).await?;
    }

    let mut config = NodeConfig::ephemeral("b");
    config.peers = vec![a.as_peer()];
    let b = launch(config, CancellationToken::new()).await?;
    assert_eq!(b.node.ledger().snapshot(), a.node.ledger().snapshot());

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_sync_request_without_peers() -> anyhow::Result<()> {
    let a = start("a").await?;
    let outcome = a
        .node
        .handle_event(ledger_node::ReplicationEvent::SyncRequest { peer_id: None })
        .await;
    assert_eq!(outcome, EventOutcome::NoPeers);

    let outcome = a
        .node
        .handle_event(ledger_node::ReplicationEvent::SyncRequest {
            peer_id: Some("ghost".into()),
        })
        .await;
    assert!(matches!(outcome, EventOutcome::SyncFailed { .. }));
    a.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_chain_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = NodeConfig::ephemeral("a");
    config.data_dir = Some(dir.path().to_path_buf());

    let first = launch(config.clone(), CancellationToken::new()).await?;
    first.node.mine(vec![]).await?;
    first.node.mine(vec![]).await?;
    let chain = first.node.ledger().snapshot();
    first.shutdown().await;

    let second = launch(config, CancellationToken::new()).await?;
    assert_eq!(second.node.ledger().snapshot(), chain);
    second.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_tampered_store_refuses_to_start() -> anyhow::Result<()> {
    use ledger_core::ChainStore;

    let dir = tempfile::tempdir()?;
    let ledger = Ledger::new();
    ledger.append(mine_at(&ledger, 0))?;
    let mut chain = ledger.snapshot();
    chain[1].nonce += 1;
    {
        let store = ledger_storage::SledStore::open(dir.path())?;
        store.save_chain(&chain)?;
        store.close()?;
    }

    let mut config = NodeConfig::ephemeral("a");
    config.data_dir = Some(dir.path().to_path_buf());
    let err = launch(config, CancellationToken::new())
        .await
        .err()
        .expect("tampered chain must not load");
    assert!(err.to_string().contains("stored chain is invalid"));
    Ok(())
}
