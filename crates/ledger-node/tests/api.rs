use ledger_core::Block;
use ledger_node::api::{Head, Roster};
use ledger_node::{launch, NodeConfig};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_http_surface() -> anyhow::Result<()> {
    let node = launch(NodeConfig::ephemeral("a"), CancellationToken::new()).await?;
    let base = format!("http://{}", node.http_addr);
    let client = reqwest::Client::new();

    let health: serde_json::Value = client.get(format!("{base}/health")).send().await?.json().await?;
    assert_eq!(health["status"], "ok");

    let blocks: Vec<Block> = client.get(format!("{base}/blocks")).send().await?.json().await?;
    assert_eq!(blocks.len(), 1);

    let res = client.post(format!("{base}/mine")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let blocks: Vec<Block> = res.json().await?;
    assert_eq!(blocks.len(), 2);

    let res = client
        .post(format!("{base}/mine"))
        .json(&Vec::<ledger_core::Transaction>::new())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{base}/mine"))
        .body("{not json")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let head: Head = client.get(format!("{base}/chain/head")).send().await?.json().await?;
    // Genesis plus two mined blocks, each worth 2^0.
    assert_eq!(head.height, 2);
    assert_eq!(head.difficulty, 0);
    assert_eq!(head.work, "3");
    assert_eq!(head.hash, node.node.ledger().last().hash);

    let roster: Roster = client.get(format!("{base}/peers")).send().await?.json().await?;
    assert_eq!(roster.node_id, "a");
    assert!(roster.peers.is_empty());

    let res = client
        .post(format!("{base}/sync"))
        .json(&serde_json::json!({ "peer_id": "ghost" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.post(format!("{base}/sync")).send().await?;
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    node.shutdown().await;
    Ok(())
}
