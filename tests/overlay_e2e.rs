//! End-to-end overlay scenarios over real sockets.
//!
//! Every node in one overlay shares a well-known port, so each test gives
//! its nodes distinct loopback addresses and its overlay a distinct port.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use kadnode::{bucket_index, Cid, Node, NodeConfig};
use tokio::time::sleep;

fn overlay_config(port: u16, addr: &str, bootstrap: &[&str]) -> NodeConfig {
    NodeConfig {
        port,
        addr: Some(addr.parse::<IpAddr>().expect("loopback address")),
        bootstrap_peers: bootstrap.iter().map(|s| s.to_string()).collect(),
        connect_timeout: Duration::from_millis(500),
        hop_timeout: Duration::from_secs(1),
        lookup_timeout: Duration::from_secs(5),
        refresh_interval: Duration::from_millis(200),
        ..NodeConfig::default()
    }
}

async fn wait_for_table_size(node: &Node, want: usize, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        if node.routing().len().await >= want {
            return;
        }
        if Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn two_nodes_learn_each_other_through_bootstrap() {
    let a = Node::start(overlay_config(47391, "127.0.0.1", &[]))
        .await
        .expect("start node a");
    let b = Node::start(overlay_config(47391, "127.0.0.2", &["127.0.0.1"]))
        .await
        .expect("start node b");

    wait_for_table_size(&a, 1, "a to learn b").await;
    wait_for_table_size(&b, 1, "b to learn a").await;

    // Each side holds the other in exactly the bucket the index function
    // picks; the index is the same from both ends.
    let index = bucket_index(&a.cid(), &b.cid()).expect("distinct cids");

    let a_bucket = a.routing().bucket_contacts(index).await;
    assert_eq!(a_bucket.len(), 1);
    assert_eq!(a_bucket[0].cid, b.cid());
    assert_eq!(a_bucket[0].addr, "127.0.0.2");

    let b_bucket = b.routing().bucket_contacts(index).await;
    assert_eq!(b_bucket.len(), 1);
    assert_eq!(b_bucket[0].cid, a.cid());
    assert_eq!(b_bucket[0].addr, "127.0.0.1");

    assert!(a.show_table().await.contains(&b.cid().to_string()));
}

#[tokio::test]
async fn lookup_reaches_a_peer_known_only_transitively() {
    let x = Node::start(overlay_config(47392, "127.0.0.1", &[]))
        .await
        .expect("start node x");
    let y = Node::start(overlay_config(47392, "127.0.0.2", &["127.0.0.1"]))
        .await
        .expect("start node y");

    wait_for_table_size(&x, 1, "x to learn y").await;

    let z = Node::start(overlay_config(47392, "127.0.0.3", &["127.0.0.2"]))
        .await
        .expect("start node z");

    wait_for_table_size(&y, 2, "y to learn x and z").await;
    wait_for_table_size(&z, 1, "z to learn y").await;

    // X has never spoken to Z; one hop through Y finds it.
    let found = x.lookup(&z.cid(), 1).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].cid, z.cid());
    assert_eq!(found[0].addr, "127.0.0.3");
}

#[tokio::test]
async fn concurrent_lookups_do_not_steal_each_others_replies() {
    let x = Node::start(overlay_config(47393, "127.0.0.1", &[]))
        .await
        .expect("start node x");
    let y = Node::start(overlay_config(47393, "127.0.0.2", &["127.0.0.1"]))
        .await
        .expect("start node y");
    let z = Node::start(overlay_config(47393, "127.0.0.3", &["127.0.0.2"]))
        .await
        .expect("start node z");

    wait_for_table_size(&x, 1, "x to learn y").await;
    wait_for_table_size(&y, 2, "y to learn x and z").await;

    let z_cid = z.cid();
    let y_cid = y.cid();
    let (for_z, for_y) = tokio::join!(x.lookup(&z_cid, 1), x.lookup(&y_cid, 1));
    assert_eq!(for_z.first().map(|c| c.cid), Some(z.cid()));
    assert_eq!(for_y.first().map(|c| c.cid), Some(y.cid()));
}

#[tokio::test]
async fn isolated_node_lookup_returns_empty() {
    let node = Node::start(overlay_config(47394, "127.0.0.1", &[]))
        .await
        .expect("start node");
    assert!(node.lookup(&Cid::generate(), 5).await.is_empty());
    assert!(node.show_table().await.is_empty());
}
