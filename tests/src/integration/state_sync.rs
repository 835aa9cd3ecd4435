//! # State Sync Flows
//!
//! Followers reconstruct states produced on another node by tracing the
//! chain backward and fetching missing blocks from their peers.
//!
//! ## Flows Tested:
//!
//! 1. **Parallel catch-up**: nine followers request the same tip at once
//! 2. **Sequential catch-up**: followers that caught up serve the next ones
//! 3. **Partition**: requests survive an unreachable source and complete
//!    once it is back
//! 4. **Confirmation**: a confirmed output becomes the store's latest state
//! 5. **Cancellation**: a cancelled request closes its receiver

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use qc_04_state_manager::{BlockStore, StateManagerApi};
    use shared_types::L1Commitment;
    use tokio::sync::oneshot::error::TryRecvError;
    use tokio_util::sync::CancellationToken;

    use crate::integration::fixture::{within, Cluster};

    #[tokio::test(start_paused = true)]
    async fn test_followers_catch_up_in_parallel() {
        let mut cluster = Cluster::start(10, 1);
        let blocks = cluster.factory.blocks(16, &L1Commitment::origin());
        cluster.produce(0, &blocks).await;
        let tip = blocks[15].clone();
        let alias_output = cluster.factory.alias_output(&tip);

        let proposals: Vec<_> = cluster.managers[1..]
            .iter()
            .map(|m| m.consensus_state_proposal(CancellationToken::new(), alias_output.clone()))
            .collect();
        let decisions: Vec<_> = cluster.managers[1..]
            .iter()
            .map(|m| m.consensus_decided_state(CancellationToken::new(), alias_output.clone()))
            .collect();

        for rx in proposals {
            within(rx).await.unwrap();
        }
        let expected = cluster.factory.state(&tip.l1_commitment());
        for rx in decisions {
            assert_eq!(within(rx).await.unwrap(), expected);
        }
        for store in &cluster.stores[1..] {
            for block in &blocks {
                assert!(store.has_block(&block.l1_commitment()));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_followers_catch_up_one_after_another() {
        let mut cluster = Cluster::start(5, 2);
        let blocks = cluster.factory.blocks(8, &L1Commitment::origin());
        cluster.produce(0, &blocks).await;

        for (node, manager) in cluster.managers.iter().enumerate().skip(1) {
            let tip = &blocks[7];
            let rx = manager.consensus_decided_state(CancellationToken::new(), cluster.factory.alias_output(tip));
            let state = within(rx).await.unwrap();
            assert_eq!(state, cluster.factory.state(&tip.l1_commitment()), "node {node}");
        }

        // Later followers were also served by earlier ones.
        let served: u64 = cluster.managers[1..]
            .iter()
            .map(|m| m.metrics().get_block_served)
            .sum();
        assert!(served > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_survives_unreachable_source() {
        let mut cluster = Cluster::start(3, 3);
        let blocks = cluster.factory.blocks(5, &L1Commitment::origin());
        cluster.produce(0, &blocks).await;
        let source = cluster.ids[0].clone();
        cluster.network.disconnect(&source);

        let tip = &blocks[4];
        let mut rx = cluster.managers[1]
            .consensus_decided_state(CancellationToken::new(), cluster.factory.alias_output(tip));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(cluster.managers[1].metrics().get_block_sent > 2);

        cluster.network.reconnect(&source);
        let state = within(rx).await.unwrap();
        assert_eq!(state, cluster.factory.state(&tip.l1_commitment()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_output_becomes_latest() {
        let mut cluster = Cluster::start(2, 4);
        let blocks = cluster.factory.blocks(6, &L1Commitment::origin());
        cluster.produce(0, &blocks).await;
        let tip = blocks[5].l1_commitment();

        cluster.managers[1].chain_receive_confirmed_alias_output(cluster.factory.alias_output(&blocks[5]));
        within(async {
            while cluster.stores[1].latest() != Some(tip) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        assert_eq!(cluster.stores[1].state(&tip).unwrap(), cluster.factory.state(&tip));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_closes_receiver() {
        let mut cluster = Cluster::start(2, 5);
        // Nobody holds these blocks.
        let blocks = cluster.factory.blocks(3, &L1Commitment::origin());
        let ctx = CancellationToken::new();

        let rx = cluster.managers[1].consensus_decided_state(ctx.clone(), cluster.factory.alias_output(&blocks[2]));
        tokio::time::sleep(Duration::from_millis(500)).await;
        ctx.cancel();

        assert!(within(rx).await.is_err());
        assert_eq!(cluster.managers[1].metrics().requests_completed, 0);
    }
}
