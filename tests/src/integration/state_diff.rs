//! # State Diff Flows
//!
//! The mempool asks for the blocks added and removed between two chain tips
//! after a reorganisation. Tips the node lacks are fetched first.
//!
//! ## Flows Tested:
//!
//! 1. **Remote reorg**: both branches only exist on another node
//! 2. **Local old branch**: the old branch is local, the new one is fetched

#[cfg(test)]
mod tests {
    use qc_04_state_manager::StateManagerApi;
    use shared_types::{Block, L1Commitment};
    use tokio_util::sync::CancellationToken;

    use crate::integration::fixture::{within, Cluster};

    /// 20 shared blocks, then two 10 block branches.
    fn reorg(cluster: &mut Cluster) -> (Vec<Block>, Vec<Block>, Vec<Block>) {
        let trunk = cluster.factory.blocks(20, &L1Commitment::origin());
        let fork = trunk[19].l1_commitment();
        let old_branch = cluster.factory.blocks(10, &fork);
        let new_branch = cluster.factory.blocks(10, &fork);
        (trunk, old_branch, new_branch)
    }

    #[tokio::test(start_paused = true)]
    async fn test_diff_across_remote_reorg() {
        let mut cluster = Cluster::start(4, 10);
        let (trunk, old_branch, new_branch) = reorg(&mut cluster);
        cluster.produce(0, &trunk).await;
        cluster.produce(0, &old_branch).await;
        cluster.produce(0, &new_branch).await;

        let rx = cluster.managers[2].chain_fetch_state_diff(
            CancellationToken::new(),
            cluster.factory.alias_output(&old_branch[9]),
            cluster.factory.alias_output(&new_branch[9]),
        );
        let diff = within(rx).await.unwrap();

        assert_eq!(diff.added, new_branch);
        assert_eq!(diff.removed, old_branch);
        assert_eq!(
            diff.new_state.trie_root(),
            cluster.factory.state(&new_branch[9].l1_commitment()).trie_root()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_diff_with_local_old_branch() {
        let mut cluster = Cluster::start(2, 11);
        let (trunk, old_branch, new_branch) = reorg(&mut cluster);
        cluster.produce(0, &trunk).await;
        cluster.produce(0, &new_branch).await;
        cluster.produce(1, &trunk).await;
        cluster.produce(1, &old_branch).await;

        let rx = cluster.managers[1].chain_fetch_state_diff(
            CancellationToken::new(),
            cluster.factory.alias_output(&old_branch[9]),
            cluster.factory.alias_output(&new_branch[9]),
        );
        let diff = within(rx).await.unwrap();

        assert_eq!(diff.added, new_branch);
        assert_eq!(diff.removed, old_branch);
        // Only the new branch had to travel.
        assert_eq!(cluster.managers[1].metrics().blocks_received, 10);
    }
}
