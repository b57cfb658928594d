use rand::prelude::SliceRandom;

use quorum_election::msg::{NodeId, RoleKind};
use quorum_election::timing::ELECTION_TIMEOUT_MS_HIGH;
use quorum_local_cluster::fabric::FabricConfig;
use quorum_local_cluster::local_cluster_tester::LocalClusterRunner;
use quorum_local_cluster::ClusterConfig;

/// Leader election property tests. The clock starts paused so timers
/// auto-advance deterministically and runs take milliseconds of real
/// time.

#[tokio::test(start_paused = true)]
async fn initial_election() {
    let mut cr = LocalClusterRunner::new(5);
    assert!(cr.has_no_leader().await);

    let leader = cr.check_one_leader().await.unwrap();
    let term1 = cr.current_term().await;
    assert!(term1 >= 1);

    cr.sleep(500).await;
    assert!(cr.live_term_agreement().await);

    // Heartbeats keep suppressing follower timeouts, so the term and
    // the leader stay put.
    cr.sleep(1500).await;
    assert_eq!(term1, cr.current_term().await);
    assert_eq!(leader.id, cr.check_one_leader().await.unwrap().id);
}

#[tokio::test(start_paused = true)]
async fn leader_failover_within_two_timeouts() {
    let node_count: usize = 5;
    let mut cr = LocalClusterRunner::new(node_count as u32);

    let leader1 = cr.check_one_leader().await.unwrap();
    let term1 = leader1.participant.term;
    cr.kill(leader1.id).await;

    // A replacement must appear within 2x the maximum election timeout.
    let mut new_leader = None;
    for _ in 0..(2 * ELECTION_TIMEOUT_MS_HIGH / 50) {
        cr.sleep(50).await;
        let live_leaders: Vec<_> = cr
            .get_cluster_state()
            .await
            .into_iter()
            .filter(|n| !n.is_dead && n.participant.role == RoleKind::Leader)
            .collect();
        assert!(live_leaders.len() <= 1);
        if let Some(leader) = live_leaders.into_iter().next() {
            new_leader = Some(leader);
            break;
        }
    }
    let new_leader = new_leader.expect("no leader elected within two election timeouts");
    assert_ne!(new_leader.id, leader1.id);
    assert_eq!(new_leader.participant.term, term1 + 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_failovers() {
    let node_count: usize = 5;
    let mut cr = LocalClusterRunner::new(node_count as u32);

    cr.check_one_leader().await.unwrap();
    for _ in 0..5 {
        // Kill two nodes; the remaining three are still a majority, so
        // either the current leader survives or a new one is elected.
        let mut choices: Vec<usize> = (0..node_count).collect();
        choices.shuffle(&mut rand::thread_rng());
        let n1 = choices[0];
        let n2 = choices[1];
        cr.kill(n1).await;
        cr.kill(n2).await;

        cr.check_one_leader().await.unwrap();

        cr.revive(n1).await;
        cr.revive(n2).await;
    }
    cr.check_one_leader().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn no_leader_without_quorum() {
    let node_count: usize = 5;
    let mut cr = LocalClusterRunner::new(node_count as u32);

    // Take down three of five before anyone can be elected, leaving the
    // two survivors short of a majority.
    for id in 0..3 {
        cr.kill(id).await;
    }
    cr.trigger_election(3).await;
    cr.trigger_election(4).await;

    cr.sleep(2 * ELECTION_TIMEOUT_MS_HIGH).await;
    assert!(cr.has_no_leader().await);
    // Both survivors kept retrying with fresh terms and deadlines.
    assert!(cr.current_term().await > 1);

    // Restoring one node restores the quorum.
    cr.revive(2).await;
    let leader = cr.check_one_leader().await.unwrap();
    assert!(leader.participant.term >= 2);
}

#[tokio::test(start_paused = true)]
async fn simultaneous_candidacies_converge() {
    // Two nodes, both triggered in the same instant: neither can win
    // the contested term, and the randomized retry deadlines decide it.
    let mut cr = LocalClusterRunner::new(2);

    cr.trigger_election(0).await;
    cr.trigger_election(1).await;

    let leader = cr.check_one_leader().await.unwrap();
    assert!(leader.participant.term >= 2);
    let other = (leader.id + 1) % 2;
    assert_eq!(cr.status(other).await.leader_id, Some(leader.id));
}

#[tokio::test(start_paused = true)]
async fn revived_leader_rejoins_as_follower() {
    let node_count: usize = 3;
    let mut cr = LocalClusterRunner::new(node_count as u32);

    let leader1 = cr.check_one_leader().await.unwrap();
    cr.kill(leader1.id).await;

    let leader2 = cr.check_one_leader().await.unwrap();
    assert_ne!(leader2.id, leader1.id);
    assert!(leader2.participant.term > leader1.participant.term);

    cr.revive(leader1.id).await;
    cr.sleep(500).await;

    // The old leader adopted the newer term from heartbeats and follows.
    let status = cr.status(leader1.id).await;
    assert_eq!(status.role, RoleKind::Follower);
    assert_eq!(status.term, leader2.participant.term);
    assert_eq!(status.leader_id, Some(leader2.id));
    assert_eq!(leader2.id, cr.check_one_leader().await.unwrap().id);
}

#[tokio::test(start_paused = true)]
async fn terms_never_decrease() {
    let node_count: usize = 3;
    let mut cr = LocalClusterRunner::new(node_count as u32);

    let mut last_terms = vec![0u32; node_count];
    let mut killed: Option<NodeId> = None;
    for round in 0..30 {
        cr.sleep(100).await;
        for node in cr.get_cluster_state().await {
            assert!(
                node.participant.term >= last_terms[node.id],
                "term of participant {} went backwards",
                node.id
            );
            last_terms[node.id] = node.participant.term;
        }
        // Disturb the cluster partway through the run.
        if round == 10 {
            let leader = cr.check_one_leader().await.unwrap();
            cr.kill(leader.id).await;
            killed = Some(leader.id);
        }
        if round == 20 {
            cr.revive(killed.unwrap()).await;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn safety_holds_under_message_delay() {
    let config = ClusterConfig {
        fabric: FabricConfig {
            delay_ms: Some((5, 40)),
        },
        ..Default::default()
    };
    let mut cr = LocalClusterRunner::with_config(5, config);

    // check_one_leader fails the test if it ever observes two leaders
    // on the same term.
    let leader1 = cr.check_one_leader().await.unwrap();
    cr.kill(leader1.id).await;

    let leader2 = cr.check_one_leader().await.unwrap();
    assert!(leader2.participant.term > leader1.participant.term);

    cr.revive(leader1.id).await;
    cr.sleep(1000).await;
    cr.check_one_leader().await.unwrap();
}
