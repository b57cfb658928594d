use color_eyre::eyre::{bail, eyre, Result};
use quorum_election::msg::{CtlMsg, LocalNodeSummary, NodeId, ParticipantSummary, RoleKind, Term};
use std::time::Duration;
use tokio::{sync::mpsc, time::sleep};

use crate::{Cluster, ClusterConfig};

pub type Nodes = Vec<LocalNodeSummary>;

/// Harness for driving a simulated cluster from tests: status queries,
/// fault injection, and the standard liveness/safety assertions.
pub struct LocalClusterRunner {
    tx: mpsc::Sender<CtlMsg>,
    rx: mpsc::Receiver<CtlMsg>,
}

impl LocalClusterRunner {
    pub fn new(node_count: u32) -> Self {
        Self::with_config(node_count, ClusterConfig::default())
    }

    pub fn with_config(node_count: u32, config: ClusterConfig) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(1024);
        let (replies_tx, replies_rx) = mpsc::channel(1024);
        let mut c = Cluster::new(node_count, config, requests_rx, replies_tx);
        tokio::spawn(async move {
            c.run().await;
        });
        Self {
            tx: requests_tx,
            rx: replies_rx,
        }
    }

    pub async fn get_cluster_state(&mut self) -> Nodes {
        self.tx.send(CtlMsg::GetClusterState).await.unwrap();

        if let Some(CtlMsg::SendClusterState { nodes }) = self.rx.recv().await {
            Ok(nodes)
        } else {
            Err(eyre!("No state received!"))
        }
        .unwrap()
    }

    /// The observable contract for assertions: role, term, and last
    /// known leader of one participant.
    pub async fn status(&mut self, id: NodeId) -> ParticipantSummary {
        self.get_cluster_state()
            .await
            .into_iter()
            .find(|n| n.id == id)
            .map(|n| n.participant)
            .expect("unknown participant id")
    }

    pub async fn sleep(&mut self, ms: u64) {
        sleep(Duration::from_millis(ms)).await;
    }

    pub async fn kill(&mut self, id: NodeId) {
        self.tx
            .send(CtlMsg::Kill { dest: id })
            .await
            .expect("Failed to send Kill");
    }

    pub async fn revive(&mut self, id: NodeId) {
        self.tx
            .send(CtlMsg::Revive { dest: id })
            .await
            .expect("Failed to send Revive");
    }

    pub async fn trigger_election(&mut self, id: NodeId) {
        self.tx
            .send(CtlMsg::TriggerElection { dest: id })
            .await
            .expect("Failed to send TriggerElection");
    }

    // Only one leader at the highest term
    pub async fn check_one_leader(&mut self) -> Result<LocalNodeSummary> {
        let iterations = 40;
        for _ in 0..iterations {
            self.sleep(100).await;
            let nodes = &self.get_cluster_state().await;
            let highest_leaders = leaders(nodes);
            match highest_leaders.len() {
                1 => return Ok(highest_leaders[0].clone()),
                l if l > 1 => bail!("More than one leader on the same term!"),
                _ => {}
            }
        }
        bail!("No leader elected in time!")
    }

    pub async fn has_no_leader(&mut self) -> bool {
        leaders(&self.get_cluster_state().await).is_empty()
    }

    pub async fn current_term(&mut self) -> Term {
        let nodes = &self.get_cluster_state().await;
        let mut term = nodes[0].participant.term;
        for node in nodes.iter().skip(1) {
            let node_term = node.participant.term;
            if node_term > term {
                term = node_term
            }
        }
        term
    }

    /// All live participants agree on the current term.
    pub async fn live_term_agreement(&mut self) -> bool {
        let nodes = &self.get_cluster_state().await;
        let mut live = nodes.iter().filter(|n| !n.is_dead);
        let Some(first) = live.next() else {
            return true;
        };
        live.all(|n| n.participant.term == first.participant.term)
    }
}

impl Drop for LocalClusterRunner {
    fn drop(&mut self) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tx.send(CtlMsg::Shutdown)
                .await
                .expect("Failed to send Shutdown");
        });
    }
}

/// Live leaders at the highest term held by any live leader.
fn leaders(nodes: &Nodes) -> Vec<LocalNodeSummary> {
    let mut highest_term = 0;
    let mut highest_leaders = Vec::new();
    for node in nodes {
        if node.is_dead {
            continue;
        }
        if node.participant.role != RoleKind::Leader {
            continue;
        }
        if node.participant.term > highest_term {
            highest_term = node.participant.term;
            highest_leaders.clear();
        }
        if node.participant.term == highest_term {
            highest_leaders.push(node.clone());
        }
    }
    highest_leaders
}
