use ahash::{HashMap, HashMapExt};
use tokio::{
    sync::{mpsc, oneshot},
    time::{self, Duration, Instant},
};
use tracing::{debug, warn};

pub mod fabric;
pub mod local_cluster_tester;
pub mod local_node;

use crate::fabric::{Fabric, FabricConfig};
use crate::local_node::{LocalNode, LocalNodeMsg};
use quorum_election::msg::{CtlMsg, NodeId, PeerMsg};
use quorum_election::timing::Timing;

/// How often the coordinator wakes to pump the fabric when no delivery
/// is due sooner.
const PUMP_INTERVAL: Duration = Duration::from_millis(10);

/// Knobs for one simulated cluster run.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClusterConfig {
    pub timing: Timing,
    pub fabric: FabricConfig,
}

/// Owns the membership list and the fabric: constructs one node task
/// per participant and shuttles their messages.
pub struct Cluster {
    /// Channels for sending to individual nodes
    node_txs: HashMap<NodeId, mpsc::Sender<LocalNodeMsg>>,
    fabric: Fabric,
    /// Channel for messages from the cluster runner
    ctl_requests: mpsc::Receiver<CtlMsg>,
    /// Channel for sending messages to the cluster runner
    ctl_replies: mpsc::Sender<CtlMsg>,
    /// Channel for messages from nodes, tagged (from, to, msg)
    outgoing_rx: mpsc::Receiver<(NodeId, NodeId, PeerMsg)>,
}

impl Cluster {
    pub fn new(
        node_count: u32,
        config: ClusterConfig,
        ctl_requests: mpsc::Receiver<CtlMsg>,
        ctl_replies: mpsc::Sender<CtlMsg>,
    ) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(1024);
        let mut node_txs = HashMap::new();
        for id in 0..node_count {
            let (incoming_tx, incoming_rx) = mpsc::channel(1024);
            let id = id as usize;
            let tx = outgoing_tx.clone();
            tokio::spawn(async move {
                let mut node = LocalNode::new(node_count, id, config.timing, incoming_rx, tx);
                node.run().await;
            });
            node_txs.insert(id, incoming_tx);
        }
        Self {
            node_txs,
            fabric: Fabric::new(config.fabric),
            ctl_requests,
            ctl_replies,
            outgoing_rx,
        }
    }

    pub async fn run(&mut self) {
        loop {
            self.deliver_due().await;

            let next_pump = Instant::now() + PUMP_INTERVAL;
            let wake_at = self
                .fabric
                .next_due()
                .map_or(next_pump, |due| due.min(next_pump));
            let sleep = time::sleep_until(wake_at);
            tokio::select! {
                Some(msg) = self.ctl_requests.recv() => {
                    debug!(?msg, "cluster received CtlMsg");
                    if matches!(msg, CtlMsg::Shutdown) {
                        return self.shutdown().await;
                    }
                    self.process_ctl_msg(msg).await;
                }
                Some((from, dest, msg)) = self.outgoing_rx.recv() => {
                    self.fabric.submit(from, dest, msg, Instant::now());
                }
                _ = sleep => {}
            }
        }
    }

    async fn deliver_due(&mut self) {
        for (dest, msg) in self.fabric.take_due(Instant::now()) {
            self.send_to_node(dest, LocalNodeMsg::Msg { msg }).await;
        }
    }

    /// Process messages sent from the cluster runner
    async fn process_ctl_msg(&mut self, msg: CtlMsg) {
        use CtlMsg::*;
        match msg {
            GetClusterState => {
                let mut nodes = Vec::new();
                for id in 0..self.node_txs.len() {
                    let (tx, rx) = oneshot::channel();
                    self.send_to_node(id, LocalNodeMsg::SummaryRequest { tx })
                        .await;
                    nodes.push(rx.await.expect("no node summary received"));
                }
                self.ctl_replies
                    .send(SendClusterState { nodes })
                    .await
                    .expect("failed to send SendClusterState");
            }
            SendClusterState { .. } => {
                warn!("cluster shouldn't receive SendClusterState");
            }
            Kill { dest } => self.send_to_node(dest, LocalNodeMsg::Kill).await,
            Revive { dest } => self.send_to_node(dest, LocalNodeMsg::Revive).await,
            TriggerElection { dest } => {
                self.send_to_node(dest, LocalNodeMsg::TriggerElection).await
            }
            Shutdown => unreachable!("Shutdown is handled by the run loop"),
        }
    }

    async fn send_to_node(&mut self, dest: NodeId, msg: LocalNodeMsg) {
        self.node_txs
            .get_mut(&dest)
            .expect("unknown node id")
            .send(msg)
            .await
            .expect("failed to send LocalNodeMsg");
    }

    async fn shutdown(&mut self) {
        debug!("local cluster shutting down");
        for n_tx in self.node_txs.values() {
            let _ = n_tx.send(LocalNodeMsg::Shutdown).await;
        }
    }
}
