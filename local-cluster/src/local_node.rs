use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use quorum_election::{
    msg::{LocalNodeSummary, NodeCtl, NodeId, ParticipantSummary, PeerMsg},
    timing::Timing,
    Participant,
};

pub enum LocalNodeMsg {
    Msg {
        msg: PeerMsg,
    },
    SummaryRequest {
        tx: oneshot::Sender<LocalNodeSummary>,
    },
    Kill,
    Revive,
    TriggerElection,
    Shutdown,
}

/// Simulates a node on a network but run locally. A dead node drops
/// traffic in both directions until revived.
pub struct LocalNode {
    pub id: NodeId,
    pub is_dead: bool,
    /// Channels for communicating with the fabric
    incoming_rx: mpsc::Receiver<LocalNodeMsg>,
    outgoing_tx: mpsc::Sender<(NodeId, NodeId, PeerMsg)>,
    /// Channels for communicating with the participant
    peer_tx: mpsc::Sender<PeerMsg>,
    participant_outgoing_rx: mpsc::Receiver<(NodeId, PeerMsg)>,
    ctl_tx: mpsc::Sender<NodeCtl>,
    shutdown_tx: mpsc::Sender<()>,
    /// Channel for testing
    summary_request_tx: mpsc::Sender<oneshot::Sender<ParticipantSummary>>,
}

impl LocalNode {
    pub fn new(
        cluster_size: u32,
        id: NodeId,
        timing: Timing,
        incoming_rx: mpsc::Receiver<LocalNodeMsg>,
        outgoing_tx: mpsc::Sender<(NodeId, NodeId, PeerMsg)>,
    ) -> Self {
        let (peer_tx, peer_rx) = mpsc::channel(1024);
        let (participant_outgoing_tx, participant_outgoing_rx) = mpsc::channel(1024);
        let (ctl_tx, ctl_rx) = mpsc::channel(1024);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (summary_request_tx, summary_request_rx) = mpsc::channel(1024);

        tokio::spawn(async move {
            let mut participant = Participant::new(
                cluster_size,
                id,
                timing,
                peer_rx,
                participant_outgoing_tx,
                ctl_rx,
                shutdown_rx,
                summary_request_rx,
            );
            participant.run().await;
        });

        Self {
            id,
            is_dead: false,
            incoming_rx,
            outgoing_tx,
            peer_tx,
            participant_outgoing_rx,
            ctl_tx,
            shutdown_tx,
            summary_request_tx,
        }
    }

    pub async fn run(&mut self) {
        loop {
            use LocalNodeMsg::*;
            tokio::select! {
                Some(m) = self.incoming_rx.recv() => {
                    match m {
                        Msg { msg } => self.receive_message(msg).await,
                        SummaryRequest { tx } => self.report_summary(tx).await,
                        Kill => self.kill().await,
                        Revive => self.revive().await,
                        TriggerElection => self.trigger_election().await,
                        Shutdown => {
                            let _ = self.shutdown_tx.send(()).await;
                            break;
                        }
                    }
                }
                Some((dest, msg)) = self.participant_outgoing_rx.recv() => {
                    if self.is_dead {
                        continue;
                    }
                    debug!(from = self.id, to = dest, ?msg, "sending");
                    self.outgoing_tx
                        .send((self.id, dest, msg))
                        .await
                        .expect("failed to forward PeerMsg to fabric");
                }
            }
        }
    }

    async fn receive_message(&mut self, msg: PeerMsg) {
        if self.is_dead {
            return;
        }
        self.peer_tx
            .send(msg)
            .await
            .expect("failed to forward PeerMsg");
    }

    async fn report_summary(&mut self, tx: oneshot::Sender<LocalNodeSummary>) {
        let (participant_tx, participant_rx) = oneshot::channel();
        self.summary_request_tx
            .send(participant_tx)
            .await
            .expect("failed to request summary");
        let participant = participant_rx.await.expect("no summary received");
        let _ = tx.send(LocalNodeSummary {
            id: self.id,
            is_dead: self.is_dead,
            participant,
        });
    }

    async fn kill(&mut self) {
        self.is_dead = true;
        self.ctl_tx
            .send(NodeCtl::Halt)
            .await
            .expect("failed to send Halt");
    }

    async fn revive(&mut self) {
        if self.is_dead {
            self.is_dead = false;
            self.ctl_tx
                .send(NodeCtl::Resume)
                .await
                .expect("failed to send Resume");
        }
    }

    async fn trigger_election(&mut self) {
        self.ctl_tx
            .send(NodeCtl::TriggerElection)
            .await
            .expect("failed to send TriggerElection");
    }
}
