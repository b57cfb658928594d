use tokio::{
    sync::{mpsc, oneshot},
    time::{self, Instant},
};
use tracing::{debug, info};

pub mod ballot;
pub mod msg;
pub mod timing;

use ballot::VoteTally;
use msg::{NodeCtl, NodeId, ParticipantSummary, PeerMsg, RoleKind, Term};
use timing::Timing;

#[derive(Clone, Debug)]
pub enum Role {
    Follower,
    Candidate { tally: VoteTally },
    Leader,
}

impl Role {
    fn kind(&self) -> RoleKind {
        match self {
            Role::Follower => RoleKind::Follower,
            Role::Candidate { .. } => RoleKind::Candidate,
            Role::Leader => RoleKind::Leader,
        }
    }
}

/// One cluster member running the leader-election protocol.
#[derive(Debug)]
pub struct Participant {
    id: NodeId,
    /// We assume node ids go from 0 to cluster_size - 1
    cluster_size: u32,
    role: Role,
    /// Non-decreasing over the participant's lifetime.
    term: Term,
    /// Set at most once per term.
    voted_for: Option<NodeId>,
    leader_id: Option<NodeId>,
    timing: Timing,
    /// Next timeout (election timeout for non-leaders and heartbeat
    /// cadence for the leader)
    next_deadline: Instant,
    /// A halted participant processes nothing until resumed.
    halted: bool,
    // Channels
    /// PeerMsgs sent between participants
    incoming_rx: mpsc::Receiver<PeerMsg>,
    outgoing_tx: mpsc::Sender<(NodeId, PeerMsg)>,
    /// Fault injection from the harness
    ctl_rx: mpsc::Receiver<NodeCtl>,
    shutdown_rx: mpsc::Receiver<()>,
    /// Channel for testing
    summary_request_rx: mpsc::Receiver<oneshot::Sender<ParticipantSummary>>,
}

impl Participant {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cluster_size: u32,
        id: NodeId,
        timing: Timing,
        incoming_rx: mpsc::Receiver<PeerMsg>,
        outgoing_tx: mpsc::Sender<(NodeId, PeerMsg)>,
        ctl_rx: mpsc::Receiver<NodeCtl>,
        shutdown_rx: mpsc::Receiver<()>,
        summary_request_rx: mpsc::Receiver<oneshot::Sender<ParticipantSummary>>,
    ) -> Self {
        Self {
            id,
            cluster_size,
            role: Role::Follower,
            term: 0,
            voted_for: None,
            leader_id: None,
            timing,
            next_deadline: Instant::now() + timing.random_election_timeout(),
            halted: false,
            incoming_rx,
            outgoing_tx,
            ctl_rx,
            shutdown_rx,
            summary_request_rx,
        }
    }

    pub async fn run(&mut self) {
        loop {
            let sleep = time::sleep_until(self.next_deadline);
            tokio::select! {
                Some(msg) = self.incoming_rx.recv() => {
                    if !self.halted {
                        self.receive_message(msg).await;
                    }
                }
                Some(ctl) = self.ctl_rx.recv() => {
                    self.receive_ctl(ctl).await;
                }
                Some(reply_tx) = self.summary_request_rx.recv() => {
                    let _ = reply_tx.send(self.summary());
                }
                _ = self.shutdown_rx.recv() => {
                    return;
                }
                _ = sleep, if !self.halted => {
                    self.handle_timeout().await;
                }
            }
        }
    }

    /// Receive protocol message from a peer.
    async fn receive_message(&mut self, msg: PeerMsg) {
        use PeerMsg::*;
        match msg {
            VoteRequest { term, candidate } => self.receive_vote_request(term, candidate).await,
            VoteReply {
                term,
                granted,
                voter,
            } => self.receive_vote_reply(term, granted, voter).await,
            Heartbeat { term, leader } => self.receive_heartbeat(term, leader),
        }
    }

    async fn receive_ctl(&mut self, ctl: NodeCtl) {
        use NodeCtl::*;
        match ctl {
            Halt => {
                self.halted = true;
            }
            Resume => {
                if self.halted {
                    self.halted = false;
                    // No durable state: a revived participant rejoins as a
                    // follower with a fresh deadline.
                    self.transition_to_follower();
                }
            }
            TriggerElection => {
                if !self.halted && !matches!(self.role, Role::Leader) {
                    self.start_election().await;
                }
            }
        }
    }

    async fn handle_timeout(&mut self) {
        match &self.role {
            Role::Candidate { tally } => {
                // Election timeout: candidacy failed (split vote or lost
                // replies). Back to follower, eligible to retry.
                debug!(
                    id = self.id,
                    term = self.term,
                    votes = tally.count(),
                    "candidacy timed out"
                );
                self.transition_to_follower();
            }
            Role::Follower => {
                self.start_election().await;
            }
            Role::Leader => {
                self.broadcast(PeerMsg::Heartbeat {
                    term: self.term,
                    leader: self.id,
                })
                .await;
                self.next_deadline = Instant::now() + self.timing.heartbeat_interval();
            }
        }
    }

    async fn start_election(&mut self) {
        self.term += 1;
        self.voted_for = Some(self.id);
        self.leader_id = None;
        self.reset_deadline();
        let tally = VoteTally::new(self.id);
        info!(id = self.id, term = self.term, "starting election");
        if tally.has_majority(self.cluster_size) {
            // Single-node cluster: the self-vote already is a majority.
            self.role = Role::Candidate { tally };
            self.become_leader().await;
            return;
        }
        self.role = Role::Candidate { tally };
        self.broadcast(PeerMsg::VoteRequest {
            term: self.term,
            candidate: self.id,
        })
        .await;
    }

    async fn receive_vote_request(&mut self, term: Term, candidate: NodeId) {
        if term > self.term {
            self.adopt_term(term);
        }
        let granted = ballot::grant_vote(self.term, self.voted_for, term);
        if granted {
            self.voted_for = Some(candidate);
            self.reset_deadline();
            debug!(id = self.id, term, candidate, "vote granted");
        }
        let reply = PeerMsg::VoteReply {
            term: self.term,
            granted,
            voter: self.id,
        };
        self.outgoing_tx
            .send((candidate, reply))
            .await
            .expect("failed to send VoteReply");
    }

    async fn receive_vote_reply(&mut self, term: Term, granted: bool, voter: NodeId) {
        if term > self.term {
            // A refusal from a responder on a newer term ends this candidacy.
            self.adopt_term(term);
            return;
        }
        if !granted || term != self.term {
            return;
        }
        if let Role::Candidate { ref mut tally } = self.role {
            tally.record(voter);
            debug!(
                id = self.id,
                term,
                voter,
                votes = tally.count(),
                "vote received"
            );
            if tally.has_majority(self.cluster_size) {
                self.become_leader().await;
            }
        }
    }

    fn receive_heartbeat(&mut self, term: Term, leader: NodeId) {
        if term < self.term {
            // Stale leader; refuse silently.
            return;
        }
        if term > self.term {
            self.adopt_term(term);
        }
        if matches!(self.role, Role::Candidate { .. }) {
            // A valid leader for an equal-or-newer term pre-empts an
            // in-flight candidacy.
            self.transition_to_follower();
        }
        if !matches!(self.role, Role::Leader) {
            self.leader_id = Some(leader);
            self.reset_deadline();
        }
    }

    async fn become_leader(&mut self) {
        info!(id = self.id, term = self.term, "won election");
        self.role = Role::Leader;
        self.leader_id = Some(self.id);
        self.broadcast(PeerMsg::Heartbeat {
            term: self.term,
            leader: self.id,
        })
        .await;
        self.next_deadline = Instant::now() + self.timing.heartbeat_interval();
    }

    /// Move to a newer term, forgetting this term's vote and stepping
    /// down if currently candidate or leader.
    fn adopt_term(&mut self, term: Term) {
        self.term = term;
        self.voted_for = None;
        if !matches!(self.role, Role::Follower) {
            self.transition_to_follower();
        }
    }

    fn transition_to_follower(&mut self) {
        self.reset_deadline();
        self.role = Role::Follower;
    }

    fn reset_deadline(&mut self) {
        self.next_deadline = Instant::now() + self.timing.random_election_timeout();
    }

    async fn broadcast(&mut self, msg: PeerMsg) {
        for peer in 0..self.cluster_size as usize {
            if peer == self.id {
                continue;
            }
            self.outgoing_tx
                .send((peer, msg.clone()))
                .await
                .expect("failed to send PeerMsg");
        }
    }

    fn summary(&self) -> ParticipantSummary {
        ParticipantSummary {
            id: self.id,
            role: self.role.kind(),
            term: self.term,
            leader_id: self.leader_id,
        }
    }
}
