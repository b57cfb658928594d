/// Logical epoch number. Orders elections and invalidates stale
/// leadership claims.
pub type Term = u32;
pub type NodeId = usize;

/// Messages exchanged between participants. Votes and heartbeats carry
/// no payload beyond the sender's term and identity.
#[derive(Clone, Debug)]
pub enum PeerMsg {
    VoteRequest {
        term: Term,
        candidate: NodeId,
    },
    /// Sent in response to every VoteRequest, refused or not, so a
    /// stale candidate can learn the responder's term.
    VoteReply {
        term: Term,
        granted: bool,
        voter: NodeId,
    },
    Heartbeat {
        term: Term,
        leader: NodeId,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RoleKind {
    Follower,
    Candidate,
    Leader,
}

/// Answer to a status query, for test assertions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParticipantSummary {
    pub id: NodeId,
    pub role: RoleKind,
    pub term: Term,
    pub leader_id: Option<NodeId>,
}

///////////////////////////////////////////////////
// The rest of this module supports local testing.
///////////////////////////////////////////////////

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalNodeSummary {
    pub id: NodeId,
    pub is_dead: bool,
    pub participant: ParticipantSummary,
}

/// Control protocol between a test harness and the cluster.
#[derive(Clone, Debug)]
pub enum CtlMsg {
    GetClusterState,
    SendClusterState { nodes: Vec<LocalNodeSummary> },
    Kill { dest: NodeId },
    Revive { dest: NodeId },
    TriggerElection { dest: NodeId },
    Shutdown,
}

/// Control messages delivered to a single participant, bypassing the
/// simulated network.
#[derive(Clone, Copy, Debug)]
pub enum NodeCtl {
    Halt,
    Resume,
    TriggerElection,
}
