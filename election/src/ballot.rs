use ahash::{HashSet, HashSetExt};

use crate::msg::{NodeId, Term};

/// Minimum number of grants needed to win an election over a fixed
/// cluster of `cluster_size` participants.
pub fn majority(cluster_size: u32) -> usize {
    (cluster_size / 2) as usize + 1
}

/// Whether a vote request may be granted. Term adoption must already
/// have happened; this only decides the grant. A participant grants at
/// most once per term, which is what bounds leaders per term to one.
pub fn grant_vote(my_term: Term, voted_for: Option<NodeId>, candidate_term: Term) -> bool {
    candidate_term == my_term && voted_for.is_none()
}

/// Votes granted to one candidacy. The candidate's own vote is counted
/// at construction.
#[derive(Clone, Debug)]
pub struct VoteTally {
    granted: HashSet<NodeId>,
}

impl VoteTally {
    pub fn new(candidate: NodeId) -> Self {
        let mut granted = HashSet::new();
        granted.insert(candidate);
        Self { granted }
    }

    pub fn record(&mut self, voter: NodeId) {
        self.granted.insert(voter);
    }

    pub fn count(&self) -> usize {
        self.granted.len()
    }

    pub fn has_majority(&self, cluster_size: u32) -> bool {
        self.granted.len() >= majority(cluster_size)
    }
}
