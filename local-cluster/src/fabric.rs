use ahash::{HashMap, HashMapExt};
use rand::Rng;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::time::{Duration, Instant};

use quorum_election::msg::{NodeId, PeerMsg};

/// Network model knobs for a simulated run.
#[derive(Clone, Copy, Debug, Default)]
pub struct FabricConfig {
    /// Uniform per-message delivery delay in milliseconds, if any.
    pub delay_ms: Option<(u64, u64)>,
}

struct Envelope {
    deliver_at: Instant,
    seq: u64,
    dest: NodeId,
    msg: PeerMsg,
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.deliver_at == other.deliver_at && self.seq == other.seq
    }
}

impl Eq for Envelope {}

impl PartialOrd for Envelope {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Envelope {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and the earliest delivery
        // must surface first.
        other
            .deliver_at
            .cmp(&self.deliver_at)
            .then(other.seq.cmp(&self.seq))
    }
}

/// Delivers peer messages exactly once with per-link FIFO ordering,
/// optionally injecting a bounded random delay per message. No ordering
/// holds across different links.
pub struct Fabric {
    config: FabricConfig,
    seq: u64,
    in_flight: BinaryHeap<Envelope>,
    /// Latest scheduled delivery per (from, to) link; a later submission
    /// on the same link is never delivered earlier.
    link_clear_at: HashMap<(NodeId, NodeId), Instant>,
}

impl Fabric {
    pub fn new(config: FabricConfig) -> Self {
        Self {
            config,
            seq: 0,
            in_flight: BinaryHeap::new(),
            link_clear_at: HashMap::new(),
        }
    }

    pub fn submit(&mut self, from: NodeId, to: NodeId, msg: PeerMsg, now: Instant) {
        let mut deliver_at = now + self.random_delay();
        if let Some(clear_at) = self.link_clear_at.get(&(from, to)) {
            deliver_at = deliver_at.max(*clear_at);
        }
        self.link_clear_at.insert((from, to), deliver_at);
        self.seq += 1;
        self.in_flight.push(Envelope {
            deliver_at,
            seq: self.seq,
            dest: to,
            msg,
        });
    }

    /// Earliest pending delivery, if any.
    pub fn next_due(&self) -> Option<Instant> {
        self.in_flight.peek().map(|e| e.deliver_at)
    }

    /// Removes and returns every message whose delivery time has come,
    /// in delivery order.
    pub fn take_due(&mut self, now: Instant) -> Vec<(NodeId, PeerMsg)> {
        let mut due = Vec::new();
        while self
            .in_flight
            .peek()
            .is_some_and(|e| e.deliver_at <= now)
        {
            let e = self.in_flight.pop().unwrap();
            due.push((e.dest, e.msg));
        }
        due
    }

    fn random_delay(&self) -> Duration {
        match self.config.delay_ms {
            Some((low, high)) => {
                let mut rng = rand::thread_rng();
                Duration::from_millis(rng.gen_range(low..=high))
            }
            None => Duration::ZERO,
        }
    }
}
