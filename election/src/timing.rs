use rand::Rng;
use std::time::Duration;

pub const ELECTION_TIMEOUT_MS_LOW: u64 = 150;
pub const ELECTION_TIMEOUT_MS_HIGH: u64 = 300;
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Election timeout range and heartbeat cadence for a cluster run.
#[derive(Clone, Copy, Debug)]
pub struct Timing {
    election_timeout_ms: (u64, u64),
    heartbeat_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self::new(
            ELECTION_TIMEOUT_MS_LOW,
            ELECTION_TIMEOUT_MS_HIGH,
            HEARTBEAT_INTERVAL,
        )
    }
}

impl Timing {
    /// Panics if the timeout range is empty or the heartbeat cadence
    /// could not suppress a follower's election timeout.
    pub fn new(timeout_low_ms: u64, timeout_high_ms: u64, heartbeat_interval: Duration) -> Self {
        assert!(
            timeout_low_ms < timeout_high_ms,
            "election timeout range is empty"
        );
        assert!(
            heartbeat_interval < Duration::from_millis(timeout_low_ms),
            "heartbeat interval must undercut the election timeout"
        );
        Self {
            election_timeout_ms: (timeout_low_ms, timeout_high_ms),
            heartbeat_interval,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn max_election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms.1)
    }

    /// Freshly randomized per call. Independent draws are what break
    /// ties among simultaneously expiring followers.
    pub fn random_election_timeout(&self) -> Duration {
        let mut rng = rand::thread_rng();
        let ms: u64 = rng.gen_range(self.election_timeout_ms.0..self.election_timeout_ms.1);
        Duration::from_millis(ms)
    }
}
