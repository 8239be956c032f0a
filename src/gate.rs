//! Per-client admission control with fixed-window counters.
//!
//! A `RequestGate` owns the table of client windows. Expiry is lazy (an
//! expired window is treated as absent on the next admit) and a sweeper
//! task evicts windows that see no further traffic.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::policy::GatePolicy;

// Window state for one client key
#[derive(Debug, Clone, Copy)]
struct ClientWindowRecord {
    count: u32,
    window_expiry: Instant,
}

impl ClientWindowRecord {
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            window_expiry: now + window,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.window_expiry
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed. `remaining` admissions are left in the window.
    Admitted { remaining: u32 },
    /// The client's budget is spent until the window expires.
    Rejected { retry_after: Duration },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

/// In-memory admission gate keyed by client identifier.
///
/// Cloning is cheap and every clone shares the same table.
#[derive(Clone, Default)]
pub struct RequestGate {
    records: Arc<DashMap<String, ClientWindowRecord>>,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the request is admitted, `false` if the client is over budget.
    pub fn admit(&self, client_id: &str, policy: &GatePolicy) -> bool {
        self.check(client_id, policy).is_admitted()
    }

    pub fn admit_at(&self, client_id: &str, policy: &GatePolicy, now: Instant) -> bool {
        self.check_at(client_id, policy, now).is_admitted()
    }

    pub fn check(&self, client_id: &str, policy: &GatePolicy) -> Decision {
        self.check_at(client_id, policy, Instant::now())
    }

    /// Applies the fixed-window rule for `client_id` as of `now`.
    ///
    /// The entry guard holds the shard lock for the whole read-check-write,
    /// so concurrent calls for one key never admit past `policy.limit`.
    /// Rejections leave the record untouched.
    pub fn check_at(&self, client_id: &str, policy: &GatePolicy, now: Instant) -> Decision {
        match self.records.entry(client_id.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(ClientWindowRecord::open(now, policy.window));
                Decision::Admitted {
                    remaining: policy.limit.saturating_sub(1),
                }
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();

                if record.is_expired(now) {
                    *record = ClientWindowRecord::open(now, policy.window);
                    return Decision::Admitted {
                        remaining: policy.limit.saturating_sub(1),
                    };
                }

                if record.count < policy.limit {
                    record.count += 1;
                    Decision::Admitted {
                        remaining: policy.limit - record.count,
                    }
                } else {
                    Decision::Rejected {
                        retry_after: record.window_expiry.saturating_duration_since(now),
                    }
                }
            }
        }
    }

    /// Count in the client's live window, `None` if absent or expired.
    pub fn current_count(&self, client_id: &str, now: Instant) -> Option<u32> {
        self.records
            .get(client_id)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.count)
    }

    /// Number of windows in the table, expired-but-unswept ones included.
    pub fn tracked_clients(&self) -> usize {
        self.records.len()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Removes windows that have expired as of `now` and returns how many.
    ///
    /// A window replaced by a fresh one in the meantime is not expired and
    /// stays, so each record is evicted at most once.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Spawns a background task that sweeps this gate every `every`.
    pub fn spawn_sweeper(&self, every: Duration) -> SweeperHandle {
        let gate = self.clone();
        SweeperHandle::spawn(every, move || gate.sweep())
    }
}

/// Handle to a periodic sweep task. The task is aborted when the handle drops.
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Runs `sweep` on a fixed tick until the handle is dropped.
    pub fn spawn<F>(every: Duration, mut sweep: F) -> Self
    where
        F: FnMut() -> usize + Send + 'static,
    {
        let every = every.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = sweep();
                if removed > 0 {
                    tracing::debug!(removed, "evicted expired client windows");
                }
            }
        });
        Self { task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(limit: u32, window_ms: u64) -> GatePolicy {
        GatePolicy::new(limit, Duration::from_millis(window_ms))
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn third_request_in_window_is_rejected_then_window_resets() {
        let gate = RequestGate::new();
        let p = policy(2, 1000);
        let t0 = Instant::now();

        let results: Vec<bool> = [0, 10, 20]
            .iter()
            .map(|ms| gate.admit_at("1.2.3.4", &p, at(t0, *ms)))
            .collect();
        assert_eq!(results, vec![true, true, false]);

        assert!(gate.admit_at("1.2.3.4", &p, at(t0, 1100)));
        assert_eq!(gate.current_count("1.2.3.4", at(t0, 1100)), Some(1));
    }

    #[test]
    fn clients_are_isolated() {
        let gate = RequestGate::new();
        let p = policy(2, 1000);
        let t0 = Instant::now();

        for ms in [0, 5] {
            assert!(gate.admit_at("1.1.1.1", &p, at(t0, ms)));
            assert!(gate.admit_at("2.2.2.2", &p, at(t0, ms)));
        }
        assert!(!gate.admit_at("1.1.1.1", &p, at(t0, 10)));
        assert_eq!(gate.current_count("2.2.2.2", at(t0, 10)), Some(2));
    }

    #[test]
    fn rejection_does_not_increment() {
        let gate = RequestGate::new();
        let p = policy(1, 1000);
        let t0 = Instant::now();

        assert!(gate.admit_at("a", &p, t0));
        for ms in 1..20 {
            assert!(!gate.admit_at("a", &p, at(t0, ms)));
        }
        assert_eq!(gate.current_count("a", at(t0, 20)), Some(1));
    }

    #[test]
    fn window_is_measured_from_first_request() {
        let gate = RequestGate::new();
        let p = policy(2, 1000);
        let t0 = Instant::now();

        assert!(gate.admit_at("a", &p, t0));
        assert!(gate.admit_at("a", &p, at(t0, 900)));
        // a later admission does not extend the window
        assert!(!gate.admit_at("a", &p, at(t0, 999)));
        assert!(gate.admit_at("a", &p, at(t0, 1000)));
    }

    #[test]
    fn decision_reports_remaining_and_retry_after() {
        let gate = RequestGate::new();
        let p = policy(2, 1000);
        let t0 = Instant::now();

        assert_eq!(
            gate.check_at("a", &p, t0),
            Decision::Admitted { remaining: 1 }
        );
        assert_eq!(
            gate.check_at("a", &p, at(t0, 100)),
            Decision::Admitted { remaining: 0 }
        );
        assert_eq!(
            gate.check_at("a", &p, at(t0, 400)),
            Decision::Rejected {
                retry_after: Duration::from_millis(600)
            }
        );
    }

    #[test]
    fn sentinel_key_is_a_shared_bucket() {
        let gate = RequestGate::new();
        let p = policy(1, 60_000);
        let t0 = Instant::now();

        assert!(gate.admit_at("unknown", &p, t0));
        assert!(!gate.admit_at("unknown", &p, at(t0, 1)));
    }

    #[test]
    fn sweep_removes_each_expired_window_once() {
        let gate = RequestGate::new();
        let p = policy(5, 1000);
        let t0 = Instant::now();

        gate.admit_at("a", &p, t0);
        gate.admit_at("b", &p, at(t0, 500));

        assert_eq!(gate.sweep_at(at(t0, 999)), 0);
        assert_eq!(gate.sweep_at(at(t0, 1000)), 1);
        assert_eq!(gate.sweep_at(at(t0, 1000)), 0);
        assert_eq!(gate.tracked_clients(), 1);

        // admit after eviction starts a fresh window
        assert!(gate.admit_at("a", &p, at(t0, 1200)));
        assert_eq!(gate.current_count("a", at(t0, 1200)), Some(1));
    }

    #[test]
    fn sweep_keeps_window_reopened_by_lazy_expiry() {
        let gate = RequestGate::new();
        let p = policy(5, 1000);
        let t0 = Instant::now();

        gate.admit_at("a", &p, t0);
        gate.admit_at("a", &p, at(t0, 1500));

        assert_eq!(gate.sweep_at(at(t0, 1600)), 0);
        assert_eq!(gate.current_count("a", at(t0, 1600)), Some(1));
    }

    #[test]
    fn concurrent_admits_never_exceed_limit() {
        let gate = RequestGate::new();
        let p = policy(10, 60_000);
        let now = Instant::now();

        let admitted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..64)
                .map(|_| s.spawn(|| gate.admit_at("shared", &p, now)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(admitted, 10);
        assert_eq!(gate.current_count("shared", now), Some(10));
    }

    #[test]
    fn concurrent_admits_below_limit_all_pass() {
        let gate = RequestGate::new();
        let p = policy(100, 60_000);
        let now = Instant::now();

        let admitted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|| gate.admit_at("shared", &p, now)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(admitted, 16);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_idle_clients() {
        let gate = RequestGate::new();
        let p = policy(2, 1000);
        let _sweeper = gate.spawn_sweeper(Duration::from_millis(250));

        assert!(gate.admit("idle", &p));
        assert_eq!(gate.tracked_clients(), 1);

        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(gate.tracked_clients(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sweeper_stops() {
        let gate = RequestGate::new();
        let p = policy(2, 1000);
        let sweeper = gate.spawn_sweeper(Duration::from_millis(250));
        assert!(sweeper.is_running());
        drop(sweeper);

        assert!(gate.admit("idle", &p));
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(gate.tracked_clients(), 1);

        // lazy expiry still applies
        assert!(gate.admit("idle", &p));
        assert_eq!(gate.current_count("idle", Instant::now()), Some(1));
    }
}
