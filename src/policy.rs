//! Route groups and the admission policy each one enforces.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::gate::{Decision, RequestGate, SweeperHandle};
use crate::path::{canonical_path, is_under};

pub const DEFAULT_LIMIT: u32 = 50;
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(60_000);

/// Maximum admissions per client per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    pub limit: u32,
    pub window: Duration,
}

impl GatePolicy {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    pub fn from_millis(limit: u32, window_ms: u64) -> Self {
        Self::new(limit, Duration::from_millis(window_ms))
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW)
    }
}

/// A path prefix with its own policy, written as `<prefix>=<limit>/<window_ms>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLimit {
    pub prefix: String,
    pub policy: GatePolicy,
}

impl FromStr for RouteLimit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRouteLimit(s.to_string());

        let (prefix, rule) = s.split_once('=').ok_or_else(invalid)?;
        let (limit, window_ms) = rule.split_once('/').ok_or_else(invalid)?;

        let prefix = prefix.trim();
        if !prefix.starts_with('/') {
            return Err(invalid());
        }
        let prefix = canonical_path(prefix);
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return Err(invalid());
        }
        let limit: u32 = limit.trim().parse().map_err(|_| invalid())?;
        let window_ms: u64 = window_ms.trim().parse().map_err(|_| invalid())?;
        if limit == 0 || window_ms == 0 {
            return Err(invalid());
        }

        Ok(Self {
            prefix: prefix.to_string(),
            policy: GatePolicy::from_millis(limit, window_ms),
        })
    }
}

/// A gate paired with the policy it applies.
#[derive(Clone)]
pub struct Guard {
    pub policy: GatePolicy,
    gate: RequestGate,
}

impl Guard {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            gate: RequestGate::new(),
        }
    }

    pub fn check(&self, client_id: &str) -> Decision {
        self.gate.check(client_id, &self.policy)
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }
}

/// One guard per configured route group plus a default for everything else.
///
/// Each group has its own table, so traffic on one group never spends
/// another group's budget.
#[derive(Clone)]
pub struct RouteGuards {
    routes: Vec<(String, Guard)>,
    default: Guard,
}

impl RouteGuards {
    /// Fails when two route limits name the same prefix.
    pub fn new(default: GatePolicy, route_limits: &[RouteLimit]) -> Result<Self, ConfigError> {
        let mut routes: Vec<(String, Guard)> = Vec::with_capacity(route_limits.len());
        for r in route_limits {
            if routes.iter().any(|(prefix, _)| *prefix == r.prefix) {
                return Err(ConfigError::DuplicateRouteLimit(r.prefix.clone()));
            }
            routes.push((r.prefix.clone(), Guard::new(r.policy)));
        }
        // longest prefix wins
        routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Ok(Self {
            routes,
            default: Guard::new(default),
        })
    }

    /// Guard for `path`: the longest prefix matching on a segment boundary.
    ///
    /// `path` must already be canonical (see [`crate::path::canonical_path`]).
    pub fn guard_for(&self, path: &str) -> &Guard {
        self.routes
            .iter()
            .find(|(prefix, _)| is_under(path, prefix))
            .map_or(&self.default, |(_, guard)| guard)
    }

    pub fn sweep(&self) -> usize {
        self.guards().map(|g| g.gate().sweep()).sum()
    }

    pub fn tracked_clients(&self) -> usize {
        self.guards().map(|g| g.gate().tracked_clients()).sum()
    }

    pub fn spawn_sweeper(&self, every: Duration) -> SweeperHandle {
        let guards = self.clone();
        SweeperHandle::spawn(every, move || {
            let removed = guards.sweep();
            crate::metrics::TRACKED_CLIENTS.set(guards.tracked_clients() as f64);
            removed
        })
    }

    fn guards(&self) -> impl Iterator<Item = &Guard> {
        self.routes
            .iter()
            .map(|(_, g)| g)
            .chain(std::iter::once(&self.default))
    }
}
