use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use log::{debug, warn};

use crate::config::ConflictPolicy;

use super::{EngineError, QueryDone};

struct PendingQuery {
    done: QueryDone,
    deadline: Option<Instant>,
}

/// Outstanding reporter queries, keyed by reporter name.
///
/// Results are matched by name, so any number of distinct queries may be in
/// flight and resolve in whatever order the rover answers them. A result for a
/// name always goes to its oldest waiter, so a late answer to a timed-out query
/// satisfies the next request for the same reporter.
pub struct ReporterRegistry {
    policy: ConflictPolicy,
    timeout: Duration,
    pending: HashMap<String, VecDeque<PendingQuery>>,
}

impl ReporterRegistry {
    pub fn new(policy: ConflictPolicy, timeout: Duration) -> Self {
        Self {
            policy,
            timeout,
            pending: HashMap::new(),
        }
    }

    /// Register a continuation for `name`.
    ///
    /// On rejection `done` is invoked with the same error that is returned.
    pub fn request(
        &mut self,
        name: &str,
        done: QueryDone,
        now: Instant,
    ) -> Result<(), EngineError> {
        let entry = PendingQuery {
            done,
            deadline: now.checked_add(self.timeout),
        };
        let waiting = self.pending.entry(name.to_string()).or_default();

        if !waiting.is_empty() {
            match self.policy {
                ConflictPolicy::Reject => {
                    let err = EngineError::DuplicateRequest(name.to_string());
                    (entry.done)(Err(err.clone()));
                    return Err(err);
                }
                ConflictPolicy::Queue => debug!("queueing second request for '{name}'"),
                ConflictPolicy::Supersede => {
                    warn!("request for '{name}' supersedes the pending one");
                    for old in waiting.drain(..) {
                        (old.done)(Err(EngineError::Superseded));
                    }
                }
            }
        }

        waiting.push_back(entry);
        Ok(())
    }

    /// Deliver a result to the oldest waiter for `name`.
    pub fn resolve(&mut self, name: &str, value: String) -> bool {
        let Some(waiting) = self.pending.get_mut(name) else {
            warn!("unexpected result for reporter '{name}': {value}");
            return false;
        };

        let Some(entry) = waiting.pop_front() else {
            warn!("unexpected result for reporter '{name}': {value}");
            return false;
        };
        if waiting.is_empty() {
            self.pending.remove(name);
        }

        debug!("reporter '{name}' resolved to {value}");
        (entry.done)(Ok(value));
        true
    }

    /// Release every waiter with `reason` and forget them.
    pub fn clear_all(&mut self, reason: &EngineError) -> usize {
        let mut released = 0;
        for (_, waiting) in self.pending.drain() {
            for entry in waiting {
                (entry.done)(Err(reason.clone()));
                released += 1;
            }
        }
        released
    }

    /// Fail every waiter whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        self.pending.retain(|name, waiting| {
            while waiting
                .front()
                .and_then(|entry| entry.deadline)
                .is_some_and(|deadline| deadline <= now)
            {
                if let Some(entry) = waiting.pop_front() {
                    warn!("request for reporter '{name}' timed out");
                    (entry.done)(Err(EngineError::Timeout));
                    expired += 1;
                }
            }
            !waiting.is_empty()
        });
        expired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .filter_map(|waiting| waiting.front().and_then(|entry| entry.deadline))
            .min()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pending.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn recorder() -> (QueryDone, mpsc::Receiver<Result<String, EngineError>>) {
        let (tx, rx) = mpsc::channel();
        (
            Box::new(move |result| {
                tx.send(result).unwrap();
            }),
            rx,
        )
    }

    #[test]
    fn results_match_by_name() {
        let now = Instant::now();
        let mut registry = ReporterRegistry::new(ConflictPolicy::Reject, TIMEOUT);
        let (x, x_rx) = recorder();
        let (y, y_rx) = recorder();

        registry.request("roverX", x, now).unwrap();
        registry.request("roverY", y, now).unwrap();
        assert_eq!(registry.len(), 2);

        assert!(registry.resolve("roverY", "3.0".to_string()));
        assert_eq!(y_rx.try_recv().unwrap(), Ok("3.0".to_string()));
        assert!(x_rx.try_recv().is_err());

        assert!(registry.resolve("roverX", "1.0".to_string()));
        assert_eq!(x_rx.try_recv().unwrap(), Ok("1.0".to_string()));
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let now = Instant::now();
        let mut registry = ReporterRegistry::new(ConflictPolicy::Reject, TIMEOUT);
        let (a, a_rx) = recorder();
        let (b, b_rx) = recorder();

        registry.request("roverX", a, now).unwrap();
        let res = registry.request("roverX", b, now);

        let err = EngineError::DuplicateRequest("roverX".to_string());
        assert_eq!(res, Err(err.clone()));
        assert_eq!(b_rx.try_recv().unwrap(), Err(err));
        assert_eq!(registry.len(), 1);

        registry.resolve("roverX", "5".to_string());
        assert_eq!(a_rx.try_recv().unwrap(), Ok("5".to_string()));
    }

    #[test]
    fn queued_same_name_resolves_in_order() {
        let now = Instant::now();
        let mut registry = ReporterRegistry::new(ConflictPolicy::Queue, TIMEOUT);
        let (a, a_rx) = recorder();
        let (b, b_rx) = recorder();

        registry.request("ultrasonicRangeCM", a, now).unwrap();
        registry.request("ultrasonicRangeCM", b, now).unwrap();

        registry.resolve("ultrasonicRangeCM", "40".to_string());
        registry.resolve("ultrasonicRangeCM", "38".to_string());

        assert_eq!(a_rx.try_recv().unwrap(), Ok("40".to_string()));
        assert_eq!(b_rx.try_recv().unwrap(), Ok("38".to_string()));
        assert!(!registry.contains("ultrasonicRangeCM"));
    }

    #[test]
    fn supersede_replaces_waiter() {
        let now = Instant::now();
        let mut registry = ReporterRegistry::new(ConflictPolicy::Supersede, TIMEOUT);
        let (a, a_rx) = recorder();
        let (b, b_rx) = recorder();

        registry.request("artifactId", a, now).unwrap();
        registry.request("artifactId", b, now).unwrap();

        assert_eq!(a_rx.try_recv().unwrap(), Err(EngineError::Superseded));
        registry.resolve("artifactId", "7".to_string());
        assert_eq!(b_rx.try_recv().unwrap(), Ok("7".to_string()));
    }

    #[test]
    fn unexpected_result_is_ignored() {
        let mut registry = ReporterRegistry::new(ConflictPolicy::Reject, TIMEOUT);

        assert!(!registry.resolve("roverX", "1.0".to_string()));
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_all_is_idempotent() {
        let now = Instant::now();
        let mut registry = ReporterRegistry::new(ConflictPolicy::Reject, TIMEOUT);
        let (a, a_rx) = recorder();
        let (b, b_rx) = recorder();

        registry.request("roverX", a, now).unwrap();
        registry.request("Obstacle_1_Y", b, now).unwrap();

        assert_eq!(registry.clear_all(&EngineError::Disconnected), 2);
        assert_eq!(registry.clear_all(&EngineError::Disconnected), 0);

        assert_eq!(a_rx.try_recv().unwrap(), Err(EngineError::Disconnected));
        assert_eq!(b_rx.try_recv().unwrap(), Err(EngineError::Disconnected));
        assert!(a_rx.try_recv().is_err());
    }

    #[test]
    fn expire_only_overdue_entries() {
        let now = Instant::now();
        let mut registry = ReporterRegistry::new(ConflictPolicy::Reject, TIMEOUT);
        let (a, a_rx) = recorder();
        let (b, b_rx) = recorder();

        registry.request("roverX", a, now).unwrap();
        registry.request("roverY", b, now + Duration::from_secs(5)).unwrap();
        assert_eq!(registry.next_deadline(), Some(now + TIMEOUT));

        assert_eq!(registry.expire(now + TIMEOUT), 1);
        assert_eq!(a_rx.try_recv().unwrap(), Err(EngineError::Timeout));
        assert!(b_rx.try_recv().is_err());
        assert!(registry.contains("roverY"));
        assert!(!registry.contains("roverX"));
    }

    #[test]
    fn unbounded_timeout_never_expires() {
        let now = Instant::now();
        let mut registry = ReporterRegistry::new(ConflictPolicy::Reject, Duration::MAX);
        let (a, a_rx) = recorder();

        registry.request("roverHeadingDegrees", a, now).unwrap();
        assert_eq!(registry.next_deadline(), None);
        assert_eq!(registry.expire(now + Duration::from_secs(86_400)), 0);

        assert!(registry.resolve("roverHeadingDegrees", "90".to_string()));
        assert_eq!(a_rx.try_recv().unwrap(), Ok("90".to_string()));
    }
}
