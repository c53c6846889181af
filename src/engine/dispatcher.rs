use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use log::{debug, warn};

use crate::{config::ConflictPolicy, protocol::Request};

use super::{CommandDone, EngineError};

struct PendingCommand {
    request: Request,
    done: CommandDone,
    deadline: Option<Instant>,
}

/// Tracks the single actuation the rover is executing.
///
/// Under [`ConflictPolicy::Queue`] later submissions wait in FIFO order and are
/// handed back to the caller for sending once the active one resolves.
///
/// Completions carry no identifier, so after a queued-mode timeout the queue
/// is held until the rover's late completion for the expired command arrives,
/// or one more timeout passes without it.
pub struct CommandDispatcher {
    policy: ConflictPolicy,
    timeout: Duration,
    active: Option<PendingCommand>,
    queued: VecDeque<PendingCommand>,
    draining: Option<Instant>,
}

impl CommandDispatcher {
    pub fn new(policy: ConflictPolicy, timeout: Duration) -> Self {
        Self {
            policy,
            timeout,
            active: None,
            queued: VecDeque::new(),
            draining: None,
        }
    }

    /// Record a new actuation.
    ///
    /// Returns the request that must go on the wire now, or `None` if it was
    /// queued behind the active one. On rejection `done` is invoked with the
    /// same error that is returned.
    pub fn submit(
        &mut self,
        request: Request,
        done: CommandDone,
        now: Instant,
    ) -> Result<Option<Request>, EngineError> {
        let mut pending = PendingCommand {
            request,
            done,
            deadline: None,
        };

        if self.active.is_some() || self.draining.is_some() {
            match self.policy {
                ConflictPolicy::Reject => {
                    (pending.done)(Err(EngineError::CommandBusy));
                    return Err(EngineError::CommandBusy);
                }
                ConflictPolicy::Queue => {
                    debug!("queueing {} behind active command", pending.request);
                    self.queued.push_back(pending);
                    return Ok(None);
                }
                ConflictPolicy::Supersede => {
                    if let Some(old) = self.active.take() {
                        warn!("{} supersedes pending {}", pending.request, old.request);
                        (old.done)(Err(EngineError::Superseded));
                    }
                }
            }
        }

        pending.deadline = now.checked_add(self.timeout);
        let request = pending.request.clone();
        self.active = Some(pending);
        Ok(Some(request))
    }

    /// Complete the active command with the rover's success flag.
    ///
    /// Returns the next queued request to send, if any.
    pub fn resolve(&mut self, success: bool, now: Instant) -> Option<Request> {
        let Some(pending) = self.active.take() else {
            if self.draining.take().is_some() {
                debug!("late completion for a timed-out command, resuming queue");
                return self.promote(now);
            }
            warn!("command completion received with no command pending");
            return None;
        };

        debug!("{} completed, success: {success}", pending.request);
        let result = if success {
            Ok(())
        } else {
            Err(EngineError::CommandFailed)
        };
        (pending.done)(result);

        self.promote(now)
    }

    /// Release the active command and everything queued behind it.
    pub fn clear(&mut self, reason: &EngineError) -> usize {
        let mut released = 0;
        for pending in self.active.take().into_iter().chain(self.queued.drain(..)) {
            (pending.done)(Err(reason.clone()));
            released += 1;
        }
        self.draining = None;
        released
    }

    /// Fail the active command if its deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Option<Request> {
        if self.draining.is_some_and(|until| until <= now) {
            debug!("no late completion arrived, resuming queue");
            self.draining = None;
            return self.promote(now);
        }

        let expired = self
            .active
            .as_ref()
            .and_then(|pending| pending.deadline)
            .is_some_and(|deadline| deadline <= now);
        if !expired {
            return None;
        }

        if let Some(pending) = self.active.take() {
            warn!("{} timed out", pending.request);
            (pending.done)(Err(EngineError::Timeout));
        }

        if self.policy == ConflictPolicy::Queue {
            self.draining = now.checked_add(self.timeout);
            if self.draining.is_some() {
                return None;
            }
        }
        self.promote(now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.active
            .as_ref()
            .and_then(|pending| pending.deadline)
            .or(self.draining)
    }

    pub fn is_pending(&self) -> bool {
        self.active.is_some()
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    fn promote(&mut self, now: Instant) -> Option<Request> {
        let mut next = self.queued.pop_front()?;
        next.deadline = now.checked_add(self.timeout);
        let request = next.request.clone();
        self.active = Some(next);
        Some(request)
    }
}
