//! Per-entity local mirror of a remote document.
//!
//! A [`Mirror`] holds the value shown to the shopper and decides, for every
//! local mutation, remote snapshot, and write acknowledgement, what the local
//! value becomes and which store write (if any) to issue next. It does no I/O
//! itself; the engine performs the writes and feeds results back.
//!
//! Rules:
//!
//! - Local mutations apply immediately. At most one write per entity is in
//!   flight; mutations made meanwhile are coalesced into one follow-up write
//!   carrying the latest local value.
//! - A remote snapshot replaces the local value only when nothing is
//!   pending. Otherwise it is remembered and the local value converges to
//!   whichever store value is newest once the pending writes settle.
//! - A failed write leaves the local value in place and keeps the mirror
//!   dirty until [`Mirror::retry`] or [`Mirror::revert`].
//! - Replacement writes ([`Mirror::replace_after_write`]) leave the local
//!   value alone until the store confirms them.

use crate::store::Revision;

use super::write::{WriteCompleter, WriteHandle};

/// A store write the engine should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest<T> {
    pub seq: u64,
    pub value: T,
}

/// The outcome of a local mutation.
#[derive(Debug)]
pub struct Mutation<T, R> {
    /// Whatever the mutating closure returned.
    pub result: R,
    /// Completion of the write that will carry this mutation.
    pub handle: WriteHandle,
    /// A write to start now. `None` when the mutation was queued behind an
    /// in-flight write.
    pub request: Option<WriteRequest<T>>,
}

/// What happened to a remote snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The local value now equals the snapshot.
    Applied,
    /// Held back until pending local writes settle.
    Deferred,
    /// Not newer than what the mirror has already seen.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Optimistic,
    Replacement,
}

#[derive(Debug)]
struct InFlight<T> {
    seq: u64,
    kind: WriteKind,
    /// Value being written by a replacement.
    target: Option<T>,
    completer: WriteCompleter,
}

#[derive(Debug)]
enum Queued<T> {
    Local(WriteCompleter),
    Replace(T, WriteCompleter),
}

/// Local mirror of one remote entity.
#[derive(Debug)]
pub struct Mirror<T> {
    local: T,
    /// Newest store value seen, and its revision.
    confirmed: Option<T>,
    revision: Option<Revision>,
    in_flight: Option<InFlight<T>>,
    queued: Option<Queued<T>>,
    failure: Option<String>,
    next_seq: u64,
}

impl<T: Clone + Default> Default for Mirror<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + Default> Mirror<T> {
    #[must_use]
    pub const fn new(initial: T) -> Self {
        Self {
            local: initial,
            confirmed: None,
            revision: None,
            in_flight: None,
            queued: None,
            failure: None,
            next_seq: 1,
        }
    }

    /// The value shown to the shopper.
    #[must_use]
    pub const fn local(&self) -> &T {
        &self.local
    }

    /// Revision of the newest store value seen.
    #[must_use]
    pub const fn revision(&self) -> Option<Revision> {
        self.revision
    }

    /// Whether local changes are not yet confirmed by the store.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.in_flight.is_some() || self.queued.is_some() || self.failure.is_some()
    }

    /// Whether a write is currently in flight.
    #[must_use]
    pub const fn is_writing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Reason of the last failed write, while it is unresolved.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    fn issue(&mut self, kind: WriteKind, value: T, completer: WriteCompleter) -> WriteRequest<T> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let target = (kind == WriteKind::Replacement).then(|| value.clone());
        self.in_flight = Some(InFlight {
            seq,
            kind,
            target,
            completer,
        });
        WriteRequest { seq, value }
    }

    /// Apply `change` to the local value and schedule it for persistence.
    pub fn mutate<R>(&mut self, change: impl FnOnce(&mut T) -> R) -> Mutation<T, R> {
        // A newer edit builds on top of any replacement still waiting.
        match self.queued.take() {
            Some(Queued::Replace(value, completer)) => {
                self.local = value;
                self.queued = Some(Queued::Local(completer));
            }
            None => {
                if let Some(target) = self.in_flight.as_ref().and_then(|f| f.target.clone()) {
                    self.local = target;
                }
            }
            queued => self.queued = queued,
        }

        let result = change(&mut self.local);
        self.failure = None;

        if self.in_flight.is_none() {
            let completer = WriteCompleter::new();
            let handle = completer.handle();
            let request = self.issue(WriteKind::Optimistic, self.local.clone(), completer);
            return Mutation {
                result,
                handle,
                request: Some(request),
            };
        }

        let handle = match &self.queued {
            Some(Queued::Local(completer) | Queued::Replace(_, completer)) => completer.handle(),
            None => {
                let completer = WriteCompleter::new();
                let handle = completer.handle();
                self.queued = Some(Queued::Local(completer));
                handle
            }
        };
        Mutation {
            result,
            handle,
            request: None,
        }
    }

    /// Schedule `value` to replace the stored entity without touching the
    /// local value until the store confirms it.
    ///
    /// Supersedes any queued local write; the local value it carried is
    /// replaced as well once the replacement commits.
    pub fn replace_after_write(&mut self, value: T) -> (WriteHandle, Option<WriteRequest<T>>) {
        if self.in_flight.is_none() {
            let completer = WriteCompleter::new();
            let handle = completer.handle();
            let request = self.issue(WriteKind::Replacement, value, completer);
            return (handle, Some(request));
        }

        let completer = match self.queued.take() {
            Some(Queued::Local(completer) | Queued::Replace(_, completer)) => completer,
            None => WriteCompleter::new(),
        };
        let handle = completer.handle();
        self.queued = Some(Queued::Replace(value, completer));
        (handle, None)
    }

    /// Record a remote snapshot.
    pub fn apply_remote(&mut self, revision: Revision, value: T) -> RemoteOutcome {
        if self.revision.is_some_and(|seen| revision <= seen) {
            return RemoteOutcome::Ignored;
        }
        self.revision = Some(revision);
        if self.is_dirty() {
            self.confirmed = Some(value);
            return RemoteOutcome::Deferred;
        }
        self.confirmed = Some(value.clone());
        self.local = value;
        RemoteOutcome::Applied
    }

    /// Record that the remote document does not exist.
    ///
    /// Only honored before any version has been seen, since mirrored
    /// entities are cleared rather than deleted.
    pub fn apply_absent(&mut self) -> RemoteOutcome {
        if self.revision.is_some() {
            return RemoteOutcome::Ignored;
        }
        if self.is_dirty() {
            return RemoteOutcome::Deferred;
        }
        self.local = T::default();
        RemoteOutcome::Applied
    }

    /// Record the result of write `seq`: the stored revision and value, or
    /// the failure reason. Returns the next write to start, if any.
    pub fn acknowledge(
        &mut self,
        seq: u64,
        outcome: Result<(Revision, T), String>,
    ) -> Option<WriteRequest<T>> {
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.seq == seq => in_flight,
            other => {
                tracing::debug!(seq, "ignoring acknowledgement of unknown write");
                self.in_flight = other;
                return None;
            }
        };

        match outcome {
            Ok((revision, stored)) => {
                in_flight.completer.commit(revision);
                // Every write carries the whole local value, so success
                // also covers earlier failed ones.
                self.failure = None;
                if self.revision.is_none_or(|seen| revision > seen) {
                    self.revision = Some(revision);
                    self.confirmed = Some(stored);
                }
            }
            Err(reason) => {
                if in_flight.kind == WriteKind::Optimistic {
                    self.failure = Some(reason.clone());
                }
                in_flight.completer.fail(reason);
            }
        }

        if let Some(next) = self.take_queued() {
            return Some(next);
        }
        if !self.is_dirty() {
            if let Some(confirmed) = &self.confirmed {
                self.local = confirmed.clone();
            }
        }
        None
    }

    fn take_queued(&mut self) -> Option<WriteRequest<T>> {
        match self.queued.take()? {
            Queued::Local(completer) => {
                let value = self.local.clone();
                Some(self.issue(WriteKind::Optimistic, value, completer))
            }
            Queued::Replace(value, completer) => {
                Some(self.issue(WriteKind::Replacement, value, completer))
            }
        }
    }

    /// Re-issue the local value after a failed write.
    pub fn retry(&mut self) -> Option<(WriteHandle, WriteRequest<T>)> {
        if self.failure.is_none() || self.in_flight.is_some() {
            return None;
        }
        self.failure = None;
        let completer = WriteCompleter::new();
        let handle = completer.handle();
        let request = self.issue(WriteKind::Optimistic, self.local.clone(), completer);
        Some((handle, request))
    }

    /// Drop unpersisted local changes after a failed write and fall back to
    /// the newest store value. Returns whether anything was reverted.
    pub fn revert(&mut self) -> bool {
        if self.failure.is_none() || self.in_flight.is_some() {
            return false;
        }
        self.failure = None;
        self.local = self.confirmed.clone().unwrap_or_default();
        true
    }
}
