// Queue Domain Model
//
// The queue is the only mutable aggregate of the engine. Fields are private:
// every change goes through a transition method that checks its precondition
// and leaves the invariants intact, and stores re-run `validate` on commit.

use super::code::PublicCode;
use super::error::{DomainError, Result};
use super::estimator::ServiceEstimate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Internal queue identifier (storage key)
pub type QueueId = String;

/// Member identifier
pub type MemberId = String;

/// Owner identifier
pub type OwnerId = String;

/// No-show lock applied after an advance that leaves someone to serve (120s)
pub const NO_SHOW_LOCK_MS: i64 = 120_000;

/// Maximum queue name length (characters)
pub const MAX_NAME_LEN: usize = 100;

/// Upper bound for a single break request or extension (24h)
pub const MAX_BREAK_MINUTES: u32 = 24 * 60;

const MINUTE_MS: i64 = 60_000;

/// What happens to the serving pointer when someone ahead of it leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeavePolicy {
    /// Decrement the pointer so it keeps referring to the same member
    #[default]
    PreserveRank,
    /// Leave the pointer untouched; the member after the served one slides
    /// into the served slot
    KeepIndex,
}

/// Observable sub-state of a queue at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QueuePhase {
    NotStarted,
    Serving,
    AwaitingArrival { until: i64 },
    OnBreak { ends_at: i64 },
}

/// Result of a successful pointer advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceEffect {
    pub served_index: usize,
    pub current_index: usize,
    pub lock_until: Option<i64>,
    pub sampled: bool,
}

/// Result of a member leaving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveEffect {
    pub removed_index: usize,
    pub pointer_shifted: bool,
    pub lock_cleared: bool,
}

/// Persisted shape of a queue. Field names are part of the storage contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub id: QueueId,
    pub public_code: String,
    pub name: String,
    pub owner_id: OwnerId,
    pub created_at: i64,
    pub members: Vec<MemberId>,
    pub current_index: usize,
    pub has_started: bool,
    pub is_on_break: bool,
    pub break_ends_at: Option<i64>,
    pub next_lock_until: Option<i64>,
    pub last_advance_at: Option<i64>,
    pub avg_serve_ms: i64,
    pub samples: i64,
}

/// Queue aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QueueRecord", into = "QueueRecord")]
pub struct Queue {
    id: QueueId,
    public_code: PublicCode,
    name: String,
    owner_id: OwnerId,
    created_at: i64,
    members: Vec<MemberId>,
    current_index: usize,
    has_started: bool,
    is_on_break: bool,
    break_ends_at: Option<i64>,
    next_lock_until: Option<i64>,
    last_advance_at: Option<i64>,
    estimate: ServiceEstimate,
}

impl Queue {
    /// Create a new, empty, not-started queue
    ///
    /// # Arguments
    ///
    /// * `id` - Storage key (injected, not generated)
    /// * `public_code` - Shareable code (uniqueness is checked by the caller)
    /// * `name` - Display name, trimmed
    /// * `owner_id` - Owner allowed to issue commands
    /// * `created_at` - Creation timestamp in epoch ms (injected)
    pub fn create(
        id: impl Into<String>,
        public_code: PublicCode,
        name: &str,
        owner_id: &str,
        created_at: i64,
    ) -> Result<Self> {
        let id = id.into();
        validate_identity("queue id", &id)?;
        validate_identity("owner id", owner_id)?;
        let name = Self::validate_name(name)?;

        Ok(Self {
            id,
            public_code,
            name,
            owner_id: owner_id.to_string(),
            created_at,
            members: Vec::new(),
            current_index: 0,
            has_started: false,
            is_on_break: false,
            break_ends_at: None,
            next_lock_until: None,
            last_advance_at: None,
            estimate: ServiceEstimate::default(),
        })
    }

    /// Trim and check a queue name, returning the stored form
    pub fn validate_name(name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::Validation("Queue name cannot be empty".into()));
        }
        if trimmed.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::Validation(format!(
                "Queue name too long (max {} characters)",
                MAX_NAME_LEN
            )));
        }
        Ok(trimmed.to_string())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn public_code(&self) -> &PublicCode {
        &self.public_code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn has_started(&self) -> bool {
        self.has_started
    }

    pub fn is_on_break(&self) -> bool {
        self.is_on_break
    }

    pub fn break_ends_at(&self) -> Option<i64> {
        self.break_ends_at
    }

    pub fn next_lock_until(&self) -> Option<i64> {
        self.next_lock_until
    }

    pub fn last_advance_at(&self) -> Option<i64> {
        self.last_advance_at
    }

    pub fn estimate(&self) -> ServiceEstimate {
        self.estimate
    }

    pub fn index_of(&self, member_id: &str) -> Option<usize> {
        self.members.iter().position(|m| m == member_id)
    }

    pub fn contains(&self, member_id: &str) -> bool {
        self.index_of(member_id).is_some()
    }

    /// Member at the serving pointer, if anyone is left
    pub fn currently_serving(&self) -> Option<&str> {
        if !self.has_started {
            return None;
        }
        self.members.get(self.current_index).map(String::as_str)
    }

    /// True while a no-show lock is set and still in the future
    pub fn lock_active(&self, now: i64) -> bool {
        self.next_lock_until.is_some_and(|until| until > now)
    }

    pub fn phase(&self, now: i64) -> QueuePhase {
        if !self.has_started {
            return QueuePhase::NotStarted;
        }
        if self.is_on_break {
            return QueuePhase::OnBreak {
                ends_at: self.break_ends_at.unwrap_or(now),
            };
        }
        match self.next_lock_until {
            Some(until) if until > now => QueuePhase::AwaitingArrival { until },
            _ => QueuePhase::Serving,
        }
    }

    pub fn ensure_owner(&self, actor: &str) -> Result<()> {
        if self.owner_id != actor {
            return Err(DomainError::NotOwner {
                actor: actor.to_string(),
            });
        }
        Ok(())
    }

    /// Check every aggregate invariant
    pub fn validate(&self) -> Result<()> {
        validate_identity("queue id", &self.id)?;
        validate_identity("owner id", &self.owner_id)?;
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidRecord("empty name".into()));
        }
        if self.current_index > self.members.len() {
            return Err(DomainError::InvalidRecord(format!(
                "currentIndex {} beyond {} members",
                self.current_index,
                self.members.len()
            )));
        }

        let mut seen = HashSet::with_capacity(self.members.len());
        for member in &self.members {
            if member.trim().is_empty() {
                return Err(DomainError::InvalidRecord("blank member id".into()));
            }
            if !seen.insert(member.as_str()) {
                return Err(DomainError::InvalidRecord(format!(
                    "member {} appears twice",
                    member
                )));
            }
        }

        if self.next_lock_until.is_some()
            && (!self.has_started || self.is_on_break || self.current_index == self.members.len())
        {
            return Err(DomainError::InvalidRecord(
                "nextLockUntil set with nobody awaiting arrival".into(),
            ));
        }
        if self.is_on_break != self.break_ends_at.is_some() {
            return Err(DomainError::InvalidRecord(
                "isOnBreak and breakEndsAt disagree".into(),
            ));
        }
        if self.estimate.samples < 0 || self.estimate.avg_serve_ms <= 0 {
            return Err(DomainError::InvalidRecord(format!(
                "bad estimator state ({}, {})",
                self.estimate.avg_serve_ms, self.estimate.samples
            )));
        }
        Ok(())
    }

    /// Check that `next` is a legal successor of `self`: same identity,
    /// `hasStarted` never reverts, and all invariants hold.
    pub fn ensure_successor(&self, next: &Queue) -> Result<()> {
        if next.id != self.id
            || next.public_code != self.public_code
            || next.name != self.name
            || next.owner_id != self.owner_id
            || next.created_at != self.created_at
        {
            return Err(DomainError::InvalidRecord(format!(
                "immutable fields of queue {} changed",
                self.id
            )));
        }
        if self.has_started && !next.has_started {
            return Err(DomainError::InvalidRecord("hasStarted reverted".into()));
        }
        next.validate()
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    pub fn join(&mut self, member_id: &str) -> Result<()> {
        validate_identity("member id", member_id)?;
        if self.contains(member_id) {
            return Err(DomainError::AlreadyJoined {
                member_id: member_id.to_string(),
            });
        }
        self.members.push(member_id.to_string());
        Ok(())
    }

    /// Remove the member and apply `policy` to the serving pointer.
    ///
    /// When the member being served leaves, or nobody is left to serve, any
    /// no-show lock is dropped: the arrival it was waiting for cannot happen.
    pub fn leave(&mut self, member_id: &str, policy: LeavePolicy) -> Result<LeaveEffect> {
        let removed_index = self
            .index_of(member_id)
            .ok_or_else(|| DomainError::NotAMember {
                member_id: member_id.to_string(),
            })?;
        self.members.remove(removed_index);

        let mut pointer_shifted = false;
        let mut lock_cleared = false;

        if removed_index < self.current_index {
            if policy == LeavePolicy::PreserveRank {
                self.current_index -= 1;
                pointer_shifted = true;
            }
        } else if removed_index == self.current_index {
            lock_cleared = self.next_lock_until.take().is_some();
        }

        self.current_index = self.current_index.min(self.members.len());
        if self.current_index == self.members.len() {
            lock_cleared |= self.next_lock_until.take().is_some();
        }

        Ok(LeaveEffect {
            removed_index,
            pointer_shifted,
            lock_cleared,
        })
    }

    // ------------------------------------------------------------------
    // Serving
    // ------------------------------------------------------------------

    /// NotStarted -> Active. Returns false when already started.
    pub fn start(&mut self, now: i64) -> bool {
        if self.has_started {
            return false;
        }
        self.has_started = true;
        self.last_advance_at = Some(now);
        if self.estimate.avg_serve_ms <= 0 {
            self.estimate = ServiceEstimate::default();
        }
        true
    }

    /// Move the serving pointer forward by one.
    ///
    /// Preconditions: started, not on break, no active no-show lock, and
    /// someone left to serve.
    pub fn advance(&mut self, now: i64) -> Result<AdvanceEffect> {
        if !self.has_started {
            return Err(DomainError::NotStarted);
        }
        if self.is_on_break {
            return Err(DomainError::OnBreak {
                ends_at: self.break_ends_at.unwrap_or(now),
            });
        }
        if let Some(until) = self.next_lock_until.filter(|until| *until > now) {
            return Err(DomainError::Locked { until });
        }
        if self.current_index >= self.members.len() {
            return Err(DomainError::NothingToServe);
        }

        let served_index = self.current_index;
        let sampled = self
            .estimate
            .record(self.last_advance_at.map(|last| now - last));

        self.current_index = (self.current_index + 1).min(self.members.len());
        self.last_advance_at = Some(now);
        self.next_lock_until = if self.current_index < self.members.len() {
            Some(now + NO_SHOW_LOCK_MS)
        } else {
            None
        };

        Ok(AdvanceEffect {
            served_index,
            current_index: self.current_index,
            lock_until: self.next_lock_until,
            sampled,
        })
    }

    /// Drop the no-show lock regardless of expiry. Returns false if none was set.
    pub fn clear_lock(&mut self) -> bool {
        self.next_lock_until.take().is_some()
    }

    /// Lock value if it is due for auto-advance at `now`
    pub fn expired_lock(&self, now: i64) -> Option<i64> {
        if !self.has_started || self.is_on_break {
            return None;
        }
        self.next_lock_until.filter(|until| *until <= now)
    }

    // ------------------------------------------------------------------
    // Breaks
    // ------------------------------------------------------------------

    /// Pause serving for `minutes`. Returns the break end.
    pub fn start_break(&mut self, minutes: u32, now: i64) -> Result<i64> {
        validate_break_minutes(minutes)?;
        if let Some(ends_at) = self.break_ends_at.filter(|_| self.is_on_break) {
            return Err(DomainError::AlreadyOnBreak { ends_at });
        }
        if let Some(until) = self.next_lock_until.filter(|until| *until > now) {
            return Err(DomainError::Locked { until });
        }

        // an expired lock would otherwise survive into the break
        self.next_lock_until = None;
        let ends_at = now + i64::from(minutes) * MINUTE_MS;
        self.is_on_break = true;
        self.break_ends_at = Some(ends_at);
        Ok(ends_at)
    }

    /// Push the break end out by `minutes`. Returns the new end.
    pub fn extend_break(&mut self, minutes: u32) -> Result<i64> {
        validate_break_minutes(minutes)?;
        let ends_at = match (self.is_on_break, self.break_ends_at) {
            (true, Some(ends_at)) => ends_at + i64::from(minutes) * MINUTE_MS,
            _ => return Err(DomainError::NotOnBreak),
        };
        self.break_ends_at = Some(ends_at);
        Ok(ends_at)
    }

    /// Resume serving. Returns false if the queue was not on break.
    pub fn end_break(&mut self) -> bool {
        if !self.is_on_break {
            return false;
        }
        self.is_on_break = false;
        self.break_ends_at = None;
        true
    }

    /// Break end if the break is due to be cleared at `now`
    pub fn expired_break(&self, now: i64) -> Option<i64> {
        if !self.is_on_break {
            return None;
        }
        self.break_ends_at.filter(|ends_at| *ends_at <= now)
    }
}

fn validate_identity(label: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{} cannot be empty", label)));
    }
    Ok(())
}

fn validate_break_minutes(minutes: u32) -> Result<()> {
    if minutes == 0 || minutes > MAX_BREAK_MINUTES {
        return Err(DomainError::Validation(format!(
            "Break length must be between 1 and {} minutes",
            MAX_BREAK_MINUTES
        )));
    }
    Ok(())
}

impl TryFrom<QueueRecord> for Queue {
    type Error = DomainError;

    fn try_from(record: QueueRecord) -> Result<Self> {
        let public_code = PublicCode::parse(&record.public_code)
            .map_err(|e| DomainError::InvalidRecord(e.to_string()))?;

        let queue = Self {
            id: record.id,
            public_code,
            name: record.name,
            owner_id: record.owner_id,
            created_at: record.created_at,
            members: record.members,
            current_index: record.current_index,
            has_started: record.has_started,
            is_on_break: record.is_on_break,
            break_ends_at: record.break_ends_at,
            next_lock_until: record.next_lock_until,
            last_advance_at: record.last_advance_at,
            estimate: ServiceEstimate {
                avg_serve_ms: record.avg_serve_ms,
                samples: record.samples,
            },
        };
        queue.validate()?;
        Ok(queue)
    }
}

impl From<Queue> for QueueRecord {
    fn from(queue: Queue) -> Self {
        Self {
            id: queue.id,
            public_code: queue.public_code.into(),
            name: queue.name,
            owner_id: queue.owner_id,
            created_at: queue.created_at,
            members: queue.members,
            current_index: queue.current_index,
            has_started: queue.has_started,
            is_on_break: queue.is_on_break,
            break_ends_at: queue.break_ends_at,
            next_lock_until: queue.next_lock_until,
            last_advance_at: queue.last_advance_at,
            avg_serve_ms: queue.estimate.avg_serve_ms,
            samples: queue.estimate.samples,
        }
    }
}
