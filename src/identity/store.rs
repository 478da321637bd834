//! Identity store
//!
//! Live records are held in memory behind three unique indices: platform
//! ID, canonical email and code digest.
//!
//! Two locks, always taken in this order:
//!
//! - The writer lock serializes mutations and owns the journal. A mutation
//!   holds it across its unique-key check, the journal append (or rewrite)
//!   and the publish, which is what makes check-then-write atomic.
//! - The index latch guards the in-memory maps. It is held only to read a
//!   record or to check and publish one, never across journal I/O, so
//!   lookups from other members never wait on fsync or compaction.
//!
//! Store calls are blocking; async callers run mutations on the blocking
//! pool.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::errors::{StoreError, StoreResult, UniqueKey};
use super::journal::{self, Journal};
use super::record::{
    IdentityRecord, Lookup, NewIdentity, StateChange, StoreStats, VerificationState,
};
use crate::crypto::{code_digest, generate_code};
use crate::platform::PlatformId;
use crate::policy::normalize_email;

/// A freshly created `Pending` record and the raw code issued for it
///
/// The raw code is never stored; this is the only place it exists.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub record: IdentityRecord,
}

/// Outcome of a create-or-replace into `Verified`
#[derive(Debug, Clone)]
pub struct Replaced {
    pub record: IdentityRecord,
    /// The `Pending` record that was replaced, if any
    pub previous: Option<IdentityRecord>,
}

#[derive(Debug, Default)]
struct Index {
    records: HashMap<PlatformId, IdentityRecord>,
    by_email: HashMap<String, PlatformId>,
    by_code: HashMap<String, PlatformId>,
}

impl Index {
    /// Rebuild from journal frames; the last frame for a platform ID wins
    fn replay(frames: Vec<IdentityRecord>) -> StoreResult<Self> {
        let mut index = Index::default();
        for (position, record) in frames.into_iter().enumerate() {
            // Any other overlap is damage
            index
                .check_unique(&record)
                .map_err(|e| StoreError::Corruption {
                    offset: 0,
                    reason: format!("frame {} violates uniqueness: {}", position, e),
                })?;
            index.install(record);
        }
        Ok(index)
    }

    fn resolve(&self, lookup: Lookup<'_>) -> Option<&IdentityRecord> {
        let id = match lookup {
            Lookup::PlatformId(id) => id,
            Lookup::Email(email) => self.by_email.get(&normalize_email(email))?,
            Lookup::Code(code) => self.by_code.get(&code_digest(code))?,
        };
        self.records.get(id)
    }

    /// Unique-key check for inserting `record` in place of whatever `platform_id` holds now
    fn check_unique(&self, record: &IdentityRecord) -> StoreResult<()> {
        if let Some(owner) = self.by_email.get(&record.email) {
            if *owner != record.platform_id {
                return Err(StoreError::Conflict(UniqueKey::Email));
            }
        }
        if let Some(owner) = self.by_code.get(&record.code_digest) {
            if *owner != record.platform_id {
                return Err(StoreError::CodeCollision);
            }
        }
        Ok(())
    }

    /// Publish `record`, replacing any record with the same platform ID
    fn install(&mut self, record: IdentityRecord) -> Option<IdentityRecord> {
        let previous = self.unindex(&record.platform_id);
        self.by_email
            .insert(record.email.clone(), record.platform_id.clone());
        self.by_code
            .insert(record.code_digest.clone(), record.platform_id.clone());
        self.records.insert(record.platform_id.clone(), record);
        previous
    }

    fn unindex(&mut self, id: &PlatformId) -> Option<IdentityRecord> {
        let previous = self.records.remove(id)?;
        self.by_email.remove(&previous.email);
        self.by_code.remove(&previous.code_digest);
        Some(previous)
    }

    /// Journal image: live records minus `removed`, plus `added`, oldest first
    fn image(&self, removed: &PlatformId, added: Option<&IdentityRecord>) -> Vec<IdentityRecord> {
        let mut live: Vec<IdentityRecord> = self
            .records
            .values()
            .filter(|r| r.platform_id != *removed)
            .chain(added)
            .cloned()
            .collect();
        live.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        live
    }
}

/// Where mutations are made durable
#[derive(Debug)]
enum Backing {
    Memory,
    Durable(Journal),
    ReadOnly,
}

/// Persistent identity store
#[derive(Debug)]
pub struct IdentityStore {
    index: RwLock<Index>,
    writer: Mutex<Backing>,
}

impl IdentityStore {
    /// Open the store under `data_dir`, replaying its journal
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        let (journal, frames) = Journal::open(data_dir)?;
        Ok(Self::with(Index::replay(frames)?, Backing::Durable(journal)))
    }

    /// Replay the journal for inspection; every mutation fails with `ReadOnly`
    ///
    /// Creates nothing on disk; a missing journal is an empty store.
    pub fn open_read_only(data_dir: &Path) -> StoreResult<Self> {
        let frames = journal::replay(data_dir)?;
        Ok(Self::with(Index::replay(frames)?, Backing::ReadOnly))
    }

    /// A store with no backing file
    pub fn in_memory() -> Self {
        Self::with(Index::default(), Backing::Memory)
    }

    fn with(index: Index, backing: Backing) -> Self {
        Self {
            index: RwLock::new(index),
            writer: Mutex::new(backing),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Index>> {
        self.index.read().map_err(|_| StoreError::Poisoned)
    }

    fn publish(&self) -> StoreResult<RwLockWriteGuard<'_, Index>> {
        self.index.write().map_err(|_| StoreError::Poisoned)
    }

    fn writer(&self) -> StoreResult<MutexGuard<'_, Backing>> {
        self.writer.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Make `record` durable as one more frame
    fn append(backing: &mut Backing, record: &IdentityRecord) -> StoreResult<()> {
        match backing {
            Backing::Memory => Ok(()),
            Backing::Durable(journal) => journal.append(record),
            Backing::ReadOnly => Err(StoreError::ReadOnly),
        }
    }

    /// Rewrite the journal without `removed` (and with `added`)
    ///
    /// The image is copied out under the latch; the rewrite runs without it.
    fn compact(
        &self,
        backing: &mut Backing,
        removed: &PlatformId,
        added: Option<&IdentityRecord>,
    ) -> StoreResult<()> {
        match backing {
            Backing::Memory => Ok(()),
            Backing::ReadOnly => Err(StoreError::ReadOnly),
            Backing::Durable(journal) => {
                let image = self.read()?.image(removed, added);
                journal.rewrite(&image)
            }
        }
    }

    /// Create a `Pending` record with a fresh code
    ///
    /// Fails with `Conflict` if the platform ID or email is already live.
    pub fn create(&self, new: NewIdentity) -> StoreResult<IssuedCode> {
        let code = generate_code();
        let record = IdentityRecord {
            platform_id: new.platform_id,
            display_name: new.display_name,
            email: normalize_email(&new.email),
            code_digest: code_digest(&code),
            team_role: None,
            state: VerificationState::Pending,
            restriction_reason: None,
            created_at: Utc::now(),
            verified_at: None,
        };

        let mut backing = self.writer()?;
        {
            let index = self.read()?;
            if index.records.contains_key(&record.platform_id) {
                return Err(StoreError::Conflict(UniqueKey::PlatformId));
            }
            index.check_unique(&record)?;
        }
        Self::append(&mut backing, &record)?;
        self.publish()?.install(record.clone());

        Ok(IssuedCode { code, record })
    }

    /// Create or replace a member's record directly in `Verified`
    ///
    /// An existing record must still be `Pending`; it is replaced and its
    /// code retired. The email must not belong to another live record.
    pub fn replace_verified(&self, new: NewIdentity, team: Option<String>) -> StoreResult<Replaced> {
        let now = Utc::now();
        let record = IdentityRecord {
            platform_id: new.platform_id,
            display_name: new.display_name,
            email: normalize_email(&new.email),
            // Never issued; keeps the code index total
            code_digest: code_digest(&generate_code()),
            team_role: team,
            state: VerificationState::Verified,
            restriction_reason: None,
            created_at: now,
            verified_at: Some(now),
        };

        let mut backing = self.writer()?;
        let existing = {
            let index = self.read()?;
            let existing = index.records.get(&record.platform_id).map(|r| r.state);
            if let Some(actual) = existing {
                if actual != VerificationState::Pending {
                    return Err(StoreError::StateMismatch {
                        expected: VerificationState::Pending,
                        actual,
                    });
                }
            }
            index.check_unique(&record)?;
            existing
        };

        if existing.is_some() {
            self.compact(&mut backing, &record.platform_id, Some(&record))?;
        } else {
            Self::append(&mut backing, &record)?;
        }
        let previous = self.publish()?.install(record.clone());

        Ok(Replaced { record, previous })
    }

    /// Look a record up
    pub fn get(&self, lookup: Lookup<'_>) -> StoreResult<IdentityRecord> {
        self.find(lookup)?.ok_or(StoreError::NotFound)
    }

    /// Look a record up, `None` when absent
    pub fn find(&self, lookup: Lookup<'_>) -> StoreResult<Option<IdentityRecord>> {
        Ok(self.read()?.resolve(lookup).cloned())
    }

    /// Apply a guarded state change
    ///
    /// The record must be in `change.required_state()` and match the
    /// change's freshness guard, otherwise the caller lost a race and gets
    /// `StateMismatch` or `Stale`.
    pub fn transition(&self, id: &PlatformId, change: StateChange) -> StoreResult<IdentityRecord> {
        let mut backing = self.writer()?;
        let next = {
            let index = self.read()?;
            let current = index.records.get(id).ok_or(StoreError::NotFound)?;

            let expected = change.required_state();
            if current.state != expected {
                return Err(StoreError::StateMismatch {
                    expected,
                    actual: current.state,
                });
            }
            change.check_fresh(current).map_err(StoreError::Stale)?;

            let mut next = current.clone();
            change.apply(&mut next, Utc::now());
            next
        };

        Self::append(&mut backing, &next)?;
        self.publish()?.install(next.clone());
        Ok(next)
    }

    /// Hard-delete a record in any state
    ///
    /// The journal is compacted so no trace of the record's email or code
    /// remains on disk.
    pub fn delete(&self, id: &PlatformId) -> StoreResult<IdentityRecord> {
        let mut backing = self.writer()?;
        if !self.read()?.records.contains_key(id) {
            return Err(StoreError::NotFound);
        }
        self.compact(&mut backing, id, None)?;
        self.publish()?.unindex(id).ok_or(StoreError::NotFound)
    }

    /// Delete a `Pending` record only if it still carries `code_digest`
    pub fn discard_pending(&self, id: &PlatformId, code_digest: &str) -> StoreResult<()> {
        let mut backing = self.writer()?;
        {
            let index = self.read()?;
            let current = index.records.get(id).ok_or(StoreError::NotFound)?;
            if current.state != VerificationState::Pending {
                return Err(StoreError::StateMismatch {
                    expected: VerificationState::Pending,
                    actual: current.state,
                });
            }
            if current.code_digest != code_digest {
                return Err(StoreError::Stale("verification code replaced"));
            }
        }

        self.compact(&mut backing, id, None)?;
        self.publish()?.unindex(id);
        Ok(())
    }

    /// Poison the index latch, as a writer panicking mid-publish would
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.index.write();
            panic!("writer panicked");
        }));
    }

    /// Record counts by state
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let index = self.read()?;
        let mut stats = StoreStats {
            total: index.records.len(),
            ..Default::default()
        };
        for record in index.records.values() {
            match record.state {
                VerificationState::Pending => stats.pending += 1,
                VerificationState::Verified => stats.verified += 1,
                VerificationState::Restricted => stats.restricted += 1,
            }
        }
        Ok(stats)
    }

    /// Every live record, most recently created first
    pub fn list_all(&self) -> StoreResult<Vec<IdentityRecord>> {
        let index = self.read()?;
        let mut records: Vec<IdentityRecord> = index.records.values().cloned().collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.platform_id.cmp(&b.platform_id))
        });
        Ok(records)
    }
}
