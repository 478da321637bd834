//! Identity journal
//!
//! Append-only file of record snapshots. Each frame is:
//!
//! - Payload length (u32 LE)
//! - Payload: the full post-operation record as JSON
//! - Checksum (u32 LE): CRC32 of the payload
//!
//! Every append is followed by fsync before the write becomes visible.
//! Replay applies frames in order; the last frame for a platform ID wins.
//! Removals are not journaled: they rewrite the file from the live set, so
//! a removed record leaves no frame behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;

use super::errors::{StoreError, StoreResult};
use super::record::IdentityRecord;

const JOURNAL_DIR: &str = "identity";
const JOURNAL_FILE: &str = "journal.log";
const REWRITE_FILE: &str = "journal.log.tmp";

/// Upper bound on a single frame payload
const MAX_FRAME_BYTES: u32 = 1 << 20;

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn encode_frame(record: &IdentityRecord) -> StoreResult<Vec<u8>> {
    let payload = serde_json::to_vec(record).map_err(|e| StoreError::Encoding(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_BYTES)
        .ok_or_else(|| StoreError::Encoding("record too large".to_string()))?;

    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&checksum(&payload).to_le_bytes());
    Ok(frame)
}

/// Decode every frame in `bytes`, failing on the first damaged one
fn decode_frames(bytes: &[u8]) -> StoreResult<Vec<IdentityRecord>> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let corrupt = |reason: &str| StoreError::Corruption {
            offset: offset as u64,
            reason: reason.to_string(),
        };

        let header = bytes
            .get(offset..offset + 4)
            .ok_or_else(|| corrupt("truncated frame header"))?;
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if len > MAX_FRAME_BYTES {
            return Err(corrupt("frame length out of range"));
        }

        let payload_start = offset + 4;
        let payload_end = payload_start + len as usize;
        let payload = bytes
            .get(payload_start..payload_end)
            .ok_or_else(|| corrupt("truncated frame payload"))?;
        let trailer = bytes
            .get(payload_end..payload_end + 4)
            .ok_or_else(|| corrupt("truncated frame checksum"))?;
        let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);

        if checksum(payload) != expected {
            return Err(corrupt("checksum mismatch"));
        }

        let record: IdentityRecord =
            serde_json::from_slice(payload).map_err(|e| corrupt(&e.to_string()))?;
        records.push(record);

        offset = payload_end + 4;
    }

    Ok(records)
}

/// Read every frame under `data_dir` without creating or opening anything for write
pub(crate) fn replay(data_dir: &Path) -> StoreResult<Vec<IdentityRecord>> {
    let path = data_dir.join(JOURNAL_DIR).join(JOURNAL_FILE);
    match File::open(&path) {
        Ok(mut file) => {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)
                .map_err(|e| StoreError::io("read journal", e))?;
            decode_frames(&bytes)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(StoreError::io("open journal for replay", e)),
    }
}

/// Failure injected into the next append
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    /// Half the frame reaches the file, then the write fails
    TornWrite,
    /// The whole frame is written but fsync fails
    SyncFailure,
}

/// Durable journal of identity records
///
/// A failed append is cut back off the file before the error is returned,
/// so the tail never holds a partial or unacknowledged frame. If that cut
/// itself fails the journal refuses every later write until a rewrite
/// installs a fresh image.
#[derive(Debug)]
pub(crate) struct Journal {
    path: PathBuf,
    file: File,
    failed: bool,
    #[cfg(test)]
    fault: Option<Fault>,
}

impl Journal {
    /// Open (or create) `<data_dir>/identity/journal.log` and replay it
    pub(crate) fn open(data_dir: &Path) -> StoreResult<(Self, Vec<IdentityRecord>)> {
        let dir = data_dir.join(JOURNAL_DIR);
        fs::create_dir_all(&dir).map_err(|e| {
            StoreError::io(format!("create journal directory {}", dir.display()), e)
        })?;

        let records = replay(data_dir)?;
        let path = dir.join(JOURNAL_FILE);
        let file = Self::open_append(&path)?;

        Ok((
            Self {
                path,
                file,
                failed: false,
                #[cfg(test)]
                fault: None,
            },
            records,
        ))
    }

    fn open_append(path: &Path) -> StoreResult<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StoreError::io(format!("open journal {}", path.display()), e))
    }

    #[cfg(test)]
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn inject(&mut self, fault: Fault) {
        self.fault = Some(fault);
    }

    /// Append a record snapshot and fsync
    pub(crate) fn append(&mut self, record: &IdentityRecord) -> StoreResult<()> {
        if self.failed {
            return Err(StoreError::JournalFailed);
        }
        let frame = encode_frame(record)?;
        let start = self
            .file
            .metadata()
            .map_err(|e| StoreError::io("stat journal", e))?
            .len();

        if let Err(err) = self.write_frame(&frame) {
            self.roll_back(start);
            return Err(err);
        }
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> StoreResult<()> {
        self.injected(frame)?;
        self.file
            .write_all(frame)
            .map_err(|e| StoreError::io("append journal frame", e))?;
        self.file
            .sync_all()
            .map_err(|e| StoreError::io("fsync journal", e))
    }

    #[cfg(test)]
    fn injected(&mut self, frame: &[u8]) -> StoreResult<()> {
        let injected = |what: &str| {
            StoreError::io(
                format!("injected {}", what),
                io::Error::new(io::ErrorKind::Other, "fault"),
            )
        };
        match self.fault.take() {
            None => Ok(()),
            Some(Fault::TornWrite) => {
                let _ = self.file.write_all(&frame[..frame.len() / 2]);
                Err(injected("torn write"))
            }
            Some(Fault::SyncFailure) => {
                let _ = self.file.write_all(frame);
                Err(injected("fsync failure"))
            }
        }
    }

    #[cfg(not(test))]
    fn injected(&mut self, _frame: &[u8]) -> StoreResult<()> {
        Ok(())
    }

    /// Cut the file back to `len` bytes after a failed append
    fn roll_back(&mut self, len: u64) {
        let repaired = self
            .file
            .set_len(len)
            .and_then(|()| self.file.sync_all());
        if repaired.is_err() {
            self.failed = true;
        }
    }

    /// Replace the journal with exactly `records`
    ///
    /// Writes a temp file, fsyncs it, opens the append handle on it and only
    /// then renames it over the journal. On failure the old journal and the
    /// current handle are left untouched.
    pub(crate) fn rewrite<'a, I>(&mut self, records: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = &'a IdentityRecord>,
    {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = dir.join(REWRITE_FILE);

        let mut buf = Vec::new();
        for record in records {
            buf.extend_from_slice(&encode_frame(record)?);
        }

        {
            let mut tmp = File::create(&tmp_path)
                .map_err(|e| StoreError::io("create journal rewrite file", e))?;
            tmp.write_all(&buf)
                .map_err(|e| StoreError::io("write journal rewrite file", e))?;
            tmp.sync_all()
                .map_err(|e| StoreError::io("fsync journal rewrite file", e))?;
        }
        // The handle follows the inode through the rename
        let file = Self::open_append(&tmp_path)?;

        fs::rename(&tmp_path, &self.path)
            .map_err(|e| StoreError::io("install rewritten journal", e))?;

        // Persist the rename itself; not supported on every platform
        if let Ok(dir_handle) = File::open(dir) {
            let _ = dir_handle.sync_all();
        }

        self.file = file;
        self.failed = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::record::VerificationState;
    use crate::platform::PlatformId;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(id: &str, email: &str) -> IdentityRecord {
        IdentityRecord {
            platform_id: PlatformId::new(id),
            display_name: id.to_string(),
            email: email.to_string(),
            code_digest: format!("digest-{}", id),
            team_role: None,
            state: VerificationState::Pending,
            restriction_reason: None,
            created_at: Utc::now(),
            verified_at: None,
        }
    }

    #[test]
    fn test_frames_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let (mut journal, replayed) = Journal::open(dir.path()).unwrap();
            assert!(replayed.is_empty());
            journal.append(&record("1", "a@acme.com")).unwrap();
            journal.append(&record("2", "b@acme.com")).unwrap();
        }

        let (_, replayed) = Journal::open(dir.path()).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[1].email, "b@acme.com");
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let dir = TempDir::new().unwrap();
        let path = {
            let (mut journal, _) = Journal::open(dir.path()).unwrap();
            journal.append(&record("1", "a@acme.com")).unwrap();
            journal.path().to_path_buf()
        };

        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            Journal::open(dir.path()),
            Err(StoreError::Corruption { offset: 0, .. })
        ));
    }

    #[test]
    fn test_truncated_frame_detected() {
        let dir = TempDir::new().unwrap();
        let path = {
            let (mut journal, _) = Journal::open(dir.path()).unwrap();
            journal.append(&record("1", "a@acme.com")).unwrap();
            journal.path().to_path_buf()
        };

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

        assert!(matches!(
            Journal::open(dir.path()),
            Err(StoreError::Corruption { .. })
        ));
    }

    #[test]
    fn test_rewrite_drops_old_frames() {
        let dir = TempDir::new().unwrap();
        let (mut journal, _) = Journal::open(dir.path()).unwrap();
        let keep = record("1", "keep@acme.com");
        journal.append(&keep).unwrap();
        journal.append(&record("2", "gone@acme.com")).unwrap();

        journal.rewrite([&keep]).unwrap();

        let raw = fs::read(journal.path()).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("gone@acme.com"));

        // Appends continue after the rewrite
        journal.append(&record("3", "new@acme.com")).unwrap();
        drop(journal);
        let (_, replayed) = Journal::open(dir.path()).unwrap();
        let emails: Vec<_> = replayed.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(emails, vec!["keep@acme.com", "new@acme.com"]);
    }

    #[test]
    fn test_torn_append_is_cut_back() {
        let dir = TempDir::new().unwrap();
        {
            let (mut journal, _) = Journal::open(dir.path()).unwrap();
            journal.append(&record("1", "a@acme.com")).unwrap();
            let before = fs::metadata(journal.path()).unwrap().len();

            journal.inject(Fault::TornWrite);
            assert!(matches!(
                journal.append(&record("2", "b@acme.com")),
                Err(StoreError::Io { .. })
            ));
            assert_eq!(fs::metadata(journal.path()).unwrap().len(), before);

            journal.append(&record("3", "c@acme.com")).unwrap();
        }

        let (_, replayed) = Journal::open(dir.path()).unwrap();
        let emails: Vec<_> = replayed.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(emails, vec!["a@acme.com", "c@acme.com"]);
    }

    #[test]
    fn test_failed_fsync_does_not_resurrect_frame() {
        let dir = TempDir::new().unwrap();
        {
            let (mut journal, _) = Journal::open(dir.path()).unwrap();
            journal.inject(Fault::SyncFailure);
            assert!(journal.append(&record("1", "a@acme.com")).is_err());
        }

        let (_, replayed) = Journal::open(dir.path()).unwrap();
        assert!(replayed.is_empty());
    }

    #[test]
    fn test_replay_does_not_create_files() {
        let dir = TempDir::new().unwrap();
        assert!(replay(dir.path()).unwrap().is_empty());
        assert!(!dir.path().join(JOURNAL_DIR).exists());
    }
}
