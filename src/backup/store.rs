use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::manifest::{BackupEntry, BackupSession, PayloadRef, SessionSummary};
use crate::common::errors::{BackupError, DriverError};
use crate::engine::model::ScanResult;

const MANIFEST_FILE: &str = "manifest.json";
const JOURNAL_FILE: &str = "journal.jsonl";
const PAYLOAD_DIR: &str = "payloads";

/// Where a driver streams an item's payload during capture. Seekable so
/// archive formats can patch their headers in place.
pub trait PayloadSink: Write + Seek {}

impl<T: Write + Seek> PayloadSink for T {}

/// Capture callback handed to [`BackupStore::record_with`]. Returns
/// `Ok(false)` when the item has no payload worth keeping.
pub type CaptureFn<'a> = dyn FnMut(&mut dyn PayloadSink) -> Result<bool, DriverError> + 'a;

/// Durable snapshot store for write-ahead backups.
///
/// `record_with` returns only after the entry is flushed to disk, so the
/// caller may issue the destructive action as soon as it returns.
pub trait BackupStore: Send + Sync {
    fn begin_session(&self, name: Option<&str>) -> Result<String, BackupError>;

    /// Record one item, streaming its payload straight to stable storage
    fn record_with(
        &self,
        session_id: &str,
        driver: &str,
        item: &ScanResult,
        capture: &mut CaptureFn<'_>,
    ) -> Result<BackupEntry, BackupError>;

    /// Record one item whose payload is already in memory
    fn record(
        &self,
        session_id: &str,
        driver: &str,
        item: &ScanResult,
        payload: Option<&[u8]>,
    ) -> Result<BackupEntry, BackupError> {
        self.record_with(session_id, driver, item, &mut |out: &mut dyn PayloadSink| {
            match payload {
                Some(bytes) => out
                    .write_all(bytes)
                    .map(|_| true)
                    .map_err(|e| DriverError::capture(&item.location, e)),
                None => Ok(false),
            }
        })
    }

    /// Finalize the manifest; further `record` calls fail
    fn seal(&self, session_id: &str) -> Result<(), BackupError>;

    fn load(&self, session_id: &str) -> Result<BackupSession, BackupError>;

    /// Verify an entry's payload against its checksum and return where it
    /// lives on disk
    fn payload_path(
        &self,
        session_id: &str,
        entry: &BackupEntry,
    ) -> Result<Option<PathBuf>, BackupError>;

    /// Read and verify an entry's captured payload
    fn read_payload(
        &self,
        session_id: &str,
        entry: &BackupEntry,
    ) -> Result<Option<Vec<u8>>, BackupError> {
        match self.payload_path(session_id, entry)? {
            Some(path) => std::fs::read(&path)
                .map(Some)
                .map_err(|e| BackupError::io(&path, e)),
            None => Ok(None),
        }
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>, BackupError>;

    /// Explicit user-initiated removal. The engine never calls this.
    fn delete_session(&self, session_id: &str) -> Result<(), BackupError>;

    /// Directory the sessions live in, for stores that are directory-backed
    fn location(&self) -> Option<&Path> {
        None
    }
}

struct OpenSession {
    dir: PathBuf,
    journal: File,
    /// Length of the journal up to the last fully synced entry
    journal_len: u64,
    header: BackupSession,
    next_index: usize,
}

/// Backup store laid out as one directory per session:
///
/// ```text
/// <root>/<session_id>/manifest.json   header, then full entry list once sealed
/// <root>/<session_id>/journal.jsonl   write-ahead entries until sealed
/// <root>/<session_id>/payloads/000001.bin
/// ```
pub struct DirectoryBackupStore {
    root: PathBuf,
    open: Mutex<HashMap<String, OpenSession>>,
}

impl std::fmt::Debug for DirectoryBackupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryBackupStore")
            .field("root", &self.root)
            .finish()
    }
}

impl DirectoryBackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, OpenSession>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_session_id(name: Option<&str>) -> String {
        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        match name.map(slug).filter(|s| !s.is_empty()) {
            Some(slug) => format!("{}-{}-{}", stamp, slug, suffix),
            None => format!("{}-{}", stamp, suffix),
        }
    }

    fn read_manifest(&self, session_id: &str) -> Result<BackupSession, BackupError> {
        let path = self.session_dir(session_id).join(MANIFEST_FILE);
        if !path.exists() {
            return Err(BackupError::NotFound(session_id.to_string()));
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| BackupError::io(&path, e))?;
        serde_json::from_str(&contents).map_err(|e| BackupError::Corrupt {
            session: session_id.to_string(),
            reason: format!("manifest: {}", e),
        })
    }

    /// Replay the write-ahead journal of an unsealed session. Lines that do
    /// not decode (a crash or failed write mid-append) are dropped.
    fn replay_journal(&self, session_id: &str) -> Result<Vec<BackupEntry>, BackupError> {
        let path = self.session_dir(session_id).join(JOURNAL_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).map_err(|e| BackupError::io(&path, e))?;
        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .collect::<Result<_, _>>()
            .map_err(|e| BackupError::io(&path, e))?;

        let mut entries = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<BackupEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(session = session_id, line = i + 1, "dropping torn journal line: {}", e);
                }
            }
        }
        Ok(entries)
    }

    /// Claim the next entry index of an open session
    fn reserve(&self, session_id: &str) -> Result<(PathBuf, usize), BackupError> {
        let mut open = self.lock();
        match open.get_mut(session_id) {
            Some(session) => {
                let index = session.next_index;
                session.next_index += 1;
                Ok((session.dir.clone(), index))
            }
            None if self.session_dir(session_id).join(MANIFEST_FILE).exists() => {
                Err(BackupError::Sealed(session_id.to_string()))
            }
            None => Err(BackupError::NotFound(session_id.to_string())),
        }
    }

    /// Append one entry to the journal. A failed append is cut back off so
    /// the next entry starts on a clean line.
    fn append(&self, session_id: &str, entry: &BackupEntry) -> Result<(), BackupError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut open = self.lock();
        let session = open
            .get_mut(session_id)
            .ok_or_else(|| BackupError::Sealed(session_id.to_string()))?;
        let path = session.dir.join(JOURNAL_FILE);
        let committed = session.journal_len;

        if let Err(e) = append_line(&mut session.journal, committed, &line) {
            if let Err(rollback) = session.journal.set_len(committed) {
                warn!(session = session_id, "could not trim failed journal append: {}", rollback);
            }
            return Err(BackupError::io(&path, e));
        }
        session.journal_len = committed + line.len() as u64;
        Ok(())
    }
}

impl BackupStore for DirectoryBackupStore {
    fn begin_session(&self, name: Option<&str>) -> Result<String, BackupError> {
        std::fs::create_dir_all(&self.root).map_err(|e| BackupError::NotWritable {
            path: self.root.clone(),
            source: e,
        })?;

        let session_id = Self::new_session_id(name);
        let dir = self.session_dir(&session_id);
        let payload_dir = dir.join(PAYLOAD_DIR);
        std::fs::create_dir_all(&payload_dir).map_err(|e| BackupError::NotWritable {
            path: payload_dir.clone(),
            source: e,
        })?;

        let header = BackupSession::new(&session_id, name);
        write_durably(&dir.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&header)?)?;

        let journal_path = dir.join(JOURNAL_FILE);
        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .map_err(|e| BackupError::NotWritable {
                path: journal_path.clone(),
                source: e,
            })?;

        info!(session = %session_id, dir = %dir.display(), "backup session opened");
        self.lock().insert(
            session_id.clone(),
            OpenSession {
                dir,
                journal,
                journal_len: 0,
                header,
                next_index: 1,
            },
        );
        Ok(session_id)
    }

    fn record_with(
        &self,
        session_id: &str,
        driver: &str,
        item: &ScanResult,
        capture: &mut CaptureFn<'_>,
    ) -> Result<BackupEntry, BackupError> {
        // The lock is not held while the payload streams, so parallel
        // modules capture concurrently
        let (dir, index) = self.reserve(session_id)?;
        let payload = capture_payload(&dir, index, capture)?;

        let mut entry = BackupEntry::for_item(driver, item, payload);
        entry.index = index;
        self.append(session_id, &entry)?;

        debug!(session = session_id, index, location = %item.location, "backup entry recorded");
        Ok(entry)
    }

    fn seal(&self, session_id: &str) -> Result<(), BackupError> {
        let session = self.lock().remove(session_id);
        let Some(session) = session else {
            return match self.read_manifest(session_id) {
                Ok(m) if m.sealed => Err(BackupError::Sealed(session_id.to_string())),
                Ok(_) => Err(BackupError::InUse(session_id.to_string())),
                Err(e) => Err(e),
            };
        };

        let OpenSession {
            dir,
            journal,
            mut header,
            ..
        } = session;
        drop(journal);

        header.entries = self.replay_journal(session_id)?;
        header.sealed = true;
        header.sealed_at = Some(Utc::now());
        write_durably(&dir.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&header)?)?;

        if let Err(e) = std::fs::remove_file(dir.join(JOURNAL_FILE)) {
            warn!(session = session_id, "could not remove sealed journal: {}", e);
        }
        info!(session = session_id, entries = header.entries.len(), "backup session sealed");
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<BackupSession, BackupError> {
        let mut session = self.read_manifest(session_id)?;
        if !session.sealed {
            session.entries = self.replay_journal(session_id)?;
        }
        Ok(session)
    }

    fn payload_path(
        &self,
        session_id: &str,
        entry: &BackupEntry,
    ) -> Result<Option<PathBuf>, BackupError> {
        let Some(payload) = &entry.payload else {
            return Ok(None);
        };
        let path = self.session_dir(session_id).join(&payload.file);
        let (size, sha256) = hash_file(&path)?;
        if size != payload.size || sha256 != payload.sha256 {
            return Err(BackupError::PayloadMismatch {
                session: session_id.to_string(),
                index: entry.index,
            });
        }
        Ok(Some(path))
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>, BackupError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        let entries = std::fs::read_dir(&self.root).map_err(|e| BackupError::io(&self.root, e))?;
        for entry in entries.filter_map(|e| e.ok()) {
            if !entry.path().is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            match self.load(&id) {
                Ok(session) => sessions.push(session.summary()),
                Err(BackupError::NotFound(_)) => continue,
                Err(e) => warn!(session = %id, "skipping unreadable backup session: {}", e),
            }
        }

        // Most recent first
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    fn delete_session(&self, session_id: &str) -> Result<(), BackupError> {
        if self.lock().contains_key(session_id) {
            return Err(BackupError::InUse(session_id.to_string()));
        }
        let dir = self.session_dir(session_id);
        if !dir.join(MANIFEST_FILE).exists() {
            return Err(BackupError::NotFound(session_id.to_string()));
        }
        std::fs::remove_dir_all(&dir).map_err(|e| BackupError::io(&dir, e))?;
        info!(session = session_id, "backup session deleted");
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

/// Stream a payload into `payloads/NNNNNN.partial`, then sync and move it
/// into place. Nothing is left behind when the capture fails.
fn capture_payload(
    dir: &Path,
    index: usize,
    capture: &mut CaptureFn<'_>,
) -> Result<Option<PayloadRef>, BackupError> {
    let file = format!("{}/{:06}.bin", PAYLOAD_DIR, index);
    let path = dir.join(&file);
    let partial = path.with_extension("partial");

    let mut out = File::create(&partial).map_err(|e| BackupError::io(&partial, e))?;
    let captured = capture(&mut out).map_err(BackupError::Capture).and_then(|kept| {
        out.sync_all()
            .map(|_| kept)
            .map_err(|e| BackupError::io(&partial, e))
    });
    drop(out);

    match captured {
        Ok(true) => {
            std::fs::rename(&partial, &path).map_err(|e| BackupError::io(&path, e))?;
            let (size, sha256) = hash_file(&path)?;
            Ok(Some(PayloadRef { file, size, sha256 }))
        }
        Ok(false) => {
            discard(&partial);
            Ok(None)
        }
        Err(e) => {
            discard(&partial);
            Err(e)
        }
    }
}

fn discard(partial: &Path) {
    if let Err(e) = std::fs::remove_file(partial) {
        debug!(path = %partial.display(), "could not remove partial payload: {}", e);
    }
}

fn append_line(journal: &mut File, committed: u64, line: &[u8]) -> std::io::Result<()> {
    // Heal a tail left by an earlier append that failed mid-write
    if journal.metadata()?.len() != committed {
        journal.set_len(committed)?;
    }
    journal.write_all(line)?;
    journal.sync_data()
}

/// Write via a temp file + rename, fsyncing the data before the rename
fn write_durably(path: &Path, bytes: &[u8]) -> Result<(), BackupError> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp).map_err(|e| BackupError::io(&tmp, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| BackupError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| BackupError::io(path, e))?;
    Ok(())
}

/// Size and SHA-256 of a file, read in chunks
fn hash_file(path: &Path) -> Result<(u64, String), BackupError> {
    let mut file = File::open(path).map_err(|e| BackupError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(|e| BackupError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, format!("{:x}", hasher.finalize())))
}

fn slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    slug.split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::ResourceKind;
    use tempfile::TempDir;

    fn item(name: &str) -> ScanResult {
        ScanResult::new(ResourceKind::Services, name, format!("/etc/systemd/system/{}", name))
    }

    fn names(session: &BackupSession) -> Vec<&str> {
        session.entries.iter().map(|e| e.identity.name.as_str()).collect()
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Acme Studio 2"), "acme-studio-2");
        assert_eq!(slug("  "), "");
    }

    #[test]
    fn test_record_then_seal_then_load() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryBackupStore::new(dir.path());
        let id = store.begin_session(Some("Acme")).unwrap();
        assert!(id.contains("-acme-"));

        let e1 = store
            .record(&id, "services", &item("a.service"), Some(b"[Unit]"))
            .unwrap();
        let e2 = store.record(&id, "services", &item("b.service"), None).unwrap();
        assert_eq!((e1.index, e2.index), (1, 2));
        store.seal(&id).unwrap();

        // A fresh store instance stands in for another process
        let reopened = DirectoryBackupStore::new(dir.path());
        let session = reopened.load(&id).unwrap();
        assert!(session.sealed);
        assert_eq!(session.name.as_deref(), Some("Acme"));
        assert_eq!(names(&session), vec!["a.service", "b.service"]);
        assert_eq!(
            reopened.read_payload(&id, &session.entries[0]).unwrap().as_deref(),
            Some(&b"[Unit]"[..])
        );
        assert_eq!(reopened.read_payload(&id, &session.entries[1]).unwrap(), None);
        assert!(!store.session_dir(&id).join(JOURNAL_FILE).exists());
    }

    #[test]
    fn test_record_with_streams_payload_to_disk() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryBackupStore::new(dir.path());
        let id = store.begin_session(None).unwrap();

        let entry = store
            .record_with(&id, "filesystem", &item("big"), &mut |out: &mut dyn PayloadSink| {
                for _ in 0..64 {
                    out.write_all(&[7u8; 4096])
                        .map_err(|e| DriverError::capture("big", e))?;
                }
                Ok(true)
            })
            .unwrap();

        let payload = entry.payload.clone().unwrap();
        assert_eq!(payload.size, 64 * 4096);
        let path = store.payload_path(&id, &entry).unwrap().unwrap();
        assert_eq!(path, store.session_dir(&id).join(&payload.file));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 64 * 4096);
    }

    #[test]
    fn test_failed_capture_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryBackupStore::new(dir.path());
        let id = store.begin_session(None).unwrap();

        let mut torn = |out: &mut dyn PayloadSink| -> Result<bool, DriverError> {
            out.write_all(b"half a payl")
                .map_err(|e| DriverError::capture("a.service", e))?;
            Err(DriverError::capture("a.service", "read error"))
        };
        let result = store.record_with(&id, "services", &item("a.service"), &mut torn);
        assert!(matches!(result, Err(BackupError::Capture(_))));

        let payloads: Vec<_> = std::fs::read_dir(store.session_dir(&id).join(PAYLOAD_DIR))
            .unwrap()
            .collect();
        assert!(payloads.is_empty());

        store.record(&id, "services", &item("b.service"), None).unwrap();
        store.seal(&id).unwrap();
        assert_eq!(names(&store.load(&id).unwrap()), vec!["b.service"]);
    }

    #[test]
    fn test_record_after_seal_fails() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryBackupStore::new(dir.path());
        let id = store.begin_session(None).unwrap();
        store.seal(&id).unwrap();
        assert!(matches!(
            store.record(&id, "services", &item("a.service"), None),
            Err(BackupError::Sealed(_))
        ));
        assert!(matches!(store.seal(&id), Err(BackupError::Sealed(_))));
        assert!(matches!(
            store.record("nope", "services", &item("a.service"), None),
            Err(BackupError::NotFound(_))
        ));
    }

    #[test]
    fn test_unsealed_session_replays_journal() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryBackupStore::new(dir.path());
        let id = store.begin_session(None).unwrap();
        store.record(&id, "services", &item("a.service"), None).unwrap();

        // Simulate a crash: append a torn line, never seal
        let journal = store.session_dir(&id).join(JOURNAL_FILE);
        let mut f = OpenOptions::new().append(true).open(&journal).unwrap();
        f.write_all(b"{\"index\":2,\"dri").unwrap();

        let other = DirectoryBackupStore::new(dir.path());
        let session = other.load(&id).unwrap();
        assert!(!session.sealed);
        assert_eq!(names(&session), vec!["a.service"]);
    }

    #[test]
    fn test_torn_append_does_not_poison_later_entries() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryBackupStore::new(dir.path());
        let id = store.begin_session(None).unwrap();
        store.record(&id, "services", &item("a.service"), None).unwrap();

        // A write that failed half way (disk full) leaves part of a line behind
        let journal = store.session_dir(&id).join(JOURNAL_FILE);
        let mut f = OpenOptions::new().append(true).open(&journal).unwrap();
        f.write_all(b"{\"index\":2,\"dri").unwrap();
        drop(f);

        store.record(&id, "services", &item("b.service"), None).unwrap();
        store.record(&id, "services", &item("c.service"), None).unwrap();

        let unsealed = DirectoryBackupStore::new(dir.path()).load(&id).unwrap();
        assert_eq!(names(&unsealed), vec!["a.service", "b.service", "c.service"]);

        store.seal(&id).unwrap();
        let sealed = store.load(&id).unwrap();
        assert!(sealed.sealed);
        assert_eq!(names(&sealed), vec!["a.service", "b.service", "c.service"]);
    }

    #[test]
    fn test_replay_skips_undecodable_middle_line() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryBackupStore::new(dir.path());
        let id = store.begin_session(None).unwrap();
        store.record(&id, "services", &item("a.service"), None).unwrap();

        // Garbage written by another process, followed by a valid entry
        let mut later = BackupEntry::for_item("services", &item("b.service"), None);
        later.index = 9;
        let journal = store.session_dir(&id).join(JOURNAL_FILE);
        let mut f = OpenOptions::new().append(true).open(&journal).unwrap();
        writeln!(f, "not json at all").unwrap();
        writeln!(f, "{}", serde_json::to_string(&later).unwrap()).unwrap();

        let session = DirectoryBackupStore::new(dir.path()).load(&id).unwrap();
        assert_eq!(names(&session), vec!["a.service", "b.service"]);
    }

    #[test]
    fn test_tampered_payload_detected() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryBackupStore::new(dir.path());
        let id = store.begin_session(None).unwrap();
        let entry = store
            .record(&id, "services", &item("a.service"), Some(b"original"))
            .unwrap();
        store.seal(&id).unwrap();

        let file = store.session_dir(&id).join(&entry.payload.as_ref().unwrap().file);
        std::fs::write(&file, b"tampered").unwrap();
        assert!(matches!(
            store.read_payload(&id, &entry),
            Err(BackupError::PayloadMismatch { index: 1, .. })
        ));
        assert!(matches!(
            store.payload_path(&id, &entry),
            Err(BackupError::PayloadMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_list_and_delete_sessions() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryBackupStore::new(dir.path());
        let first = store.begin_session(None).unwrap();
        store.seal(&first).unwrap();
        let open = store.begin_session(Some("second")).unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(matches!(store.delete_session(&open), Err(BackupError::InUse(_))));

        store.delete_session(&first).unwrap();
        assert!(!store.session_dir(&first).exists());
        assert!(matches!(store.load(&first), Err(BackupError::NotFound(_))));
    }

    #[test]
    fn test_unwritable_root_fails_begin() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let store = DirectoryBackupStore::new(blocker.join("backups"));
        assert!(matches!(store.begin_session(None), Err(BackupError::NotWritable { .. })));
        assert_eq!(store.location(), Some(blocker.join("backups").as_path()));
    }
}
