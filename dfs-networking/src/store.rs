// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Content-addressed disk store (spec C3): four sibling directories
//! (`values/`, `metadata/`, `keys/`, `timestamps/`), one file per record
//! named by the URL-safe base64 of its id.

use base64::Engine;
use dfs_protocol::{Id, Record, RecordKind, Timestamp};
use rand::Rng;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const LOCK_ATTEMPTS: u32 = 5;

fn filename(key: &Id) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(key.as_bytes())
}

/// A record's timestamp triple, kept in a dedicated small file so
/// `iterate_older_than` can scan candidates without deserialising every
/// record's full value (mirrors the original's separate timestamp store).
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
struct TimestampEntry {
    last_touch: Timestamp,
    republish: bool,
    last_write: Timestamp,
}

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let store = LocalStore { root };
        store.ensure_dirs()?;
        Ok(store)
    }

    fn ensure_dirs(&self) -> Result<()> {
        for dir in ["values", "metadata", "keys/values", "keys/metadata", "timestamps"] {
            let path = self.root.join(dir);
            fs::create_dir_all(&path).map_err(|source| Error::FailedToCreateStoreDir {
                path,
                source,
            })?;
        }
        Ok(())
    }

    fn record_dir(&self, kind: RecordKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    fn record_path(&self, key: &Id, kind: RecordKind) -> PathBuf {
        self.record_dir(kind).join(filename(key))
    }

    fn key_path(&self, key: &Id, kind: RecordKind) -> PathBuf {
        self.root.join("keys").join(kind.dir_name()).join(filename(key))
    }

    fn timestamp_path(&self, key: &Id, kind: RecordKind) -> PathBuf {
        self.root
            .join("timestamps")
            .join(format!("{}-{}", kind.dir_name(), filename(key)))
    }

    fn write_timestamp(&self, key: &Id, kind: RecordKind, entry: TimestampEntry) -> Result<()> {
        let bytes = dfs_protocol::encode(&entry)?;
        fs::write(self.timestamp_path(key, kind), bytes)?;
        Ok(())
    }

    fn read_timestamp(&self, key: &Id, kind: RecordKind) -> Option<TimestampEntry> {
        let bytes = fs::read(self.timestamp_path(key, kind)).ok()?;
        dfs_protocol::decode(&bytes).ok()
    }

    fn read_record(&self, key: &Id, kind: RecordKind) -> Option<Record> {
        let bytes = fs::read(self.record_path(key, kind)).ok()?;
        dfs_protocol::decode(&bytes).ok()
    }

    fn write_record(&self, record: &Record) -> Result<()> {
        let bytes = dfs_protocol::encode(record)?;
        fs::write(self.record_path(&record.key, record.kind), bytes)?;
        fs::write(self.key_path(&record.key, record.kind), record.key.as_bytes())?;
        self.write_timestamp(
            &record.key,
            record.kind,
            TimestampEntry {
                last_touch: record.last_touch,
                republish: record.republish_flag,
                last_write: record.last_write,
            },
        )?;
        Ok(())
    }

    /// Runs `f` against the record file under an exclusive lock, retrying
    /// with a random backoff (spec §5: `uniform(2, 10)` seconds) if the
    /// lock is held elsewhere, bounded to `LOCK_ATTEMPTS` tries.
    fn with_exclusive_lock<T>(
        &self,
        path: &Path,
        f: impl FnOnce(&mut File) -> Result<T>,
    ) -> Result<T> {
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let mut attempt = 0;
        loop {
            match fs2::FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(err) if attempt + 1 >= LOCK_ATTEMPTS => return Err(Error::Io(err)),
                Err(_) => {
                    attempt += 1;
                    let wait = rand::thread_rng().gen_range(2..10);
                    std::thread::sleep(Duration::from_millis(wait * 10));
                }
            }
        }
        let result = f(&mut file);
        let _ = fs2::FileExt::unlock(&file);
        result
    }

    /// `put_value` (spec §4.3): always written with `integrity=false`.
    pub fn put_value(
        &self,
        key: Id,
        value: Vec<u8>,
        kind: RecordKind,
        key_name: Option<String>,
        last_write: Option<Timestamp>,
    ) -> Result<()> {
        let record = Record::new(key, value, kind, key_name, last_write);
        self.write_record(&record)
    }

    /// Atomic compare-and-set of `integrity` to `true` under an exclusive
    /// lock on the record file, so a concurrent demotion-before-removal
    /// can't observe a torn read.
    pub fn confirm_integrity(&self, key: Id, kind: RecordKind) -> Result<bool> {
        let path = self.record_path(&key, kind);
        self.with_exclusive_lock(&path, |file| {
            let mut bytes = Vec::new();
            io::Read::read_to_end(file, &mut bytes)?;
            let mut record: Record = match dfs_protocol::decode(&bytes) {
                Ok(r) => r,
                Err(_) => return Ok(false),
            };
            record.integrity = true;
            record.integrity_date = dfs_protocol::now();
            let encoded = dfs_protocol::encode(&record)?;
            io::Seek::seek(file, io::SeekFrom::Start(0))?;
            io::Write::write_all(file, &encoded)?;
            file.set_len(encoded.len() as u64)?;
            Ok(true)
        })
    }

    /// Clears `republish_flag` after a successful republication sweep
    /// (spec §4.8 step 3), leaving `integrity`/`integrity_date`/
    /// `last_touch` untouched. Unlike `put_value`, this never routes
    /// through `Record::new`, so it cannot undo an earlier integrity
    /// commit (spec I5).
    pub fn clear_republish_flag(&self, key: Id, kind: RecordKind) -> Result<()> {
        let path = self.record_path(&key, kind);
        self.with_exclusive_lock(&path, |file| {
            let mut bytes = Vec::new();
            io::Read::read_to_end(file, &mut bytes)?;
            let mut record: Record = match dfs_protocol::decode(&bytes) {
                Ok(r) => r,
                Err(_) => return Ok(()),
            };
            record.republish_flag = false;
            let encoded = dfs_protocol::encode(&record)?;
            io::Seek::seek(file, io::SeekFrom::Start(0))?;
            io::Write::write_all(file, &encoded)?;
            file.set_len(encoded.len() as u64)?;
            self.write_timestamp(
                &record.key,
                record.kind,
                TimestampEntry {
                    last_touch: record.last_touch,
                    republish: false,
                    last_write: record.last_write,
                },
            )?;
            Ok(())
        })
    }

    /// Returns the record if present; when `touch`, refreshes `last_touch`
    /// and sets `republish_flag`.
    pub fn get_value(&self, key: Id, kind: RecordKind, touch: bool) -> Result<Option<Record>> {
        let Some(mut record) = self.read_record(&key, kind) else {
            return Ok(None);
        };
        if touch {
            record.last_touch = dfs_protocol::now();
            record.republish_flag = true;
            self.write_record(&record)?;
        }
        Ok(Some(record))
    }

    /// `value` iff the record exists and is durable.
    pub fn get_payload(&self, key: Id, kind: RecordKind) -> Result<Option<Vec<u8>>> {
        Ok(self
            .read_record(&key, kind)
            .filter(|r| r.integrity)
            .map(|r| r.value))
    }

    /// Deletes a record; `Metadata` cascades into every chunk it lists.
    pub fn delete(&self, key: Id, kind: RecordKind) -> Result<bool> {
        let path = self.record_path(&key, kind);
        let existed = self.with_exclusive_lock(&path, |file| {
            let mut bytes = Vec::new();
            io::Read::read_to_end(file, &mut bytes)?;
            if bytes.is_empty() {
                return Ok(false);
            }
            let mut record: Record = match dfs_protocol::decode(&bytes) {
                Ok(r) => r,
                Err(_) => return Ok(false),
            };
            record.integrity = false;
            let encoded = dfs_protocol::encode(&record)?;
            io::Seek::seek(file, io::SeekFrom::Start(0))?;
            io::Write::write_all(file, &encoded)?;
            file.set_len(encoded.len() as u64)?;

            if kind == RecordKind::Metadata {
                if let Ok(chunk_ids) = dfs_protocol::decode::<Vec<Id>>(&record.value) {
                    for chunk_id in chunk_ids {
                        self.remove_files(&chunk_id, RecordKind::Chunk)?;
                    }
                }
            }
            Ok(true)
        })?;
        self.remove_files(&key, kind)?;
        Ok(existed)
    }

    fn remove_files(&self, key: &Id, kind: RecordKind) -> Result<()> {
        for path in [
            self.record_path(key, kind),
            self.key_path(key, kind),
            self.timestamp_path(key, kind),
        ] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(Error::Io(err)),
            }
        }
        Ok(())
    }

    /// True iff the record is present and durable.
    pub fn contains(&self, key: Id, kind: RecordKind) -> bool {
        self.read_record(&key, kind)
            .map(|r| r.integrity)
            .unwrap_or(false)
    }

    /// Read-only probe the replication engine uses to decide whether to
    /// overwrite.
    pub fn check_if_new_value_exists(&self, key: Id, kind: RecordKind) -> (bool, Option<Timestamp>) {
        match self.read_record(&key, kind) {
            Some(r) => (true, Some(r.last_write)),
            None => (false, None),
        }
    }

    /// Records whose `last_touch` is older than `seconds_old` or whose
    /// `republish_flag` is set; skips non-durable records.
    pub fn iterate_older_than(
        &self,
        seconds_old: u64,
    ) -> Vec<(Id, Vec<u8>, RecordKind, Timestamp, Option<String>)> {
        let cutoff_ms = seconds_old.saturating_mul(1000);
        let now = dfs_protocol::now();
        let mut out = Vec::new();
        let dir = self.root.join("timestamps");
        let Ok(entries) = fs::read_dir(&dir) else {
            return out;
        };
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Some((kind_name, b64)) = name.split_once('-') else {
                continue;
            };
            let kind = match kind_name {
                "metadata" => RecordKind::Metadata,
                "values" => RecordKind::Chunk,
                _ => continue,
            };
            let Ok(key_bytes) = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(b64) else {
                continue;
            };
            let Ok(key_arr): std::result::Result<[u8; dfs_protocol::ID_LEN], _> = key_bytes.try_into()
            else {
                continue;
            };
            let key = Id::from_bytes(key_arr);
            let Some(ts) = self.read_timestamp(&key, kind) else {
                continue;
            };
            let stale = now.saturating_sub(ts.last_touch) >= cutoff_ms;
            if !(stale || ts.republish) {
                continue;
            }
            if let Some(record) = self.read_record(&key, kind) {
                if !record.integrity {
                    continue;
                }
                out.push((key, record.value, kind, record.last_write, record.key_name));
            }
        }
        out
    }

    /// All locally known `(key, kind)` pairs.
    pub fn keys(&self) -> Vec<(Id, RecordKind)> {
        let mut out = Vec::new();
        for kind in [RecordKind::Metadata, RecordKind::Chunk] {
            let dir = self.root.join("keys").join(kind.dir_name());
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                if let Ok(bytes) = fs::read(entry.path()) {
                    let arr: std::result::Result<[u8; dfs_protocol::ID_LEN], _> = bytes.try_into();
                    if let Ok(arr) = arr {
                        out.push((Id::from_bytes(arr), kind));
                    }
                }
            }
        }
        out
    }

    /// `key_name` of every local durable `Metadata` record.
    pub fn list_integrity_metadata_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (key, kind) in self.keys() {
            if kind != RecordKind::Metadata {
                continue;
            }
            if let Some(record) = self.read_record(&key, kind) {
                if record.integrity {
                    if let Some(name) = record.key_name {
                        out.push(name);
                    }
                }
            }
        }
        out
    }

    /// Deletes every record that has never reached integrity and is past
    /// `ttl` seconds old.
    pub fn sweep_corrupted(&self, ttl_secs: u64) {
        let cutoff_ms = ttl_secs.saturating_mul(1000);
        let now = dfs_protocol::now();
        for (key, kind) in self.keys() {
            if let Some(record) = self.read_record(&key, kind) {
                if !record.integrity && now.saturating_sub(record.integrity_date) >= cutoff_ms {
                    let _ = self.remove_files(&key, kind);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfs_protocol::digest;

    fn store() -> (LocalStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (LocalStore::open(dir.path()).unwrap(), dir)
    }

    #[test]
    fn put_then_confirm_then_read_payload() {
        let (store, _dir) = store();
        let key = digest(b"greeting");
        store
            .put_value(key, b"hello".to_vec(), RecordKind::Metadata, Some("greeting".into()), None)
            .unwrap();
        assert!(store.get_payload(key, RecordKind::Metadata).unwrap().is_none());
        assert!(store.confirm_integrity(key, RecordKind::Metadata).unwrap());
        assert_eq!(
            store.get_payload(key, RecordKind::Metadata).unwrap(),
            Some(b"hello".to_vec())
        );
        assert!(store.contains(key, RecordKind::Metadata));
    }

    #[test]
    fn delete_cascades_from_metadata_to_chunks() {
        let (store, _dir) = store();
        let chunk_key = digest(b"chunk-bytes");
        store
            .put_value(chunk_key, b"chunk-bytes".to_vec(), RecordKind::Chunk, None, None)
            .unwrap();
        store.confirm_integrity(chunk_key, RecordKind::Chunk).unwrap();

        let meta_key = digest(b"file");
        let chunk_list = dfs_protocol::encode(&vec![chunk_key]).unwrap();
        store
            .put_value(meta_key, chunk_list, RecordKind::Metadata, Some("file".into()), None)
            .unwrap();
        store.confirm_integrity(meta_key, RecordKind::Metadata).unwrap();

        assert!(store.delete(meta_key, RecordKind::Metadata).unwrap());
        assert!(!store.contains(meta_key, RecordKind::Metadata));
        assert!(!store.contains(chunk_key, RecordKind::Chunk));
    }

    #[test]
    fn check_if_new_value_exists_reports_last_write() {
        let (store, _dir) = store();
        let key = digest(b"k");
        assert_eq!(store.check_if_new_value_exists(key, RecordKind::Chunk), (false, None));
        store.put_value(key, b"v".to_vec(), RecordKind::Chunk, None, Some(42)).unwrap();
        assert_eq!(
            store.check_if_new_value_exists(key, RecordKind::Chunk),
            (true, Some(42))
        );
    }

    #[test]
    fn sweep_corrupted_removes_only_stale_unconfirmed_records() {
        let (store, _dir) = store();
        let key = digest(b"k");
        store.put_value(key, b"v".to_vec(), RecordKind::Chunk, None, None).unwrap();
        store.sweep_corrupted(0);
        assert!(store.read_record(&key, RecordKind::Chunk).is_none());
    }
}
