// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The unit stored by the DHT (spec §3).

use crate::id::Id;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch. Used for both the wall-clock
/// `last_write`/`integrity_date` fields and the `last_touch` republish
/// clock; a single clock source keeps on-disk records trivially
/// serialisable and comparable across restarts.
pub type Timestamp = u64;

pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

/// `Metadata` and `Chunk` records live in disjoint namespaces within one
/// node: the same [`Id`] may exist as both a metadata key and (very
/// unlikely, but not prevented) a chunk key without colliding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Metadata,
    Chunk,
}

impl RecordKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            RecordKind::Metadata => "metadata",
            RecordKind::Chunk => "values",
        }
    }
}

/// A record as described by spec.md §3.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: Id,
    pub value: Vec<u8>,
    pub kind: RecordKind,
    /// Original string key supplied by the user; only present for
    /// `Metadata` records, used for `list()`.
    pub key_name: Option<String>,
    /// Wall-clock timestamp set by the originating writer, preserved
    /// across replications; governs last-writer-wins merges.
    pub last_write: Timestamp,
    /// `false` until a commit phase declares the record durable.
    pub integrity: bool,
    /// Wall-clock time of the most recent integrity transition.
    pub integrity_date: Timestamp,
    /// Set when freshly written; cleared by maintenance after republish.
    pub republish_flag: bool,
    /// Time of the most recent read or write; drives republish scheduling.
    pub last_touch: Timestamp,
}

impl Record {
    /// A brand-new record as written by `put_value` (spec C3): not yet
    /// durable, freshly touched, flagged for the next republish sweep.
    pub fn new(
        key: Id,
        value: Vec<u8>,
        kind: RecordKind,
        key_name: Option<String>,
        last_write: Option<Timestamp>,
    ) -> Self {
        let ts = now();
        Record {
            key,
            value,
            kind,
            key_name,
            last_write: last_write.unwrap_or(ts),
            integrity: false,
            integrity_date: ts,
            republish_flag: true,
            last_touch: ts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::digest;

    #[test]
    fn new_record_starts_without_integrity() {
        let r = Record::new(digest(b"k"), b"v".to_vec(), RecordKind::Chunk, None, None);
        assert!(!r.integrity);
        assert!(r.republish_flag);
    }
}
