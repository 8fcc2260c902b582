// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Put/get/delete orchestration and the `set_digest` write path (spec
//! C7). Grounded on `kade_drive/core/network.py`'s `Server` static
//! methods (`set_digest`, `ServerService.upload_file/get/delete`,
//! `FileSystemProtocol.wellcome_if_new`).

use dfs_protocol::{Id, NodeDescriptor, Record, RecordKind, Request, Response, Timestamp};

use crate::context::NetworkContext;
use crate::error::Result;

/// Splits `bytes` into chunks of `chunk_size`, the last one short (spec
/// I7: `ceil(|b| / chunk_size)` pieces, concatenation recovers the input).
pub fn split_chunks(bytes: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if bytes.is_empty() {
        return vec![&bytes[0..0]];
    }
    bytes.chunks(chunk_size.max(1)).collect()
}

/// `write ⇐ (local_last_write is None) ∨ (¬remote_present) ∨
/// (remote.last_write < local_last_write)` (spec §4.7).
fn needs_write(local_last_write: Option<Timestamp>, remote_present: bool, remote_last_write: Option<Timestamp>) -> bool {
    match local_last_write {
        None => true,
        Some(local) => !remote_present || remote_last_write.map(|r| r < local).unwrap_or(true),
    }
}

impl NetworkContext {
    /// `set_digest` (spec §4.7): resolve the k closest peers to `key`,
    /// decide per-peer whether a write is needed against the last-write
    /// predicate, and optionally self-store when in range.
    pub async fn set_digest(
        &self,
        key: Id,
        value: Vec<u8>,
        kind: RecordKind,
        exclude_self: bool,
        local_last_write: Option<Timestamp>,
        key_name: Option<String>,
        do_confirm: bool,
    ) -> bool {
        let crawler = self.crawler();
        let nodes = crawler.find_node(key).await;

        if nodes.is_empty() {
            if exclude_self {
                return true;
            }
            let (present, remote_write) = self.store.check_if_new_value_exists(key, kind);
            if needs_write(local_last_write, present, remote_write) {
                let _ = self
                    .store
                    .put_value(key, value, kind, key_name, local_last_write);
            }
            return true;
        }

        let mut successes = Vec::new();

        if !exclude_self {
            let biggest = nodes
                .iter()
                .map(|n| key.distance(&n.id))
                .max()
                .unwrap_or(self.self_descriptor.id.distance(&key));
            if self.self_descriptor.id.distance(&key) < biggest {
                let (present, remote_write) = self.store.check_if_new_value_exists(key, kind);
                if needs_write(local_last_write, present, remote_write) {
                    if self
                        .store
                        .put_value(key, value.clone(), kind, key_name.clone(), local_last_write)
                        .is_ok()
                    {
                        successes.push(true);
                    }
                }
            }
        }

        for node in &nodes {
            let Ok(addr) = crate::rpc::RpcClient::resolve(node).await else {
                continue;
            };
            let probe = Request::CheckIfNewValueExists {
                sender: self.self_descriptor.clone(),
                key,
                kind,
            };
            let (present, remote_write) = match self.rpc.call(addr, &probe).await {
                Ok(Response::Exists { present, last_write }) => (present, last_write),
                _ => {
                    successes.push(false);
                    continue;
                }
            };

            if !needs_write(local_last_write, present, remote_write) {
                successes.push(present);
                continue;
            }

            let store_request = Request::Store {
                sender: self.self_descriptor.clone(),
                key,
                value: value.clone(),
                kind,
                key_name: key_name.clone(),
                last_write: local_last_write,
            };
            let stored = matches!(self.rpc.call(addr, &store_request).await, Ok(Response::Stored(true)));
            if !stored {
                successes.push(false);
                continue;
            }
            if do_confirm {
                let confirm = Request::ConfirmIntegrity {
                    sender: self.self_descriptor.clone(),
                    key,
                    kind,
                };
                let confirmed = matches!(self.rpc.call(addr, &confirm).await, Ok(Response::Bool(true)));
                successes.push(confirmed);
            } else {
                successes.push(true);
            }
        }

        successes.into_iter().any(|ok| ok)
    }

    async fn delete_from_network(&self, key: Id, kind: RecordKind) -> bool {
        let local = self.store.delete(key, kind).unwrap_or(false);
        let crawler = self.crawler();
        let remote = crawler.delete(key, kind).await;
        local || remote
    }

    async fn confirm_integrity_of_data(&self, key: Id, kind: RecordKind) -> bool {
        let crawler = self.crawler();
        let nodes = crawler.find_node(key).await;
        if nodes.is_empty() {
            return self.store.confirm_integrity(key, kind).unwrap_or(false);
        }
        crawler.confirm_integrity(key, kind).await
    }

    /// `upload_file` (spec §4.7 Put): split, write every chunk then the
    /// metadata with `integrity=false`, roll back on failure, then
    /// confirm integrity in a second phase.
    pub async fn upload_file(&self, name: &str, bytes: &[u8]) -> Result<bool> {
        let chunk_size = self.config.chunk_size;
        let chunks: Vec<Vec<u8>> = split_chunks(bytes, chunk_size).into_iter().map(|c| c.to_vec()).collect();
        let chunk_ids: Vec<Id> = chunks.iter().map(|c| dfs_protocol::digest(c)).collect();

        let mut written = Vec::new();
        for (id, chunk) in chunk_ids.iter().zip(chunks.iter()) {
            let ok = self
                .set_digest(*id, chunk.clone(), RecordKind::Chunk, false, None, None, false)
                .await;
            if !ok {
                for done in &written {
                    self.delete_from_network(*done, RecordKind::Chunk).await;
                }
                return Ok(false);
            }
            written.push(*id);
        }

        let metadata_value = dfs_protocol::encode(&chunk_ids)?;
        let metadata_key = dfs_protocol::digest(name.as_bytes());
        let metadata_ok = self
            .set_digest(
                metadata_key,
                metadata_value,
                RecordKind::Metadata,
                false,
                None,
                Some(name.to_string()),
                false,
            )
            .await;
        if !metadata_ok {
            for done in &written {
                self.delete_from_network(*done, RecordKind::Chunk).await;
            }
            return Ok(false);
        }

        for id in &chunk_ids {
            if !self.confirm_integrity_of_data(*id, RecordKind::Chunk).await {
                tracing::warn!(chunk = %id, "failed to confirm integrity of chunk after upload");
            }
        }
        if !self.confirm_integrity_of_data(metadata_key, RecordKind::Metadata).await {
            tracing::warn!(name, "failed to confirm integrity of metadata after upload");
        }

        Ok(true)
    }

    /// `get` (spec §4.7): resolve the metadata record, then fetch each
    /// chunk from the first location that answers.
    pub async fn get(&self, name: &str) -> Option<Vec<u8>> {
        let metadata_key = dfs_protocol::digest(name.as_bytes());
        let crawler = self.crawler();

        let metadata_bytes = {
            let nodes = crawler.find_node(metadata_key).await;
            if nodes.is_empty() {
                self.store.get_payload(metadata_key, RecordKind::Metadata).ok().flatten()
            } else {
                let (value, repair_candidate) = crawler.find_value(metadata_key, RecordKind::Metadata).await;
                if let (Some(bytes), Some(candidate)) = (&value, repair_candidate) {
                    self.repair_on_read(metadata_key, bytes.clone(), RecordKind::Metadata, candidate).await;
                }
                value
            }
        }?;

        let chunk_ids: Vec<Id> = dfs_protocol::decode(&metadata_bytes).ok()?;
        let mut out = Vec::new();
        for chunk_id in chunk_ids {
            let mut locations = crawler.find_chunk_location(chunk_id).await;
            if locations.is_empty() && self.store.contains(chunk_id, RecordKind::Chunk) {
                locations.push(self.self_descriptor.clone());
            }
            let mut fetched = None;
            for location in &locations {
                if location.same_home_as(&self.self_descriptor) {
                    if let Ok(Some(bytes)) = self.store.get_payload(chunk_id, RecordKind::Chunk) {
                        fetched = Some(bytes);
                        break;
                    }
                }
                let Ok(addr) = crate::rpc::RpcClient::resolve(location).await else {
                    continue;
                };
                let request = Request::GetChunkValue {
                    sender: self.self_descriptor.clone(),
                    key: chunk_id,
                };
                if let Ok(Response::ChunkBytes(Some(bytes))) = self.rpc.call(addr, &request).await {
                    fetched = Some(bytes);
                    break;
                }
            }
            out.extend(fetched?);
        }
        Some(out)
    }

    /// Tells the nearest peer that answered a `find_value` round without
    /// the value to store it (spec §4.6 repair-on-read), kept verbatim
    /// from `crawling.py`'s `ValueSpiderCrawl._handle_found_values`: the
    /// value is known-good (it came from a majority vote), so the push
    /// is best-effort and its result is not awaited for correctness.
    async fn repair_on_read(&self, key: Id, value: Vec<u8>, kind: RecordKind, candidate: NodeDescriptor) {
        let Ok(addr) = crate::rpc::RpcClient::resolve(&candidate).await else {
            return;
        };
        let request = Request::Store {
            sender: self.self_descriptor.clone(),
            key,
            value,
            kind,
            key_name: None,
            last_write: None,
        };
        if !matches!(self.rpc.call(addr, &request).await, Ok(Response::Bool(true))) {
            tracing::debug!(%key, peer = %candidate, "repair-on-read store did not succeed");
        }
    }

    /// Deletes locally then fans out a delete to the k closest peers;
    /// metadata deletion cascades into its referenced chunks (spec §4.3).
    pub async fn delete(&self, name: &str) -> bool {
        let key = dfs_protocol::digest(name.as_bytes());
        self.delete_from_network(key, RecordKind::Metadata).await
    }

    /// On first contact with `node`: add it to the routing table, then
    /// proactively push any local record that `node` is now closer to
    /// than our current furthest known neighbor, provided we ourselves
    /// are still the nearer of the two (spec §4.7 `welcome_if_new`).
    pub async fn welcome_if_new(&self, node: NodeDescriptor) -> Result<()> {
        if node.same_home_as(&self.self_descriptor) {
            return Ok(());
        }
        let is_new = {
            let routing = self.routing.lock().await;
            routing.is_new_node(&node.id)?
        };
        if !is_new {
            return Ok(());
        }
        {
            let mut routing = self.routing.lock().await;
            routing.add_contact(node.clone())?;
        }

        for (key, kind) in self.store.keys() {
            let Some(record) = self.store.get_value(key, kind, false)? else {
                continue;
            };
            if !record.integrity {
                continue;
            }
            let neighbors = {
                let mut routing = self.routing.lock().await;
                routing.find_neighbors(&key, Some(self.config.ksize), Some(&self.self_descriptor))
            };
            let should_push = neighbors.is_empty() || should_push_to_new_neighbor(&neighbors, &node, &self.self_descriptor, &key);
            if should_push {
                if let Ok(addr) = crate::rpc::RpcClient::resolve(&node).await {
                    let request = store_request(&self.self_descriptor, &record);
                    let _ = self.rpc.call(addr, &request).await;
                }
            }
        }
        Ok(())
    }
}

fn store_request(sender: &NodeDescriptor, record: &Record) -> Request {
    Request::Store {
        sender: sender.clone(),
        key: record.key,
        value: record.value.clone(),
        kind: record.kind,
        key_name: record.key_name.clone(),
        last_write: Some(record.last_write),
    }
}

fn should_push_to_new_neighbor(
    neighbors: &[NodeDescriptor],
    candidate: &NodeDescriptor,
    me: &NodeDescriptor,
    key: &Id,
) -> bool {
    let Some(furthest) = neighbors.iter().max_by_key(|n| key.distance(&n.id)) else {
        return true;
    };
    let Some(nearest) = neighbors.iter().min_by_key(|n| key.distance(&n.id)) else {
        return true;
    };
    key.distance(&candidate.id) < key.distance(&furthest.id) && key.distance(&me.id) < key.distance(&nearest.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_write_when_no_local_last_write() {
        assert!(needs_write(None, true, Some(10)));
    }

    #[test]
    fn needs_write_when_remote_absent() {
        assert!(needs_write(Some(5), false, None));
    }

    #[test]
    fn skips_write_when_remote_is_newer() {
        assert!(!needs_write(Some(5), true, Some(10)));
    }

    #[test]
    fn split_chunks_recombine_to_original_bytes() {
        let data = b"helloworld!".to_vec();
        let chunks = split_chunks(&data, 4);
        assert_eq!(chunks.len(), 3);
        let rebuilt: Vec<u8> = chunks.concat();
        assert_eq!(rebuilt, data);
    }
}
