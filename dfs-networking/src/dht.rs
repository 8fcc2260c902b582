// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The public API (spec C10) and the node-to-node RPC dispatch table.
//! Grounded on `kade_drive/core/network.py`'s `ServerService` (the public
//! put/get/delete/list surface) and `FileSystemProtocol.rpc_*` methods
//! (the per-RPC handlers), with `welcome_if_new` run against every
//! inbound sender per spec §4.5/§4.7.

use async_trait::async_trait;
use dfs_protocol::{
    ClientRequest, ClientResponse, FindChunkLocationResult, FindValueResult, NodeDescriptor,
    RecordKind, Request, Response,
};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::context::NetworkContext;
use crate::transport::RequestHandler;

/// A handle to a running node's storage and routing state, used by
/// `dfs-node`'s own startup code and by `dfs-cli` when run in-process.
#[derive(Clone)]
pub struct Dht {
    ctx: Arc<NetworkContext>,
}

impl Dht {
    pub fn new(ctx: Arc<NetworkContext>) -> Self {
        Dht { ctx }
    }

    pub fn context(&self) -> &Arc<NetworkContext> {
        &self.ctx
    }

    /// `upload_file` (spec §4.7 Put).
    pub async fn put(&self, name: &str, value: Vec<u8>) -> bool {
        self.ctx.upload_file(name, &value).await.unwrap_or(false)
    }

    pub async fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.ctx.get(name).await
    }

    pub async fn delete(&self, name: &str) -> bool {
        self.ctx.delete(name).await
    }

    /// Unions the local metadata listing with every reachable peer's
    /// listing (spec C10 `list`).
    pub async fn list(&self) -> Vec<String> {
        let mut names: HashSet<String> = self.ctx.store.list_integrity_metadata_names().into_iter().collect();
        let crawler = self.ctx.crawler();
        names.extend(crawler.list(self.ctx.self_descriptor.id).await);
        let mut out: Vec<String> = names.into_iter().collect();
        out.sort();
        out
    }

    async fn handle_client(&self, request: ClientRequest) -> ClientResponse {
        match request {
            ClientRequest::Put { name, value } => ClientResponse::Put(self.put(&name, value).await),
            ClientRequest::Get { name } => ClientResponse::Get(self.get(&name).await),
            ClientRequest::Delete { name } => ClientResponse::Delete(self.delete(&name).await),
            ClientRequest::List => ClientResponse::List(self.list().await),
        }
    }
}

/// Dispatches every peer-to-peer RPC (spec §4.5) and the client-facing
/// surface (spec C10) against a [`Dht`]'s underlying context.
pub struct DhtHandler {
    dht: Dht,
}

impl DhtHandler {
    pub fn new(dht: Dht) -> Self {
        DhtHandler { dht }
    }
}

fn sender_of(request: &Request) -> Option<NodeDescriptor> {
    match request {
        Request::Ping { sender, .. }
        | Request::Store { sender, .. }
        | Request::FindNode { sender, .. }
        | Request::FindValue { sender, .. }
        | Request::FindChunkLocation { sender, .. }
        | Request::Contains { sender, .. }
        | Request::CheckIfNewValueExists { sender, .. }
        | Request::Delete { sender, .. }
        | Request::ConfirmIntegrity { sender, .. }
        | Request::GetMetadataList { sender }
        | Request::GetChunkValue { sender, .. } => Some(sender.clone()),
        Request::FindNeighbors | Request::Client(_) => None,
    }
}

#[async_trait]
impl RequestHandler for DhtHandler {
    async fn handle(&self, peer_addr: SocketAddr, request: Request) -> Response {
        let ctx = &self.dht.ctx;
        if let Some(sender) = sender_of(&request) {
            if let Err(err) = ctx.welcome_if_new(sender).await {
                tracing::debug!(%peer_addr, %err, "welcome_if_new failed");
            }
        }

        match request {
            Request::Ping { remote_id, .. } => {
                let matches = remote_id.map(|id| id == ctx.self_descriptor.id).unwrap_or(true);
                Response::Pong(matches.then_some(ctx.self_descriptor.id))
            }
            Request::Store {
                key,
                value,
                kind,
                key_name,
                last_write,
                ..
            } => {
                let stored = ctx.store.put_value(key, value, kind, key_name, last_write).is_ok();
                Response::Stored(stored)
            }
            Request::FindNode { target, .. } => {
                let nodes = ctx.routing.lock().await.find_neighbors(&target, None, None);
                Response::Nodes(nodes)
            }
            Request::FindValue { target, kind, .. } => match ctx.store.get_payload(target, kind) {
                Ok(Some(bytes)) => Response::Value(FindValueResult::Value(bytes)),
                _ => {
                    let nodes = ctx.routing.lock().await.find_neighbors(&target, None, None);
                    Response::Value(FindValueResult::Neighbors(nodes))
                }
            },
            Request::FindChunkLocation { target, .. } => {
                if ctx.store.contains(target, RecordKind::Chunk) {
                    Response::ChunkLocation(FindChunkLocationResult::Location(ctx.self_descriptor.clone()))
                } else {
                    let nodes = ctx.routing.lock().await.find_neighbors(&target, None, None);
                    Response::ChunkLocation(FindChunkLocationResult::Neighbors(nodes))
                }
            }
            Request::Contains { key, kind, .. } => Response::Bool(ctx.store.contains(key, kind)),
            Request::CheckIfNewValueExists { key, kind, .. } => {
                let (present, last_write) = ctx.store.check_if_new_value_exists(key, kind);
                Response::Exists { present, last_write }
            }
            Request::Delete { key, kind, .. } => Response::Bool(ctx.store.delete(key, kind).unwrap_or(false)),
            Request::ConfirmIntegrity { key, kind, .. } => {
                Response::Bool(ctx.store.confirm_integrity(key, kind).unwrap_or(false))
            }
            Request::GetMetadataList { .. } => Response::MetadataList(ctx.store.list_integrity_metadata_names()),
            Request::GetChunkValue { key, .. } => {
                Response::ChunkBytes(ctx.store.get_payload(key, RecordKind::Chunk).ok().flatten())
            }
            Request::FindNeighbors => Response::Nodes(ctx.routing.lock().await.all_nodes()),
            Request::Client(client_request) => Response::Client(self.dht.handle_client(client_request).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::LocalStore;
    use dfs_protocol::digest;

    fn dht(tmp: &std::path::Path, port: u16) -> Dht {
        let self_descriptor = NodeDescriptor::new(digest(format!("node-{port}").as_bytes()), "127.0.0.1", port);
        let store = LocalStore::open(tmp).unwrap();
        let config = Config {
            ksize: 2,
            alpha: 3,
            ..Config::default()
        };
        Dht::new(Arc::new(NetworkContext::new(self_descriptor, store, config)))
    }

    #[tokio::test]
    async fn single_node_put_then_get_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let dht = dht(tmp.path(), 9100);
        assert!(dht.put("greeting", b"hello world".to_vec()).await);
        assert_eq!(dht.get("greeting").await, Some(b"hello world".to_vec()));
        assert_eq!(dht.list().await, vec!["greeting".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_file_from_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let dht = dht(tmp.path(), 9101);
        assert!(dht.put("note", b"text".to_vec()).await);
        assert!(dht.delete("note").await);
        assert_eq!(dht.get("note").await, None);
        assert!(dht.list().await.is_empty());
    }

    #[tokio::test]
    async fn ping_replies_with_self_id_when_remote_id_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let dht = dht(tmp.path(), 9102);
        let handler = DhtHandler::new(dht.clone());
        let self_id = dht.context().self_descriptor.id;
        let peer_addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let request = Request::Ping {
            sender: NodeDescriptor::new(digest(b"caller"), "127.0.0.1", 9999),
            remote_id: Some(self_id),
        };
        let response = handler.handle(peer_addr, request).await;
        assert!(matches!(response, Response::Pong(Some(id)) if id == self_id));
    }
}
