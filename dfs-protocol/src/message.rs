// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The node-to-node RPC surface (spec C5) plus the client-facing requests
//! that `dfs-cli` sends to a node's public API (spec C10).

use crate::id::Id;
use crate::node::NodeDescriptor;
use crate::record::{RecordKind, Timestamp};
use serde::{Deserialize, Serialize};

/// Result shape for RPCs that either return a found value or fall
/// through to a list of closer neighbors (`find_value`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindValueResult {
    Value(Vec<u8>),
    Neighbors(Vec<NodeDescriptor>),
}

/// Result shape for `find_chunk_location`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindChunkLocationResult {
    Location(NodeDescriptor),
    Neighbors(Vec<NodeDescriptor>),
}

/// A request issued by one peer to another, or by a client to a node.
/// Every peer-to-peer RPC carries the caller's descriptor as `sender`,
/// which the callee uses to run `welcome_if_new` (spec §4.5/§4.7).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Request {
    Ping {
        sender: NodeDescriptor,
        remote_id: Option<Id>,
    },
    Store {
        sender: NodeDescriptor,
        key: Id,
        value: Vec<u8>,
        kind: RecordKind,
        key_name: Option<String>,
        last_write: Option<Timestamp>,
    },
    FindNode {
        sender: NodeDescriptor,
        target: Id,
    },
    FindValue {
        sender: NodeDescriptor,
        target: Id,
        kind: RecordKind,
    },
    FindChunkLocation {
        sender: NodeDescriptor,
        target: Id,
    },
    Contains {
        sender: NodeDescriptor,
        key: Id,
        kind: RecordKind,
    },
    CheckIfNewValueExists {
        sender: NodeDescriptor,
        key: Id,
        kind: RecordKind,
    },
    Delete {
        sender: NodeDescriptor,
        key: Id,
        kind: RecordKind,
    },
    ConfirmIntegrity {
        sender: NodeDescriptor,
        key: Id,
        kind: RecordKind,
    },
    GetMetadataList {
        sender: NodeDescriptor,
    },
    GetChunkValue {
        sender: NodeDescriptor,
        key: Id,
    },
    FindNeighbors,
    /// A request from `dfs-cli` (or any in-process caller) to this node's
    /// public API, rather than between DHT peers.
    Client(ClientRequest),
}

/// The public API surface (spec C10), as framed over the wire for the
/// interactive client shell.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ClientRequest {
    Put { name: String, value: Vec<u8> },
    Get { name: String },
    Delete { name: String },
    List,
}

/// A response to a [`Request`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Response {
    /// Liveness/identity reply to `ping`; `None` if `remote_id` was
    /// supplied and mismatched.
    Pong(Option<Id>),
    Stored(bool),
    Nodes(Vec<NodeDescriptor>),
    Value(FindValueResult),
    ChunkLocation(FindChunkLocationResult),
    Bool(bool),
    Exists {
        present: bool,
        last_write: Option<Timestamp>,
    },
    MetadataList(Vec<String>),
    ChunkBytes(Option<Vec<u8>>),
    Client(ClientResponse),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ClientResponse {
    Put(bool),
    Get(Option<Vec<u8>>),
    Delete(bool),
    List(Vec<String>),
}
