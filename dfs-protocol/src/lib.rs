// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Wire types shared between every node and client in the distributed
//! file store: 160-bit identifiers (C1), node descriptors (C2), the
//! on-disk/on-wire `Record` (§3), and the RPC request/response shapes
//! of the node-to-node surface (C5).

pub mod error;
pub mod id;
pub mod message;
pub mod node;
pub mod record;

pub use error::{Error, Result};
pub use id::{digest, shared_prefix, Distance, Id, ID_LEN};
pub use message::{ClientRequest, ClientResponse, FindChunkLocationResult, FindValueResult, Request, Response};
pub use node::NodeDescriptor;
pub use record::{now, Record, RecordKind, Timestamp};

/// Serialise a wire message with the self-describing MessagePack encoding
/// every RPC uses (spec §4.5: "implementations MAY negotiate any wire
/// codec as long as it round-trips the fields declared").
pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(value)?)
}

pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}
