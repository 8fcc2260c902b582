// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use dfs_protocol::Id;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Internal error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire codec error: {0}")]
    Codec(#[from] dfs_protocol::Error),

    #[error("could not create storage dir: {path:?}, error: {source}")]
    FailedToCreateStoreDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("record {0} not found locally")]
    RecordNotFound(Id),

    #[error("record on disk at {path:?} failed to decode and was quarantined")]
    CorruptRecord { path: PathBuf },

    #[error("node {0} has no bucket to fall into")]
    NoBucketForNode(Id),

    #[error("call to {addr} timed out")]
    CallTimeout { addr: SocketAddr },

    #[error("unexpected response shape from {addr} for this request")]
    UnexpectedResponse { addr: SocketAddr },

    #[error("no bootstrap contact could be reached")]
    BootstrapFailed,

    #[error("exhausted every candidate port starting at {start}")]
    NoPortAvailable { start: u16 },

    #[error("routing reply channel was dropped before a response arrived")]
    ReplyDropped(#[from] tokio::sync::oneshot::error::RecvError),
}
