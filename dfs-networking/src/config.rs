// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Tunables shared by every subsystem (spec §6 "Configuration options").

use std::path::PathBuf;

/// Default listening port; the server retries sequential ports from here
/// until one binds.
pub const DEFAULT_PORT: u16 = 8086;

/// How many sequential ports a node will try before giving up.
pub const PORT_RETRY_RANGE: u16 = 100;

/// Solitude-detector cadence; fixed by spec §4.8, not user-configurable.
pub const SOLITUDE_CHECK_SECS: u64 = 15;

/// Lonely-bucket threshold; fixed by spec §4.4.
pub const LONELY_BUCKET_SECS: u64 = 20;

#[derive(Clone, Debug)]
pub struct Config {
    /// Replication factor and bucket capacity.
    pub ksize: usize,
    /// Crawler concurrency per round.
    pub alpha: usize,
    /// Seconds after which a non-integrity record is eligible for collection.
    pub ttl_secs: u64,
    /// Maintenance-loop period, in seconds.
    pub refresh_sleep_secs: u64,
    /// Bytes per chunk in the put pipeline.
    pub chunk_size: usize,
    /// Directory holding `values/`, `metadata/`, `keys/`, `timestamps/`.
    pub storage_dir: PathBuf,
    /// Listening port to start from.
    pub port: u16,
    /// RPC call timeout.
    pub rpc_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ksize: 2,
            alpha: 3,
            ttl_secs: 3600,
            refresh_sleep_secs: 300,
            chunk_size: 500,
            storage_dir: PathBuf::from("static"),
            port: DEFAULT_PORT,
            rpc_timeout_secs: 10,
        }
    }
}
