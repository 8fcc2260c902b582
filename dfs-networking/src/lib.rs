// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Storage, routing, RPC transport, crawling, replication and maintenance
//! for a node in the distributed file store.

pub mod bucket;
pub mod config;
pub mod context;
pub mod crawler;
pub mod dht;
pub mod discovery;
pub mod error;
pub mod maintenance;
pub mod replication;
pub mod routing;
pub mod rpc;
pub mod store;
pub mod transport;

pub use config::Config;
pub use context::NetworkContext;
pub use dht::Dht;
pub use error::{Error, Result};
pub use store::LocalStore;
