// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The process-wide context threaded through the RPC dispatcher, the
//! replication engine and the maintenance loop (spec §9: "model them as
//! explicit context objects... do not rely on static-lifetime globals").

use dfs_protocol::NodeDescriptor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::crawler::Crawler;
use crate::routing::RoutingTable;
use crate::rpc::RpcClient;
use crate::store::LocalStore;

pub struct NetworkContext {
    pub self_descriptor: NodeDescriptor,
    pub routing: Arc<Mutex<RoutingTable>>,
    pub store: Arc<LocalStore>,
    pub rpc: RpcClient,
    pub config: Config,
}

impl NetworkContext {
    pub fn new(self_descriptor: NodeDescriptor, store: LocalStore, config: Config) -> Self {
        let routing = RoutingTable::new(self_descriptor.id, config.ksize);
        NetworkContext {
            rpc: RpcClient::new(Duration::from_secs(config.rpc_timeout_secs)),
            self_descriptor,
            routing: Arc::new(Mutex::new(routing)),
            store: Arc::new(store),
            config,
        }
    }

    pub fn crawler(&self) -> Crawler {
        Crawler {
            self_descriptor: self.self_descriptor.clone(),
            routing: Arc::clone(&self.routing),
            rpc: self.rpc.clone(),
            alpha: self.config.alpha,
            ksize: self.config.ksize,
        }
    }
}
