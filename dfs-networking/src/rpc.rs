// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The caller side of an RPC: resolve a peer's address, open a session,
//! send one request, read one response, close (spec §4.5 "peer session").

use dfs_protocol::{NodeDescriptor, Request, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::transport::{read_frame, write_frame};

#[derive(Clone, Debug)]
pub struct RpcClient {
    timeout: Duration,
}

impl RpcClient {
    pub fn new(timeout: Duration) -> Self {
        RpcClient { timeout }
    }

    pub async fn resolve(node: &NodeDescriptor) -> Result<SocketAddr> {
        tokio::net::lookup_host(node.addr())
            .await?
            .next()
            .ok_or_else(|| Error::UnexpectedResponse {
                addr: "0.0.0.0:0".parse().unwrap(),
            })
    }

    /// Opens one connection, sends `request`, reads the response, and lets
    /// the connection drop. An unreachable peer or a timeout surfaces as
    /// `Err`; callers are expected to remove the peer from the routing
    /// table on failure (spec §4.5: "process_response(null) removes the
    /// target from the routing table").
    pub async fn call(&self, addr: SocketAddr, request: &Request) -> Result<Response> {
        tokio::time::timeout(self.timeout, self.call_inner(addr, request))
            .await
            .map_err(|_| Error::CallTimeout { addr })?
    }

    async fn call_inner(&self, addr: SocketAddr, request: &Request) -> Result<Response> {
        let mut stream = TcpStream::connect(addr).await?;
        let bytes = dfs_protocol::encode(request)?;
        write_frame(&mut stream, &bytes).await?;
        let response_bytes = read_frame(&mut stream).await?;
        let response = dfs_protocol::decode(&response_bytes)?;
        Ok(response)
    }

    pub async fn call_node(&self, node: &NodeDescriptor, request: &Request) -> Result<Response> {
        let addr = Self::resolve(node).await?;
        self.call(addr, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{serve, RequestHandler};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct AlwaysPong;

    #[async_trait]
    impl RequestHandler for AlwaysPong {
        async fn handle(&self, _peer_addr: SocketAddr, _request: Request) -> Response {
            Response::Pong(None)
        }
    }

    #[tokio::test]
    async fn call_node_round_trips_through_a_real_socket() {
        let (bound, _task) = serve("127.0.0.1:0".parse().unwrap(), Arc::new(AlwaysPong))
            .await
            .unwrap();
        let client = RpcClient::new(Duration::from_secs(1));
        let sender = NodeDescriptor::new(dfs_protocol::digest(b"caller"), "127.0.0.1", bound.port());
        let response = client
            .call(bound, &Request::Ping { sender, remote_id: None })
            .await
            .unwrap();
        assert!(matches!(response, Response::Pong(None)));
    }

    #[tokio::test]
    async fn unreachable_peer_errors_instead_of_hanging() {
        let client = RpcClient::new(Duration::from_millis(200));
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let sender = NodeDescriptor::new(dfs_protocol::digest(b"caller"), "127.0.0.1", 1);
        let result = client.call(addr, &Request::Ping { sender, remote_id: None }).await;
        assert!(result.is_err());
    }
}
