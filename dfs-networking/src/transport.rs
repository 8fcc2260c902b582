// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Wire framing and the listener loop for the RPC surface (spec C5): one
//! TCP connection per call, closed deterministically after a single
//! request/response exchange. Grounded on `message_system.py`'s
//! length-prefixed per-call socket session, with an `rmp-serde` payload
//! in place of Python pickle (the same codec substitution `sn_networking`
//! makes for its own wire format).

use async_trait::async_trait;
use dfs_protocol::{Request, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};

const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

pub async fn write_frame(stream: &mut TcpStream, bytes: &[u8]) -> Result<()> {
    stream.write_u32(bytes.len() as u32).await?;
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let len = stream.read_u32().await?;
    if len > MAX_FRAME_BYTES {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame exceeds maximum size",
        )));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Implemented by the node's dispatch table; invoked once per accepted
/// connection with the peer's observed socket address.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, peer_addr: SocketAddr, request: Request) -> Response;
}

/// Binds a listener at `addr` and serves one request/response exchange
/// per accepted connection, closing it afterwards regardless of outcome.
pub async fn serve(
    addr: SocketAddr,
    handler: Arc<dyn RequestHandler>,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    let task = tokio::spawn(serve_on(listener, handler));
    Ok((bound, task))
}

/// Accepts connections forever on an already-bound listener, serving one
/// request/response exchange per connection. Used by `dfs-node` so the
/// listener can be bound with [`bind_sequential`] before the serve loop
/// takes ownership of it.
pub async fn serve_on(listener: TcpListener, handler: Arc<dyn RequestHandler>) {
    loop {
        let (mut stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(%err, "failed to accept connection");
                continue;
            }
        };
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            if let Err(err) = serve_one(&mut stream, peer_addr, handler.as_ref()).await {
                tracing::debug!(%peer_addr, %err, "rpc session ended with error");
            }
        });
    }
}

async fn serve_one(
    stream: &mut TcpStream,
    peer_addr: SocketAddr,
    handler: &dyn RequestHandler,
) -> Result<()> {
    let frame = read_frame(stream).await?;
    let request: Request = dfs_protocol::decode(&frame)?;
    tracing::trace!(%peer_addr, "dispatching rpc");
    let response = handler.handle(peer_addr, request).await;
    let bytes = dfs_protocol::encode(&response)?;
    write_frame(stream, &bytes).await?;
    Ok(())
}

/// Finds the first free port starting at `start`, binding sequentially
/// (spec §6: "if bound, the server retries sequential ports until one is
/// free"). Returns the bound listener together with its actual port.
pub async fn bind_sequential(host: &str, start: u16) -> Result<(TcpListener, u16)> {
    for offset in 0..crate::config::PORT_RETRY_RANGE {
        let port = start.saturating_add(offset);
        let addr = format!("{host}:{port}");
        if let Ok(listener) = TcpListener::bind(&addr).await {
            let bound_port = listener.local_addr()?.port();
            return Ok((listener, bound_port));
        }
    }
    Err(Error::NoPortAvailable { start })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, _peer_addr: SocketAddr, request: Request) -> Response {
            match request {
                Request::Ping { .. } => Response::Pong(None),
                _ => Response::Bool(false),
            }
        }
    }

    #[tokio::test]
    async fn serves_one_request_then_stays_up_for_the_next_connection() {
        let (bound, _task) = serve("127.0.0.1:0".parse().unwrap(), Arc::new(Echo)).await.unwrap();
        for _ in 0..2 {
            let mut stream = TcpStream::connect(bound).await.unwrap();
            let request = Request::Ping {
                sender: dfs_protocol::NodeDescriptor::new(dfs_protocol::digest(b"x"), "127.0.0.1", 1),
                remote_id: None,
            };
            let bytes = dfs_protocol::encode(&request).unwrap();
            write_frame(&mut stream, &bytes).await.unwrap();
            let response_bytes = read_frame(&mut stream).await.unwrap();
            let response: Response = dfs_protocol::decode(&response_bytes).unwrap();
            assert!(matches!(response, Response::Pong(None)));
        }
    }
}
