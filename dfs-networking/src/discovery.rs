// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! LAN-local discovery (spec C9/§6): UDP multicast broadcast/listen on
//! port 50001, message body `"dfs <host> <port>"`, heartbeat ~300ms.
//! Specified only as an interface contract in spec.md; grounded on the
//! `message_system` package's `broadcast`/`receive` usage in
//! `network.py`'s `_detect_alone` and `bootstrap`-on-rejoin flow.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::error::Result;

pub const DISCOVERY_PORT: u16 = 50001;
const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 98);
const HEARTBEAT: Duration = Duration::from_millis(300);

#[derive(Clone)]
pub struct Discovery {
    host: String,
    port: u16,
}

impl Discovery {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Discovery {
            host: host.into(),
            port,
        }
    }

    fn multicast_addr() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(MULTICAST_GROUP, DISCOVERY_PORT))
    }

    async fn bind_multicast() -> Result<UdpSocket> {
        let socket = UdpSocket::bind(("0.0.0.0", DISCOVERY_PORT)).await?;
        socket.join_multicast_v4(MULTICAST_GROUP, Ipv4Addr::UNSPECIFIED)?;
        Ok(socket)
    }

    /// Announces `"dfs <host> <port>"` on the LAN every ~300ms, forever.
    pub async fn announce_forever(&self) -> Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        let message = format!("dfs {} {}", self.host, self.port);
        loop {
            let _ = socket.send_to(message.as_bytes(), Self::multicast_addr()).await;
            tokio::time::sleep(HEARTBEAT).await;
        }
    }

    /// Returns the first `(host, port)` announced by a peer other than
    /// self within `window`, or `None` on timeout (spec §4.9
    /// `broadcast_listen`).
    pub async fn listen_once(&self, window: Duration) -> Option<(String, u16)> {
        let socket = Self::bind_multicast().await.ok()?;
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let mut buf = [0u8; 256];
            let (len, _from) = match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
                Ok(Ok(pair)) => pair,
                _ => return None,
            };
            let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                continue;
            };
            let Some(rest) = text.strip_prefix("dfs ") else {
                continue;
            };
            let mut parts = rest.split_whitespace();
            let (Some(host), Some(port_str)) = (parts.next(), parts.next()) else {
                continue;
            };
            let Ok(port) = port_str.parse::<u16>() else {
                continue;
            };
            if host == self.host && port == self.port {
                continue;
            }
            return Some((host.to_string(), port));
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn filters_messages_without_dfs_prefix() {
        let text = "not-dfs hello world";
        assert!(text.strip_prefix("dfs ").is_none());
    }

    #[test]
    fn parses_host_and_port_from_announcement() {
        let text = "dfs 10.0.0.5 9001";
        let rest = text.strip_prefix("dfs ").unwrap();
        let mut parts = rest.split_whitespace();
        assert_eq!(parts.next(), Some("10.0.0.5"));
        assert_eq!(parts.next().unwrap().parse::<u16>().unwrap(), 9001);
    }
}
