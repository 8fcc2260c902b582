// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Node descriptors (spec C2): an immutable `(id, host, port)` triple.

use crate::id::{Distance, Id};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A participant in the network, identified by a 160-bit id and reachable
/// at `host:port`. Descriptors are never mutated once observed; routing
/// tracks freshness by re-insertion, not by editing the descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: Id,
    pub host: String,
    pub port: u16,
}

impl NodeDescriptor {
    pub fn new(id: Id, host: impl Into<String>, port: u16) -> Self {
        NodeDescriptor {
            id,
            host: host.into(),
            port,
        }
    }

    pub fn distance_to(&self, other: &NodeDescriptor) -> Distance {
        self.id.distance(&other.id)
    }

    /// Two descriptors are "same home" iff host and port match, regardless
    /// of id (a restarted node keeps its address but may mint a new id).
    pub fn same_home_as(&self, other: &NodeDescriptor) -> bool {
        self.host == other.host && self.port == other.port
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::digest;

    #[test]
    fn same_home_ignores_id() {
        let a = NodeDescriptor::new(digest(b"a"), "10.0.0.1", 9000);
        let b = NodeDescriptor::new(digest(b"b"), "10.0.0.1", 9000);
        assert!(a.same_home_as(&b));
        let c = NodeDescriptor::new(digest(b"a"), "10.0.0.2", 9000);
        assert!(!a.same_home_as(&c));
    }
}
