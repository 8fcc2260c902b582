// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! A single K-bucket: up to `ksize` nodes ordered by recency, backed by a
//! bounded replacement list for overflow candidates (spec §4.4).

use dfs_protocol::{shared_prefix, Id, NodeDescriptor};
use std::time::Instant;

#[derive(Clone, Debug)]
pub struct KBucket {
    pub range: (Id, Id),
    /// Most recently seen node is last.
    nodes: Vec<NodeDescriptor>,
    replacement_nodes: Vec<NodeDescriptor>,
    ksize: usize,
    max_replacement_nodes: usize,
    last_updated: Instant,
}

impl KBucket {
    pub fn new(lo: Id, hi: Id, ksize: usize) -> Self {
        KBucket {
            range: (lo, hi),
            nodes: Vec::new(),
            replacement_nodes: Vec::new(),
            ksize,
            max_replacement_nodes: ksize * 5,
            last_updated: Instant::now(),
        }
    }

    pub fn touch_last_updated(&mut self) {
        self.last_updated = Instant::now();
    }

    pub fn last_updated(&self) -> Instant {
        self.last_updated
    }

    pub fn nodes(&self) -> &[NodeDescriptor] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn has_in_range(&self, id: &Id) -> bool {
        *id >= self.range.0 && *id <= self.range.1
    }

    pub fn is_new_node(&self, id: &Id) -> bool {
        !self.nodes.iter().any(|n| n.id == *id)
    }

    pub fn head(&self) -> Option<&NodeDescriptor> {
        self.nodes.first()
    }

    /// Splits this bucket's range at the midpoint, redistributing both
    /// the primary and replacement nodes into the two halves.
    pub fn split(&self) -> (KBucket, KBucket) {
        let mid = Id::midpoint(&self.range.0, &self.range.1);
        let mut one = KBucket::new(self.range.0, mid, self.ksize);
        let hi_lo = mid.next();
        let mut two = KBucket::new(hi_lo, self.range.1, self.ksize);
        for node in self.nodes.iter().chain(self.replacement_nodes.iter()) {
            let bucket = if node.id <= mid { &mut one } else { &mut two };
            bucket.add_node(node.clone());
        }
        (one, two)
    }

    pub fn remove_node(&mut self, id: &Id) {
        self.nodes.retain(|n| n.id != *id);
        self.replacement_nodes.retain(|n| n.id != *id);
        if self.nodes.len() < self.ksize {
            if let Some(promoted) = self.replacement_nodes.pop() {
                self.nodes.push(promoted);
            }
        }
    }

    /// Returns `true` iff `node` fit into the primary set. `false` means
    /// the bucket is full and the node was filed as a replacement
    /// candidate instead (spec §4.4).
    pub fn add_node(&mut self, node: NodeDescriptor) -> bool {
        if let Some(pos) = self.nodes.iter().position(|n| n.id == node.id) {
            self.nodes.remove(pos);
            self.nodes.push(node);
            return true;
        }
        if self.nodes.len() < self.ksize {
            self.nodes.push(node);
            return true;
        }
        self.replacement_nodes.retain(|n| n.id != node.id);
        self.replacement_nodes.push(node);
        while self.replacement_nodes.len() > self.max_replacement_nodes {
            self.replacement_nodes.remove(0);
        }
        false
    }

    /// Shared-prefix depth of the ids currently held, used to decide
    /// whether a full bucket should split (spec §4.4 split policy).
    pub fn depth(&self) -> u32 {
        if self.nodes.is_empty() {
            return 0;
        }
        let ids: Vec<Id> = self.nodes.iter().map(|n| n.id).collect();
        shared_prefix(&ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfs_protocol::digest;

    fn node(seed: &str) -> NodeDescriptor {
        NodeDescriptor::new(digest(seed.as_bytes()), "127.0.0.1", 9000)
    }

    #[test]
    fn full_bucket_files_overflow_as_replacement() {
        let mut bucket = KBucket::new(Id::ZERO, Id::MAX, 2);
        assert!(bucket.add_node(node("a")));
        assert!(bucket.add_node(node("b")));
        assert!(!bucket.add_node(node("c")));
        assert_eq!(bucket.len(), 2);
    }

    #[test]
    fn split_partitions_by_midpoint() {
        let mut bucket = KBucket::new(Id::ZERO, Id::MAX, 20);
        for seed in ["a", "b", "c", "d", "e"] {
            bucket.add_node(node(seed));
        }
        let (one, two) = bucket.split();
        for n in one.nodes() {
            assert!(n.id <= one.range.1);
        }
        for n in two.nodes() {
            assert!(n.id >= two.range.0);
        }
        assert_eq!(one.nodes().len() + two.nodes().len(), 5);
    }
}
