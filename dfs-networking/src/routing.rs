// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The K-bucket routing table (spec C4): a flat, ordered list of
//! [`KBucket`]s covering disjoint sub-ranges of the id space, starting as
//! a single bucket over `[0, 2^160)` and splitting on demand. No direct
//! Rust teacher source exists for this component (the reference crate
//! delegates bucket/routing logic to libp2p's internal kademlia); it is
//! grounded directly on `kade_drive/core/routing.py`'s `RoutingTable`,
//! `KBucket` and `TableTraverser`.

use dfs_protocol::{Id, NodeDescriptor};
use std::time::{Duration, Instant};

use crate::bucket::KBucket;
use crate::error::{Error, Result};

pub struct RoutingTable {
    owner: Id,
    ksize: usize,
    buckets: Vec<KBucket>,
}

impl RoutingTable {
    pub fn new(owner: Id, ksize: usize) -> Self {
        RoutingTable {
            owner,
            ksize,
            buckets: vec![KBucket::new(Id::ZERO, Id::MAX, ksize)],
        }
    }

    pub fn ksize(&self) -> usize {
        self.ksize
    }

    fn bucket_index_for(&self, id: &Id) -> Result<usize> {
        self.buckets
            .iter()
            .position(|b| b.has_in_range(id))
            .ok_or(Error::NoBucketForNode(*id))
    }

    pub fn is_new_node(&self, id: &Id) -> Result<bool> {
        let index = self.bucket_index_for(id)?;
        Ok(self.buckets[index].is_new_node(id))
    }

    pub fn remove_contact(&mut self, id: &Id) -> Result<()> {
        let index = self.bucket_index_for(id)?;
        self.buckets[index].remove_node(id);
        Ok(())
    }

    fn split_bucket(&mut self, index: usize) {
        let (one, two) = self.buckets[index].split();
        self.buckets[index] = one;
        self.buckets.insert(index + 1, two);
    }

    /// Adds `node`, splitting the containing bucket per spec §4.4's split
    /// policy when it is full: only if the bucket covers the owner's own
    /// id, or its depth is not a multiple of 5. Otherwise the node is
    /// only retained as a replacement candidate; the caller MAY ping the
    /// bucket's head and evict it on failure (`evict_head_and_retry`).
    pub fn add_contact(&mut self, node: NodeDescriptor) -> Result<()> {
        if node.id == self.owner {
            return Ok(());
        }
        let index = self.bucket_index_for(&node.id)?;
        if self.buckets[index].add_node(node.clone()) {
            return Ok(());
        }
        let should_split =
            self.buckets[index].has_in_range(&self.owner) || !self.buckets[index].depth().is_multiple_of(5);
        if should_split {
            self.split_bucket(index);
            self.add_contact(node)
        } else {
            Ok(())
        }
    }

    /// Buckets untouched for longer than `threshold` (spec §4.4 "lonely
    /// buckets"), each paired with a random probe id inside its range.
    pub fn lonely_buckets(&self, threshold: Duration) -> Vec<(Id, Id)> {
        let cutoff = Instant::now() - threshold;
        self.buckets
            .iter()
            .filter(|b| b.last_updated() < cutoff)
            .map(|b| b.range)
            .collect()
    }

    pub fn touch_bucket_for(&mut self, id: &Id) -> Result<()> {
        let index = self.bucket_index_for(id)?;
        self.buckets[index].touch_last_updated();
        Ok(())
    }

    /// The `k` nodes closest to `target` by XOR distance, excluding
    /// `target` itself and any node `same_home_as(exclude)`. Traverses
    /// outward from `target`'s home bucket, alternating left/right
    /// (`TableTraverser` in the original).
    pub fn find_neighbors(
        &mut self,
        target: &Id,
        k: Option<usize>,
        exclude: Option<&NodeDescriptor>,
    ) -> Vec<NodeDescriptor> {
        let k = k.unwrap_or(self.ksize);
        let Ok(index) = self.bucket_index_for(target) else {
            return Vec::new();
        };
        self.buckets[index].touch_last_updated();

        let mut candidates: Vec<NodeDescriptor> = Vec::new();
        for node in TableTraverser::new(&self.buckets, index) {
            if node.id == *target {
                continue;
            }
            if let Some(exclude) = exclude {
                if node.same_home_as(exclude) {
                    continue;
                }
            }
            candidates.push(node);
        }

        candidates.sort_by_key(|n| target.distance(&n.id));
        candidates.truncate(k);
        candidates
    }

    pub fn all_nodes(&self) -> Vec<NodeDescriptor> {
        self.buckets.iter().flat_map(|b| b.nodes().to_vec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.is_empty())
    }
}

/// Pops nodes from the home bucket, then alternately from the buckets to
/// its left and right, matching `routing.py`'s `TableTraverser`.
struct TableTraverser {
    current: Vec<NodeDescriptor>,
    left: Vec<Vec<NodeDescriptor>>,
    right: Vec<Vec<NodeDescriptor>>,
    pop_left_next: bool,
}

impl TableTraverser {
    fn new(buckets: &[KBucket], home_index: usize) -> Self {
        TableTraverser {
            current: buckets[home_index].nodes().to_vec(),
            left: buckets[..home_index].iter().map(|b| b.nodes().to_vec()).collect(),
            right: buckets[home_index + 1..].iter().map(|b| b.nodes().to_vec()).collect(),
            pop_left_next: true,
        }
    }
}

impl Iterator for TableTraverser {
    type Item = NodeDescriptor;

    fn next(&mut self) -> Option<NodeDescriptor> {
        if let Some(node) = self.current.pop() {
            return Some(node);
        }
        if self.pop_left_next {
            if let Some(bucket) = self.left.pop() {
                self.current = bucket;
                self.pop_left_next = false;
                return self.next();
            }
        }
        if let Some(bucket) = self.right.pop() {
            self.current = bucket;
            self.pop_left_next = true;
            return self.next();
        }
        if !self.left.is_empty() {
            self.current = self.left.pop().unwrap();
            return self.next();
        }
        None
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
    fn find_neighbors_orders_by_distance_to_target() {
        let mut table = RoutingTable::new(digest(b"self"), 20);
        for seed in ["a", "b", "c", "d"] {
            table.add_contact(node(seed)).unwrap();
        }
        let target = digest(b"a");
        let neighbors = table.find_neighbors(&target, Some(3), None);
        assert!(neighbors.len() <= 3);
        let mut prev = Id::ZERO;
        for (i, n) in neighbors.iter().enumerate() {
            let d = target.distance(&n.id);
            if i > 0 {
                assert!(target.distance(&prev) <= d);
            }
            prev = n.id;
        }
    }

    #[test]
    fn full_bucket_splits_when_it_contains_owner() {
        let owner = Id::ZERO;
        let mut table = RoutingTable::new(owner, 2);
        for i in 0..10u8 {
            let mut bytes = [0u8; 20];
            bytes[19] = i;
            table.add_contact(NodeDescriptor::new(Id::from_bytes(bytes), "h", 1)).unwrap();
        }
        assert!(table.buckets.len() > 1);
    }

    #[test]
    fn exclude_same_home_filters_node() {
        let mut table = RoutingTable::new(digest(b"self"), 20);
        let a = node("a");
        table.add_contact(a.clone()).unwrap();
        let neighbors = table.find_neighbors(&digest(b"a"), None, Some(&a));
        assert!(neighbors.iter().all(|n| !n.same_home_as(&a)));
    }
}
