// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The iterative parallel lookup (spec C6). `kade_drive/core/crawling.py`
//! has six `SpiderCrawl` subclasses differing only in which RPC they send
//! and how they interpret the response; per the redesign note in spec §9
//! ("tagged variants instead of dynamic dispatch"), this is one generic
//! engine (`Crawler::run`) parameterised over a request-builder and a
//! response-handler closure, monomorphised per call site rather than
//! dispatched through a trait object.

use dfs_protocol::{FindChunkLocationResult, FindValueResult, Id, NodeDescriptor, RecordKind, Request, Response};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::routing::RoutingTable;
use crate::rpc::RpcClient;

/// What a response handler tells the engine to do next.
pub enum RoundOutcome<T> {
    /// Keep crawling; any neighbor descriptors found are merged into the
    /// candidate set.
    Continue(Vec<NodeDescriptor>),
    /// Stop immediately and return this value.
    Terminal(T),
}

/// The result of a full crawl: either a handler returned early
/// (`terminal`), or every candidate was exhausted and `nearest` holds the
/// final candidate set in distance order.
pub struct CrawlOutcome<T> {
    pub terminal: Option<T>,
    pub nearest: Vec<NodeDescriptor>,
}

struct CrawlState {
    target: Id,
    nearest: Vec<NodeDescriptor>,
    contacted: HashSet<Id>,
}

impl CrawlState {
    fn new(target: Id, seed: Vec<NodeDescriptor>) -> Self {
        CrawlState {
            target,
            nearest: seed,
            contacted: HashSet::new(),
        }
    }

    fn next_batch(&self, limit: usize) -> Vec<NodeDescriptor> {
        self.nearest
            .iter()
            .filter(|n| !self.contacted.contains(&n.id))
            .take(limit)
            .cloned()
            .collect()
    }

    fn mark_contacted(&mut self, id: Id) {
        self.contacted.insert(id);
    }

    fn push_neighbors(&mut self, found: Vec<NodeDescriptor>, ksize: usize) {
        for n in found {
            if n.id == self.target {
                continue;
            }
            if !self.nearest.iter().any(|x| x.id == n.id) {
                self.nearest.push(n);
            }
        }
        self.nearest.sort_by_key(|n| self.target.distance(&n.id));
        self.nearest.truncate(ksize);
    }

    fn all_contacted(&self) -> bool {
        self.nearest.iter().all(|n| self.contacted.contains(&n.id))
    }
}

pub struct Crawler {
    pub self_descriptor: NodeDescriptor,
    pub routing: Arc<Mutex<RoutingTable>>,
    pub rpc: RpcClient,
    pub alpha: usize,
    pub ksize: usize,
}

impl Crawler {
    /// Seeds from the routing table's current view and iterates rounds of
    /// up to `alpha` parallel RPCs (spec §4.6 "Round"), widening to every
    /// remaining candidate once a round makes no progress.
    pub async fn run<T, ReqFn, RespFn>(
        &self,
        target: Id,
        request_for: ReqFn,
        mut handle: RespFn,
    ) -> CrawlOutcome<T>
    where
        ReqFn: Fn(&NodeDescriptor) -> Request,
        RespFn: FnMut(&NodeDescriptor, Response) -> RoundOutcome<T>,
    {
        let seed = {
            let mut routing = self.routing.lock().await;
            routing.find_neighbors(&target, Some(self.ksize), Some(&self.self_descriptor))
        };
        let mut state = CrawlState::new(target, seed);
        let mut previous_round_contacted: HashSet<Id> = HashSet::new();

        loop {
            let nearest_ids: HashSet<Id> = state.nearest.iter().map(|n| n.id).collect();
            let widen = !previous_round_contacted.is_empty() && nearest_ids == previous_round_contacted;
            let limit = if widen { state.nearest.len() } else { self.alpha };
            let batch = state.next_batch(limit);
            if batch.is_empty() {
                return CrawlOutcome {
                    terminal: None,
                    nearest: state.nearest,
                };
            }

            let calls = batch.iter().map(|node| {
                let request = request_for(node);
                let rpc = self.rpc.clone();
                let node = node.clone();
                async move {
                    let outcome = match RpcClient::resolve(&node).await {
                        Ok(addr) => rpc.call(addr, &request).await,
                        Err(err) => Err(err),
                    };
                    (node, outcome)
                }
            });
            let results = futures::future::join_all(calls).await;

            previous_round_contacted = batch.iter().map(|n| n.id).collect();
            for (node, result) in results {
                state.mark_contacted(node.id);
                match result {
                    Ok(response) => match handle(&node, response) {
                        RoundOutcome::Continue(found) => state.push_neighbors(found, self.ksize),
                        RoundOutcome::Terminal(value) => {
                            return CrawlOutcome {
                                terminal: Some(value),
                                nearest: state.nearest,
                            }
                        }
                    },
                    Err(_) => {
                        let mut routing = self.routing.lock().await;
                        let _ = routing.remove_contact(&node.id);
                    }
                }
            }

            if state.all_contacted() {
                return CrawlOutcome {
                    terminal: None,
                    nearest: state.nearest,
                };
            }
        }
    }

    fn find_node_request(&self, target: Id) -> impl Fn(&NodeDescriptor) -> Request {
        let sender = self.self_descriptor.clone();
        move |_node| Request::FindNode {
            sender: sender.clone(),
            target,
        }
    }

    /// NodeCrawler: pushes every neighbor list into `nearest`, returns the
    /// final candidate set once exhausted.
    pub async fn find_node(&self, target: Id) -> Vec<NodeDescriptor> {
        let outcome = self
            .run::<(), _, _>(target, self.find_node_request(target), |_node, response| {
                match response {
                    Response::Nodes(nodes) => RoundOutcome::Continue(nodes),
                    _ => RoundOutcome::Continue(Vec::new()),
                }
            })
            .await;
        outcome.nearest
    }

    /// ValueCrawler: collects every value response as a vote, records
    /// peers that answered with neighbors as "nearest without value", then
    /// returns the majority value and the best repair-on-read candidate.
    pub async fn find_value(
        &self,
        target: Id,
        kind: RecordKind,
    ) -> (Option<Vec<u8>>, Option<NodeDescriptor>) {
        let sender = self.self_descriptor.clone();
        let mut votes: Vec<Vec<u8>> = Vec::new();
        let mut without_value: Vec<NodeDescriptor> = Vec::new();

        self.run::<(), _, _>(
            target,
            move |_node| Request::FindValue {
                sender: sender.clone(),
                target,
                kind,
            },
            |node, response| match response {
                Response::Value(FindValueResult::Value(v)) => {
                    votes.push(v);
                    RoundOutcome::Continue(Vec::new())
                }
                Response::Value(FindValueResult::Neighbors(nodes)) => {
                    without_value.push(node.clone());
                    RoundOutcome::Continue(nodes)
                }
                _ => RoundOutcome::Continue(Vec::new()),
            },
        )
        .await;

        if votes.is_empty() {
            return (None, None);
        }
        let majority = most_common(votes);
        (Some(majority), without_value.into_iter().next())
    }

    /// ChunkLocationCrawler: terminates as soon as any location is found.
    pub async fn find_chunk_location(&self, chunk_id: Id) -> Vec<NodeDescriptor> {
        let sender = self.self_descriptor.clone();
        let outcome = self
            .run(
                chunk_id,
                move |_node| Request::FindChunkLocation {
                    sender: sender.clone(),
                    target: chunk_id,
                },
                |_node, response| match response {
                    Response::ChunkLocation(FindChunkLocationResult::Location(loc)) => {
                        RoundOutcome::Terminal(vec![loc])
                    }
                    Response::ChunkLocation(FindChunkLocationResult::Neighbors(nodes)) => {
                        RoundOutcome::Continue(nodes)
                    }
                    _ => RoundOutcome::Continue(Vec::new()),
                },
            )
            .await;
        outcome.terminal.unwrap_or_default()
    }

    /// DeleteCrawler: asks every peer in the crawl's final candidate set
    /// to delete the key, aggregating a boolean "any success".
    pub async fn delete(&self, target: Id, kind: RecordKind) -> bool {
        let peers = self.find_node(target).await;
        self.dispatch_bool(peers, |sender| Request::Delete {
            sender,
            key: target,
            kind,
        })
        .await
    }

    /// ConfirmIntegrityCrawler: same fan-out shape as delete, for the
    /// confirm-integrity RPC.
    pub async fn confirm_integrity(&self, target: Id, kind: RecordKind) -> bool {
        let peers = self.find_node(target).await;
        self.dispatch_bool(peers, |sender| Request::ConfirmIntegrity {
            sender,
            key: target,
            kind,
        })
        .await
    }

    async fn dispatch_bool(
        &self,
        peers: Vec<NodeDescriptor>,
        request_for: impl Fn(NodeDescriptor) -> Request,
    ) -> bool {
        let sender = self.self_descriptor.clone();
        let calls = peers.iter().map(|node| {
            let request = request_for(sender.clone());
            let rpc = self.rpc.clone();
            let node = node.clone();
            async move {
                match RpcClient::resolve(&node).await {
                    Ok(addr) => rpc.call(addr, &request).await,
                    Err(err) => Err(err),
                }
            }
        });
        let results = futures::future::join_all(calls).await;
        results.into_iter().any(|r| matches!(r, Ok(Response::Bool(true)) | Ok(Response::Stored(true))))
    }

    /// LsCrawler: unions every peer's metadata-name listing with a
    /// caller-supplied local listing.
    pub async fn list(&self, pivot: Id) -> Vec<String> {
        let sender = self.self_descriptor.clone();
        let mut names = HashSet::new();
        self.run::<(), _, _>(
            pivot,
            move |_node| Request::GetMetadataList { sender: sender.clone() },
            |_node, response| match response {
                Response::MetadataList(list) => {
                    names.extend(list);
                    RoundOutcome::Continue(Vec::new())
                }
                Response::Nodes(nodes) => RoundOutcome::Continue(nodes),
                _ => RoundOutcome::Continue(Vec::new()),
            },
        )
        .await;
        names.into_iter().collect()
    }
}

/// Tie-break favours the first value seen among the most frequent, as
/// the original's `Counter.most_common()` does for stable ordering.
fn most_common(votes: Vec<Vec<u8>>) -> Vec<u8> {
    let mut counts: Vec<(Vec<u8>, usize)> = Vec::new();
    for vote in votes {
        if let Some(entry) = counts.iter_mut().find(|(v, _)| *v == vote) {
            entry.1 += 1;
        } else {
            counts.push((vote, 1));
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(v, _)| v)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_common_picks_the_majority_value() {
        let votes = vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec()];
        assert_eq!(most_common(votes), b"a".to_vec());
    }
}
