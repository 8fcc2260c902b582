// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The background maintenance loop (spec C8) plus the independent
//! solitude-detector task. Grounded on `network.py`'s `_refresh_table`,
//! `find_replicas` and `_detect_alone`.

use dfs_protocol::{Id, NodeDescriptor, Request, Response};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LONELY_BUCKET_SECS;
use crate::context::NetworkContext;
use crate::discovery::Discovery;

/// One pass of the six maintenance steps (spec §4.8), run every
/// `refresh_sleep` seconds.
pub async fn run_cycle(ctx: &NetworkContext) {
    tracing::info!("maintenance cycle starting");

    // 1. Corruption sweep.
    ctx.store.sweep_corrupted(ctx.config.ttl_secs);

    // 2. Bucket refresh.
    let lonely = {
        let routing = ctx.routing.lock().await;
        routing.lonely_buckets(Duration::from_secs(LONELY_BUCKET_SECS))
    };
    let crawler = ctx.crawler();
    for (lo, hi) in lonely {
        let probe = random_id_in_range(lo, hi);
        crawler.find_node(probe).await;
    }

    // 3. Old-key republish.
    for (key, value, kind, last_write, key_name) in ctx.store.iterate_older_than(ctx.config.refresh_sleep_secs) {
        let ok = ctx
            .set_digest(key, value, kind, true, Some(last_write), key_name, true)
            .await;
        if !ok {
            tracing::warn!(%key, "republish failed, will retry next cycle");
        }
        if let Err(err) = ctx.store.clear_republish_flag(key, kind) {
            tracing::warn!(%key, %err, "failed to clear republish flag");
        }
    }

    // 4. Replica census.
    let census = replica_census(ctx).await;

    // 5 & 6. Under/over-replication repair.
    for (key, kind, holders) in census {
        if holders.len() < ctx.config.ksize {
            let (present, last_write) = ctx.store.check_if_new_value_exists(key, kind);
            if present {
                if let Ok(Some(value)) = ctx.store.get_payload(key, kind) {
                    ctx.set_digest(key, value, kind, true, last_write, None, true).await;
                }
            }
        } else if holders.len() > ctx.config.ksize {
            prune_over_replicated(ctx, key, kind, holders).await;
        }
    }

    tracing::info!("maintenance cycle complete");
}

/// A probe target somewhere inside `[lo, hi]`: fills random bytes and
/// clamps to the range rather than computing a uniform big-integer
/// sample, which is sufficient for a bucket-refresh probe.
fn random_id_in_range(lo: Id, hi: Id) -> Id {
    let mut bytes = [0u8; dfs_protocol::ID_LEN];
    rand::thread_rng().fill(&mut bytes);
    let candidate = Id::from_bytes(bytes);
    if candidate < lo {
        lo
    } else if candidate > hi {
        hi
    } else {
        candidate
    }
}

/// For each locally known key, crawl to `2*ksize` closest nodes and ask
/// each via `contains` whether it holds the record.
async fn replica_census(ctx: &NetworkContext) -> Vec<(Id, dfs_protocol::RecordKind, Vec<NodeDescriptor>)> {
    let mut out = Vec::new();
    for (key, kind) in ctx.store.keys() {
        let crawler = crate::crawler::Crawler {
            self_descriptor: ctx.self_descriptor.clone(),
            routing: Arc::clone(&ctx.routing),
            rpc: ctx.rpc.clone(),
            alpha: ctx.config.alpha,
            ksize: ctx.config.ksize * 2,
        };
        let nodes = crawler.find_node(key).await;
        let mut holders = Vec::new();
        if ctx.store.contains(key, kind) {
            holders.push(ctx.self_descriptor.clone());
        }
        for node in &nodes {
            let Ok(addr) = crate::rpc::RpcClient::resolve(node).await else {
                continue;
            };
            let request = Request::Contains {
                sender: ctx.self_descriptor.clone(),
                key,
                kind,
            };
            if matches!(ctx.rpc.call(addr, &request).await, Ok(Response::Bool(true))) {
                holders.push(node.clone());
            }
        }
        out.push((key, kind, holders));
    }
    out
}

/// If self is the single globally-closest holder of an over-replicated
/// key, instruct every holder outside the top `ksize` (ordered by
/// descending distance) to delete its copy.
async fn prune_over_replicated(
    ctx: &NetworkContext,
    key: Id,
    kind: dfs_protocol::RecordKind,
    mut holders: Vec<NodeDescriptor>,
) {
    holders.sort_by_key(|n| key.distance(&n.id));
    let Some(closest) = holders.first() else {
        return;
    };
    if !closest.same_home_as(&ctx.self_descriptor) {
        return;
    }
    let mut descending = holders.clone();
    descending.sort_by_key(|n| std::cmp::Reverse(key.distance(&n.id)));
    for node in descending.into_iter().take(holders.len().saturating_sub(ctx.config.ksize)) {
        if node.same_home_as(&ctx.self_descriptor) {
            continue;
        }
        let Ok(addr) = crate::rpc::RpcClient::resolve(&node).await else {
            continue;
        };
        let request = Request::Delete {
            sender: ctx.self_descriptor.clone(),
            key,
            kind,
        };
        if !matches!(ctx.rpc.call(addr, &request).await, Ok(Response::Bool(true))) {
            tracing::warn!(%key, peer = %node, "failed to prune over-replicated copy");
        }
    }
}

/// Runs the maintenance loop forever at `refresh_sleep` cadence.
pub async fn run_forever(ctx: Arc<NetworkContext>) {
    let mut interval = tokio::time::interval(Duration::from_secs(ctx.config.refresh_sleep_secs));
    loop {
        interval.tick().await;
        run_cycle(&ctx).await;
    }
}

/// Every 15s (spec §4.8), checks whether the routing table is empty; if
/// so, listens on the discovery channel for a bootstrap tuple and
/// rejoins via a NodeCrawler bootstrap.
pub async fn run_solitude_detector(ctx: Arc<NetworkContext>, discovery: Discovery) {
    let mut interval = tokio::time::interval(Duration::from_secs(crate::config::SOLITUDE_CHECK_SECS));
    loop {
        interval.tick().await;
        let alone = {
            let routing = ctx.routing.lock().await;
            routing.is_empty()
        };
        if !alone {
            continue;
        }
        tracing::warn!("no known neighbors, listening for a bootstrap announcement");
        if let Some((host, port)) = discovery.listen_once(Duration::from_secs(16)).await {
            if host == ctx.self_descriptor.host && port == ctx.self_descriptor.port {
                continue;
            }
            let seed = NodeDescriptor::new(Id::ZERO, host, port);
            let crawler = ctx.crawler();
            let found = crawler.find_node(ctx.self_descriptor.id).await;
            if found.is_empty() {
                let request = Request::FindNeighbors;
                if let Ok(addr) = crate::rpc::RpcClient::resolve(&seed).await {
                    if let Ok(Response::Nodes(nodes)) = ctx.rpc.call(addr, &request).await {
                        let mut routing = ctx.routing.lock().await;
                        for node in nodes {
                            let _ = routing.add_contact(node);
                        }
                        let _ = routing.add_contact(seed);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfs_protocol::digest;

    #[test]
    fn random_id_in_range_stays_within_bounds() {
        let lo = digest(b"lo");
        let hi = Id::MAX;
        let id = random_id_in_range(lo, hi);
        assert!(id <= hi);
    }
}
