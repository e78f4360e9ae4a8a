//! Peer and item enrichment.
//!
//! GeoIP and reverse DNS are interface contracts; the concrete resolvers
//! are injected by the application. Items missing `added_at` are backfilled
//! from the history store by compound key.

use async_trait::async_trait;
use peerdeck_core::{GeoInfo, Peer, UnifiedItem};
use peerdeck_data::HistoryStore;
use tracing::warn;

/// GeoIP lookup contract.
#[async_trait]
pub trait GeoIpResolver: Send + Sync {
    /// Resolve an address to geo data; `None` when unknown.
    async fn lookup(&self, address: &str) -> Option<GeoInfo>;
}

/// Reverse-DNS lookup contract.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Resolve an address to a hostname; `None` when unknown.
    async fn reverse(&self, address: &str) -> Option<String>;
}

/// Resolver that knows nothing; used when no GeoIP database is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResolver;

#[async_trait]
impl GeoIpResolver for NoopResolver {
    async fn lookup(&self, _address: &str) -> Option<GeoInfo> {
        None
    }
}

#[async_trait]
impl HostResolver for NoopResolver {
    async fn reverse(&self, _address: &str) -> Option<String> {
        None
    }
}

async fn enrich_peer(peer: &mut Peer, geoip: &dyn GeoIpResolver, hosts: &dyn HostResolver) {
    if peer.geo.is_none() {
        peer.geo = geoip.lookup(&peer.address).await;
    }
    if peer.hostname.is_none() {
        peer.hostname = hosts.reverse(&peer.address).await;
    }
}

/// Enrich every peer of every item in place.
pub async fn enrich_peers(
    items: &mut [UnifiedItem],
    geoip: &dyn GeoIpResolver,
    hosts: &dyn HostResolver,
) {
    for item in items.iter_mut() {
        for peer in item.peers_detailed.iter_mut() {
            enrich_peer(peer, geoip, hosts).await;
        }
        for peer in item.active_uploads.iter_mut() {
            enrich_peer(peer, geoip, hosts).await;
        }
    }
}

/// Backfill `added_at` from history rows keyed by compound key.
pub async fn backfill_added_at(items: &mut [UnifiedItem], history: &HistoryStore) {
    let missing: Vec<String> = items
        .iter()
        .filter(|item| item.added_at.is_none())
        .map(|item| item.key().to_string())
        .collect();
    if missing.is_empty() {
        return;
    }
    match history.added_at_map(&missing).await {
        Ok(map) => {
            for item in items.iter_mut() {
                if item.added_at.is_none() {
                    item.added_at = map.get(&item.key().to_string()).copied();
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "added-at backfill failed");
        }
    }
}
