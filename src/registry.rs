//! Process-global state: the pool name map and the CA bundle path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};

use crate::error::Error;
use crate::pool::{Outcome, Pool, PoolId, PoolOptions, RequestOptions};
use crate::request::Request;

struct Registry {
    pools: RwLock<HashMap<PoolId, Pool>>,
    ca_certificate_bundle_path: OnceLock<PathBuf>,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        pools: RwLock::new(HashMap::new()),
        ca_certificate_bundle_path: OnceLock::new(),
    })
}

/// Start a pool and register it under `id`, replacing and stopping
/// any pool previously registered under that name.
///
/// Must be called within a tokio runtime.
pub fn start_pool(id: PoolId, options: PoolOptions) -> Pool {
    let pool = Pool::start(id.clone(), options);
    let previous = registry().pools.write().unwrap().insert(id, pool.clone());
    if let Some(previous) = previous {
        tokio::spawn(async move { previous.stop().await });
    }
    pool
}

/// Stop and unregister the pool named `id`.
pub async fn stop_pool(id: &PoolId) {
    let pool = registry().pools.write().unwrap().remove(id);
    if let Some(pool) = pool {
        pool.stop().await;
    }
}

/// The pool registered under `id`.
pub fn pool(id: &PoolId) -> Option<Pool> {
    registry().pools.read().unwrap().get(id).cloned()
}

/// Send a request through the pool named in `options.pool`.
///
/// The `default` pool is started on demand with default options.
///
/// # Panics
///
/// Panics when the options name a pool that was never started.
pub async fn send_request(req: Request, options: RequestOptions) -> Result<Outcome, Error> {
    let id = options.pool.clone().unwrap_or_default();
    let pool = match pool(&id) {
        Some(pool) => pool,
        None if id == PoolId::default() => default_pool(),
        None => panic!("pool {id} was never started"),
    };
    pool.send_request(req, options).await
}

fn default_pool() -> Pool {
    let mut pools = registry().pools.write().unwrap();
    pools
        .entry(PoolId::default())
        .or_insert_with(|| Pool::start(PoolId::default(), PoolOptions::default()))
        .clone()
}

/// Set the process-wide CA bundle path used for TLS verification.
///
/// The path is immutable once set: the first call wins and returns
/// `true`, later calls are ignored and return `false`.
pub fn set_ca_certificate_bundle_path(path: impl Into<PathBuf>) -> bool {
    registry()
        .ca_certificate_bundle_path
        .set(path.into())
        .is_ok()
}

pub(crate) fn ca_certificate_bundle_path() -> Option<PathBuf> {
    registry().ca_certificate_bundle_path.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pools_are_registered_and_stopped_by_name() {
        let id = PoolId::new("registry-test");
        assert!(pool(&id).is_none());

        let started = start_pool(id.clone(), PoolOptions::default());
        let found = pool(&id).expect("registered pool");
        assert_eq!(found.id(), started.id());

        stop_pool(&id).await;
        assert!(pool(&id).is_none());
    }

    #[tokio::test]
    async fn starting_a_pool_replaces_its_predecessor() {
        let id = PoolId::new("registry-replace-test");
        let first = start_pool(id.clone(), PoolOptions::default());
        let second = start_pool(id.clone(), PoolOptions::default());

        let found = pool(&id).expect("registered pool");
        assert_eq!(found.id(), second.id());
        drop(first);

        stop_pool(&id).await;
        assert!(pool(&id).is_none());
    }
}
