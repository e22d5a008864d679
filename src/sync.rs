//! Reconciliation between the remote catalog, the global store and the persistent cache.
//!
//! [`SyncController::reconcile`] is called by the event loop after anything it watches
//! may have changed: the remote status version or the identity of the action sink.
//! Each call with new inputs is one reconciliation cycle and takes exactly one path:
//!
//! 1. remote result present: dispatch it, then upsert every product into the cache
//!    and drop cached products the result no longer contains
//! 2. remote settled without a result: read the cache and dispatch what it holds
//! 3. remote still pending: do nothing
//!
//! Cache traffic runs on detached tasks and nothing is cancelled when a newer cycle
//! starts. Each write-through takes a fresh cache sequence number at dispatch time,
//! so the cache settles on the most recently dispatched remote result no matter how
//! the writes of overlapping cycles interleave.

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{PersistentCache, PRODUCTS};
use crate::catalog::remote::RemoteStatus;
use crate::catalog::types::{CatalogSnapshot, Product};
use crate::store::{Action, ActionSink};

/// Which path a reconciliation call took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// Watched inputs did not change since the last cycle
  Unchanged,
  /// Remote still pending with no result
  Waiting,
  /// Remote result dispatched and written through
  Remote { products: usize },
  /// Cache read started for offline browsing
  Fallback,
}

/// One reconciliation cycle and its asynchronous tail.
///
/// Dropping a cycle leaves its tasks running.
#[must_use = "await `settled` or drop the cycle to detach its cache tasks"]
pub struct Cycle {
  pub outcome: Outcome,
  tasks: Vec<JoinHandle<()>>,
}

impl Cycle {
  fn idle(outcome: Outcome) -> Self {
    Self {
      outcome,
      tasks: Vec::new(),
    }
  }

  /// Wait for every cache task spawned by this cycle.
  #[cfg_attr(not(test), allow(dead_code))]
  pub async fn settled(self) {
    for result in join_all(self.tasks).await {
      if let Err(e) = result {
        warn!(error = %e, "sync task panicked");
      }
    }
  }
}

pub struct SyncController {
  cache: PersistentCache,
  /// (remote version, sink generation) of the last cycle
  last_seen: Option<(u64, u64)>,
}

impl SyncController {
  pub fn new(cache: PersistentCache) -> Self {
    Self {
      cache,
      last_seen: None,
    }
  }

  /// Run a reconciliation cycle if the watched inputs changed.
  pub fn reconcile<S: ActionSink>(&mut self, remote: &RemoteStatus, sink: &S) -> Cycle {
    let watched = (remote.version, sink.generation());
    if self.last_seen == Some(watched) {
      return Cycle::idle(Outcome::Unchanged);
    }
    self.last_seen = Some(watched);

    if let Some(products) = &remote.result {
      self.write_through(products, sink)
    } else if !remote.pending {
      self.fallback(sink)
    } else {
      debug!(version = remote.version, "remote pending, waiting");
      Cycle::idle(Outcome::Waiting)
    }
  }

  fn write_through<S: ActionSink>(&self, products: &CatalogSnapshot, sink: &S) -> Cycle {
    let seq = self.cache.next_sequence();
    debug!(count = products.len(), seq, "dispatching remote catalog");
    sink.dispatch(Action::UpdateProducts(products.clone()));

    let mut tasks: Vec<JoinHandle<()>> = products
      .iter()
      .map(|product| {
        let cache = self.cache.clone();
        let product = product.clone();
        tokio::spawn(async move {
          match cache.put(PRODUCTS, &product, seq).await {
            Ok(true) => {}
            Ok(false) => debug!(id = %product.id, seq, "superseded product write skipped"),
            Err(e) => warn!(id = %product.id, error = %e, "failed to cache product"),
          }
        })
      })
      .collect();

    tasks.push(tokio::spawn(prune(self.cache.clone(), seq)));

    Cycle {
      outcome: Outcome::Remote {
        products: products.len(),
      },
      tasks,
    }
  }

  fn fallback<S: ActionSink>(&self, sink: &S) -> Cycle {
    debug!("remote settled without data, reading cache");
    let cache = self.cache.clone();
    let sink = sink.clone();

    let task = tokio::spawn(async move {
      match cache.get_all::<Product>(PRODUCTS).await {
        Ok(cached) => {
          let newest = cached.iter().map(|c| c.cached_at).max();
          info!(
            count = cached.len(),
            newest = ?newest,
            "serving catalog from cache"
          );
          let products = cached.into_iter().map(|c| c.record).collect();
          sink.dispatch(Action::UpdateProducts(products));
        }
        Err(e) => warn!(error = %e, "cache read failed, keeping current catalog"),
      }
    });

    Cycle {
      outcome: Outcome::Fallback,
      tasks: vec![task],
    }
  }
}

/// Evict cached products written before batch `seq`.
async fn prune(cache: PersistentCache, seq: u64) {
  match cache.prune(PRODUCTS, seq).await {
    Ok(0) => {}
    Ok(removed) => debug!(removed, seq, "evicted products missing from the catalog"),
    Err(e) => warn!(error = %e, "failed to evict stale products"),
  }
}
