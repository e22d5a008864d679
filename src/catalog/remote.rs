//! Remote catalog source exposed as `{ pending, result }`.
//!
//! One fetch runs per mount. `pending` starts true and flips to false once the fetch
//! resolves; a successful fetch makes `result` present and it never goes back to
//! absent. A failed fetch (offline, server error, bad payload) settles with no result.
//!
//! Completions come back as [`RemoteEvent`]s through the app's event loop, and
//! [`RemoteCatalog::apply`] folds them into the status. Each observable change bumps
//! `version`, which is what the sync controller watches.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::client::CatalogClient;
use super::types::CatalogSnapshot;
use crate::event::Event;

/// Completion of a remote fetch
#[derive(Debug)]
pub enum RemoteEvent {
  Settled {
    fetch_id: u64,
    outcome: Result<CatalogSnapshot, String>,
  },
}

/// What the remote source currently exposes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteStatus {
  /// Still waiting on the fetch
  pub pending: bool,
  /// Latest successful result
  pub result: Option<CatalogSnapshot>,
  /// Bumped on every change to `pending` or `result`
  pub version: u64,
  /// Error from the last failed fetch
  pub error: Option<String>,
  /// When the last fetch resolved
  pub settled_at: Option<DateTime<Utc>>,
}

impl RemoteStatus {
  fn unsettled() -> Self {
    Self {
      pending: true,
      ..Self::default()
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

/// Remote catalog query, mounted once per app run.
pub struct RemoteCatalog {
  status: RemoteStatus,
  fetcher: Option<FetcherFn<CatalogSnapshot>>,
  fetch_id: u64,
  tx: mpsc::UnboundedSender<Event>,
}

impl RemoteCatalog {
  /// Create a source backed by the HTTP catalog client.
  pub fn http(client: CatalogClient, tx: mpsc::UnboundedSender<Event>) -> Self {
    Self::new(
      move || {
        let client = client.clone();
        async move { client.fetch_products().await.map_err(|e| e.to_string()) }
      },
      tx,
    )
  }

  /// Create a source with the given fetcher.
  pub fn new<F, Fut>(fetcher: F, tx: mpsc::UnboundedSender<Event>) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CatalogSnapshot, String>> + Send + 'static,
  {
    Self {
      status: RemoteStatus::unsettled(),
      fetcher: Some(Box::new(move || Box::pin(fetcher()))),
      fetch_id: 0,
      tx,
    }
  }

  /// Create a source that can never produce a result.
  pub fn offline(tx: mpsc::UnboundedSender<Event>) -> Self {
    Self {
      status: RemoteStatus::unsettled(),
      fetcher: None,
      fetch_id: 0,
      tx,
    }
  }

  pub fn status(&self) -> &RemoteStatus {
    &self.status
  }

  pub fn is_pending(&self) -> bool {
    self.status.pending
  }

  /// Start the initial fetch.
  ///
  /// An offline source settles immediately with no result.
  pub fn mount(&mut self) {
    if self.fetcher.is_none() {
      if !self.status.pending {
        return;
      }
      info!("remote catalog disabled, settling offline");
      self.status.pending = false;
      self.status.settled_at = Some(Utc::now());
      self.status.version += 1;
      return;
    }
    if self.fetch_id == 0 {
      self.start_fetch();
    }
  }

  /// Fetch again, superseding any fetch in flight.
  ///
  /// The previous result stays visible while the new fetch is pending.
  pub fn refetch(&mut self) {
    if self.fetcher.is_some() {
      self.start_fetch();
    }
  }

  /// Fold a completion into the status. Returns whether the status changed.
  pub fn apply(&mut self, event: RemoteEvent) -> bool {
    match event {
      RemoteEvent::Settled { fetch_id, outcome } => {
        if fetch_id != self.fetch_id {
          // Superseded by a later refetch
          return false;
        }

        match outcome {
          Ok(products) => {
            info!(count = products.len(), "remote catalog settled");
            self.status.result = Some(products);
            self.status.error = None;
          }
          Err(e) => {
            warn!(error = %e, "remote catalog unavailable");
            self.status.error = Some(e);
          }
        }
        self.status.pending = false;
        self.status.settled_at = Some(Utc::now());
        self.status.version += 1;
        true
      }
    }
  }

  fn start_fetch(&mut self) {
    let Some(fetcher) = &self.fetcher else {
      return;
    };

    self.fetch_id += 1;
    self.status.pending = true;
    self.status.version += 1;

    let fetch_id = self.fetch_id;
    let future = fetcher();
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let outcome = future.await;
      // Ignore send errors - the loop may have shut down
      let _ = tx.send(Event::Remote(RemoteEvent::Settled { fetch_id, outcome }));
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::types::fixtures::product;

  async fn next_remote(rx: &mut mpsc::UnboundedReceiver<Event>) -> RemoteEvent {
    match rx.recv().await {
      Some(Event::Remote(event)) => event,
      other => panic!("expected remote event, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_successful_fetch_settles_with_result() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut remote = RemoteCatalog::new(|| async { Ok(vec![product("1", "A")]) }, tx);
    assert!(remote.is_pending());

    remote.mount();
    assert!(remote.is_pending());
    assert_eq!(remote.status().result, None);
    let mounted_version = remote.status().version;

    let event = next_remote(&mut rx).await;
    assert!(remote.apply(event));
    assert!(!remote.is_pending());
    assert_eq!(remote.status().result, Some(vec![product("1", "A")]));
    assert!(remote.status().version > mounted_version);
  }

  #[tokio::test]
  async fn test_failed_fetch_settles_without_result() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut remote = RemoteCatalog::new(|| async { Err("connection refused".to_string()) }, tx);

    remote.mount();
    let event = next_remote(&mut rx).await;
    assert!(remote.apply(event));

    assert!(!remote.is_pending());
    assert_eq!(remote.status().result, None);
    assert_eq!(remote.status().error.as_deref(), Some("connection refused"));
  }

  #[tokio::test]
  async fn test_mount_twice_fetches_once() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut remote = RemoteCatalog::new(|| async { Ok(Vec::new()) }, tx);

    remote.mount();
    remote.mount();
    let event = next_remote(&mut rx).await;
    assert!(remote.apply(event));
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_offline_settles_immediately() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut remote = RemoteCatalog::offline(tx);
    assert!(remote.is_pending());

    remote.mount();
    assert!(!remote.is_pending());
    assert_eq!(remote.status().result, None);
    assert_eq!(remote.status().version, 1);

    remote.refetch();
    assert!(!remote.is_pending());
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_refetch_failure_keeps_previous_result() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = calls.clone();
    let mut remote = RemoteCatalog::new(
      move || {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        async move {
          if n == 0 {
            Ok(vec![product("1", "A")])
          } else {
            Err("offline".to_string())
          }
        }
      },
      tx,
    );

    remote.mount();
    let event = next_remote(&mut rx).await;
    remote.apply(event);

    remote.refetch();
    assert!(remote.is_pending());
    assert_eq!(remote.status().result, Some(vec![product("1", "A")]));

    let event = next_remote(&mut rx).await;
    remote.apply(event);
    assert!(!remote.is_pending());
    assert_eq!(remote.status().result, Some(vec![product("1", "A")]));
  }

  #[tokio::test]
  async fn test_superseded_fetch_is_ignored() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut remote = RemoteCatalog::new(|| async { Ok(Vec::new()) }, tx);
    remote.mount();
    remote.refetch();
    let version = remote.status().version;

    let stale = RemoteEvent::Settled {
      fetch_id: 1,
      outcome: Ok(vec![product("9", "Z")]),
    };
    assert!(!remote.apply(stale));
    assert_eq!(remote.status().result, None);
    assert_eq!(remote.status().version, version);
  }
}
