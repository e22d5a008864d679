//! Global catalog state and the actions that change it.

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::catalog::types::{CatalogSnapshot, Product};
use crate::event::Event;

/// State shared by the catalog views
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalState {
  pub products: CatalogSnapshot,
  pub current_category: Option<String>,
}

/// The closed set of state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
  /// Replace the product list wholesale
  UpdateProducts(CatalogSnapshot),
  /// Replace the active category filter
  UpdateCurrentCategory(Option<String>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
  #[error("invalid action: {0}")]
  InvalidAction(String),
}

impl Action {
  pub fn name(&self) -> &'static str {
    match self {
      Action::UpdateProducts(_) => "UPDATE_PRODUCTS",
      Action::UpdateCurrentCategory(_) => "UPDATE_CURRENT_CATEGORY",
    }
  }

  /// Parse an action typed into the command bar.
  ///
  /// Accepts `category <id>` and `all`.
  pub fn parse(input: &str) -> Result<Self, StoreError> {
    let mut words = input.split_whitespace();
    let verb = words.next().map(str::to_lowercase);

    match (verb.as_deref(), words.next(), words.next()) {
      (Some("category" | "cat"), Some(id), None) => {
        Ok(Action::UpdateCurrentCategory(Some(id.to_string())))
      }
      (Some("all"), None, None) => Ok(Action::UpdateCurrentCategory(None)),
      _ => Err(StoreError::InvalidAction(input.trim().to_string())),
    }
  }
}

/// Capability to submit actions to the store owner.
pub trait ActionSink: Clone + Send + Sync + 'static {
  fn dispatch(&self, action: Action);

  /// Identity of this sink. Clones share it.
  fn generation(&self) -> u64;
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_generation() -> u64 {
  NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Sink that forwards actions to the app's event loop, which applies them in order.
#[derive(Clone)]
pub struct Dispatcher {
  tx: mpsc::UnboundedSender<Event>,
  generation: u64,
}

impl Dispatcher {
  pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
    Self {
      tx,
      generation: next_generation(),
    }
  }
}

impl ActionSink for Dispatcher {
  fn dispatch(&self, action: Action) {
    // The loop is gone only during shutdown
    let _ = self.tx.send(Event::Dispatch(action));
  }

  fn generation(&self) -> u64 {
    self.generation
  }
}

/// Sole owner of [`GlobalState`]
#[derive(Debug, Default)]
pub struct GlobalStore {
  state: GlobalState,
}

impl GlobalStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> &GlobalState {
    &self.state
  }

  pub fn dispatch(&mut self, action: Action) {
    debug!(action = action.name(), "applying action");
    self.state = reduce(std::mem::take(&mut self.state), action);
  }

  pub fn products(&self) -> &[Product] {
    &self.state.products
  }
}

fn reduce(state: GlobalState, action: Action) -> GlobalState {
  match action {
    Action::UpdateProducts(products) => GlobalState { products, ..state },
    Action::UpdateCurrentCategory(current_category) => GlobalState {
      current_category,
      ..state
    },
  }
}
