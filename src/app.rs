use crate::cache::{PersistentCache, SqliteStorage, UnavailableStorage};
use crate::catalog::client::CatalogClient;
use crate::catalog::remote::{RemoteCatalog, RemoteStatus};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::filter::{filter_products, step_category};
use crate::store::{Action, ActionSink, Dispatcher, GlobalStore};
use crate::sync::SyncController;
use crate::ui;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::widgets::ListState;
use std::io::stdout;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Input mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
  Normal,
  Command,
}

/// Where the products on screen came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  /// Waiting for the first remote answer
  Loading,
  /// Remote result in view
  Live,
  /// Remote unavailable, showing the cache
  Offline,
}

impl Source {
  pub fn of(remote: &RemoteStatus) -> Self {
    match (&remote.result, remote.pending) {
      (Some(_), _) => Source::Live,
      (None, true) => Source::Loading,
      (None, false) => Source::Offline,
    }
  }
}

/// Main application state
pub struct App {
  config: Config,

  /// Catalog state shown by the views
  store: GlobalStore,

  /// Remote catalog query
  remote: RemoteCatalog,

  /// Reconciles remote, store and cache
  controller: SyncController,

  /// Sink the controller and key handlers dispatch through
  dispatcher: Dispatcher,

  /// Current input mode
  mode: Mode,

  /// Command input buffer (after pressing :)
  command_input: String,

  /// Last command feedback shown in the status bar
  message: Option<String>,

  list_state: ListState,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: Config, offline: bool, tx: mpsc::UnboundedSender<Event>) -> Result<Self> {
    let cache = open_cache(&config);

    let remote = match (&config.catalog.url, offline) {
      (Some(url), false) => {
        RemoteCatalog::http(CatalogClient::new(&config.catalog, url)?, tx.clone())
      }
      _ => RemoteCatalog::offline(tx.clone()),
    };

    Ok(Self::with_parts(config, remote, cache, tx))
  }

  pub fn with_parts(
    config: Config,
    remote: RemoteCatalog,
    cache: PersistentCache,
    tx: mpsc::UnboundedSender<Event>,
  ) -> Self {
    Self {
      config,
      store: GlobalStore::new(),
      remote,
      controller: SyncController::new(cache),
      dispatcher: Dispatcher::new(tx),
      mode: Mode::Normal,
      command_input: String::new(),
      message: None,
      list_state: ListState::default(),
      should_quit: false,
    }
  }

  pub async fn run(&mut self, mut events: EventHandler) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    self.start();

    // Main loop
    while !self.should_quit {
      // Draw UI
      terminal.draw(|frame| ui::draw(frame, self))?;

      // Handle events
      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
  }

  /// Mount the remote source and run the first reconciliation.
  pub fn start(&mut self) {
    if let Some(category) = self.config.default_category.clone() {
      self
        .dispatcher
        .dispatch(Action::UpdateCurrentCategory(Some(category)));
    }
    self.remote.mount();
    self.sync();
  }

  fn sync(&mut self) {
    let cycle = self
      .controller
      .reconcile(self.remote.status(), &self.dispatcher);
    debug!(outcome = ?cycle.outcome, "reconciled");
    // Cache tasks finish on their own
    drop(cycle);
  }

  pub fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {} // UI refresh happens automatically
      Event::Remote(remote_event) => {
        if self.remote.apply(remote_event) {
          self.sync();
        }
      }
      Event::Dispatch(action) => {
        self.store.dispatch(action);
        let visible = self.visible_count();
        ui::ensure_valid_selection(&mut self.list_state, visible);
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match self.mode {
      Mode::Normal => self.handle_normal_mode_key(key),
      Mode::Command => self.handle_command_mode_key(key),
    }
  }

  fn handle_normal_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      // Quit
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      // Navigation
      KeyCode::Up | KeyCode::Char('k') => self.list_state.select_previous(),
      KeyCode::Down | KeyCode::Char('j') => self.list_state.select_next(),

      // Category filter
      KeyCode::Tab => self.step_category(true),
      KeyCode::BackTab => self.step_category(false),
      KeyCode::Char('a') => self
        .dispatcher
        .dispatch(Action::UpdateCurrentCategory(None)),

      KeyCode::Char('r') => self.refresh(),

      KeyCode::Char(':') => {
        self.mode = Mode::Command;
        self.command_input.clear();
        self.message = None;
      }

      _ => {}
    }
  }

  fn handle_command_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.mode = Mode::Normal;
        self.command_input.clear();
      }
      KeyCode::Enter => {
        self.execute_command();
        self.mode = Mode::Normal;
      }
      KeyCode::Backspace => {
        self.command_input.pop();
      }
      KeyCode::Char(c) => self.command_input.push(c),
      _ => {}
    }
  }

  fn execute_command(&mut self) {
    let input = std::mem::take(&mut self.command_input);

    match input.trim() {
      "" => {}
      "quit" | "q" => self.should_quit = true,
      "refresh" => self.refresh(),
      other => match Action::parse(other) {
        Ok(action) => self.dispatcher.dispatch(action),
        Err(e) => {
          warn!(error = %e, "ignoring command");
          self.message = Some(e.to_string());
        }
      },
    }
  }

  fn step_category(&mut self, forward: bool) {
    let next = step_category(self.store.state(), forward);
    self
      .dispatcher
      .dispatch(Action::UpdateCurrentCategory(next));
  }

  fn refresh(&mut self) {
    self.remote.refetch();
    self.sync();
  }

  fn visible_count(&self) -> usize {
    filter_products(self.store.state()).len()
  }

  // Accessors for UI rendering
  pub fn store(&self) -> &GlobalStore {
    &self.store
  }

  pub fn remote(&self) -> &RemoteStatus {
    self.remote.status()
  }

  pub fn source(&self) -> Source {
    Source::of(self.remote.status())
  }

  pub fn mode(&self) -> &Mode {
    &self.mode
  }

  pub fn command_input(&self) -> &str {
    &self.command_input
  }

  pub fn message(&self) -> Option<&str> {
    self.message.as_deref()
  }

  pub fn list_state(&self) -> &ListState {
    &self.list_state
  }

  pub fn title(&self) -> &str {
    self
      .config
      .title
      .as_deref()
      .or(self.config.catalog.url.as_deref())
      .unwrap_or("storeview")
  }
}

/// Open the configured cache, degrading to an unavailable one on failure.
fn open_cache(config: &Config) -> PersistentCache {
  let Some(path) = config.cache_path() else {
    return PersistentCache::new(UnavailableStorage::new("cache disabled"));
  };

  match SqliteStorage::open(&path) {
    Ok(storage) => PersistentCache::new(storage),
    Err(e) => {
      warn!(path = %path.display(), error = %e, "cache unavailable");
      PersistentCache::new(UnavailableStorage::new(e.to_string()))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::PRODUCTS;
  use crate::catalog::types::fixtures::product;
  use crate::catalog::types::Product;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn memory_cache() -> PersistentCache {
    PersistentCache::new(SqliteStorage::open_in_memory().unwrap())
  }

  /// Feed queued events back into the app until `done` holds.
  async fn pump(
    app: &mut App,
    rx: &mut mpsc::UnboundedReceiver<Event>,
    done: impl Fn(&App) -> bool,
  ) {
    while !done(app) {
      let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed");
      app.handle_event(event);
    }
  }

  #[test]
  fn test_source_of_status() {
    let mut status = RemoteStatus {
      pending: true,
      ..RemoteStatus::default()
    };
    assert_eq!(Source::of(&status), Source::Loading);

    status.pending = false;
    assert_eq!(Source::of(&status), Source::Offline);

    status.result = Some(Vec::new());
    assert_eq!(Source::of(&status), Source::Live);
  }

  #[tokio::test]
  async fn test_online_start_shows_remote_products() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let remote = RemoteCatalog::new(
      || async { Ok(vec![product("1", "A"), product("2", "B")]) },
      tx.clone(),
    );
    let cache = memory_cache();
    let mut app = App::with_parts(Config::default(), remote, cache, tx);

    app.start();
    assert_eq!(app.source(), Source::Loading);
    pump(&mut app, &mut rx, |app| app.store().products().len() == 2).await;

    assert_eq!(app.source(), Source::Live);
    assert_eq!(app.visible_count(), 2);
  }

  #[tokio::test]
  async fn test_offline_start_shows_cached_products() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cache = memory_cache();
    cache
      .put(PRODUCTS, &product("5", "C"), cache.next_sequence())
      .await
      .unwrap();
    let mut app = App::with_parts(
      Config::default(),
      RemoteCatalog::offline(tx.clone()),
      cache,
      tx,
    );

    app.start();
    assert_eq!(app.source(), Source::Offline);
    pump(&mut app, &mut rx, |app| !app.store().products().is_empty()).await;

    assert_eq!(app.store().products(), &[product("5", "C")]);
  }

  #[tokio::test]
  async fn test_failed_fetch_falls_back_to_cache() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cache = memory_cache();
    cache
      .put(PRODUCTS, &product("7", "A"), cache.next_sequence())
      .await
      .unwrap();
    let remote = RemoteCatalog::new(|| async { Err("offline".to_string()) }, tx.clone());
    let mut app = App::with_parts(Config::default(), remote, cache, tx);

    app.start();
    pump(&mut app, &mut rx, |app| !app.store().products().is_empty()).await;

    assert_eq!(app.source(), Source::Offline);
    assert_eq!(app.store().products(), &[product("7", "A")]);
  }

  #[tokio::test]
  async fn test_refresh_leaves_cache_with_refetched_catalog() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let calls = Arc::new(AtomicUsize::new(0));
    let remote = RemoteCatalog::new(
      move || {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        async move {
          if call == 0 {
            Ok(vec![product("1", "OLD"), product("2", "OLD")])
          } else {
            Ok(vec![product("1", "NEW"), product("3", "NEW")])
          }
        }
      },
      tx.clone(),
    );
    let cache = memory_cache();
    let mut app = App::with_parts(Config::default(), remote, cache.clone(), tx);
    let refreshed = vec![product("1", "NEW"), product("3", "NEW")];

    app.start();
    pump(&mut app, &mut rx, |app| app.store().products().len() == 2).await;
    app.handle_event(Event::Key(key(KeyCode::Char('r'))));
    pump(&mut app, &mut rx, |app| app.store().products() == refreshed.as_slice()).await;

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
      let mut cached: Vec<Product> = cache
        .get_all::<Product>(PRODUCTS)
        .await
        .unwrap()
        .into_iter()
        .map(|cached| cached.record)
        .collect();
      cached.sort_by(|a, b| a.id.cmp(&b.id));
      if cached == refreshed {
        break;
      }
      assert!(
        tokio::time::Instant::now() < deadline,
        "cache never settled on the refetched catalog: {:?}",
        cached
      );
      tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
  }

  #[tokio::test]
  async fn test_default_category_is_applied() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let config = Config {
      default_category: Some("A".to_string()),
      ..Config::default()
    };
    let remote = RemoteCatalog::new(
      || async { Ok(vec![product("1", "A"), product("2", "B")]) },
      tx.clone(),
    );
    let mut app = App::with_parts(config, remote, memory_cache(), tx);

    app.start();
    pump(&mut app, &mut rx, |app| app.store().products().len() == 2).await;

    assert_eq!(app.store().state().current_category.as_deref(), Some("A"));
    assert_eq!(app.visible_count(), 1);
  }

  #[tokio::test]
  async fn test_tab_cycles_categories() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut app = App::with_parts(
      Config::default(),
      RemoteCatalog::offline(tx.clone()),
      memory_cache(),
      tx,
    );
    app.handle_event(Event::Dispatch(Action::UpdateProducts(vec![
      product("1", "A"),
      product("2", "B"),
    ])));

    app.handle_event(Event::Key(key(KeyCode::Tab)));
    pump(&mut app, &mut rx, |app| {
      app.store().state().current_category.is_some()
    })
    .await;
    assert_eq!(app.store().state().current_category.as_deref(), Some("A"));

    app.handle_event(Event::Key(key(KeyCode::Char('a'))));
    pump(&mut app, &mut rx, |app| {
      app.store().state().current_category.is_none()
    })
    .await;
  }

  #[tokio::test]
  async fn test_command_bar_dispatches_and_rejects() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut app = App::with_parts(
      Config::default(),
      RemoteCatalog::offline(tx.clone()),
      memory_cache(),
      tx,
    );

    for code in [KeyCode::Char(':'), KeyCode::Char('x'), KeyCode::Enter] {
      app.handle_event(Event::Key(key(code)));
    }
    assert_eq!(app.mode(), &Mode::Normal);
    assert_eq!(app.message(), Some("invalid action: x"));

    app.handle_event(Event::Key(key(KeyCode::Char(':'))));
    for c in "category B".chars() {
      app.handle_event(Event::Key(key(KeyCode::Char(c))));
    }
    app.handle_event(Event::Key(key(KeyCode::Enter)));
    pump(&mut app, &mut rx, |app| {
      app.store().state().current_category.is_some()
    })
    .await;
    assert_eq!(app.store().state().current_category.as_deref(), Some("B"));
  }

  #[test]
  fn test_quit_keys() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut app = App::with_parts(
      Config::default(),
      RemoteCatalog::offline(tx.clone()),
      PersistentCache::new(UnavailableStorage::new("test")),
      tx,
    );
    app.handle_event(Event::Key(KeyEvent::new(
      KeyCode::Char('c'),
      KeyModifiers::CONTROL,
    )));
    assert!(app.should_quit);
  }

  #[test]
  fn test_title_fallbacks() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut config = Config::default();
    config.catalog.url = Some("http://localhost:3001".to_string());
    let app = App::with_parts(
      config,
      RemoteCatalog::offline(tx.clone()),
      PersistentCache::new(UnavailableStorage::new("test")),
      tx,
    );
    assert_eq!(app.title(), "http://localhost:3001");
  }
}
