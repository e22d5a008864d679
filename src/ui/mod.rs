mod renderfns;
mod views;

use crate::app::{App, Mode};
use crate::filter::{categories, filter_products};
use ratatui::prelude::*;
use ratatui::widgets::{ListState, Paragraph};

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Length(1), // Categories
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  let state = app.store().state();

  renderfns::draw_header(
    frame,
    chunks[0],
    app.title(),
    app.source(),
    app.remote().settled_at,
    app.remote().error.as_deref(),
  );
  renderfns::draw_category_bar(
    frame,
    chunks[1],
    &categories(state),
    state.current_category.as_deref(),
  );

  let products = filter_products(state);
  let mut list_state = app.list_state().clone();
  ensure_valid_selection(&mut list_state, products.len());
  views::products::draw_product_list(
    frame,
    chunks[2],
    &products,
    state.products.len(),
    app.remote().pending,
    &mut list_state,
  );

  // Draw status bar
  draw_status_bar(frame, chunks[3], app);
}

/// Keep the selection inside `[0, len)`, selecting the first row when possible.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  if len == 0 {
    state.select(None);
  } else {
    match state.selected() {
      Some(i) if i >= len => state.select(Some(len - 1)),
      None => state.select(Some(0)),
      _ => {}
    }
  }
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
  let (content, style) = match app.mode() {
    Mode::Normal => match app.message() {
      Some(msg) => (format!(" {}", msg), Style::default().fg(Color::Red)),
      None => {
        let hint = " j/k:nav  Tab:category  a:all  r:refresh  :command  q:quit";
        (hint.to_string(), Style::default().fg(Color::DarkGray))
      }
    },
    Mode::Command => {
      let cmd = format!(":{}", app.command_input());
      (cmd, Style::default().fg(Color::Yellow))
    }
  };

  let paragraph = Paragraph::new(content).style(style);
  frame.render_widget(paragraph, area);
}
