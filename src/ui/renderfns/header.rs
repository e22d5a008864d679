use chrono::{DateTime, Local, Utc};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use super::utils::truncate;
use crate::app::Source;

/// Draw the header bar with title, data source and last sync time
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  source: Source,
  settled_at: Option<DateTime<Utc>>,
  error: Option<&str>,
) {
  let (label, color) = source_label(source);

  let mut spans = vec![
    Span::styled(" storeview ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", extract_domain(title)),
      Style::default().fg(Color::White),
    ),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", label), Style::default().fg(color).bold()),
  ];

  if let Some(at) = settled_at {
    spans.push(Span::styled(
      format!(" {}", at.with_timezone(&Local).format("%H:%M:%S")),
      Style::default().fg(Color::DarkGray),
    ));
  }

  if let (Source::Offline, Some(error)) = (source, error) {
    spans.push(Span::styled(
      format!("  {}", truncate(error, 60)),
      Style::default().fg(Color::Red),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

fn source_label(source: Source) -> (&'static str, Color) {
  match source {
    Source::Loading => ("loading...", Color::Yellow),
    Source::Live => ("live", Color::Green),
    Source::Offline => ("offline (cached)", Color::Magenta),
  }
}

/// Extract the host from a URL-like title, leaving plain titles alone
fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .map(|rest| rest.split('/').next().unwrap_or(rest))
    .unwrap_or(url)
}
