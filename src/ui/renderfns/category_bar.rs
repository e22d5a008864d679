use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::catalog::types::Category;

/// Draw the category selector, highlighting the active category
pub fn draw_category_bar(
  frame: &mut Frame,
  area: Rect,
  categories: &[Category],
  current: Option<&str>,
) {
  let active = Style::default().fg(Color::Black).bg(Color::Cyan).bold();
  let inactive = Style::default().fg(Color::White);

  let mut spans = vec![Span::styled(
    " All ",
    if current.is_none() { active } else { inactive },
  )];

  for category in categories {
    spans.push(Span::raw(" "));
    let style = if current == Some(category.id.as_str()) {
      active
    } else {
      inactive
    };
    spans.push(Span::styled(format!(" {} ", category.name), style));
  }

  // Selected category no longer present in the catalog
  if let Some(id) = current {
    if !categories.iter().any(|c| c.id == id) {
      spans.push(Span::raw(" "));
      spans.push(Span::styled(format!(" {} ", id), active));
    }
  }

  frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
