use crate::catalog::types::Product;
use crate::ui::renderfns::{format_price, stock_color, truncate};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// Message shown when the catalog holds no products at all
pub const NO_PRODUCTS: &str = "You haven't added any products yet!";

/// Message shown when the active category matches nothing
pub const NO_MATCHES: &str = "No products in this category.";

/// Draw the (already filtered) product list.
///
/// `total` is the unfiltered product count, used to pick the empty message.
pub fn draw_product_list(
  frame: &mut Frame,
  area: Rect,
  products: &[&Product],
  total: usize,
  loading: bool,
  list_state: &mut ListState,
) {
  let title = if loading {
    format!(" Products ({}) (loading...) ", products.len())
  } else {
    format!(" Products ({}) ", products.len())
  };

  let block = Block::default()
    .title(title)
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if products.is_empty() {
    let content = if total == 0 { NO_PRODUCTS } else { NO_MATCHES };
    let paragraph = Paragraph::new(content)
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let items: Vec<ListItem> = products
    .iter()
    .map(|product| {
      let line = Line::from(vec![
        Span::styled(
          format!("{:<32}", truncate(&product.name, 32)),
          Style::default().fg(Color::Cyan),
        ),
        Span::raw(" "),
        Span::raw(format!("{:>10}", format_price(product.price))),
        Span::raw(" "),
        Span::styled(
          format!("{:>5} in stock", product.quantity),
          Style::default().fg(stock_color(product.quantity)),
        ),
        Span::raw("  "),
        Span::styled(
          truncate(product.image.as_deref().unwrap_or("-"), 24),
          Style::default().fg(Color::DarkGray),
        ),
      ]);
      ListItem::new(line)
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  frame.render_stateful_widget(list, area, list_state);
}
