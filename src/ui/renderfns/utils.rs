use ratatui::prelude::Color;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Format a price with two decimals
pub fn format_price(price: f64) -> String {
  format!("${:.2}", price)
}

/// Get the display color for a stock quantity
pub fn stock_color(quantity: u32) -> Color {
  match quantity {
    0 => Color::Red,
    1..=4 => Color::Yellow,
    _ => Color::Green,
  }
}
