pub mod category_bar;
pub mod header;
pub mod utils;

pub use category_bar::draw_category_bar;
pub use header::draw_header;
pub use utils::{format_price, stock_color, truncate};
