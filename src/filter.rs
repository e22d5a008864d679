//! Category filtering over the global state.

use std::collections::HashSet;

use crate::catalog::types::{Category, Product};
use crate::store::GlobalState;

/// Products in the active category, or all products when none is active.
///
/// Order follows `state.products`. A category with no products yields an empty list.
pub fn filter_products(state: &GlobalState) -> Vec<&Product> {
  match state.current_category.as_deref() {
    None => state.products.iter().collect(),
    Some(category) => state
      .products
      .iter()
      .filter(|p| p.category_id() == category)
      .collect(),
  }
}

/// Distinct categories of the current products, in first-seen order
pub fn categories(state: &GlobalState) -> Vec<Category> {
  let mut seen = HashSet::new();
  let mut categories = Vec::new();

  for product in &state.products {
    if seen.insert(product.category_id()) {
      categories.push(Category {
        id: product.category.id.clone(),
        name: product
          .category
          .name
          .clone()
          .unwrap_or_else(|| product.category.id.clone()),
      });
    }
  }

  categories
}

/// Category that follows the active one when cycling, wrapping through "all".
pub fn step_category(state: &GlobalState, forward: bool) -> Option<String> {
  let ids: Vec<String> = categories(state).into_iter().map(|c| c.id).collect();
  if ids.is_empty() {
    return None;
  }

  // Position in the ring [all, ids...]
  let len = ids.len() + 1;
  let current = state
    .current_category
    .as_ref()
    .and_then(|c| ids.iter().position(|id| id == c))
    .map(|i| i + 1)
    .unwrap_or(0);
  let next = if forward {
    (current + 1) % len
  } else {
    (current + len - 1) % len
  };

  match next {
    0 => None,
    i => ids.get(i - 1).cloned(),
  }
}
