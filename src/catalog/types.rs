use serde::{Deserialize, Serialize};

use crate::cache::Cacheable;

/// Reference from a product to the category it belongs to.
///
/// Only the identity takes part in filtering; the name is carried along for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
  #[serde(alias = "_id")]
  pub id: String,
  #[serde(default)]
  pub name: Option<String>,
}

/// A catalog product as served by the remote catalog.
///
/// The client never edits a product; cached copies are replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
  #[serde(alias = "_id")]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub image: Option<String>,
  #[serde(deserialize_with = "deserialize_price")]
  pub price: f64,
  pub quantity: u32,
  pub category: CategoryRef,
}

fn deserialize_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let price = f64::deserialize(deserializer)?;
  if price.is_finite() && price >= 0.0 {
    Ok(price)
  } else {
    Err(serde::de::Error::custom(format!("invalid price {}", price)))
  }
}

impl Product {
  pub fn category_id(&self) -> &str {
    &self.category.id
  }
}

/// Category entry derived from the products currently in view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
  pub id: String,
  pub name: String,
}

/// Ordered product list coming from either the remote fetch or a cache read
pub type CatalogSnapshot = Vec<Product>;

impl Cacheable for Product {
  fn cache_key(&self) -> String {
    self.id.clone()
  }
}
