use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use url::Url;

use crate::catalog::types::CatalogSnapshot;
use crate::config::CatalogConfig;

/// HTTP client for the remote catalog
#[derive(Clone)]
pub struct CatalogClient {
  client: reqwest::Client,
  products_url: Url,
}

impl CatalogClient {
  pub fn new(config: &CatalogConfig, base_url: &str) -> Result<Self> {
    let products_url = products_url(base_url)?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .gzip(true)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      products_url,
    })
  }

  /// Fetch the full product list
  pub async fn fetch_products(&self) -> Result<CatalogSnapshot> {
    let response = self
      .client
      .get(self.products_url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach catalog at {}: {}", self.products_url, e))?
      .error_for_status()
      .map_err(|e| eyre!("Catalog request failed: {}", e))?;

    response
      .json::<CatalogSnapshot>()
      .await
      .map_err(|e| eyre!("Failed to parse catalog response: {}", e))
  }
}

/// Resolve the products endpoint under `base`, keeping any path prefix.
fn products_url(base: &str) -> Result<Url> {
  let mut base =
    Url::parse(base).map_err(|e| eyre!("Invalid catalog url '{}': {}", base, e))?;

  if !base.path().ends_with('/') {
    let path = format!("{}/", base.path());
    base.set_path(&path);
  }

  base
    .join("products")
    .map_err(|e| eyre!("Invalid catalog url '{}': {}", base, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_products_url_from_host() {
    let url = products_url("https://shop.example.com").unwrap();
    assert_eq!(url.as_str(), "https://shop.example.com/products");
  }

  #[test]
  fn test_products_url_keeps_prefix() {
    let url = products_url("https://shop.example.com/api/v1").unwrap();
    assert_eq!(url.as_str(), "https://shop.example.com/api/v1/products");

    let url = products_url("https://shop.example.com/api/v1/").unwrap();
    assert_eq!(url.as_str(), "https://shop.example.com/api/v1/products");
  }

  #[test]
  fn test_products_url_invalid() {
    assert!(products_url("not a url").is_err());
  }
}
