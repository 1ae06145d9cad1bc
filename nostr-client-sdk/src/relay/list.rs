use std::sync::Arc;

use tokio::sync::RwLock;
use url::Url;

use super::Error;

/// Checks that `url` is a websocket url and returns it trimmed.
pub fn validate_url(url: &str) -> Result<String, Error> {
  let url = url.trim();
  match Url::parse(url) {
    Ok(parsed) if matches!(parsed.scheme(), "ws" | "wss") && parsed.host().is_some() => {
      Ok(url.to_string())
    }
    _ => Err(Error::InvalidUrl(url.to_string())),
  }
}

///
/// The set of relays the client talks to.
///
/// Shared between clones and changeable at runtime; always sorted and
/// without duplicates.
///
#[derive(Debug, Clone, Default)]
pub struct RelayList {
  urls: Arc<RwLock<Vec<String>>>,
}

impl RelayList {
  pub fn new<S: AsRef<str>>(urls: impl IntoIterator<Item = S>) -> Result<Self, Error> {
    let mut validated = urls
      .into_iter()
      .map(|url| validate_url(url.as_ref()))
      .collect::<Result<Vec<String>, Error>>()?;
    validated.sort();
    validated.dedup();

    Ok(Self {
      urls: Arc::new(RwLock::new(validated)),
    })
  }

  pub async fn urls(&self) -> Vec<String> {
    self.urls.read().await.clone()
  }

  ///
  /// Merges `new_urls` into the list and returns the resulting list.
  ///
  /// Nothing is merged if any of the urls is invalid.
  ///
  pub async fn update<S: AsRef<str>>(
    &self,
    new_urls: impl IntoIterator<Item = S>,
  ) -> Result<Vec<String>, Error> {
    let new_urls = new_urls
      .into_iter()
      .map(|url| validate_url(url.as_ref()))
      .collect::<Result<Vec<String>, Error>>()?;

    let mut urls = self.urls.write().await;
    urls.extend(new_urls);
    urls.sort();
    urls.dedup();
    log::debug!("[RelayList] {} relays after update", urls.len());
    Ok(urls.clone())
  }

  /// Returns whether `url` was in the list.
  pub async fn remove(&self, url: &str) -> bool {
    let mut urls = self.urls.write().await;
    let before = urls.len();
    urls.retain(|known| known != url);
    before != urls.len()
  }

  pub async fn len(&self) -> usize {
    self.urls.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.urls.read().await.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  async fn make_sut() -> RelayList {
    RelayList::new(["wss://relay.damus.io", "wss://nos.lol"]).unwrap()
  }

  #[test]
  fn test_validate_url() {
    assert_eq!(validate_url(" wss://nos.lol ").unwrap(), "wss://nos.lol");
    assert!(validate_url("ws://127.0.0.1:8080").is_ok());

    for invalid in ["https://nos.lol", "nos.lol", "", "wss://", "ftp://relay.damus.io"] {
      assert!(matches!(validate_url(invalid), Err(Error::InvalidUrl(_))), "{invalid}");
    }
  }

  #[tokio::test]
  async fn test_update_merges_sorts_and_deduplicates() {
    let list = make_sut().await;
    let updated = list
      .update(["wss://relay.primal.net", "wss://nos.lol", "wss://a.relay"])
      .await
      .unwrap();

    assert_eq!(
      updated,
      vec!["wss://a.relay", "wss://nos.lol", "wss://relay.damus.io", "wss://relay.primal.net"]
    );
    assert_eq!(list.urls().await, updated);
  }

  #[tokio::test]
  async fn test_update_with_invalid_url_changes_nothing() {
    let list = make_sut().await;
    let result = list.update(["wss://relay.primal.net", "http://not.a.relay"]).await;

    assert!(matches!(result, Err(Error::InvalidUrl(url)) if url == "http://not.a.relay"));
    assert_eq!(list.len().await, 2);
  }

  #[tokio::test]
  async fn test_clones_share_the_list() {
    let list = make_sut().await;
    let clone = list.clone();

    assert!(clone.remove("wss://nos.lol").await);
    assert_eq!(clone.remove("wss://nos.lol").await, false);
    assert_eq!(list.urls().await, vec!["wss://relay.damus.io"]);
  }
}
