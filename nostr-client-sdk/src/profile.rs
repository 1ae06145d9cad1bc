use std::{
  collections::HashMap,
  sync::{Mutex, MutexGuard, PoisonError},
  time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  event::{kind::EventKind, PubKey},
  filter::Filter,
  nip19,
  relay::{self, manager::RelayManager, pool::ManagerPool},
};

/// [`profile`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error(transparent)]
  Relay(#[from] relay::Error),
}

///
/// Metadata (kind 0) of a user.
///
/// `content` is the parsed JSON the user published, e.g.
/// `{"name": "...", "about": "...", "picture": "...", "nip05": "user@domain"}`.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  /// Id of the metadata event
  pub id: String,
  pub pubkey: PubKey,
  pub content: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub nprofile: Option<String>,
}

impl Profile {
  pub fn nip05(&self) -> Option<&str> {
    self.content.get("nip05")?.as_str()
  }

  pub fn name(&self) -> Option<&str> {
    self.content.get("name")?.as_str()
  }
}

/// Domain part of a `user@domain` identifier.
pub fn nip05_domain(nip05: &str) -> Option<&str> {
  nip05.split_once('@').map(|(_, domain)| domain)
}

///
/// Profiles fetched recently, keyed by pubkey.
///
/// Entries expire `ttl` after insertion and are only ever evicted on read.
///
#[derive(Debug)]
pub struct ProfileCache {
  ttl: Duration,
  entries: Mutex<HashMap<PubKey, (Profile, Instant)>>,
}

impl ProfileCache {
  pub fn new(ttl: Duration) -> Self {
    Self {
      ttl,
      entries: Mutex::new(HashMap::new()),
    }
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<PubKey, (Profile, Instant)>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn get(&self, pubkey: &str) -> Option<Profile> {
    let mut entries = self.entries();
    match entries.get(pubkey) {
      Some((profile, inserted_at)) if inserted_at.elapsed() < self.ttl => Some(profile.clone()),
      Some(_) => {
        entries.remove(pubkey);
        None
      }
      None => None,
    }
  }

  pub fn insert(&self, profile: Profile) {
    self
      .entries()
      .insert(profile.pubkey.clone(), (profile, Instant::now()));
  }

  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

///
/// Fetches the metadata of `pubkey`, from `cache` if still fresh.
///
/// ## Arguments
///
/// * `pool` - where the relay manager is borrowed from
/// * `cache` - looked up first, filled on success
/// * `pubkey` - x-only hex public key of the user
/// * `timeout` - how long to wait for the relays to answer
///
/// Returns `Ok(None)` when no relay knows the profile in time and
/// [`relay::Error::RelaysUnreachable`] when no relay could be opened.
///
pub async fn fetch_profile(
  pool: &ManagerPool,
  cache: &ProfileCache,
  pubkey: &str,
  timeout: Duration,
) -> Result<Option<Profile>, Error> {
  if let Some(profile) = cache.get(pubkey) {
    debug!("Returning cached profile for pubkey {pubkey}");
    return Ok(Some(profile));
  }
  debug!("Profile cache miss for {pubkey}");

  let nprofile = match nip19::nprofile_encode(pubkey, &pool.relay_list().urls().await) {
    Ok(nprofile) => Some(nprofile),
    Err(err) => {
      warn!("nprofile encode failed: {err}");
      None
    }
  };

  let manager = pool.borrow().await;
  let fetched = fetch_from_relays(&manager, pubkey, timeout).await;
  pool.release(manager).await;

  match fetched? {
    Some(mut profile) => {
      profile.nprofile = nprofile;
      cache.insert(profile.clone());
      Ok(Some(profile))
    }
    None => {
      warn!("No profile found for pubkey {pubkey} after fetch");
      Ok(None)
    }
  }
}

async fn fetch_from_relays(
  manager: &RelayManager,
  pubkey: &str,
  timeout: Duration,
) -> Result<Option<Profile>, relay::Error> {
  manager.ensure_reachable()?;

  let subscription_id = format!("fetch_{pubkey}");
  let filter = Filter::new()
    .authors(vec![pubkey.to_string()])
    .kinds(vec![EventKind::Metadata])
    .limit(1);
  manager.subscribe(&subscription_id, vec![filter]).await;
  debug!("Awaiting profile event for pubkey {pubkey}");

  let mut content = Value::Null;
  let message = manager
    .wait_for_event_matching(&subscription_id, timeout, |message| {
      let event = &message.event;
      if event.pubkey != pubkey || event.kind != EventKind::Metadata || !event.verify() {
        warn!("Discarding unverifiable metadata event {} from {}", event.id, message.relay_url);
        return false;
      }
      match serde_json::from_str::<Value>(&event.content) {
        Ok(parsed) => {
          content = parsed;
          true
        }
        Err(err) => {
          error!("Error parsing event content: {err}");
          false
        }
      }
    })
    .await;
  manager.unsubscribe(&subscription_id).await;

  Ok(message.map(|message| {
    info!("Profile data parsed for pubkey {pubkey}");
    Profile {
      id: message.event.id,
      pubkey: message.event.pubkey,
      content,
      nprofile: None,
    }
  }))
}

/// `true` iff the profile of `pubkey` carries a `nip05` identifier under `domain`.
pub async fn validate_identity(
  pool: &ManagerPool,
  cache: &ProfileCache,
  pubkey: &str,
  domain: &str,
  timeout: Duration,
) -> Result<bool, Error> {
  let profile = fetch_profile(pool, cache, pubkey, timeout).await?;
  let valid = profile
    .as_ref()
    .and_then(Profile::nip05)
    .and_then(nip05_domain)
    .map(|found| found == domain)
    .unwrap_or(false);

  if !valid {
    warn!("NIP-05 failed for {pubkey}");
  }
  Ok(valid)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::ClientConfig,
    event::Event,
    relay::{list::RelayList, stub},
    schnorr::Keys,
  };

  #[cfg(test)]
  use pretty_assertions::assert_eq;
  use serde_json::json;

  const TIMEOUT: Duration = Duration::from_secs(2);

  fn metadata(keys: &Keys, content: &str) -> Event {
    let mut event =
      Event::new_without_signature(keys.public_key_hex(), 1, EventKind::Metadata, vec![], content.to_string());
    event.sign(keys).unwrap();
    event
  }

  fn make_sut(urls: Vec<String>) -> (ManagerPool, ProfileCache) {
    let config = ClientConfig {
      connect_timeout: Duration::from_millis(300),
      poll_interval: Duration::from_millis(10),
      ..Default::default()
    };
    (
      ManagerPool::new(RelayList::new(urls).unwrap(), &config),
      ProfileCache::new(Duration::from_secs(300)),
    )
  }

  #[test]
  fn test_cache_expires_entries() {
    let cache = ProfileCache::new(Duration::from_millis(20));
    let profile = Profile {
      id: String::from("id"),
      pubkey: String::from("abc"),
      content: json!({}),
      nprofile: None,
    };
    cache.insert(profile.clone());

    assert_eq!(cache.get("abc"), Some(profile));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(cache.get("abc"), None);
    assert!(cache.is_empty());
  }

  #[test]
  fn test_nip05_domain() {
    assert_eq!(nip05_domain("alice@fuzzedrecords.com"), Some("fuzzedrecords.com"));
    assert_eq!(nip05_domain("_@a@b.com"), Some("a@b.com"));
    assert_eq!(nip05_domain("fuzzedrecords.com"), None);
  }

  #[tokio::test]
  async fn test_fetch_profile_from_relay_and_cache() {
    let keys = Keys::generate();
    let relay = stub::spawn(stub::serve_events(vec![metadata(&keys, r#"{"name":"alice"}"#)])).await;
    let (pool, cache) = make_sut(vec![relay.url()]);

    let profile = fetch_profile(&pool, &cache, &keys.public_key_hex(), TIMEOUT)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(profile.name(), Some("alice"));
    assert_eq!(profile.pubkey, keys.public_key_hex());

    let pointer = nip19::nprofile_decode(profile.nprofile.as_deref().unwrap()).unwrap();
    assert_eq!(pointer.relays, vec![relay.url()]);

    let request = &relay.received()[0];
    assert_eq!(
      request,
      &format!(
        r#"["REQ","fetch_{0}",{{"authors":["{0}"],"kinds":[0],"limit":1}}]"#,
        keys.public_key_hex()
      )
    );

    drop(relay);
    let cached = fetch_profile(&pool, &cache, &keys.public_key_hex(), TIMEOUT).await.unwrap();
    assert_eq!(cached, Some(profile));
  }

  #[tokio::test]
  async fn test_unparseable_and_forged_events_are_skipped() {
    let keys = Keys::generate();
    let mut forged = metadata(&keys, r#"{"name":"mallory"}"#);
    forged.content = String::from(r#"{"name":"forged"}"#);
    let events = vec![forged, metadata(&keys, "not json"), metadata(&keys, r#"{"name":"bob"}"#)];
    let relay = stub::spawn(stub::serve_events(events)).await;
    let (pool, cache) = make_sut(vec![relay.url()]);

    let profile = fetch_profile(&pool, &cache, &keys.public_key_hex(), TIMEOUT).await.unwrap();
    assert_eq!(profile.unwrap().name(), Some("bob"));
  }

  #[tokio::test]
  async fn test_missing_profile_is_none() {
    let relay = stub::spawn(stub::serve_events(vec![])).await;
    let (pool, cache) = make_sut(vec![relay.url()]);

    let profile = fetch_profile(&pool, &cache, &Keys::generate().public_key_hex(), TIMEOUT).await;
    assert_eq!(profile.unwrap(), None);
    assert!(cache.is_empty());
    assert_eq!(pool.idle_count().await, 1);
  }

  #[tokio::test]
  async fn test_unreachable_relays_are_an_error() {
    let (pool, cache) = make_sut(vec![stub::refused_url().await]);

    let result = fetch_profile(&pool, &cache, &Keys::generate().public_key_hex(), TIMEOUT).await;
    assert!(matches!(result, Err(Error::Relay(relay::Error::RelaysUnreachable))));
    assert_eq!(pool.idle_count().await, 1);
  }

  #[tokio::test]
  async fn test_validate_identity() {
    let admin = Keys::generate();
    let stranger = Keys::generate();
    let nobody = Keys::generate();
    let relay = stub::spawn(stub::serve_events(vec![])).await;
    let (pool, cache) = make_sut(vec![relay.url()]);

    cache.insert(Profile {
      id: String::from("1"),
      pubkey: admin.public_key_hex(),
      content: json!({"nip05": "admin@fuzzedrecords.com"}),
      nprofile: None,
    });
    cache.insert(Profile {
      id: String::from("2"),
      pubkey: stranger.public_key_hex(),
      content: json!({"nip05": "someone@elsewhere.com"}),
      nprofile: None,
    });

    let validate = |pubkey: String| {
      let (pool, cache) = (&pool, &cache);
      async move { validate_identity(pool, cache, &pubkey, "fuzzedrecords.com", TIMEOUT).await.unwrap() }
    };
    assert!(validate(admin.public_key_hex()).await);
    assert_eq!(validate(stranger.public_key_hex()).await, false);
    assert_eq!(validate(nobody.public_key_hex()).await, false);
  }
}
