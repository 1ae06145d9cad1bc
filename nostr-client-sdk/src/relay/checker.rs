use std::{
  collections::HashMap,
  sync::{atomic::AtomicU64, Arc},
  time::Duration,
};

use log::{debug, info};
use tokio::time::Instant;

use super::{connection::RelayConnection, list::RelayList};
use crate::{
  client_to_relay_communication::request::ClientToRelayCommRequest,
  event::kind::EventKind,
  filter::Filter,
  message_pool::MessagePool,
};

/// Consecutive failed checks after which a relay is dropped.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

const CHECK_SUBSCRIPTION: &str = "check";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

///
/// Asks `url` for the metadata of `pubkey`.
///
/// `true` only if the relay answers with an event for the subscription
/// before its EOSE and before `timeout`.
///
pub async fn check_relay(url: &str, pubkey: &str, timeout: Duration, tls_verify: bool) -> bool {
  let message_pool = Arc::new(MessagePool::new());
  let mut relay = RelayConnection::new(url, timeout, tls_verify);
  if relay
    .connect(message_pool.clone(), Arc::new(AtomicU64::new(0)))
    .await
    .is_err()
  {
    return false;
  }

  let filter = Filter::new()
    .kinds(vec![EventKind::Metadata])
    .authors(vec![pubkey.to_string()])
    .limit(1);
  let request = ClientToRelayCommRequest::new_request(CHECK_SUBSCRIPTION, vec![filter]).as_json();

  let mut answered = false;
  if relay.send(request).await.is_ok() {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline && relay.is_open() {
      if message_pool.take_event_for(CHECK_SUBSCRIPTION).is_some() {
        answered = true;
        break;
      }
      if !message_pool.take_eose_relays_for(CHECK_SUBSCRIPTION).is_empty() {
        answered = message_pool.take_event_for(CHECK_SUBSCRIPTION).is_some();
        break;
      }
      tokio::time::sleep(POLL_INTERVAL).await;
    }
    // the relay may have answered and hung up between two polls
    answered = answered || message_pool.take_event_for(CHECK_SUBSCRIPTION).is_some();
  }

  relay.close().await;
  debug!("[check_relay] {url}: {answered}");
  answered
}

/// Outcome of one [`RelayHealth::check_all`] round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
  pub good: Vec<String>,
  pub failing: Vec<String>,
  pub pruned: Vec<String>,
}

///
/// Counts consecutive failed checks per relay.
///
/// A success resets the count; reaching [`MAX_CONSECUTIVE_FAILURES`] removes
/// the relay from the [`RelayList`].
///
#[derive(Debug, Default)]
pub struct RelayHealth {
  failures: HashMap<String, u32>,
}

impl RelayHealth {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn failures(&self, url: &str) -> u32 {
    self.failures.get(url).copied().unwrap_or_default()
  }

  /// Records the result of a check and returns whether the relay must be pruned.
  pub fn record(&mut self, url: &str, success: bool) -> bool {
    if success {
      self.failures.insert(url.to_string(), 0);
      return false;
    }

    let failures = self.failures.entry(url.to_string()).or_default();
    *failures += 1;
    if *failures >= MAX_CONSECUTIVE_FAILURES {
      self.failures.remove(url);
      return true;
    }
    false
  }

  /// Checks every relay of `relay_list` once, pruning the dead ones.
  pub async fn check_all(
    &mut self,
    relay_list: &RelayList,
    pubkey: &str,
    timeout: Duration,
    tls_verify: bool,
  ) -> HealthReport {
    let mut report = HealthReport::default();

    for url in relay_list.urls().await {
      let success = check_relay(&url, pubkey, timeout, tls_verify).await;
      if success {
        report.good.push(url.clone());
      } else {
        report.failing.push(url.clone());
      }

      if self.record(&url, success) {
        info!("Pruning {url} after {MAX_CONSECUTIVE_FAILURES} failed checks");
        relay_list.remove(&url).await;
        report.pruned.push(url);
      }
    }

    report
  }
}
