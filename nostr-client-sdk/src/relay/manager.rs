use std::{
  collections::{HashMap, HashSet},
  fmt,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
  time::Duration,
};

use futures_util::future::join_all;
use log::{debug, error, info, warn};
use tokio::time::Instant;
use uuid::Uuid;

use super::{
  connection::{RelayConnection, RelayStatus},
  list::validate_url,
  Error,
};
use crate::{
  client_to_relay_communication::{
    close::ClientToRelayCommClose, event::ClientToRelayCommEvent, request::ClientToRelayCommRequest,
  },
  event::Event,
  filter::Filter,
  message_pool::{EventMessage, MessagePool},
};

/// Default interval between two looks at the message pool while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

///
/// Identifies one borrow of a [`RelayManager`].
///
/// Sockets opened under a session are never reused by another one.
///
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(Uuid);

impl SessionToken {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl Default for SessionToken {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for SessionToken {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Outcome of sending one frame to every open relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
  /// Open relays the frame was sent to
  pub attempted: usize,
  /// Sends that failed
  pub failed: usize,
}

impl PublishReport {
  pub fn succeeded(&self) -> usize {
    self.attempted - self.failed
  }
}

///
/// Owns one [`RelayConnection`] per registered url and fans requests out
/// over those that are open.
///
/// Frames received from any relay land in a single [`MessagePool`].
///
#[derive(Debug)]
pub struct RelayManager {
  session: Option<SessionToken>,
  timeout: Duration,
  tls_verify: bool,
  poll_interval: Duration,
  relays: HashMap<String, RelayConnection>,
  connection_statuses: HashMap<String, bool>,
  message_pool: Arc<MessagePool>,
  dropped_frames: Arc<AtomicU64>,
}

impl RelayManager {
  pub fn new(timeout: Duration, tls_verify: bool) -> Self {
    Self {
      session: None,
      timeout,
      tls_verify,
      poll_interval: DEFAULT_POLL_INTERVAL,
      relays: HashMap::new(),
      connection_statuses: HashMap::new(),
      message_pool: Arc::new(MessagePool::new()),
      dropped_frames: Arc::new(AtomicU64::new(0)),
    }
  }

  pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
    self.poll_interval = poll_interval;
    self
  }

  /// Registers a relay. Adding a url twice is a no-op.
  pub fn add_relay(&mut self, url: &str) -> Result<(), Error> {
    let url = validate_url(url)?;
    if !self.relays.contains_key(&url) {
      let relay = RelayConnection::new(url.clone(), self.timeout, self.tls_verify);
      self.relays.insert(url, relay);
    }
    Ok(())
  }

  pub fn relay_urls(&self) -> Vec<String> {
    let mut urls: Vec<String> = self.relays.keys().cloned().collect();
    urls.sort();
    urls
  }

  pub fn relay_status(&self, url: &str) -> Option<RelayStatus> {
    self.relays.get(url).map(RelayConnection::status)
  }

  /// Url -> whether the last connection attempt succeeded.
  pub fn connection_statuses(&self) -> &HashMap<String, bool> {
    &self.connection_statuses
  }

  pub fn session(&self) -> Option<&SessionToken> {
    self.session.as_ref()
  }

  pub fn message_pool(&self) -> Arc<MessagePool> {
    self.message_pool.clone()
  }

  /// Frames received so far that could not be understood.
  pub fn dropped_frames(&self) -> u64 {
    self.dropped_frames.load(Ordering::Relaxed)
  }

  pub fn open_relay_urls(&self) -> Vec<String> {
    self
      .relays
      .values()
      .filter(|relay| relay.is_open())
      .map(|relay| relay.url().to_string())
      .collect()
  }

  pub fn open_relays(&self) -> usize {
    self.relays.values().filter(|relay| relay.is_open()).count()
  }

  ///
  /// Opens every relay that is not open yet, concurrently.
  ///
  /// A `session` different from the previous one first tears down every
  /// socket of the previous session and starts over with a new message pool.
  /// Calling it again with the same session only opens what is missing.
  ///
  /// Returns the number of open relays; failures are logged, not returned.
  ///
  pub async fn prepare(&mut self, session: &SessionToken) -> usize {
    if self.session.as_ref() != Some(session) {
      if let Some(previous) = self.session.take() {
        debug!("[RelayManager] session {previous} replaced by {session}");
        self.close().await;
        self.reset();
      }
      self.session = Some(session.clone());
    }

    let message_pool = self.message_pool.clone();
    let dropped_frames = self.dropped_frames.clone();
    let attempts = self
      .relays
      .values_mut()
      .filter(|relay| !relay.is_open())
      .map(|relay| {
        let message_pool = message_pool.clone();
        let dropped_frames = dropped_frames.clone();
        async move {
          let connected = relay.connect(message_pool, dropped_frames).await.is_ok();
          (relay.url().to_string(), connected)
        }
      });

    for (url, connected) in join_all(attempts).await {
      self.connection_statuses.insert(url, connected);
    }

    let open = self.open_relays();
    info!("[RelayManager] {open}/{} relays open", self.relays.len());
    open
  }

  /// Fails with [`Error::RelaysUnreachable`] when no relay is open.
  pub fn ensure_reachable(&self) -> Result<(), Error> {
    if self.open_relays() == 0 {
      error!(
        "Unable to connect to any relay: {:?}",
        self.connection_statuses
      );
      return Err(Error::RelaysUnreachable);
    }
    Ok(())
  }

  async fn broadcast(&self, frame: String) -> PublishReport {
    let open: Vec<&RelayConnection> = self.relays.values().filter(|relay| relay.is_open()).collect();
    let results = join_all(open.iter().map(|relay| relay.send(frame.clone()))).await;

    let mut report = PublishReport {
      attempted: open.len(),
      failed: 0,
    };
    for (relay, result) in open.iter().zip(results) {
      if let Err(err) = result {
        error!("Error sending to {}: {}", relay.url(), err);
        report.failed += 1;
      }
    }
    report
  }

  ///
  /// Sends `["REQ", subscription_id, filters...]` to every open relay.
  ///
  /// Returns how many relays received the request.
  ///
  pub async fn subscribe(&self, subscription_id: &str, filters: Vec<Filter>) -> usize {
    let frame = ClientToRelayCommRequest::new_request(subscription_id, filters).as_json();
    debug!("[RelayManager] subscribing {subscription_id}");
    self.broadcast(frame).await.succeeded()
  }

  /// Sends `["CLOSE", subscription_id]` to every open relay.
  pub async fn unsubscribe(&self, subscription_id: &str) -> usize {
    let frame = ClientToRelayCommClose::new_close(subscription_id).as_json();
    self.broadcast(frame).await.succeeded()
  }

  ///
  /// Sends `["EVENT", event]` to every open relay, concurrently.
  ///
  /// Completes once every send has been attempted; relays do not
  /// acknowledge publications.
  ///
  pub async fn publish(&self, event: &Event) -> PublishReport {
    let frame = ClientToRelayCommEvent::new_event(event.clone()).as_json();
    let report = self.broadcast(frame).await;
    debug!(
      "[RelayManager] published {} to {}/{} relays",
      event.id,
      report.succeeded(),
      report.attempted
    );
    report
  }

  ///
  /// Polls the message pool for the first event of `subscription_id`.
  ///
  /// Gives up with `None` after `timeout`, once every open relay has sent
  /// EOSE for the subscription, or when no relay is open anymore.
  ///
  pub async fn wait_for_event(&self, subscription_id: &str, timeout: Duration) -> Option<EventMessage> {
    self.wait_for_event_matching(subscription_id, timeout, |_| true).await
  }

  /// Same as [`RelayManager::wait_for_event`], discarding events `accept` rejects.
  pub async fn wait_for_event_matching<F>(
    &self,
    subscription_id: &str,
    timeout: Duration,
    mut accept: F,
  ) -> Option<EventMessage>
  where
    F: FnMut(&EventMessage) -> bool,
  {
    let deadline = Instant::now() + timeout;
    let mut finished: HashSet<String> = HashSet::new();
    let mut next_accepted = |pool: &MessagePool| {
      while let Some(message) = pool.take_event_for(subscription_id) {
        if accept(&message) {
          return Some(message);
        }
      }
      None
    };

    loop {
      if let Some(message) = next_accepted(self.message_pool.as_ref()) {
        return Some(message);
      }

      finished.extend(self.message_pool.take_eose_relays_for(subscription_id));
      let open = self.open_relay_urls();
      if open.iter().all(|url| finished.contains(url)) {
        debug!("[RelayManager] {subscription_id} exhausted on every open relay");
        return next_accepted(self.message_pool.as_ref());
      }

      if Instant::now() >= deadline {
        warn!("[RelayManager] timed out waiting for {subscription_id}");
        return None;
      }
      tokio::time::sleep(self.poll_interval).await;
    }
  }

  /// Closes every socket and stops every receive task. Safe to call any number of times.
  pub async fn close(&mut self) {
    join_all(self.relays.values_mut().map(RelayConnection::close)).await;
  }

  /// Replaces the message pool with an empty one.
  pub fn renew_message_pool(&mut self) {
    self.message_pool = Arc::new(MessagePool::new());
  }

  /// Forgets every connection, keeping the registered urls.
  fn reset(&mut self) {
    self.relays = self
      .relays
      .keys()
      .map(|url| {
        let relay = RelayConnection::new(url.clone(), self.timeout, self.tls_verify);
        (url.clone(), relay)
      })
      .collect();
    self.connection_statuses.clear();
    self.renew_message_pool();
  }
}
