use std::{
  collections::VecDeque,
  sync::{Mutex, MutexGuard, PoisonError},
};

use crate::event::Event;

/// An event received for one of our subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
  pub subscription_id: String,
  pub event: Event,
  /// Relay the event came from
  pub relay_url: String,
}

/// A relay finished sending the stored events of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EoseMessage {
  pub subscription_id: String,
  pub relay_url: String,
}

///
/// Frames received from every relay of a manager, in arrival order.
///
/// Both queues are unbounded FIFOs. A pool belongs to a single manager
/// session; a new session gets a new pool instead of a cleared one, so that
/// a receive task of the previous session can never feed the new one.
///
#[derive(Debug, Default)]
pub struct MessagePool {
  events: Mutex<VecDeque<EventMessage>>,
  eose_notices: Mutex<VecDeque<EoseMessage>>,
}

fn lock<T>(queue: &Mutex<T>) -> MutexGuard<'_, T> {
  queue.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MessagePool {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_event(&self, subscription_id: &str, event: Event, relay_url: &str) {
    lock(&self.events).push_back(EventMessage {
      subscription_id: subscription_id.to_string(),
      event,
      relay_url: relay_url.to_string(),
    });
  }

  pub fn add_eose(&self, subscription_id: &str, relay_url: &str) {
    lock(&self.eose_notices).push_back(EoseMessage {
      subscription_id: subscription_id.to_string(),
      relay_url: relay_url.to_string(),
    });
  }

  pub fn has_events(&self) -> bool {
    !lock(&self.events).is_empty()
  }

  pub fn get_event(&self) -> Option<EventMessage> {
    lock(&self.events).pop_front()
  }

  pub fn has_eose_notices(&self) -> bool {
    !lock(&self.eose_notices).is_empty()
  }

  pub fn get_eose_notice(&self) -> Option<EoseMessage> {
    lock(&self.eose_notices).pop_front()
  }

  /// Drains every queued event.
  pub fn get_all_events(&self) -> Vec<EventMessage> {
    lock(&self.events).drain(..).collect()
  }

  /// Removes and returns the first queued event of `subscription_id`,
  /// leaving events of other subscriptions in place.
  pub fn take_event_for(&self, subscription_id: &str) -> Option<EventMessage> {
    let mut events = lock(&self.events);
    let position = events
      .iter()
      .position(|message| message.subscription_id == subscription_id)?;
    events.remove(position)
  }

  /// Removes every EOSE of `subscription_id` and returns the relays they came from.
  pub fn take_eose_relays_for(&self, subscription_id: &str) -> Vec<String> {
    let mut notices = lock(&self.eose_notices);
    let mut relays = vec![];
    notices.retain(|notice| {
      if notice.subscription_id == subscription_id {
        relays.push(notice.relay_url.clone());
        return false;
      }
      true
    });
    relays
  }

  pub fn len(&self) -> usize {
    lock(&self.events).len() + lock(&self.eose_notices).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
