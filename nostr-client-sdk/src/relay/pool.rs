use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Mutex;

use super::{
  list::RelayList,
  manager::{RelayManager, SessionToken},
};
use crate::config::ClientConfig;

///
/// Hands out [`RelayManager`]s and takes them back.
///
/// A borrowed manager belongs to its borrower alone. On borrow its relay set
/// is brought up to date with the [`RelayList`] and it is prepared under a
/// fresh [`SessionToken`]; on release it is closed and gets an empty message
/// pool before going back to the idle list, so nothing of one session is
/// ever seen by the next.
///
#[derive(Debug)]
pub struct ManagerPool {
  idle: Mutex<Vec<RelayManager>>,
  relay_list: RelayList,
  connect_timeout: Duration,
  tls_verify: bool,
  poll_interval: Duration,
}

impl ManagerPool {
  pub fn new(relay_list: RelayList, config: &ClientConfig) -> Self {
    Self {
      idle: Mutex::new(vec![]),
      relay_list,
      connect_timeout: config.connect_timeout,
      tls_verify: config.tls_verify,
      poll_interval: config.poll_interval,
    }
  }

  pub fn relay_list(&self) -> &RelayList {
    &self.relay_list
  }

  /// Takes an idle manager (or creates one) and connects it to the current relays.
  pub async fn borrow(&self) -> RelayManager {
    let idle = self.idle.lock().await.pop();
    let mut manager = match idle {
      Some(manager) => {
        debug!("[ManagerPool] reusing idle manager");
        manager
      }
      None => {
        debug!("[ManagerPool] creating manager");
        RelayManager::new(self.connect_timeout, self.tls_verify).with_poll_interval(self.poll_interval)
      }
    };

    for url in self.relay_list.urls().await {
      if let Err(err) = manager.add_relay(&url) {
        warn!("[ManagerPool] skipping relay: {err}");
      }
    }
    manager.prepare(&SessionToken::new()).await;
    manager
  }

  /// Closes `manager` and puts it back in the idle list.
  pub async fn release(&self, mut manager: RelayManager) {
    manager.close().await;
    manager.renew_message_pool();
    self.idle.lock().await.push(manager);
    debug!("[ManagerPool] manager released");
  }

  pub async fn idle_count(&self) -> usize {
    self.idle.lock().await.len()
  }

  /// Closes every idle manager. Managers still borrowed are the borrower's to close.
  pub async fn shutdown(&self) {
    let managers: Vec<RelayManager> = self.idle.lock().await.drain(..).collect();
    for mut manager in managers {
      manager.close().await;
    }
    debug!("[ManagerPool] shut down");
  }
}
