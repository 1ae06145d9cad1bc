pub use env_logger::Env;
pub use log::{debug, info};

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Installs `env_logger` (`RUST_LOG`, defaulting to `info`). Only the first call has any effect.
pub fn init_logger() {
  INIT_LOGGER.call_once(|| {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();
  });
}

pub mod client_to_relay_communication;
pub mod config;
pub mod crypto;
pub mod direct_message;
pub mod event;
pub mod filter;
pub mod message_pool;
pub mod nip19;
pub mod profile;
pub mod relay;
pub mod relay_to_client_communication;
pub mod schnorr;

pub use config::ClientConfig;
pub use crypto::Scheme;
pub use event::Event;
pub use filter::Filter;
pub use relay::{list::RelayList, manager::RelayManager, pool::ManagerPool};
pub use schnorr::Keys;
