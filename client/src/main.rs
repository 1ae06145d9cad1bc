use std::{path::PathBuf, process, time::Duration};

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info, warn};

use nostr_client_sdk::{
  config, direct_message,
  event::{self, kind::EventKind, unix_timestamp, Event},
  nip19, profile,
  profile::ProfileCache,
  relay::{self, checker::RelayHealth, list::RelayList, pool::ManagerPool},
  ClientConfig, Keys, Scheme,
};

mod database;
mod relays_file;

use database::keys_table::{self, KeysTable};

#[derive(thiserror::Error, Debug)]
enum Error {
  #[error(transparent)]
  Config(#[from] config::Error),

  #[error(transparent)]
  Keys(#[from] keys_table::Error),

  #[error(transparent)]
  Relay(#[from] relay::Error),

  #[error(transparent)]
  Profile(#[from] profile::Error),

  #[error(transparent)]
  DirectMessage(#[from] direct_message::Error),

  #[error(transparent)]
  Event(#[from] event::Error),

  #[error(transparent)]
  Nip19(#[from] nip19::Error),

  #[error(transparent)]
  Json(#[from] serde_json::Error),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "nostr-cli")]
#[command(about = "Publish and fetch events on nostr relays", long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,

  /// Directory holding the client database
  #[arg(long, global = true, default_value = "db")]
  db: PathBuf,

  /// File with one relay url per line, used instead of RELAY_URLS when present
  #[arg(long, global = true)]
  relays_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Stored client keys
  Keys {
    #[command(subcommand)]
    action: KeysAction,
  },

  /// Fetch the metadata of a user
  Profile { pubkey: String },

  /// Check that a user's NIP-05 identifier belongs to a domain
  Validate {
    pubkey: String,

    /// Defaults to REQUIRED_DOMAIN
    #[arg(long)]
    domain: Option<String>,
  },

  /// Publish a text note
  Note { text: String },

  /// Send an encrypted direct message
  Dm {
    recipient: String,
    text: String,

    /// legacy (nip04), ephemeral or current (nip44)
    #[arg(long, default_value_t = Scheme::Current)]
    scheme: Scheme,
  },

  /// Send a ticket for an event as an ephemeral direct message
  Ticket { event_name: String, recipient: String },

  /// Ask every relay for our own metadata and prune the dead ones
  CheckRelays {
    #[arg(long, default_value_t = 1)]
    rounds: u32,

    /// Seconds between two rounds
    #[arg(long, default_value_t = 60)]
    interval: u64,
  },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum KeysAction {
  /// Print the stored keys, generating them on first use
  Show,
  /// Replace the stored keys with new ones
  Generate,
  /// Forget the stored keys
  Delete,
}

struct Context {
  config: ClientConfig,
  pool: ManagerPool,
  cache: ProfileCache,
  keys_table: KeysTable,
  relays_file: Option<PathBuf>,
}

async fn publish_note(pool: &ManagerPool, keys: &Keys, text: &str) -> Result<String, Error> {
  let mut event = Event::new_without_signature(
    keys.public_key_hex(),
    unix_timestamp(),
    EventKind::Text,
    vec![],
    text.to_string(),
  );
  event.sign(keys)?;

  let manager = pool.borrow().await;
  let published = match manager.ensure_reachable() {
    Ok(()) => Ok(manager.publish(&event).await),
    Err(err) => Err(err),
  };
  pool.release(manager).await;

  let report = published?;
  info!("Note {} sent to {}/{} relays", event.id, report.succeeded(), report.attempted);
  Ok(event.id)
}

fn print_keys(keys: &Keys) -> Result<(), Error> {
  println!("pubkey: {}", keys.public_key_hex());
  println!("npub:   {}", nip19::npub_encode(&keys.public_key_hex())?);
  Ok(())
}

async fn execute(command: &Commands, ctx: &Context) -> Result<(), Error> {
  match command {
    Commands::Keys { action } => match action {
      KeysAction::Show => print_keys(&ctx.keys_table.get_or_create_client_keys()?)?,
      KeysAction::Generate => {
        let keys = Keys::generate();
        ctx.keys_table.store_client_keys(&keys)?;
        print_keys(&keys)?;
      }
      KeysAction::Delete => {
        ctx.keys_table.clear()?;
        println!("keys deleted");
      }
    },
    Commands::Profile { pubkey } => {
      let profile =
        profile::fetch_profile(&ctx.pool, &ctx.cache, pubkey, ctx.config.profile_fetch_timeout).await?;
      match profile {
        Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
        None => println!("no profile found for {pubkey}"),
      }
    }
    Commands::Validate { pubkey, domain } => {
      let domain = domain.as_deref().unwrap_or(&ctx.config.required_domain);
      let valid = profile::validate_identity(
        &ctx.pool,
        &ctx.cache,
        pubkey,
        domain,
        ctx.config.profile_fetch_timeout,
      )
      .await?;
      println!("{pubkey} @ {domain}: {valid}");
    }
    Commands::Note { text } => {
      let keys = ctx.keys_table.get_or_create_client_keys()?;
      println!("{}", publish_note(&ctx.pool, &keys, text).await?);
    }
    Commands::Dm {
      recipient,
      text,
      scheme,
    } => {
      let keys = ctx.keys_table.get_or_create_client_keys()?;
      let id =
        direct_message::publish_direct_message(&ctx.pool, &keys.secret_key_hex(), recipient, text, *scheme)
          .await?;
      println!("{id}");
    }
    Commands::Ticket {
      event_name,
      recipient,
    } => {
      let keys = ctx.keys_table.get_or_create_client_keys()?;
      let id =
        direct_message::send_ticket(&ctx.pool, event_name, recipient, &keys.secret_key_hex(), None).await?;
      println!("{id}");
    }
    Commands::CheckRelays { rounds, interval } => {
      let keys = ctx.keys_table.get_or_create_client_keys()?;
      let relay_list = ctx.pool.relay_list();
      let mut health = RelayHealth::new();

      for round in 1..=*rounds {
        let report = health
          .check_all(
            relay_list,
            &keys.public_key_hex(),
            ctx.config.connect_timeout,
            ctx.config.tls_verify,
          )
          .await;
        info!(
          "Round {round}: {} good, {} failing, {} pruned",
          report.good.len(),
          report.failing.len(),
          report.pruned.len()
        );
        for url in &report.failing {
          println!("failing: {url} ({} in a row)", health.failures(url));
        }
        for url in &report.pruned {
          println!("pruned:  {url}");
        }

        if round < *rounds {
          tokio::time::sleep(Duration::from_secs(*interval)).await;
        }
      }

      if let Some(path) = &ctx.relays_file {
        relays_file::save(path, &relay_list.urls().await)?;
      }
    }
  }

  Ok(())
}

async fn run(cli: Cli) -> Result<(), Error> {
  let mut config = ClientConfig::from_env()?;
  if let Some(path) = &cli.relays_file {
    match relays_file::load(path)? {
      Some(urls) => config.relay_urls = urls,
      None => warn!("{} not found, using configured relays", path.display()),
    }
  }

  let ctx = Context {
    pool: ManagerPool::new(RelayList::new(&config.relay_urls)?, &config),
    cache: ProfileCache::new(config.cache_timeout),
    keys_table: KeysTable::new(&cli.db)?,
    relays_file: cli.relays_file,
    config,
  };

  let result = execute(&cli.command, &ctx).await;
  ctx.pool.shutdown().await;
  result
}

#[tokio::main]
async fn main() {
  dotenv::dotenv().ok();
  env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

  if let Err(err) = run(Cli::parse()).await {
    error!("{err}");
    process::exit(1);
  }
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[test]
  fn test_cli_definition() {
    Cli::command().debug_assert();
  }

  #[test]
  fn test_parse_dm() {
    let cli = Cli::try_parse_from(["nostr-cli", "dm", "abc", "hello", "--scheme", "nip04"]).unwrap();
    match cli.command {
      Commands::Dm {
        recipient,
        text,
        scheme,
      } => {
        assert_eq!(recipient, "abc");
        assert_eq!(text, "hello");
        assert_eq!(scheme, Scheme::Legacy);
      }
      other => panic!("unexpected command {other:?}"),
    }
    assert_eq!(cli.db, PathBuf::from("db"));
  }

  #[test]
  fn test_parse_keys_delete() {
    let cli = Cli::try_parse_from(["nostr-cli", "keys", "delete"]).unwrap();
    assert!(matches!(
      cli.command,
      Commands::Keys {
        action: KeysAction::Delete
      }
    ));
  }

  #[test]
  fn test_unknown_scheme_is_rejected() {
    assert!(Cli::try_parse_from(["nostr-cli", "dm", "abc", "hello", "--scheme", "rot13"]).is_err());
  }
}
