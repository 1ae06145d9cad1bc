use std::sync::{
  atomic::{AtomicBool, AtomicU64, Ordering},
  Arc,
};
use std::{fmt, time::Duration};

use futures_util::{
  stream::{SplitSink, SplitStream},
  SinkExt, StreamExt,
};
use log::{debug, error, info, warn};
use tokio::{net::TcpStream, sync::Mutex, task::JoinHandle};
use tokio_tungstenite::{
  connect_async_tls_with_config, tungstenite::Message, Connector, MaybeTlsStream, WebSocketStream,
};

use super::Error;
use crate::message_pool::MessagePool;
use crate::relay_to_client_communication::RelayMessage;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
  /// Registered, never opened (or reset for a new session)
  Unconnected,
  Connecting,
  Open,
  /// Closed by us or by the transport
  Closed,
}

///
/// One websocket to one relay.
///
/// Once open, a background task reads every frame the relay sends and
/// feeds the [`MessagePool`] handed to [`RelayConnection::connect`].
///
pub struct RelayConnection {
  url: String,
  timeout: Duration,
  tls_verify: bool,
  status: RelayStatus,
  /// Write half of the socket, shared with the receive task so it can close it
  writer: Option<Arc<Mutex<WsSink>>>,
  /// Cleared by the receive task when the relay goes away
  is_connected: Arc<AtomicBool>,
  receive_task: Option<JoinHandle<()>>,
}

impl fmt::Debug for RelayConnection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RelayConnection")
      .field("url", &self.url)
      .field("status", &self.status())
      .field("tls_verify", &self.tls_verify)
      .finish_non_exhaustive()
  }
}

impl RelayConnection {
  pub fn new(url: impl Into<String>, timeout: Duration, tls_verify: bool) -> Self {
    Self {
      url: url.into(),
      timeout,
      tls_verify,
      status: RelayStatus::Unconnected,
      writer: None,
      is_connected: Arc::new(AtomicBool::new(false)),
      receive_task: None,
    }
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn status(&self) -> RelayStatus {
    if self.status == RelayStatus::Open && !self.is_connected.load(Ordering::Relaxed) {
      return RelayStatus::Closed;
    }
    self.status
  }

  pub fn is_open(&self) -> bool {
    self.status() == RelayStatus::Open
  }

  fn tls_connector(&self) -> Result<Option<Connector>, Error> {
    if self.tls_verify {
      return Ok(None);
    }
    let connector = native_tls::TlsConnector::builder()
      .danger_accept_invalid_certs(true)
      .danger_accept_invalid_hostnames(true)
      .build()?;
    Ok(Some(Connector::NativeTls(connector)))
  }

  ///
  /// Opens the socket and starts the receive task.
  ///
  /// ## Arguments
  ///
  /// * `message_pool` - where received events and EOSE notices are queued
  /// * `dropped_frames` - incremented for every frame that cannot be parsed
  ///
  pub async fn connect(
    &mut self,
    message_pool: Arc<MessagePool>,
    dropped_frames: Arc<AtomicU64>,
  ) -> Result<(), Error> {
    if self.is_open() {
      return Ok(());
    }

    debug!("❯ Connecting to {}", self.url);
    if !self.tls_verify {
      warn!("TLS certificate verification is disabled for {}", self.url);
    }
    self.status = RelayStatus::Connecting;

    let connection = match self.tls_connector() {
      Ok(connector) => {
        tokio::time::timeout(
          self.timeout,
          connect_async_tls_with_config(self.url.as_str(), None, false, connector),
        )
        .await
      }
      Err(err) => {
        self.status = RelayStatus::Unconnected;
        return Err(err);
      }
    };

    let ws_stream = match connection {
      Ok(Ok((ws_stream, _))) => ws_stream,
      Ok(Err(err)) => {
        error!("Impossible to connect to {}: {}", self.url, err);
        self.status = RelayStatus::Unconnected;
        return Err(Error::ConnectionFailure {
          url: self.url.clone(),
          reason: err.to_string(),
        });
      }
      Err(_) => {
        error!("Impossible to connect to {}: timed out after {:?}", self.url, self.timeout);
        self.status = RelayStatus::Unconnected;
        return Err(Error::Timeout(self.timeout));
      }
    };

    info!("❯ Connected to {}", self.url);
    let (ws_tx, ws_rx) = ws_stream.split();
    let writer = Arc::new(Mutex::new(ws_tx));

    self.is_connected.store(true, Ordering::Relaxed);
    self.status = RelayStatus::Open;
    self.writer = Some(writer.clone());
    self.receive_task = Some(tokio::spawn(receive_loop(
      self.url.clone(),
      ws_rx,
      writer,
      message_pool,
      dropped_frames,
      self.is_connected.clone(),
    )));

    Ok(())
  }

  /// Sends a text frame.
  pub async fn send(&self, frame: String) -> Result<(), Error> {
    let writer = match (&self.writer, self.is_open()) {
      (Some(writer), true) => writer,
      _ => return Err(Error::NotConnected(self.url.clone())),
    };
    writer.lock().await.send(Message::Text(frame)).await?;
    Ok(())
  }

  /// Cancels the receive task and closes the socket. Safe to call any number of times.
  pub async fn close(&mut self) {
    if let Some(task) = self.receive_task.take() {
      task.abort();
      let _ = task.await;
    }
    if let Some(writer) = self.writer.take() {
      debug!("❯ Disconnecting from {}", self.url);
      let _ = writer.lock().await.close().await;
    }
    self.is_connected.store(false, Ordering::Relaxed);
    if self.status != RelayStatus::Unconnected {
      self.status = RelayStatus::Closed;
    }
  }
}

async fn receive_loop(
  url: String,
  mut ws_rx: SplitStream<WsStream>,
  writer: Arc<Mutex<WsSink>>,
  message_pool: Arc<MessagePool>,
  dropped_frames: Arc<AtomicU64>,
  is_connected: Arc<AtomicBool>,
) {
  debug!("❯ Relay Message Thread of {url} Started");

  while let Some(msg_res) = ws_rx.next().await {
    match msg_res {
      Ok(Message::Text(text)) => handle_frame(&url, &text, &message_pool, &dropped_frames),
      Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
        Ok(text) => handle_frame(&url, &text, &message_pool, &dropped_frames),
        Err(_) => {
          dropped_frames.fetch_add(1, Ordering::Relaxed);
          debug!("[{url}] dropping non utf-8 binary frame");
        }
      },
      Ok(Message::Close(_)) => break,
      Ok(_) => {}
      Err(err) => {
        debug!("[{url}] transport error: {err}");
        break;
      }
    }
  }

  is_connected.store(false, Ordering::Relaxed);
  let _ = writer.lock().await.close().await;
  debug!("❯ Exited from Message Thread of {url}");
}

/// Queues events and EOSE notices; logs notices; counts and drops anything else.
pub(crate) fn handle_frame(
  url: &str,
  text: &str,
  message_pool: &MessagePool,
  dropped_frames: &AtomicU64,
) {
  match RelayMessage::from_json(text) {
    Ok(RelayMessage::Event(msg)) => message_pool.add_event(&msg.subscription_id, msg.event, url),
    Ok(RelayMessage::Eose(msg)) => message_pool.add_eose(&msg.subscription_id, url),
    Ok(RelayMessage::Notice(notice)) => info!("[{url}] NOTICE: {}", notice.message),
    Err(err) => {
      dropped_frames.fetch_add(1, Ordering::Relaxed);
      debug!("[{url}] dropping frame ({err}): {text}");
    }
  }
}
