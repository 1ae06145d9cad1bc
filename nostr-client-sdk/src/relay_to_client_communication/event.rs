use serde_json::{json, Value};

use crate::event::Event;

use super::Error;

/// `["EVENT", <subscription_id>, <event JSON>]`, an event matching one of
/// our subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayToClientCommEvent {
  pub subscription_id: String,
  pub event: Event,
}

impl RelayToClientCommEvent {
  pub fn new_event(subscription_id: impl Into<String>, event: Event) -> Self {
    Self {
      subscription_id: subscription_id.into(),
      event,
    }
  }

  pub fn as_value(&self) -> Value {
    json!(["EVENT", self.subscription_id, self.event])
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    if v.len() != 3 || v[0] != "EVENT" {
      return Err(Error::InvalidData);
    }

    let subscription_id: String = serde_json::from_value(v[1].clone())?;
    let event: Event = serde_json::from_value(v[2].clone())?;
    Ok(Self::new_event(subscription_id, event))
  }

  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    let msg: &str = &msg.into();

    if msg.is_empty() {
      return Err(Error::InvalidData);
    }

    let value: Value = serde_json::from_str(msg)?;
    Self::from_value(value)
  }
}
