use serde_json::{json, Value};

use super::Error;

/// `["NOTICE", <message>]`, human readable messages from the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayToClientCommNotice {
  pub message: String,
}

impl RelayToClientCommNotice {
  pub fn new_notice(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }

  pub fn as_value(&self) -> Value {
    json!(["NOTICE", self.message])
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    if v.len() != 2 || v[0] != "NOTICE" {
      return Err(Error::InvalidData);
    }

    let message: String = serde_json::from_value(v[1].clone())?;
    Ok(Self::new_notice(message))
  }
}
