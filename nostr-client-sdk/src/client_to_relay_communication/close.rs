use serde_json::{json, Value};

use super::Error;

/// `["CLOSE", <subscription_id>]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientToRelayCommClose {
  pub subscription_id: String,
}

impl ClientToRelayCommClose {
  pub fn new_close(subscription_id: impl Into<String>) -> Self {
    Self {
      subscription_id: subscription_id.into(),
    }
  }

  pub fn as_value(&self) -> Value {
    json!(["CLOSE", self.subscription_id])
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    if v.len() != 2 || v[0] != "CLOSE" {
      return Err(Error::InvalidData);
    }

    let subscription_id: String = serde_json::from_value(v[1].clone())?;
    Ok(Self::new_close(subscription_id))
  }

  pub fn from_json(msg: &str) -> Result<Self, Error> {
    let value: Value = serde_json::from_str(msg)?;
    Self::from_value(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[test]
  fn test_close_round_trips() {
    let close = ClientToRelayCommClose::new_close("mock_subscription_id");
    let serialized = close.as_json();

    assert_eq!(serialized, r#"["CLOSE","mock_subscription_id"]"#);
    assert_eq!(ClientToRelayCommClose::from_json(&serialized).unwrap(), close);
  }

  #[test]
  fn test_close_with_extra_elements_is_invalid() {
    assert!(ClientToRelayCommClose::from_json(r#"["CLOSE","a","b"]"#).is_err());
    assert!(ClientToRelayCommClose::from_json(r#"["CLOSE",1]"#).is_err());
  }
}
