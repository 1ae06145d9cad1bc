use serde_json::{json, Value};

use crate::filter::Filter;

use super::Error;

/// `["REQ", <subscription_id>, <filter JSON>, ...]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientToRelayCommRequest {
  pub subscription_id: String,
  pub filters: Vec<Filter>,
}

impl ClientToRelayCommRequest {
  pub fn new_request(subscription_id: impl Into<String>, filters: Vec<Filter>) -> Self {
    Self {
      subscription_id: subscription_id.into(),
      filters,
    }
  }

  /// Serialize as [`Value`]
  pub fn as_value(&self) -> Value {
    let mut frame = vec![json!("REQ"), json!(self.subscription_id)];
    frame.extend(self.filters.iter().map(|filter| json!(filter)));
    Value::Array(frame)
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  /// Deserialize from [`Value`]
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    if v.len() < 3 || v[0] != "REQ" {
      return Err(Error::InvalidData);
    }

    let subscription_id: String = serde_json::from_value(v[1].clone())?;
    let filters = v[2..]
      .iter()
      .map(|filter| serde_json::from_value(filter.clone()))
      .collect::<Result<Vec<Filter>, _>>()?;

    Ok(Self {
      subscription_id,
      filters,
    })
  }

  pub fn from_json(msg: &str) -> Result<Self, Error> {
    let value: Value = serde_json::from_str(msg)?;
    Self::from_value(value)
  }
}
