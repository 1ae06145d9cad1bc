use serde_json::{json, Value};

use crate::event::Event;

use super::Error;

/// `["EVENT", <event JSON>]`, used to publish an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientToRelayCommEvent {
  pub event: Event,
}

impl ClientToRelayCommEvent {
  pub fn new_event(event: Event) -> Self {
    Self { event }
  }

  /// Get event communication as JSON string
  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  /// Deserialize [`ClientToRelayCommEvent`] from JSON string
  pub fn from_json(msg: &str) -> Result<Self, Error> {
    if msg.is_empty() {
      return Err(Error::InvalidData);
    }

    let value: Value = serde_json::from_str(msg)?;
    Self::from_value(value)
  }

  /// Serialize as [`Value`]
  pub fn as_value(&self) -> Value {
    json!(["EVENT", self.event])
  }

  /// Deserialize from [`Value`]
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    // ["EVENT", <event JSON>]
    if v.len() != 2 || v[0] != "EVENT" {
      return Err(Error::InvalidData);
    }

    let event: Event = serde_json::from_value(v[1].clone())?;
    Ok(Self::new_event(event))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::event::{kind::EventKind, tag::Tag};

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  fn mock_event() -> Event {
    Event {
      id: String::from("05b25af3-4250-4fbf-8ef5-97220858f9ab"),
      pubkey: String::from("614a695bab54e8dc98946abdb8ec019599ece6dada0c23890977d0fa128081d6"),
      created_at: 1673002822,
      kind: EventKind::Text,
      tags: vec![Tag::pubkey("02c7e1b1e9c175ab2d100baf1d5a66e73ecc044e9f8093d0c965741f26aa3abf76")],
      content: String::from("Lorem ipsum dolor sit amet"),
      sig: String::from("e8551d85f530113366e8da481354c2756605e3f58149cedc1fb9385d35251712b954af8ef891cb0467d50ddc6685063d4190c97e9e131f903e6e4176dc13ce7c"),
    }
  }

  #[test]
  fn test_publish_frame_is_two_element_array() {
    let frame = ClientToRelayCommEvent::new_event(mock_event());
    let expected = format!(r#"["EVENT",{}]"#, mock_event().as_json());

    assert_eq!(frame.as_json(), expected);
    assert_eq!(ClientToRelayCommEvent::from_json(&expected).unwrap(), frame);
  }

  #[test]
  fn test_other_frames_are_rejected() {
    let event = mock_event().as_json();
    assert!(ClientToRelayCommEvent::from_json(&format!(r#"["EVENT","sub",{event}]"#)).is_err());
    assert!(ClientToRelayCommEvent::from_json(&format!(r#"["REQ",{event}]"#)).is_err());
    assert!(ClientToRelayCommEvent::from_json("").is_err());
  }
}
