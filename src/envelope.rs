//! Framing for the upstream planner hop.
//!
//! The planner protocol is strictly positional: the relay always knows which
//! kind of frame it expects next. The tagged format makes that explicit on the
//! wire so a frame arriving out of order is reported instead of being silently
//! taken for something else. The plain format speaks bare text frames for
//! planners that predate the envelope.

use crate::errors::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Question,
    Exit,
    Query,
    Date,
    Subject,
    Body,
    Done,
    Ack,
    Prompt,
    Answer,
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvelopeKind::Question => "question",
            EnvelopeKind::Exit => "exit",
            EnvelopeKind::Query => "query",
            EnvelopeKind::Date => "date",
            EnvelopeKind::Subject => "subject",
            EnvelopeKind::Body => "body",
            EnvelopeKind::Done => "done",
            EnvelopeKind::Ack => "ack",
            EnvelopeKind::Prompt => "prompt",
            EnvelopeKind::Answer => "answer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub payload: String,
}

impl Envelope {
    pub fn new(kind: EnvelopeKind, payload: impl Into<String>) -> Self {
        Envelope {
            kind,
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// JSON `{"kind": ..., "payload": ...}` per frame.
    Tagged,
    /// Bare text frames, kind implied by position.
    Plain,
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tagged" | "json" => Ok(WireFormat::Tagged),
            "plain" | "text" => Ok(WireFormat::Plain),
            other => Err(format!("unknown wire format: {}", other)),
        }
    }
}

impl WireFormat {
    pub fn encode(&self, envelope: &Envelope) -> RelayResult<String> {
        match self {
            WireFormat::Tagged => Ok(serde_json::to_string(envelope)?),
            WireFormat::Plain => Ok(envelope.payload.clone()),
        }
    }

    /// Parse one inbound text frame without checking its kind.
    ///
    /// Plain frames carry no kind, so they are taken as `expected`.
    pub fn parse(&self, frame: &str, expected: EnvelopeKind) -> RelayResult<Envelope> {
        match self {
            WireFormat::Plain => Ok(Envelope::new(expected, frame)),
            WireFormat::Tagged => Ok(serde_json::from_str(frame)?),
        }
    }

    /// Decode one inbound text frame, checking it against the kind the protocol expects next.
    pub fn decode(&self, frame: &str, expected: EnvelopeKind) -> RelayResult<Envelope> {
        self.parse(frame, expected)?.expect_kind(expected)
    }
}

impl Envelope {
    pub fn expect_kind(self, expected: EnvelopeKind) -> RelayResult<Self> {
        if self.kind != expected {
            return Err(RelayError::Protocol {
                expected: expected.to_string(),
                got: self.kind.to_string(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_encoding_shape() {
        let frame = WireFormat::Tagged
            .encode(&Envelope::new(EnvelopeKind::Question, "Zomato orders"))
            .unwrap();
        assert_eq!(frame, r#"{"kind":"question","payload":"Zomato orders"}"#);
    }

    #[test]
    fn test_plain_encoding_is_bare_payload() {
        let frame = WireFormat::Plain
            .encode(&Envelope::new(EnvelopeKind::Done, "Done"))
            .unwrap();
        assert_eq!(frame, "Done");
    }

    #[test]
    fn test_tagged_decode_rejects_unexpected_kind() {
        let result = WireFormat::Tagged.decode(r#"{"kind":"ack","payload":""}"#, EnvelopeKind::Query);
        match result {
            Err(RelayError::Protocol { expected, got }) => {
                assert_eq!(expected, "query");
                assert_eq!(got, "ack");
            }
            other => panic!("Expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_tagged_decode_rejects_bare_text() {
        let result = WireFormat::Tagged.decode("from:zomato", EnvelopeKind::Query);
        assert!(matches!(result, Err(RelayError::Codec(_))));
    }

    #[test]
    fn test_plain_decode_takes_expected_kind() {
        let envelope = WireFormat::Plain.decode("anything", EnvelopeKind::Answer).unwrap();
        assert_eq!(envelope, Envelope::new(EnvelopeKind::Answer, "anything"));
    }

    #[test]
    fn test_tagged_parse_keeps_wire_kind() {
        let envelope = WireFormat::Tagged
            .parse(r#"{"kind":"ack","payload":"ok"}"#, EnvelopeKind::Answer)
            .unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Ack);
        assert!(envelope.expect_kind(EnvelopeKind::Answer).is_err());
    }

    #[test]
    fn test_wire_format_from_str() {
        assert_eq!("tagged".parse::<WireFormat>().unwrap(), WireFormat::Tagged);
        assert_eq!("PLAIN".parse::<WireFormat>().unwrap(), WireFormat::Plain);
        assert!("xml".parse::<WireFormat>().is_err());
    }
}
