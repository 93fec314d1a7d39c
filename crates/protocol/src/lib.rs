//! WRF Variable Selector Session Protocol, v1 wire format
//!
//! This crate defines the protocol types spoken between a form front end and
//! the selector server. The wire format is JSONL (newline-delimited JSON)
//! over TCP.
//!
//! Every message carries a `type` tag and an `id` used to correlate the
//! response. The first client message on a connection must be `hello`.
//!
//! # Usage
//!
//! ```ignore
//! use wrfsel_protocol::{ClientMessage, ServerMessage, PingMessage};
//!
//! let msg = ClientMessage::Ping(PingMessage { id: "1".into() });
//! let json = serde_json::to_string(&msg)?;
//!
//! let response: ServerMessage = serde_json::from_str(&line)?;
//! ```

use serde::{Deserialize, Serialize};

use wrfsel_core::{AggregationKind, FormPatch, FormView, ScenarioId, VariableDescriptor};

/// Current protocol version. Increment for breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum size of one JSONL line (1 MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

// =============================================================================
// Client → Server Messages
// =============================================================================

/// Messages sent from the form front end to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello(HelloMessage),
    /// Row selection in the variable table changed.
    SelectRows(SelectRowsMessage),
    /// Scenario selector changed.
    SetScenario(SetScenarioMessage),
    /// Aggregation selector changed.
    SetAggregation(SetAggregationMessage),
    /// Email input changed.
    SetEmail(SetEmailMessage),
    /// Submit button: export all selections and mail them.
    Submit(SubmitMessage),
    /// Ask for the full current view.
    Inspect(InspectMessage),
    Ping(PingMessage),
}

impl ClientMessage {
    /// Correlation id of any message.
    pub fn id(&self) -> &str {
        match self {
            ClientMessage::Hello(m) => &m.id,
            ClientMessage::SelectRows(m) => &m.id,
            ClientMessage::SetScenario(m) => &m.id,
            ClientMessage::SetAggregation(m) => &m.id,
            ClientMessage::SetEmail(m) => &m.id,
            ClientMessage::Submit(m) => &m.id,
            ClientMessage::Inspect(m) => &m.id,
            ClientMessage::Ping(m) => &m.id,
        }
    }
}

/// Initial handshake from client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloMessage {
    pub id: String,
    pub client: String,
    pub version: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
}

fn default_protocol_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRowsMessage {
    pub id: String,
    pub scenario: ScenarioId,
    pub aggregation: AggregationKind,
    /// Selected row indices (catalog order). Order and duplicates don't matter.
    #[serde(default)]
    pub indices: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetScenarioMessage {
    pub id: String,
    pub scenario: ScenarioId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAggregationMessage {
    pub id: String,
    pub aggregation: AggregationKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetEmailMessage {
    pub id: String,
    pub email: String,
}

/// Submit takes the email from the message if given, else from the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectMessage {
    pub id: String,
}

/// Ping for keepalive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingMessage {
    pub id: String,
}

// =============================================================================
// Server → Client Messages
// =============================================================================

/// Messages sent from the server to the front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome(WelcomeMessage),
    /// Partial UI update after an input event.
    ViewPatch(ViewPatchMessage),
    /// Full view, answer to `inspect`.
    View(ViewMessage),
    ExportResult(ExportResultMessage),
    Pong(PongMessage),
    Error(ErrorMessage),
}

/// Welcome response after hello: everything needed to draw the form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub id: String,
    pub session_id: String,
    pub protocol_version: u32,
    /// Variable table rows, in index order.
    pub catalog: Vec<VariableDescriptor>,
    /// Scenario selector options.
    pub scenarios: Vec<ScenarioId>,
    /// Aggregation selector options.
    pub aggregations: Vec<AggregationKind>,
    pub view: FormView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewPatchMessage {
    pub id: String,
    pub patch: FormPatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewMessage {
    pub id: String,
    pub view: FormView,
}

/// Successful export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResultMessage {
    pub id: String,
    pub recipients: Vec<String>,
    /// Attached file names (not paths; the files are gone by now).
    pub files: Vec<String>,
    pub scenarios: Vec<ScenarioId>,
    /// Send attempts used.
    pub attempts: u32,
}

/// Pong response to ping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongMessage {
    pub id: String,
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub code: String,
    pub message: String,
}

/// Protocol error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Malformed JSON or unknown message type.
    MalformedMessage,
    /// Line longer than MAX_MESSAGE_SIZE.
    MessageTooLarge,
    /// A message other than hello arrived first.
    HandshakeRequired,
    /// Second hello on the same connection.
    AlreadyAuthenticated,
    /// Client protocol version newer than the server's.
    ProtocolMismatch,
    /// Scenario selector set to a name outside the configured set.
    UnknownScenario,
    /// User input rejected (e.g. empty email).
    ValidationError,
    /// Server-side mail configuration unusable (e.g. no password).
    ConfigError,
    /// Mail relay failed after retries.
    TransportError,
    /// Export files could not be written.
    IoError,
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedMessage => "malformed_message",
            Self::MessageTooLarge => "message_too_large",
            Self::HandshakeRequired => "handshake_required",
            Self::AlreadyAuthenticated => "already_authenticated",
            Self::ProtocolMismatch => "protocol_mismatch",
            Self::UnknownScenario => "unknown_scenario",
            Self::ValidationError => "validation_error",
            Self::ConfigError => "config_error",
            Self::TransportError => "transport_error",
            Self::IoError => "io_error",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::MalformedMessage => "Malformed JSON message",
            Self::MessageTooLarge => "Message exceeds maximum size",
            Self::HandshakeRequired => "First message must be hello",
            Self::AlreadyAuthenticated => "Already authenticated",
            Self::ProtocolMismatch => "Unsupported protocol version",
            Self::UnknownScenario => "Unknown scenario",
            Self::ValidationError => "Invalid input",
            Self::ConfigError => "Mail configuration error",
            Self::TransportError => "Mail delivery failed",
            Self::IoError => "Export I/O error",
        }
    }

    pub fn to_error_message(&self, id: Option<String>) -> ErrorMessage {
        ErrorMessage {
            id,
            code: self.code().to_string(),
            message: self.message().to_string(),
        }
    }

    /// Same code, specific message.
    pub fn with_message(&self, id: Option<String>, message: impl Into<String>) -> ErrorMessage {
        ErrorMessage {
            id,
            code: self.code().to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_defaults_protocol_version() {
        let json = r#"{"type":"hello","id":"1","client":"web","version":"0.1.0"}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        match parsed {
            ClientMessage::Hello(h) => {
                assert_eq!(h.client, "web");
                assert_eq!(h.protocol_version, 1);
            }
            _ => panic!("Expected Hello message"),
        }
    }

    #[test]
    fn test_select_rows_wire_format() {
        let json = r#"{"type":"select_rows","id":"7","scenario":"ERA-Interim","aggregation":"daily","indices":[2,0]}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id(), "7");
        match parsed {
            ClientMessage::SelectRows(m) => {
                assert_eq!(m.scenario.as_str(), "ERA-Interim");
                assert_eq!(m.aggregation, AggregationKind::Daily);
                assert_eq!(m.indices, vec![2, 0]);
            }
            _ => panic!("Expected SelectRows message"),
        }
    }

    #[test]
    fn test_unknown_aggregation_is_malformed() {
        let json = r#"{"type":"set_aggregation","id":"1","aggregation":"weekly"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_submit_email_optional() {
        let json = r#"{"type":"submit","id":"9"}"#;
        match serde_json::from_str::<ClientMessage>(json).unwrap() {
            ClientMessage::Submit(s) => assert!(s.email.is_none()),
            _ => panic!("Expected Submit message"),
        }

        let out = serde_json::to_string(&ClientMessage::Submit(SubmitMessage { id: "9".into(), email: None })).unwrap();
        assert_eq!(out, r#"{"type":"submit","id":"9"}"#);
    }

    #[test]
    fn test_view_patch_omits_untouched_fields() {
        let msg = ServerMessage::ViewPatch(ViewPatchMessage {
            id: "3".to_string(),
            patch: FormPatch {
                selected_indices: Some(vec![0, 2]),
                ..FormPatch::default()
            },
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"view_patch","id":"3","patch":{"selected_indices":[0,2]}}"#);
    }

    #[test]
    fn test_error_message_codes() {
        let err = ProtocolError::ValidationError.with_message(Some("4".into()), "email address is required");
        let json = serde_json::to_string(&ServerMessage::Error(err)).unwrap();
        assert!(json.contains(r#""code":"validation_error""#));
        assert!(json.contains("email address is required"));

        let err = ProtocolError::MalformedMessage.to_error_message(None);
        let json = serde_json::to_string(&ServerMessage::Error(err)).unwrap();
        assert!(!json.contains(r#""id""#));
    }
}
