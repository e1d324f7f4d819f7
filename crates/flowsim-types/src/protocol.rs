//! Wire protocol for the `/ws` message channel.
//!
//! Every frame is one UTF-8 JSON object discriminated by `t`. Outbound
//! frames carry a process-wide `seq` (stringified) and a millisecond `ts`
//! alongside their payload; [`encode`] and [`PreparedFrame`] produce that
//! envelope.
//!
//! Inbound frames are parsed leniently by the session layer, so only the
//! `hello` payload has a typed form here.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Protocol major version advertised in `welcome`.
pub const PROTOCOL_MAJOR: u32 = 1;

/// Protocol minor version advertised in `welcome`.
pub const PROTOCOL_MINOR: u32 = 0;

/// Snapshot schema revision advertised in `welcome` and written to saves.
pub const SCHEMA_REV: &str = "1.0";

/// Server build version advertised in `welcome` and `/health`.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Snapshot fields the server populates.
pub const ADVERTISED_FIELDS: [&str; 2] = ["node.p", "edge.q"];

/// Recoverable, session-local error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Structurally invalid message or operation.
    BadRequest,
    /// An added id already names a node or pipe.
    IdConflict,
    /// A referenced id does not exist.
    UnknownEntity,
    /// A material label is not in the configured set.
    InvalidMaterial,
    /// A grid coordinate is outside the grid.
    IndexOutOfBounds,
}

impl ErrorCode {
    /// The wire spelling of this code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::IdConflict => "id_conflict",
            Self::UnknownEntity => "unknown_entity",
            Self::InvalidMaterial => "invalid_material",
            Self::IndexOutOfBounds => "index_out_of_bounds",
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound message discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Handshake reply.
    Welcome,
    /// Periodic world state.
    Snapshot,
    /// Rejected request.
    Error,
}

impl MessageKind {
    /// The wire spelling of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Snapshot => "snapshot",
            Self::Error => "error",
        }
    }
}

/// Major/minor protocol version pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ProtocolVersion {
    /// Breaking revision.
    pub major: u32,
    /// Additive revision.
    pub minor: u32,
}

/// Payload of the `welcome` handshake reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Welcome {
    /// Protocol version spoken by this server.
    pub version: ProtocolVersion,
    /// Snapshot schema revision.
    pub schema_rev: String,
    /// Snapshot fields populated by this server.
    pub fields: Vec<String>,
    /// Optional features enabled for this session.
    pub use_features: Vec<String>,
    /// Current simulation rate.
    pub tick_hz: u32,
    /// Server build version.
    pub server_version: String,
}

impl Welcome {
    /// Build the welcome payload for the current tick rate.
    pub fn new(tick_hz: u32) -> Self {
        Self {
            version: ProtocolVersion {
                major: PROTOCOL_MAJOR,
                minor: PROTOCOL_MINOR,
            },
            schema_rev: SCHEMA_REV.to_owned(),
            fields: ADVERTISED_FIELDS.iter().map(|f| (*f).to_owned()).collect(),
            use_features: Vec::new(),
            tick_hz,
            server_version: SERVER_VERSION.to_owned(),
        }
    }
}

/// Payload of an `error` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ErrorPayload {
    /// Error class.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

/// Client handshake. Every field is optional; only `t == "hello"` matters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Hello {
    /// Protocol majors the client can speak.
    #[serde(default)]
    pub accept_major: Vec<u32>,
    /// Lowest acceptable minor version.
    #[serde(default)]
    pub min_minor: Option<u32>,
    /// Client build string, for logs.
    #[serde(default)]
    pub client_version: Option<String>,
}

impl Hello {
    /// Whether the client listed the given major, or listed none at all.
    pub fn accepts_major(&self, major: u32) -> bool {
        self.accept_major.is_empty() || self.accept_major.contains(&major)
    }
}

/// An outbound payload serialized once and stamped per recipient.
///
/// The body is rendered to JSON up front. [`PreparedFrame::stamp`] only
/// prepends `t`, `seq`, and `ts`, so a snapshot fanned out to many sessions
/// costs one serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFrame {
    kind: MessageKind,
    /// Members of the payload object, without the enclosing braces.
    fields: String,
}

impl PreparedFrame {
    /// Serialize `body`, which must render as a JSON object.
    ///
    /// # Errors
    ///
    /// Fails if serialization fails or the body is not an object.
    pub fn new<T: Serialize>(kind: MessageKind, body: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(body)?;
        let fields = json
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(|| {
                <serde_json::Error as serde::ser::Error>::custom(
                    "frame payload must be a JSON object",
                )
            })?;
        Ok(Self {
            kind,
            fields: fields.to_owned(),
        })
    }

    /// Render the frame with the given sequence number and the current time.
    pub fn stamp(&self, seq: u64) -> String {
        let mut frame = format!(
            r#"{{"t":"{}","seq":"{seq}","ts":{}"#,
            self.kind.as_str(),
            now_ms()
        );
        frame.reserve(self.fields.len().saturating_add(2));
        if !self.fields.is_empty() {
            frame.push(',');
            frame.push_str(&self.fields);
        }
        frame.push('}');
        frame
    }
}

/// Serialize one outbound frame.
///
/// # Errors
///
/// See [`PreparedFrame::new`].
pub fn encode<T: Serialize>(
    kind: MessageKind,
    seq: u64,
    body: &T,
) -> Result<String, serde_json::Error> {
    PreparedFrame::new(kind, body).map(|frame| frame.stamp(seq))
}

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
