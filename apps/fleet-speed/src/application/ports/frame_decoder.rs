//! Frame Decoder Port (Driven Port)
//!
//! Interface for turning one wire frame into a typed frame. The wire
//! encoding is provider-defined; the ingestor only sees `Frame`.

use crate::domain::vessel::{AisMessage, Mmsi};

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Position report; the only frame that reaches the aggregator.
    Position(AisMessage),
    /// Static vessel data, identified by the vessel it describes.
    Static(Mmsi),
    /// Frame with a type tag this decoder does not handle.
    Unknown(String),
}

impl Frame {
    /// Short label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Position(_) => "position",
            Self::Static(_) => "static",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Errors from decoding a single frame. Never fatal to the session.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Frame is not valid JSON.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// A required field is absent or null.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field is present but has an unusable value.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Field name on the wire.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

impl DecodeError {
    /// Short label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::NotAnObject => "not_an_object",
            Self::MissingField(_) => "missing_field",
            Self::InvalidField { .. } => "invalid_field",
        }
    }
}

/// Port for frame decoding.
pub trait FrameDecoder: Send + Sync {
    /// Decode one frame.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the frame cannot be interpreted.
    fn decode(&self, frame: &str) -> Result<Frame, DecodeError>;
}
