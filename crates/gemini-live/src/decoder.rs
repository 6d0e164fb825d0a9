//! Classification of inbound server frames.

use crate::protocol::ServerFrame;
use crate::usage::UsageTotals;
use serde::Serialize;

/// What a server frame carried, in the order of precedence used by [`decode_frame`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    SetupComplete,
    UsageMetadata(UsageTotals),
    Text {
        text: String,
    },
    /// Inline model output, typically base64 PCM audio.
    Audio {
        data: String,
        mime_type: Option<String>,
    },
    /// Nothing recognisable: an empty frame, a frame with no usable parts,
    /// or one that could not be parsed at all.
    Unknown,
}

/// A decoded server frame handed to the response callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    pub kind: MessageKind,
    /// `serverContent.turnComplete` as sent, independent of `kind`.
    pub end_of_turn: Option<bool>,
}

impl DecodedMessage {
    pub fn unknown() -> Self {
        Self {
            kind: MessageKind::Unknown,
            end_of_turn: None,
        }
    }

    /// True only when the server explicitly marked the turn complete.
    pub fn is_end_of_turn(&self) -> bool {
        self.end_of_turn == Some(true)
    }

    /// The text or audio payload, empty for every other kind.
    pub fn data(&self) -> &str {
        match &self.kind {
            MessageKind::Text { text } => text,
            MessageKind::Audio { data, .. } => data,
            _ => "",
        }
    }
}

/// Decodes a raw frame. Never fails: unparsable input yields [`MessageKind::Unknown`].
pub fn decode(raw: &[u8]) -> DecodedMessage {
    match ServerFrame::from_slice(raw) {
        Ok(frame) => decode_frame(&frame),
        Err(e) => {
            tracing::warn!(error = %e, bytes = raw.len(), "Could not parse server frame");
            DecodedMessage::unknown()
        }
    }
}

/// Classifies an already parsed frame. Control frames outrank content frames.
pub fn decode_frame(frame: &ServerFrame) -> DecodedMessage {
    let end_of_turn = frame.turn_complete();
    let part = frame.first_part();

    let kind = if frame.signals_setup_complete() {
        MessageKind::SetupComplete
    } else if let Some(usage) = &frame.usage_metadata {
        MessageKind::UsageMetadata(UsageTotals::from(usage))
    } else if let Some(text) = part
        .and_then(|p| p.text.as_deref())
        .filter(|t| !t.is_empty())
    {
        MessageKind::Text {
            text: text.to_string(),
        }
    } else if let Some(inline) = part.and_then(|p| p.inline_data.as_ref()) {
        MessageKind::Audio {
            data: inline.data.clone(),
            mime_type: inline.mime_type.clone(),
        }
    } else {
        MessageKind::Unknown
    };

    DecodedMessage { kind, end_of_turn }
}
