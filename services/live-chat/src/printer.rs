//! Turns decoded session messages into terminal output.

use base64::Engine;
use gemini_live::{DecodedMessage, MessageKind, UsageTotals};

/// Collects what a model turn produced and renders it as it streams in.
///
/// Audio is not played here; chunks are only counted so the user can see
/// that the model answered.
#[derive(Debug, Default)]
pub struct TurnPrinter {
    audio_chunks: usize,
    audio_bytes: usize,
}

impl TurnPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the text to write for `message`, possibly empty.
    pub fn render(&mut self, message: &DecodedMessage, usage: UsageTotals) -> String {
        let mut out = String::new();
        match &message.kind {
            MessageKind::Text { text } => out.push_str(text),
            MessageKind::Audio { data, .. } => {
                self.audio_chunks += 1;
                match base64::engine::general_purpose::STANDARD.decode(data) {
                    Ok(bytes) => self.audio_bytes += bytes.len(),
                    Err(e) => tracing::warn!(error = %e, "Audio chunk is not valid base64"),
                }
            }
            MessageKind::SetupComplete => tracing::info!("Server confirmed session setup."),
            MessageKind::UsageMetadata(turn) => {
                tracing::debug!(?turn, "Usage reported for turn.");
            }
            MessageKind::Unknown => {}
        }

        if message.is_end_of_turn() {
            out.push('\n');
            if self.audio_chunks > 0 {
                out.push_str(&format!(
                    "[audio: {} chunks, {} bytes]\n",
                    self.audio_chunks, self.audio_bytes
                ));
            }
            out.push_str(&format!(
                "[tokens: prompt {}, response {}, total {}]\n",
                usage.prompt_tokens, usage.response_tokens, usage.total_tokens
            ));
            self.audio_chunks = 0;
            self.audio_bytes = 0;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(kind: MessageKind, end_of_turn: Option<bool>) -> DecodedMessage {
        DecodedMessage { kind, end_of_turn }
    }

    #[test]
    fn test_text_streams_and_turn_end_reports_tokens() {
        let mut printer = TurnPrinter::new();
        let usage = UsageTotals {
            prompt_tokens: 3,
            response_tokens: 5,
            total_tokens: 8,
        };

        let first = printer.render(
            &message(MessageKind::Text { text: "Hel".into() }, Some(false)),
            usage,
        );
        let last = printer.render(
            &message(MessageKind::Text { text: "lo".into() }, Some(true)),
            usage,
        );

        assert_eq!(first, "Hel");
        assert_eq!(last, "lo\n[tokens: prompt 3, response 5, total 8]\n");
    }

    #[test]
    fn test_audio_is_summarised_per_turn() {
        let mut printer = TurnPrinter::new();
        let usage = UsageTotals::default();
        let audio = |data: &str| {
            message(
                MessageKind::Audio {
                    data: data.into(),
                    mime_type: Some("audio/pcm;rate=24000".into()),
                },
                None,
            )
        };

        assert_eq!(printer.render(&audio("QUJD"), usage), "");
        assert_eq!(printer.render(&audio("AAECAw=="), usage), "");
        let end = printer.render(&message(MessageKind::Unknown, Some(true)), usage);
        assert_eq!(
            end,
            "\n[audio: 2 chunks, 7 bytes]\n[tokens: prompt 0, response 0, total 0]\n"
        );

        let next_turn = printer.render(&message(MessageKind::Unknown, Some(true)), usage);
        assert!(!next_turn.contains("audio"));
    }

    #[test]
    fn test_control_frames_print_nothing() {
        let mut printer = TurnPrinter::new();
        let usage = UsageTotals::default();
        assert_eq!(
            printer.render(&message(MessageKind::SetupComplete, None), usage),
            ""
        );
        assert_eq!(
            printer.render(&message(MessageKind::UsageMetadata(usage), None), usage),
            ""
        );
    }
}
