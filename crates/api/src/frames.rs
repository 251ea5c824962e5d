use serde_json::error::Category;
use snafu::prelude::*;

use super::error::{FrameError, FrameResult, MalformedSnafu, RemoteSnafu, TruncatedSnafu};
use super::wire::ResultFrame;

/// Incremental decoder for newline-delimited JSON result frames.
///
/// Each chunk is split on `\n`; fragments accumulate until the running text parses. A syntax
/// or end-of-input failure only means the frame is incomplete. Any other decode failure, or
/// a frame carrying an `error` field, ends the stream.
#[derive(Debug, Default)]
pub struct FrameParser {
    pending_bytes: Vec<u8>,
    accumulator: String,
    failed: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a raw body chunk. A UTF-8 sequence cut at the chunk boundary is held back until
    /// the next chunk completes it.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<FrameResult<ResultFrame>> {
        self.pending_bytes.extend_from_slice(chunk);

        let decodable = match std::str::from_utf8(&self.pending_bytes) {
            Ok(_) => self.pending_bytes.len(),
            Err(error) if error.error_len().is_none() => error.valid_up_to(),
            Err(_) => self.pending_bytes.len(),
        };
        let bytes = self.pending_bytes.drain(..decodable).collect::<Vec<_>>();
        let text = String::from_utf8_lossy(&bytes);

        self.feed(&text)
    }

    /// Feeds decoded text, returning frames in arrival order.
    ///
    /// The first `Err` is terminal: it is the last item returned, and the parser yields
    /// nothing afterwards.
    pub fn feed(&mut self, text: &str) -> Vec<FrameResult<ResultFrame>> {
        let mut frames = Vec::new();
        if self.failed {
            return frames;
        }

        for fragment in text.split('\n') {
            let fragment = fragment.trim_end_matches('\r');
            if fragment.trim().is_empty() || fragment == "{}" {
                continue;
            }

            self.accumulator.push_str(fragment);
            match self.try_parse() {
                Ok(Some(frame)) => frames.push(Ok(frame)),
                Ok(None) => {}
                Err(error) => {
                    self.failed = true;
                    self.accumulator.clear();
                    frames.push(Err(error));
                    break;
                }
            }
        }

        frames
    }

    /// Checks that the body ended on a frame boundary.
    pub fn finish(&mut self) -> FrameResult<()> {
        if self.failed {
            return Ok(());
        }

        let pending_bytes = self.accumulator.trim().len() + self.pending_bytes.len();
        self.accumulator.clear();
        self.pending_bytes.clear();
        ensure!(
            pending_bytes == 0,
            TruncatedSnafu {
                stage: "frame-finish",
                pending_bytes,
            }
        );
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        !self.accumulator.is_empty() || !self.pending_bytes.is_empty()
    }

    fn try_parse(&mut self) -> FrameResult<Option<ResultFrame>> {
        let frame = match serde_json::from_str::<ResultFrame>(&self.accumulator) {
            Ok(frame) => frame,
            Err(error) if matches!(error.classify(), Category::Syntax | Category::Eof) => {
                tracing::trace!(
                    buffered = self.accumulator.len(),
                    "incomplete frame, continuing"
                );
                return Ok(None);
            }
            Err(source) => {
                return Err(source).context(MalformedSnafu {
                    stage: "frame-decode",
                });
            }
        };
        self.accumulator.clear();

        if let Some(message) = frame.error_message() {
            return RemoteSnafu {
                stage: "frame-error-field",
                message,
            }
            .fail();
        }

        Ok(Some(frame))
    }
}

impl FrameError {
    /// Error text reported by the server, as opposed to a local decode failure.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Remote { message, .. } => Some(message),
            _ => None,
        }
    }
}
