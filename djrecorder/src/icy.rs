//! In-band (ICY) metadata decoder
//!
//! When the server grants in-band metadata it interleaves the audio with
//! metadata blocks:
//!
//! ```text
//! | metaint audio bytes | L | 16 * L bytes of metadata | metaint audio bytes | L | ...
//! ```
//!
//! A block holds `StreamTitle='Artist - Title';` (optionally followed by
//! other `Key='value';` pairs) padded with NUL bytes to its declared length.
//! `L == 0` means no metadata this time.
//!
//! [`IcyDecoder`] is fed the body chunk by chunk, whatever their sizes, and
//! splits it into [`IcyEvent`]s in stream order. Audio is forwarded as
//! zero-copy slices of the input chunks.

use bytes::Bytes;

const STREAM_TITLE_KEY: &str = "StreamTitle='";

/// What the decoder found in the stream, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcyEvent {
    /// Raw audio, to be written verbatim
    Audio(Bytes),
    /// A `StreamTitle` announcement
    Title(String),
}

/// Reasons a metadata block carries no usable title
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("no StreamTitle in metadata block")]
    MissingTitle,
    #[error("unterminated StreamTitle value")]
    Unterminated,
}

#[derive(Debug)]
enum DecoderState {
    /// Expecting `remaining` more audio bytes
    ReadingAudio { remaining: usize },
    /// Expecting the length byte (`length == None`), then the block itself
    ReadingMetadata {
        length: Option<usize>,
        block: Vec<u8>,
    },
}

/// Splits an ICY body into audio and title announcements
#[derive(Debug)]
pub struct IcyDecoder {
    metaint: usize,
    state: DecoderState,
}

impl IcyDecoder {
    /// Decoder for a fresh connection whose body starts with `metaint` audio bytes
    ///
    /// A zero interval is treated as one byte; callers only build a decoder
    /// when the server granted a positive interval.
    pub fn new(metaint: usize) -> Self {
        let metaint = metaint.max(1);
        Self {
            metaint,
            state: DecoderState::ReadingAudio { remaining: metaint },
        }
    }

    pub fn metaint(&self) -> usize {
        self.metaint
    }

    /// Decode one chunk of the body
    ///
    /// Malformed metadata blocks are logged and dropped; they never
    /// interrupt the audio.
    pub fn decode(&mut self, chunk: &Bytes) -> Vec<IcyEvent> {
        let mut events = Vec::new();
        let mut pos = 0;

        while pos < chunk.len() {
            let available = chunk.len() - pos;

            match &mut self.state {
                DecoderState::ReadingAudio { remaining } => {
                    let n = (*remaining).min(available);
                    events.push(IcyEvent::Audio(chunk.slice(pos..pos + n)));
                    pos += n;
                    *remaining -= n;

                    if *remaining == 0 {
                        self.state = DecoderState::ReadingMetadata {
                            length: None,
                            block: Vec::new(),
                        };
                    }
                }
                DecoderState::ReadingMetadata {
                    length: length @ None,
                    block,
                } => {
                    let declared = chunk[pos] as usize * 16;
                    pos += 1;

                    if declared == 0 {
                        self.state = DecoderState::ReadingAudio {
                            remaining: self.metaint,
                        };
                    } else {
                        *length = Some(declared);
                        block.reserve(declared);
                    }
                }
                DecoderState::ReadingMetadata {
                    length: Some(declared),
                    block,
                } => {
                    let n = (*declared - block.len()).min(available);
                    block.extend_from_slice(&chunk[pos..pos + n]);
                    pos += n;

                    if block.len() == *declared {
                        let block = std::mem::take(block);
                        self.state = DecoderState::ReadingAudio {
                            remaining: self.metaint,
                        };

                        match parse_stream_title(&block) {
                            Ok(title) => events.push(IcyEvent::Title(title)),
                            Err(e) => tracing::warn!(
                                "Ignoring metadata block ({}): {:?}",
                                e,
                                String::from_utf8_lossy(trim_padding(&block))
                            ),
                        }
                    }
                }
            }
        }

        events
    }
}

fn trim_padding(block: &[u8]) -> &[u8] {
    let end = block.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &block[..end]
}

/// Extract the `StreamTitle` value from a metadata block
///
/// Trailing NUL padding is ignored. The value ends at the first `';`, or
/// at a final `'` when the title is the last pair of the block.
pub fn parse_stream_title(block: &[u8]) -> Result<String, MetadataError> {
    let text = String::from_utf8_lossy(trim_padding(block));

    let start = text
        .find(STREAM_TITLE_KEY)
        .ok_or(MetadataError::MissingTitle)?
        + STREAM_TITLE_KEY.len();
    let rest = &text[start..];

    let end = rest
        .find("';")
        .or_else(|| rest.strip_suffix('\'').map(str::len))
        .ok_or(MetadataError::Unterminated)?;

    Ok(rest[..end].to_string())
}
