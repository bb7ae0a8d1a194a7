//! Message framing: deciding where one message ends and the next begins.
//!
//! TCP is a byte stream, not a message stream. A single `read` can return
//! half a message, or one and a half. A [`FrameDecoder`] accumulates the
//! bytes it is fed and hands back whole frames as soon as they are complete,
//! keeping any trailing bytes for the next call.
//!
//! Three framings exist:
//!
//! - [`Framing::LegacyBrace`]: a message ends at the first `}` byte in the
//!   buffer. This is what unmodified legacy peers speak. It breaks if a
//!   request ever contains a nested object, which is why requests are kept
//!   flat.
//! - [`Framing::BalancedJson`]: a message ends where its outermost JSON
//!   value closes, ignoring braces inside strings. Used only to *read*
//!   legacy responses, which carry a nested `data` object.
//! - [`Framing::LengthPrefixed`]: a 4-byte big-endian length followed by
//!   exactly that many payload bytes. The default.

use std::str::FromStr;

use crate::TransportError;

/// Largest frame a decoder will buffer before giving up on the peer.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

const LENGTH_PREFIX_LEN: usize = 4;

/// How message boundaries are marked on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Message ends at the first `}` byte. Encoding writes raw bytes.
    LegacyBrace,
    /// Message ends where the outermost JSON value closes. Encoding writes
    /// raw bytes.
    BalancedJson,
    /// 4-byte big-endian length prefix, then the payload.
    #[default]
    LengthPrefixed,
}

impl Framing {
    /// Wraps a payload for sending with this framing.
    ///
    /// # Errors
    /// [`TransportError::FrameTooLarge`] if a length-prefixed payload does
    /// not fit in a `u32`.
    pub fn encode(self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        match self {
            Self::LegacyBrace | Self::BalancedJson => Ok(payload.to_vec()),
            Self::LengthPrefixed => {
                let len = u32::try_from(payload.len()).map_err(|_| {
                    TransportError::FrameTooLarge {
                        len: payload.len(),
                        max: u32::MAX as usize,
                    }
                })?;
                let mut out =
                    Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(payload);
                Ok(out)
            }
        }
    }
}

/// The framing used in each direction of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePair {
    /// How frames read from the peer are delimited.
    pub inbound: Framing,
    /// How frames written to the peer are delimited.
    pub outbound: Framing,
}

/// The wire dialect a service speaks.
///
/// A dialect expands into a [`FramePair`] that depends on which side of the
/// connection we are on. Legacy servers read brace-terminated requests and
/// write raw responses; legacy clients therefore need a JSON-aware reader
/// for those responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Byte-compatible with unmodified legacy peers.
    Legacy,
    /// Length-prefixed frames in both directions.
    #[default]
    LengthPrefixed,
}

impl WireFormat {
    /// Framing for the accepting side of a connection.
    pub fn server_framing(self) -> FramePair {
        match self {
            Self::Legacy => FramePair {
                inbound: Framing::LegacyBrace,
                outbound: Framing::LegacyBrace,
            },
            Self::LengthPrefixed => FramePair {
                inbound: Framing::LengthPrefixed,
                outbound: Framing::LengthPrefixed,
            },
        }
    }

    /// Framing for the connecting side of a connection.
    pub fn client_framing(self) -> FramePair {
        match self {
            Self::Legacy => FramePair {
                inbound: Framing::BalancedJson,
                outbound: Framing::LegacyBrace,
            },
            Self::LengthPrefixed => FramePair {
                inbound: Framing::LengthPrefixed,
                outbound: Framing::LengthPrefixed,
            },
        }
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "length-prefixed" | "length_prefixed" => Ok(Self::LengthPrefixed),
            other => Err(format!(
                "unknown wire format '{other}' (expected 'legacy' or 'length-prefixed')"
            )),
        }
    }
}

/// Incremental frame extractor for one direction of one connection.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    pub fn new(framing: Framing, max_frame_len: usize) -> Self {
        Self {
            framing,
            buf: Vec::new(),
            max_frame_len,
        }
    }

    /// Appends freshly received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes buffered but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if the buffer holds anything besides whitespace.
    ///
    /// Used at end-of-stream to tell a clean close from a truncated frame.
    pub fn has_partial_frame(&self) -> bool {
        match self.framing {
            Framing::LengthPrefixed => !self.buf.is_empty(),
            Framing::LegacyBrace | Framing::BalancedJson => {
                self.buf.iter().any(|b| !b.is_ascii_whitespace())
            }
        }
    }

    /// Pops the next complete frame, if one is buffered.
    ///
    /// # Errors
    /// [`TransportError::FrameTooLarge`] once a frame (or the bytes that
    /// would become one) exceeds the size limit.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let end = match self.framing {
            Framing::LegacyBrace => {
                self.buf.iter().position(|&b| b == b'}').map(|pos| pos + 1)
            }
            Framing::BalancedJson => balanced_json_end(&self.buf),
            Framing::LengthPrefixed => return self.next_length_prefixed(),
        };

        match end {
            Some(end) => {
                let rest = self.buf.split_off(end);
                Ok(Some(std::mem::replace(&mut self.buf, rest)))
            }
            None if self.buf.len() > self.max_frame_len => {
                Err(TransportError::FrameTooLarge {
                    len: self.buf.len(),
                    max: self.max_frame_len,
                })
            }
            None => Ok(None),
        }
    }

    fn next_length_prefixed(
        &mut self,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        if self.buf.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }
        let prefix: [u8; LENGTH_PREFIX_LEN] = self.buf[..LENGTH_PREFIX_LEN]
            .try_into()
            .expect("length checked above");
        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.max_frame_len {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        if self.buf.len() < LENGTH_PREFIX_LEN + len {
            return Ok(None);
        }
        let frame =
            self.buf[LENGTH_PREFIX_LEN..LENGTH_PREFIX_LEN + len].to_vec();
        self.buf.drain(..LENGTH_PREFIX_LEN + len);
        Ok(Some(frame))
    }
}

/// Finds the byte index just past the outermost JSON value in `buf`.
///
/// Tracks nesting depth, skipping over string contents (including escaped
/// quotes) so that braces inside strings are not counted.
fn balanced_json_end(buf: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut started = false;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in buf.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                started = true;
            }
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if started && depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
