// ── Remote data-adapter line protocol ──
//
// One request or reply per line, `|`-separated. Typed tokens are written
// as a type tag followed by the value (`S|<string>`, `B|<0|1>`). String
// values are percent-encoded; `#` stands for null and `$` for empty.

use std::borrow::Cow;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::error::Error;

/// Protocol version announced in the `DPI` handshake reply.
pub const PROTOCOL_VERSION: &str = "1.8.2";

const MAX_LINE_LENGTH: usize = 64 * 1024;

// ── Inbound requests ─────────────────────────────────────────────────

/// A request sent by the broker to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Data provider initialization handshake.
    Init { id: String },
    /// The broker wants pushes for `item`.
    Subscribe { id: String, item: String },
    /// The broker no longer wants pushes for `item`.
    Unsubscribe { id: String, item: String },
    /// Idle-connection heartbeat.
    KeepAlive,
    /// The broker is closing the session.
    Close { reason: Option<String> },
}

impl Request {
    /// Parse one protocol line (without its terminator).
    pub fn parse(line: &str) -> Result<Self, Error> {
        let mut parts = line.split('|');
        let method = parts.next().unwrap_or_default();

        match method {
            "KEEPALIVE" => Ok(Self::KeepAlive),
            "CLOSE" => {
                // CLOSE|S|reason|S|<text>
                let params: Vec<&str> = parts.collect();
                let reason = params
                    .iter()
                    .position(|p| *p == "reason")
                    .and_then(|i| params.get(i + 2))
                    .and_then(|value| decode_token(value).ok().flatten());
                Ok(Self::Close { reason })
            }
            "DPI" => {
                let id = required(parts.next(), line, "missing request id")?;
                Ok(Self::Init { id: id.to_owned() })
            }
            "SUB" | "USB" => {
                let id = required(parts.next(), line, "missing request id")?;
                let tag = required(parts.next(), line, "missing item type")?;
                if tag != "S" {
                    return Err(protocol(line, "item must be a string token"));
                }
                let raw = required(parts.next(), line, "missing item name")?;
                let item = decode_token(raw)?
                    .ok_or_else(|| protocol(line, "item name is null"))?;

                let id = id.to_owned();
                Ok(if method == "SUB" {
                    Self::Subscribe { id, item }
                } else {
                    Self::Unsubscribe { id, item }
                })
            }
            other => Err(protocol(line, &format!("unknown method {other:?}"))),
        }
    }
}

fn required<'a>(part: Option<&'a str>, line: &str, reason: &str) -> Result<&'a str, Error> {
    match part {
        Some(p) if !p.is_empty() => Ok(p),
        _ => Err(protocol(line, reason)),
    }
}

fn protocol(line: &str, reason: &str) -> Error {
    Error::Protocol {
        line: line.to_owned(),
        reason: reason.to_owned(),
    }
}

// ── Outbound messages ────────────────────────────────────────────────

/// A message written by the adapter to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    InitOk { id: String },
    SubscribeOk { id: String },
    SubscribeErr { id: String, message: String },
    UnsubscribeOk { id: String },
    /// Field values for `item`, tied to the `SUB` request that opened it.
    Update {
        item: String,
        sub_id: String,
        snapshot: bool,
        fields: Vec<(String, String)>,
    },
    KeepAlive,
}

impl Outbound {
    /// Render this message as one protocol line (without terminator).
    pub fn encode(&self) -> String {
        match self {
            Self::InitOk { id } => {
                format!("DPI|{id}|S|ARI.version|S|{PROTOCOL_VERSION}")
            }
            Self::SubscribeOk { id } => format!("SUB|{id}|V"),
            Self::SubscribeErr { id, message } => {
                format!("SUB|{id}|E|{}", encode_token(Some(message)))
            }
            Self::UnsubscribeOk { id } => format!("USB|{id}|V"),
            Self::Update {
                item,
                sub_id,
                snapshot,
                fields,
            } => {
                let mut line = format!(
                    "UD3|S|{}|S|{}|B|{}",
                    encode_token(Some(item)),
                    encode_token(Some(sub_id)),
                    u8::from(*snapshot)
                );
                for (name, value) in fields {
                    line.push_str("|S|");
                    line.push_str(&encode_token(Some(name)));
                    line.push_str("|S|");
                    line.push_str(&encode_token(Some(value)));
                }
                line
            }
            Self::KeepAlive => "KEEPALIVE".to_owned(),
        }
    }
}

// ── Token encoding ───────────────────────────────────────────────────

/// Encode a string token: `#` for null, `$` for empty, percent-escapes
/// for everything outside the unreserved set.
pub fn encode_token(value: Option<&str>) -> Cow<'_, str> {
    match value {
        None => Cow::Borrowed("#"),
        Some("") => Cow::Borrowed("$"),
        Some(value) => urlencoding::encode(value),
    }
}

/// Decode a string token produced by [`encode_token`].
pub fn decode_token(raw: &str) -> Result<Option<String>, Error> {
    match raw {
        "#" => Ok(None),
        "$" => Ok(Some(String::new())),
        _ => urlencoding::decode(raw)
            .map(|decoded| Some(decoded.into_owned()))
            .map_err(|_| protocol(raw, "escaped token is not UTF-8")),
    }
}

// ── Framing ──────────────────────────────────────────────────────────

/// Line codec for the broker connection.
///
/// Decodes LF or CRLF terminated lines; encodes with CRLF.
#[derive(Debug)]
pub struct LineCodec {
    lines: LinesCodec,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Error> {
        self.lines.decode(src).map_err(codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, Error> {
        self.lines.decode_eof(src).map_err(codec_error)
    }
}

impl Encoder<String> for LineCodec {
    type Error = Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Error> {
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

fn codec_error(err: LinesCodecError) -> Error {
    match err {
        LinesCodecError::MaxLineLengthExceeded => Error::Protocol {
            line: String::new(),
            reason: format!("line longer than {MAX_LINE_LENGTH} bytes"),
        },
        LinesCodecError::Io(e) => Error::Io(e),
    }
}
