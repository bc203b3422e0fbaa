// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

//! Memcached binary protocol framing.
//!
//! Every frame starts with a fixed 24-byte header; multi-byte scalars travel
//! big-endian:
//!
//! ```text
//! magic | opcode | key length (u16)
//! extras length (u8) | datatype | vbucket id or status (u16)
//! total body length (u32)
//! opaque (u32)
//! cas (u64)
//! ```
//!
//! followed by `extras || key || value`, where the value length is the total
//! body length minus extras and key.

use std::fmt;

use vbcache_core::{Error, GrowBuf, Status};

pub const HEADER_LEN: usize = 24;
pub const MAGIC_REQUEST: u8 = 0x80;
pub const MAGIC_RESPONSE: u8 = 0x81;
pub const DATATYPE_RAW: u8 = 0x00;

/// TAP_CONNECT flag: replay stored items from the backfill date carried as a
/// u64 in the request value (zero means everything) before live mutations.
pub const TAP_CONNECT_BACKFILL: u32 = 0x01;

/// Wire status words carried in a response header.
pub mod wire {
    pub const SUCCESS: u16 = 0x0000;
    pub const KEY_ENOENT: u16 = 0x0001;
    pub const KEY_EEXISTS: u16 = 0x0002;
    pub const E2BIG: u16 = 0x0003;
    pub const EINVAL: u16 = 0x0004;
    pub const NOT_STORED: u16 = 0x0005;
    pub const DELTA_BADVAL: u16 = 0x0006;
    pub const AUTH_ERROR: u16 = 0x0020;
    pub const AUTH_CONTINUE: u16 = 0x0021;
}

/// Maps a wire status word onto the callback-visible status. Anything the
/// client does not recognize reports as a protocol error for that operation.
pub fn status_from_wire(code: u16) -> Status {
    match code {
        wire::SUCCESS => Status::Success,
        wire::KEY_ENOENT => Status::KeyEnoent,
        wire::KEY_EEXISTS => Status::KeyEexists,
        wire::E2BIG => Status::E2big,
        wire::EINVAL => Status::Einval,
        wire::NOT_STORED => Status::NotStored,
        wire::DELTA_BADVAL => Status::DeltaBadval,
        wire::AUTH_ERROR => Status::AuthError,
        wire::AUTH_CONTINUE => Status::AuthContinue,
        _ => Status::ProtocolError,
    }
}

/// The opcodes this client speaks. Values are fixed by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
    Increment = 0x05,
    Decrement = 0x06,
    Getq = 0x09,
    Noop = 0x0a,
    Append = 0x0e,
    Prepend = 0x0f,
    Gatq = 0x1d,
    SaslListMechs = 0x20,
    SaslAuth = 0x21,
    SaslStep = 0x22,
    TapConnect = 0x40,
    TapMutation = 0x41,
    TapDelete = 0x42,
    TapFlush = 0x43,
    TapOpaque = 0x44,
}

impl Opcode {
    pub fn from_wire(op: u8) -> Option<Opcode> {
        Some(match op {
            0x01 => Opcode::Set,
            0x02 => Opcode::Add,
            0x03 => Opcode::Replace,
            0x04 => Opcode::Delete,
            0x05 => Opcode::Increment,
            0x06 => Opcode::Decrement,
            0x09 => Opcode::Getq,
            0x0a => Opcode::Noop,
            0x0e => Opcode::Append,
            0x0f => Opcode::Prepend,
            0x1d => Opcode::Gatq,
            0x20 => Opcode::SaslListMechs,
            0x21 => Opcode::SaslAuth,
            0x22 => Opcode::SaslStep,
            0x40 => Opcode::TapConnect,
            0x41 => Opcode::TapMutation,
            0x42 => Opcode::TapDelete,
            0x43 => Opcode::TapFlush,
            0x44 => Opcode::TapOpaque,
            _ => return None,
        })
    }

    /// Quiet gets reply only on a hit; silence is the miss.
    pub fn is_quiet_get(self) -> bool {
        matches!(self, Opcode::Getq | Opcode::Gatq)
    }

    pub fn is_sasl(self) -> bool {
        matches!(self, Opcode::SaslListMechs | Opcode::SaslAuth | Opcode::SaslStep)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    BadMagic(u8),
    Truncated,
    /// Extras plus key exceed the declared body length.
    BadLengths,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::BadMagic(m) => write!(f, "bad magic byte {:#04x}", m),
            FrameError::Truncated => write!(f, "frame shorter than its header claims"),
            FrameError::BadLengths => write!(f, "extras and key exceed body length"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Extras layouts for the opcodes this client emits or parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extras {
    None,
    /// A bare u32 flags word: get responses and TAP_CONNECT requests.
    Flags { flags: u32 },
    /// SET / ADD / REPLACE requests: user flags, then expiry.
    Store { flags: u32, expiry: u32 },
    /// INCR / DECR requests: delta, initial value, expiry. An expiry of
    /// `0xffff_ffff` tells the server not to create the key.
    Arithmetic { delta: u64, initial: u64, expiry: u32 },
    /// GATQ requests: the new expiry.
    Touch { expiry: u32 },
    /// TAP item metadata (16 bytes); only the item flags and expiry at
    /// offsets 8 and 12 matter to this client.
    TapItem { flags: u32, expiry: u32 },
}

impl Extras {
    pub fn wire_len(&self) -> u8 {
        match self {
            Extras::None => 0,
            Extras::Flags { .. } => 4,
            Extras::Store { .. } => 8,
            Extras::Arithmetic { .. } => 20,
            Extras::Touch { .. } => 4,
            Extras::TapItem { .. } => 16,
        }
    }

    fn write(&self, out: &mut GrowBuf) -> Result<(), Error> {
        match *self {
            Extras::None => {}
            Extras::Flags { flags } => out.append(&flags.to_be_bytes())?,
            Extras::Store { flags, expiry } => {
                out.append(&flags.to_be_bytes())?;
                out.append(&expiry.to_be_bytes())?;
            }
            Extras::Arithmetic { delta, initial, expiry } => {
                out.append(&delta.to_be_bytes())?;
                out.append(&initial.to_be_bytes())?;
                out.append(&expiry.to_be_bytes())?;
            }
            Extras::Touch { expiry } => out.append(&expiry.to_be_bytes())?,
            Extras::TapItem { flags, expiry } => {
                out.append(&[0u8; 8])?;
                out.append(&flags.to_be_bytes())?;
                out.append(&expiry.to_be_bytes())?;
            }
        }
        Ok(())
    }
}

/// An outbound request frame.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub opcode: Opcode,
    pub vbucket: u16,
    pub opaque: u32,
    pub cas: u64,
    pub extras: Extras,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl Request<'_> {
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.extras.wire_len() as usize + self.key.len() + self.value.len()
    }

    pub fn encode_into(&self, out: &mut GrowBuf) -> Result<(), Error> {
        encode(
            out,
            MAGIC_REQUEST,
            self.opcode as u8,
            self.vbucket,
            self.opaque,
            self.cas,
            &self.extras,
            self.key,
            self.value,
        )
    }
}

/// An outbound response frame; the client only builds these in tests and
/// tooling that impersonate a server.
#[derive(Debug, Clone, Copy)]
pub struct Response<'a> {
    pub opcode: Opcode,
    pub status: u16,
    pub opaque: u32,
    pub cas: u64,
    pub extras: Extras,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl Response<'_> {
    pub fn encode_into(&self, out: &mut GrowBuf) -> Result<(), Error> {
        encode(
            out,
            MAGIC_RESPONSE,
            self.opcode as u8,
            self.status,
            self.opaque,
            self.cas,
            &self.extras,
            self.key,
            self.value,
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn encode(
    out: &mut GrowBuf,
    magic: u8,
    opcode: u8,
    field: u16,
    opaque: u32,
    cas: u64,
    extras: &Extras,
    key: &[u8],
    value: &[u8],
) -> Result<(), Error> {
    let extlen = extras.wire_len();
    let bodylen = extlen as u32 + key.len() as u32 + value.len() as u32;
    out.ensure(HEADER_LEN + bodylen as usize)?;

    let mut header = [0u8; HEADER_LEN];
    header[0] = magic;
    header[1] = opcode;
    header[2..4].copy_from_slice(&(key.len() as u16).to_be_bytes());
    header[4] = extlen;
    header[5] = DATATYPE_RAW;
    header[6..8].copy_from_slice(&field.to_be_bytes());
    header[8..12].copy_from_slice(&bodylen.to_be_bytes());
    header[12..16].copy_from_slice(&opaque.to_be_bytes());
    header[16..24].copy_from_slice(&cas.to_be_bytes());
    out.append(&header)?;

    extras.write(out)?;
    out.append(key)?;
    out.append(value)?;
    Ok(())
}

fn be_u16(b: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([b[at], b[at + 1]])
}

fn be_u32(b: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn be_u64(b: &[u8], at: usize) -> u64 {
    u64::from_be_bytes([
        b[at],
        b[at + 1],
        b[at + 2],
        b[at + 3],
        b[at + 4],
        b[at + 5],
        b[at + 6],
        b[at + 7],
    ])
}

/// Total length of the frame at the front of `buf`, once the header is
/// visible. Works for both magics; `None` means keep reading.
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    Some(HEADER_LEN + be_u32(buf, 8) as usize)
}

/// Borrowed view over one complete request frame.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    pub opcode: u8,
    pub vbucket: u16,
    pub opaque: u32,
    pub cas: u64,
    pub extras: &'a [u8],
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl RequestView<'_> {
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.extras.len() + self.key.len() + self.value.len()
    }
}

/// Borrowed view over one complete response frame.
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'a> {
    pub opcode: u8,
    pub status: u16,
    pub opaque: u32,
    pub cas: u64,
    pub extras: &'a [u8],
    pub key: &'a [u8],
    pub value: &'a [u8],
}

struct RawFrame<'a> {
    opcode: u8,
    field: u16,
    opaque: u32,
    cas: u64,
    extras: &'a [u8],
    key: &'a [u8],
    value: &'a [u8],
}

fn parse(buf: &[u8], magic: u8) -> Result<RawFrame<'_>, FrameError> {
    if buf.len() < HEADER_LEN {
        return Err(FrameError::Truncated);
    }
    if buf[0] != magic {
        return Err(FrameError::BadMagic(buf[0]));
    }
    let keylen = be_u16(buf, 2) as usize;
    let extlen = buf[4] as usize;
    let bodylen = be_u32(buf, 8) as usize;
    if buf.len() < HEADER_LEN + bodylen {
        return Err(FrameError::Truncated);
    }
    if extlen + keylen > bodylen {
        return Err(FrameError::BadLengths);
    }
    let body = &buf[HEADER_LEN..HEADER_LEN + bodylen];
    Ok(RawFrame {
        opcode: buf[1],
        field: be_u16(buf, 6),
        opaque: be_u32(buf, 12),
        cas: be_u64(buf, 16),
        extras: &body[..extlen],
        key: &body[extlen..extlen + keylen],
        value: &body[extlen + keylen..],
    })
}

/// Parses the complete request frame at the front of `buf`.
pub fn parse_request(buf: &[u8]) -> Result<RequestView<'_>, FrameError> {
    let raw = parse(buf, MAGIC_REQUEST)?;
    Ok(RequestView {
        opcode: raw.opcode,
        vbucket: raw.field,
        opaque: raw.opaque,
        cas: raw.cas,
        extras: raw.extras,
        key: raw.key,
        value: raw.value,
    })
}

/// Parses the complete response frame at the front of `buf`.
pub fn parse_response(buf: &[u8]) -> Result<ResponseView<'_>, FrameError> {
    let raw = parse(buf, MAGIC_RESPONSE)?;
    Ok(ResponseView {
        opcode: raw.opcode,
        status: raw.field,
        opaque: raw.opaque,
        cas: raw.cas,
        extras: raw.extras,
        key: raw.key,
        value: raw.value,
    })
}

/// Item flags from a get response's extras, zero when absent.
pub fn response_flags(extras: &[u8]) -> u32 {
    if extras.len() >= 4 {
        be_u32(extras, 0)
    } else {
        0
    }
}

/// Counter value from an arithmetic response body, zero when absent.
pub fn response_counter(value: &[u8]) -> u64 {
    if value.len() >= 8 {
        be_u64(value, 0)
    } else {
        0
    }
}

/// Item flags and expiry from TAP item metadata extras.
pub fn tap_item_meta(extras: &[u8]) -> (u32, u32) {
    if extras.len() >= 16 {
        (be_u32(extras, 8), be_u32(extras, 12))
    } else {
        (0, 0)
    }
}
