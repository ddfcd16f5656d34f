// src/core/protocol/message.rs

//! Implements the length-prefixed message frame exchanged between clients and
//! servers, together with its async send/receive routines.
//!
//! Frame layout, all integers little-endian:
//!
//! ```text
//! | op:u32 | flags:u32 | count:u32 | total-length:u32 | payload ... | [appended bulk] |
//! ```
//!
//! `total-length` covers only the packed operations payload. Bulk segments
//! (object write data) are written to the stream after the payload; the
//! receiver consumes them guided by the lengths packed in the payload.
//! A reply reuses the sender's opcode with the reply bit set in the op word.

use crate::core::JasperError;
use crate::core::semantics::{Safety, Semantics};
use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use strum_macros::FromRepr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// The fixed size of the frame header.
pub const HEADER_SIZE: usize = 16;

/// Marks a frame as a reply to a request carrying the same opcode.
const REPLY_BIT: u32 = 0x8000_0000;

// Protocol-level limit to prevent denial-of-service from malformed frames.
const MAX_PAYLOAD_SIZE: u32 = 256 * 1024 * 1024; // 256MB max packed payload.

/// The operation a frame requests (or, with the reply bit, answers).
#[derive(FromRepr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageOp {
    None = 0,
    ObjectCreate = 1,
    ObjectDelete = 2,
    ObjectRead = 3,
    ObjectWrite = 4,
    ObjectStatus = 5,
    KvPut = 6,
    KvDelete = 7,
    KvGet = 8,
}

bitflags! {
    /// Per-frame flags derived from the batch semantics.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MessageFlags: u32 {
        /// The receiver must produce a reply.
        const SAFETY_NETWORK = 1 << 0;
        /// The receiver must flush to stable storage before replying.
        const SAFETY_STORAGE = 1 << 1;
    }
}

/// A single wire frame under construction or decoding.
///
/// The same value is reusable across receive cycles; `receive` resets all
/// per-frame state. Strings are NUL-terminated in the payload.
#[derive(Debug)]
pub struct Message {
    op: MessageOp,
    reply: bool,
    flags: MessageFlags,
    count: u32,
    payload: BytesMut,
    bulk: Vec<Bytes>,
    cursor: usize,
}

impl Message {
    /// Creates a new, empty request frame for the given opcode.
    pub fn new(op: MessageOp) -> Self {
        Self {
            op,
            reply: false,
            flags: MessageFlags::empty(),
            count: 0,
            payload: BytesMut::new(),
            bulk: Vec::new(),
            cursor: 0,
        }
    }

    /// Creates a reply frame answering `request`. The opcode is reused with
    /// the reply bit set.
    pub fn new_reply(request: &Message) -> Self {
        let mut reply = Self::new(request.op);
        reply.reply = true;
        reply
    }

    pub fn op(&self) -> MessageOp {
        self.op
    }

    pub fn is_reply(&self) -> bool {
        self.reply
    }

    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    /// The number of logical operations packed into this frame.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Whether the flags demand that the receiver produce a reply.
    pub fn wants_reply(&self) -> bool {
        self.flags.contains(MessageFlags::SAFETY_NETWORK)
    }

    /// Derives the safety class a receiver must honor from the flags.
    pub fn safety(&self) -> Safety {
        if self.flags.contains(MessageFlags::SAFETY_STORAGE) {
            Safety::Storage
        } else if self.flags.contains(MessageFlags::SAFETY_NETWORK) {
            Safety::Network
        } else {
            Safety::None
        }
    }

    /// Applies the effective safety of `semantics` to the frame flags.
    pub fn set_safety(&mut self, semantics: &Semantics) {
        self.apply_safety(semantics.effective_safety());
    }

    /// Raises the frame's safety to at least `safety`. Never downgrades.
    pub fn force_safety(&mut self, safety: Safety) {
        self.apply_safety(self.safety().max(safety));
    }

    fn apply_safety(&mut self, safety: Safety) {
        match safety {
            Safety::None => {}
            Safety::Network => self.flags |= MessageFlags::SAFETY_NETWORK,
            Safety::Storage => {
                self.flags |= MessageFlags::SAFETY_NETWORK | MessageFlags::SAFETY_STORAGE
            }
        }
    }

    /// Starts a new logical operation in the payload.
    pub fn add_operation(&mut self) {
        self.count += 1;
    }

    /// Appends a NUL-terminated string to the payload.
    pub fn append_str(&mut self, s: &str) {
        debug_assert!(!s.as_bytes().contains(&0));
        self.payload.extend_from_slice(s.as_bytes());
        self.payload.put_u8(0);
    }

    pub fn append_u32(&mut self, value: u32) {
        self.payload.put_u32_le(value);
    }

    pub fn append_u64(&mut self, value: u64) {
        self.payload.put_u64_le(value);
    }

    pub fn append_i64(&mut self, value: i64) {
        self.payload.put_i64_le(value);
    }

    /// Appends raw bytes inline into the payload (KV values).
    pub fn append_bytes(&mut self, data: &[u8]) {
        self.payload.extend_from_slice(data);
    }

    /// Queues a bulk segment to be written after the payload (object data).
    pub fn append_bulk(&mut self, data: Bytes) {
        self.bulk.push(data);
    }

    // --- Decoding accessors; they consume the payload left to right. ---

    /// Reads a NUL-terminated string from the payload.
    pub fn get_str(&mut self) -> Result<String, JasperError> {
        let rest = &self.payload[self.cursor..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| JasperError::Protocol("unterminated string in payload".to_string()))?;
        let s = std::str::from_utf8(&rest[..nul])?.to_string();
        self.cursor += nul + 1;
        Ok(s)
    }

    pub fn get_u32(&mut self) -> Result<u32, JasperError> {
        self.take(4).map(|mut b| b.get_u32_le())
    }

    pub fn get_u64(&mut self) -> Result<u64, JasperError> {
        self.take(8).map(|mut b| b.get_u64_le())
    }

    pub fn get_i64(&mut self) -> Result<i64, JasperError> {
        self.take(8).map(|mut b| b.get_i64_le())
    }

    /// Reads `len` raw bytes from the payload.
    pub fn get_bytes(&mut self, len: usize) -> Result<Bytes, JasperError> {
        self.take(len).map(Bytes::copy_from_slice)
    }

    fn take(&mut self, len: usize) -> Result<&[u8], JasperError> {
        if self.payload.len() - self.cursor < len {
            return Err(JasperError::IncompleteFrame);
        }
        let slice = &self.payload[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    // --- Wire I/O ---

    /// Writes the frame to `stream`: header, payload, then bulk segments.
    pub async fn send<S>(&self, stream: &mut S) -> Result<(), JasperError>
    where
        S: AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        self.encode_header(&mut buf);
        buf.extend_from_slice(&self.payload);
        stream.write_all(&buf).await?;
        for segment in &self.bulk {
            stream.write_all(segment).await?;
        }
        stream.flush().await?;
        Ok(())
    }

    /// Reads one frame from `stream`, replacing this message's contents.
    ///
    /// Only the header and the packed payload are consumed; appended bulk
    /// stays in the stream for the caller to read guided by the payload.
    pub async fn receive<S>(&mut self, stream: &mut S) -> Result<(), JasperError>
    where
        S: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_SIZE];
        stream.read_exact(&mut header).await?;
        let (op, reply, flags, count, length) = Self::decode_header(&header)?;

        self.op = op;
        self.reply = reply;
        self.flags = flags;
        self.count = count;
        self.payload.clear();
        self.payload.resize(length as usize, 0);
        stream.read_exact(&mut self.payload).await?;
        self.bulk.clear();
        self.cursor = 0;
        Ok(())
    }

    fn encode_header(&self, dst: &mut BytesMut) {
        let op_word = self.op as u32 | if self.reply { REPLY_BIT } else { 0 };
        dst.put_u32_le(op_word);
        dst.put_u32_le(self.flags.bits());
        dst.put_u32_le(self.count);
        dst.put_u32_le(self.payload.len() as u32);
    }

    fn decode_header(
        src: &[u8; HEADER_SIZE],
    ) -> Result<(MessageOp, bool, MessageFlags, u32, u32), JasperError> {
        let mut buf = &src[..];
        let op_word = buf.get_u32_le();
        let reply = op_word & REPLY_BIT != 0;
        let opcode = op_word & !REPLY_BIT;
        let op = MessageOp::from_repr(opcode).ok_or(JasperError::UnknownOpcode(opcode))?;
        let flags = MessageFlags::from_bits(buf.get_u32_le())
            .ok_or_else(|| JasperError::Protocol("unknown flag bits".to_string()))?;
        let count = buf.get_u32_le();
        let length = buf.get_u32_le();
        if length > MAX_PAYLOAD_SIZE {
            return Err(JasperError::Protocol(format!(
                "oversized payload ({length} bytes)"
            )));
        }
        Ok((op, reply, flags, count, length))
    }
}
