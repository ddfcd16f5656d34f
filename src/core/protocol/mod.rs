// src/core/protocol/mod.rs

//! The wire protocol: a compact, length-prefixed, opcode-dispatched
//! request/reply frame format with appended bulk payload.

pub mod message;

pub use message::{HEADER_SIZE, Message, MessageFlags, MessageOp};
