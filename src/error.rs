use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the transport core.
#[derive(Debug, Error)]
pub enum NetError {
    /// Invalid construction parameters. Fatal for the component being built.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `try_push` found no room for the message.
    #[error("outgoing ring buffer is full ({needed} bytes needed, {free} free)")]
    BufferFull { needed: usize, free: usize },

    /// `push_timeout` gave up waiting for free space.
    #[error("timed out after {0:?} waiting for space in the outgoing ring buffer")]
    Timeout(Duration),

    #[error("message {message_type}/{subtype} is {size} bytes, larger than the maximum of {max} bytes")]
    MessageTooLarge {
        message_type: u8,
        subtype: u8,
        size: usize,
        max: usize,
    },

    /// The bytes a message exported differ from its declared payload length.
    #[error(
        "serialization size mismatch for message {message_type}/{subtype}: declared {expected} bytes, exported {written}"
    )]
    SerializationSizeMismatch {
        message_type: u8,
        subtype: u8,
        expected: usize,
        written: usize,
    },

    /// Header names a (type, subtype) pair the directory does not know.
    #[error("invalid message type {message_type}, subtype {subtype}: not registered, stream corrupted? next bytes: {excerpt}")]
    UnknownMessageType {
        message_type: u8,
        subtype: u8,
        excerpt: String,
    },

    /// A decoded payload did not consume exactly the length announced in its header.
    #[error(
        "payload size mismatch for message {message_type}/{subtype} (id {message_id}): header declares {declared} bytes, message read {actual}"
    )]
    PayloadSizeMismatch {
        message_type: u8,
        subtype: u8,
        message_id: u32,
        declared: usize,
        actual: usize,
    },

    #[error("corrupted stream: {0}")]
    Corrupted(String),

    /// The pipe saw corruption earlier and refuses further input.
    #[error("incoming pipe for connection {0} is corrupted and no longer accepts buffers")]
    PipeCorrupted(u16),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl NetError {
    pub fn config(msg: impl Into<String>) -> Self {
        NetError::Config(msg.into())
    }
}

/// An exporter ran out of room before the value was fully written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("exporter overflow")]
pub struct Overflow;

/// Failure of a single import operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ImportError {
    /// Not enough bytes; progress has been recorded and the read can resume later.
    #[error("buffer underflow")]
    Underflow,
    #[error("malformed value: {0}")]
    Malformed(&'static str),
}
