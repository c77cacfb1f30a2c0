//! Errors reported by non-real-time engine operations
//!
//! The render path never fails; everything here comes back from
//! [`EngineHandle`](super::EngineHandle) edits so UI-driven actions can
//! degrade gracefully.

use thiserror::Error;

use crate::types::ChannelId;

/// Errors that can occur when editing the engine from a control thread
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// No channel with this id in the current layout
    #[error("Channel {0} not found")]
    ChannelNotFound(ChannelId),

    /// Master/preview channels cannot be armed, muted, soloed or removed
    #[error("Channel {0} is internal and cannot be edited this way")]
    InternalChannel(ChannelId),

    /// The operation needs a different kind of channel
    #[error("Channel {channel} is not a {expected} channel")]
    WrongChannelKind {
        channel: ChannelId,
        expected: &'static str,
    },

    /// Timing edits are refused while input is being recorded
    #[error("Input recording in progress")]
    InputRecording,

    /// Input recording was requested but no armed channel can take it
    #[error("No armed channel can record input")]
    NothingToRecord,

    /// Input recording is already stopped
    #[error("Input recording is not active")]
    NotRecording,

    /// The wave is empty or the range is outside it
    #[error("Invalid wave range: {begin}..{end} (wave has {len} frames)")]
    InvalidRange { begin: i64, end: i64, len: i64 },

    /// The lock-free command queue is full; the intent was dropped
    #[error("Command queue full, dropped: {0}")]
    QueueFull(&'static str),
}

/// Result type for engine control operations
pub type EngineResult<T> = Result<T, EngineError>;
