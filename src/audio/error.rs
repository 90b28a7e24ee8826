//! Sink error types
//!
//! Only session lifecycle (init, start, term) can fail. The producer and
//! consumer paths absorb every runtime condition locally.

use thiserror::Error;

/// Errors that can occur while setting up or controlling a sink session
#[derive(Error, Debug)]
pub enum SinkError {
    /// No audio output device available
    #[error("No audio output device found")]
    NoDevice,

    /// A named device was requested but not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// The device refused to open or report its configuration
    #[error("Failed to open audio device: {0}")]
    DeviceOpen(String),

    /// The requested channel count was rejected by the device
    #[error("Unsupported channel configuration: {0} channels")]
    UnsupportedChannels(u16),

    /// The device cannot deliver 32-bit float interleaved output
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Failed to build the output stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    /// Failed to start or pause the output stream
    #[error("Failed to control audio stream: {0}")]
    StreamPlay(String),

    /// Ring buffer storage could not be allocated
    #[error("Failed to allocate ring buffer: {frames} frames x {channels} channels")]
    Allocation { frames: usize, channels: usize },

    /// Settings are out of range
    #[error("Invalid sink configuration: {0}")]
    InvalidConfig(String),

    /// A stream operation was attempted before `open`
    #[error("Audio device is not open")]
    NotOpen,
}

/// Result type for sink lifecycle operations
pub type SinkResult<T> = Result<T, SinkError>;
