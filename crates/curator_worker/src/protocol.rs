//! Length-prefixed bincode frames exchanged with worker processes.
//!
//! Each frame is a 4-byte little-endian payload length followed by the
//! bincode-encoded message. The curator sends [`Request`]s on the worker's
//! stdin and reads [`Response`]s from its stdout.

use std::io::{ErrorKind, Read, Write};

use curator_common::ContentHash;
use curator_diagnostics::LogEntry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::WorkerError;
use crate::job::JobRequest;

/// Frames larger than this are rejected as corrupt.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Messages sent to a worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Health check; answered with [`Response::Pong`].
    Ping,
    /// Run one job; answered with [`Response::Done`].
    Run(JobRequest),
    /// Exit the serve loop.
    Shutdown,
}

/// Messages sent by a worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Answer to [`Request::Ping`].
    Pong,
    /// Result of a [`Request::Run`].
    Done(WorkResult),
}

/// Result a worker reports for a job it completed without crashing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkResult {
    /// The output was written with this hash in its header.
    Success(ContentHash),
    /// The transform failed with these entries.
    Failure(Vec<LogEntry>),
}

/// Writes one frame and flushes the writer.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), WorkerError> {
    let payload = bincode::serde::encode_to_vec(message, bincode::config::standard()).map_err(
        |e| WorkerError::Protocol {
            reason: e.to_string(),
        },
    )?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(WorkerError::Protocol {
            reason: format!("frame of {} bytes exceeds the limit", payload.len()),
        });
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame. Returns `Ok(None)` on a clean end of stream before the
/// first byte of a frame.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, WorkerError> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WorkerError::Protocol {
            reason: format!("frame of {len} bytes exceeds the limit"),
        });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let (message, _) = bincode::serde::decode_from_slice(&payload, bincode::config::standard())
        .map_err(|e| WorkerError::Protocol {
            reason: e.to_string(),
        })?;
    Ok(Some(message))
}
