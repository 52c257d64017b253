//! Wire protocol exchanged between a process and its lock worker.
//!
//! Messages are newline-delimited JSON over an anonymous pipe, mirroring the
//! `multiprocessing.Pipe` message protocol of the original implementation
//! this crate was distilled from: the worker reports exactly one
//! [`WorkerMessage`] and then, only after [`WorkerMessage::Locked`], waits
//! for a single [`ControlMessage::Unlock`] before exiting.

use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};

/// Outcome reported by the lock worker to its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) enum WorkerMessage {
    /// The lock was acquired in the requested mode.
    Locked,
    /// Shared acquisition was attempted on a nonexistent path.
    NotFound,
    /// Acquisition did not complete within the requested timeout.
    Timeout,
    /// Any other failure, carrying a human-readable description.
    Error(String),
}

/// Instruction sent from the parent to a held lock worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) enum ControlMessage {
    /// Release the lock and exit.
    Unlock,
}

/// Writes a single JSON message followed by a newline, flushing immediately.
pub(super) fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: Write,
    T: Serialize,
{
    let encoded = serde_json::to_string(message)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    writer.write_all(encoded.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Reads a single newline-delimited JSON message, blocking until one arrives.
///
/// Returns `Ok(None)` if the peer closed its end without sending anything.
pub(super) fn read_message<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: BufRead,
    T: for<'de> Deserialize<'de>,
{
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line)?;
    if bytes_read == 0 {
        return Ok(None);
    }
    let decoded = serde_json::from_str(line.trim_end())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    Ok(Some(decoded))
}
