//! Ingestion boundary
//!
//! The broker client itself (connections, offsets, consumer-group rebalance)
//! lives outside this crate; everything upstream is reached through the
//! [`FlowSource`] trait. Delivery is at-least-once, so duplicates are
//! possible after a restart and downstream aggregation stays idempotent.

pub mod window;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::error::PipelineError;

// ============================================================================
// SOURCE TRAIT
// ============================================================================

/// Pull-based message source feeding the window batcher.
pub trait FlowSource {
    /// Block up to `timeout` for the next message payload.
    ///
    /// `Ok(None)` means no message arrived within the timeout (keep polling);
    /// `Err(QueueUnavailable)` means the stream has ended or the broker is
    /// unreachable, and consumption must stop with a signal, never silently.
    fn poll(&mut self, timeout: Duration) -> Result<Option<String>, PipelineError>;
}

// ============================================================================
// CHANNEL SOURCE
// ============================================================================

/// Adapter over an in-process channel; the external consumer thread owns the
/// broker connection and pushes decoded payload strings here.
pub struct ChannelSource {
    receiver: Receiver<String>,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<String>) -> Self {
        Self { receiver }
    }
}

impl FlowSource for ChannelSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<String>, PipelineError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(payload) => Ok(Some(payload)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(PipelineError::QueueUnavailable("producer disconnected".into()))
            }
        }
    }
}

// ============================================================================
// JSONL REPLAY SOURCE
// ============================================================================

/// Replays flow records from a JSONL capture, one message per line.
/// Used for local runs and integration tests.
pub struct JsonlSource {
    lines: std::io::Lines<BufReader<File>>,
}

impl JsonlSource {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self { lines: BufReader::new(file).lines() })
    }
}

impl FlowSource for JsonlSource {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<String>, PipelineError> {
        loop {
            match self.lines.next() {
                Some(Ok(line)) if line.trim().is_empty() => continue,
                Some(Ok(line)) => return Ok(Some(line)),
                Some(Err(e)) => {
                    return Err(PipelineError::QueueUnavailable(format!("replay read: {}", e)))
                }
                None => {
                    return Err(PipelineError::QueueUnavailable("replay exhausted".into()))
                }
            }
        }
    }
}

// ============================================================================
// STDIN SOURCE
// ============================================================================

/// Consumes one JSON message per line from stdin, so a broker console
/// consumer can be piped straight in. Blocks on input regardless of the
/// poll timeout; EOF ends the stream.
pub struct StdinSource {
    lines: std::io::Lines<BufReader<std::io::Stdin>>,
}

impl StdinSource {
    pub fn new() -> Self {
        Self { lines: BufReader::new(std::io::stdin()).lines() }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowSource for StdinSource {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<String>, PipelineError> {
        loop {
            match self.lines.next() {
                Some(Ok(line)) if line.trim().is_empty() => continue,
                Some(Ok(line)) => return Ok(Some(line)),
                Some(Err(e)) => {
                    return Err(PipelineError::QueueUnavailable(format!("stdin read: {}", e)))
                }
                None => return Err(PipelineError::QueueUnavailable("stdin closed".into())),
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::mpsc;

    #[test]
    fn test_channel_source_delivers_then_signals_disconnect() {
        let (tx, rx) = mpsc::channel();
        let mut source = ChannelSource::new(rx);

        tx.send("{\"a\":1}".to_string()).unwrap();
        assert_eq!(
            source.poll(Duration::from_millis(10)).unwrap(),
            Some("{\"a\":1}".to_string())
        );

        drop(tx);
        assert!(matches!(
            source.poll(Duration::from_millis(10)),
            Err(PipelineError::QueueUnavailable(_))
        ));
    }

    #[test]
    fn test_channel_source_timeout_is_not_an_error() {
        let (_tx, rx) = mpsc::channel::<String>();
        let mut source = ChannelSource::new(rx);
        assert_eq!(source.poll(Duration::from_millis(5)).unwrap(), None);
    }

    #[test]
    fn test_jsonl_source_skips_blank_lines_and_exhausts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"x\":1}}").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{{\"x\":2}}").unwrap();

        let mut source = JsonlSource::open(file.path()).unwrap();
        assert_eq!(source.poll(Duration::ZERO).unwrap(), Some("{\"x\":1}".into()));
        assert_eq!(source.poll(Duration::ZERO).unwrap(), Some("{\"x\":2}".into()));
        assert!(matches!(
            source.poll(Duration::ZERO),
            Err(PipelineError::QueueUnavailable(_))
        ));
    }
}
