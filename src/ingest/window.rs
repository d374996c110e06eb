//! Window Batcher
//!
//! Groups the unbounded record stream into bounded micro-batches, by count or
//! by elapsed time. The batch duration spans the whole accumulation window,
//! from batch-open until hand-off, so downstream per-second rates are
//! normalized against real wall-clock time rather than just the final
//! processing step.

use std::time::{Duration, Instant};

use crate::error::PipelineError;
use crate::flow::FlowRecord;
use crate::ingest::FlowSource;

// ============================================================================
// POLICY
// ============================================================================

/// Windowing policy. Reference behavior: fixed-count windows of 5000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Emit when N records have accumulated
    Count(usize),
    /// Emit when T has elapsed since the window opened
    Time(Duration),
}

// ============================================================================
// BATCH
// ============================================================================

/// One closed window. Created here, consumed by one pipeline pass, discarded.
#[derive(Debug)]
pub struct Batch {
    pub records: Vec<FlowRecord>,
    /// Malformed messages excluded while assembling this window
    pub rejects: usize,
    /// Wall-clock interval from batch-open to hand-off
    pub duration: Duration,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// BATCHER
// ============================================================================

pub struct WindowBatcher {
    policy: WindowPolicy,
    poll_timeout: Duration,
    buffer: Vec<FlowRecord>,
    rejects: usize,
    opened_at: Option<Instant>,
    /// Source failure held back until buffered records have been flushed
    pending_err: Option<PipelineError>,
}

impl WindowBatcher {
    pub fn new(policy: WindowPolicy, poll_timeout: Duration) -> Self {
        Self {
            policy,
            poll_timeout,
            buffer: Vec::new(),
            rejects: 0,
            opened_at: None,
            pending_err: None,
        }
    }

    /// Pull from the source until the current window closes.
    ///
    /// On source failure any buffered records are handed down as a short
    /// final batch first; the failure itself surfaces on the next call.
    pub fn next_batch(
        &mut self,
        source: &mut dyn FlowSource,
    ) -> Result<Batch, PipelineError> {
        if let Some(err) = self.pending_err.take() {
            return Err(err);
        }

        loop {
            if self.window_full() {
                return Ok(self.close_window());
            }

            match source.poll(self.poll_timeout) {
                Ok(Some(payload)) => self.push(&payload),
                Ok(None) => {
                    // Idle poll; a time window may still close on elapsed time
                }
                Err(err) => {
                    if self.buffer.is_empty() {
                        return Err(err);
                    }
                    log::warn!("source failed mid-window, flushing {} buffered records", self.buffer.len());
                    self.pending_err = Some(err);
                    return Ok(self.close_window());
                }
            }
        }
    }

    fn push(&mut self, payload: &str) {
        if self.opened_at.is_none() {
            self.opened_at = Some(Instant::now());
        }
        match FlowRecord::from_json(payload) {
            Ok(record) => self.buffer.push(record),
            Err(e) => {
                log::warn!("malformed record excluded from window: {}", e);
                self.rejects += 1;
            }
        }
    }

    fn window_full(&self) -> bool {
        match self.policy {
            WindowPolicy::Count(n) => self.buffer.len() >= n,
            WindowPolicy::Time(t) => self
                .opened_at
                .map(|opened| opened.elapsed() >= t && !self.buffer.is_empty())
                .unwrap_or(false),
        }
    }

    fn close_window(&mut self) -> Batch {
        let duration = self
            .opened_at
            .take()
            .map(|opened| opened.elapsed())
            .unwrap_or_default();
        Batch {
            records: std::mem::take(&mut self.buffer),
            rejects: std::mem::take(&mut self.rejects),
            duration,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
