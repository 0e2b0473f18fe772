//! Shared streaming drain loop.
//!
//! Both transports stream a job the same way and differ only in how a single
//! line reaches the wire, so the drain is written once against a
//! [`LineWriter`] seam. Delivery is strictly in emission order, cancellation
//! is cooperative and line-granular: the flag is checked before dequeuing a
//! line and again before issuing the write, and an already-issued write is
//! left to finish or fail on its own.

use crate::transport::{EventSender, StreamTiming, TransportEvent, INIT_COMMANDS, TRAILER_COMMANDS};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Failure modes of a single line write.
#[derive(Debug, Error)]
pub(crate) enum WriteError {
    /// The bounded write expired; counted, the stream continues.
    #[error("write timed out: {0}")]
    Timeout(String),
    /// The link failed hard; the stream aborts.
    #[error("link failure: {0}")]
    Link(String),
}

/// How a transport puts one line (newline appended) on the wire.
#[async_trait]
pub(crate) trait LineWriter: Send + Sync {
    async fn write_line(&self, line: &str) -> Result<(), WriteError>;
}

/// True for lines the streaming protocol skips without transmitting.
pub(crate) fn is_skippable(line: &str) -> bool {
    line.is_empty() || line.starts_with(';') || line.starts_with('(')
}

/// Drain one send job: init commands, paced payload, trailer. Reports
/// progress, completion, cancellation, and hard failures on the event
/// channel; never panics across the task boundary.
pub(crate) async fn stream_job(
    writer: Arc<dyn LineWriter>,
    lines: Vec<String>,
    cancel: Arc<AtomicBool>,
    events: EventSender,
    timing: StreamTiming,
) {
    for command in INIT_COMMANDS {
        if let Err(e) = writer.write_line(command).await {
            tracing::warn!(command, error = %e, "init command failed");
        }
        tokio::time::sleep(timing.init_delay).await;
    }

    let total = lines.len();
    let mut sent = 0usize;
    let mut errors = 0usize;

    for (index, raw) in lines.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            tracing::info!(line = index + 1, total, sent, "send cancelled");
            let _ = events.send(TransportEvent::Cancelled { sent });
            return;
        }

        let line = raw.trim();
        if is_skippable(line) {
            continue;
        }

        // Second check so a cancel request lands within one line's latency.
        if cancel.load(Ordering::SeqCst) {
            let _ = events.send(TransportEvent::Cancelled { sent });
            return;
        }

        match writer.write_line(line).await {
            Ok(()) => {}
            Err(WriteError::Timeout(reason)) => {
                errors += 1;
                tracing::warn!(line = index + 1, reason, "line write timed out");
            }
            Err(WriteError::Link(reason)) => {
                tracing::error!(line = index + 1, reason, "link lost, aborting stream");
                let _ = events.send(TransportEvent::Failed {
                    message: format!("link lost: {reason}"),
                });
                return;
            }
        }
        sent += 1;

        if (index + 1) % 5 == 0 {
            let _ = events.send(TransportEvent::Progress {
                sent,
                total,
                errors,
            });
        }

        tokio::time::sleep(timing.line_delay).await;
    }

    if cancel.load(Ordering::SeqCst) {
        let _ = events.send(TransportEvent::Cancelled { sent });
        return;
    }

    for command in TRAILER_COMMANDS {
        if let Err(e) = writer.write_line(command).await {
            tracing::warn!(command, error = %e, "trailing command failed");
        }
        tokio::time::sleep(timing.init_delay).await;
    }

    tracing::info!(sent, errors, "send completed");
    let _ = events.send(TransportEvent::Completed { sent, errors });
}
