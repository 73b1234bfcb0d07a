//! The cross-thread command queue that moves playback requests onto the
//! media thread. See spec.md §4.2.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use crate::call::CallId;
use crate::error::{AgentError, AgentResult};

/// A command submitted by an application thread for the media thread to
/// execute.
#[derive(Debug, Clone)]
pub enum Command {
    /// Play a WAV file into the named call.
    PlayWav { call_id: CallId, file_path: String },
}

/// Producer handle for the command queue. Cloneable — any number of
/// application threads may hold one.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Command>,
    closed: Arc<AtomicBool>,
}

impl CommandSender {
    /// Submit a command. Returns [`AgentError::QueueClosed`] if the owning
    /// agent has stopped; never blocks.
    pub fn submit(&self, command: Command) -> AgentResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AgentError::QueueClosed);
        }
        self.tx.send(command).map_err(|_| AgentError::QueueClosed)
    }

    /// Mark the queue closed; further `submit` calls fail instead of
    /// queuing. Shares the same flag as [`CommandReceiver::close`] — either
    /// handle can close it for every clone of the sender.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Consumer handle held exclusively by the media thread.
pub struct CommandReceiver {
    rx: mpsc::Receiver<Command>,
    closed: Arc<AtomicBool>,
}

impl CommandReceiver {
    /// Drain up to `max` pending commands without blocking. Returns an
    /// empty vec immediately if the queue is empty.
    pub fn drain(&self, max: usize) -> Vec<Command> {
        let mut drained = Vec::with_capacity(max);
        for _ in 0..max {
            match self.rx.try_recv() {
                Ok(cmd) => drained.push(cmd),
                Err(_) => break,
            }
        }
        drained
    }

    /// Mark the queue closed; further `submit` calls fail instead of
    /// queuing. Called by the agent on `stop`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Default number of commands drained per media-thread tick (spec.md §4.2).
pub const DEFAULT_DRAIN_LIMIT: usize = 8;

/// Create a fresh command queue pair: an arbitrarily-cloneable sender and a
/// single receiver for the media thread.
pub fn command_queue() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        CommandSender {
            tx,
            closed: closed.clone(),
        },
        CommandReceiver { rx, closed },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_is_non_blocking_when_empty() {
        let (_tx, rx) = command_queue();
        let drained = rx.drain(DEFAULT_DRAIN_LIMIT);
        assert!(drained.is_empty());
    }

    #[test]
    fn drain_caps_at_limit() {
        let (tx, rx) = command_queue();
        for i in 0..20 {
            tx.submit(Command::PlayWav {
                call_id: format!("call-{i}"),
                file_path: "x.wav".into(),
            })
            .unwrap();
        }
        let drained = rx.drain(8);
        assert_eq!(drained.len(), 8);
        let remaining = rx.drain(usize::MAX);
        assert_eq!(remaining.len(), 12);
    }

    #[test]
    fn submit_after_close_fails() {
        let (tx, rx) = command_queue();
        rx.close();
        let result = tx.submit(Command::PlayWav {
            call_id: "call-1".into(),
            file_path: "x.wav".into(),
        });
        assert!(matches!(result, Err(AgentError::QueueClosed)));
    }
}
