//! Buffer/flush state machine shared by accumulating nodes.

use std::sync::{Mutex, MutexGuard};

use waypoint_types::Payload;

use crate::node::NodeState;

/// Buffers payloads across invocations until the batch closes.
///
/// `push` moves the accumulator to `Accumulating`; `flush` hands back the
/// whole buffer and returns to `Idle`. Flushing an idle accumulator yields
/// `None`, never an empty batch.
#[derive(Debug, Default)]
pub struct Accumulator {
    buffer: Mutex<Vec<Payload>>,
    max_size: Option<usize>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flush early once `max_size` payloads are buffered.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            max_size: Some(max_size),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Payload>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Buffer a payload. Returns the full batch if the size limit was reached.
    pub fn push(&self, payload: Payload) -> Option<Vec<Payload>> {
        let mut buffer = self.lock();
        buffer.push(payload);
        match self.max_size {
            Some(max) if buffer.len() >= max => Some(std::mem::take(&mut *buffer)),
            _ => None,
        }
    }

    /// Take everything buffered, or `None` if nothing is.
    pub fn flush(&self) -> Option<Vec<Payload>> {
        let mut buffer = self.lock();
        if buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut *buffer))
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn state(&self) -> NodeState {
        if self.is_empty() {
            NodeState::Idle
        } else {
            NodeState::Accumulating
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_flush_is_none() {
        let acc = Accumulator::new();
        assert_eq!(acc.state(), NodeState::Idle);
        assert!(acc.flush().is_none());
    }

    #[test]
    fn push_then_flush() {
        let acc = Accumulator::new();
        assert!(acc.push(Payload::text("a")).is_none());
        assert!(acc.push(Payload::text("b")).is_none());
        assert_eq!(acc.state(), NodeState::Accumulating);
        assert_eq!(acc.len(), 2);

        let batch = acc.flush().unwrap();
        assert_eq!(batch, vec![Payload::text("a"), Payload::text("b")]);
        assert_eq!(acc.state(), NodeState::Idle);
        assert!(acc.flush().is_none());
    }

    #[test]
    fn max_size_flushes_early() {
        let acc = Accumulator::with_max_size(2);
        assert!(acc.push(Payload::text("1")).is_none());
        let batch = acc.push(Payload::text("2")).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(acc.is_empty());
        assert!(acc.push(Payload::text("3")).is_none());
        assert_eq!(acc.flush().unwrap(), vec![Payload::text("3")]);
    }
}
