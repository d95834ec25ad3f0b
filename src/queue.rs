use crate::report::RawReport;
use crossbeam_channel::{Receiver, Sender};

/// What the poller hands to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    Report(RawReport),
    /// Too many consecutive failed reads; no more reports will follow.
    Dropped,
}

/// Single-producer, single-consumer FIFO between the poll thread and
/// [`Controller::update`](crate::Controller::update).
///
/// Unbounded: a consumer that stops calling `update` lets reports pile up
/// rather than stalling the reader.
pub struct ReportQueue {
    sender: Sender<PollEvent>,
    receiver: Receiver<PollEvent>,
}

impl Default for ReportQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportQueue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// Producer end, handed to the poller.
    pub fn sender(&self) -> Sender<PollEvent> {
        self.sender.clone()
    }

    /// Take everything queued so far, oldest first. Never blocks.
    pub fn drain(&self) -> impl Iterator<Item = PollEvent> + '_ {
        self.receiver.try_iter()
    }

    /// Oldest queued event, if any.
    pub fn pop(&self) -> Option<PollEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Discard anything still queued.
    pub fn clear(&self) {
        let discarded = self.receiver.try_iter().count();
        if discarded > 0 {
            log::debug!("Discarded {} queued reports", discarded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn report(ts: u8) -> PollEvent {
        PollEvent::Report(RawReport::new(&[0x30, ts], Instant::now()))
    }

    fn timestamps(events: Vec<PollEvent>) -> Vec<u8> {
        events
            .into_iter()
            .filter_map(|e| match e {
                PollEvent::Report(r) => Some(r.timestamp()),
                PollEvent::Dropped => None,
            })
            .collect()
    }

    #[test]
    fn test_drain_is_fifo() {
        let queue = ReportQueue::new();
        let sender = queue.sender();
        for ts in [3, 1, 2] {
            sender.send(report(ts)).unwrap();
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(timestamps(queue.drain().collect()), vec![3, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_producer_on_another_thread() {
        let queue = ReportQueue::new();
        let sender = queue.sender();
        let producer = std::thread::spawn(move || {
            for ts in 0..=255u8 {
                sender.send(report(ts)).unwrap();
            }
        });
        producer.join().unwrap();
        let drained = timestamps(queue.drain().collect());
        assert_eq!(drained, (0..=255u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_clear() {
        let queue = ReportQueue::new();
        queue.sender().send(report(0)).unwrap();
        queue.sender().send(PollEvent::Dropped).unwrap();
        queue.clear();
        assert_eq!(queue.drain().count(), 0);
    }
}
