use crate::protocol::REPORT_SIZE;
use crate::queue::PollEvent;
use crate::report::RawReport;
use crate::transport::Transport;
use crate::{JoyConError, Result};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Consecutive failed reads since the last successful one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadAttempts {
    failures: u32,
    threshold: u32,
}

impl ReadAttempts {
    pub fn new(threshold: u32) -> Self {
        Self {
            failures: 0,
            threshold,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Count one failed read. Returns true once the count exceeds the
    /// threshold.
    pub fn record_failure(&mut self) -> bool {
        self.failures = self.failures.saturating_add(1);
        self.failures > self.threshold
    }
}

/// Result of one [`Poller::poll`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A report of this many bytes was queued.
    Report(usize),
    /// Nothing arrived, or the read failed, below the drop threshold.
    Idle,
    /// The failure threshold was exceeded and `PollEvent::Dropped` was sent.
    Dropped,
    /// Polling is disabled or the consumer went away.
    Stopped,
}

/// Producer side of the report queue.
///
/// Issues blocking reads with a timeout and pushes every non-empty read
/// as a [`RawReport`]. Decoding happens on the consumer.
pub struct Poller<T> {
    transport: Arc<Mutex<T>>,
    sender: Sender<PollEvent>,
    polling: Arc<AtomicBool>,
    attempts: ReadAttempts,
    timeout_ms: i32,
    last_timestamp: Option<u8>,
    duplicates: Arc<AtomicU64>,
    blocking_set: bool,
}

impl<T: Transport> Poller<T> {
    pub(crate) fn new(
        transport: Arc<Mutex<T>>,
        sender: Sender<PollEvent>,
        polling: Arc<AtomicBool>,
        duplicates: Arc<AtomicU64>,
        drop_threshold: u32,
        timeout_ms: i32,
    ) -> Self {
        Self {
            transport,
            sender,
            polling,
            attempts: ReadAttempts::new(drop_threshold),
            timeout_ms,
            last_timestamp: None,
            duplicates,
            blocking_set: false,
        }
    }

    pub fn attempts(&self) -> ReadAttempts {
        self.attempts
    }

    /// Timestamps seen twice in a row on the producer side.
    pub fn duplicate_timestamps(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Perform one read.
    pub fn poll(&mut self) -> PollOutcome {
        if !self.polling.load(Ordering::Acquire) {
            return PollOutcome::Stopped;
        }

        let mut buf = [0u8; REPORT_SIZE];
        let read = {
            let mut transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.blocking_set {
                if let Err(e) = transport.set_blocking(true) {
                    log::warn!("Failed to switch transport to blocking reads: {}", e);
                }
                self.blocking_set = true;
            }
            transport.read_timeout(&mut buf, self.timeout_ms)
        };

        match read {
            Ok(len) if len > 0 => {
                self.attempts.record_success();
                let report = RawReport::new(&buf[..len], Instant::now());
                let ts = report.timestamp();
                if self.last_timestamp == Some(ts) {
                    self.duplicates.fetch_add(1, Ordering::Relaxed);
                    log::warn!("Duplicate timestamp {} enqueued", ts);
                }
                self.last_timestamp = Some(ts);
                if self.sender.send(PollEvent::Report(report)).is_err() {
                    log::info!("Report queue disconnected, stopping poller");
                    return PollOutcome::Stopped;
                }
                PollOutcome::Report(len)
            }
            other => {
                if let Err(e) = other {
                    log::warn!("Poll read error: {}", e);
                }
                if self.attempts.record_failure() {
                    log::warn!(
                        "Connection lost after {} failed reads. Is the Joy-Con connected?",
                        self.attempts.failures()
                    );
                    let _ = self.sender.send(PollEvent::Dropped);
                    return PollOutcome::Dropped;
                }
                PollOutcome::Idle
            }
        }
    }
}

impl<T: Transport + 'static> Poller<T> {
    /// Run [`poll`](Self::poll) on a dedicated thread until the handle is
    /// stopped, polling is disabled or the connection drops.
    ///
    /// Stopping the handle only ends this thread. The controller stays
    /// attached and keeps accepting reports from another poller.
    pub fn spawn(mut self) -> Result<PollerHandle> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();
        let thread = std::thread::Builder::new()
            .name("joycon-poll".into())
            .spawn(move || {
                log::info!("Joy-Con poller started");
                while !stop_clone.load(Ordering::Acquire) {
                    match self.poll() {
                        PollOutcome::Report(_) | PollOutcome::Idle => {}
                        PollOutcome::Dropped => break,
                        PollOutcome::Stopped => break,
                    }
                }
                log::info!(
                    "Joy-Con poller stopped ({} duplicate timestamps)",
                    self.duplicate_timestamps()
                );
            })
            .map_err(|e| JoyConError::PollerSpawn(e.to_string()))?;

        Ok(PollerHandle {
            stop_flag,
            thread: Some(thread),
        })
    }
}

/// Owns the background poll thread. Dropping it stops and joins the thread.
pub struct PollerHandle {
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PollerHandle {
    /// Whether the thread is still running.
    pub fn is_active(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the thread to exit and wait for it. The controller's polling
    /// flag is left alone.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ReportQueue;
    use crate::transport::mock::MockTransport;

    fn poller(mock: &MockTransport, queue: &ReportQueue, threshold: u32) -> Poller<MockTransport> {
        poller_with_flag(mock, queue, threshold, Arc::new(AtomicBool::new(true)))
    }

    fn poller_with_flag(
        mock: &MockTransport,
        queue: &ReportQueue,
        threshold: u32,
        polling: Arc<AtomicBool>,
    ) -> Poller<MockTransport> {
        Poller::new(
            Arc::new(Mutex::new(mock.clone())),
            queue.sender(),
            polling,
            Arc::new(AtomicU64::new(0)),
            threshold,
            0,
        )
    }

    #[test]
    fn test_read_attempts_threshold() {
        let mut attempts = ReadAttempts::new(1000);
        for _ in 0..1000 {
            assert!(!attempts.record_failure());
        }
        assert!(attempts.record_failure());
    }

    #[test]
    fn test_success_resets_failures() {
        let mut attempts = ReadAttempts::new(3);
        for _ in 0..3 {
            attempts.record_failure();
        }
        attempts.record_success();
        assert_eq!(attempts.failures(), 0);
        assert!(!attempts.record_failure());
    }

    #[test]
    fn test_drops_only_after_threshold_exceeded() {
        let mock = MockTransport::new();
        let queue = ReportQueue::new();
        let mut poller = poller(&mock, &queue, 1000);

        for _ in 0..1000 {
            assert_eq!(poller.poll(), PollOutcome::Idle);
        }
        assert!(queue.is_empty());
        assert_eq!(poller.poll(), PollOutcome::Dropped);
        assert_eq!(queue.drain().collect::<Vec<_>>(), vec![PollEvent::Dropped]);
    }

    #[test]
    fn test_read_errors_count_as_failures() {
        let mock = MockTransport::new();
        mock.set_disconnected(true);
        let queue = ReportQueue::new();
        let mut poller = poller(&mock, &queue, 2);
        assert_eq!(poller.poll(), PollOutcome::Idle);
        assert_eq!(poller.poll(), PollOutcome::Idle);
        assert_eq!(poller.poll(), PollOutcome::Dropped);
    }

    #[test]
    fn test_report_is_queued_and_resets_failures() {
        let mock = MockTransport::new();
        let queue = ReportQueue::new();
        let mut poller = poller(&mock, &queue, 1000);

        poller.poll();
        poller.poll();
        mock.queue_read(vec![0x30, 0x05, 0x8E]);
        assert_eq!(poller.poll(), PollOutcome::Report(3));
        assert_eq!(poller.attempts().failures(), 0);
        assert_eq!(mock.blocking(), Some(true));

        match queue.drain().next() {
            Some(PollEvent::Report(r)) => assert_eq!(r.timestamp(), 5),
            other => panic!("expected a report, got {:?}", other),
        };
    }

    #[test]
    fn test_duplicate_timestamps_are_counted_not_dropped() {
        let mock = MockTransport::new();
        let queue = ReportQueue::new();
        let mut poller = poller(&mock, &queue, 1000);
        for ts in [7, 7, 8] {
            mock.queue_read(vec![0x30, ts]);
            poller.poll();
        }
        assert_eq!(poller.duplicate_timestamps(), 1);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_stopped_when_flag_cleared() {
        let mock = MockTransport::new();
        let queue = ReportQueue::new();
        let mut poller = poller(&mock, &queue, 1000);
        poller.polling.store(false, Ordering::Release);
        mock.queue_read(vec![0x30, 0x01]);
        assert_eq!(poller.poll(), PollOutcome::Stopped);
        assert_eq!(mock.pending_reads(), 1);
    }

    #[test]
    fn test_spawned_poller_stops_on_handle_drop() {
        let mock = MockTransport::new();
        let queue = ReportQueue::new();
        for ts in 0..10 {
            mock.queue_read(vec![0x30, ts]);
        }
        let handle = poller(&mock, &queue, u32::MAX).spawn().unwrap();
        while mock.pending_reads() > 0 {
            std::thread::yield_now();
        }
        handle.stop();
        assert_eq!(queue.drain().count(), 10);
    }

    #[test]
    fn test_spawned_poller_exits_on_drop_threshold() {
        let mock = MockTransport::new();
        let queue = ReportQueue::new();
        let handle = poller(&mock, &queue, 5).spawn().unwrap();
        let event = loop {
            if let Some(event) = queue.drain().next() {
                break event;
            }
            std::thread::yield_now();
        };
        assert_eq!(event, PollEvent::Dropped);
        while handle.is_active() {
            std::thread::yield_now();
        }
    }

    #[test]
    fn test_handle_stop_leaves_polling_flag_set() {
        let mock = MockTransport::new();
        let queue = ReportQueue::new();
        let polling = Arc::new(AtomicBool::new(true));
        let handle = poller_with_flag(&mock, &queue, u32::MAX, polling.clone())
            .spawn()
            .unwrap();
        handle.stop();
        assert!(polling.load(Ordering::Acquire));
    }

    #[test]
    fn test_spawned_poller_exits_when_polling_cleared() {
        let mock = MockTransport::new();
        let queue = ReportQueue::new();
        let polling = Arc::new(AtomicBool::new(true));
        let handle = poller_with_flag(&mock, &queue, u32::MAX, polling.clone())
            .spawn()
            .unwrap();
        polling.store(false, Ordering::Release);
        while handle.is_active() {
            std::thread::yield_now();
        }
    }
}
