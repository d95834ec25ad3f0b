use crate::Result;

/// Byte transport to one controller.
///
/// `HidTransport` implements this over hidapi; tests use
/// [`mock::MockTransport`].
pub trait Transport: Send {
    /// Write one output report, returning the number of bytes written.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read one input report. `Ok(0)` means the timeout elapsed with no data.
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize>;

    fn set_blocking(&mut self, blocking: bool) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

pub mod mock {
    use super::Transport;
    use crate::protocol::{
        REPORT_SIZE, SPI_DATA_OFFSET, SPI_ECHO_HIGH, SPI_ECHO_LOW, SUBCMD_SPI_READ,
    };
    use crate::{JoyConError, Result};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    /// Report id of a subcommand reply.
    pub const REPLY_REPORT_ID: u8 = 0x21;

    /// In-memory Joy-Con.
    ///
    /// Every written subcommand frame queues a 0x21 reply; flash reads
    /// answer from a 64 KiB image that starts out erased (0xFF). Clones
    /// share state, so a test can keep a handle after moving one into a
    /// controller.
    #[derive(Clone)]
    pub struct MockTransport {
        inner: Arc<Mutex<MockState>>,
    }

    struct MockState {
        flash: Vec<u8>,
        reads: VecDeque<Vec<u8>>,
        writes: Vec<Vec<u8>>,
        spi_mismatches: usize,
        silent: bool,
        disconnected: bool,
        blocking: Option<bool>,
        closed: bool,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Mutex::new(MockState {
                    flash: vec![0xFF; 0x10000],
                    reads: VecDeque::new(),
                    writes: Vec::new(),
                    spi_mismatches: 0,
                    silent: false,
                    disconnected: false,
                    blocking: None,
                    closed: false,
                })),
            }
        }

        fn state(&self) -> MutexGuard<'_, MockState> {
            self.inner.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Write bytes into the flash image.
        pub fn set_flash(&self, address: u16, bytes: &[u8]) {
            let mut state = self.state();
            let start = address as usize;
            state.flash[start..start + bytes.len()].copy_from_slice(bytes);
        }

        /// Answer the next `count` flash reads with a wrong address echo.
        pub fn mismatch_next_spi_reads(&self, count: usize) {
            self.state().spi_mismatches = count;
        }

        /// Stop replying to commands (every read times out).
        pub fn set_silent(&self, silent: bool) {
            self.state().silent = silent;
        }

        /// Make every read and write fail.
        pub fn set_disconnected(&self, disconnected: bool) {
            self.state().disconnected = disconnected;
        }

        /// Queue a raw input report.
        pub fn queue_read(&self, data: Vec<u8>) {
            self.state().reads.push_back(data);
        }

        pub fn pending_reads(&self) -> usize {
            self.state().reads.len()
        }

        pub fn writes(&self) -> Vec<Vec<u8>> {
            self.state().writes.clone()
        }

        /// Subcommand id and first payload byte of every written frame.
        pub fn subcommands(&self) -> Vec<(u8, u8)> {
            self.state()
                .writes
                .iter()
                .map(|w| (w[10], w.get(11).copied().unwrap_or(0)))
                .collect()
        }

        pub fn clear_writes(&self) {
            self.state().writes.clear();
        }

        pub fn blocking(&self) -> Option<bool> {
            self.state().blocking
        }

        pub fn is_closed(&self) -> bool {
            self.state().closed
        }
    }

    impl MockState {
        fn reply_to(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
            if self.silent || frame.len() < 11 {
                return None;
            }
            let mut reply = vec![0u8; REPORT_SIZE];
            reply[0] = REPLY_REPORT_ID;
            reply[13] = 0x80;
            reply[14] = frame[10];

            if frame[10] == SUBCMD_SPI_READ && frame.len() >= 16 {
                let (low, high, len) = (frame[11], frame[12], frame[15] as usize);
                let address = u16::from_be_bytes([high, low]) as usize;
                if self.spi_mismatches > 0 {
                    self.spi_mismatches -= 1;
                    reply[SPI_ECHO_LOW] = low.wrapping_add(1);
                    reply[SPI_ECHO_HIGH] = high;
                    reply[SPI_DATA_OFFSET..SPI_DATA_OFFSET + len].fill(0xEE);
                } else {
                    reply[SPI_ECHO_LOW] = low;
                    reply[SPI_ECHO_HIGH] = high;
                    reply[19] = len as u8;
                    reply[SPI_DATA_OFFSET..SPI_DATA_OFFSET + len]
                        .copy_from_slice(&self.flash[address..address + len]);
                }
            }
            Some(reply)
        }
    }

    impl Transport for MockTransport {
        fn write(&mut self, data: &[u8]) -> Result<usize> {
            let mut state = self.state();
            if state.closed {
                return Err(JoyConError::TransportClosed);
            }
            if state.disconnected {
                return Err(JoyConError::Transport("mock disconnected".into()));
            }
            state.writes.push(data.to_vec());
            if let Some(reply) = state.reply_to(data) {
                state.reads.push_back(reply);
            }
            Ok(data.len())
        }

        fn read_timeout(&mut self, buf: &mut [u8], _timeout_ms: i32) -> Result<usize> {
            let mut state = self.state();
            if state.closed {
                return Err(JoyConError::TransportClosed);
            }
            if state.disconnected {
                return Err(JoyConError::Transport("mock disconnected".into()));
            }
            match state.reads.pop_front() {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Ok(0),
            }
        }

        fn set_blocking(&mut self, blocking: bool) -> Result<()> {
            self.state().blocking = Some(blocking);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.state().closed = true;
            Ok(())
        }
    }
}
