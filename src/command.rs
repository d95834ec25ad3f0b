use crate::protocol::{
    self, SpiRegion, COMMAND_TIMEOUT_MS, REPORT_SIZE, SPI_DATA_OFFSET, SPI_ECHO_HIGH,
    SPI_ECHO_LOW, SPI_READ_ATTEMPTS, SUBCMD_SPI_READ,
};
use crate::transport::Transport;
use crate::{JoyConError, Result};
use std::sync::{Arc, Mutex, PoisonError};

/// Bytes read back after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    data: [u8; REPORT_SIZE],
    len: usize,
}

impl Response {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Outcome of one command/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// A full report-sized reply.
    Complete(Response),
    /// Fewer bytes than a full report.
    Partial(Response),
    /// Nothing arrived within the command timeout.
    Timeout,
}

impl Reply {
    pub fn response(&self) -> Option<&Response> {
        match self {
            Reply::Complete(r) | Reply::Partial(r) => Some(r),
            Reply::Timeout => None,
        }
    }

    /// Turn a timeout into `CommandTimeout`.
    pub fn into_response(self, subcommand: u8) -> Result<Response> {
        match self {
            Reply::Complete(r) | Reply::Partial(r) => Ok(r),
            Reply::Timeout => Err(JoyConError::CommandTimeout { subcommand }),
        }
    }
}

/// Subcommand channel to one controller.
///
/// Holds the rolling 4-bit packet counter. The transport is shared with
/// the poller; the lock is only taken for one write+read exchange.
pub struct CommandChannel<T> {
    transport: Arc<Mutex<T>>,
    counter: u8,
}

impl<T: Transport> CommandChannel<T> {
    pub fn new(transport: Arc<Mutex<T>>) -> Self {
        Self {
            transport,
            counter: 0,
        }
    }

    /// Counter value the next frame will carry.
    pub fn counter(&self) -> u8 {
        self.counter
    }

    fn next_counter(&mut self) -> u8 {
        let current = self.counter;
        self.counter = (self.counter + 1) & 0x0F;
        current
    }

    /// Send a subcommand and wait up to 50 ms for one reply.
    ///
    /// No retry happens here: a lost acknowledgement comes back as
    /// `Reply::Timeout` and the caller decides whether it matters.
    pub fn send_subcommand(&mut self, subcommand: u8, payload: &[u8]) -> Result<Reply> {
        let frame = protocol::build_command(self.next_counter(), subcommand, payload);
        let mut transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);

        transport.write(frame.as_bytes())?;

        let mut data = [0u8; REPORT_SIZE];
        let len = transport.read_timeout(&mut data, COMMAND_TIMEOUT_MS)?;
        let response = Response { data, len };

        let reply = match len {
            0 => Reply::Timeout,
            REPORT_SIZE => Reply::Complete(response),
            _ => Reply::Partial(response),
        };
        if reply == Reply::Timeout {
            log::debug!("Subcommand 0x{:02x}: no reply within {}ms", subcommand, COMMAND_TIMEOUT_MS);
        } else {
            log::trace!("Subcommand 0x{:02x}: {} byte reply", subcommand, len);
        }
        Ok(reply)
    }

    /// Read a flash region.
    ///
    /// Replies are matched on the echoed address; anything else (input
    /// reports, stale replies, timeouts) costs one of the 100 attempts.
    pub fn read_spi(&mut self, region: SpiRegion) -> Result<Vec<u8>> {
        let payload = protocol::build_spi_read_payload(region);
        let length = region.length as usize;

        for attempt in 1..=SPI_READ_ATTEMPTS {
            let response = match self
                .send_subcommand(SUBCMD_SPI_READ, &payload)?
                .into_response(SUBCMD_SPI_READ)
            {
                Ok(r) => r,
                Err(e) => {
                    log::trace!("Flash read 0x{:04x} attempt {}: {}", region.address(), attempt, e);
                    continue;
                }
            };

            let data = response.as_bytes();
            if data.len() < SPI_DATA_OFFSET + length {
                continue;
            }
            if data[SPI_ECHO_LOW] == region.address_low && data[SPI_ECHO_HIGH] == region.address_high
            {
                log::debug!(
                    "Flash read 0x{:04x} ({} bytes) after {} attempt(s)",
                    region.address(),
                    length,
                    attempt
                );
                return Ok(data[SPI_DATA_OFFSET..SPI_DATA_OFFSET + length].to_vec());
            }
        }

        Err(JoyConError::CalibrationReadTimeout {
            address: region.address(),
            attempts: SPI_READ_ATTEMPTS,
        })
    }
}
