use crate::types::ConnectionState;
use std::fmt;

/// Errors that can occur when talking to a Joy-Con.
#[derive(Debug, thiserror::Error)]
pub enum JoyConError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("No Joy-Con found (VID=057E PID=2006/2007)")]
    DeviceNotFound,

    #[error("Failed to open transport: {0}")]
    TransportOpen(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport already closed")]
    TransportClosed,

    #[error("No reply to subcommand 0x{subcommand:02x}")]
    CommandTimeout { subcommand: u8 },

    #[error("Flash read at 0x{address:04x} not acknowledged after {attempts} attempts")]
    CalibrationReadTimeout { address: u16, attempts: u32 },

    #[error("Controller is not attached")]
    NotAttached,

    #[error("Controller already attached (state {0:?})")]
    AlreadyAttached(ConnectionState),

    #[error("Connection dropped, detach and attach again")]
    ConnectionDropped,

    #[error("Failed to spawn poll thread: {0}")]
    PollerSpawn(String),
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &JoyConError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = JoyConError::CalibrationReadTimeout {
            address: 0x8012,
            attempts: 100,
        };
        assert_eq!(
            err.to_string(),
            "Flash read at 0x8012 not acknowledged after 100 attempts"
        );

        let err = JoyConError::CommandTimeout { subcommand: 0x10 };
        assert_eq!(err.to_string(), "No reply to subcommand 0x10");
    }

    #[test]
    fn test_last_error_is_nul_terminated() {
        let last = LastError::new();
        assert!(last.as_ptr().is_null());

        last.set(&JoyConError::NotAttached);
        let ptr = last.as_ptr();
        assert!(!ptr.is_null());
        let msg = unsafe { std::ffi::CStr::from_ptr(ptr) };
        assert_eq!(msg.to_str().unwrap(), "Controller is not attached");

        last.clear();
        assert!(last.as_ptr().is_null());
    }
}
