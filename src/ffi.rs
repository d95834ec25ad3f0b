//! C FFI layer for joycon.
//!
//! Provides an opaque handle-based API for C/C++ hosts. Each handle owns
//! one controller and, while attached, its background poller; the host
//! calls `jc_update` once per frame.
//! The generated C header is written to `include/joycon.h` by cbindgen.

use crate::config::ControllerConfig;
use crate::controller::{self, Controller};
use crate::error::{JoyConError, LastError};
use crate::hid::HidTransport;
use crate::orientation::OrientationBasis;
use crate::poller::PollerHandle;
use crate::types::{Button, ConnectionState, DeviceInfo, Handedness, PlayerLeds, Vector2, Vector3};
use std::ffi::{c_char, c_int, CString};

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque controller handle for C consumers.
pub struct JcController {
    // Declared first so the poller is joined before the controller detaches.
    poller: Option<PollerHandle>,
    controller: Controller<HidTransport>,
}

impl JcController {
    fn stop_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
    }
}

/// Device info in C-compatible layout.
#[repr(C)]
pub struct JcDeviceInfo {
    /// Null-terminated hidapi path.
    pub path: [c_char; 256],
    /// Null-terminated serial number (usually the Bluetooth address).
    pub serial: [c_char; 64],
    pub product_id: u16,
    pub handedness: Handedness,
}

fn str_to_fixed<const N: usize>(s: &[u8]) -> [c_char; N] {
    let mut buf = [0 as c_char; N];
    let len = s.len().min(N - 1);
    for (i, &b) in s[..len].iter().enumerate() {
        buf[i] = b as c_char;
    }
    buf
}

fn c_char_to_bytes(buf: &[c_char]) -> Vec<u8> {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    buf[..end].iter().map(|&c| c as u8).collect()
}

fn into_handle(result: crate::Result<Controller<HidTransport>>) -> *mut JcController {
    match result {
        Ok(controller) => Box::into_raw(Box::new(JcController {
            poller: None,
            controller,
        })),
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// List connected Joy-Con halves.
///
/// Writes up to `max` entries into `out`. Returns the number of entries
/// written, or -1 on error.
///
/// # Safety
/// `out` must point to an array of at least `max` `JcDeviceInfo` elements, or be null.
#[no_mangle]
pub unsafe extern "C" fn jc_list_devices(out: *mut JcDeviceInfo, max: c_int) -> c_int {
    match crate::hid::list_devices() {
        Ok(devices) => {
            let count = devices.len().min(max.max(0) as usize);
            if !out.is_null() {
                for (i, dev) in devices.iter().take(count).enumerate() {
                    let info = JcDeviceInfo {
                        path: str_to_fixed(dev.path.as_bytes()),
                        serial: str_to_fixed(dev.serial.as_bytes()),
                        product_id: dev.product_id,
                        handedness: dev.handedness,
                    };
                    out.add(i).write(info);
                }
            }
            count as c_int
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Open the first connected Joy-Con.
/// `handedness`: 0 = left, 1 = right, anything else = either.
/// Returns NULL on error (check jc_last_error()).
#[no_mangle]
pub extern "C" fn jc_open_first(handedness: c_int) -> *mut JcController {
    let handedness = match handedness {
        0 => Some(Handedness::Left),
        1 => Some(Handedness::Right),
        _ => None,
    };
    into_handle(Controller::open_first(handedness, ControllerConfig::from_env()))
}

/// Open a specific Joy-Con by its info.
/// Returns NULL on error.
///
/// # Safety
/// `info` must point to a valid `JcDeviceInfo`, or be null.
#[no_mangle]
pub unsafe extern "C" fn jc_open(info: *const JcDeviceInfo) -> *mut JcController {
    if info.is_null() {
        return std::ptr::null_mut();
    }
    let info = &*info;

    let path = match CString::new(c_char_to_bytes(&info.path)) {
        Ok(p) => p,
        Err(_) => return std::ptr::null_mut(),
    };
    let dev_info = DeviceInfo {
        path,
        serial: String::from_utf8_lossy(&c_char_to_bytes(&info.serial)).to_string(),
        product_id: info.product_id,
        handedness: info.handedness,
    };

    into_handle(Controller::open(&dev_info, ControllerConfig::from_env()))
}

/// Detach (if attached), close the device and free the handle.
///
/// # Safety
/// `jc` must be a pointer returned by `jc_open` or `jc_open_first`, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_close(jc: *mut JcController) {
    if !jc.is_null() {
        drop(Box::from_raw(jc));
    }
}

/// Run the attach handshake with the given player LED mask and start
/// background polling. Returns 0 on success, -1 on error.
///
/// # Safety
/// `jc` must be a valid controller pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_attach(jc: *mut JcController, leds: u8) -> c_int {
    if jc.is_null() {
        return -1;
    }
    let jc = &mut *jc;
    let state = jc.controller.connection_state();
    if state != ConnectionState::NotAttached {
        LAST_ERROR.set(&JoyConError::AlreadyAttached(state));
        return -1;
    }
    jc.stop_poller();
    match controller::attach_with_poller(&mut jc.controller, PlayerLeds::from_bits_retain(leds)) {
        Ok(poller) => {
            jc.poller = Some(poller);
            0
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Stop polling and send the shutdown sequence. Safe in any state.
///
/// # Safety
/// `jc` must be a valid controller pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_detach(jc: *mut JcController) {
    if jc.is_null() {
        return;
    }
    let jc = &mut *jc;
    jc.stop_poller();
    jc.controller.detach();
}

/// Process all queued reports. Call once per frame.
/// Returns the number of reports processed, or -1 on error (not attached
/// or connection dropped).
///
/// # Safety
/// `jc` must be a valid controller pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_update(jc: *mut JcController) -> c_int {
    if jc.is_null() {
        return -1;
    }
    let jc = &mut *jc;
    match jc.controller.update() {
        Ok(n) => n.min(c_int::MAX as usize) as c_int,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Current connection state.
///
/// # Safety
/// `jc` must be a valid controller pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_state(jc: *const JcController) -> ConnectionState {
    if jc.is_null() {
        return ConnectionState::NotAttached;
    }
    (*jc).controller.connection_state()
}

unsafe fn query_button(
    jc: *const JcController,
    button: c_int,
    query: fn(&Controller<HidTransport>, Button) -> bool,
) -> bool {
    if jc.is_null() || button < 0 {
        return false;
    }
    match Button::from_index(button as usize) {
        Some(button) => query(&(*jc).controller, button),
        None => false,
    }
}

/// True if `button` went down in the most recent report.
///
/// # Safety
/// `jc` must be a valid controller pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_button_down(jc: *const JcController, button: c_int) -> bool {
    query_button(jc, button, Controller::button_down)
}

/// True while `button` is held.
///
/// # Safety
/// `jc` must be a valid controller pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_button_held(jc: *const JcController, button: c_int) -> bool {
    query_button(jc, button, Controller::button_held)
}

/// True if `button` was released in the most recent report.
///
/// # Safety
/// `jc` must be a valid controller pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_button_up(jc: *const JcController, button: c_int) -> bool {
    query_button(jc, button, Controller::button_up)
}

/// Calibrated stick position. Returns 0 on success, -1 on null input.
///
/// # Safety
/// `jc` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_stick(jc: *const JcController, out: *mut Vector2) -> c_int {
    if jc.is_null() || out.is_null() {
        return -1;
    }
    out.write((*jc).controller.stick());
    0
}

/// Gyroscope in degrees per second.
///
/// # Safety
/// `jc` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_gyroscope(jc: *const JcController, out: *mut Vector3) -> c_int {
    if jc.is_null() || out.is_null() {
        return -1;
    }
    out.write((*jc).controller.gyroscope());
    0
}

/// Accelerometer in g.
///
/// # Safety
/// `jc` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_accelerometer(jc: *const JcController, out: *mut Vector3) -> c_int {
    if jc.is_null() || out.is_null() {
        return -1;
    }
    out.write((*jc).controller.accelerometer());
    0
}

/// Orientation basis (device I, J, K axes in the world frame).
///
/// # Safety
/// `jc` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_orientation(jc: *const JcController, out: *mut OrientationBasis) -> c_int {
    if jc.is_null() || out.is_null() {
        return -1;
    }
    out.write((*jc).controller.orientation());
    0
}

/// Rotation matrix, flat row-major (9 elements).
///
/// # Safety
/// `jc` must be a valid controller pointer or null; `out` must point to
/// at least 9 floats, or be null.
#[no_mangle]
pub unsafe extern "C" fn jc_rotation_matrix(jc: *const JcController, out: *mut f32) -> c_int {
    if jc.is_null() || out.is_null() {
        return -1;
    }
    let m = (*jc).controller.rotation_matrix();
    for (i, v) in m.iter().flatten().enumerate() {
        out.add(i).write(*v);
    }
    0
}

/// Euler angles [roll, pitch, yaw] in degrees.
///
/// # Safety
/// `jc` must be a valid controller pointer or null; `out` must point to
/// at least 3 floats, or be null.
#[no_mangle]
pub unsafe extern "C" fn jc_euler_deg(jc: *const JcController, out: *mut f32) -> c_int {
    if jc.is_null() || out.is_null() {
        return -1;
    }
    for (i, v) in (*jc).controller.euler_deg().iter().enumerate() {
        out.add(i).write(*v);
    }
    0
}

/// Reset orientation to identity on the next IMU sample.
///
/// # Safety
/// `jc` must be a valid controller pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_recenter(jc: *mut JcController) {
    if !jc.is_null() {
        (*jc).controller.recenter();
    }
}

/// Set the accelerometer weight of the orientation filter (default 0.05).
///
/// # Safety
/// `jc` must be a valid controller pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn jc_set_filter_coefficient(jc: *mut JcController, coefficient: f32) {
    if !jc.is_null() {
        (*jc).controller.set_filter_coefficient(coefficient);
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next joycon API call.
#[no_mangle]
pub extern "C" fn jc_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_string_round_trip_truncates() {
        let buf: [c_char; 8] = str_to_fixed(b"/dev/hidraw12");
        assert_eq!(buf[7], 0);
        assert_eq!(c_char_to_bytes(&buf), b"/dev/hi".to_vec());
    }

    #[test]
    fn test_null_handles_are_rejected() {
        unsafe {
            assert_eq!(jc_update(std::ptr::null_mut()), -1);
            assert_eq!(jc_attach(std::ptr::null_mut(), 1), -1);
            assert_eq!(jc_state(std::ptr::null()), ConnectionState::NotAttached);
            assert!(!jc_button_held(std::ptr::null(), 0));
            assert!(jc_open(std::ptr::null()).is_null());
            jc_detach(std::ptr::null_mut());
            jc_close(std::ptr::null_mut());
        }
    }
}
