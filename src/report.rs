use crate::calibration::Calibration;
use crate::protocol::{
    self, HalfLayout, ACCEL_SCALE_G, GYRO_SCALE_DPS, IMU_BASE, IMU_SAMPLES, IMU_STRIDE,
    REPORT_ID_EMPTY, REPORT_ID_FULL, REPORT_SIZE,
};
use crate::types::{Button, ImuSample, Vector2, Vector3, BUTTON_COUNT};
use std::time::Instant;

/// One input report as read from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawReport {
    data: [u8; REPORT_SIZE],
    len: usize,
    captured_at: Instant,
}

impl RawReport {
    /// Copy up to `REPORT_SIZE` bytes; a short read is zero-padded.
    pub fn new(bytes: &[u8], captured_at: Instant) -> Self {
        let len = bytes.len().min(REPORT_SIZE);
        let mut data = [0u8; REPORT_SIZE];
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            data,
            len,
            captured_at,
        }
    }

    pub fn report_id(&self) -> u8 {
        self.data[0]
    }

    /// Rolling 8-bit sample timestamp.
    pub fn timestamp(&self) -> u8 {
        self.data[1]
    }

    pub fn bytes(&self) -> &[u8; REPORT_SIZE] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.report_id() == REPORT_ID_EMPTY
    }

    pub fn has_imu(&self) -> bool {
        self.report_id() == REPORT_ID_FULL
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

/// Current and previous snapshot of every button.
///
/// Press/release edges are derived from the two snapshots, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonSet {
    current: [bool; BUTTON_COUNT],
    previous: [bool; BUTTON_COUNT],
}

impl ButtonSet {
    /// Shift the current snapshot to previous and take a new one.
    pub fn update(&mut self, next: [bool; BUTTON_COUNT]) {
        self.previous = self.current;
        self.current = next;
    }

    pub fn held(&self, button: Button) -> bool {
        self.current[button.index()]
    }

    pub fn pressed_this_frame(&self, button: Button) -> bool {
        !self.previous[button.index()] && self.current[button.index()]
    }

    pub fn released_this_frame(&self, button: Button) -> bool {
        self.previous[button.index()] && !self.current[button.index()]
    }

    pub fn clear(&mut self) {
        *self = ButtonSet::default();
    }
}

/// Stick and buttons of one non-empty report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedInput {
    pub raw_stick: [u16; 2],
    pub stick: Vector2,
    pub buttons: [bool; BUTTON_COUNT],
}

/// Decodes reports for one half with the calibration read at attach.
#[derive(Debug, Clone)]
pub struct ReportDecoder {
    layout: HalfLayout,
    calibration: Calibration,
}

impl ReportDecoder {
    pub fn new(layout: HalfLayout, calibration: Calibration) -> Self {
        Self {
            layout,
            calibration,
        }
    }

    pub fn layout(&self) -> &HalfLayout {
        &self.layout
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Decode stick and buttons. `None` for an empty (id 0x00) report.
    pub fn decode_input(&self, report: &RawReport) -> Option<DecodedInput> {
        if report.is_empty() {
            return None;
        }
        let raw_stick = self.raw_stick(report);
        let stick = Vector2::new(
            self.calibration.stick.apply_axis(0, raw_stick[0]),
            self.calibration.stick.apply_axis(1, raw_stick[1]),
        );
        Some(DecodedInput {
            raw_stick,
            stick,
            buttons: self.buttons(report),
        })
    }

    pub fn raw_stick(&self, report: &RawReport) -> [u16; 2] {
        let data = report.bytes();
        let o = self.layout.stick_offset;
        let (x, y) = protocol::unpack_12bit_pair([data[o], data[o + 1], data[o + 2]]);
        [x, y]
    }

    pub fn buttons(&self, report: &RawReport) -> [bool; BUTTON_COUNT] {
        let data = report.bytes();
        let mut pressed = [false; BUTTON_COUNT];
        for (button, byte, mask) in self.layout.buttons {
            pressed[button.index()] = data[self.layout.button_byte_index(byte)] & mask != 0;
        }
        pressed
    }

    /// Decode IMU sub-sample `n` (0..3) in physical units.
    pub fn imu_sample(&self, report: &RawReport, n: usize) -> ImuSample {
        debug_assert!(n < IMU_SAMPLES);
        let data = report.bytes();
        let base = IMU_BASE + n * IMU_STRIDE;
        let neutral = self.calibration.gyro.neutral;

        let accel = [0, 1, 2].map(|axis| protocol::read_i16_le(data, base + axis * 2) as f32 * ACCEL_SCALE_G);
        let gyro = [0, 1, 2].map(|axis| {
            let raw = protocol::read_i16_le(data, base + 6 + axis * 2) as f32;
            (raw - neutral[axis] as f32) * GYRO_SCALE_DPS
        });

        ImuSample {
            accel: Vector3::from_array(accel),
            gyro: Vector3::from_array(gyro),
        }
    }
}
