use crate::types::{Button, Handedness, BUTTON_COUNT};

// -- USB identifiers --
pub const VID: u16 = 0x057E;
pub const PID_LEFT: u16 = 0x2006;
pub const PID_RIGHT: u16 = 0x2007;

// -- Packet geometry --
pub const REPORT_SIZE: usize = 49;
pub const FRAME_HEADER_SIZE: usize = 11;

/// Largest subcommand payload that still fits a report-sized frame.
pub const MAX_PAYLOAD: usize = REPORT_SIZE - FRAME_HEADER_SIZE;

// -- Output frame --
pub const COMMAND_MARKER: u8 = 0x01;
/// Neutral rumble data sent in every command frame (bytes 2..=9).
pub const NEUTRAL_RUMBLE: [u8; 8] = [0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40];

// -- Subcommands --
pub const SUBCMD_MANUAL_PAIRING: u8 = 0x01;
pub const SUBCMD_SET_REPORT_MODE: u8 = 0x03;
pub const SUBCMD_SPI_READ: u8 = 0x10;
pub const SUBCMD_SET_PLAYER_LEDS: u8 = 0x30;
pub const SUBCMD_ENABLE_IMU: u8 = 0x40;
pub const SUBCMD_ENABLE_VIBRATION: u8 = 0x48;

// -- Report modes --
pub const REPORT_MODE_SIMPLE: u8 = 0x3F;
pub const REPORT_MODE_FULL: u8 = 0x30;

// -- Input reports --
pub const REPORT_ID_EMPTY: u8 = 0x00;
pub const REPORT_ID_FULL: u8 = 0x30;
pub const IMU_BASE: usize = 13;
pub const IMU_STRIDE: usize = 12;
pub const IMU_SAMPLES: usize = 3;
pub const SHARED_BUTTON_BYTE: usize = 4;

// -- Command timing --
pub const COMMAND_TIMEOUT_MS: i32 = 50;
pub const SPI_READ_ATTEMPTS: u32 = 100;
/// Offset of the flash payload in a subcommand reply.
pub const SPI_DATA_OFFSET: usize = 20;
/// Offsets of the echoed address (low, high) in a subcommand reply.
pub const SPI_ECHO_LOW: usize = 15;
pub const SPI_ECHO_HIGH: usize = 16;

// -- Sensor scaling --
pub const ACCEL_SCALE_G: f32 = 0.00025;
pub const GYRO_SCALE_DPS: f32 = 0.001_221_876_95;
/// Duration of one IMU sub-sample step in seconds.
pub const IMU_STEP_S: f32 = 0.005;

/// Value of erased (never written) flash.
pub const FLASH_ERASED: u8 = 0xFF;

/// A contiguous flash region to read with subcommand 0x10.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiRegion {
    pub address_high: u8,
    pub address_low: u8,
    pub length: u8,
}

impl SpiRegion {
    pub const fn new(address_high: u8, address_low: u8, length: u8) -> Self {
        Self {
            address_high,
            address_low,
            length,
        }
    }

    pub fn address(&self) -> u16 {
        u16::from_be_bytes([self.address_high, self.address_low])
    }
}

pub const USER_STICK_LEFT: SpiRegion = SpiRegion::new(0x80, 0x12, 9);
pub const USER_STICK_RIGHT: SpiRegion = SpiRegion::new(0x80, 0x1D, 9);
pub const FACTORY_STICK_LEFT: SpiRegion = SpiRegion::new(0x60, 0x3D, 9);
pub const FACTORY_STICK_RIGHT: SpiRegion = SpiRegion::new(0x60, 0x46, 9);
pub const DEADZONE_LEFT: SpiRegion = SpiRegion::new(0x60, 0x86, 16);
pub const DEADZONE_RIGHT: SpiRegion = SpiRegion::new(0x60, 0x98, 16);
pub const FACTORY_GYRO_NEUTRAL: SpiRegion = SpiRegion::new(0x80, 0x34, 10);
pub const USER_GYRO_NEUTRAL: SpiRegion = SpiRegion::new(0x60, 0x29, 10);

/// Byte offset of the deadzone value inside the deadzone region.
pub const DEADZONE_OFFSET: usize = 3;
/// Byte offsets of the three gyro neutral values in each region.
pub const FACTORY_GYRO_OFFSETS: [usize; 3] = [0, 2, 4];
pub const USER_GYRO_OFFSETS: [usize; 3] = [3, 5, 7];

/// Meaning of one 3-byte group in the stick calibration region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickField {
    MaxAboveCenter,
    Center,
    MinBelowCenter,
}

/// Which report byte a button lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonByte {
    /// The byte owned by this half (byte 5 for left, byte 3 for right).
    Half,
    /// The byte shared by both halves (byte 4).
    Shared,
}

/// Half-dependent offsets, masks and flash addresses, built once at attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalfLayout {
    pub handedness: Handedness,
    pub stick_offset: usize,
    pub half_button_byte: usize,
    pub buttons: [(Button, ButtonByte, u8); BUTTON_COUNT],
    pub stick_groups: [StickField; 3],
    pub user_stick: SpiRegion,
    pub factory_stick: SpiRegion,
    pub deadzone: SpiRegion,
}

impl HalfLayout {
    pub fn new(handedness: Handedness) -> Self {
        use ButtonByte::{Half, Shared};
        match handedness {
            Handedness::Left => Self {
                handedness,
                stick_offset: 6,
                half_button_byte: 5,
                buttons: [
                    (Button::DPadDown, Half, 0x01),
                    (Button::DPadUp, Half, 0x02),
                    (Button::DPadRight, Half, 0x04),
                    (Button::DPadLeft, Half, 0x08),
                    (Button::Minus, Shared, 0x01),
                    (Button::Plus, Shared, 0x02),
                    (Button::Home, Shared, 0x10),
                    (Button::Capture, Shared, 0x20),
                    (Button::Stick, Shared, 0x08),
                    (Button::Shoulder1, Half, 0x40),
                    (Button::Shoulder2, Half, 0x80),
                    (Button::Sr, Half, 0x10),
                    (Button::Sl, Half, 0x20),
                ],
                stick_groups: [
                    StickField::MaxAboveCenter,
                    StickField::Center,
                    StickField::MinBelowCenter,
                ],
                user_stick: USER_STICK_LEFT,
                factory_stick: FACTORY_STICK_LEFT,
                deadzone: DEADZONE_LEFT,
            },
            Handedness::Right => Self {
                handedness,
                stick_offset: 9,
                half_button_byte: 3,
                buttons: [
                    (Button::DPadDown, Half, 0x04),
                    (Button::DPadUp, Half, 0x02),
                    (Button::DPadRight, Half, 0x08),
                    (Button::DPadLeft, Half, 0x01),
                    (Button::Minus, Shared, 0x01),
                    (Button::Plus, Shared, 0x02),
                    (Button::Home, Shared, 0x10),
                    (Button::Capture, Shared, 0x20),
                    (Button::Stick, Shared, 0x04),
                    (Button::Shoulder1, Half, 0x40),
                    (Button::Shoulder2, Half, 0x80),
                    (Button::Sr, Half, 0x10),
                    (Button::Sl, Half, 0x20),
                ],
                stick_groups: [
                    StickField::Center,
                    StickField::MinBelowCenter,
                    StickField::MaxAboveCenter,
                ],
                user_stick: USER_STICK_RIGHT,
                factory_stick: FACTORY_STICK_RIGHT,
                deadzone: DEADZONE_RIGHT,
            },
        }
    }

    pub fn button_byte_index(&self, byte: ButtonByte) -> usize {
        match byte {
            ButtonByte::Half => self.half_button_byte,
            ButtonByte::Shared => SHARED_BUTTON_BYTE,
        }
    }
}

/// A subcommand frame in a fixed-size buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    bytes: [u8; REPORT_SIZE],
    len: usize,
}

impl CommandFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn subcommand(&self) -> u8 {
        self.bytes[10]
    }
}

/// Build a subcommand frame.
/// Format: [0x01, counter, rumble x8, subcommand, payload...]
pub fn build_command(counter: u8, subcommand: u8, payload: &[u8]) -> CommandFrame {
    let len = payload.len().min(MAX_PAYLOAD);
    let mut bytes = [0u8; REPORT_SIZE];
    bytes[0] = COMMAND_MARKER;
    bytes[1] = counter & 0x0F;
    bytes[2..10].copy_from_slice(&NEUTRAL_RUMBLE);
    bytes[10] = subcommand;
    bytes[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len].copy_from_slice(&payload[..len]);
    CommandFrame {
        bytes,
        len: FRAME_HEADER_SIZE + len,
    }
}

/// Payload of a flash read: [addr_low, addr_high, 0, 0, length].
pub fn build_spi_read_payload(region: SpiRegion) -> [u8; 5] {
    [region.address_low, region.address_high, 0x00, 0x00, region.length]
}

/// Unpack the two 12-bit values packed into three bytes.
///
/// low  = b0 | (b1 & 0xF) << 8
/// high = (b1 >> 4) | b2 << 4
pub fn unpack_12bit_pair(bytes: [u8; 3]) -> (u16, u16) {
    let low = bytes[0] as u16 | ((bytes[1] as u16 & 0x0F) << 8);
    let high = (bytes[1] as u16 >> 4) | ((bytes[2] as u16) << 4);
    (low, high)
}

/// Signed little-endian 16-bit value at `offset`.
pub fn read_i16_le(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Convert an orthonormal basis matrix to Euler angles [roll, pitch, yaw] in degrees.
///
/// `m` is row-major with the local axes as columns.
pub fn rotation_to_euler(m: &[[f32; 3]; 3]) -> [f32; 3] {
    let pitch = (-m[2][0]).clamp(-1.0, 1.0).asin();
    let (roll, yaw) = if pitch.cos().abs() > 1e-6 {
        let roll = m[2][1].atan2(m[2][2]);
        let yaw = m[1][0].atan2(m[0][0]);
        (roll, yaw)
    } else {
        // Yaw folds into roll; the middle row carries roll alone.
        let roll = (-m[1][2]).atan2(m[1][1]);
        (roll, 0.0)
    };
    [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command() {
        let frame = build_command(0x3, SUBCMD_SET_PLAYER_LEDS, &[0x01]);
        let buf = frame.as_bytes();
        assert_eq!(buf.len(), FRAME_HEADER_SIZE + 1);
        assert_eq!(frame.subcommand(), SUBCMD_SET_PLAYER_LEDS);
        assert_eq!(buf[0], 0x01);
        assert_eq!(buf[1], 0x3);
        assert_eq!(&buf[2..10], &NEUTRAL_RUMBLE);
        assert_eq!(buf[10], 0x30);
        assert_eq!(buf[11], 0x01);
    }

    #[test]
    fn test_build_command_masks_counter() {
        let frame = build_command(0x12, SUBCMD_SET_REPORT_MODE, &[]);
        assert_eq!(frame.as_bytes()[1], 0x02);
        assert_eq!(frame.as_bytes().len(), FRAME_HEADER_SIZE);
    }

    #[test]
    fn test_spi_read_payload() {
        let payload = build_spi_read_payload(USER_STICK_RIGHT);
        assert_eq!(payload, [0x1D, 0x80, 0x00, 0x00, 9]);
        assert_eq!(USER_STICK_RIGHT.address(), 0x801D);
    }

    #[test]
    fn test_unpack_12bit_pair() {
        assert_eq!(unpack_12bit_pair([0x34, 0x0C, 0x5A]), (0xC34, 0x5A0));
        assert_eq!(unpack_12bit_pair([0xFF, 0xFF, 0xFF]), (0xFFF, 0xFFF));
        assert_eq!(unpack_12bit_pair([0x00, 0x08, 0x80]), (0x800, 0x800));
    }

    #[test]
    fn test_read_i16_le() {
        assert_eq!(read_i16_le(&[0xFE, 0xFF], 0), -2);
        assert_eq!(read_i16_le(&[0x00, 0x34, 0x12], 1), 0x1234);
    }

    #[test]
    fn test_layouts_cover_every_button_once() {
        for handedness in [Handedness::Left, Handedness::Right] {
            let layout = HalfLayout::new(handedness);
            for (i, (button, _, _)) in layout.buttons.iter().enumerate() {
                assert_eq!(button.index(), i);
            }
        }
    }

    #[test]
    fn test_rotation_to_euler_identity() {
        let m = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let euler = rotation_to_euler(&m);
        assert!(euler.iter().all(|a| a.abs() < 1e-4));
    }

    #[test]
    fn test_rotation_to_euler_gimbal_lock_keeps_roll_sign() {
        let (sr, cr) = 30f32.to_radians().sin_cos();
        for sp in [1.0f32, -1.0] {
            // Ry(pitch) * Rx(roll) with cos(pitch) = 0.
            let m = [[0.0, sp * sr, sp * cr], [0.0, cr, -sr], [-sp, 0.0, 0.0]];
            let [roll, pitch, yaw] = rotation_to_euler(&m);
            assert!((roll - 30.0).abs() < 1e-3, "roll {} at pitch {}", roll, pitch);
            assert!((pitch - 90.0 * sp).abs() < 1e-3);
            assert_eq!(yaw, 0.0);
        }
    }
}
