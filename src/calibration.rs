//! Stick and gyroscope calibration pulled from the controller's flash.
//!
//! Nothing is cached between sessions: [`Calibration::read`] runs on every
//! attach.

use crate::command::CommandChannel;
use crate::protocol::{
    self, HalfLayout, StickField, DEADZONE_OFFSET, FACTORY_GYRO_NEUTRAL, FACTORY_GYRO_OFFSETS,
    FLASH_ERASED, USER_GYRO_NEUTRAL, USER_GYRO_OFFSETS,
};
use crate::transport::Transport;
use crate::Result;

/// Where a calibration block was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationSource {
    Factory,
    User,
}

/// Per-axis stick calibration in raw 12-bit units, `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickCalibration {
    pub max_above_center: [u16; 2],
    pub center: [u16; 2],
    pub min_below_center: [u16; 2],
    pub deadzone: u16,
    pub source: CalibrationSource,
}

impl Default for StickCalibration {
    fn default() -> Self {
        Self {
            max_above_center: [0x600; 2],
            center: [0x800; 2],
            min_below_center: [0x600; 2],
            deadzone: 0xAE,
            source: CalibrationSource::Factory,
        }
    }
}

impl StickCalibration {
    /// Decode the 9-byte stick region; group order depends on the half.
    pub fn parse(buf: &[u8], layout: &HalfLayout, source: CalibrationSource) -> Self {
        let mut cal = StickCalibration {
            source,
            ..Default::default()
        };
        for (group, field) in layout.stick_groups.iter().enumerate() {
            let i = group * 3;
            let (x, y) = protocol::unpack_12bit_pair([buf[i], buf[i + 1], buf[i + 2]]);
            let slot = match field {
                StickField::MaxAboveCenter => &mut cal.max_above_center,
                StickField::Center => &mut cal.center,
                StickField::MinBelowCenter => &mut cal.min_below_center,
            };
            *slot = [x, y];
        }
        cal
    }

    /// Map a raw axis reading to a calibrated value.
    ///
    /// Not clamped: a worn stick can exceed ±1.
    pub fn apply_axis(&self, axis: usize, raw: u16) -> f32 {
        let diff = raw as f32 - self.center[axis] as f32;
        if diff.abs() < self.deadzone as f32 {
            return 0.0;
        }
        let range = if diff > 0.0 {
            self.max_above_center[axis]
        } else {
            self.min_below_center[axis]
        };
        if range == 0 {
            return 0.0;
        }
        diff / range as f32
    }
}

/// The deadzone is the low 12 bits at bytes [3, 4] of its region.
pub fn parse_deadzone(buf: &[u8]) -> u16 {
    let (low, _) = protocol::unpack_12bit_pair([
        buf[DEADZONE_OFFSET],
        buf[DEADZONE_OFFSET + 1],
        buf[DEADZONE_OFFSET + 2],
    ]);
    low
}

/// Gyroscope zero-rate offsets in raw sensor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GyroCalibration {
    pub neutral: [i16; 3],
    pub source: CalibrationSource,
}

impl Default for GyroCalibration {
    fn default() -> Self {
        Self {
            neutral: [0; 3],
            source: CalibrationSource::Factory,
        }
    }
}

impl GyroCalibration {
    pub fn parse(buf: &[u8], offsets: [usize; 3], source: CalibrationSource) -> Self {
        Self {
            neutral: offsets.map(|o| protocol::read_i16_le(buf, o)),
            source,
        }
    }

    /// Whether the factory offsets look usable.
    ///
    /// A sum of -3 marks blank data and any axis beyond ±100 is rejected.
    /// Real factory data that happens to sum to -3 is misjudged as blank.
    pub fn is_plausible(&self) -> bool {
        let sum: i32 = self.neutral.iter().map(|&v| v as i32).sum();
        sum != -3 && self.neutral.iter().all(|&v| (v as i32).abs() <= 100)
    }
}

/// Everything read from flash at attach time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Calibration {
    pub stick: StickCalibration,
    pub gyro: GyroCalibration,
}

impl Calibration {
    /// Pull stick, deadzone and gyro calibration from the device.
    ///
    /// Must run after the controller is in a report mode that returns
    /// subcommand replies (0x3F).
    pub fn read<T: Transport>(commands: &mut CommandChannel<T>, layout: &HalfLayout) -> Result<Self> {
        let user = commands.read_spi(layout.user_stick)?;
        let mut stick = if user.iter().all(|&b| b == FLASH_ERASED) {
            log::info!("Using factory stick calibration data");
            let factory = commands.read_spi(layout.factory_stick)?;
            StickCalibration::parse(&factory, layout, CalibrationSource::Factory)
        } else {
            log::info!("Using user stick calibration data");
            StickCalibration::parse(&user, layout, CalibrationSource::User)
        };

        stick.deadzone = parse_deadzone(&commands.read_spi(layout.deadzone)?);

        let factory_gyro = GyroCalibration::parse(
            &commands.read_spi(FACTORY_GYRO_NEUTRAL)?,
            FACTORY_GYRO_OFFSETS,
            CalibrationSource::Factory,
        );
        let gyro = if factory_gyro.is_plausible() {
            factory_gyro
        } else {
            log::info!(
                "Factory gyro neutral {:?} rejected, using user calibration",
                factory_gyro.neutral
            );
            GyroCalibration::parse(
                &commands.read_spi(USER_GYRO_NEUTRAL)?,
                USER_GYRO_OFFSETS,
                CalibrationSource::User,
            )
        };

        log::debug!(
            "Calibration: center={:?} max={:?} min={:?} deadzone={} gyro={:?}",
            stick.center,
            stick.max_above_center,
            stick.min_below_center,
            stick.deadzone,
            gyro.neutral
        );

        Ok(Calibration { stick, gyro })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::types::Handedness;
    use std::sync::{Arc, Mutex};

    const SAMPLE: [u8; 9] = [0x34, 0x0C, 0x5A, 0x78, 0x02, 0xA1, 0x9C, 0x05, 0x3F];

    #[test]
    fn test_unpack_left_stick_calibration() {
        let layout = HalfLayout::new(Handedness::Left);
        let cal = StickCalibration::parse(&SAMPLE, &layout, CalibrationSource::User);

        // 0x34 | 0xC << 8 = 0xC34, 0x0 | 0x5A << 4 = 0x5A0
        assert_eq!(cal.max_above_center, [3124, 1440]);
        // 0x78 | 0x2 << 8 = 0x278, 0x0 | 0xA1 << 4 = 0xA10
        assert_eq!(cal.center, [632, 2576]);
        // 0x9C | 0x5 << 8 = 0x59C, 0x0 | 0x3F << 4 = 0x3F0
        assert_eq!(cal.min_below_center, [1436, 1008]);
    }

    #[test]
    fn test_unpack_right_stick_calibration_uses_mirrored_slots() {
        let layout = HalfLayout::new(Handedness::Right);
        let cal = StickCalibration::parse(&SAMPLE, &layout, CalibrationSource::Factory);
        assert_eq!(cal.center, [3124, 1440]);
        assert_eq!(cal.min_below_center, [632, 2576]);
        assert_eq!(cal.max_above_center, [1436, 1008]);
    }

    #[test]
    fn test_parse_deadzone() {
        let mut buf = [0u8; 16];
        buf[3] = 0xAE;
        buf[4] = 0x40;
        assert_eq!(parse_deadzone(&buf), 0x0AE);
    }

    #[test]
    fn test_apply_axis_deadzone_and_scaling() {
        let cal = StickCalibration {
            max_above_center: [1500, 1500],
            center: [2048, 2048],
            min_below_center: [1200, 1200],
            deadzone: 100,
            source: CalibrationSource::Factory,
        };
        assert_eq!(cal.apply_axis(0, 2048), 0.0);
        assert_eq!(cal.apply_axis(0, 2048 + 99), 0.0);
        assert!((cal.apply_axis(0, 2048 + 150) - 150.0 / 1500.0).abs() < 1e-6);
        assert!((cal.apply_axis(1, 2048 - 600) + 0.5).abs() < 1e-6);
        // Overshoot is not clamped.
        assert!(cal.apply_axis(0, 2048 + 1800) > 1.0);
    }

    #[test]
    fn test_gyro_plausibility_heuristic() {
        let gyro = |neutral| GyroCalibration {
            neutral,
            source: CalibrationSource::Factory,
        };
        assert!(gyro([10, -20, 5]).is_plausible());
        assert!(gyro([100, -100, 0]).is_plausible());
        assert!(!gyro([-1, -1, -1]).is_plausible());
        assert!(!gyro([0, -3, 0]).is_plausible());
        assert!(!gyro([101, 0, 0]).is_plausible());
    }

    #[test]
    fn test_gyro_parse_little_endian() {
        let buf = [0xFF, 0xFF, 0x0A, 0x00, 0xF6, 0xFF, 0, 0, 0, 0];
        let gyro = GyroCalibration::parse(&buf, FACTORY_GYRO_OFFSETS, CalibrationSource::Factory);
        assert_eq!(gyro.neutral, [-1, 10, -10]);
    }

    fn read_with(mock: &MockTransport, handedness: Handedness) -> Calibration {
        let mut commands = CommandChannel::new(Arc::new(Mutex::new(mock.clone())));
        Calibration::read(&mut commands, &HalfLayout::new(handedness)).unwrap()
    }

    #[test]
    fn test_read_falls_back_to_factory_stick_when_user_erased() {
        let mock = MockTransport::new();
        mock.set_flash(0x603D, &SAMPLE);
        mock.set_flash(0x6086, &[0, 0, 0, 0x64, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        mock.set_flash(0x8034, &[0x05, 0x00, 0xFB, 0xFF, 0x02, 0x00, 0, 0, 0, 0]);

        let cal = read_with(&mock, Handedness::Left);
        assert_eq!(cal.stick.source, CalibrationSource::Factory);
        assert_eq!(cal.stick.center, [632, 2576]);
        assert_eq!(cal.stick.deadzone, 100);
        assert_eq!(cal.gyro.neutral, [5, -5, 2]);
        assert_eq!(cal.gyro.source, CalibrationSource::Factory);
    }

    #[test]
    fn test_read_prefers_user_stick_data() {
        let mock = MockTransport::new();
        mock.set_flash(0x801D, &SAMPLE);
        mock.set_flash(0x6098, &[0u8; 16]);
        mock.set_flash(0x8034, &[0u8; 10]);

        let cal = read_with(&mock, Handedness::Right);
        assert_eq!(cal.stick.source, CalibrationSource::User);
        assert_eq!(cal.stick.center, [3124, 1440]);
        // The factory stick region is never touched.
        assert!(mock.writes().iter().all(|w| w[11] != 0x46));
    }

    #[test]
    fn test_read_uses_user_gyro_when_factory_is_blank() {
        let mock = MockTransport::new();
        // Erased flash reads as -1 on every axis: sum -3.
        mock.set_flash(0x6029, &[0, 0, 0, 0x0C, 0x00, 0xF4, 0xFF, 0x01, 0x00, 0]);

        let cal = read_with(&mock, Handedness::Left);
        assert_eq!(cal.gyro.source, CalibrationSource::User);
        assert_eq!(cal.gyro.neutral, [12, -12, 1]);
    }
}
