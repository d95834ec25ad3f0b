use std::ffi::CString;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// Which physical half of the Joy-Con pair a device is.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left = 0,
    Right = 1,
}

impl Handedness {
    /// Map a Nintendo product id to the half it identifies.
    pub fn from_product_id(pid: u16) -> Option<Handedness> {
        match pid {
            crate::protocol::PID_LEFT => Some(Handedness::Left),
            crate::protocol::PID_RIGHT => Some(Handedness::Right),
            _ => None,
        }
    }
}

/// Connection lifecycle of a controller.
///
/// The variants are ordered: processing is gated on `>= Attached`, IMU
/// fusion on `>= ImuDataOk`. `Dropped` sticks until detach.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ConnectionState {
    #[default]
    NotAttached = 0,
    Attached = 1,
    ImuDataOk = 2,
    Dropped = 3,
}

/// Button identifiers decoded from an input report.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    DPadDown = 0,
    DPadUp = 1,
    DPadRight = 2,
    DPadLeft = 3,
    Minus = 4,
    Plus = 5,
    Home = 6,
    Capture = 7,
    Stick = 8,
    Shoulder1 = 9,
    Shoulder2 = 10,
    Sr = 11,
    Sl = 12,
}

pub const BUTTON_COUNT: usize = 13;

impl Button {
    pub const ALL: [Button; BUTTON_COUNT] = [
        Button::DPadDown,
        Button::DPadUp,
        Button::DPadRight,
        Button::DPadLeft,
        Button::Minus,
        Button::Plus,
        Button::Home,
        Button::Capture,
        Button::Stick,
        Button::Shoulder1,
        Button::Shoulder2,
        Button::Sr,
        Button::Sl,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Button> {
        Button::ALL.get(index).copied()
    }

    /// Stable name for mapping onto host input identifiers.
    pub fn name(self) -> &'static str {
        match self {
            Button::DPadDown => "dpad_down",
            Button::DPadUp => "dpad_up",
            Button::DPadRight => "dpad_right",
            Button::DPadLeft => "dpad_left",
            Button::Minus => "minus",
            Button::Plus => "plus",
            Button::Home => "home",
            Button::Capture => "capture",
            Button::Stick => "stick",
            Button::Shoulder1 => "shoulder_1",
            Button::Shoulder2 => "shoulder_2",
            Button::Sr => "sr",
            Button::Sl => "sl",
        }
    }
}

bitflags::bitflags! {
    /// Player indicator LEDs (subcommand 0x30 payload).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[repr(C)]
    pub struct PlayerLeds: u8 {
        const PLAYER_1 = 1 << 0;
        const PLAYER_2 = 1 << 1;
        const PLAYER_3 = 1 << 2;
        const PLAYER_4 = 1 << 3;
        const FLASH_1  = 1 << 4;
        const FLASH_2  = 1 << 5;
        const FLASH_3  = 1 << 6;
        const FLASH_4  = 1 << 7;
    }
}

/// A discovered Joy-Con HID interface.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: CString,
    pub serial: String,
    pub product_id: u16,
    pub handedness: Handedness,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const X: Vector3 = Vector3 { x: 1.0, y: 0.0, z: 0.0 };
    pub const Y: Vector3 = Vector3 { x: 0.0, y: 1.0, z: 0.0 };
    pub const Z: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 1.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn dot(self, other: Vector3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vector3) -> Vector3 {
        Vector3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or zero for a degenerate input.
    pub fn normalized(self) -> Vector3 {
        let len = self.length();
        if len <= 1e-8 {
            return Vector3::ZERO;
        }
        self / len
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vector3 {
    fn add_assign(&mut self, rhs: Vector3) {
        *self = *self + rhs;
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vector3 {
    type Output = Vector3;

    fn mul(self, rhs: f32) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Mul<Vector3> for f32 {
    type Output = Vector3;

    fn mul(self, rhs: Vector3) -> Vector3 {
        rhs * self
    }
}

impl Div<f32> for Vector3 {
    type Output = Vector3;

    fn div(self, rhs: f32) -> Vector3 {
        Vector3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;

    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

/// One decoded IMU sub-sample in physical units.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImuSample {
    /// Accelerometer in g.
    pub accel: Vector3,
    /// Gyroscope in degrees per second, neutral offset removed.
    pub gyro: Vector3,
}
