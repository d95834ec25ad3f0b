use crate::orientation::DEFAULT_FILTER_COEFFICIENT;

pub const DEFAULT_DROP_THRESHOLD: u32 = 1000;
pub const DEFAULT_POLL_TIMEOUT_MS: i32 = 20;

/// Per-controller settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Ask the controller to stream IMU data.
    pub imu_enabled: bool,
    /// Run the orientation filter on every IMU sub-sample. When off, only the
    /// first sub-sample of each report is decoded.
    pub orientation_enabled: bool,
    pub filter_coefficient: f32,
    /// Consecutive failed polls tolerated before the connection is dropped.
    pub drop_threshold: u32,
    pub poll_timeout_ms: i32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            imu_enabled: true,
            orientation_enabled: true,
            filter_coefficient: DEFAULT_FILTER_COEFFICIENT,
            drop_threshold: DEFAULT_DROP_THRESHOLD,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
        }
    }
}

impl ControllerConfig {
    /// Defaults overridden by `JOYCON_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            imu_enabled: read_env_bool("JOYCON_IMU", defaults.imu_enabled),
            orientation_enabled: read_env_bool("JOYCON_ORIENTATION", defaults.orientation_enabled),
            filter_coefficient: read_env_f32("JOYCON_FILTER_COEFFICIENT", defaults.filter_coefficient),
            drop_threshold: read_env_u32("JOYCON_DROP_THRESHOLD", defaults.drop_threshold),
            poll_timeout_ms: read_env_u32("JOYCON_POLL_TIMEOUT_MS", defaults.poll_timeout_ms as u32)
                .min(i32::MAX as u32) as i32,
        };
        log::debug!("Controller config: {:?}", config);
        config
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn read_env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn read_env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
}
