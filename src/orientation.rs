//! Complementary filter fusing gyroscope and accelerometer samples into an
//! orthonormal orientation basis.
//!
//! Each step applies a first-order (small-angle) rotation and then a single
//! re-orthonormalization pass, so |I| = |J| = |K| = 1 and I·J ≈ 0 hold after
//! every update. Both are only accurate while the per-step rotation stays
//! small, which the 5 ms sub-sample cadence provides.

use crate::protocol;
use crate::types::{ImuSample, Vector3};

pub const DEFAULT_FILTER_COEFFICIENT: f32 = 0.05;

/// Device axes (I, J, K) expressed in the world frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationBasis {
    pub i: Vector3,
    pub j: Vector3,
    pub k: Vector3,
}

impl Default for OrientationBasis {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl OrientationBasis {
    pub const IDENTITY: OrientationBasis = OrientationBasis {
        i: Vector3::X,
        j: Vector3::Y,
        k: Vector3::Z,
    };

    /// Row-major rotation matrix with I, J, K as columns.
    pub fn rotation_matrix(&self) -> [[f32; 3]; 3] {
        [
            [self.i.x, self.j.x, self.k.x],
            [self.i.y, self.j.y, self.k.y],
            [self.i.z, self.j.z, self.k.z],
        ]
    }

    /// Euler angles [roll, pitch, yaw] in degrees.
    pub fn euler_deg(&self) -> [f32; 3] {
        protocol::rotation_to_euler(&self.rotation_matrix())
    }

    fn rotate_small(&mut self, delta_theta: Vector3) {
        self.i += delta_theta.cross(self.i);
        self.j += delta_theta.cross(self.j);
        self.k += delta_theta.cross(self.k);
    }

    fn orthonormalize(&mut self) {
        let err = self.i.dot(self.j) * 0.5;
        let i = (self.i - err * self.j).normalized();
        self.j = (self.j - err * self.i).normalized();
        self.i = i;
        self.k = self.i.cross(self.j);
    }
}

#[derive(Debug, Clone)]
pub struct OrientationFilter {
    basis: OrientationBasis,
    coefficient: f32,
    reset_pending: bool,
}

impl Default for OrientationFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_COEFFICIENT)
    }
}

impl OrientationFilter {
    pub fn new(coefficient: f32) -> Self {
        Self {
            basis: OrientationBasis::IDENTITY,
            coefficient,
            reset_pending: true,
        }
    }

    pub fn basis(&self) -> &OrientationBasis {
        &self.basis
    }

    pub fn coefficient(&self) -> f32 {
        self.coefficient
    }

    /// Weight of the accelerometer correction against gyro integration.
    pub fn set_coefficient(&mut self, coefficient: f32) {
        self.coefficient = coefficient;
    }

    /// Treat the next sample as the first: the basis snaps back to identity.
    pub fn recenter(&mut self) {
        self.reset_pending = true;
    }

    /// Advance the filter by one IMU sub-sample.
    pub fn update(&mut self, sample: &ImuSample, dt_seconds: f32) {
        if self.reset_pending {
            self.basis = OrientationBasis::IDENTITY;
            self.reset_pending = false;
            return;
        }

        let k_acc = -sample.accel.normalized();
        let w_accel = self.basis.k.cross(k_acc);
        let w_gyro = -sample.gyro * dt_seconds;
        let delta_theta = (self.coefficient * w_accel + w_gyro) / (1.0 + self.coefficient);

        self.basis.rotate_small(delta_theta);
        self.basis.orthonormalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TOLERANCE: f32 = 1e-3;

    fn assert_orthonormal(b: &OrientationBasis) {
        assert!((b.i.length() - 1.0).abs() < TOLERANCE, "|I| = {}", b.i.length());
        assert!((b.j.length() - 1.0).abs() < TOLERANCE, "|J| = {}", b.j.length());
        assert!((b.k.length() - 1.0).abs() < TOLERANCE, "|K| = {}", b.k.length());
        assert!(b.i.dot(b.j).abs() < TOLERANCE, "I.J = {}", b.i.dot(b.j));
    }

    fn sample(gyro: [f32; 3], accel: [f32; 3]) -> ImuSample {
        ImuSample {
            gyro: Vector3::from_array(gyro),
            accel: Vector3::from_array(accel),
        }
    }

    #[test]
    fn test_first_sample_resets_to_identity() {
        let mut filter = OrientationFilter::default();
        filter.update(&sample([500.0, 0.0, 0.0], [1.0, 0.0, 0.0]), 0.005);
        assert_eq!(*filter.basis(), OrientationBasis::IDENTITY);
    }

    #[test]
    fn test_steady_state_at_rest() {
        let mut filter = OrientationFilter::default();
        let at_rest = sample([0.0; 3], [0.0, 0.0, -1.0]);
        filter.update(&at_rest, 0.005);
        let after_first = *filter.basis();
        for _ in 0..10_000 {
            filter.update(&at_rest, 0.005);
        }
        let after_n = filter.basis();
        assert!((after_n.i - after_first.i).length() < 1e-5);
        assert!((after_n.j - after_first.j).length() < 1e-5);
        assert!((after_n.k - after_first.k).length() < 1e-5);
    }

    #[test]
    fn test_gyro_rotates_basis() {
        let mut filter = OrientationFilter::new(0.0);
        let spin = sample([0.0, 0.0, 10.0], [0.0, 0.0, -1.0]);
        filter.update(&spin, 0.005);
        filter.update(&spin, 0.005);
        let b = filter.basis();
        // Rotation about K leaves K in place and moves I off the X axis.
        assert!((b.k - Vector3::Z).length() < 1e-5);
        assert!(b.i.y.abs() > 0.01);
        assert_orthonormal(b);
    }

    #[test]
    fn test_accelerometer_pulls_k_toward_gravity() {
        let mut filter = OrientationFilter::new(0.5);
        let tilted = sample([0.0; 3], [-1.0, 0.0, 0.0]);
        filter.update(&tilted, 0.005);
        let start = filter.basis().k.dot(Vector3::X);
        for _ in 0..50 {
            filter.update(&tilted, 0.005);
        }
        assert!(filter.basis().k.dot(Vector3::X) > start + 0.1);
        assert_orthonormal(filter.basis());
    }

    #[test]
    fn test_recenter_returns_to_identity() {
        let mut filter = OrientationFilter::default();
        let spin = sample([40.0, -20.0, 5.0], [0.3, 0.1, -0.9]);
        for _ in 0..20 {
            filter.update(&spin, 0.005);
        }
        assert_ne!(*filter.basis(), OrientationBasis::IDENTITY);
        filter.recenter();
        filter.update(&spin, 0.005);
        assert_eq!(*filter.basis(), OrientationBasis::IDENTITY);
    }

    #[test]
    fn test_zero_accel_does_not_produce_nan() {
        let mut filter = OrientationFilter::default();
        let free_fall = sample([1.0, 2.0, 3.0], [0.0; 3]);
        for _ in 0..5 {
            filter.update(&free_fall, 0.005);
        }
        assert!(filter.basis().i.length().is_finite());
        assert_orthonormal(filter.basis());
    }

    #[test]
    fn test_euler_of_identity_is_zero() {
        let euler = OrientationBasis::IDENTITY.euler_deg();
        assert!(euler.iter().all(|a| a.abs() < 1e-4));
    }

    // Raw i16 extremes after scaling: about ±40 dps and ±8.2 g.
    fn imu_sample() -> impl Strategy<Value = ImuSample> {
        let gyro_max = protocol::GYRO_SCALE_DPS * i16::MAX as f32;
        let accel_max = protocol::ACCEL_SCALE_G * i16::MAX as f32;
        (
            prop::array::uniform3(-gyro_max..gyro_max),
            prop::array::uniform3(-accel_max..accel_max),
        )
            .prop_map(|(gyro, accel)| sample(gyro, accel))
    }

    // At a full-scale rotation every step, the single correction pass
    // leaves I.J near 6e-3. Lengths stay unit regardless.
    const FULL_SCALE_DOT_TOLERANCE: f32 = 1e-2;

    proptest! {
        #[test]
        fn prop_basis_stays_orthonormal_at_moderate_rates(
            samples in prop::collection::vec(imu_sample(), 1..200),
            coefficient in 0.0f32..0.1,
        ) {
            let mut filter = OrientationFilter::new(coefficient);
            for s in &samples {
                // Quarter scale keeps each step well inside the small-angle regime.
                let slow = ImuSample { gyro: s.gyro * 0.25, accel: s.accel };
                filter.update(&slow, 0.005);
                assert_orthonormal(filter.basis());
            }
        }

        #[test]
        fn prop_basis_stays_normalized_at_full_scale(
            samples in prop::collection::vec(imu_sample(), 1..200),
            coefficient in 0.0f32..0.1,
        ) {
            let mut filter = OrientationFilter::new(coefficient);
            for s in &samples {
                filter.update(s, 0.005);
                let b = filter.basis();
                prop_assert!((b.i.length() - 1.0).abs() < TOLERANCE);
                prop_assert!((b.j.length() - 1.0).abs() < TOLERANCE);
                prop_assert!(b.k.length() <= 1.0 + TOLERANCE);
                prop_assert!(b.i.dot(b.j).abs() < FULL_SCALE_DOT_TOLERANCE, "I.J = {}", b.i.dot(b.j));
            }
        }
    }
}
