//! Core types and conventions for the head tracker

use nalgebra::{Matrix3, Vector3};

/// Persisted calibration state for all three sensors
///
/// One record is live in memory at a time and one copy is persisted by the
/// [`CalibrationStore`](crate::store::CalibrationStore). Each calibration
/// stage mutates only its own subset of fields; `valid` is the single
/// authority for whether a usable calibration exists. Readers must treat
/// `valid == false` as "ignore every field" - the other fields may be stale.
///
/// The default record is identity matrices, unit sensitivities, and zero
/// offsets, so an incompletely calibrated record is always a safe no-op
/// transform.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use head_tracker::CalibrationRecord;
///
/// let record = CalibrationRecord::default();
/// let raw = Vector3::new(1.0, -2.0, 0.5);
///
/// // Default calibration leaves readings unchanged
/// assert_eq!(record.calibrate_gyroscope(raw), raw);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationRecord {
    /// Whether this record holds a completed calibration
    pub valid: bool,
    /// Gyroscope misalignment correction (kept identity on this device)
    pub gyroscope_misalignment: Matrix3<f32>,
    /// Gyroscope per-axis scale factors
    pub gyroscope_sensitivity: Vector3<f32>,
    /// Gyroscope bias, subtracted before scaling
    pub gyroscope_offset: Vector3<f32>,
    /// Accelerometer misalignment correction (kept identity on this device)
    pub accelerometer_misalignment: Matrix3<f32>,
    /// Accelerometer per-axis scale factors
    pub accelerometer_sensitivity: Vector3<f32>,
    /// Accelerometer offset, subtracted before scaling
    pub accelerometer_offset: Vector3<f32>,
    /// Soft iron correction matrix, applied after hard iron subtraction
    pub soft_iron_matrix: Matrix3<f32>,
    /// Hard iron bias from nearby ferromagnetic material
    pub hard_iron_offset: Vector3<f32>,
}

impl Default for CalibrationRecord {
    fn default() -> Self {
        Self {
            valid: false,
            gyroscope_misalignment: Matrix3::identity(),
            gyroscope_sensitivity: Vector3::new(1.0, 1.0, 1.0),
            gyroscope_offset: Vector3::zeros(),
            accelerometer_misalignment: Matrix3::identity(),
            accelerometer_sensitivity: Vector3::new(1.0, 1.0, 1.0),
            accelerometer_offset: Vector3::zeros(),
            soft_iron_matrix: Matrix3::identity(),
            hard_iron_offset: Vector3::zeros(),
        }
    }
}

impl CalibrationRecord {
    /// Apply gyroscope calibration to a raw reading
    ///
    /// Order matches how the stages estimate their parameters:
    /// `misalignment * ((raw - offset) * sensitivity)` with sensitivity as a
    /// per-axis scale.
    pub fn calibrate_gyroscope(&self, raw: Vector3<f32>) -> Vector3<f32> {
        self.gyroscope_misalignment
            * (raw - self.gyroscope_offset).component_mul(&self.gyroscope_sensitivity)
    }

    /// Apply accelerometer calibration to a raw reading
    pub fn calibrate_accelerometer(&self, raw: Vector3<f32>) -> Vector3<f32> {
        self.accelerometer_misalignment
            * (raw - self.accelerometer_offset).component_mul(&self.accelerometer_sensitivity)
    }

    /// Apply hard and soft iron correction to a raw magnetometer reading
    pub fn calibrate_magnetometer(&self, raw: Vector3<f32>) -> Vector3<f32> {
        self.soft_iron_matrix * (raw - self.hard_iron_offset)
    }
}

/// Orientation estimate in degrees, as produced by the fusion algorithm
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    /// Rotation about the forward axis in degrees
    pub roll: f32,
    /// Rotation about the lateral axis in degrees
    pub pitch: f32,
    /// Heading in degrees
    pub yaw: f32,
}

impl EulerAngles {
    pub fn new(roll: f32, pitch: f32, yaw: f32) -> Self {
        Self { roll, pitch, yaw }
    }
}

/// Operator-facing indicator states
///
/// Closed set of signals the device can show. The mapping to actual LED
/// colors lives in the platform's [`Indicator`](crate::hal::Indicator)
/// implementation, keeping color tables out of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    /// All indicators off
    Off,
    /// Gyroscope bias stage running - keep the device still
    CalibratingGyroscope,
    /// Accelerometer range stage running - rotate the device
    CalibratingAccelerometer,
    /// Magnetometer range stage running - sweep a figure eight
    CalibratingMagnetometer,
    /// Waiting for a host connection
    WaitingForHost,
    /// Shake gesture detected, sustain to trigger a calibration reset
    ShakeArmed,
    /// Streaming orientation frames to a connected host
    Streaming,
    /// Battery band indications
    BatteryHigh,
    BatteryMedium,
    BatteryLow,
    /// Unrecoverable initialization failure
    Fault,
}

impl IndicatorState {
    /// Variant name as a static string for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorState::Off => "Off",
            IndicatorState::CalibratingGyroscope => "CalibratingGyroscope",
            IndicatorState::CalibratingAccelerometer => "CalibratingAccelerometer",
            IndicatorState::CalibratingMagnetometer => "CalibratingMagnetometer",
            IndicatorState::WaitingForHost => "WaitingForHost",
            IndicatorState::ShakeArmed => "ShakeArmed",
            IndicatorState::Streaming => "Streaming",
            IndicatorState::BatteryHigh => "BatteryHigh",
            IndicatorState::BatteryMedium => "BatteryMedium",
            IndicatorState::BatteryLow => "BatteryLow",
            IndicatorState::Fault => "Fault",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    #[test]
    fn test_default_record_is_noop_transform() {
        let record = CalibrationRecord::default();
        assert!(!record.valid);

        let raw = Vector3::new(0.3, -1.2, 9.7);
        assert!((record.calibrate_gyroscope(raw) - raw).norm() < EPSILON);
        assert!((record.calibrate_accelerometer(raw) - raw).norm() < EPSILON);
        assert!((record.calibrate_magnetometer(raw) - raw).norm() < EPSILON);
    }

    #[test]
    fn test_gyroscope_calibration_order() {
        let record = CalibrationRecord {
            gyroscope_sensitivity: Vector3::new(0.5, 0.5, 0.5),
            gyroscope_offset: Vector3::new(0.1, 0.2, 0.3),
            ..Default::default()
        };

        let calibrated = record.calibrate_gyroscope(Vector3::new(1.0, 2.0, 3.0));
        // (raw - offset) scaled: (0.9, 1.8, 2.7) * 0.5
        let expected = Vector3::new(0.45, 0.9, 1.35);
        assert!((calibrated - expected).norm() < EPSILON);
    }

    #[test]
    fn test_magnetometer_calibration_subtracts_hard_iron() {
        let record = CalibrationRecord {
            hard_iron_offset: Vector3::new(10.0, 20.0, 30.0),
            ..Default::default()
        };

        let calibrated = record.calibrate_magnetometer(Vector3::new(100.0, 200.0, 300.0));
        let expected = Vector3::new(90.0, 180.0, 270.0);
        assert!((calibrated - expected).norm() < EPSILON);
    }

    #[test]
    fn test_soft_iron_scaling() {
        let record = CalibrationRecord {
            soft_iron_matrix: Matrix3::from_diagonal(&Vector3::new(0.5, 2.0, 1.0)),
            hard_iron_offset: Vector3::new(1.0, 1.0, 1.0),
            ..Default::default()
        };

        let calibrated = record.calibrate_magnetometer(Vector3::new(3.0, 3.0, 3.0));
        let expected = Vector3::new(1.0, 4.0, 2.0);
        assert!((calibrated - expected).norm() < EPSILON);
    }
}
