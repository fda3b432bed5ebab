//! Per-sample pipeline from raw sensor readings to output orientation
//!
//! Each tick polls the sensor driver, applies the calibration transforms,
//! runs the external fusion algorithm, and remaps the fused orientation
//! into the output consumer's convention. The fusion algorithm and the
//! long-term gyroscope drift filter are consumed as black boxes through the
//! [`Fusion`] and [`GyroOffset`] traits.

use nalgebra::Vector3;

use crate::hal::Imu;
use crate::types::{CalibrationRecord, EulerAngles};

/// Black-box orientation fusion algorithm (AHRS)
///
/// Accepts calibrated gyroscope (deg/s), accelerometer (g), and magnetometer
/// vectors plus a time delta in seconds, and integrates them into an
/// orientation estimate.
pub trait Fusion {
    fn update(
        &mut self,
        gyroscope: Vector3<f32>,
        accelerometer: Vector3<f32>,
        magnetometer: Vector3<f32>,
        delta_time: f32,
    );

    /// Current orientation estimate in degrees
    fn euler_angles(&self) -> EulerAngles;
}

/// Black-box long-term gyroscope offset correction filter
///
/// Fed the calibrated gyroscope vector every successful tick; returns the
/// drift-corrected vector that the fusion algorithm consumes.
pub trait GyroOffset {
    fn update(&mut self, gyroscope: Vector3<f32>) -> Vector3<f32>;
}

/// Pipeline configuration
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Whether hard/soft iron correction is applied to the live
    /// magnetometer path
    ///
    /// The correction is always *estimated* when the magnetometer stage
    /// runs; applying it is a separate decision, off by default.
    pub apply_magnetic_correction: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            apply_magnetic_correction: false,
        }
    }
}

/// Calibrated sensor-fusion pipeline
///
/// Owns the live calibration record and the last-known raw readings. A
/// record with `valid == false` is replaced by the default no-op record at
/// construction, so an invalid calibration can never influence the
/// orientation output.
pub struct FusionPipeline<F: Fusion, O: GyroOffset> {
    calibration: CalibrationRecord,
    fusion: F,
    offset: O,
    settings: PipelineSettings,
    gyroscope: Vector3<f32>,
    accelerometer: Vector3<f32>,
    magnetometer: Vector3<f32>,
    last_update_us: Option<u64>,
}

impl<F: Fusion, O: GyroOffset> FusionPipeline<F, O> {
    pub fn new(
        record: CalibrationRecord,
        fusion: F,
        offset: O,
        settings: PipelineSettings,
    ) -> Self {
        let calibration = if record.valid {
            record
        } else {
            CalibrationRecord::default()
        };

        Self {
            calibration,
            fusion,
            offset,
            settings,
            gyroscope: Vector3::zeros(),
            accelerometer: Vector3::zeros(),
            magnetometer: Vector3::zeros(),
            last_update_us: None,
        }
    }

    /// Calibration in effect (the no-op default when the supplied record
    /// was invalid)
    pub fn calibration(&self) -> &CalibrationRecord {
        &self.calibration
    }

    /// Run one pipeline tick
    ///
    /// Polls the sensor driver (stale axes reuse the previous reading),
    /// applies calibration, and advances the fusion algorithm with the
    /// elapsed time since the previous successful tick. Returns `None` and
    /// skips the fusion update entirely when any calibrated vector contains
    /// a NaN; the next tick naturally retries.
    pub fn update<I: Imu>(&mut self, imu: &mut I, now_us: u64) -> Option<EulerAngles> {
        if let Some(gyroscope) = imu.gyroscope() {
            self.gyroscope = gyroscope;
        }
        if let Some(accelerometer) = imu.accelerometer() {
            self.accelerometer = accelerometer;
        }
        if let Some(magnetometer) = imu.magnetometer() {
            self.magnetometer = magnetometer;
        }

        // The sensor's X axis is inverted relative to the device mounting
        let mut gyroscope = self.gyroscope;
        gyroscope.x = -gyroscope.x;
        let mut accelerometer = self.accelerometer;
        accelerometer.x = -accelerometer.x;

        let gyroscope = self.calibration.calibrate_gyroscope(gyroscope);
        if has_nan(&gyroscope) {
            log::error!("gyroscope calibration produced NaN, skipping update");
            return None;
        }

        let accelerometer = self.calibration.calibrate_accelerometer(accelerometer);
        if has_nan(&accelerometer) {
            log::error!("accelerometer calibration produced NaN, skipping update");
            return None;
        }

        let magnetometer = if self.settings.apply_magnetic_correction {
            self.calibration.calibrate_magnetometer(self.magnetometer)
        } else {
            self.magnetometer
        };
        if has_nan(&magnetometer) {
            log::error!("magnetometer calibration produced NaN, skipping update");
            return None;
        }

        let gyroscope = self.offset.update(gyroscope);

        // Delta time spans back to the previous successful tick, so a
        // skipped tick is absorbed rather than lost
        let delta_time = match self.last_update_us {
            Some(previous_us) => now_us.saturating_sub(previous_us) as f32 / 1_000_000.0,
            None => 0.0,
        };
        self.last_update_us = Some(now_us);

        self.fusion
            .update(gyroscope, accelerometer, magnetometer, delta_time);
        Some(self.fusion.euler_angles())
    }
}

/// Remap fused Euler angles into the output consumer's convention
///
/// A fixed permutation/sign map, not a computed rotation: the consumer's
/// orientation triple is `[yaw, -pitch, -roll]`.
pub fn output_orientation(euler: EulerAngles) -> [f32; 3] {
    [euler.yaw, -euler.pitch, -euler.roll]
}

fn has_nan(v: &Vector3<f32>) -> bool {
    v.x.is_nan() || v.y.is_nan() || v.z.is_nan()
}
