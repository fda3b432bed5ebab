//! Interactive calibration stages for the head tracker
//!
//! Three independent stage algorithms estimate the fields of a
//! [`CalibrationRecord`] from live sensor motion, run in the fixed order
//! gyroscope -> accelerometer -> (optional) magnetometer. Every stage is a
//! blocking loop over a polled sensor: it tolerates samples arriving at
//! irregular intervals and enforces no sample rate of its own.
//!
//! Each stage writes only its own subset of the record, so a partially
//! completed sequence never corrupts fields estimated by another stage.

use nalgebra::Vector3;

use crate::hal::{Clock, Imu, Indicator};
use crate::types::{CalibrationRecord, IndicatorState};

/// Samples accumulated by the gyroscope bias stage
pub const GYROSCOPE_SAMPLE_COUNT: u32 = 500;

/// Samples collected by the accelerometer range stage
pub const ACCELEROMETER_SAMPLE_COUNT: u32 = 2000;

/// Minimum samples before the magnetometer stage evaluates coverage
pub const MAGNETOMETER_MIN_SAMPLES: u32 = 50;

/// Hard ceiling on magnetometer samples (safety exit)
pub const MAGNETOMETER_MAX_SAMPLES: u32 = 1000;

/// Minimum acceptable per-axis magnetometer range
pub const MAGNETOMETER_RANGE_THRESHOLD: f32 = 30.0;

/// Milliseconds without min/max improvement before the stage gives up
pub const MAGNETOMETER_STAGNATION_MS: u64 = 5_000;

/// Calibration stage failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// A per-axis range collapsed to zero; committing would store a
    /// division-by-zero sensitivity
    DegenerateRange,
    /// Commit was requested before the stage finished sampling
    Incomplete,
}

impl core::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CalibrationError::DegenerateRange => write!(f, "degenerate sensor range"),
            CalibrationError::Incomplete => write!(f, "calibration stage incomplete"),
        }
    }
}

/// Which sensor a stage consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSource {
    Gyroscope,
    Accelerometer,
    Magnetometer,
}

/// One calibration stage algorithm
///
/// The driver loop feeds fresh readings into `sample`, polls `is_complete`
/// every iteration, and calls `commit` exactly once at the end. A stage must
/// only touch the record fields it calibrates.
pub trait CalibrationStage {
    /// Sensor this stage reads
    fn source(&self) -> SensorSource;

    /// Indicator state shown while this stage runs
    fn indicator(&self) -> IndicatorState;

    /// Feed one fresh reading; `now_ms` comes from the injected clock
    fn sample(&mut self, reading: Vector3<f32>, now_ms: u64);

    /// Termination rule, evaluated every driver iteration
    fn is_complete(&self, now_ms: u64) -> bool;

    /// Write the estimated parameters into the record
    fn commit(&self, record: &mut CalibrationRecord) -> Result<(), CalibrationError>;
}

/// Gyroscope bias stage
///
/// Accumulates a fixed number of samples while the device is expected
/// stationary; the offset is the running mean per axis and sensitivity stays
/// at unity. Bias estimation under the stationary assumption needs no
/// adaptive stopping rule, so the stage ends after exactly
/// [`GYROSCOPE_SAMPLE_COUNT`] samples.
#[derive(Debug, Clone)]
pub struct GyroscopeBiasStage {
    sum: Vector3<f32>,
    count: u32,
    target: u32,
}

impl GyroscopeBiasStage {
    pub fn new() -> Self {
        Self::with_sample_count(GYROSCOPE_SAMPLE_COUNT)
    }

    pub fn with_sample_count(target: u32) -> Self {
        Self {
            sum: Vector3::zeros(),
            count: 0,
            target,
        }
    }
}

impl Default for GyroscopeBiasStage {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationStage for GyroscopeBiasStage {
    fn source(&self) -> SensorSource {
        SensorSource::Gyroscope
    }

    fn indicator(&self) -> IndicatorState {
        IndicatorState::CalibratingGyroscope
    }

    fn sample(&mut self, reading: Vector3<f32>, _now_ms: u64) {
        if self.count < self.target {
            self.sum += reading;
            self.count += 1;
        }
    }

    fn is_complete(&self, _now_ms: u64) -> bool {
        self.count >= self.target
    }

    fn commit(&self, record: &mut CalibrationRecord) -> Result<(), CalibrationError> {
        if self.count < self.target {
            return Err(CalibrationError::Incomplete);
        }

        record.gyroscope_offset = self.sum / self.count as f32;
        record.gyroscope_sensitivity = Vector3::new(1.0, 1.0, 1.0);

        log::info!(
            "gyroscope calibration complete, offset ({:.6}, {:.6}, {:.6})",
            record.gyroscope_offset.x,
            record.gyroscope_offset.y,
            record.gyroscope_offset.z
        );
        Ok(())
    }
}

/// Accelerometer range stage
///
/// Tracks per-axis min/max over a fixed sample budget while the operator
/// rotates the device through its full range. Sensitivity maps the observed
/// span to 2 so that +/-1 g lands on +/-1.0 on the normalized axis; the
/// offset centers the span. Misalignment is left at identity - no cross-axis
/// correction is attempted on this device.
#[derive(Debug, Clone)]
pub struct AccelerometerRangeStage {
    min: Vector3<f32>,
    max: Vector3<f32>,
    count: u32,
    target: u32,
}

impl AccelerometerRangeStage {
    pub fn new() -> Self {
        Self::with_sample_count(ACCELEROMETER_SAMPLE_COUNT)
    }

    pub fn with_sample_count(target: u32) -> Self {
        Self {
            min: Vector3::repeat(f32::MAX),
            max: Vector3::repeat(f32::MIN),
            count: 0,
            target,
        }
    }
}

impl Default for AccelerometerRangeStage {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationStage for AccelerometerRangeStage {
    fn source(&self) -> SensorSource {
        SensorSource::Accelerometer
    }

    fn indicator(&self) -> IndicatorState {
        IndicatorState::CalibratingAccelerometer
    }

    fn sample(&mut self, reading: Vector3<f32>, _now_ms: u64) {
        if self.count < self.target {
            self.min = self.min.inf(&reading);
            self.max = self.max.sup(&reading);
            self.count += 1;
        }
    }

    fn is_complete(&self, _now_ms: u64) -> bool {
        self.count >= self.target
    }

    fn commit(&self, record: &mut CalibrationRecord) -> Result<(), CalibrationError> {
        if self.count < self.target {
            return Err(CalibrationError::Incomplete);
        }

        let span = self.max - self.min;
        if span.x <= f32::EPSILON || span.y <= f32::EPSILON || span.z <= f32::EPSILON {
            log::error!(
                "accelerometer range collapsed on an axis, span ({:.6}, {:.6}, {:.6}); rejecting stage",
                span.x,
                span.y,
                span.z
            );
            return Err(CalibrationError::DegenerateRange);
        }

        record.accelerometer_sensitivity =
            Vector3::new(2.0 / span.x, 2.0 / span.y, 2.0 / span.z);
        record.accelerometer_offset = (self.max + self.min) / 2.0;

        log::info!(
            "accelerometer calibration complete, sensitivity ({:.6}, {:.6}, {:.6})",
            record.accelerometer_sensitivity.x,
            record.accelerometer_sensitivity.y,
            record.accelerometer_sensitivity.z
        );
        Ok(())
    }
}

/// Magnetometer range stage
///
/// Tracks per-axis min/max while the operator sweeps a figure-eight motion.
/// Three independent stopping conditions are evaluated on every driver
/// iteration: sufficient coverage (minimum samples and every axis range over
/// threshold), stagnation (no min/max improvement for a timeout window), and
/// a hard sample ceiling as the safety exit.
#[derive(Debug, Clone)]
pub struct MagnetometerRangeStage {
    min: Vector3<f32>,
    max: Vector3<f32>,
    count: u32,
    last_improvement_ms: Option<u64>,
}

impl MagnetometerRangeStage {
    pub fn new() -> Self {
        Self {
            min: Vector3::repeat(f32::MAX),
            max: Vector3::repeat(f32::MIN),
            count: 0,
            last_improvement_ms: None,
        }
    }

    fn range(&self) -> Vector3<f32> {
        self.max - self.min
    }

    fn coverage_reached(&self) -> bool {
        let range = self.range();
        self.count >= MAGNETOMETER_MIN_SAMPLES
            && range.x > MAGNETOMETER_RANGE_THRESHOLD
            && range.y > MAGNETOMETER_RANGE_THRESHOLD
            && range.z > MAGNETOMETER_RANGE_THRESHOLD
    }

    fn stagnated(&self, now_ms: u64) -> bool {
        self.count >= MAGNETOMETER_MIN_SAMPLES
            && self
                .last_improvement_ms
                .is_some_and(|t| now_ms.saturating_sub(t) > MAGNETOMETER_STAGNATION_MS)
    }
}

impl Default for MagnetometerRangeStage {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationStage for MagnetometerRangeStage {
    fn source(&self) -> SensorSource {
        SensorSource::Magnetometer
    }

    fn indicator(&self) -> IndicatorState {
        IndicatorState::CalibratingMagnetometer
    }

    fn sample(&mut self, reading: Vector3<f32>, now_ms: u64) {
        if self.count >= MAGNETOMETER_MAX_SAMPLES {
            return;
        }
        self.count += 1;

        let min = self.min.inf(&reading);
        let max = self.max.sup(&reading);
        if min != self.min || max != self.max || self.last_improvement_ms.is_none() {
            self.min = min;
            self.max = max;
            self.last_improvement_ms = Some(now_ms);
        }

        if self.count % 50 == 0 {
            let range = self.range();
            log::info!(
                "magnetometer samples {}, range ({:.1}, {:.1}, {:.1}); keep sweeping a figure eight",
                self.count,
                range.x,
                range.y,
                range.z
            );
        }
    }

    fn is_complete(&self, now_ms: u64) -> bool {
        self.count >= MAGNETOMETER_MAX_SAMPLES
            || self.coverage_reached()
            || self.stagnated(now_ms)
    }

    fn commit(&self, record: &mut CalibrationRecord) -> Result<(), CalibrationError> {
        if self.count == 0 {
            return Err(CalibrationError::Incomplete);
        }

        record.hard_iron_offset = (self.max + self.min) / 2.0;

        let half_range = self.range() / 2.0;
        if half_range.x < MAGNETOMETER_RANGE_THRESHOLD
            || half_range.y < MAGNETOMETER_RANGE_THRESHOLD
            || half_range.z < MAGNETOMETER_RANGE_THRESHOLD
        {
            // A near-singular soft iron correction is worse than none
            log::warn!(
                "insufficient magnetometer coverage, keeping identity soft iron matrix"
            );
            record.soft_iron_matrix = nalgebra::Matrix3::identity();
        } else {
            record.soft_iron_matrix = nalgebra::Matrix3::from_diagonal(&Vector3::new(
                1.0 / half_range.x,
                1.0 / half_range.y,
                1.0 / half_range.z,
            ));
        }

        log::info!(
            "magnetometer calibration complete, hard iron ({:.2}, {:.2}, {:.2})",
            record.hard_iron_offset.x,
            record.hard_iron_offset.y,
            record.hard_iron_offset.z
        );
        Ok(())
    }
}

/// Run one stage to completion against a polled sensor
///
/// Blocks until the stage's termination rule fires, then commits into the
/// record. Iterations without a fresh sample only re-evaluate the
/// termination rule.
pub fn run_stage<S, I, C>(
    stage: &mut S,
    imu: &mut I,
    clock: &C,
    record: &mut CalibrationRecord,
) -> Result<(), CalibrationError>
where
    S: CalibrationStage + ?Sized,
    I: Imu,
    C: Clock,
{
    loop {
        let now_ms = clock.now_ms();
        if stage.is_complete(now_ms) {
            return stage.commit(record);
        }

        let reading = match stage.source() {
            SensorSource::Gyroscope => imu.gyroscope(),
            SensorSource::Accelerometer => imu.accelerometer(),
            SensorSource::Magnetometer => imu.magnetometer(),
        };
        if let Some(reading) = reading {
            stage.sample(reading, now_ms);
        }
    }
}

/// Run the full interactive calibration sequence
///
/// Stages run in the fixed order gyroscope -> accelerometer -> (optional)
/// magnetometer, switching the indicator per stage. On success the record
/// holds every estimated parameter but is not yet marked valid; persisting
/// it (which sets `valid`) is the caller's decision.
pub fn run_sequence<I, C, L>(
    imu: &mut I,
    clock: &C,
    indicator: &mut L,
    record: &mut CalibrationRecord,
    include_magnetometer: bool,
) -> Result<(), CalibrationError>
where
    I: Imu,
    C: Clock,
    L: Indicator,
{
    log::info!("starting calibration sequence, keep the device stationary");

    let result = run_stages(imu, clock, indicator, record, include_magnetometer);

    // The indicator must not stay on a stage color after the sequence ends,
    // successfully or not
    indicator.set(IndicatorState::Off);
    match &result {
        Ok(()) => log::info!("calibration sequence completed"),
        Err(error) => log::error!("calibration sequence aborted: {error}"),
    }
    result
}

fn run_stages<I, C, L>(
    imu: &mut I,
    clock: &C,
    indicator: &mut L,
    record: &mut CalibrationRecord,
    include_magnetometer: bool,
) -> Result<(), CalibrationError>
where
    I: Imu,
    C: Clock,
    L: Indicator,
{
    let mut gyroscope = GyroscopeBiasStage::new();
    indicator.set(gyroscope.indicator());
    run_stage(&mut gyroscope, imu, clock, record)?;

    log::info!("rotate the device through its full range");
    let mut accelerometer = AccelerometerRangeStage::new();
    indicator.set(accelerometer.indicator());
    run_stage(&mut accelerometer, imu, clock, record)?;

    if include_magnetometer {
        log::info!("sweep the device in a figure-eight pattern");
        let mut magnetometer = MagnetometerRangeStage::new();
        indicator.set(magnetometer.indicator());
        run_stage(&mut magnetometer, imu, clock, record)?;
    }

    Ok(())
}
