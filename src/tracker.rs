//! Tracker orchestration
//!
//! Ties the pipeline, framer, transports, shake detector, and battery
//! monitor together behind a polled `tick` interface. The embedding (RTOS
//! task, superloop, or host test) owns the schedule and the hardware; the
//! tracker owns the state and the ordering.

use crate::battery::{BatteryLevel, BatteryMonitor, BatterySettings};
use crate::calibration;
use crate::frame::{FrameRouter, Framer, Transport};
use crate::hal::{BatterySense, Clock, Imu, Indicator, PowerControl};
use crate::pipeline::{output_orientation, Fusion, FusionPipeline, GyroOffset, PipelineSettings};
use crate::shake::{ShakeDetector, ShakeSettings};
use crate::store::{CalibrationStore, Storage};
use crate::types::{CalibrationRecord, IndicatorState};

/// Tracker scheduling and subsystem configuration
#[derive(Debug, Clone, Copy)]
pub struct TrackerSettings {
    /// Minimum interval between pipeline ticks, us (200 Hz default)
    pub sample_period_us: u64,
    /// Interval between battery checks, ms
    pub battery_period_ms: u64,
    /// Whether the calibration sequence includes the magnetometer stage
    pub magnetometer_stage: bool,
    pub pipeline: PipelineSettings,
    pub shake: ShakeSettings,
    pub battery: BatterySettings,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            sample_period_us: 5_000,
            battery_period_ms: 10_000,
            magnetometer_stage: false,
            pipeline: PipelineSettings::default(),
            shake: ShakeSettings::default(),
            battery: BatterySettings::default(),
        }
    }
}

/// Result of one scheduling tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The sample period has not elapsed yet
    NotDue,
    /// A frame was produced and handed to the router
    Sent,
    /// The pipeline rejected this tick (NaN guard); no frame produced
    Skipped,
}

/// Streaming head tracker
///
/// Ticks run at most once per sample period with no catch-up: a late tick
/// runs immediately and the next period is measured from it.
pub struct Tracker<F: Fusion, O: GyroOffset, W: Transport, S: Transport> {
    settings: TrackerSettings,
    pipeline: FusionPipeline<F, O>,
    framer: Framer,
    router: FrameRouter<W, S>,
    shake: ShakeDetector,
    battery: BatteryMonitor,
    last_tick_us: Option<u64>,
    last_battery_ms: Option<u64>,
}

impl<F: Fusion, O: GyroOffset, W: Transport, S: Transport> Tracker<F, O, W, S> {
    pub fn new(
        settings: TrackerSettings,
        record: CalibrationRecord,
        fusion: F,
        offset: O,
        wireless: W,
        serial: S,
    ) -> Self {
        Self {
            pipeline: FusionPipeline::new(record, fusion, offset, settings.pipeline),
            framer: Framer::new(),
            router: FrameRouter::new(wireless, serial),
            shake: ShakeDetector::new(settings.shake),
            battery: BatteryMonitor::new(settings.battery),
            settings,
            last_tick_us: None,
            last_battery_ms: None,
        }
    }

    pub fn pipeline(&self) -> &FusionPipeline<F, O> {
        &self.pipeline
    }

    pub fn router(&self) -> &FrameRouter<W, S> {
        &self.router
    }

    /// Run one scheduling tick
    ///
    /// Runs the pipeline and emits a frame when the sample period has
    /// elapsed. Time is measured from the previous tick that actually ran,
    /// so missed periods are not replayed.
    pub fn tick<I: Imu>(&mut self, imu: &mut I, now_us: u64) -> TickOutcome {
        if let Some(last_us) = self.last_tick_us {
            if now_us.saturating_sub(last_us) < self.settings.sample_period_us {
                return TickOutcome::NotDue;
            }
        }
        self.last_tick_us = Some(now_us);

        let Some(euler) = self.pipeline.update(imu, now_us) else {
            return TickOutcome::Skipped;
        };

        let frame = self.framer.frame(output_orientation(euler));
        self.router.deliver(&frame);
        TickOutcome::Sent
    }

    /// Run one battery check if the battery period has elapsed
    ///
    /// Updates the indicator with the charge band. Returns the level so the
    /// embedding can initiate shutdown on `Critical`; the tracker never
    /// powers down on its own.
    pub fn battery_tick<B: BatterySense, L: Indicator>(
        &mut self,
        sense: &mut B,
        indicator: &mut L,
        now_ms: u64,
    ) -> Option<BatteryLevel> {
        if let Some(last_ms) = self.last_battery_ms {
            if now_ms.saturating_sub(last_ms) < self.settings.battery_period_ms {
                return None;
            }
        }
        self.last_battery_ms = Some(now_ms);

        let level = self.battery.check(sense)?;
        indicator.set(level.indicator());
        Some(level)
    }

    /// Poll the accelerometer for the calibration-reset gesture
    ///
    /// On a completed shake the stored calibration is invalidated and the
    /// embedding must restart so boot re-enters the calibration sequence.
    /// Returns true when a restart is required. An invalidation write
    /// failure still requests the restart; the stale record would otherwise
    /// keep loading on every boot.
    pub fn watch_reset<I: Imu, T: Storage>(
        &mut self,
        imu: &mut I,
        store: &mut CalibrationStore<T>,
        now_ms: u64,
    ) -> bool {
        let Some(accelerometer) = imu.accelerometer() else {
            return false;
        };
        if !self.shake.update(accelerometer, now_ms) {
            return false;
        }

        if let Err(error) = store.invalidate() {
            log::error!("failed to invalidate calibration: {}", error);
        }
        true
    }
}

/// Halt after an unrecoverable initialization failure
///
/// Used when the sensor driver or the wireless stack fails to start. Shows
/// the fault state on the indicator and never returns; recovery requires a
/// hardware reset.
pub fn fault<P: PowerControl, L: Indicator>(power: &mut P, indicator: &mut L) -> ! {
    log::error!("unrecoverable initialization failure, halting");
    indicator.set(IndicatorState::Fault);
    power.sensor_off();
    power.radio_off();
    power.halt()
}

/// Load the persisted calibration or run the interactive sequence
///
/// A valid stored record short-circuits the sequence entirely. When the
/// sequence runs it is persisted immediately; a persistence failure keeps
/// the fresh record for this session and logs the loss. A failed sequence
/// falls back to the no-op default record.
pub fn load_or_calibrate<T, I, C, L>(
    store: &mut CalibrationStore<T>,
    imu: &mut I,
    clock: &C,
    indicator: &mut L,
    include_magnetometer: bool,
) -> CalibrationRecord
where
    T: Storage,
    I: Imu,
    C: Clock,
    L: Indicator,
{
    if let Some(record) = store.load() {
        return record;
    }

    let mut record = CalibrationRecord::default();
    match calibration::run_sequence(imu, clock, indicator, &mut record, include_magnetometer) {
        Ok(()) => {
            if let Err(error) = store.save(&mut record) {
                log::warn!("calibration not persisted: {}", error);
            }
            record
        }
        Err(error) => {
            log::error!("calibration sequence failed: {}", error);
            CalibrationRecord::default()
        }
    }
}
