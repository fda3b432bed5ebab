#![no_std]

//! Head tracker core - calibration, fusion pipeline, and frame streaming
//!
//! This library implements the hardware-independent core of a head-mounted
//! orientation tracker: interactive sensor calibration with binary
//! persistence, a per-sample calibrated fusion pipeline, fixed binary output
//! frames over a dual wireless/serial transport, a shake gesture for
//! resetting calibration, and battery monitoring with critical shutdown.
//!
//! The fusion algorithm itself, the sensor driver, the transports, and the
//! storage backend are external collaborators injected through traits, so
//! the whole core runs unmodified on the device and under host tests.
//!
//! # Features
//!
//! - Three-stage calibration: gyroscope bias, accelerometer range, magnetometer hard/soft iron
//! - Calibration persistence with a single-byte validity protocol
//! - Per-sample pipeline with stale-reading reuse and NaN guards
//! - 30-byte little-endian output frame with a wrapping sample counter
//! - Shake-to-recalibrate gesture with debounce and hysteresis
//! - Battery charge bands and a never-returning shutdown sequence
//! - `#![no_std]` compatible for embedded systems
//!
//! # Quick Start
//!
//! ```rust
//! use head_tracker::{CalibrationRecord, Framer, output_orientation, EulerAngles};
//!
//! // A default record applies no correction until calibration has run
//! let record = CalibrationRecord::default();
//! assert!(!record.valid);
//!
//! // Frame a fused orientation for the output consumer
//! let euler = EulerAngles::new(1.0, 2.0, 3.0);
//! let mut framer = Framer::new();
//! let frame = framer.frame(output_orientation(euler));
//! let bytes = frame.to_bytes();
//! assert_eq!(&bytes[..2], &[0xAA, 0xAA]);
//! ```

pub mod battery;
pub mod calibration;
pub mod frame;
pub mod hal;
pub mod pipeline;
pub mod shake;
pub mod store;
pub mod tracker;
mod types;

pub use battery::{BatteryLevel, BatteryMonitor, BatterySettings, shutdown};
pub use calibration::{
    AccelerometerRangeStage, CalibrationError, CalibrationStage, GyroscopeBiasStage,
    MagnetometerRangeStage, SensorSource, run_sequence, run_stage,
};
pub use frame::{
    CHARACTERISTIC_UUID, FRAME_SIZE, FrameRouter, Framer, LOCAL_NAME, OutputFrame, SERVICE_UUID,
    Transport, TransportError,
};
pub use hal::{BatterySense, Clock, Imu, Indicator, PowerControl};
pub use pipeline::{
    Fusion, FusionPipeline, GyroOffset, PipelineSettings, output_orientation,
};
pub use shake::{ShakeDetector, ShakeSettings};
pub use store::{CalibrationStore, RECORD_SIZE, Storage, StorageError};
pub use tracker::{TickOutcome, Tracker, TrackerSettings, fault, load_or_calibrate};
pub use types::*;
