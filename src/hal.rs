//! Hardware seams for the head tracker core
//!
//! Everything the core touches on real hardware goes through these traits so
//! the same logic runs on the device and under host tests with injected
//! fakes. Sensor acquisition, timing, indication, and power control are
//! external collaborators; the core never owns a pin or a bus.

use nalgebra::Vector3;

use crate::types::IndicatorState;

/// Polled 9-axis sensor driver
///
/// Each accessor returns `Some` only when a fresh sample is available this
/// poll. Staleness is not an error: callers reuse the previous reading.
/// Units follow the fusion algorithm's expectations: gyroscope in deg/s,
/// accelerometer in g, magnetometer in arbitrary field units.
pub trait Imu {
    fn gyroscope(&mut self) -> Option<Vector3<f32>>;
    fn accelerometer(&mut self) -> Option<Vector3<f32>>;
    fn magnetometer(&mut self) -> Option<Vector3<f32>>;
}

/// Monotonic time source
///
/// Abstracts the device's microsecond counter so timing-dependent logic
/// (tick gating, shake debounce, magnetometer stagnation) is testable with a
/// virtual clock.
pub trait Clock {
    /// Microseconds since an arbitrary epoch, monotonic
    fn now_us(&self) -> u64;

    /// Milliseconds since the same epoch
    fn now_ms(&self) -> u64 {
        self.now_us() / 1_000
    }

    /// Saturating elapsed microseconds since a reference point
    fn elapsed_us(&self, reference_us: u64) -> u64 {
        self.now_us().saturating_sub(reference_us)
    }
}

/// Operator-facing indicator (RGB LED on the reference hardware)
pub trait Indicator {
    fn set(&mut self, state: IndicatorState);
}

/// Battery voltage sense input behind the divider
pub trait BatterySense {
    /// Raw ADC reading from the divider tap
    fn read_raw(&mut self) -> u16;
}

/// Irreversible power-down hooks
///
/// Used exactly once, when the battery crosses the critical threshold. There
/// is no software path back from `halt`; recovery requires a hardware reset.
pub trait PowerControl {
    /// Disable the inertial sensor
    fn sensor_off(&mut self);

    /// Disable the wireless stack
    fn radio_off(&mut self);

    /// Enter the lowest available power state and never return
    fn halt(&mut self) -> !;
}
