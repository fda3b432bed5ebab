//! Shake-gesture detection for requesting a calibration reset
//!
//! Two-state debounce over instantaneous acceleration magnitude with an
//! injected millisecond clock. Idle -> Shaking when the magnitude exceeds
//! the threshold; the gesture must stay over threshold for the required
//! duration before the detector reports triggered. Dropping below threshold
//! for longer than the hysteresis window resets to Idle without triggering.
//!
//! The detector performs no persistence: on trigger the caller invalidates
//! the calibration store and forces a restart.

use nalgebra::Vector3;

/// Shake detection configuration
#[derive(Debug, Clone, Copy)]
pub struct ShakeSettings {
    /// Acceleration magnitude that counts as shaking, in g
    pub threshold_g: f32,
    /// How long the shake must be sustained before triggering, ms
    pub required_ms: u64,
    /// How long the magnitude may dip below threshold before the gesture
    /// resets, ms
    pub hysteresis_ms: u64,
}

impl Default for ShakeSettings {
    fn default() -> Self {
        Self {
            threshold_g: 1.25,
            required_ms: 5_000,
            hysteresis_ms: 1_000,
        }
    }
}

/// Shake debounce state machine
///
/// State persists only across detection calls; construct fresh on boot.
#[derive(Debug)]
pub struct ShakeDetector {
    settings: ShakeSettings,
    shake_start_ms: u64,
    last_over_ms: u64,
    shaking: bool,
}

impl ShakeDetector {
    pub fn new(settings: ShakeSettings) -> Self {
        Self {
            settings,
            shake_start_ms: 0,
            last_over_ms: 0,
            shaking: false,
        }
    }

    /// Whether a shake gesture is currently in progress
    pub fn is_shaking(&self) -> bool {
        self.shaking
    }

    /// Feed one accelerometer reading
    ///
    /// Returns true exactly once per completed gesture, then rearms.
    pub fn update(&mut self, accelerometer: Vector3<f32>, now_ms: u64) -> bool {
        let magnitude = accelerometer.norm();

        if magnitude > self.settings.threshold_g {
            self.last_over_ms = now_ms;
            if !self.shaking {
                self.shaking = true;
                self.shake_start_ms = now_ms;
            } else if now_ms.saturating_sub(self.shake_start_ms) >= self.settings.required_ms {
                log::info!("shake gesture detected, calibration reset requested");
                self.reset();
                return true;
            }
        } else if self.shaking
            && now_ms.saturating_sub(self.last_over_ms) > self.settings.hysteresis_ms
        {
            self.reset();
        }

        false
    }

    /// Return to Idle without triggering
    pub fn reset(&mut self) {
        self.shaking = false;
        self.shake_start_ms = 0;
        self.last_over_ms = 0;
    }
}

impl Default for ShakeDetector {
    fn default() -> Self {
        Self::new(ShakeSettings::default())
    }
}
