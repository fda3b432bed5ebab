//! Battery monitoring and critical-voltage shutdown
//!
//! Converts raw ADC readings from a resistor divider into battery voltage,
//! classifies charge into coarse bands for the indicator, and drives the
//! shutdown sequence once the voltage falls to the critical level.

use crate::hal::{BatterySense, Indicator, PowerControl};
use crate::types::IndicatorState;

/// Battery measurement and threshold configuration
#[derive(Debug, Clone, Copy)]
pub struct BatterySettings {
    /// Divider resistor between battery and the sense pin, ohms
    pub divider_r1: f32,
    /// Divider resistor between the sense pin and ground, ohms
    pub divider_r2: f32,
    /// ADC reference voltage
    pub adc_max_voltage: f32,
    /// ADC resolution in bits
    pub adc_resolution_bits: u32,
    /// Voltage at or below which the tracker shuts down
    pub critical_voltage: f32,
    /// Voltage treated as a full charge when normalizing
    pub full_voltage: f32,
    /// Pin voltage below which no battery is considered connected
    pub presence_voltage: f32,
}

impl Default for BatterySettings {
    fn default() -> Self {
        Self {
            divider_r1: 150_000.0,
            divider_r2: 300_000.0,
            adc_max_voltage: 3.3,
            adc_resolution_bits: 10,
            critical_voltage: 3.2,
            full_voltage: 4.2,
            presence_voltage: 0.1,
        }
    }
}

/// Coarse charge band reported to the indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryLevel {
    /// At or below the critical voltage; shutdown required
    Critical,
    Low,
    Medium,
    High,
}

impl BatteryLevel {
    /// Indicator state for this charge band
    pub fn indicator(&self) -> IndicatorState {
        match self {
            BatteryLevel::Critical | BatteryLevel::Low => IndicatorState::BatteryLow,
            BatteryLevel::Medium => IndicatorState::BatteryMedium,
            BatteryLevel::High => IndicatorState::BatteryHigh,
        }
    }
}

/// Periodic battery monitor
#[derive(Debug)]
pub struct BatteryMonitor {
    settings: BatterySettings,
}

impl BatteryMonitor {
    pub fn new(settings: BatterySettings) -> Self {
        Self { settings }
    }

    /// Voltage at the sense pin for a raw ADC reading
    pub fn pin_voltage(&self, raw: u16) -> f32 {
        let full_scale = ((1u32 << self.settings.adc_resolution_bits) - 1) as f32;
        raw as f32 * self.settings.adc_max_voltage / full_scale
    }

    /// Battery voltage for a raw ADC reading, undoing the divider
    pub fn battery_voltage(&self, raw: u16) -> f32 {
        let ratio =
            (self.settings.divider_r1 + self.settings.divider_r2) / self.settings.divider_r2;
        self.pin_voltage(raw) * ratio
    }

    /// Whether a battery appears to be connected at all
    ///
    /// On USB power the sense pin floats near ground; treat anything below
    /// the presence threshold as "no battery" rather than critical.
    pub fn is_present(&self, raw: u16) -> bool {
        self.pin_voltage(raw) > self.settings.presence_voltage
    }

    /// Classify a battery voltage into a charge band
    pub fn classify(&self, voltage: f32) -> BatteryLevel {
        if voltage <= self.settings.critical_voltage {
            return BatteryLevel::Critical;
        }

        let span = self.settings.full_voltage - self.settings.critical_voltage;
        let normalized = (voltage - self.settings.critical_voltage) / span;

        if normalized > 0.66 {
            BatteryLevel::High
        } else if normalized > 0.33 {
            BatteryLevel::Medium
        } else {
            BatteryLevel::Low
        }
    }

    /// Sample the battery and classify it
    ///
    /// Returns `None` when no battery is connected.
    pub fn check<B: BatterySense>(&self, sense: &mut B) -> Option<BatteryLevel> {
        let raw = sense.read_raw();
        if !self.is_present(raw) {
            return None;
        }

        let voltage = self.battery_voltage(raw);
        let level = self.classify(voltage);
        log::debug!("battery {:.2} V, level {:?}", voltage, level);
        Some(level)
    }
}

impl Default for BatteryMonitor {
    fn default() -> Self {
        Self::new(BatterySettings::default())
    }
}

/// Power the tracker down after a critical battery reading
///
/// Turns the indicator off, stops the sensor and radio, then halts. Never
/// returns; the device must be recharged and power cycled.
pub fn shutdown<P: PowerControl, L: Indicator>(power: &mut P, indicator: &mut L) -> ! {
    log::warn!("battery critical, shutting down");
    indicator.set(IndicatorState::Off);
    power.sensor_off();
    power.radio_off();
    power.halt()
}
