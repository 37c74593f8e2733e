//! In-memory device model for development and testing

use dashmap::DashMap;
use tracing::warn;

use crate::domain::{ControllerVariable, DeviceModel};

/// Device model backed by a plain in-memory map. Values are stored as
/// strings, the way a device model store keeps them, and parsed on read.
#[derive(Default)]
pub struct InMemoryDeviceModel {
    values: DashMap<ControllerVariable, String>,
    dc_input_phase_control: DashMap<i32, bool>,
}

impl InMemoryDeviceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration a typical AC station ships with: smart charging
    /// enabled, both rate units, 3 supply phases, 230 V.
    pub fn with_defaults() -> Self {
        let model = Self::new();
        model.set(ControllerVariable::SmartChargingEnabled, "true");
        model.set(ControllerVariable::ChargingScheduleChargingRateUnit, "A,W");
        model.set(ControllerVariable::ChargingStationSupplyPhases, "3");
        model.set(ControllerVariable::CompositeScheduleDefaultLimitAmps, "48");
        model.set(ControllerVariable::CompositeScheduleDefaultLimitWatts, "33120");
        model.set(ControllerVariable::CompositeScheduleDefaultNumberPhases, "3");
        model.set(ControllerVariable::SupplyVoltage, "230");
        model
    }

    pub fn set(&self, variable: ControllerVariable, value: impl Into<String>) {
        self.values.insert(variable, value.into());
    }

    pub fn unset(&self, variable: ControllerVariable) {
        self.values.remove(&variable);
    }

    pub fn set_dc_input_phase_control(&self, evse_id: i32, supported: bool) {
        self.dc_input_phase_control.insert(evse_id, supported);
    }
}

impl DeviceModel for InMemoryDeviceModel {
    fn get_string(&self, variable: ControllerVariable) -> Option<String> {
        self.values.get(&variable).map(|entry| entry.clone())
    }

    fn get_int(&self, variable: ControllerVariable) -> Option<i32> {
        let raw = self.values.get(&variable)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(?variable, value = %raw.as_str(), "Device model value is not an integer");
                None
            }
        }
    }

    fn get_bool(&self, variable: ControllerVariable) -> Option<bool> {
        let raw = self.values.get(&variable)?;
        match raw.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            other => {
                warn!(?variable, value = other, "Device model value is not a boolean");
                None
            }
        }
    }

    fn dc_input_phase_control(&self, evse_id: i32) -> bool {
        self.dc_input_phase_control
            .get(&evse_id)
            .map(|entry| *entry)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_parse_on_read() {
        let model = InMemoryDeviceModel::new();
        model.set(ControllerVariable::SupplyVoltage, "230");
        model.set(ControllerVariable::SmartChargingEnabled, "true");
        model.set(ControllerVariable::AcPhaseSwitchingSupported, "not-a-bool");

        assert_eq!(model.get_int(ControllerVariable::SupplyVoltage), Some(230));
        assert_eq!(model.get_bool(ControllerVariable::SmartChargingEnabled), Some(true));
        assert_eq!(model.get_bool(ControllerVariable::AcPhaseSwitchingSupported), None);
        assert_eq!(model.get_int(ControllerVariable::ChargingProfileUpdateRateLimit), None);
    }

    #[test]
    fn unset_removes_a_value() {
        let model = InMemoryDeviceModel::with_defaults();
        assert!(model.get_bool(ControllerVariable::SmartChargingEnabled).unwrap());

        model.unset(ControllerVariable::SmartChargingEnabled);
        assert_eq!(model.get_bool(ControllerVariable::SmartChargingEnabled), None);
    }
}
