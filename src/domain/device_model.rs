//! Device model interface
//!
//! Named configuration values consumed by the smart charging block. The
//! device model store itself (reporting, persistence, monitoring) is a
//! separate concern; this crate only reads from it.

/// Controller variables read by the smart charging block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerVariable {
    /// Whether smart charging is available at all on this station.
    SmartChargingEnabled,
    /// Comma-separated list of supported rate units, e.g. `"A,W"`.
    ChargingScheduleChargingRateUnit,
    /// Number of supply phases: 1 or 3 = AC, 0 = DC.
    ChargingStationSupplyPhases,
    AcPhaseSwitchingSupported,
    CompositeScheduleDefaultLimitAmps,
    CompositeScheduleDefaultLimitWatts,
    CompositeScheduleDefaultNumberPhases,
    SupplyVoltage,
    /// Comma-separated profile purposes excluded from composite schedules
    /// while the station is offline.
    IgnoredProfilePurposesOffline,
    /// OCPP 2.1: minimum seconds between accepted profile updates per purpose.
    ChargingProfileUpdateRateLimit,
    /// OCPP 2.1: profile ids up to this value are reserved for external
    /// constraints and rejected in SetChargingProfile.
    MaxExternalConstraintsId,
    /// OCPP 2.1: comma-separated additional purposes the station supports
    /// (PriorityCharging, LocalGeneration).
    SupportedAdditionalPurposes,
    /// OCPP 2.1
    SupportsDynamicProfiles,
    /// OCPP 2.1
    SupportsUseLocalTime,
    /// OCPP 2.1
    SupportsRandomizedDelay,
    /// OCPP 2.1
    SupportsLimitAtSoc,
    /// OCPP 2.1
    SupportsEvseSleep,
}

/// Read access to the station's configuration store.
pub trait DeviceModel: Send + Sync {
    fn get_string(&self, variable: ControllerVariable) -> Option<String>;

    fn get_int(&self, variable: ControllerVariable) -> Option<i32>;

    fn get_bool(&self, variable: ControllerVariable) -> Option<bool>;

    /// OCPP 2.1 per-EVSE DCInputPhaseControl capability. `evse_id` 0 asks
    /// whether every EVSE supports it.
    fn dc_input_phase_control(&self, evse_id: i32) -> bool {
        let _ = evse_id;
        false
    }
}

/// Fallback current limit when neither profiles nor the device model
/// provide one.
pub const DEFAULT_LIMIT_AMPS: f32 = 48.0;
/// Fallback power limit (48 A x 230 V x 3 phases).
pub const DEFAULT_LIMIT_WATTS: f32 = 33120.0;
/// Default and maximum number of phases for AC charging.
pub const DEFAULT_AND_MAX_NUMBER_PHASES: i32 = 3;
/// Nominal single-phase supply voltage used for A<->W conversion.
pub const LOW_VOLTAGE: f32 = 230.0;
