//! ChargingProfile domain entities
//!
//! These types mirror the OCPP 2.0.1 / 2.1 `ChargingProfileType` tree with
//! the wire-level camelCase field naming. Message (de)serialization and
//! transport are handled outside this crate; the types here are the domain
//! representation the validator and schedule engine operate on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a charging profile. Determines which validation rules apply and
/// how the profile participates in composite schedule calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargingProfilePurpose {
    ChargingStationExternalConstraints,
    ChargingStationMaxProfile,
    TxDefaultProfile,
    TxProfile,
    /// OCPP 2.1
    PriorityCharging,
    /// OCPP 2.1
    LocalGeneration,
}

impl ChargingProfilePurpose {
    /// Parse the wire representation, e.g. from a comma-separated
    /// device-model variable.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.trim() {
            "ChargingStationExternalConstraints" => Some(Self::ChargingStationExternalConstraints),
            "ChargingStationMaxProfile" => Some(Self::ChargingStationMaxProfile),
            "TxDefaultProfile" => Some(Self::TxDefaultProfile),
            "TxProfile" => Some(Self::TxProfile),
            "PriorityCharging" => Some(Self::PriorityCharging),
            "LocalGeneration" => Some(Self::LocalGeneration),
            _ => None,
        }
    }
}

/// Time base of a charging profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargingProfileKind {
    /// Schedule periods are relative to a fixed point in time defined in the
    /// schedule's `startSchedule`.
    Absolute,
    /// The schedule restarts periodically at the first schedule period,
    /// anchored to `startSchedule`. The recurrence granularity is given
    /// explicitly by the profile's `recurrencyKind`.
    Recurring,
    /// Schedule periods are relative to the start of the current transaction.
    Relative,
    /// OCPP 2.1: the schedule is updated continuously by the CSMS.
    Dynamic,
}

/// Recurrence granularity for `ChargingProfileKind::Recurring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecurrencyKind {
    Daily,
    Weekly,
}

/// Unit in which a charging schedule expresses its limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargingRateUnit {
    /// Watts (power)
    W,
    /// Amperes (current, per phase)
    A,
}

impl ChargingRateUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::W => "W",
            Self::A => "A",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.trim() {
            "W" => Some(Self::W),
            "A" => Some(Self::A),
            _ => None,
        }
    }
}

/// OCPP 2.1 operation mode of a charging schedule period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationMode {
    Idle,
    ChargingOnly,
    CentralSetpoint,
    ExternalSetpoint,
    ExternalLimits,
    CentralFrequency,
    LocalFrequency,
    LocalLoadBalancing,
}

/// Source that installed a charging profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargingLimitSource {
    /// Charging station operator (the CSMS)
    CSO,
    /// Energy management system
    EMS,
    /// System operator
    SO,
    Other,
}

/// One point of an OCPP 2.1 frequency-watt curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V2xFreqWattPoint {
    pub frequency: f32,
    pub power: f32,
}

/// OCPP 2.1: limit that applies once the EV reports the given state of charge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitAtSoc {
    pub soc: i32,
    pub limit: f32,
}

/// One period of a charging schedule, starting `start_period` seconds after
/// the schedule start and lasting until the next period (or the schedule
/// end).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSchedulePeriod {
    /// Offset in seconds from the start of the schedule.
    pub start_period: i32,
    /// Charging rate limit in the schedule's rate unit. With amperes, the
    /// limit per phase (L2/L3 variants override it for those phases).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<f32>,
    #[serde(rename = "limit_L2", skip_serializing_if = "Option::is_none")]
    pub limit_l2: Option<f32>,
    #[serde(rename = "limit_L3", skip_serializing_if = "Option::is_none")]
    pub limit_l3: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discharge_limit: Option<f32>,
    #[serde(rename = "dischargeLimit_L2", skip_serializing_if = "Option::is_none")]
    pub discharge_limit_l2: Option<f32>,
    #[serde(rename = "dischargeLimit_L3", skip_serializing_if = "Option::is_none")]
    pub discharge_limit_l3: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setpoint: Option<f32>,
    #[serde(rename = "setpoint_L2", skip_serializing_if = "Option::is_none")]
    pub setpoint_l2: Option<f32>,
    #[serde(rename = "setpoint_L3", skip_serializing_if = "Option::is_none")]
    pub setpoint_l3: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setpoint_reactive: Option<f32>,
    #[serde(rename = "setpointReactive_L2", skip_serializing_if = "Option::is_none")]
    pub setpoint_reactive_l2: Option<f32>,
    #[serde(rename = "setpointReactive_L3", skip_serializing_if = "Option::is_none")]
    pub setpoint_reactive_l3: Option<f32>,
    /// Number of phases to use. With AC and no value given, validation
    /// conforms this to 3.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_phases: Option<i32>,
    /// Which single phase to use. Only allowed with `numberPhases` == 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_to_use: Option<i32>,
    /// OCPP 2.1; absent means `ChargingOnly`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_mode: Option<OperationMode>,
    /// OCPP 2.1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evse_sleep: Option<bool>,
    /// OCPP 2.1: baseline for the frequency-watt curve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v2x_baseline: Option<f32>,
    /// OCPP 2.1: required (with at least two points) for `LocalFrequency`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v2x_freq_watt_curve: Option<Vec<V2xFreqWattPoint>>,
}

/// A charging schedule: an ordered list of periods plus the time frame they
/// apply in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSchedule {
    pub id: i32,
    /// Required for Absolute and Recurring profiles, forbidden for Relative.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_schedule: Option<DateTime<Utc>>,
    /// Duration in seconds. Absent means the schedule lasts until it is
    /// superseded or the transaction ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
    pub charging_rate_unit: ChargingRateUnit,
    pub charging_schedule_period: Vec<ChargingSchedulePeriod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_charging_rate: Option<f32>,
    /// OCPP 2.1: randomized delay window in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub randomized_delay: Option<i32>,
    /// OCPP 2.1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_local_time: Option<bool>,
    /// OCPP 2.1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_at_soc: Option<LimitAtSoc>,
    /// Opaque sales tariff payload; tariff handling is outside this block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_tariff: Option<serde_json::Value>,
}

/// A charging profile: a prioritized, time-based limit instruction for one
/// EVSE or the whole station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingProfile {
    pub id: i32,
    /// Priority within profiles of the same purpose and scope; higher wins.
    pub stack_level: i32,
    pub charging_profile_purpose: ChargingProfilePurpose,
    pub charging_profile_kind: ChargingProfileKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrency_kind: Option<RecurrencyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    /// Required for TxProfile, must match the EVSE's active transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub charging_schedule: Vec<ChargingSchedule>,
    /// OCPP 2.1: update interval in seconds for Dynamic profiles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dyn_update_interval: Option<i32>,
    /// OCPP 2.1: next scheduled update for Dynamic profiles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dyn_update_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charging_profile_serialization() {
        let profile = ChargingProfile {
            id: 100,
            stack_level: 1,
            charging_profile_purpose: ChargingProfilePurpose::TxDefaultProfile,
            charging_profile_kind: ChargingProfileKind::Absolute,
            recurrency_kind: None,
            valid_from: None,
            valid_to: None,
            transaction_id: None,
            charging_schedule: vec![ChargingSchedule {
                id: 1,
                start_schedule: Some("2024-01-01T08:00:00Z".parse().unwrap()),
                duration: Some(3600),
                charging_rate_unit: ChargingRateUnit::A,
                charging_schedule_period: vec![ChargingSchedulePeriod {
                    start_period: 0,
                    limit: Some(16.0),
                    ..Default::default()
                }],
                min_charging_rate: None,
                randomized_delay: None,
                use_local_time: None,
                limit_at_soc: None,
                sales_tariff: None,
            }],
            dyn_update_interval: None,
            dyn_update_time: None,
        };

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["chargingProfilePurpose"], "TxDefaultProfile");
        assert_eq!(json["chargingSchedule"][0]["chargingRateUnit"], "A");
        assert_eq!(
            json["chargingSchedule"][0]["chargingSchedulePeriod"][0]["startPeriod"],
            0
        );
        // absent optionals are skipped on the wire
        assert!(json["transactionId"].is_null());

        let back: ChargingProfile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_purpose_parsing() {
        assert_eq!(
            ChargingProfilePurpose::from_str_opt(" TxProfile "),
            Some(ChargingProfilePurpose::TxProfile)
        );
        assert_eq!(ChargingProfilePurpose::from_str_opt("NotAPurpose"), None);
        assert_eq!(ChargingRateUnit::from_str_opt("W"), Some(ChargingRateUnit::W));
        assert_eq!(ChargingRateUnit::from_str_opt("kW"), None);
    }
}
