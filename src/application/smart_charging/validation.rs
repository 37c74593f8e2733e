//! Profile validation outcomes and compatibility tables
//!
//! The outcome enum deliberately has one variant per distinct rule violation
//! so a rejected SetChargingProfile can report exactly which rule failed.
//! Outcomes are values, not errors: validation never panics and never
//! returns `Err` for a malformed profile.

use tracing::warn;

use crate::domain::{ChargingProfilePurpose, ChargingSchedulePeriod, OperationMode};

/// Result of validating a single charging profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileValidationResult {
    Valid,
    EvseDoesNotExist,
    ExistingChargingStationExternalConstraints,
    InvalidProfileType,
    TxProfileMissingTransactionId,
    TxProfileEvseIdNotGreaterThanZero,
    TxProfileTransactionNotOnEvse,
    TxProfileEvseHasNoActiveTransaction,
    TxProfileConflictingStackLevel,
    ChargingProfileNoChargingSchedulePeriods,
    ChargingProfileFirstStartScheduleIsNotZero,
    ChargingProfileMissingRequiredStartSchedule,
    ChargingProfileExtraneousStartSchedule,
    ChargingProfileRateLimitExceeded,
    ChargingProfileIdSmallerThanMaxExternalConstraintsId,
    ChargingProfileUnsupportedPurpose,
    ChargingProfileUnsupportedKind,
    ChargingProfileNotDynamic,
    ChargingProfileEmptyChargingSchedules,
    ChargingScheduleChargingRateUnitUnsupported,
    ChargingSchedulePriorityExtraneousDuration,
    ChargingScheduleRandomizedDelay,
    ChargingScheduleUnsupportedLocalTime,
    ChargingScheduleUnsupportedRandomizedDelay,
    ChargingScheduleUnsupportedLimitAtSoc,
    ChargingScheduleUnsupportedEvseSleep,
    ChargingSchedulePeriodsOutOfOrder,
    ChargingSchedulePeriodInvalidPhaseToUse,
    ChargingSchedulePeriodUnsupportedNumberPhases,
    ChargingSchedulePeriodExtraneousPhaseValues,
    ChargingSchedulePeriodPhaseToUseAcPhaseSwitchingUnsupported,
    ChargingSchedulePeriodPriorityChargingNotChargingOnly,
    ChargingSchedulePeriodUnsupportedOperationMode,
    ChargingSchedulePeriodUnsupportedLimitSetpoint,
    ChargingSchedulePeriodNoPhaseForDc,
    ChargingSchedulePeriodNoFreqWattCurve,
    ChargingSchedulePeriodSignDifference,
    ChargingStationMaxProfileCannotBeRelative,
    ChargingStationMaxProfileEvseIdGreaterThanZero,
    DuplicateTxDefaultProfileFound,
    DuplicateProfileValidityPeriod,
    RequestStartTransactionNonTxProfile,
}

impl ProfileValidationResult {
    pub fn is_valid(&self) -> bool {
        *self == Self::Valid
    }

    /// The OCPP reason code reported for this outcome in a response's
    /// statusInfo.
    pub fn reason_code(&self) -> &'static str {
        use ProfileValidationResult::*;
        match self {
            Valid => "NoError",
            DuplicateProfileValidityPeriod
            | DuplicateTxDefaultProfileFound
            | ExistingChargingStationExternalConstraints => "DuplicateProfile",
            TxProfileTransactionNotOnEvse | TxProfileEvseHasNoActiveTransaction => "TxNotFound",
            TxProfileConflictingStackLevel => "InvalidStackLevel",
            ChargingScheduleChargingRateUnitUnsupported => "UnsupportedRateUnit",
            ChargingProfileRateLimitExceeded => "RateLimitExceeded",
            ChargingProfileIdSmallerThanMaxExternalConstraintsId => "InvalidProfileId",
            ChargingProfileUnsupportedPurpose => "UnsupportedPurpose",
            ChargingProfileUnsupportedKind => "UnsupportedKind",
            ChargingProfileNotDynamic => "InvalidProfile",
            ChargingProfileNoChargingSchedulePeriods
            | ChargingProfileFirstStartScheduleIsNotZero
            | ChargingProfileMissingRequiredStartSchedule
            | ChargingProfileExtraneousStartSchedule
            | ChargingProfileEmptyChargingSchedules
            | ChargingSchedulePriorityExtraneousDuration
            | ChargingScheduleRandomizedDelay
            | ChargingScheduleUnsupportedLocalTime
            | ChargingScheduleUnsupportedRandomizedDelay
            | ChargingScheduleUnsupportedLimitAtSoc
            | ChargingScheduleUnsupportedEvseSleep
            | ChargingSchedulePeriodsOutOfOrder
            | ChargingSchedulePeriodInvalidPhaseToUse
            | ChargingSchedulePeriodUnsupportedNumberPhases
            | ChargingSchedulePeriodExtraneousPhaseValues
            | ChargingSchedulePeriodPhaseToUseAcPhaseSwitchingUnsupported
            | ChargingSchedulePeriodPriorityChargingNotChargingOnly
            | ChargingSchedulePeriodUnsupportedOperationMode
            | ChargingSchedulePeriodUnsupportedLimitSetpoint
            | ChargingSchedulePeriodSignDifference => "InvalidSchedule",
            ChargingSchedulePeriodNoPhaseForDc => "NoPhaseForDC",
            ChargingSchedulePeriodNoFreqWattCurve => "NoFreqWattCurve",
            TxProfileMissingTransactionId => "MissingParam",
            EvseDoesNotExist
            | TxProfileEvseIdNotGreaterThanZero
            | ChargingStationMaxProfileCannotBeRelative
            | ChargingStationMaxProfileEvseIdGreaterThanZero
            | RequestStartTransactionNonTxProfile => "InvalidValue",
            InvalidProfileType => "InternalError",
        }
    }
}

impl std::fmt::Display for ProfileValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Operation modes allowed per profile purpose (OCPP 2.1 part 2, table 95).
pub fn allowed_operation_modes(purpose: ChargingProfilePurpose) -> &'static [OperationMode] {
    use OperationMode::*;
    match purpose {
        ChargingProfilePurpose::TxProfile | ChargingProfilePurpose::TxDefaultProfile => &[
            ChargingOnly,
            CentralSetpoint,
            ExternalSetpoint,
            ExternalLimits,
            CentralFrequency,
            LocalFrequency,
            LocalLoadBalancing,
            Idle,
        ],
        ChargingProfilePurpose::PriorityCharging => &[ChargingOnly],
        ChargingProfilePurpose::ChargingStationMaxProfile => &[ChargingOnly],
        ChargingProfilePurpose::ChargingStationExternalConstraints => {
            &[ChargingOnly, ExternalLimits, ExternalSetpoint]
        }
        ChargingProfilePurpose::LocalGeneration => &[ChargingOnly, ExternalLimits],
    }
}

pub fn operation_mode_allowed_for_purpose(
    operation_mode: OperationMode,
    purpose: ChargingProfilePurpose,
) -> bool {
    allowed_operation_modes(purpose).contains(&operation_mode)
}

/// The four limit/setpoint families a schedule period can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LimitSetpointKind {
    Limit,
    DischargeLimit,
    Setpoint,
    SetpointReactive,
}

/// Required and optional limit/setpoint families for an operation mode
/// (OCPP 2.1 part 2, table "Limits and setpoints per operation mode").
fn limits_setpoints_for(
    operation_mode: OperationMode,
) -> (&'static [LimitSetpointKind], &'static [LimitSetpointKind]) {
    use LimitSetpointKind::*;
    match operation_mode {
        OperationMode::ChargingOnly => (&[Limit], &[]),
        OperationMode::CentralSetpoint => (&[Setpoint], &[Limit, DischargeLimit, SetpointReactive]),
        OperationMode::CentralFrequency => (&[Setpoint], &[Limit, DischargeLimit]),
        OperationMode::ExternalSetpoint => (&[], &[Limit, DischargeLimit]),
        OperationMode::LocalFrequency
        | OperationMode::ExternalLimits
        | OperationMode::LocalLoadBalancing
        | OperationMode::Idle => (&[], &[]),
    }
}

fn limit_setpoint_ok(
    required: &[LimitSetpointKind],
    optional: &[LimitSetpointKind],
    kind: LimitSetpointKind,
    value: Option<f32>,
    value_l2: Option<f32>,
    value_l3: Option<f32>,
) -> bool {
    if required.contains(&kind) && value.is_none() {
        return false;
    }
    if (value.is_some() || value_l2.is_some() || value_l3.is_some())
        && !required.contains(&kind)
        && !optional.contains(&kind)
    {
        return false;
    }
    true
}

/// Check that the period only carries the limit/setpoint values its
/// operation mode allows, and all the required ones.
pub fn check_limits_and_setpoints(period: &ChargingSchedulePeriod) -> bool {
    use LimitSetpointKind::*;
    let operation_mode = period.operation_mode.unwrap_or(OperationMode::ChargingOnly);
    let (required, optional) = limits_setpoints_for(operation_mode);

    limit_setpoint_ok(required, optional, Limit, period.limit, period.limit_l2, period.limit_l3)
        && limit_setpoint_ok(
            required,
            optional,
            DischargeLimit,
            period.discharge_limit,
            period.discharge_limit_l2,
            period.discharge_limit_l3,
        )
        && limit_setpoint_ok(
            required,
            optional,
            Setpoint,
            period.setpoint,
            period.setpoint_l2,
            period.setpoint_l3,
        )
        && limit_setpoint_ok(
            required,
            optional,
            SetpointReactive,
            period.setpoint_reactive,
            period.setpoint_reactive_l2,
            period.setpoint_reactive_l3,
        )
}

/// A mixed-sign setpoint (charging on one phase while discharging on
/// another) is not supported.
pub fn all_setpoint_signs_equal(period: &ChargingSchedulePeriod) -> bool {
    let Some(setpoint) = period.setpoint else {
        return true;
    };
    if period.setpoint_l2.is_none() && period.setpoint_l3.is_none() {
        return true;
    }

    let conflicts = |other: Option<f32>| {
        other.is_some_and(|v| (setpoint > 0.0 && v < 0.0) || (setpoint < 0.0 && v > 0.0))
    };
    !(conflicts(period.setpoint_l2) || conflicts(period.setpoint_l3))
}

/// Parse a comma-separated purpose list from a device model variable.
/// Unknown entries are logged and skipped.
pub fn parse_purpose_list(csv: &str) -> Vec<ChargingProfilePurpose> {
    csv.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let purpose = ChargingProfilePurpose::from_str_opt(entry);
            if purpose.is_none() {
                warn!(entry, "Ignoring unknown charging profile purpose in configuration");
            }
            purpose
        })
        .collect()
}
