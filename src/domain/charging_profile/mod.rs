//! Charging profile domain module

pub mod model;
pub mod repository;

pub use model::{
    ChargingLimitSource, ChargingProfile, ChargingProfileKind, ChargingProfilePurpose,
    ChargingRateUnit, ChargingSchedule, ChargingSchedulePeriod, LimitAtSoc, OperationMode,
    RecurrencyKind, V2xFreqWattPoint,
};
pub use repository::{
    ChargingProfileCriterion, ChargingProfileRepository, ClearChargingProfileCriterion,
    StoredChargingProfile,
};
