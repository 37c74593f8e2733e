//! Domain layer: entities, enums and the traits the smart charging block
//! consumes from the rest of the charging station.

pub mod charging_profile;
pub mod device_model;
pub mod error;
pub mod evse;
pub mod ocpp_version;

pub use charging_profile::{
    ChargingLimitSource, ChargingProfile, ChargingProfileCriterion, ChargingProfileKind,
    ChargingProfilePurpose, ChargingProfileRepository, ChargingRateUnit, ChargingSchedule,
    ChargingSchedulePeriod, ClearChargingProfileCriterion, LimitAtSoc, OperationMode,
    RecurrencyKind, StoredChargingProfile, V2xFreqWattPoint,
};
pub use device_model::{ControllerVariable, DeviceModel};
pub use error::{DomainError, DomainResult};
pub use evse::{CurrentPhaseType, Evse, EvseManager, TransactionInfo};
pub use ocpp_version::OcppProtocolVersion;
