//! # OCPP Smart Charging
//!
//! Smart charging functional block for an OCPP 2.0.1 / 2.1 charging station:
//! charging profile validation and storage orchestration plus composite
//! schedule calculation.
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **domain**: Core business entities, enums and the traits the block
//!   consumes from the rest of the station (profile store, EVSE runtime,
//!   device model)
//! - **application**: The smart charging block itself: request handlers,
//!   profile validation and the composite schedule engine
//! - **infrastructure**: In-memory implementations of the external
//!   interfaces, for development and testing
//!
//! Protocol transport, message framing, durable storage and the EVSE
//! hardware runtime live outside this crate.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{AddChargingProfileSource, SmartCharging, STATION_WIDE_ID};
pub use application::smart_charging::messages::{
    ClearChargingProfileRequest, ClearChargingProfileResponse, CompositeSchedule,
    GetChargingProfilesRequest, GetChargingProfilesResponse, GetCompositeScheduleRequest,
    GetCompositeScheduleResponse, SetChargingProfileRequest, SetChargingProfileResponse,
};
pub use application::smart_charging::validation::ProfileValidationResult;
pub use domain::{
    ChargingLimitSource, ChargingProfile, ChargingProfileKind, ChargingProfilePurpose,
    ChargingProfileRepository, ChargingRateUnit, ChargingSchedule, ChargingSchedulePeriod,
    DeviceModel, EvseManager, OcppProtocolVersion,
};
pub use infrastructure::{InMemoryDeviceModel, InMemoryProfileStore, StaticEvse, StaticEvseManager};
