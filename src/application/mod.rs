//! Application layer: the smart charging use cases.

pub mod smart_charging;

pub use smart_charging::{AddChargingProfileSource, SmartCharging, STATION_WIDE_ID};
