//! Infrastructure layer: in-memory implementations of the external
//! interfaces, for development and testing.

pub mod device_model;
pub mod evse;
pub mod storage;

pub use device_model::InMemoryDeviceModel;
pub use evse::{StaticEvse, StaticEvseManager};
pub use storage::InMemoryProfileStore;
