//! EVSE runtime interface
//!
//! The EVSE / transaction runtime lives outside this crate; the smart
//! charging block only needs to know which EVSEs exist, whether they carry
//! an active transaction and what kind of grid connection they have.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Grid connection type of an EVSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentPhaseType {
    Ac,
    Dc,
    Unknown,
}

/// The slice of an active transaction the smart charging block cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub transaction_id: String,
    pub start_time: DateTime<Utc>,
}

/// One physical charging connector.
pub trait Evse: Send + Sync {
    fn id(&self) -> i32;

    /// The active transaction on this EVSE, if any.
    fn transaction(&self) -> Option<TransactionInfo>;

    fn current_phase_type(&self) -> CurrentPhaseType;
}

/// Registry of the station's EVSEs. Id 0 refers to the station as a whole
/// and is never a concrete EVSE.
pub trait EvseManager: Send + Sync {
    fn does_evse_exist(&self, evse_id: i32) -> bool;

    fn get_evse(&self, evse_id: i32) -> Option<Arc<dyn Evse>>;

    /// Number of concrete EVSEs; their ids are 1..=n.
    fn number_of_evses(&self) -> i32;
}
