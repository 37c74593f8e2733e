//! Static EVSE manager for development and testing
//!
//! The real EVSE runtime lives outside this crate; this implementation holds
//! a fixed set of EVSEs whose transactions can be started and stopped from
//! test code.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::domain::{CurrentPhaseType, Evse, EvseManager, TransactionInfo};

/// An EVSE with a fixed id and phase type and a settable transaction.
pub struct StaticEvse {
    id: i32,
    phase_type: CurrentPhaseType,
    transaction: RwLock<Option<TransactionInfo>>,
}

impl StaticEvse {
    pub fn new(id: i32, phase_type: CurrentPhaseType) -> Self {
        Self {
            id,
            phase_type,
            transaction: RwLock::new(None),
        }
    }

    pub fn start_transaction(&self, transaction_id: impl Into<String>, start_time: DateTime<Utc>) {
        *self.transaction.write().expect("transaction lock poisoned") = Some(TransactionInfo {
            transaction_id: transaction_id.into(),
            start_time,
        });
    }

    pub fn stop_transaction(&self) {
        *self.transaction.write().expect("transaction lock poisoned") = None;
    }
}

impl Evse for StaticEvse {
    fn id(&self) -> i32 {
        self.id
    }

    fn transaction(&self) -> Option<TransactionInfo> {
        self.transaction
            .read()
            .expect("transaction lock poisoned")
            .clone()
    }

    fn current_phase_type(&self) -> CurrentPhaseType {
        self.phase_type
    }
}

/// EVSE manager over a fixed set of [`StaticEvse`]s with ids `1..=n`.
pub struct StaticEvseManager {
    evses: Vec<Arc<StaticEvse>>,
}

impl StaticEvseManager {
    /// `count` AC EVSEs with ids `1..=count`.
    pub fn ac(count: i32) -> Self {
        Self::with_phase_type(count, CurrentPhaseType::Ac)
    }

    pub fn with_phase_type(count: i32, phase_type: CurrentPhaseType) -> Self {
        Self {
            evses: (1..=count)
                .map(|id| Arc::new(StaticEvse::new(id, phase_type)))
                .collect(),
        }
    }

    /// Direct access for test setup (starting and stopping transactions).
    pub fn evse(&self, evse_id: i32) -> Option<Arc<StaticEvse>> {
        if evse_id < 1 {
            return None;
        }
        self.evses.get(evse_id as usize - 1).cloned()
    }
}

impl EvseManager for StaticEvseManager {
    fn does_evse_exist(&self, evse_id: i32) -> bool {
        evse_id >= 1 && evse_id <= self.evses.len() as i32
    }

    fn get_evse(&self, evse_id: i32) -> Option<Arc<dyn Evse>> {
        if !self.does_evse_exist(evse_id) {
            return None;
        }
        self.evses
            .get(evse_id as usize - 1)
            .map(|evse| evse.clone() as Arc<dyn Evse>)
    }

    fn number_of_evses(&self) -> i32 {
        self.evses.len() as i32
    }
}
