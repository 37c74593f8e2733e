//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use smart_charging::application::SmartCharging;
use smart_charging::domain::{
    ChargingProfile, ChargingProfileKind, ChargingProfilePurpose, ChargingRateUnit,
    ChargingSchedule, ChargingSchedulePeriod, OcppProtocolVersion,
};
use smart_charging::infrastructure::{InMemoryDeviceModel, InMemoryProfileStore, StaticEvseManager};

/// A station under test: the smart charging block plus direct handles on
/// its collaborators for fixture setup.
pub struct TestStation {
    pub store: Arc<InMemoryProfileStore>,
    pub evses: Arc<StaticEvseManager>,
    pub device_model: Arc<InMemoryDeviceModel>,
    pub block: SmartCharging,
}

/// Station with two AC EVSEs and the default configuration (smart charging
/// enabled, rate units A and W, 3 phases at 230 V, 48 A / 33120 W defaults).
pub fn station(version: OcppProtocolVersion) -> TestStation {
    station_with_evses(version, StaticEvseManager::ac(2))
}

pub fn station_with_evses(version: OcppProtocolVersion, evses: StaticEvseManager) -> TestStation {
    // honors RUST_LOG when a test needs the block's tracing output
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let store = Arc::new(InMemoryProfileStore::new());
    let evses = Arc::new(evses);
    let device_model = Arc::new(InMemoryDeviceModel::with_defaults());

    let block = SmartCharging::new(
        store.clone(),
        evses.clone(),
        device_model.clone(),
        version,
    );

    TestStation {
        store,
        evses,
        device_model,
        block,
    }
}

pub fn dt(s: &str) -> DateTime<Utc> {
    s.parse().expect("test timestamp should parse")
}

/// Periods from `(startPeriod, limit)` pairs.
pub fn periods(entries: &[(i32, f32)]) -> Vec<ChargingSchedulePeriod> {
    entries
        .iter()
        .map(|(start_period, limit)| ChargingSchedulePeriod {
            start_period: *start_period,
            limit: Some(*limit),
            ..Default::default()
        })
        .collect()
}

pub fn schedule(
    unit: ChargingRateUnit,
    start_schedule: Option<DateTime<Utc>>,
    duration: Option<i32>,
    entries: &[(i32, f32)],
) -> ChargingSchedule {
    ChargingSchedule {
        id: 1,
        start_schedule,
        duration,
        charging_rate_unit: unit,
        charging_schedule_period: periods(entries),
        min_charging_rate: None,
        randomized_delay: None,
        use_local_time: None,
        limit_at_soc: None,
        sales_tariff: None,
    }
}

pub fn profile(
    id: i32,
    stack_level: i32,
    purpose: ChargingProfilePurpose,
    kind: ChargingProfileKind,
    schedule: ChargingSchedule,
) -> ChargingProfile {
    ChargingProfile {
        id,
        stack_level,
        charging_profile_purpose: purpose,
        charging_profile_kind: kind,
        recurrency_kind: None,
        valid_from: None,
        valid_to: None,
        transaction_id: None,
        charging_schedule: vec![schedule],
        dyn_update_interval: None,
        dyn_update_time: None,
    }
}

/// An Absolute profile with a single-period schedule.
pub fn absolute_profile(
    id: i32,
    stack_level: i32,
    purpose: ChargingProfilePurpose,
    start: DateTime<Utc>,
    duration: Option<i32>,
    limit: f32,
) -> ChargingProfile {
    profile(
        id,
        stack_level,
        purpose,
        ChargingProfileKind::Absolute,
        schedule(ChargingRateUnit::A, Some(start), duration, &[(0, limit)]),
    )
}

/// A Relative single-period TxProfile bound to the given transaction.
pub fn relative_tx_profile(
    id: i32,
    stack_level: i32,
    transaction_id: &str,
    duration: Option<i32>,
    limit: f32,
) -> ChargingProfile {
    let mut profile = profile(
        id,
        stack_level,
        ChargingProfilePurpose::TxProfile,
        ChargingProfileKind::Relative,
        schedule(ChargingRateUnit::A, None, duration, &[(0, limit)]),
    );
    profile.transaction_id = Some(transaction_id.to_string());
    profile
}
