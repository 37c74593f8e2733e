//! Read-path scenarios: GetCompositeSchedule and the composite schedule
//! calculation over stored profiles.

mod common;

use common::*;

use smart_charging::application::smart_charging::messages::{
    ChargingProfileStatus, GenericStatus, GetCompositeScheduleRequest, SetChargingProfileRequest,
};
use smart_charging::domain::{
    ChargingLimitSource, ChargingProfile, ChargingProfileKind, ChargingProfilePurpose,
    ChargingProfileRepository, ChargingRateUnit, ChargingSchedulePeriod, ControllerVariable,
    OcppProtocolVersion, RecurrencyKind, StoredChargingProfile,
};

async fn add(station: &TestStation, evse_id: i32, charging_profile: ChargingProfile) {
    let response = station
        .block
        .handle_set_charging_profile(SetChargingProfileRequest {
            evse_id,
            charging_profile,
        })
        .await;
    assert_eq!(
        response.status,
        ChargingProfileStatus::Accepted,
        "fixture profile should be accepted: {:?}",
        response.status_info
    );
}

/// The returned periods must tile the window: first at 0, strictly
/// ascending, all inside the window, every one carrying a limit.
fn assert_tiling(periods: &[ChargingSchedulePeriod], duration: i32) {
    assert!(!periods.is_empty());
    assert_eq!(periods[0].start_period, 0);
    for pair in periods.windows(2) {
        assert!(pair[0].start_period < pair[1].start_period);
    }
    for period in periods {
        assert!(period.start_period < duration);
        assert!(period.limit.is_some());
    }
}

fn limits(periods: &[ChargingSchedulePeriod]) -> Vec<(i32, f32)> {
    periods
        .iter()
        .map(|period| (period.start_period, period.limit.unwrap()))
        .collect()
}

#[tokio::test]
async fn unknown_evse_is_rejected() {
    let station = station(OcppProtocolVersion::V201);

    let response = station
        .block
        .handle_get_composite_schedule(GetCompositeScheduleRequest {
            evse_id: 99,
            duration: 3600,
            charging_rate_unit: Some(ChargingRateUnit::A),
        })
        .await;

    assert_eq!(response.status, GenericStatus::Rejected);
    assert!(response.schedule.is_none());
    let status_info = response.status_info.expect("rejection detail expected");
    assert_eq!(status_info.additional_info.as_deref(), Some("EvseDoesNotExist"));
}

#[tokio::test]
async fn unsupported_rate_unit_is_rejected() {
    let station = station(OcppProtocolVersion::V201);
    station
        .device_model
        .set(ControllerVariable::ChargingScheduleChargingRateUnit, "A");

    let response = station
        .block
        .handle_get_composite_schedule(GetCompositeScheduleRequest {
            evse_id: 1,
            duration: 3600,
            charging_rate_unit: Some(ChargingRateUnit::W),
        })
        .await;

    assert_eq!(response.status, GenericStatus::Rejected);
    let status_info = response.status_info.expect("rejection detail expected");
    assert_eq!(status_info.reason_code, "UnsupportedRateUnit");
}

#[tokio::test]
async fn requested_unit_defaults_to_the_first_supported_one() {
    let station = station(OcppProtocolVersion::V201);

    let response = station
        .block
        .handle_get_composite_schedule(GetCompositeScheduleRequest {
            evse_id: 1,
            duration: 1800,
            charging_rate_unit: None,
        })
        .await;

    assert_eq!(response.status, GenericStatus::Accepted);
    let schedule = response.schedule.expect("an accepted response carries a schedule");
    assert_eq!(schedule.charging_rate_unit, ChargingRateUnit::A);
    assert_eq!(schedule.evse_id, 1);
    assert_eq!(schedule.duration, 1800);
    assert_tiling(&schedule.charging_schedule_period, 1800);
}

#[tokio::test]
async fn partially_covered_window_is_tiled_with_the_default_limit() {
    let station = station(OcppProtocolVersion::V201);
    add(
        &station,
        1,
        absolute_profile(
            1,
            0,
            ChargingProfilePurpose::TxDefaultProfile,
            dt("2024-06-01T08:10:00Z"),
            Some(600),
            16.0,
        ),
    )
    .await;

    let schedule = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T08:00:00Z"),
            &dt("2024-06-01T09:00:00Z"),
            1,
            ChargingRateUnit::A,
            false,
            true,
        )
        .await
        .unwrap();

    assert_eq!(schedule.duration, 3600);
    assert_tiling(&schedule.charging_schedule_period, 3600);
    assert_eq!(
        limits(&schedule.charging_schedule_period),
        vec![(0, 48.0), (600, 16.0), (1200, 48.0)]
    );
}

#[tokio::test]
async fn lowest_limit_wins_across_purposes() {
    let station = station(OcppProtocolVersion::V201);
    add(
        &station,
        1,
        absolute_profile(
            1,
            0,
            ChargingProfilePurpose::TxDefaultProfile,
            dt("2024-06-01T08:00:00Z"),
            Some(3600),
            16.0,
        ),
    )
    .await;
    add(
        &station,
        0,
        absolute_profile(
            2,
            0,
            ChargingProfilePurpose::ChargingStationMaxProfile,
            dt("2024-06-01T08:00:00Z"),
            Some(3600),
            10.0,
        ),
    )
    .await;

    let schedule = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T08:00:00Z"),
            &dt("2024-06-01T09:00:00Z"),
            1,
            ChargingRateUnit::A,
            false,
            true,
        )
        .await
        .unwrap();

    assert_eq!(limits(&schedule.charging_schedule_period), vec![(0, 10.0)]);
}

#[tokio::test]
async fn tx_profile_overrides_tx_default_where_it_covers() {
    let station = station(OcppProtocolVersion::V201);
    station
        .evses
        .evse(1)
        .unwrap()
        .start_transaction("tx-1", dt("2024-06-01T08:00:00Z"));

    add(
        &station,
        1,
        absolute_profile(
            1,
            0,
            ChargingProfilePurpose::TxDefaultProfile,
            dt("2024-06-01T08:00:00Z"),
            Some(3600),
            16.0,
        ),
    )
    .await;
    let mut tx_profile = absolute_profile(
        2,
        0,
        ChargingProfilePurpose::TxProfile,
        dt("2024-06-01T08:00:00Z"),
        Some(1800),
        6.0,
    );
    tx_profile.transaction_id = Some("tx-1".to_string());
    add(&station, 1, tx_profile).await;

    let schedule = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T08:00:00Z"),
            &dt("2024-06-01T09:00:00Z"),
            1,
            ChargingRateUnit::A,
            false,
            false,
        )
        .await
        .unwrap();

    assert_eq!(
        limits(&schedule.charging_schedule_period),
        vec![(0, 6.0), (1800, 16.0)]
    );
}

#[tokio::test]
async fn station_wide_schedule_sums_per_evse_limits() {
    let station = station(OcppProtocolVersion::V201);
    add(
        &station,
        1,
        absolute_profile(
            1,
            0,
            ChargingProfilePurpose::TxDefaultProfile,
            dt("2024-06-01T08:00:00Z"),
            Some(3600),
            10.0,
        ),
    )
    .await;
    add(
        &station,
        2,
        absolute_profile(
            2,
            0,
            ChargingProfilePurpose::TxDefaultProfile,
            dt("2024-06-01T08:00:00Z"),
            Some(3600),
            6.0,
        ),
    )
    .await;

    let schedule = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T08:00:00Z"),
            &dt("2024-06-01T09:00:00Z"),
            0,
            ChargingRateUnit::A,
            false,
            true,
        )
        .await
        .unwrap();

    assert_eq!(schedule.evse_id, 0);
    assert_eq!(limits(&schedule.charging_schedule_period), vec![(0, 16.0)]);
}

#[tokio::test]
async fn station_wide_sum_is_capped_at_the_configured_ceiling() {
    let station = station(OcppProtocolVersion::V201);
    station
        .device_model
        .set(ControllerVariable::CompositeScheduleDefaultLimitAmps, "12");

    add(
        &station,
        1,
        absolute_profile(
            1,
            0,
            ChargingProfilePurpose::TxDefaultProfile,
            dt("2024-06-01T08:00:00Z"),
            Some(3600),
            10.0,
        ),
    )
    .await;
    add(
        &station,
        2,
        absolute_profile(
            2,
            0,
            ChargingProfilePurpose::TxDefaultProfile,
            dt("2024-06-01T08:00:00Z"),
            Some(3600),
            6.0,
        ),
    )
    .await;

    let schedule = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T08:00:00Z"),
            &dt("2024-06-01T09:00:00Z"),
            0,
            ChargingRateUnit::A,
            false,
            true,
        )
        .await
        .unwrap();

    assert_eq!(limits(&schedule.charging_schedule_period), vec![(0, 12.0)]);
}

#[tokio::test]
async fn external_constraints_apply_without_a_session() {
    let station = station(OcppProtocolVersion::V201);

    // external constraints profiles are installed by a trusted path, not
    // via SetChargingProfile
    station
        .store
        .insert_or_update(StoredChargingProfile {
            evse_id: 1,
            source: ChargingLimitSource::EMS,
            profile: absolute_profile(
                1,
                0,
                ChargingProfilePurpose::ChargingStationExternalConstraints,
                dt("2024-06-01T08:00:00Z"),
                Some(3600),
                8.0,
            ),
        })
        .await
        .unwrap();

    let schedule = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T08:00:00Z"),
            &dt("2024-06-01T09:00:00Z"),
            1,
            ChargingRateUnit::A,
            false,
            false,
        )
        .await
        .unwrap();

    assert_eq!(limits(&schedule.charging_schedule_period), vec![(0, 8.0)]);
}

#[tokio::test]
async fn offline_station_ignores_configured_purposes() {
    let station = station(OcppProtocolVersion::V201);
    station.device_model.set(
        ControllerVariable::IgnoredProfilePurposesOffline,
        "ChargingStationExternalConstraints",
    );
    station
        .store
        .insert_or_update(StoredChargingProfile {
            evse_id: 1,
            source: ChargingLimitSource::EMS,
            profile: absolute_profile(
                1,
                0,
                ChargingProfilePurpose::ChargingStationExternalConstraints,
                dt("2024-06-01T08:00:00Z"),
                Some(3600),
                8.0,
            ),
        })
        .await
        .unwrap();

    let online = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T08:00:00Z"),
            &dt("2024-06-01T09:00:00Z"),
            1,
            ChargingRateUnit::A,
            false,
            false,
        )
        .await
        .unwrap();
    assert_eq!(limits(&online.charging_schedule_period), vec![(0, 8.0)]);

    let offline = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T08:00:00Z"),
            &dt("2024-06-01T09:00:00Z"),
            1,
            ChargingRateUnit::A,
            true,
            false,
        )
        .await
        .unwrap();
    assert_eq!(limits(&offline.charging_schedule_period), vec![(0, 48.0)]);
}

#[tokio::test]
async fn mixed_units_convert_via_phases_and_voltage() {
    let station = station(OcppProtocolVersion::V201);

    // 11040 W at 3 phases x 230 V is 16 A
    let in_watts = profile(
        1,
        0,
        ChargingProfilePurpose::TxDefaultProfile,
        ChargingProfileKind::Absolute,
        schedule(
            ChargingRateUnit::W,
            Some(dt("2024-06-01T08:00:00Z")),
            Some(3600),
            &[(0, 11040.0)],
        ),
    );
    add(&station, 1, in_watts).await;

    let in_amps = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T08:00:00Z"),
            &dt("2024-06-01T09:00:00Z"),
            1,
            ChargingRateUnit::A,
            false,
            true,
        )
        .await
        .unwrap();
    assert_eq!(limits(&in_amps.charging_schedule_period), vec![(0, 16.0)]);

    let unconverted = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T08:00:00Z"),
            &dt("2024-06-01T09:00:00Z"),
            1,
            ChargingRateUnit::W,
            false,
            true,
        )
        .await
        .unwrap();
    assert_eq!(limits(&unconverted.charging_schedule_period), vec![(0, 11040.0)]);
}

#[tokio::test]
async fn daily_recurring_schedule_wraps_into_the_window() {
    let station = station(OcppProtocolVersion::V201);

    let mut recurring = profile(
        1,
        0,
        ChargingProfilePurpose::TxDefaultProfile,
        ChargingProfileKind::Recurring,
        schedule(
            ChargingRateUnit::A,
            Some(dt("2024-01-01T08:00:00Z")),
            Some(3600),
            &[(0, 10.0)],
        ),
    );
    recurring.recurrency_kind = Some(RecurrencyKind::Daily);
    add(&station, 1, recurring).await;

    // months later, the schedule still kicks in at 08:00 every day
    let schedule = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T07:30:00Z"),
            &dt("2024-06-01T09:30:00Z"),
            1,
            ChargingRateUnit::A,
            false,
            true,
        )
        .await
        .unwrap();

    assert_eq!(schedule.duration, 7200);
    assert_tiling(&schedule.charging_schedule_period, 7200);
    assert_eq!(
        limits(&schedule.charging_schedule_period),
        vec![(0, 48.0), (1800, 10.0), (5400, 48.0)]
    );
}

#[tokio::test]
async fn relative_profile_anchors_to_the_session_start() {
    let station = station(OcppProtocolVersion::V201);
    station
        .evses
        .evse(1)
        .unwrap()
        .start_transaction("tx-1", dt("2024-06-01T07:50:00Z"));

    add(&station, 1, relative_tx_profile(1, 0, "tx-1", Some(1800), 6.0)).await;

    // the transaction started 600 s before the window, so only 1200 s of
    // the 1800 s schedule remain
    let schedule = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T08:00:00Z"),
            &dt("2024-06-01T09:00:00Z"),
            1,
            ChargingRateUnit::A,
            false,
            false,
        )
        .await
        .unwrap();

    assert_eq!(
        limits(&schedule.charging_schedule_period),
        vec![(0, 6.0), (1200, 48.0)]
    );
}

#[tokio::test]
async fn stack_level_breaks_ties_within_a_purpose() {
    let station = station(OcppProtocolVersion::V201);
    station
        .evses
        .evse(1)
        .unwrap()
        .start_transaction("tx-1", dt("2024-06-01T08:00:00Z"));

    let mut low = absolute_profile(
        1,
        0,
        ChargingProfilePurpose::TxProfile,
        dt("2024-06-01T08:00:00Z"),
        Some(3600),
        16.0,
    );
    low.transaction_id = Some("tx-1".to_string());
    let mut high = absolute_profile(
        2,
        5,
        ChargingProfilePurpose::TxProfile,
        dt("2024-06-01T08:00:00Z"),
        Some(1800),
        6.0,
    );
    high.transaction_id = Some("tx-1".to_string());
    add(&station, 1, low).await;
    add(&station, 1, high).await;

    // the higher stack level replaces the lower one while it covers the
    // instant; afterwards the lower one applies again
    let schedule = station
        .block
        .calculate_composite_schedule(
            &dt("2024-06-01T08:00:00Z"),
            &dt("2024-06-01T09:00:00Z"),
            1,
            ChargingRateUnit::A,
            false,
            false,
        )
        .await
        .unwrap();

    assert_eq!(
        limits(&schedule.charging_schedule_period),
        vec![(0, 6.0), (1800, 16.0)]
    );
}

#[tokio::test]
async fn get_all_composite_schedules_covers_station_and_every_evse() {
    let station = station(OcppProtocolVersion::V201);

    let schedules = station
        .block
        .get_all_composite_schedules(3600, ChargingRateUnit::A)
        .await;

    let evse_ids: Vec<i32> = schedules.iter().map(|schedule| schedule.evse_id).collect();
    assert_eq!(evse_ids, vec![0, 1, 2]);
    for schedule in &schedules {
        assert_eq!(schedule.duration, 3600);
        assert_tiling(&schedule.charging_schedule_period, 3600);
    }
}
