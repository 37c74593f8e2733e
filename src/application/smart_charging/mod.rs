//! Smart charging functional block
//!
//! Accepts, validates and stores charging profiles and computes composite
//! schedules: the single binding limit-over-time per EVSE after merging all
//! applicable profiles.
//!
//! The block consumes three external collaborators through traits: the
//! profile store, the EVSE runtime and the device model (configuration).
//! All request handling is synchronous per request; the store is the only
//! shared mutable resource and validate-then-insert runs under a write lock
//! so two concurrent SetChargingProfile calls cannot both pass a conflict
//! check and both persist.

pub mod messages;
pub mod profile;
pub mod validation;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::{
    device_model::{DEFAULT_AND_MAX_NUMBER_PHASES, DEFAULT_LIMIT_AMPS, DEFAULT_LIMIT_WATTS, LOW_VOLTAGE},
    ChargingLimitSource, ChargingProfile, ChargingProfileKind, ChargingProfilePurpose,
    ChargingProfileRepository, ChargingRateUnit, ControllerVariable, CurrentPhaseType, DeviceModel,
    DomainResult, Evse, EvseManager, OcppProtocolVersion, OperationMode, StoredChargingProfile,
};

use messages::{
    ChargingProfileStatus, ClearChargingProfileRequest, ClearChargingProfileResponse,
    ClearChargingProfileStatus, CompositeSchedule, GenericStatus, GetChargingProfileStatus,
    GetChargingProfilesRequest, GetChargingProfilesResponse, GetCompositeScheduleRequest,
    GetCompositeScheduleResponse, ReportedChargingProfile, SetChargingProfileRequest,
    SetChargingProfileResponse, StatusInfo,
};
use profile::{
    calculate_all_profiles, convert_intermediate_into_schedule, elapsed_seconds, floor_seconds,
    generate_profile_from_periods, merge_profiles_by_lowest_limit, merge_profiles_by_summing_limits,
    merge_tx_profile_with_tx_default_profile, IntermediateProfile,
};
use validation::{
    all_setpoint_signs_equal, check_limits_and_setpoints, operation_mode_allowed_for_purpose,
    parse_purpose_list, ProfileValidationResult,
};

/// EVSE id addressing the station as a whole.
pub const STATION_WIDE_ID: i32 = 0;

/// Which request carried a profile into the block. TxProfiles arriving with
/// a RequestStartTransaction have no transaction id yet, so parts of the
/// TxProfile validation are skipped for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddChargingProfileSource {
    SetChargingProfileRequest,
    RequestStartTransactionRequest,
}

type ProfilesChangedCallback = Box<dyn Fn() + Send + Sync>;

/// Configuration snapshot for one composite schedule computation.
struct CompositeScheduleConfig {
    purposes_to_ignore: Vec<ChargingProfilePurpose>,
    current_limit: f32,
    power_limit: f32,
    default_number_phases: i32,
    supply_voltage: f32,
}

impl CompositeScheduleConfig {
    fn new(device_model: &dyn DeviceModel, is_offline: bool) -> Self {
        let purposes_to_ignore = if is_offline {
            device_model
                .get_string(ControllerVariable::IgnoredProfilePurposesOffline)
                .map(|csv| parse_purpose_list(&csv))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Self {
            purposes_to_ignore,
            current_limit: device_model
                .get_int(ControllerVariable::CompositeScheduleDefaultLimitAmps)
                .map_or(DEFAULT_LIMIT_AMPS, |v| v as f32),
            power_limit: device_model
                .get_int(ControllerVariable::CompositeScheduleDefaultLimitWatts)
                .map_or(DEFAULT_LIMIT_WATTS, |v| v as f32),
            default_number_phases: device_model
                .get_int(ControllerVariable::CompositeScheduleDefaultNumberPhases)
                .unwrap_or(DEFAULT_AND_MAX_NUMBER_PHASES),
            supply_voltage: device_model
                .get_int(ControllerVariable::SupplyVoltage)
                .map_or(LOW_VOLTAGE, |v| v as f32),
        }
    }
}

/// Build the per-purpose interval lists of one EVSE: the external
/// constraints list, plus (with an active or simulated session) the combined
/// Tx/TxDefault list where a TxProfile limit beats the TxDefault one.
fn generate_evse_intermediates(
    mut evse_profiles: Vec<ChargingProfile>,
    station_wide_profiles: &[ChargingProfile],
    start_time: &DateTime<Utc>,
    end_time: &DateTime<Utc>,
    session_start: Option<DateTime<Utc>>,
    simulate_transaction_active: bool,
) -> Vec<IntermediateProfile> {
    evse_profiles.extend(station_wide_profiles.iter().cloned());

    let external_constraints_periods = calculate_all_profiles(
        start_time,
        end_time,
        session_start.as_ref(),
        &evse_profiles,
        ChargingProfilePurpose::ChargingStationExternalConstraints,
    );

    let mut output = vec![generate_profile_from_periods(
        &external_constraints_periods,
        start_time,
        end_time,
    )];

    if session_start.is_some() || simulate_transaction_active {
        let tx_default_periods = calculate_all_profiles(
            start_time,
            end_time,
            session_start.as_ref(),
            &evse_profiles,
            ChargingProfilePurpose::TxDefaultProfile,
        );
        let tx_periods = calculate_all_profiles(
            start_time,
            end_time,
            session_start.as_ref(),
            &evse_profiles,
            ChargingProfilePurpose::TxProfile,
        );

        let tx_default = generate_profile_from_periods(&tx_default_periods, start_time, end_time);
        let tx = generate_profile_from_periods(&tx_periods, start_time, end_time);

        output.push(merge_tx_profile_with_tx_default_profile(&tx, &tx_default));
    }

    output
}

/// The smart charging block: profile registry plus composite schedule
/// engine for one charging station.
pub struct SmartCharging {
    store: Arc<dyn ChargingProfileRepository>,
    evse_manager: Arc<dyn EvseManager>,
    device_model: Arc<dyn DeviceModel>,
    ocpp_version: OcppProtocolVersion,
    /// Set by the connectivity layer; offline purposes-to-ignore filtering
    /// keys off this.
    offline: AtomicBool,
    /// Last accepted-or-attempted profile update per purpose, for the 2.1
    /// update rate limit. Owned per block instance, not global.
    last_profile_update: DashMap<ChargingProfilePurpose, DateTime<Utc>>,
    /// Serializes validate-then-insert against other writers.
    write_lock: Mutex<()>,
    profiles_changed_callback: Option<ProfilesChangedCallback>,
}

impl SmartCharging {
    pub fn new(
        store: Arc<dyn ChargingProfileRepository>,
        evse_manager: Arc<dyn EvseManager>,
        device_model: Arc<dyn DeviceModel>,
        ocpp_version: OcppProtocolVersion,
    ) -> Self {
        Self {
            store,
            evse_manager,
            device_model,
            ocpp_version,
            offline: AtomicBool::new(false),
            last_profile_update: DashMap::new(),
            write_lock: Mutex::new(()),
            profiles_changed_callback: None,
        }
    }

    /// Register a callback fired whenever the set of stored profiles
    /// changed, so the charging runtime can recompute its limits.
    pub fn with_profiles_changed_callback(
        mut self,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.profiles_changed_callback = Some(Box::new(callback));
        self
    }

    /// Inform the block about the station's connectivity state.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Relaxed)
    }

    fn notify_profiles_changed(&self) {
        if let Some(callback) = &self.profiles_changed_callback {
            callback();
        }
    }

    fn smart_charging_enabled(&self) -> bool {
        self.device_model
            .get_bool(ControllerVariable::SmartChargingEnabled)
            .unwrap_or(false)
    }

    // --- request handlers -------------------------------------------------

    pub async fn handle_set_charging_profile(
        &self,
        request: SetChargingProfileRequest,
    ) -> SetChargingProfileResponse {
        debug!(
            evse_id = request.evse_id,
            profile_id = request.charging_profile.id,
            "Received SetChargingProfile"
        );

        if !self.smart_charging_enabled() {
            warn!("SmartChargingEnabled is not set for this station, rejecting SetChargingProfile");
            return SetChargingProfileResponse::rejected(
                "NotSupported",
                "ChargingStationDoesNotSupportSmartCharging",
            );
        }

        // ChargingStationExternalConstraints profiles are installed through
        // a different path and never via SetChargingProfile.
        if request.charging_profile.charging_profile_purpose
            == ChargingProfilePurpose::ChargingStationExternalConstraints
        {
            return SetChargingProfileResponse::rejected(
                "InvalidValue",
                "ChargingStationExternalConstraintsInSetChargingProfileRequest",
            );
        }

        let response = self
            .conform_validate_and_add_profile(
                request.charging_profile,
                request.evse_id,
                ChargingLimitSource::CSO,
                AddChargingProfileSource::SetChargingProfileRequest,
            )
            .await;

        if response.status == ChargingProfileStatus::Accepted {
            self.notify_profiles_changed();
        } else if let Some(status_info) = &response.status_info {
            debug!(
                reason_code = %status_info.reason_code,
                additional_info = status_info.additional_info.as_deref().unwrap_or(""),
                "Rejecting SetChargingProfile"
            );
        }

        response
    }

    pub async fn handle_clear_charging_profile(
        &self,
        request: ClearChargingProfileRequest,
    ) -> ClearChargingProfileResponse {
        debug!(profile_id = ?request.charging_profile_id, "Received ClearChargingProfile");

        // External constraints profiles are not removable through this path.
        let names_external_constraints = request
            .charging_profile_criteria
            .as_ref()
            .and_then(|criteria| criteria.charging_profile_purpose)
            == Some(ChargingProfilePurpose::ChargingStationExternalConstraints);

        if names_external_constraints {
            return ClearChargingProfileResponse {
                status: ClearChargingProfileStatus::Unknown,
                status_info: Some(StatusInfo::new(
                    "InvalidValue",
                    "ChargingStationExternalConstraintsInClearChargingProfileRequest",
                )),
            };
        }

        let response = self.clear_profiles(&request).await;
        if response.status == ClearChargingProfileStatus::Accepted {
            self.notify_profiles_changed();
        }
        response
    }

    pub async fn handle_get_charging_profiles(
        &self,
        request: GetChargingProfilesRequest,
    ) -> GetChargingProfilesResponse {
        debug!(request_id = request.request_id, "Received GetChargingProfiles");

        let profiles = match self.get_reported_profiles(&request).await {
            Ok(profiles) => profiles,
            Err(e) => {
                error!(error = %e, "Could not query charging profiles");
                Vec::new()
            }
        };

        let status = if profiles.is_empty() {
            GetChargingProfileStatus::NoProfiles
        } else {
            GetChargingProfileStatus::Accepted
        };

        GetChargingProfilesResponse { status, profiles }
    }

    pub async fn handle_get_composite_schedule(
        &self,
        request: GetCompositeScheduleRequest,
    ) -> GetCompositeScheduleResponse {
        debug!(
            evse_id = request.evse_id,
            duration = request.duration,
            "Received GetCompositeSchedule"
        );
        self.get_composite_schedule_internal(&request, true).await
    }

    /// Composite schedule without simulating a transaction: Tx(Default)
    /// profiles only count when a transaction is actually active.
    pub async fn get_composite_schedule(
        &self,
        evse_id: i32,
        duration: Duration,
        unit: ChargingRateUnit,
    ) -> Option<CompositeSchedule> {
        let request = GetCompositeScheduleRequest {
            evse_id,
            duration: duration.num_seconds() as i32,
            charging_rate_unit: Some(unit),
        };

        let response = self.get_composite_schedule_internal(&request, false).await;
        match response.status {
            GenericStatus::Accepted => response.schedule,
            GenericStatus::Rejected => None,
        }
    }

    /// Composite schedules for every EVSE id including the station-wide 0.
    pub async fn get_all_composite_schedules(
        &self,
        duration_s: i32,
        unit: ChargingRateUnit,
    ) -> Vec<CompositeSchedule> {
        let mut composite_schedules = Vec::new();

        for evse_id in 0..=self.evse_manager.number_of_evses() {
            let request = GetCompositeScheduleRequest {
                evse_id,
                duration: duration_s,
                charging_rate_unit: Some(unit),
            };
            let response = self.get_composite_schedule_internal(&request, true).await;
            match (response.status, response.schedule) {
                (GenericStatus::Accepted, Some(schedule)) => composite_schedules.push(schedule),
                _ => warn!(evse_id, "Could not internally retrieve composite schedule"),
            }
        }

        composite_schedules
    }

    /// Remove the TxProfiles of an ended transaction.
    pub async fn delete_transaction_tx_profiles(&self, transaction_id: &str) -> DomainResult<u64> {
        let removed = self.store.delete_by_transaction(transaction_id).await?;
        if removed > 0 {
            info!(transaction_id, removed, "Removed transaction charging profiles");
            self.notify_profiles_changed();
        }
        Ok(removed)
    }

    // --- write path -------------------------------------------------------

    /// Validate the profile and persist it when valid. Holds the write lock
    /// across validation and insert so conflict checks stay authoritative.
    pub async fn conform_validate_and_add_profile(
        &self,
        mut profile: ChargingProfile,
        evse_id: i32,
        charging_limit_source: ChargingLimitSource,
        source_of_request: AddChargingProfileSource,
    ) -> SetChargingProfileResponse {
        let _guard = self.write_lock.lock().await;

        let mut result = match self
            .conform_and_validate_profile(&mut profile, evse_id, source_of_request)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Profile validation failed on storage access");
                return SetChargingProfileResponse {
                    status: ChargingProfileStatus::Rejected,
                    status_info: Some(StatusInfo {
                        reason_code: "InternalError".to_string(),
                        additional_info: None,
                    }),
                };
            }
        };

        if result.is_valid() {
            result = self.verify_rate_limit(&profile);
        }

        if result.is_valid() {
            self.add_profile(profile, evse_id, charging_limit_source).await
        } else {
            SetChargingProfileResponse::rejected(result.reason_code(), result.to_string())
        }
    }

    /// Validate one profile against the structural and business rules,
    /// conforming absent validFrom/validTo (and AC numberPhases) on the way.
    pub async fn conform_and_validate_profile(
        &self,
        profile: &mut ChargingProfile,
        evse_id: i32,
        source_of_request: AddChargingProfileSource,
    ) -> DomainResult<ProfileValidationResult> {
        if source_of_request == AddChargingProfileSource::RequestStartTransactionRequest {
            let result = Self::validate_request_start_transaction_profile(profile);
            if !result.is_valid() {
                return Ok(result);
            }
        }

        self.conform_validity_periods(profile);

        if evse_id != STATION_WIDE_ID {
            let result = self.validate_evse_exists(evse_id);
            if !result.is_valid() {
                return Ok(result);
            }
        }

        let result = self.verify_no_conflicting_external_constraints_id(profile).await?;
        if !result.is_valid() {
            return Ok(result);
        }

        let evse = if evse_id != STATION_WIDE_ID {
            self.evse_manager.get_evse(evse_id)
        } else {
            None
        };
        let result = self.validate_profile_schedules(profile, evse.as_deref());
        if !result.is_valid() {
            return Ok(result);
        }

        if self.is_overlapping_validity_period(profile, evse_id).await? {
            return Ok(ProfileValidationResult::DuplicateProfileValidityPeriod);
        }

        let result = match profile.charging_profile_purpose {
            ChargingProfilePurpose::ChargingStationMaxProfile => {
                Self::validate_charging_station_max_profile(profile, evse_id)
            }
            ChargingProfilePurpose::TxDefaultProfile => {
                self.validate_tx_default_profile(profile, evse_id).await?
            }
            ChargingProfilePurpose::TxProfile => {
                self.validate_tx_profile(profile, evse_id, source_of_request).await?
            }
            ChargingProfilePurpose::PriorityCharging => {
                Self::validate_priority_charging_profile(profile)
            }
            ChargingProfilePurpose::ChargingStationExternalConstraints
            | ChargingProfilePurpose::LocalGeneration => {
                // the validation rules for these purposes are not fully
                // specified; fail closed instead of guessing
                warn!(
                    profile_id = profile.id,
                    purpose = ?profile.charging_profile_purpose,
                    "Rejecting profile purpose without complete validation rules"
                );
                ProfileValidationResult::ChargingProfileUnsupportedPurpose
            }
        };

        Ok(result)
    }

    /// OCPP 2.1 update rate limit. The attempt timestamp is recorded for
    /// the purpose whether or not the attempt is accepted.
    fn verify_rate_limit(&self, profile: &ChargingProfile) -> ProfileValidationResult {
        let mut result = ProfileValidationResult::Valid;
        let purpose = profile.charging_profile_purpose;

        if self.ocpp_version != OcppProtocolVersion::V21 {
            return result;
        }
        let Some(limit_seconds) = self
            .device_model
            .get_int(ControllerVariable::ChargingProfileUpdateRateLimit)
        else {
            return result;
        };

        let now = Utc::now();
        if let Some(last_update) = self.last_profile_update.get(&purpose) {
            if (now - *last_update).num_seconds() < i64::from(limit_seconds) {
                result = ProfileValidationResult::ChargingProfileRateLimitExceeded;
            }
        }
        self.last_profile_update.insert(purpose, now);

        result
    }

    async fn add_profile(
        &self,
        profile: ChargingProfile,
        evse_id: i32,
        source: ChargingLimitSource,
    ) -> SetChargingProfileResponse {
        let profile_id = profile.id;
        let stored = StoredChargingProfile {
            evse_id,
            source,
            profile,
        };

        // an existing profile with the same id is replaced
        match self.store.insert_or_update(stored).await {
            Ok(()) => {
                info!(profile_id, evse_id, "Stored charging profile");
                SetChargingProfileResponse {
                    status: ChargingProfileStatus::Accepted,
                    status_info: None,
                }
            }
            Err(e) => {
                error!(profile_id, error = %e, "Could not store charging profile");
                SetChargingProfileResponse {
                    status: ChargingProfileStatus::Rejected,
                    status_info: Some(StatusInfo {
                        reason_code: "InternalError".to_string(),
                        additional_info: None,
                    }),
                }
            }
        }
    }

    async fn clear_profiles(&self, request: &ClearChargingProfileRequest) -> ClearChargingProfileResponse {
        match self
            .store
            .clear_matching(request.charging_profile_id, request.charging_profile_criteria.as_ref())
            .await
        {
            Ok(removed) if removed > 0 => {
                info!(removed, "Cleared charging profiles");
                ClearChargingProfileResponse {
                    status: ClearChargingProfileStatus::Accepted,
                    status_info: None,
                }
            }
            Ok(_) => ClearChargingProfileResponse {
                status: ClearChargingProfileStatus::Unknown,
                status_info: None,
            },
            Err(e) => {
                error!(error = %e, "Could not clear charging profiles");
                ClearChargingProfileResponse {
                    status: ClearChargingProfileStatus::Unknown,
                    status_info: None,
                }
            }
        }
    }

    async fn get_reported_profiles(
        &self,
        request: &GetChargingProfilesRequest,
    ) -> DomainResult<Vec<ReportedChargingProfile>> {
        let stored = self
            .store
            .find_matching(request.evse_id, &request.charging_profile)
            .await?;

        Ok(stored
            .into_iter()
            .map(|stored| ReportedChargingProfile {
                evse_id: stored.evse_id,
                source: stored.source,
                profile: stored.profile,
            })
            .collect())
    }

    // --- validation -------------------------------------------------------

    fn validate_request_start_transaction_profile(
        profile: &ChargingProfile,
    ) -> ProfileValidationResult {
        if profile.charging_profile_purpose != ChargingProfilePurpose::TxProfile {
            return ProfileValidationResult::RequestStartTransactionNonTxProfile;
        }
        ProfileValidationResult::Valid
    }

    fn validate_evse_exists(&self, evse_id: i32) -> ProfileValidationResult {
        if self.evse_manager.does_evse_exist(evse_id) {
            ProfileValidationResult::Valid
        } else {
            ProfileValidationResult::EvseDoesNotExist
        }
    }

    fn validate_charging_station_max_profile(
        profile: &ChargingProfile,
        evse_id: i32,
    ) -> ProfileValidationResult {
        if profile.charging_profile_purpose != ChargingProfilePurpose::ChargingStationMaxProfile {
            return ProfileValidationResult::InvalidProfileType;
        }
        if evse_id > 0 {
            return ProfileValidationResult::ChargingStationMaxProfileEvseIdGreaterThanZero;
        }
        if profile.charging_profile_kind == ChargingProfileKind::Relative {
            return ProfileValidationResult::ChargingStationMaxProfileCannotBeRelative;
        }
        ProfileValidationResult::Valid
    }

    /// A TxDefaultProfile must not reuse a stack level already taken in the
    /// opposite scope pool (station-wide vs EVSE-specific); collisions
    /// within the same pool are caught by the validity-overlap check.
    async fn validate_tx_default_profile(
        &self,
        profile: &ChargingProfile,
        evse_id: i32,
    ) -> DomainResult<ProfileValidationResult> {
        let candidates = self
            .store
            .find_by_purpose(ChargingProfilePurpose::TxDefaultProfile)
            .await?;

        let conflicting_pool: Vec<_> = candidates
            .into_iter()
            .filter(|stored| {
                if evse_id == STATION_WIDE_ID {
                    stored.evse_id != STATION_WIDE_ID
                } else {
                    stored.evse_id == STATION_WIDE_ID
                }
            })
            .collect();

        for candidate in conflicting_pool {
            if candidate.profile.stack_level == profile.stack_level
                && candidate.profile.id != profile.id
            {
                return Ok(ProfileValidationResult::DuplicateTxDefaultProfileFound);
            }
        }

        Ok(ProfileValidationResult::Valid)
    }

    async fn validate_tx_profile(
        &self,
        profile: &ChargingProfile,
        evse_id: i32,
        source_of_request: AddChargingProfileSource,
    ) -> DomainResult<ProfileValidationResult> {
        // TxProfile only applies to a concrete EVSE
        if evse_id <= 0 {
            return Ok(ProfileValidationResult::TxProfileEvseIdNotGreaterThanZero);
        }

        let Some(evse) = self.evse_manager.get_evse(evse_id) else {
            return Ok(ProfileValidationResult::EvseDoesNotExist);
        };

        // the transaction id is not assigned yet when the profile arrives
        // with a RequestStartTransaction
        if source_of_request == AddChargingProfileSource::RequestStartTransactionRequest {
            return Ok(ProfileValidationResult::Valid);
        }

        let Some(transaction_id) = &profile.transaction_id else {
            return Ok(ProfileValidationResult::TxProfileMissingTransactionId);
        };

        let Some(transaction) = evse.transaction() else {
            return Ok(ProfileValidationResult::TxProfileEvseHasNoActiveTransaction);
        };

        if transaction.transaction_id != *transaction_id {
            return Ok(ProfileValidationResult::TxProfileTransactionNotOnEvse);
        }

        // no second profile may take the same stack level within the
        // transaction
        let same_transaction = self.store.find_by_transaction(transaction_id).await?;
        let conflict = same_transaction.iter().any(|stored| {
            stored.profile.stack_level == profile.stack_level && stored.profile.id != profile.id
        });
        if conflict {
            return Ok(ProfileValidationResult::TxProfileConflictingStackLevel);
        }

        Ok(ProfileValidationResult::Valid)
    }

    /// PriorityCharging overrules Tx(Default) restrictions until the end of
    /// the transaction, so its schedules may not carry a duration.
    fn validate_priority_charging_profile(profile: &ChargingProfile) -> ProfileValidationResult {
        if profile.charging_profile_purpose != ChargingProfilePurpose::PriorityCharging {
            return ProfileValidationResult::InvalidProfileType;
        }

        for schedule in &profile.charging_schedule {
            if schedule.duration.is_some() {
                return ProfileValidationResult::ChargingSchedulePriorityExtraneousDuration;
            }
        }

        ProfileValidationResult::Valid
    }

    fn validate_profile_schedules(
        &self,
        profile: &mut ChargingProfile,
        evse: Option<&dyn Evse>,
    ) -> ProfileValidationResult {
        use ProfileValidationResult::*;

        if profile.charging_schedule.is_empty() {
            return ChargingProfileEmptyChargingSchedules;
        }

        let purpose = profile.charging_profile_purpose;
        let kind = profile.charging_profile_kind;
        let has_dyn_fields = profile.dyn_update_interval.is_some() || profile.dyn_update_time.is_some();
        let profile_id = profile.id;
        let is_v21 = self.ocpp_version == OcppProtocolVersion::V21;

        let supply_phases = self
            .device_model
            .get_int(ControllerVariable::ChargingStationSupplyPhases)
            .unwrap_or(DEFAULT_AND_MAX_NUMBER_PHASES);
        let phase_type = self.current_phase_type(evse);
        let supported_rate_units = self
            .device_model
            .get_string(ControllerVariable::ChargingScheduleChargingRateUnit)
            .unwrap_or_else(|| "A,W".to_string());

        for schedule in &mut profile.charging_schedule {
            let unit_supported = supported_rate_units
                .split(',')
                .any(|unit| unit.trim() == schedule.charging_rate_unit.as_str());
            if !unit_supported {
                return ChargingScheduleChargingRateUnitUnsupported;
            }

            if schedule.charging_schedule_period.is_empty() {
                return ChargingProfileNoChargingSchedulePeriods;
            }

            if is_v21 {
                // randomized delays only make sense for transaction-bound
                // profiles
                if purpose != ChargingProfilePurpose::TxProfile
                    && purpose != ChargingProfilePurpose::TxDefaultProfile
                    && schedule.randomized_delay.is_some_and(|delay| delay > 0)
                {
                    return ChargingScheduleRandomizedDelay;
                }

                let supported_additional = self
                    .device_model
                    .get_string(ControllerVariable::SupportedAdditionalPurposes)
                    .map(|csv| parse_purpose_list(&csv))
                    .unwrap_or_default();
                if (purpose == ChargingProfilePurpose::PriorityCharging
                    || purpose == ChargingProfilePurpose::LocalGeneration)
                    && !supported_additional.contains(&purpose)
                {
                    return ChargingProfileUnsupportedPurpose;
                }

                if kind == ChargingProfileKind::Dynamic
                    && !self
                        .device_model
                        .get_bool(ControllerVariable::SupportsDynamicProfiles)
                        .unwrap_or(false)
                {
                    return ChargingProfileUnsupportedKind;
                }

                if has_dyn_fields && kind != ChargingProfileKind::Dynamic {
                    return ChargingProfileNotDynamic;
                }

                if schedule.use_local_time.unwrap_or(false)
                    && !self
                        .device_model
                        .get_bool(ControllerVariable::SupportsUseLocalTime)
                        .unwrap_or(false)
                {
                    return ChargingScheduleUnsupportedLocalTime;
                }

                if schedule.randomized_delay.is_some()
                    && !self
                        .device_model
                        .get_bool(ControllerVariable::SupportsRandomizedDelay)
                        .unwrap_or(false)
                {
                    return ChargingScheduleUnsupportedRandomizedDelay;
                }

                if schedule.limit_at_soc.is_some()
                    && !self
                        .device_model
                        .get_bool(ControllerVariable::SupportsLimitAtSoc)
                        .unwrap_or(false)
                {
                    return ChargingScheduleUnsupportedLimitAtSoc;
                }
            }

            for i in 0..schedule.charging_schedule_period.len() {
                let period = &schedule.charging_schedule_period[i];

                // phaseToUse requires an explicit single-phase period
                if period.number_phases != Some(1) && period.phase_to_use.is_some() {
                    return ChargingSchedulePeriodInvalidPhaseToUse;
                }

                if period.phase_to_use.is_some()
                    && !self
                        .device_model
                        .get_bool(ControllerVariable::AcPhaseSwitchingSupported)
                        .unwrap_or(false)
                {
                    return ChargingSchedulePeriodPhaseToUseAcPhaseSwitchingUnsupported;
                }

                if i == 0 && period.start_period != 0 {
                    return ChargingProfileFirstStartScheduleIsNotZero;
                }

                if let Some(next) = schedule.charging_schedule_period.get(i + 1) {
                    if next.start_period <= period.start_period {
                        return ChargingSchedulePeriodsOutOfOrder;
                    }
                }

                if phase_type == CurrentPhaseType::Dc
                    && (period.number_phases.is_some() || period.phase_to_use.is_some())
                {
                    // phase values are meaningless on a DC connector; reject
                    // rather than silently accept
                    match self.ocpp_version {
                        OcppProtocolVersion::V201 => {
                            return ChargingSchedulePeriodExtraneousPhaseValues;
                        }
                        OcppProtocolVersion::V21 => {
                            let evse_id = evse.map_or(STATION_WIDE_ID, |evse| evse.id());
                            if !self.has_dc_input_phase_control(evse_id) {
                                return ChargingSchedulePeriodNoPhaseForDc;
                            }
                        }
                    }
                }

                if phase_type == CurrentPhaseType::Ac {
                    if period.number_phases.is_some_and(|phases| phases > supply_phases) {
                        return ChargingSchedulePeriodUnsupportedNumberPhases;
                    }

                    let period = &mut schedule.charging_schedule_period[i];
                    if period.number_phases.is_none() {
                        debug!(profile_id, "Conforming absent numberPhases to {}", DEFAULT_AND_MAX_NUMBER_PHASES);
                        period.number_phases = Some(DEFAULT_AND_MAX_NUMBER_PHASES);
                    }
                }

                let period = &schedule.charging_schedule_period[i];
                if is_v21 {
                    let operation_mode =
                        period.operation_mode.unwrap_or(OperationMode::ChargingOnly);

                    if purpose == ChargingProfilePurpose::PriorityCharging
                        && operation_mode != OperationMode::ChargingOnly
                    {
                        return ChargingSchedulePeriodPriorityChargingNotChargingOnly;
                    }

                    if !operation_mode_allowed_for_purpose(operation_mode, purpose) {
                        return ChargingSchedulePeriodUnsupportedOperationMode;
                    }

                    // local frequency curves are defined over power
                    if operation_mode == OperationMode::LocalFrequency
                        && schedule.charging_rate_unit == ChargingRateUnit::A
                    {
                        return ChargingScheduleChargingRateUnitUnsupported;
                    }

                    if period.evse_sleep.unwrap_or(false)
                        && !self
                            .device_model
                            .get_bool(ControllerVariable::SupportsEvseSleep)
                            .unwrap_or(false)
                    {
                        return ChargingScheduleUnsupportedEvseSleep;
                    }

                    if !check_limits_and_setpoints(period) {
                        return ChargingSchedulePeriodUnsupportedLimitSetpoint;
                    }

                    if operation_mode == OperationMode::LocalFrequency {
                        let curve_ok = period
                            .v2x_freq_watt_curve
                            .as_ref()
                            .is_some_and(|curve| curve.len() >= 2)
                            && period.v2x_baseline.is_some();
                        if !curve_ok {
                            return ChargingSchedulePeriodNoFreqWattCurve;
                        }
                    }

                    if !all_setpoint_signs_equal(period) {
                        return ChargingSchedulePeriodSignDifference;
                    }
                }
            }

            // Absolute and Recurring need an anchor; Relative forbids one
            if (kind == ChargingProfileKind::Absolute || kind == ChargingProfileKind::Recurring)
                && schedule.start_schedule.is_none()
            {
                return ChargingProfileMissingRequiredStartSchedule;
            }
            if kind == ChargingProfileKind::Relative && schedule.start_schedule.is_some() {
                return ChargingProfileExtraneousStartSchedule;
            }
        }

        Valid
    }

    /// In 2.1 a configured id range is reserved for external constraints
    /// profiles; independent of that, an id already taken by a stored
    /// external constraints profile can never be reused.
    async fn verify_no_conflicting_external_constraints_id(
        &self,
        profile: &ChargingProfile,
    ) -> DomainResult<ProfileValidationResult> {
        if self.ocpp_version == OcppProtocolVersion::V21 {
            if let Some(max_id) = self
                .device_model
                .get_int(ControllerVariable::MaxExternalConstraintsId)
            {
                if profile.id <= max_id {
                    return Ok(
                        ProfileValidationResult::ChargingProfileIdSmallerThanMaxExternalConstraintsId,
                    );
                }
            }
        }

        if let Some(existing) = self.store.find_by_id(profile.id).await? {
            if existing.profile.charging_profile_purpose
                == ChargingProfilePurpose::ChargingStationExternalConstraints
            {
                return Ok(ProfileValidationResult::ExistingChargingStationExternalConstraints);
            }
        }

        Ok(ProfileValidationResult::Valid)
    }

    /// Two profiles at the same purpose, scope and stack level may not have
    /// overlapping validity windows. TxProfiles are exempt; their conflicts
    /// are resolved per transaction.
    async fn is_overlapping_validity_period(
        &self,
        candidate: &ChargingProfile,
        candidate_evse_id: i32,
    ) -> DomainResult<bool> {
        if candidate.charging_profile_purpose == ChargingProfilePurpose::TxProfile {
            return Ok(false);
        }

        // the candidate was conformed before this check
        let candidate_valid_from = candidate.valid_from.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let candidate_valid_to = candidate.valid_to.unwrap_or(DateTime::<Utc>::MAX_UTC);

        let stored = self.store.find_by_evse(candidate_evse_id).await?;
        let overlapping = stored.iter().any(|stored| {
            let existing = &stored.profile;
            existing.charging_profile_purpose == candidate.charging_profile_purpose
                && existing.stack_level == candidate.stack_level
                && existing.id != candidate.id
                && candidate_valid_from <= existing.valid_to.unwrap_or(DateTime::<Utc>::MAX_UTC)
                && candidate_valid_to >= existing.valid_from.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        });

        Ok(overlapping)
    }

    fn conform_validity_periods(&self, profile: &mut ChargingProfile) {
        if profile.valid_from.is_none() {
            debug!(profile_id = profile.id, "Conforming absent validFrom to the epoch");
            profile.valid_from = Some(DateTime::<Utc>::UNIX_EPOCH);
        }
        if profile.valid_to.is_none() {
            debug!(profile_id = profile.id, "Conforming absent validTo to the max date");
            profile.valid_to = Some(DateTime::<Utc>::MAX_UTC);
        }
    }

    fn current_phase_type(&self, evse: Option<&dyn Evse>) -> CurrentPhaseType {
        if let Some(evse) = evse {
            return evse.current_phase_type();
        }

        match self
            .device_model
            .get_int(ControllerVariable::ChargingStationSupplyPhases)
            .unwrap_or(DEFAULT_AND_MAX_NUMBER_PHASES)
        {
            1 | 3 => CurrentPhaseType::Ac,
            0 => CurrentPhaseType::Dc,
            _ => CurrentPhaseType::Unknown,
        }
    }

    fn has_dc_input_phase_control(&self, evse_id: i32) -> bool {
        if evse_id == STATION_WIDE_ID {
            (1..=self.evse_manager.number_of_evses())
                .all(|id| self.device_model.dc_input_phase_control(id))
        } else {
            self.device_model.dc_input_phase_control(evse_id)
        }
    }

    // --- read path --------------------------------------------------------

    async fn get_composite_schedule_internal(
        &self,
        request: &GetCompositeScheduleRequest,
        simulate_transaction_active: bool,
    ) -> GetCompositeScheduleResponse {
        let supported_rate_units: Vec<ChargingRateUnit> = self
            .device_model
            .get_string(ControllerVariable::ChargingScheduleChargingRateUnit)
            .unwrap_or_else(|| "A,W".to_string())
            .split(',')
            .filter_map(ChargingRateUnit::from_str_opt)
            .collect();

        let charging_rate_unit = match request.charging_rate_unit {
            Some(requested) if supported_rate_units.contains(&requested) => Some(requested),
            Some(_) => None,
            None => supported_rate_units.first().copied(),
        };

        let evse_known = request.evse_id == STATION_WIDE_ID
            || self.evse_manager.does_evse_exist(request.evse_id);

        let (Some(charging_rate_unit), true) = (charging_rate_unit, evse_known) else {
            let reason = if charging_rate_unit.is_some() {
                ProfileValidationResult::EvseDoesNotExist
            } else {
                ProfileValidationResult::ChargingScheduleChargingRateUnitUnsupported
            };
            debug!(
                evse_id = request.evse_id,
                reason = %reason,
                "Rejecting GetCompositeSchedule"
            );
            return GetCompositeScheduleResponse {
                status: GenericStatus::Rejected,
                status_info: Some(StatusInfo::new(reason.reason_code(), reason.to_string())),
                schedule: None,
            };
        };

        let start_time = Utc::now();
        let end_time = start_time + Duration::seconds(i64::from(request.duration));

        match self
            .calculate_composite_schedule(
                &start_time,
                &end_time,
                request.evse_id,
                charging_rate_unit,
                self.is_offline(),
                simulate_transaction_active,
            )
            .await
        {
            Ok(schedule) => GetCompositeScheduleResponse {
                status: GenericStatus::Accepted,
                status_info: None,
                schedule: Some(schedule),
            },
            Err(e) => {
                error!(error = %e, "Could not calculate composite schedule");
                GetCompositeScheduleResponse {
                    status: GenericStatus::Rejected,
                    status_info: Some(StatusInfo {
                        reason_code: "InternalError".to_string(),
                        additional_info: None,
                    }),
                    schedule: None,
                }
            }
        }
    }

    /// Merge all applicable profiles into the binding schedule for the
    /// window. For the station-wide id the per-EVSE limits are summed and
    /// capped; for a concrete EVSE the lowest covering limit wins.
    pub async fn calculate_composite_schedule(
        &self,
        start_time: &DateTime<Utc>,
        end_time: &DateTime<Utc>,
        evse_id: i32,
        charging_rate_unit: ChargingRateUnit,
        is_offline: bool,
        simulate_transaction_active: bool,
    ) -> DomainResult<CompositeSchedule> {
        let config = CompositeScheduleConfig::new(&*self.device_model, is_offline);

        let session_start = if evse_id != STATION_WIDE_ID {
            self.evse_manager
                .get_evse(evse_id)
                .and_then(|evse| evse.transaction())
                .map(|transaction| transaction.start_time)
        } else {
            None
        };

        let station_wide_profiles = self
            .get_valid_profiles_for_evse(STATION_WIDE_ID, &config.purposes_to_ignore)
            .await?;

        let mut combined_profiles = if evse_id == STATION_WIDE_ID {
            // resolve each EVSE separately, then sum: the station consumes
            // what its EVSEs consume together
            let mut evse_schedules = Vec::new();
            for evse in 1..=self.evse_manager.number_of_evses() {
                let evse_session_start = self
                    .evse_manager
                    .get_evse(evse)
                    .and_then(|evse| evse.transaction())
                    .map(|transaction| transaction.start_time);

                let evse_profiles = self
                    .get_valid_profiles_for_evse(evse, &config.purposes_to_ignore)
                    .await?;
                let intermediates = generate_evse_intermediates(
                    evse_profiles,
                    &station_wide_profiles,
                    start_time,
                    end_time,
                    evse_session_start,
                    simulate_transaction_active,
                );

                evse_schedules.push(merge_profiles_by_lowest_limit(&intermediates));
            }

            vec![merge_profiles_by_summing_limits(
                &evse_schedules,
                config.current_limit,
                config.power_limit,
            )]
        } else {
            let evse_profiles = self
                .get_valid_profiles_for_evse(evse_id, &config.purposes_to_ignore)
                .await?;
            generate_evse_intermediates(
                evse_profiles,
                &station_wide_profiles,
                start_time,
                end_time,
                session_start,
                simulate_transaction_active,
            )
        };

        // the ChargingStationMaxProfile is station wide and always applies
        let charge_point_max_periods = calculate_all_profiles(
            start_time,
            end_time,
            session_start.as_ref(),
            &station_wide_profiles,
            ChargingProfilePurpose::ChargingStationMaxProfile,
        );
        combined_profiles.push(generate_profile_from_periods(
            &charge_point_max_periods,
            start_time,
            end_time,
        ));

        let merged = merge_profiles_by_lowest_limit(&combined_profiles);

        let schedule_start = floor_seconds(start_time);
        let default_limit = match charging_rate_unit {
            ChargingRateUnit::A => config.current_limit,
            ChargingRateUnit::W => config.power_limit,
        };

        Ok(CompositeSchedule {
            evse_id,
            schedule_start,
            duration: elapsed_seconds(&floor_seconds(end_time), &schedule_start),
            charging_rate_unit,
            charging_schedule_period: convert_intermediate_into_schedule(
                &merged,
                charging_rate_unit,
                default_limit,
                config.default_number_phases,
                config.supply_voltage,
            ),
        })
    }

    /// Stored profiles of one EVSE that still pass validation and are not
    /// on the ignore list. External constraints profiles are installed by a
    /// trusted path outside this block and are included as-is.
    async fn get_valid_profiles_for_evse(
        &self,
        evse_id: i32,
        purposes_to_ignore: &[ChargingProfilePurpose],
    ) -> DomainResult<Vec<ChargingProfile>> {
        let mut valid_profiles = Vec::new();

        for stored in self.store.find_by_evse(evse_id).await? {
            let purpose = stored.profile.charging_profile_purpose;
            if purposes_to_ignore.contains(&purpose) {
                continue;
            }
            if purpose == ChargingProfilePurpose::ChargingStationExternalConstraints {
                valid_profiles.push(stored.profile);
                continue;
            }

            let mut profile = stored.profile;
            let result = self
                .conform_and_validate_profile(
                    &mut profile,
                    evse_id,
                    AddChargingProfileSource::SetChargingProfileRequest,
                )
                .await?;
            if result.is_valid() {
                valid_profiles.push(profile);
            }
        }

        Ok(valid_profiles)
    }
}
