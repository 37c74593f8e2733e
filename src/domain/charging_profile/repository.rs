//! ChargingProfile repository interface
//!
//! Narrow persistence abstraction for charging profiles. The validator and
//! the composite schedule engine only ever talk to this trait, so the
//! algorithmic core carries no dependency on a concrete storage engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::model::{ChargingLimitSource, ChargingProfile, ChargingProfilePurpose};
use crate::domain::DomainResult;

/// A profile as persisted: the profile itself plus the EVSE it was installed
/// on and the source that installed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredChargingProfile {
    pub evse_id: i32,
    pub source: ChargingLimitSource,
    pub profile: ChargingProfile,
}

/// Criteria of a ClearChargingProfile request. `None` fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearChargingProfileCriterion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_profile_purpose: Option<ChargingProfilePurpose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_level: Option<i32>,
}

/// Criteria of a GetChargingProfiles request. When `charging_profile_id` is
/// given, profiles are matched by id and the other fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingProfileCriterion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_profile_purpose: Option<ChargingProfilePurpose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_profile_id: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_limit_source: Option<Vec<ChargingLimitSource>>,
}

#[async_trait]
pub trait ChargingProfileRepository: Send + Sync {
    /// Insert the profile, replacing any stored profile with the same id.
    async fn insert_or_update(&self, stored: StoredChargingProfile) -> DomainResult<()>;

    /// Find a stored profile by its profile id.
    async fn find_by_id(&self, profile_id: i32) -> DomainResult<Option<StoredChargingProfile>>;

    /// All profiles installed on the given EVSE (0 = station-wide pool).
    async fn find_by_evse(&self, evse_id: i32) -> DomainResult<Vec<StoredChargingProfile>>;

    /// All stored profiles with the given purpose, across all EVSEs.
    async fn find_by_purpose(
        &self,
        purpose: ChargingProfilePurpose,
    ) -> DomainResult<Vec<StoredChargingProfile>>;

    /// All stored profiles bound to the given transaction.
    async fn find_by_transaction(
        &self,
        transaction_id: &str,
    ) -> DomainResult<Vec<StoredChargingProfile>>;

    /// Profiles matching a GetChargingProfiles request.
    async fn find_matching(
        &self,
        evse_id: Option<i32>,
        criterion: &ChargingProfileCriterion,
    ) -> DomainResult<Vec<StoredChargingProfile>>;

    /// Delete profiles by id and/or criteria, returning how many were
    /// removed. ChargingStationExternalConstraints profiles are never
    /// removed through this method.
    async fn clear_matching(
        &self,
        profile_id: Option<i32>,
        criterion: Option<&ClearChargingProfileCriterion>,
    ) -> DomainResult<u64>;

    /// Delete all TxProfiles bound to the given transaction, returning how
    /// many were removed.
    async fn delete_by_transaction(&self, transaction_id: &str) -> DomainResult<u64>;
}
