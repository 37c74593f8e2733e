//! In-memory profile store implementation

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::{
    ChargingProfileCriterion, ChargingProfilePurpose, ChargingProfileRepository,
    ClearChargingProfileCriterion, DomainResult, StoredChargingProfile,
};

/// In-memory profile store for development and testing. Keyed by profile id,
/// so re-storing an id replaces the previous content.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: DashMap<i32, StoredChargingProfile>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn matches_criterion(stored: &StoredChargingProfile, criterion: &ChargingProfileCriterion) -> bool {
    if let Some(ids) = &criterion.charging_profile_id {
        // with explicit ids the remaining criteria do not apply
        return ids.contains(&stored.profile.id);
    }

    if let Some(purpose) = criterion.charging_profile_purpose {
        if stored.profile.charging_profile_purpose != purpose {
            return false;
        }
    }
    if let Some(stack_level) = criterion.stack_level {
        if stored.profile.stack_level != stack_level {
            return false;
        }
    }
    if let Some(sources) = &criterion.charging_limit_source {
        if !sources.contains(&stored.source) {
            return false;
        }
    }
    true
}

#[async_trait]
impl ChargingProfileRepository for InMemoryProfileStore {
    async fn insert_or_update(&self, stored: StoredChargingProfile) -> DomainResult<()> {
        self.profiles.insert(stored.profile.id, stored);
        Ok(())
    }

    async fn find_by_id(&self, profile_id: i32) -> DomainResult<Option<StoredChargingProfile>> {
        Ok(self.profiles.get(&profile_id).map(|entry| entry.clone()))
    }

    async fn find_by_evse(&self, evse_id: i32) -> DomainResult<Vec<StoredChargingProfile>> {
        Ok(self
            .profiles
            .iter()
            .filter(|entry| entry.evse_id == evse_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_by_purpose(
        &self,
        purpose: ChargingProfilePurpose,
    ) -> DomainResult<Vec<StoredChargingProfile>> {
        Ok(self
            .profiles
            .iter()
            .filter(|entry| entry.profile.charging_profile_purpose == purpose)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_by_transaction(
        &self,
        transaction_id: &str,
    ) -> DomainResult<Vec<StoredChargingProfile>> {
        Ok(self
            .profiles
            .iter()
            .filter(|entry| entry.profile.transaction_id.as_deref() == Some(transaction_id))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_matching(
        &self,
        evse_id: Option<i32>,
        criterion: &ChargingProfileCriterion,
    ) -> DomainResult<Vec<StoredChargingProfile>> {
        Ok(self
            .profiles
            .iter()
            .filter(|entry| evse_id.is_none() || evse_id == Some(entry.evse_id))
            .filter(|entry| matches_criterion(entry.value(), criterion))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn clear_matching(
        &self,
        profile_id: Option<i32>,
        criterion: Option<&ClearChargingProfileCriterion>,
    ) -> DomainResult<u64> {
        let mut to_remove = Vec::new();

        for entry in self.profiles.iter() {
            let stored = entry.value();
            // external constraints profiles are not removable via clearing
            if stored.profile.charging_profile_purpose
                == ChargingProfilePurpose::ChargingStationExternalConstraints
            {
                continue;
            }
            if let Some(profile_id) = profile_id {
                if stored.profile.id != profile_id {
                    continue;
                }
            }
            if let Some(criterion) = criterion {
                if let Some(evse_id) = criterion.evse_id {
                    if stored.evse_id != evse_id {
                        continue;
                    }
                }
                if let Some(purpose) = criterion.charging_profile_purpose {
                    if stored.profile.charging_profile_purpose != purpose {
                        continue;
                    }
                }
                if let Some(stack_level) = criterion.stack_level {
                    if stored.profile.stack_level != stack_level {
                        continue;
                    }
                }
            }
            to_remove.push(stored.profile.id);
        }

        let mut removed = 0;
        for id in to_remove {
            if self.profiles.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_by_transaction(&self, transaction_id: &str) -> DomainResult<u64> {
        let to_remove: Vec<i32> = self
            .profiles
            .iter()
            .filter(|entry| {
                entry.profile.charging_profile_purpose == ChargingProfilePurpose::TxProfile
                    && entry.profile.transaction_id.as_deref() == Some(transaction_id)
            })
            .map(|entry| entry.profile.id)
            .collect();

        let mut removed = 0;
        for id in to_remove {
            if self.profiles.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ChargingLimitSource, ChargingProfile, ChargingProfileKind, ChargingRateUnit,
        ChargingSchedule, ChargingSchedulePeriod,
    };

    fn stored(id: i32, evse_id: i32, purpose: ChargingProfilePurpose) -> StoredChargingProfile {
        StoredChargingProfile {
            evse_id,
            source: ChargingLimitSource::CSO,
            profile: ChargingProfile {
                id,
                stack_level: 0,
                charging_profile_purpose: purpose,
                charging_profile_kind: ChargingProfileKind::Relative,
                recurrency_kind: None,
                valid_from: None,
                valid_to: None,
                transaction_id: None,
                charging_schedule: vec![ChargingSchedule {
                    id: 1,
                    start_schedule: None,
                    duration: None,
                    charging_rate_unit: ChargingRateUnit::A,
                    charging_schedule_period: vec![ChargingSchedulePeriod {
                        start_period: 0,
                        limit: Some(16.0),
                        ..Default::default()
                    }],
                    min_charging_rate: None,
                    randomized_delay: None,
                    use_local_time: None,
                    limit_at_soc: None,
                    sales_tariff: None,
                }],
                dyn_update_interval: None,
                dyn_update_time: None,
            },
        }
    }

    #[tokio::test]
    async fn insert_with_same_id_replaces() {
        let store = InMemoryProfileStore::new();
        store
            .insert_or_update(stored(1, 1, ChargingProfilePurpose::TxDefaultProfile))
            .await
            .unwrap();

        let mut updated = stored(1, 2, ChargingProfilePurpose::TxDefaultProfile);
        updated.profile.stack_level = 5;
        store.insert_or_update(updated).await.unwrap();

        assert_eq!(store.len(), 1);
        let found = store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(found.evse_id, 2);
        assert_eq!(found.profile.stack_level, 5);
    }

    #[tokio::test]
    async fn clear_matching_spares_external_constraints() {
        let store = InMemoryProfileStore::new();
        store
            .insert_or_update(stored(1, 1, ChargingProfilePurpose::TxDefaultProfile))
            .await
            .unwrap();
        store
            .insert_or_update(stored(
                2,
                1,
                ChargingProfilePurpose::ChargingStationExternalConstraints,
            ))
            .await
            .unwrap();

        // no criteria: everything removable goes
        let removed = store.clear_matching(None, None).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_by_id(2).await.unwrap().is_some());

        // not even when addressed by id
        let removed = store.clear_matching(Some(2), None).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn find_matching_by_ids_ignores_other_criteria() {
        let store = InMemoryProfileStore::new();
        store
            .insert_or_update(stored(1, 1, ChargingProfilePurpose::TxDefaultProfile))
            .await
            .unwrap();
        store
            .insert_or_update(stored(2, 2, ChargingProfilePurpose::ChargingStationMaxProfile))
            .await
            .unwrap();

        let criterion = ChargingProfileCriterion {
            charging_profile_id: Some(vec![1, 2]),
            charging_profile_purpose: Some(ChargingProfilePurpose::TxProfile),
            ..Default::default()
        };
        let found = store.find_matching(None, &criterion).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn delete_by_transaction_only_removes_tx_profiles() {
        let store = InMemoryProfileStore::new();
        let mut tx_profile = stored(1, 1, ChargingProfilePurpose::TxProfile);
        tx_profile.profile.transaction_id = Some("tx-1".to_string());
        let mut tx_default = stored(2, 1, ChargingProfilePurpose::TxDefaultProfile);
        tx_default.profile.transaction_id = Some("tx-1".to_string());
        store.insert_or_update(tx_profile).await.unwrap();
        store.insert_or_update(tx_default).await.unwrap();

        let removed = store.delete_by_transaction("tx-1").await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_by_id(1).await.unwrap().is_none());
        assert!(store.find_by_id(2).await.unwrap().is_some());
    }
}
