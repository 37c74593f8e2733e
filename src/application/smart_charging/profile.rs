//! Interval algebra for charging profiles
//!
//! Expands charging profiles into concrete, window-clipped time intervals
//! and merges interval lists into a single effective limit per instant.
//! Everything here is pure: the composite schedule engine feeds it profiles
//! already fetched and validated.
//!
//! Two representations are used:
//!
//! * [`PeriodEntry`] — one schedule period made concrete: an absolute
//!   `[start, end)` interval with the limit that applies in it.
//! * [`IntermediatePeriod`] — one slice of a merged profile, addressed by an
//!   offset from the window start. A list of these tiles the whole request
//!   window; the last entry extends to the window end.

use chrono::{DateTime, Duration, Timelike, Utc};
use tracing::warn;

use crate::domain::{
    ChargingProfile, ChargingProfileKind, ChargingProfilePurpose, ChargingRateUnit,
    ChargingSchedulePeriod, RecurrencyKind,
};

/// Sentinel for "this period does not constrain that unit".
pub const NO_LIMIT_SPECIFIED: f32 = -1.0;

const SECONDS_PER_DAY: i64 = 86_400;
const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

/// Truncate a timestamp to whole seconds. Schedules are second-granular.
pub fn floor_seconds(dt: &DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(*dt)
}

/// Whole seconds from `from` to `to`.
pub fn elapsed_seconds(to: &DateTime<Utc>, from: &DateTime<Utc>) -> i32 {
    (*to - *from).num_seconds() as i32
}

/// One schedule period of one profile, resolved to absolute time.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodEntry {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: f32,
    pub number_phases: Option<i32>,
    pub phase_to_use: Option<i32>,
    pub stack_level: i32,
    pub charging_rate_unit: ChargingRateUnit,
    pub min_charging_rate: Option<f32>,
}

impl PeriodEntry {
    /// Clip against the profile validity window and drop expired or empty
    /// entries. Returns whether the entry is still worth keeping.
    fn validate(&mut self, profile: &ChargingProfile, now: &DateTime<Utc>) -> bool {
        let mut valid = true;

        if let Some(valid_from) = profile.valid_from {
            let valid_from = floor_seconds(&valid_from);
            if valid_from > self.start {
                if valid_from >= self.end {
                    // the whole entry lies before the profile is valid
                    valid = false;
                } else {
                    self.start = valid_from;
                }
            }
        }

        valid && self.end > self.start && self.end > *now
    }
}

/// One slice of a merged profile. `start_period` is the offset in seconds
/// from the window start; the slice lasts until the next entry (or the
/// window end). A negative limit means "unconstrained" in that unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntermediatePeriod {
    pub start_period: i32,
    pub current_limit: f32,
    pub power_limit: f32,
    pub number_phases: Option<i32>,
    pub phase_to_use: Option<i32>,
}

impl IntermediatePeriod {
    pub fn no_limit(start_period: i32) -> Self {
        Self {
            start_period,
            current_limit: NO_LIMIT_SPECIFIED,
            power_limit: NO_LIMIT_SPECIFIED,
            number_phases: None,
            phase_to_use: None,
        }
    }
}

/// Ordered, gap-aware list of [`IntermediatePeriod`]s covering a window.
pub type IntermediateProfile = Vec<IntermediatePeriod>;

/// The absolute start times of a profile's schedule within the window.
///
/// Absolute schedules start at their `startSchedule`, Relative schedules at
/// the session start, Recurring schedules repeat from `startSchedule` at the
/// granularity given by the profile's `recurrencyKind`. A Recurring profile
/// without a recurrency kind or start produces no occurrences.
fn calculate_start(
    now: &DateTime<Utc>,
    end: &DateTime<Utc>,
    session_start: Option<&DateTime<Utc>>,
    profile: &ChargingProfile,
) -> Vec<DateTime<Utc>> {
    let mut start_times = Vec::new();
    // fallback when a better anchor can't be found
    let mut start = floor_seconds(now);

    let Some(schedule) = profile.charging_schedule.first() else {
        return start_times;
    };

    match profile.charging_profile_kind {
        ChargingProfileKind::Absolute => {
            if let Some(start_schedule) = schedule.start_schedule {
                start = start_schedule;
            } else {
                warn!(profile_id = profile.id, "Absolute charging profile without startSchedule");
                if let Some(valid_from) = profile.valid_from {
                    start = valid_from;
                }
            }
            start_times.push(floor_seconds(&start));
        }
        ChargingProfileKind::Recurring => {
            if let (Some(recurrency_kind), Some(start_schedule)) =
                (profile.recurrency_kind, schedule.start_schedule)
            {
                let start_schedule = floor_seconds(&start_schedule);
                let end = floor_seconds(end);
                let period = match recurrency_kind {
                    RecurrencyKind::Daily => SECONDS_PER_DAY,
                    RecurrencyKind::Weekly => SECONDS_PER_WEEK,
                };

                // The most recent occurrence lies at most one full period in
                // the past; later occurrences may still start inside the
                // window.
                let mut seconds_to_go_back = (start - start_schedule).num_seconds() % period;
                if seconds_to_go_back < 0 {
                    seconds_to_go_back += period;
                }
                start -= Duration::seconds(seconds_to_go_back);

                while start <= end {
                    start_times.push(start);
                    start += Duration::seconds(period);
                }
            }
        }
        ChargingProfileKind::Relative => {
            // without a session start the session is assumed to start now
            if let Some(session_start) = session_start {
                start = floor_seconds(session_start);
            }
            start_times.push(start);
        }
        ChargingProfileKind::Dynamic => {
            // a dynamic schedule always describes the situation from now on
            start_times.push(start);
        }
    }

    start_times
}

/// Resolve one schedule period of a profile into concrete entries, one per
/// schedule occurrence that intersects the window.
fn calculate_profile_entry(
    now: &DateTime<Utc>,
    end: &DateTime<Utc>,
    session_start: Option<&DateTime<Utc>>,
    profile: &ChargingProfile,
    period_index: usize,
) -> Vec<PeriodEntry> {
    let mut entries = Vec::new();

    let Some(schedule) = profile.charging_schedule.first() else {
        return entries;
    };
    let periods = &schedule.charging_schedule_period;

    let Some(this_period) = periods.get(period_index) else {
        warn!(
            profile_id = profile.id,
            period_index, "Schedule period index out of range"
        );
        return entries;
    };

    if period_index == 0 && this_period.start_period != 0 {
        warn!(profile_id = profile.id, "First schedule period does not start at 0");
        return entries;
    }
    if period_index > 0 && periods[period_index - 1].start_period >= this_period.start_period {
        warn!(
            profile_id = profile.id,
            period_index, "Schedule periods out of order"
        );
        return entries;
    }

    let has_next_period = period_index + 1 < periods.len();
    let schedule_starts = calculate_start(now, end, session_start, profile);
    let now = floor_seconds(now);

    for (i, entry_start) in schedule_starts.iter().enumerate() {
        // The end of this entry (seconds from the occurrence start) is the
        // soonest of: the next period, the schedule duration, the next
        // recurrence, and the profile validTo. Can end up negative, in
        // which case validate() drops the entry.
        let mut duration = i64::from(i32::MAX); // forever

        if has_next_period {
            duration = i64::from(periods[period_index + 1].start_period);
        }

        if let Some(schedule_duration) = schedule.duration {
            duration = duration.min(i64::from(schedule_duration));
        }

        if let Some(next_occurrence) = schedule_starts.get(i + 1) {
            duration = duration.min((*next_occurrence - *entry_start).num_seconds());
        }

        if let Some(valid_to) = profile.valid_to {
            duration = duration.min((floor_seconds(&valid_to) - *entry_start).num_seconds());
        }

        let start = floor_seconds(entry_start);
        let mut entry = PeriodEntry {
            start: start + Duration::seconds(i64::from(this_period.start_period)),
            end: start + Duration::seconds(duration),
            limit: this_period.limit.unwrap_or(NO_LIMIT_SPECIFIED),
            number_phases: this_period.number_phases,
            phase_to_use: this_period.phase_to_use,
            stack_level: profile.stack_level,
            charging_rate_unit: schedule.charging_rate_unit,
            min_charging_rate: schedule.min_charging_rate,
        };

        if entry.validate(profile, &now) {
            entries.push(entry);
        }
    }

    entries
}

fn calculate_profile_unsorted(
    now: &DateTime<Utc>,
    end: &DateTime<Utc>,
    session_start: Option<&DateTime<Utc>>,
    profile: &ChargingProfile,
) -> Vec<PeriodEntry> {
    let nr_of_periods = profile
        .charging_schedule
        .first()
        .map_or(0, |s| s.charging_schedule_period.len());

    let mut entries = Vec::new();
    for i in 0..nr_of_periods {
        entries.extend(
            calculate_profile_entry(now, end, session_start, profile, i)
                .into_iter()
                .filter(|entry| entry.start <= *end),
        );
    }
    entries
}

/// All concrete period entries of one profile inside the window, earliest
/// first.
pub fn calculate_profile(
    now: &DateTime<Utc>,
    end: &DateTime<Utc>,
    session_start: Option<&DateTime<Utc>>,
    profile: &ChargingProfile,
) -> Vec<PeriodEntry> {
    let mut entries = calculate_profile_unsorted(now, end, session_start, profile);
    entries.sort_by_key(|entry| entry.start);
    entries
}

/// All concrete period entries of the profiles with the given purpose,
/// earliest first.
pub fn calculate_all_profiles(
    now: &DateTime<Utc>,
    end: &DateTime<Utc>,
    session_start: Option<&DateTime<Utc>>,
    profiles: &[ChargingProfile],
    purpose: ChargingProfilePurpose,
) -> Vec<PeriodEntry> {
    let mut entries = Vec::new();
    for profile in profiles {
        if profile.charging_profile_purpose == purpose {
            entries.extend(calculate_profile_unsorted(now, end, session_start, profile));
        }
    }
    entries.sort_by_key(|entry| entry.start);
    entries
}

/// Collapse the period entries of one purpose group into a single gap-aware
/// profile over `[now, end)`.
///
/// Where entries overlap, the one with the highest stack level wins outright
/// for that instant. Instants no entry covers become explicit "no limit"
/// slices.
pub fn generate_profile_from_periods(
    periods: &[PeriodEntry],
    now: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> IntermediateProfile {
    let now = floor_seconds(now);
    let end = floor_seconds(end);

    if periods.is_empty() {
        return vec![IntermediatePeriod::no_limit(0)];
    }

    // highest stack level first, so the scan below prefers it
    let mut periods: Vec<&PeriodEntry> = periods.iter().collect();
    periods.sort_by(|a, b| b.stack_level.cmp(&a.stack_level));

    let mut combined = IntermediateProfile::new();
    let mut current = now;

    while current < end {
        // find the entry to use at `current`
        let mut earliest = end;
        let mut next_earliest = end;
        let mut chosen: Option<&PeriodEntry> = None;

        for entry in &periods {
            if entry.start <= earliest && entry.end > current {
                next_earliest = earliest;
                earliest = entry.start;
                chosen = Some(entry);
                if earliest <= current {
                    break;
                }
            }
        }

        match chosen {
            Some(entry) if earliest <= current => {
                let (current_limit, power_limit) = match entry.charging_rate_unit {
                    ChargingRateUnit::A => (entry.limit, NO_LIMIT_SPECIFIED),
                    ChargingRateUnit::W => (NO_LIMIT_SPECIFIED, entry.limit),
                };

                combined.push(IntermediatePeriod {
                    start_period: elapsed_seconds(&current, &now),
                    current_limit,
                    power_limit,
                    number_phases: entry.number_phases,
                    phase_to_use: entry.phase_to_use,
                });

                current = entry.end.min(next_earliest);
            }
            _ => {
                // gap until the earliest entry (or the window end)
                combined.push(IntermediatePeriod::no_limit(elapsed_seconds(&current, &now)));
                current = earliest;
            }
        }
    }

    combined
}

/// Walk any number of intermediate profiles in lockstep and combine the
/// active slice of each into one output slice per distinct boundary.
///
/// Every input profile's last slice extends to the window end, so each
/// profile always has an active slice.
fn combine_list_of_profiles<F>(profiles: &[&IntermediateProfile], combinator: F) -> IntermediateProfile
where
    F: Fn(&[&IntermediatePeriod]) -> IntermediatePeriod,
{
    let mut cursors: Vec<(&IntermediateProfile, usize)> = profiles
        .iter()
        .filter(|profile| !profile.is_empty())
        .map(|profile| (*profile, 0))
        .collect();

    if cursors.is_empty() {
        return vec![IntermediatePeriod::no_limit(0)];
    }

    let mut combined = IntermediateProfile::new();
    let mut current_period = 0;

    loop {
        let active: Vec<&IntermediatePeriod> =
            cursors.iter().map(|(profile, i)| &profile[*i]).collect();

        let mut period = combinator(&active);
        period.start_period = current_period;

        let changed = combined.last().map_or(true, |last| {
            period.current_limit != last.current_limit
                || period.power_limit != last.power_limit
                || period.number_phases != last.number_phases
        });
        if changed {
            combined.push(period);
        }

        // advance to the next earliest slice boundary across all profiles
        let mut next_lowest_period = i32::MAX;
        for (profile, i) in &cursors {
            if let Some(next) = profile.get(*i + 1) {
                if next.start_period > current_period && next.start_period < next_lowest_period {
                    next_lowest_period = next.start_period;
                }
            }
        }

        if next_lowest_period == i32::MAX {
            break;
        }

        for (profile, i) in cursors.iter_mut() {
            if profile.get(*i + 1).is_some_and(|next| next.start_period == next_lowest_period) {
                *i += 1;
            }
        }
        current_period = next_lowest_period;
    }

    if combined.is_empty() {
        combined.push(IntermediatePeriod::no_limit(0));
    }

    combined
}

/// Merge the TxProfile list with the TxDefaultProfile list: per instant the
/// TxProfile limit wins where it exists, falling back to the TxDefault one.
pub fn merge_tx_profile_with_tx_default_profile(
    tx_profile: &IntermediateProfile,
    tx_default_profile: &IntermediateProfile,
) -> IntermediateProfile {
    let combinator = |periods: &[&IntermediatePeriod]| {
        let mut period = IntermediatePeriod::no_limit(0);
        for slice in periods {
            if slice.current_limit != NO_LIMIT_SPECIFIED || slice.power_limit != NO_LIMIT_SPECIFIED
            {
                period.current_limit = slice.current_limit;
                period.power_limit = slice.power_limit;
                period.number_phases = slice.number_phases;
                break;
            }
        }
        period
    };

    // order matters: the tx profile is consulted first
    combine_list_of_profiles(&[tx_profile, tx_default_profile], combinator)
}

/// Merge interval lists with "lowest limit wins": the effective limit at an
/// instant is the minimum of all covering lists' limits; a list without a
/// limit there does not constrain it.
pub fn merge_profiles_by_lowest_limit(profiles: &[IntermediateProfile]) -> IntermediateProfile {
    let combinator = |periods: &[&IntermediatePeriod]| {
        let mut period = IntermediatePeriod::no_limit(0);
        period.current_limit = f32::MAX;
        period.power_limit = f32::MAX;

        for slice in periods {
            if slice.current_limit >= 0.0 && slice.current_limit < period.current_limit {
                period.current_limit = slice.current_limit;
            }
            if slice.power_limit >= 0.0 && slice.power_limit < period.power_limit {
                period.power_limit = slice.power_limit;
            }

            // carry the lowest number of phases
            match (period.number_phases, slice.number_phases) {
                (None, other) => period.number_phases = other,
                (Some(current), Some(other)) if other < current => {
                    period.number_phases = Some(other);
                }
                _ => {}
            }
        }

        if period.current_limit == f32::MAX {
            period.current_limit = NO_LIMIT_SPECIFIED;
        }
        if period.power_limit == f32::MAX {
            period.power_limit = NO_LIMIT_SPECIFIED;
        }

        period
    };

    let refs: Vec<&IntermediateProfile> = profiles.iter().collect();
    combine_list_of_profiles(&refs, combinator)
}

/// Merge per-EVSE interval lists by summing their limits per instant: the
/// station as a whole can consume the sum of what its EVSEs consume.
///
/// An EVSE without a limit at an instant contributes the configured default,
/// and the summed result is capped at that same configured ceiling.
pub fn merge_profiles_by_summing_limits(
    profiles: &[IntermediateProfile],
    current_limit: f32,
    power_limit: f32,
) -> IntermediateProfile {
    let combinator = |periods: &[&IntermediatePeriod]| {
        let mut period = IntermediatePeriod::no_limit(0);
        period.current_limit = 0.0;
        period.power_limit = 0.0;

        for slice in periods {
            period.current_limit += if slice.current_limit >= 0.0 {
                slice.current_limit
            } else {
                current_limit
            };
            period.power_limit += if slice.power_limit >= 0.0 {
                slice.power_limit
            } else {
                power_limit
            };

            // carry the highest number of phases
            match (period.number_phases, slice.number_phases) {
                (None, other) => period.number_phases = other,
                (Some(current), Some(other)) if other > current => {
                    period.number_phases = Some(other);
                }
                _ => {}
            }
        }

        period.current_limit = period.current_limit.min(current_limit);
        period.power_limit = period.power_limit.min(power_limit);
        period
    };

    let refs: Vec<&IntermediateProfile> = profiles.iter().collect();
    combine_list_of_profiles(&refs, combinator)
}

/// Turn a merged intermediate profile into concrete schedule periods in the
/// requested unit. Slices without any limit get the configured default;
/// slices limited in the other unit are converted via phases x voltage, and
/// when both units constrain a slice the stricter one wins.
pub fn convert_intermediate_into_schedule(
    profile: &IntermediateProfile,
    charging_rate_unit: ChargingRateUnit,
    default_limit: f32,
    default_number_phases: i32,
    supply_voltage: f32,
) -> Vec<ChargingSchedulePeriod> {
    let mut output: Vec<ChargingSchedulePeriod> = Vec::new();

    for period in profile {
        let mut period_out = ChargingSchedulePeriod {
            start_period: period.start_period,
            number_phases: period.number_phases,
            phase_to_use: period.phase_to_use,
            ..Default::default()
        };

        if period.current_limit == NO_LIMIT_SPECIFIED && period.power_limit == NO_LIMIT_SPECIFIED {
            period_out.limit = Some(default_limit);
        } else {
            let transform_value =
                supply_voltage * period.number_phases.unwrap_or(default_number_phases) as f32;
            let mut limit = f32::MAX;
            match charging_rate_unit {
                ChargingRateUnit::A => {
                    if period.current_limit != NO_LIMIT_SPECIFIED {
                        limit = period.current_limit;
                    }
                    if period.power_limit != NO_LIMIT_SPECIFIED {
                        limit = limit.min(period.power_limit / transform_value);
                    }
                }
                ChargingRateUnit::W => {
                    if period.power_limit != NO_LIMIT_SPECIFIED {
                        limit = period.power_limit;
                    }
                    if period.current_limit != NO_LIMIT_SPECIFIED {
                        limit = limit.min(period.current_limit * transform_value);
                    }
                }
            }
            period_out.limit = Some(limit);
        }

        let changed = output.last().map_or(true, |last| {
            period_out.limit != last.limit || period_out.number_phases != last.number_phases
        });
        if changed {
            output.push(period_out);
        }
    }

    output
}
