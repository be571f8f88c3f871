use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RetentionError, RetentionResult};
use crate::tier::{SlotId, SlotStrategy, TierSpec};

/// An existing snapshot slot and when it was last written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMember {
    pub slot: SlotId,
    pub modified: DateTime<Utc>,
}

impl SlotMember {
    pub fn new(slot: impl Into<SlotId>, modified: DateTime<Utc>) -> Self {
        Self {
            slot: slot.into(),
            modified,
        }
    }
}

/// Where a new snapshot goes, and what has to make room for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub tier: String,
    /// Slot receiving the snapshot.
    pub slot: SlotId,
    /// `true` when `slot` already holds a snapshot that will be replaced.
    pub overwrite: bool,
    /// Slots to delete once the snapshot is written, oldest first.
    pub evict: Vec<SlotId>,
}

/// The set of configured tiers and the decisions made over them.
///
/// All methods are pure: callers supply the current members of a tier and
/// apply the returned decision themselves. Members that do not belong to the
/// named tier are ignored, so a caller may pass a whole backup directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    tiers: Vec<TierSpec>,
}

impl RetentionPolicy {
    /// Build a policy, validating every tier and rejecting duplicate names.
    pub fn new(tiers: Vec<TierSpec>) -> RetentionResult<Self> {
        let mut seen = HashSet::new();
        for tier in &tiers {
            tier.validate()?;
            if !seen.insert(tier.name.as_str()) {
                return Err(RetentionError::DuplicateTier(tier.name.clone()));
            }
        }
        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[TierSpec] {
        &self.tiers
    }

    pub fn tier(&self, name: &str) -> RetentionResult<&TierSpec> {
        self.tiers
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| RetentionError::UnknownTier(name.to_string()))
    }

    /// The tier a slot belongs to, if any.
    pub fn tier_of(&self, slot: &str) -> Option<&TierSpec> {
        self.tiers.iter().find(|t| t.owns(slot))
    }

    /// Decide where a snapshot taken at `now` is stored in `tier`.
    pub fn place_snapshot(
        &self,
        tier: &str,
        members: &[SlotMember],
        now: DateTime<Utc>,
    ) -> RetentionResult<Placement> {
        let spec = self.tier(tier)?;
        let members = owned(spec, members);
        let exists = |slot: &SlotId| members.iter().any(|m| &m.slot == slot);

        let slot = match spec.strategy {
            SlotStrategy::Single => SlotId::new(spec.name.clone()),
            SlotStrategy::RoundRobin => {
                if members.len() < spec.cap {
                    (1..=spec.cap)
                        .map(|n| spec.numbered_slot(n))
                        .find(|slot| !exists(slot))
                        .unwrap_or_else(|| oldest_first(&members)[0].slot.clone())
                } else {
                    oldest_first(&members)[0].slot.clone()
                }
            }
            SlotStrategy::Calendar { period } => spec.bucket_slot(period, now),
        };
        let overwrite = exists(&slot);

        // Everything except the placed slot competes for the remaining room.
        let others: Vec<&SlotMember> = members.iter().copied().filter(|m| m.slot != slot).collect();
        let keep = spec.cap - 1;
        let evict = if others.len() > keep {
            oldest_first(&others)[..others.len() - keep]
                .iter()
                .map(|m| m.slot.clone())
                .collect()
        } else {
            Vec::new()
        };

        debug!(tier, slot = %slot, overwrite, evicted = evict.len(), "snapshot placement");
        Ok(Placement {
            tier: spec.name.clone(),
            slot,
            overwrite,
            evict,
        })
    }

    /// The slot that must give way before `tier` can take another snapshot,
    /// or `None` while the tier still has room.
    pub fn select_eviction_candidate(
        &self,
        tier: &str,
        members: &[SlotMember],
    ) -> RetentionResult<Option<SlotId>> {
        let spec = self.tier(tier)?;
        let members = owned(spec, members);
        if members.len() < spec.cap {
            return Ok(None);
        }
        Ok(oldest_first(&members).first().map(|m| m.slot.clone()))
    }

    /// Slots exceeding the tier's cap, oldest first. Deleting them brings the
    /// tier back within its cap; calling again afterwards returns nothing.
    pub fn excess(&self, tier: &str, members: &[SlotMember]) -> RetentionResult<Vec<SlotId>> {
        let spec = self.tier(tier)?;
        let members = owned(spec, members);
        if members.len() <= spec.cap {
            return Ok(Vec::new());
        }
        let surplus = members.len() - spec.cap;
        Ok(oldest_first(&members)[..surplus]
            .iter()
            .map(|m| m.slot.clone())
            .collect())
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            tiers: TierSpec::defaults(),
        }
    }
}

fn owned<'a>(spec: &TierSpec, members: &'a [SlotMember]) -> Vec<&'a SlotMember> {
    members.iter().filter(|m| spec.owns(m.slot.as_str())).collect()
}

/// Oldest modification time first; equal times order by slot identifier.
fn oldest_first<'a>(members: &[&'a SlotMember]) -> Vec<&'a SlotMember> {
    let mut sorted = members.to_vec();
    sorted.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.slot.cmp(&b.slot)));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::CalendarPeriod;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn policy() -> RetentionPolicy {
        RetentionPolicy::new(vec![
            TierSpec::single("recent"),
            TierSpec::round_robin("session", 2),
            TierSpec::calendar("daily", CalendarPeriod::Day, 3),
        ])
        .unwrap()
    }

    /// Apply a placement to a member list the way a backup directory would.
    fn apply(members: &mut Vec<SlotMember>, placement: &Placement, now: DateTime<Utc>) {
        members.retain(|m| m.slot != placement.slot && !placement.evict.contains(&m.slot));
        members.push(SlotMember::new(placement.slot.clone(), now));
    }

    #[test]
    fn rejects_duplicate_and_invalid_tiers() {
        let err = RetentionPolicy::new(vec![TierSpec::single("recent"), TierSpec::single("recent")])
            .unwrap_err();
        assert_eq!(err, RetentionError::DuplicateTier("recent".into()));

        assert!(RetentionPolicy::new(vec![TierSpec::round_robin("x", 0)]).is_err());
    }

    #[test]
    fn unknown_tier_is_an_error() {
        let err = policy().place_snapshot("weekly", &[], t(0)).unwrap_err();
        assert_eq!(err, RetentionError::UnknownTier("weekly".into()));
    }

    #[test]
    fn single_slot_always_overwrites() {
        let policy = policy();
        let first = policy.place_snapshot("recent", &[], t(0)).unwrap();
        assert_eq!(first.slot, SlotId::new("recent"));
        assert!(!first.overwrite);
        assert!(first.evict.is_empty());

        let members = vec![SlotMember::new("recent", t(0))];
        let second = policy.place_snapshot("recent", &members, t(5)).unwrap();
        assert_eq!(second.slot, SlotId::new("recent"));
        assert!(second.overwrite);
        assert!(second.evict.is_empty());
    }

    #[test]
    fn round_robin_keeps_latest_two_of_three() {
        let policy = policy();
        let mut members = Vec::new();
        let mut written = Vec::new();
        for (i, secs) in [10, 20, 30].into_iter().enumerate() {
            let placement = policy.place_snapshot("session", &members, t(secs)).unwrap();
            assert!(placement.evict.is_empty());
            apply(&mut members, &placement, t(secs));
            written.push((i, placement.slot));
        }

        // t1 went to session_1, t2 to session_2, t3 overwrote session_1.
        assert_eq!(written[0].1, SlotId::new("session_1"));
        assert_eq!(written[1].1, SlotId::new("session_2"));
        assert_eq!(written[2].1, SlotId::new("session_1"));

        let mut times: Vec<_> = members.iter().map(|m| m.modified).collect();
        times.sort();
        assert_eq!(times, vec![t(20), t(30)]);
    }

    #[test]
    fn round_robin_fills_gaps_before_rotating() {
        let policy = policy();
        let members = vec![SlotMember::new("session_2", t(0))];
        let placement = policy.place_snapshot("session", &members, t(1)).unwrap();
        assert_eq!(placement.slot, SlotId::new("session_1"));
        assert!(!placement.overwrite);
    }

    #[test]
    fn round_robin_over_cap_trims_surplus() {
        // The cap was lowered from four to two after these were written.
        let policy = policy();
        let members = vec![
            SlotMember::new("session_1", t(1)),
            SlotMember::new("session_2", t(2)),
            SlotMember::new("session_3", t(3)),
            SlotMember::new("session_4", t(4)),
        ];
        let placement = policy.place_snapshot("session", &members, t(5)).unwrap();
        assert_eq!(placement.slot, SlotId::new("session_1"));
        assert!(placement.overwrite);
        assert_eq!(
            placement.evict,
            vec![SlotId::new("session_2"), SlotId::new("session_3")]
        );
    }

    #[test]
    fn eviction_ties_break_on_smallest_slot() {
        let policy = policy();
        let members = vec![
            SlotMember::new("session_2", t(7)),
            SlotMember::new("session_1", t(7)),
        ];
        let candidate = policy.select_eviction_candidate("session", &members).unwrap();
        assert_eq!(candidate, Some(SlotId::new("session_1")));
        let placement = policy.place_snapshot("session", &members, t(8)).unwrap();
        assert_eq!(placement.slot, SlotId::new("session_1"));
    }

    #[test]
    fn eviction_candidate_only_when_full() {
        let policy = policy();
        let one = vec![SlotMember::new("session_1", t(1))];
        assert_eq!(policy.select_eviction_candidate("session", &one).unwrap(), None);

        let recent = vec![SlotMember::new("recent", t(1))];
        assert_eq!(
            policy.select_eviction_candidate("recent", &recent).unwrap(),
            Some(SlotId::new("recent"))
        );
    }

    #[test]
    fn calendar_overwrites_same_bucket() {
        let policy = policy();
        let day = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let members = vec![SlotMember::new("daily_2024-03-01", day)];
        let placement = policy
            .place_snapshot("daily", &members, day + Duration::hours(6))
            .unwrap();
        assert_eq!(placement.slot, SlotId::new("daily_2024-03-01"));
        assert!(placement.overwrite);
        assert!(placement.evict.is_empty());
    }

    #[test]
    fn calendar_evicts_oldest_bucket_past_cap() {
        let policy = policy();
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap();
        let members = vec![
            SlotMember::new("daily_2024-03-01", day(1)),
            SlotMember::new("daily_2024-03-02", day(2)),
            SlotMember::new("daily_2024-03-03", day(3)),
        ];
        let placement = policy.place_snapshot("daily", &members, day(4)).unwrap();
        assert_eq!(placement.slot, SlotId::new("daily_2024-03-04"));
        assert!(!placement.overwrite);
        assert_eq!(placement.evict, vec![SlotId::new("daily_2024-03-01")]);
    }

    #[test]
    fn tiers_ignore_each_others_members() {
        let policy = policy();
        let members = vec![
            SlotMember::new("recent", t(1)),
            SlotMember::new("session_1", t(2)),
            SlotMember::new("session_2", t(3)),
            SlotMember::new("daily_2024-03-01", t(4)),
        ];
        let placement = policy.place_snapshot("daily", &members, t(5)).unwrap();
        assert!(placement.evict.is_empty());
        assert!(policy.excess("session", &members).unwrap().is_empty());
        assert_eq!(policy.tier_of("session_2").unwrap().name, "session");
        assert!(policy.tier_of("weekly_1").is_none());
    }

    #[test]
    fn excess_is_idempotent() {
        let policy = policy();
        let mut members = vec![
            SlotMember::new("session_1", t(3)),
            SlotMember::new("session_2", t(1)),
            SlotMember::new("session_3", t(2)),
        ];
        let surplus = policy.excess("session", &members).unwrap();
        assert_eq!(surplus, vec![SlotId::new("session_2")]);

        members.retain(|m| !surplus.contains(&m.slot));
        assert!(policy.excess("session", &members).unwrap().is_empty());
    }
}
