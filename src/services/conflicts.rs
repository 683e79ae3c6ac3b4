// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Locker conflict detection.
//!
//! A conflict is a locker assigned to more than one non-finalized activity.
//! New assignments are refused when they would create one, so conflicts only
//! show up in data imported from elsewhere or edited by hand.

use crate::db::StoreData;
use crate::models::{Activity, LockerStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// A locker claimed by several activities, earliest claim first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockerConflict {
    pub totem_id: String,
    pub locker_id: String,
    pub activity_ids: Vec<String>,
}

/// An assignment dropped while resolving a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedAssignment {
    pub totem_id: String,
    pub locker_id: String,
    pub activity_id: String,
    pub kept_activity_id: String,
}

/// Find every locker held by more than one active activity.
pub fn find_conflicts<'a>(
    activities: impl IntoIterator<Item = &'a Activity>,
) -> Vec<LockerConflict> {
    let mut claims: BTreeMap<(&str, &str), Vec<(DateTime<Utc>, &str)>> = BTreeMap::new();

    for activity in activities.into_iter().filter(|a| !a.is_finalized()) {
        for locker in &activity.assigned_lockers {
            claims
                .entry((locker.totem_id.as_str(), locker.locker_id.as_str()))
                .or_default()
                .push((locker.assigned_at, activity.id.as_str()));
        }
    }

    claims
        .into_iter()
        .filter_map(|((totem_id, locker_id), mut holders)| {
            holders.sort();
            holders.dedup_by(|a, b| a.1 == b.1);
            (holders.len() > 1).then(|| LockerConflict {
                totem_id: totem_id.to_string(),
                locker_id: locker_id.to_string(),
                activity_ids: holders.into_iter().map(|(_, id)| id.to_string()).collect(),
            })
        })
        .collect()
}

/// Active activity other than `excluding` holding the locker, if any.
pub fn holder_of<'a>(
    activities: impl IntoIterator<Item = &'a Activity>,
    totem_id: &str,
    locker_id: &str,
    excluding: &str,
) -> Option<&'a Activity> {
    activities
        .into_iter()
        .filter(|a| !a.is_finalized() && a.id != excluding)
        .find(|a| a.holds_locker(totem_id, locker_id))
}

/// Keep the earliest claim on each conflicting locker and drop the rest.
pub fn resolve_conflicts(data: &mut StoreData) -> Vec<RemovedAssignment> {
    let conflicts = find_conflicts(data.activities.values());
    let mut removed = Vec::new();

    for conflict in conflicts {
        let Some((winner, losers)) = conflict.activity_ids.split_first() else {
            continue;
        };

        for loser in losers {
            if let Some(activity) = data.activities.get_mut(loser) {
                activity.assigned_lockers.retain(|l| {
                    !(l.totem_id == conflict.totem_id && l.locker_id == conflict.locker_id)
                });
                activity.touch();
            }
            removed.push(RemovedAssignment {
                totem_id: conflict.totem_id.clone(),
                locker_id: conflict.locker_id.clone(),
                activity_id: loser.clone(),
                kept_activity_id: winner.clone(),
            });
        }

        let winner_equipment = data
            .activities
            .get(winner)
            .map(|a| a.equipments.clone())
            .unwrap_or_default();
        if let Some(locker) = data
            .totems
            .get_mut(&conflict.totem_id)
            .and_then(|t| t.locker_mut(&conflict.locker_id))
        {
            locker.status = LockerStatus::Ocupado;
            locker.activity_id = Some(winner.clone());
            locker.equipos = winner_equipment;
        }

        tracing::warn!(
            totem_id = %conflict.totem_id,
            locker_id = %conflict.locker_id,
            kept = %winner,
            dropped = losers.len(),
            "Resolved locker conflict"
        );
    }

    removed
}
