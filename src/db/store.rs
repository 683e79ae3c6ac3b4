// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory document store with JSON file persistence.
//!
//! Provides typed access to:
//! - Activities (lockout work orders and their blocking chain)
//! - Totems and their lockers
//! - Personnel, areas and equipment
//! - Settings and the audit log
//!
//! Every mutation runs inside [`Store::update`], which works on a draft copy
//! under the write lock and only commits it once the file has been replaced.

use crate::db::file::{read_json, write_json_atomic, StoreError};
use crate::error::AppError;
use crate::models::{Activity, Area, Equipment, LogEntry, Person, Settings, Totem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Oldest audit entries are dropped past this many.
const MAX_LOG_ENTRIES: usize = 5000;

/// Everything the store persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreData {
    pub activities: BTreeMap<String, Activity>,
    pub people: BTreeMap<String, Person>,
    pub totems: BTreeMap<String, Totem>,
    pub areas: BTreeMap<String, Area>,
    pub equipment: BTreeMap<String, Equipment>,
    pub settings: Settings,
    pub logs: Vec<LogEntry>,
    pub next_log_seq: u64,
}

impl StoreData {
    /// Append an audit entry.
    pub fn log(&mut self, action: &str, activity_id: Option<&str>, message: impl Into<String>) {
        self.next_log_seq += 1;
        self.logs.push(LogEntry {
            seq: self.next_log_seq,
            timestamp: chrono::Utc::now(),
            action: action.to_string(),
            activity_id: activity_id.map(str::to_string),
            message: message.into(),
        });

        if self.logs.len() > MAX_LOG_ENTRIES {
            let excess = self.logs.len() - MAX_LOG_ENTRIES;
            self.logs.drain(..excess);
        }
    }

    pub fn activity(&self, id: &str) -> Result<&Activity, AppError> {
        self.activities
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Activity {} not found", id)))
    }

    pub fn activity_mut(&mut self, id: &str) -> Result<&mut Activity, AppError> {
        self.activities
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Activity {} not found", id)))
    }

    pub fn person(&self, id: &str) -> Result<&Person, AppError> {
        self.people
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    pub fn totem(&self, id: &str) -> Result<&Totem, AppError> {
        self.totems
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Totem {} not found", id)))
    }

    pub fn totem_mut(&mut self, id: &str) -> Result<&mut Totem, AppError> {
        self.totems
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Totem {} not found", id)))
    }

    pub fn equipment(&self, id: &str) -> Result<&Equipment, AppError> {
        self.equipment
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Equipment {} not found", id)))
    }

    pub fn area(&self, id: &str) -> Result<&Area, AppError> {
        self.areas
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Area {} not found", id)))
    }
}

/// Shared handle to the store.
#[derive(Clone)]
pub struct Store {
    data: Arc<RwLock<StoreData>>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open the store backed by `path`, creating an empty one if the file
    /// does not exist yet.
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let data = read_json::<StoreData>(&path).await?.unwrap_or_default();

        tracing::info!(
            path = %path.display(),
            activities = data.activities.len(),
            totems = data.totems.len(),
            people = data.people.len(),
            "Store loaded"
        );

        Ok(Self {
            data: Arc::new(RwLock::new(data)),
            path: Some(path),
        })
    }

    /// Create a store that lives only in memory (tests).
    pub fn in_memory() -> Self {
        Self {
            data: Arc::new(RwLock::new(StoreData::default())),
            path: None,
        }
    }

    /// Run `f` against a consistent view of the data.
    pub async fn read<T>(&self, f: impl FnOnce(&StoreData) -> T) -> T {
        let guard = self.data.read().await;
        f(&guard)
    }

    /// Run a mutation as one transaction.
    ///
    /// `f` receives a draft copy. If it fails nothing changes; if it succeeds
    /// the draft is written to disk and then becomes the live state.
    pub async fn update<T>(
        &self,
        f: impl FnOnce(&mut StoreData) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut guard = self.data.write().await;
        let mut draft = guard.clone();

        let out = f(&mut draft)?;

        if let Some(path) = &self.path {
            write_json_atomic(path, &draft).await?;
        }

        *guard = draft;
        Ok(out)
    }
}
