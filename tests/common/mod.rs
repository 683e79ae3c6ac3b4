// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use lockout_coordinator::config::Config;
use lockout_coordinator::db::Store;
use lockout_coordinator::models::{Activity, Area, Equipment, Locker, Person, Role, Totem};
use lockout_coordinator::routes::create_router;
use lockout_coordinator::services::{LockerDevice, OccupancyTracker};
use lockout_coordinator::AppState;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// PIN used for every seeded person.
#[allow(dead_code)]
pub const TEST_PIN: &str = "1234";

/// Create a test app with an in-memory store and a mock locker device.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>) {
    create_test_app_with_device(LockerDevice::new_mock())
}

#[allow(dead_code)]
pub fn create_test_app_with_device(device: LockerDevice) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(
        Config::test_default(),
        Store::in_memory(),
        Arc::new(OccupancyTracker::in_memory()),
        device,
    ));
    (create_router(state.clone()), state)
}

/// Send a request and decode the JSON response (Null for empty bodies).
#[allow(dead_code)]
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Insert a person directly into the store.
#[allow(dead_code)]
pub async fn seed_person(state: &AppState, id: &str, role: Role) -> String {
    let person = Person {
        id: id.to_string(),
        name: format!("Person {}", id),
        username: id.to_string(),
        role,
        pin_digest: state.pins.digest(TEST_PIN).unwrap(),
        active: true,
    };
    state
        .store
        .update(|data| {
            data.people.insert(person.id.clone(), person);
            Ok(())
        })
        .await
        .unwrap();
    id.to_string()
}

/// Fixture ids created by [`seed_plant`].
#[allow(dead_code)]
pub struct Plant {
    pub area_id: String,
    pub equipment_ids: Vec<String>,
    pub totem_id: String,
    pub locker_ids: Vec<String>,
}

/// One area with two pieces of equipment and a totem with three lockers.
#[allow(dead_code)]
pub async fn seed_plant(state: &AppState) -> Plant {
    let area = Area {
        id: "area-1".to_string(),
        name: "Molienda".to_string(),
        description: None,
    };
    let equipment: Vec<Equipment> = ["eq-1", "eq-2"]
        .iter()
        .map(|id| Equipment {
            id: id.to_string(),
            name: format!("Equipo {}", id),
            area_id: area.id.clone(),
            zero_energy_validated: false,
            locked: false,
        })
        .collect();
    let totem = Totem {
        id: "totem-1".to_string(),
        name: "Totem Norte".to_string(),
        location: Some("Nave 1".to_string()),
        lockers: (1..=3).map(Locker::new).collect(),
    };

    let plant = Plant {
        area_id: area.id.clone(),
        equipment_ids: equipment.iter().map(|e| e.id.clone()).collect(),
        totem_id: totem.id.clone(),
        locker_ids: totem.lockers.iter().map(|l| l.id.clone()).collect(),
    };

    state
        .store
        .update(|data| {
            data.areas.insert(area.id.clone(), area);
            for e in equipment {
                data.equipment.insert(e.id.clone(), e);
            }
            data.totems.insert(totem.id.clone(), totem);
            Ok(())
        })
        .await
        .unwrap();
    plant
}

/// Create an activity through the API and return its id.
#[allow(dead_code)]
pub async fn create_activity(app: &Router, name: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/activities",
        Some(serde_json::json!({ "name": name, "description": "Mantenimiento" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

/// Insert an open activity with a fixed id directly into the store.
#[allow(dead_code)]
pub async fn seed_activity(state: &AppState, id: &str) -> String {
    let mut activity = Activity::new(format!("Actividad {}", id), String::new(), None);
    activity.id = id.to_string();
    state
        .store
        .update(|data| {
            data.activities.insert(activity.id.clone(), activity);
            Ok(())
        })
        .await
        .unwrap();
    id.to_string()
}
