// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Personnel, equipment, settings, logs and health endpoints.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use lockout_coordinator::models::Role;
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::{send, TEST_PIN};

#[tokio::test]
async fn test_health_and_security_headers() {
    let (app, _state) = common::create_test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");
    assert_eq!(
        response.headers().get("X-Content-Type-Options").unwrap(),
        "nosniff"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["relayClients"], 0);
}

#[tokio::test]
async fn test_user_lifecycle_never_exposes_pin() {
    let (app, _state) = common::create_test_app();

    let (status, user) = send(
        &app,
        "POST",
        "/users",
        Some(json!({ "name": "Ana Rojas", "username": "arojas", "role": "supervisor", "pin": "4321" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(user.get("pin").is_none());
    assert!(user.get("pinDigest").is_none());
    let id = user["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "POST",
        "/users",
        Some(json!({ "name": "Otra Ana", "username": "arojas", "role": "trabajador", "pin": "1111" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/users/{}/verify", id),
        Some(json!({ "pin": "4321" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/users/{}/verify", id),
        Some(json!({ "pin": "0000" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, list) = send(&app, "GET", "/users?role=supervisor", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    let (_, list) = send(&app, "GET", "/users?role=trabajador", None).await;
    assert!(list.as_array().unwrap().is_empty());

    // Deactivated users cannot authenticate.
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{}", id),
        Some(json!({ "active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        "POST",
        &format!("/users/{}/verify", id),
        Some(json!({ "pin": "4321" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "DELETE", &format!("/users/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_user_in_open_activity_cannot_be_removed() {
    let (app, state) = common::create_test_app();
    let plant = common::seed_plant(&state).await;
    let owner = common::seed_person(&state, "owner-1", Role::DuenoEnergia).await;

    state
        .store
        .update(|data| {
            data.settings.require_zero_energy_validation = false;
            Ok(())
        })
        .await
        .unwrap();

    let id = common::create_activity(&app, "Bloqueo").await;
    send(
        &app,
        "POST",
        &format!("/activities/{}/lockers", id),
        Some(json!({ "totemId": plant.totem_id, "lockerId": plant.locker_ids[0] })),
    )
    .await;
    let (status, _) = send(
        &app,
        "POST",
        &format!("/activities/{}/energy-owners", id),
        Some(json!({ "userId": owner, "pin": TEST_PIN })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "DELETE", &format!("/users/{}", owner), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{}", owner),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{}", owner),
        Some(json!({ "active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The owner can still leave the chain.
    let (status, body) = send(
        &app,
        "POST",
        &format!("/activities/{}/energy-owners/{}/unlock", id, owner),
        Some(json!({ "pin": TEST_PIN })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isBlocked"], false);
}

#[tokio::test]
async fn test_validation_errors_use_json_body() {
    let (app, _state) = common::create_test_app();

    let (status, body) = send(&app, "POST", "/activities", Some(json!({ "name": "" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert!(body["details"].as_str().unwrap().contains("name"));

    let (status, body) = send(&app, "GET", "/activities/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = send(
        &app,
        "PUT",
        "/configuracion",
        Some(json!({ "maxLockersPerActivity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_settings_round_trip() {
    let (app, _state) = common::create_test_app();

    let (_, settings) = send(&app, "GET", "/configuracion", None).await;
    assert_eq!(settings["requireZeroEnergyValidation"], true);
    assert_eq!(settings["maxLockersPerActivity"], 4);

    let (status, settings) = send(
        &app,
        "PUT",
        "/configuracion",
        Some(json!({ "requireZeroEnergyValidation": false, "zeroEnergyMaxVoltage": 1.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["requireZeroEnergyValidation"], false);
    assert_eq!(settings["zeroEnergyMaxVoltage"], 1.5);
    assert_eq!(settings["maxLockersPerActivity"], 4);
}

#[tokio::test]
async fn test_equipment_reports_occupancy() {
    let (app, state) = common::create_test_app();

    let (status, area) = send(&app, "POST", "/areas", Some(json!({ "name": "Chancado" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let area_id = area["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "POST",
        "/equipment",
        Some(json!({ "name": "Correa 3", "areaId": "no-such-area" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, equipment) = send(
        &app,
        "POST",
        "/equipment",
        Some(json!({ "name": "Correa 3", "areaId": area_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let equipment_id = equipment["id"].as_str().unwrap();

    let activity = common::create_activity(&app, "Cambio de correa").await;
    send(
        &app,
        "POST",
        &format!("/activities/{}/equipments", activity),
        Some(json!({ "equipmentId": equipment_id })),
    )
    .await;

    let (_, body) = send(&app, "GET", &format!("/equipment/{}", equipment_id), None).await;
    assert_eq!(body["inUse"], true);
    assert_eq!(body["claim"]["activityId"], activity);
    assert_eq!(body["name"], "Correa 3");

    let (_, in_use) = send(&app, "GET", "/equipment/in-use", None).await;
    assert_eq!(in_use[equipment_id]["activityName"], "Cambio de correa");

    let (status, _) = send(&app, "DELETE", &format!("/equipment/{}", equipment_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send(&app, "DELETE", &format!("/areas/{}", area_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Another activity cannot take equipment that is already in use.
    let other = common::create_activity(&app, "Otra").await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/activities/{}/equipments", other),
        Some(json!({ "equipmentId": equipment_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["details"].as_str().unwrap().contains(&activity));
    let other_equipment = state
        .store
        .read(|d| d.activities[&other].equipments.clone())
        .await;
    assert!(other_equipment.is_empty());
}

#[tokio::test]
async fn test_logs_are_paginated_newest_first() {
    let (app, _state) = common::create_test_app();
    for i in 0..5 {
        common::create_activity(&app, &format!("Actividad {}", i)).await;
    }

    let (status, page) = send(&app, "GET", "/logs?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = page["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0]["message"].as_str().unwrap().contains("Actividad 4"));
    let cursor = page["nextCursor"].as_str().unwrap().to_string();

    let mut seen = 2;
    let mut cursor = Some(cursor);
    while let Some(c) = cursor {
        let (_, page) = send(&app, "GET", &format!("/logs?limit=2&cursor={}", c), None).await;
        seen += page["entries"].as_array().unwrap().len();
        cursor = page["nextCursor"].as_str().map(str::to_string);
    }
    assert_eq!(seen, 5);

    let (status, _) = send(&app, "GET", "/logs?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, "GET", "/logs?cursor=bm9wZQ", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_area_and_equipment_updates_are_logged() {
    let (app, state) = common::create_test_app();
    let plant = common::seed_plant(&state).await;

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/areas/{}", plant.area_id),
        Some(json!({ "name": "Molienda Sur" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/equipment/{}", plant.equipment_ids[0]),
        Some(json!({ "name": "Molino 1", "areaId": plant.area_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, page) = send(&app, "GET", "/logs?limit=2", None).await;
    let entries = page["entries"].as_array().unwrap();
    assert_eq!(entries[0]["action"], "equipment.update");
    assert!(entries[0]["message"].as_str().unwrap().contains("Molino 1"));
    assert_eq!(entries[1]["action"], "area.update");
    assert!(entries[1]["message"].as_str().unwrap().contains("Molienda Sur"));
}

#[tokio::test]
async fn test_cors_allows_only_exact_loopback_hosts() {
    let (app, _state) = common::create_test_app();

    for (origin, allowed) in [
        ("http://localhost:5173", true),
        ("http://127.0.0.1:8080", true),
        ("http://localhost.evil.com", false),
        ("http://127.0.0.1.evil.com", false),
    ] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("Origin", origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let allow = response.headers().get("access-control-allow-origin");
        assert_eq!(allow.is_some(), allowed, "origin {}", origin);
        if allowed {
            assert_eq!(allow.unwrap(), origin);
        }
    }
}
