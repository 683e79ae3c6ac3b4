// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Relay event handling, driven without a real socket.

use axum::extract::ws::Message;
use lockout_coordinator::config::Config;
use lockout_coordinator::db::Store;
use lockout_coordinator::models::Role;
use lockout_coordinator::services::{LockerDevice, OccupancyTracker};
use lockout_coordinator::ws::{self, handle_client_message, on_disconnect};
use lockout_coordinator::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

mod common;

fn decode(msg: Message) -> Value {
    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("unexpected frame: {:?}", other),
    }
}

/// Next frame with the given event name, skipping others.
async fn next_event(rx: &mut UnboundedReceiver<Message>, event: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for relay event")
            .expect("channel closed");
        let value = decode(msg);
        if value["event"] == event {
            return value["data"].clone();
        }
    }
}

fn drain(rx: &mut UnboundedReceiver<Message>) {
    while rx.try_recv().is_ok() {}
}

fn use_equipment(equipo: &str, actividad: &str) -> String {
    json!({
        "event": "usar-equipo",
        "data": { "equipoId": equipo, "actividadId": actividad, "actividadNombre": "Mantenimiento" }
    })
    .to_string()
}

#[tokio::test]
async fn test_register_totem_broadcasts_clients() {
    let (_app, state) = common::create_test_app();
    let mut rx = state.ws.add("conn-1".to_string());

    handle_client_message(
        &state,
        "conn-1",
        r#"{"event":"register-totem","data":{"totemId":"totem-A"}}"#,
    )
    .await;

    let clients = next_event(&mut rx, "actualizar-clientes").await;
    assert_eq!(clients[0]["id"], "conn-1");
    assert_eq!(clients[0]["totemId"], "totem-A");
}

#[tokio::test]
async fn test_claim_is_broadcast_to_every_client() {
    let (_app, state) = common::create_test_app();
    common::seed_activity(&state, "act-1").await;
    ws::start_occupancy_forwarder(&state.occupancy, state.ws.clone());
    let mut a = state.ws.add("conn-a".to_string());
    let mut b = state.ws.add("conn-b".to_string());
    state.ws.register_totem("conn-a", "totem-A");

    handle_client_message(&state, "conn-a", &use_equipment("eq-1", "act-1")).await;

    for rx in [&mut a, &mut b] {
        let snapshot = next_event(rx, "actualizar-equipos").await;
        assert_eq!(
            snapshot,
            json!({
                "eq-1": { "totem": "totem-A", "activityId": "act-1", "activityName": "Mantenimiento" }
            })
        );
    }
}

#[tokio::test]
async fn test_claim_by_another_activity_is_rejected() {
    let (_app, state) = common::create_test_app();
    common::seed_activity(&state, "act-1").await;
    common::seed_activity(&state, "act-2").await;
    let mut rx = state.ws.add("conn-1".to_string());

    handle_client_message(&state, "conn-1", &use_equipment("eq-1", "act-1")).await;
    handle_client_message(&state, "conn-1", &use_equipment("eq-1", "act-2")).await;

    let error = next_event(&mut rx, "error-equipo").await;
    assert_eq!(error["code"], "equipo_ocupado");
    assert_eq!(error["equipoId"], "eq-1");

    let claim = state.occupancy.claim_of("eq-1").await.unwrap();
    assert_eq!(claim.activity_id, "act-1");

    handle_client_message(&state, "conn-1", &use_equipment("eq-1", "act-1")).await;
    let error = next_event(&mut rx, "error-equipo").await;
    assert_eq!(error["code"], "equipo_ya_asignado");
}

#[tokio::test]
async fn test_release_requires_the_holding_activity() {
    let (_app, state) = common::create_test_app();
    common::seed_activity(&state, "act-1").await;
    common::seed_activity(&state, "act-2").await;
    let mut rx = state.ws.add("conn-1".to_string());
    handle_client_message(&state, "conn-1", &use_equipment("eq-1", "act-1")).await;

    let release = |actividad: &str| {
        json!({ "event": "liberar-equipo", "data": { "equipoId": "eq-1", "actividadId": actividad } })
            .to_string()
    };

    handle_client_message(&state, "conn-1", &release("act-2")).await;
    let error = next_event(&mut rx, "error-equipo").await;
    assert_eq!(error["code"], "equipo_ocupado");
    assert!(state.occupancy.claim_of("eq-1").await.is_some());

    handle_client_message(&state, "conn-1", &release("act-1")).await;
    assert!(state.occupancy.claim_of("eq-1").await.is_none());

    handle_client_message(&state, "conn-1", &release("act-1")).await;
    let error = next_event(&mut rx, "error-equipo").await;
    assert_eq!(error["code"], "equipo_no_asignado");
}

#[tokio::test]
async fn test_invalid_frames_are_answered_with_errors() {
    let (_app, state) = common::create_test_app();
    let mut rx = state.ws.add("conn-1".to_string());

    handle_client_message(&state, "conn-1", "not json").await;
    let error = next_event(&mut rx, "error-equipo").await;
    assert_eq!(error["code"], "mensaje_invalido");

    handle_client_message(&state, "conn-1", r#"{"event":"bailar","data":{}}"#).await;
    let error = next_event(&mut rx, "error-equipo").await;
    assert_eq!(error["code"], "mensaje_invalido");

    handle_client_message(
        &state,
        "conn-1",
        r#"{"event":"usar-equipo","data":{"actividadId":"act-1"}}"#,
    )
    .await;
    let error = next_event(&mut rx, "error-equipo").await;
    assert_eq!(error["code"], "campo_requerido");
    assert!(state.occupancy.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_get_requests_answer_only_the_sender() {
    let (_app, state) = common::create_test_app();
    common::seed_activity(&state, "act-1").await;
    let mut a = state.ws.add("conn-a".to_string());
    let mut b = state.ws.add("conn-b".to_string());
    handle_client_message(&state, "conn-a", &use_equipment("eq-9", "act-1")).await;
    drain(&mut a);
    drain(&mut b);

    handle_client_message(&state, "conn-a", r#"{"event":"get-equipos"}"#).await;
    let snapshot = next_event(&mut a, "actualizar-equipos").await;
    assert_eq!(snapshot["eq-9"]["activityId"], "act-1");

    handle_client_message(&state, "conn-a", r#"{"event":"get-clients"}"#).await;
    let clients = next_event(&mut a, "actualizar-clientes").await;
    assert_eq!(clients.as_array().unwrap().len(), 2);

    assert!(b.try_recv().is_err());
}

#[tokio::test]
async fn test_rest_changes_reach_relay_clients() {
    let (app, state) = common::create_test_app();
    ws::start_occupancy_forwarder(&state.occupancy, state.ws.clone());
    let plant = common::seed_plant(&state).await;
    let mut rx = state.ws.add("conn-1".to_string());

    let id = common::create_activity(&app, "Desde la consola").await;
    common::send(
        &app,
        "POST",
        &format!("/activities/{}/equipments", id),
        Some(json!({ "equipmentId": plant.equipment_ids[0] })),
    )
    .await;

    let snapshot = next_event(&mut rx, "actualizar-equipos").await;
    assert_eq!(snapshot[&plant.equipment_ids[0]]["activityId"], id.as_str());
    assert_eq!(snapshot[&plant.equipment_ids[0]]["activityName"], "Desde la consola");
}

#[tokio::test]
async fn test_disconnect_keeps_claims_by_default() {
    let (_app, state) = common::create_test_app();
    common::seed_activity(&state, "act-1").await;
    let _rx = state.ws.add("conn-1".to_string());
    state.ws.register_totem("conn-1", "totem-A");
    handle_client_message(&state, "conn-1", &use_equipment("eq-1", "act-1")).await;

    on_disconnect(&state, "conn-1").await;

    assert_eq!(state.ws.connection_count(), 0);
    assert!(state.occupancy.claim_of("eq-1").await.is_some());
}

#[tokio::test]
async fn test_disconnect_releases_claims_when_configured() {
    let mut config = Config::test_default();
    config.release_on_disconnect = true;
    let state = AppState::new(
        config,
        Store::in_memory(),
        Arc::new(OccupancyTracker::in_memory()),
        LockerDevice::new_mock(),
    );
    common::seed_activity(&state, "act-1").await;
    let _rx = state.ws.add("conn-1".to_string());
    state.ws.register_totem("conn-1", "totem-A");
    handle_client_message(&state, "conn-1", &use_equipment("eq-1", "act-1")).await;
    handle_client_message(&state, "conn-1", &use_equipment("eq-2", "act-1")).await;

    on_disconnect(&state, "conn-1").await;

    assert!(state.occupancy.snapshot().await.is_empty());
}

fn release_equipment(equipo: &str, actividad: &str) -> String {
    json!({ "event": "liberar-equipo", "data": { "equipoId": equipo, "actividadId": actividad } })
        .to_string()
}

#[tokio::test]
async fn test_claims_for_unknown_or_finalized_activities_are_rejected() {
    let (app, state) = common::create_test_app();
    let mut rx = state.ws.add("conn-1".to_string());

    handle_client_message(&state, "conn-1", &use_equipment("eq-1", "no-existe")).await;
    let error = next_event(&mut rx, "error-equipo").await;
    assert_eq!(error["code"], "actividad_no_encontrada");
    assert_eq!(error["equipoId"], "eq-1");

    let id = common::create_activity(&app, "Cerrada").await;
    let (status, _) =
        common::send(&app, "POST", &format!("/activities/{}/finalize", id), None).await;
    assert_eq!(status, axum::http::StatusCode::OK);

    handle_client_message(&state, "conn-1", &use_equipment("eq-1", &id)).await;
    let error = next_event(&mut rx, "error-equipo").await;
    assert_eq!(error["code"], "actividad_finalizada");
    assert!(state.occupancy.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_relay_cannot_release_equipment_of_a_blocked_activity() {
    let (app, state) = common::create_test_app();
    let plant = common::seed_plant(&state).await;
    let owner = common::seed_person(&state, "owner-1", Role::DuenoEnergia).await;
    let equipment = plant.equipment_ids[0].clone();

    let blocked = common::create_activity(&app, "Bloqueada").await;
    let base = format!("/activities/{}", blocked);
    common::send(
        &app,
        "POST",
        &format!("{}/equipments", base),
        Some(json!({ "equipmentId": equipment })),
    )
    .await;
    common::send(
        &app,
        "POST",
        &format!("{}/lockers", base),
        Some(json!({ "totemId": plant.totem_id, "lockerId": plant.locker_ids[0] })),
    )
    .await;
    common::send(
        &app,
        "POST",
        &format!("{}/zero-energy", base),
        Some(json!({ "validatedBy": owner, "pin": common::TEST_PIN, "voltage": 0.0 })),
    )
    .await;
    let (status, _) = common::send(
        &app,
        "POST",
        &format!("{}/energy-owners", base),
        Some(json!({ "userId": owner, "pin": common::TEST_PIN })),
    )
    .await;
    assert_eq!(status, axum::http::StatusCode::OK);

    let mut rx = state.ws.add("conn-1".to_string());
    handle_client_message(&state, "conn-1", &release_equipment(&equipment, &blocked)).await;
    let error = next_event(&mut rx, "error-equipo").await;
    assert_eq!(error["code"], "equipo_bloqueado");
    assert_eq!(state.occupancy.claim_of(&equipment).await.unwrap().activity_id, blocked);

    // The equipment therefore stays out of reach of every other activity.
    let other = common::create_activity(&app, "Otra").await;
    let (status, _) = common::send(
        &app,
        "POST",
        &format!("/activities/{}/equipments", other),
        Some(json!({ "equipmentId": equipment })),
    )
    .await;
    assert_eq!(status, axum::http::StatusCode::CONFLICT);
    let holders = state
        .store
        .read(|d| {
            d.activities
                .values()
                .filter(|a| a.equipments.contains(&equipment))
                .count()
        })
        .await;
    assert_eq!(holders, 1);
}

#[tokio::test]
async fn test_relay_release_of_activity_equipment_is_refused() {
    let (app, state) = common::create_test_app();
    let plant = common::seed_plant(&state).await;
    let id = common::create_activity(&app, "Por la consola").await;
    common::send(
        &app,
        "POST",
        &format!("/activities/{}/equipments", id),
        Some(json!({ "equipmentId": plant.equipment_ids[1] })),
    )
    .await;

    let mut rx = state.ws.add("conn-1".to_string());
    let frame = release_equipment(&plant.equipment_ids[1], &id);
    handle_client_message(&state, "conn-1", &frame).await;
    let error = next_event(&mut rx, "error-equipo").await;
    assert_eq!(error["code"], "equipo_en_actividad");
    assert!(state.occupancy.claim_of(&plant.equipment_ids[1]).await.is_some());
}
