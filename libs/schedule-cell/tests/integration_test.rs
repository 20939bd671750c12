use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schedule_cell::router::schedule_routes;
use schedule_cell::services::availability::AvailabilityService;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockStoreResponses, TestConfig, TestUser};

fn create_test_app(config: AppConfig) -> Router {
    schedule_routes(Arc::new(config))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

// A Monday well in the future, so the same-day cutoff never interferes.
fn future_monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).expect("valid date")
}

async fn mount_day_schedule(mock_server: &MockServer, doctor_id: &str, schedule: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_weekly_schedules"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([schedule])))
        .mount(mock_server)
        .await;
}

async fn mount_booked_times(mock_server: &MockServer, doctor_id: &str, times: &[&str]) {
    let rows: Vec<Value> = times.iter().map(|t| json!({ "time": t })).collect();
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("status", "not.in.(cancelled,no_show)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(rows)))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn availability_lists_free_slots_and_schedule_summary() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();

    mount_day_schedule(
        &mock_server,
        &doctor_id,
        MockStoreResponses::weekly_schedule_response(&doctor_id, 1, "09:00", "12:00"),
    )
    .await;
    mount_booked_times(&mock_server, &doctor_id, &["10:00"]).await;

    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(config);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/doctor/{}/availability?date={}",
                    doctor_id,
                    future_monday()
                ))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let times: Vec<&str> = body["available_slots"]
        .as_array()
        .expect("slots array")
        .iter()
        .map(|slot| slot["time"].as_str().expect("time"))
        .collect();

    assert_eq!(times, vec!["09:00", "09:30", "10:30", "11:00", "11:30"]);
    assert_eq!(body["doctor_schedule"]["start_time"], "09:00");
    assert_eq!(body["doctor_schedule"]["slot_duration_minutes"], 30);
}

#[tokio::test]
async fn slot_query_service_answers_directly() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();

    mount_day_schedule(
        &mock_server,
        &doctor_id,
        MockStoreResponses::weekly_schedule_response(&doctor_id, 1, "09:00", "12:00"),
    )
    .await;
    mount_booked_times(&mock_server, &doctor_id, &[]).await;

    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();
    let service = AvailabilityService::new(&config);

    let slots = service
        .get_available_slots(&doctor_id, future_monday(), None)
        .await
        .expect("slots");

    assert_eq!(slots.len(), 6);
    assert!(slots.iter().all(|slot| slot.available));

    // A doctor with no schedule for the day has zero slots, not an error.
    let unknown = Uuid::new_v4().to_string();
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_weekly_schedules"))
        .and(query_param("doctor_id", format!("eq.{}", unknown)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let slots = service
        .get_available_slots(&unknown, future_monday(), None)
        .await
        .expect("empty");
    assert!(slots.is_empty());
}

#[tokio::test]
async fn availability_is_empty_when_doctor_has_no_schedule_that_day() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_weekly_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(config);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/doctor/{}/availability?date={}",
                    doctor_id,
                    future_monday()
                ))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    // No schedule is a normal empty answer, not an error.
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["available_slots"], json!([]));
    assert!(body["message"].as_str().is_some());
}

#[tokio::test]
async fn check_availability_reports_booked_before_working_hours() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    // 20:00 is booked even though the schedule now ends at 17:00; the booked
    // answer must win over the stale-schedule answer.
    mount_day_schedule(
        &mock_server,
        &doctor_id.to_string(),
        MockStoreResponses::weekly_schedule_response(&doctor_id.to_string(), 1, "09:00", "17:00"),
    )
    .await;
    mount_booked_times(&mock_server, &doctor_id.to_string(), &["20:00"]).await;

    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(config);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/check-availability")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "doctor_id": doctor_id,
                        "date": future_monday(),
                        "time": "20:00"
                    })
                    .to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_available"], json!(false));
    assert_eq!(body["reason"], "Time slot already booked");
}

#[tokio::test]
async fn check_availability_flags_times_outside_working_hours() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    mount_day_schedule(
        &mock_server,
        &doctor_id.to_string(),
        MockStoreResponses::weekly_schedule_response(&doctor_id.to_string(), 1, "09:00", "17:00"),
    )
    .await;
    mount_booked_times(&mock_server, &doctor_id.to_string(), &[]).await;

    for (time, expected_available, expected_reason) in [
        ("08:00", false, Some("Time outside working hours")),
        ("17:00", false, Some("Time outside working hours")),
        ("09:00", true, None),
    ] {
        let response = create_test_app(
            TestConfig::with_store_url(&mock_server.uri()).to_app_config(),
        )
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/check-availability")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "doctor_id": doctor_id,
                        "date": future_monday(),
                        "time": time
                    })
                    .to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["is_available"], json!(expected_available), "time {}", time);
        match expected_reason {
            Some(reason) => assert_eq!(body["reason"], reason),
            None => assert!(body["reason"].is_null()),
        }
    }
}

#[tokio::test]
async fn check_availability_rejects_malformed_time() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(config);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/check-availability")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "doctor_id": Uuid::new_v4(),
                        "date": future_monday(),
                        "time": "25:99"
                    })
                    .to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_schedule_replaces_the_week_wholesale() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_store_url(&mock_server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let token = JwtTestUtils::create_test_token(&doctor, &test_config.jwt_secret, Some(24));

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/doctor_weekly_schedules"))
        .and(query_param("doctor_id", format!("eq.{}", doctor.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_weekly_schedules"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockStoreResponses::weekly_schedule_response(&doctor.id, 1, "09:00", "17:00"),
            MockStoreResponses::weekly_schedule_response(&doctor.id, 2, "09:00", "13:00"),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/doctor/update-schedule")
                .header("content-type", "application/json")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::from(
                    json!({
                        "schedules": [
                            {
                                "day_of_week": 1,
                                "start_time": "09:00",
                                "end_time": "17:00",
                                "break_times": [
                                    { "start_time": "12:00", "end_time": "13:00", "description": "Lunch" }
                                ]
                            },
                            { "day_of_week": 2, "start_time": "09:00", "end_time": "13:00" }
                        ]
                    })
                    .to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["schedules"].as_array().expect("schedules").len(), 2);
}

#[tokio::test]
async fn update_schedule_rejects_invalid_entries_without_touching_the_store() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_store_url(&mock_server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let token = JwtTestUtils::create_test_token(&doctor, &test_config.jwt_secret, Some(24));

    // No store mocks mounted: a validation failure must never reach the store.
    let app = create_test_app(test_config.to_app_config());

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/doctor/update-schedule")
                .header("content-type", "application/json")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::from(
                    json!({
                        "schedules": [
                            { "day_of_week": 1, "start_time": "17:00", "end_time": "09:00" }
                        ]
                    })
                    .to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    let message = body["error"].as_str().expect("error message");
    assert!(message.contains("day 1"), "error names the day: {}", message);
}

#[tokio::test]
async fn update_schedule_requires_doctor_role() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_store_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &test_config.jwt_secret, Some(24));

    let app = create_test_app(test_config.to_app_config());

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/doctor/update-schedule")
                .header("content-type", "application/json")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::from(json!({ "schedules": [] }).to_string()))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn my_schedule_returns_the_doctors_week() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_store_url(&mock_server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let token = JwtTestUtils::create_test_token(&doctor, &test_config.jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_weekly_schedules"))
        .and(query_param("doctor_id", format!("eq.{}", doctor.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::weekly_schedule_response(&doctor.id, 1, "09:00", "17:00"),
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/doctor/my-schedule")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["schedules"][0]["day_of_week"], 1);
}

#[tokio::test]
async fn protected_routes_reject_missing_and_bad_tokens() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_store_url(&mock_server.uri());

    let app = create_test_app(test_config.to_app_config());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/doctor/my-schedule")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let app = create_test_app(test_config.to_app_config());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/doctor/my-schedule")
                .header(
                    "Authorization",
                    format!("Bearer {}", JwtTestUtils::create_malformed_token()),
                )
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
