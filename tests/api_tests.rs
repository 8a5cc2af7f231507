//! End-to-end API tests for account, pairing and voice check-in flows.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use carelink::config::Config;
use http_body_util::BodyExt;
use tower::ServiceExt;

const FIXED_SCORE: f32 = 0.55;

/// App backed by an in-memory database and the in-process analyzer, with a
/// freshly generated question set on disk.
async fn spawn_app() -> Router {
    let scratch = std::env::temp_dir().join(format!("carelink-test-{}", uuid::Uuid::new_v4()));
    let questions_root = scratch.join("questions");
    std::fs::create_dir_all(&questions_root).expect("failed to create questions dir");

    for i in 1..=3 {
        std::fs::write(
            questions_root.join(format!("a{i}.wav")),
            b"RIFF....WAVEfmt fake-question-audio",
        )
        .expect("failed to write question file");
    }

    let mut config = Config::default();
    config.general.database_path =
        format!("sqlite:{}", scratch.join("carelink-test.db").display());
    config.analyzer.mode = "fixed".to_string();
    config.analyzer.fixed_score = FIXED_SCORE;
    config.voice.questions_root = questions_root.display().to_string();
    config.voice.media_root = scratch.join("media").display().to_string();

    let state = carelink::api::create_app_state_from_config(config, None)
        .await
        .expect("failed to create app state");
    carelink::api::router(state)
}

async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let request = match body {
        Some(json) => builder
            .header("Content-Type", mime::APPLICATION_JSON.as_ref())
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };

    (status, json)
}

async fn signup(app: &Router, email: &str) -> String {
    let (status, body) = send_json(
        app,
        "POST",
        "/api/auth/signup",
        None,
        Some(serde_json::json!({
            "email": email,
            "name": "Test Caregiver",
            "password": "correct-horse-battery",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    body["data"]["access_token"].as_str().unwrap().to_string()
}

fn multipart_request(
    uri: &str,
    token: &str,
    session_token: &str,
    files: &[(&str, &[u8])],
) -> Request<Body> {
    let boundary = "carelink-test-boundary";
    let mut body: Vec<u8> = Vec::new();

    for (name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: audio/wav\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .header("X-Session-Token", session_token)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn health_endpoints_respond() {
    let app = spawn_app().await;

    let (status, body) = send_json(&app, "GET", "/api/system/health/live", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");

    let (status, body) = send_json(&app, "GET", "/api/system/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["checks"]["database"], true);
}

#[tokio::test]
async fn protected_routes_reject_bad_tokens() {
    let app = spawn_app().await;

    let (status, _) = send_json(&app, "GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json(&app, "GET", "/api/auth/me", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A caregiver token is not a dependent token.
    let token = signup(&app, "guard@example.com").await;
    let (status, _) = send_json(&app, "POST", "/api/voice/sessions", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn signup_and_login_flow() {
    let app = spawn_app().await;

    let token = signup(&app, "carer@example.com").await;

    let (status, body) = send_json(&app, "GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "carer@example.com");

    // Duplicate signup conflicts.
    let (status, _) = send_json(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        Some(serde_json::json!({
            "email": "carer@example.com",
            "name": "Someone Else",
            "password": "another-password",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Wrong password.
    let (status, _) = send_json(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({
            "email": "carer@example.com",
            "password": "wrong-password",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Correct password.
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({
            "email": "carer@example.com",
            "password": "correct-horse-battery",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["access_token"].is_string());
}

#[tokio::test]
async fn short_passwords_are_rejected() {
    let app = spawn_app().await;

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        Some(serde_json::json!({
            "email": "short@example.com",
            "name": "Short",
            "password": "tiny",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_pairing_code_reads_as_invalid() {
    let app = spawn_app().await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/connections/verify",
        None,
        Some(serde_json::json!({"code": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["reason"], "not_found");

    // The status poll hides the difference between unknown and expired.
    let (status, body) = send_json(&app, "GET", "/api/connections/nope/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "expired");
}

#[tokio::test]
async fn full_pairing_and_checkin_flow() {
    let app = spawn_app().await;
    let caregiver_token = signup(&app, "kim.carer@example.com").await;

    // Device asks for a pairing code.
    let (status, body) = send_json(&app, "POST", "/api/connections", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let code = body["data"]["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 22);

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/connections/verify",
        None,
        Some(serde_json::json!({"code": code})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], true);

    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/connections/{code}/status"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");

    // Caregiver accepts, creating the dependent inline.
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/connections/accept",
        Some(&caregiver_token),
        Some(serde_json::json!({
            "code": code,
            "dependent": {"name": "Kim"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let dependent_id = body["data"]["dependent_id"].as_i64().unwrap();

    // Before any check-in the rolling state is the "never examined" sentinel.
    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/dependents/{dependent_id}/analyses/latest"),
        Some(&caregiver_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["state"].as_f64().unwrap() < 0.0);
    assert!(body["data"]["risk_score"].is_null());
    assert!(body["data"]["created_at"].is_string());

    // The device polls and finds the exchange secret.
    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/connections/{code}/status"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "connected");
    let auth_code = body["data"]["auth_code"].as_str().unwrap().to_string();
    assert_eq!(auth_code.len(), 40);

    // Exchange for a dependent token; the secret burns on use.
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/connections/exchange",
        None,
        Some(serde_json::json!({"code": code, "auth_code": auth_code})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let dependent_token = body["data"]["access_token"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["dependent_id"].as_i64().unwrap(), dependent_id);

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/connections/exchange",
        None,
        Some(serde_json::json!({"code": code, "auth_code": auth_code})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Open a voice session.
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/voice/sessions",
        Some(&dependent_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["data"]["session_id"].as_i64().unwrap();
    let session_token = body["data"]["token"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["expires_in"].as_i64().unwrap(), 3600);

    // Question list and download.
    let request = Request::builder()
        .uri(format!("/api/voice/sessions/{session_id}/questions"))
        .header("Authorization", format!("Bearer {dependent_token}"))
        .header("X-Session-Token", &session_token)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let files = body["data"]["files"].as_array().unwrap();
    let names: Vec<&str> = files
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["a1.wav", "a2.wav", "a3.wav"]);
    assert_eq!(
        files[0]["url"],
        format!("/api/voice/sessions/{session_id}/questions/a1.wav")
    );

    let request = Request::builder()
        .uri(format!("/api/voice/sessions/{session_id}/questions/a1.wav"))
        .header("Authorization", format!("Bearer {dependent_token}"))
        .header("X-Session-Token", &session_token)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "audio/wav"
    );

    // A missing question name is a 404, not an error page.
    let request = Request::builder()
        .uri(format!("/api/voice/sessions/{session_id}/questions/a9.wav"))
        .header("Authorization", format!("Bearer {dependent_token}"))
        .header("X-Session-Token", &session_token)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Submit two answers; the fixed analyzer scores both the same.
    let request = multipart_request(
        &format!("/api/voice/sessions/{session_id}/answers"),
        &dependent_token,
        &session_token,
        &[
            ("q1.wav", &b"RIFFanswer-one"[..]),
            ("q2.wav", &b"RIFFanswer-two"[..]),
        ],
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    let overall = body["data"]["overall_score"].as_f64().unwrap();
    assert!((overall - f64::from(FIXED_SCORE)).abs() < 1e-6);
    assert_eq!(body["data"]["risk_level"], "MEDIUM");
    // Max pick, tied scores: first occurrence wins.
    assert_eq!(body["data"]["representative"], "q1.wav");
    assert_eq!(body["data"]["files"].as_array().unwrap().len(), 2);

    // The session closed with the submission; a late retry sees no session.
    let request = multipart_request(
        &format!("/api/voice/sessions/{session_id}/answers"),
        &dependent_token,
        &session_token,
        &[("late.wav", &b"RIFFtoo-late"[..])],
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Caregiver sees the rolling verdict and one history row.
    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/dependents/{dependent_id}/analyses/latest"),
        Some(&caregiver_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let state_score = body["data"]["state"].as_f64().unwrap();
    assert!((state_score - f64::from(FIXED_SCORE)).abs() < 1e-6);
    let risk_score = body["data"]["risk_score"].as_f64().unwrap();
    assert!((risk_score - f64::from(FIXED_SCORE)).abs() < 1e-6);
    assert!(body["data"]["created_at"].is_string());

    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/dependents/{dependent_id}/analyses"),
        Some(&caregiver_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["analyses"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn prebound_code_flow() {
    let app = spawn_app().await;
    let caregiver_token = signup(&app, "owner@example.com").await;

    // Bootstrap a dependent through the device flow.
    let (_, body) = send_json(&app, "POST", "/api/connections", None, None).await;
    let code = body["data"]["code"].as_str().unwrap().to_string();
    let (_, body) = send_json(
        &app,
        "POST",
        "/api/connections/accept",
        Some(&caregiver_token),
        Some(serde_json::json!({"code": code, "dependent": {"name": "Lee"}})),
    )
    .await;
    let dependent_id = body["data"]["dependent_id"].as_i64().unwrap();

    // Mint a short pre-bound code for that dependent.
    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/api/dependents/{dependent_id}/pairing-code"),
        Some(&caregiver_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let short_code = body["data"]["code"].as_str().unwrap().to_string();
    assert_eq!(short_code.len(), 12);
    assert!(
        short_code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    );

    // Accepting a pre-bound code consumes it in one hop.
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/connections/accept",
        Some(&caregiver_token),
        Some(serde_json::json!({"code": short_code})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["dependent_id"].as_i64().unwrap(), dependent_id);

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/connections/verify",
        None,
        Some(serde_json::json!({"code": short_code})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reason"], "already_used");

    // Another caregiver cannot grab a dependent that is already linked.
    let other_token = signup(&app, "rival@example.com").await;
    let (_, body) = send_json(
        &app,
        "POST",
        &format!("/api/dependents/{dependent_id}/pairing-code"),
        Some(&caregiver_token),
        None,
    )
    .await;
    let second_code = body["data"]["code"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/connections/accept",
        Some(&other_token),
        Some(serde_json::json!({"code": second_code})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn dependents_are_scoped_to_their_caregiver() {
    let app = spawn_app().await;
    let owner = signup(&app, "scoped.owner@example.com").await;
    let stranger = signup(&app, "scoped.stranger@example.com").await;

    let (_, body) = send_json(&app, "POST", "/api/connections", None, None).await;
    let code = body["data"]["code"].as_str().unwrap().to_string();
    let (_, body) = send_json(
        &app,
        "POST",
        "/api/connections/accept",
        Some(&owner),
        Some(serde_json::json!({"code": code, "dependent": {"name": "Ava"}})),
    )
    .await;
    let dependent_id = body["data"]["dependent_id"].as_i64().unwrap();

    let (status, _) = send_json(
        &app,
        "GET",
        &format!("/api/dependents/{dependent_id}"),
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Other caregivers see a 404, not a 403: ownership is not probeable.
    let (status, _) = send_json(
        &app,
        "GET",
        &format!("/api/dependents/{dependent_id}"),
        Some(&stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
