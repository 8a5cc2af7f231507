//! Races and edge cases around pairing-code and session state transitions.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use carelink::config::Config;
use http_body_util::BodyExt;
use tower::ServiceExt;

fn scratch_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("carelink-pairing-{}", uuid::Uuid::new_v4()))
}

fn test_config(scratch: &std::path::Path) -> Config {
    let questions_root = scratch.join("questions");
    std::fs::create_dir_all(&questions_root).expect("failed to create questions dir");
    std::fs::write(questions_root.join("a1.wav"), b"RIFF....WAVEfake").unwrap();

    let mut config = Config::default();
    config.general.database_path =
        format!("sqlite:{}", scratch.join("carelink-test.db").display());
    config.analyzer.mode = "fixed".to_string();
    config.analyzer.fixed_score = 0.2;
    config.voice.questions_root = questions_root.display().to_string();
    config.voice.media_root = scratch.join("media").display().to_string();
    config
}

async fn spawn_app_with(config: Config) -> Router {
    let state = carelink::api::create_app_state_from_config(config, None)
        .await
        .expect("failed to create app state");
    carelink::api::router(state)
}

async fn spawn_app() -> Router {
    spawn_app_with(test_config(&scratch_dir())).await
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
            .header("Content-Type", "application/json")
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

/// Device flow up to a usable dependent token.
async fn pair_dependent(app: &Router, caregiver_token: &str, name: &str) -> (i64, String) {
    let (_, body) = send_json(app, "POST", "/api/connections", None, None).await;
    let code = body["data"]["code"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        app,
        "POST",
        "/api/connections/accept",
        Some(caregiver_token),
        Some(serde_json::json!({"code": code, "dependent": {"name": name}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let dependent_id = body["data"]["dependent_id"].as_i64().unwrap();

    let (_, body) = send_json(
        app,
        "GET",
        &format!("/api/connections/{code}/status"),
        None,
        None,
    )
    .await;
    let auth_code = body["data"]["auth_code"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        app,
        "POST",
        "/api/connections/exchange",
        None,
        Some(serde_json::json!({"code": code, "auth_code": auth_code})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["access_token"].as_str().unwrap().to_string();

    (dependent_id, token)
}

#[tokio::test]
async fn concurrent_accepts_have_exactly_one_winner() {
    let app = spawn_app().await;
    let first = signup(&app, "race.one@example.com").await;
    let second = signup(&app, "race.two@example.com").await;

    let (_, body) = send_json(&app, "POST", "/api/connections", None, None).await;
    let code = body["data"]["code"].as_str().unwrap().to_string();

    let accept = |token: String, name: &'static str| {
        let app = app.clone();
        let code = code.clone();
        async move {
            send_json(
                &app,
                "POST",
                "/api/connections/accept",
                Some(&token),
                Some(serde_json::json!({"code": code, "dependent": {"name": name}})),
            )
            .await
            .0
        }
    };

    let (a, b) = tokio::join!(accept(first, "Racer A"), accept(second, "Racer B"));

    let winners = [a, b]
        .iter()
        .filter(|s| **s == StatusCode::OK)
        .count();
    assert_eq!(winners, 1, "exactly one accept must win, got {a} and {b}");

    let loser = if a == StatusCode::OK { b } else { a };
    assert_eq!(loser, StatusCode::CONFLICT);
}

#[tokio::test]
async fn exchange_requires_the_right_secret() {
    let app = spawn_app().await;
    let caregiver = signup(&app, "secret@example.com").await;

    let (_, body) = send_json(&app, "POST", "/api/connections", None, None).await;
    let code = body["data"]["code"].as_str().unwrap().to_string();

    send_json(
        &app,
        "POST",
        "/api/connections/accept",
        Some(&caregiver),
        Some(serde_json::json!({"code": code, "dependent": {"name": "Sam"}})),
    )
    .await;

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/connections/exchange",
        None,
        Some(serde_json::json!({"code": code, "auth_code": "wrong-secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The failed attempt did not burn the code.
    let (_, body) = send_json(
        &app,
        "GET",
        &format!("/api/connections/{code}/status"),
        None,
        None,
    )
    .await;
    assert_eq!(body["data"]["status"], "connected");
}

#[tokio::test]
async fn accepting_a_pending_code_twice_conflicts() {
    let app = spawn_app().await;
    let caregiver = signup(&app, "twice@example.com").await;

    let (_, body) = send_json(&app, "POST", "/api/connections", None, None).await;
    let code = body["data"]["code"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/connections/accept",
        Some(&caregiver),
        Some(serde_json::json!({"code": code, "dependent": {"name": "Once"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/connections/accept",
        Some(&caregiver),
        Some(serde_json::json!({"code": code, "dependent": {"name": "Twice"}})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn accept_without_dependent_info_is_a_validation_error() {
    let app = spawn_app().await;
    let caregiver = signup(&app, "missing@example.com").await;

    let (_, body) = send_json(&app, "POST", "/api/connections", None, None).await;
    let code = body["data"]["code"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/connections/accept",
        Some(&caregiver),
        Some(serde_json::json!({"code": code})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_close_is_idempotent() {
    let app = spawn_app().await;
    let caregiver = signup(&app, "closer@example.com").await;
    let (_, dependent_token) = pair_dependent(&app, &caregiver, "Closer").await;

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

    for _ in 0..2 {
        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/api/voice/sessions/{session_id}"))
            .header("Authorization", format!("Bearer {dependent_token}"))
            .header("X-Session-Token", &session_token)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // A closed session reads the same as one that never existed.
    let request = Request::builder()
        .uri(format!("/api/voice/sessions/{session_id}/questions"))
        .header("Authorization", format!("Bearer {dependent_token}"))
        .header("X-Session-Token", &session_token)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wrong_session_secret_reads_as_not_found() {
    let app = spawn_app().await;
    let caregiver = signup(&app, "probe@example.com").await;
    let (_, dependent_token) = pair_dependent(&app, &caregiver, "Probe").await;

    let (_, body) = send_json(
        &app,
        "POST",
        "/api/voice/sessions",
        Some(&dependent_token),
        None,
    )
    .await;
    let session_id = body["data"]["session_id"].as_i64().unwrap();

    let request = Request::builder()
        .uri(format!("/api/voice/sessions/{session_id}/questions"))
        .header("Authorization", format!("Bearer {dependent_token}"))
        .header("X-Session-Token", "guessed-secret")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sessions_are_scoped_to_their_dependent() {
    let app = spawn_app().await;
    let caregiver = signup(&app, "scope@example.com").await;
    let (_, token_a) = pair_dependent(&app, &caregiver, "Dep A").await;
    let (_, token_b) = pair_dependent(&app, &caregiver, "Dep B").await;

    let (_, body) = send_json(&app, "POST", "/api/voice/sessions", Some(&token_a), None).await;
    let session_id = body["data"]["session_id"].as_i64().unwrap();
    let session_token = body["data"]["token"].as_str().unwrap().to_string();

    // Dependent B cannot reach A's session even with the right secret.
    let request = Request::builder()
        .uri(format!("/api/voice/sessions/{session_id}/questions"))
        .header("Authorization", format!("Bearer {token_b}"))
        .header("X-Session-Token", &session_token)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tombstoned_dependent_loses_access() {
    let app = spawn_app().await;
    let caregiver = signup(&app, "bye@example.com").await;
    let (dependent_id, dependent_token) = pair_dependent(&app, &caregiver, "Bye").await;

    let (status, _) = send_json(
        &app,
        "DELETE",
        &format!("/api/dependents/{dependent_id}"),
        Some(&caregiver),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The still-valid token dies with the record.
    let (status, _) = send_json(
        &app,
        "POST",
        "/api/voice/sessions",
        Some(&dependent_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn successful_submission_leaves_no_staged_files() {
    let scratch = scratch_dir();
    let app = spawn_app_with(test_config(&scratch)).await;
    let caregiver = signup(&app, "staging@example.com").await;
    let (_, dependent_token) = pair_dependent(&app, &caregiver, "Stager").await;

    let (_, body) = send_json(
        &app,
        "POST",
        "/api/voice/sessions",
        Some(&dependent_token),
        None,
    )
    .await;
    let session_id = body["data"]["session_id"].as_i64().unwrap();
    let session_token = body["data"]["token"].as_str().unwrap().to_string();

    let request = multipart_request(
        &format!("/api/voice/sessions/{session_id}/answers"),
        &dependent_token,
        &session_token,
        &[("q1.wav", &b"RIFFanswer"[..])],
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The per-session staging directory is gone even though the
    // submission succeeded; only the kept recording survives.
    let staging = scratch.join("media").join(format!("session-{session_id}"));
    assert!(!staging.exists());

    let recording = scratch
        .join("media")
        .join("recordings")
        .join(format!("session-{session_id}-answer.wav"));
    assert!(recording.exists());
}

#[tokio::test]
async fn expired_codes_fail_at_read_time() {
    let scratch = scratch_dir();
    let mut config = test_config(&scratch);
    // Codes are born past their TTL; the stored status still says PENDING.
    config.pairing.code_ttl_minutes = -1;
    let app = spawn_app_with(config).await;
    let caregiver = signup(&app, "stale@example.com").await;

    let (_, body) = send_json(&app, "POST", "/api/connections", None, None).await;
    let code = body["data"]["code"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/connections/verify",
        None,
        Some(serde_json::json!({"code": code})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["reason"], "expired");

    let (_, body) = send_json(
        &app,
        "GET",
        &format!("/api/connections/{code}/status"),
        None,
        None,
    )
    .await;
    assert_eq!(body["data"]["status"], "expired");

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/connections/accept",
        Some(&caregiver),
        Some(serde_json::json!({"code": code, "dependent": {"name": "Late"}})),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/connections/exchange",
        None,
        Some(serde_json::json!({"code": code, "auth_code": "whatever"})),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn dependent_tokens_are_rejected_on_caregiver_routes() {
    let app = spawn_app().await;
    let caregiver = signup(&app, "kinds@example.com").await;
    let (dependent_id, dependent_token) = pair_dependent(&app, &caregiver, "Kind").await;

    let (status, _) = send_json(&app, "GET", "/api/auth/me", Some(&dependent_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send_json(
        &app,
        "GET",
        &format!("/api/dependents/{dependent_id}/analyses/latest"),
        Some(&dependent_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn in_flight_submission_conflicts() {
    let scratch = scratch_dir();
    let config = test_config(&scratch);
    let db_url = config.general.database_path.clone();
    let app = spawn_app_with(config).await;
    let caregiver = signup(&app, "busy@example.com").await;
    let (dependent_id, dependent_token) = pair_dependent(&app, &caregiver, "Busy").await;
    let dependent_id = i32::try_from(dependent_id).unwrap();

    let (_, body) = send_json(
        &app,
        "POST",
        "/api/voice/sessions",
        Some(&dependent_token),
        None,
    )
    .await;
    let session_id = i32::try_from(body["data"]["session_id"].as_i64().unwrap()).unwrap();
    let session_token = body["data"]["token"].as_str().unwrap().to_string();

    // Take the processing claim out from under the router, the way a
    // concurrent submission would.
    let store = carelink::db::Store::new(&db_url).await.unwrap();
    assert!(
        store
            .session_repo()
            .claim_processing(session_id, dependent_id)
            .await
            .unwrap()
    );
    // A second claim on the same session always loses.
    assert!(
        !store
            .session_repo()
            .claim_processing(session_id, dependent_id)
            .await
            .unwrap()
    );

    let request = multipart_request(
        &format!("/api/voice/sessions/{session_id}/answers"),
        &dependent_token,
        &session_token,
        &[("q1.wav", &b"RIFFanswer"[..])],
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn relink_never_steals_a_linked_dependent() {
    let scratch = scratch_dir();
    let config = test_config(&scratch);
    let db_url = config.general.database_path.clone();
    let app = spawn_app_with(config).await;

    let owner = signup(&app, "relink.owner@example.com").await;
    let rival = signup(&app, "relink.rival@example.com").await;
    let (dependent_id, _) = pair_dependent(&app, &owner, "Held").await;
    let dependent_id = i32::try_from(dependent_id).unwrap();

    let (_, body) = send_json(&app, "GET", "/api/auth/me", Some(&owner), None).await;
    let owner_id = i32::try_from(body["data"]["id"].as_i64().unwrap()).unwrap();
    let (_, body) = send_json(&app, "GET", "/api/auth/me", Some(&rival), None).await;
    let rival_id = i32::try_from(body["data"]["id"].as_i64().unwrap()).unwrap();

    let store = carelink::db::Store::new(&db_url).await.unwrap();
    let repo = store.dependent_repo();

    // The guarded update refuses to move a linked dependent to someone
    // else, but stays idempotent for the current caregiver.
    assert!(!repo.relink_caregiver(dependent_id, rival_id).await.unwrap());
    assert!(repo.relink_caregiver(dependent_id, owner_id).await.unwrap());

    let dep = store.get_dependent(dependent_id).await.unwrap().unwrap();
    assert_eq!(dep.caregiver_id, Some(owner_id));
}
