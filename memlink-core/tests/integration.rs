//! End-to-end tests against an in-process mock of the memory backend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use memlink_core::config::BackendConfig;
use memlink_core::extract::{Extractor, HtmlFile};
use memlink_core::relay::{ContentService, Relay, TabRegistry};
use memlink_core::{Controller, ControllerState, Error, Session, SyncClient};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: String,
    path: String,
    query: Option<String>,
    authorization: Option<String>,
    body: String,
}

impl RecordedRequest {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("request body is not JSON")
    }
}

/// Canned responses keyed by `"METHOD /path"`; everything else is a 404.
#[derive(Default)]
struct MockBackend {
    routes: Mutex<HashMap<String, (u16, String)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockBackend {
    fn respond(&self, route: &str, status: u16, body: Value) {
        self.respond_raw(route, status, &body.to_string());
    }

    fn respond_raw(&self, route: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(route.to_string(), (status, body.to_string()));
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn mock_handler(
    State(backend): State<Arc<MockBackend>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    backend.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    let key = format!("{} {}", method, uri.path());
    match backend.routes.lock().unwrap().get(&key) {
        Some((status, body)) => (
            StatusCode::from_u16(*status).unwrap(),
            body.clone(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            json!({"detail": "Not Found"}).to_string(),
        ),
    }
}

async fn start_backend() -> (Arc<MockBackend>, String) {
    let backend = Arc::new(MockBackend::default());
    let app = Router::new()
        .fallback(mock_handler)
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (backend, format!("http://{addr}"))
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

struct Harness {
    backend: Arc<MockBackend>,
    session: Session,
    tabs: Arc<TabRegistry>,
    controller: Controller,
}

impl Harness {
    async fn new() -> Self {
        Self::with_session(Session::in_memory()).await
    }

    async fn with_session(session: Session) -> Self {
        memlink_core::logging::init_test();
        let (backend, base_url) = start_backend().await;
        let client = SyncClient::new(&BackendConfig::with_base_url(base_url), session.clone())
            .expect("client");
        let tabs = Arc::new(TabRegistry::new());
        let (relay, _handle) = Relay::new(tabs.clone()).spawn();
        let controller = Controller::new(session.clone(), client, relay);
        Self {
            backend,
            session,
            tabs,
            controller,
        }
    }

    /// Open a tab showing `page` with a listening content service.
    fn open_page(&self, page: &str) {
        let (content, _handle) = ContentService::new(Arc::new(HtmlFile::new(fixture(page)))).spawn();
        self.tabs
            .open_tab(format!("https://chat.example/{page}"), Some(content));
    }

    /// Log in, load two projects and select project 1.
    async fn logged_in_with_project(&mut self) {
        self.backend.respond(
            "POST /auth/login",
            200,
            json!({"access_token": "tok-123", "token_type": "bearer"}),
        );
        self.backend.respond(
            "GET /projects",
            200,
            json!([{"id": 1, "name": "Rust notes"}, {"id": 2, "name": "Recipes"}]),
        );
        self.controller.login("me@example.com", "hunter2").await.unwrap();
        self.controller.load_projects().await.unwrap();
        self.controller.select_project(1).unwrap();
    }
}

#[tokio::test]
async fn test_login_stores_token_and_authorizes_later_calls() {
    let mut h = Harness::new().await;
    h.backend.respond(
        "POST /auth/login",
        200,
        json!({"access_token": "tok-123", "token_type": "bearer"}),
    );
    h.backend.respond("GET /projects", 200, json!([]));

    h.controller.login(" me@example.com ", "hunter2").await.unwrap();
    assert_eq!(h.controller.state(), ControllerState::LoggedIn);
    assert_eq!(h.session.get_token().as_deref(), Some("tok-123"));

    h.controller.load_projects().await.unwrap();

    let login = &h.backend.requests_to("/auth/login")[0];
    assert_eq!(login.method, "POST");
    assert!(login.authorization.is_none());
    assert_eq!(
        login.json(),
        json!({"email": "me@example.com", "password": "hunter2"})
    );

    let projects = &h.backend.requests_to("/projects")[0];
    assert_eq!(projects.authorization.as_deref(), Some("Bearer tok-123"));
}

#[tokio::test]
async fn test_login_without_access_token_stays_logged_out() {
    let mut h = Harness::new().await;
    h.backend.respond("POST /auth/login", 200, json!({}));

    let err = h.controller.login("me@example.com", "pw").await.unwrap_err();
    assert!(matches!(err, Error::MissingAccessToken));
    assert_eq!(h.controller.state(), ControllerState::LoggedOut);
    assert!(h.session.get_token().is_none());
}

#[tokio::test]
async fn test_login_server_error_reports_detail() {
    let mut h = Harness::new().await;
    h.backend
        .respond("POST /auth/login", 500, json!({"detail": "database down"}));

    let err = h.controller.login("me@example.com", "pw").await.unwrap_err();
    match err {
        Error::Http { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "database down");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
    assert!(h.session.get_token().is_none());
}

#[tokio::test]
async fn test_wrong_credentials_do_not_create_session() {
    let mut h = Harness::new().await;
    h.backend.respond(
        "POST /auth/login",
        401,
        json!({"detail": "Incorrect email or password"}),
    );

    let err = h.controller.login("me@example.com", "nope").await.unwrap_err();
    assert!(matches!(err, Error::LoginRejected { .. }));
    assert_eq!(
        err.user_message(),
        "Login failed: Incorrect email or password"
    );
    assert_eq!(h.controller.state(), ControllerState::LoggedOut);
    assert!(h.session.get_token().is_none());
}

#[tokio::test]
async fn test_rejected_registration_reports_login_failure() {
    let mut h = Harness::new().await;
    h.backend.respond(
        "POST /auth/register",
        401,
        json!({"message": "Email already registered"}),
    );

    let err = h.controller.register("me@example.com", "pw").await.unwrap_err();
    assert_eq!(err.user_message(), "Login failed: Email already registered");
    assert!(!h.controller.is_logged_in());
}

#[tokio::test]
async fn test_register_logs_in() {
    let mut h = Harness::new().await;
    h.backend.respond(
        "POST /auth/register",
        200,
        json!({"access_token": "fresh", "token_type": "bearer"}),
    );

    h.controller.register("new@example.com", "pw").await.unwrap();
    assert!(h.controller.is_logged_in());
    assert_eq!(h.session.get_token().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_malformed_projects_are_dropped() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.backend.respond(
        "GET /projects",
        200,
        json!([{"id": 1, "name": "A"}, null, {"id": 2}, {"id": 3, "name": "C"}]),
    );

    let projects = h.controller.load_projects().await.unwrap().to_vec();
    let summary: Vec<(i64, &str)> = projects.iter().map(|p| (p.id, p.name.as_str())).collect();
    assert_eq!(summary, vec![(1, "A"), (3, "C")]);

    // Project 2 is no longer selectable
    assert!(matches!(
        h.controller.select_project(2),
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_projects_response_that_is_not_a_list_is_invalid() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.backend
        .respond("GET /projects", 200, json!({"projects": []}));

    let err = h.controller.load_projects().await.unwrap_err();
    assert!(matches!(err, Error::InvalidResponse(_)));
    // Previous list survives a failed load
    assert_eq!(h.controller.projects().len(), 2);
}

#[tokio::test]
async fn test_non_json_success_body_is_invalid_response() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.backend.respond_raw("GET /projects", 200, "<html>proxy</html>");

    let err = h.controller.load_projects().await.unwrap_err();
    assert!(matches!(err, Error::InvalidResponse(_)));
    assert!(h.controller.is_logged_in());
}

#[tokio::test]
async fn test_plain_text_error_body_is_used_as_message() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.backend
        .respond_raw("GET /projects", 502, "upstream unavailable");

    match h.controller.load_projects().await.unwrap_err() {
        Error::Http { status, message } => {
            assert_eq!(status, 502);
            assert_eq!(message, "upstream unavailable");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_startup_validates_stored_token() {
    let session = Session::in_memory();
    session.set_token("stored").unwrap();
    let mut h = Harness::with_session(session).await;
    h.backend
        .respond("GET /projects", 200, json!([{"id": 7, "name": "Kept"}]));

    assert_eq!(h.controller.startup().await, ControllerState::LoggedIn);
    assert_eq!(h.controller.projects().len(), 1);
    assert_eq!(
        h.backend.requests_to("/projects")[0].authorization.as_deref(),
        Some("Bearer stored")
    );
}

#[tokio::test]
async fn test_startup_with_rejected_token_logs_out_silently() {
    let session = Session::in_memory();
    session.set_token("expired").unwrap();
    let mut h = Harness::with_session(session).await;
    h.backend
        .respond("GET /projects", 401, json!({"detail": "Token expired"}));

    assert_eq!(h.controller.startup().await, ControllerState::LoggedOut);
    assert!(h.session.get_token().is_none());
}

#[tokio::test]
async fn test_startup_with_unreachable_backend_clears_token() {
    let session = Session::in_memory();
    session.set_token("stored").unwrap();
    let client = SyncClient::new(&BackendConfig::with_base_url("http://127.0.0.1:9"), session.clone())
        .unwrap();
    let (relay, _handle) = Relay::new(Arc::new(TabRegistry::new())).spawn();
    let mut controller = Controller::new(session.clone(), client, relay);

    assert_eq!(controller.startup().await, ControllerState::LoggedOut);
    assert!(session.get_token().is_none());
}

#[tokio::test]
async fn test_capture_and_save_sends_rendered_transcript() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.open_page("conversation.html");
    h.backend.respond(
        "POST /conversations/save",
        200,
        json!({"id": 42, "created_at": "2024-05-01T12:00:00", "raw_content": "saved"}),
    );

    let record = h.controller.capture_and_save().await.unwrap();
    assert_eq!(record.id, 42);
    assert!(record.created_at_utc().is_some());

    let expected = Extractor::new()
        .extract_from(&HtmlFile::new(fixture("conversation.html")))
        .unwrap()
        .render();

    let save = &h.backend.requests_to("/conversations/save")[0];
    assert_eq!(save.authorization.as_deref(), Some("Bearer tok-123"));
    let body = save.json();
    assert_eq!(body["project_id"], json!(1));
    let raw_content = body["raw_content"].as_str().unwrap();
    assert_eq!(raw_content, expected.trim());

    assert!(raw_content.starts_with("USER:\nHow do I reverse a list in Rust?\n\nASSISTANT:\n"));
    assert!(raw_content.contains("v.reverse();"));
    assert!(raw_content.ends_with("USER:\nThanks!"));
    assert!(!raw_content.contains("helpful assistant"));
    assert!(!raw_content.contains("__state"));
}

#[tokio::test]
async fn test_short_transcript_is_rejected_before_network() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.open_page("short.html");

    let err = h.controller.capture_and_save().await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(h.backend.requests_to("/conversations/save").is_empty());
}

#[tokio::test]
async fn test_capture_on_wrong_page_is_extraction_empty() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.open_page("login.html");

    let err = h.controller.capture_and_save().await.unwrap_err();
    assert!(matches!(err, Error::ExtractionEmpty));
    assert_eq!(
        err.user_message(),
        "Could not extract conversation. Are you on the right page?"
    );
    assert!(h.backend.requests_to("/conversations/save").is_empty());
}

#[tokio::test]
async fn test_capture_without_tab_or_content_service() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;

    let err = h.controller.capture_and_save().await.unwrap_err();
    assert!(matches!(err, Error::RelayUnavailable(_)));

    h.tabs.open_tab("https://news.example", None);
    let err = h.controller.capture_and_save().await.unwrap_err();
    assert!(matches!(err, Error::RelayUnavailable(_)));
    assert!(h.backend.requests_to("/conversations/save").is_empty());
}

#[tokio::test]
async fn test_capture_requires_selected_project() {
    let mut h = Harness::new().await;
    h.backend.respond(
        "POST /auth/login",
        200,
        json!({"access_token": "tok", "token_type": "bearer"}),
    );
    h.controller.login("me@example.com", "pw").await.unwrap();
    h.open_page("conversation.html");

    let err = h.controller.capture_and_save().await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

fn assert_logged_out_everywhere(h: &Harness) {
    assert!(h.session.get_token().is_none());
    assert_eq!(h.controller.state(), ControllerState::LoggedOut);
    assert!(h.controller.selected_project().is_none());
    assert!(h.controller.projects().is_empty());
}

#[tokio::test]
async fn test_rejected_token_on_load_projects_logs_everything_out() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.backend
        .respond("GET /projects", 401, json!({"detail": "Token expired"}));

    let err = h.controller.load_projects().await.unwrap_err();
    assert!(err.is_auth_rejected());
    assert_logged_out_everywhere(&h);
}

#[tokio::test]
async fn test_rejected_token_on_list_conversations_logs_everything_out() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.backend
        .respond("GET /conversations", 401, json!({"detail": "Token expired"}));

    let err = h.controller.list_conversations().await.unwrap_err();
    assert!(err.is_auth_rejected());
    assert_logged_out_everywhere(&h);
}

#[tokio::test]
async fn test_rejected_token_on_create_project_logs_everything_out() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.backend
        .respond("POST /projects/create", 401, json!({"detail": "Token expired"}));

    let err = h.controller.create_project("Papers").await.unwrap_err();
    assert!(err.is_auth_rejected());
    assert_logged_out_everywhere(&h);
}

#[tokio::test]
async fn test_rejected_token_on_save_logs_everything_out() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.open_page("conversation.html");
    h.backend.respond(
        "POST /conversations/save",
        401,
        json!({"detail": "Invalid token"}),
    );

    let err = h.controller.capture_and_save().await.unwrap_err();
    match &err {
        Error::AuthRejected { message } => assert_eq!(message, "Invalid token"),
        other => panic!("expected AuthRejected, got {other:?}"),
    }
    assert!(h.session.get_token().is_none());
    assert_eq!(h.controller.state(), ControllerState::LoggedOut);
    assert!(h.controller.selected_project().is_none());
    assert!(h.controller.projects().is_empty());
}

#[tokio::test]
async fn test_rejected_token_on_query_clears_session() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.backend
        .respond("POST /memory/context", 401, json!({"message": "expired"}));

    let err = h.controller.query_memory("rust").await.unwrap_err();
    assert!(err.is_auth_rejected());
    assert!(h.session.get_token().is_none());
    assert!(!h.controller.is_logged_in());
}

#[tokio::test]
async fn test_query_memory() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.backend.respond(
        "POST /memory/context",
        200,
        json!({
            "project_id": 1,
            "query": "reverse",
            "total_scanned": 3,
            "context_blocks": [
                {"score": 0.92, "raw_content": "USER:\nHow do I reverse a list?\n", "conversation_id": 42},
                {"score": 0.40, "raw_content": "USER:\nSomething else\n"}
            ]
        }),
    );

    let result = h.controller.query_memory("  reverse  ").await.unwrap();
    assert_eq!(result.total_scanned, 3);
    assert_eq!(result.context_blocks.len(), 2);
    assert_eq!(result.context_blocks[0].conversation_id, Some(42));

    let body = h.backend.requests_to("/memory/context")[0].json();
    assert_eq!(body, json!({"project_id": 1, "query": "reverse"}));
}

#[tokio::test]
async fn test_blank_query_is_rejected_before_network() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;

    let err = h.controller.query_memory("   ").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(h.backend.requests_to("/memory/context").is_empty());
}

#[tokio::test]
async fn test_create_project_and_list_conversations() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;
    h.backend.respond(
        "POST /projects/create",
        200,
        json!({"id": 9, "name": "Papers", "created_at": "2024-05-01T12:00:00"}),
    );
    h.backend.respond(
        "GET /conversations",
        200,
        json!([
            {"id": 1, "created_at": "2024-05-01T12:00:00Z", "raw_content": "USER:\nhi\n"},
            {"created_at": "missing id"}
        ]),
    );

    let project = h.controller.create_project("  Papers ").await.unwrap();
    assert_eq!(project.id, 9);
    assert!(h.controller.projects().iter().any(|p| p.id == 9));
    assert_eq!(
        h.backend.requests_to("/projects/create")[0].json(),
        json!({"name": "Papers"})
    );

    h.controller.select_project(9).unwrap();
    let conversations = h.controller.list_conversations().await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(
        h.backend.requests_to("/conversations")[0].query.as_deref(),
        Some("project_id=9")
    );
}

#[tokio::test]
async fn test_logout_then_login_again() {
    let mut h = Harness::new().await;
    h.logged_in_with_project().await;

    h.controller.logout();
    assert!(h.session.get_token().is_none());
    assert!(h.controller.selected_project().is_none());

    let before = h.backend.requests().len();
    assert!(matches!(
        h.controller.query_memory("rust").await,
        Err(Error::Validation(_))
    ));
    assert_eq!(h.backend.requests().len(), before);

    h.controller.login("me@example.com", "hunter2").await.unwrap();
    assert!(h.controller.is_logged_in());
}

#[tokio::test]
async fn test_session_survives_in_token_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let mut h = Harness::with_session(Session::file(&path)).await;
    h.logged_in_with_project().await;

    let stored: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored, json!({"access_token": "tok-123"}));

    // A fresh session over the same file sees the token
    assert_eq!(Session::file(&path).get_token().as_deref(), Some("tok-123"));

    h.controller.logout();
    assert!(Session::file(&path).get_token().is_none());
}
