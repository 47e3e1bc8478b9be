use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::util::ServiceExt;
use wiremock::matchers::{body_json as body_json_matcher, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{
    auth::UserTable,
    backend::{BackendClient, BackendTimeouts},
    cluster::{AddressTable, ReplicaAddr},
    dispatcher::Dispatcher,
    http::{AppState, build_router},
};

fn app(server: &MockServer, pool_size: usize) -> axum::Router {
    let table = AddressTable::try_from_replicas(&[ReplicaAddr {
        member_id: 1,
        base_url: server.uri(),
    }])
    .unwrap();
    let backend = BackendClient::try_new(Arc::new(table), BackendTimeouts::default()).unwrap();
    let dispatcher = Dispatcher::with_backend(backend, vec![1], pool_size);
    let users = UserTable::new(&["1:1".parse().unwrap(), "2:2".parse().unwrap()]);
    build_router(AppState {
        dispatcher: Arc::new(dispatcher),
        users: Arc::new(users),
    })
}

fn req(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn req_json(method: &str, uri: &str, value: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&value).unwrap()))
        .unwrap()
}

async fn body_json(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &axum::Router, user: &str, password: &str) -> axum::response::Response {
    app.clone()
        .oneshot(req_json(
            "POST",
            "/api/login",
            json!({"username": user, "password": password}),
        ))
        .await
        .unwrap()
}

async fn command(app: &axum::Router, session_id: usize, line: &str) -> axum::response::Response {
    app.clone()
        .oneshot(req_json(
            "POST",
            &format!("/api/sessions/{session_id}/commands"),
            json!({ "line": line }),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn login_allocates_lowest_free_session() {
    let server = MockServer::start().await;
    let app = app(&server, 2);

    let res = login(&app, "1", "1").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await, json!({"session_id": 0}));

    let res = login(&app, "2", "2").await;
    assert_eq!(body_json(res).await, json!({"session_id": 1}));

    let res = login(&app, "1", "1").await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(res).await["error"]["message"], "no id available");
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let server = MockServer::start().await;
    let app = app(&server, 2);

    let res = login(&app, "1", "wrong").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(res).await["error"]["code"], "unauthorized");

    let res = login(&app, "nobody", "1").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app.clone().oneshot(req("GET", "/api/health")).await.unwrap();
    assert_eq!(
        body_json(res).await,
        json!({"status": "ok", "sessions_in_use": 0, "pool_size": 2, "log_entries": 0})
    );
}

#[tokio::test]
async fn commands_require_a_logged_in_session() {
    let server = MockServer::start().await;
    let app = app(&server, 2);

    let res = command(&app, 0, "list").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], "not_found");
    assert_eq!(body["error"]["details"]["session_id"], 0);

    let res = command(&app, 99, "list").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_lines_are_usage_replies_not_http_errors() {
    let server = MockServer::start().await;
    let app = app(&server, 1);
    login(&app, "1", "1").await;

    let res = command(&app, 0, "put a").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["result"]["kind"], "invalid");
    assert_eq!(body["output"], "✗ wrong command format; usage: PUT key value");
    assert_eq!(body["closed"], false);

    let res = command(&app, 0, "foo").await;
    assert_eq!(body_json(res).await["result"]["kind"], "invalid");
}

#[tokio::test]
async fn put_then_get_through_the_front_door() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/read"))
        .and(body_json_matcher(json!("x")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Ok": "1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/write"))
        .and(body_json_matcher(json!({"Put": {"key": "x", "value": "2"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("Ok")))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server, 1);
    login(&app, "1", "1").await;

    let body = body_json(command(&app, 0, "PUT x 2").await).await;
    assert_eq!(
        body["result"],
        json!({
            "kind": "put",
            "key": "x",
            "value": "2",
            "action": "updated",
            "previous": "1",
            "ok": true
        })
    );
    assert_eq!(body["output"], "✓ updated x = 2 (was: 1)");

    let body = body_json(command(&app, 0, "get x").await).await;
    assert_eq!(body["result"], json!({"kind": "get", "key": "x", "value": "1"}));

    let body = body_json(command(&app, 0, "log").await).await;
    assert_eq!(
        body["result"]["entries"],
        json!([{"node_id": 0, "message": "updated key: x, value: 2"}])
    );

    let res = app.clone().oneshot(req("GET", "/api/health")).await.unwrap();
    let health = body_json(res).await;
    assert_eq!(health["sessions_in_use"], 1);
    assert_eq!(health["log_entries"], 1);
}

#[tokio::test]
async fn exit_closes_session_and_frees_the_id() {
    let server = MockServer::start().await;
    let app = app(&server, 1);
    login(&app, "1", "1").await;

    let body = body_json(command(&app, 0, "EXIT").await).await;
    assert_eq!(body["closed"], true);
    assert_eq!(body["output"], "client 0 logged out");

    let res = command(&app, 0, "list").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = login(&app, "2", "2").await;
    assert_eq!(body_json(res).await, json!({"session_id": 0}));
}

#[tokio::test]
async fn rejects_non_json_body() {
    let server = MockServer::start().await;
    let app = app(&server, 1);
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn non_numeric_session_id_uses_error_envelope() {
    let server = MockServer::start().await;
    let app = app(&server, 2);

    let res = app
        .clone()
        .oneshot(req_json(
            "POST",
            "/api/sessions/abc/commands",
            json!({ "line": "list" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], "invalid_request");
    assert!(body["error"]["message"].as_str().is_some_and(|m| !m.is_empty()));
}
