//! End-to-end HTTP behaviour through a running gateway.

use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use serde_json::{json, Value};

use api_gateway::config::RegistrySource;
use api_gateway::security::compute_hmac;

mod common;

use common::{config_for, spawn_gateway, MockBackend, SIGN};

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn get_with_sign_is_forwarded() {
    let backend = MockBackend::start().await;
    let gateway = spawn_gateway(config_for(&backend, &["reports"])).await;

    let response = client()
        .get(gateway.url("/api/v3/reports/daily?day=mon&empty="))
        .header("x-sign", SIGN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["lang"], "eng");
    assert_eq!(body["data"]["module"], "reports");
    assert_eq!(body["data"]["param"], "daily");
    assert_eq!(body["data"]["method"], "GET");
    assert_eq!(body["data"]["args"], json!({"day": "mon"}));
    // The backend sees the gateway's sign, not the client's header.
    assert_eq!(body["data"]["sign"], SIGN);
}

#[tokio::test]
async fn post_json_body_becomes_args() {
    let backend = MockBackend::start().await;
    let gateway = spawn_gateway(config_for(&backend, &["orders"])).await;

    let response = client()
        .post(gateway.url("/api/v1/orders"))
        .header("x-sign", SIGN)
        .json(&json!({"item": "book", "qty": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["args"], json!({"item": "book", "qty": 2}));
}

#[tokio::test]
async fn invalid_json_body_is_bad_request() {
    let backend = MockBackend::start().await;
    let gateway = spawn_gateway(config_for(&backend, &["orders"])).await;

    let response = client()
        .post(gateway.url("/api/v1/orders"))
        .header("x-sign", SIGN)
        .body("{broken")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(backend.state.calls().is_empty());
}

#[tokio::test]
async fn backend_httpcode_selects_status() {
    let backend = MockBackend::start().await;
    let gateway = spawn_gateway(config_for(&backend, &["orders"])).await;

    let response = client()
        .post(gateway.url("/api/v1/orders"))
        .header("x-sign", SIGN)
        .json(&json!({"httpcode": 409}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert!(body["data"].get("httpcode").is_none());
}

#[tokio::test]
async fn wrong_sign_is_unauthorized() {
    let backend = MockBackend::start().await;
    let gateway = spawn_gateway(config_for(&backend, &["reports"])).await;

    for sign in [Some("nope"), None] {
        let mut request = client().get(gateway.url("/api/v3/reports"));
        if let Some(sign) = sign {
            request = request.header("x-sign", sign);
        }
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "unauthorized");
        assert_eq!(body["httpcode"], 401);
    }
    assert!(backend.state.calls().is_empty());
}

#[tokio::test]
async fn unconfigured_security_rejects_everything() {
    let backend = MockBackend::start().await;
    let mut config = config_for(&backend, &["reports"]);
    config.security.mode = None;
    let gateway = spawn_gateway(config).await;

    for path in ["/api/v3/reports", "/api/v1/heartbeat", "/api/v1/info"] {
        let response = client()
            .get(gateway.url(path))
            .header("x-sign", SIGN)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{path}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "security_not_configured");
    }
    assert!(backend.state.calls().is_empty());
}

#[tokio::test]
async fn hmac_signature_is_accepted() {
    let backend = MockBackend::start().await;
    let mut config = config_for(&backend, &["reports"]);
    config.security.mode = Some("hmac".into());
    config.security.hmac_secret = Some("hmac-key".into());
    let gateway = spawn_gateway(config).await;

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
    let good = format!("{}:{now}", compute_hmac("hmac-key", "reports", now).unwrap());
    let response = client()
        .get(gateway.url("/api/v3/reports"))
        .header("x-sign", &good)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let wrong_module = format!("{}:{now}", compute_hmac("hmac-key", "billing", now).unwrap());
    let response = client()
        .get(gateway.url("/api/v3/reports"))
        .header("x-sign", &wrong_module)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The outbound sign is freshly computed for the backend.
    let forwarded = backend.state.calls()[0].sign.clone().unwrap();
    let (_, ts) = forwarded.split_once(':').unwrap();
    assert!(ts.parse::<i64>().unwrap() >= now);
}

#[tokio::test]
async fn unknown_module_is_unavailable() {
    let backend = MockBackend::start().await;
    let gateway = spawn_gateway(config_for(&backend, &["reports"])).await;

    let response = client()
        .get(gateway.url("/api/v3/ghost"))
        .header("x-sign", SIGN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "service_unavailable");
}

#[tokio::test]
async fn local_routes_need_no_backend() {
    let backend = MockBackend::start().await;
    let gateway = spawn_gateway(config_for(&backend, &[])).await;

    let response = client().get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client()
        .get(gateway.url("/api/v1/heartbeat"))
        .header("x-sign", SIGN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["leader"], true);
    assert_eq!(body["data"]["epoch"], 0);

    let response = client()
        .get(gateway.url("/api/v1/heartbeat"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client()
        .get(gateway.url("/api/v1/info"))
        .header("x-sign", SIGN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert!(body["data"]["version"]
        .as_str()
        .unwrap()
        .starts_with(env!("CARGO_PKG_VERSION")));

    let response = client()
        .get(gateway.url("/api/v1/entrypoint"))
        .header("x-sign", SIGN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client().get(gateway.url("/elsewhere")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(backend.state.calls().is_empty());
}

#[tokio::test]
async fn raw_put_is_streamed_upload() {
    let backend = MockBackend::start().await;
    let gateway = spawn_gateway(config_for(&backend, &["storage"])).await;

    let response = client()
        .put(gateway.url("/api/v1/storage/files"))
        .header("x-sign", SIGN)
        .header("x-filename", "notes.txt")
        .body(vec![b'a'; 70 * 1024])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["files"], 1);
    assert_eq!(body["data"]["bytes"], 70 * 1024);

    // start, 64 KiB, 6 KiB, end
    assert_eq!(backend.state.streamed().len(), 4);
}

#[tokio::test]
async fn multipart_put_uploads_each_file() {
    let backend = MockBackend::start().await;
    let gateway = spawn_gateway(config_for(&backend, &["storage"])).await;

    let form = reqwest::multipart::Form::new()
        .text("comment", "not a file")
        .part("a", reqwest::multipart::Part::bytes(vec![1u8; 10]).file_name("a.bin"))
        .part("b", reqwest::multipart::Part::bytes(vec![2u8; 20]).file_name("b.bin"));
    let response = client()
        .put(gateway.url("/api/v1/storage"))
        .header("x-sign", SIGN)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["files"], 2);
    assert_eq!(body["data"]["bytes"], 30);
    // Two files, each start + one chunk + end.
    assert_eq!(backend.state.streamed().len(), 6);
}

#[tokio::test]
async fn session_is_attached_to_forwarded_call() {
    let backend = MockBackend::start().await;
    backend
        .state
        .set_session(json!({"uid": "u-7", "isadmin": 0, "readonly": 0}));
    let mut config = config_for(&backend, &["reports", "sessionservice"]);
    config.session.enabled = true;
    let gateway = spawn_gateway(config).await;

    let response = client()
        .get(gateway.url("/api/v1/reports"))
        .header("x-sign", SIGN)
        .bearer_auth("tok-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["session"]["uid"], "u-7");
    assert_eq!(body["session"]["readonly"], 0);
    assert_eq!(body["data"]["uid"], "u-7");

    let calls = backend.state.calls();
    let check = &calls[0];
    assert_eq!(
        check.ir.as_ref().and_then(|ir| ir.param.as_deref()),
        Some("checksession")
    );
    assert_eq!(check.token.as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn readonly_session_is_refused_for_every_method() {
    let backend = MockBackend::start().await;
    backend
        .state
        .set_session(json!({"uid": "u-7", "isadmin": 0, "readonly": 1}));
    let mut config = config_for(&backend, &["reports", "sessionservice"]);
    config.session.enabled = true;
    let gateway = spawn_gateway(config).await;

    for method in [reqwest::Method::GET, reqwest::Method::POST, reqwest::Method::PUT] {
        let response = client()
            .request(method.clone(), gateway.url("/api/v1/reports"))
            .header("x-sign", SIGN)
            .bearer_auth("tok-1")
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{method}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "read_only");
    }

    // Only the three session checks reached a backend.
    let calls = backend.state.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.ir.is_some()));
    assert!(backend.state.streamed().is_empty());
}

#[tokio::test]
async fn no_token_skips_session_check() {
    let backend = MockBackend::start().await;
    let mut config = config_for(&backend, &["reports", "sessionservice"]);
    config.session.enabled = true;
    let gateway = spawn_gateway(config).await;

    let response = client()
        .get(gateway.url("/api/v1/reports"))
        .header("x-sign", SIGN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert!(body.get("session").is_none());
    assert_eq!(backend.state.calls().len(), 1);
}

#[tokio::test]
async fn options_answers_with_cors_headers() {
    let backend = MockBackend::start().await;
    let gateway = spawn_gateway(config_for(&backend, &["reports"])).await;

    for path in ["/api/v1/reports", "/elsewhere"] {
        let response = client()
            .request(reqwest::Method::OPTIONS, gateway.url(path))
            .header("origin", "https://app.example")
            .header("access-control-request-method", "POST")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT, "{path}");
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert!(headers["access-control-allow-methods"]
            .to_str()
            .unwrap()
            .contains("PUT"));
        assert!(headers["access-control-allow-headers"]
            .to_str()
            .unwrap()
            .contains("Authorization"));
    }

    let response = client()
        .get(gateway.url("/api/v1/reports"))
        .header("x-sign", SIGN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["server"], "api-gateway");
    assert_eq!(backend.state.calls().len(), 1);
}

#[tokio::test]
async fn heartbeat_is_relayed_to_coordinator() {
    let backend = MockBackend::start().await;
    let mut config = config_for(&backend, &["masterservice"]);
    config.registry.mode = RegistrySource::Coordinator;
    let gateway = spawn_gateway(config).await;

    let response = client()
        .post(gateway.url("/api/v1/heartbeat"))
        .header("x-sign", SIGN)
        .json(&json!({"node": "n1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["leader"], false);
    assert_eq!(body["data"]["epoch"], 3);
    assert!(body["data"]["seen_ts"].as_u64().is_some());

    let calls = backend.state.calls();
    assert_eq!(calls.len(), 1);
    let beat = &calls[0];
    assert_eq!(beat.module.as_deref(), Some("masterservice"));
    assert_eq!(beat.sign.as_deref(), Some(SIGN));
    let ir = beat.ir.as_ref().unwrap();
    assert_eq!(ir.param.as_deref(), Some("heartbeat"));
    assert_eq!(ir.method.as_deref(), Some("POST"));

    let response = client()
        .post(gateway.url("/api/v1/heartbeat"))
        .header("x-sign", SIGN)
        .json(&json!({"fail": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "heartbeat_failed");
}
