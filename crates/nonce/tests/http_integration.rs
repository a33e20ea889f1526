use pedigree_nonce::{
    CheckNonceRequest, IssuedNonce, NonceAuthority, NonceConfig, NonceState, create_router,
    register_nonce_metrics,
};
use prometheus::Registry;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;

struct TestServer {
    base_url: String,
    authority: Arc<NonceAuthority>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_test_server() -> TestServer {
    let authority = Arc::new(NonceAuthority::new(&NonceConfig::default()));
    let registry = Registry::new();
    register_nonce_metrics(&registry).expect("Failed to register metrics");
    let app = create_router(NonceState::new(authority.clone(), registry));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to read bound addr");
    let base_url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("Nonce test server exited unexpectedly");
    });

    TestServer {
        base_url,
        authority,
        handle,
    }
}

async fn issue_via_http(client: &reqwest::Client, base_url: &str) -> IssuedNonce {
    let resp = client
        .post(format!("{base_url}/auth/nonce"))
        .send()
        .await
        .expect("issue request failed");
    assert_eq!(resp.status(), StatusCode::OK);

    let json: Value = resp.json().await.expect("issue response should parse");
    IssuedNonce {
        nonce_id: json["nonce_id"].as_str().unwrap().to_string(),
        raw_nonce: json["raw_nonce"].as_str().unwrap().to_string(),
        hashed_nonce: json["hashed_nonce"].as_str().unwrap().to_string(),
    }
}

async fn check_via_http(
    client: &reqwest::Client,
    base_url: &str,
    request: &CheckNonceRequest,
) -> StatusCode {
    client
        .post(format!("{base_url}/auth/nonce/check"))
        .json(request)
        .send()
        .await
        .expect("check request failed")
        .status()
}

#[tokio::test]
async fn test_http_login_nonce_lifecycle() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let issued = issue_via_http(&client, &server.base_url).await;
    assert_eq!(issued.nonce_id.len(), 32);
    assert_eq!(issued.raw_nonce.len(), 64);

    let request = CheckNonceRequest {
        nonce_id: Some(issued.nonce_id.clone()),
        raw_nonce: Some(issued.raw_nonce.clone()),
    };
    assert_eq!(
        check_via_http(&client, &server.base_url, &request).await,
        StatusCode::NO_CONTENT
    );

    // 登录完成端点在身份断言验证通过后消费 nonce
    server.authority.mark_used(&issued.nonce_id).unwrap();

    assert_eq!(
        check_via_http(&client, &server.base_url, &request).await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_http_rejections_share_generic_message() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();
    let issued = issue_via_http(&client, &server.base_url).await;

    let tampered = CheckNonceRequest {
        nonce_id: Some(issued.nonce_id.clone()),
        raw_nonce: Some(format!("{}x", issued.raw_nonce)),
    };
    let unknown = CheckNonceRequest {
        nonce_id: Some("nonexistent-id".to_string()),
        raw_nonce: Some(issued.raw_nonce.clone()),
    };

    let mut bodies = Vec::new();
    for request in [&tampered, &unknown] {
        let resp = client
            .post(format!("{}/auth/nonce/check", server.base_url))
            .json(request)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        bodies.push(resp.json::<Value>().await.unwrap());
    }
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn test_http_metrics_exposed() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();
    issue_via_http(&client, &server.base_url).await;

    let resp = client
        .get(format!("{}/metrics", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = resp.text().await.unwrap();
    assert!(text.contains("pedigree_nonces_issued_total"));
}
