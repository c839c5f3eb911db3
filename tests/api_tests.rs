use reqwest::{StatusCode, redirect};
use session_gate::{
    AppConfig, AppState, IdentityProvider, create_router,
    config::DemoIdentity,
    identity::DemoIdentitySource,
    models::{DecisionResponse, ProtectedPage, Role, Transition},
};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
}

async fn spawn_app(fixture: DemoIdentity) -> TestApp {
    let config = AppConfig {
        demo_identity: fixture,
        ..AppConfig::default()
    };
    let source = Arc::new(DemoIdentitySource::new(config.demo_identity));
    let provider = IdentityProvider::new(source, Duration::from_secs(2));
    provider.activate();

    let state = AppState {
        provider,
        sessions: None,
        config,
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .unwrap()
}

/// Waits until the demo source has resolved, via the guard long-poll.
async fn wait_until_resolved(app: &TestApp) {
    let response = client()
        .get(format!("{}/guard/customer?after=0", app.address))
        .send()
        .await
        .expect("req fail");
    let body: DecisionResponse = response.json().await.unwrap();
    assert!(body.revision > 0);
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app(DemoIdentity::Customer).await;
    let response = client()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = spawn_app(DemoIdentity::Customer).await;
    let response = client()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_redirect_chain_ends_on_own_home() {
    let app = spawn_app(DemoIdentity::Admin).await;
    wait_until_resolved(&app).await;

    let response = client()
        .get(format!("{}/account/profile", app.address))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = response.headers()["location"].to_str().unwrap().to_string();
    assert_eq!(target, "/admin");

    // Following the redirect lands on a page that renders, not on another redirect.
    let response = client()
        .get(format!("{}{}", app.address, target))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::OK);
    let page: ProtectedPage = response.json().await.unwrap();
    assert_eq!(page.identity.role, Role::Admin);
}

#[tokio::test]
async fn test_anonymous_redirect_lands_on_login() {
    let app = spawn_app(DemoIdentity::Anonymous).await;
    wait_until_resolved(&app).await;

    let response = client()
        .get(format!("{}/admin", app.address))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()["location"], "/login");

    let response = client()
        .get(format!("{}/login", app.address))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::OK);

    let transition: Transition = client()
        .get(format!("{}/session", app.address))
        .send()
        .await
        .expect("req fail")
        .json()
        .await
        .unwrap();
    assert!(transition.status.identity().is_none());
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app(DemoIdentity::Customer).await;
    let doc: serde_json::Value = client()
        .get(format!("{}/api-docs/openapi.json", app.address))
        .send()
        .await
        .expect("req fail")
        .json()
        .await
        .unwrap();

    assert!(doc["paths"].get("/guard/{role}").is_some());
    assert!(doc["paths"].get("/admin").is_some());
}
