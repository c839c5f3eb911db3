use axum::{
    Json, Router,
    extract::Query,
    http::{HeaderMap, StatusCode},
    routing::get,
};
use serde_json::{Value, json};
use session_gate::{
    error::SessionError,
    models::Profile,
    repository::{MockProfileRepository, PostgresProfileRepository, ProfileRepository, RestProfileRepository},
};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::net::TcpListener;
use uuid::Uuid;

const ANON_KEY: &str = "anon-test-key";
const KNOWN_USER: Uuid = Uuid::from_u128(42);

// --- Stub PostgREST gateway ---

/// Mimics `GET /rest/v1/profiles?id=eq.<uuid>`: checks the two auth headers and answers
/// with a JSON array, empty when the id is unknown.
async fn profiles_endpoint(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    let apikey_ok = headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(ANON_KEY);
    let bearer_ok = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer "));
    if !apikey_ok || !bearer_ok {
        return Err(StatusCode::UNAUTHORIZED);
    }

    if params.get("id").map(String::as_str) == Some(&format!("eq.{}", KNOWN_USER)) {
        Ok(Json(json!([{
            "id": KNOWN_USER,
            "email": "known@example.com",
            "role": "customer",
            "full_name": "Known User"
        }])))
    } else {
        Ok(Json(json!([])))
    }
}

async fn spawn_gateway() -> String {
    let router = Router::new()
        .route("/rest/v1/profiles", get(profiles_endpoint))
        .route("/broken/rest/v1/profiles", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://127.0.0.1:{}", port)
}

// --- RestProfileRepository ---

#[tokio::test]
async fn test_rest_repository_finds_profile() {
    let base = spawn_gateway().await;
    let repo = RestProfileRepository::new(&format!("{}/", base), ANON_KEY);

    let profile = repo.get_profile(KNOWN_USER, "user-token").await.unwrap().unwrap();

    assert_eq!(profile.id, KNOWN_USER);
    assert_eq!(profile.role, "customer");
    assert_eq!(profile.full_name.as_deref(), Some("Known User"));
}

#[tokio::test]
async fn test_rest_repository_unknown_user_is_none() {
    let base = spawn_gateway().await;
    let repo = RestProfileRepository::new(&base, ANON_KEY);

    let profile = repo.get_profile(Uuid::new_v4(), "user-token").await.unwrap();
    assert!(profile.is_none());
}

#[tokio::test]
async fn test_rest_repository_surfaces_gateway_errors() {
    let base = spawn_gateway().await;

    let wrong_key = RestProfileRepository::new(&base, "wrong-key");
    let result = wrong_key.get_profile(KNOWN_USER, "user-token").await;
    assert!(matches!(result, Err(SessionError::UnexpectedStatus(401))));

    let broken = RestProfileRepository::new(&format!("{}/broken", base), ANON_KEY);
    let result = broken.get_profile(KNOWN_USER, "user-token").await;
    assert!(matches!(result, Err(SessionError::UnexpectedStatus(500))));
}

#[tokio::test]
async fn test_rest_repository_unreachable_gateway_is_transport_error() {
    // Port 9 (discard) is essentially never listening locally.
    let repo = RestProfileRepository::new("http://127.0.0.1:9", ANON_KEY);
    let result = repo.get_profile(KNOWN_USER, "user-token").await;
    assert!(matches!(result, Err(SessionError::Transport(_))));
}

// --- MockProfileRepository ---

#[tokio::test]
async fn test_mock_repository() {
    let repo = MockProfileRepository::new().with_profile(Profile {
        id: KNOWN_USER,
        email: "known@example.com".to_string(),
        role: "admin".to_string(),
        full_name: None,
    });

    assert!(repo.get_profile(KNOWN_USER, "").await.unwrap().is_some());
    assert!(repo.get_profile(Uuid::new_v4(), "").await.unwrap().is_none());
    assert!(MockProfileRepository::new_failing().get_profile(KNOWN_USER, "").await.is_err());
}

// --- PostgresProfileRepository ---

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a database with public.profiles"]
async fn test_postgres_repository_round_trip() {
    dotenv::dotenv().ok();
    let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&db_url).await.expect("Failed to connect to database");

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO profiles (id, email, role, full_name) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind("pg@example.com")
        .bind("admin")
        .bind(Option::<String>::None)
        .execute(&pool)
        .await
        .unwrap();

    let repo = PostgresProfileRepository::new(pool.clone());
    let profile = repo.get_profile(id, "unused").await.unwrap().unwrap();
    assert_eq!(profile.role, "admin");

    sqlx::query("DELETE FROM profiles WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();
}
