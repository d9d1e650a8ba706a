use assert_matches::assert_matches;
use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::{AppConfig, ChatSettings};
use shared_database::{SupabaseClient, SupabaseError};

fn config(url: String) -> AppConfig {
    AppConfig {
        supabase_url: url,
        supabase_anon_key: "anon-key".to_string(),
        supabase_jwt_secret: "secret".to_string(),
        supabase_service_role_key: "service-key".to_string(),
        supabase_storage_bucket: "consultations".to_string(),
        chat: ChatSettings::default(),
        server_port: 0,
    }
}

#[tokio::test]
async fn test_user_token_is_forwarded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/rooms"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = SupabaseClient::new(&config(mock_server.uri()));
    let rows: Vec<Value> = client
        .request(Method::GET, "/rest/v1/rooms", Some("user-token"), None)
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    let mock_server = MockServer::start().await;

    for (route, status) in [("/conflict", 409), ("/missing", 404), ("/denied", 401), ("/broken", 500)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&mock_server)
            .await;
    }

    let client = SupabaseClient::service_role(&config(mock_server.uri()));

    let result: Result<Value, _> = client.request(Method::GET, "/conflict", None, None).await;
    assert_matches!(result, Err(SupabaseError::Conflict(_)));

    let result: Result<Value, _> = client.request(Method::GET, "/missing", None, None).await;
    assert_matches!(result, Err(SupabaseError::NotFound(_)));

    let result: Result<Value, _> = client.request(Method::GET, "/denied", None, None).await;
    assert_matches!(result, Err(SupabaseError::Auth(_)));

    let result: Result<Value, _> = client.request(Method::GET, "/broken", None, None).await;
    assert_matches!(result, Err(SupabaseError::Api { status: 500, .. }));
}

#[tokio::test]
async fn test_undecodable_body_is_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/rooms"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&mock_server)
        .await;

    let client = SupabaseClient::service_role(&config(mock_server.uri()));
    let result: Result<Vec<Value>, _> = client.request(Method::GET, "/rest/v1/rooms", None, None).await;
    assert_matches!(result, Err(SupabaseError::Decode(_)));
}

#[tokio::test]
async fn test_upload_object_returns_public_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/storage/v1/object/consultations/room/images/a.png"))
        .and(header("content-type", "image/png"))
        .and(header("authorization", "Bearer service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Key": "consultations/room/images/a.png" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = SupabaseClient::service_role(&config(mock_server.uri()));
    let url = client
        .upload_object("consultations", "room/images/a.png", "image/png", vec![1, 2, 3], None)
        .await
        .unwrap();

    assert_eq!(
        url,
        format!("{}/storage/v1/object/public/consultations/room/images/a.png", mock_server.uri())
    );
}
