//! SupabaseClient against a mocked PostgREST / GoTrue server.

use httpmock::prelude::*;
use httpmock::Method::PATCH;
use saathi_backend::{BackendError, OwnerId, RowQuery, RowStore, SortOrder};
use serde_json::json;
use supabase_gateway::{GatewayError, SupabaseClient};

#[tokio::test]
async fn sign_in_installs_access_token() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "password")
                .header("apikey", "pk")
                .json_body(json!({ "email": "shop@example.com", "password": "secret" }));
            then.status(200).json_body(json!({
                "access_token": "jwt-1",
                "refresh_token": "refresh-1",
                "expires_at": 1_900_000_000,
                "token_type": "bearer",
                "user": { "id": "u1", "email": "shop@example.com" }
            }));
        })
        .await;

    let client = SupabaseClient::new(server.base_url(), "pk");
    let session = client
        .sign_in_with_password("shop@example.com", "secret")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(session.user.id, "u1");
    assert_eq!(session.expires_at, Some(1_900_000_000));
    assert_eq!(client.access_token().as_deref(), Some("jwt-1"));
}

#[tokio::test]
async fn bad_credentials_surface_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(400)
                .json_body(json!({ "error": "invalid_grant" }));
        })
        .await;

    let client = SupabaseClient::new(server.base_url(), "pk");
    let err = client
        .sign_in_with_password("shop@example.com", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Supabase { status: 400, .. }));
    assert!(client.access_token().is_none());
}

#[tokio::test]
async fn select_sends_owner_scope_and_bearer() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/sales")
                .query_param("user_id", "eq.u1")
                .query_param("order", "created_at.desc")
                .query_param("limit", "2")
                .header("apikey", "pk")
                .header("authorization", "Bearer jwt-1");
            then.status(200).json_body(json!([
                { "id": "s2", "user_id": "u1", "amount": 50.0 },
                { "id": "s1", "user_id": "u1", "amount": 20.0 }
            ]));
        })
        .await;

    let client = SupabaseClient::new(server.base_url(), "pk");
    client.set_access_token(Some("jwt-1".to_string()));
    let rows = client
        .select(
            RowQuery::new("sales", OwnerId::new("u1"))
                .order_by("created_at", SortOrder::Descending)
                .limit(2),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], "s2");
}

#[tokio::test]
async fn insert_returns_representation() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rest/v1/ai_insights")
                .header("prefer", "return=representation");
            then.status(201).json_body(json!([
                { "id": "i1", "user_id": "u1", "content": "Stock up on tea" }
            ]));
        })
        .await;

    let client = SupabaseClient::new(server.base_url(), "pk");
    let stored = client
        .insert(
            "ai_insights",
            json!({ "user_id": "u1", "content": "Stock up on tea" }),
        )
        .await
        .unwrap();
    assert_eq!(stored["id"], "i1");
}

#[tokio::test]
async fn delete_of_missing_row_is_not_found() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(DELETE)
                .path("/rest/v1/inventory")
                .query_param("id", "eq.missing")
                .query_param("user_id", "eq.u1");
            then.status(200).json_body(json!([]));
        })
        .await;

    let client = SupabaseClient::new(server.base_url(), "pk");
    let err = client
        .delete("inventory", &OwnerId::new("u1"), "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::NotFound { id, .. } if id == "missing"));
}

#[tokio::test]
async fn rls_rejection_maps_to_backend_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PATCH).path("/rest/v1/sales");
            then.status(401).body("JWT expired");
        })
        .await;

    let client = SupabaseClient::new(server.base_url(), "pk");
    let err = client
        .update("sales", &OwnerId::new("u1"), "s1", json!({ "amount": 10 }))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Status { status: 401, message } if message == "JWT expired"));
}
