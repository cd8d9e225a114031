//! REST helper tests against the mock API
//!
//! Run with: cargo test -p integration-tests --test rest_tests

use discobra_core::Snowflake;
use discobra_rest::RestClient;
use integration_tests::{MockServer, TEST_TOKEN};

#[tokio::test]
async fn test_current_user() {
    let server = MockServer::start().await.unwrap();
    let rest = RestClient::new(&server.client_config().rest, TEST_TOKEN).unwrap();

    let user = rest.current_user().await.unwrap();
    assert_eq!(user.id, Snowflake::new(1));
    assert_eq!(user.username, "mock-bot");
    assert!(user.bot);
    assert_eq!(server.profile_requests(), 1);
}

#[tokio::test]
async fn test_raw_get_returns_status_and_body() {
    let server = MockServer::start().await.unwrap();
    let rest = RestClient::new(&server.client_config().rest, TEST_TOKEN).unwrap();

    let response = rest.get("/users/@me").await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body["username"], "mock-bot");
}

#[tokio::test]
async fn test_bad_token_is_unauthorized() {
    let server = MockServer::start().await.unwrap();
    let rest = RestClient::new(&server.client_config().rest, "wrong").unwrap();

    let err = rest.current_user().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.status(), Some(401));
    assert_eq!(server.profile_requests(), 0);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let server = MockServer::start().await.unwrap();
    let rest = RestClient::new(&server.client_config().rest, TEST_TOKEN).unwrap();

    let err = rest.get("/channels/1").await.unwrap_err();
    assert!(err.is_not_found());
}
