mod common;

// crates.io
use httpmock::prelude::*;
use mimecast_client::{
	auth::{Credential, TokenManagerState},
	config::TransportConfig,
	error::Error,
	oauth::ReqwestTransportErrorMapper,
	transport::{ApiRequest, ReqwestTransport, Transport},
};
use serde::Deserialize;
// self
use common::{CLIENT_ID, CLIENT_SECRET};

#[derive(Debug, Deserialize)]
struct Account {
	#[serde(rename = "accountName")]
	account_name: String,
}

fn transport(server: &MockServer) -> ReqwestTransport {
	let config = TransportConfig::default().with_base_url(server.url("/"));

	Transport::with_http_client(
		Credential::new(CLIENT_ID, CLIENT_SECRET),
		&config,
		common::test_reqwest_http_client(),
		ReqwestTransportErrorMapper,
	)
	.expect("Transport should build against the mock server.")
}

#[tokio::test]
async fn request_flows_through_token_and_api_endpoints() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"live-token\",\"token_type\":\"bearer\",\"expires_in\":1800}",
			);
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/account/get-account")
				.header("authorization", "Bearer live-token")
				.header("accept", "application/json");
			then.status(200)
				.header("content-type", "application/json")
				.header("x-mc-rate-limit", "50")
				.header("x-mc-rate-limit-remaining", "7")
				.header("x-mc-rate-limit-reset", "30")
				.body("{\"meta\":{\"status\":200},\"data\":[{\"accountName\":\"Acme\"}],\"fail\":[]}");
		})
		.await;
	let transport = transport(&server);

	assert_eq!(transport.tokens().state(), TokenManagerState::Unauthenticated);

	for _ in 0..2 {
		let response = transport
			.request(ApiRequest::post("/api/account/get-account").idempotent(true))
			.await
			.expect("Request should succeed.");
		let accounts = response
			.envelope::<Vec<Account>>()
			.expect("Envelope should decode.")
			.expect("Envelope should carry data.");

		assert_eq!(accounts[0].account_name, "Acme");
		assert_eq!(response.attempts(), 1);
	}

	token.assert_calls_async(1).await;
	api.assert_calls_async(2).await;

	let quota = transport.rate_limiter().snapshot();

	assert!(quota.authoritative);
	assert_eq!(quota.limit, 50);
	assert_eq!(quota.remaining, 7);
	assert_eq!(transport.tokens().state(), TokenManagerState::Valid);
}

#[tokio::test]
async fn rejected_credentials_never_reach_the_api() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_client\",\"error_description\":\"unknown client\"}");
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.path("/api/account/get-account");
			then.status(200);
		})
		.await;
	let transport = transport(&server);

	for _ in 0..2 {
		let err = transport
			.get("/api/account/get-account")
			.await
			.expect_err("Rejected credentials should fail.");

		assert!(
			matches!(
				err,
				Error::AuthenticationRejected { ref reason, .. } if reason.contains("invalid_client")
			),
			"unexpected error: {err:?}"
		);
	}

	token.assert_calls_async(1).await;
	api.assert_calls_async(0).await;
	assert_eq!(transport.tokens().state(), TokenManagerState::Revoked);
}

#[tokio::test]
async fn api_failures_keep_status_code_and_excerpt() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"live-token\",\"token_type\":\"bearer\",\"expires_in\":1800}",
			);
		})
		.await;

	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/ttp/url/get-all-managed-urls");
			then.status(403)
				.header("content-type", "application/json")
				.body("{\"fault\":{\"faultstring\":\"denied\",\"detail\":{\"errorcode\":\"policy.denied\"}}}");
		})
		.await;
	let transport = transport(&server);
	let err = transport
		.get("/api/ttp/url/get-all-managed-urls")
		.await
		.expect_err("403 should surface.");

	assert_eq!(err.status(), Some(403));
	assert_eq!(err.code(), Some("policy.denied"));
	assert!(matches!(
		err,
		Error::ClientError { ref body_excerpt, .. } if body_excerpt.contains("denied")
	));

	api.assert_calls_async(1).await;
}
