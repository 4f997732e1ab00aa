// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP transport to the job sidecar.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use ivcap_common_http::{retry, RetryConfig};
use ivcap_worker_core::{ByteStream, JobResult, ResultContent};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Body, Client};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::WorkerConfig;
use crate::error::{Result, TransportError};

pub const IS_ERROR_HEADER: &str = "Is-Error";

/// Raw `next_job` response.
#[derive(Debug, Clone)]
pub struct FetchedJob {
	pub body: Bytes,
	/// `Authorization` header of the response, if any.
	pub authorization: Option<String>,
}

/// Where jobs come from and results go to.
#[async_trait]
pub trait JobTransport: Send + Sync {
	/// Fetch the next job. Fails with [`TransportError::NotConfigured`] when
	/// there is no sidecar, and with [`TransportError::Exhausted`] once every
	/// attempt has failed.
	async fn fetch_job(&self) -> Result<FetchedJob>;

	/// Deliver a job's result. Without a sidecar this logs and succeeds.
	async fn push_result(
		&self,
		job_id: &str,
		result: JobResult,
		authorization: Option<&str>,
	) -> Result<()>;
}

/// [`JobTransport`] speaking to the sidecar over HTTP.
#[derive(Debug, Clone)]
pub struct SidecarClient {
	http: Client,
	base_url: Option<Url>,
	fetch_retry: RetryConfig,
	push_retry: RetryConfig,
}

impl SidecarClient {
	pub fn new(config: &WorkerConfig) -> Result<Self> {
		let http = ivcap_common_http::builder()
			.timeout(config.request_timeout)
			.build()?;
		Ok(Self {
			http,
			base_url: config.base_url.clone(),
			fetch_retry: config.fetch_retry.clone(),
			push_retry: config.push_retry.clone(),
		})
	}

	pub fn base_url(&self) -> Option<&Url> {
		self.base_url.as_ref()
	}

	fn endpoint(base: &Url, path: &str) -> Url {
		let mut url = base.clone();
		url.set_path(path);
		url.set_query(None);
		url
	}
}

/// Request body that can be rebuilt for each attempt. A stream can only be
/// sent once.
enum PushBody {
	Buffered(Bytes),
	Streamed(Mutex<Option<ByteStream>>),
}

impl PushBody {
	fn new(content: ResultContent) -> Self {
		match content {
			ResultContent::Bytes(bytes) => PushBody::Buffered(bytes),
			ResultContent::Stream(stream) => PushBody::Streamed(Mutex::new(Some(stream))),
		}
	}

	fn body(&self) -> Result<Body> {
		match self {
			PushBody::Buffered(bytes) => Ok(Body::from(bytes.clone())),
			PushBody::Streamed(slot) => slot
				.lock()
				.ok()
				.and_then(|mut slot| slot.take())
				.map(Body::wrap_stream)
				.ok_or(TransportError::StreamConsumed),
		}
	}
}

#[async_trait]
impl JobTransport for SidecarClient {
	async fn fetch_job(&self) -> Result<FetchedJob> {
		let Some(base) = &self.base_url else {
			return Err(TransportError::NotConfigured);
		};
		let url = &Self::endpoint(base, "/next_job");
		let http = &self.http;

		debug!(url = %url, "requesting next job");
		retry(&self.fetch_retry, || async move {
			let response = http.get(url.clone()).send().await?;
			let status = response.status();
			if !status.is_success() {
				let body = response.text().await.unwrap_or_default();
				return Err(TransportError::Status {
					status: status.as_u16(),
					body,
				});
			}

			let authorization = response
				.headers()
				.get(AUTHORIZATION)
				.and_then(|v| v.to_str().ok())
				.filter(|v| !v.is_empty())
				.map(str::to_string);
			let body = response.bytes().await?;
			Ok(FetchedJob {
				body,
				authorization,
			})
		})
		.await
		.map_err(|e| e.exhausted(self.fetch_retry.max_attempts))
	}

	async fn push_result(
		&self,
		job_id: &str,
		result: JobResult,
		authorization: Option<&str>,
	) -> Result<()> {
		let Some(base) = &self.base_url else {
			warn!(job_id = %job_id, "no sidecar base URL configured, result not delivered");
			return Ok(());
		};
		let url = &Self::endpoint(base, &format!("/results/{job_id}"));
		let http = &self.http;

		let is_error = result.is_error_header();
		let (content_type, content) = result.into_parts();
		let content_type = content_type.as_str();
		let body = &PushBody::new(content);
		let authorization = authorization.filter(|token| !token.is_empty());

		info!(job_id = %job_id, content_type = %content_type, is_error = %is_error, "pushing result");
		retry(&self.push_retry, || async move {
			let mut request = http
				.post(url.clone())
				.header(CONTENT_TYPE, content_type)
				.header(IS_ERROR_HEADER, is_error)
				.body(body.body()?);
			if let Some(token) = authorization {
				request = request.header(AUTHORIZATION, token);
			}

			let response = request.send().await?;
			let status = response.status();
			if !status.is_success() {
				let body = response.text().await.unwrap_or_default();
				return Err(TransportError::Status {
					status: status.as_u16(),
					body,
				});
			}
			Ok(())
		})
		.await
		.map_err(|e| e.exhausted(self.push_retry.max_attempts))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ivcap_worker_core::{ExecutionError, Outcome, SuccessResult};
	use std::time::Duration;
	use wiremock::matchers::{body_string, header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn fast_retry() -> RetryConfig {
		RetryConfig {
			max_attempts: 4,
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(5),
			backoff_factor: 2.0,
			jitter: false,
		}
	}

	fn client(server: &MockServer) -> SidecarClient {
		let config = WorkerConfig::default()
			.with_base_url(&server.uri())
			.unwrap()
			.with_retry(fast_retry());
		SidecarClient::new(&config).unwrap()
	}

	#[tokio::test]
	async fn fetch_returns_body_and_token() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/next_job"))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header("Authorization", "Bearer job-token")
					.set_body_string(r#"{"id":"1"}"#),
			)
			.mount(&server)
			.await;

		let fetched = client(&server).fetch_job().await.unwrap();
		assert_eq!(fetched.body.as_ref(), br#"{"id":"1"}"#);
		assert_eq!(fetched.authorization.as_deref(), Some("Bearer job-token"));
	}

	#[tokio::test]
	async fn fetch_retries_until_success() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/next_job"))
			.respond_with(ResponseTemplate::new(503))
			.up_to_n_times(3)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/next_job"))
			.respond_with(ResponseTemplate::new(200).set_body_string("{}"))
			.mount(&server)
			.await;

		let fetched = client(&server).fetch_job().await.unwrap();
		assert!(fetched.authorization.is_none());
		assert_eq!(server.received_requests().await.unwrap().len(), 4);
	}

	#[tokio::test]
	async fn fetch_gives_up_after_max_attempts() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/next_job"))
			.respond_with(ResponseTemplate::new(500).set_body_string("down"))
			.mount(&server)
			.await;

		let err = client(&server).fetch_job().await.unwrap_err();
		assert!(matches!(err, TransportError::Exhausted { attempts: 4, .. }));
		assert_eq!(server.received_requests().await.unwrap().len(), 4);
	}

	#[tokio::test]
	async fn unconfigured_client_is_standalone() {
		let client = SidecarClient::new(&WorkerConfig::default()).unwrap();
		assert!(matches!(
			client.fetch_job().await,
			Err(TransportError::NotConfigured)
		));
		let result = JobResult::Success(SuccessResult::bytes("text/plain", "hi"));
		assert!(client.push_result("1", result, None).await.is_ok());
	}

	#[tokio::test]
	async fn push_sends_result_headers() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/results/job-9"))
			.and(header("Content-Type", "text/plain"))
			.and(header("Is-Error", "False"))
			.and(header("Authorization", "Bearer t"))
			.and(body_string("done"))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

		let result = JobResult::Success(SuccessResult::bytes("text/plain", "done"));
		client(&server)
			.push_result("job-9", result, Some("Bearer t"))
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn push_marks_failures() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/results/job-2"))
			.and(header("Is-Error", "True"))
			.and(header("Content-Type", "application/json"))
			.respond_with(ResponseTemplate::new(201))
			.expect(1)
			.mount(&server)
			.await;

		let result = JobResult::Failure(ExecutionError::new("KeyError", "x"));
		client(&server)
			.push_result("job-2", result, None)
			.await
			.unwrap();

		let requests = server.received_requests().await.unwrap();
		assert!(requests[0].headers.get("authorization").is_none());
		let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
		assert_eq!(body["type"], "KeyError");
	}

	#[tokio::test]
	async fn push_retries_buffered_bodies() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(502))
			.up_to_n_times(2)
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(body_string("payload"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		let result = JobResult::Success(SuccessResult::bytes("text/plain", "payload"));
		client(&server).push_result("1", result, None).await.unwrap();
		assert_eq!(server.received_requests().await.unwrap().len(), 3);
	}

	#[tokio::test]
	async fn streamed_bodies_are_sent_once() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&server)
			.await;

		let Outcome::Stream(stream) = Outcome::from_reader(&b"chunked"[..]) else {
			unreachable!();
		};
		let result = JobResult::Success(SuccessResult {
			content_type: "application/octet-stream".to_string(),
			content: ResultContent::Stream(stream),
		});
		let err = client(&server)
			.push_result("1", result, None)
			.await
			.unwrap_err();
		assert!(matches!(err, TransportError::StreamConsumed));
		assert_eq!(server.received_requests().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn invalid_header_values_are_not_retried() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		let result = JobResult::Success(SuccessResult::bytes("text/plain", "x"));
		let err = client(&server)
			.push_result("1", result, Some("Bearer bad\ntoken"))
			.await
			.unwrap_err();
		assert!(matches!(err, TransportError::Http(ref e) if e.is_builder()));
		assert!(server.received_requests().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn push_gives_up_after_max_attempts() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(500))
			.mount(&server)
			.await;

		let result = JobResult::Success(SuccessResult::bytes("text/plain", "x"));
		let err = client(&server).push_result("1", result, None).await.unwrap_err();
		assert!(matches!(err, TransportError::Exhausted { attempts: 4, .. }));
		assert_eq!(server.received_requests().await.unwrap().len(), 4);
	}
}
