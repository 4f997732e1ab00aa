// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-job context handed to workers that ask for it.

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder};
use url::Url;

use crate::events::EventReporter;

pub const JOB_ID_HEADER: &str = "Ivcap-Job-Id";
pub const FORWARD_URL_HEADER: &str = "Ivcap-Forward-Url";

/// Host suffixes that are reached directly and receive the job's token.
const LOCAL_HOST_SUFFIXES: &[&str] = &[".local", ".minikube", ".ivcap.net"];

/// Routing rules for requests a worker makes on behalf of a job.
#[derive(Debug, Clone, Default)]
pub struct OutboundPolicy {
	pub proxy_url: Option<Url>,
}

impl OutboundPolicy {
	pub fn new(proxy_url: Option<Url>) -> Self {
		Self { proxy_url }
	}
}

#[derive(Debug, Clone)]
pub struct JobContext {
	job_id: String,
	authorization: Option<String>,
	report: EventReporter,
	outbound: OutboundPolicy,
}

impl JobContext {
	pub fn new(
		job_id: impl Into<String>,
		authorization: Option<String>,
		report: EventReporter,
		outbound: OutboundPolicy,
	) -> Self {
		Self {
			job_id: job_id.into(),
			authorization,
			report,
			outbound,
		}
	}

	pub fn job_id(&self) -> &str {
		&self.job_id
	}

	pub fn authorization(&self) -> Option<&str> {
		self.authorization.as_deref()
	}

	pub fn report(&self) -> &EventReporter {
		&self.report
	}

	/// Prepares an outbound request tagged with this job.
	///
	/// Local platform hosts get the job's `Authorization` header. Other hosts
	/// are sent through the proxy, when one is configured, with the real
	/// destination in `Ivcap-Forward-Url`.
	pub fn request(
		&self,
		client: &Client,
		method: Method,
		url: &str,
	) -> Result<RequestBuilder, url::ParseError> {
		let target = Url::parse(url)?;
		let local = is_local_host(&target);

		let builder = match (&self.outbound.proxy_url, local) {
			(Some(proxy), false) => client
				.request(method, proxy.clone())
				.header(FORWARD_URL_HEADER, target.as_str()),
			_ => client.request(method, target),
		};

		let builder = builder.header(JOB_ID_HEADER, self.job_id.as_str());
		Ok(match (&self.authorization, local) {
			(Some(token), true) => builder.header(AUTHORIZATION, token.as_str()),
			_ => builder,
		})
	}
}

fn is_local_host(url: &Url) -> bool {
	url.host_str()
		.map(|host| LOCAL_HOST_SUFFIXES.iter().any(|s| host.ends_with(s)))
		.unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::TracingSink;
	use std::sync::Arc;

	fn context(proxy: Option<&str>) -> JobContext {
		let report = EventReporter::new("job-7", None, Arc::new(TracingSink));
		JobContext::new(
			"job-7",
			Some("Bearer secret".to_string()),
			report,
			OutboundPolicy::new(proxy.map(|p| Url::parse(p).unwrap())),
		)
	}

	fn build(ctx: &JobContext, url: &str) -> reqwest::Request {
		ctx.request(&Client::new(), Method::GET, url)
			.unwrap()
			.build()
			.unwrap()
	}

	#[test]
	fn local_hosts_receive_token_directly() {
		let ctx = context(Some("http://proxy.example:3128"));
		let req = build(&ctx, "http://data-proxy.ivcap.net/artifacts/1");
		assert_eq!(req.url().host_str(), Some("data-proxy.ivcap.net"));
		assert_eq!(req.headers()[AUTHORIZATION], "Bearer secret");
		assert_eq!(req.headers()[JOB_ID_HEADER], "job-7");
		assert!(req.headers().get(FORWARD_URL_HEADER).is_none());
	}

	#[test]
	fn remote_hosts_go_through_proxy_without_token() {
		let ctx = context(Some("http://proxy.example:3128"));
		let req = build(&ctx, "https://api.example.com/v1?q=1");
		assert_eq!(req.url().as_str(), "http://proxy.example:3128/");
		assert_eq!(req.headers()[FORWARD_URL_HEADER], "https://api.example.com/v1?q=1");
		assert_eq!(req.headers()[JOB_ID_HEADER], "job-7");
		assert!(req.headers().get(AUTHORIZATION).is_none());
	}

	#[test]
	fn remote_hosts_without_proxy_are_direct() {
		let ctx = context(None);
		let req = build(&ctx, "https://api.example.com/v1");
		assert_eq!(req.url().host_str(), Some("api.example.com"));
		assert!(req.headers().get(AUTHORIZATION).is_none());
	}

	#[test]
	fn invalid_urls_are_rejected() {
		let ctx = context(None);
		assert!(ctx.request(&Client::new(), Method::GET, "::nope").is_err());
	}
}
