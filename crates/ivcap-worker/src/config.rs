// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use ivcap_common_http::RetryConfig;
use thiserror::Error;
use url::Url;

pub const BASE_URL_ENV: &str = "IVCAP_BASE_URL";
pub const PROXY_URL_ENV: &str = "IVCAP_PROXY_URL";
pub const REQUEST_TIMEOUT_ENV: &str = "IVCAP_REQUEST_TIMEOUT_SECS";

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("invalid value for {name}: {message}")]
	InvalidValue { name: String, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Everything the worker loop needs to talk to its sidecar.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
	/// Sidecar base URL. `None` runs the worker standalone: no jobs are
	/// requested and results are not pushed.
	pub base_url: Option<Url>,
	/// Proxy that outbound requests to non-local hosts are routed through.
	pub proxy_url: Option<Url>,
	pub request_timeout: Duration,
	pub fetch_retry: RetryConfig,
	pub push_retry: RetryConfig,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			base_url: None,
			proxy_url: None,
			request_timeout: Duration::from_secs(30),
			fetch_retry: RetryConfig::default(),
			push_retry: RetryConfig::default(),
		}
	}
}

impl WorkerConfig {
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Builds a configuration from an arbitrary variable lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let base_url = optional_url(&lookup, BASE_URL_ENV)?;
		let proxy_url = optional_url(&lookup, PROXY_URL_ENV)?;
		let timeout_secs: u64 = optional_env_parse(&lookup, REQUEST_TIMEOUT_ENV, 30)?;

		Ok(Self {
			base_url,
			proxy_url,
			request_timeout: Duration::from_secs(timeout_secs),
			..Self::default()
		})
	}

	pub fn with_base_url(mut self, url: &str) -> Result<Self> {
		self.base_url = parse_url(BASE_URL_ENV, url)?;
		Ok(self)
	}

	pub fn with_retry(mut self, retry: RetryConfig) -> Self {
		self.fetch_retry = retry.clone();
		self.push_retry = retry;
		self
	}
}

fn optional_url<F>(lookup: &F, name: &str) -> Result<Option<Url>>
where
	F: Fn(&str) -> Option<String>,
{
	match lookup(name) {
		Some(raw) => parse_url(name, &raw),
		None => Ok(None),
	}
}

/// Empty values count as unset.
fn parse_url(name: &str, raw: &str) -> Result<Option<Url>> {
	let raw = raw.trim();
	if raw.is_empty() {
		return Ok(None);
	}
	Url::parse(raw)
		.map(Some)
		.map_err(|e| ConfigError::InvalidValue {
			name: name.to_string(),
			message: e.to_string(),
		})
}

fn optional_env_parse<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
	F: Fn(&str) -> Option<String>,
	T: std::str::FromStr,
	T::Err: std::fmt::Display,
{
	match lookup(name) {
		Some(val) => val.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
			name: name.to_string(),
			message: e.to_string(),
		}),
		None => Ok(default),
	}
}
