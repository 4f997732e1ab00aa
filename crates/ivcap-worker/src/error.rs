// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ivcap_common_http::RetryableError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
	#[error("HTTP request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("sidecar returned {status}: {body}")]
	Status { status: u16, body: String },

	#[error("no sidecar base URL configured")]
	NotConfigured,

	#[error("streamed result body was already consumed by an earlier attempt")]
	StreamConsumed,

	#[error("giving up after {attempts} attempts: {source}")]
	Exhausted {
		attempts: u32,
		#[source]
		source: Box<TransportError>,
	},
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Every transport failure is retried except the ones that can never
/// succeed on a later attempt, such as a request that cannot be built.
impl RetryableError for TransportError {
	fn is_retryable(&self) -> bool {
		match self {
			TransportError::Http(e) => !e.is_builder(),
			TransportError::Status { .. } => true,
			TransportError::NotConfigured
			| TransportError::StreamConsumed
			| TransportError::Exhausted { .. } => false,
		}
	}
}

impl TransportError {
	pub(crate) fn exhausted(self, attempts: u32) -> Self {
		if self.is_retryable() {
			TransportError::Exhausted {
				attempts,
				source: Box::new(self),
			}
		} else {
			self
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_errors_are_retryable() {
		let err = TransportError::Status {
			status: 503,
			body: "busy".to_string(),
		};
		assert!(err.is_retryable());
		assert_eq!(err.to_string(), "sidecar returned 503: busy");
	}

	#[test]
	fn terminal_errors_are_not_retryable() {
		assert!(!TransportError::NotConfigured.is_retryable());
		assert!(!TransportError::StreamConsumed.is_retryable());
	}

	#[test]
	fn exhausted_wraps_only_retryable_errors() {
		let err = TransportError::Status {
			status: 500,
			body: String::new(),
		}
		.exhausted(4);
		assert!(matches!(err, TransportError::Exhausted { attempts: 4, .. }));
		assert!(err.to_string().starts_with("giving up after 4 attempts"));

		let err = TransportError::StreamConsumed.exhausted(4);
		assert!(matches!(err, TransportError::StreamConsumed));
	}
}
