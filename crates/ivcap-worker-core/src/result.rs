// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Canonical result envelopes pushed back to the sidecar.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::job::JSON_CONTENT_TYPE;

/// Schema tag carried by every [`ExecutionError`].
pub const EXECUTION_ERROR_SCHEMA: &str = "urn:ivcap:schema.ai-tool.error.1";

/// Type tag of failures caused by a panic in worker code.
pub const PANIC_ERROR_KIND: &str = "Panic";

/// A binary body delivered chunk by chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

fn execution_error_schema() -> String {
	EXECUTION_ERROR_SCHEMA.to_string()
}

/// Structured failure reported in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
	#[serde(rename = "$schema", default = "execution_error_schema")]
	pub schema: String,
	pub error: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub traceback: Option<String>,
}

impl ExecutionError {
	pub fn new(kind: impl Into<String>, error: impl Into<String>) -> Self {
		Self {
			schema: execution_error_schema(),
			error: error.into(),
			kind: kind.into(),
			traceback: None,
		}
	}

	pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
		self.traceback = Some(traceback.into());
		self
	}

	/// Builds a failure from an error value, tagging it with the error's type name.
	pub fn from_error<E>(err: &E) -> Self
	where
		E: std::error::Error + ?Sized + 'static,
	{
		Self::new(short_type_name::<E>(), err.to_string())
	}

	pub fn to_json_bytes(&self) -> Bytes {
		match serde_json::to_vec(self) {
			Ok(body) => Bytes::from(body),
			Err(_) => Bytes::from(
				serde_json::json!({
					"$schema": self.schema,
					"error": self.error,
					"type": self.kind,
				})
				.to_string(),
			),
		}
	}
}

impl fmt::Display for ExecutionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.kind, self.error)
	}
}

/// Content with an explicit content type, for results that are not JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryResult {
	pub content_type: String,
	pub content: Bytes,
}

impl BinaryResult {
	pub fn new(content_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
		Self {
			content_type: content_type.into(),
			content: content.into(),
		}
	}
}

pub enum ResultContent {
	Bytes(Bytes),
	Stream(ByteStream),
}

impl fmt::Debug for ResultContent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ResultContent::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
			ResultContent::Stream(_) => f.write_str("Stream(..)"),
		}
	}
}

#[derive(Debug)]
pub struct SuccessResult {
	pub content_type: String,
	pub content: ResultContent,
}

impl SuccessResult {
	pub fn bytes(content_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
		Self {
			content_type: content_type.into(),
			content: ResultContent::Bytes(content.into()),
		}
	}

	/// Buffered content, or `None` for streamed results.
	pub fn as_bytes(&self) -> Option<&Bytes> {
		match &self.content {
			ResultContent::Bytes(bytes) => Some(bytes),
			ResultContent::Stream(_) => None,
		}
	}
}

/// Outcome of one job as delivered to the sidecar. Exactly one per job.
#[derive(Debug)]
pub enum JobResult {
	Success(SuccessResult),
	Failure(ExecutionError),
}

impl JobResult {
	pub fn is_error(&self) -> bool {
		matches!(self, JobResult::Failure(_))
	}

	pub fn content_type(&self) -> &str {
		match self {
			JobResult::Success(success) => &success.content_type,
			JobResult::Failure(_) => JSON_CONTENT_TYPE,
		}
	}

	/// Value of the `Is-Error` header.
	pub fn is_error_header(&self) -> &'static str {
		if self.is_error() {
			"True"
		} else {
			"False"
		}
	}

	pub fn as_failure(&self) -> Option<&ExecutionError> {
		match self {
			JobResult::Failure(err) => Some(err),
			JobResult::Success(_) => None,
		}
	}

	/// Splits the result into its content type and body.
	pub fn into_parts(self) -> (String, ResultContent) {
		match self {
			JobResult::Success(success) => (success.content_type, success.content),
			JobResult::Failure(err) => (
				JSON_CONTENT_TYPE.to_string(),
				ResultContent::Bytes(err.to_json_bytes()),
			),
		}
	}
}

/// Makes a panic while polling `stream` end it with an I/O error.
pub fn guard_stream(stream: ByteStream) -> ByteStream {
	Box::pin(
		AssertUnwindSafe(stream)
			.catch_unwind()
			.map(|item| match item {
				Ok(chunk) => chunk,
				Err(payload) => Err(std::io::Error::new(
					std::io::ErrorKind::Other,
					format!("result stream panicked: {}", extract_panic_message(&*payload)),
				)),
			}),
	)
}

/// Extract the message from a panic payload.
pub fn extract_panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"Box<dyn Any>".to_string()
	}
}

/// Type name without its module path, used as the `type` tag of failures.
///
/// Modules named `error` are dropped so that `serde_json::error::Error`
/// becomes `serde_json::Error` and `std::io::error::Error` becomes
/// `io::Error`. Other types keep only their last segment.
pub fn short_type_name<T: ?Sized>() -> String {
	let full = std::any::type_name::<T>();
	let base = full.split('<').next().unwrap_or(full);
	let segments: Vec<&str> = base
		.split("::")
		.filter(|segment| !segment.is_empty() && *segment != "error")
		.collect();

	match segments.as_slice() {
		[] => full.to_string(),
		[.., parent, "Error"] => format!("{parent}::Error"),
		[.., last] => (*last).to_string(),
	}
}
