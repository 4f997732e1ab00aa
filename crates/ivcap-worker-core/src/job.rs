// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The job envelope delivered by the sidecar's `next_job` endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JobDecodeError, Result};

/// Schema prefix the sidecar uses to signal that no more jobs will be issued.
pub const BATCH_DONE_SCHEMA_PREFIX: &str = "urn:ivcap:schema.service.batch.done";

/// Id used for correlation when the envelope does not carry one.
pub const UNKNOWN_JOB_ID: &str = "unknown_job_id";

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const TEXT_CONTENT_TYPE: &str = "text/plain";
pub const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";

fn unknown_job_id() -> String {
	UNKNOWN_JOB_ID.to_string()
}

/// One unit of work. Read once by the executor and then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
	#[serde(rename = "$schema", default)]
	pub schema: String,

	#[serde(default = "unknown_job_id")]
	pub id: String,

	#[serde(rename = "in-content-type", default)]
	pub content_type: String,

	#[serde(rename = "in-content", default)]
	pub content: Value,

	/// Bearer token from the fetch response headers, never from the body.
	#[serde(skip)]
	pub authorization: Option<String>,
}

impl Job {
	/// Decodes a `next_job` response body.
	pub fn from_slice(body: &[u8], authorization: Option<String>) -> Result<Self> {
		let value: Value = serde_json::from_slice(body)?;
		if !value.is_object() {
			return Err(JobDecodeError::NotAnObject(json_kind(&value)));
		}
		let mut job: Job = serde_json::from_value(value)?;
		job.authorization = authorization.filter(|token| !token.is_empty());
		Ok(job)
	}

	/// Best-effort id lookup for envelopes that failed to decode.
	pub fn salvage_id(body: &[u8]) -> String {
		serde_json::from_slice::<Value>(body)
			.ok()
			.and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string))
			.unwrap_or_else(unknown_job_id)
	}

	/// `$schema` of a raw envelope, read without decoding any other field.
	pub fn schema_of(body: &[u8]) -> Option<String> {
		serde_json::from_slice::<Value>(body)
			.ok()
			.and_then(|v| v.get("$schema").and_then(Value::as_str).map(str::to_string))
	}

	/// Whether a raw envelope is the batch-done signal, whatever else it holds.
	pub fn is_batch_done_body(body: &[u8]) -> bool {
		Self::schema_of(body).is_some_and(|schema| schema.starts_with(BATCH_DONE_SCHEMA_PREFIX))
	}

	pub fn is_batch_done(&self) -> bool {
		self.schema.starts_with(BATCH_DONE_SCHEMA_PREFIX)
	}

	pub fn is_json(&self) -> bool {
		self.content_type == JSON_CONTENT_TYPE
	}
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn decodes_full_envelope() {
		let body = json!({
			"$schema": "urn:ivcap:schema.service.batch.job.1",
			"id": "42",
			"in-content-type": "application/json",
			"in-content": {"x": 1}
		});
		let job = Job::from_slice(
			body.to_string().as_bytes(),
			Some("Bearer abc".to_string()),
		)
		.unwrap();

		assert_eq!(job.id, "42");
		assert!(job.is_json());
		assert_eq!(job.content, json!({"x": 1}));
		assert_eq!(job.authorization.as_deref(), Some("Bearer abc"));
		assert!(!job.is_batch_done());
	}

	#[test]
	fn missing_id_uses_sentinel() {
		let job = Job::from_slice(br#"{"in-content-type": "application/json"}"#, None).unwrap();
		assert_eq!(job.id, UNKNOWN_JOB_ID);
	}

	#[test]
	fn empty_authorization_is_dropped() {
		let job = Job::from_slice(br#"{"id": "1"}"#, Some(String::new())).unwrap();
		assert!(job.authorization.is_none());
	}

	#[test]
	fn batch_done_prefix_is_detected() {
		let job = Job::from_slice(
			br#"{"$schema": "urn:ivcap:schema.service.batch.done.1"}"#,
			None,
		)
		.unwrap();
		assert!(job.is_batch_done());
	}

	#[test]
	fn authorization_in_body_is_ignored() {
		let job = Job::from_slice(br#"{"id": "1", "authorization": "Bearer body"}"#, None).unwrap();
		assert!(job.authorization.is_none());
	}

	#[test]
	fn non_object_body_is_rejected() {
		let err = Job::from_slice(b"[1, 2]", None).unwrap_err();
		assert!(matches!(err, JobDecodeError::NotAnObject("an array")));
	}

	#[test]
	fn invalid_json_is_rejected() {
		let err = Job::from_slice(b"not json", None).unwrap_err();
		assert!(matches!(err, JobDecodeError::Malformed(_)));
	}

	#[test]
	fn batch_done_is_read_from_raw_body() {
		let body = br#"{"$schema": "urn:ivcap:schema.service.batch.done.1", "id": null}"#;
		assert!(Job::from_slice(body, None).is_err());
		assert!(Job::is_batch_done_body(body));
		assert_eq!(
			Job::schema_of(body).as_deref(),
			Some("urn:ivcap:schema.service.batch.done.1")
		);
		assert!(!Job::is_batch_done_body(br#"{"$schema": 5}"#));
		assert!(!Job::is_batch_done_body(b"garbage"));
	}

	#[test]
	fn salvage_id_reads_id_from_broken_envelope() {
		assert_eq!(Job::salvage_id(br#"{"id": "7", "in-content-type": 5}"#), "7");
		assert_eq!(Job::salvage_id(b"garbage"), UNKNOWN_JOB_ID);
	}
}
