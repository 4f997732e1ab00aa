// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Result normalization.
//!
//! [`verify_result`] maps every [`Outcome`] onto exactly one [`JobResult`].
//! It never fails: values that cannot be serialized, or whose serializer
//! panics, are turned into an [`ExecutionError`] describing why.

use std::panic::{catch_unwind, AssertUnwindSafe};

use bytes::Bytes;
use serde_json::Value;
use tracing::warn;

use crate::job::{JSON_CONTENT_TYPE, OCTET_STREAM_CONTENT_TYPE, TEXT_CONTENT_TYPE};
use crate::outcome::{Outcome, SerializeValue};
use crate::result::{
	extract_panic_message, guard_stream, short_type_name, ExecutionError, JobResult,
	ResultContent, SuccessResult, PANIC_ERROR_KIND,
};

pub fn verify_result(outcome: Outcome, job_id: &str) -> JobResult {
	match outcome {
		Outcome::Failure(err) => JobResult::Failure(err),
		Outcome::Model { schema, value, .. } => {
			match serialize(&*value, Some(schema)) {
				Ok(body) => JobResult::Success(SuccessResult::bytes(JSON_CONTENT_TYPE, body)),
				Err(err) => serialization_failure(job_id, "cannot json serialise model", &err),
			}
		}
		Outcome::Binary(binary) => {
			JobResult::Success(SuccessResult::bytes(binary.content_type, binary.content))
		}
		Outcome::Text(text) => JobResult::Success(SuccessResult::bytes(TEXT_CONTENT_TYPE, text)),
		Outcome::Bytes(bytes) => {
			JobResult::Success(SuccessResult::bytes(OCTET_STREAM_CONTENT_TYPE, bytes))
		}
		Outcome::Stream(stream) => JobResult::Success(SuccessResult {
			content_type: OCTET_STREAM_CONTENT_TYPE.to_string(),
			content: ResultContent::Stream(guard_stream(stream)),
		}),
		Outcome::Value(value) => match serialize(&*value, None) {
			Ok(body) => JobResult::Success(SuccessResult::bytes(JSON_CONTENT_TYPE, body)),
			Err(err) => serialization_failure(job_id, "cannot json serialise result", &err),
		},
	}
}

enum SerializeFailure {
	Json(serde_json::Error),
	Panicked(String),
}

fn serialize(value: &dyn SerializeValue, schema: Option<&str>) -> Result<Bytes, SerializeFailure> {
	let mut json = catch_unwind(AssertUnwindSafe(|| value.to_json_value()))
		.map_err(|payload| SerializeFailure::Panicked(extract_panic_message(&*payload)))?
		.map_err(SerializeFailure::Json)?;
	if let (Some(schema), Value::Object(map)) = (schema, &mut json) {
		map.entry("$schema")
			.or_insert_with(|| Value::String(schema.to_string()));
	}
	serde_json::to_vec(&json)
		.map(Bytes::from)
		.map_err(SerializeFailure::Json)
}

fn serialization_failure(job_id: &str, what: &str, err: &SerializeFailure) -> JobResult {
	match err {
		SerializeFailure::Json(err) => {
			warn!(job_id = %job_id, error = %err, "{what}");
			JobResult::Failure(ExecutionError::new(
				short_type_name::<serde_json::Error>(),
				format!("{job_id}: {what} - {err}"),
			))
		}
		SerializeFailure::Panicked(message) => {
			warn!(job_id = %job_id, panic = %message, "{what}");
			JobResult::Failure(ExecutionError::new(
				PANIC_ERROR_KIND,
				format!("{job_id}: {what} - serializer panicked: {message}"),
			))
		}
	}
}
