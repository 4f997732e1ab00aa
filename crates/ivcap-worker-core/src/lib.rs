// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for IVCAP batch workers.
//!
//! This crate contains the wire types exchanged with the job sidecar and the
//! result normalizer that turns anything a worker produces into exactly one
//! canonical [`JobResult`]. It performs no I/O.

pub mod error;
pub mod job;
pub mod outcome;
pub mod result;
pub mod verify;

pub use error::{JobDecodeError, Result};
pub use job::{
	Job, BATCH_DONE_SCHEMA_PREFIX, JSON_CONTENT_TYPE, OCTET_STREAM_CONTENT_TYPE,
	TEXT_CONTENT_TYPE, UNKNOWN_JOB_ID,
};
pub use outcome::{IntoOutcome, JobModel, Outcome, SerializeValue};
pub use result::{
	extract_panic_message, guard_stream, short_type_name, BinaryResult, ByteStream,
	ExecutionError, JobResult, ResultContent, SuccessResult, EXECUTION_ERROR_SCHEMA,
	PANIC_ERROR_KIND,
};
pub use verify::verify_result;
