// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors raised while decoding a job envelope fetched from the sidecar.
#[derive(Debug, Error)]
pub enum JobDecodeError {
	#[error("malformed job envelope: {0}")]
	Malformed(#[from] serde_json::Error),

	#[error("job envelope must be a JSON object, got {0}")]
	NotAnObject(&'static str),
}

pub type Result<T> = std::result::Result<T, JobDecodeError>;
