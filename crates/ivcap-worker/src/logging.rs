// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tracing subscriber setup for worker binaries.
//!
//! Logs always go to stderr: stdout is reserved for descriptors and
//! `--test-file` results.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
	#[default]
	Text,
	Json,
}

/// Installs the global subscriber. `RUST_LOG` overrides the default `info`
/// filter. Calling this twice is harmless.
pub fn init(format: LogFormat) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	let result = match format {
		LogFormat::Text => tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().with_writer(std::io::stderr))
			.try_init(),
		LogFormat::Json => tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().json().with_writer(std::io::stderr))
			.try_init(),
	};

	if let Err(e) = result {
		tracing::debug!(error = %e, "tracing subscriber already installed");
	}
}
