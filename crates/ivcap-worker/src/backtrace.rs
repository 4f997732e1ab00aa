// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Backtrace parsing and traceback rendering for failed jobs.

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt::Write as _;

/// One frame of a captured backtrace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
	pub function: String,
	pub location: Option<String>,
	pub in_app: bool,
}

/// Parse a captured backtrace into frames, most recent call first.
pub fn parse_backtrace(backtrace: &Backtrace) -> Vec<Frame> {
	parse_backtrace_string(&format!("{backtrace:#}"))
}

fn parse_backtrace_string(bt_string: &str) -> Vec<Frame> {
	let mut frames: Vec<Frame> = Vec::new();

	for line in bt_string.lines() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		if let Some(location) = line.strip_prefix("at ") {
			if let Some(last) = frames.last_mut() {
				last.location.get_or_insert_with(|| location.trim().to_string());
			}
			continue;
		}

		if let Some(frame) = parse_frame_line(line) {
			frames.push(frame);
		}
	}

	frames
}

/// Frame lines look like `N: function::path`.
fn parse_frame_line(line: &str) -> Option<Frame> {
	let (prefix, rest) = line.split_once(':')?;
	prefix.trim().parse::<u32>().ok()?;

	let function = rest.trim();
	if function.is_empty() {
		return None;
	}

	Some(Frame {
		function: function.to_string(),
		location: None,
		in_app: is_in_app_frame(function),
	})
}

/// Heuristic: anything outside the runtime, the standard library and this
/// SDK's own capture machinery is worker code.
fn is_in_app_frame(function: &str) -> bool {
	const SYSTEM_PREFIXES: &[&str] = &[
		"std::",
		"core::",
		"alloc::",
		"<std::",
		"<core::",
		"<alloc::",
		"tokio::",
		"<tokio::",
		"futures::",
		"<futures::",
		"futures_util::",
		"<futures_util::",
		"async_trait::",
		"tracing::",
		"<tracing::",
		"ivcap_worker::backtrace::",
		"ivcap_worker::panic_capture::",
		"<ivcap_worker::panic_capture::",
		"ivcap_worker::worker::WorkerError",
		"<ivcap_worker::worker::WorkerError",
		"panic_unwind::",
		"rust_begin_unwind",
		"rust_panic",
		"__rust_",
		"_rust_",
	];

	const SYSTEM_CONTAINS: &[&str] = &[
		"::panic::",
		"::panicking::",
		"::rt::",
		"::sys_common::",
	];

	if SYSTEM_PREFIXES.iter().any(|p| function.starts_with(p)) {
		return false;
	}
	!SYSTEM_CONTAINS.iter().any(|c| function.contains(c))
}

/// Renders frames as traceback text. Only in-app frames are listed when
/// there are any; otherwise every frame is.
pub fn render_frames(frames: &[Frame]) -> String {
	let in_app = frames.iter().any(|f| f.in_app);
	let mut out = String::new();
	if frames.is_empty() {
		return out;
	}

	out.push_str("Stack backtrace (most recent call first):\n");
	for frame in frames.iter().filter(|f| !in_app || f.in_app) {
		let _ = write!(out, "  at {}", frame.function);
		if let Some(location) = &frame.location {
			let _ = write!(out, " ({location})");
		}
		out.push('\n');
	}
	out
}

/// Full traceback for an error: its description, its `source()` chain and
/// the stack it was captured on.
pub fn format_error_traceback(
	kind: &str,
	err: &(dyn StdError + 'static),
	backtrace: &Backtrace,
) -> String {
	let mut out = format!("{kind}: {err}\n");

	let mut source = err.source();
	if source.is_some() {
		out.push_str("\nCaused by:\n");
	}
	let mut depth = 0;
	while let Some(cause) = source {
		let _ = writeln!(out, "    {depth}: {cause}");
		depth += 1;
		source = cause.source();
	}

	append_stack(&mut out, backtrace);
	out
}

/// Traceback for a panic: its message, the panic site and the stack.
pub fn format_panic_traceback(
	message: &str,
	location: Option<&str>,
	backtrace: Option<&Backtrace>,
) -> String {
	let mut out = format!("Panic: {message}\n");
	if let Some(location) = location {
		let _ = writeln!(out, "  panicked at {location}");
	}
	if let Some(backtrace) = backtrace {
		append_stack(&mut out, backtrace);
	}
	out
}

fn append_stack(out: &mut String, backtrace: &Backtrace) {
	let rendered = render_frames(&parse_backtrace(backtrace));
	if !rendered.is_empty() {
		out.push('\n');
		out.push_str(&rendered);
	}
}
