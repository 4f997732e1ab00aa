// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Panic capture for worker invocations.
//!
//! A process-wide hook records the panic site and backtrace while a
//! [`CapturePanics`] future is being polled on the current thread. Outside
//! of a capture the previously installed hook runs unchanged.

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

pub use ivcap_worker_core::extract_panic_message;
use pin_project_lite::pin_project;

/// What the hook saw when a captured panic happened.
#[derive(Debug)]
pub struct CapturedPanic {
	pub message: String,
	pub location: Option<String>,
	pub backtrace: Backtrace,
}

thread_local! {
	static CAPTURING: Cell<bool> = const { Cell::new(false) };
	static LAST_PANIC: RefCell<Option<CapturedPanic>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

/// Install the capturing hook, chaining to whatever hook was present.
pub fn install() {
	INSTALL.call_once(|| {
		let default_hook = std::panic::take_hook();

		std::panic::set_hook(Box::new(move |info| {
			if !CAPTURING.with(Cell::get) {
				default_hook(info);
				return;
			}

			let captured = CapturedPanic {
				message: extract_panic_message(info.payload()),
				location: info
					.location()
					.map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
				backtrace: Backtrace::force_capture(),
			};
			LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(captured));
		}));
	});
}

/// Take the panic recorded on this thread, if any.
pub fn take_last() -> Option<CapturedPanic> {
	LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

pin_project! {
	/// Marks the current thread as capturing for the duration of each poll.
	pub struct CapturePanics<F> {
		#[pin]
		inner: F,
	}
}

pub fn capture<F: Future>(inner: F) -> CapturePanics<F> {
	install();
	CapturePanics { inner }
}

impl<F: Future> Future for CapturePanics<F> {
	type Output = F::Output;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();
		let _guard = CaptureGuard::enter();
		this.inner.poll(cx)
	}
}

struct CaptureGuard {
	previous: bool,
}

impl CaptureGuard {
	fn enter() -> Self {
		let previous = CAPTURING.with(|c| c.replace(true));
		Self { previous }
	}
}

impl Drop for CaptureGuard {
	fn drop(&mut self) {
		CAPTURING.with(|c| c.set(self.previous));
	}
}
