// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Worker registration.
//!
//! A worker is an async function taking a typed request and, optionally, a
//! [`JobContext`]. Which of the two shapes a worker has is fixed when it is
//! registered with [`worker_fn`] or [`worker_fn_with_context`].

use std::backtrace::Backtrace;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use ivcap_worker_core::{short_type_name, ExecutionError, IntoOutcome, JobModel};

use crate::backtrace::format_error_traceback;
use crate::context::JobContext;

/// A failure raised by a worker.
///
/// Any error type converts into it with `?`, keeping the type name, the
/// message and a traceback of where the conversion happened.
pub struct WorkerError {
	kind: String,
	message: String,
	traceback: Option<String>,
}

impl WorkerError {
	pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			message: message.into(),
			traceback: None,
		}
	}

	pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
		self.traceback = Some(traceback.into());
		self
	}

	pub fn kind(&self) -> &str {
		&self.kind
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	pub fn traceback(&self) -> Option<&str> {
		self.traceback.as_deref()
	}

	pub fn into_execution_error(self) -> ExecutionError {
		let err = ExecutionError::new(self.kind, self.message);
		match self.traceback {
			Some(tb) => err.with_traceback(tb),
			None => err,
		}
	}
}

impl<E> From<E> for WorkerError
where
	E: std::error::Error + Send + Sync + 'static,
{
	fn from(err: E) -> Self {
		let kind = short_type_name::<E>();
		let traceback = format_error_traceback(&kind, &err, &Backtrace::force_capture());
		Self {
			message: err.to_string(),
			kind,
			traceback: Some(traceback),
		}
	}
}

impl fmt::Display for WorkerError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.kind, self.message)
	}
}

impl fmt::Debug for WorkerError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WorkerError")
			.field("kind", &self.kind)
			.field("message", &self.message)
			.field("has_traceback", &self.traceback.is_some())
			.finish()
	}
}

/// The function a batch service runs once per job.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
	type Request: JobModel;
	type Output: IntoOutcome + Send + 'static;

	fn name(&self) -> &str;

	/// Whether the worker receives a [`JobContext`].
	fn wants_context(&self) -> bool;

	/// Schema the worker claims to return. A mismatch with what it actually
	/// returns is logged, never enforced.
	fn declared_output_schema(&self) -> Option<&'static str> {
		<Self::Output as IntoOutcome>::declared_schema()
	}

	async fn call(
		&self,
		request: Self::Request,
		ctx: JobContext,
	) -> Result<Self::Output, WorkerError>;
}

/// Calling convention of a registered function.
pub trait Handler<Req, Out>: Send + Sync + 'static {
	const WANTS_CONTEXT: bool;

	fn invoke(&self, request: Req, ctx: JobContext) -> BoxFuture<'static, Result<Out, WorkerError>>;
}

pub struct RequestOnly<F>(F);

pub struct WithContext<F>(F);

impl<F, Fut, Req, Out> Handler<Req, Out> for RequestOnly<F>
where
	F: Fn(Req) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<Out, WorkerError>> + Send + 'static,
{
	const WANTS_CONTEXT: bool = false;

	fn invoke(&self, request: Req, _ctx: JobContext) -> BoxFuture<'static, Result<Out, WorkerError>> {
		(self.0)(request).boxed()
	}
}

impl<F, Fut, Req, Out> Handler<Req, Out> for WithContext<F>
where
	F: Fn(Req, JobContext) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<Out, WorkerError>> + Send + 'static,
{
	const WANTS_CONTEXT: bool = true;

	fn invoke(&self, request: Req, ctx: JobContext) -> BoxFuture<'static, Result<Out, WorkerError>> {
		(self.0)(request, ctx).boxed()
	}
}

/// A plain async function registered as a [`Worker`].
pub struct FnWorker<H, Req, Out> {
	name: String,
	handler: H,
	declared_output: Option<&'static str>,
	_marker: PhantomData<fn(Req) -> Out>,
}

/// Registers `f(request)` as a worker.
pub fn worker_fn<F, Fut, Req, Out>(
	name: impl Into<String>,
	f: F,
) -> FnWorker<RequestOnly<F>, Req, Out>
where
	F: Fn(Req) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<Out, WorkerError>> + Send + 'static,
	Out: IntoOutcome,
{
	FnWorker::new(name.into(), RequestOnly(f))
}

/// Registers `f(request, ctx)` as a worker.
pub fn worker_fn_with_context<F, Fut, Req, Out>(
	name: impl Into<String>,
	f: F,
) -> FnWorker<WithContext<F>, Req, Out>
where
	F: Fn(Req, JobContext) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<Out, WorkerError>> + Send + 'static,
	Out: IntoOutcome,
{
	FnWorker::new(name.into(), WithContext(f))
}

impl<H, Req, Out: IntoOutcome> FnWorker<H, Req, Out> {
	fn new(name: String, handler: H) -> Self {
		Self {
			name,
			handler,
			declared_output: Out::declared_schema(),
			_marker: PhantomData,
		}
	}

	/// Declares the model the worker is expected to return, for workers
	/// whose return type does not carry a schema of its own.
	pub fn declare_output<M: JobModel>(self) -> Self {
		self.declare_output_schema(M::SCHEMA)
	}

	pub fn declare_output_schema(mut self, schema: &'static str) -> Self {
		self.declared_output = Some(schema);
		self
	}
}

#[async_trait]
impl<H, Req, Out> Worker for FnWorker<H, Req, Out>
where
	H: Handler<Req, Out>,
	Req: JobModel,
	Out: IntoOutcome + Send + 'static,
{
	type Request = Req;
	type Output = Out;

	fn name(&self) -> &str {
		&self.name
	}

	fn wants_context(&self) -> bool {
		H::WANTS_CONTEXT
	}

	fn declared_output_schema(&self) -> Option<&'static str> {
		self.declared_output
	}

	async fn call(&self, request: Req, ctx: JobContext) -> Result<Out, WorkerError> {
		self.handler.invoke(request, ctx).await
	}
}
