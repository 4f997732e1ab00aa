// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The closed set of values a worker can hand back to the SDK.

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::result::{BinaryResult, ByteStream, ExecutionError, JobResult, ResultContent};

/// A typed request or response exchanged with the platform.
///
/// `SCHEMA` is the URN written to the `$schema` property when a value is
/// delivered as a result.
pub trait JobModel: Serialize + DeserializeOwned + Send + 'static {
	const SCHEMA: &'static str;

	/// JSON schema describing the model, used by the tool descriptor.
	fn json_schema() -> Value {
		serde_json::json!({
			"type": "object",
			"properties": {
				"$schema": { "type": "string", "const": Self::SCHEMA }
			}
		})
	}
}

/// Object-safe JSON serialization, so heterogeneous values fit in [`Outcome`].
pub trait SerializeValue: Send {
	fn to_json_value(&self) -> serde_json::Result<Value>;
}

impl<T: Serialize + Send> SerializeValue for T {
	fn to_json_value(&self) -> serde_json::Result<Value> {
		serde_json::to_value(self)
	}
}

/// What a worker produced, before normalization.
pub enum Outcome {
	Failure(ExecutionError),
	Model {
		schema: &'static str,
		type_name: &'static str,
		value: Box<dyn SerializeValue>,
	},
	Binary(BinaryResult),
	Text(String),
	Bytes(Bytes),
	Stream(ByteStream),
	/// Anything else that claims to be serializable.
	Value(Box<dyn SerializeValue>),
}

impl Outcome {
	pub fn model<T: JobModel>(value: T) -> Self {
		Outcome::Model {
			schema: T::SCHEMA,
			type_name: std::any::type_name::<T>(),
			value: Box::new(value),
		}
	}

	pub fn json<T: Serialize + Send + 'static>(value: T) -> Self {
		Outcome::Value(Box::new(value))
	}

	pub fn stream(stream: ByteStream) -> Self {
		Outcome::Stream(stream)
	}

	pub fn from_reader<R: AsyncRead + Send + Sync + 'static>(reader: R) -> Self {
		Outcome::Stream(Box::pin(ReaderStream::new(reader)))
	}

	/// Streams a file without buffering it in memory.
	pub async fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
		let file = tokio::fs::File::open(path).await?;
		Ok(Self::from_reader(file))
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Outcome::Failure(_) => "failure",
			Outcome::Model { .. } => "model",
			Outcome::Binary(_) => "binary",
			Outcome::Text(_) => "text",
			Outcome::Bytes(_) => "bytes",
			Outcome::Stream(_) => "stream",
			Outcome::Value(_) => "value",
		}
	}

	/// Schema of a typed model, if this is one.
	pub fn schema(&self) -> Option<&'static str> {
		match self {
			Outcome::Model { schema, .. } => Some(*schema),
			_ => None,
		}
	}

	pub fn is_failure(&self) -> bool {
		matches!(self, Outcome::Failure(_))
	}
}

impl fmt::Debug for Outcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Outcome::Failure(err) => f.debug_tuple("Failure").field(err).finish(),
			Outcome::Model {
				schema, type_name, ..
			} => f
				.debug_struct("Model")
				.field("schema", schema)
				.field("type_name", type_name)
				.finish_non_exhaustive(),
			Outcome::Binary(binary) => f.debug_tuple("Binary").field(binary).finish(),
			Outcome::Text(text) => f.debug_tuple("Text").field(text).finish(),
			Outcome::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
			Outcome::Stream(_) => f.write_str("Stream(..)"),
			Outcome::Value(_) => f.write_str("Value(..)"),
		}
	}
}

impl From<JobResult> for Outcome {
	fn from(result: JobResult) -> Self {
		match result {
			JobResult::Failure(err) => Outcome::Failure(err),
			JobResult::Success(success) => match success.content {
				ResultContent::Bytes(content) => Outcome::Binary(BinaryResult {
					content_type: success.content_type,
					content,
				}),
				ResultContent::Stream(stream) => Outcome::Stream(stream),
			},
		}
	}
}

/// Conversion from a worker's return type into an [`Outcome`].
pub trait IntoOutcome {
	fn into_outcome(self) -> Outcome;

	/// Schema the worker declares it returns, if it is a typed model.
	fn declared_schema() -> Option<&'static str>
	where
		Self: Sized,
	{
		None
	}
}

impl<T: JobModel> IntoOutcome for T {
	fn into_outcome(self) -> Outcome {
		Outcome::model(self)
	}

	fn declared_schema() -> Option<&'static str> {
		Some(T::SCHEMA)
	}
}

impl IntoOutcome for Outcome {
	fn into_outcome(self) -> Outcome {
		self
	}
}

impl IntoOutcome for ExecutionError {
	fn into_outcome(self) -> Outcome {
		Outcome::Failure(self)
	}
}

impl IntoOutcome for BinaryResult {
	fn into_outcome(self) -> Outcome {
		Outcome::Binary(self)
	}
}

impl IntoOutcome for String {
	fn into_outcome(self) -> Outcome {
		Outcome::Text(self)
	}
}

impl IntoOutcome for &'static str {
	fn into_outcome(self) -> Outcome {
		Outcome::Text(self.to_string())
	}
}

impl IntoOutcome for Bytes {
	fn into_outcome(self) -> Outcome {
		Outcome::Bytes(self)
	}
}

impl IntoOutcome for Vec<u8> {
	fn into_outcome(self) -> Outcome {
		Outcome::Bytes(Bytes::from(self))
	}
}

impl IntoOutcome for Value {
	fn into_outcome(self) -> Outcome {
		Outcome::json(self)
	}
}
