// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Batch service descriptor generation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const SERVICE_SCHEMA: &str = "urn:ivcap:schema.service.2";
pub const BATCH_CONTROLLER_SCHEMA: &str = "urn:ivcap:schema.service.batch.1";
pub const DEFAULT_POLICY: &str = "urn:ivcap:policy:ivcap.open.service";
pub const DEFAULT_RESOURCES_FILE: &str = "resources.json";
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";
pub const SERVICE_ID_PLACEHOLDER: &str = "#SERVICE_ID#";
pub const IMAGE_PLACEHOLDER: &str = "#DOCKER_IMG#";

#[derive(Error, Debug)]
pub enum ServiceError {
	#[error("cannot read '{}': {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("cannot find 'ENTRYPOINT' in '{}'", .0.display())]
	MissingEntrypoint(PathBuf),

	#[error("cannot parse ENTRYPOINT '{entry}' in '{}'", .path.display())]
	InvalidEntrypoint { path: PathBuf, entry: String },

	#[error("invalid resources definition '{}': {source}", .path.display())]
	InvalidResources {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("cannot serialize descriptor: {0}")]
	Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContact {
	pub name: String,
	pub email: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLicense {
	pub name: String,
	pub url: String,
}

/// What a service author says about their service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
	pub name: String,
	pub version: String,
	pub description: String,
	pub contact: ServiceContact,
	pub license: Option<ServiceLicense>,
}

impl Service {
	/// Version defaults to `$VERSION`, or `???` when unset.
	pub fn new(name: impl Into<String>, contact: ServiceContact) -> Self {
		Self {
			name: name.into(),
			version: std::env::var("VERSION").unwrap_or_else(|_| "???".to_string()),
			description: String::new(),
			contact,
			license: None,
		}
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = description.into();
		self
	}

	pub fn license(mut self, license: ServiceLicense) -> Self {
		self.license = Some(license);
		self
	}

	pub fn version(mut self, version: impl Into<String>) -> Self {
		self.version = version.into();
		self
	}
}

/// Deployment settings read from the environment when descriptors are
/// printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSettings {
	pub service_name: Option<String>,
	pub service_id: Option<String>,
	pub policy: Option<String>,
	pub docker_image: Option<String>,
	pub dockerfile: PathBuf,
	pub resources_file: Option<PathBuf>,
}

impl Default for DescriptorSettings {
	fn default() -> Self {
		Self {
			service_name: None,
			service_id: None,
			policy: None,
			docker_image: None,
			dockerfile: PathBuf::from(DEFAULT_DOCKERFILE),
			resources_file: None,
		}
	}
}

impl DescriptorSettings {
	pub fn from_env() -> Self {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	pub fn from_lookup<F>(lookup: F) -> Self
	where
		F: Fn(&str) -> Option<String>,
	{
		Self {
			service_name: lookup("IVCAP_SERVICE_NAME"),
			service_id: lookup("IVCAP_SERVICE_ID"),
			policy: lookup("IVCAP_POLICY_URN"),
			docker_image: lookup("DOCKER_IMG"),
			dockerfile: lookup("DOCKERFILE")
				.map(PathBuf::from)
				.unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKERFILE)),
			resources_file: lookup("IVCAP_RESOURCES_FILE").map(PathBuf::from),
		}
	}

	pub fn service_id(&self) -> &str {
		self.service_id.as_deref().unwrap_or(SERVICE_ID_PLACEHOLDER)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
	#[serde(default = "default_cpu")]
	pub cpu: String,
	#[serde(default = "default_memory")]
	pub memory: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ephemeral_storage: Option<String>,
}

fn default_cpu() -> String {
	"500m".to_string()
}

fn default_memory() -> String {
	"1Gi".to_string()
}

impl Default for ResourceRequirements {
	fn default() -> Self {
		Self {
			cpu: default_cpu(),
			memory: default_memory(),
			ephemeral_storage: None,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
	#[serde(default)]
	pub limits: ResourceRequirements,
	#[serde(default)]
	pub requests: ResourceRequirements,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchController {
	#[serde(rename = "$schema")]
	pub schema: String,
	pub image: String,
	pub command: Vec<String>,
	pub resources: Resources,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDefinition {
	#[serde(rename = "$schema")]
	pub schema: String,
	#[serde(rename = "$id")]
	pub id: String,
	pub name: String,
	pub description: String,
	pub parameters: Vec<serde_json::Value>,
	pub contact: ServiceContact,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub license: Option<ServiceLicense>,
	pub policy: String,
	pub controller_schema: String,
	pub controller: BatchController,
}

impl ServiceDefinition {
	pub fn to_json_pretty(&self) -> Result<String> {
		Ok(serde_json::to_string_pretty(self)?)
	}
}

pub fn create_batch_service_definition(
	service: &Service,
	settings: &DescriptorSettings,
) -> Result<ServiceDefinition> {
	let controller = BatchController {
		schema: BATCH_CONTROLLER_SCHEMA.to_string(),
		image: settings
			.docker_image
			.clone()
			.unwrap_or_else(|| IMAGE_PLACEHOLDER.to_string()),
		command: find_command(&settings.dockerfile)?,
		resources: find_resources(settings.resources_file.as_deref())?,
	};

	let description = if service.description.trim().is_empty() {
		"no description available".to_string()
	} else {
		clean_description(&service.description)
	};

	Ok(ServiceDefinition {
		schema: SERVICE_SCHEMA.to_string(),
		id: settings.service_id().to_string(),
		name: settings
			.service_name
			.clone()
			.unwrap_or_else(|| service.name.clone()),
		description,
		parameters: Vec::new(),
		contact: service.contact.clone(),
		license: service.license.clone(),
		policy: settings
			.policy
			.clone()
			.unwrap_or_else(|| DEFAULT_POLICY.to_string()),
		controller_schema: BATCH_CONTROLLER_SCHEMA.to_string(),
		controller,
	})
}

/// Reads the exec-form `ENTRYPOINT` of a Dockerfile.
pub fn find_command(dockerfile: &Path) -> Result<Vec<String>> {
	let content = std::fs::read_to_string(dockerfile).map_err(|source| ServiceError::Io {
		path: dockerfile.to_path_buf(),
		source,
	})?;

	let entry = content
		.lines()
		.find_map(|line| line.strip_prefix("ENTRYPOINT"))
		.map(str::trim)
		.ok_or_else(|| ServiceError::MissingEntrypoint(dockerfile.to_path_buf()))?;

	serde_json::from_str::<Vec<String>>(entry)
		.or_else(|_| serde_json::from_str::<Vec<String>>(&entry.replace('\'', "\"")))
		.map_err(|_| ServiceError::InvalidEntrypoint {
			path: dockerfile.to_path_buf(),
			entry: entry.to_string(),
		})
}

/// Loads resource requirements. A missing default file falls back to the
/// built-in defaults; a missing explicitly named file is an error.
pub fn find_resources(resources_file: Option<&Path>) -> Result<Resources> {
	let (path, explicit) = match resources_file {
		Some(path) => (path, true),
		None => (Path::new(DEFAULT_RESOURCES_FILE), false),
	};

	let content = match std::fs::read_to_string(path) {
		Ok(content) => content,
		Err(source) if explicit => {
			return Err(ServiceError::Io {
				path: path.to_path_buf(),
				source,
			})
		}
		Err(_) => {
			warn!(path = %path.display(), "using default resources, cannot find resources definition");
			return Ok(Resources::default());
		}
	};

	serde_json::from_str(&content).map_err(|source| ServiceError::InvalidResources {
		path: path.to_path_buf(),
		source,
	})
}

/// Collapses runs of whitespace to single spaces. Paragraph breaks (blank
/// lines) survive as a single newline.
pub fn clean_description(text: &str) -> String {
	text.split("\n\n")
		.map(|paragraph| paragraph.split_whitespace().collect::<Vec<_>>().join(" "))
		.collect::<Vec<_>>()
		.join("\n")
}
