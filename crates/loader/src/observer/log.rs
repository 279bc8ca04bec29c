use soload_deps::ModuleName;

use super::Observer;
use crate::error::LoadError;
use crate::platform::{Location, PlatformError};
use crate::source::Source;

/// Forwards every lifecycle event to `tracing` at trace level, failures at debug.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
	fn on_load_start(&self, module: &ModuleName) {
		tracing::trace!(module = %module, "load start");
	}

	fn on_load_end(&self, module: &ModuleName, error: Option<&LoadError>) {
		match error {
			Some(error) => tracing::debug!(module = %module, %error, "load failed"),
			None => tracing::trace!(module = %module, "load end"),
		}
	}

	fn on_dependency_start(&self, module: &ModuleName, requester: &ModuleName) {
		tracing::trace!(module = %module, requester = %requester, "dependency start");
	}

	fn on_dependency_end(&self, module: &ModuleName, requester: &ModuleName, error: Option<&LoadError>) {
		if let Some(error) = error {
			tracing::debug!(module = %module, requester = %requester, %error, "dependency failed");
		}
	}

	fn on_source_start(&self, module: &ModuleName, source: &Source) {
		tracing::trace!(module = %module, source = %source, "source start");
	}

	fn on_recovery_start(&self, module: &ModuleName, strategy: &str) {
		tracing::trace!(module = %module, strategy, "recovery start");
	}

	fn on_recovery_end(&self, module: &ModuleName, strategy: &str, error: Option<&LoadError>) {
		match error {
			Some(error) => tracing::debug!(module = %module, strategy, %error, "recovery strategy failed"),
			None => tracing::trace!(module = %module, strategy, "recovery end"),
		}
	}

	fn on_platform_load_start(&self, module: &ModuleName, location: &Location) {
		tracing::trace!(module = %module, location = %location, "platform load start");
	}

	fn on_platform_load_end(&self, module: &ModuleName, location: &Location, error: Option<&PlatformError>) {
		if let Some(error) = error {
			tracing::debug!(module = %module, location = %location, code = ?error.code, %error, "platform load failed");
		}
	}
}
