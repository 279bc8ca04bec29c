#![allow(dead_code)]

use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use soload::observer::Observer;
use soload::source::Source;
use soload::{LoadError, LoadPrimitive, Location, ModuleName, PlatformError};
use soload_deps::testing::ElfImage;

/// Writes a minimal shared object named `name` needing `deps` into `dir`.
pub fn module(dir: &Path, name: &str, deps: &[&str]) {
	fs::write(dir.join(name), ElfImage::new().needs(deps.iter().copied()).build()).unwrap();
}

/// Records every platform load in order; can be told to refuse given modules.
#[derive(Default)]
pub struct RecordingPrimitive {
	loads: Mutex<Vec<Location>>,
	attempts: Mutex<Vec<String>>,
	refusals: Mutex<FxHashMap<String, (Option<usize>, String)>>,
}

impl RecordingPrimitive {
	/// Refuses every load of `name` with `message`.
	pub fn refuse(&self, name: &str, message: &str) {
		self.refusals.lock().insert(name.to_string(), (None, message.to_string()));
	}

	/// Refuses the next `times` loads of `name` with `message`.
	pub fn refuse_times(&self, name: &str, times: usize, message: &str) {
		self.refusals.lock().insert(name.to_string(), (Some(times), message.to_string()));
	}

	/// File names (or bare names for system loads) in load order.
	pub fn names(&self) -> Vec<String> {
		self.loads.lock().iter().map(file_name).collect()
	}

	/// Every attempted load, including refused ones.
	pub fn attempts(&self) -> Vec<String> {
		self.attempts.lock().clone()
	}

	pub fn locations(&self) -> Vec<Location> {
		self.loads.lock().clone()
	}
}

fn file_name(location: &Location) -> String {
	match location {
		Location::File(path) => path.file_name().unwrap().to_string_lossy().into_owned(),
		Location::System(name) => name.to_string(),
	}
}

impl LoadPrimitive for RecordingPrimitive {
	fn load(&self, location: &Location) -> Result<(), PlatformError> {
		let name = file_name(location);
		self.attempts.lock().push(name.clone());

		let mut refusals = self.refusals.lock();
		if let Some((remaining, message)) = refusals.get_mut(&name) {
			match remaining {
				None => return Err(PlatformError::new(message.clone())),
				Some(0) => {}
				Some(n) => {
					*n -= 1;
					return Err(PlatformError::new(message.clone()));
				}
			}
		}
		drop(refusals);

		self.loads.lock().push(location.clone());
		Ok(())
	}
}

/// Flattens bus events into readable lines.
#[derive(Default)]
pub struct RecordingObserver {
	events: Mutex<Vec<String>>,
}

impl RecordingObserver {
	pub fn events(&self) -> Vec<String> {
		self.events.lock().clone()
	}

	pub fn recoveries(&self) -> Vec<String> {
		self.events().into_iter().filter(|e| e.starts_with("recovery")).collect()
	}

	fn push(&self, event: String) {
		self.events.lock().push(event);
	}
}

fn outcome<E>(error: Option<&E>) -> &'static str {
	if error.is_some() { "err" } else { "ok" }
}

impl Observer for RecordingObserver {
	fn on_load_start(&self, module: &ModuleName) {
		self.push(format!("load_start {module}"));
	}

	fn on_load_end(&self, module: &ModuleName, error: Option<&LoadError>) {
		self.push(format!("load_end {module} {}", outcome(error)));
	}

	fn on_dependency_start(&self, module: &ModuleName, requester: &ModuleName) {
		self.push(format!("dependency_start {module} <- {requester}"));
	}

	fn on_dependency_end(&self, module: &ModuleName, requester: &ModuleName, error: Option<&LoadError>) {
		self.push(format!("dependency_end {module} <- {requester} {}", outcome(error)));
	}

	fn on_source_start(&self, module: &ModuleName, _source: &Source) {
		self.push(format!("source_start {module}"));
	}

	fn on_source_end(&self, module: &ModuleName, _source: &Source, error: Option<&LoadError>) {
		self.push(format!("source_end {module} {}", outcome(error)));
	}

	fn on_recovery_start(&self, module: &ModuleName, strategy: &str) {
		self.push(format!("recovery_start {module} {strategy}"));
	}

	fn on_recovery_end(&self, module: &ModuleName, strategy: &str, error: Option<&LoadError>) {
		self.push(format!("recovery_end {module} {strategy} {}", outcome(error)));
	}

	fn on_dependencies_start(&self, module: &ModuleName) {
		self.push(format!("deps_start {module}"));
	}

	fn on_dependencies_end(&self, module: &ModuleName, error: Option<&LoadError>) {
		self.push(format!("deps_end {module} {}", outcome(error)));
	}

	fn on_platform_load_start(&self, module: &ModuleName, _location: &Location) {
		self.push(format!("platform_start {module}"));
	}

	fn on_platform_load_end(&self, module: &ModuleName, _location: &Location, error: Option<&PlatformError>) {
		self.push(format!("platform_end {module} {}", outcome(error)));
	}
}
