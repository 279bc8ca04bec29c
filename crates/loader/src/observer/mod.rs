//! Instrumentation bus for load lifecycle events.
//!
//! # Purpose
//!
//! Broadcasts start/end notifications for every phase of a load to zero or more
//! registered [`Observer`]s. Observers see what happens; they never change it.
//!
//! # Mental model
//!
//! An [`ObserverRegistry`] is an append-only list published through an [`ArcSwap`].
//! Registration builds a new list with one more element and publishes it with a
//! compare-and-swap, retrying if another registrant won the race. Dispatch iterates
//! the snapshot loaded at the start of the event, without locking.
//!
//! A [`Loader`](crate::Loader) is handed a registry at construction. The process-wide
//! registry behind [`global`], [`add_observer`] and [`reset_observers_for_testing`] is
//! the default one.
//!
//! # Invariants
//!
//! - Concurrent registrations are linearizable; none is lost.
//! - Every start event precedes its matching end event on the same thread.
//! - Observer panics are not caught; isolation between observers is their own concern.

use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use soload_deps::ModuleName;

use crate::error::LoadError;
use crate::platform::{Location, PlatformError};
use crate::source::Source;

mod log;

pub use log::TracingObserver;

/// Receives load lifecycle events. Every method defaults to a no-op.
pub trait Observer: Send + Sync {
	/// A top-level load request began.
	fn on_load_start(&self, _module: &ModuleName) {}

	/// A top-level load request finished.
	fn on_load_end(&self, _module: &ModuleName, _error: Option<&LoadError>) {}

	/// `module` is being loaded as a dependency of `requester`.
	fn on_dependency_start(&self, _module: &ModuleName, _requester: &ModuleName) {}

	fn on_dependency_end(&self, _module: &ModuleName, _requester: &ModuleName, _error: Option<&LoadError>) {}

	/// A provider is being asked for `module`.
	fn on_source_start(&self, _module: &ModuleName, _source: &Source) {}

	/// A provider answered. `error` is set only when it failed; absence is not an error.
	fn on_source_end(&self, _module: &ModuleName, _source: &Source, _error: Option<&LoadError>) {}

	/// A recovery strategy is being attempted after `module` failed.
	fn on_recovery_start(&self, _module: &ModuleName, _strategy: &str) {}

	/// A recovery strategy finished. `error` is set when the strategy itself failed.
	fn on_recovery_end(&self, _module: &ModuleName, _strategy: &str, _error: Option<&LoadError>) {}

	/// The dependency set of `module` is being fetched.
	fn on_dependencies_start(&self, _module: &ModuleName) {}

	fn on_dependencies_end(&self, _module: &ModuleName, _error: Option<&LoadError>) {}

	/// The platform primitive is about to load `module`.
	fn on_platform_load_start(&self, _module: &ModuleName, _location: &Location) {}

	fn on_platform_load_end(&self, _module: &ModuleName, _location: &Location, _error: Option<&PlatformError>) {}
}

/// Copy-on-write list of observers.
pub struct ObserverRegistry {
	observers: ArcSwap<Vec<Arc<dyn Observer>>>,
}

impl Default for ObserverRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for ObserverRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ObserverRegistry").field("observers", &self.len()).finish()
	}
}

impl ObserverRegistry {
	pub fn new() -> Self {
		Self {
			observers: ArcSwap::from_pointee(Vec::new()),
		}
	}

	/// Appends `observer`. Lock-free; retries until its list is the one published.
	pub fn add(&self, observer: Arc<dyn Observer>) {
		loop {
			let cur = self.observers.load_full();
			let mut next = Vec::with_capacity(cur.len() + 1);
			next.extend(cur.iter().cloned());
			next.push(observer.clone());

			let prev = self.observers.compare_and_swap(&cur, Arc::new(next));
			if Arc::ptr_eq(&prev, &cur) {
				return;
			}
		}
	}

	/// Drops every registered observer.
	pub fn reset_for_testing(&self) {
		self.observers.store(Arc::new(Vec::new()));
	}

	pub fn len(&self) -> usize {
		self.observers.load().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Invokes `event` on every observer registered when the call began.
	pub fn emit(&self, event: impl Fn(&dyn Observer)) {
		let snapshot = self.observers.load();
		for observer in snapshot.iter() {
			event(observer.as_ref());
		}
	}
}

static GLOBAL: LazyLock<Arc<ObserverRegistry>> = LazyLock::new(|| Arc::new(ObserverRegistry::new()));

/// The process-wide registry.
pub fn global() -> Arc<ObserverRegistry> {
	GLOBAL.clone()
}

/// Registers `observer` with the process-wide registry.
pub fn add_observer(observer: Arc<dyn Observer>) {
	GLOBAL.add(observer);
}

/// Clears the process-wide registry.
pub fn reset_observers_for_testing() {
	GLOBAL.reset_for_testing();
}
