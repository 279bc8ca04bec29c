//! Depth-first dependency walk for one top-level load request.
//!
//! # Mental model
//!
//! Each node is located through the [`SourceChain`] first, so its descriptor can be
//! read from the file that will actually be loaded. Its dependency set is then
//! fetched, every dependency not yet loaded in this session is visited recursively,
//! and only after all of them succeeded is the node itself handed to the
//! [`LoadPrimitive`]. Dependencies therefore always load before their dependents, and
//! a module reachable along several paths loads once.
//!
//! A request moves through [`Phase`]s as it goes; the transitions are traced.
//!
//! # Invariants
//!
//! - A node found in the visiting set is a cycle; the walk aborts before any module
//!   reachable only through the cycle is loaded.
//! - Nothing loaded is ever rolled back.
//! - Session state is private to one request; concurrent requests may load the same
//!   module twice, which the primitive tolerates.

use rustc_hash::FxHashSet;
use soload_deps::{DependencySet, ModuleName, elf};

use crate::catalog::DepsCatalog;
use crate::error::LoadError;
use crate::observer::ObserverRegistry;
use crate::platform::{LoadPrimitive, Location};
use crate::source::{ModuleHandle, Resolution, SourceChain};

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Start,
	/// Fetching a node's dependency set.
	ResolvingDeps,
	/// Recursing into a node's dependencies.
	LoadingDeps,
	/// Handing a node to the platform primitive.
	LoadingTarget,
	Done,
	Failed,
}

/// Per-request walk state.
#[derive(Debug)]
pub struct LoadSession {
	phase: Phase,
	loaded: FxHashSet<ModuleName>,
	visiting: FxHashSet<ModuleName>,
	stack: Vec<ModuleName>,
	order: Vec<ModuleName>,
}

impl Default for LoadSession {
	fn default() -> Self {
		Self {
			phase: Phase::Start,
			loaded: FxHashSet::default(),
			visiting: FxHashSet::default(),
			stack: Vec::new(),
			order: Vec::new(),
		}
	}
}

impl LoadSession {
	pub fn phase(&self) -> Phase {
		self.phase
	}

	/// Modules handed to the platform primitive, in load order.
	pub fn order(&self) -> &[ModuleName] {
		&self.order
	}

	pub fn is_loaded(&self, module: &ModuleName) -> bool {
		self.loaded.contains(module)
	}

	pub fn into_order(self) -> Vec<ModuleName> {
		self.order
	}

	fn enter(&mut self, phase: Phase) {
		if self.phase != phase {
			tracing::trace!(from = ?self.phase, to = ?phase, depth = self.stack.len(), "phase");
			self.phase = phase;
		}
	}

	fn cycle_through(&self, module: &ModuleName) -> Vec<ModuleName> {
		let start = self.stack.iter().position(|m| m == module).unwrap_or(0);
		let mut cycle = self.stack[start..].to_vec();
		cycle.push(module.clone());
		cycle
	}
}

/// Borrowed view of everything one walk needs.
pub struct Resolver<'a> {
	sources: &'a SourceChain,
	catalog: Option<&'a DepsCatalog>,
	platform: &'a dyn LoadPrimitive,
	observers: &'a ObserverRegistry,
}

impl<'a> Resolver<'a> {
	pub fn new(
		sources: &'a SourceChain,
		catalog: Option<&'a DepsCatalog>,
		platform: &'a dyn LoadPrimitive,
		observers: &'a ObserverRegistry,
	) -> Self {
		Self {
			sources,
			catalog,
			platform,
			observers,
		}
	}

	/// Loads `module` and everything it depends on.
	pub fn load(&self, module: &ModuleName) -> Result<LoadSession, LoadError> {
		let mut session = LoadSession::default();
		match self.visit(&mut session, module, None) {
			Ok(()) => {
				session.enter(Phase::Done);
				Ok(session)
			}
			Err(error) => {
				session.enter(Phase::Failed);
				Err(error)
			}
		}
	}

	/// Finds the provider for `module` without loading anything.
	pub fn locate(&self, module: &ModuleName, requester: Option<&ModuleName>) -> Result<ModuleHandle, LoadError> {
		match self.sources.resolve(module, self.observers) {
			Resolution::Found(handle) => Ok(handle),
			Resolution::Absent => Err(LoadError::UnresolvedDependency {
				module: module.clone(),
				requester: requester.cloned(),
			}),
			Resolution::Failed(error) => Err(error),
		}
	}

	/// Direct dependencies of a located module, with dependency-fetch events.
	pub fn dependencies(&self, module: &ModuleName, handle: &ModuleHandle) -> Result<DependencySet, LoadError> {
		self.observers.emit(|o| o.on_dependencies_start(module));
		let result = self.fetch_dependencies(handle);
		self.observers.emit(|o| o.on_dependencies_end(module, result.as_ref().err()));
		result
	}

	fn fetch_dependencies(&self, handle: &ModuleHandle) -> Result<DependencySet, LoadError> {
		if let Some(declared) = &handle.declared {
			return Ok(declared.clone());
		}
		if let Some(catalog) = self.catalog
			&& let Some(deps) = catalog.dependencies(&handle.module)?
		{
			return Ok(deps);
		}
		match &handle.location {
			Location::File(path) => {
				elf::read_needed_from_path(path).map_err(|error| LoadError::descriptor(&handle.module, path, error))
			}
			Location::System(_) => Ok(Vec::new()),
		}
	}

	fn visit(&self, session: &mut LoadSession, module: &ModuleName, requester: Option<&ModuleName>) -> Result<(), LoadError> {
		if session.loaded.contains(module) {
			return Ok(());
		}
		if session.visiting.contains(module) {
			let cycle = session.cycle_through(module);
			tracing::debug!(module = %module, depth = cycle.len(), "dependency cycle");
			return Err(LoadError::CyclicDependency {
				module: module.clone(),
				cycle,
			});
		}

		session.visiting.insert(module.clone());
		session.stack.push(module.clone());
		let result = self.visit_unvisited(session, module, requester);
		session.stack.pop();
		session.visiting.remove(module);
		result
	}

	fn visit_unvisited(
		&self,
		session: &mut LoadSession,
		module: &ModuleName,
		requester: Option<&ModuleName>,
	) -> Result<(), LoadError> {
		let handle = self.locate(module, requester)?;
		if handle.module != *module && session.loaded.contains(&handle.module) {
			tracing::debug!(module = %module, host = %handle.module, "host already loaded");
			session.loaded.insert(module.clone());
			return Ok(());
		}

		session.enter(Phase::ResolvingDeps);
		let deps = self.dependencies(module, &handle)?;

		session.enter(Phase::LoadingDeps);
		for dep in &deps {
			if dep.is_path() || session.loaded.contains(dep) {
				continue;
			}
			self.observers.emit(|o| o.on_dependency_start(dep, module));
			let result = self.visit(session, dep, Some(module));
			self.observers.emit(|o| o.on_dependency_end(dep, module, result.as_ref().err()));
			result?;
		}

		session.enter(Phase::LoadingTarget);
		let location = &handle.location;
		self.observers.emit(|o| o.on_platform_load_start(&handle.module, location));
		let result = self.platform.load(location);
		self.observers.emit(|o| o.on_platform_load_end(&handle.module, location, result.as_ref().err()));
		result.map_err(|source| LoadError::PlatformLoad {
			module: handle.module.clone(),
			location: location.clone(),
			source,
		})?;

		tracing::debug!(module = %handle.module, location = %location, "loaded");
		session.loaded.insert(module.clone());
		session.loaded.insert(handle.module.clone());
		session.order.push(handle.module);
		Ok(())
	}
}

#[cfg(test)]
mod tests;
