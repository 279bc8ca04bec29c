//! Remediation after a failed load request.
//!
//! When a request fails with a recoverable [`ErrorKind`](crate::ErrorKind), the
//! [`Loader`](crate::Loader) hands the error to a [`RecoveryPipeline`]. Strategies run
//! in order until one asks for a retry or gives up; the loader then restarts the whole
//! request at most once. Strategies act on disk and on source state, never on the
//! request itself.

use std::fmt;

use soload_deps::ModuleName;

use crate::catalog::DepsCatalog;
use crate::config::RecoveryConfig;
use crate::error::LoadError;
use crate::observer::ObserverRegistry;
use crate::source::SourceChain;

mod strategies;

pub use strategies::{ArmBackupStore, CheckArchiveExists, PurgeStaleUnpack};

/// What a strategy made of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
	/// The failure is outside this strategy's remit.
	NotApplicable,
	/// Something was remediated, but a retry would not change the outcome yet.
	Handled,
	/// State was repaired; the request should be restarted.
	Retry,
	/// No strategy can help; stop the pipeline.
	GiveUp,
}

/// Everything a strategy may inspect or repair.
#[derive(Clone, Copy)]
pub struct RecoveryContext<'a> {
	pub module: &'a ModuleName,
	pub error: &'a LoadError,
	pub sources: &'a SourceChain,
	pub catalog: Option<&'a DepsCatalog>,
}

impl fmt::Debug for RecoveryContext<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RecoveryContext")
			.field("module", self.module)
			.field("error", &self.error.kind())
			.finish_non_exhaustive()
	}
}

/// One remediation step.
pub trait RecoveryStrategy: Send + Sync {
	/// Stable name reported on the observer bus.
	fn name(&self) -> &'static str;

	fn attempt(&self, ctx: &RecoveryContext<'_>) -> Result<RecoveryAction, LoadError>;
}

/// Ordered list of strategies.
#[derive(Default)]
pub struct RecoveryPipeline {
	strategies: Vec<Box<dyn RecoveryStrategy>>,
}

impl fmt::Debug for RecoveryPipeline {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.strategies.iter().map(|s| s.name())).finish()
	}
}

impl RecoveryPipeline {
	pub fn new() -> Self {
		Self::default()
	}

	/// The canonical strategies enabled in `config`, in canonical order.
	pub fn standard(config: &RecoveryConfig) -> Self {
		let mut pipeline = Self::new();
		if config.check_archive_exists {
			pipeline.push(CheckArchiveExists);
		}
		if config.purge_stale_unpack {
			pipeline.push(PurgeStaleUnpack);
		}
		if config.arm_backup_store {
			pipeline.push(ArmBackupStore);
		}
		pipeline
	}

	pub fn with(mut self, strategy: impl RecoveryStrategy + 'static) -> Self {
		self.push(strategy);
		self
	}

	pub fn push(&mut self, strategy: impl RecoveryStrategy + 'static) {
		self.strategies.push(Box::new(strategy));
	}

	pub fn len(&self) -> usize {
		self.strategies.len()
	}

	pub fn is_empty(&self) -> bool {
		self.strategies.is_empty()
	}

	pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
		self.strategies.iter().map(|s| s.name())
	}

	/// Runs strategies until one requests a retry (`true`) or gives up (`false`).
	///
	/// A strategy that fails is reported and skipped; it never masks the original error.
	pub fn run(&self, ctx: &RecoveryContext<'_>, observers: &ObserverRegistry) -> bool {
		for strategy in &self.strategies {
			let name = strategy.name();
			observers.emit(|o| o.on_recovery_start(ctx.module, name));
			let outcome = strategy.attempt(ctx);
			observers.emit(|o| o.on_recovery_end(ctx.module, name, outcome.as_ref().err()));

			match outcome {
				Ok(RecoveryAction::Retry) => {
					tracing::warn!(module = %ctx.module, strategy = name, error = %ctx.error, "recovery requested a retry");
					return true;
				}
				Ok(RecoveryAction::GiveUp) => {
					tracing::warn!(module = %ctx.module, strategy = name, error = %ctx.error, "recovery gave up");
					return false;
				}
				Ok(RecoveryAction::Handled) => {
					tracing::debug!(module = %ctx.module, strategy = name, "recovery handled without retry");
				}
				Ok(RecoveryAction::NotApplicable) => {
					tracing::trace!(module = %ctx.module, strategy = name, "recovery not applicable");
				}
				Err(error) => {
					tracing::warn!(module = %ctx.module, strategy = name, %error, "recovery strategy failed");
				}
			}
		}
		false
	}
}
