use soload_unpack::UnpackError;

use super::{RecoveryAction, RecoveryContext, RecoveryStrategy};
use crate::error::LoadError;

/// Gives up when an archive backing an unpacking source has disappeared, e.g. because
/// the application was uninstalled or moved underneath the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckArchiveExists;

impl RecoveryStrategy for CheckArchiveExists {
	fn name(&self) -> &'static str {
		"check_archive_exists"
	}

	fn attempt(&self, ctx: &RecoveryContext<'_>) -> Result<RecoveryAction, LoadError> {
		let archives = ctx
			.sources
			.splits()
			.map(|split| split.unpacker().archive())
			.chain(ctx.catalog.map(|catalog| catalog.unpacker().archive()));
		for archive in archives {
			if !archive.exists() {
				tracing::warn!(archive = %archive.describe(), "archive is gone");
				return Ok(RecoveryAction::GiveUp);
			}
		}
		Ok(RecoveryAction::NotApplicable)
	}
}

/// Invalidates unpack directories whose contents no longer match their archive.
///
/// Applies to extraction failures and to platform loads that rejected a damaged
/// image. An image built for another machine is not damaged and is left alone. Every split and the deps catalog are checked; if none fails verification but
/// the platform rejected a module from a split, that split is invalidated anyway.
#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeStaleUnpack;

impl RecoveryStrategy for PurgeStaleUnpack {
	fn name(&self) -> &'static str {
		"purge_stale_unpack"
	}

	fn attempt(&self, ctx: &RecoveryContext<'_>) -> Result<RecoveryAction, LoadError> {
		let corrupt_image = matches!(ctx.error, LoadError::PlatformLoad { source, .. } if source.is_corrupt_image());
		if !matches!(ctx.error, LoadError::ExtractionFailed { .. }) && !corrupt_image {
			return Ok(RecoveryAction::NotApplicable);
		}

		let failed = |source: UnpackError| LoadError::ExtractionFailed {
			module: ctx.module.clone(),
			source,
		};
		let mut purged = 0usize;
		for split in ctx.sources.splits().filter(|split| split.needs_purge()) {
			tracing::warn!(split = split.name(), "purging stale split extraction");
			split.invalidate().map_err(failed)?;
			purged += 1;
		}
		if let Some(catalog) = ctx.catalog.filter(|catalog| catalog.needs_purge()) {
			tracing::warn!(dir = %catalog.unpacker().dir().display(), "purging stale deps catalog");
			catalog.invalidate().map_err(failed)?;
			purged += 1;
		}

		if purged == 0 && corrupt_image {
			let culprit = ctx.error.module();
			if let Some(split) = ctx.sources.splits().find(|split| split.provides(culprit)) {
				tracing::warn!(split = split.name(), module = %culprit, "purging split that served a damaged image");
				split.invalidate().map_err(failed)?;
				purged += 1;
			}
		}

		Ok(if purged > 0 {
			RecoveryAction::Retry
		} else {
			RecoveryAction::NotApplicable
		})
	}
}

/// Arms a disarmed backup store that holds the failing module.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArmBackupStore;

impl RecoveryStrategy for ArmBackupStore {
	fn name(&self) -> &'static str {
		"arm_backup_store"
	}

	fn attempt(&self, ctx: &RecoveryContext<'_>) -> Result<RecoveryAction, LoadError> {
		let applies = match ctx.error {
			LoadError::UnresolvedDependency { .. } => true,
			LoadError::PlatformLoad { source, .. } => source.is_corrupt_image(),
			_ => false,
		};
		if !applies {
			return Ok(RecoveryAction::NotApplicable);
		}

		let culprit = ctx.error.module();
		match ctx
			.sources
			.backups()
			.find(|backup| !backup.is_armed() && backup.holds(culprit))
		{
			Some(backup) => {
				backup.arm();
				Ok(RecoveryAction::Retry)
			}
			None => Ok(RecoveryAction::NotApplicable),
		}
	}
}
