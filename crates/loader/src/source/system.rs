use soload_deps::ModuleName;

use super::{ModuleHandle, Resolution, SourceKind};
use crate::platform::Location;

/// Terminal fallback that defers to the platform's own search path.
///
/// Always answers `Found`; whether the module really exists is only learned when the
/// platform tries to load it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSource;

impl SystemSource {
	pub fn resolve(&self, module: &ModuleName) -> Resolution {
		Resolution::Found(ModuleHandle {
			module: module.clone(),
			location: Location::System(module.clone()),
			origin: SourceKind::System,
			declared: Some(Vec::new()),
		})
	}

	pub fn describe(&self) -> String {
		"system search path".to_string()
	}
}
