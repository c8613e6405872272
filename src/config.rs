use serde::{Deserialize, Serialize};
use std::{ffi::OsStr, path::PathBuf};

/// Names the dynamic library providing an alternative estimator.
pub const MODULE_PATH_ENV: &str = "VIDEO_TIMING_ESTIMATOR_MODULE";

/// Where to look for an external video timing estimator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    /// Path handed to the platform loader. `None` keeps the built-in estimator.
    pub module_path: Option<PathBuf>,
}

impl ExtensionConfig {
    pub fn with_module_path(path: impl Into<PathBuf>) -> Self {
        Self {
            module_path: Some(path.into()),
        }
    }

    /// Reads [`MODULE_PATH_ENV`].
    pub fn from_env() -> Self {
        Self::from_env_var(MODULE_PATH_ENV)
    }

    /// Reads the module path from `name`. Unset and empty values both mean no module.
    pub fn from_env_var(name: impl AsRef<OsStr>) -> Self {
        let module_path = std::env::var_os(name)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self { module_path }
    }
}
