use crate::{
    abi::{CreateEstimatorFn, DestroyEstimatorFn, CREATE_SYMBOL, DESTROY_SYMBOL},
    config::{ExtensionConfig, MODULE_PATH_ENV},
    error::LoadError,
};
use libloading::Library;
use std::{fmt, path::Path, sync::OnceLock};

/// Discovery outcome, decided by the first caller and fixed for the rest of the process.
static EXTENSION: OnceLock<Option<ExtensionModule>> = OnceLock::new();

/// The two functions an extension library exports.
#[derive(Clone, Copy)]
pub struct ExtensionEntryPoints {
    pub create: CreateEstimatorFn,
    pub destroy: DestroyEstimatorFn,
}

impl fmt::Debug for ExtensionEntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionEntryPoints")
            .field("create", &(self.create as *const ()))
            .field("destroy", &(self.destroy as *const ()))
            .finish()
    }
}

/// A loaded extension library.
///
/// The library stays mapped for as long as this value lives, the process-wide module is never
/// dropped.
pub struct ExtensionModule {
    entry_points: ExtensionEntryPoints,
    _library: Library,
}

impl ExtensionModule {
    pub fn load(path: &Path) -> Result<ExtensionModule, LoadError> {
        // Running the library's initializers is inherent to loading a module
        let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Library {
            path: path.to_owned(),
            source,
        })?;

        let create = unsafe { resolve::<CreateEstimatorFn>(&library, CREATE_SYMBOL)? };
        let destroy = unsafe { resolve::<DestroyEstimatorFn>(&library, DESTROY_SYMBOL)? };

        Ok(ExtensionModule {
            entry_points: ExtensionEntryPoints { create, destroy },
            _library: library,
        })
    }

    pub fn entry_points(&self) -> ExtensionEntryPoints {
        self.entry_points
    }
}

impl fmt::Debug for ExtensionModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionModule")
            .field("entry_points", &self.entry_points)
            .finish_non_exhaustive()
    }
}

/// The copied function pointer is only valid while `library` stays loaded.
unsafe fn resolve<T: Copy>(library: &Library, symbol: &'static str) -> Result<T, LoadError> {
    unsafe { library.get::<T>(symbol.as_bytes()) }
        .map(|function| *function)
        .map_err(|source| LoadError::MissingSymbol { symbol, source })
}

/// Loads the module named by `config`, logging and swallowing every failure.
pub fn discover(config: &ExtensionConfig) -> Option<ExtensionModule> {
    let Some(path) = config.module_path.as_deref() else {
        log::debug!("`{MODULE_PATH_ENV}` not set, using the default video timing estimator");
        return None;
    };

    match ExtensionModule::load(path) {
        Ok(module) => {
            log::debug!("Loaded video timing estimator from '{}'", path.display());
            Some(module)
        }
        Err(e) => {
            log::warn!("{e}, using the default video timing estimator");
            None
        }
    }
}

/// The process-wide extension, discovered from the environment on first use.
pub fn extension() -> Option<&'static ExtensionModule> {
    EXTENSION
        .get_or_init(|| discover(&ExtensionConfig::from_env()))
        .as_ref()
}

/// Whether the process-wide discovery found an extension. Triggers discovery if needed.
pub fn is_loaded() -> bool {
    extension().is_some()
}
