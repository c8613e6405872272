use std::{
    env::consts::{DLL_PREFIX, DLL_SUFFIX},
    path::PathBuf,
};

/// The cdylib cargo built next to this test binary.
pub fn built_library() -> PathBuf {
    let file_name = format!("{DLL_PREFIX}min_delay_estimator{DLL_SUFFIX}");
    let exe = std::env::current_exe().unwrap();
    // target/<profile>/deps/<test binary>
    let deps = exe.parent().unwrap();

    [deps, deps.parent().unwrap()]
        .iter()
        .map(|dir| dir.join(&file_name))
        .find(|path| path.exists())
        .unwrap_or_else(|| panic!("{file_name} not found next to {}", exe.display()))
}
