//! Model cache discovery
//!
//! Finds the directory embedding model files are cached in across
//! different installation scenarios.

use std::path::{Path, PathBuf};

/// Environment variable overriding the model cache directory
pub const MODELS_PATH_ENV: &str = "LISTING_MODELS_PATH";

/// Find the model cache directory with priority:
/// 1. LISTING_MODELS_PATH environment variable
/// 2. Bundled location (`<base>/models`)
/// 3. User home directory (~/.listing-retrieval/models)
/// 4. `models` relative to the working directory
///
/// Only the first two need to exist already; the model is downloaded into
/// the chosen directory on first use.
pub fn find_model_cache_dir(base: Option<&Path>) -> PathBuf {
    // Priority 1: explicit override
    if let Ok(models_path) = std::env::var(MODELS_PATH_ENV) {
        let path = PathBuf::from(&models_path);
        if path.is_dir() {
            log::info!("Using {}: {}", MODELS_PATH_ENV, path.display());
            return path;
        }
        log::warn!(
            "{} set but directory not found: {}",
            MODELS_PATH_ENV,
            models_path
        );
    }

    // Priority 2: bundled next to the install
    if let Some(base) = base {
        let bundled = base.join("models");
        if bundled.is_dir() {
            log::info!("Using bundled models: {}", bundled.display());
            return bundled;
        }
    }

    // Priority 3: user home directory
    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        let user_path = PathBuf::from(home).join(".listing-retrieval").join("models");
        log::info!("Using user model cache: {}", user_path.display());
        return user_path;
    }

    PathBuf::from("models")
}

/// Directory holding the running executable
pub fn install_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Model cache directory for this install, with bundled models looked up
/// next to the executable
pub fn default_model_cache_dir() -> PathBuf {
    find_model_cache_dir(install_dir().as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_dir_is_used_when_present() {
        // Skip when the override is set in the environment running the tests
        if std::env::var(MODELS_PATH_ENV).is_ok() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("models")).unwrap();
        assert_eq!(
            find_model_cache_dir(Some(dir.path())),
            dir.path().join("models")
        );
    }

    #[test]
    fn test_missing_bundled_dir_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let found = find_model_cache_dir(Some(dir.path()));
        assert_ne!(found, dir.path().join("models"));
    }

    #[test]
    fn test_default_dir_looks_next_to_executable() {
        let install = install_dir().unwrap();
        assert!(install.is_dir());
        assert!(std::env::current_exe().unwrap().starts_with(&install));
        assert_eq!(
            default_model_cache_dir(),
            find_model_cache_dir(Some(&install))
        );
    }
}
