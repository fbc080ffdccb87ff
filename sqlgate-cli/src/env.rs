use std::path::PathBuf;

use tracing::debug;

/// Load environment variables from .env files in multiple locations
///
/// Priority order (highest to lowest):
/// 1. Environment variables already set
/// 2. Current directory .env
/// 3. ~/.sqlgate/.env
///
/// dotenvy never overwrites a variable that is already set, so loading
/// the current directory first gives it precedence over the home file.
///
/// Returns the files that were loaded. Runs before tracing is set up, so
/// the caller logs the result.
pub fn load_dotenv() -> Vec<PathBuf> {
    let mut loaded_from = Vec::new();

    if let Ok(path) = dotenvy::dotenv() {
        loaded_from.push(path);
    }

    if let Some(env_file) = config_dir().map(|dir| dir.join(".env")) {
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => loaded_from.push(env_file),
                Err(e) => debug!("Failed to load {}: {}", env_file.display(), e),
            }
        }
    }

    loaded_from
}

/// Get the sqlgate config directory path (~/.sqlgate)
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".sqlgate"))
}
