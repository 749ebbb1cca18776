use crate::error::{Error, Result};
use crate::slugify;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Default environment directory, relative to the session file.
pub const DEFAULT_ENVDIR: &str = ".drover";

/// Default session file name.
pub const SESSION_FILE: &str = "drover.toml";

/// Marker written into every environment directory we create.
pub const ENV_MARKER: &str = ".drover-env.json";

const MAX_ENV_DIR_NAME: usize = 100;

/// Resolve the configured envdir (`~` and `$VAR` expanded) against the project root.
pub fn envdir(root: &Path, configured: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(configured).map_err(|e| {
        Error::config_invalid_value("options.envdir", Some(configured.to_string()), e.to_string())
    })?;
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(root.join(path))
    }
}

/// Directory for one instance's environment. Long names collapse to a digest
/// so they stay within filesystem limits.
pub fn env_location(envdir: &Path, instance_id: &str) -> Result<PathBuf> {
    let slug = slugify::slugify_id(instance_id, "instance")?;
    if slug.len() <= MAX_ENV_DIR_NAME {
        return Ok(envdir.join(slug));
    }
    let digest = format!("{:x}", Sha256::digest(slug.as_bytes()));
    Ok(envdir.join(digest))
}

/// Executable directory inside an environment.
pub fn bin_dir(location: &Path) -> PathBuf {
    if cfg!(windows) {
        location.join("Scripts")
    } else {
        location.join("bin")
    }
}

pub fn env_marker(location: &Path) -> PathBuf {
    location.join(ENV_MARKER)
}
