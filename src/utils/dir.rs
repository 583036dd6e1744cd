use std::{env, io, path::PathBuf};

use anyhow::{anyhow, Result};

const APPLICATION_DIR: &str = "focustrace";

/// Directory holding activity partitions.
pub const ACTIVITY_DIR: &str = "activity";

/// Directory holding diagnostic logs.
pub const LOGS_DIR: &str = "logs";

/// Resolves the application directory, preferring an explicit one, and makes sure it exists.
pub fn resolve_application_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    let path = match explicit {
        Some(path) => path,
        None => default_application_path()?,
    };

    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}

fn default_application_path() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let mut path = env::var("APPDATA")
            .map(PathBuf::from)
            .map_err(|_| anyhow!("APPDATA should be present on Windows"))?;
        path.push(APPLICATION_DIR);
        Ok(path)
    }
    #[cfg(not(windows))]
    {
        let mut path = env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .or_else(|_| {
                env::var("HOME").map(|home| {
                    let mut path = PathBuf::from(home);
                    path.push(".local/state");
                    path
                })
            })
            .map_err(|_| anyhow!("Couldn't find neither XDG_STATE_HOME nor HOME"))?;
        path.push(APPLICATION_DIR);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::resolve_application_path;

    #[test]
    fn explicit_directory_is_created() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let nested = dir.path().join("nested").join("state");
        let resolved = resolve_application_path(Some(nested.clone()))?;
        assert_eq!(resolved, nested);
        assert!(nested.is_dir());
        Ok(())
    }
}
