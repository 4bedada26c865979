use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "app";
pub const APP_ORG: &str = "pairlink";
pub const APP_NAME: &str = "pairlink";

pub fn data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(override_dir) = std::env::var("PAIRLINK_DATA_DIR") {
        return Ok(PathBuf::from(override_dir));
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}
