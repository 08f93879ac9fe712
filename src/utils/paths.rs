use anyhow::{anyhow, Result};
use std::path::PathBuf;

pub fn get_viewer_host_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
    Ok(home.join(".viewer-host"))
}

pub fn get_config_path() -> Result<PathBuf> {
    let host_dir = get_viewer_host_dir()?;
    Ok(host_dir.join("config.toml"))
}

pub fn get_logs_dir() -> Result<PathBuf> {
    let host_dir = get_viewer_host_dir()?;
    Ok(host_dir.join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_viewer_host_dir() {
        let dir = get_viewer_host_dir().unwrap();
        assert!(dir.to_string_lossy().ends_with(".viewer-host"));
    }

    #[test]
    fn test_get_config_path() {
        let path = get_config_path().unwrap();
        assert!(path.to_string_lossy().contains(".viewer-host"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_get_logs_dir() {
        let dir = get_logs_dir().unwrap();
        assert!(dir.to_string_lossy().contains(".viewer-host"));
        assert!(dir.to_string_lossy().ends_with("logs"));
    }
}
