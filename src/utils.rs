//! Utility functions for directory management and string bounds
//!
//! # Directory Structure
//!
//! - Config: `%APPDATA%\winfw\config\` - User configuration files
//! - Data: `%APPDATA%\winfw\data\` - Audit log
//!
//! On non-Windows hosts the `directories` crate picks the platform equivalents.

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "winfw", "winfw")
}

pub fn get_config_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.config_dir().to_path_buf())
}

pub fn get_data_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.data_dir().to_path_buf())
}

pub fn ensure_dirs() -> std::io::Result<()> {
    if let Some(dir) = get_config_dir() {
        std::fs::create_dir_all(dir)?;
    }
    if let Some(dir) = get_data_dir() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Truncates a string to at most `max_bytes` bytes without splitting a UTF-8 character
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
