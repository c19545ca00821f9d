use std::{fs::create_dir_all, path::PathBuf};

use xdg::BaseDirectories;

use crate::Result;

/// Returns the path to the solidcard configuration directory. If it doesn't exist when this
/// function is called, it will be created.
pub fn config_dir() -> Result<PathBuf> {
    let path = xdg_prefix().get_config_home().ok_or_else(no_home)?;

    create_dir_all(&path)?;

    Ok(path)
}

/// Returns the path to the solidcard state directory. If it doesn't exist when this function is
/// called, it will be created.
pub fn state_dir() -> Result<PathBuf> {
    let path = xdg_prefix().get_state_home().ok_or_else(no_home)?;

    create_dir_all(&path)?;

    Ok(path)
}

fn xdg_prefix() -> BaseDirectories {
    xdg::BaseDirectories::with_prefix("solidcard")
}

fn no_home() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotFound, "$HOME must exist")
}
