use anyhow::{Result, bail};
use std::ffi::OsString;
use std::{env, path::PathBuf};

#[derive(Debug, Clone)]
pub struct Paths {
    pub home: PathBuf,
    pub config: PathBuf,
}

/// `$XDG_CONFIG_HOME/cf-tool`, falling back to `$HOME/.config/cf-tool`.
pub fn cf_home() -> Result<PathBuf> {
    home_from(env::var_os("XDG_CONFIG_HOME"), env::var_os("HOME"))
}

/// Empty values count as unset.
fn home_from(xdg: Option<OsString>, home: Option<OsString>) -> Result<PathBuf> {
    if let Some(xdg) = xdg.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join("cf-tool"));
    }
    match home.filter(|v| !v.is_empty()) {
        Some(home) => Ok(PathBuf::from(home).join(".config").join("cf-tool")),
        None => bail!("neither XDG_CONFIG_HOME nor HOME is set"),
    }
}

pub fn paths() -> Result<Paths> {
    let home = cf_home()?;
    Ok(Paths {
        config: home.join("config.toml"),
        home,
    })
}
