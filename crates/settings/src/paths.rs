use std::path::PathBuf;

/// Resolves a per-user config directory without pulling in a platform
/// directories crate: `$XDG_CONFIG_HOME/meridian` or `$HOME/.config/meridian`
/// on Unix, `%APPDATA%\meridian` on Windows.
pub fn default_config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("meridian");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("meridian");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("meridian");
    }
    PathBuf::from(".meridian")
}

pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.json")
}
