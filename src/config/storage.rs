use crate::config::schema::AppConfig;
use crate::error::{DuetError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration file path based on platform
pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("duet"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

/// Load configuration from the platform path, creating a default file if missing.
/// Environment overrides are applied after the file is read.
pub fn load_config() -> Result<AppConfig> {
    let mut config = load_config_from(&get_config_path())?;
    config.apply_env_overrides();
    Ok(config)
}

/// Load configuration from an explicit path, creating a default file if missing
pub fn load_config_from(config_path: &Path) -> Result<AppConfig> {
    if !config_path.exists() {
        tracing::info!(
            "Config file not found at {:?}, creating default",
            config_path
        );
        let config = AppConfig::default();
        save_config_to(&config, config_path)?;
        return Ok(config);
    }

    let content = fs::read_to_string(config_path).map_err(|e| {
        DuetError::Config(format!(
            "Failed to read config from {:?}: {}",
            config_path, e
        ))
    })?;

    let config: AppConfig = toml::from_str(&content)?;

    tracing::info!("Loaded config from {:?}", config_path);
    Ok(config)
}

/// Save configuration to a file. The API key is never written back.
pub fn save_config_to(config: &AppConfig, config_path: &Path) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            DuetError::Config(format!(
                "Failed to create config directory {:?}: {}",
                parent, e
            ))
        })?;
    }

    let mut stored = config.clone();
    stored.ai.api_key = None;
    let content = toml::to_string_pretty(&stored)?;

    fs::write(config_path, content).map_err(|e| {
        DuetError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::info!("Saved config to {:?}", config_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("duet-config-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_config_path() {
        let path = get_config_path();
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn test_missing_file_creates_default() {
        let path = scratch_path("config.toml");
        let config = load_config_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.ai.model, "gpt-4");
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_save_drops_api_key() {
        let path = scratch_path("config.toml");
        let mut config = AppConfig::default();
        config.ai.api_key = Some("sk-secret".to_string());
        config.workflow.max_steps = 7;
        save_config_to(&config, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("sk-secret"));

        let reloaded = load_config_from(&path).unwrap();
        assert_eq!(reloaded.workflow.max_steps, 7);
        assert!(reloaded.ai.api_key.is_none());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let path = scratch_path("config.toml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "chrome_path = [").unwrap();
        assert!(matches!(
            load_config_from(&path),
            Err(DuetError::TomlDeserialize(_))
        ));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
