use crate::config::schema::{AIConfig, AppConfig, BrowserSettings};
use crate::error::{DuetError, Result};
use std::path::Path;

/// Validate Chrome executable path
pub fn validate_chrome_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(DuetError::Validation(format!(
            "Chrome executable not found at {:?}",
            path
        )));
    }

    if !path.is_file() {
        return Err(DuetError::Validation(format!(
            "Chrome path {:?} is not a file",
            path
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = path.metadata().map_err(|e| {
            DuetError::Validation(format!("Cannot read Chrome file metadata: {}", e))
        })?;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(DuetError::Validation(format!(
                "Chrome executable {:?} is not executable",
                path
            )));
        }
    }

    Ok(())
}

pub fn validate_browser_settings(settings: &BrowserSettings) -> Result<()> {
    if settings.window_width == 0 || settings.window_height == 0 {
        return Err(DuetError::Validation(format!(
            "Window size must be non-zero, got {}x{}",
            settings.window_width, settings.window_height
        )));
    }

    if settings.device_scale_factor.is_nan() || settings.device_scale_factor <= 0.0 {
        return Err(DuetError::Validation(format!(
            "Device scale factor must be positive, got {}",
            settings.device_scale_factor
        )));
    }

    Ok(())
}

pub fn validate_ai_config(ai: &AIConfig) -> Result<()> {
    if ai.model.trim().is_empty() {
        return Err(DuetError::Validation("Model cannot be empty".to_string()));
    }

    if !ai.base_url.starts_with("http://") && !ai.base_url.starts_with("https://") {
        return Err(DuetError::Validation(format!(
            "Invalid base URL: {}. Must start with http:// or https://",
            ai.base_url
        )));
    }

    Ok(())
}

/// Validate everything except the Chrome path, which is only checked right
/// before launch.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    validate_browser_settings(&config.browser)?;
    validate_ai_config(&config.ai)?;

    if config.workflow.max_steps == 0 {
        return Err(DuetError::Validation(
            "workflow.max_steps must be at least 1".to_string(),
        ));
    }

    Ok(())
}
