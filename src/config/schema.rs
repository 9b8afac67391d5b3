use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chrome executable path
    #[serde(default = "AppConfig::default_chrome_path")]
    pub chrome_path: PathBuf,

    /// Browser window and launch settings
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Language model configuration
    #[serde(default)]
    pub ai: AIConfig,

    /// Workflow runner limits
    #[serde(default)]
    pub workflow: WorkflowSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chrome_path: Self::default_chrome_path(),
            browser: BrowserSettings::default(),
            ai: AIConfig::default(),
            workflow: WorkflowSettings::default(),
        }
    }
}

impl AppConfig {
    /// Get default Chrome path based on platform
    fn default_chrome_path() -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            PathBuf::from("C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe")
        }
        #[cfg(target_os = "macos")]
        {
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome")
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            PathBuf::from("/usr/bin/google-chrome")
        }
    }

    /// Apply `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `CHROME_PATH` on top of
    /// the file values. The process environment wins over a `.env` file found
    /// in the working directory or one of its parents.
    pub fn apply_env_overrides(&mut self) {
        let dotenv = read_env_file(dotenvy::from_filename_iter(".env"));
        self.apply_overrides(layered(|key| std::env::var(key).ok(), &dotenv));
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.ai.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.ai.base_url = url;
        }
        if let Some(path) = lookup("CHROME_PATH").filter(|p| !p.trim().is_empty()) {
            self.chrome_path = PathBuf::from(path);
        }
    }
}

/// Collect the variables of a `.env` file; a missing file yields none
pub(crate) fn read_env_file<R: Read>(
    entries: dotenvy::Result<dotenvy::Iter<R>>,
) -> HashMap<String, String> {
    let iter = match entries {
        Ok(iter) => iter,
        Err(e) if e.not_found() => return HashMap::new(),
        Err(e) => {
            tracing::warn!("Failed to open .env file: {}", e);
            return HashMap::new();
        }
    };

    let mut vars = HashMap::new();
    for entry in iter {
        match entry {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(e) => {
                tracing::warn!("Stopped reading .env file: {}", e);
                break;
            }
        }
    }
    tracing::debug!("Read {} variables from .env", vars.len());
    vars
}

/// Look a key up in `primary`, then in `fallback`
pub(crate) fn layered<'a, F>(
    primary: F,
    fallback: &'a HashMap<String, String>,
) -> impl Fn(&str) -> Option<String> + 'a
where
    F: Fn(&str) -> Option<String> + 'a,
{
    move |key| primary(key).or_else(|| fallback.get(key).cloned())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserSettings {
    /// Window width in CSS pixels
    #[serde(default = "default_window_width")]
    pub window_width: u32,

    /// Window height in CSS pixels
    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// Forced device scale factor
    #[serde(default = "default_scale_factor")]
    pub device_scale_factor: f32,

    /// Disable the built-in PDF viewer so PDFs download instead of rendering
    #[serde(default = "default_true")]
    pub disable_pdf_viewer: bool,

    /// Run Chrome without a visible window
    #[serde(default)]
    pub headless: bool,

    /// Extra Chrome arguments
    #[serde(default)]
    pub custom_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            device_scale_factor: default_scale_factor(),
            disable_pdf_viewer: true,
            headless: false,
            custom_args: Vec::new(),
        }
    }
}

/// OpenAI-compatible chat completion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIConfig {
    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL for the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; `OPENAI_API_KEY` takes precedence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for AIConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSettings {
    /// Maximum model turns before a run is abandoned
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

fn default_window_width() -> u32 {
    1000
}

fn default_window_height() -> u32 {
    1300
}

fn default_scale_factor() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    120
}

fn default_max_steps() -> u32 {
    crate::workflow::DEFAULT_MAX_STEPS
}
