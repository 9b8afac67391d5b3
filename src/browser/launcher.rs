use crate::config::schema::BrowserSettings;
use std::path::Path;
use std::process::{Command, Stdio};

/// Build the Chrome launch command for a CDP-controlled session
pub fn build_command(
    chrome_path: &Path,
    settings: &BrowserSettings,
    cdp_port: u16,
    user_data_dir: &Path,
) -> Command {
    let mut cmd = Command::new(chrome_path);

    // Throwaway profile so runs never touch the user's browser state
    cmd.arg(format!("--user-data-dir={}", user_data_dir.display()));
    cmd.arg(format!("--remote-debugging-port={}", cdp_port));

    cmd.arg(format!(
        "--window-size={},{}",
        settings.window_width, settings.window_height
    ));
    cmd.arg(format!(
        "--force-device-scale-factor={}",
        settings.device_scale_factor
    ));

    if settings.disable_pdf_viewer {
        cmd.arg("--disable-pdf-viewer");
    }

    if settings.headless {
        cmd.arg("--headless=new");
        cmd.arg("--disable-gpu");
    }

    cmd.arg("--no-first-run");
    cmd.arg("--no-default-browser-check");
    cmd.arg("--disable-background-networking");
    cmd.arg("--disable-sync");

    for arg in &settings.custom_args {
        cmd.arg(arg);
    }

    // Start on about:blank to avoid loading a page
    cmd.arg("about:blank");

    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|s| s.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_build_command_defaults() {
        let cmd = build_command(
            Path::new("/usr/bin/google-chrome"),
            &BrowserSettings::default(),
            9333,
            &PathBuf::from("/tmp/duet-profile"),
        );
        let args = args_of(&cmd);

        assert!(args.contains(&"--user-data-dir=/tmp/duet-profile".to_string()));
        assert!(args.contains(&"--remote-debugging-port=9333".to_string()));
        assert!(args.contains(&"--window-size=1000,1300".to_string()));
        assert!(args.contains(&"--force-device-scale-factor=1".to_string()));
        assert!(args.contains(&"--disable-pdf-viewer".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[test]
    fn test_build_command_headless_and_custom_args() {
        let settings = BrowserSettings {
            headless: true,
            disable_pdf_viewer: false,
            custom_args: vec!["--lang=en-US".to_string()],
            ..BrowserSettings::default()
        };
        let cmd = build_command(
            Path::new("/usr/bin/chromium"),
            &settings,
            9222,
            Path::new("/tmp/p"),
        );
        let args = args_of(&cmd);

        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--lang=en-US".to_string()));
        assert!(!args.contains(&"--disable-pdf-viewer".to_string()));
    }
}
