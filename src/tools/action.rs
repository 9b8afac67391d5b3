use crate::browser::{BrowserDriver, ClickTarget};
use crate::error::{DuetError, Result};
use crate::state::{Screenshot, SessionState};
use crate::tools::outcome::{ToolErrorKind, ToolOutcome};
use serde_json::json;
use std::time::Duration;

/// Pause before capturing so the page can finish painting
pub const SCREENSHOT_SETTLE: Duration = Duration::from_secs(1);

/// Prefix `http://` when the URL has no scheme, so `example.com` works
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") || url.starts_with("about:") || url.starts_with("data:") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

/// Navigate to a URL. Browser faults are returned as `Err` and end the run.
pub async fn navigate_to(
    browser: &dyn BrowserDriver,
    state: &mut SessionState,
    url: &str,
) -> Result<ToolOutcome> {
    let url = normalize_url(url);
    browser.navigate(&url).await?;
    state.current_url = url.clone();
    Ok(ToolOutcome::with_data(
        format!("Navigated to {}", url),
        json!({ "url": url }),
    ))
}

/// Click an element by its visible text, then record wherever the page
/// ended up in `state.current_url`.
///
/// Never fails: interaction faults come back as an `Interaction` outcome
/// whose message starts with "Error".
pub async fn click_element(
    browser: &dyn BrowserDriver,
    state: &mut SessionState,
    text: &str,
    element_type: &str,
) -> ToolOutcome {
    let target = ClickTarget::from_element_type(element_type);
    match browser.click_text(text, target).await {
        Ok(()) => {
            match browser.current_url().await {
                Ok(url) if !url.is_empty() => state.current_url = url,
                Ok(_) => {}
                Err(e) => tracing::debug!("Could not read URL after click: {}", e),
            }
            ToolOutcome::success(format!("Clicked {} with text: {}", element_type, text))
        }
        Err(e) => {
            tracing::debug!("Click on '{}' failed: {}", text, e);
            ToolOutcome::failure(
                ToolErrorKind::Interaction,
                format!("Error clicking element: {}", e),
            )
        }
    }
}

/// Find elements containing `text` and scroll the `nth_result`-th (1-indexed)
/// into view. A missing match is reported, not raised; `nth_result < 1` is
/// a malformed call and is raised.
pub async fn search_text(
    browser: &dyn BrowserDriver,
    text: &str,
    nth_result: i64,
) -> Result<ToolOutcome> {
    if nth_result < 1 {
        return Err(DuetError::InvalidToolArguments {
            tool: "search_text".to_string(),
            message: format!("nth_result must be 1 or greater, got {}", nth_result),
        });
    }
    let nth = usize::try_from(nth_result).map_err(|_| DuetError::InvalidToolArguments {
        tool: "search_text".to_string(),
        message: format!("nth_result {} is out of range", nth_result),
    })?;

    let matches = browser.search_text(text, nth).await?;

    match matches.focused {
        Some(focused) => Ok(ToolOutcome::with_data(
            format!(
                "Found {} matches for '{}'. Focused on element {}",
                matches.total, text, focused
            ),
            json!({ "total": matches.total, "focused": focused }),
        )),
        None => Ok(ToolOutcome::failure(
            ToolErrorKind::NotFound,
            format!(
                "Match n°{} not found (only {} matches found)",
                nth, matches.total
            ),
        )),
    }
}

/// Wait for rendering to settle, capture the viewport and append it to the
/// session's screenshots. Capture faults are returned as `Err`.
pub async fn take_screenshot(
    browser: &dyn BrowserDriver,
    state: &mut SessionState,
) -> Result<ToolOutcome> {
    tokio::time::sleep(SCREENSHOT_SETTLE).await;

    let png = browser.screenshot_png().await?;
    let screenshot = Screenshot::from_png(png)?;
    let (width, height) = (screenshot.width, screenshot.height);
    let index = state.push_screenshot(screenshot);
    tracing::info!(index, width, height, "Screenshot stored");

    Ok(ToolOutcome::with_data(
        format!("Screenshot taken: ({}, {}) pixels", width, height),
        json!({ "width": width, "height": height, "index": index }),
    ))
}


#[cfg(test)]
mod tests {
    use super::fake::FakeBrowser;
    use super::*;

    fn login_page() -> FakeBrowser {
        FakeBrowser {
            links: vec!["Home".to_string(), "Login here".to_string()],
            buttons: vec!["Submit".to_string()],
            texts: vec![
                "Welcome".to_string(),
                "Login".to_string(),
                "Login with SSO".to_string(),
            ],
            ..FakeBrowser::default()
        }
    }

    #[tokio::test]
    async fn test_navigate_records_url() {
        let browser = FakeBrowser::default();
        let mut state = SessionState::new();

        let outcome = navigate_to(&browser, &mut state, "https://example.com")
            .await
            .unwrap();

        assert_eq!(outcome.message(), "Navigated to https://example.com");
        assert_eq!(state.current_url, "https://example.com");
        assert_eq!(*browser.visited.lock().unwrap(), vec!["https://example.com"]);
    }

    #[tokio::test]
    async fn test_navigate_failure_propagates() {
        let browser = FakeBrowser {
            fail_navigation: true,
            ..FakeBrowser::default()
        };
        let mut state = SessionState::new();

        let result = navigate_to(&browser, &mut state, "https://nowhere.invalid").await;
        assert!(matches!(result, Err(DuetError::Browser(_))));
        assert!(state.current_url.is_empty());
    }

    #[tokio::test]
    async fn test_navigate_adds_missing_scheme() {
        let browser = FakeBrowser::default();
        let mut state = SessionState::new();

        let outcome = navigate_to(&browser, &mut state, "example.com").await.unwrap();

        assert_eq!(outcome.message(), "Navigated to http://example.com");
        assert_eq!(*browser.visited.lock().unwrap(), vec!["http://example.com"]);
        assert_eq!(state.current_url, "http://example.com");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
        assert_eq!(normalize_url(" example.com/path "), "http://example.com/path");
        assert_eq!(normalize_url("about:blank"), "about:blank");
        assert_eq!(normalize_url("data:text/html,hi"), "data:text/html,hi");
    }

    #[tokio::test]
    async fn test_click_link_and_button() {
        let browser = login_page();
        let mut state = SessionState::new();

        let outcome = click_element(&browser, &mut state, "Login", "link").await;
        assert_eq!(outcome.message(), "Clicked link with text: Login");

        let outcome = click_element(&browser, &mut state, "Submit", "button").await;
        assert!(outcome.is_ok());

        let clicked = browser.clicked.lock().unwrap();
        assert_eq!(clicked[0].1, ClickTarget::Link);
        assert_eq!(clicked[1].1, ClickTarget::Clickable);
    }

    #[tokio::test]
    async fn test_click_failure_is_reported_not_raised() {
        let browser = login_page();
        let mut state = SessionState::new();

        // Buttons are not links
        let outcome = click_element(&browser, &mut state, "Submit", "link").await;
        assert_eq!(outcome.error_kind(), Some(ToolErrorKind::Interaction));
        assert!(outcome.message().contains("Error"));

        let outcome = click_element(&browser, &mut state, "Missing", "button").await;
        assert!(outcome.message().starts_with("Error clicking element:"));
    }

    #[tokio::test]
    async fn test_click_refreshes_current_url() {
        let browser = FakeBrowser {
            links: vec!["Next".to_string()],
            link_targets: vec![("Next".to_string(), "https://a.test/next".to_string())],
            ..FakeBrowser::default()
        };
        let mut state = SessionState::new();

        navigate_to(&browser, &mut state, "https://a.test").await.unwrap();
        let outcome = click_element(&browser, &mut state, "Next", "link").await;

        assert!(outcome.is_ok());
        assert_eq!(state.current_url, "https://a.test/next");
    }

    #[tokio::test]
    async fn test_click_survives_unreadable_url() {
        let browser = FakeBrowser {
            links: vec!["Next".to_string()],
            fail_url_read: true,
            ..FakeBrowser::default()
        };
        let mut state = SessionState::new();
        state.current_url = "https://a.test".to_string();

        let outcome = click_element(&browser, &mut state, "Next", "link").await;

        assert!(outcome.is_ok());
        assert_eq!(state.current_url, "https://a.test");
    }

    #[tokio::test]
    async fn test_search_text_focuses_requested_match() {
        let browser = login_page();

        let outcome = search_text(&browser, "Login", 2).await.unwrap();
        assert_eq!(
            outcome.message(),
            "Found 2 matches for 'Login'. Focused on element 2"
        );
        assert_eq!(*browser.scrolled_to.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_search_text_past_last_match() {
        let browser = login_page();

        let outcome = search_text(&browser, "Login", 5).await.unwrap();
        assert_eq!(
            outcome.message(),
            "Match n°5 not found (only 2 matches found)"
        );
        assert_eq!(outcome.error_kind(), Some(ToolErrorKind::NotFound));
        assert!(browser.scrolled_to.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_text_no_matches() {
        let browser = login_page();
        let outcome = search_text(&browser, "Checkout", 1).await.unwrap();
        assert_eq!(
            outcome.message(),
            "Match n°1 not found (only 0 matches found)"
        );
    }

    #[tokio::test]
    async fn test_search_text_rejects_zero_index() {
        let browser = login_page();
        for bad in [0, -3] {
            let result = search_text(&browser, "Login", bad).await;
            assert!(matches!(
                result,
                Err(DuetError::InvalidToolArguments { .. })
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_screenshots_accumulate() {
        let browser = FakeBrowser::default();
        let mut state = SessionState::new();

        for expected in 1..=3 {
            let outcome = take_screenshot(&browser, &mut state).await.unwrap();
            assert_eq!(outcome.message(), "Screenshot taken: (1000, 1300) pixels");
            assert_eq!(state.screenshots.len(), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_screenshot_waits_for_settle() {
        let browser = FakeBrowser::default();
        let mut state = SessionState::new();

        let start = tokio::time::Instant::now();
        take_screenshot(&browser, &mut state).await.unwrap();
        assert!(start.elapsed() >= SCREENSHOT_SETTLE);
    }
}
