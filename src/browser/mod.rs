//! Browser control over the Chrome DevTools Protocol.

pub mod cdp;
pub mod launcher;
pub mod port;

pub use cdp::CdpClient;

use crate::error::Result;
use async_trait::async_trait;

/// Which elements `click_text` considers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    /// Only `<a>` elements
    Link,
    /// Anything clickable: links, buttons, submit inputs, `[role=button]`, `[onclick]`
    Clickable,
}

impl ClickTarget {
    /// `"link"` selects links, every other element type is a generic clickable
    pub fn from_element_type(element_type: &str) -> Self {
        if element_type == "link" {
            ClickTarget::Link
        } else {
            ClickTarget::Clickable
        }
    }
}

/// Result of a text search on the current page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMatches {
    /// Number of elements whose own text contains the query
    pub total: usize,
    /// 1-indexed match that was scrolled into view, if it existed
    pub focused: Option<usize>,
}

/// The browser operations the action tools need.
///
/// `CdpClient` is the real implementation; tests drive the tools and the
/// workflow runner with in-memory fakes.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate the active page and wait for it to load
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Current page URL as reported by the browser
    async fn current_url(&self) -> Result<String>;

    /// Click the first element of `target` kind whose visible text matches `text`
    async fn click_text(&self, text: &str, target: ClickTarget) -> Result<()>;

    /// Count elements containing `text` and scroll the `nth` (1-indexed) into view
    async fn search_text(&self, text: &str, nth: usize) -> Result<TextMatches>;

    /// Capture the viewport as PNG bytes
    async fn screenshot_png(&self) -> Result<Vec<u8>>;
}
