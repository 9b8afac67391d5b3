use crate::error::{DuetError, Result};
use serde::Serialize;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// A captured viewport image
#[derive(Debug, Clone, Serialize)]
pub struct Screenshot {
    #[serde(skip)]
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Unix timestamp (ms)
    pub captured_at: u64,
}

impl Screenshot {
    /// Wrap PNG bytes, reading the dimensions from the IHDR chunk
    pub fn from_png(png: Vec<u8>) -> Result<Self> {
        let (width, height) = png_dimensions(&png)?;
        Ok(Self {
            png,
            width,
            height,
            captured_at: now_ms(),
        })
    }
}

/// State shared by every tool call of one workflow run.
///
/// Screenshots are only ever appended.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    pub screenshots: Vec<Screenshot>,
    pub current_url: String,
    pub extracted_info: String,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a screenshot and return its 0-based index
    pub fn push_screenshot(&mut self, screenshot: Screenshot) -> usize {
        self.screenshots.push(screenshot);
        self.screenshots.len() - 1
    }

    pub fn latest_screenshot(&self) -> Option<&Screenshot> {
        self.screenshots.last()
    }
}

/// Width and height from a PNG header.
///
/// Layout: 8-byte signature, then the IHDR chunk (4-byte length, "IHDR",
/// 4-byte big-endian width, 4-byte big-endian height).
pub fn png_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    if bytes.len() < 24 || &bytes[0..8] != PNG_SIGNATURE {
        return Err(DuetError::Browser("Screenshot is not a PNG".to_string()));
    }
    if &bytes[12..16] != b"IHDR" {
        return Err(DuetError::Browser(
            "PNG is missing its IHDR chunk".to_string(),
        ));
    }

    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    Ok((width, height))
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
pub(crate) fn fake_png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = PNG_SIGNATURE.to_vec();
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_dimensions() {
        let png = fake_png(1000, 1300);
        assert_eq!(png_dimensions(&png).unwrap(), (1000, 1300));
    }

    #[test]
    fn test_png_dimensions_rejects_other_formats() {
        assert!(png_dimensions(b"\xff\xd8\xff\xe0 not a png at all, really").is_err());
        assert!(png_dimensions(&PNG_SIGNATURE[..]).is_err());
    }

    #[test]
    fn test_screenshots_only_grow() {
        let mut state = SessionState::new();
        assert!(state.latest_screenshot().is_none());

        for i in 0..3 {
            let shot = Screenshot::from_png(fake_png(10 + i, 20)).unwrap();
            assert_eq!(state.push_screenshot(shot), i as usize);
        }

        assert_eq!(state.screenshots.len(), 3);
        assert_eq!(state.latest_screenshot().unwrap().width, 12);
    }
}
