use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;

use crate::error::Result;

/// The ways a Takeout page exposes archive downloads, in the order they are searched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// `<a download>`
    DownloadAttribute,
    /// A link whose text mentions "Download"
    DownloadLink,
    /// A button whose text mentions "Download"
    DownloadButton,
    /// A link straight to a `.zip`
    ZipHref,
}

impl Selector {
    pub const ALL: [Selector; 4] = [
        Selector::DownloadAttribute,
        Selector::DownloadLink,
        Selector::DownloadButton,
        Selector::ZipHref,
    ];

    /// Stable label used in target keys and the progress record
    pub fn label(&self) -> &'static str {
        match self {
            Selector::DownloadAttribute => "a[download]",
            Selector::DownloadLink => "a:has-text('Download')",
            Selector::DownloadButton => "button:has-text('Download')",
            Selector::ZipHref => "a[href$='.zip']",
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One clickable element that should start an archive download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub selector: Selector,
    /// Position among the elements matching `selector`
    pub index: usize,
    pub href: Option<String>,
}

impl DownloadTarget {
    pub fn new(selector: Selector, index: usize, href: Option<String>) -> Self {
        Self {
            selector,
            index,
            href,
        }
    }

    /// `"<selector>:<index>:<href>"`
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.selector.label(),
            self.index,
            self.href.as_deref().unwrap_or("")
        )
    }
}

/// Drop targets already seen, by key or by href
///
/// The same `<a download href=...>` usually matches several selectors; only the
/// first match is kept so each archive part is clicked once.
pub fn dedupe_targets(targets: Vec<DownloadTarget>) -> Vec<DownloadTarget> {
    let mut seen_keys = HashSet::new();
    let mut seen_hrefs = HashSet::new();

    targets
        .into_iter()
        .filter(|t| {
            if !seen_keys.insert(t.key()) {
                return false;
            }
            match t.href.as_deref().filter(|h| !h.is_empty()) {
                Some(href) => seen_hrefs.insert(href.to_string()),
                None => true,
            }
        })
        .collect()
}

/// A browser page showing the Takeout "download your export" screen
#[async_trait]
pub trait TakeoutPage: Send {
    /// Navigate to `url`, starting a fresh session if the old one went away
    async fn open(&mut self, url: &str) -> Result<()>;

    /// Download targets currently on the page, in DOM order per selector
    async fn collect_targets(&mut self) -> Result<Vec<DownloadTarget>>;

    /// Scroll `target` into view and click it
    async fn click(&mut self, target: &DownloadTarget) -> Result<()>;

    /// End the browser session
    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let target = DownloadTarget::new(
            Selector::DownloadAttribute,
            2,
            Some("https://takeout.google.com/x?j=1&i=2".to_string()),
        );
        assert_eq!(
            target.key(),
            "a[download]:2:https://takeout.google.com/x?j=1&i=2"
        );

        let button = DownloadTarget::new(Selector::DownloadButton, 0, None);
        assert_eq!(button.key(), "button:has-text('Download'):0:");
    }

    #[test]
    fn test_dedupe_drops_same_href_under_later_selectors() {
        let href = Some("https://example.com/takeout-001.zip".to_string());
        let targets = vec![
            DownloadTarget::new(Selector::DownloadAttribute, 0, href.clone()),
            DownloadTarget::new(Selector::DownloadLink, 0, href.clone()),
            DownloadTarget::new(Selector::DownloadButton, 0, None),
            DownloadTarget::new(Selector::DownloadButton, 1, None),
            DownloadTarget::new(Selector::ZipHref, 0, href),
        ];

        let kept = dedupe_targets(targets);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].selector, Selector::DownloadAttribute);
        assert_eq!(kept[1].selector, Selector::DownloadButton);
        assert_eq!(kept[2].index, 1);
    }
}
