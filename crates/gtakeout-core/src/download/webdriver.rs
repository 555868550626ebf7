//! [`TakeoutPage`] backed by a real Chrome driven over WebDriver (chromedriver).

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use log::{debug, info, warn};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use super::page::{DownloadTarget, Selector, TakeoutPage};
use crate::error::{Error, Result};

fn locator(selector: Selector) -> Locator<'static> {
    match selector {
        Selector::DownloadAttribute => Locator::Css("a[download]"),
        Selector::DownloadLink => Locator::XPath("//a[contains(normalize-space(.), 'Download')]"),
        Selector::DownloadButton => {
            Locator::XPath("//button[contains(normalize-space(.), 'Download')]")
        }
        Selector::ZipHref => Locator::Css("a[href$='.zip']"),
    }
}

/// A visible Chrome window whose downloads land in the download directory
pub struct WebDriverPage {
    webdriver_url: String,
    download_dir: PathBuf,
    profile_dir: Option<PathBuf>,
    client: Option<Client>,
}

impl WebDriverPage {
    /// Start a Chrome session through the WebDriver server at `webdriver_url`
    pub async fn connect(
        webdriver_url: &str,
        download_dir: &Path,
        profile_dir: Option<&Path>,
    ) -> Result<Self> {
        let mut page = Self::unconnected(webdriver_url, download_dir, profile_dir)?;
        page.client = Some(page.new_session().await?);
        Ok(page)
    }

    /// Prepare the directories; Chrome only honours an absolute download directory
    fn unconnected(webdriver_url: &str, download_dir: &Path, profile_dir: Option<&Path>) -> Result<Self> {
        std::fs::create_dir_all(download_dir)?;
        let download_dir = match download_dir.canonicalize() {
            Ok(dir) => dir,
            Err(_) => std::path::absolute(download_dir)?,
        };
        let profile_dir = match profile_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Some(std::path::absolute(dir)?)
            }
            None => None,
        };

        Ok(Self {
            webdriver_url: webdriver_url.to_string(),
            download_dir,
            profile_dir,
            client: None,
        })
    }

    fn capabilities(&self) -> Map<String, Value> {
        let mut args = vec!["--start-maximized".to_string()];
        if let Some(profile) = &self.profile_dir {
            args.push(format!("--user-data-dir={}", profile.display()));
        }

        let mut caps = Map::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({
                "args": args,
                "prefs": {
                    "download.default_directory": self.download_dir.display().to_string(),
                    "download.prompt_for_download": false,
                    "download.directory_upgrade": true,
                    "safebrowsing.enabled": true,
                },
            }),
        );
        caps
    }

    async fn new_session(&self) -> Result<Client> {
        info!("Starting Chrome via WebDriver at {}", self.webdriver_url);
        let mut builder = ClientBuilder::native();
        builder.capabilities(self.capabilities());
        let client = builder.connect(&self.webdriver_url).await?;
        Ok(client)
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::PageClosed("browser session is not running".to_string()))
    }

    async fn find(&self, selector: Selector) -> Result<Vec<Element>> {
        Ok(self.client()?.find_all(locator(selector)).await?)
    }
}

#[async_trait]
impl TakeoutPage for WebDriverPage {
    async fn open(&mut self, url: &str) -> Result<()> {
        let attempt = match &self.client {
            Some(client) => client.goto(url).await.map_err(Error::from),
            None => Err(Error::PageClosed("no session".to_string())),
        };

        match attempt {
            Ok(()) => Ok(()),
            Err(Error::PageClosed(reason)) => {
                warn!("Browser window went away ({}), starting a new one", reason);
                let client = self.new_session().await?;
                client.goto(url).await?;
                self.client = Some(client);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn collect_targets(&mut self) -> Result<Vec<DownloadTarget>> {
        let mut targets = Vec::new();
        for selector in Selector::ALL {
            for (index, element) in self.find(selector).await?.into_iter().enumerate() {
                let href = element.attr("href").await.unwrap_or_else(|e| {
                    debug!("No href for {}:{}: {}", selector, index, e);
                    None
                });
                targets.push(DownloadTarget::new(selector, index, href));
            }
        }
        Ok(targets)
    }

    async fn click(&mut self, target: &DownloadTarget) -> Result<()> {
        let element = self
            .find(target.selector)
            .await?
            .into_iter()
            .nth(target.index)
            .ok_or_else(|| Error::Browser(format!("target {} is no longer on the page", target.key())))?;

        self.client()?
            .execute(
                "arguments[0].scrollIntoView({block: 'center'});",
                vec![serde_json::to_value(&element)?],
            )
            .await?;
        element.click().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_point_downloads_at_dir() {
        let page = WebDriverPage {
            webdriver_url: "http://localhost:9515".to_string(),
            download_dir: PathBuf::from("/tmp/zips"),
            profile_dir: Some(PathBuf::from("/tmp/profile")),
            client: None,
        };

        let caps = page.capabilities();
        let chrome = &caps["goog:chromeOptions"];
        assert_eq!(chrome["prefs"]["download.default_directory"], "/tmp/zips");
        assert_eq!(chrome["prefs"]["download.prompt_for_download"], false);
        assert!(chrome["args"]
            .as_array()
            .unwrap()
            .contains(&json!("--user-data-dir=/tmp/profile")));
    }

    #[test]
    fn test_relative_download_dir_is_created_and_made_absolute() {
        let relative = PathBuf::from(format!("takeout-zips-{}", std::process::id()));
        assert!(!relative.exists());

        let page = WebDriverPage::unconnected("http://localhost:9515", &relative, None).unwrap();
        let created = relative.is_dir();
        std::fs::remove_dir_all(&relative).unwrap();

        assert!(created);
        let caps = page.capabilities();
        let sent = caps["goog:chromeOptions"]["prefs"]["download.default_directory"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(Path::new(&sent).is_absolute());
        assert!(sent.ends_with(relative.to_str().unwrap()));
    }
}
