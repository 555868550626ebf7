//! Checks GitHub for a newer release.

use log::debug;
use serde::Deserialize;
use std::cmp::Ordering;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: Option<String>,
}

/// Result of comparing the running version against the latest release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate { current: String },
    Available { current: String, latest: String },
    Unknown { current: String },
    /// No release repository is configured
    NotConfigured { current: String },
}

/// Split an `owner/repo` pair; anything else is `None`
pub fn parse_release_repo(value: &str) -> Option<(&str, &str)> {
    let (owner, repo) = value.trim().split_once('/')?;
    let valid = |part: &str| !part.is_empty() && !part.contains(['/', ' ']);
    (valid(owner) && valid(repo)).then_some((owner, repo))
}

/// Tag of the latest GitHub release of `owner/repo`, if there is one
pub fn latest_release(owner: &str, repo: &str, timeout: Duration) -> Result<Option<String>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("gtakeout/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let url = format!("https://api.github.com/repos/{}/{}/releases/latest", owner, repo);
    let response = client.get(&url).send()?;
    if !response.status().is_success() {
        debug!("{} returned {}", url, response.status());
        return Ok(None);
    }
    let release: Release = response.json()?;
    Ok(release
        .tag_name
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty()))
}

/// Compare `current` against the latest release of `release_repo` (`owner/repo`).
///
/// Network failures give [`UpdateStatus::Unknown`]; an empty or malformed repo gives
/// [`UpdateStatus::NotConfigured`] without touching the network.
pub fn check_for_update(current: &str, release_repo: &str) -> UpdateStatus {
    let current = current.to_string();
    let Some((owner, repo)) = parse_release_repo(release_repo) else {
        return UpdateStatus::NotConfigured { current };
    };
    match latest_release(owner, repo, Duration::from_secs(5)) {
        Ok(Some(latest)) => match compare_versions(&latest, &current) {
            Ordering::Greater => UpdateStatus::Available { current, latest },
            _ => UpdateStatus::UpToDate { current },
        },
        Ok(None) => UpdateStatus::Unknown { current },
        Err(e) => {
            debug!("Update check failed: {}", e);
            UpdateStatus::Unknown { current }
        }
    }
}

pub fn releases_page_url(release_repo: &str) -> Option<String> {
    parse_release_repo(release_repo).map(|(owner, repo)| format!("https://github.com/{}/{}/releases", owner, repo))
}

/// Numeric, dot-separated comparison; a leading `v` and any `-suffix` are ignored
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn parts(v: &str) -> Vec<u64> {
        v.trim()
            .trim_start_matches(['v', 'V'])
            .split(['-', '+'])
            .next()
            .unwrap_or("")
            .split('.')
            .map(|p| p.parse().unwrap_or(0))
            .collect()
    }
    let (a, b) = (parts(a), parts(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let (x, y) = (a.get(i).copied().unwrap_or(0), b.get(i).copied().unwrap_or(0));
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
