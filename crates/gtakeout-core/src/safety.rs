use crate::error::{Error, Result};
use log::{debug, warn};
use std::path::{Component, Path, PathBuf};
use sysinfo::Disks;

/// Guards against running out of disk and writing outside the target tree
pub struct SafetyManager {
    /// Bytes kept free on top of what an operation needs
    headroom: u64,
}

impl Default for SafetyManager {
    fn default() -> Self {
        Self::new(64 * 1024 * 1024)
    }
}

impl SafetyManager {
    pub fn new(headroom: u64) -> Self {
        Self { headroom }
    }

    /// Free bytes on the volume holding `dir`, if it can be determined
    pub fn available_space(&self, dir: &Path) -> Option<u64> {
        let target = dir.canonicalize().ok()?;
        let disks = Disks::new_with_refreshed_list();

        // Longest mount point that contains the directory wins
        disks
            .list()
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }

    /// Fail with [`Error::InsufficientSpace`] if `needed` bytes won't fit under `dir`
    pub fn check_free_space(&self, dir: &Path, needed: u64) -> Result<()> {
        let Some(available) = self.available_space(dir) else {
            warn!(
                "Could not determine free space for {}, skipping check",
                dir.display()
            );
            return Ok(());
        };

        let required = needed.saturating_add(self.headroom);
        debug!(
            "Free space check for {}: need {} (+headroom), have {}",
            dir.display(),
            needed,
            available
        );

        if available < required {
            return Err(Error::InsufficientSpace {
                path: dir.to_path_buf(),
                needed: required,
                available,
            });
        }
        Ok(())
    }
}

/// Join an archive-relative path onto `root`, refusing anything that would escape it
pub fn contained_join(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out == root {
        return None;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_contained_join() {
        let root = Path::new("/out");
        assert_eq!(
            contained_join(root, Path::new("Takeout/Google Photos/a.jpg")),
            Some(PathBuf::from("/out/Takeout/Google Photos/a.jpg"))
        );
        assert_eq!(
            contained_join(root, Path::new("./a.jpg")),
            Some(PathBuf::from("/out/a.jpg"))
        );
        assert_eq!(contained_join(root, Path::new("../etc/passwd")), None);
        assert_eq!(contained_join(root, Path::new("/etc/passwd")), None);
        assert_eq!(contained_join(root, Path::new("")), None);
    }

    #[test]
    fn test_zero_bytes_always_fits_without_headroom() {
        let dir = tempdir().unwrap();
        let safety = SafetyManager::new(0);
        assert!(safety.check_free_space(dir.path(), 0).is_ok());
    }

    #[test]
    fn test_impossible_request_is_rejected() {
        let dir = tempdir().unwrap();
        let safety = SafetyManager::new(0);

        // Only meaningful where the volume is visible to sysinfo
        if safety.available_space(dir.path()).is_some() {
            let result = safety.check_free_space(dir.path(), u64::MAX);
            assert!(matches!(result, Err(Error::InsufficientSpace { .. })));
        }
    }
}
