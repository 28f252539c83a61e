//! Mount/drive cache shared between the disk-usage and disk-I/O
//! collectors (§4.4).
//!
//! One process-wide cache, one exclusive writer (the mount manager task
//! in `spectra-agent`'s orchestrator), many shared readers. The writer
//! replaces the whole map under an exclusive lock on every refresh tick;
//! readers take the shared lock only long enough to clone or borrow what
//! they need and never hold it across a probe call.

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use windows::{DriveCache, DriveLetters};

use parking_lot::RwLock;
use spectra_types::MountRaw;
use std::collections::HashMap;

/// Mountpoints under these prefixes are noise: WSL's bind-mounted Windows
/// drives and Docker's per-container overlay mounts churn constantly and
/// were never meant to be reported as host filesystems (§4.4).
const IGNORED_MOUNTPOINT_PREFIXES: &[&str] = &["/mnt/wsl/", "/Docker/"];

/// `/dev/loopN` devices back snap packages and container layers, not
/// physical or logical disks a host operator cares about.
const IGNORED_DEVICE_PREFIX: &str = "/dev/loop";

fn should_ignore(mount: &MountRaw) -> bool {
    mount.device.starts_with(IGNORED_DEVICE_PREFIX)
        || IGNORED_MOUNTPOINT_PREFIXES.iter().any(|p| mount.mount_point.starts_with(p))
}

/// The Unix flavor of the drive cache: one `MountRaw` per device
/// basename, keyed the way disk-I/O device names already come back from
/// `/proc/diskstats` / `kern.devstat.all` so the disk-usage and disk-I/O
/// collectors can join on the same key.
#[cfg(not(windows))]
#[derive(Default)]
pub struct DriveCache {
    mounts: RwLock<HashMap<String, MountRaw>>,
}

#[cfg(not(windows))]
impl DriveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole-map replacement; partial updates are forbidden by the
    /// contract (§4.4) so a probe failure mid-refresh must not leave the
    /// cache half-updated. Call sites retry on the next tick instead.
    pub fn refresh(&self, mounts: Vec<MountRaw>) {
        let map = mounts
            .into_iter()
            .filter(|m| !should_ignore(m))
            .map(|m| (device_basename(&m.device).to_string(), m))
            .collect();
        *self.mounts.write() = map;
    }

    pub fn snapshot(&self) -> Vec<MountRaw> {
        self.mounts.read().values().cloned().collect()
    }

    pub fn get(&self, device_basename: &str) -> Option<MountRaw> {
        self.mounts.read().get(device_basename).cloned()
    }

    pub fn len(&self) -> usize {
        self.mounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.read().is_empty()
    }
}

fn device_basename(device: &str) -> &str {
    device.rsplit('/').next().unwrap_or(device)
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
    use super::*;

    fn mount(device: &str, mount_point: &str, fs_type: &str) -> MountRaw {
        MountRaw { device: device.into(), mount_point: mount_point.into(), fs_type: fs_type.into() }
    }

    #[test]
    fn refresh_replaces_whole_map() {
        let cache = DriveCache::new();
        cache.refresh(vec![mount("/dev/sda1", "/", "ext4")]);
        assert_eq!(cache.len(), 1);

        cache.refresh(vec![mount("/dev/sdb1", "/data", "xfs")]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("sda1").is_none());
        assert!(cache.get("sdb1").is_some());
    }

    #[test]
    fn loop_devices_are_filtered() {
        let cache = DriveCache::new();
        cache.refresh(vec![mount("/dev/loop0", "/snap/core/1", "squashfs")]);
        assert!(cache.is_empty());
    }

    #[test]
    fn wsl_and_docker_mountpoints_are_filtered() {
        let cache = DriveCache::new();
        cache.refresh(vec![
            mount("/dev/sdc1", "/mnt/wsl/docker-desktop", "ext4"),
            mount("overlay", "/var/lib/Docker/overlay2/abcd/merged", "overlay"),
        ]);
        assert!(cache.is_empty());
    }

    #[test]
    fn keys_by_device_basename() {
        let cache = DriveCache::new();
        cache.refresh(vec![mount("/dev/sda1", "/", "ext4")]);
        assert!(cache.get("sda1").is_some());
        assert!(cache.get("/dev/sda1").is_none());
    }
}
