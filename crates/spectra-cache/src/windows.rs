//! Windows drive cache: one map of physical disks (for disk-I/O) and one
//! map of drive letters per physical-disk index (for disk-usage), since
//! Windows has no single device identifier shared by both views (§4.4).

use parking_lot::RwLock;
use spectra_types::PhysicalDiskRaw;
use std::collections::HashMap;

/// USB and 1394 attached disks churn (removable media) and "virtual"
/// models are VM-backed disks with no physical counterpart; both are
/// excluded from the cache (§GLOSSARY "Bus type").
const EXCLUDED_BUS_TYPES: &[&str] = &["USB", "1394"];

fn should_ignore(disk: &PhysicalDiskRaw) -> bool {
    EXCLUDED_BUS_TYPES.contains(&disk.bus_type.as_str()) || disk.model.to_lowercase().contains("virtual")
}

pub type DriveLetters = HashMap<u32, Vec<String>>;

#[derive(Default)]
pub struct DriveCache {
    disks: RwLock<HashMap<u32, PhysicalDiskRaw>>,
    drive_letters: RwLock<DriveLetters>,
}

impl DriveCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh(&self, disks: Vec<PhysicalDiskRaw>, drive_letters: DriveLetters) {
        let map = disks.into_iter().filter(|d| !should_ignore(d)).map(|d| (d.index, d)).collect();
        *self.disks.write() = map;
        *self.drive_letters.write() = drive_letters;
    }

    pub fn disks(&self) -> Vec<PhysicalDiskRaw> {
        self.disks.read().values().cloned().collect()
    }

    pub fn drive_letters_for(&self, index: u32) -> Vec<String> {
        self.drive_letters.read().get(&index).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.disks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.disks.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(index: u32, bus_type: &str, model: &str) -> PhysicalDiskRaw {
        PhysicalDiskRaw { index, device_id: format!("\\\\.\\PhysicalDrive{index}"), model: model.into(), bus_type: bus_type.into() }
    }

    #[test]
    fn usb_and_virtual_disks_are_excluded() {
        let cache = DriveCache::new();
        cache.refresh(
            vec![disk(0, "SATA", "Samsung SSD"), disk(1, "USB", "Kingston"), disk(2, "SCSI", "Virtual Disk")],
            HashMap::new(),
        );
        assert_eq!(cache.len(), 1);
    }
}
