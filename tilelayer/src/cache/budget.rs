//! Cache sizing from device capabilities.
//!
//! The host describes the device once ([`DeviceProfile`]); everything else
//! is derived here as a pure function, so the cache never queries global
//! device state itself.

use super::types::DEFAULT_MEMORY_ENTRIES;

const MIB: u64 = 1024 * 1024;

/// Floor for the memory tier.
const MIN_MEMORY_BYTES: u64 = 16 * MIB;

/// Ceiling for the memory tier.
const MAX_MEMORY_BYTES: u64 = 128 * MIB;

/// Share of available memory given to the memory tier (1/32).
const MEMORY_SHARE_DIVISOR: u64 = 32;

/// Average encoded tile size used to derive the entry cap.
const AVERAGE_TILE_BYTES: u64 = 25 * 1024;

/// Rough CPU capability tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CpuClass {
    Low,
    #[default]
    Mid,
    High,
}

/// What the host reports about the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    pub available_memory_bytes: u64,
    pub cpu_class: CpuClass,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        // Yields the stock 50 MB / 2048 entry memory tier
        Self {
            available_memory_bytes: 1600 * MIB,
            cpu_class: CpuClass::Mid,
        }
    }
}

/// Budgets and quality derived from a [`DeviceProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheBudget {
    pub memory_bytes: u64,
    pub memory_entries: usize,
    pub disk_bytes: u64,
    /// JPEG quality used when re-encoding tiles
    pub jpeg_quality: u8,
}

impl CacheBudget {
    pub fn for_device(profile: &DeviceProfile) -> Self {
        let memory_bytes = (profile.available_memory_bytes / MEMORY_SHARE_DIVISOR)
            .clamp(MIN_MEMORY_BYTES, MAX_MEMORY_BYTES);
        let memory_entries = ((memory_bytes / AVERAGE_TILE_BYTES) as usize)
            .clamp(DEFAULT_MEMORY_ENTRIES / 8, DEFAULT_MEMORY_ENTRIES * 2);

        let (disk_bytes, jpeg_quality) = match profile.cpu_class {
            CpuClass::Low => (64 * MIB, 70),
            CpuClass::Mid => (100 * MIB, 80),
            CpuClass::High => (256 * MIB, 90),
        };

        Self {
            memory_bytes,
            memory_entries,
            disk_bytes,
            jpeg_quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::{DEFAULT_DISK_BYTES, DEFAULT_MEMORY_BYTES};
    use proptest::prelude::*;

    #[test]
    fn test_default_profile_matches_default_budgets() {
        let budget = CacheBudget::for_device(&DeviceProfile::default());
        assert_eq!(budget.memory_bytes, DEFAULT_MEMORY_BYTES);
        assert_eq!(budget.memory_entries, DEFAULT_MEMORY_ENTRIES);
        assert_eq!(budget.disk_bytes, DEFAULT_DISK_BYTES);
    }

    #[test]
    fn test_small_device_gets_floor() {
        let budget = CacheBudget::for_device(&DeviceProfile {
            available_memory_bytes: 64 * MIB,
            cpu_class: CpuClass::Low,
        });
        assert_eq!(budget.memory_bytes, MIN_MEMORY_BYTES);
        assert_eq!(budget.jpeg_quality, 70);
    }

    proptest! {
        #[test]
        fn prop_budget_bounded_and_monotonic(
            memory in 0u64..64 * 1024 * MIB,
            extra in 0u64..8 * 1024 * MIB,
        ) {
            let small = CacheBudget::for_device(&DeviceProfile {
                available_memory_bytes: memory,
                cpu_class: CpuClass::Mid,
            });
            let large = CacheBudget::for_device(&DeviceProfile {
                available_memory_bytes: memory + extra,
                cpu_class: CpuClass::Mid,
            });

            prop_assert!(small.memory_bytes >= MIN_MEMORY_BYTES);
            prop_assert!(small.memory_bytes <= MAX_MEMORY_BYTES);
            prop_assert!(large.memory_bytes >= small.memory_bytes);
            prop_assert!(large.memory_entries >= small.memory_entries);
            prop_assert!(small.memory_entries > 0);
        }
    }
}
