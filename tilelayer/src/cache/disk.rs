//! Persistent tile tier, partitioned by source kind.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   street/street_14_8800_5373.png
//!   satellite/satellite_14_8800_5373.jpg
//!   satellitealt/...
//! ```
//!
//! Each partition has its own byte budget and its own LRU index, so one
//! source can never evict another source's tiles. Writes go to a temporary
//! file that is renamed into place, so a reader never sees a partial entry.
//! The index is rebuilt from filenames on [`DiskTier::open`], seeded in
//! file-mtime order.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::lru::{AccessClock, Evicted, LruIndex};
use super::types::{CacheError, DiskTierConfig};
use crate::tile::{parse_cache_filename, EncodedImage, SourceKind, TileAddress, TileEncoding};

/// Suffix of in-progress writes.
const TMP_SUFFIX: &str = ".tmp";

/// Statistics from rebuilding the index at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Files successfully indexed
    pub files_indexed: usize,
    /// Files skipped (not parseable, wrong partition, leftovers)
    pub skipped: usize,
    /// Bytes indexed
    pub bytes: u64,
    /// Entries evicted because the partition started over budget
    pub evicted: usize,
}

struct Partition {
    dir: PathBuf,
    budget: u64,
    index: Mutex<LruIndex<TileAddress, TileEncoding>>,
}

impl Partition {
    fn path_for(&self, address: &TileAddress, encoding: TileEncoding) -> PathBuf {
        self.dir.join(address.filename(encoding.extension()))
    }
}

/// Disk tier of the tile cache.
pub struct DiskTier {
    root: PathBuf,
    partitions: HashMap<SourceKind, Partition>,
    clock: AccessClock,
}

impl DiskTier {
    /// Opens (creating if needed) the cache directory and rebuilds the index.
    ///
    /// Partitions that start over budget are trimmed immediately.
    pub async fn open(
        config: &DiskTierConfig,
        clock: AccessClock,
    ) -> Result<(Self, ScanReport), CacheError> {
        let mut report = ScanReport::default();
        let mut partitions = HashMap::new();

        for kind in SourceKind::ALL {
            let dir = config.root.join(kind.name());
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| CacheError::io(&dir, e))?;

            let mut found = scan_partition(&dir, kind, &mut report).await?;
            // Oldest first, so older files get smaller ticks
            found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.key().cmp(&b.1.key())));

            let mut index = LruIndex::new();
            for (_, address, encoding, size) in found {
                let replaced = index.insert(address, encoding, size, clock.tick());
                if let Some(stale) = replaced.filter(|previous| *previous != encoding) {
                    // Same tile stored under two encodings: keep the newer file
                    let path = dir.join(address.filename(stale.extension()));
                    remove_file_logged(&path).await;
                }
                report.files_indexed += 1;
                report.bytes += size;
            }

            partitions.insert(
                kind,
                Partition {
                    dir,
                    budget: config.budget_for(kind),
                    index: Mutex::new(index),
                },
            );
        }

        let tier = Self {
            root: config.root.clone(),
            partitions,
            clock,
        };
        let (evicted, _) = tier.evict_if_over_budget().await;
        report.evicted = evicted;

        info!(
            root = %tier.root.display(),
            files = report.files_indexed,
            skipped = report.skipped,
            bytes = report.bytes,
            evicted = report.evicted,
            "Disk cache index rebuilt"
        );

        Ok((tier, report))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn budget(&self, kind: SourceKind) -> u64 {
        self.partitions.get(&kind).map_or(0, |p| p.budget)
    }

    /// Reads a tile and marks it most recently used.
    ///
    /// A file that vanished underneath the index is a miss, not an error.
    pub async fn read(&self, address: &TileAddress) -> Result<Option<EncodedImage>, CacheError> {
        let Some(partition) = self.partitions.get(&address.source()) else {
            return Ok(None);
        };
        let tick = self.clock.tick();
        let touched = partition.index.lock().touch(address, tick).copied();
        let Some(encoding) = touched else {
            return Ok(None);
        };

        let path = partition.path_for(address, encoding);
        match tokio::fs::read(&path).await {
            Ok(data) if data.is_empty() => {
                partition.index.lock().remove(address);
                remove_file_logged(&path).await;
                Err(CacheError::InvalidEntry(format!(
                    "{} is empty",
                    path.display()
                )))
            }
            Ok(data) => Ok(Some(EncodedImage::new(data, encoding))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                partition.index.lock().remove(address);
                Ok(None)
            }
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Writes a tile atomically (temp file, then rename).
    pub async fn write(&self, address: &TileAddress, image: &EncodedImage) -> Result<(), CacheError> {
        let partition = self.partitions.get(&address.source()).ok_or_else(|| {
            CacheError::InvalidEntry(format!("no disk partition for {}", address.source()))
        })?;

        let tick = self.clock.tick();
        let encoding = image.encoding();
        let path = partition.path_for(address, encoding);
        let tmp = partition.dir.join(format!(
            "{}.{}{}",
            address.filename(encoding.extension()),
            tick,
            TMP_SUFFIX
        ));

        if let Err(e) = tokio::fs::write(&tmp, image.data()).await {
            remove_file_quiet(&tmp).await;
            return Err(CacheError::io(tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            remove_file_quiet(&tmp).await;
            return Err(CacheError::io(path, e));
        }

        let replaced =
            partition
                .index
                .lock()
                .insert(*address, encoding, image.len() as u64, tick);
        if let Some(stale) = replaced.filter(|previous| *previous != encoding) {
            remove_file_logged(&partition.path_for(address, stale)).await;
        }
        Ok(())
    }

    /// Evicts least recently used tiles from every partition over budget.
    ///
    /// Returns `(tiles evicted, bytes freed)`.
    pub async fn evict_if_over_budget(&self) -> (usize, u64) {
        let mut count = 0;
        let mut bytes = 0;
        for (kind, partition) in &self.partitions {
            let evicted = partition
                .index
                .lock()
                .evict_until(partition.budget, usize::MAX);
            if evicted.is_empty() {
                continue;
            }
            debug!(
                source = %kind,
                evicted = evicted.len(),
                budget = partition.budget,
                "Disk partition over budget"
            );
            let (n, freed) = delete_evicted(partition, evicted).await;
            count += n;
            bytes += freed;
        }
        (count, bytes)
    }

    /// Deletes every tile of `source`, or of every source.
    pub async fn clear(&self, source: Option<SourceKind>) -> usize {
        let mut count = 0;
        for (kind, partition) in &self.partitions {
            if source.is_some_and(|wanted| wanted != *kind) {
                continue;
            }
            let removed = partition.index.lock().remove_where(|_| true);
            count += delete_evicted(partition, removed).await.0;
        }
        count
    }

    /// `(tiles, bytes)` for `source`, or for every partition.
    pub fn usage(&self, source: Option<SourceKind>) -> (usize, u64) {
        self.partitions
            .iter()
            .filter(|(kind, _)| source.map_or(true, |wanted| wanted == **kind))
            .map(|(_, partition)| {
                let index = partition.index.lock();
                (index.len(), index.total_bytes())
            })
            .fold((0, 0), |(c, b), (count, bytes)| (c + count, b + bytes))
    }

    pub fn contains(&self, address: &TileAddress) -> bool {
        self.partitions
            .get(&address.source())
            .is_some_and(|partition| partition.index.lock().contains(address))
    }
}

/// Lists valid entries of one partition directory.
async fn scan_partition(
    dir: &Path,
    kind: SourceKind,
    report: &mut ScanReport,
) -> Result<Vec<(SystemTime, TileAddress, TileEncoding, u64)>, CacheError> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| CacheError::io(dir, e))?;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return Err(CacheError::io(dir, e)),
        };
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            report.skipped += 1;
            continue;
        };

        if filename.ends_with(TMP_SUFFIX) {
            // Interrupted write from a previous run
            remove_file_quiet(&path).await;
            report.skipped += 1;
            continue;
        }

        let parsed = parse_cache_filename(filename).and_then(|(address, extension)| {
            let encoding = TileEncoding::from_extension(extension)?;
            (address.source() == kind).then_some((address, encoding))
        });
        let Some((address, encoding)) = parsed else {
            debug!(file = %path.display(), "Skipping unrecognised file in tile cache");
            report.skipped += 1;
            continue;
        };

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((modified, address, encoding, metadata.len()));

        // Yield periodically so large caches don't hog the worker
        if found.len() % 256 == 0 {
            tokio::task::yield_now().await;
        }
    }

    Ok(found)
}

async fn delete_evicted(
    partition: &Partition,
    evicted: Vec<Evicted<TileAddress, TileEncoding>>,
) -> (usize, u64) {
    let mut bytes = 0;
    let count = evicted.len();
    for entry in evicted {
        remove_file_logged(&partition.path_for(&entry.key, entry.value)).await;
        bytes += entry.size_bytes;
    }
    (count, bytes)
}

async fn remove_file_logged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(file = %path.display(), error = %e, "Failed to delete cache file"),
    }
}

async fn remove_file_quiet(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    fn addr(column: u32, row: u32, zoom: u8, source: SourceKind) -> TileAddress {
        TileAddress::new(column, row, zoom, source).unwrap()
    }

    fn png(len: usize) -> EncodedImage {
        EncodedImage::new(vec![7u8; len], TileEncoding::Png)
    }

    async fn open(dir: &TempDir, total: u64) -> (DiskTier, ScanReport) {
        let config = DiskTierConfig::split_evenly(dir.path(), total);
        DiskTier::open(&config, AccessClock::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let (tier, report) = open(&dir, 3_000_000).await;
        assert_eq!(report, ScanReport::default());

        let address = addr(5, 3, 10, SourceKind::Street);
        tier.write(&address, &png(64)).await.unwrap();

        let expected = dir.path().join("street").join("street_10_5_3.png");
        assert!(expected.exists());

        let image = tier.read(&address).await.unwrap().unwrap();
        assert_eq!(image.len(), 64);
        assert_eq!(image.encoding(), TileEncoding::Png);
        assert_eq!(tier.usage(Some(SourceKind::Street)), (1, 64));
    }

    #[tokio::test]
    async fn test_open_rebuilds_index_and_skips_junk() {
        let dir = TempDir::new().unwrap();
        {
            let (tier, _) = open(&dir, 3_000_000).await;
            tier.write(&addr(1, 1, 4, SourceKind::Street), &png(10)).await.unwrap();
            tier.write(&addr(2, 1, 4, SourceKind::Satellite), &png(20)).await.unwrap();
        }
        let street = dir.path().join("street");
        std::fs::write(street.join("notes.txt"), b"hello").unwrap();
        std::fs::write(street.join("street_4_1_2.png.99.tmp"), b"partial").unwrap();
        // Right shape, wrong partition
        std::fs::write(street.join("satellite_4_1_1.png"), b"x").unwrap();

        let (tier, report) = open(&dir, 3_000_000).await;
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.skipped, 3);
        assert!(tier.contains(&addr(1, 1, 4, SourceKind::Street)));
        assert!(tier.contains(&addr(2, 1, 4, SourceKind::Satellite)));
        assert!(!street.join("street_4_1_2.png.99.tmp").exists());
    }

    #[tokio::test]
    async fn test_open_seeds_lru_from_mtime() {
        let dir = TempDir::new().unwrap();
        let street = dir.path().join("street");
        std::fs::create_dir_all(&street).unwrap();

        // Written newest-first so directory order disagrees with mtime order
        for (column, age) in [(0u32, 100i64), (1, 300), (2, 200)] {
            let path = street.join(format!("street_5_{}_0.png", column));
            std::fs::write(&path, vec![0u8; 100]).unwrap();
            set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000 - age, 0)).unwrap();
        }

        // 600 total -> 200 per partition: one file must go, the oldest
        let (tier, report) = open(&dir, 600).await;
        assert_eq!(report.evicted, 1);
        assert!(!tier.contains(&addr(1, 0, 5, SourceKind::Street)));
        assert!(tier.contains(&addr(0, 0, 5, SourceKind::Street)));
        assert!(tier.contains(&addr(2, 0, 5, SourceKind::Street)));
        assert!(!street.join("street_5_1_0.png").exists());
    }

    #[tokio::test]
    async fn test_partition_budgets_are_independent() {
        let dir = TempDir::new().unwrap();
        let (tier, _) = open(&dir, 300).await;

        tier.write(&addr(0, 0, 3, SourceKind::Satellite), &png(90)).await.unwrap();
        for column in 0..4 {
            tier.write(&addr(column, 0, 3, SourceKind::Street), &png(40)).await.unwrap();
        }

        let (evicted, freed) = tier.evict_if_over_budget().await;
        assert_eq!((evicted, freed), (2, 80));
        assert_eq!(tier.usage(Some(SourceKind::Street)), (2, 80));
        assert_eq!(tier.usage(Some(SourceKind::Satellite)), (1, 90));
        assert!(!tier.contains(&addr(0, 0, 3, SourceKind::Street)));
        assert!(tier.contains(&addr(3, 0, 3, SourceKind::Street)));
    }

    #[tokio::test]
    async fn test_vanished_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let (tier, _) = open(&dir, 3_000_000).await;
        let address = addr(7, 7, 3, SourceKind::SatelliteAlt);
        tier.write(&address, &png(5)).await.unwrap();

        std::fs::remove_file(dir.path().join("satellitealt").join("satellitealt_3_7_7.png"))
            .unwrap();
        assert!(tier.read(&address).await.unwrap().is_none());
        assert!(!tier.contains(&address));
    }

    #[tokio::test]
    async fn test_rewrite_with_new_encoding_removes_old_file() {
        let dir = TempDir::new().unwrap();
        let (tier, _) = open(&dir, 3_000_000).await;
        let address = addr(1, 2, 3, SourceKind::Satellite);

        tier.write(&address, &png(5)).await.unwrap();
        tier.write(&address, &EncodedImage::new(vec![1u8; 9], TileEncoding::Jpeg))
            .await
            .unwrap();

        let partition = dir.path().join("satellite");
        assert!(!partition.join("satellite_3_1_2.png").exists());
        assert!(partition.join("satellite_3_1_2.jpg").exists());
        assert_eq!(tier.usage(Some(SourceKind::Satellite)), (1, 9));
    }

    #[tokio::test]
    async fn test_clear_single_partition() {
        let dir = TempDir::new().unwrap();
        let (tier, _) = open(&dir, 3_000_000).await;
        tier.write(&addr(0, 0, 1, SourceKind::Street), &png(5)).await.unwrap();
        tier.write(&addr(0, 0, 1, SourceKind::Satellite), &png(5)).await.unwrap();

        assert_eq!(tier.clear(Some(SourceKind::Street)).await, 1);
        assert_eq!(tier.usage(Some(SourceKind::Street)), (0, 0));
        assert_eq!(tier.usage(Some(SourceKind::Satellite)), (1, 5));
        assert!(dir.path().join("satellite").join("satellite_1_0_0.png").exists());
    }
}
