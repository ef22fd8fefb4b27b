// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use memmap2::Mmap;

// From standard library
use std::fs::File;
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// From this library
use crate::core::chunk::{hash_chunk, Chunk, ChunkData, ChunkHash, MatchStats, CHUNK_SIZE, HASH_SIZE};
use crate::core::errors::HashIndexError;
use crate::core::index::HashRegion;
use crate::core::slot::{AccessMode, Slot};
use crate::sys_utils;

/// Content-addressed lookup of 4 KiB chunks by SHA-256.
///
/// A `HashIndex` maps a chunk hash to a chunk number within a backing data
/// descriptor. Physically it holds an ordered sequence of 32-byte hashes (one
/// per chunk, by position) plus a permutation of chunk numbers sorted by hash
/// for binary search.
///
/// While a slot is being overwritten in place, the `invalid_below` /
/// `invalid_from` watermarks exclude chunk numbers whose content is no longer
/// what the index describes: a candidate `n` is only reusable when
/// `invalid_below <= n < invalid_from`.
#[derive(Debug)]
pub struct HashIndex {
    label: String,
    data: Arc<File>,
    count: u32,
    hashes: Arc<HashRegion>,
    lookup: Arc<Vec<u32>>,
    invalid_below: u32,
    invalid_from: u32,
    stats: MatchStats,
    skip_hash_check: bool,
}

impl HashIndex {
    /// Opens an index from a hash sidecar file describing `data`.
    ///
    /// The sidecar is memory-mapped read-only. Fails with
    /// [`HashIndexError::Size`] when the sidecar's length is not a multiple
    /// of 32, or when it disagrees with the data's length in 4 KiB chunks.
    pub fn open<T>(label: T, data: Arc<File>, hashes_path: &Path) -> Result<HashIndex, HashIndexError>
    where
        T: AsRef<str>,
    {
        let label = label.as_ref();
        log::debug!(
            "HashIndex::open opening index {:?} from sidecar {:?}",
            label,
            hashes_path
        );

        let hashes_file = File::open(hashes_path)?;
        let hashes_len = hashes_file.metadata()?.len();

        if hashes_len % HASH_SIZE as u64 != 0 {
            let err_msg = format!(
                "hash file {:?}: length {} is not a multiple of {}",
                hashes_path, hashes_len, HASH_SIZE
            );
            log::debug!("HashIndex::open {}", err_msg);

            return Err(HashIndexError::Size(err_msg));
        }

        let count = Self::chunk_count(hashes_len / HASH_SIZE as u64, hashes_path)?;

        let data_len = sys_utils::device_size(&data)?;
        if data_len != count as u64 * CHUNK_SIZE as u64 {
            let err_msg = format!(
                "hash file {:?} describes {} chunks but the data holds {} bytes",
                hashes_path, count, data_len
            );
            log::debug!("HashIndex::open {}", err_msg);

            return Err(HashIndexError::Size(err_msg));
        }

        let region = if count == 0 {
            HashRegion::Resident(Vec::new())
        } else {
            HashRegion::Mapped(unsafe { Mmap::map(&hashes_file)? })
        };

        Ok(Self::from_region(label, data, region, count))
    }

    /// Opens an index over a slot's block device.
    ///
    /// Looks for the sidecar beside the slot: the checksum-named file when
    /// the slot carries a payload checksum, `<device>.hashes` otherwise. A
    /// missing or stale sidecar is rebuilt by streaming the slot.
    pub fn open_for_slot<T>(
        label: T,
        slot: &Slot,
        mode: AccessMode,
    ) -> Result<HashIndex, HashIndexError>
    where
        T: AsRef<str>,
    {
        let label = label.as_ref();
        log::debug!(
            "HashIndex::open_for_slot opening index {:?} for slot {:?}",
            label,
            slot.name()
        );

        let data = Arc::new(
            slot.open(mode)
                .map_err(|e| HashIndexError::Creation(e.to_string()))?,
        );

        let data_len = sys_utils::device_size(&data)?;
        let count = Self::chunk_count(data_len / CHUNK_SIZE as u64, slot.device())?;

        let sidecar = match slot.checksum() {
            Some(checksum) => slot.hashes_path_for_checksum(checksum),
            None => slot.hashes_path(),
        };

        Self::open_or_rebuild(label, data, &sidecar, count)
    }

    /// Opens an index over the payload region of an image file.
    ///
    /// Only the first `payload_blocks` chunks are indexed; anything the file
    /// carries beyond them (e.g. an appended hash tree) is ignored. The
    /// sidecar convention is `<image>.hashes`.
    pub fn open_for_image<T>(
        label: T,
        image_path: &Path,
        payload_blocks: u32,
    ) -> Result<HashIndex, HashIndexError>
    where
        T: AsRef<str>,
    {
        let label = label.as_ref();
        log::debug!(
            "HashIndex::open_for_image opening index {:?} for image {:?}",
            label,
            image_path
        );

        let data = Arc::new(File::open(image_path)?);

        let data_len = sys_utils::device_size(&data)?;
        if data_len < payload_blocks as u64 * CHUNK_SIZE as u64 {
            let err_msg = format!(
                "image {:?} holds {} bytes, fewer than the {} declared payload chunks",
                image_path, data_len, payload_blocks
            );
            log::debug!("HashIndex::open_for_image {}", err_msg);

            return Err(HashIndexError::Size(err_msg));
        }

        let sidecar = PathBuf::from(format!("{}.hashes", image_path.display()));

        Self::open_or_rebuild(label, data, &sidecar, payload_blocks)
    }

    /// Creates an index sharing another index's sorted hash set, against a
    /// new data descriptor.
    ///
    /// Used when the same image is consumed against multiple targets, and to
    /// export a freshly written slot's sidecar without re-hashing. Watermarks
    /// and statistics start fresh; the hash check is re-enabled.
    pub fn reuse<T>(
        label: T,
        other: &HashIndex,
        new_data: Arc<File>,
    ) -> Result<HashIndex, HashIndexError>
    where
        T: AsRef<str>,
    {
        let label = label.as_ref();
        log::debug!(
            "HashIndex::reuse sharing index {:?} as {:?}",
            other.label,
            label
        );

        let data_len = sys_utils::device_size(&new_data)?;
        if data_len < other.count as u64 * CHUNK_SIZE as u64 {
            let err_msg = format!(
                "index {:?} describes {} chunks but the new data holds only {} bytes",
                other.label, other.count, data_len
            );
            log::debug!("HashIndex::reuse {}", err_msg);

            return Err(HashIndexError::Size(err_msg));
        }

        Ok(HashIndex {
            label: label.to_owned(),
            data: new_data,
            count: other.count,
            hashes: Arc::clone(&other.hashes),
            lookup: Arc::clone(&other.lookup),
            invalid_below: 0,
            invalid_from: other.count,
            stats: MatchStats::new(label),
            skip_hash_check: false,
        })
    }

    /// Creates an index by streaming `blocks` chunks of `data`, with no
    /// sidecar involved.
    ///
    /// Used for a source that carries no hash sidecar; reading it through
    /// dm-verity makes the streamed hashes trustworthy.
    pub fn build<T>(label: T, data: Arc<File>, blocks: u32) -> Result<HashIndex, HashIndexError>
    where
        T: AsRef<str>,
    {
        let label = label.as_ref();
        log::debug!(
            "HashIndex::build streaming {} chunks into index {:?}",
            blocks,
            label
        );

        let hashes = Self::stream_hashes(&data, blocks)?;

        Ok(Self::from_region(
            label,
            data,
            HashRegion::Resident(hashes),
            blocks,
        ))
    }

    fn open_or_rebuild(
        label: &str,
        data: Arc<File>,
        sidecar: &Path,
        count: u32,
    ) -> Result<HashIndex, HashIndexError> {
        match File::open(sidecar) {
            Ok(file) => {
                let len = file.metadata()?.len();
                if len == count as u64 * HASH_SIZE as u64 {
                    let region = if count == 0 {
                        HashRegion::Resident(Vec::new())
                    } else {
                        HashRegion::Mapped(unsafe { Mmap::map(&file)? })
                    };

                    return Ok(Self::from_region(label, data, region, count));
                }

                log::debug!(
                    "HashIndex sidecar {:?} is stale ({} bytes for {} chunks), rebuilding",
                    sidecar,
                    len,
                    count
                );
            }
            Err(_) => {
                log::debug!("HashIndex sidecar {:?} is missing, rebuilding", sidecar);
            }
        }

        let hashes = Self::stream_hashes(&data, count)?;

        Ok(Self::from_region(
            label,
            data,
            HashRegion::Resident(hashes),
            count,
        ))
    }

    fn from_region(label: &str, data: Arc<File>, region: HashRegion, count: u32) -> HashIndex {
        let lookup = Self::build_lookup(region.as_bytes(), count);

        HashIndex {
            label: label.to_owned(),
            data,
            count,
            hashes: Arc::new(region),
            lookup: Arc::new(lookup),
            invalid_below: 0,
            invalid_from: count,
            stats: MatchStats::new(label),
            skip_hash_check: false,
        }
    }

    fn chunk_count(count: u64, origin: &Path) -> Result<u32, HashIndexError> {
        u32::try_from(count).map_err(|_| {
            HashIndexError::Size(format!("{:?}: {} chunks exceed the index limit", origin, count))
        })
    }

    /// Argsort over 32-byte keys: chunk numbers ordered by unsigned byte
    /// lexicographic hash order. The sort is stable, so equal hashes keep
    /// their chunk-number order.
    fn build_lookup(hashes: &[u8], count: u32) -> Vec<u32> {
        let mut lookup: Vec<u32> = (0..count).collect();
        lookup.sort_by(|&a, &b| {
            let a = &hashes[a as usize * HASH_SIZE..(a as usize + 1) * HASH_SIZE];
            let b = &hashes[b as usize * HASH_SIZE..(b as usize + 1) * HASH_SIZE];
            a.cmp(b)
        });

        lookup
    }

    fn stream_hashes(data: &File, count: u32) -> Result<Vec<u8>, HashIndexError> {
        let mut hashes = Vec::with_capacity(count as usize * HASH_SIZE);
        // Chunk-aligned so streaming works through an O_DIRECT descriptor.
        let mut buffer = ChunkData::new();

        for n in 0..count {
            data.read_exact_at(&mut buffer.0, n as u64 * CHUNK_SIZE as u64)?;
            hashes.extend_from_slice(&hash_chunk(&buffer.0));
        }

        Ok(hashes)
    }

    /// Writes the hash table out atomically: temp file in the destination
    /// directory, fsync, rename.
    pub fn export(&self, path: &Path) -> Result<(), HashIndexError> {
        log::debug!("HashIndex::export exporting index {:?} to {:?}", self.label, path);

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;

        temp.write_all(self.hashes.as_bytes())?;
        temp.as_file().sync_all()?;

        temp.persist(path).map_err(|e| {
            let err_msg = format!("failed to persist hash file {:?}: {}", path, e);
            log::debug!("HashIndex::export {}", err_msg);

            HashIndexError::Export(err_msg)
        })?;

        Ok(())
    }

    /// Exports the hash table under the slot's checksum-embedding sidecar
    /// name and returns the path written.
    pub fn export_for_slot(
        &self,
        slot: &Slot,
        checksum: &ChunkHash,
    ) -> Result<PathBuf, HashIndexError> {
        let path = slot.hashes_path_for_checksum(checksum);
        self.export(&path)?;

        Ok(path)
    }

    /// Looks up a chunk by hash and reads it from the backing data.
    ///
    /// Binary search over the lookup permutation; the first candidate in
    /// lookup order that satisfies the watermarks wins. The chunk content is
    /// re-hashed and compared against `wanted` unless the index was marked
    /// [`set_skip_hash_check`](Self::set_skip_hash_check) (data under
    /// dm-verity, where verity is the oracle).
    ///
    /// Returns the chunk number on success. Fails with
    /// [`HashIndexError::NotFound`] when no reusable candidate carries the
    /// hash, and [`HashIndexError::Modified`] when the backing data changed
    /// under the index.
    pub fn get_chunk(
        &mut self,
        wanted: &ChunkHash,
        chunk: &mut Chunk,
    ) -> Result<u32, HashIndexError> {
        let candidate = {
            let hashes = self.hashes.as_bytes();
            let lookup: &[u32] = &self.lookup;

            let start = lookup.partition_point(|&n| {
                &hashes[n as usize * HASH_SIZE..(n as usize + 1) * HASH_SIZE] < &wanted[..]
            });

            lookup[start..]
                .iter()
                .copied()
                .take_while(|&n| {
                    &hashes[n as usize * HASH_SIZE..(n as usize + 1) * HASH_SIZE] == &wanted[..]
                })
                .find(|&n| self.invalid_below <= n && n < self.invalid_from)
        };

        let n = match candidate {
            Some(n) => n,
            None => {
                self.stats.add_miss();
                let err_msg = format!(
                    "chunk hash {} not found in index {:?}",
                    hex::encode(wanted),
                    self.label
                );

                return Err(HashIndexError::NotFound(err_msg));
            }
        };

        self.data
            .read_exact_at(&mut chunk.data.0, n as u64 * CHUNK_SIZE as u64)?;

        if !self.skip_hash_check && hash_chunk(&chunk.data.0) != *wanted {
            self.stats.add_miss();
            let err_msg = format!(
                "chunk {} of index {:?} changed under the index",
                n, self.label
            );
            log::debug!("HashIndex::get_chunk {}", err_msg);

            return Err(HashIndexError::Modified(err_msg));
        }

        chunk.hash = *wanted;
        self.stats.add_hit();

        Ok(n)
    }

    /// Returns the index's label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the number of indexed chunks.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Returns the hash of chunk `n`.
    ///
    /// # Panics
    ///
    /// Panics if `n` is out of bounds.
    pub fn chunk_hash(&self, n: u32) -> ChunkHash {
        assert!(n < self.count, "Index out of bounds");

        let bytes = &self.hashes.as_bytes()[n as usize * HASH_SIZE..(n as usize + 1) * HASH_SIZE];
        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(bytes);

        hash
    }

    /// Returns the packed hash records.
    pub fn hashes_bytes(&self) -> &[u8] {
        self.hashes.as_bytes()
    }

    /// Returns a shared handle on the backing data descriptor.
    pub fn data(&self) -> Arc<File> {
        Arc::clone(&self.data)
    }

    /// Returns the lookup statistics.
    pub fn stats(&self) -> &MatchStats {
        &self.stats
    }

    /// Returns the lower watermark: chunk numbers below it are not reusable.
    pub fn invalid_below(&self) -> u32 {
        self.invalid_below
    }

    /// Advances the lower watermark. The watermark is monotonic: a value
    /// below the current one is ignored.
    pub fn set_invalid_below(&mut self, below: u32) {
        self.invalid_below = self.invalid_below.max(below);
    }

    /// Returns the upper watermark: chunk numbers at or above it are not
    /// reusable.
    pub fn invalid_from(&self) -> u32 {
        self.invalid_from
    }

    /// Lowers the upper watermark. The watermark is monotonic: a value above
    /// the current one is ignored.
    pub fn set_invalid_from(&mut self, from: u32) {
        self.invalid_from = self.invalid_from.min(from);
    }

    /// Returns `true` when chunk reads skip the hash re-check.
    pub fn skip_hash_check(&self) -> bool {
        self.skip_hash_check
    }

    /// Skips the per-read hash check. Assert only when the backing data is
    /// itself authenticated, i.e. read through dm-verity.
    pub fn set_skip_hash_check(&mut self, skip: bool) {
        self.skip_hash_check = skip;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;
    use std::os::unix::fs::FileExt;

    fn chunk_filled(byte: u8) -> [u8; CHUNK_SIZE] {
        [byte; CHUNK_SIZE]
    }

    /// Writes `chunks` to `dir/name`, its sidecar to `dir/name.hashes`, and
    /// returns both paths.
    fn write_fixture(
        dir: &Path,
        name: &str,
        chunks: &[[u8; CHUNK_SIZE]],
    ) -> (PathBuf, PathBuf) {
        let data_path = dir.join(name);
        let hashes_path = dir.join(format!("{name}.hashes"));

        let mut data = File::create(&data_path).unwrap();
        let mut hashes = File::create(&hashes_path).unwrap();
        for chunk in chunks {
            data.write_all(chunk).unwrap();
            hashes.write_all(&hash_chunk(chunk)).unwrap();
        }

        (data_path, hashes_path)
    }

    fn open_fixture(dir: &Path, name: &str, chunks: &[[u8; CHUNK_SIZE]]) -> HashIndex {
        let (data_path, hashes_path) = write_fixture(dir, name, chunks);
        let data = Arc::new(File::open(data_path).unwrap());

        HashIndex::open("test", data, &hashes_path).unwrap()
    }

    #[test]
    fn hash_index_open_rejects_a_truncated_hash_file() {
        let dir = tempfile::tempdir().unwrap();
        let (data_path, hashes_path) =
            write_fixture(dir.path(), "data", &[chunk_filled(1), chunk_filled(2)]);

        let hashes = std::fs::read(&hashes_path).unwrap();
        std::fs::write(&hashes_path, &hashes[..HASH_SIZE + 7]).unwrap();

        let data = Arc::new(File::open(data_path).unwrap());
        let actual = HashIndex::open("test", data, &hashes_path);

        assert!(matches!(actual, Err(HashIndexError::Size(_))));
    }

    #[test]
    fn hash_index_open_rejects_a_hash_file_disagreeing_with_the_data_length() {
        let dir = tempfile::tempdir().unwrap();
        let (data_path, hashes_path) =
            write_fixture(dir.path(), "data", &[chunk_filled(1), chunk_filled(2)]);

        // One record too many.
        let mut hashes = std::fs::OpenOptions::new()
            .append(true)
            .open(&hashes_path)
            .unwrap();
        hashes.write_all(&[0u8; HASH_SIZE]).unwrap();

        let data = Arc::new(File::open(data_path).unwrap());
        let actual = HashIndex::open("test", data, &hashes_path);

        assert!(matches!(actual, Err(HashIndexError::Size(_))));
    }

    #[test]
    fn hash_index_open_orders_the_lookup_permutation() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = [
            chunk_filled(9),
            chunk_filled(0),
            chunk_filled(4),
            chunk_filled(7),
            chunk_filled(2),
        ];
        let index = open_fixture(dir.path(), "data", &chunks);

        assert_eq!(index.count(), 5);

        let mut seen: Vec<u32> = index.lookup.to_vec();
        for pair in index.lookup.windows(2) {
            assert!(index.chunk_hash(pair[0]) <= index.chunk_hash(pair[1]));
        }

        seen.sort_unstable();
        let expected: Vec<u32> = (0..5).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn hash_index_get_chunk_returns_the_matching_chunk() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let chunks = [chunk_filled(1), chunk_filled(2), chunk_filled(3)];
        let mut index = open_fixture(dir.path(), "data", &chunks);

        let mut chunk = Chunk::new();
        let wanted = hash_chunk(&chunks[1]);

        let actual = index.get_chunk(&wanted, &mut chunk)?;
        let expected = 1;
        assert_eq!(actual, expected);
        assert_eq!(chunk.data.0, chunks[1]);
        assert_eq!(chunk.hash, wanted);
        assert_eq!(index.stats().hits(), 1);
        assert_eq!(index.stats().misses(), 0);

        Ok(())
    }

    #[test]
    fn hash_index_get_chunk_misses_on_an_unknown_hash() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = [chunk_filled(1), chunk_filled(2)];
        let mut index = open_fixture(dir.path(), "data", &chunks);

        let mut chunk = Chunk::new();
        let wanted = hash_chunk(&chunk_filled(0xee));

        let actual = index.get_chunk(&wanted, &mut chunk);
        assert!(matches!(actual, Err(HashIndexError::NotFound(_))));
        assert_eq!(index.stats().misses(), 1);
    }

    #[test]
    fn hash_index_get_chunk_detects_data_modified_under_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = [chunk_filled(1), chunk_filled(2)];
        let (data_path, hashes_path) = write_fixture(dir.path(), "data", &chunks);

        let data = Arc::new(File::open(&data_path).unwrap());
        let mut index = HashIndex::open("test", data, &hashes_path).unwrap();

        // Overwrite chunk 1 behind the index's back.
        let writer = std::fs::OpenOptions::new()
            .write(true)
            .open(&data_path)
            .unwrap();
        writer
            .write_all_at(&chunk_filled(0xbb), CHUNK_SIZE as u64)
            .unwrap();

        let mut chunk = Chunk::new();
        let wanted = hash_chunk(&chunks[1]);

        let actual = index.get_chunk(&wanted, &mut chunk);
        assert!(matches!(actual, Err(HashIndexError::Modified(_))));
        assert_eq!(index.stats().misses(), 1);
    }

    #[test]
    fn hash_index_get_chunk_trusts_verity_backed_data() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let chunks = [chunk_filled(1), chunk_filled(2)];
        let (data_path, hashes_path) = write_fixture(dir.path(), "data", &chunks);

        let data = Arc::new(File::open(&data_path).unwrap());
        let mut index = HashIndex::open("test", data, &hashes_path).unwrap();
        index.set_skip_hash_check(true);

        let writer = std::fs::OpenOptions::new()
            .write(true)
            .open(&data_path)
            .unwrap();
        writer
            .write_all_at(&chunk_filled(0xbb), CHUNK_SIZE as u64)
            .unwrap();

        let mut chunk = Chunk::new();
        let wanted = hash_chunk(&chunks[1]);

        // No re-hash: the stale read goes through.
        let actual = index.get_chunk(&wanted, &mut chunk)?;
        let expected = 1;
        assert_eq!(actual, expected);
        assert_eq!(index.stats().hits(), 1);

        Ok(())
    }

    #[test]
    fn hash_index_get_chunk_honors_the_watermarks() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        // Chunks 0, 2 and 4 share their content.
        let chunks = [
            chunk_filled(7),
            chunk_filled(1),
            chunk_filled(7),
            chunk_filled(2),
            chunk_filled(7),
        ];
        let mut index = open_fixture(dir.path(), "data", &chunks);

        let mut chunk = Chunk::new();
        let wanted = hash_chunk(&chunk_filled(7));

        // All candidates valid: the first in lookup order wins.
        let actual = index.get_chunk(&wanted, &mut chunk)?;
        assert_eq!(actual, 0);

        // Chunks below 3 already overwritten: candidate 4 remains.
        index.set_invalid_below(3);
        let actual = index.get_chunk(&wanted, &mut chunk)?;
        assert_eq!(actual, 4);

        // Empty window: every lookup misses.
        index.set_invalid_from(4);
        let actual = index.get_chunk(&wanted, &mut chunk);
        assert!(matches!(actual, Err(HashIndexError::NotFound(_))));

        Ok(())
    }

    #[test]
    fn hash_index_watermarks_are_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = [chunk_filled(1), chunk_filled(2), chunk_filled(3)];
        let mut index = open_fixture(dir.path(), "data", &chunks);

        index.set_invalid_below(2);
        index.set_invalid_below(1);
        assert_eq!(index.invalid_below(), 2);

        index.set_invalid_from(2);
        index.set_invalid_from(3);
        assert_eq!(index.invalid_from(), 2);
    }

    #[test]
    fn hash_index_export_round_trips_bit_identically() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let chunks = [chunk_filled(3), chunk_filled(1), chunk_filled(4)];
        let (_, hashes_path) = write_fixture(dir.path(), "data", &chunks);
        let index = open_fixture(dir.path(), "data", &chunks);

        let exported = dir.path().join("exported.hashes");
        index.export(&exported)?;

        let actual = std::fs::read(&exported).unwrap();
        let expected = std::fs::read(&hashes_path).unwrap();
        assert_eq!(actual, expected);

        Ok(())
    }

    #[test]
    fn hash_index_export_for_slot_embeds_the_payload_checksum() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let chunks = [chunk_filled(1)];
        let index = open_fixture(dir.path(), "data", &chunks);

        let slot = Slot::builder()
            .name("rootfs.1")
            .class("rootfs")
            .device(dir.path().join("rootfs.1.img"))
            .build();
        let checksum = [0x5au8; 32];

        let actual = index.export_for_slot(&slot, &checksum)?;
        let expected = slot.hashes_path_for_checksum(&checksum);
        assert_eq!(actual, expected);
        assert!(expected.exists());

        Ok(())
    }

    #[test]
    fn hash_index_reuse_shares_hashes_with_a_new_data_descriptor() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let chunks = [chunk_filled(1), chunk_filled(2)];
        let index = open_fixture(dir.path(), "source", &chunks);

        // Same content under a different file.
        let (copy_path, _) = write_fixture(dir.path(), "copy", &chunks);
        let copy = Arc::new(File::open(copy_path).unwrap());

        let mut reused = HashIndex::reuse("copy", &index, copy)?;
        assert_eq!(reused.count(), index.count());

        let mut chunk = Chunk::new();
        let wanted = hash_chunk(&chunks[0]);
        reused.get_chunk(&wanted, &mut chunk)?;

        assert_eq!(reused.stats().hits(), 1);
        assert_eq!(index.stats().hits(), 0);

        Ok(())
    }

    #[test]
    fn hash_index_open_for_slot_rebuilds_a_missing_sidecar() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("rootfs.0.img");

        let chunks = [chunk_filled(6), chunk_filled(6), chunk_filled(9)];
        let mut file = File::create(&device).unwrap();
        for chunk in &chunks {
            file.write_all(chunk).unwrap();
        }

        let slot = Slot::builder()
            .name("rootfs.0")
            .class("rootfs")
            .device(&device)
            .build();

        let index = HashIndex::open_for_slot("slot", &slot, AccessMode::ReadOnly)?;

        assert_eq!(index.count(), 3);
        assert_eq!(index.chunk_hash(2), hash_chunk(&chunks[2]));

        // Invariant: every record matches its chunk.
        for (n, chunk) in chunks.iter().enumerate() {
            assert_eq!(index.chunk_hash(n as u32), hash_chunk(chunk));
        }

        Ok(())
    }

    #[test]
    fn hash_index_open_for_image_ignores_an_appended_hash_tree() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("bundle.img");

        let payload = [chunk_filled(1), chunk_filled(2)];
        let mut file = File::create(&image).unwrap();
        for chunk in &payload {
            file.write_all(chunk).unwrap();
        }
        // Trailing tree block, not part of the payload.
        file.write_all(&chunk_filled(0xcc)).unwrap();

        let index = HashIndex::open_for_image("image", &image, 2)?;

        assert_eq!(index.count(), 2);
        assert_eq!(index.chunk_hash(0), hash_chunk(&payload[0]));
        assert_eq!(index.chunk_hash(1), hash_chunk(&payload[1]));

        Ok(())
    }

    #[test]
    fn hash_index_finds_a_zero_chunk_by_the_canonical_hash() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let chunks = [chunk_filled(1), chunk_filled(0)];
        let mut index = open_fixture(dir.path(), "data", &chunks);

        let mut chunk = Chunk::new();
        let actual = index.get_chunk(&crate::core::chunk::ZERO_CHUNK_HASH, &mut chunk)?;
        let expected = 1;
        assert_eq!(actual, expected);

        Ok(())
    }
}
