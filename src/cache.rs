//! Marker file cache (design §4.8): the Fiat-Karlin marker algorithm over
//! two disjoint sets, MARKED and UNMARKED, with random eviction and
//! promote-and-demote cycling.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::seq::IteratorRandom;

/// Cached bytes plus the canonical path they were read from, so a write
/// can find and update an existing entry in place.
#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
}

/// Two-tier cache keyed by canonical path, plus a name→canonical-path
/// index for lookups by a display/request name distinct from the
/// filesystem path.
#[derive(Debug)]
pub struct FileCache {
    marked: HashMap<PathBuf, Entry>,
    unmarked: HashMap<PathBuf, Entry>,
    name_index: HashMap<String, PathBuf>,
    max_files: usize,
    max_filesize: u64,
}

impl FileCache {
    pub fn new(max_files: usize, max_filesize: u64) -> Self {
        FileCache {
            marked: HashMap::new(),
            unmarked: HashMap::new(),
            name_index: HashMap::new(),
            max_files,
            max_filesize,
        }
    }

    /// Reads `path` through the marker cache, keyed by `name` in the
    /// index. Promotes UNMARKED → MARKED on hit; on miss, loads via
    /// `load` and inserts per the marker algorithm (design §4.8).
    pub fn get<F>(&mut self, name: &str, path: &Path, load: F) -> std::io::Result<Vec<u8>>
    where
        F: FnOnce(&Path) -> std::io::Result<Vec<u8>>,
    {
        let canonical = path.to_path_buf();

        if let Some(entry) = self.marked.get(&canonical) {
            return Ok(entry.bytes.clone());
        }
        if let Some(entry) = self.unmarked.remove(&canonical) {
            let bytes = entry.bytes.clone();
            self.marked.insert(canonical, entry);
            return Ok(bytes);
        }

        let bytes = load(path)?;
        if bytes.len() as u64 > self.max_filesize {
            return Ok(bytes);
        }

        self.insert_marked(name, canonical, bytes.clone());
        Ok(bytes)
    }

    fn insert_marked(&mut self, name: &str, canonical: PathBuf, bytes: Vec<u8>) {
        if self.marked.len() + self.unmarked.len() >= self.max_files {
            self.evict_one_unmarked();
        }
        if self.marked.len() >= self.max_files {
            // MARKED is full: demote everything to UNMARKED and start a
            // fresh MARKED generation (design §4.8 "promote-and-demote").
            for (path, entry) in self.marked.drain() {
                self.unmarked.insert(path, entry);
            }
        }
        self.name_index.insert(name.to_string(), canonical.clone());
        self.marked.insert(canonical, Entry { bytes });
    }

    fn evict_one_unmarked(&mut self) {
        let mut rng = rand::thread_rng();
        let victim = self.unmarked.keys().cloned().choose(&mut rng);
        if let Some(path) = victim {
            self.unmarked.remove(&path);
            self.name_index.retain(|_, v| v != &path);
        }
    }

    /// `filePutContents`: always writes through to disk; updates whichever
    /// tier already holds `canonical`, but never creates a new entry.
    pub fn put_contents<F>(&mut self, canonical: &Path, bytes: &[u8], write: F) -> std::io::Result<()>
    where
        F: FnOnce(&Path, &[u8]) -> std::io::Result<()>,
    {
        write(canonical, bytes)?;
        if let Some(entry) = self.marked.get_mut(canonical) {
            entry.bytes = bytes.to_vec();
        } else if let Some(entry) = self.unmarked.get_mut(canonical) {
            entry.bytes = bytes.to_vec();
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.marked.len() + self.unmarked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.marked.contains_key(path) || self.unmarked.contains_key(path)
    }

    pub fn resolve_name(&self, name: &str) -> Option<&Path> {
        self.name_index.get(name).map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(contents: &'static [u8]) -> impl Fn(&Path) -> std::io::Result<Vec<u8>> {
        move |_path| Ok(contents.to_vec())
    }

    #[test]
    fn miss_then_hit_returns_same_bytes() {
        let mut cache = FileCache::new(10, 1_000);
        let path = PathBuf::from("/a");
        let first = cache.get("a", &path, loader(b"hello")).unwrap();
        assert_eq!(first, b"hello");
        assert!(cache.contains(&path));
        let second = cache.get("a", &path, loader(b"should-not-be-called")).unwrap();
        assert_eq!(second, b"hello");
    }

    #[test]
    fn oversized_file_bypasses_cache() {
        let mut cache = FileCache::new(10, 2);
        let path = PathBuf::from("/big");
        let bytes = cache.get("big", &path, loader(b"too long")).unwrap();
        assert_eq!(bytes, b"too long");
        assert!(!cache.contains(&path));
    }

    #[test]
    fn marked_and_unmarked_stay_disjoint_after_promote() {
        let mut cache = FileCache::new(10, 1_000);
        let path = PathBuf::from("/x");
        cache.get("x", &path, loader(b"v1")).unwrap();
        // Force it into UNMARKED by draining MARKED directly, then promote.
        let entry = cache.marked.remove(&path).unwrap();
        cache.unmarked.insert(path.clone(), entry);
        cache.get("x", &path, loader(b"unused")).unwrap();
        assert!(cache.marked.contains_key(&path));
        assert!(!cache.unmarked.contains_key(&path));
    }

    #[test]
    fn total_entries_never_exceed_max_files() {
        let mut cache = FileCache::new(3, 1_000);
        for i in 0..10 {
            let path = PathBuf::from(format!("/f{i}"));
            let name = format!("f{i}");
            cache.get(&name, &path, loader(b"x")).unwrap();
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn put_contents_updates_existing_entry_in_place() {
        let mut cache = FileCache::new(10, 1_000);
        let path = PathBuf::from("/w");
        cache.get("w", &path, loader(b"old")).unwrap();
        cache.put_contents(&path, b"new", |_p, _b| Ok(())).unwrap();
        let refetched = cache.get("w", &path, loader(b"should-not-run")).unwrap();
        assert_eq!(refetched, b"new");
    }
}
