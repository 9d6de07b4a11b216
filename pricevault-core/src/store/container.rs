//! Single-file hierarchical container.
//!
//! Layout (format version 2):
//!
//! ```text
//! [ "PVC1" | version u8 | directory offset u64 LE | directory length u64 LE ]
//! [ group payload ] [ group payload ] ... [ directory ]
//! ```
//!
//! Each group payload is a bincode-encoded [`Group`]. The directory maps group
//! names to payload extents and is decoded on its own, so listing names never
//! touches payloads and reading one group decodes only that group.
//!
//! Writes are append-only. A commit appends the changed groups and a fresh
//! directory, syncs, then rewrites the fixed-size header to point at the new
//! directory. Until the header is rewritten the previous directory is still
//! the live one. Replaced payloads become dead space; once dead space
//! outweighs live data the file is compacted into `{file}.tmp` and renamed
//! over the original.
//!
//! Access is scoped. A [`ContainerHandle`] holds the file open for one
//! operation. A read-write handle keeps changes in memory until
//! [`ContainerHandle::commit`]; dropping it without committing leaves the file
//! untouched.

use super::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"PVC1";
const FORMAT_VERSION: u8 = 2;
const HEADER_LEN: usize = MAGIC.len() + 1 + 16;

/// Dead space below this is never worth a rewrite.
const COMPACT_MIN_DEAD: u64 = 64 * 1024;

/// A typed, one-dimensional array stored inside a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dataset {
    Int32(Vec<i32>),
    Float64(Vec<f64>),
    UInt64(Vec<u64>),
}

impl Dataset {
    pub fn len(&self) -> usize {
        match self {
            Dataset::Int32(v) => v.len(),
            Dataset::Float64(v) => v.len(),
            Dataset::UInt64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            Dataset::Int32(_) => "int32",
            Dataset::Float64(_) => "float64",
            Dataset::UInt64(_) => "uint64",
        }
    }

    fn same_dtype(&self, other: &Dataset) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Failures of dataset-level operations inside one group.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    #[error("dataset '{name}' already exists")]
    Exists { name: String },

    #[error("dataset '{name}' is missing")]
    Missing { name: String },

    #[error("dataset '{name}' has dtype {actual}, expected {expected}")]
    Dtype {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("dataset '{name}' has {stored} elements, cannot assign {incoming}")]
    Length {
        name: String,
        stored: usize,
        incoming: usize,
    },
}

/// A named collection of datasets plus an integrity checksum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    datasets: BTreeMap<String, Dataset>,
    checksum: Option<String>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(|k| k.as_str())
    }

    pub fn dataset_count(&self) -> usize {
        self.datasets.len()
    }

    /// Add a new dataset. Never replaces an existing one.
    pub fn create_dataset(&mut self, name: &str, data: Dataset) -> Result<(), DatasetError> {
        if self.datasets.contains_key(name) {
            return Err(DatasetError::Exists {
                name: name.to_string(),
            });
        }
        self.datasets.insert(name.to_string(), data);
        self.checksum = None;
        Ok(())
    }

    /// Check that `data` could replace the dataset under `name` in place.
    pub fn check_assign(&self, name: &str, data: &Dataset) -> Result<(), DatasetError> {
        let stored = self.datasets.get(name).ok_or_else(|| DatasetError::Missing {
            name: name.to_string(),
        })?;
        if !stored.same_dtype(data) {
            return Err(DatasetError::Dtype {
                name: name.to_string(),
                expected: stored.dtype(),
                actual: data.dtype(),
            });
        }
        if stored.len() != data.len() {
            return Err(DatasetError::Length {
                name: name.to_string(),
                stored: stored.len(),
                incoming: data.len(),
            });
        }
        Ok(())
    }

    /// Overwrite an existing dataset element-for-element. Same dtype and
    /// length are required.
    pub fn assign(&mut self, name: &str, data: Dataset) -> Result<(), DatasetError> {
        self.check_assign(name, &data)?;
        self.datasets.insert(name.to_string(), data);
        self.checksum = None;
        Ok(())
    }

    /// BLAKE3 over the encoded datasets.
    pub fn compute_checksum(&self) -> Result<String, StoreError> {
        let bytes = bincode::serialize(&self.datasets)
            .map_err(|e| StoreError::Codec(format!("checksum encoding: {e}")))?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    /// Record the checksum of the current contents.
    pub fn seal(&mut self) -> Result<(), StoreError> {
        self.checksum = Some(self.compute_checksum()?);
        Ok(())
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// `Ok(true)` if sealed and intact, `Ok(false)` if sealed and altered,
    /// `Ok(true)` if never sealed.
    pub fn checksum_matches(&self) -> Result<bool, StoreError> {
        match &self.checksum {
            None => Ok(true),
            Some(stored) => Ok(*stored == self.compute_checksum()?),
        }
    }
}

/// Byte range inside the container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Extent {
    offset: u64,
    len: u64,
}

impl Extent {
    fn fits(&self, file_len: u64) -> bool {
        self.offset >= HEADER_LEN as u64
            && self
                .offset
                .checked_add(self.len)
                .is_some_and(|end| end <= file_len)
    }
}

/// Group name to payload extent, plus the bytes no extent points at anymore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Directory {
    groups: BTreeMap<String, Extent>,
    dead_bytes: u64,
}

impl Directory {
    fn live_bytes(&self) -> u64 {
        self.groups.values().map(|e| e.len).sum()
    }
}

/// The fixed-size prefix pointing at the live directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    directory: Extent,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..MAGIC.len()].copy_from_slice(MAGIC);
        out[MAGIC.len()] = FORMAT_VERSION;
        out[5..13].copy_from_slice(&self.directory.offset.to_le_bytes());
        out[13..21].copy_from_slice(&self.directory.len.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() <= MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
            return Err(StoreError::Codec("not a container file (bad magic)".into()));
        }
        let version = bytes[MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err(StoreError::Codec(format!(
                "unsupported container format version {version} (expected {FORMAT_VERSION})"
            )));
        }
        if bytes.len() < HEADER_LEN {
            return Err(StoreError::Codec("truncated container header".into()));
        }
        Ok(Self {
            directory: Extent {
                offset: le_u64(&bytes[5..13]),
                len: le_u64(&bytes[13..21]),
            },
        })
    }
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Space accounting for one container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerStats {
    pub groups: usize,
    pub live_bytes: u64,
    pub dead_bytes: u64,
    pub file_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Path to a container file. Holds no open handle.
#[derive(Debug, Clone)]
pub struct ContainerFile {
    path: PathBuf,
}

impl ContainerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write an empty container if the file does not exist yet.
    /// Returns true if a file was created. An existing file is never touched.
    pub fn create_if_missing(&self) -> Result<bool, StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let image = fresh_image(&[])?;
        if let Err(e) = file.write_all(&image).and_then(|_| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&self.path);
            return Err(e.into());
        }
        Ok(true)
    }

    /// Scoped open: reads the header and directory, no group payloads.
    ///
    /// A missing file opens as an empty container in read-write mode and is an
    /// I/O error in read-only mode. A zero-length file is an empty container.
    pub fn open(&self, mode: OpenMode) -> Result<ContainerHandle, StoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => Some(file),
            Err(e) if e.kind() == ErrorKind::NotFound && mode == OpenMode::ReadWrite => None,
            Err(e) => return Err(e.into()),
        };

        let (file_len, header, directory) = match &file {
            None => (0, None, Directory::default()),
            Some(file) => {
                let file_len = file.metadata()?.len();
                match read_header(file)? {
                    None => (file_len, None, Directory::default()),
                    Some(header) => {
                        if !header.directory.fits(file_len) {
                            return Err(StoreError::Codec(
                                "directory extent lies outside the file".into(),
                            ));
                        }
                        let bytes = read_extent(file, header.directory)?;
                        let directory: Directory = bincode::deserialize(&bytes)
                            .map_err(|e| StoreError::Codec(format!("decode directory: {e}")))?;
                        (file_len, Some(header), directory)
                    }
                }
            }
        };

        Ok(ContainerHandle {
            path: self.path.clone(),
            mode,
            file,
            file_len,
            header,
            directory,
            pending: BTreeMap::new(),
        })
    }

    /// Rewrite the file with only live payloads. Returns the bytes reclaimed.
    pub fn compact(&self) -> Result<u64, StoreError> {
        let handle = self.open(OpenMode::ReadOnly)?;
        let mut payloads = Vec::with_capacity(handle.directory.groups.len());
        for (name, extent) in &handle.directory.groups {
            payloads.push((name.clone(), handle.payload(name, *extent)?));
        }
        let image = fresh_image(&payloads)?;
        let before = handle.file_len;
        let expected = handle.header;
        drop(handle);

        if current_header(&self.path)? != expected {
            return Err(StoreError::Conflict);
        }
        write_atomic(&self.path, &image)?;
        Ok(before.saturating_sub(image.len() as u64))
    }
}

/// Open view of a container, valid for one operation.
#[derive(Debug)]
pub struct ContainerHandle {
    path: PathBuf,
    mode: OpenMode,
    file: Option<fs::File>,
    file_len: u64,
    /// Header as read at open; `None` for a missing or zero-length file.
    header: Option<Header>,
    directory: Directory,
    /// Groups touched through this handle, written on commit.
    pending: BTreeMap<String, Group>,
}

impl ContainerHandle {
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn contains(&self, name: &str) -> bool {
        self.directory.groups.contains_key(name) || self.pending.contains_key(name)
    }

    /// Group names in order. Reads nothing beyond the directory.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        let mut names: BTreeSet<&str> = self.directory.groups.keys().map(String::as_str).collect();
        names.extend(self.pending.keys().map(String::as_str));
        names.into_iter()
    }

    pub fn len(&self) -> usize {
        self.group_names().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode one group. An undecodable payload is `Corrupt` for that group only.
    pub fn read_group(&self, name: &str) -> Result<Option<Group>, StoreError> {
        if let Some(group) = self.pending.get(name) {
            return Ok(Some(group.clone()));
        }
        let Some(extent) = self.directory.groups.get(name) else {
            return Ok(None);
        };
        let bytes = self.payload(name, *extent)?;
        bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                symbol: name.to_string(),
                reason: format!("undecodable group payload: {e}"),
            })
    }

    /// Get the group under `name`, creating an empty one if absent.
    pub fn require_group(&mut self, name: &str) -> Result<&mut Group, StoreError> {
        self.ensure_writable()?;
        if !self.pending.contains_key(name) {
            let group = self.read_group(name)?.unwrap_or_default();
            self.pending.insert(name.to_string(), group);
        }
        Ok(self.pending.entry(name.to_string()).or_default())
    }

    /// Mutable access to an existing group.
    pub fn group_mut(&mut self, name: &str) -> Result<Option<&mut Group>, StoreError> {
        self.ensure_writable()?;
        if !self.contains(name) {
            return Ok(None);
        }
        self.require_group(name).map(Some)
    }

    pub fn stats(&self) -> ContainerStats {
        ContainerStats {
            groups: self.directory.groups.len(),
            live_bytes: self.directory.live_bytes(),
            dead_bytes: self.directory.dead_bytes,
            file_bytes: self.file_len,
        }
    }

    /// Persist changes and release the handle.
    ///
    /// Fails with `Conflict` if another writer committed since this handle was
    /// opened; nothing is written in that case.
    pub fn commit(self) -> Result<(), StoreError> {
        self.ensure_writable()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        let Self {
            path,
            file,
            header,
            directory,
            pending,
            ..
        } = self;
        drop(file);

        match header {
            None => {
                if current_header(&path)?.is_some() {
                    return Err(StoreError::Conflict);
                }
                let payloads = pending
                    .iter()
                    .map(|(name, group)| encode_group(group).map(|bytes| (name.clone(), bytes)))
                    .collect::<Result<Vec<_>, _>>()?;
                write_atomic(&path, &fresh_image(&payloads)?)
            }
            Some(header) => {
                let directory = append(&path, header, directory, &pending)?;
                if directory.dead_bytes >= COMPACT_MIN_DEAD
                    && directory.dead_bytes > directory.live_bytes()
                {
                    ContainerFile::new(path).compact()?;
                }
                Ok(())
            }
        }
    }

    fn payload(&self, name: &str, extent: Extent) -> Result<Vec<u8>, StoreError> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| StoreError::Codec("directory lists groups but no file is open".into()))?;
        if !extent.fits(self.file_len) {
            return Err(StoreError::Corrupt {
                symbol: name.to_string(),
                reason: "payload extent lies outside the file".into(),
            });
        }
        Ok(read_extent(file, extent)?)
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        match self.mode {
            OpenMode::ReadWrite => Ok(()),
            OpenMode::ReadOnly => Err(StoreError::ReadOnly),
        }
    }
}

/// Append `pending` and a new directory, then swap the header.
fn append(
    path: &Path,
    header: Header,
    mut directory: Directory,
    pending: &BTreeMap<String, Group>,
) -> Result<Directory, StoreError> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    if read_header(&file)? != Some(header) {
        return Err(StoreError::Conflict);
    }

    let start = file.seek(SeekFrom::End(0))?;
    let mut buf = Vec::new();
    for (name, group) in pending {
        let bytes = encode_group(group)?;
        let extent = Extent {
            offset: start + buf.len() as u64,
            len: bytes.len() as u64,
        };
        if let Some(old) = directory.groups.insert(name.clone(), extent) {
            directory.dead_bytes += old.len;
        }
        buf.extend_from_slice(&bytes);
    }
    directory.dead_bytes += header.directory.len;

    let dir_bytes = encode_directory(&directory)?;
    let dir_extent = Extent {
        offset: start + buf.len() as u64,
        len: dir_bytes.len() as u64,
    };
    buf.extend_from_slice(&dir_bytes);

    file.write_all(&buf)?;
    file.sync_data()?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&Header { directory: dir_extent }.encode())?;
    file.sync_data()?;
    Ok(directory)
}

/// Complete file image holding `payloads` and no dead space.
fn fresh_image(payloads: &[(String, Vec<u8>)]) -> Result<Vec<u8>, StoreError> {
    let mut buf = vec![0u8; HEADER_LEN];
    let mut directory = Directory::default();
    for (name, bytes) in payloads {
        directory.groups.insert(
            name.clone(),
            Extent {
                offset: buf.len() as u64,
                len: bytes.len() as u64,
            },
        );
        buf.extend_from_slice(bytes);
    }
    let dir_bytes = encode_directory(&directory)?;
    let header = Header {
        directory: Extent {
            offset: buf.len() as u64,
            len: dir_bytes.len() as u64,
        },
    };
    buf.extend_from_slice(&dir_bytes);
    buf[..HEADER_LEN].copy_from_slice(&header.encode());
    Ok(buf)
}

fn encode_group(group: &Group) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(group).map_err(|e| StoreError::Codec(format!("encode group: {e}")))
}

fn encode_directory(directory: &Directory) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(directory).map_err(|e| StoreError::Codec(format!("encode directory: {e}")))
}

/// `None` for a zero-length file.
fn read_header(file: &fs::File) -> Result<Option<Header>, StoreError> {
    let mut reader = file;
    reader.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN);
    reader.take(HEADER_LEN as u64).read_to_end(&mut bytes)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Header::decode(&bytes).map(Some)
}

/// Header currently on disk; `None` when the file is missing or empty.
fn current_header(path: &Path) -> Result<Option<Header>, StoreError> {
    match fs::File::open(path) {
        Ok(file) => read_header(&file),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_extent(file: &fs::File, extent: Extent) -> std::io::Result<Vec<u8>> {
    let mut reader = file;
    reader.seek(SeekFrom::Start(extent.offset))?;
    let mut buf = vec![0u8; extent.len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write to `{path}.tmp`, fsync, then rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = tmp_path(path);
    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::Io(e)
    })
}

/// Overwrite the payload bytes of `name` with 0xFF, leaving the directory intact.
#[cfg(test)]
pub(crate) fn scribble_payload(file: &ContainerFile, name: &str) {
    let extent = file.open(OpenMode::ReadOnly).unwrap().directory.groups[name];
    let mut raw = OpenOptions::new().write(true).open(file.path()).unwrap();
    raw.seek(SeekFrom::Start(extent.offset)).unwrap();
    raw.write_all(&vec![0xFF; extent.len as usize]).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container_in(dir: &tempfile::TempDir) -> ContainerFile {
        ContainerFile::new(dir.path().join("prices.pvc"))
    }

    fn put(file: &ContainerFile, name: &str, data: Dataset) {
        let mut handle = file.open(OpenMode::ReadWrite).unwrap();
        let group = handle.require_group(name).unwrap();
        if group.dataset("values").is_some() {
            group.assign("values", data).unwrap();
        } else {
            group.create_dataset("values", data).unwrap();
        }
        group.seal().unwrap();
        handle.commit().unwrap();
    }

    #[test]
    fn create_if_missing_writes_empty_container_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = ContainerFile::new(dir.path().join("nested/dir/prices.pvc"));

        assert!(file.create_if_missing().unwrap());
        assert!(!file.create_if_missing().unwrap());

        let handle = file.open(OpenMode::ReadOnly).unwrap();
        assert!(handle.is_empty());
    }

    #[test]
    fn create_if_missing_never_replaces_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.pvc");
        // Another writer got there first.
        let other = ContainerFile::new(&path);
        put(&other, "SPY", Dataset::Float64(vec![1.0, 2.0]));
        let before = fs::read(&path).unwrap();

        let file = ContainerFile::new(&path);
        assert!(!file.create_if_missing().unwrap());

        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(file.open(OpenMode::ReadOnly).unwrap().contains("SPY"));
    }

    #[test]
    fn committed_groups_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let file = container_in(&dir);

        put(&file, "SPY", Dataset::Float64(vec![1.0, 2.0]));

        let handle = file.open(OpenMode::ReadOnly).unwrap();
        assert_eq!(handle.group_names().collect::<Vec<_>>(), vec!["SPY"]);
        let group = handle.read_group("SPY").unwrap().unwrap();
        assert_eq!(group.dataset("values"), Some(&Dataset::Float64(vec![1.0, 2.0])));
        assert!(group.checksum_matches().unwrap());
        assert!(!tmp_path(file.path()).exists());
    }

    #[test]
    fn listing_names_reads_only_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = container_in(&dir);
        file.create_if_missing().unwrap();
        put(&file, "AAPL", Dataset::Float64(vec![1.0; 16]));
        put(&file, "MSFT", Dataset::Float64(vec![2.0; 16]));

        scribble_payload(&file, "AAPL");

        let handle = file.open(OpenMode::ReadOnly).unwrap();
        assert_eq!(handle.group_names().collect::<Vec<_>>(), vec!["AAPL", "MSFT"]);
        assert!(matches!(
            handle.read_group("AAPL"),
            Err(StoreError::Corrupt { ref symbol, .. }) if symbol == "AAPL"
        ));
        assert!(handle.read_group("MSFT").unwrap().is_some());
    }

    #[test]
    fn insert_appends_without_moving_existing_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let file = container_in(&dir);
        file.create_if_missing().unwrap();
        put(&file, "AAA", Dataset::UInt64(vec![7; 32]));
        let before = file.open(OpenMode::ReadOnly).unwrap().directory.groups["AAA"];
        let len_before = fs::metadata(file.path()).unwrap().len();

        put(&file, "BBB", Dataset::UInt64(vec![8; 32]));

        let handle = file.open(OpenMode::ReadOnly).unwrap();
        assert_eq!(handle.directory.groups["AAA"], before);
        assert!(handle.directory.groups["BBB"].offset >= len_before);
    }

    #[test]
    fn replaced_payloads_are_dead_until_compaction() {
        let dir = tempfile::tempdir().unwrap();
        let file = container_in(&dir);
        file.create_if_missing().unwrap();
        put(&file, "SPY", Dataset::Float64(vec![1.0; 8]));
        put(&file, "SPY", Dataset::Float64(vec![2.0; 8]));

        let stats = file.open(OpenMode::ReadOnly).unwrap().stats();
        assert_eq!(stats.groups, 1);
        assert!(stats.dead_bytes > 0);

        assert!(file.compact().unwrap() > 0);

        let handle = file.open(OpenMode::ReadOnly).unwrap();
        assert_eq!(handle.stats().dead_bytes, 0);
        let group = handle.read_group("SPY").unwrap().unwrap();
        assert_eq!(group.dataset("values"), Some(&Dataset::Float64(vec![2.0; 8])));
    }

    #[test]
    fn large_dead_space_is_compacted_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        let file = container_in(&dir);
        file.create_if_missing().unwrap();
        for round in 0..4 {
            put(&file, "SPY", Dataset::Float64(vec![round as f64; 20_000]));
        }

        let stats = file.open(OpenMode::ReadOnly).unwrap().stats();
        assert_eq!(stats.dead_bytes, 0);
        assert!(stats.file_bytes < 2 * stats.live_bytes);
    }

    #[test]
    fn dropped_handle_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = container_in(&dir);
        file.create_if_missing().unwrap();
        let before = fs::read(file.path()).unwrap();

        {
            let mut handle = file.open(OpenMode::ReadWrite).unwrap();
            handle.require_group("QQQ").unwrap();
        }

        assert_eq!(fs::read(file.path()).unwrap(), before);
    }

    #[test]
    fn stale_handle_cannot_commit() {
        let dir = tempfile::tempdir().unwrap();
        let file = container_in(&dir);
        file.create_if_missing().unwrap();

        let mut first = file.open(OpenMode::ReadWrite).unwrap();
        let mut second = file.open(OpenMode::ReadWrite).unwrap();
        first.require_group("AAA").unwrap();
        second.require_group("BBB").unwrap();
        first.commit().unwrap();

        assert!(matches!(second.commit(), Err(StoreError::Conflict)));
        let names: Vec<String> = file
            .open(OpenMode::ReadOnly)
            .unwrap()
            .group_names()
            .map(str::to_string)
            .collect();
        assert_eq!(names, vec!["AAA"]);
    }

    #[test]
    fn read_only_handle_rejects_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let file = container_in(&dir);
        file.create_if_missing().unwrap();

        let mut handle = file.open(OpenMode::ReadOnly).unwrap();
        assert!(matches!(handle.require_group("SPY"), Err(StoreError::ReadOnly)));
        assert!(matches!(handle.commit(), Err(StoreError::ReadOnly)));
    }

    #[test]
    fn missing_file_is_error_read_only_but_empty_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let file = container_in(&dir);

        assert!(matches!(file.open(OpenMode::ReadOnly), Err(StoreError::Io(_))));
        assert!(file.open(OpenMode::ReadWrite).unwrap().is_empty());

        let mut handle = file.open(OpenMode::ReadWrite).unwrap();
        handle.require_group("SPY").unwrap();
        handle.commit().unwrap();
        assert!(file.open(OpenMode::ReadOnly).unwrap().contains("SPY"));
    }

    #[test]
    fn garbage_and_zero_length_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = container_in(&dir);

        fs::write(file.path(), b"").unwrap();
        assert!(file.open(OpenMode::ReadOnly).unwrap().is_empty());

        fs::write(file.path(), b"definitely not a container").unwrap();
        assert!(matches!(file.open(OpenMode::ReadOnly), Err(StoreError::Codec(_))));

        let mut wrong_version = MAGIC.to_vec();
        wrong_version.push(FORMAT_VERSION + 1);
        fs::write(file.path(), &wrong_version).unwrap();
        assert!(matches!(file.open(OpenMode::ReadOnly), Err(StoreError::Codec(_))));

        let dangling = Header {
            directory: Extent {
                offset: 4096,
                len: 10,
            },
        };
        fs::write(file.path(), dangling.encode()).unwrap();
        assert!(matches!(file.open(OpenMode::ReadOnly), Err(StoreError::Codec(_))));
    }

    #[test]
    fn create_dataset_never_overwrites() {
        let mut group = Group::new();
        group
            .create_dataset("close", Dataset::Float64(vec![1.0]))
            .unwrap();
        let err = group
            .create_dataset("close", Dataset::Float64(vec![9.0]))
            .unwrap_err();

        assert_eq!(
            err,
            DatasetError::Exists {
                name: "close".into()
            }
        );
        assert_eq!(group.dataset("close"), Some(&Dataset::Float64(vec![1.0])));
    }

    #[test]
    fn assign_requires_same_shape_and_dtype() {
        let mut group = Group::new();
        group
            .create_dataset("volume", Dataset::UInt64(vec![1, 2]))
            .unwrap();

        assert!(matches!(
            group.assign("volume", Dataset::UInt64(vec![1, 2, 3])),
            Err(DatasetError::Length { stored: 2, incoming: 3, .. })
        ));
        assert!(matches!(
            group.assign("volume", Dataset::Float64(vec![1.0, 2.0])),
            Err(DatasetError::Dtype { .. })
        ));
        assert!(matches!(
            group.assign("date", Dataset::Int32(vec![1, 2])),
            Err(DatasetError::Missing { .. })
        ));

        group.assign("volume", Dataset::UInt64(vec![7, 8])).unwrap();
        assert_eq!(group.dataset("volume"), Some(&Dataset::UInt64(vec![7, 8])));
    }

    #[test]
    fn checksum_detects_tampering() {
        let mut group = Group::new();
        group
            .create_dataset("open", Dataset::Float64(vec![1.0, 2.0]))
            .unwrap();
        group.seal().unwrap();
        assert!(group.checksum_matches().unwrap());

        group
            .datasets
            .insert("open".into(), Dataset::Float64(vec![1.0, 3.0]));
        assert!(!group.checksum_matches().unwrap());
    }
}
