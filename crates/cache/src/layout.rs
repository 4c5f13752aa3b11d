//! On-disk layout of a cache directory.
//!
//! ```text
//! <root>/cache.db, cache.lg                       record store
//! <root>/Tiles/<hex pyramid id>/<abc>/<def>/<g>.<suffix or "tile">
//! <root>/Files/<hex (file_id ^ 0x80000000)>
//! <root>/cache.delete                             delete on next open
//! <root>/cache.db.old, cache.lg.old, Tiles.old/, Files.old/
//! ```
//!
//! Tile position codes are split into 3-character directory segments so
//! that deep pyramids do not put millions of files into one directory.
//! Bytes outside `[A-Za-z0-9_-]` are written as `%XX` before splitting, and
//! the leaf always carries an extension, so a tile's file never shares a
//! name with the segment directory of its children.

use std::ffi::OsString;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const TILES_DIR: &str = "Tiles";
pub const FILES_DIR: &str = "Files";
pub const DELETE_SENTINEL: &str = "cache.delete";
pub const OLD_SUFFIX: &str = ".old";
/// Marks a download still being written next to its final name.
pub const PARTIAL_SUFFIX: &str = ".tmp";

const SEGMENT_LEN: usize = 3;

/// Leaf extension for tiles requested without a suffix.
const BARE_SUFFIX: &str = "tile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

fn is_plain(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Spells a position code with file-name-safe characters only.
fn escape_position_code(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for b in code.bytes() {
        if is_plain(b) {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

/// Inverse of [`escape_position_code`]. Only the canonical spelling is
/// accepted, so every file name maps to at most one position code.
fn unescape_position_code(escaped: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(escaped.len());
    let mut rest = escaped.as_bytes();
    while let Some((&b, tail)) = rest.split_first() {
        if b == b'%' {
            let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else if is_plain(b) {
            bytes.push(b);
            rest = tail;
        } else {
            return None;
        }
    }
    let code = String::from_utf8(bytes).ok()?;
    (escape_position_code(&code) == escaped).then_some(code)
}

fn valid_suffix(suffix: &str) -> bool {
    suffix.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Appends `.old` to the last component of `path`.
pub fn old_path(path: &Path) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(OLD_SUFFIX);
    PathBuf::from(s)
}

/// Removes a file or a directory tree. A missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Renames `path` to `<path>.old` and then deletes it, so a reader holding
/// the old name never sees a half-deleted file under the live name.
pub fn discard_file(path: &Path) -> io::Result<()> {
    let old = old_path(path);
    match fs::rename(path, &old) {
        Ok(()) => remove_path(&old),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(store::DB_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(store::LOG_FILE)
    }

    pub fn tiles_dir(&self) -> PathBuf {
        self.root.join(TILES_DIR)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join(FILES_DIR)
    }

    pub fn sentinel_path(&self) -> PathBuf {
        self.root.join(DELETE_SENTINEL)
    }

    /// Everything `delete` renames aside, in rename order.
    pub fn live_artifacts(&self) -> Vec<PathBuf> {
        vec![
            self.db_path(),
            self.log_path(),
            self.tiles_dir(),
            self.files_dir(),
        ]
    }

    /// Leftovers of a previous `delete`.
    pub fn old_artifacts(&self) -> Vec<PathBuf> {
        self.live_artifacts().iter().map(|p| old_path(p)).collect()
    }

    pub fn create_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(self.tiles_dir())?;
        fs::create_dir_all(self.files_dir())
    }

    /// Removes downloads a crash left half-written in `Files/`. Returns
    /// how many were removed.
    pub fn sweep_partial_downloads(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(self.files_dir())? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                remove_path(&entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn pyramid_dir(&self, pyramid_id: i32) -> PathBuf {
        self.tiles_dir().join(format!("{:x}", pyramid_id as u32))
    }

    /// Inverse of [`CacheLayout::pyramid_dir`] for a directory name.
    pub fn parse_pyramid_dir(name: &str) -> Option<i32> {
        u32::from_str_radix(name, 16).ok().map(|v| v as i32)
    }

    /// Whether a tile with this position code and suffix has a file name.
    pub fn is_valid_tile_name(position_code: &str, suffix: &str) -> bool {
        !position_code.is_empty() && valid_suffix(suffix)
    }

    /// Path of a tile's backing file, or `None` if the position code is
    /// empty or the suffix is not alphanumeric.
    pub fn tile_path(&self, pyramid_id: i32, position_code: &str, suffix: &str) -> Option<PathBuf> {
        if !Self::is_valid_tile_name(position_code, suffix) {
            return None;
        }
        let ext = if suffix.is_empty() { BARE_SUFFIX } else { suffix };
        let escaped = escape_position_code(position_code);
        let mut path = self.pyramid_dir(pyramid_id);
        let mut segments = escaped.as_bytes().chunks(SEGMENT_LEN).peekable();
        while let Some(seg) = segments.next() {
            // the escaped code is ASCII, so every chunk is valid UTF-8
            let seg = std::str::from_utf8(seg).ok()?;
            if segments.peek().is_some() {
                path.push(seg);
            } else {
                path.push(format!("{seg}.{ext}"));
            }
        }
        Some(path)
    }

    /// Recovers the position code from a tile file's path components below
    /// its pyramid directory. Returns `None` for paths `tile_path` never
    /// produces.
    pub fn parse_tile_components(components: &[String]) -> Option<String> {
        let (leaf, dirs) = components.split_last()?;
        if dirs.iter().any(|d| d.len() != SEGMENT_LEN) {
            return None;
        }
        let (stem, ext) = leaf.split_once('.')?;
        if stem.is_empty() || stem.len() > SEGMENT_LEN || ext.is_empty() || !valid_suffix(ext) {
            return None;
        }
        let escaped: String = dirs.iter().map(String::as_str).chain([stem]).collect();
        unescape_position_code(&escaped)
    }

    pub fn file_path(&self, file_id: i32) -> PathBuf {
        self.files_dir()
            .join(format!("{:x}", (file_id as u32) ^ 0x8000_0000))
    }

    /// Inverse of [`CacheLayout::file_path`] for a file name.
    pub fn parse_file_name(name: &str) -> Option<i32> {
        u32::from_str_radix(name, 16)
            .ok()
            .map(|v| (v ^ 0x8000_0000) as i32)
    }
}
