//! Locating input frames on disk

use crate::error::*;
use std::fs;
use std::path::{Path, PathBuf};

/// A file name template with one printf-style number placeholder,
/// e.g. `data/weights-%03d.ppm` (zero-padded to 3 digits) or `shot%d.png`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePattern {
    dir: PathBuf,
    prefix: String,
    suffix: String,
    /// 0 means no padding
    digits: usize,
}

impl FramePattern {
    pub fn parse(pattern: impl AsRef<Path>) -> CatResult<Self> {
        let pattern = pattern.as_ref();
        let name = pattern.file_name().and_then(|n| n.to_str())
            .ok_or_else(|| Error::Config(format!("{} is not a usable frame pattern", pattern.display())))?;
        let dir = match pattern.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let start = name.find('%')
            .ok_or_else(|| Error::Config(format!("frame pattern {name} has no %d placeholder")))?;
        let rest = &name[start + 1..];
        let digits_end = rest.find('d')
            .ok_or_else(|| Error::Config(format!("frame pattern {name} has no %d placeholder")))?;
        let width = &rest[..digits_end];
        let digits = if width.is_empty() {
            0
        } else if width.starts_with('0') && width.bytes().all(|c| c.is_ascii_digit()) {
            width.parse().map_err(|_| Error::Config(format!("bad padding in {name}")))?
        } else {
            return Err(Error::Config(format!("only %d and %0Nd placeholders are supported, got {name}")));
        };
        let suffix = &rest[digits_end + 1..];
        if suffix.contains('%') {
            return Err(Error::Config(format!("frame pattern {name} has more than one placeholder")));
        }

        Ok(Self {
            dir,
            prefix: name[..start].to_owned(),
            suffix: suffix.to_owned(),
            digits,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, index: u32) -> PathBuf {
        self.dir.join(format!("{}{:0width$}{}", self.prefix, index, self.suffix, width = self.digits))
    }

    /// Index encoded in `file_name`, if the name fits the pattern
    pub fn index_of(&self, file_name: &str) -> Option<u32> {
        let number = file_name.strip_prefix(self.prefix.as_str())?.strip_suffix(self.suffix.as_str())?;
        if number.is_empty() || !number.bytes().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if self.digits > 0 {
            // wider numbers are fine once the index outgrows the padding
            if number.len() < self.digits || (number.len() > self.digits && number.starts_with('0')) {
                return None;
            }
        } else if number.len() > 1 && number.starts_with('0') {
            return None;
        }
        number.parse().ok()
    }
}

/// One frame of the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRef {
    pub index: u32,
    pub path: PathBuf,
}

/// Ordered, gap-free list of frames
#[derive(Debug, Clone)]
pub struct FrameSource {
    frames: Vec<FrameRef>,
}

impl FrameSource {
    /// Finds every file in the pattern's directory that matches it.
    ///
    /// Numbering must start at 0 or 1 and have no gaps. The first missing index is reported.
    pub fn scan(pattern: &FramePattern) -> CatResult<Self> {
        let mut indices = Vec::new();
        for entry in fs::read_dir(pattern.dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() && !entry.path().is_file() {
                continue;
            }
            if let Some(index) = entry.file_name().to_str().and_then(|name| pattern.index_of(name)) {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        indices.dedup();

        let first = match indices.first() {
            Some(&first) => first,
            None => return Err(Error::NoFrames),
        };
        if first > 1 {
            return Err(Error::MissingFrame(0, pattern.path_for(0)));
        }
        for (expected, &found) in (first..).zip(&indices) {
            if expected != found {
                return Err(Error::MissingFrame(expected, pattern.path_for(expected)));
            }
        }

        tracing::debug!(first, count = indices.len(), dir = %pattern.dir().display(), "found frames");
        Ok(Self {
            frames: indices.into_iter().map(|index| FrameRef { index, path: pattern.path_for(index) }).collect(),
        })
    }

    /// Exactly `count` frames starting at `start`, whether or not they exist yet.
    /// Use `verify()` to check them.
    pub fn range(pattern: &FramePattern, start: u32, count: u32) -> CatResult<Self> {
        if count == 0 {
            return Err(Error::NoFrames);
        }
        let end = start.checked_add(count).ok_or_else(|| Error::Config("frame range overflows".into()))?;
        Ok(Self {
            frames: (start..end).map(|index| FrameRef { index, path: pattern.path_for(index) }).collect(),
        })
    }

    /// Files in the given order, numbered from 0
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> CatResult<Self> {
        let frames: Vec<_> = paths.into_iter().enumerate()
            .map(|(i, path)| FrameRef { index: i as u32, path })
            .collect();
        if frames.is_empty() {
            return Err(Error::NoFrames);
        }
        Ok(Self { frames })
    }

    /// Every image file in `dir`, in natural sort order (`frame2` before `frame10`)
    pub fn from_dir(dir: &Path) -> CatResult<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && image::ImageFormat::from_path(&path).is_ok() {
                paths.push(path);
            }
        }
        sort_naturally(&mut paths);
        Self::from_paths(paths)
    }

    /// Fails with the first index whose file does not exist
    pub fn verify(&self) -> CatResult<()> {
        match self.frames.iter().find(|f| !f.path.is_file()) {
            Some(missing) => Err(Error::MissingFrame(missing.index, missing.path.clone())),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[FrameRef] {
        &self.frames
    }
}

pub fn sort_naturally(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| natord::compare(&a.to_string_lossy(), &b.to_string_lossy()));
}
