use gifseq::{sort_naturally, CatResult, Error, FramePattern, FrameSource, Stage, StageError};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

const RANGE_NEEDS_PATTERN: &str = "--start/--count need a numbered pattern like frames/%04d.png";

/// Where frames come from, as given on the command line
pub enum FramesArg<'a> {
    /// `frames/%04d.png`
    Pattern(&'a Path),
    Dir(&'a Path),
    Files(Vec<PathBuf>),
}

impl<'a> FramesArg<'a> {
    pub fn from_args(args: &[&'a OsStr]) -> Self {
        if let &[single] = args {
            let path = Path::new(single);
            if single.to_string_lossy().contains('%') {
                return Self::Pattern(path);
            }
            if path.is_dir() {
                return Self::Dir(path);
            }
        }
        Self::Files(args.iter().map(PathBuf::from).collect())
    }

    /// `range` only applies to patterns, as (first index, frame count).
    /// Finding the frames is part of sequencing, so failures are reported as such.
    pub fn into_source(self, range: Option<(u32, u32)>) -> Result<FrameSource, StageError> {
        self.resolve(range).map_err(|e| StageError::new(Stage::Sequencing, e))
    }

    fn resolve(self, range: Option<(u32, u32)>) -> CatResult<FrameSource> {
        match self {
            Self::Pattern(path) => {
                let pattern = FramePattern::parse(path)?;
                match range {
                    Some((start, count)) => FrameSource::range(&pattern, start, count),
                    None => FrameSource::scan(&pattern),
                }
            },
            Self::Dir(path) => {
                if range.is_some() {
                    return Err(Error::Config(RANGE_NEEDS_PATTERN.into()));
                }
                FrameSource::from_dir(path)
            },
            Self::Files(mut paths) => {
                if range.is_some() {
                    return Err(Error::Config(RANGE_NEEDS_PATTERN.into()));
                }
                // shells sort "10" before "2"
                sort_naturally(&mut paths);
                FrameSource::from_paths(paths)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_in_pattern_is_a_sequencing_error() {
        let dir = std::env::temp_dir().join(format!("gifseq-bin-gap-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        for i in [0, 1, 2, 4] {
            std::fs::write(dir.join(format!("f{i:03}.png")), b"x").unwrap();
        }
        let pattern = dir.join("f%03d.png");
        let args = [pattern.as_os_str()];
        let err = FramesArg::from_args(&args).into_source(None).unwrap_err();
        assert_eq!(err.stage, Stage::Sequencing);
        assert!(matches!(err.error, Error::MissingFrame(3, _)));
        assert!(err.to_string().starts_with("sequencing frames: frame 3 is missing"), "{err}");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn range_needs_a_pattern() {
        let args = [OsStr::new("a.png"), OsStr::new("b.png")];
        let err = FramesArg::from_args(&args).into_source(Some((0, 2))).unwrap_err();
        assert_eq!(err.stage, Stage::Sequencing);
        assert!(err.to_string().contains("--start/--count"), "{err}");
    }
}
