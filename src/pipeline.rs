//! Running the three stages as one job

use crate::apply::Written;
use crate::error::*;
use crate::frames::FrameSource;
use crate::progress::ProgressReporter;
use crate::Settings;
use std::fmt;
use std::path::{Path, PathBuf};

/// One step of the conversion. Each reads the previous step's file and writes its own.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    /// frames → intermediate video
    Sequencing,
    /// intermediate video → palette
    PaletteExtracting,
    /// intermediate video + palette → GIF
    PaletteApplying,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sequencing => "sequencing frames",
            Self::PaletteExtracting => "extracting palette",
            Self::PaletteApplying => "applying palette",
        })
    }
}

/// An error together with the stage it stopped
#[derive(Debug)]
pub struct StageError {
    pub stage: Stage,
    pub error: Error,
}

impl StageError {
    pub fn new(stage: Stage, error: Error) -> Self {
        Self { stage, error }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.error)
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Where a job is. `Failed` is terminal until a stage is re-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    NotStarted,
    Sequencing,
    PaletteExtracting,
    PaletteApplying,
    Done(Written),
    Failed { stage: Stage, kind: ErrorKind, cause: String },
}

impl JobState {
    fn running(stage: Stage) -> Self {
        match stage {
            Stage::Sequencing => Self::Sequencing,
            Stage::PaletteExtracting => Self::PaletteExtracting,
            Stage::PaletteApplying => Self::PaletteApplying,
        }
    }
}

/// A conversion from frames to GIF, with every file it touches spelled out.
///
/// Jobs with distinct paths share nothing and can run on separate threads.
#[derive(Debug, Clone)]
pub struct Job {
    pub frames: FrameSource,
    /// Intermediate video. The extension picks the container.
    pub intermediate: PathBuf,
    pub palette: PathBuf,
    pub output: PathBuf,
    pub settings: Settings,
    /// Leave the intermediate video and palette on disk after success
    pub keep_intermediates: bool,
    state: JobState,
}

impl Job {
    /// Intermediate files go next to `output`, as `<name>.frames.png` and `<name>.palette.png`
    pub fn new(frames: FrameSource, output: impl Into<PathBuf>, settings: Settings) -> Self {
        let output = output.into();
        let (intermediate, palette) = artifact_paths(&output);
        Self {
            frames,
            intermediate,
            palette,
            output,
            settings,
            keep_intermediates: true,
            state: JobState::NotStarted,
        }
    }

    pub fn with_artifacts(mut self, intermediate: impl Into<PathBuf>, palette: impl Into<PathBuf>) -> Self {
        self.intermediate = intermediate.into();
        self.palette = palette.into();
        self
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// All three stages in order, stopping at the first failure.
    ///
    /// Files written by earlier stages are left in place when a later one fails.
    pub fn run(&mut self, reporter: &mut dyn ProgressReporter) -> Result<Written, StageError> {
        if let Err(err) = self.check() {
            return Err(fail(&mut self.state, err));
        }
        self.sequence(reporter)?;
        self.extract_palette(reporter)?;
        let written = self.apply_palette(reporter)?;

        if !self.keep_intermediates {
            for path in [&self.intermediate, &self.palette] {
                if let Err(err) = std::fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), %err, "can't remove intermediate file");
                }
            }
        }
        reporter.done(&format!("gifseq created {}", self.output.display()));
        Ok(written)
    }

    /// Stage 1 alone. Can be re-run at any time; it only depends on the frames.
    pub fn sequence(&mut self, reporter: &mut dyn ProgressReporter) -> Result<(), StageError> {
        let sequencer = self.settings.sequencer();
        let (frames, dest) = (&self.frames, &self.intermediate);
        run_stage(&mut self.state, Stage::Sequencing, || sequencer.sequence(frames, dest, reporter).map(drop))
    }

    /// Stage 2 alone. Needs the intermediate video.
    pub fn extract_palette(&mut self, reporter: &mut dyn ProgressReporter) -> Result<(), StageError> {
        let settings = self.settings;
        let (video, palette) = (&self.intermediate, &self.palette);
        run_stage(&mut self.state, Stage::PaletteExtracting, || {
            settings.extractor()?.extract_to(video, palette, reporter).map(drop)
        })
    }

    /// Stage 3 alone. Needs the intermediate video and the palette.
    pub fn apply_palette(&mut self, reporter: &mut dyn ProgressReporter) -> Result<Written, StageError> {
        let applicator = self.settings.applicator();
        let (video, palette, output) = (&self.intermediate, &self.palette, &self.output);
        let written = run_stage(&mut self.state, Stage::PaletteApplying, || applicator.apply_file(video, palette, output, reporter))?;
        self.state = JobState::Done(written);
        Ok(written)
    }

    /// Settings problems are reported against the stage that would trip over them
    fn check(&self) -> Result<(), StageError> {
        self.settings.check()?;
        let paths = [&self.intermediate, &self.palette, &self.output];
        for (i, a) in paths.iter().enumerate() {
            if paths[i + 1..].iter().any(|b| same_file(a, b)) {
                return Err(StageError::new(Stage::Sequencing,
                    Error::Config(format!("{} is used for two different outputs", a.display()))));
            }
        }
        crate::video::ContainerFormat::from_path(&self.intermediate).map_err(|e| StageError::new(Stage::Sequencing, e))?;
        Ok(())
    }
}

fn run_stage<T>(state: &mut JobState, stage: Stage, run: impl FnOnce() -> CatResult<T>) -> Result<T, StageError> {
    *state = JobState::running(stage);
    tracing::info!(%stage, "stage started");
    match run() {
        Ok(res) => {
            tracing::info!(%stage, "stage finished");
            Ok(res)
        },
        Err(error) => Err(fail(state, StageError::new(stage, error))),
    }
}

fn fail(state: &mut JobState, err: StageError) -> StageError {
    tracing::error!(stage = %err.stage, error = %err.error, "stage failed");
    *state = JobState::Failed {
        stage: err.stage,
        kind: err.kind(),
        cause: err.error.to_string(),
    };
    err
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (dunce::canonicalize(a), dunce::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// `dir/anim.gif` → (`dir/anim.frames.png`, `dir/anim.palette.png`)
pub fn artifact_paths(output: &Path) -> (PathBuf, PathBuf) {
    let stem = output.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "gifseq".into());
    (
        output.with_file_name(format!("{stem}.frames.png")),
        output.with_file_name(format!("{stem}.palette.png")),
    )
}
