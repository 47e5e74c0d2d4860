/*
 gifseq: numbered frames to looping GIF, via an intermediate video and a shared palette

 This program is free software: you can redistribute it and/or modify
 it under the terms of the GNU Affero General Public License as
 published by the Free Software Foundation, either version 3 of the
 License, or (at your option) any later version.

 This program is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 GNU Affero General Public License for more details.

 You should have received a copy of the GNU Affero General Public License
 along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/
//! Turns a numbered image sequence into an animated GIF in three stages:
//!
//! 1. [`Sequencer`] packs the frames into a lossless intermediate video,
//! 2. [`PaletteExtractor`] picks at most 256 colors for the whole animation,
//! 3. [`PaletteApplicator`] maps every frame to that palette and writes the GIF.
//!
//! Each stage reads and writes files, so any of them can be re-run on its own.
//! [`Job`] runs all three and reports which one failed.

#[macro_use] extern crate quick_error;

mod error;
pub use crate::error::*;
mod ordqueue;
pub mod progress;
pub mod video;

mod apply;
mod encoderust;
mod extract;
mod frames;
mod palette;
mod pipeline;
mod rate;
mod remap;
mod sequencer;

pub use crate::apply::{PaletteApplicator, Written};
pub use crate::extract::PaletteExtractor;
pub use crate::frames::{sort_naturally, FramePattern, FrameRef, FrameSource};
pub use crate::palette::{validate_capacity, Palette, MAX_COLORS, MIN_COLORS};
pub use crate::pipeline::{artifact_paths, Job, JobState, Stage, StageError};
pub use crate::rate::FrameRate;
pub use crate::remap::{colordiff, Dither, Remapper};
pub use crate::sequencer::Sequencer;

use rgb::RGB8;

/// How many times the GIF plays
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Loop {
    /// Loops forever
    #[default]
    Infinite,
    /// Plays this many extra times after the first
    Finite(u16),
    /// No loop extension at all
    Once,
}

/// Everything that affects the output, apart from file locations
#[derive(Debug, Copy, Clone)]
pub struct Settings {
    /// Playback rate, written to the intermediate video and turned into GIF delays
    pub frame_rate: FrameRate,
    /// Resize to at most this width. If `None`, it's computed from height (or unchanged).
    pub width: Option<u32>,
    /// Resize to at most this height. If `None`, it's computed from width (or unchanged).
    pub height: Option<u32>,
    /// Palette capacity, 2-256
    pub colors: u32,
    /// Quantize faster at the cost of some quality
    pub fast: bool,
    pub dither: Dither,
    pub repeat: Loop,
    /// Transparent pixels are flattened onto this color
    pub background: RGB8,
}

impl Settings {
    pub fn new(frame_rate: FrameRate) -> Self {
        Self {
            frame_rate,
            width: None,
            height: None,
            colors: MAX_COLORS,
            fast: false,
            dither: Dither::default(),
            repeat: Loop::Infinite,
            background: RGB8::new(0, 0, 0),
        }
    }

    /// Checks values that would otherwise only fail halfway through a job
    pub fn validate(&self) -> CatResult<()> {
        validate_capacity(self.colors)?;
        if !self.frame_rate.fits_gif() {
            return Err(Error::Config(format!("{} fps is faster than GIF's 100 fps limit", self.frame_rate)));
        }
        if let Dither::FloydSteinberg(level) = self.dither {
            if !(0. ..=1.).contains(&level) {
                return Err(Error::Config(format!("dithering strength {level} is not between 0 and 1")));
            }
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(Error::Config("maximum size must be at least 1px".into()));
        }
        Ok(())
    }

    /// `validate()`, with the error tagged by the stage that would have failed.
    /// Palette capacity belongs to extraction, everything else is checked before sequencing.
    pub fn check(&self) -> Result<(), StageError> {
        validate_capacity(self.colors).map_err(|e| StageError::new(Stage::PaletteExtracting, e))?;
        self.validate().map_err(|e| StageError::new(Stage::Sequencing, e))
    }

    pub fn sequencer(&self) -> Sequencer {
        Sequencer::new(self.frame_rate)
            .max_size(self.width, self.height)
            .background(self.background)
    }

    pub fn extractor(&self) -> CatResult<PaletteExtractor> {
        Ok(PaletteExtractor::new(self.colors)?.fast(self.fast))
    }

    pub fn applicator(&self) -> PaletteApplicator {
        PaletteApplicator::new(self.dither, self.repeat)
    }
}
