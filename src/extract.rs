//! Choosing one palette for the whole animation

use crate::error::*;
use crate::palette::{validate_capacity, Palette};
use crate::pipeline::Stage;
use crate::progress::ProgressReporter;
use crate::video;
use imagequant::{Attributes, Histogram};
use rgb::RGB8;
use std::path::Path;

/// Builds a palette from a color histogram of every frame of the intermediate video.
///
/// Quantization is median cut refined with k-means (libimagequant), run single-threaded,
/// so a given video and color count always produce the same palette.
#[derive(Debug, Copy, Clone)]
pub struct PaletteExtractor {
    colors: u32,
    fast: bool,
}

impl PaletteExtractor {
    /// `colors` must be 2–256
    pub fn new(colors: u32) -> CatResult<Self> {
        Ok(Self {
            colors: validate_capacity(colors)?,
            fast: false,
        })
    }

    /// Lower quality, but faster
    pub fn fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    pub fn colors(&self) -> u32 {
        self.colors
    }

    fn attributes(&self) -> CatResult<Attributes> {
        let mut liq = Attributes::new();
        liq.set_max_colors(self.colors)?;
        liq.set_speed(if self.fast { 10 } else { 4 })?;
        liq.set_quality(0, 100)?;
        Ok(liq)
    }

    /// Reads every frame of `video_path` and returns at most `colors` colors
    #[tracing::instrument(skip_all, fields(video = %video_path.display(), colors = self.colors))]
    pub fn extract(&self, video_path: &Path, reporter: &mut dyn ProgressReporter) -> CatResult<Palette> {
        let liq = self.attributes()?;
        let mut hist = Histogram::new(&liq);
        let mut reader = video::open(video_path)?;
        let info = *reader.info();
        reporter.begin(Stage::PaletteExtracting, u64::from(info.frame_count));

        let frames = video::for_each_frame(&mut *reader, |_, frame| {
            let (mut buf, width, height) = frame.into_contiguous_buf();
            // the output can't be transparent
            buf.iter_mut().for_each(|px| px.a = 255);
            let mut img = liq.new_image(buf, width, height, 0.)?;
            hist.add_image(&liq, &mut img)?;
            if !reporter.increase() {
                return Err(Error::Aborted);
            }
            Ok(())
        })?;

        let mut res = hist.quantize(&liq)?;
        let colors: Vec<RGB8> = res.palette_vec().into_iter().map(|px| px.rgb()).collect();
        tracing::info!(frames, colors = colors.len(), "palette extracted");
        Palette::new(colors, Some(info.dimensions()))
    }

    /// `extract()` and store the result at `palette_path`, replacing any file there
    pub fn extract_to(&self, video_path: &Path, palette_path: &Path, reporter: &mut dyn ProgressReporter) -> CatResult<Palette> {
        let palette = self.extract(video_path, reporter)?;
        palette.save(palette_path)?;
        tracing::debug!(path = %palette_path.display(), "palette written");
        Ok(palette)
    }
}
