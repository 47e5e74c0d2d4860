//! Rendering the intermediate video through the palette into the final GIF

use crate::encoderust::{GIFFrame, RustEncoder};
use crate::error::*;
use crate::palette::Palette;
use crate::pipeline::Stage;
use crate::progress::ProgressReporter;
use crate::remap::{Dither, Remapper};
use crate::video;
use crate::Loop;
use imgref::{Img, ImgRef, ImgVec};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Remaps frames to a fixed palette and writes the animated GIF
#[derive(Debug, Copy, Clone)]
pub struct PaletteApplicator {
    dither: Dither,
    repeat: Loop,
}

/// What ended up in the GIF
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Written {
    pub frames: usize,
    pub width: u32,
    pub height: u32,
    pub palette_size: usize,
}

impl Default for PaletteApplicator {
    fn default() -> Self {
        Self::new(Dither::default(), Loop::Infinite)
    }
}

impl PaletteApplicator {
    pub fn new(dither: Dither, repeat: Loop) -> Self {
        Self { dither, repeat }
    }

    /// Reads the palette from `palette_path` first; see `apply()`
    pub fn apply_file(&self, video_path: &Path, palette_path: &Path, output: &Path, reporter: &mut dyn ProgressReporter) -> CatResult<Written> {
        let palette = Palette::load(palette_path)?;
        self.apply(video_path, &palette, output, reporter)
    }

    /// Writes every frame of `video_path` to `output` (replacing it) using only `palette`'s colors.
    ///
    /// A palette made from another video is accepted as long as the frame size matches.
    #[tracing::instrument(skip_all, fields(video = %video_path.display(), output = %output.display()))]
    pub fn apply(&self, video_path: &Path, palette: &Palette, output: &Path, reporter: &mut dyn ProgressReporter) -> CatResult<Written> {
        if palette.is_empty() {
            return Err(Error::Validation("palette is empty".into()));
        }
        let mut reader = video::open(video_path)?;
        let info = *reader.info();
        if let Some(pal_size) = palette.source_size() {
            if pal_size != info.dimensions() {
                return Err(Error::PaletteMismatch(pal_size, info.dimensions()));
            }
        }
        if !info.frame_rate.fits_gif() {
            return Err(Error::Config(format!("{} fps is faster than GIF's 100 fps limit", info.frame_rate)));
        }
        let (width, height) = match (u16::try_from(info.width), u16::try_from(info.height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => return Err(Error::Config(format!("{}×{} is too large for GIF", info.width, info.height))),
        };
        reporter.begin(Stage::PaletteApplying, u64::from(info.frame_count));

        let file = BufWriter::new(File::create(output)?);
        let mut enc = RustEncoder::new(file, width, height, palette, self.repeat)?;
        let mut remapper = Remapper::new(palette, self.dither);
        let mut previous: Option<ImgVec<u8>> = None;

        let frames = video::for_each_frame(&mut *reader, |i, frame| {
            let indexed = remapper.remap(frame.as_ref());
            let (top, band) = match &previous {
                Some(prev) => changed_rows(prev.as_ref(), indexed.as_ref()),
                None => (0, indexed.height()),
            };
            let image = if band == indexed.height() {
                indexed.clone()
            } else {
                let (buf, w, h) = indexed.sub_image(0, top, indexed.width(), band).to_contiguous_buf();
                Img::new(buf.into_owned(), w, h)
            };
            enc.write_frame(&GIFFrame { top: top as u16, image }, info.frame_rate.gif_delay(i as u64))?;
            previous = Some(indexed);
            if !reporter.increase() {
                return Err(Error::Aborted);
            }
            Ok(())
        })?;

        enc.finish()?.flush()?;
        tracing::info!(frames, colors = palette.len(), "GIF written");
        Ok(Written {
            frames,
            width: info.width,
            height: info.height,
            palette_size: palette.len(),
        })
    }
}

/// The band of rows `(top, height)` that differs from the previous frame.
///
/// Unchanged rows above and below need not be stored, since the previous frame stays on screen.
/// Identical frames still get one row, so that every input frame has a GIF frame.
fn changed_rows(prev: ImgRef<'_, u8>, curr: ImgRef<'_, u8>) -> (usize, usize) {
    let (width, height) = (curr.width(), curr.height());
    let same = |y: usize| {
        let (a, b) = (y * prev.stride(), y * curr.stride());
        prev.buf()[a..a + width] == curr.buf()[b..b + width]
    };
    let top = (0..height).take_while(|&y| same(y)).count();
    if top == height {
        return (0, 1);
    }
    let bottom = (top..height).rev().take_while(|&y| same(y)).count();
    (top, height - top - bottom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_unchanged_rows() {
        let prev = ImgVec::new(vec![0u8; 4 * 5], 4, 5);
        let mut curr = prev.clone();
        curr.buf_mut()[4 * 2 + 1] = 3;
        assert_eq!(changed_rows(prev.as_ref(), curr.as_ref()), (2, 1));

        curr.buf_mut()[4 * 4] = 1;
        assert_eq!(changed_rows(prev.as_ref(), curr.as_ref()), (2, 3));

        curr.buf_mut()[0] = 1;
        assert_eq!(changed_rows(prev.as_ref(), curr.as_ref()), (0, 5));
    }

    #[test]
    fn identical_frames_keep_one_row() {
        let prev = ImgVec::new(vec![7u8; 12], 3, 4);
        assert_eq!(changed_rows(prev.as_ref(), prev.as_ref()), (0, 1));
    }
}
