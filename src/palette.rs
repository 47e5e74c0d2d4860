//! The color table shared by every frame of the output

use crate::error::*;
use rgb::{ComponentBytes, RGB8};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Largest color table GIF can store
pub const MAX_COLORS: u32 = 256;
/// Fewer than two colors can't be quantized meaningfully
pub const MIN_COLORS: u32 = 2;

const SOURCE_SIZE_KEY: &str = "gifseq source size";

/// Checks a requested palette size. Out-of-range values are an error, never clamped.
pub fn validate_capacity(colors: u32) -> CatResult<u32> {
    if (MIN_COLORS..=MAX_COLORS).contains(&colors) {
        Ok(colors)
    } else {
        Err(Error::Validation(format!("palette size must be between {MIN_COLORS} and {MAX_COLORS}, got {colors}")))
    }
}

/// Up to 256 colors, plus the frame size of the video they were chosen for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<RGB8>,
    source_size: Option<(u32, u32)>,
}

impl Palette {
    pub fn new(colors: Vec<RGB8>, source_size: Option<(u32, u32)>) -> CatResult<Self> {
        if colors.is_empty() {
            return Err(Error::Validation("palette is empty".into()));
        }
        if colors.len() > MAX_COLORS as usize {
            return Err(Error::Validation(format!("palette has {} colors, but at most {MAX_COLORS} fit in a GIF", colors.len())));
        }
        Ok(Self { colors, source_size })
    }

    pub fn colors(&self) -> &[RGB8] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Width and height of the frames this palette was extracted from, if known
    pub fn source_size(&self) -> Option<(u32, u32)> {
        self.source_size
    }

    /// `r,g,b,r,g,b…` as GIF and PNG color tables want it
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.colors.as_bytes().to_vec()
    }

    /// Stores the palette as a one-row indexed PNG: pixel `i` is palette entry `i`.
    ///
    /// Any image viewer can show it, and the `PLTE` chunk holds the exact colors.
    pub fn save(&self, path: &Path) -> CatResult<()> {
        let file = BufWriter::new(File::create(path)?);
        let mut enc = png::Encoder::new(file, self.colors.len() as u32, 1);
        enc.set_color(png::ColorType::Indexed);
        enc.set_depth(png::BitDepth::Eight);
        enc.set_palette(self.to_rgb_bytes());
        if let Some((w, h)) = self.source_size {
            enc.add_text_chunk(SOURCE_SIZE_KEY.to_owned(), format!("{w}x{h}"))?;
        }
        let mut writer = enc.write_header()?;
        let indices: Vec<u8> = (0..self.colors.len()).map(|i| i as u8).collect();
        writer.write_image_data(&indices)?;
        writer.finish()?;
        Ok(())
    }

    pub fn load(path: &Path) -> CatResult<Self> {
        let reader = png::Decoder::new(BufReader::new(File::open(path)?)).read_info()?;
        let info = reader.info();
        let plte = match (info.color_type, info.palette.as_deref()) {
            (png::ColorType::Indexed, Some(plte)) => plte,
            _ => return Err(Error::Validation(format!("{} is not a palette (expected an indexed PNG)", path.display()))),
        };
        let colors = plte.chunks_exact(3).map(|c| RGB8::new(c[0], c[1], c[2])).collect();
        let source_size = info.uncompressed_latin1_text.iter()
            .find(|chunk| chunk.keyword == SOURCE_SIZE_KEY)
            .and_then(|chunk| parse_size(&chunk.text));
        Self::new(colors, source_size)
    }
}

fn parse_size(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.split_once('x')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_bounds_are_inclusive() {
        assert!(validate_capacity(2).is_ok());
        assert!(validate_capacity(256).is_ok());
        for bad in [0, 1, 257, 1000] {
            let err = validate_capacity(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn empty_palette_is_rejected() {
        assert_eq!(Palette::new(Vec::new(), None).unwrap_err().kind(), ErrorKind::Validation);
        assert!(Palette::new(vec![RGB8::new(0, 0, 0); 257], None).is_err());
    }

    #[test]
    fn file_keeps_colors_and_order() {
        let path = std::env::temp_dir().join(format!("gifseq-palette-{}.png", std::process::id()));
        let colors = vec![RGB8::new(255, 0, 0), RGB8::new(0, 0, 255), RGB8::new(0, 255, 0), RGB8::new(12, 34, 56)];
        let pal = Palette::new(colors.clone(), Some((64, 48))).unwrap();
        pal.save(&path).unwrap();
        let loaded = Palette::load(&path).unwrap();
        assert_eq!(loaded.colors(), &colors[..]);
        assert_eq!(loaded.source_size(), Some((64, 48)));
        assert_eq!(loaded, pal);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rgb_png_is_not_a_palette() {
        let path = std::env::temp_dir().join(format!("gifseq-notpalette-{}.png", std::process::id()));
        image::RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3])).save(&path).unwrap();
        assert_eq!(Palette::load(&path).unwrap_err().kind(), ErrorKind::Validation);
        let _ = std::fs::remove_file(&path);
    }
}
