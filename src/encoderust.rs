use crate::error::CatResult;
use crate::palette::Palette;
use crate::Loop;
use imgref::ImgVec;
use std::borrow::Cow;
use std::io::Write;

/// One palette-indexed frame, possibly covering only a band of rows of the screen
pub(crate) struct GIFFrame {
    pub top: u16,
    pub image: ImgVec<u8>,
}

/// Writes GIFs with a single global color table
pub(crate) struct RustEncoder<W: Write> {
    gif_enc: gif::Encoder<W>,
}

impl<W: Write> RustEncoder<W> {
    pub fn new(writer: W, screen_width: u16, screen_height: u16, pal: &Palette, repeat: Loop) -> CatResult<Self> {
        let mut gif_enc = gif::Encoder::new(writer, screen_width, screen_height, &pal.to_rgb_bytes())?;
        match repeat {
            Loop::Infinite => gif_enc.set_repeat(gif::Repeat::Infinite)?,
            Loop::Finite(n) => gif_enc.set_repeat(gif::Repeat::Finite(n))?,
            Loop::Once => {},
        }
        Ok(Self { gif_enc })
    }

    pub fn write_frame(&mut self, f: &GIFFrame, delay: u16) -> CatResult<()> {
        let GIFFrame { top, ref image } = *f;
        self.gif_enc.write_frame(&gif::Frame {
            delay,
            dispose: gif::DisposalMethod::Keep,
            top,
            left: 0,
            width: image.width() as u16,
            height: image.height() as u16,
            buffer: Cow::Borrowed(image.buf()),
            ..gif::Frame::default()
        })?;
        Ok(())
    }

    /// Writes the trailer and hands back the writer
    pub fn finish(self) -> CatResult<W> {
        Ok(self.gif_enc.into_inner()?)
    }
}
