use super::{VideoInfo, VideoReader, VideoWriter};
use crate::error::*;
use crate::rate::FrameRate;
use image::codecs::png::PngDecoder;
use image::AnimationDecoder;
use imgref::{ImgRef, ImgVec};
use rgb::{ComponentBytes, FromSlice, RGBA8};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub(crate) struct ApngWriter {
    writer: png::Writer<BufWriter<File>>,
    scratch: Vec<RGBA8>,
    frames_left: u32,
}

impl ApngWriter {
    pub fn new(path: &Path, info: VideoInfo) -> CatResult<Self> {
        let rate = info.frame_rate;
        let (delay_num, delay_den) = match (u16::try_from(rate.denominator()), u16::try_from(rate.numerator())) {
            (Ok(num), Ok(den)) => (num, den),
            _ => return Err(Error::Config(format!("APNG can't store frame rate {rate}; both parts must be below 65536"))),
        };
        if info.frame_count == 0 {
            return Err(Error::NoFrames);
        }

        let file = BufWriter::new(File::create(path)?);
        let mut enc = png::Encoder::new(file, info.width, info.height);
        enc.set_color(png::ColorType::Rgba);
        enc.set_depth(png::BitDepth::Eight);
        enc.set_compression(png::Compression::Fast);
        enc.set_animated(info.frame_count, 0)?;
        enc.set_frame_delay(delay_num, delay_den)?;
        Ok(Self {
            writer: enc.write_header()?,
            scratch: Vec::new(),
            frames_left: info.frame_count,
        })
    }
}

impl VideoWriter for ApngWriter {
    fn write_frame(&mut self, frame: ImgRef<'_, RGBA8>) -> CatResult<()> {
        if self.frames_left == 0 {
            return Err(Error::Codec("more frames written than declared in the APNG header".into()));
        }
        self.frames_left -= 1;
        self.scratch.clear();
        self.scratch.extend(frame.pixels());
        self.writer.write_image_data(self.scratch.as_bytes())?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> CatResult<()> {
        let this = *self;
        if this.frames_left != 0 {
            return Err(Error::Codec(format!("{} frames were never written", this.frames_left)));
        }
        this.writer.finish()?;
        Ok(())
    }
}

pub(crate) struct ApngReader {
    info: VideoInfo,
    frames: image::Frames<'static>,
}

impl ApngReader {
    pub fn open(path: &Path) -> CatResult<Self> {
        let info = read_header(path)?;
        let decoder = PngDecoder::new(BufReader::new(File::open(path)?))?;
        let frames = decoder.apng()?.into_frames();
        Ok(Self { info, frames })
    }
}

/// Frame count and rate live in the acTL and first fcTL chunks
fn read_header(path: &Path) -> CatResult<VideoInfo> {
    let reader = png::Decoder::new(BufReader::new(File::open(path)?)).read_info()?;
    let info = reader.info();
    let actl = info.animation_control.as_ref()
        .ok_or_else(|| Error::Codec(format!("{} is a still PNG, not an animation", path.display())))?;
    let fctl = info.frame_control.as_ref()
        .ok_or_else(|| Error::Codec(format!("{} has no frame timing", path.display())))?;
    // a zero denominator means 1/100s
    let delay_den = if fctl.delay_den == 0 { 100 } else { fctl.delay_den };
    if fctl.delay_num == 0 {
        return Err(Error::Codec(format!("{} has zero frame delay", path.display())));
    }
    Ok(VideoInfo {
        width: info.width,
        height: info.height,
        frame_rate: FrameRate::new(u32::from(delay_den), u32::from(fctl.delay_num))?,
        frame_count: actl.num_frames,
    })
}

impl VideoReader for ApngReader {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> CatResult<Option<ImgVec<RGBA8>>> {
        let frame = match self.frames.next() {
            Some(frame) => frame?,
            None => return Ok(None),
        };
        let buffer = frame.into_buffer();
        let (width, height) = buffer.dimensions();
        let pixels = buffer.into_raw().as_rgba().to_vec();
        Ok(Some(ImgVec::new(pixels, width as usize, height as usize)))
    }
}
