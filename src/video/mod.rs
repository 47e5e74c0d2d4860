//! The intermediate video: frames in order, at a known rate, on disk.
//!
//! The container is chosen by file extension. APNG is always available and lossless.
//! With the `video` feature, Matroska/AVI/NUT (FFV1) and MP4/MOV (lossless H.264)
//! are written and read by the system `ffmpeg`.

use crate::error::*;
use crate::rate::FrameRate;
use imgref::{ImgRef, ImgVec};
use rgb::RGBA8;
use std::path::Path;

mod apng;
#[cfg(feature = "video")]
pub mod ffmpeg;

/// What a stage needs to know about an intermediate video before reading its frames
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub frame_count: u32,
}

impl VideoInfo {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContainerFormat {
    Apng,
    #[cfg(feature = "video")]
    Ffmpeg(ffmpeg::Codec),
}

impl ContainerFormat {
    pub fn from_path(path: &Path) -> CatResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("png" | "apng") => Ok(Self::Apng),
            #[cfg(feature = "video")]
            Some("mkv" | "avi" | "nut") => Ok(Self::Ffmpeg(ffmpeg::Codec::Ffv1)),
            #[cfg(feature = "video")]
            Some("mp4" | "mov") => Ok(Self::Ffmpeg(ffmpeg::Codec::H264Lossless)),
            _ => Err(Error::Config(format!(
                "don't know how to store the intermediate video as {} (use .png{})",
                path.display(),
                if cfg!(feature = "video") { ", .mkv or .mp4" } else { "" },
            ))),
        }
    }
}

/// Appends frames to a new intermediate video
pub trait VideoWriter {
    fn write_frame(&mut self, frame: ImgRef<'_, RGBA8>) -> CatResult<()>;
    /// Must be called after the last frame; nothing is guaranteed to be on disk before that
    fn finish(self: Box<Self>) -> CatResult<()>;
}

/// Reads frames of an intermediate video in presentation order
pub trait VideoReader {
    fn info(&self) -> &VideoInfo;
    /// `None` after the last frame
    fn next_frame(&mut self) -> CatResult<Option<ImgVec<RGBA8>>>;
}

/// Creates (or truncates) `path`. `info.frame_count` must be exact.
pub fn create(path: &Path, info: VideoInfo) -> CatResult<Box<dyn VideoWriter>> {
    if info.width == 0 || info.height == 0 {
        return Err(Error::Config(format!("video size {}×{} is empty", info.width, info.height)));
    }
    match ContainerFormat::from_path(path)? {
        ContainerFormat::Apng => Ok(Box::new(apng::ApngWriter::new(path, info)?)),
        #[cfg(feature = "video")]
        ContainerFormat::Ffmpeg(codec) => Ok(Box::new(ffmpeg::FfmpegWriter::new(path, info, codec)?)),
    }
}

pub fn open(path: &Path) -> CatResult<Box<dyn VideoReader>> {
    if !path.is_file() {
        return Err(Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound,
            format!("intermediate video {} does not exist", path.display()))));
    }
    let reader: Box<dyn VideoReader> = match ContainerFormat::from_path(path)? {
        ContainerFormat::Apng => Box::new(apng::ApngReader::open(path)?),
        #[cfg(feature = "video")]
        ContainerFormat::Ffmpeg(_) => Box::new(ffmpeg::FfmpegReader::open(path)?),
    };
    tracing::debug!(path = %path.display(), info = ?reader.info(), "opened intermediate video");
    Ok(reader)
}

/// Reads every frame, checking that the container delivers exactly what its header promised
pub(crate) fn for_each_frame(reader: &mut dyn VideoReader, mut cb: impl FnMut(usize, ImgVec<RGBA8>) -> CatResult<()>) -> CatResult<usize> {
    let (width, height) = reader.info().dimensions();
    let expected = reader.info().frame_count as usize;
    let mut n = 0;
    while let Some(frame) = reader.next_frame()? {
        if frame.width() != width as usize || frame.height() != height as usize {
            return Err(Error::Codec(format!("video frame {} is {}×{}, but the video is {}×{}",
                n, frame.width(), frame.height(), width, height)));
        }
        cb(n, frame)?;
        n += 1;
    }
    if n != expected {
        return Err(Error::Codec(format!("video promised {expected} frames, but contained {n}")));
    }
    Ok(n)
}
