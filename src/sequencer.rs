//! Assembling numbered frames into the intermediate video

use crate::error::*;
use crate::frames::{FrameRef, FrameSource};
use crate::ordqueue;
use crate::pipeline::Stage;
use crate::progress::ProgressReporter;
use crate::rate::FrameRate;
use crate::video::{self, VideoInfo, VideoWriter};
use imgref::ImgVec;
use rgb::{FromSlice, RGB8, RGBA8};
use std::path::Path;
use std::thread::available_parallelism;

type DecodedImage = CatResult<(u32, ImgVec<RGBA8>)>;

/// Decodes frames in parallel and writes them, in index order, to one video
#[derive(Debug, Copy, Clone)]
pub struct Sequencer {
    frame_rate: FrameRate,
    width: Option<u32>,
    height: Option<u32>,
    background: RGB8,
}

impl Sequencer {
    pub fn new(frame_rate: FrameRate) -> Self {
        Self {
            frame_rate,
            width: None,
            height: None,
            background: RGB8::new(0, 0, 0),
        }
    }

    /// Shrink frames to fit. If only one is set, the aspect ratio is kept.
    pub fn max_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Color that shows through transparent pixels
    pub fn background(mut self, background: RGB8) -> Self {
        self.background = background;
        self
    }

    /// Writes `source` to `dest`. Whatever was at `dest` is gone even if this fails,
    /// so later stages never read a video from an earlier run.
    /// Fails before decoding anything if a frame file is missing.
    #[tracing::instrument(skip_all, fields(frames = source.len(), dest = %dest.display(), fps = %self.frame_rate))]
    pub fn sequence(&self, source: &FrameSource, dest: &Path, reporter: &mut dyn ProgressReporter) -> CatResult<VideoInfo> {
        if source.is_empty() {
            return Err(Error::NoFrames);
        }
        video::ContainerFormat::from_path(dest)?;
        remove_stale(dest)?;
        source.verify()?;
        let frame_count = u32::try_from(source.len()).map_err(|_| Error::Config("too many frames".into()))?;
        reporter.begin(Stage::Sequencing, u64::from(frame_count));

        let threads = available_parallelism().map(|t| t.get()).unwrap_or(4).min(8);
        let mut writer: Option<Box<dyn VideoWriter>> = None;
        let mut info = None;
        let mut expected_size = (0, 0);
        let mut resizer = None;

        ordqueue::map_ordered(source.frames().to_vec(), threads, decode_frame, |decoded: DecodedImage| {
            let (index, image) = decoded?;
            let size = (image.width() as u32, image.height() as u32);
            if writer.is_none() {
                expected_size = size;
                let (width, height) = dimensions_for_image(size, (self.width, self.height));
                if (width, height) != size {
                    resizer = Some(resize::new(size.0 as usize, size.1 as usize, width as usize, height as usize,
                        resize::Pixel::RGBA8, resize::Type::Lanczos3)?);
                }
                let new_info = VideoInfo { width, height, frame_rate: self.frame_rate, frame_count };
                tracing::debug!(?new_info, "first frame decoded");
                info = Some(new_info);
                writer = Some(video::create(dest, new_info)?);
            } else if size != expected_size {
                return Err(Error::WrongSize(index, size, expected_size));
            }
            let writer = writer.as_mut().ok_or(Error::NoFrames)?;

            let mut image = flatten(image, self.background);
            if let Some(r) = resizer.as_mut() {
                let (width, height) = info.map(|i| (i.width as usize, i.height as usize)).unwrap_or_default();
                let mut dst = vec![RGBA8::new(0, 0, 0, 255); width * height];
                r.resize(image.buf(), &mut dst)?;
                image = ImgVec::new(dst, width, height);
            }
            writer.write_frame(image.as_ref())?;
            if !reporter.increase() {
                return Err(Error::Aborted);
            }
            Ok(())
        })?;

        let (writer, info) = match (writer, info) {
            (Some(w), Some(i)) => (w, i),
            _ => return Err(Error::NoFrames),
        };
        writer.finish()?;
        tracing::info!(frames = info.frame_count, width = info.width, height = info.height, "intermediate video written");
        Ok(info)
    }
}

fn remove_stale(dest: &Path) -> CatResult<()> {
    match std::fs::remove_file(dest) {
        Ok(()) => {
            tracing::debug!(dest = %dest.display(), "removed previous intermediate video");
            Ok(())
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn decode_frame(frame: FrameRef) -> DecodedImage {
    let FrameRef { index, path } = frame;
    let image = image::open(&path).map_err(|err| match err {
        image::ImageError::IoError(e) if e.kind() == std::io::ErrorKind::NotFound => Error::MissingFrame(index, path.clone()),
        err => Error::BadFrame(index, format!("{}: {}", path.display(), err)),
    })?;
    let image = image.into_rgba8();
    let (width, height) = image.dimensions();
    let pixels = image.into_raw().as_rgba().to_vec();
    Ok((index, ImgVec::new(pixels, width as usize, height as usize)))
}

/// Blends semi-transparent pixels onto the background; GIF frames here are always opaque
fn flatten(mut image: ImgVec<RGBA8>, bg: RGB8) -> ImgVec<RGBA8> {
    let blend = |c: u8, bg: u8, a: u16| ((u16::from(c) * a + u16::from(bg) * (255 - a) + 127) / 255) as u8;
    for px in image.pixels_mut() {
        if px.a < 255 {
            let a = u16::from(px.a);
            *px = RGBA8::new(blend(px.r, bg.r, a), blend(px.g, bg.g, a), blend(px.b, bg.b, a), 255);
        }
    }
    image
}

/// Output size for frames of size `img`, given user-specified max width and max height
fn dimensions_for_image((img_w, img_h): (u32, u32), resize_to: (Option<u32>, Option<u32>)) -> (u32, u32) {
    let scale = |v: u32, num: u32, den: u32| ((u64::from(v) * u64::from(num) / u64::from(den.max(1))) as u32).max(1);
    match resize_to {
        (None, None) => (img_w, img_h),
        (Some(w), Some(h)) => {
            let w = w.min(img_w).max(1);
            let h = h.min(img_h).max(1);
            // fit inside the box, keeping aspect ratio
            if u64::from(img_w) * u64::from(h) > u64::from(img_h) * u64::from(w) {
                (w, scale(img_h, w, img_w))
            } else {
                (scale(img_w, h, img_h), h)
            }
        },
        (Some(w), None) => {
            let w = w.min(img_w).max(1);
            (w, scale(img_h, w, img_w))
        },
        (None, Some(h)) => {
            let h = h.min(img_h).max(1);
            (scale(img_w, h, img_h), h)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    #[test]
    fn resize_keeps_aspect_and_never_enlarges() {
        assert_eq!(dimensions_for_image((640, 480), (None, None)), (640, 480));
        assert_eq!(dimensions_for_image((640, 480), (Some(320), None)), (320, 240));
        assert_eq!(dimensions_for_image((640, 480), (None, Some(120))), (160, 120));
        assert_eq!(dimensions_for_image((640, 480), (Some(2000), None)), (640, 480));
        assert_eq!(dimensions_for_image((640, 480), (Some(100), Some(100))), (100, 75));
        assert_eq!(dimensions_for_image((480, 640), (Some(100), Some(100))), (75, 100));
    }

    #[test]
    fn flatten_blends_onto_background() {
        let img = ImgVec::new(vec![RGBA8::new(255, 0, 0, 128), RGBA8::new(0, 255, 0, 255), RGBA8::new(9, 9, 9, 0)], 3, 1);
        let out = flatten(img, RGB8::new(0, 0, 255));
        assert_eq!(out.buf()[0], RGBA8::new(128, 0, 127, 255));
        assert_eq!(out.buf()[1], RGBA8::new(0, 255, 0, 255));
        assert_eq!(out.buf()[2], RGBA8::new(0, 0, 255, 255));
    }

    #[test]
    fn failed_run_leaves_no_old_video() {
        let dir = std::env::temp_dir().join(format!("gifseq-seq-stale-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let dest = dir.join("v.png");
        std::fs::write(&dest, b"OLD").unwrap();
        let frame = dir.join("f000.png");
        std::fs::write(&frame, b"garbage").unwrap();

        let source = FrameSource::from_paths([frame]).unwrap();
        let err = Sequencer::new(FrameRate::fps(5).unwrap())
            .sequence(&source, &dest, &mut NoProgress {})
            .unwrap_err();
        assert!(matches!(err, Error::BadFrame(0, _)), "{err}");
        assert!(!dest.exists());

        std::fs::write(&dest, b"OLD").unwrap();
        let missing = FrameSource::from_paths([dir.join("nope.png")]).unwrap();
        assert!(Sequencer::new(FrameRate::fps(5).unwrap()).sequence(&missing, &dest, &mut NoProgress {}).is_err());
        assert!(!dest.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_frame_names_its_index() {
        let dir = std::env::temp_dir().join(format!("gifseq-seq-corrupt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let bad = dir.join("f1.png");
        std::fs::write(&bad, b"garbage").unwrap();
        match decode_frame(FrameRef { index: 1, path: bad }) {
            Err(Error::BadFrame(1, msg)) => assert!(msg.contains("f1.png"), "{msg}"),
            other => panic!("unexpected {:?}", other.map(|(i, _)| i)),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
