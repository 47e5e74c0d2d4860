//! Intermediate videos in ffmpeg containers.
//!
//! Uses the `ffmpeg` and `ffprobe` executables, piping raw RGBA frames through stdin/stdout,
//! so no native FFmpeg libraries are needed at build time.

use super::{VideoInfo, VideoReader, VideoWriter};
use crate::error::*;
use crate::rate::FrameRate;
use imgref::{ImgRef, ImgVec};
use rgb::{ComponentBytes, FromSlice, RGBA8};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Codec {
    /// Lossless, for Matroska, AVI and NUT
    Ffv1,
    /// Lossless RGB H.264, for MP4 and MOV
    H264Lossless,
}

impl Codec {
    fn args(self) -> &'static [&'static str] {
        match self {
            Self::Ffv1 => &["-c:v", "ffv1", "-pix_fmt", "bgra"],
            Self::H264Lossless => &["-c:v", "libx264rgb", "-qp", "0", "-pix_fmt", "rgb24"],
        }
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    })
}

fn spawn(cmd: &mut Command) -> CatResult<Child> {
    cmd.spawn().map_err(|e| Error::Codec(format!("can't run {:?} (is ffmpeg installed and on PATH?): {e}", cmd.get_program())))
}

fn check_exit(child: Child, what: &str) -> CatResult<()> {
    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Codec(format!("ffmpeg {what} failed with {}: {}", output.status, stderr.trim())));
    }
    Ok(())
}

pub(crate) struct FfmpegWriter {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    scratch: Vec<RGBA8>,
    path: PathBuf,
}

impl FfmpegWriter {
    pub fn new(path: &Path, info: VideoInfo, codec: Codec) -> CatResult<Self> {
        let size = format!("{}x{}", info.width, info.height);
        let rate = format!("{}/{}", info.frame_rate.numerator(), info.frame_rate.denominator());
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .args(["-y", "-loglevel", "error",
                "-f", "rawvideo",
                "-pix_fmt", "rgba",
                "-s", size.as_str(),
                "-framerate", rate.as_str(),
                "-i", "pipe:0",
                "-an"])
            .args(codec.args())
            .arg(path);
        tracing::debug!(?cmd, "starting ffmpeg encoder");

        let mut child = spawn(&mut cmd)?;
        let stdin = child.stdin.take().ok_or_else(|| Error::Codec("ffmpeg stdin is unavailable".into()))?;
        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            scratch: Vec::with_capacity(info.width as usize * info.height as usize),
            path: path.to_path_buf(),
        })
    }
}

impl VideoWriter for FfmpegWriter {
    fn write_frame(&mut self, frame: ImgRef<'_, RGBA8>) -> CatResult<()> {
        self.scratch.clear();
        self.scratch.extend(frame.pixels());
        let stdin = self.stdin.as_mut().ok_or_else(|| Error::Codec("ffmpeg encoder is already finished".into()))?;
        if let Err(e) = stdin.write_all(self.scratch.as_bytes()) {
            // ffmpeg has quit; its stderr says why
            drop(self.stdin.take());
            let reason = match self.child.take().map(Child::wait_with_output) {
                Some(Ok(output)) => String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                _ => String::new(),
            };
            return Err(Error::Codec(format!("ffmpeg stopped accepting frames for {}: {e}. {reason}", self.path.display())));
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> CatResult<()> {
        drop(self.stdin.take());
        let child = self.child.take().ok_or_else(|| Error::Codec("ffmpeg encoder has already failed".into()))?;
        check_exit(child, "encoding")
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

pub(crate) struct FfmpegReader {
    info: VideoInfo,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    frame_bytes: usize,
}

impl FfmpegReader {
    pub fn open(path: &Path) -> CatResult<Self> {
        let info = probe(path)?;
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .args(["-loglevel", "error", "-i"])
            .arg(path)
            .args(["-fps_mode", "passthrough", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"]);
        tracing::debug!(?cmd, "starting ffmpeg decoder");

        let mut child = spawn(&mut cmd)?;
        let stdout = child.stdout.take().ok_or_else(|| Error::Codec("ffmpeg stdout is unavailable".into()))?;
        Ok(Self {
            frame_bytes: info.width as usize * info.height as usize * 4,
            info,
            child: Some(child),
            stdout: Some(stdout),
        })
    }
}

impl VideoReader for FfmpegReader {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> CatResult<Option<ImgVec<RGBA8>>> {
        let stdout = match self.stdout.as_mut() {
            Some(s) => s,
            None => return Ok(None),
        };
        let mut buf = vec![0u8; self.frame_bytes];
        let mut filled = 0;
        while filled < buf.len() {
            match stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            self.stdout = None;
            if let Some(child) = self.child.take() {
                check_exit(child, "decoding")?;
            }
            return Ok(None);
        }
        if filled != buf.len() {
            return Err(Error::Codec(format!("ffmpeg returned a truncated frame ({filled} of {} bytes)", buf.len())));
        }
        let pixels = buf.as_rgba().to_vec();
        Ok(Some(ImgVec::new(pixels, self.info.width as usize, self.info.height as usize)))
    }
}

impl Drop for FfmpegReader {
    fn drop(&mut self) {
        drop(self.stdout.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Size, rate and exact frame count of the first video stream
fn probe(path: &Path) -> CatResult<VideoInfo> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "v:0", "-count_frames",
            "-show_entries", "stream=width,height,r_frame_rate,nb_read_frames",
            "-of", "default=noprint_wrappers=1"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::Codec(format!("can't run ffprobe (is ffmpeg installed and on PATH?): {e}")))?;
    if !output.status.success() {
        return Err(Error::Codec(format!("ffprobe can't read {}: {}", path.display(), String::from_utf8_lossy(&output.stderr).trim())));
    }
    parse_probe(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| Error::Codec(format!("{} has no readable video stream", path.display())))
}

fn parse_probe(text: &str) -> Option<VideoInfo> {
    let (mut width, mut height, mut rate, mut count) = (None, None, None, None);
    for line in text.lines() {
        let (key, value) = match line.split_once('=') {
            Some(kv) => kv,
            None => continue,
        };
        let value = value.trim();
        match key.trim() {
            "width" => width = value.parse().ok(),
            "height" => height = value.parse().ok(),
            "r_frame_rate" => rate = value.parse::<FrameRate>().ok(),
            "nb_read_frames" => count = value.parse().ok(),
            _ => {},
        }
    }
    Some(VideoInfo {
        width: width?,
        height: height?,
        frame_rate: rate?,
        frame_count: count?,
    })
}
