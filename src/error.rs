use std::io;
use std::path::PathBuf;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        ThreadSend {
            display("Internal error; unexpectedly aborted")
        }
        Aborted {
            display("aborted")
        }
        NoFrames {
            display("Found no frames to encode")
        }
        MissingFrame(index: u32, path: PathBuf) {
            display("frame {} is missing (expected {})", index, path.display())
        }
        BadFrame(index: u32, msg: String) {
            display("frame {} can't be decoded: {}", index, msg)
        }
        WrongSize(index: u32, got: (u32, u32), expected: (u32, u32)) {
            display("frame {} has wrong size ({}×{}, expected {}×{})", index, got.0, got.1, expected.0, expected.1)
        }
        PaletteMismatch(palette: (u32, u32), video: (u32, u32)) {
            display("palette was made for {}×{} frames, but the video is {}×{}", palette.0, palette.1, video.0, video.1)
        }
        Config(msg: String) {
            display("invalid configuration: {}", msg)
        }
        Validation(msg: String) {
            display("{}", msg)
        }
        Codec(msg: String) {
            display("{}", msg)
        }
        Gif(err: gif::EncodingError) {
            from()
            display("GIF encoding error: {}", err)
            source(err)
        }
        PngEncode(err: png::EncodingError) {
            from()
            display("PNG encoding error: {}", err)
            source(err)
        }
        PngDecode(err: png::DecodingError) {
            from()
            display("PNG decoding error: {}", err)
            source(err)
        }
        Image(err: image::ImageError) {
            from()
            display("{}", err)
            source(err)
        }
        Quant(err: imagequant::Error) {
            from()
            display("quantization error: {}", err)
        }
        Resize(err: resize::Error) {
            from()
            display("resize error: {}", err)
        }
        Io(err: io::Error) {
            from()
            display("I/O: {}", err)
            source(err)
        }
    }
}

/// Broad classes of failure, used for exit codes and reporting
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed frames, mismatched sizes, bad settings
    Input,
    /// An encoder or decoder rejected the data
    Codec,
    /// Reading or writing storage failed
    Io,
    /// Palette capacity out of range, empty palette
    Validation,
    /// Cancelled through the progress reporter
    Aborted,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingFrame(..) | Self::BadFrame(..) | Self::WrongSize(..) |
            Self::PaletteMismatch(..) | Self::Config(_) | Self::NoFrames => ErrorKind::Input,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Io(_) => ErrorKind::Io,
            Self::Image(image::ImageError::IoError(_)) => ErrorKind::Io,
            Self::Gif(gif::EncodingError::Io(_)) => ErrorKind::Io,
            Self::PngEncode(png::EncodingError::IoError(_)) => ErrorKind::Io,
            Self::PngDecode(png::DecodingError::IoError(_)) => ErrorKind::Io,
            Self::Aborted | Self::ThreadSend => ErrorKind::Aborted,
            Self::Codec(_) | Self::Gif(_) | Self::PngEncode(_) | Self::PngDecode(_) |
            Self::Image(_) | Self::Quant(_) | Self::Resize(_) => ErrorKind::Codec,
        }
    }
}

pub type CatResult<T, E = Error> = Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_frame_names_the_index() {
        let err = Error::MissingFrame(3, PathBuf::from("data/weights-003.ppm"));
        let msg = err.to_string();
        assert!(msg.contains("frame 3"), "{msg}");
        assert!(msg.contains("weights-003.ppm"), "{msg}");
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn size_errors_name_both_sizes() {
        let msg = Error::WrongSize(7, (10, 20), (64, 64)).to_string();
        assert!(msg.contains("frame 7"));
        assert!(msg.contains("10×20"));
        assert!(msg.contains("64×64"));

        let msg = Error::PaletteMismatch((32, 32), (64, 48)).to_string();
        assert!(msg.contains("32×32"));
        assert!(msg.contains("64×48"));
    }

    #[test]
    fn io_errors_are_classified_as_io() {
        let err: Error = io::Error::new(io::ErrorKind::Other, "disk full").into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("disk full"));
        assert_eq!(Error::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::Codec("x".into()).kind(), ErrorKind::Codec);
        assert_eq!(Error::Aborted.kind(), ErrorKind::Aborted);
    }
}
