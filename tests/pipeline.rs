use gifseq::progress::{CancelFlag, NoProgress};
use gifseq::*;
use rgb::RGB8;
use std::fs::File;
use std::path::{Path, PathBuf};

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gifseq-it-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_frame(dir: &Path, index: u32, size: u32, color: [u8; 4]) {
    image::RgbaImage::from_pixel(size, size, image::Rgba(color))
        .save(dir.join(format!("f{index:03}.png")))
        .unwrap();
}

/// 64×64 frames cycling red, green, blue
fn rgb_cycle(dir: &Path, count: u32) {
    for i in 0..count {
        write_frame(dir, i, 64, [RED, GREEN, BLUE][i as usize % 3]);
    }
}

fn pattern(dir: &Path) -> FramePattern {
    FramePattern::parse(dir.join("f%03d.png")).unwrap()
}

fn settings(colors: u32) -> Settings {
    let mut s = Settings::new(FrameRate::fps(5).unwrap());
    s.colors = colors;
    s
}

struct DecodedGif {
    repeat: gif::Repeat,
    palette: Vec<u8>,
    delays: Vec<u16>,
    first_frame: Vec<u8>,
}

fn read_gif(path: &Path) -> DecodedGif {
    let mut opts = gif::DecodeOptions::new();
    opts.set_color_output(gif::ColorOutput::Indexed);
    let mut dec = opts.read_info(File::open(path).unwrap()).unwrap();
    let palette = dec.global_palette().unwrap().to_vec();
    let mut delays = Vec::new();
    let mut first_frame = Vec::new();
    while let Some(frame) = dec.read_next_frame().unwrap() {
        if delays.is_empty() {
            first_frame = frame.buffer.to_vec();
        }
        delays.push(frame.delay);
    }
    DecodedGif { repeat: dec.repeat(), palette, delays, first_frame }
}

fn close_to(a: RGB8, b: RGB8) -> bool {
    colordiff(a, b) < 200
}

#[test]
fn frames_to_looping_gif() {
    let dir = scratch_dir("e2e");
    rgb_cycle(&dir, 10);

    let mut job = Job::new(FrameSource::scan(&pattern(&dir)).unwrap(), dir.join("out.gif"), settings(4));
    let written = job.run(&mut NoProgress {}).unwrap();
    assert_eq!(written.frames, 10);
    assert_eq!((written.width, written.height), (64, 64));
    assert_eq!(job.state(), &JobState::Done(written));
    assert!(job.intermediate.exists());

    let palette = Palette::load(&job.palette).unwrap();
    assert!(palette.len() <= 4);
    assert_eq!(palette.source_size(), Some((64, 64)));
    for c in [RGB8::new(255, 0, 0), RGB8::new(0, 255, 0), RGB8::new(0, 0, 255)] {
        assert!(palette.colors().iter().any(|&p| close_to(p, c)), "{c:?} not in {:?}", palette.colors());
    }

    let gif = read_gif(&dir.join("out.gif"));
    assert_eq!(gif.delays, vec![20; 10]);
    assert_eq!(gif.repeat, gif::Repeat::Infinite);
    assert!(gif.palette.len() <= 4 * 3);

    assert_eq!(gif.first_frame.len(), 64 * 64);
    let idx = gif.first_frame[0] as usize * 3;
    let first = RGB8::new(gif.palette[idx], gif.palette[idx + 1], gif.palette[idx + 2]);
    assert!(close_to(first, RGB8::new(255, 0, 0)), "{first:?}");
    assert!(gif.first_frame.iter().all(|&i| i == gif.first_frame[0]));

    let _ = std::fs::remove_dir_all(&dir);
}

/// What the viewer shows after each frame: frames are drawn at their offset over the previous screen
fn composited_screens(path: &Path) -> Vec<Vec<RGB8>> {
    let mut opts = gif::DecodeOptions::new();
    opts.set_color_output(gif::ColorOutput::Indexed);
    let mut dec = opts.read_info(File::open(path).unwrap()).unwrap();
    let palette: Vec<RGB8> = dec.global_palette().unwrap().chunks_exact(3).map(|c| RGB8::new(c[0], c[1], c[2])).collect();
    let (width, height) = (dec.width() as usize, dec.height() as usize);
    let mut screen = vec![RGB8::new(0, 0, 0); width * height];
    let mut screens = Vec::new();
    while let Some(frame) = dec.read_next_frame().unwrap() {
        assert_eq!(frame.dispose, gif::DisposalMethod::Keep);
        let (left, top, w) = (frame.left as usize, frame.top as usize, frame.width as usize);
        for (i, &idx) in frame.buffer.iter().enumerate() {
            screen[(top + i / w) * width + left + i % w] = palette[idx as usize];
        }
        screens.push(screen.clone());
    }
    screens
}

#[test]
fn output_frames_keep_input_order() {
    let dir = scratch_dir("order");
    rgb_cycle(&dir, 10);
    // a frame identical to the previous one still has to show up
    write_frame(&dir, 10, 64, RED);

    let mut job = Job::new(FrameSource::scan(&pattern(&dir)).unwrap(), dir.join("out.gif"), settings(4));
    job.run(&mut NoProgress {}).unwrap();

    let screens = composited_screens(&job.output);
    assert_eq!(screens.len(), 11);
    let expected = [RGB8::new(255, 0, 0), RGB8::new(0, 255, 0), RGB8::new(0, 0, 255)];
    for (i, screen) in screens.iter().enumerate() {
        let want = if i == 10 { expected[0] } else { expected[i % 3] };
        assert!(screen.iter().all(|&px| close_to(px, want)), "frame {i} is not {want:?}");
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn gap_fails_sequencing_before_palette() {
    let dir = scratch_dir("gap");
    for i in [0, 1, 2, 4] {
        write_frame(&dir, i, 16, RED);
    }

    assert!(matches!(FrameSource::scan(&pattern(&dir)), Err(Error::MissingFrame(3, _))));

    let frames = FrameSource::range(&pattern(&dir), 0, 5).unwrap();
    let mut job = Job::new(frames, dir.join("out.gif"), settings(16));
    let err = job.run(&mut NoProgress {}).unwrap_err();
    assert_eq!(err.stage, Stage::Sequencing);
    assert!(matches!(err.error, Error::MissingFrame(3, _)), "{err}");
    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(matches!(job.state(), JobState::Failed { stage: Stage::Sequencing, .. }));
    assert!(!job.palette.exists());
    assert!(!job.output.exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn palette_capacity_out_of_range() {
    let dir = scratch_dir("capacity");
    rgb_cycle(&dir, 3);

    for colors in [0, 1, 257] {
        let mut job = Job::new(FrameSource::scan(&pattern(&dir)).unwrap(), dir.join("out.gif"), settings(colors));
        let err = job.run(&mut NoProgress {}).unwrap_err();
        assert_eq!(err.stage, Stage::PaletteExtracting);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!job.palette.exists());
        assert!(!job.output.exists());
    }

    assert_eq!(PaletteExtractor::new(0).unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(PaletteExtractor::new(257).unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(PaletteExtractor::new(256).unwrap().colors(), 256);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn frame_size_must_not_change() {
    let dir = scratch_dir("size");
    write_frame(&dir, 0, 32, RED);
    write_frame(&dir, 1, 32, GREEN);
    write_frame(&dir, 2, 16, BLUE);

    let mut job = Job::new(FrameSource::scan(&pattern(&dir)).unwrap(), dir.join("out.gif"), settings(8));
    let err = job.run(&mut NoProgress {}).unwrap_err();
    assert_eq!(err.stage, Stage::Sequencing);
    assert!(matches!(err.error, Error::WrongSize(2, (16, 16), (32, 32))), "{err}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn reruns_give_the_same_result() {
    let dir = scratch_dir("rerun");
    rgb_cycle(&dir, 6);

    let mut job = Job::new(FrameSource::scan(&pattern(&dir)).unwrap(), dir.join("out.gif"), settings(8));
    let first = job.run(&mut NoProgress {}).unwrap();
    let first_palette = Palette::load(&job.palette).unwrap();
    let first_gif = read_gif(&job.output);

    let second = job.run(&mut NoProgress {}).unwrap();
    assert_eq!(first, second);
    assert_eq!(first_palette, Palette::load(&job.palette).unwrap());
    let second_gif = read_gif(&job.output);
    assert_eq!(first_gif.delays, second_gif.delays);
    assert_eq!(first_gif.palette, second_gif.palette);
    assert_eq!(first_gif.first_frame, second_gif.first_frame);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn stages_run_separately() {
    let dir = scratch_dir("stages");
    rgb_cycle(&dir, 4);

    let mut job = Job::new(FrameSource::scan(&pattern(&dir)).unwrap(), dir.join("out.gif"), settings(4))
        .with_artifacts(dir.join("video.png"), dir.join("colors.png"));
    assert_eq!(job.state(), &JobState::NotStarted);

    let err = job.apply_palette(&mut NoProgress {}).unwrap_err();
    assert_eq!(err.stage, Stage::PaletteApplying);
    assert_eq!(err.kind(), ErrorKind::Io);

    job.sequence(&mut NoProgress {}).unwrap();
    assert!(dir.join("video.png").exists());
    job.extract_palette(&mut NoProgress {}).unwrap();
    assert!(dir.join("colors.png").exists());
    let written = job.apply_palette(&mut NoProgress {}).unwrap();
    assert_eq!(written.frames, 4);
    assert_eq!(job.state(), &JobState::Done(written));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn palette_from_other_size_is_rejected() {
    let dir = scratch_dir("mismatch");
    let big = dir.join("big");
    let small = dir.join("small");
    std::fs::create_dir_all(&big).unwrap();
    std::fs::create_dir_all(&small).unwrap();
    rgb_cycle(&big, 3);
    for i in 0..3 {
        write_frame(&small, i, 16, RED);
    }

    let mut big_job = Job::new(FrameSource::scan(&pattern(&big)).unwrap(), big.join("out.gif"), settings(4));
    big_job.run(&mut NoProgress {}).unwrap();

    let mut small_job = Job::new(FrameSource::scan(&pattern(&small)).unwrap(), small.join("out.gif"), settings(4))
        .with_artifacts(small.join("out.frames.png"), big_job.palette.clone());
    small_job.sequence(&mut NoProgress {}).unwrap();
    let err = small_job.apply_palette(&mut NoProgress {}).unwrap_err();
    assert!(matches!(err.error, Error::PaletteMismatch((64, 64), (16, 16))), "{err}");
    assert!(!small.join("out.gif").exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn cancelled_job_stops() {
    let dir = scratch_dir("cancel");
    rgb_cycle(&dir, 3);

    let mut flag = CancelFlag::default();
    flag.cancel();
    let mut job = Job::new(FrameSource::scan(&pattern(&dir)).unwrap(), dir.join("out.gif"), settings(4));
    let err = job.run(&mut flag).unwrap_err();
    assert_eq!(err.stage, Stage::Sequencing);
    assert_eq!(err.kind(), ErrorKind::Aborted);
    assert!(!job.palette.exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn clean_run_removes_intermediates() {
    let dir = scratch_dir("clean");
    rgb_cycle(&dir, 3);

    let mut s = settings(4);
    s.repeat = Loop::Once;
    let mut job = Job::new(FrameSource::scan(&pattern(&dir)).unwrap(), dir.join("out.gif"), s);
    job.keep_intermediates = false;
    job.run(&mut NoProgress {}).unwrap();
    assert!(!job.intermediate.exists());
    assert!(!job.palette.exists());

    let gif = read_gif(&job.output);
    assert_eq!(gif.delays.len(), 3);
    assert_eq!(gif.repeat, gif::Repeat::Finite(0));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn transparent_pixels_take_the_background() {
    let dir = scratch_dir("background");
    for i in 0..2 {
        write_frame(&dir, i, 8, [10, 20, 30, 0]);
    }

    let mut s = settings(2);
    s.background = RGB8::new(255, 255, 255);
    s.dither = Dither::None;
    let mut job = Job::new(FrameSource::scan(&pattern(&dir)).unwrap(), dir.join("out.gif"), s);
    job.run(&mut NoProgress {}).unwrap();

    let palette = Palette::load(&job.palette).unwrap();
    assert!(palette.colors().iter().any(|&c| close_to(c, RGB8::new(255, 255, 255))), "{:?}", palette.colors());

    let _ = std::fs::remove_dir_all(&dir);
}
