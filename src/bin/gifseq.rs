#[macro_use] extern crate clap;

mod source;
use crate::source::FramesArg;

use clap::{App, AppSettings, Arg};
use gifseq::progress::{NoProgress, ProgressReporter};
use gifseq::{Dither, Job, Loop, Settings, Stage};
use rgb::RGB8;
use std::fmt;
use std::io::Stderr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub type BinResult<T, E = Box<dyn std::error::Error + Send + Sync>> = Result<T, E>;

#[cfg(feature = "video")]
const INTERMEDIATE_ARG_HELP: &str = "Intermediate video file (.png for APNG, .mkv/.avi/.nut for FFV1, .mp4/.mov for lossless H.264) [default: <output>.frames.png]";
#[cfg(not(feature = "video"))]
const INTERMEDIATE_ARG_HELP: &str = "Intermediate APNG file [default: <output>.frames.png]";

fn main() {
    if let Err(e) = bin_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn bin_main() -> BinResult<()> {
    let matches = App::new(crate_name!())
        .version(crate_version!())
        .about("Numbered frames to a looping GIF with one shared palette")
        .setting(AppSettings::UnifiedHelpMessage)
        .setting(AppSettings::DeriveDisplayOrder)
        .setting(AppSettings::ArgRequiredElseHelp)
        .arg(Arg::with_name("output")
            .long("output")
            .short("o")
            .help("Destination file to write to")
            .empty_values(false)
            .takes_value(true)
            .value_name("a.gif")
            .required(true))
        .arg(Arg::with_name("fps")
            .long("fps")
            .help("Animation frames per second, e.g. 12, 12.5 or 30000/1001")
            .empty_values(false)
            .takes_value(true)
            .value_name("rate")
            .required(true))
        .arg(Arg::with_name("colors")
            .long("colors")
            .takes_value(true)
            .value_name("2-256")
            .default_value("256")
            .help("Palette size"))
        .arg(Arg::with_name("dither")
            .long("dither")
            .takes_value(true)
            .value_name("mode")
            .default_value("fs:0.5")
            .help("none, ordered, or fs[:strength 0-1] for Floyd-Steinberg"))
        .arg(Arg::with_name("fast")
            .long("fast")
            .help("Faster palette search, slightly worse colors"))
        .arg(Arg::with_name("width")
            .long("width")
            .short("W")
            .takes_value(true)
            .value_name("px")
            .help("Maximum width"))
        .arg(Arg::with_name("height")
            .long("height")
            .short("H")
            .takes_value(true)
            .value_name("px")
            .help("Maximum height"))
        .arg(Arg::with_name("background")
            .long("background")
            .takes_value(true)
            .value_name("RRGGBB")
            .help("Color for transparent areas [default: 000000]"))
        .arg(Arg::with_name("once")
            .long("once")
            .conflicts_with("repeat")
            .help("Do not loop the GIF"))
        .arg(Arg::with_name("repeat")
            .long("repeat")
            .takes_value(true)
            .value_name("num")
            .help("Play this many extra times instead of looping forever"))
        .arg(Arg::with_name("start")
            .long("start")
            .takes_value(true)
            .value_name("index")
            .requires("count")
            .help("First frame number (pattern input only)"))
        .arg(Arg::with_name("count")
            .long("count")
            .takes_value(true)
            .value_name("num")
            .help("Number of frames (pattern input only)"))
        .arg(Arg::with_name("intermediate")
            .long("intermediate")
            .takes_value(true)
            .value_name("file")
            .help(INTERMEDIATE_ARG_HELP))
        .arg(Arg::with_name("palette")
            .long("palette")
            .takes_value(true)
            .value_name("file.png")
            .help("Palette file [default: <output>.palette.png]"))
        .arg(Arg::with_name("clean")
            .long("clean")
            .help("Delete the intermediate video and palette after success"))
        .arg(Arg::with_name("quiet")
            .long("quiet")
            .short("q")
            .help("Do not show a progress bar"))
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .help("More logging (repeat for debug). RUST_LOG overrides this"))
        .arg(Arg::with_name("FRAMES")
            .help("Frame pattern like frames/%04d.png, a directory, or image files")
            .min_values(1)
            .empty_values(false)
            .use_delimiter(false)
            .required(true))
        .get_matches_from(wild::args_os());

    init_logging(matches.occurrences_of("verbose"));

    let frame_args: Vec<_> = matches.values_of_os("FRAMES").ok_or("Missing files")?.collect();
    let output_path = PathBuf::from(matches.value_of_os("output").ok_or("Missing output")?);

    let mut settings = Settings::new(parse_arg(matches.value_of("fps"), "fps")?.ok_or("Missing fps")?);
    settings.width = parse_arg(matches.value_of("width"), "width")?;
    settings.height = parse_arg(matches.value_of("height"), "height")?;
    settings.colors = parse_arg(matches.value_of("colors"), "colors")?.unwrap_or(gifseq::MAX_COLORS);
    settings.dither = parse_arg::<Dither>(matches.value_of("dither"), "dither")?.unwrap_or_default();
    settings.fast = matches.is_present("fast");
    settings.repeat = if matches.is_present("once") {
        Loop::Once
    } else {
        parse_arg(matches.value_of("repeat"), "repeat")?.map_or(Loop::Infinite, Loop::Finite)
    };
    if let Some(bg) = matches.value_of("background") {
        settings.background = parse_color(bg)?;
    }
    settings.check()?;

    let range = match (parse_arg::<u32>(matches.value_of("start"), "start")?, parse_arg(matches.value_of("count"), "count")?) {
        (start, Some(count)) => Some((start.unwrap_or(0), count)),
        (_, None) => None,
    };
    let frames = FramesArg::from_args(&frame_args).into_source(range)?;

    let mut job = Job::new(frames, &output_path, settings);
    if let Some(path) = matches.value_of_os("intermediate") {
        job.intermediate = path.into();
    }
    if let Some(path) = matches.value_of_os("palette") {
        job.palette = path.into();
    }
    job.keep_intermediates = !matches.is_present("clean");
    tracing::debug!(frames = job.frames.len(), intermediate = %job.intermediate.display(), palette = %job.palette.display(), "job ready");

    let mut progress: Box<dyn ProgressReporter> = if matches.is_present("quiet") {
        Box::new(NoProgress {})
    } else {
        Box::new(StageProgressBar::default())
    };

    let written = job.run(&mut *progress)?;
    tracing::info!(frames = written.frames, colors = written.palette_size, output = %display_path(&output_path), "done");
    Ok(())
}

fn init_logging(verbosity: u64) {
    let default = match verbosity {
        0 => "warn",
        1 => "gifseq=info",
        _ => "gifseq=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_arg<T: FromStr>(s: Option<&str>, name: &str) -> BinResult<Option<T>> where T::Err: fmt::Display {
    match s {
        Some(s) => s.parse().map(Some).map_err(|e| format!("Invalid {name} '{s}': {e}").into()),
        None => Ok(None),
    }
}

fn parse_color(s: &str) -> BinResult<RGB8> {
    let hex = s.trim_start_matches('#');
    let channel = |i: usize| hex.get(i..i + 2).and_then(|c| u8::from_str_radix(c, 16).ok());
    match (hex.len(), channel(0), channel(2), channel(4)) {
        (6, Some(r), Some(g), Some(b)) => Ok(RGB8::new(r, g, b)),
        _ => Err(format!("Invalid background '{s}': expected RRGGBB hex").into()),
    }
}

fn display_path(path: &Path) -> String {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()).display().to_string()
}

/// A fresh bar for each stage, on stderr so it doesn't mix with piped output
#[derive(Default)]
struct StageProgressBar {
    bar: Option<pbr::ProgressBar<Stderr>>,
}

impl ProgressReporter for StageProgressBar {
    fn begin(&mut self, stage: Stage, total_frames: u64) {
        if let Some(mut old) = self.bar.take() {
            old.finish();
        }
        let mut pb = pbr::ProgressBar::on(std::io::stderr(), total_frames);
        pb.show_speed = false;
        pb.show_percent = false;
        pb.format(" #_. ");
        pb.message(&format!("{} ", capitalized(stage)));
        pb.set_max_refresh_rate(Some(Duration::from_millis(250)));
        self.bar = Some(pb);
    }

    fn increase(&mut self) -> bool {
        if let Some(pb) = &mut self.bar {
            pb.inc();
        }
        true
    }

    fn done(&mut self, msg: &str) {
        match self.bar.take() {
            Some(mut pb) => pb.finish_print(msg),
            None => eprintln!("{msg}"),
        }
    }
}

fn capitalized(stage: Stage) -> String {
    let s = stage.to_string();
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => s,
    }
}
