use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};

use gifview::{DecodedFrame, DisplaySink, PlaybackConfig, PlaybackEngine, PlaybackFrame};

const USAGE: &str = "usage: gifview <file.gif> [--duration-ms N] [--seconds S] [--dump DIR] [--invert] [--config PATH]";

/// One day.
const MAX_SECONDS: f64 = 86_400.0;

struct Args {
    file: PathBuf,
    duration_ms: Option<i64>,
    seconds: f64,
    dump: Option<PathBuf>,
    invert: bool,
    config: Option<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut file = None;
    let mut duration_ms = None;
    let mut seconds = 5.0;
    let mut dump = None;
    let mut invert = false;
    let mut config = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().with_context(|| format!("{name} needs a value"));
        match arg.as_str() {
            "--duration-ms" => duration_ms = Some(value("--duration-ms")?.parse()?),
            "--seconds" => {
                seconds = value("--seconds")?.parse()?;
                if !(0.0..=MAX_SECONDS).contains(&seconds) {
                    bail!("--seconds must be between 0 and {MAX_SECONDS}");
                }
            }
            "--dump" => dump = Some(PathBuf::from(value("--dump")?)),
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--invert" => invert = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with("--") => bail!("unknown option {other}\n{USAGE}"),
            other => file = Some(PathBuf::from(other)),
        }
    }

    let Some(file) = file else {
        bail!(USAGE);
    };
    Ok(Args {
        file,
        duration_ms,
        seconds,
        dump,
        invert,
        config,
    })
}

/// Logs every presented frame and optionally writes it out as PNG.
struct ConsoleSink {
    dump: Option<PathBuf>,
    presented: usize,
}

impl DisplaySink for ConsoleSink {
    fn present(&mut self, frame: &PlaybackFrame) {
        self.presented += 1;
        log::debug!(
            "frame {} ({}x{}, {}ms)",
            frame.index,
            frame.frame.width,
            frame.frame.height,
            frame.delay_ms
        );
        let Some(dir) = &self.dump else { return };
        let path = dir.join(format!("frame_{:04}.png", self.presented));
        let Some(img) = image::RgbaImage::from_raw(
            frame.frame.width,
            frame.frame.height,
            frame.frame.data.clone(),
        ) else {
            log::warn!("frame {} has a malformed buffer, not dumped", frame.index);
            return;
        };
        if let Err(e) = img.save(&path) {
            log::warn!("Failed to write {}: {e}", path.display());
        }
    }

    fn clear(&mut self) {
        log::info!("Display cleared");
    }
}

fn invert(mut frame: DecodedFrame) -> anyhow::Result<DecodedFrame> {
    for px in frame.data.chunks_exact_mut(4) {
        px[0] = 255 - px[0];
        px[1] = 255 - px[1];
        px[2] = 255 - px[2];
    }
    Ok(frame)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let config = match &args.config {
        Some(path) => PlaybackConfig::load_from(path),
        None => PlaybackConfig::load(),
    };
    if let Some(dir) = &args.dump {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating dump dir {}", dir.display()))?;
    }

    let bytes =
        std::fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let (engine, mut presenter) = PlaybackEngine::with_gif(&config)?;
    if let Some(ms) = args.duration_ms {
        engine.set_frame_duration(ms);
    }
    if args.invert {
        engine.set_frame_transform(Some(Arc::new(invert)));
    }
    engine.set_on_animation_start(Some(Arc::new(|| log::info!("Animation started"))));
    engine.set_on_animation_stop(Some(Arc::new(|| log::info!("Animation stopped"))));

    engine
        .load(&bytes)
        .with_context(|| format!("loading {}", args.file.display()))?;
    log::info!(
        "Loaded {} ({}x{}, {} frames)",
        args.file.display(),
        engine.width()?,
        engine.height()?,
        engine.frame_count()?
    );
    engine.start();

    let mut sink = ConsoleSink {
        dump: args.dump.clone(),
        presented: 0,
    };
    let deadline = Instant::now() + Duration::from_secs_f64(args.seconds);
    while Instant::now() < deadline {
        if let Some(event) = presenter.recv_timeout(Duration::from_millis(50)) {
            presenter.apply(event, &mut sink);
        }
        presenter.pump(&mut sink);
        if !engine.is_animating() && presenter.current().is_some() {
            log::info!("Animation finished its loop count");
            break;
        }
    }

    engine.clear();
    drop(engine);
    presenter.pump(&mut sink);
    log::info!("Presented {} frames", sink.presented);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Args> {
        parse_args(args.iter().map(|a| (*a).to_string()))
    }

    #[test]
    fn parses_flags() {
        let args = parse(&["a.gif", "--duration-ms", "40", "--seconds", "2.5", "--invert"]).unwrap();
        assert_eq!(args.file, PathBuf::from("a.gif"));
        assert_eq!(args.duration_ms, Some(40));
        assert!((args.seconds - 2.5).abs() < f64::EPSILON);
        assert!(args.invert);
        assert!(args.dump.is_none());
    }

    #[test]
    fn rejects_unusable_seconds() {
        for bad in ["inf", "-inf", "NaN", "-1", "1e300"] {
            assert!(parse(&["a.gif", "--seconds", bad]).is_err(), "accepted {bad}");
        }
        let args = parse(&["a.gif", "--seconds", "0"]).unwrap();
        assert_eq!(Duration::from_secs_f64(args.seconds), Duration::ZERO);
    }

    #[test]
    fn missing_file_or_value_is_an_error() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["a.gif", "--dump"]).is_err());
        assert!(parse(&["a.gif", "--bogus"]).is_err());
    }
}
