use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use reel_contracts::cancel::CancelToken;
use reel_contracts::request::{AspectRatio, GenerationRequest, ImagePayload, TargetLength};
use reel_engine::{EngineConfig, ReelEngine, DEFAULT_POLL_INTERVAL, DEFAULT_VIDEO_MODEL};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "reel", version, about = "Reel video generation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a clip from a prompt plus a reference image or video.
    Generate(GenerateArgs),
    /// Pull the first frame out of a video file.
    Frame(FrameArgs),
    /// List the receipts of finished generations in a run directory.
    History(HistoryArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    video: Option<PathBuf>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "wide")]
    aspect: String,
    #[arg(long, default_value = "short")]
    length: String,
    #[arg(long, default_value = DEFAULT_VIDEO_MODEL)]
    model: String,
    #[arg(long)]
    extension_model: Option<String>,
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    poll_interval_s: u64,
    #[arg(long)]
    poll_timeout_s: Option<u64>,
}

#[derive(Debug, Parser)]
struct FrameArgs {
    #[arg(long)]
    video: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long)]
    run: PathBuf,
}

const REFERENCE_MAX_DIM: u32 = 1280;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("reel error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Frame(args) => run_frame(args),
        Command::History(args) => run_history(args),
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let reference = resolve_reference(args.image.clone(), args.video.clone())?;
    let aspect_ratio = AspectRatio::parse(&args.aspect)?;
    let target_length = TargetLength::parse(&args.length)?;

    let mut engine = ReelEngine::new(engine_config_from(&args))?;

    let image_path = match reference {
        ReferenceSource::Image(path) => path,
        ReferenceSource::Video(path) => {
            let frame_path = engine.run_dir().join("reference-frame.png");
            extract_first_frame(&path, &frame_path).context("could not process input")?;
            println!("Using first frame of {}", path.display());
            frame_path
        }
    };
    let (bytes, media_type) =
        load_reference_image(&image_path, REFERENCE_MAX_DIM).context("could not process input")?;

    let request = GenerationRequest {
        prompt: args.prompt,
        image: ImagePayload::new(bytes, media_type),
        aspect_ratio,
        target_length,
    };

    let mut progress = |message: &str| println!("{message}");
    let cancel = CancelToken::new();
    match engine.generate(&request, &mut progress, &cancel) {
        Ok(handle) => {
            println!(
                "Saved {} ({} bytes, {})",
                handle.path.display(),
                handle.byte_len,
                handle.mime_type
            );
            Ok(0)
        }
        Err(err) => {
            eprintln!("generation failed: {err}");
            if err.needs_credentials() {
                eprintln!("set GEMINI_API_KEY (or GOOGLE_API_KEY) and try again");
            }
            Ok(2)
        }
    }
}

fn run_frame(args: FrameArgs) -> Result<i32> {
    extract_first_frame(&args.video, &args.out)?;
    println!("Saved {}", args.out.display());
    Ok(0)
}

fn run_history(args: HistoryArgs) -> Result<i32> {
    let mut receipts = collect_receipts(&args.run)?;
    if receipts.is_empty() {
        println!("No receipts in {}", args.run.display());
        return Ok(0);
    }
    receipts.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, receipt) in receipts {
        println!("{name}  {}", receipt_summary(&receipt));
    }
    Ok(0)
}

enum ReferenceSource {
    Image(PathBuf),
    Video(PathBuf),
}

fn resolve_reference(
    image: Option<PathBuf>,
    video: Option<PathBuf>,
) -> Result<ReferenceSource> {
    match (image, video) {
        (Some(_), Some(_)) => bail!("pass either --image or --video, not both"),
        (Some(path), None) => Ok(ReferenceSource::Image(path)),
        (None, Some(path)) => Ok(ReferenceSource::Video(path)),
        (None, None) => bail!("a reference is required; pass --image or --video"),
    }
}

fn engine_config_from(args: &GenerateArgs) -> EngineConfig {
    let mut config = EngineConfig::new(&args.out);
    config.events_path = args.events.clone();
    config.model = args.model.clone();
    config.extension_model = args.extension_model.clone();
    config.poll.interval = Duration::from_secs(args.poll_interval_s.max(1));
    config.poll.max_wait = args.poll_timeout_s.map(Duration::from_secs);
    config
}

/// Normalizes the reference still for upload: alpha is flattened onto
/// white, oversized images are scaled down, and the result is re-encoded
/// as JPEG. Files the decoder cannot read are passed through untouched
/// with an extension-based media type.
fn load_reference_image(path: &Path, max_dim: u32) -> Result<(Vec<u8>, String)> {
    let dim = max_dim.max(128);
    if let Ok(image) = image::open(path) {
        let rgba = image.to_rgba8();
        let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
        for (x, y, pixel) in rgba.enumerate_pixels() {
            let alpha = u16::from(pixel[3]);
            let blend = |channel: u8| -> u8 {
                (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
            };
            flattened.put_pixel(
                x,
                y,
                Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
            );
        }
        let flattened = DynamicImage::ImageRgba8(flattened);
        let resized = if rgba.width() > dim || rgba.height() > dim {
            flattened.resize(dim, dim, FilterType::Triangle).to_rgb8()
        } else {
            flattened.to_rgb8()
        };
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, 90);
        if encoder.encode_image(&DynamicImage::ImageRgb8(resized)).is_ok() {
            return Ok((bytes, "image/jpeg".to_string()));
        }
    }

    let bytes = fs::read(path)
        .with_context(|| format!("failed to read reference image {}", path.display()))?;
    Ok((bytes, guess_image_mime(path).to_string()))
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" | "heif" => "image/heic",
        _ => "image/png",
    }
}

fn extract_first_frame(input: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let result = std::process::Command::new("ffmpeg")
        .args(first_frame_args(input, output))
        .output();
    let finished = match result {
        Err(err) if err.kind() == ErrorKind::NotFound => {
            bail!(
                "ffmpeg is not installed; it is needed to pull a frame from {}",
                input.display()
            )
        }
        other => other.with_context(|| format!("failed to launch ffmpeg for {}", input.display()))?,
    };
    if !finished.status.success() {
        let stderr = String::from_utf8_lossy(&finished.stderr);
        bail!("ffmpeg could not read {}: {}", input.display(), stderr.trim());
    }
    if !output.exists() {
        bail!("ffmpeg produced no frame from {}", input.display());
    }
    Ok(())
}

fn first_frame_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

fn collect_receipts(run_dir: &Path) -> Result<Vec<(String, Value)>> {
    let entries = fs::read_dir(run_dir)
        .with_context(|| format!("failed to read run directory {}", run_dir.display()))?;
    let mut receipts = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with("receipt-") || !name.ends_with(".json") {
            continue;
        }
        let raw = fs::read_to_string(entry.path())
            .with_context(|| format!("failed to read {}", entry.path().display()))?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(parsed) => receipts.push((name, parsed)),
            Err(_) => eprintln!("skipping unreadable receipt {name}"),
        }
    }
    Ok(receipts)
}

fn receipt_summary(receipt: &Value) -> String {
    let prompt = receipt
        .get("request")
        .and_then(|request| request.get("prompt"))
        .and_then(Value::as_str)
        .unwrap_or("<no prompt>");
    let stages = receipt
        .get("stages")
        .and_then(Value::as_array)
        .map(|stages| stages.len())
        .unwrap_or(0);
    let clip = receipt
        .get("artifacts")
        .and_then(|artifacts| artifacts.get("video_path"))
        .and_then(Value::as_str)
        .unwrap_or("<no clip>");
    format!("{stages} stage(s)  \"{prompt}\"  {clip}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reference_requires_exactly_one_source() {
        assert!(matches!(
            resolve_reference(Some(PathBuf::from("a.png")), None),
            Ok(ReferenceSource::Image(_))
        ));
        assert!(matches!(
            resolve_reference(None, Some(PathBuf::from("a.mp4"))),
            Ok(ReferenceSource::Video(_))
        ));
        assert!(resolve_reference(None, None).is_err());
        assert!(resolve_reference(
            Some(PathBuf::from("a.png")),
            Some(PathBuf::from("a.mp4"))
        )
        .is_err());
    }

    #[test]
    fn engine_config_clamps_the_poll_interval() {
        let args = GenerateArgs {
            prompt: "p".to_string(),
            image: None,
            video: None,
            out: PathBuf::from("/tmp/reel-run"),
            events: None,
            aspect: "wide".to_string(),
            length: "short".to_string(),
            model: "custom-model".to_string(),
            extension_model: Some("other-model".to_string()),
            poll_interval_s: 0,
            poll_timeout_s: Some(600),
        };
        let config = engine_config_from(&args);
        assert_eq!(config.model, "custom-model");
        assert_eq!(config.extension_model.as_deref(), Some("other-model"));
        assert_eq!(config.poll.interval, Duration::from_secs(1));
        assert_eq!(config.poll.max_wait, Some(Duration::from_secs(600)));
    }

    #[test]
    fn first_frame_args_keep_ffmpeg_quiet_and_overwrite() {
        let args = first_frame_args(Path::new("in.mp4"), Path::new("out.png"));
        assert_eq!(
            args,
            vec![
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "in.mp4",
                "-frames:v",
                "1",
                "out.png",
            ]
        );
    }

    #[test]
    fn decodable_references_are_normalized_to_jpeg() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reference.png");
        let mut img = RgbaImage::new(4, 4);
        for pixel in img.pixels_mut() {
            *pixel = Rgba([200, 40, 40, 128]);
        }
        img.save(&path).expect("save png");

        let (bytes, mime) = load_reference_image(&path, 256).expect("load");
        assert_eq!(mime, "image/jpeg");
        assert!(!bytes.is_empty());
    }

    #[test]
    fn undecodable_references_pass_through_with_guessed_mime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reference.webp");
        fs::write(&path, b"not-an-image").expect("write");

        let (bytes, mime) = load_reference_image(&path, 256).expect("load");
        assert_eq!(bytes, b"not-an-image");
        assert_eq!(mime, "image/webp");
    }

    #[test]
    fn image_mime_guesses_follow_the_extension() {
        assert_eq!(guess_image_mime(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(guess_image_mime(Path::new("a.JPEG")), "image/jpeg");
        assert_eq!(guess_image_mime(Path::new("a.webp")), "image/webp");
        assert_eq!(guess_image_mime(Path::new("a")), "image/png");
    }

    #[test]
    fn receipt_summaries_surface_prompt_and_clip() {
        let receipt = json!({
            "request": { "prompt": "a red kite" },
            "stages": [{ "stage": "initial" }, { "stage": "extension" }],
            "artifacts": { "video_path": "/runs/demo/clip-1.mp4" },
        });
        assert_eq!(
            receipt_summary(&receipt),
            "2 stage(s)  \"a red kite\"  /runs/demo/clip-1.mp4"
        );
        assert_eq!(
            receipt_summary(&json!({})),
            "0 stage(s)  \"<no prompt>\"  <no clip>"
        );
    }

    #[test]
    fn receipt_collection_ignores_unrelated_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("receipt-1-abc.json"),
            json!({ "request": { "prompt": "p" } }).to_string(),
        )
        .expect("write receipt");
        fs::write(dir.path().join("events.jsonl"), "{}\n").expect("write events");
        fs::write(dir.path().join("clip-1-abc.mp4"), b"bytes").expect("write clip");

        let receipts = collect_receipts(dir.path()).expect("collect");
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].0, "receipt-1-abc.json");
    }
}
