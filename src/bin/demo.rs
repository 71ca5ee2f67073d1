//! demo - end-to-end synthetic run of the AR detection pipeline

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use ar_detect::history::format_item;
use ar_detect::preview::ModelPreview;
use ar_detect::{
    upload_history, CameraConfig, CycleOutcome, FramePipeline, ObjectInfo, PipelineSettings,
    PipelineState, RecordingSurface, StubBackend, SyntheticSource, VideoSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames to process.
    #[arg(long, default_value_t = 60)]
    frames: u64,
    /// Start with the AR overlay hidden.
    #[arg(long)]
    hide_overlay: bool,
    /// Select the object under this point after the run, as `x,y`.
    #[arg(long)]
    click: Option<String>,
    /// Post the history to a log server at this address.
    #[arg(long)]
    upload: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if args.frames == 0 {
        return Err(anyhow!("frames must be >= 1"));
    }
    let click = args.click.as_deref().map(parse_point).transpose()?;

    stage("start synthetic camera + stub detector");
    let settings = PipelineSettings {
        overlay_visible: !args.hide_overlay,
        ..PipelineSettings::default()
    };
    let mut pipeline =
        FramePipeline::new(Box::new(StubBackend::new()), settings, RecordingSurface::new())?;
    pipeline.detector().wait_loaded(Duration::from_secs(5))?;

    let mut source = SyntheticSource::new(CameraConfig {
        url: "stub://demo".to_string(),
        ..CameraConfig::default()
    });
    source.connect()?;

    stage("run detection cycles");
    let active = AtomicBool::new(true);
    let mut state = PipelineState::new();
    let mut processed = 0u64;
    let mut skipped = 0u64;
    while processed < args.frames {
        let (outcome, next) = pipeline.run_cycle(&mut source, state, &active)?;
        state = next;
        match outcome {
            CycleOutcome::Processed(_) => processed += 1,
            CycleOutcome::Skipped(_) | CycleOutcome::Discarded => skipped += 1,
        }
    }
    source.disconnect();

    println!("demo summary:");
    println!("  frames processed: {}", processed);
    println!("  cycles skipped: {}", skipped);
    println!("  source frames: {}", source.stats().frames_captured);
    println!(
        "  overlay: {}",
        if pipeline.renderer().is_visible() {
            "visible"
        } else {
            "hidden"
        }
    );
    for text in pipeline.surface().texts() {
        println!("    {}", text);
    }

    let history = pipeline.history();
    println!("history ({} entries, most recent first):", history.len());
    for entry in history.entries() {
        let items: Vec<String> = entry.items.iter().map(format_item).collect();
        println!("  [{}] {}", entry.timestamp, items.join(", "));
    }

    if let Some((x, y)) = click {
        stage("select object");
        let info = match pipeline.select_at(x, y) {
            Some(det) => {
                let preview = ModelPreview::for_class(&det.class);
                println!(
                    "  3D preview: {} parts, camera at z={}",
                    preview.parts.len(),
                    preview.camera_z
                );
                ObjectInfo::for_detection(det)
            }
            None => ObjectInfo::placeholder(),
        };
        println!("{}", info);
    }

    if let Some(addr) = &args.upload {
        stage("upload history");
        let receipt = upload_history(addr, &history)?;
        println!("  saved as {}", receipt.file);
    }

    Ok(())
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}

fn parse_point(value: &str) -> Result<(f32, f32)> {
    let Some((x, y)) = value.split_once(',') else {
        bail!("point must look like x,y (got '{}')", value);
    };
    let x = x
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid x coordinate '{}'", x))?;
    let y = y
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid y coordinate '{}'", y))?;
    Ok((x, y))
}
