use argh::FromArgs;
use std::path::PathBuf;

use avframe::frame::batch::{run_batch, CancelToken, DirectorySink};
use avframe::frame::config::PipelineConfig;
use avframe::frame::FrameAssembler;
use avframe::image::viz;

#[derive(FromArgs)]
/// Assemble camera frames of a dataset and write them to a directory
struct Args {
    /// path to the pipeline json configuration
    #[argh(option, short = 'c')]
    config: PathBuf,

    /// directory the frames are written to
    #[argh(option, short = 'o')]
    output: PathBuf,

    /// splits to assemble; defaults to train and val
    #[argh(option, short = 's')]
    split: Vec<String>,

    /// write debug overlays of the first frames to this directory
    #[argh(option)]
    overlays: Option<PathBuf>,

    /// number of frames to draw overlays for
    #[argh(option, default = "16")]
    num_overlays: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    let config = PipelineConfig::from_path(&args.config)?;
    let adapter = config.adapter.open()?;
    let assembler = FrameAssembler::new(adapter, config.assembler.clone());

    let splits = args.split.iter().map(String::as_str).collect::<Vec<_>>();
    let uris = assembler.camera_uris(&splits)?;
    log::info!("Assembling {} frames into {}", uris.len(), args.output.display());

    // create the cancellation token
    let cancel_token = CancelToken::new();

    ctrlc::set_handler({
        let cancel_token = cancel_token.clone();
        move || {
            println!("Received Ctrl-C signal. Finishing the running frames !!");
            cancel_token.cancel();
        }
    })?;

    let sink = DirectorySink::new(&args.output)?;
    let report = run_batch(&assembler, &uris, &sink, &config.batch, &cancel_token)?;

    if let Some(dir) = &args.overlays {
        std::fs::create_dir_all(dir)?;
        for uri in uris.iter().take(args.num_overlays) {
            let frame = match assembler.assemble(uri) {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("No overlay for {uri}: {err}");
                    continue;
                }
            };
            // mirror the frame layout below the overlay directory
            let frame_path = sink.path_for(uri).with_extension("png");
            let relative = frame_path.strip_prefix(sink.root()).unwrap_or(&frame_path);
            let path = dir.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            for camera in &frame.camera_images {
                let overlay = camera.debug_overlay(2)?;
                std::fs::write(&path, viz::encode_png(&overlay)?)?;
            }
        }
    }

    let summary = report.stats.to_string();
    std::fs::write(args.output.join("stats.txt"), &summary)?;

    println!("{summary}");
    println!(
        "written: {} ({} bytes), skipped: {}, not started: {}",
        report.written,
        report.bytes,
        report.skipped.len(),
        report.not_started
    );
    for (uri, err) in &report.skipped {
        println!("  {uri}: {err}");
    }
    if report.cancelled {
        println!("Run was cancelled");
    }

    Ok(())
}
