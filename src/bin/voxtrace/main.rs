//! voxtrace CLI - render the built-in demo scene on the compute device.

mod demo;

use std::env;
use std::path::Path;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use voxtrace::device::GpuTracer;
use voxtrace::render::{render_pass, render_preview, HostIntersector, Intersector, SampleBuffer, TraceEngine};
use voxtrace::RenderParams;

const DEFAULT_WIDTH: usize = 320;
const DEFAULT_HEIGHT: usize = 180;

/// Parsed command-line options shared by all commands.
struct Options {
    width: usize,
    height: usize,
    spp: u32,
    output: String,
    params: Option<String>,
    host: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            spp: 16,
            output: "voxtrace.png".into(),
            params: None,
            host: false,
        }
    }
}

fn main() {
    let _guard = init_tracing();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return;
    }

    let opts = match parse_options(&args[2..]) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match args[1].as_str() {
        "info" | "i" => cmd_info(),
        "preview" | "p" => cmd_preview(&opts),
        "render" | "r" => cmd_render(&opts),
        "params" => cmd_params(&opts),
        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Console logging through `RUST_LOG`, plus a Chrome trace when `VOXTRACE_TRACE=1`.
fn init_tracing() -> Option<tracing_chrome::FlushGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (chrome_layer, guard) = if env::var("VOXTRACE_TRACE").ok().as_deref() == Some("1") {
        let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new().file("trace.json").build();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(chrome_layer)
        .try_init();
    if installed.is_err() {
        return None;
    }
    guard
}

fn parse_options(args: &[String]) -> anyhow::Result<Options> {
    let mut opts = Options::default();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().with_context(|| format!("missing value for {name}"));
        match arg.as_str() {
            "-o" | "--output" => opts.output = value(arg)?.clone(),
            "-W" | "--width" => opts.width = value(arg)?.parse().context("invalid width")?,
            "-H" | "--height" => opts.height = value(arg)?.parse().context("invalid height")?,
            "-s" | "--spp" => opts.spp = value(arg)?.parse().context("invalid sample count")?,
            "-p" | "--params" => opts.params = Some(value(arg)?.clone()),
            "--host" => opts.host = true,
            other => bail!("unknown option {other}"),
        }
    }
    if opts.width == 0 || opts.height == 0 {
        bail!("image size must be non-zero");
    }
    Ok(opts)
}

fn load_params(opts: &Options) -> anyhow::Result<RenderParams> {
    match &opts.params {
        Some(path) => RenderParams::load(path).with_context(|| format!("loading {path}")),
        None => Ok(RenderParams::default()),
    }
}

fn save_rgba(path: &str, width: usize, height: usize, rgba: Vec<u8>) -> anyhow::Result<()> {
    let img = image::RgbaImage::from_raw(width as u32, height as u32, rgba)
        .context("pixel buffer does not match image size")?;
    img.save(Path::new(path)).with_context(|| format!("writing {path}"))?;
    info!(path, width, height, "image written");
    Ok(())
}

fn cmd_info() -> anyhow::Result<()> {
    let scene = demo::build()?;
    let mut tracer = GpuTracer::new()?;
    println!("Device:      {}", tracer.context().describe());
    println!("Max rows:    {}", tracer.context().max_rows());

    tracer.upload(&scene.octree, &scene.palette, RenderParams::default().emitter_intensity)?;
    if let Some(info) = tracer.scene_info() {
        println!("Octree:      depth {}, {} values", info.octree_depth, info.octree_len);
        println!("Blocks:      {} ({} transparent)", info.block_count, info.transparent_count);
    }
    let stats = tracer.upload_stats();
    println!("Uploads:     {} (atlas grew {} times)", stats.uploads, stats.atlas_grows);
    Ok(())
}

fn cmd_preview(opts: &Options) -> anyhow::Result<()> {
    let params = load_params(opts)?;
    let scene = demo::build()?;
    let mut tracer = GpuTracer::new()?;
    tracer.upload(&scene.octree, &scene.palette, params.emitter_intensity)?;

    let sun = scene.sky.sun.direction();
    let image = render_preview(&tracer, &scene.camera, opts.width, opts.height, sun, &params)?;
    save_rgba(&opts.output, opts.width, opts.height, image.to_rgba8())
}

fn cmd_render(opts: &Options) -> anyhow::Result<()> {
    let params = load_params(opts)?;
    let scene = demo::build()?;
    let host = HostIntersector::new(scene.octree.clone(), scene.palette.clone())?;

    let gpu = if opts.host {
        None
    } else {
        let mut tracer = GpuTracer::new()?;
        tracer.upload(&scene.octree, &scene.palette, params.emitter_intensity)?;
        Some(tracer)
    };
    let intersector: &dyn Intersector = match &gpu {
        Some(tracer) => tracer,
        None => &host,
    };

    let engine = TraceEngine::new(intersector, &params, &scene.palette, &scene.sky)
        .with_emitters(&scene.emitters)
        .with_shadow_intersector(&host);

    let mut buffer = SampleBuffer::new(opts.width, opts.height);
    for pass in 0..opts.spp {
        let report = render_pass(&engine, &scene.camera, opts.width, opts.height, pass as u64);
        let accepted = report.finalize_into(&mut buffer);
        info!(pass, accepted, failed = report.failed, "pass done");
    }
    let stats = engine.stats();
    info!(
        enqueued = stats.enqueued,
        intersected = stats.intersected,
        resolved = stats.resolved,
        "render complete"
    );
    save_rgba(&opts.output, opts.width, opts.height, buffer.to_rgba8())
}

fn cmd_params(opts: &Options) -> anyhow::Result<()> {
    let params = load_params(opts)?;
    params.save(&opts.output).with_context(|| format!("writing {}", opts.output))?;
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

fn print_help() {
    println!(
        "voxtrace {} (built {})\n",
        env!("CARGO_PKG_VERSION"),
        voxtrace::BUILD_STAMP
    );
    println!(
        r#"USAGE:
    voxtrace <command> [options]

COMMANDS:
    info, i       Show the compute device and upload the demo scene
    preview, p    Render a depth preview in one batched dispatch
    render, r     Path-trace the demo scene
    params        Write the effective render parameters as JSON

OPTIONS:
    -o, --output <file>    Output path (default voxtrace.png)
    -W, --width <px>       Image width (default 320)
    -H, --height <px>      Image height (default 180)
    -s, --spp <n>          Samples per pixel for render (default 16)
    -p, --params <file>    Load render parameters from JSON
    --host                 Intersect on the CPU instead of the device

ENVIRONMENT:
    RUST_LOG               Log filter (default info)
    VOXTRACE_TRACE=1       Write a Chrome trace to trace.json"#
    );
}
