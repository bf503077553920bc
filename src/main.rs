use clap::{ArgAction, Parser};
use rasterhtml::rendering::BufferSurface;
use rasterhtml::{Error, RasterizeConfig, Result, Viewport};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "rasterhtml",
    version,
    about = "Inline a page's resources and render it through an SVG envelope"
)]
struct Cli {
    /// URL or local HTML file
    input: String,

    /// Envelope width
    #[arg(long, default_value_t = 300)]
    width: u32,

    /// Envelope height
    #[arg(long, default_value_t = 200)]
    height: u32,

    /// Resolve relative references against this URL instead of the page's
    #[arg(long)]
    base_url: Option<String>,

    /// Add a cache-busting parameter to every request
    #[arg(long, action = ArgAction::SetTrue)]
    no_cache: bool,

    /// Run inline scripts after inlining
    #[arg(long, action = ArgAction::SetTrue)]
    execute_js: bool,

    /// How long scripts may keep scheduling timers
    #[arg(long, default_value_t = 0)]
    js_timeout_ms: u64,

    /// Per-request timeout
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,

    /// Write the SVG envelope here
    #[arg(long)]
    svg_out: Option<PathBuf>,

    /// Write the inlined HTML here
    #[arg(long)]
    inline_out: Option<PathBuf>,
}

fn input_url(input: &str) -> Result<String> {
    if url::Url::parse(input).is_ok() {
        return Ok(input.to_string());
    }
    let path = Path::new(input).canonicalize()?;
    url::Url::from_file_path(&path)
        .map(|u| u.to_string())
        .map_err(|_| Error::Other(format!("{}: not a usable file path", path.display())))
}

async fn run(cli: Cli) -> Result<bool> {
    let url = input_url(&cli.input)?;
    let config = RasterizeConfig {
        base_url: cli.base_url,
        cache: !cli.no_cache,
        viewport: Viewport {
            width: cli.width,
            height: cli.height,
        },
        timeout_ms: cli.timeout_ms,
        execute_js: cli.execute_js,
        execute_js_timeout_ms: cli.js_timeout_ms,
        ..Default::default()
    };
    let rasterizer = rasterhtml::new_rasterizer(config)?;
    let mut surface = BufferSurface::new(cli.width, cli.height);

    let rendered = match rasterizer.load_page(&url).await {
        Ok(mut doc) => {
            let rendered = rasterizer.draw_document(&mut doc, Some(&mut surface)).await;
            if let Some(path) = &cli.inline_out {
                std::fs::write(path, doc.to_html())?;
            }
            rendered
        }
        Err(page) => rasterhtml::Rendered {
            image: None,
            errors: vec![page],
        },
    };

    if let (Some(path), Some(image)) = (&cli.svg_out, &rendered.image) {
        std::fs::write(path, &image.svg)?;
    }

    let report = serde_json::to_string_pretty(&rendered.errors).map_err(|e| Error::Other(e.to_string()))?;
    println!("{}", report);
    Ok(rendered.image.is_some())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("rasterhtml: {}", e);
            ExitCode::FAILURE
        }
    }
}
