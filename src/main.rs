use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wirebrief::{Args, CaptureSource, Dispatcher, FileStore, Notices, Renderer, Settings};

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// Not #[tokio::main]: the HTTP analyzer owns its runtime and blocks on it.
fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose);

    let settings = Settings::resolve(args).context("invalid settings")?;
    let source = CaptureSource::open(&settings.input)
        .with_context(|| format!("unable to analyze {}", settings.input.display()))?;

    let mut dispatcher = Dispatcher::default();
    dispatcher.analyze(source);

    let mut files = FileStore::new();
    dispatcher.finish(&mut files);
    files.extract(&settings.selection(), &settings.extract_to);

    let mut renderer = Renderer::stdout(settings.render_options());
    for block in dispatcher.summaries() {
        renderer.render(&block)?;
    }
    renderer.render_block("Files", &files.summary())?;

    let graph = dispatcher.graph();
    match graph.export(settings.create_graph.as_deref()) {
        Ok(()) => {
            if let Some(path) = &settings.create_graph {
                info!("Wrote communication graph with {} edges to {}", graph.edges().len(), path.display());
            }
        }
        Err(e) => error!("Unable to write communication graph: {}", e),
    }

    renderer.finalize(&Notices {
        files_found: files.len(),
        files_extracted: files.extracted(),
        graph_requested: settings.create_graph.is_some(),
        graph_edges: graph.edges().len(),
    })?;

    Ok(())
}
