use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tabshape::pipeline::{infer_source, PipelineOptions};

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    Shapes,
    Json,
    Fingerprint,
}

#[derive(Parser, Debug)]
#[command(
    name = "tabshape",
    version,
    about = "Infers row and column counts of every value in a .sir array/relational IR file"
)]
struct Cli {
    /// Input .sir source file
    source: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = EmitStage::Shapes)]
    emit: EmitStage,

    /// Directory holding `<path>.meta` sidecars for `read` (default: the source's directory)
    #[arg(long)]
    meta_dir: Option<PathBuf>,

    /// Print phases and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tabshape=debug"))
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let meta_dir = cli.meta_dir.clone().unwrap_or_else(|| {
        cli.source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    if cli.verbose {
        eprintln!("tabshape: source   = {}", cli.source.display());
        eprintln!("tabshape: meta-dir = {}", meta_dir.display());
        eprintln!("tabshape: emit     = {:?}", cli.emit);
    }

    // ── Read source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("tabshape: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };
    let file = cli.source.display().to_string();

    // ── Parse, resolve, infer ──
    let options = PipelineOptions {
        meta_dir,
        verbose: cli.verbose,
    };
    let state = match infer_source(&source, &options, |_, diags| {
        for diag in diags {
            eprintln!("tabshape: {}", diag.render(&file, &source));
        }
    }) {
        Ok(state) => state,
        Err(diags) => {
            for diag in &diags {
                eprintln!("tabshape: {}", diag.render(&file, &source));
            }
            std::process::exit(1);
        }
    };
    if state.has_error {
        std::process::exit(1);
    }
    let Some(shapes) = state.shapes.as_ref() else {
        eprintln!("tabshape: shape inference produced no output");
        std::process::exit(1);
    };

    // ── Emit ──
    match cli.emit {
        EmitStage::Shapes => print!("{}", shapes.render()),
        EmitStage::Json => match shapes.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("tabshape: error: {e}");
                std::process::exit(1);
            }
        },
        EmitStage::Fingerprint => match &state.provenance {
            Some(p) => print!("{}", p.to_json()),
            None => {
                eprintln!("tabshape: no provenance recorded");
                std::process::exit(1);
            }
        },
    }
}
