mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, ConverterKind};
use epub2notes::{
    convert, CitationLookup, ConvertOptions, Html2Md, JsonCitations, MarkupConverter,
    NoCitations, Pandoc,
};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output_dir = resolve_output_dir(&cli)?;
    let mut options = ConvertOptions::new(&output_dir);
    options.copy_images = !cli.no_images;
    options.keep_work = cli.keep_work;

    let converter: Box<dyn MarkupConverter> = match cli.converter {
        ConverterKind::Html2md => Box::new(Html2Md),
        ConverterKind::Pandoc => Box::new(Pandoc::new(&cli.pandoc)),
    };
    let citations: Box<dyn CitationLookup> = match &cli.citations {
        Some(path) => Box::new(JsonCitations::from_path(path)?),
        None => Box::new(NoCitations),
    };

    let report = convert(&cli.input, &options, converter.as_ref(), citations.as_ref())
        .with_context(|| format!("Failed to convert {}", cli.input.display()))?;

    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write run report: {}", path.display()))?;
    }

    eprintln!("{}", report.summary());
    eprintln!("Notes written to {}", output_dir.display());
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "epub2notes=debug"
    } else {
        "epub2notes=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn resolve_output_dir(cli: &Cli) -> Result<PathBuf> {
    if let Some(ref path) = cli.output {
        return Ok(path.clone());
    }

    let stem = cli
        .input
        .file_stem()
        .context("Input path has no name")?
        .to_string_lossy();

    Ok(PathBuf::from(stem.as_ref()))
}
