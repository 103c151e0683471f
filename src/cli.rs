use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Convert an EPUB into a linked set of clean Markdown notes
#[derive(Parser, Debug)]
#[command(name = "epub2notes", version, about)]
pub struct Cli {
    /// Path to the input EPUB file or unpacked package directory
    pub input: PathBuf,

    /// Output directory.
    /// Defaults to a directory named after the input in the current directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Generic HTML-to-Markdown converter to run on each unit
    #[arg(long, value_enum, default_value_t = ConverterKind::Html2md)]
    pub converter: ConverterKind,

    /// Pandoc executable, used with `--converter pandoc`
    #[arg(long, default_value = "pandoc")]
    pub pandoc: PathBuf,

    /// Do not copy images (only convert text content)
    #[arg(long, default_value_t = false)]
    pub no_images: bool,

    /// JSON citation database used to add citation keys to headers
    #[arg(long)]
    pub citations: Option<PathBuf>,

    /// Write the run report as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Keep intermediate markup and converter output in the output directory
    #[arg(long, default_value_t = false)]
    pub keep_work: bool,

    /// Log debug output
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConverterKind {
    /// In-process fast_html2md
    Html2md,
    /// External pandoc process
    Pandoc,
}
