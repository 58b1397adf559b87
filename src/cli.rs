use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "pagesift",
    version,
    about = "Keyword page splitting and ID extraction for scanned documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Inventory(InventoryArgs),
    Process(ProcessArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, default_value = ".cache/pagesift")]
    pub cache_root: PathBuf,

    #[arg(long, default_value = "uploads")]
    pub input_dir: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Input documents: PDF or image files, or directories to scan.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[arg(long)]
    pub keyword: String,

    /// Characters scanned after a keyword hit for an identifier token.
    #[arg(long, default_value_t = 32)]
    pub id_window: usize,

    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = ".cache/pagesift")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OcrMode::Auto)]
    pub ocr_mode: OcrMode,

    #[arg(long, default_value = "eng")]
    pub ocr_lang: String,

    #[arg(long, default_value_t = 350)]
    pub ocr_dpi: u32,

    #[arg(long, default_value_t = 120)]
    pub ocr_min_text_chars: usize,

    #[arg(long)]
    pub max_pages_per_doc: Option<usize>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OcrMode {
    Off,
    Auto,
    Force,
}

impl OcrMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Auto => "auto",
            Self::Force => "force",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/pagesift")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
