use clap::Parser;
use pdf_to_png_core::{DEFAULT_DPI, MAX_DPI, MIN_DPI};
use std::path::PathBuf;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert two files at the default 300 DPI
  pdf2png report.pdf invoice.pdf -o out/

  # Every PDF in a folder, 150 DPI, 4 worker threads
  pdf2png scans/ -o out/ --dpi 150 -j 4

  # Machine readable summary
  pdf2png scans/ -o out/ --json > result.json

OUTPUT LAYOUT:
  out/report/report_page1.png
  out/report/report_page2.png
  out/invoice/invoice_page1.png

EXIT STATUS:
  0  every document converted
  1  some or all documents failed
  2  the run could not start or was aborted

ENVIRONMENT VARIABLES:
  RUST_LOG                 Log filter (overrides --verbose)
  PDFIUM_DYNAMIC_LIB_PATH  Directory containing libpdfium
"#;

/// An opaque RGB color given as six hex digits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl From<Rgb> for (u8, u8, u8) {
    fn from(c: Rgb) -> Self {
        (c.0, c.1, c.2)
    }
}

pub fn parse_color(hex: &str) -> Result<Rgb, String> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err("Color must be a 6-digit hex like FFFFFF".to_string());
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|e| e.to_string())
    };
    Ok(Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Convert PDF documents to one PNG per page.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2png",
    version,
    about = "Convert PDF documents to one PNG image per page",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
pub struct Cli {
    /// PDF files or directories (scanned one level deep for .pdf files)
    #[arg(required = true, value_hint = clap::ValueHint::AnyPath)]
    pub inputs: Vec<PathBuf>,

    /// Output root; each document gets its own subdirectory
    #[arg(short = 'o', long, value_hint = clap::ValueHint::DirPath)]
    pub output: PathBuf,

    /// Rendering resolution
    #[arg(long, env = "PDF2PNG_DPI", default_value_t = DEFAULT_DPI,
          value_parser = clap::value_parser!(u32).range(MIN_DPI as i64..=MAX_DPI as i64))]
    pub dpi: u32,

    /// Worker threads shared by documents and pages. Default: CPU cores
    #[arg(short = 'j', long, env = "PDF2PNG_JOBS")]
    pub jobs: Option<usize>,

    /// PNG compression level 0-9
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u8).range(0..=9))]
    pub compression: u8,

    /// Background color transparent areas are flattened onto, in hex
    #[arg(long, default_value = "FFFFFF", value_parser = parse_color)]
    pub background: Rgb,

    /// Directory to load the pdfium library from
    #[arg(long, env = "PDFIUM_DYNAMIC_LIB_PATH", value_hint = clap::ValueHint::DirPath)]
    pub pdfium_dir: Option<PathBuf>,

    /// Print the job result as JSON instead of a text summary
    #[arg(long)]
    pub json: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Enable DEBUG-level logs
    #[arg(short, long)]
    pub verbose: bool,
}
