//! Synthetic rasterizer shared by the integration tests.
//!
//! A "document" is a small text file:
//!
//! ```text
//! %SYNTHETIC-PDF
//! pages=3
//! size=612x792
//! rgba=0,0,0,0
//! fail=2
//! ```
//!
//! Anything without the header fails to open. `size` is in points, `rgba` is
//! the fill color of every page and `fail` names a 1-based page that cannot
//! be rasterized.

#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use pdf_to_png_core::rasterizer::pixels_at_dpi;
use pdf_to_png_core::{ConversionError, DocumentHandle, PageRasterizer, ProgressSink};
use pdf_to_png_core::{JobResult, ProgressState, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const HEADER: &str = "%SYNTHETIC-PDF";

/// Contents of one synthetic document file.
#[derive(Debug, Clone)]
pub struct SyntheticPdf {
    pub pages: usize,
    pub size: (f32, f32),
    pub rgba: [u8; 4],
    pub fail: Option<usize>,
}

impl SyntheticPdf {
    pub fn pages(pages: usize) -> Self {
        Self {
            pages,
            size: (612.0, 792.0),
            rgba: [20, 40, 60, 255],
            fail: None,
        }
    }

    pub fn rgba(mut self, rgba: [u8; 4]) -> Self {
        self.rgba = rgba;
        self
    }

    pub fn size(mut self, width: f32, height: f32) -> Self {
        self.size = (width, height);
        self
    }

    pub fn fail_page(mut self, page: usize) -> Self {
        self.fail = Some(page);
        self
    }

    /// Write the document to `dir/name` and return its path.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let mut text = format!(
            "{}\npages={}\nsize={}x{}\nrgba={},{},{},{}\n",
            HEADER,
            self.pages,
            self.size.0,
            self.size.1,
            self.rgba[0],
            self.rgba[1],
            self.rgba[2],
            self.rgba[3]
        );
        if let Some(fail) = self.fail {
            text.push_str(&format!("fail={}\n", fail));
        }
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        if lines.next()? != HEADER {
            return None;
        }
        let mut doc = SyntheticPdf::pages(0);
        for line in lines {
            let (key, value) = line.split_once('=')?;
            match key {
                "pages" => doc.pages = value.parse().ok()?,
                "size" => {
                    let (w, h) = value.split_once('x')?;
                    doc.size = (w.parse().ok()?, h.parse().ok()?);
                }
                "rgba" => {
                    let parts: Vec<u8> = value
                        .split(',')
                        .map(|p| p.parse())
                        .collect::<std::result::Result<_, _>>()
                        .ok()?;
                    doc.rgba = parts.try_into().ok()?;
                }
                "fail" => doc.fail = Some(value.parse().ok()?),
                _ => return None,
            }
        }
        Some(doc)
    }
}

/// Write a file that is not a document at all.
pub fn write_corrupt(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"\x00\x01 definitely not a pdf").unwrap();
    path
}

/// Tracks how many pages render at once.
#[derive(Debug, Default)]
pub struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
    pub renders: AtomicUsize,
}

impl Concurrency {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default, Clone)]
pub struct SyntheticRasterizer {
    pub stats: Arc<Concurrency>,
    /// Time each render holds its slot, to make overlap observable.
    pub render_delay: Duration,
}

impl SyntheticRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            render_delay: delay,
            ..Self::default()
        }
    }
}

impl PageRasterizer for SyntheticRasterizer {
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentHandle>> {
        let open_error = |message: &str| ConversionError::DocumentOpen {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        let text = std::fs::read_to_string(path).map_err(|e| open_error(&e.to_string()))?;
        let layout = SyntheticPdf::parse(&text).ok_or_else(|| open_error("not a PDF"))?;
        Ok(Box::new(SyntheticDocument {
            layout,
            stats: Arc::clone(&self.stats),
            delay: self.render_delay,
        }))
    }
}

struct SyntheticDocument {
    layout: SyntheticPdf,
    stats: Arc<Concurrency>,
    delay: Duration,
}

impl DocumentHandle for SyntheticDocument {
    fn page_count(&self) -> usize {
        self.layout.pages
    }

    fn render_page(&self, index: usize, dpi: u32) -> Result<RgbaImage> {
        let now = self.stats.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(now, Ordering::SeqCst);
        self.stats.renders.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.stats.current.fetch_sub(1, Ordering::SeqCst);

        if self.layout.fail == Some(index + 1) {
            return Err(ConversionError::Rasterization {
                page: index + 1,
                message: "synthetic failure".to_string(),
            });
        }
        let width = pixels_at_dpi(self.layout.size.0, dpi);
        let height = pixels_at_dpi(self.layout.size.1, dpi);
        Ok(RgbaImage::from_pixel(width, height, Rgba(self.layout.rgba)))
    }
}

/// Sink that records every event it sees.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub updates: Vec<ProgressState>,
    pub completed: Option<JobResult>,
    pub failure: Option<String>,
}

impl ProgressSink for RecordingSink {
    fn on_progress(&mut self, progress: &ProgressState) {
        self.updates.push(progress.clone());
    }

    fn on_complete(&mut self, result: &JobResult) {
        assert!(self.completed.is_none(), "on_complete called twice");
        self.completed = Some(result.clone());
    }

    fn on_failure(&mut self, error: &ConversionError) {
        assert!(self.failure.is_none(), "on_failure called twice");
        self.failure = Some(error.to_string());
    }
}

/// PNG file names directly inside `dir`, sorted.
pub fn png_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".png"))
        .collect();
    names.sort();
    names
}
