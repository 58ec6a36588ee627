#[cfg(test)]
#[path = "export_test.rs"]
mod export_test;

// ============================================================================
// EXPORT: high-DPI bake + layout + render of a working copy
// ============================================================================
//
// The live figure is never touched: export clones it, records each panel's
// screen-scale size in `true_original` (so layout math is unchanged), re-bakes
// every panel at the output scale in small batches, lays out, renders without
// the overlay, and encodes.
// ============================================================================

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use rayon::prelude::*;

use crate::bake::{DEFAULT_MAX_DIMENSION, bake_with_ceiling};
use crate::config::JournalRules;
use crate::error::ExportError;
use crate::layout::{self, LayoutReport, PIXELS_PER_MM};
use crate::ops::text::FontCache;
use crate::project::{Figure, LayoutKind};
use crate::render::{RenderOptions, fit_scale, render_figure};
use crate::smart::arrange_figure;

pub const MIN_DPI: u32 = 50;
pub const MAX_DPI: u32 = 2400;
pub const DEFAULT_DPI: u32 = 600;
pub const MIN_QUALITY: u8 = 40;
pub const MAX_QUALITY: u8 = 95;
pub const DEFAULT_QUALITY: u8 = 90;

pub fn clamp_dpi(dpi: u32) -> u32 {
    dpi.clamp(MIN_DPI, MAX_DPI)
}

pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

/// Output pixels per screen pixel at `dpi`.
pub fn export_scale(dpi: u32) -> f64 {
    dpi as f64 / (PIXELS_PER_MM * 25.4)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
    Tiff,
    Pdf,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<ExportFormat> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg),
            "tif" | "tiff" => Some(ExportFormat::Tiff),
            "pdf" => Some(ExportFormat::Pdf),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<ExportFormat> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::parse)
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Tiff => "tiff",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Tiff => "image/tiff",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

/// Out-of-process encoder for formats the raster stack cannot write.
pub trait ExportBackend: Send + Sync {
    fn supports(&self, format: ExportFormat) -> bool;
    fn encode(&self, image: &RgbaImage, format: ExportFormat, dpi: u32, quality: u8) -> Result<Vec<u8>, ExportError>;
}

/// Cooperative cancellation flag shared with an export worker.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ExportError> {
        if self.is_cancelled() {
            Err(ExportError::Cancelled { forced: false })
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub dpi: u32,
    pub quality: u8,
    /// Panels baked per batch.
    pub batch_size: usize,
    pub max_dimension: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Png,
            dpi: DEFAULT_DPI,
            quality: DEFAULT_QUALITY,
            batch_size: 4,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl ExportOptions {
    pub fn new(format: ExportFormat, dpi: u32) -> Self {
        Self { format, dpi: clamp_dpi(dpi), ..Self::default() }
    }
}

#[derive(Debug)]
pub struct ExportOutput {
    pub bytes: Vec<u8>,
    pub format: ExportFormat,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
    pub layout: LayoutKind,
    /// Layout metrics measured at screen scale.
    pub report: LayoutReport,
}

/// Baked-panel counter readable while an export runs.
#[derive(Clone, Debug, Default)]
pub struct ExportProgress {
    done: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl ExportProgress {
    /// `(panels baked, panels total)`.
    pub fn get(&self) -> (usize, usize) {
        (self.done.load(Ordering::Relaxed), self.total.load(Ordering::Relaxed))
    }
}

/// Render `figure` at `opts.dpi` and encode it.
pub fn export_figure(
    figure: &Figure,
    rules: &JournalRules,
    opts: &ExportOptions,
    fonts: &FontCache,
    backend: Option<&dyn ExportBackend>,
    cancel: &CancelToken,
) -> Result<ExportOutput, ExportError> {
    export_with_progress(figure, rules, opts, fonts, backend, cancel, &ExportProgress::default())
}

fn export_with_progress(
    figure: &Figure,
    rules: &JournalRules,
    opts: &ExportOptions,
    fonts: &FontCache,
    backend: Option<&dyn ExportBackend>,
    cancel: &CancelToken,
    progress: &ExportProgress,
) -> Result<ExportOutput, ExportError> {
    let dpi = clamp_dpi(opts.dpi);
    let quality = clamp_quality(opts.quality);
    let scale = export_scale(dpi);
    let batch = opts.batch_size.max(1);

    let mut work = figure.clone();
    for panel in &mut work.panels {
        panel.true_original = Some((panel.original_width, panel.original_height));
    }
    progress.total.store(work.panels.len(), Ordering::Relaxed);
    tracing::info!(figure = %work.name, panels = work.panels.len(), dpi, scale, "export started");

    for chunk in work.panels.chunks_mut(batch) {
        cancel.check()?;
        chunk.par_iter_mut().try_for_each(|panel| {
            let raster = bake_with_ceiling(&panel.pristine, &panel.edits, scale, fonts, opts.max_dimension)?;
            panel.set_baked(raster);
            progress.done.fetch_add(1, Ordering::Relaxed);
            Ok::<(), ExportError>(())
        })?;
        std::thread::yield_now();
    }
    cancel.check()?;

    let (kind, outcome) = arrange_figure(&mut work, rules);
    let report = layout::report(kind, &work.panels, &outcome);
    let canvas = render_figure(&work, &outcome, &RenderOptions::export(&work, scale), fonts);
    cancel.check()?;
    // A reduced render keeps its physical size by carrying a lower density.
    let applied = fit_scale(&outcome, scale);
    let dpi = if applied < scale { ((dpi as f64 * applied / scale).floor() as u32).max(1) } else { dpi };

    let bytes = match backend {
        Some(backend) if backend.supports(opts.format) => backend.encode(&canvas, opts.format, dpi, quality)?,
        _ if opts.format == ExportFormat::Pdf => {
            return Err(ExportError::Unsupported(opts.format.extension().to_string()));
        }
        _ => crate::io::encode_export(&canvas, opts.format, dpi, quality)?,
    };
    tracing::info!(width = canvas.width(), height = canvas.height(), bytes = bytes.len(), "export finished");

    Ok(ExportOutput {
        bytes,
        format: opts.format,
        width: canvas.width(),
        height: canvas.height(),
        dpi,
        layout: kind,
        report,
    })
}

// ============================================================================
// EXPORT JOB: background export with a cancel deadline
// ============================================================================

/// An export running on the rayon pool.
pub struct ExportJob {
    cancel: CancelToken,
    progress: ExportProgress,
    rx: mpsc::Receiver<Result<ExportOutput, ExportError>>,
}

impl ExportJob {
    pub fn spawn(
        figure: Figure,
        rules: Arc<JournalRules>,
        opts: ExportOptions,
        fonts: Arc<FontCache>,
        backend: Option<Arc<dyn ExportBackend>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let progress = ExportProgress::default();
        let worker_cancel = cancel.clone();
        let worker_progress = progress.clone();
        rayon::spawn(move || {
            let result = export_with_progress(
                &figure,
                &rules,
                &opts,
                &fonts,
                backend.as_deref(),
                &worker_cancel,
                &worker_progress,
            );
            let _ = tx.send(result);
        });
        Self { cancel, progress, rx }
    }

    pub fn progress(&self) -> (usize, usize) {
        self.progress.get()
    }

    /// Non-blocking check for completion.
    pub fn poll(&self) -> Option<Result<ExportOutput, ExportError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ExportError::Cancelled { forced: true })),
        }
    }

    pub fn wait(self) -> Result<ExportOutput, ExportError> {
        self.rx.recv().unwrap_or(Err(ExportError::Cancelled { forced: true }))
    }

    /// Request cancellation and wait up to `timeout` for the worker to stop.
    ///
    /// A worker that already finished hands back its output. One that does not
    /// acknowledge in time is detached (its result will be discarded) and the
    /// cancellation is reported as forced.
    pub fn cancel(self, timeout: Duration) -> Result<ExportOutput, ExportError> {
        self.cancel.cancel();
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(ExportError::Cancelled { .. })) => Err(ExportError::Cancelled { forced: false }),
            Ok(Err(other)) => Err(other),
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "export did not stop in time; detached");
                Err(ExportError::Cancelled { forced: true })
            }
            Err(RecvTimeoutError::Disconnected) => Err(ExportError::Cancelled { forced: true }),
        }
    }
}
