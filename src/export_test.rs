use super::*;
use crate::test_support::figure_with;
use std::io::Cursor;

struct FakePdf;

impl ExportBackend for FakePdf {
    fn supports(&self, format: ExportFormat) -> bool {
        format == ExportFormat::Pdf
    }

    fn encode(&self, image: &RgbaImage, _format: ExportFormat, dpi: u32, _quality: u8) -> Result<Vec<u8>, ExportError> {
        Ok(format!("%PDF {}x{}@{}", image.width(), image.height(), dpi).into_bytes())
    }
}

struct SlowBackend {
    started: Arc<AtomicBool>,
}

impl ExportBackend for SlowBackend {
    fn supports(&self, _format: ExportFormat) -> bool {
        true
    }

    fn encode(&self, _image: &RgbaImage, _format: ExportFormat, _dpi: u32, _quality: u8) -> Result<Vec<u8>, ExportError> {
        self.started.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(1500));
        Ok(Vec::new())
    }
}

fn run(figure: &Figure, opts: &ExportOptions, backend: Option<&dyn ExportBackend>) -> Result<ExportOutput, ExportError> {
    export_figure(figure, &JournalRules::built_in(), opts, &FontCache::offline(), backend, &CancelToken::new())
}

#[test]
fn dpi_and_quality_are_clamped() {
    assert_eq!(clamp_dpi(10), 50);
    assert_eq!(clamp_dpi(600), 600);
    assert_eq!(clamp_dpi(9000), 2400);
    assert_eq!(clamp_quality(0), 40);
    assert_eq!(clamp_quality(100), 95);
    assert_eq!(ExportOptions::new(ExportFormat::Png, 1).dpi, 50);
}

#[test]
fn scale_converts_screen_pixels_to_dpi() {
    // 3.78 px/mm is 96.012 px/in.
    assert!((export_scale(300) - 300.0 / 96.012).abs() < 1e-9);
}

#[test]
fn formats_parse_from_names_and_paths() {
    assert_eq!(ExportFormat::parse("JPG"), Some(ExportFormat::Jpeg));
    assert_eq!(ExportFormat::parse(".tif"), Some(ExportFormat::Tiff));
    assert_eq!(ExportFormat::parse("svg"), None);
    assert_eq!(ExportFormat::from_path(Path::new("fig/out.pdf")), Some(ExportFormat::Pdf));
    assert_eq!(ExportFormat::Png.mime(), "image/png");
}

#[test]
fn png_export_scales_canvas_to_dpi() {
    let fig = figure_with(4, 400, 300);
    let out = run(&fig, &ExportOptions::new(ExportFormat::Png, 100), None).unwrap();

    assert_eq!(out.layout, LayoutKind::Grid2x2);
    let expected_w = (180.0 * PIXELS_PER_MM * export_scale(100) - 1e-6).ceil() as u32;
    assert_eq!(out.width, expected_w);
    assert!((out.report.width_mm - 180.0).abs() < 1e-6);

    let decoded = image::load_from_memory(&out.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (out.width, out.height));
}

#[test]
fn export_leaves_live_figure_untouched() {
    let fig = figure_with(2, 40, 30);
    let _ = run(&fig, &ExportOptions::new(ExportFormat::Png, 150), None).unwrap();
    assert!(fig.panels.iter().all(|p| p.true_original.is_none()));
    assert!(fig.panels.iter().all(|p| p.original_width == 40 && p.original_height == 30));
    assert_eq!(fig.effective_layout, None);
}

#[test]
fn high_dpi_bakes_panels_at_output_resolution() {
    let fig = figure_with(1, 40, 30);
    let out = run(&fig, &ExportOptions::new(ExportFormat::Png, 300), None).unwrap();
    // 300 dpi is a little over three output pixels per screen pixel.
    assert!(out.width > 3 * 680);
}

#[test]
fn pdf_needs_a_backend() {
    let fig = figure_with(1, 40, 30);
    let err = run(&fig, &ExportOptions::new(ExportFormat::Pdf, 300), None).unwrap_err();
    assert!(matches!(err, ExportError::Unsupported(ref f) if f == "pdf"));

    let out = run(&fig, &ExportOptions::new(ExportFormat::Pdf, 300), Some(&FakePdf)).unwrap();
    assert!(out.bytes.starts_with(b"%PDF"));
}

#[test]
fn raster_formats_bypass_a_pdf_only_backend() {
    let fig = figure_with(1, 40, 30);
    let out = run(&fig, &ExportOptions::new(ExportFormat::Jpeg, 300), Some(&FakePdf)).unwrap();
    assert_eq!(&out.bytes[..2], &[0xFF, 0xD8]);
}

#[test]
fn pre_cancelled_export_stops_before_baking() {
    let fig = figure_with(3, 40, 30);
    let token = CancelToken::new();
    token.cancel();
    let err = export_figure(
        &fig,
        &JournalRules::built_in(),
        &ExportOptions::default(),
        &FontCache::offline(),
        None,
        &token,
    )
    .unwrap_err();
    assert!(matches!(err, ExportError::Cancelled { forced: false }));
}

#[test]
fn background_job_completes() {
    let fig = figure_with(5, 40, 30);
    let mut opts = ExportOptions::new(ExportFormat::Tiff, 150);
    opts.batch_size = 2;
    let job = ExportJob::spawn(fig, Arc::new(JournalRules::built_in()), opts, FontCache::offline().shared(), None);
    let out = job.wait().unwrap();
    assert_eq!(out.format, ExportFormat::Tiff);

    let mut decoder = tiff::decoder::Decoder::new(Cursor::new(out.bytes)).unwrap();
    assert_eq!(decoder.dimensions().unwrap(), (out.width, out.height));
}

#[test]
fn unresponsive_job_is_detached_on_cancel() {
    let fig = figure_with(1, 20, 20);
    let started = Arc::new(AtomicBool::new(false));
    let backend: Arc<dyn ExportBackend> = Arc::new(SlowBackend { started: started.clone() });
    let job = ExportJob::spawn(
        fig,
        Arc::new(JournalRules::built_in()),
        ExportOptions::new(ExportFormat::Png, 100),
        FontCache::offline().shared(),
        Some(backend),
    );
    while !started.load(Ordering::SeqCst) {
        std::thread::yield_now();
    }
    let err = job.cancel(Duration::from_millis(20)).unwrap_err();
    assert!(matches!(err, ExportError::Cancelled { forced: true }));
}
