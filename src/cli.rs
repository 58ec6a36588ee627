// ============================================================================
// FigComposer CLI: headless figure composition via command-line arguments
// ============================================================================
//
// Usage examples:
//   figcomposer -i a.png b.png c.png d.png -o figure.png
//   figcomposer -i "blots/*.tif" --journal Nature --target single -o fig2.tiff --dpi 600
//   figcomposer -i poster.figproj --figure 1 -o fig.jpg --quality 85 --report -
//   figcomposer -i panels/*.png --layout grid3x3 --save-project draft.figproj -o draft.png
//
// Images are imported into a single figure; a `.figproj`/`.json` input is
// loaded as a saved project instead. The figure is laid out (smart selection
// unless --layout says otherwise), exported at the requested DPI, and written.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use serde::Serialize;

use crate::config::{EngineSettings, JournalRules};
use crate::error::{ConfigError, ExportError, ImportError, ProjectError};
use crate::export::{ExportFormat, ExportJob, ExportOptions, clamp_quality};
use crate::io::{self, IMPORT_EXTENSIONS};
use crate::layout::LayoutReport;
use crate::ops::text::FontCache;
use crate::project::{LayoutChoice, Project, TargetWidth};

/// Extensions treated as saved projects rather than images.
const PROJECT_EXTENSIONS: &[&str] = &["figproj", "json"];

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// FigComposer headless figure composer.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "figcomposer",
    about = "Compose multi-panel scientific figures without a GUI",
    long_about = "Arrange panel images into a journal-compliant figure and export it\n\
                  at print resolution. Accepts PNG, JPEG, GIF, BMP, WEBP and TIFF panels,\n\
                  or a saved .figproj project.\n\n\
                  Example:\n  \
                  figcomposer -i a.png b.png c.png -o figure.png --journal Nature --dpi 600"
)]
pub struct CliArgs {
    /// Input panel image(s) or a single project file. Glob patterns accepted.
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output figure path. Defaults to `<first input stem>_figure.<ext>`.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format: png, jpeg, tiff, pdf. Inferred from --output when omitted.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Journal whose size rules apply (unknown names use the defaults).
    #[arg(long, value_name = "NAME")]
    pub journal: Option<String>,

    /// Layout: auto, stack, grid2x2, grid3x3, grid4xn, custom.
    #[arg(long, value_name = "LAYOUT")]
    pub layout: Option<String>,

    /// Target column width: single or double.
    #[arg(long, value_name = "WIDTH")]
    pub target: Option<String>,

    /// Export resolution (50-2400). Defaults to the figure's or the configured DPI.
    #[arg(long, value_name = "DPI")]
    pub dpi: Option<u32>,

    /// JPEG quality (40-95).
    #[arg(short, long, value_name = "40-95")]
    pub quality: Option<u8>,

    /// Figure to export when the input is a project (0-based; defaults to the active one).
    #[arg(long, value_name = "INDEX")]
    pub figure: Option<usize>,

    /// Also write the composed project to this path.
    #[arg(long, value_name = "FILE")]
    pub save_project: Option<PathBuf>,

    /// Write a JSON layout report to this path ("-" for stdout).
    #[arg(long, value_name = "FILE")]
    pub report: Option<String>,

    /// Journal rules JSON replacing the built-in table.
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Engine settings file (defaults to the per-user config).
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Print progress and timing, and mirror debug logging to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Errors and exit codes
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Usage(_) => 2,
            CliError::Import(_) => 3,
            CliError::Project(_) => 4,
            CliError::Export(ExportError::Cancelled { .. }) => 130,
            CliError::Export(_) => 5,
            CliError::Config(_) => 6,
            CliError::Write { .. } => 7,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub output: PathBuf,
    pub format: &'static str,
    pub width_px: u32,
    pub height_px: u32,
    pub dpi: u32,
    pub panels: usize,
    pub layout: LayoutReport,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    match execute(&args) {
        Ok(summary) => {
            if args.verbose {
                println!(
                    "  → {} ({}×{} px, {} dpi, {}) in {:.0}ms",
                    summary.output.display(),
                    summary.width_px,
                    summary.height_px,
                    summary.dpi,
                    summary.layout.chosen.name(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            tracing::error!("cli failed: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// The whole pipeline, minus process concerns.
pub fn execute(args: &CliArgs) -> Result<RunSummary, CliError> {
    let settings = match &args.settings {
        Some(path) => EngineSettings::load_from(path)?,
        None => EngineSettings::load(),
    };
    let rules = match &args.rules {
        Some(path) => JournalRules::load(path)?,
        None => JournalRules::built_in(),
    };
    let fonts = FontCache::system().shared();

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        return Err(CliError::Usage("no input files matched the given pattern(s).".into()));
    }

    let mut project = if is_project_file(&inputs[0]) {
        if inputs.len() > 1 {
            return Err(CliError::Usage("a project file must be the only input.".into()));
        }
        io::load_project(&inputs[0], &fonts, settings.bake_max_dimension)?
    } else {
        import_images(&inputs, &settings, args.verbose)?
    };

    if let Some(index) = args.figure
        && !project.set_active_figure(index)
    {
        return Err(CliError::Usage(format!(
            "figure {} does not exist (project has {}).",
            index,
            project.figures.len()
        )));
    }
    apply_overrides(&mut project, args, &settings)?;

    let Some(figure) = project.active_figure() else {
        return Err(CliError::Usage("project has no figures.".into()));
    };
    if figure.panels.is_empty() {
        return Err(CliError::Usage("the selected figure has no panels.".into()));
    }

    let format = parse_format(args.format.as_deref(), args.output.as_deref())?;
    let output = build_output_path(&inputs[0], args.output.as_deref(), format);
    let opts = ExportOptions {
        format,
        dpi: figure.settings.dpi,
        quality: clamp_quality(args.quality.unwrap_or(settings.jpeg_quality)),
        batch_size: settings.export_batch_size,
        max_dimension: settings.bake_max_dimension,
    };
    let panels = figure.panels.len();

    let job = ExportJob::spawn(figure.clone(), Arc::new(rules), opts, fonts, None);
    let exported = job.wait()?;
    std::fs::write(&output, &exported.bytes).map_err(|source| CliError::Write { path: output.clone(), source })?;
    tracing::info!(output = %output.display(), "figure written");

    if let Some(path) = &args.save_project {
        io::save_project(&mut project, path)?;
    }

    let summary = RunSummary {
        output,
        format: format.extension(),
        width_px: exported.width,
        height_px: exported.height,
        dpi: exported.dpi,
        panels,
        layout: exported.report,
    };
    if let Some(target) = &args.report {
        write_report(target, &summary)?;
    }
    Ok(summary)
}

// ============================================================================
// Helpers
// ============================================================================

fn import_images(inputs: &[PathBuf], settings: &EngineSettings, verbose: bool) -> Result<Project, CliError> {
    let mut project = Project::new_untitled(1);
    let opts = io::ImportOptions {
        tiff_convert_threshold_bytes: settings.tiff_convert_threshold_bytes,
        max_dimension: settings.bake_max_dimension,
        ..io::ImportOptions::default()
    };
    let total = inputs.len();
    for (idx, path) in inputs.iter().enumerate() {
        if verbose {
            println!("[{}/{}] {}", idx + 1, total, path.display());
        }
        let imported = io::import_path(path, &opts)?;
        if let Some(figure) = project.active_figure_mut() {
            imported.add_to(figure);
        }
    }
    if let Some(figure) = project.active_figure_mut() {
        figure.settings.journal = settings.default_journal.clone();
        figure.settings.dpi = settings.default_dpi;
    }
    Ok(project)
}

fn apply_overrides(project: &mut Project, args: &CliArgs, settings: &EngineSettings) -> Result<(), CliError> {
    let layout = match args.layout.as_deref() {
        Some(s) => Some(LayoutChoice::parse(s).ok_or_else(|| CliError::Usage(format!("unknown layout '{}'.", s)))?),
        None => None,
    };
    let target = match args.target.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("single") | Some("1") => Some(TargetWidth::Single),
        Some("double") | Some("2") => Some(TargetWidth::Double),
        Some(other) => return Err(CliError::Usage(format!("unknown target width '{}'.", other))),
        None => None,
    };
    let Some(figure) = project.active_figure_mut() else { return Ok(()) };
    figure.update_settings(|s| {
        if let Some(journal) = &args.journal {
            s.journal = journal.clone();
        }
        if let Some(layout) = layout {
            s.layout = layout;
        }
        if let Some(target) = target {
            s.target_width = target;
        }
        s.dpi = crate::export::clamp_dpi(args.dpi.unwrap_or(if s.dpi > 0 { s.dpi } else { settings.default_dpi }));
    });
    Ok(())
}

fn is_project_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PROJECT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn write_report(target: &str, summary: &RunSummary) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(summary).map_err(ProjectError::from)?;
    if target == "-" {
        println!("{}", json);
        return Ok(());
    }
    let path = PathBuf::from(target);
    std::fs::write(&path, json).map_err(|source| CliError::Write { path, source })
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            // Literal path: use directly
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        // Treat as glob pattern; keep only files we can import
        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    let importable = entry
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| IMPORT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
                    if importable && !result.contains(&entry) {
                        result.push(entry);
                        matched = true;
                    }
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no image files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Choose the export format from `--format` or the output extension.
/// Defaults to PNG when neither is given.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> Result<ExportFormat, CliError> {
    if let Some(f) = format_arg {
        return ExportFormat::parse(f).ok_or_else(|| CliError::Usage(format!("unknown format '{}'.", f)));
    }
    Ok(output.and_then(ExportFormat::from_path).unwrap_or(ExportFormat::Png))
}

/// `--output` when given, otherwise `<stem>_figure.<ext>` next to the first input.
fn build_output_path(first_input: &Path, output: Option<&Path>, format: ExportFormat) -> PathBuf {
    if let Some(out) = output {
        return out.to_path_buf();
    }
    let stem = first_input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "figure".to_string());
    let parent = first_input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}_figure.{}", stem, format.extension()))
}
