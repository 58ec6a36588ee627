//! Per-session log file fed by `tracing`.
//!
//! Each run truncates the file, so it holds one session's events.
//!
//! Log location:
//!   Windows:  `%APPDATA%\FigComposer\figcomposer.log`
//!   Linux:    `~/.local/share/FigComposer/figcomposer.log`
//!   macOS:    `~/Library/Application Support/FigComposer/figcomposer.log`
//!
//! Library code logs through the `tracing` macros; [`init`] installs the
//! subscriber that writes them here (and, at a configurable level, to stderr).
//! Panics are mirrored into the file by a hook.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Append a raw line to the session file. I/O errors are ignored.
pub fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// `io::Write` handle onto the session file, handed to the fmt subscriber.
struct SessionWriter;

impl Write for SessionWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match LOG_FILE.get().map(|m| m.lock()) {
            Some(Ok(mut file)) => file.write(buf),
            // No file (or a poisoned lock): swallow output.
            _ => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match LOG_FILE.get().map(|m| m.lock()) {
            Some(Ok(mut file)) => file.flush(),
            _ => Ok(()),
        }
    }
}

/// Open the session file and install the subscriber plus panic hook.
///
/// The file receives DEBUG and above; stderr receives `stderr_level` and above.
pub fn init(stderr_level: Level) {
    init_at(&log_file_path(), stderr_level);
}

/// Same as [`init`] with an explicit log file location.
pub fn init_at(path: &Path, stderr_level: Level) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = OpenOptions::new().create(true).write(true).truncate(true).open(path);

    match file {
        Ok(f) => {
            let _ = LOG_PATH.set(path.to_path_buf());
            let _ = LOG_FILE.set(Mutex::new(f));
        }
        Err(e) => {
            eprintln!("figcomposer: cannot open log {}: {e}", path.display());
        }
    }

    write_line(&format!("=== FigComposer session started {} ===", human_timestamp()));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");

    let writer = (|| SessionWriter).and(io::stderr.with_max_level(stderr_level));
    let installed = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_writer(writer)
        .try_init();
    if installed.is_err() {
        write_line("[logger] a tracing subscriber was already installed");
    }

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        prev(info);
    }));
}

pub fn log_file_path() -> PathBuf {
    data_dir().join("FigComposer").join("figcomposer.log")
}

/// Per-user data root for the current platform.
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

/// HH:MM:SS (UTC) within the current day.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => {
            let secs = d.as_secs();
            format!("{:02}:{:02}:{:02}", (secs % 86400) / 3600, (secs % 3600) / 60, secs % 60)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}
