//! Session logger: routes `log` records to a single file in the OS data
//! directory, through `simplelog`.
//!
//! The file is **truncated at each launch**, so it only ever holds output
//! from the most recent session.
//!
//! Log location: `<data dir>/ArtRelief/artrelief.log`
//!   Windows:  `%APPDATA%\ArtRelief\artrelief.log`
//!   Linux:    `~/.local/share/ArtRelief/artrelief.log`
//!   macOS:    `~/Library/Application Support/ArtRelief/artrelief.log`
//!
//! Level comes from `ARTRELIEF_LOG` (`error`..`trace`, default `info`).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode, WriteLogger};

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Install the session logger. Safe to call more than once; only the first
/// call takes effect.
///
/// * Creates (or truncates) the log file and writes the session header.
/// * Echoes records to stderr when `echo_stderr` is set.
/// * Installs a panic hook that records the panic before the default handler.
pub fn init(echo_stderr: bool) {
    let level = level_from_env();
    let path = log_file_path();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    match open_session_file(&path) {
        Ok(file) => {
            let _ = LOG_PATH.set(path);
            loggers.push(WriteLogger::new(level, Config::default(), file));
        }
        // Not fatal; keep going with stderr only.
        Err(e) => eprintln!("[logger] Failed to open log file {:?}: {}", path, e),
    }
    if echo_stderr {
        loggers.push(TermLogger::new(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto));
    }
    if loggers.is_empty() || CombinedLogger::init(loggers).is_err() {
        return;
    }

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!(target: "panic", "PANIC: {}", info);
        log::logger().flush();
        prev(info);
    }));
}

/// Truncate `path` (creating parent directories) and write the header.
fn open_session_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    writeln!(
        file,
        "=== ArtRelief session started {} ===\nLog file: {}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        path.display()
    )?;
    Ok(file)
}

fn parse_level(value: Option<&str>) -> LevelFilter {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(LevelFilter::Info)
}

fn level_from_env() -> LevelFilter {
    parse_level(std::env::var("ARTRELIEF_LOG").ok().as_deref())
}

fn log_file_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ArtRelief")
        .join("artrelief.log")
}
