//! User-facing run logging.
//!
//! Console output with verbosity levels and a progress bar over the input
//! rows; `tracing` handles the diagnostic log file separately. Messages
//! can additionally be buffered and exported to a plain-text file.

use colored::{control, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    /// Progress bar and final summary only
    Silent = 0,
    /// High-level run progress (default)
    Summary = 1,
    /// Per-row detail, warnings
    Detailed = 2,
    /// Everything
    Debug = 3,
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }
}

#[derive(Clone)]
pub struct PipelineLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<String>,
    color_enabled: bool,
}

impl PipelineLogger {
    fn should_enable_colors(no_color_flag: bool) -> bool {
        if std::env::var("NO_COLOR").is_ok() {
            return false;
        }
        if no_color_flag {
            return false;
        }
        std::io::stdout().is_terminal()
    }

    pub fn new(verbosity: VerbosityLevel, no_color: bool) -> Self {
        let color_enabled = Self::should_enable_colors(no_color);
        control::set_override(color_enabled);
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
            color_enabled,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: String, no_color: bool) -> Self {
        let mut logger = Self::new(verbosity, no_color);
        logger.log_file_path = Some(log_file_path);
        logger
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    /// Errors always surface regardless of verbosity.
    pub fn error(&self, message: &str) {
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    pub fn success(&self, message: &str) {
        self.print_message("SUCCESS", message);
    }

    fn print_message(&self, level: &str, message: &str) {
        let timestamp = self.timestamp();
        let plain = format!("[{}] {}: {}", timestamp, level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(plain.clone());
            }
        }

        let display = if self.color_enabled {
            let ts = timestamp.dimmed();
            let (lvl, msg) = match level {
                "INFO" => (level.cyan().bold(), message.cyan()),
                "WARN" => (level.yellow().bold(), message.yellow()),
                "ERROR" => (level.red().bold(), message.red()),
                "DEBUG" => (level.dimmed().bold(), message.dimmed()),
                "SUCCESS" => (level.bright_green().bold(), message.bright_green()),
                _ => (level.normal().bold(), message.normal()),
            };
            format!("[{}] {}: {}", ts, lvl, msg)
        } else {
            plain.clone()
        };

        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(&display);
                return;
            }
        }
        eprintln!("{}", display);
    }

    fn timestamp(&self) -> String {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let secs = now.as_secs();
        format!(
            "{:02}:{:02}:{:02}.{:03}",
            (secs / 3600) % 24,
            (secs % 3600) / 60,
            secs % 60,
            now.subsec_millis()
        )
    }

    pub async fn start_progress(&self, total_steps: u64) {
        let pb = ProgressBar::new(total_steps);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("Starting...");
        let mut guard = self.progress_bar.write().await;
        *guard = Some(pb);
    }

    pub async fn update_progress(&self, message: &str) {
        let guard = self.progress_bar.read().await;
        if let Some(pb) = guard.as_ref() {
            pb.set_message(message.to_string());
        }
    }

    pub async fn advance_progress(&self, steps: u64) {
        let guard = self.progress_bar.read().await;
        if let Some(pb) = guard.as_ref() {
            pb.inc(steps);
        }
    }

    pub async fn finish_progress(&self, message: &str) {
        let mut guard = self.progress_bar.write().await;
        if let Some(pb) = guard.take() {
            pb.finish_with_message(message.to_string());
        }
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Write the buffered plain-text messages to the configured log file.
    pub fn export_logs(&self) -> std::io::Result<()> {
        let Some(path) = &self.log_file_path else {
            return Ok(());
        };
        let buffer = self
            .log_buffer
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "log buffer poisoned"))?;
        let mut file = OpenOptions::new().create(true).truncate(true).write(true).open(path)?;
        for line in buffer.iter() {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_count() {
        assert_eq!(VerbosityLevel::from_verbose_count(0), VerbosityLevel::Summary);
        assert_eq!(VerbosityLevel::from_verbose_count(1), VerbosityLevel::Detailed);
        assert_eq!(VerbosityLevel::from_verbose_count(2), VerbosityLevel::Debug);
        assert_eq!(VerbosityLevel::from_verbose_count(9), VerbosityLevel::Debug);
    }

    #[test]
    fn test_log_buffer_only_fills_with_log_file() {
        let logger = PipelineLogger::new(VerbosityLevel::Debug, true);
        logger.info("not buffered");
        assert_eq!(logger.get_log_count(), 0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let logger = PipelineLogger::with_log_file(
            VerbosityLevel::Debug,
            path.to_string_lossy().to_string(),
            true,
        );
        logger.info("buffered");
        logger.error("also buffered");
        assert_eq!(logger.get_log_count(), 2);

        logger.export_logs().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("buffered"));
        assert!(content.contains("ERROR"));
    }
}
