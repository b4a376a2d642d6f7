//! Centralized logging configuration for the benchmark harness.
//!
//! # Architecture
//!
//! - **LogConfig**: Thread-safe global configuration using atomic operations
//! - **LogLevel**: Hierarchical log levels (Off < Error < Warn < Info < Debug < Trace)
//! - **LogCategory**: Harness components (CPU, Ports, VDP, Clock, Runner, Stubs)
//! - **log()**: Common logging function for all output with async file I/O
//!
//! Messages are built lazily and only when the category is enabled, so a
//! benchmark run with logging off pays a single atomic load per call site.
//! File output goes through a background thread so the timed section of a run
//! never blocks on disk.
//!
//! # Usage
//!
//! ```rust
//! use z80bench_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Vdp, LogLevel::Debug, || {
//!     format!("VDP: address set to {:04X}", 0x3FFF)
//! });
//! ```

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const CATEGORY_COUNT: usize = 6;

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Log category for the harness components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Instruction execution in the CPU engine
    Cpu,
    /// Port reads and writes seen by installed hooks
    Ports,
    /// Video peripheral register and VRAM traffic
    Vdp,
    /// Cycle accounting and stop requests
    Clock,
    /// Benchmark setup, loading and comparison
    Runner,
    /// Unimplemented opcodes or features
    Stubs,
}

impl LogCategory {
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::Cpu,
        LogCategory::Ports,
        LogCategory::Vdp,
        LogCategory::Clock,
        LogCategory::Runner,
        LogCategory::Stubs,
    ];

    fn index(self) -> usize {
        match self {
            LogCategory::Cpu => 0,
            LogCategory::Ports => 1,
            LogCategory::Vdp => 2,
            LogCategory::Clock => 3,
            LogCategory::Runner => 4,
            LogCategory::Stubs => 5,
        }
    }

    /// Parse a category name (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Some(LogCategory::Cpu),
            "ports" | "io" => Some(LogCategory::Ports),
            "vdp" | "video" => Some(LogCategory::Vdp),
            "clock" => Some(LogCategory::Clock),
            "runner" => Some(LogCategory::Runner),
            "stubs" => Some(LogCategory::Stubs),
            _ => None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicked writer leaves the data usable; logging keeps going
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sliding-window rate limiter, one window per category
struct RateLimiter {
    max_logs_per_second: AtomicUsize,
    window_duration: Duration,
    timestamps: Mutex<[VecDeque<Instant>; CATEGORY_COUNT]>,
    dropped_counts: Mutex<[usize; CATEGORY_COUNT]>,
    last_drop_report: Mutex<[Option<Instant>; CATEGORY_COUNT]>,
}

impl RateLimiter {
    fn new(max_logs_per_second: usize) -> Self {
        Self {
            max_logs_per_second: AtomicUsize::new(max_logs_per_second),
            window_duration: Duration::from_secs(1),
            timestamps: Mutex::new(Default::default()),
            dropped_counts: Mutex::new([0; CATEGORY_COUNT]),
            last_drop_report: Mutex::new([None; CATEGORY_COUNT]),
        }
    }

    /// Returns (allowed, dropped_count); dropped_count is Some(n) when drops should be reported
    fn should_allow(&self, category: LogCategory) -> (bool, Option<usize>) {
        let now = Instant::now();
        let idx = category.index();

        let mut timestamps = lock(&self.timestamps);
        let mut dropped_counts = lock(&self.dropped_counts);
        let mut last_drop_report = lock(&self.last_drop_report);

        let window = &mut timestamps[idx];
        while let Some(&front) = window.front() {
            if now.duration_since(front) > self.window_duration {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < self.max_logs_per_second.load(Ordering::Relaxed) {
            window.push_back(now);

            let dropped = dropped_counts[idx];
            if dropped > 0 {
                dropped_counts[idx] = 0;
                last_drop_report[idx] = Some(now);
                return (true, Some(dropped));
            }
            (true, None)
        } else {
            dropped_counts[idx] += 1;

            let should_report = match last_drop_report[idx] {
                None => true,
                Some(last) => now.duration_since(last) >= Duration::from_secs(1),
            };
            if should_report {
                let dropped = dropped_counts[idx];
                dropped_counts[idx] = 0;
                last_drop_report[idx] = Some(now);
                (false, Some(dropped))
            } else {
                (false, None)
            }
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    /// Applies to every category without its own level
    global_level: AtomicU8,
    category_levels: [AtomicU8; CATEGORY_COUNT],
    log_sender: Mutex<Option<Sender<String>>>,
    log_writer: Mutex<Option<JoinHandle<()>>>,
    file_logging_enabled: AtomicBool,
    rate_limiter: RateLimiter,
}

impl LogConfig {
    /// All logging off, 60 messages per second per category
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: Default::default(),
            log_sender: Mutex::new(None),
            log_writer: Mutex::new(None),
            file_logging_enabled: AtomicBool::new(false),
            rate_limiter: RateLimiter::new(60),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category with its own level uses it; otherwise the global level decides
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.get_global_level()
        }
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    /// Set the maximum logs per second per category
    pub fn set_rate_limit(&self, max_logs_per_second: usize) {
        self.rate_limiter
            .max_logs_per_second
            .store(max_logs_per_second, Ordering::Relaxed);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.rate_limiter.max_logs_per_second.load(Ordering::Relaxed)
    }

    /// Send log output to a file, written by a background thread.
    ///
    /// Replaces any previous log file, which is closed first. Fails if the
    /// file cannot be opened.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.clear_log_file();

        let (sender, receiver) = channel::<String>();
        let writer = thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                let mut file = file;
                while let Ok(message) = receiver.recv() {
                    let _ = writeln!(file, "{}", message);
                    let _ = file.flush();
                }
                let _ = file.flush();
            })?;

        *lock(&self.log_sender) = Some(sender);
        *lock(&self.log_writer) = Some(writer);
        self.file_logging_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Close the log file and go back to stderr.
    ///
    /// Blocks until the writer thread has written every queued message, so
    /// call this before the process exits.
    pub fn clear_log_file(&self) {
        self.file_logging_enabled.store(false, Ordering::Relaxed);
        drop(lock(&self.log_sender).take());
        let writer = lock(&self.log_writer).take();
        if let Some(writer) = writer {
            let _ = writer.join();
        }
    }

    fn write_message(&self, message: &str) {
        if self.file_logging_enabled.load(Ordering::Relaxed) {
            let log_sender = lock(&self.log_sender);
            match *log_sender {
                Some(ref sender) if sender.send(message.to_string()).is_ok() => {}
                _ => eprintln!("{}", message),
            }
        } else {
            eprintln!("{}", message);
        }
    }
}

/// Log a message with the specified category and level.
///
/// `message_fn` only runs when the category is enabled at `level` and the
/// category is under its rate limit. Dropped messages are summarized at most
/// once per second.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if config.should_log(category, level) {
        let (allowed, dropped_count) = config.rate_limiter.should_allow(category);

        if let Some(count) = dropped_count {
            if count > 0 {
                let warning = format!(
                    "[{:?}] WARNING: Rate limit exceeded, {} log message(s) dropped in the last second",
                    category, count
                );
                config.write_message(&warning);
            }
        }

        if allowed {
            let message = message_fn();
            config.write_message(&message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_str("ERR"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("Warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("3"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("loud"), None);
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(LogCategory::from_str("VDP"), Some(LogCategory::Vdp));
        assert_eq!(LogCategory::from_str("io"), Some(LogCategory::Ports));
        assert_eq!(LogCategory::from_str("clock"), Some(LogCategory::Clock));
        assert_eq!(LogCategory::from_str("ppu"), None);
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Off < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_category_levels_are_independent() {
        let config = LogConfig::new();
        assert_eq!(config.get_level(LogCategory::Cpu), LogLevel::Off);

        config.set_level(LogCategory::Vdp, LogLevel::Debug);
        assert_eq!(config.get_level(LogCategory::Vdp), LogLevel::Debug);
        assert_eq!(config.get_level(LogCategory::Clock), LogLevel::Off);
    }

    #[test]
    fn test_category_level_overrides_global() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Error);
        config.set_level(LogCategory::Runner, LogLevel::Debug);

        assert!(config.should_log(LogCategory::Runner, LogLevel::Debug));
        assert!(!config.should_log(LogCategory::Ports, LogLevel::Warn));
        assert!(config.should_log(LogCategory::Ports, LogLevel::Error));
    }

    #[test]
    fn test_reset() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Trace);
        config.set_level(LogCategory::Stubs, LogLevel::Info);

        config.reset();

        assert_eq!(config.get_global_level(), LogLevel::Off);
        assert_eq!(config.get_level(LogCategory::Stubs), LogLevel::Off);
    }

    #[test]
    fn test_rate_limiter_blocks_over_limit() {
        let limiter = RateLimiter::new(60);
        for _ in 0..60 {
            let (allowed, _) = limiter.should_allow(LogCategory::Cpu);
            assert!(allowed);
        }

        let (allowed, dropped) = limiter.should_allow(LogCategory::Cpu);
        assert!(!allowed, "61st message in the window should be dropped");
        assert_eq!(dropped, Some(1));
    }

    #[test]
    fn test_rate_limiter_per_category() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            limiter.should_allow(LogCategory::Vdp);
        }

        let (allowed, _) = limiter.should_allow(LogCategory::Vdp);
        assert!(!allowed);
        let (allowed, _) = limiter.should_allow(LogCategory::Clock);
        assert!(allowed, "other categories keep their own window");
    }

    #[test]
    fn test_rate_limit_setting() {
        let config = LogConfig::new();
        assert_eq!(config.get_rate_limit(), 60);
        config.set_rate_limit(10);
        assert_eq!(config.get_rate_limit(), 10);
    }

    #[test]
    fn test_log_file_receives_messages() {
        let path = std::env::temp_dir().join("z80bench_core_log_file_test.log");
        let _ = std::fs::remove_file(&path);

        let config = LogConfig::new();
        config.set_log_file(path.clone()).expect("open log file");
        config.write_message("first line");
        config.clear_log_file();

        let contents = std::fs::read_to_string(&path).expect("read log file");
        assert_eq!(contents, "first line\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_clear_log_file_flushes_queued_messages() {
        let path = std::env::temp_dir().join("z80bench_core_log_flush_test.log");
        let _ = std::fs::remove_file(&path);

        let config = LogConfig::new();
        config.set_log_file(path.clone()).expect("open log file");
        for i in 0..500 {
            config.write_message(&format!("message {}", i));
        }
        config.write_message("Finished: last line");
        config.clear_log_file();

        // Nothing is read back until clear_log_file returns
        let contents = std::fs::read_to_string(&path).expect("read log file");
        assert_eq!(contents.lines().count(), 501);
        assert_eq!(contents.lines().last(), Some("Finished: last line"));
        assert!(lock(&config.log_writer).is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_replacing_log_file_closes_the_previous_one() {
        let dir = std::env::temp_dir();
        let first = dir.join("z80bench_core_log_first.log");
        let second = dir.join("z80bench_core_log_second.log");
        let _ = std::fs::remove_file(&first);
        let _ = std::fs::remove_file(&second);

        let config = LogConfig::new();
        config.set_log_file(first.clone()).expect("open first log");
        config.write_message("to first");
        config.set_log_file(second.clone()).expect("open second log");
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "to first\n");

        config.write_message("to second");
        config.clear_log_file();
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "to second\n");

        let _ = std::fs::remove_file(&first);
        let _ = std::fs::remove_file(&second);
    }
}
