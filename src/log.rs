//! Logging.
//!
//! All diagnostic output, including the access log, goes through the `log`
//! facade. This module provides the backend that is installed as the
//! process-wide logger.

use std::{fs, io, process};
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use log::{LevelFilter, error};
use crate::config::LogTarget;
use crate::error::Failed;
use crate::utils::date::format_local_iso_date;
use crate::utils::sync::Mutex;


//------------ Logger --------------------------------------------------------

/// Format and write log messages.
pub struct Logger {
    /// Where to write messages to.
    target: Mutex<LogBackend>,

    /// The maximum log level.
    log_level: log::LevelFilter,
}

/// The actual target for logging
enum LogBackend {
    #[cfg(unix)]
    Syslog(SyslogLogger),
    File {
        file: fs::File,
        path: PathBuf,
    },
    Stderr {
        stderr: io::Stderr,
    }
}

impl Logger {
    /// Initialize logging.
    ///
    /// All diagnostic output of Ran is done via logging, never to stderr
    /// directly. Thus, it is important to initialize logging before doing
    /// anything else that may result in such output. This function does
    /// exactly that. It sets a maximum log level of `warn`, leading only
    /// printing important information, and directs all logging to stderr.
    pub fn init() -> Result<(), Failed> {
        log::set_max_level(LevelFilter::Warn);
        if let Err(err) = log::set_logger(&GLOBAL_LOGGER) {
            eprintln!("Failed to initialize logger: {err}.\nAborting.");
            return Err(Failed)
        }
        Ok(())
    }

    /// Switches logging to the configured target.
    ///
    /// Once the configuration has been successfully loaded, logging should
    /// be switched to whatever the user asked for via this method.
    pub fn switch_logging(
        target: &LogTarget, log_level: LevelFilter,
    ) -> Result<(), Failed> {
        let logger = Logger::new(target, log_level)?;
        GLOBAL_LOGGER.switch(logger);
        log::set_max_level(log_level);
        Ok(())
    }

    /// Flushes whatever logger is currently in use.
    pub fn flush_global() {
        log::logger().flush()
    }

    /// Creates a new logger for the given target.
    fn new(
        target: &LogTarget, log_level: LevelFilter,
    ) -> Result<Self, Failed> {
        let target = match *target {
            #[cfg(unix)]
            LogTarget::Syslog(facility) => {
                SyslogLogger::new(facility).map(LogBackend::Syslog)?
            }
            LogTarget::File(ref path) => {
                Self::new_file_target(path.clone())?
            }
            LogTarget::Stderr => {
                LogBackend::Stderr { stderr: io::stderr() }
            }
        };
        Ok(Self {
            target: Mutex::new(target),
            log_level,
        })
    }

    fn new_file_target(path: PathBuf) -> Result<LogBackend, Failed> {
        Ok(LogBackend::File {
            file: match Self::open_log_file(&path) {
                Ok(file) => file,
                Err(err) => {
                    error!(
                        "Failed to open log file '{}': {}",
                        path.display(), err
                    );
                    return Err(Failed)
                }
            },
            path
        })
    }

    /// Opens a log file.
    fn open_log_file(path: &Path) -> Result<fs::File, io::Error> {
        fs::OpenOptions::new().create(true).append(true).open(path)
    }

    /// Logs a message.
    ///
    /// This method may exit the whole process if logging fails.
    fn log(&self, record: &log::Record) {
        if self.should_ignore(record) {
            return;
        }

        if let Err(err) = self.try_log(record) {
            self.log_failure(err);
        }
    }

    /// Tries logging a message and returns an error if there is one.
    ///
    /// Each message is written with a single call while the target is
    /// locked, so lines from concurrent requests never interleave.
    fn try_log(&self, record: &log::Record) -> Result<(), io::Error> {
        match self.target.lock().deref_mut() {
            #[cfg(unix)]
            LogBackend::Syslog(ref mut logger) => logger.log(record),
            LogBackend::File { ref mut file, .. } => {
                writeln!(
                    file, "[{}] [{}] {}",
                    format_local_iso_date(chrono::Local::now()),
                    record.level(),
                    record.args()
                )
            }
            LogBackend::Stderr { ref mut stderr } => {
                // We never fail when writing to stderr.
                let _ = writeln!(
                    stderr.lock(), "[{}] [{}] {}",
                    format_local_iso_date(chrono::Local::now()),
                    record.level(),
                    record.args()
                );
                Ok(())
            }
        }
    }

    /// Handles an error that happened during logging.
    fn log_failure(&self, err: io::Error) -> ! {
        // We try to write a meaningful message to stderr and then abort.
        match self.target.lock().deref() {
            #[cfg(unix)]
            LogBackend::Syslog(_) => {
                eprintln!("Logging to syslog failed: {err}. Exiting.");
            }
            LogBackend::File { ref path, .. } => {
                eprintln!(
                    "Logging to file {} failed: {}. Exiting.",
                    path.display(),
                    err
                );
            }
            LogBackend::Stderr { ..  } => {
                // We never fail when writing to stderr.
            }
        }
        process::exit(1)
    }

    /// Flushes the logging backend.
    fn flush(&self) {
        match self.target.lock().deref_mut() {
            #[cfg(unix)]
            LogBackend::Syslog(ref mut logger) => logger.flush(),
            LogBackend::File { ref mut file, .. } => {
                let _ = file.flush();
            }
            LogBackend::Stderr { ref mut stderr } => {
                let _  = stderr.lock().flush();
            }
        }
    }

    /// Determines whether a log record should be ignored.
    ///
    /// This filters out messages by libraries that we don’t really want to
    /// see.
    fn should_ignore(&self, record: &log::Record) -> bool {
        should_ignore(self.log_level, record)
    }
}

/// Determines whether a record from a library should be dropped.
fn should_ignore(log_level: LevelFilter, record: &log::Record) -> bool {
    let module = match record.module_path() {
        Some(module) => module,
        None => return false,
    };

    // log::Level sorts more important first.

    if record.level() > log::Level::Error {
        // From rustls, only log errors.
        if module.starts_with("rustls") {
            return true
        }
    }
    if log_level >= log::LevelFilter::Trace {
        // Don’t filter anything else if we are in trace.
        return false
    }

    // Ignore these modules unless INFO or more important.
    record.level() > log::Level::Info && (
           module.starts_with("tokio")
        || module.starts_with("hyper")
        || module.starts_with("mio")
    )
}


//------------ SyslogLogger --------------------------------------------------

/// A syslog logger.
///
/// This is essentially [`syslog::BasicLogger`] but that one keeps the logger
/// behind a mutex – which we already do – and doesn’t return error – which
/// we do want to see.
#[cfg(unix)]
struct SyslogLogger(
    syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>
);

#[cfg(unix)]
impl SyslogLogger {
    /// Creates a new syslog logger.
    fn new(facility: syslog::Facility) -> Result<Self, Failed> {
        let process = std::env::current_exe().ok().and_then(|path|
            path.file_name()
                .and_then(std::ffi::OsStr::to_str)
                .map(ToString::to_string)
        ).unwrap_or_else(|| String::from("ran"));
        let formatter = syslog::Formatter3164 {
            facility,
            hostname: None,
            process,
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter.clone()).or_else(|_| {
            syslog::tcp(formatter.clone(), ("127.0.0.1", 601))
        }).or_else(|_| {
            syslog::udp(formatter, ("127.0.0.1", 0), ("127.0.0.1", 514))
        });
        match logger {
            Ok(logger) => Ok(Self(logger)),
            Err(err) => {
                error!("Cannot connect to syslog: {err}");
                Err(Failed)
            }
        }
    }

    /// Tries logging.
    fn log(&mut self, record: &log::Record) -> Result<(), io::Error> {
        match record.level() {
            log::Level::Error => self.0.err(record.args()),
            log::Level::Warn => self.0.warning(record.args()),
            log::Level::Info => self.0.info(record.args()),
            log::Level::Debug => self.0.debug(record.args()),
            log::Level::Trace => {
                // Syslog doesn’t have trace, use debug instead.
                self.0.debug(record.args())
            }
        }.map_err(|err| {
            match err {
                syslog::Error::Io(err) => err,
                err => io::Error::other(err),
            }
        })
    }

    /// Flushes the logger.
    ///
    /// Ignores any errors.
    fn flush(&mut self) {
        let _ = self.0.backend.flush();
    }
}


//------------ GlobalLogger --------------------------------------------------

/// The global logger.
///
/// A value of this type can go into a static. Until a proper logger is
/// installed, it just writes all log output to stderr.
struct GlobalLogger {
    /// The real logger. Can only be set once.
    inner: OnceLock<Logger>,
}

/// The static for the log crate.
static GLOBAL_LOGGER: GlobalLogger = GlobalLogger::new();

impl GlobalLogger {
    /// Creates a new provisional logger.
    const fn new() -> Self {
        GlobalLogger { inner: OnceLock::new() }
    }

    /// Switches to the proper logger.
    fn switch(&self, logger: Logger) {
        if self.inner.set(logger).is_err() {
            panic!("Tried to switch logger more than once.")
        }
    }
}


impl log::Log for GlobalLogger {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        match self.inner.get() {
            Some(logger) => logger.log(record),
            None => {
                if should_ignore(log::max_level(), record) {
                    return
                }
                let _ = writeln!(
                    io::stderr().lock(), "[{}] {}",
                    record.level(), record.args()
                );
            }
        }
    }

    fn flush(&self) {
        match self.inner.get() {
            Some(logger) => logger.flush(),
            None => {
                let _ = io::stderr().lock().flush();
            }
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    fn record_from(
        module: &'static str, level: log::Level,
    ) -> bool {
        should_ignore(
            LevelFilter::Info,
            &log::Record::builder()
                .level(level)
                .module_path_static(Some(module))
                .args(format_args!("test"))
                .build()
        )
    }

    #[test]
    fn library_noise_is_filtered() {
        assert!(record_from("hyper::proto", log::Level::Debug));
        assert!(!record_from("hyper::proto", log::Level::Info));
        assert!(record_from("rustls::server", log::Level::Warn));
        assert!(!record_from("rustls::server", log::Level::Error));
        assert!(!record_from("ran::http::log", log::Level::Debug));
    }

    #[test]
    fn file_target_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ran.log");
        fs::write(&path, "existing\n").unwrap();
        let logger = Logger::new(
            &LogTarget::File(path.clone()), LevelFilter::Info
        ).unwrap();
        logger.log(
            &log::Record::builder()
                .level(log::Level::Info)
                .args(format_args!("Access #abc"))
                .build()
        );
        logger.flush();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("existing\n"));
        assert!(content.trim_end().ends_with("[INFO] Access #abc"));
    }
}
