//! Configuration.
//!
//! This module contains two types. [`Options`] holds the raw settings as
//! they were found in a TOML formatted config file and on the command line.
//! Calling [`Options::validate`] checks them and, if all is well, turns
//! them into a [`Config`] that is never changed afterwards.

use std::{env, fmt, fs, io};
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use clap::{ArgAction, ArgMatches, Args, Command, FromArgMatches, Parser};
use log::{LevelFilter, error};
#[cfg(unix)] use syslog::Facility;
use crate::error::Failed;
use crate::http::LogLayout;
use crate::utils::path::normalize;


//------------ Defaults for Some Values --------------------------------------

/// The default HTTP port.
const DEFAULT_PORT: u64 = 8080;

/// The default HTTPS port.
const DEFAULT_TLS_PORT: u64 = 443;

/// The default index file names.
const DEFAULT_INDEX: &[&str] = &["index.html", "index.htm"];

/// The default authentication method.
const DEFAULT_AUTH_METHOD: &str = "basic";

/// The default TLS policy.
const DEFAULT_TLS_POLICY: &str = "only";

/// The default log layout.
const DEFAULT_LOG_LAYOUT: &str = "normal";

/// The default syslog facility.
#[cfg(unix)]
const DEFAULT_SYSLOG_FACILITY: Facility = Facility::LOG_DAEMON;


//------------ Options -------------------------------------------------------

/// The raw, unchecked configuration.
///
/// All values are public and can be accessed directly. Values that need
/// checking before they can be used are kept in a wider type than the final
/// one so that the check has something to complain about. Port numbers are
/// `u64`, while methods, policies, addresses and the log layout are plain
/// strings.
///
/// The two functions [`config_args`] and [`serve_args`] can be used to
/// create the clap application. Its matches can then be used to create the
/// options via [`from_arg_matches`]. The arguments of the serve command are
/// added on top via [`apply_serve_arg_matches`].
///
/// [`config_args`]: #method.config_args
/// [`serve_args`]: #method.serve_args
/// [`from_arg_matches`]: #method.from_arg_matches
/// [`apply_serve_arg_matches`]: #method.apply_serve_arg_matches
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Options {
    /// The directory to serve files from.
    pub root: PathBuf,

    /// The HTTP port.
    pub port: u64,

    /// The addresses to bind to.
    ///
    /// If this is empty, we bind to all IPv4 addresses.
    pub bind_ip: Vec<String>,

    /// The names of index files in order of preference.
    pub index: Vec<String>,

    /// Show a listing for directories without an index file?
    pub listdir: bool,

    /// Compress responses?
    pub gzip: bool,

    /// Ask clients not to cache anything?
    pub no_cache: bool,

    /// Add CORS headers?
    pub cors: bool,

    /// Add the headers necessary for a secure context?
    pub secure_context: bool,

    /// Serve paths with segments starting with a dot?
    pub serve_all: bool,

    /// The custom 404 file, relative to the root.
    pub error_404: Option<String>,

    /// The custom 401 file, relative to the root.
    pub error_401: Option<String>,

    /// User name and password separated by a colon.
    pub auth: Option<String>,

    /// The authentication method.
    pub auth_method: String,

    /// The paths that require authentication.
    ///
    /// If this is empty, all paths do.
    pub auth_paths: Vec<String>,

    /// The path to the TLS certificate file.
    pub tls_cert: Option<PathBuf>,

    /// The path to the TLS private key file.
    pub tls_key: Option<PathBuf>,

    /// The HTTPS port.
    pub tls_port: u64,

    /// How to treat plain HTTP if TLS is enabled.
    pub tls_policy: String,

    /// The layout of access log lines or the name of a preset.
    pub log_layout: String,

    /// The log level set in the config file.
    ///
    /// If this is `None`, each command picks its own default.
    pub log_level: Option<LevelFilter>,

    /// How many times the verbose option was given.
    pub verbose: u8,

    /// How many times the quiet option was given.
    pub quiet: u8,

    /// Where to log to.
    pub log_target: LogTarget,

    /// Log the configuration when starting?
    pub show_conf: bool,
}

impl Options {
    /// Adds the basic arguments to a clapp app.
    ///
    /// The function follows clap’s builder pattern: it takes an app,
    /// adds a bunch of arguments to it and returns it at the end.
    pub fn config_args(app: Command) -> Command {
        GlobalArgs::augment_args(app)
    }

    /// Adds the server arguments to a subcommand.
    ///
    /// These are used by all commands that deal with the server
    /// configuration.
    pub fn serve_args(app: Command) -> Command {
        ServeArgs::augment_args(app)
    }

    /// Creates options from command line matches.
    ///
    /// The function attempts to create the options from the command line
    /// arguments provided via `matches`. It will try to read a config file
    /// if provided via the config file option (`-c` or `--config`). Starts
    /// with the defaults otherwise.
    ///
    /// All relative paths given in command line arguments will be interpreted
    /// relative to `cur_dir`. Conversely, paths in the config file are
    /// treated as relative to the config file’s directory.
    pub fn from_arg_matches(
        matches: &ArgMatches,
        cur_dir: &Path,
    ) -> Result<Self, Failed> {
        let args = GlobalArgs::from_arg_matches(
            matches
        ).expect("bug in command line arguments parser");

        let mut res = match args.config.as_ref() {
            Some(path) => {
                let path = cur_dir.join(path);
                match ConfigFile::read(&path)? {
                    Some(file) => Self::from_config_file(file, cur_dir)?,
                    None => {
                        error!("Cannot read config file {}", path.display());
                        return Err(Failed);
                    }
                }
            }
            None => Self::with_root(cur_dir.into()),
        };
        res.apply_global_args(args, cur_dir)?;
        Ok(res)
    }

    /// Creates the default options serving the given root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Options {
            root,
            port: DEFAULT_PORT,
            bind_ip: Vec::new(),
            index: DEFAULT_INDEX.iter().map(ToString::to_string).collect(),
            listdir: false,
            gzip: true,
            no_cache: false,
            cors: false,
            secure_context: false,
            serve_all: false,
            error_404: None,
            error_401: None,
            auth: None,
            auth_method: DEFAULT_AUTH_METHOD.into(),
            auth_paths: Vec::new(),
            tls_cert: None,
            tls_key: None,
            tls_port: DEFAULT_TLS_PORT,
            tls_policy: DEFAULT_TLS_POLICY.into(),
            log_layout: DEFAULT_LOG_LAYOUT.into(),
            log_level: None,
            verbose: 0,
            quiet: 0,
            log_target: LogTarget::default(),
            show_conf: false,
        }
    }

    /// Applies the global command line arguments.
    fn apply_global_args(
        &mut self,
        args: GlobalArgs,
        cur_dir: &Path,
    ) -> Result<(), Failed> {
        self.apply_log_args(&args, cur_dir)?;
        self.verbose = args.verbose;
        self.quiet = args.quiet;
        Ok(())
    }

    /// Applies the logging-specific command line arguments to the options.
    ///
    /// This is the Unix version that also considers syslog as a valid
    /// target.
    #[cfg(unix)]
    fn apply_log_args(
        &mut self,
        args: &GlobalArgs,
        cur_dir: &Path,
    ) -> Result<(), Failed> {
        if args.syslog {
            if let Some(facility) = args.syslog_facility.as_ref() {
                self.log_target = LogTarget::Syslog(
                    match Facility::from_str(facility) {
                        Ok(value) => value,
                        Err(_) => {
                            error!("Invalid value for syslog-facility.");
                            return Err(Failed);
                        }
                    }
                )
            }
            else if !matches!(self.log_target, LogTarget::Syslog(_)) {
                // If we don’t have a syslog facility already from the config
                // file, we use the default.
                self.log_target = LogTarget::Syslog(DEFAULT_SYSLOG_FACILITY)
            }
        }
        else if let Some(file) = args.logfile.as_ref() {
            if file == "-" {
                self.log_target = LogTarget::Stderr
            }
            else {
                self.log_target = LogTarget::File(cur_dir.join(file))
            }
        }
        Ok(())
    }

    /// Applies the logging-specific command line arguments to the options.
    ///
    /// This is the non-Unix version that does not use syslog.
    #[cfg(not(unix))]
    #[allow(clippy::unnecessary_wraps)]
    fn apply_log_args(
        &mut self,
        args: &GlobalArgs,
        cur_dir: &Path,
    ) -> Result<(), Failed> {
        if let Some(file) = args.logfile.as_ref() {
            if file == "-" {
                self.log_target = LogTarget::Stderr
            }
            else {
                self.log_target = LogTarget::File(cur_dir.join(file))
            }
        }
        Ok(())
    }

    /// Applies the server command line arguments to existing options.
    ///
    /// All paths used in arguments are interpreted relative to `cur_dir`
    /// except for the error files which are relative to the root.
    pub fn apply_serve_arg_matches(
        &mut self,
        matches: &ArgMatches,
        cur_dir: &Path,
    ) -> Result<(), Failed> {
        let args = ServeArgs::from_arg_matches(
            matches
        ).expect("bug in command line arguments parser");

        // root
        if let Some(root) = args.root {
            self.root = cur_dir.join(root)
        }

        // port
        if let Some(port) = args.port {
            self.port = port
        }

        // bind_ip
        if let Some(list) = args.bind_ip {
            self.bind_ip = list
        }

        // index
        if let Some(index) = args.index {
            self.index = index.split(':').map(Into::into).collect()
        }

        // flags
        if args.listdir {
            self.listdir = true
        }
        if args.no_gzip {
            self.gzip = false
        }
        if args.no_cache {
            self.no_cache = true
        }
        if args.cors {
            self.cors = true
        }
        if args.secure_context {
            self.secure_context = true
        }
        if args.serve_all {
            self.serve_all = true
        }
        if args.showconf {
            self.show_conf = true
        }

        // error files
        if let Some(path) = args.error_404 {
            self.error_404 = Some(path)
        }
        if let Some(path) = args.error_401 {
            self.error_401 = Some(path)
        }

        // auth
        if let Some(auth) = args.auth {
            self.auth = Some(auth)
        }
        if let Some(method) = args.auth_method {
            self.auth_method = method
        }
        if let Some(paths) = args.auth_path {
            self.auth_paths = paths
        }

        // tls
        if let Some(path) = args.tls_cert {
            self.tls_cert = Some(cur_dir.join(path))
        }
        if let Some(path) = args.tls_key {
            self.tls_key = Some(cur_dir.join(path))
        }
        if let Some(port) = args.tls_port {
            self.tls_port = port
        }
        if let Some(policy) = args.tls_policy {
            self.tls_policy = policy
        }

        // log_layout
        if let Some(layout) = args.log_layout {
            self.log_layout = layout
        }

        Ok(())
    }

    /// Creates options from a config file.
    ///
    /// Anything not present in the file is set to its default. The root
    /// defaults to `cur_dir`.
    fn from_config_file(
        mut file: ConfigFile, cur_dir: &Path,
    ) -> Result<Self, Failed> {
        let log_target = Self::log_target_from_config_file(&mut file)?;
        let res = Options {
            root: file.take_path("root")?.unwrap_or_else(|| cur_dir.into()),
            port: file.take_u64("port")?.unwrap_or(DEFAULT_PORT),
            bind_ip: file.take_string_array("bind-ip")?.unwrap_or_default(),
            index: match file.take_string_array("index")? {
                Some(index) => index,
                None => {
                    DEFAULT_INDEX.iter().map(ToString::to_string).collect()
                }
            },
            listdir: file.take_bool("listdir")?.unwrap_or(false),
            gzip: file.take_bool("gzip")?.unwrap_or(true),
            no_cache: file.take_bool("no-cache")?.unwrap_or(false),
            cors: file.take_bool("cors")?.unwrap_or(false),
            secure_context: {
                file.take_bool("secure-context")?.unwrap_or(false)
            },
            serve_all: file.take_bool("serve-all")?.unwrap_or(false),
            error_404: file.take_string("error-404")?,
            error_401: file.take_string("error-401")?,
            auth: file.take_string("auth")?,
            auth_method: {
                file.take_string("auth-method")?
                    .unwrap_or_else(|| DEFAULT_AUTH_METHOD.into())
            },
            auth_paths: {
                file.take_string_array("auth-paths")?.unwrap_or_default()
            },
            tls_cert: file.take_path("tls-cert")?,
            tls_key: file.take_path("tls-key")?,
            tls_port: file.take_u64("tls-port")?.unwrap_or(DEFAULT_TLS_PORT),
            tls_policy: {
                file.take_string("tls-policy")?
                    .unwrap_or_else(|| DEFAULT_TLS_POLICY.into())
            },
            log_layout: {
                file.take_string("log-layout")?
                    .unwrap_or_else(|| DEFAULT_LOG_LAYOUT.into())
            },
            log_level: file.take_from_str("log-level")?,
            verbose: 0,
            quiet: 0,
            log_target,
            show_conf: file.take_bool("showconf")?.unwrap_or(false),
        };
        file.check_exhausted()?;
        Ok(res)
    }

    /// Determines the logging target from the config file.
    ///
    /// This is the Unix version that also deals with syslog.
    #[cfg(unix)]
    fn log_target_from_config_file(
        file: &mut ConfigFile
    ) -> Result<LogTarget, Failed> {
        let facility = file.take_string("syslog-facility")?;
        let facility = facility.as_ref().map(AsRef::as_ref)
                               .unwrap_or("daemon");
        let facility = match Facility::from_str(facility) {
            Ok(value) => value,
            Err(_) => {
                error!(
                    "Failed in config file {}: invalid syslog-facility.",
                    file.path.display()
                );
                return Err(Failed);
            }
        };
        let log_target = file.take_string("log")?;
        let log_file = file.take_path("log-file")?;
        match log_target.as_ref().map(AsRef::as_ref) {
            Some("stderr") | None => Ok(LogTarget::Stderr),
            Some("syslog") => Ok(LogTarget::Syslog(facility)),
            Some("file") => {
                match log_file {
                    Some(file) => Ok(LogTarget::File(file)),
                    None => {
                        error!(
                            "Failed in config file {}: \
                             log target \"file\" requires 'log-file' value.",
                            file.path.display()
                        );
                        Err(Failed)
                    }
                }
            }
            Some(value) => {
                error!(
                    "Failed in config file {}: \
                     invalid log target '{}'",
                     file.path.display(),
                     value
                );
                Err(Failed)
            }
        }
    }

    /// Determines the logging target from the config file.
    ///
    /// This is the non-Unix version that only logs to stderr or a file.
    #[cfg(not(unix))]
    fn log_target_from_config_file(
        file: &mut ConfigFile
    ) -> Result<LogTarget, Failed> {
        let log_target = file.take_string("log")?;
        let log_file = file.take_path("log-file")?;
        match log_target.as_ref().map(AsRef::as_ref) {
            Some("stderr") | None => Ok(LogTarget::Stderr),
            Some("file") => {
                match log_file {
                    Some(file) => Ok(LogTarget::File(file)),
                    None => {
                        error!(
                            "Failed in config file {}: \
                             log target \"file\" requires 'log-file' value.",
                            file.path.display()
                        );
                        Err(Failed)
                    }
                }
            }
            Some(value) => {
                error!(
                    "Failed in config file {}: \
                     invalid log target '{}'",
                    file.path.display(), value
                );
                Err(Failed)
            }
        }
    }

    /// Returns the log level to use.
    ///
    /// The level starts out at the one from the config file or, if there
    /// wasn’t one, at `default`. Each verbose option raises it by one step.
    /// A single quiet option reduces it to errors only, two to nothing.
    pub fn log_level(&self, default: LevelFilter) -> LevelFilter {
        if self.quiet > 1 {
            return LevelFilter::Off
        }
        if self.quiet == 1 {
            return LevelFilter::Error
        }
        let mut level = self.log_level.unwrap_or(default);
        for _ in 0..self.verbose {
            level = match level {
                LevelFilter::Off => LevelFilter::Error,
                LevelFilter::Error => LevelFilter::Warn,
                LevelFilter::Warn => LevelFilter::Info,
                LevelFilter::Info => LevelFilter::Debug,
                LevelFilter::Debug | LevelFilter::Trace => LevelFilter::Trace,
            }
        }
        level
    }

    /// Returns whether TLS has been asked for.
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert.is_some() || self.tls_key.is_some()
    }

    /// Returns a TOML representation of the options.
    pub fn to_toml(&self) -> toml::Table {
        let mut res = toml::value::Table::new();
        res.insert("root".into(), self.root.display().to_string().into());
        res.insert("port".into(), toml_int(self.port));
        res.insert("bind-ip".into(), toml_strings(&self.bind_ip));
        res.insert("index".into(), toml_strings(&self.index));
        res.insert("listdir".into(), self.listdir.into());
        res.insert("gzip".into(), self.gzip.into());
        res.insert("no-cache".into(), self.no_cache.into());
        res.insert("cors".into(), self.cors.into());
        res.insert("secure-context".into(), self.secure_context.into());
        res.insert("serve-all".into(), self.serve_all.into());
        if let Some(ref path) = self.error_404 {
            res.insert("error-404".into(), path.clone().into());
        }
        if let Some(ref path) = self.error_401 {
            res.insert("error-401".into(), path.clone().into());
        }
        if let Some(ref auth) = self.auth {
            res.insert("auth".into(), auth.clone().into());
        }
        res.insert("auth-method".into(), self.auth_method.clone().into());
        res.insert("auth-paths".into(), toml_strings(&self.auth_paths));
        if let Some(ref path) = self.tls_cert {
            res.insert("tls-cert".into(), path.display().to_string().into());
        }
        if let Some(ref path) = self.tls_key {
            res.insert("tls-key".into(), path.display().to_string().into());
        }
        res.insert("tls-port".into(), toml_int(self.tls_port));
        res.insert("tls-policy".into(), self.tls_policy.clone().into());
        res.insert("log-layout".into(), self.log_layout.clone().into());
        if let Some(level) = self.log_level {
            res.insert("log-level".into(), level.to_string().into());
        }
        match self.log_target {
            #[cfg(unix)]
            LogTarget::Syslog(facility) => {
                res.insert("log".into(), "syslog".into());
                res.insert(
                    "syslog-facility".into(),
                    facility_to_string(facility).into()
                );
            }
            LogTarget::Stderr => {
                res.insert("log".into(), "stderr".into());
            }
            LogTarget::File(ref file) => {
                res.insert("log".into(), "file".into());
                res.insert(
                    "log-file".into(),
                    file.display().to_string().into()
                );
            }
        }
        res.insert("showconf".into(), self.show_conf.into());
        res
    }
}


//--- Display

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let toml = toml::to_string(&self.to_toml()).map_err(|_| fmt::Error)?;
        f.write_str(&toml)
    }
}


/// # Validation
///
impl Options {
    /// Checks the options and converts them into the final config.
    ///
    /// All problems are collected and returned together, with one exception:
    /// if the root directory is unusable, the remaining checks are skipped
    /// since most of them depend on it.
    pub fn validate(&self) -> Result<Config, ConfigErrors> {
        let mut errors = ConfigErrors::default();

        let port = check_port(&mut errors, self.port, "port");
        let tls_port = if self.tls_enabled() {
            check_port(&mut errors, self.tls_port, "TLS port")
        }
        else {
            None
        };

        if self.index.iter().any(|name| {
            name.chars().any(std::path::is_separator)
        }) {
            errors.push("Filename of index can not include path separators");
        }

        let root = match check_root(&self.root) {
            Ok(root) => root,
            Err(msg) => {
                errors.push(msg);
                return Err(errors)
            }
        };

        let error_404 = self.error_404.as_ref().and_then(|path| {
            ErrorFile::check(&mut errors, &root, path, "404")
        });
        let error_401 = self.error_401.as_ref().and_then(|path| {
            ErrorFile::check(&mut errors, &root, path, "401")
        });

        let auth = self.auth.as_ref().and_then(|auth| {
            Auth::check(&mut errors, auth, &self.auth_method, &self.auth_paths)
        });

        let tls = if self.tls_enabled() {
            Tls::check(&mut errors, self, port, tls_port)
        }
        else {
            None
        };

        let bind = check_bind_ip(&mut errors, &self.bind_ip);

        let log_layout = match LogLayout::from_config(&self.log_layout) {
            Ok(layout) => Some(layout),
            Err(err) => {
                errors.push(format!("Invalid log layout: {}", err));
                None
            }
        };

        match (port, log_layout) {
            (Some(port), Some(log_layout)) if errors.is_empty() => {
                Ok(Config {
                    root,
                    port,
                    bind,
                    index: self.index.clone(),
                    list_dir: self.listdir,
                    gzip: self.gzip,
                    no_cache: self.no_cache,
                    cors: self.cors,
                    secure_context: self.secure_context,
                    serve_all: self.serve_all,
                    error_404,
                    error_401,
                    auth,
                    tls,
                    log_layout,
                    show_conf: self.show_conf,
                })
            }
            _ => Err(errors)
        }
    }
}

/// Checks that a port number is in range.
fn check_port(
    errors: &mut ConfigErrors, port: u64, what: &str
) -> Option<u16> {
    match u16::try_from(port) {
        Ok(port) if port > 0 => Some(port),
        _ => {
            errors.push(format!("Available {} range is 1-65535", what));
            None
        }
    }
}

/// Checks that the root exists and returns its absolute form.
fn check_root(root: &Path) -> Result<PathBuf, String> {
    match fs::metadata(root) {
        Ok(meta) => {
            if !meta.is_dir() {
                return Err(format!(
                    "Root '{}' is not a directory", root.display()
                ))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(format!("Root '{}' does not exist", root.display()))
        }
        Err(err) => {
            return Err(format!(
                "Get stat of root directory '{}' error: {}",
                root.display(), err
            ))
        }
    }
    if root.is_absolute() {
        Ok(normalize(root))
    }
    else {
        match env::current_dir() {
            Ok(dir) => Ok(normalize(&dir.join(root))),
            Err(err) => Err(format!(
                "Can not convert root to absolute form: {}", err
            ))
        }
    }
}

/// Checks the bind addresses.
///
/// If there are none or if an unspecified address is among them, returns a
/// single unspecified address. This is the IPv6 one if all unspecified
/// addresses given are IPv6 and the IPv4 one otherwise.
fn check_bind_ip(
    errors: &mut ConfigErrors, bind_ip: &[String]
) -> Vec<IpAddr> {
    let mut invalid = Vec::new();
    let mut res: Vec<IpAddr> = Vec::new();
    for item in bind_ip.iter().flat_map(|item| item.split(',')) {
        let item = item.trim();
        if item.is_empty() {
            continue
        }
        match IpAddr::from_str(item) {
            Ok(addr) => {
                if !res.contains(&addr) {
                    res.push(addr)
                }
            }
            Err(_) => invalid.push(item),
        }
    }
    if !invalid.is_empty() {
        errors.push(format!("Invalid IP: {}", invalid.join(", ")));
    }
    if res.is_empty() {
        vec![IpAddr::V4(Ipv4Addr::UNSPECIFIED)]
    }
    else if res.iter().any(IpAddr::is_unspecified) {
        let v6_only = res.iter().filter(|addr| {
            addr.is_unspecified()
        }).all(IpAddr::is_ipv6);
        if v6_only {
            vec![IpAddr::V6(Ipv6Addr::UNSPECIFIED)]
        }
        else {
            vec![IpAddr::V4(Ipv4Addr::UNSPECIFIED)]
        }
    }
    else {
        res
    }
}


//------------ Config --------------------------------------------------------

/// The checked configuration of the server.
///
/// A value of this type is created once at startup via
/// [`Options::validate`] and is read-only afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    /// The absolute path of the directory to serve.
    pub root: PathBuf,

    /// The HTTP port.
    pub port: u16,

    /// The addresses to listen on.
    pub bind: Vec<IpAddr>,

    /// The index file names in order of preference.
    pub index: Vec<String>,

    /// Show a listing for directories without an index file?
    pub list_dir: bool,

    /// Compress responses where possible?
    pub gzip: bool,

    /// Ask clients not to cache anything?
    pub no_cache: bool,

    /// Add CORS headers?
    pub cors: bool,

    /// Add the cross-origin isolation headers?
    pub secure_context: bool,

    /// Serve hidden paths?
    pub serve_all: bool,

    /// The custom 404 file.
    pub error_404: Option<ErrorFile>,

    /// The custom 401 file.
    pub error_401: Option<ErrorFile>,

    /// Authentication settings.
    pub auth: Option<Auth>,

    /// TLS settings.
    pub tls: Option<Tls>,

    /// The layout of the access log.
    pub log_layout: LogLayout,

    /// Log the configuration at startup?
    pub show_conf: bool,
}

impl Config {
    /// Returns whether the given root-relative path is an error file.
    pub fn is_error_file(&self, rel: &str) -> bool {
        self.error_404.as_ref().map(|file| file.rel == rel).unwrap_or(false)
        || self.error_401.as_ref().map(|file| file.rel == rel)
            .unwrap_or(false)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn file(file: &Option<ErrorFile>) -> String {
            match file.as_ref() {
                Some(file) => file.abs.display().to_string(),
                None => "<None>".into()
            }
        }

        writeln!(f, "Root: {}", self.root.display())?;
        writeln!(f, "Port: {}", self.port)?;
        writeln!(
            f, "BindIP: {}",
            self.bind.iter().map(ToString::to_string)
                .collect::<Vec<_>>().join(", ")
        )?;
        writeln!(f, "Path404: {}", file(&self.error_404))?;
        writeln!(f, "Path401: {}", file(&self.error_401))?;
        writeln!(f, "IndexName: {}", self.index.join(", "))?;
        writeln!(f, "ListDir: {}", self.list_dir)?;
        writeln!(f, "Gzip: {}", self.gzip)?;
        writeln!(f, "NoCache: {}", self.no_cache)?;
        writeln!(f, "CORS: {}", self.cors)?;
        writeln!(f, "SecureContext: {}", self.secure_context)?;
        writeln!(f, "ServeAll: {}", self.serve_all)?;
        match self.auth.as_ref() {
            Some(auth) => {
                writeln!(f, "Auth: {} ({})", auth.method, auth.username)?;
                if !auth.paths.is_empty() {
                    writeln!(f, "AuthPaths: {}", auth.paths.join(", "))?;
                }
            }
            None => writeln!(f, "Auth: <None>")?,
        }
        match self.tls.as_ref() {
            Some(tls) => {
                writeln!(f, "TLS: port {}, policy {}", tls.port, tls.policy)?;
                writeln!(f, "TLSCert: {}", tls.cert.display())?;
                writeln!(f, "TLSKey: {}", tls.key.display())?;
            }
            None => writeln!(f, "TLS: <None>")?,
        }
        write!(f, "LogLayout: {}", self.log_layout)
    }
}


//------------ ErrorFile -----------------------------------------------------

/// A custom error page.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ErrorFile {
    /// The absolute path of the file.
    pub abs: PathBuf,

    /// The path relative to the root in URL form.
    ///
    /// This always starts with a slash, e.g., `/errors/404.html`.
    pub rel: String,
}

impl ErrorFile {
    /// Checks a configured error file.
    ///
    /// The path is taken relative to `root` even if it starts with a slash.
    fn check(
        errors: &mut ConfigErrors, root: &Path, path: &str, code: &str
    ) -> Option<Self> {
        let abs = normalize(
            &root.join(path.trim_start_matches(std::path::is_separator))
        );
        let rel = match abs.strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => {
                errors.push(format!(
                    "Path of {} file can not be out of root directory", code
                ));
                return None
            }
        };
        match fs::metadata(&abs) {
            Ok(meta) => {
                if !meta.is_file() {
                    errors.push(format!(
                        "{} file '{}' is not a regular file",
                        code, abs.display()
                    ));
                    return None
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                errors.push(format!(
                    "{} file '{}' does not exist", code, abs.display()
                ));
                return None
            }
            Err(err) => {
                errors.push(format!(
                    "Get stat of {} file error: {}", code, err
                ));
                return None
            }
        }
        let mut url = String::new();
        for component in rel.components() {
            url.push('/');
            url.push_str(&component.as_os_str().to_string_lossy());
        }
        Some(ErrorFile { rel: url, abs })
    }
}


//------------ Auth ----------------------------------------------------------

/// The authentication settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Auth {
    pub username: String,
    pub password: String,
    pub method: AuthMethod,

    /// The paths that need authentication.
    ///
    /// If this is empty, all paths need it.
    pub paths: Vec<String>,
}

impl Auth {
    fn check(
        errors: &mut ConfigErrors,
        auth: &str,
        method: &str,
        paths: &[String],
    ) -> Option<Self> {
        let mut ok = true;
        let (username, password) = match auth.split_once(':') {
            Some(pair) => pair,
            None => {
                errors.push(
                    "Format of auth must be 'username:password'"
                );
                ok = false;
                ("", "")
            }
        };
        if ok && (username.is_empty() || password.is_empty()) {
            errors.push("Username or password cannot be empty string");
            ok = false;
        }
        let method = match AuthMethod::from_str(method) {
            Ok(method) => Some(method),
            Err(err) => {
                errors.push(err.to_string());
                None
            }
        };
        for path in paths {
            if !path.starts_with('/') {
                errors.push(format!(
                    "Auth path must start with \"/\", got {}", path
                ));
                ok = false;
            }
        }
        match method {
            Some(method) if ok => {
                Some(Auth {
                    username: username.into(),
                    password: password.into(),
                    method,
                    paths: paths.to_vec(),
                })
            }
            _ => None
        }
    }
}


//------------ AuthMethod ----------------------------------------------------

/// The HTTP authentication scheme to use.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthMethod {
    Basic,
    Digest,
}

impl FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(AuthMethod::Basic),
            "digest" => Ok(AuthMethod::Digest),
            _ => Err(format!(
                "Invalid auth method '{}', must be 'basic' or 'digest'", s
            ))
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            AuthMethod::Basic => "basic",
            AuthMethod::Digest => "digest",
        })
    }
}


//------------ Tls -----------------------------------------------------------

/// The TLS settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tls {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub port: u16,
    pub policy: TlsPolicy,
}

impl Tls {
    fn check(
        errors: &mut ConfigErrors,
        options: &Options,
        port: Option<u16>,
        tls_port: Option<u16>,
    ) -> Option<Self> {
        let cert = check_key_file(
            errors, options.tls_cert.as_deref(), "certificate"
        );
        let key = check_key_file(
            errors, options.tls_key.as_deref(), "private key"
        );
        let policy = match TlsPolicy::from_str(&options.tls_policy) {
            Ok(policy) => Some(policy),
            Err(err) => {
                errors.push(err);
                None
            }
        };
        if let Some(policy) = policy {
            if policy != TlsPolicy::Only && options.port == options.tls_port {
                errors.push("HTTP port and HTTPS port cannot be the same");
                return None
            }
        }
        match (cert, key, policy, port, tls_port) {
            (Some(cert), Some(key), Some(policy), Some(_), Some(port)) => {
                Some(Tls { cert, key, port, policy })
            }
            _ => None
        }
    }
}

/// Checks that a TLS file is given and non-empty.
fn check_key_file(
    errors: &mut ConfigErrors, path: Option<&Path>, what: &str
) -> Option<PathBuf> {
    let path = match path {
        Some(path) if !path.as_os_str().is_empty() => path,
        _ => {
            errors.push(format!("Path of TLS {} is empty", what));
            return None
        }
    };
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some(path.into()),
        Ok(meta) if meta.is_file() => {
            errors.push(format!(
                "TLS {} '{}' is empty", what, path.display()
            ));
            None
        }
        Ok(_) => {
            errors.push(format!(
                "TLS {} '{}' is not a regular file", what, path.display()
            ));
            None
        }
        Err(err) => {
            errors.push(format!(
                "Cannot access TLS {} '{}': {}", what, path.display(), err
            ));
            None
        }
    }
}


//------------ TlsPolicy -----------------------------------------------------

/// How plain HTTP is treated when TLS is enabled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TlsPolicy {
    /// Plain HTTP redirects to HTTPS.
    Redirect,

    /// Serve both plain HTTP and HTTPS.
    Both,

    /// Serve HTTPS only.
    Only,
}

impl FromStr for TlsPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redirect" => Ok(TlsPolicy::Redirect),
            "both" => Ok(TlsPolicy::Both),
            "only" => Ok(TlsPolicy::Only),
            _ => Err(format!(
                "Invalid TLS policy '{}', must be 'redirect', 'both' \
                 or 'only'", s
            ))
        }
    }
}

impl fmt::Display for TlsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            TlsPolicy::Redirect => "redirect",
            TlsPolicy::Both => "both",
            TlsPolicy::Only => "only",
        })
    }
}


//------------ ConfigErrors --------------------------------------------------

/// All the problems found while checking the options.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigErrors(Vec<String>);

impl ConfigErrors {
    fn push(&mut self, msg: impl Into<String>) {
        self.0.push(msg.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(String::as_str)
    }

    /// Logs all the errors.
    pub fn log(&self) {
        if self.0.len() == 1 {
            error!("Config error: {}", self.0[0]);
        }
        else {
            error!("Config error:");
            for (i, msg) in self.0.iter().enumerate() {
                error!("{}. {}", i + 1, msg);
            }
        }
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, msg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}. {}", i + 1, msg)?;
        }
        Ok(())
    }
}


//------------ LogTarget -----------------------------------------------------

/// The target to log to.
#[derive(Clone, Debug, Default)]
pub enum LogTarget {
    /// Syslog.
    ///
    /// The argument is the syslog facility to use.
    #[cfg(unix)]
    Syslog(Facility),

    /// Stderr.
    #[default]
    Stderr,

    /// A file.
    ///
    /// The argument is the file name.
    File(PathBuf)
}


//--- PartialEq and Eq

impl PartialEq for LogTarget {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            #[cfg(unix)]
            (&LogTarget::Syslog(s), &LogTarget::Syslog(o)) => {
                (s as usize) == (o as usize)
            }
            (&LogTarget::Stderr, &LogTarget::Stderr) => true,
            (&LogTarget::File(ref s), &LogTarget::File(ref o)) => {
                s == o
            }
            _ => false
        }
    }
}

impl Eq for LogTarget { }


//------------ GlobalArgs ----------------------------------------------------

/// The global command line arguments.
#[derive(Clone, Debug, Parser)]
struct GlobalArgs {
    /// Read base configuration from this file
    #[arg(short, long, value_name="PATH")]
    config: Option<PathBuf>,

    /// Log more information, twice for even more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Log less information, twice for no information
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "verbose")]
    quiet: u8,

    /// Log to syslog
    #[cfg(unix)]
    #[arg(long)]
    syslog: bool,

    /// Facility to use for syslog logging
    #[cfg(unix)]
    #[arg(long, value_name = "FACILITY")]
    syslog_facility: Option<String>,

    /// Log to this file
    #[arg(long, value_name = "PATH")]
    logfile: Option<String>,
}


//------------ ServeArgs -----------------------------------------------------

/// The server-related command line arguments.
#[derive(Clone, Debug, Parser)]
struct ServeArgs {
    /// Root path of the site [default: current directory]
    #[arg(short, long, value_name = "PATH")]
    root: Option<PathBuf>,

    /// HTTP port [default: 8080]
    #[arg(short, long, value_name = "PORT")]
    port: Option<u64>,

    /// IP addresses to bind to, separated by commas
    #[arg(short, long, value_name = "IP", value_delimiter = ',')]
    bind_ip: Option<Vec<String>>,

    /// File names of index files, separated by colons
    #[arg(short, long, value_name = "NAME[:NAME...]")]
    index: Option<String>,

    /// Show a file list for directories without an index file
    #[arg(short, long)]
    listdir: bool,

    /// Turn off gzip compression
    #[arg(long)]
    no_gzip: bool,

    /// Ask clients not to cache responses
    #[arg(long)]
    no_cache: bool,

    /// Allow cross-origin requests
    #[arg(long)]
    cors: bool,

    /// Send the headers for a secure context
    #[arg(long)]
    secure_context: bool,

    /// Serve hidden files and directories
    #[arg(long)]
    serve_all: bool,

    /// Path of a custom 404 file, relative to the root
    #[arg(long = "404", value_name = "PATH")]
    error_404: Option<String>,

    /// Path of a custom 401 file, relative to the root
    #[arg(long = "401", value_name = "PATH")]
    error_401: Option<String>,

    /// Username and password for authentication
    #[arg(short, long, value_name = "USER:PASS")]
    auth: Option<String>,

    /// Authentication method, 'basic' or 'digest' [default: basic]
    #[arg(long, value_name = "METHOD")]
    auth_method: Option<String>,

    /// Path that requires authentication, can be given multiple times
    #[arg(long, value_name = "PATH")]
    auth_path: Option<Vec<String>>,

    /// Path to the TLS certificate
    #[arg(long, value_name = "PATH")]
    tls_cert: Option<PathBuf>,

    /// Path to the TLS private key
    #[arg(long, value_name = "PATH")]
    tls_key: Option<PathBuf>,

    /// HTTPS port [default: 443]
    #[arg(long, value_name = "PORT")]
    tls_port: Option<u64>,

    /// Policy for plain HTTP: 'redirect', 'both' or 'only' [default: only]
    #[arg(long, value_name = "POLICY")]
    tls_policy: Option<String>,

    /// Access log layout or one of 'normal', 'short', 'min'
    #[arg(long, value_name = "LAYOUT")]
    log_layout: Option<String>,

    /// Log the configuration at startup
    #[arg(long)]
    showconf: bool,
}


//------------ ConfigFile ----------------------------------------------------

/// The content of a config file.
///
/// This is a thin wrapper around `toml::Table` to make dealing with it more
/// convenient.
#[derive(Clone, Debug)]
struct ConfigFile {
    /// The content of the file.
    content: toml::value::Table,

    /// The path to the config file.
    path: PathBuf,

    /// The directory we found the file in.
    ///
    /// This is used in relative paths.
    dir: PathBuf,
}

impl ConfigFile {
    /// Reads the config file at the given path.
    ///
    /// If there is no such file, returns `None`. If there is a file but it
    /// is broken, aborts.
    #[allow(clippy::verbose_file_reads)]
    fn read(path: &Path) -> Result<Option<Self>, Failed> {
        let mut file = match fs::File::open(path) {
            Ok(file) => file,
            Err(_) => return Ok(None)
        };
        let mut config = String::new();
        if let Err(err) = file.read_to_string(&mut config) {
            error!(
                "Failed to read config file {}: {}",
                path.display(), err
            );
            return Err(Failed);
        }
        Self::parse(&config, path).map(Some)
    }

    /// Parses the content of the file from a string.
    ///
    /// The path must be absolute.
    fn parse(content: &str, path: &Path) -> Result<Self, Failed> {
        let content = match toml::from_str(content) {
            Ok(toml::Value::Table(content)) => content,
            Ok(_) => {
                error!(
                    "Failed to parse config file {}: Not a mapping.",
                    path.display()
                );
                return Err(Failed);
            }
            Err(err) => {
                error!(
                    "Failed to parse config file {}: {}",
                    path.display(), err
                );
                return Err(Failed);
            }
        };
        let dir = match path.parent() {
            Some(dir) => dir.into(),
            None => {
                error!(
                    "Failed to determine directory of config file {}.",
                    path.display()
                );
                return Err(Failed);
            }
        };
        Ok(ConfigFile {
            content,
            path: path.into(),
            dir
        })
    }

    /// Takes a boolean value from the config file.
    ///
    /// The value is taken from the given `key`. Returns `Ok(None)` if there
    /// is no such key. Returns an error if the key exists but the value
    /// isn’t a booelan.
    fn take_bool(&mut self, key: &str) -> Result<Option<bool>, Failed> {
        match self.content.remove(key) {
            Some(value) => {
                if let toml::Value::Boolean(res) = value {
                    Ok(Some(res))
                }
                else {
                    error!(
                        "Failed in config file {}: \
                         '{}' expected to be a boolean.",
                        self.path.display(), key
                    );
                    Err(Failed)
                }
            }
            None => Ok(None)
        }
    }

    /// Takes an unsigned integer value from the config file.
    ///
    /// The value is taken from the given `key`. Returns `Ok(None)` if there
    /// is no such key. Returns an error if the key exists but the value
    /// isn’t an integer or if it is negative.
    fn take_u64(&mut self, key: &str) -> Result<Option<u64>, Failed> {
        match self.content.remove(key) {
            Some(value) => {
                if let toml::Value::Integer(res) = value {
                    if res < 0 {
                        error!(
                            "Failed in config file {}: \
                            '{}' expected to be a positive integer.",
                            self.path.display(), key
                        );
                        Err(Failed)
                    }
                    else {
                        Ok(Some(res as u64))
                    }
                }
                else {
                    error!(
                        "Failed in config file {}: \
                         '{}' expected to be an integer.",
                        self.path.display(), key
                    );
                    Err(Failed)
                }
            }
            None => Ok(None)
        }
    }

    /// Takes a string value from the config file.
    ///
    /// The value is taken from the given `key`. Returns `Ok(None)` if there
    /// is no such key. Returns an error if the key exists but the value
    /// isn’t a string.
    fn take_string(&mut self, key: &str) -> Result<Option<String>, Failed> {
        match self.content.remove(key) {
            Some(value) => {
                if let toml::Value::String(res) = value {
                    Ok(Some(res))
                }
                else {
                    error!(
                        "Failed in config file {}: \
                         '{}' expected to be a string.",
                        self.path.display(), key
                    );
                    Err(Failed)
                }
            }
            None => Ok(None)
        }
    }

    /// Takes a string encoded value from the config file.
    ///
    /// The value is taken from the given `key`. It is expected to be a
    /// string and will be converted to the final type via `FromStr::from_str`.
    ///
    /// Returns `Ok(None)` if the key doesn’t exist. Returns an error if the
    /// key exists but the value isn’t a string or conversion fails.
    fn take_from_str<T>(&mut self, key: &str) -> Result<Option<T>, Failed>
    where T: FromStr, T::Err: fmt::Display {
        match self.take_string(key)? {
            Some(value) => {
                match T::from_str(&value) {
                    Ok(some) => Ok(Some(some)),
                    Err(err) => {
                        error!(
                            "Failed in config file {}: \
                             illegal value in '{}': {}.",
                            self.path.display(), key, err
                        );
                        Err(Failed)
                    }
                }
            }
            None => Ok(None)
        }
    }

    /// Takes a path value from the config file.
    ///
    /// The path is taken from the given `key`. It must be a string value.
    /// It is treated as relative to the directory of the config file. If it
    /// is indeed a relative path, it is expanded accordingly and an absolute
    /// path is returned.
    ///
    /// Returns `Ok(None)` if the key does not exist. Returns an error if the
    /// key exists but the value isn’t a string.
    fn take_path(&mut self, key: &str) -> Result<Option<PathBuf>, Failed> {
        self.take_string(key).map(|opt| opt.map(|path| self.dir.join(path)))
    }

    /// Takes an array of strings from the config file.
    ///
    /// The value is taken from the entry with the given `key` and, if
    /// present, the entry is removed. The value must be an array of strings.
    /// If the key is not present, returns `Ok(None)`. If the entry is present
    /// but not an array of strings, returns an error.
    fn take_string_array(
        &mut self,
        key: &str
    ) -> Result<Option<Vec<String>>, Failed> {
        match self.content.remove(key) {
            Some(toml::Value::Array(vec)) => {
                let mut res = Vec::new();
                for value in vec.into_iter() {
                    if let toml::Value::String(value) = value {
                        res.push(value)
                    }
                    else {
                        error!(
                            "Failed in config file {}: \
                            '{}' expected to be a array of strings.",
                            self.path.display(),
                            key
                        );
                        return Err(Failed);
                    }
                }
                Ok(Some(res))
            }
            Some(_) => {
                error!(
                    "Failed in config file {}: \
                     '{}' expected to be a array of strings.",
                    self.path.display(), key
                );
                Err(Failed)
            }
            None => Ok(None)
        }
    }

    /// Checks whether the config file is now empty.
    ///
    /// If it isn’t, logs a complaint and returns an error.
    fn check_exhausted(&self) -> Result<(), Failed> {
        if !self.content.is_empty() {
            error!(
                "Failed in config file {}: Unknown settings {}.",
                self.path.display(),
                self.content.keys().map(String::as_str)
                    .collect::<Vec<_>>().join(", ")
            );
            Err(Failed)
        }
        else {
            Ok(())
        }
    }
}


//------------ Helpers -------------------------------------------------------

/// Converts the syslog facility name to the facility type.
#[cfg(unix)]
fn facility_to_string(facility: Facility) -> String {
    use syslog::Facility::*;

    match facility {
        LOG_KERN => "kern",
        LOG_USER => "user",
        LOG_MAIL => "mail",
        LOG_DAEMON => "daemon",
        LOG_AUTH => "auth",
        LOG_SYSLOG => "syslog",
        LOG_LPR => "lpr",
        LOG_NEWS => "news",
        LOG_UUCP => "uucp",
        LOG_CRON => "cron",
        LOG_AUTHPRIV => "authpriv",
        LOG_FTP => "ftp",
        LOG_NTP => "ntp",
        LOG_AUDIT => "audit",
        LOG_ALERT => "alert",
        LOG_CLOCK_DAEMON => "clock_daemon",
        LOG_LOCAL0 => "local0",
        LOG_LOCAL1 => "local1",
        LOG_LOCAL2 => "local2",
        LOG_LOCAL3 => "local3",
        LOG_LOCAL4 => "local4",
        LOG_LOCAL5 => "local5",
        LOG_LOCAL6 => "local6",
        LOG_LOCAL7 => "local7",
    }.into()
}

fn toml_int(value: u64) -> toml::Value {
    toml::Value::Integer(i64::try_from(value).unwrap_or(i64::MAX))
}

fn toml_strings(values: &[String]) -> toml::Value {
    toml::Value::Array(values.iter().map(|v| v.clone().into()).collect())
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    fn process_args(args: &[&str], cur_dir: &Path) -> Options {
        let matches = Options::serve_args(Options::config_args(
            Command::new("ran")
        )).get_matches_from(args);
        let mut options = Options::from_arg_matches(
            &matches, cur_dir
        ).unwrap();
        options.apply_serve_arg_matches(&matches, cur_dir).unwrap();
        options
    }

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("errors")).unwrap();
        fs::write(dir.path().join("errors/404.html"), "nope").unwrap();
        fs::write(dir.path().join("401.html"), "who?").unwrap();
        fs::write(dir.path().join("cert.pem"), "cert").unwrap();
        fs::write(dir.path().join("key.pem"), "key").unwrap();
        fs::write(dir.path().join("empty.pem"), "").unwrap();
        dir
    }

    fn messages(errors: ConfigErrors) -> Vec<String> {
        errors.iter().map(Into::into).collect()
    }

    #[test]
    fn default_options() {
        let options = process_args(&["ran"], Path::new("/srv"));
        assert_eq!(options.root, Path::new("/srv"));
        assert_eq!(options.port, 8080);
        assert_eq!(options.index, ["index.html", "index.htm"]);
        assert!(options.gzip);
        assert!(!options.listdir);
        assert_eq!(options.tls_policy, "only");
        assert_eq!(options.auth_method, "basic");
        assert_eq!(options.log_layout, "normal");
        assert_eq!(options.log_target, LogTarget::Stderr);
        assert_eq!(options.log_level(LevelFilter::Warn), LevelFilter::Warn);
        assert!(!options.tls_enabled());
    }

    #[test]
    fn serve_args() {
        let options = process_args(
            &[
                "ran", "-r", "www", "-p", "70000", "-b", "127.0.0.1,::1",
                "-i", "default.htm:index.html", "-l", "--no-gzip",
                "--no-cache", "--cors", "--secure-context", "--serve-all",
                "--404", "/404.html", "--401", "/401.html",
                "-a", "user:pass", "--auth-method", "digest",
                "--auth-path", "/private", "--auth-path", "/admin",
                "--tls-cert", "cert.pem", "--tls-key", "/etc/key.pem",
                "--tls-port", "8443", "--tls-policy", "redirect",
                "--log-layout", "min", "--showconf",
            ],
            Path::new("/test")
        );
        assert_eq!(options.root, Path::new("/test/www"));
        assert_eq!(options.port, 70000);
        assert_eq!(options.bind_ip, ["127.0.0.1", "::1"]);
        assert_eq!(options.index, ["default.htm", "index.html"]);
        assert!(options.listdir);
        assert!(!options.gzip);
        assert!(options.no_cache);
        assert!(options.cors);
        assert!(options.secure_context);
        assert!(options.serve_all);
        assert_eq!(options.error_404.as_deref(), Some("/404.html"));
        assert_eq!(options.error_401.as_deref(), Some("/401.html"));
        assert_eq!(options.auth.as_deref(), Some("user:pass"));
        assert_eq!(options.auth_method, "digest");
        assert_eq!(options.auth_paths, ["/private", "/admin"]);
        assert_eq!(
            options.tls_cert.as_deref(), Some(Path::new("/test/cert.pem"))
        );
        assert_eq!(
            options.tls_key.as_deref(), Some(Path::new("/etc/key.pem"))
        );
        assert_eq!(options.tls_port, 8443);
        assert_eq!(options.tls_policy, "redirect");
        assert_eq!(options.log_layout, "min");
        assert!(options.show_conf);
    }

    #[test]
    fn verbosity() {
        let options = process_args(&["ran", "-v"], Path::new("/"));
        assert_eq!(options.log_level(LevelFilter::Warn), LevelFilter::Info);
        assert_eq!(options.log_level(LevelFilter::Info), LevelFilter::Debug);
        let options = process_args(&["ran", "-vvvv"], Path::new("/"));
        assert_eq!(options.log_level(LevelFilter::Info), LevelFilter::Trace);
        let options = process_args(&["ran", "-q"], Path::new("/"));
        assert_eq!(options.log_level(LevelFilter::Info), LevelFilter::Error);
        let options = process_args(&["ran", "-qq"], Path::new("/"));
        assert_eq!(options.log_level(LevelFilter::Info), LevelFilter::Off);
    }

    #[test]
    #[cfg(unix)] // ... because of drive letters in absolute paths on Windows.
    fn good_config_file() {
        let file = ConfigFile::parse(
            "root = \"www\"\n\
             port = 80\n\
             bind-ip = [\"192.0.2.1\"]\n\
             index = [\"home.html\"]\n\
             listdir = true\n\
             gzip = false\n\
             error-404 = \"/404.html\"\n\
             auth = \"a:b\"\n\
             auth-method = \"digest\"\n\
             auth-paths = [\"/x\"]\n\
             tls-cert = \"/etc/cert.pem\"\n\
             tls-key = \"key.pem\"\n\
             tls-port = 443\n\
             tls-policy = \"both\"\n\
             log-level = \"debug\"\n\
             log = \"file\"\n\
             log-file = \"ran.log\"",
            Path::new("/test/ran.conf")
        ).unwrap();
        let options = Options::from_config_file(
            file, Path::new("/cur")
        ).unwrap();
        assert_eq!(options.root, Path::new("/test/www"));
        assert_eq!(options.port, 80);
        assert_eq!(options.bind_ip, ["192.0.2.1"]);
        assert_eq!(options.index, ["home.html"]);
        assert!(options.listdir);
        assert!(!options.gzip);
        assert_eq!(options.error_404.as_deref(), Some("/404.html"));
        assert_eq!(options.auth.as_deref(), Some("a:b"));
        assert_eq!(options.auth_method, "digest");
        assert_eq!(options.auth_paths, ["/x"]);
        assert_eq!(
            options.tls_cert.as_deref(), Some(Path::new("/etc/cert.pem"))
        );
        assert_eq!(
            options.tls_key.as_deref(), Some(Path::new("/test/key.pem"))
        );
        assert_eq!(options.tls_policy, "both");
        assert_eq!(options.log_level, Some(LevelFilter::Debug));
        assert_eq!(
            options.log_target,
            LogTarget::File(PathBuf::from("/test/ran.log"))
        );
    }

    #[test]
    #[cfg(unix)]
    fn minimal_config_file() {
        let file = ConfigFile::parse("", Path::new("/test/ran.conf")).unwrap();
        let options = Options::from_config_file(
            file, Path::new("/cur")
        ).unwrap();
        assert_eq!(options, Options::with_root("/cur".into()));
    }

    #[test]
    fn bad_config_file() {
        let file = ConfigFile::parse(
            "port = \"eighty\"", Path::new("/test/ran.conf")
        ).unwrap();
        assert!(Options::from_config_file(file, Path::new("/")).is_err());
        let file = ConfigFile::parse(
            "prot = 80", Path::new("/test/ran.conf")
        ).unwrap();
        assert!(Options::from_config_file(file, Path::new("/")).is_err());
        let file = ConfigFile::parse(
            "log = \"file\"", Path::new("/test/ran.conf")
        ).unwrap();
        assert!(Options::from_config_file(file, Path::new("/")).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn read_your_own_config() {
        let out_options = Options::with_root("/srv/www".into());
        let out_file = format!("{}", out_options);
        let in_file = ConfigFile::parse(
            &out_file, Path::new("/test/ran.conf")
        ).unwrap();
        let in_options = Options::from_config_file(
            in_file, Path::new("/")
        ).unwrap();
        assert_eq!(out_options, in_options);
    }

    #[test]
    fn validate_good_options() {
        let dir = site();
        let mut options = Options::with_root(dir.path().into());
        options.error_404 = Some("/errors/404.html".into());
        options.error_401 = Some("401.html".into());
        options.auth = Some("user:pass:word".into());
        options.auth_paths = vec!["/private".into()];
        options.tls_cert = Some(dir.path().join("cert.pem"));
        options.tls_key = Some(dir.path().join("key.pem"));
        options.tls_port = 8443;
        options.tls_policy = "redirect".into();
        options.bind_ip = vec!["127.0.0.1".into(), "::1".into()];

        let config = options.validate().unwrap();
        let root = normalize(dir.path());
        assert_eq!(config.root, root);
        assert_eq!(config.port, 8080);
        let error_404 = config.error_404.as_ref().unwrap();
        assert_eq!(error_404.rel, "/errors/404.html");
        assert_eq!(error_404.abs, root.join("errors").join("404.html"));
        assert_eq!(config.error_401.as_ref().unwrap().rel, "/401.html");
        assert!(config.is_error_file("/errors/404.html"));
        assert!(!config.is_error_file("/errors"));
        let auth = config.auth.as_ref().unwrap();
        assert_eq!(auth.username, "user");
        assert_eq!(auth.password, "pass:word");
        assert_eq!(auth.method, AuthMethod::Basic);
        let tls = config.tls.as_ref().unwrap();
        assert_eq!(tls.port, 8443);
        assert_eq!(tls.policy, TlsPolicy::Redirect);
        assert_eq!(
            config.bind,
            ["127.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]
        );
    }

    #[test]
    fn validate_reports_everything() {
        let dir = site();
        let mut options = Options::with_root(dir.path().into());
        options.port = 0;
        options.index = vec!["a/index.html".into()];
        options.error_404 = Some("../../etc/passwd".into());
        options.tls_cert = Some(dir.path().join("cert.pem"));
        options.tls_key = Some(dir.path().join("key.pem"));
        options.tls_port = 0;
        options.tls_policy = "both".into();
        options.bind_ip = vec!["1.2.3".into(), "127.0.0.1".into(), "x".into()];
        options.log_layout = "%z".into();

        let errors = messages(options.validate().unwrap_err());
        assert_eq!(
            errors,
            [
                "Available port range is 1-65535",
                "Available TLS port range is 1-65535",
                "Filename of index can not include path separators",
                "Path of 404 file can not be out of root directory",
                "HTTP port and HTTPS port cannot be the same",
                "Invalid IP: 1.2.3, x",
                "Invalid log layout: unknown specifier '%z' at position 0",
            ]
        );
    }

    #[test]
    fn validate_port_range() {
        let dir = site();
        let mut options = Options::with_root(dir.path().into());
        options.port = 70000;
        assert_eq!(
            messages(options.validate().unwrap_err()),
            ["Available port range is 1-65535"]
        );
    }

    #[test]
    fn validate_bad_root_short_circuits() {
        let dir = site();
        let mut options = Options::with_root(dir.path().join("missing"));
        options.port = 0;
        options.auth = Some(":".into());
        let errors = messages(options.validate().unwrap_err());
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], "Available port range is 1-65535");
        assert!(errors[1].ends_with("does not exist"));

        let options = Options::with_root(dir.path().join("401.html"));
        let errors = messages(options.validate().unwrap_err());
        assert!(errors[0].ends_with("is not a directory"));
    }

    #[test]
    fn validate_error_files() {
        let dir = site();
        let mut options = Options::with_root(dir.path().into());
        options.error_404 = Some("/errors".into());
        options.error_401 = Some("/missing.html".into());
        let errors = messages(options.validate().unwrap_err());
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("404 file"));
        assert!(errors[0].ends_with("is not a regular file"));
        assert!(errors[1].starts_with("401 file"));
        assert!(errors[1].ends_with("does not exist"));
    }

    #[test]
    fn validate_auth() {
        let dir = site();
        let mut options = Options::with_root(dir.path().into());
        options.auth = Some("user:".into());
        options.auth_method = "ntlm".into();
        options.auth_paths = vec!["private".into()];
        assert_eq!(
            messages(options.validate().unwrap_err()),
            [
                "Username or password cannot be empty string",
                "Invalid auth method 'ntlm', must be 'basic' or 'digest'",
                "Auth path must start with \"/\", got private",
            ]
        );
    }

    #[test]
    fn validate_tls() {
        let dir = site();
        let mut options = Options::with_root(dir.path().into());
        options.tls_cert = Some(dir.path().join("empty.pem"));
        options.tls_policy = "sometimes".into();
        let errors = messages(options.validate().unwrap_err());
        assert_eq!(errors.len(), 3);
        assert!(errors[0].starts_with("TLS certificate"));
        assert!(errors[0].ends_with("is empty"));
        assert_eq!(errors[1], "Path of TLS private key is empty");
        assert!(errors[2].starts_with("Invalid TLS policy 'sometimes'"));

        // With policy "only", the ports may be the same.
        let mut options = Options::with_root(dir.path().into());
        options.tls_cert = Some(dir.path().join("cert.pem"));
        options.tls_key = Some(dir.path().join("key.pem"));
        options.tls_port = 8080;
        assert!(options.validate().is_ok());
    }

    #[test]
    fn bind_ip_collapses_unspecified() {
        let mut errors = ConfigErrors::default();
        assert_eq!(
            check_bind_ip(&mut errors, &["127.0.0.1".into(), "::".into()]),
            [IpAddr::V6(Ipv6Addr::UNSPECIFIED)]
        );
        assert_eq!(
            check_bind_ip(&mut errors, &["::".into()]),
            [IpAddr::V6(Ipv6Addr::UNSPECIFIED)]
        );
        assert_eq!(
            check_bind_ip(&mut errors, &["::1,0.0.0.0".into()]),
            [IpAddr::V4(Ipv4Addr::UNSPECIFIED)]
        );
        assert_eq!(
            check_bind_ip(&mut errors, &["::, 0.0.0.0".into()]),
            [IpAddr::V4(Ipv4Addr::UNSPECIFIED)]
        );
        assert_eq!(
            check_bind_ip(&mut errors, &[]),
            [IpAddr::V4(Ipv4Addr::UNSPECIFIED)]
        );
        assert_eq!(
            check_bind_ip(&mut errors, &[" 10.0.0.1 , 10.0.0.1".into()]),
            ["10.0.0.1".parse::<IpAddr>().unwrap()]
        );
        assert!(errors.is_empty());
    }
}
