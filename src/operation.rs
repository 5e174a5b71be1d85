//! What Ran can do for you.
//!
//! This module implements all the commands users can ask Ran to perform.
//! They are encapsulated in the type [`Operation`] which can determine the
//! command from the command line argumments and then execute it.
//!
//! [`Operation`]: enum.Operation.html

use std::path::{Path, PathBuf};
use std::sync::Arc;
use clap::{ArgMatches, Args, FromArgMatches, Parser};
use log::{LevelFilter, error, info};
use crate::config::Options;
use crate::error::{ExitError, Failed};
use crate::http::http_listener;
use crate::log::Logger;
use crate::process::Process;
use crate::utils::fatal;
use crate::utils::tls::SelfSignedCert;

#[cfg(unix)] use tokio::signal::unix::{Signal, SignalKind, signal};
#[cfg(not(unix))] use futures::future::pending;


//------------ Operation -----------------------------------------------------

/// The command to execute.
///
/// You can create a value from the command line arguments. First, you add
/// all necessary sub-commands and arguments to a clap `Command` via
/// [`config_args`] and then process the argument matches into a value in
/// [`from_arg_matches`]. Finally, you can execute the created command
/// through the [`run`] method.
///
/// If no command is given, Ran serves. The arguments of the serve command
/// are therefore also accepted without it.
///
/// [`config_args`]: #method.config_args
/// [`from_arg_matches`]: #method.from_arg_matches
/// [`run`]: #method.run
#[derive(Clone, Debug)]
pub enum Operation {
    Serve(Serve),
    PrintConfig(PrintConfig),
    MakeCert(MakeCert),
}

impl Operation {
    /// Prepares everything.
    ///
    /// Call this before doing anything else.
    pub fn prepare() -> Result<(), Failed> {
        Process::init()
    }

    /// Adds the command configuration to a clap app.
    pub fn config_args(app: clap::Command) -> clap::Command {
        let app = Options::serve_args(app);
        let app = Serve::config_args(app);
        let app = PrintConfig::config_args(app);
        MakeCert::config_args(app)
    }

    /// Creates a command from clap matches.
    pub fn from_arg_matches(
        matches: &ArgMatches,
        cur_dir: &Path,
        options: &mut Options,
    ) -> Result<Self, Failed> {
        options.apply_serve_arg_matches(matches, cur_dir)?;
        Ok(match matches.subcommand() {
            Some(("serve", matches)) => {
                Operation::Serve(
                    Serve::from_arg_matches(matches, cur_dir, options)?
                )
            }
            Some(("config", matches)) => {
                Operation::PrintConfig(
                    PrintConfig::from_arg_matches(matches, cur_dir, options)?
                )
            }
            Some(("make-cert", matches)) => {
                Operation::MakeCert(MakeCert::from_arg_matches(
                    matches, cur_dir
                ))
            }
            _ => Operation::Serve(Serve),
        })
    }

    /// Runs the command.
    pub fn run(self, options: Options) -> Result<(), ExitError> {
        let process = Process::new(options);
        match self {
            Operation::Serve(cmd) => cmd.run(process),
            Operation::PrintConfig(cmd) => cmd.run(process),
            Operation::MakeCert(cmd) => cmd.run(process),
        }
    }
}


//------------ Serve ---------------------------------------------------------

/// Serve the root directory.
#[derive(Clone, Debug)]
pub struct Serve;

impl Serve {
    /// Adds the command configuration to a clap app.
    pub fn config_args(app: clap::Command) -> clap::Command {
        app.subcommand(
            Options::serve_args(
                clap::Command::new("serve")
                    .about("Serves the root directory (the default)")
                    .after_help(AFTER_HELP)
            )
        )
    }

    /// Creates a command from clap matches.
    pub fn from_arg_matches(
        matches: &ArgMatches,
        cur_dir: &Path,
        options: &mut Options,
    ) -> Result<Self, Failed> {
        options.apply_serve_arg_matches(matches, cur_dir)?;
        Ok(Serve)
    }

    /// Runs the server until it fails or a signal arrives.
    pub fn run(self, process: Process) -> Result<(), ExitError> {
        let config = match process.options().validate() {
            Ok(config) => config,
            Err(errors) => {
                errors.log();
                return Err(ExitError::Generic)
            }
        };

        // Access log lines are info, so serving needs at least that.
        process.switch_logging(LevelFilter::Info)?;

        if config.show_conf {
            for line in config.to_string().lines() {
                let line = line.trim();
                if !line.is_empty() {
                    info!("Config: {}", line);
                }
            }
        }

        let http = http_listener(Arc::new(config))?;
        let res = process.block_on(async move {
            let mut signal = SignalListener::new()?;
            tokio::select! {
                _ = http => {
                    error!("Fatal: HTTP listener ended unexpectedly.");
                    Err(Failed)
                }
                sig = signal.next() => {
                    info!(
                        "System: Catch signal: {}, Ran is going to shutdown",
                        sig
                    );
                    Ok(())
                }
            }
        })?;
        Logger::flush_global();
        res.map_err(Into::into)
    }
}


//------------ PrintConfig ---------------------------------------------------

/// Print the current configuration.
#[derive(Clone, Copy, Debug)]
pub struct PrintConfig;

impl PrintConfig {
    /// Adds the command configuration to a clap app.
    pub fn config_args(app: clap::Command) -> clap::Command {
        app.subcommand(Options::serve_args(clap::Command::new("config")
            .about("Prints the current config and exits")
            .after_help(AFTER_HELP)
        ))
    }

    /// Creates a command from clap matches.
    pub fn from_arg_matches(
        matches: &ArgMatches,
        cur_dir: &Path,
        options: &mut Options,
    ) -> Result<Self, Failed> {
        options.apply_serve_arg_matches(matches, cur_dir)?;
        Ok(PrintConfig)
    }

    /// Prints the current configuration to stdout and exits.
    fn run(self, process: Process) -> Result<(), ExitError> {
        println!("{}", process.options());
        Ok(())
    }
}


//------------ MakeCert ------------------------------------------------------

/// Create a self-signed certificate.
#[derive(Clone, Debug, Parser)]
pub struct MakeCert {
    /// Where to write the certificate
    #[arg(long, value_name = "PATH")]
    cert: PathBuf,

    /// Where to write the private key
    #[arg(long, value_name = "PATH")]
    key: PathBuf,

    /// Replace existing files
    #[arg(long)]
    overwrite: bool,
}

impl MakeCert {
    /// Adds the command configuration to a clap app.
    pub fn config_args(app: clap::Command) -> clap::Command {
        app.subcommand(
            MakeCert::augment_args(
                clap::Command::new("make-cert")
                    .about(
                        "Creates a self-signed certificate and private key"
                    )
                    .after_help(AFTER_HELP)
            )
        )
    }

    /// Creates a command from clap matches.
    pub fn from_arg_matches(matches: &ArgMatches, cur_dir: &Path) -> Self {
        let mut res = <MakeCert as FromArgMatches>::from_arg_matches(
            matches
        ).expect("bug in command line arguments parser");
        res.cert = cur_dir.join(res.cert);
        res.key = cur_dir.join(res.key);
        res
    }

    /// Writes the certificate and key files.
    fn run(self, _process: Process) -> Result<(), ExitError> {
        if !self.overwrite {
            match (self.cert.exists(), self.key.exists()) {
                (true, true) => {
                    error!(
                        "Certificate and private key both exist, \
                         remove them and try again."
                    );
                    return Err(ExitError::Generic)
                }
                (true, false) => {
                    error!(
                        "Certificate '{}' exists, remove it and try again.",
                        self.cert.display()
                    );
                    return Err(ExitError::Generic)
                }
                (false, true) => {
                    error!(
                        "Private key '{}' exists, remove it and try again.",
                        self.key.display()
                    );
                    return Err(ExitError::Generic)
                }
                (false, false) => { }
            }
        }

        let cert = SelfSignedCert::generate().map_err(|err| {
            error!("Failed to generate certificate: {}", err);
            ExitError::Generic
        })?;
        fatal::create_parent_all(&self.cert)?;
        fatal::write_file(&self.cert, cert.cert_pem.as_bytes())?;
        fatal::create_parent_all(&self.key)?;
        fatal::write_file(&self.key, cert.key_pem.as_bytes())?;
        println!(
            "Certificate written to {}\nPrivate key written to {}",
            self.cert.display(), self.key.display()
        );
        Ok(())
    }
}


//------------ SignalListener ------------------------------------------------

/// Waits for a signal telling us to quit.
#[cfg(unix)]
struct SignalListener {
    interrupt: Signal,
    terminate: Signal,
    hangup: Signal,
}

#[cfg(unix)]
impl SignalListener {
    pub fn new() -> Result<Self, Failed> {
        Ok(SignalListener {
            interrupt: Self::attach(SignalKind::interrupt(), "INT")?,
            terminate: Self::attach(SignalKind::terminate(), "TERM")?,
            hangup: Self::attach(SignalKind::hangup(), "HUP")?,
        })
    }

    fn attach(kind: SignalKind, name: &str) -> Result<Signal, Failed> {
        signal(kind).map_err(|err| {
            error!("Attaching to signal {} failed: {}", name, err);
            Failed
        })
    }

    /// Waits for the next signal and returns its name.
    pub async fn next(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "interrupt",
            _ = self.terminate.recv() => "terminated",
            _ = self.hangup.recv() => "hangup",
        }
    }
}

#[cfg(not(unix))]
struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    pub fn new() -> Result<Self, Failed> {
        Ok(SignalListener)
    }

    /// Waits for Ctrl-C.
    pub async fn next(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "interrupt",
            Err(err) => {
                error!("Listening for Ctrl-C failed: {}", err);
                pending().await
            }
        }
    }
}


//------------ Constants -----------------------------------------------------

/// The after help message pointing to the main help.
const AFTER_HELP: &str =
    "Additional global options are available. \
    Please consult 'ran --help' for those.";


//============ Tests =========================================================
