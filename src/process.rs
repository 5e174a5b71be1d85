//! Managing the process Ran runs in.

use std::future::Future;
use log::{LevelFilter, error};
use tokio::runtime::Runtime;
use crate::config::Options;
use crate::error::Failed;
use crate::log::Logger;


//------------ Process -------------------------------------------------------

/// A representation of the process Ran runs in.
///
/// This type provides access to the options and the environment in a
/// platform independent way.
pub struct Process {
    options: Options,
}

impl Process {
    /// Prepares the process.
    ///
    /// This installs the provisional logger and must be called before
    /// anything else.
    pub fn init() -> Result<(), Failed> {
        Logger::init()
    }

    /// Creates a new process object.
    pub fn new(options: Options) -> Self {
        Process { options }
    }

    /// Returns a reference to the options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Switches logging to the configured target.
    ///
    /// The level is derived from the options, starting at `default` if the
    /// config file didn’t name one.
    pub fn switch_logging(&self, default: LevelFilter) -> Result<(), Failed> {
        Logger::switch_logging(
            &self.options.log_target, self.options.log_level(default)
        )
    }

    /// Returns a Tokio runtime.
    pub fn runtime(&self) -> Result<Runtime, Failed> {
        Runtime::new().map_err(|err| {
            error!("Failed to create runtime: {}", err);
            Failed
        })
    }

    /// Runs a future to completion atop a Tokio runtime.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, Failed> {
        Ok(self.runtime()?.block_on(future))
    }
}
