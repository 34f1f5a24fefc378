//! Child process configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use mcpwire_transport_traits::LimitsConfig;
use serde::{Deserialize, Serialize};

/// How to launch the MCP server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdioConfig {
    /// Program to execute. Resolved through `PATH` like a shell would.
    pub command: String,

    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overrides. `Some(value)` sets the variable, `None`
    /// removes it from the inherited environment. Blank names are ignored.
    #[serde(default)]
    pub env: HashMap<String, Option<String>>,

    /// Working directory of the child. Inherited when unset.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Size limits; only `max_line_bytes` applies to this transport.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl StdioConfig {
    /// Creates a configuration for `command` with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            limits: LimitsConfig::default(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), Some(value.into()));
        self
    }

    /// Removes an inherited environment variable from the child.
    #[must_use]
    pub fn without_env(mut self, name: impl Into<String>) -> Self {
        self.env.insert(name.into(), None);
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Replaces the size limits.
    #[must_use]
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }
}
