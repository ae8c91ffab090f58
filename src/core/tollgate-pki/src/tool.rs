//! Invocation of external tools with an explicit environment.
//!
//! The child never inherits the caller's environment: it sees exactly the
//! variables set on the [`ToolCommand`].

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::debug;

/// A single external-tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, OsString>,
}

/// Captured result of a successful invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

/// Why an invocation did not succeed.
#[derive(Debug, Clone)]
pub struct ToolError {
    /// Human-readable invocation, e.g. `easyrsa gen-crl`.
    pub invocation: String,
    /// Captured stderr, stdout, or exit status.
    pub detail: String,
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.invocation, self.detail)
    }
}

impl ToolCommand {
    /// Starts a command for `program` with an empty environment.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Sets one environment variable.
    pub fn env(mut self, key: &str, value: impl Into<OsString>) -> Self {
        self.env.insert(key.to_string(), value.into());
        self
    }

    /// The environment the child will see.
    pub fn environment(&self) -> &BTreeMap<String, OsString> {
        &self.env
    }

    /// The program path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `<program file name> <args...>` for logs and errors.
    pub fn invocation(&self) -> String {
        let program = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string());
        let mut line = program;
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Runs to completion; non-zero exit is an error carrying the output.
    pub fn run(&self) -> Result<ToolOutput, ToolError> {
        let invocation = self.invocation();
        debug!(command = %invocation, "Running external tool");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let output = command.output().map_err(|e| ToolError {
            invocation: invocation.clone(),
            detail: format!("could not start {}: {e}", self.program.display()),
        })?;

        if !output.status.success() {
            return Err(ToolError {
                invocation,
                detail: failure_summary(&output),
            });
        }

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Stderr if any, else stdout, else the exit status.
pub fn failure_summary(output: &Output) -> String {
    let stderr = trim_bytes(&output.stderr);
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = trim_bytes(&output.stdout);
    if !stdout.is_empty() {
        return stdout;
    }
    match output.status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_owned(),
    }
}

fn trim_bytes(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_owned()
}
