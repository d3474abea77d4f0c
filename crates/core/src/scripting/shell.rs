//! Command-line construction for script runs.
//!
//! The final argv is `[elevation...] [line_buffer...] <shell> <script> <args...>`.
//! Arguments are handed to the OS as separate tokens; no shell string is
//! ever assembled, so user-supplied arguments are never re-parsed.

use std::ffi::OsString;
use std::path::Path;

use tokio::process::Command;

use crate::config::ScriptsConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    argv: Vec<OsString>,
}

impl ShellCommand {
    pub fn for_script(config: &ScriptsConfig, script: &Path, args: &[String]) -> Self {
        let mut argv: Vec<OsString> = Vec::with_capacity(
            config.elevation.len() + config.line_buffer.len() + 2 + args.len(),
        );
        argv.extend(config.elevation.iter().map(OsString::from));
        argv.extend(config.line_buffer.iter().map(OsString::from));
        argv.push(config.shell.clone().into_os_string());
        argv.push(script.as_os_str().to_os_string());
        argv.extend(args.iter().map(OsString::from));
        Self { argv }
    }

    /// The executable that will actually be spawned.
    pub fn program(&self) -> String {
        self.argv[0].to_string_lossy().into_owned()
    }

    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    /// Build a `tokio` command in its own process group.
    ///
    /// Stdio is left to the caller.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..])
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .process_group(0);
        cmd
    }
}
