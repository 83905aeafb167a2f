//! Scripted host utilities operating on a temporary directory

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use xcode_install::install::command::{CommandOutput, CommandSpec, SystemCommand};
use xcode_install::install::error::CommandError;

/// Imitates the macOS utilities the installer calls.
///
/// `ditto`, `rm` and `ln` act on the real filesystem so tests can assert on
/// the resulting tree; everything else returns canned output. Each command is
/// recorded in order.
pub struct ScriptedSystem {
    version: String,
    user_cache_dir: PathBuf,
    installed: Vec<PathBuf>,
    index_enabled: bool,
    failing: HashSet<String>,
    partial_copy: bool,
    commands: Mutex<Vec<CommandSpec>>,
}

impl ScriptedSystem {
    /// `version` is what `xcodebuild -version` reports for bundles whose name carries none.
    pub fn new(version: &str, user_cache_dir: &Path) -> Self {
        Self {
            version: version.to_string(),
            user_cache_dir: user_cache_dir.to_path_buf(),
            installed: Vec::new(),
            index_enabled: true,
            failing: HashSet::new(),
            partial_copy: false,
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Bundles `mdfind` reports
    pub fn with_installed(mut self, paths: &[PathBuf]) -> Self {
        self.installed = paths.to_vec();
        self
    }

    pub fn with_index_disabled(mut self) -> Self {
        self.index_enabled = false;
        self
    }

    /// `program` exits with status 1
    pub fn failing(mut self, program: &str) -> Self {
        self.failing.insert(program.to_string());
        self
    }

    /// `ditto` writes part of the bundle, then exits with status 1
    pub fn with_partial_copy(mut self) -> Self {
        self.partial_copy = true;
        self
    }

    pub fn commands(&self) -> Vec<CommandSpec> {
        self.commands.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.commands().iter().map(ToString::to_string).collect()
    }

    pub fn ran(&self, program: &str) -> bool {
        self.commands().iter().any(|command| command.program == program)
    }

    pub fn ran_with(&self, program: &str, first_arg: &str) -> bool {
        self.commands().iter().any(|command| {
            command.program == program
                && command.args.first().map(String::as_str) == Some(first_arg)
        })
    }

    /// Bundles named `Xcode-<version>.app` report that version, others the default
    fn version_of<'a>(&'a self, program: &'a str) -> &'a str {
        program
            .split_once("Xcode-")
            .and_then(|(_, rest)| rest.split_once(".app"))
            .map(|(version, _)| version)
            .unwrap_or(&self.version)
    }

    fn respond(&self, command: &CommandSpec) -> CommandOutput {
        if self.failing.contains(&command.program) {
            return CommandOutput {
                status: 1,
                stdout: String::new(),
                stderr: format!("{} failed", command.program),
            };
        }
        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
        match (command.program.as_str(), args.as_slice()) {
            ("ditto", [_, target]) if self.partial_copy => {
                let contents = Path::new(target).join("Contents");
                std::fs::create_dir_all(&contents).unwrap();
                std::fs::write(contents.join("Info.plist"), "<plist/>").unwrap();
                failed("ditto: No space left on device")
            }
            ("mdutil", _) if self.index_enabled => ok("/:\n\tIndexing enabled.\n"),
            ("mdutil", _) => ok("/:\n\tIndexing disabled.\n"),
            ("mdfind", _) => ok(&self
                .installed
                .iter()
                .map(|path| format!("{}\n", path.display()))
                .collect::<String>()),
            ("ditto", [source, target]) => match copy_tree(Path::new(source), Path::new(target)) {
                Ok(()) => ok(""),
                Err(e) => failed(&e.to_string()),
            },
            ("rm", [_, path]) => {
                let path = Path::new(path);
                let _ = if path.is_dir() && !is_symlink(path) {
                    std::fs::remove_dir_all(path)
                } else {
                    std::fs::remove_file(path)
                };
                ok("")
            }
            ("ln", ["-sf", source, link]) => match std::os::unix::fs::symlink(source, link) {
                Ok(()) => ok(""),
                Err(e) => failed(&e.to_string()),
            },
            ("sw_vers", _) => ok("19C57\n"),
            ("getconf", _) => ok(&format!("{}/\n", self.user_cache_dir.display())),
            ("/usr/libexec/PlistBuddy", ["-c", print, ..]) if print.starts_with("Print") => {
                ok("11C29\n")
            }
            (program, _) if program.ends_with("xcodebuild") => {
                ok(&format!("Xcode {}\nBuild version 11C29\n", self.version_of(program)))
            }
            _ => ok(""),
        }
    }
}

#[async_trait]
impl SystemCommand for ScriptedSystem {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.commands.lock().unwrap().push(command.clone());
        Ok(self.respond(command))
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        status: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        status: 1,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|metadata| metadata.file_type().is_symlink())
        .unwrap_or(false)
}

fn copy_tree(source: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(target)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let destination = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &destination)?;
        } else {
            std::fs::copy(entry.path(), destination)?;
        }
    }
    Ok(())
}
