//! Test-only in-memory remote host.
//!
//! [`FakeSession`] records every call and simulates the handful of shell
//! commands the operations issue (`mkdir -p`, `test -d`, `rm -rf`, `mv -f`,
//! `ls -1`, `which`, `-m venv`) against an in-memory directory set and file
//! map. Scripted responses override the simulation for commands containing
//! a given substring, which is how tests inject remote failures.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::types::{CommandResult, InterpreterInstance};
use crate::error::{DeployError, Result};
use crate::io::session::RemoteSession;

/// One recorded session call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Run {
        command: String,
        elevated: bool,
    },
    Put {
        local: PathBuf,
        remote: String,
        contents: Vec<u8>,
    },
}

#[derive(Default)]
pub struct FakeSession {
    state: RefCell<FakeState>,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    scripted: Vec<(String, CommandResult)>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with `/usr/bin/python<v>` binaries for each version.
    pub fn with_interpreters(versions: &[&str]) -> Self {
        let session = Self::new();
        for version in versions {
            session.add_file(&format!("/usr/bin/python{version}"), b"");
        }
        session
    }

    /// Answer any command containing `pattern` with `result` instead of
    /// simulating it. Earlier scripts win.
    pub fn respond(&self, pattern: &str, result: CommandResult) {
        self.state
            .borrow_mut()
            .scripted
            .push((pattern.to_string(), result));
    }

    /// Fail any command containing `pattern` with `exit_code`.
    pub fn fail_on(&self, pattern: &str, exit_code: i32, stderr: &str) {
        self.respond(
            pattern,
            CommandResult {
                stdout: String::new(),
                stderr: stderr.to_string(),
                exit_code,
            },
        );
    }

    /// Seed a remote file (parents are created).
    pub fn add_file(&self, remote: &str, contents: &[u8]) {
        let mut state = self.state.borrow_mut();
        state.add_dir_with_parents(parent_of(remote));
        state.files.insert(normalize(remote), contents.to_vec());
    }

    /// Seed a remote directory (parents are created).
    pub fn add_dir(&self, remote: &str) {
        self.state.borrow_mut().add_dir_with_parents(remote);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Commands passed to `exec`, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Run { command, .. } => Some(command.clone()),
                Call::Put { .. } => None,
            })
            .collect()
    }

    /// Commands that were run elevated, in order.
    pub fn elevated_commands(&self) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Run {
                    command,
                    elevated: true,
                } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(local, remote)` pairs of every file copy, in order.
    pub fn puts(&self) -> Vec<(PathBuf, String)> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Put { local, remote, .. } => Some((local.clone(), remote.clone())),
                Call::Run { .. } => None,
            })
            .collect()
    }

    pub fn dirs(&self) -> BTreeSet<String> {
        self.state.borrow().dirs.clone()
    }

    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        self.state.borrow().files.clone()
    }

    pub fn has_dir(&self, remote: &str) -> bool {
        self.state.borrow().dirs.contains(&normalize(remote))
    }

    pub fn file(&self, remote: &str) -> Option<Vec<u8>> {
        self.state.borrow().files.get(&normalize(remote)).cloned()
    }
}

impl RemoteSession for FakeSession {
    fn exec(&self, command: &str, elevated: bool) -> Result<CommandResult> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Run {
            command: command.to_string(),
            elevated,
        });
        if let Some((_, result)) = state
            .scripted
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
        {
            return Ok(result.clone());
        }
        Ok(state.simulate(command))
    }

    fn put_file(&self, local: &Path, remote: &str) -> Result<()> {
        let contents = fs::read(local)
            .map_err(|e| DeployError::io(format!("read {}", local.display()), e))?;
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Put {
            local: local.to_path_buf(),
            remote: remote.to_string(),
            contents: contents.clone(),
        });
        let parent = parent_of(remote);
        if parent != "/" && !state.dirs.contains(parent) {
            return Err(DeployError::io(
                format!("scp {remote}"),
                std::io::Error::new(std::io::ErrorKind::NotFound, "remote parent missing"),
            ));
        }
        state.files.insert(normalize(remote), contents);
        Ok(())
    }
}

impl FakeState {
    fn simulate(&mut self, command: &str) -> CommandResult {
        // `. <env>/bin/activate && <cmd>`: only the activation check matters.
        if let Some(rest) = command.strip_prefix(". ") {
            let script = rest.split_whitespace().next().unwrap_or_default();
            if !self.files.contains_key(script) {
                return failed(1, &format!("{script}: No such file or directory"));
            }
            return ok("");
        }

        let words: Vec<&str> = command.split_whitespace().collect();
        match words.as_slice() {
            ["mkdir", "-p", targets @ ..] => {
                for target in targets {
                    self.add_dir_with_parents(target);
                }
                ok("")
            }
            ["test", "-d", target] => {
                if self.dirs.contains(&normalize(target)) {
                    ok("")
                } else {
                    failed(1, "")
                }
            }
            ["rm", "-rf", target] => {
                let target = normalize(target);
                let nested = format!("{target}/");
                self.dirs
                    .retain(|d| d != &target && !d.starts_with(&nested));
                self.files
                    .retain(|f, _| f != &target && !f.starts_with(&nested));
                ok("")
            }
            ["mv", "-f", from, to] => match self.files.remove(&normalize(from)) {
                Some(contents) => {
                    self.files.insert(normalize(to), contents);
                    ok("")
                }
                None => failed(1, &format!("mv: cannot stat '{from}'")),
            },
            ["ls", "-1", pattern] => {
                let prefix = pattern.split('*').next().unwrap_or_default();
                let listing: Vec<&String> =
                    self.files.keys().filter(|f| f.starts_with(prefix)).collect();
                if listing.is_empty() {
                    return failed(2, &format!("ls: cannot access '{pattern}'"));
                }
                let mut out = String::new();
                for path in listing {
                    out.push_str(path);
                    out.push('\n');
                }
                ok(&out)
            }
            ["which", program] => {
                let path = format!("/usr/bin/{program}");
                if self.files.contains_key(&path) {
                    ok(&format!("{path}\n"))
                } else {
                    failed(1, "")
                }
            }
            [_, "-m", "venv", target] => {
                let target = normalize(target);
                self.add_dir_with_parents(&format!("{target}/bin"));
                self.files
                    .insert(format!("{target}/bin/activate"), Vec::new());
                ok("")
            }
            _ => ok(""),
        }
    }

    fn add_dir_with_parents(&mut self, path: &str) {
        let path = normalize(path);
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            self.dirs.insert(current.clone());
        }
    }
}

fn ok(stdout: &str) -> CommandResult {
    CommandResult {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: 0,
    }
}

fn failed(exit_code: i32, stderr: &str) -> CommandResult {
    CommandResult {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code,
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent_of(path: &str) -> &str {
    crate::core::paths::parent(path)
}

/// Interpreter value as discovery would produce it for `/usr/bin/python<v>`.
pub fn interpreter(version: &str) -> InterpreterInstance {
    InterpreterInstance {
        version: version.to_string(),
        executable_path: format!("/usr/bin/python{version}"),
    }
}
