//! In-memory executor double.
//!
//! Holds the checkout as a path → content map and answers shell commands
//! from scripted rules. Unmatched commands succeed with empty output.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{CommandOutput, Executor, SandboxProvider, normalize_relative};
use crate::errors::ExecutorError;

enum Reply {
    Output(CommandOutput),
    Error(String),
}

struct CommandRule {
    needle: String,
    replies: VecDeque<Reply>,
}

impl Reply {
    fn to_result(&self) -> Result<CommandOutput, ExecutorError> {
        match self {
            Reply::Output(out) => Ok(out.clone()),
            Reply::Error(msg) => Err(ExecutorError::Other(anyhow::anyhow!("{}", msg))),
        }
    }
}

#[derive(Default)]
struct Inner {
    files: BTreeMap<String, String>,
    rules: Vec<CommandRule>,
    unreadable: HashSet<String>,
    undeletable: HashSet<String>,
    commands: Vec<String>,
    writes: Vec<String>,
    removals: Vec<String>,
    shut_down: bool,
}

#[derive(Default)]
pub struct MemoryExecutor {
    inner: Mutex<Inner>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner(self, f: impl FnOnce(&mut Inner)) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            f(&mut inner);
        }
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, ExecutorError> {
        self.inner
            .lock()
            .map_err(|_| ExecutorError::Other(anyhow::anyhow!("memory executor lock poisoned")))
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        let path = path.trim_start_matches("./").to_string();
        let content = content.to_string();
        self.with_inner(move |i| {
            i.files.insert(path, content);
        })
    }

    /// Answer commands containing `needle` with `output`.
    pub fn on_command(self, needle: &str, output: CommandOutput) -> Self {
        self.on_command_sequence(needle, vec![output])
    }

    /// Answer commands containing `needle` with each output in turn, then repeat the last.
    pub fn on_command_sequence(self, needle: &str, outputs: Vec<CommandOutput>) -> Self {
        let rule = CommandRule {
            needle: needle.to_string(),
            replies: outputs.into_iter().map(Reply::Output).collect(),
        };
        self.with_inner(move |i| i.rules.push(rule))
    }

    /// Fail commands containing `needle` with an executor error.
    pub fn fail_command(self, needle: &str, message: &str) -> Self {
        let rule = CommandRule {
            needle: needle.to_string(),
            replies: VecDeque::from([Reply::Error(message.to_string())]),
        };
        self.with_inner(move |i| i.rules.push(rule))
    }

    /// Make reads of `path` fail even if the file exists.
    pub fn unreadable(self, path: &str) -> Self {
        let path = path.trim_start_matches("./").to_string();
        self.with_inner(move |i| {
            i.unreadable.insert(path);
        })
    }

    /// Make removals of `path` fail.
    pub fn undeletable(self, path: &str) -> Self {
        let path = path.trim_start_matches("./").to_string();
        self.with_inner(move |i| {
            i.undeletable.insert(path);
        })
    }

    pub fn file(&self, path: &str) -> Option<String> {
        let path = path.trim_start_matches("./");
        self.inner.lock().ok()?.files.get(path).cloned()
    }

    pub fn files(&self) -> BTreeMap<String, String> {
        self.inner.lock().map(|i| i.files.clone()).unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.inner.lock().map(|i| i.commands.clone()).unwrap_or_default()
    }

    pub fn commands_matching(&self, needle: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(needle)).count()
    }

    /// Paths written, in order (repeats included).
    pub fn writes(&self) -> Vec<String> {
        self.inner.lock().map(|i| i.writes.clone()).unwrap_or_default()
    }

    pub fn removals(&self) -> Vec<String> {
        self.inner.lock().map(|i| i.removals.clone()).unwrap_or_default()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().map(|i| i.shut_down).unwrap_or(false)
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    fn checkout_dir(&self) -> String {
        "/sandbox/repo".to_string()
    }

    async fn run_command(&self, cmd: &str, _timeout: Duration) -> Result<CommandOutput, ExecutorError> {
        let mut inner = self.lock()?;
        inner.commands.push(cmd.to_string());
        let Some(rule) = inner.rules.iter_mut().find(|r| cmd.contains(&r.needle)) else {
            return Ok(CommandOutput::default());
        };
        if rule.replies.len() > 1 {
            match rule.replies.pop_front() {
                Some(reply) => reply.to_result(),
                None => Ok(CommandOutput::default()),
            }
        } else {
            match rule.replies.front() {
                Some(reply) => reply.to_result(),
                None => Ok(CommandOutput::default()),
            }
        }
    }

    async fn read_file(&self, path: &str) -> Result<String, ExecutorError> {
        let path = normalize_relative(path)?;
        let inner = self.lock()?;
        if inner.unreadable.contains(&path) {
            return Err(ExecutorError::Io {
                path: path.clone().into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "unreadable"),
            });
        }
        inner
            .files
            .get(&path)
            .cloned()
            .ok_or(ExecutorError::NotFound { path })
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), ExecutorError> {
        let path = normalize_relative(path)?;
        let mut inner = self.lock()?;
        inner.writes.push(path.clone());
        inner.files.insert(path, content.to_string());
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), ExecutorError> {
        let path = normalize_relative(path)?;
        let mut inner = self.lock()?;
        if inner.undeletable.contains(&path) {
            return Err(ExecutorError::Io {
                path: path.into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "undeletable"),
            });
        }
        inner.removals.push(path.clone());
        match inner.files.remove(&path) {
            Some(_) => Ok(()),
            None => Err(ExecutorError::NotFound { path }),
        }
    }

    async fn shutdown(&self) -> Result<(), ExecutorError> {
        self.lock()?.shut_down = true;
        Ok(())
    }
}

/// Provider handing out pre-built memory executors, one per provision call.
///
/// When the queue runs dry the last executor is handed out again.
pub struct MemoryProvider {
    executors: Mutex<VecDeque<Arc<MemoryExecutor>>>,
    sessions: Mutex<Vec<String>>,
}

impl MemoryProvider {
    pub fn new(executors: Vec<Arc<MemoryExecutor>>) -> Self {
        Self {
            executors: Mutex::new(executors.into()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Session names provisioned so far.
    pub fn sessions(&self) -> Vec<String> {
        self.sessions.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SandboxProvider for MemoryProvider {
    async fn provision(&self, session: &str) -> Result<Arc<dyn Executor>, ExecutorError> {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.push(session.to_string());
        }
        let mut queue = self
            .executors
            .lock()
            .map_err(|_| ExecutorError::Other(anyhow::anyhow!("memory provider lock poisoned")))?;
        let executor = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        executor
            .map(|e| e as Arc<dyn Executor>)
            .ok_or_else(|| ExecutorError::Other(anyhow::anyhow!("no memory executors configured")))
    }
}
