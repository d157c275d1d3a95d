//! Hook notifier: external side effects on session start and end
//!
//! The recorder calls [`Notifier::notify`] with `record <dj>` when a session
//! starts and `done` when the DJ signs off. A session that cannot start
//! (stream unreachable) is closed with `done` right away, so every `record`
//! is followed by exactly one `done`. Notifiers must return
//! immediately; whatever they run happens in the background and its
//! outcome is only logged.

use std::path::PathBuf;
use tokio::process::Command;

/// Session lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    Record { dj: String },
    Done,
}

impl HookEvent {
    /// Argument list handed to the hook
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Record { dj } => vec!["record".to_string(), dj.clone()],
            Self::Done => vec!["done".to_string()],
        }
    }
}

/// Receiver of session lifecycle notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, event: HookEvent);
}

/// Logs notifications and does nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: HookEvent) {
        tracing::info!("hook: {}", event.args().join(" "));
    }
}

/// Runs an external script with the notification arguments
///
/// Must be used from within a Tokio runtime.
#[derive(Debug, Clone)]
pub struct ScriptNotifier {
    path: PathBuf,
}

impl ScriptNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Notifier for ScriptNotifier {
    fn notify(&self, event: HookEvent) {
        let args = event.args();
        tracing::info!("hook: {}", args.join(" "));

        let path = self.path.clone();
        tokio::spawn(async move {
            match Command::new(&path).args(&args).status().await {
                Ok(status) if status.success() => {
                    tracing::debug!(hook = %path.display(), "Hook finished");
                }
                Ok(status) => {
                    tracing::warn!(hook = %path.display(), args = ?args, "Hook failed: {}", status);
                }
                Err(e) => {
                    tracing::warn!(hook = %path.display(), args = ?args, "Cannot run hook: {}", e);
                }
            }
        });
    }
}

/// Script notifier when a hook path is configured, log-only otherwise
pub fn notifier_for(hook: Option<PathBuf>) -> Box<dyn Notifier> {
    match hook {
        Some(path) => Box::new(ScriptNotifier::new(path)),
        None => Box::new(LogNotifier),
    }
}
