//! Action drain: converts one queued client event per maintenance sweep
//! into a call on the host's action surface.

use crate::registry::SessionRegistry;
use log::debug;
use parking_lot::Mutex;

/// A decoded, ready-to-dispatch instruction produced by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEvent {
    /// Run a builtin command of the host application.
    ExecBuiltin { command: String },
    /// Dispatch a mapped button/keyboard action by name.
    Button { name: String },
}

/// Host action surface consumed by the dispatcher.
///
/// Implementations may take non-trivial time or re-enter unrelated server
/// state; the dispatcher never holds the registry lock while calling in.
pub trait ActionSink: Send + Sync {
    /// Runs a builtin command, reporting success.
    fn execute_builtin(&self, command: &str) -> bool;

    /// Translates an action name to the host's action identifier.
    fn translate_button_name(&self, name: &str) -> u32;

    /// Best-effort audio feedback; the default does nothing.
    fn play_feedback_sound(&self, _action_id: u32, _action_name: &str) {}

    /// Hands the translated action to the host, reporting success.
    fn dispatch_action(&self, action_id: u32, action_name: &str) -> bool;
}

/// Dispatches at most one pending action across all sessions.
///
/// The first session with a ready action in registry order wins. The
/// action is copied out under the lock; the lock is released before the
/// sink runs. Returns `None` when no session had anything pending,
/// otherwise the sink's success result.
pub fn dispatch_next(registry: &Mutex<SessionRegistry>, sink: &dyn ActionSink) -> Option<bool> {
    let action = registry.lock().take_next_action()?;

    let result = match action {
        ActionEvent::ExecBuiltin { command } => sink.execute_builtin(&command),
        ActionEvent::Button { name } => {
            let action_id = sink.translate_button_name(&name);
            sink.play_feedback_sound(action_id, &name);
            sink.dispatch_action(action_id, &name)
        }
    };
    if !result {
        debug!("Host rejected dispatched action");
    }
    Some(result)
}
