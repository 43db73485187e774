//! The command buffer: one pending interpreter command.
//!
//! A [`Command`] accumulates text until something needs its value, then
//! submits `base + suffix` exactly once and caches the result.  A command
//! that nobody reads is still submitted when it is dropped, unless its
//! session is reporting an interpreter error at that moment.

use std::cell::RefCell;

use crate::error::Result;
use crate::session::Session;

#[derive(Default)]
struct State {
    base: String,
    /// Text that always stays at the end, after anything appended later.
    suffix: String,
    invoked: bool,
    result: String,
}

pub struct Command {
    /// `None` means the thread's current session, looked up on evaluation.
    session: Option<Session>,
    state: RefCell<State>,
}

impl Command {
    /// A command for the current session.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_suffix(text, "")
    }

    /// A command whose `suffix` stays last however much is appended.
    pub fn with_suffix(text: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            session: None,
            state: RefCell::new(State {
                base: text.into(),
                suffix: suffix.into(),
                ..State::default()
            }),
        }
    }

    /// A command for an explicit session.
    pub fn bound(session: &Session, text: impl Into<String>) -> Self {
        let mut cmd = Self::new(text);
        cmd.session = Some(session.clone());
        cmd
    }

    pub(crate) fn session(&self) -> Result<Session> {
        match &self.session {
            Some(s) => Ok(s.clone()),
            None => Session::current(),
        }
    }

    /// Add `fragment` after the text so far (before the suffix).
    /// Ignored once the command has been submitted.
    pub fn append(&self, fragment: &str) {
        let mut st = self.state.borrow_mut();
        if !st.invoked {
            st.base.push_str(fragment);
        }
    }

    /// Add `fragment` in front.  Ignored once the command has been submitted.
    pub fn prepend(&self, fragment: &str) {
        let mut st = self.state.borrow_mut();
        if !st.invoked {
            st.base.insert_str(0, fragment);
        }
    }

    /// The full command text as it would be submitted.
    pub fn text(&self) -> String {
        let st = self.state.borrow();
        format!("{}{}", st.base, st.suffix)
    }

    pub fn is_invoked(&self) -> bool {
        self.state.borrow().invoked
    }

    /// Submit the command unless that already happened.
    ///
    /// The command counts as submitted even when the interpreter rejects
    /// it, so a failed command is never sent twice.
    pub fn evaluate_once(&self) -> Result<()> {
        let script = {
            let mut st = self.state.borrow_mut();
            if st.invoked {
                return Ok(());
            }
            st.invoked = true;
            format!("{}{}", st.base, st.suffix)
        };
        // No borrow is held here: the script may call back into host code
        // that builds further commands.
        let result = self.session()?.eval(&script)?;
        self.state.borrow_mut().result = result;
        Ok(())
    }

    /// Submit if needed and return the cached result text.
    pub fn evaluate_text(&self) -> Result<String> {
        self.evaluate_once()?;
        Ok(self.state.borrow().result.clone())
    }

    /// Take over `other`'s text: it is appended here and `other` will never
    /// be submitted on its own.
    pub fn absorb(&self, other: &Command) {
        if std::ptr::eq(self, other) {
            return;
        }
        let taken = {
            let mut st = other.state.borrow_mut();
            if st.invoked {
                return;
            }
            st.invoked = true;
            format!("{}{}", st.base, st.suffix)
        };
        self.append(&taken);
    }
}

impl Drop for Command {
    fn drop(&mut self) {
        if self.state.get_mut().invoked {
            return;
        }
        let session = match self.session() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(target: "rtk::command", "dropping unsubmitted command: {e}");
                return;
            }
        };
        if session.in_error() {
            tracing::debug!(
                target: "rtk::command",
                "skipping deferred command while an error is reported: {}",
                self.text()
            );
            return;
        }
        if let Err(e) = self.evaluate_once() {
            session.record_deferred(e);
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("Command")
            .field("text", &format_args!("{}{}", st.base, st.suffix))
            .field("invoked", &st.invoked)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
