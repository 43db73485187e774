//! The seam between the binding core and the embedded interpreter.
//!
//! The core only ever talks to a [`Backend`]: submit one script, read one
//! textual result, register host commands, and link host variables.  Two
//! implementations exist:
//!
//! | Backend                         | When                                 |
//! |---------------------------------|--------------------------------------|
//! | [`headless::HeadlessInterp`]    | default; in-process Tcl subset       |
//! | `tcl::TclBackend`               | `--features tk`; real Tcl/Tk via C   |
//!
//! All methods take `&self`: a command handler runs *inside* an `eval` and
//! may itself call `eval` again, so implementations keep their mutable state
//! behind short-lived interior borrows.

use std::cell::Cell;
use std::rc::Rc;

pub mod headless;
#[cfg(feature = "tk")]
pub mod tcl;

/// Host implementation of an interpreter command.
///
/// Receives the full argument vector (element 0 is the command name) and
/// returns the command result or an error message for the interpreter.
pub type CommandProc = Rc<dyn Fn(&[String]) -> Result<String, String>>;

/// Called once when the interpreter deletes a host command, whatever the
/// reason (explicit delete, `rename … {}`, interpreter teardown).
pub type DeleteProc = Box<dyn FnOnce()>;

/// Host storage an interpreter variable is linked to.
#[derive(Clone)]
pub enum LinkTarget {
    /// The interpreter reads and writes the cell directly.
    Int(Rc<Cell<i64>>),
    Double(Rc<Cell<f64>>),
    /// The interpreter reads and writes a buffer it owns, seeded with the
    /// given text; see [`Backend::set_text_buffer`] and
    /// [`Backend::text_buffer`].
    Text(String),
}

impl std::fmt::Debug for LinkTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkTarget::Int(c) => write!(f, "Int({})", c.get()),
            LinkTarget::Double(c) => write!(f, "Double({})", c.get()),
            LinkTarget::Text(s) => write!(f, "Text({s:?})"),
        }
    }
}

/// An embedded interpreter.
pub trait Backend {
    /// Evaluate `script`.  On success the result is available through
    /// [`Backend::result`]; on failure the error message is returned and
    /// also left as the result.
    fn eval(&self, script: &str) -> Result<(), String>;

    /// The most recently produced result.
    fn result(&self) -> String;

    /// Overwrite the current result.
    fn set_result(&self, value: &str);

    /// Register `name` as an invocable command.
    fn create_command(&self, name: &str, proc: CommandProc, on_delete: DeleteProc)
        -> Result<(), String>;

    /// Delete a command; runs its [`DeleteProc`].  Unknown names are an error.
    fn delete_command(&self, name: &str) -> Result<(), String>;

    /// Link interpreter variable `name` to host storage.
    fn link_var(&self, name: &str, target: LinkTarget) -> Result<(), String>;

    /// Remove a link; for text links this also frees the mirror buffer.
    fn unlink_var(&self, name: &str);

    /// Tell the interpreter the host value of a link changed.
    fn update_linked_var(&self, name: &str);

    /// Replace the mirror buffer of a text link with a fresh copy of `text`.
    fn set_text_buffer(&self, name: &str, text: &str);

    /// Current mirror buffer content of a text link; `None` when the buffer
    /// is null (or `name` is not a text link).
    fn text_buffer(&self, name: &str) -> Option<String>;

    /// Run the event loop until the application exits.
    fn main_loop(&self);
}
