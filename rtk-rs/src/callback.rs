//! The callback bridge: host closures as interpreter commands.
//!
//! Every registration takes the next integer slot and becomes the command
//! `<ns>::callback<slot>`.  When the interpreter invokes that command the
//! session copies linked text variables into the host, runs the closure with
//! the call's arguments, and publishes linked variables back.
//!
//! Closures of up to four parameters are accepted directly; each parameter
//! is converted with [`FromTcl`] from the matching call argument:
//!
//! ```
//! use rtk::{Config, Session};
//!
//! let s = Session::headless(Config::default())?;
//! let name = s.register(|a: i64, b: i64| a + b)?;
//! assert_eq!(s.eval(&format!("{name} 2 3"))?, "5");
//! # Ok::<(), rtk::TkError>(())
//! ```

use std::collections::HashMap;
use std::fmt::Display;
use std::rc::Rc;

use crate::backend::{CommandProc, DeleteProc};
use crate::decode::{format_double, FromTcl};
use crate::error::{Result, TkError, UNKNOWN_CALLBACK_MSG};
use crate::session::Session;

type SlotFn = Rc<dyn Fn(&Params<'_>) -> Result<Option<String>>>;

#[derive(Default)]
pub(crate) struct CallbackTable {
    next: usize,
    slots: HashMap<usize, SlotFn>,
}

impl CallbackTable {
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

// ── Params ────────────────────────────────────────────────────────────────────

/// Arguments of one callback invocation.
///
/// Index 0 is the command name; the caller's arguments start at 1.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    args: &'a [String],
}

impl<'a> Params<'a> {
    pub fn new(args: &'a [String]) -> Self {
        Self { args }
    }

    /// Argument `index` (1-based) converted to `T`.
    pub fn get<T: FromTcl>(&self, index: usize) -> Result<T> {
        if index < 1 || index >= self.args.len() {
            return Err(TkError::range(format!(
                "parameter number {index} out of valid range"
            )));
        }
        T::from_tcl(&self.args[index])
    }

    /// Number of arguments after the command name.
    pub fn count(&self) -> usize {
        self.args.len().saturating_sub(1)
    }

    /// The full argument vector, command name included.
    pub fn raw(&self) -> &'a [String] {
        self.args
    }
}

// ── Return values ─────────────────────────────────────────────────────────────

/// What a callback can hand back as its command result.
pub trait CallbackReturn {
    /// `None` leaves the result empty.
    fn into_tcl(self) -> Result<Option<String>>;
}

impl CallbackReturn for () {
    fn into_tcl(self) -> Result<Option<String>> {
        Ok(None)
    }
}

impl CallbackReturn for bool {
    fn into_tcl(self) -> Result<Option<String>> {
        Ok(Some(if self { "1" } else { "0" }.to_owned()))
    }
}

impl CallbackReturn for i64 {
    fn into_tcl(self) -> Result<Option<String>> {
        Ok(Some(self.to_string()))
    }
}

impl CallbackReturn for i32 {
    fn into_tcl(self) -> Result<Option<String>> {
        Ok(Some(self.to_string()))
    }
}

impl CallbackReturn for f64 {
    fn into_tcl(self) -> Result<Option<String>> {
        Ok(Some(format_double(self)))
    }
}

impl CallbackReturn for String {
    fn into_tcl(self) -> Result<Option<String>> {
        Ok(Some(self))
    }
}

impl CallbackReturn for &'static str {
    fn into_tcl(self) -> Result<Option<String>> {
        Ok(Some(self.to_owned()))
    }
}

/// An `Err` fails the interpreter command with the error's text.
impl<T: CallbackReturn, E: Display> CallbackReturn for std::result::Result<T, E> {
    fn into_tcl(self) -> Result<Option<String>> {
        match self {
            Ok(v) => v.into_tcl(),
            Err(e) => Err(TkError::interpreter(e.to_string())),
        }
    }
}

// ── Typed closures ────────────────────────────────────────────────────────────

/// A closure the bridge can store.  `Marker` only separates the arities.
pub trait IntoCallback<Marker> {
    #[doc(hidden)]
    fn into_slot(self) -> SlotFn;
}

macro_rules! impl_into_callback {
    ($($arg:ident => $idx:literal),*) => {
        impl<F, R, $($arg,)*> IntoCallback<fn($($arg,)*) -> R> for F
        where
            F: Fn($($arg),*) -> R + 'static,
            R: CallbackReturn,
            $($arg: FromTcl,)*
        {
            #[allow(unused_variables)]
            fn into_slot(self) -> SlotFn {
                Rc::new(move |p: &Params<'_>| (self)($(p.get::<$arg>($idx)?),*).into_tcl())
            }
        }
    };
}

impl_into_callback!();
impl_into_callback!(A => 1);
impl_into_callback!(A => 1, B => 2);
impl_into_callback!(A => 1, B => 2, C => 3);
impl_into_callback!(A => 1, B => 2, C => 3, D => 4);

// ── Registration ──────────────────────────────────────────────────────────────

impl Session {
    /// Register `f` and return its generated command name.
    ///
    /// The registration lives until [`Session::unregister`] or until the
    /// interpreter deletes the command.
    pub fn register<M>(&self, f: impl IntoCallback<M>) -> Result<String> {
        self.register_slot(f.into_slot())
    }

    /// Register a closure that reads its arguments itself.
    pub fn register_raw<R: CallbackReturn>(
        &self,
        f: impl Fn(&Params<'_>) -> R + 'static,
    ) -> Result<String> {
        self.register_slot(Rc::new(move |p: &Params<'_>| f(p).into_tcl()))
    }

    /// Register `f` for as long as the returned handle lives.
    pub fn register_scoped<M>(&self, f: impl IntoCallback<M>) -> Result<CallbackHandle> {
        let name = self.register(f)?;
        Ok(CallbackHandle { session: Some(self.clone()), name })
    }

    fn register_slot(&self, f: SlotFn) -> Result<String> {
        let slot = {
            let mut table = self.inner.callbacks.borrow_mut();
            let slot = table.next;
            table.next += 1;
            table.slots.insert(slot, f);
            slot
        };
        let name = format!("{}{slot}", self.config().callback_prefix());

        let weak = self.downgrade();
        let proc: CommandProc = Rc::new(move |argv: &[String]| {
            let session =
                Session::upgrade(&weak).ok_or_else(|| UNKNOWN_CALLBACK_MSG.to_owned())?;
            session.dispatch(slot, argv).map_err(|e| e.detach().to_string())
        });
        let weak = self.downgrade();
        let on_delete: DeleteProc = Box::new(move || {
            if let Some(session) = Session::upgrade(&weak) {
                session.inner.callbacks.borrow_mut().slots.remove(&slot);
                tracing::debug!(target: "rtk::callback", slot, "callback command deleted");
            }
        });

        if let Err(msg) = self.backend().create_command(&name, proc, on_delete) {
            self.inner.callbacks.borrow_mut().slots.remove(&slot);
            return Err(self.interpreter_error(msg));
        }
        tracing::debug!(target: "rtk::callback", "registered {name}");
        Ok(name)
    }

    fn dispatch(&self, slot: usize, argv: &[String]) -> Result<String> {
        let f = self
            .inner
            .callbacks
            .borrow()
            .slots
            .get(&slot)
            .cloned()
            .ok_or(TkError::UnknownCallback)?;
        tracing::trace!(target: "rtk::callback", slot, args = argv.len(), "dispatch");

        self.sync_to_host();
        let out = f(&Params::new(argv))?;
        self.sync_to_interpreter();
        Ok(out.unwrap_or_default())
    }

    /// Drop the registration behind `name` and delete its command.
    ///
    /// Names that are not (or no longer) registered are ignored.  Fails
    /// only if the interpreter refuses to delete the command.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let Some(slot) = self.slot_of(name) else {
            return Ok(());
        };
        if self.inner.callbacks.borrow_mut().slots.remove(&slot).is_none() {
            return Ok(());
        }
        tracing::debug!(target: "rtk::callback", "unregistering {name}");
        self.backend()
            .delete_command(name)
            .map_err(|msg| self.interpreter_error(msg))
    }

    /// Number of live registrations.
    pub fn callback_count(&self) -> usize {
        self.inner.callbacks.borrow().len()
    }

    /// Slot behind a generated name.  Only the exact spelling this session
    /// generates is accepted, so `callback00` never aliases `callback0`.
    fn slot_of(&self, name: &str) -> Option<usize> {
        let prefix = self.config().callback_prefix();
        let digits = name.trim_start_matches("::").strip_prefix(prefix.as_str())?;
        let slot: usize = digits.parse().ok()?;
        (slot.to_string() == digits).then_some(slot)
    }
}

// ── CallbackHandle ────────────────────────────────────────────────────────────

/// A registration that is removed when the handle is dropped.
#[derive(Debug)]
pub struct CallbackHandle {
    session: Option<Session>,
    name: String,
}

impl CallbackHandle {
    /// The generated command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unregister now, reporting failure instead of logging it.
    pub fn unregister(mut self) -> Result<()> {
        match self.session.take() {
            Some(s) => s.unregister(&self.name),
            None => Ok(()),
        }
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(s) = self.session.take() {
            if let Err(e) = s.unregister(&self.name) {
                tracing::warn!(target: "rtk::callback", "failed to unregister {}: {e}", self.name);
            }
        }
    }
}

impl Display for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::link::TextVar;
    use std::cell::{Cell, RefCell};

    fn session() -> Session {
        Session::headless(Config::default()).unwrap()
    }

    #[test]
    fn names_follow_slots() {
        let s = session();
        let a = s.register(|| ()).unwrap();
        let b = s.register(|| ()).unwrap();
        assert_eq!(a, "rtk::callback0");
        assert_eq!(b, "rtk::callback1");
        assert_eq!(s.callback_count(), 2);
    }

    #[test]
    fn typed_arguments_and_results() {
        let s = session();
        let add = s.register(|a: i64, b: i64| a + b).unwrap();
        assert_eq!(s.eval(&format!("{add} 2 40")).unwrap(), "42");

        let greet = s.register(|who: String| format!("hello {who}")).unwrap();
        assert_eq!(s.eval(&format!("{greet} {{big world}}")).unwrap(), "hello big world");

        let half = s.register(|x: f64| x / 2.0).unwrap();
        assert_eq!(s.eval(&format!("{half} 3")).unwrap(), "1.5");

        let yes = s.register(|| true).unwrap();
        assert_eq!(s.eval(&yes).unwrap(), "1");
    }

    #[test]
    fn bad_argument_fails_the_command() {
        let s = session();
        let f = s.register(|n: i64| n).unwrap();
        let err = s.eval(&format!("{f} abc")).unwrap_err();
        assert_eq!(err.to_string(), "expected integer but got \"abc\"");
        let err = s.eval(&f).unwrap_err();
        assert_eq!(err.to_string(), "parameter number 1 out of valid range");
    }

    #[test]
    fn params_range() {
        let argv = vec!["cb".to_owned(), "7".to_owned()];
        let p = Params::new(&argv);
        assert_eq!(p.count(), 1);
        assert_eq!(p.get::<i64>(1).unwrap(), 7);
        assert!(matches!(p.get::<i64>(0), Err(TkError::Range(_))));
        assert!(matches!(p.get::<i64>(2), Err(TkError::Range(_))));
    }

    #[test]
    fn raw_callback_sees_all_arguments() {
        let s = session();
        let f = s.register_raw(|p: &Params<'_>| p.count() as i64).unwrap();
        assert_eq!(s.eval(&format!("{f} a b c")).unwrap(), "3");
    }

    #[test]
    fn host_error_becomes_interpreter_error() {
        let s = session();
        let f = s.register(|| -> std::result::Result<(), String> { Err("nope".into()) }).unwrap();
        assert_eq!(s.eval(&format!("catch {f} msg; set msg")).unwrap(), "nope");
        assert!(!s.in_error());
    }

    #[test]
    fn callback_can_evaluate_commands() {
        let s = session();
        let inner = s.clone();
        let f = s
            .register(move |x: i64| -> Result<i64> { inner.expr(format!("expr {{{x} * 2}}")).int() })
            .unwrap();
        assert_eq!(s.eval(&format!("{f} 21")).unwrap(), "42");
    }

    #[test]
    fn unregister_deletes_command() {
        let s = session();
        let f = s.register(|| ()).unwrap();
        s.unregister(&f).unwrap();
        assert_eq!(s.callback_count(), 0);
        let err = s.eval(&f).unwrap_err();
        assert_eq!(err.to_string(), format!("invalid command name \"{f}\""));
        // unknown or repeated names are ignored
        s.unregister(&f).unwrap();
        s.unregister("not::a::callback").unwrap();
    }

    #[test]
    fn stale_slot_reports_unknown_callback() {
        let s = session();
        let f = s.register(|| ()).unwrap();
        s.eval(&format!("rename {f} kept")).unwrap();
        assert!(s.unregister(&f).unwrap_err().is_interpreter());
        let err = s.eval("kept").unwrap_err();
        assert_eq!(err.to_string(), UNKNOWN_CALLBACK_MSG);
    }

    #[test]
    fn only_generated_spelling_unregisters() {
        let s = session();
        let live = s.register(|| "alive").unwrap();
        s.register(|| ()).unwrap();
        for alias in ["rtk::callback00", "rtk::callback+0", "::rtk::callback000"] {
            s.unregister(alias).unwrap();
        }
        assert_eq!(s.callback_count(), 2);
        assert_eq!(s.eval(&live).unwrap(), "alive");

        // The leading `::` is still accepted.
        s.unregister(&format!("::{live}")).unwrap();
        assert_eq!(s.callback_count(), 1);
    }

    #[test]
    fn failed_callback_skips_post_sync() {
        let s = session();
        let text = TextVar::new("host");
        let var = s.link(&text).unwrap();
        s.sync_to_interpreter();

        let seen = Rc::new(RefCell::new(String::new()));
        let (seen2, t) = (seen.clone(), text.clone());
        let f = s
            .register(move || -> std::result::Result<(), String> {
                *seen2.borrow_mut() = t.get();
                t.set("changed");
                Err("failed".into())
            })
            .unwrap();

        s.eval(&format!("set {var} fresh")).unwrap();
        assert_eq!(s.eval(&format!("catch {f} msg; set msg")).unwrap(), "failed");
        assert_eq!(*seen.borrow(), "fresh");
        assert_eq!(text.get(), "changed");
        assert_eq!(s.eval(&format!("set {var}")).unwrap(), "fresh");
    }

    #[test]
    fn interpreter_delete_frees_slot() {
        let s = session();
        let f = s.register(|| ()).unwrap();
        s.eval(&format!("rename {f} {{}}")).unwrap();
        assert_eq!(s.callback_count(), 0);
    }

    #[test]
    fn handle_unregisters_on_drop() {
        let s = session();
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let name = {
            let h = s.register_scoped(move || c.set(c.get() + 1)).unwrap();
            s.eval(&h.to_string()).unwrap();
            h.name().to_owned()
        };
        assert_eq!(calls.get(), 1);
        assert!(s.eval(&name).is_err());
        assert_eq!(s.callback_count(), 0);

        let h = s.register_scoped(|| ()).unwrap();
        h.unregister().unwrap();
        assert_eq!(s.callback_count(), 0);
    }
}
