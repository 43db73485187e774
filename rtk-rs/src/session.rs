//! The interpreter session.
//!
//! A [`Session`] owns one embedded interpreter together with everything the
//! binding layer tracks about it: the callback table, the three link tables,
//! the fatal-error counter, the dump stream, and the last failure of a
//! drop-time evaluation.  Vocabulary functions and unbound commands use the
//! thread's current session, created on first use by [`Session::current`].
//!
//! A session is never torn down explicitly; it lives until its last handle
//! (and the thread-local slot) goes away.

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::{Rc, Weak};

use crate::backend::headless::HeadlessInterp;
use crate::backend::Backend;
use crate::callback::CallbackTable;
use crate::config::Config;
use crate::decode::{FromTcl, ListResult};
use crate::error::{Result, TkError};
use crate::expr::Expr;
use crate::link::LinkTables;

thread_local! {
    static CURRENT: RefCell<Option<Session>> = const { RefCell::new(None) };
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Handle to an interpreter session.  Clones share the same interpreter.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Rc<SessionInner>,
}

pub(crate) struct SessionInner {
    backend: Rc<dyn Backend>,
    /// Same object as `backend` when the session runs headless.
    headless: Option<Rc<HeadlessInterp>>,
    config: Config,
    pub(crate) callbacks: RefCell<CallbackTable>,
    pub(crate) links: RefCell<LinkTables>,
    /// Number of live interpreter errors raised by this session.
    in_error: Cell<usize>,
    dump: RefCell<Option<Box<dyn Write>>>,
    deferred: RefCell<Option<TkError>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("namespace", &self.inner.config.namespace)
            .field("headless", &self.inner.headless.is_some())
            .field("in_error", &self.inner.in_error.get())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// The thread's current session, created on first use.
    ///
    /// The default session reads its configuration from the environment and
    /// uses the real Tcl/Tk library when built with the `tk` feature, the
    /// headless interpreter otherwise.
    pub fn current() -> Result<Session> {
        let existing = CURRENT
            .try_with(|c| c.borrow().clone())
            .map_err(|_| TkError::interpreter("no session available during thread shutdown"))?;
        if let Some(session) = existing {
            return Ok(session);
        }
        let session = Self::open_default()?;
        Self::install(session.clone());
        Ok(session)
    }

    /// Make `session` the thread's current session; returns the previous one.
    pub fn install(session: Session) -> Option<Session> {
        CURRENT
            .try_with(|c| c.borrow_mut().replace(session))
            .ok()
            .flatten()
    }

    #[cfg(not(feature = "tk"))]
    fn open_default() -> Result<Session> {
        Self::headless(Config::from_env())
    }

    #[cfg(feature = "tk")]
    fn open_default() -> Result<Session> {
        Self::tk(Config::from_env())
    }

    /// A session over a fresh in-process interpreter.
    pub fn headless(config: Config) -> Result<Session> {
        let interp = Rc::new(HeadlessInterp::new());
        Self::build(interp.clone(), Some(interp), config)
    }

    /// A session over the real Tcl/Tk library.
    #[cfg(feature = "tk")]
    pub fn tk(config: Config) -> Result<Session> {
        let backend = crate::backend::tcl::TclBackend::new().map_err(TkError::interpreter)?;
        Self::build(Rc::new(backend), None, config)
    }

    /// A session over any backend.
    pub fn with_backend(backend: Rc<dyn Backend>, config: Config) -> Result<Session> {
        Self::build(backend, None, config)
    }

    fn build(
        backend: Rc<dyn Backend>,
        headless: Option<Rc<HeadlessInterp>>,
        config: Config,
    ) -> Result<Session> {
        config.validate()?;

        // The private namespace is set up directly, never dumped or skipped.
        backend
            .eval(&format!("namespace eval {} {{}}", config.namespace))
            .map_err(TkError::interpreter)?;

        let dump: Option<Box<dyn Write>> = if config.dump_commands {
            Some(Box::new(std::io::stderr()))
        } else {
            None
        };
        tracing::debug!(
            target: "rtk::session",
            namespace = %config.namespace,
            headless = headless.is_some(),
            evaluate = config.evaluate,
            "session opened"
        );
        Ok(Session {
            inner: Rc::new(SessionInner {
                backend,
                headless,
                config,
                callbacks: RefCell::new(CallbackTable::default()),
                links: RefCell::new(LinkTables::default()),
                in_error: Cell::new(0),
                dump: RefCell::new(dump),
                deferred: RefCell::new(None),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        &*self.inner.backend
    }

    /// The in-process interpreter, when this session runs headless.
    pub fn headless_interp(&self) -> Option<&HeadlessInterp> {
        self.inner.headless.as_deref()
    }

    /// `true` if both handles refer to the same session.
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<SessionInner>) -> Option<Session> {
        weak.upgrade().map(|inner| Session { inner })
    }

    // ── Evaluation ───────────────────────────────────────────────────────

    /// A deferred command bound to this session.
    pub fn expr(&self, script: impl Into<String>) -> Expr {
        Expr::bound(self, script)
    }

    /// Submit `script` now and return its textual result.
    ///
    /// The script is copied to the dump stream first.  In record-only mode
    /// nothing is submitted and the result is empty.
    pub fn eval(&self, script: &str) -> Result<String> {
        self.dump(script);
        if !self.inner.config.evaluate {
            self.inner.backend.set_result("");
            return Ok(String::new());
        }
        tracing::debug!(target: "rtk::session", "eval: {script}");
        match self.inner.backend.eval(script) {
            Ok(()) => Ok(self.inner.backend.result()),
            Err(message) => {
                tracing::debug!(target: "rtk::session", "eval failed: {message}");
                Err(self.interpreter_error(message))
            }
        }
    }

    /// An interpreter error that keeps this session in its fatal-error
    /// state until dropped.
    pub(crate) fn interpreter_error(&self, message: impl Into<String>) -> TkError {
        TkError::Interpreter {
            message: message.into(),
            scope: Some(ErrorScope::enter(&self.inner)),
        }
    }

    fn dump(&self, script: &str) {
        if let Some(w) = self.inner.dump.borrow_mut().as_mut() {
            if let Err(e) = writeln!(w, "{script}").and_then(|()| w.flush()) {
                tracing::warn!(target: "rtk::session", "dump stream write failed: {e}");
            }
        }
    }

    /// Send a copy of every subsequent command to `stream`; `None` stops
    /// dumping.
    pub fn set_dump_stream(&self, stream: Option<Box<dyn Write>>) {
        *self.inner.dump.borrow_mut() = stream;
    }

    // ── Result decoding ──────────────────────────────────────────────────

    /// The interpreter's most recent result.
    pub fn last_result(&self) -> String {
        self.inner.backend.result()
    }

    /// Length of the last result read as a list.
    pub fn result_len(&self) -> Result<usize> {
        Ok(ListResult::parse(&self.last_result())?.len())
    }

    /// Element `index` of the last result read as a list.
    pub fn result_elem<T: FromTcl>(&self, index: usize) -> Result<T> {
        ListResult::parse(&self.last_result())?.get(index)
    }

    /// Overwrite the interpreter result (what a callback returns).
    pub fn set_result(&self, value: &str) {
        self.inner.backend.set_result(value);
    }

    // ── Error state ──────────────────────────────────────────────────────

    /// `true` while an interpreter error raised by this session is alive.
    pub fn in_error(&self) -> bool {
        self.inner.in_error.get() > 0
    }

    /// The last failure of a drop-time evaluation, if any.
    pub fn take_deferred_error(&self) -> Option<TkError> {
        self.inner.deferred.borrow_mut().take()
    }

    pub(crate) fn record_deferred(&self, e: TkError) {
        tracing::error!(target: "rtk::session", "deferred evaluation failed: {e}");
        *self.inner.deferred.borrow_mut() = Some(e.detach());
    }

    // ── Event loop ───────────────────────────────────────────────────────

    /// Publish linked host variables, then hand control to the interpreter's
    /// event loop until the application exits.
    pub fn run_event_loop(&self) {
        self.sync_to_interpreter();
        tracing::debug!(target: "rtk::session", "entering event loop");
        self.inner.backend.main_loop();
        tracing::debug!(target: "rtk::session", "event loop finished");
    }
}

// ── ErrorScope ────────────────────────────────────────────────────────────────

/// Marks its session as reporting a fatal interpreter error for as long as
/// it lives.  Carried inside [`TkError::Interpreter`].
pub struct ErrorScope {
    session: Weak<SessionInner>,
}

impl ErrorScope {
    fn enter(inner: &Rc<SessionInner>) -> Self {
        inner.in_error.set(inner.in_error.get() + 1);
        Self { session: Rc::downgrade(inner) }
    }
}

impl Drop for ErrorScope {
    fn drop(&mut self) {
        if let Some(inner) = self.session.upgrade() {
            inner.in_error.set(inner.in_error.get().saturating_sub(1));
        }
    }
}

impl std::fmt::Debug for ErrorScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ErrorScope")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// A `Write` sink tests can read back.
    #[derive(Clone, Default)]
    struct Sink(Rc<RefCell<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Sink {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    fn session() -> Session {
        Session::headless(Config::default()).unwrap()
    }

    #[test]
    fn eval_returns_result() {
        let s = session();
        assert_eq!(s.eval("set a 5").unwrap(), "5");
        assert_eq!(s.last_result(), "5");
    }

    #[test]
    fn namespace_is_created() {
        let s = Session::headless(Config { namespace: "App".into(), ..Config::default() }).unwrap();
        assert_eq!(s.config().callback_prefix(), "App::callback");
        assert!(s.headless_interp().is_some());
    }

    #[test]
    fn invalid_namespace_is_rejected() {
        let err = Session::headless(Config { namespace: "a b".into(), ..Config::default() })
            .unwrap_err();
        assert!(matches!(err, TkError::Config(_)));
    }

    #[test]
    fn error_scope_tracks_live_errors() {
        let s = session();
        assert!(!s.in_error());
        let e1 = s.eval("nosuch").unwrap_err();
        let e2 = s.eval("alsonot").unwrap_err();
        assert!(s.in_error());
        drop(e1);
        assert!(s.in_error());
        drop(e2);
        assert!(!s.in_error());
    }

    #[test]
    fn detached_error_releases_scope() {
        let s = session();
        let e = s.eval("nosuch").unwrap_err().detach();
        assert!(!s.in_error());
        assert_eq!(e.to_string(), "invalid command name \"nosuch\"");
    }

    #[test]
    fn result_decoding() {
        let s = session();
        s.eval("list 10 {a b} 2.5").unwrap();
        assert_eq!(s.result_len().unwrap(), 3);
        assert_eq!(s.result_elem::<i64>(0).unwrap(), 10);
        assert_eq!(s.result_elem::<String>(1).unwrap(), "a b");
        assert_eq!(s.result_elem::<f64>(2).unwrap(), 2.5);
        assert!(matches!(s.result_elem::<i64>(3), Err(TkError::Range(_))));
        assert!(matches!(s.result_elem::<i64>(1), Err(TkError::TypeConversion(_))));
        s.eval("set x {a {b}c}").unwrap();
        assert!(matches!(s.result_len(), Err(TkError::TypeConversion(_))));
    }

    #[test]
    fn dump_stream_receives_commands() {
        let s = session();
        let sink = Sink::default();
        s.set_dump_stream(Some(Box::new(sink.clone())));
        s.eval("set a 1").unwrap();
        s.eval("set b 2").unwrap();
        assert_eq!(sink.text(), "set a 1\nset b 2\n");
        s.set_dump_stream(None);
        s.eval("set c 3").unwrap();
        assert_eq!(sink.text(), "set a 1\nset b 2\n");
    }

    #[test]
    fn record_only_mode_skips_evaluation() {
        let s = Session::headless(Config { evaluate: false, ..Config::default() }).unwrap();
        let sink = Sink::default();
        s.set_dump_stream(Some(Box::new(sink.clone())));
        assert_eq!(s.eval("nosuch command").unwrap(), "");
        assert_eq!(sink.text(), "nosuch command\n");
    }

    #[test]
    fn current_is_per_thread_and_stable() {
        let a = Session::current().unwrap();
        let b = Session::current().unwrap();
        assert!(a.ptr_eq(&b));
        let other = std::thread::spawn(|| {
            let s = Session::current().unwrap();
            s.eval("set only_here 1").unwrap();
        });
        other.join().unwrap();
        assert!(a.eval("set only_here").is_err());
    }

    #[test]
    fn install_replaces_current() {
        let s = session();
        Session::install(s.clone());
        assert!(Session::current().unwrap().ptr_eq(&s));
    }

    #[test]
    fn set_result_overwrites() {
        let s = session();
        s.eval("set a 1").unwrap();
        s.set_result("42");
        assert_eq!(s.last_result(), "42");
    }
}
