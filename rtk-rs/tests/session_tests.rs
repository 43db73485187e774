//! End-to-end behaviour of the binding layer against the headless
//! interpreter: evaluation, conversions, callbacks and links together.

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::Rc;

use rtk::options::{command, text, textvariable, EventField};
use rtk::{
    bind, button, entry, event_generate, invoke, label, Config, Expr, IntVar, Point, Rect,
    Session, TextVar, TkError,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// A fresh headless session installed as this thread's current one, with a
/// counter proc `bump` that counts how often it runs.
fn session() -> Session {
    let s = Session::headless(Config::default()).unwrap();
    s.eval("set calls 0; proc bump {} { global calls; incr calls }").unwrap();
    Session::install(s.clone());
    s
}

fn calls(s: &Session) -> i64 {
    s.expr("set calls").int().unwrap()
}

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
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.borrow()).lines().map(str::to_owned).collect()
    }
}

// ── Evaluation ────────────────────────────────────────────────────────────────

#[test]
fn repeated_reads_submit_once() {
    let s = session();
    let e = s.expr("bump");
    for _ in 0..5 {
        assert_eq!(e.text().unwrap(), "1");
    }
    drop(e);
    assert_eq!(calls(&s), 1);
}

#[test]
fn unread_expressions_still_run() {
    let s = session();
    {
        let _a = s.expr("bump");
        let _b = Expr::starter("bump");
        let _c = s.expr("bump").clone();
    }
    assert_eq!(calls(&s), 3);
}

#[test]
fn error_suppresses_pending_drops_until_handled() {
    let s = session();
    let outcome: Result<(), TkError> = (|| {
        let _pending = s.expr("bump");
        s.expr("error {bad thing}").run()?;
        Ok(())
    })();
    let err = outcome.unwrap_err();
    assert_eq!(err.to_string(), "bad thing");
    assert!(s.in_error());
    drop(err);
    assert!(!s.in_error());
    assert_eq!(calls(&s), 0);

    drop(s.expr("bump"));
    assert_eq!(calls(&s), 1);
}

#[test]
fn dump_stream_sees_each_command_once() {
    let s = session();
    let sink = Sink::default();
    rtk::set_dump_stream(Some(Box::new(sink.clone()))).unwrap();
    let e = s.expr("bump") - Expr::literal("");
    e.int().unwrap();
    e.int().unwrap();
    drop(e);
    drop(button(".b") - text("Hi"));
    assert_eq!(sink.lines(), ["bump", "button .b -text \"Hi\""]);
}

// ── Conversions ───────────────────────────────────────────────────────────────

#[test]
fn numeric_conversions() {
    let s = session();
    assert_eq!(s.expr("set v 42").int().unwrap(), 42);
    assert_eq!(s.expr("set v 3.14").double().unwrap(), 3.14);
    let abc = s.expr("set v abc");
    assert!(matches!(abc.int(), Err(TkError::TypeConversion(_))));
    assert!(matches!(abc.double(), Err(TkError::TypeConversion(_))));
}

#[test]
fn composite_conversions() {
    let s = session();
    assert_eq!(s.expr("list").point().unwrap(), Point::new(0, 0));
    assert_eq!(s.expr("list 10 20").point().unwrap(), Point::new(10, 20));
    assert!(matches!(s.expr("list 5").point(), Err(TkError::TypeConversion(_))));
    assert_eq!(s.expr("list 1 2 3 4").rect().unwrap(), Rect::new(1, 2, 3, 4));
    assert!(matches!(s.expr("list 1 2 3").rect(), Err(TkError::TypeConversion(_))));
}

#[test]
fn result_decoder_reads_last_result() {
    let s = session();
    s.eval("list 7 2.5 {a b}").unwrap();
    assert_eq!(s.result_len().unwrap(), 3);
    assert_eq!(s.result_elem::<i64>(0).unwrap(), 7);
    assert_eq!(s.result_elem::<f64>(1).unwrap(), 2.5);
    assert_eq!(s.result_elem::<String>(2).unwrap(), "a b");
    assert!(matches!(s.result_elem::<String>(3), Err(TkError::Range(_))));
    assert!(matches!(s.result_elem::<i64>(2), Err(TkError::TypeConversion(_))));
}

// ── Callbacks ─────────────────────────────────────────────────────────────────

#[test]
fn callback_syncs_around_the_call() {
    let s = session();
    let name_var = TextVar::new("before");
    let var = s.link(&name_var).unwrap();
    s.sync_to_interpreter();

    let seen = Rc::new(RefCell::new(String::new()));
    let (seen2, nv) = (seen.clone(), name_var.clone());
    let cb = s
        .register(move |suffix: String| {
            *seen2.borrow_mut() = nv.get();
            nv.set(format!("{}-{suffix}", nv.get()));
        })
        .unwrap();

    s.eval(&format!("set {var} fresh; {cb} done")).unwrap();
    assert_eq!(*seen.borrow(), "fresh");
    assert_eq!(s.eval(&format!("set {var}")).unwrap(), "fresh-done");
}

#[test]
fn stale_callback_fails_inside_the_interpreter() {
    let s = session();
    let cb = s.register(|| 1i64).unwrap();
    s.eval(&format!("rename {cb} alias")).unwrap();
    let _ = s.unregister(&cb);

    // The interpreter sees a failed command; catch keeps it there.
    let caught = s.eval("catch alias msg; set msg").unwrap();
    assert_eq!(caught, rtk::error::UNKNOWN_CALLBACK_MSG);
    assert!(!s.in_error());
}

#[test]
fn button_invokes_registered_callback() {
    let s = session();
    let clicks = Rc::new(Cell::new(0));
    let c = clicks.clone();
    let cb = s.register(move || c.set(c.get() + 1)).unwrap();

    let path = (button(".ok") - text("OK") - command(&cb)).text().unwrap();
    assert_eq!(path, ".ok");
    (".ok" << invoke()).run().unwrap();
    (".ok" << invoke()).run().unwrap();
    assert_eq!(clicks.get(), 2);
}

#[test]
fn bound_event_fields_reach_the_callback() {
    let s = session();
    let hits = Rc::new(RefCell::new(Vec::new()));
    let h = hits.clone();
    let cb = s.register(move |x: i64, y: i64| h.borrow_mut().push((x, y))).unwrap();

    label(".l").run().unwrap();
    bind(".l", "<Button-1>", &cb, &[EventField::X, EventField::Y]).run().unwrap();
    (event_generate(".l", "<Button-1>") - Expr::literal(" -x 3 -y 4")).run().unwrap();
    assert_eq!(*hits.borrow(), [(3, 4)]);
}

#[test]
fn scoped_callback_is_removed() {
    let s = session();
    {
        let h = s.register_scoped(|| "hi").unwrap();
        assert_eq!(s.eval(h.name()).unwrap(), "hi");
    }
    assert_eq!(s.callback_count(), 0);
}

// ── Links ─────────────────────────────────────────────────────────────────────

#[test]
fn linked_int_round_trip_and_unlink() {
    let s = session();
    let count = IntVar::new(0);
    let name = s.link(&count).unwrap();
    s.eval(&format!("set {name} 7")).unwrap();
    s.sync_to_host();
    assert_eq!(count.get(), 7);

    s.unlink(&count);
    s.eval(&format!("set {name} 9")).unwrap();
    s.sync_to_host();
    assert_eq!(count.get(), 7);
}

#[test]
fn linked_text_is_published_by_sync() {
    let s = session();
    let greeting = TextVar::new("");
    let name = s.link(&greeting).unwrap();
    greeting.set("hello");
    s.sync_to_interpreter();
    assert_eq!(s.expr(format!("set {name}")).text().unwrap(), "hello");
}

#[test]
fn entry_text_variable_follows_host_string() {
    let s = session();
    let content = TextVar::new("typed");
    let guard = s.link_scoped(&content).unwrap();
    (entry(".e") - textvariable(guard.name())).run().unwrap();
    s.sync_to_interpreter();
    assert_eq!((".e" << rtk::get()).text().unwrap(), "typed");

    (".e" << rtk::insert("end", "!")).run().unwrap();
    s.sync_to_host();
    assert_eq!(content.get(), "typed!");
}

#[test]
fn event_loop_publishes_links_first() {
    let s = session();
    let t = TextVar::new("start");
    let name = s.link(&t).unwrap();
    t.set("ready");
    s.eval(&format!("after idle {{ set seen ${name} }}")).unwrap();
    rtk::run_event_loop().unwrap();
    assert_eq!(s.eval("set seen").unwrap(), "ready");
}
