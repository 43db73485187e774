//! In-process Tcl-subset interpreter.
//!
//! Stands in for the real Tcl/Tk library when no display (or no Tcl
//! installation) is available.  It speaks enough Tcl for the binding layer
//! to be exercised end to end:
//!
//! - word parsing with `{…}`, `"…"`, `[…]`, `$name`, `${name}` and
//!   backslash escapes; namespace-qualified names (`rtk::variable0`)
//! - variables, procs, control flow, `expr`, list commands
//! - host commands with delete callbacks, linked variables
//! - an `after` queue drained by [`Backend::main_loop`]
//! - a recorded widget set (see `widgets.rs`) without any rendering
//!
//! `puts` writes into an in-memory buffer readable with
//! [`HeadlessInterp::take_output`].

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Instant;

use super::{Backend, CommandProc, DeleteProc, LinkTarget};
use crate::decode::{format_double, parse_double, parse_int};
use crate::error::TkError;

mod commands;
mod expr;
mod parser;
mod widgets;

/// Maximum nesting of command invocations before evaluation is aborted.
const MAX_DEPTH: usize = 200;

// ── Control flow ──────────────────────────────────────────────────────────────

/// Non-normal completion of a script.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    Error(String),
    Return(String),
    Break,
    Continue,
    /// `exit` was called; unwinds to the outermost evaluation.
    Exit(i32),
}

impl Flow {
    pub(crate) fn error(msg: impl Into<String>) -> Self {
        Flow::Error(msg.into())
    }
}

impl From<TkError> for Flow {
    fn from(e: TkError) -> Self {
        Flow::Error(e.to_string())
    }
}

pub(crate) type Builtin = fn(&HeadlessInterp, &[String]) -> Result<String, Flow>;

#[derive(Clone)]
enum Cmd {
    Builtin(Builtin),
    Proc(Rc<ProcDef>),
    Host(CommandProc),
    Widget,
}

struct ProcDef {
    /// `(name, default)`; a final parameter named `args` collects the rest.
    params: Vec<(String, Option<String>)>,
    body: String,
}

struct Entry {
    cmd: Cmd,
    on_delete: Option<DeleteProc>,
}

// ── Variables ─────────────────────────────────────────────────────────────────

enum Link {
    Int(Rc<Cell<i64>>),
    Double(Rc<Cell<f64>>),
    /// The mirror buffer; `None` is a null buffer.
    Text(Option<String>),
}

impl Link {
    fn read(&self) -> String {
        match self {
            Link::Int(c) => c.get().to_string(),
            Link::Double(c) => format_double(c.get()),
            Link::Text(buf) => buf.clone().unwrap_or_default(),
        }
    }

    fn write(&mut self, name: &str, value: &str) -> Result<(), String> {
        match self {
            Link::Int(c) => {
                let n = parse_int(value).map_err(|_| {
                    format!("can't set \"{name}\": variable must have integer value")
                })?;
                c.set(n);
            }
            Link::Double(c) => {
                let x = parse_double(value).map_err(|_| {
                    format!("can't set \"{name}\": variable must have real value")
                })?;
                c.set(x);
            }
            Link::Text(buf) => *buf = Some(value.to_owned()),
        }
        Ok(())
    }
}

#[derive(Default)]
struct Frame {
    vars: HashMap<String, String>,
    /// Names declared with `global` in this proc frame.
    globals: HashSet<String>,
}

// ── Event queue ───────────────────────────────────────────────────────────────

struct AfterEvent {
    id: u64,
    /// `None` for idle callbacks, which run before timers.
    due: Option<Instant>,
    script: String,
}

// ── HeadlessInterp ────────────────────────────────────────────────────────────

pub struct HeadlessInterp {
    frames: RefCell<Vec<Frame>>,
    commands: RefCell<HashMap<String, Entry>>,
    links: RefCell<HashMap<String, Link>>,
    result: RefCell<String>,
    output: RefCell<Vec<String>>,
    events: RefCell<Vec<AfterEvent>>,
    next_event: Cell<u64>,
    exit_code: Cell<Option<i32>>,
    depth: Cell<usize>,
    tk: RefCell<widgets::TkState>,
}

impl Default for HeadlessInterp {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessInterp {
    /// A fresh interpreter with the built-in commands and the `.` window.
    pub fn new() -> Self {
        let interp = Self {
            frames: RefCell::new(vec![Frame::default()]),
            commands: RefCell::new(HashMap::new()),
            links: RefCell::new(HashMap::new()),
            result: RefCell::new(String::new()),
            output: RefCell::new(Vec::new()),
            events: RefCell::new(Vec::new()),
            next_event: Cell::new(0),
            exit_code: Cell::new(None),
            depth: Cell::new(0),
            tk: RefCell::new(widgets::TkState::default()),
        };
        commands::register_all(&interp);
        widgets::register_all(&interp);
        interp
    }

    /// Lines written by `puts` since the last call.
    pub fn take_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    /// Exit status once `exit` has been called (or `.` destroyed).
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code.get()
    }

    /// Number of queued `after` events.
    pub fn pending_events(&self) -> usize {
        self.events.borrow().len()
    }

    /// `true` if `name` is a currently defined command.
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.borrow().contains_key(name.trim_start_matches("::"))
    }

    // ── Commands ─────────────────────────────────────────────────────────

    fn define(&self, name: &str, cmd: Cmd, on_delete: Option<DeleteProc>) {
        let name = name.trim_start_matches("::").to_owned();
        let old = self.commands.borrow_mut().insert(name, Entry { cmd, on_delete });
        if let Some(Entry { on_delete: Some(del), .. }) = old {
            del();
        }
    }

    pub(crate) fn define_builtin(&self, name: &str, f: Builtin) {
        self.define(name, Cmd::Builtin(f), None);
    }

    fn remove_command(&self, name: &str) -> Result<(), String> {
        let key = name.trim_start_matches("::");
        let entry = self.commands.borrow_mut().remove(key);
        match entry {
            Some(Entry { on_delete, .. }) => {
                // Deleter runs after the table borrow is released; it may
                // touch the interpreter again.
                if let Some(del) = on_delete {
                    del();
                }
                Ok(())
            }
            None => Err(format!(
                "can't delete \"{name}\": command doesn't exist"
            )),
        }
    }

    fn rename_command(&self, old: &str, new: &str) -> Result<(), String> {
        if new.is_empty() {
            return self.remove_command(old);
        }
        let old_key = old.trim_start_matches("::");
        let new_key = new.trim_start_matches("::").to_owned();
        let mut cmds = self.commands.borrow_mut();
        if cmds.contains_key(&new_key) {
            return Err(format!("can't rename to \"{new}\": command already exists"));
        }
        let entry = cmds
            .remove(old_key)
            .ok_or_else(|| format!("can't rename \"{old}\": command doesn't exist"))?;
        cmds.insert(new_key, entry);
        Ok(())
    }

    fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    fn is_proc(&self, name: &str) -> bool {
        matches!(
            self.commands.borrow().get(name.trim_start_matches("::")),
            Some(Entry { cmd: Cmd::Proc(_), .. })
        )
    }

    /// Invoke one already-substituted command.
    pub(crate) fn invoke(&self, words: &[String]) -> Result<String, Flow> {
        let Some(name) = words.first() else {
            return Ok(String::new());
        };
        let cmd = {
            let cmds = self.commands.borrow();
            match cmds.get(name.trim_start_matches("::")) {
                Some(entry) => entry.cmd.clone(),
                None => return Err(Flow::Error(format!("invalid command name \"{name}\""))),
            }
        };

        let depth = self.depth.get();
        if depth >= MAX_DEPTH {
            return Err(Flow::error("too many nested evaluations (infinite loop?)"));
        }
        self.depth.set(depth + 1);
        let out = match cmd {
            Cmd::Builtin(f) => f(self, words),
            Cmd::Proc(def) => self.call_proc(&def, words),
            Cmd::Host(proc) => proc(words).map_err(Flow::Error),
            Cmd::Widget => widgets::widget_command(self, words),
        };
        self.depth.set(depth);
        out
    }

    fn call_proc(&self, def: &ProcDef, words: &[String]) -> Result<String, Flow> {
        let mut frame = Frame::default();
        let args = &words[1..];
        let mut i = 0;
        for (n, (param, default)) in def.params.iter().enumerate() {
            let is_rest = param == "args" && n + 1 == def.params.len();
            if is_rest {
                let rest = args.get(i..).unwrap_or_default();
                frame.vars.insert(param.clone(), crate::decode::format_list(rest));
                i = args.len();
                continue;
            }
            let value = match (args.get(i), default) {
                (Some(v), _) => v.clone(),
                (None, Some(d)) => d.clone(),
                (None, None) => return Err(Flow::Error(proc_usage(&words[0], def))),
            };
            frame.vars.insert(param.clone(), value);
            i += 1;
        }
        if i < args.len() {
            return Err(Flow::Error(proc_usage(&words[0], def)));
        }

        self.frames.borrow_mut().push(frame);
        let out = self.eval_script(&def.body);
        self.frames.borrow_mut().pop();

        match out {
            Ok(v) | Err(Flow::Return(v)) => Ok(v),
            Err(Flow::Break) => Err(Flow::error("invoked \"break\" outside of a loop")),
            Err(Flow::Continue) => Err(Flow::error("invoked \"continue\" outside of a loop")),
            Err(other) => Err(other),
        }
    }

    // ── Variables ────────────────────────────────────────────────────────

    /// Global name for `name` if it resolves to the global frame.
    fn global_name(&self, name: &str) -> Option<String> {
        if name.contains("::") {
            return Some(name.trim_start_matches("::").to_owned());
        }
        let frames = self.frames.borrow();
        let top = frames.last()?;
        if frames.len() == 1 || top.globals.contains(name) {
            Some(name.to_owned())
        } else {
            None
        }
    }

    pub fn get_var(&self, name: &str) -> Result<String, String> {
        let found = match self.global_name(name) {
            Some(g) => match self.links.borrow().get(&g) {
                Some(link) => Some(link.read()),
                None => self.frames.borrow()[0].vars.get(&g).cloned(),
            },
            None => self.frames.borrow().last().and_then(|f| f.vars.get(name).cloned()),
        };
        found.ok_or_else(|| format!("can't read \"{name}\": no such variable"))
    }

    pub fn set_var(&self, name: &str, value: &str) -> Result<String, String> {
        match self.global_name(name) {
            Some(g) => {
                if let Some(link) = self.links.borrow_mut().get_mut(&g) {
                    link.write(name, value)?;
                    return Ok(link.read());
                }
                self.frames.borrow_mut()[0].vars.insert(g, value.to_owned());
            }
            None => {
                if let Some(frame) = self.frames.borrow_mut().last_mut() {
                    frame.vars.insert(name.to_owned(), value.to_owned());
                }
            }
        }
        Ok(value.to_owned())
    }

    pub fn unset_var(&self, name: &str) -> Result<(), String> {
        let removed = match self.global_name(name) {
            Some(g) => {
                // Tcl keeps a linked variable alive; unsetting only drops a
                // plain value.
                self.links.borrow().contains_key(&g)
                    || self.frames.borrow_mut()[0].vars.remove(&g).is_some()
            }
            None => self
                .frames
                .borrow_mut()
                .last_mut()
                .is_some_and(|f| f.vars.remove(name).is_some()),
        };
        if removed {
            Ok(())
        } else {
            Err(format!("can't unset \"{name}\": no such variable"))
        }
    }

    pub fn var_exists(&self, name: &str) -> bool {
        self.get_var(name).is_ok()
    }

    fn declare_global(&self, name: &str) {
        if let Some(frame) = self.frames.borrow_mut().last_mut() {
            frame.globals.insert(name.to_owned());
        }
    }

    fn in_proc(&self) -> bool {
        self.frames.borrow().len() > 1
    }

    // ── Events ───────────────────────────────────────────────────────────

    fn schedule(&self, due: Option<Instant>, script: String) -> u64 {
        let id = self.next_event.get();
        self.next_event.set(id + 1);
        self.events.borrow_mut().push(AfterEvent { id, due, script });
        id
    }

    fn cancel_event(&self, id: u64) {
        self.events.borrow_mut().retain(|e| e.id != id);
    }

    fn event_ids(&self) -> Vec<String> {
        self.events.borrow().iter().map(|e| format!("after#{}", e.id)).collect()
    }

    /// Remove the next event to run: idle events first, then the earliest
    /// timer.  With `only_due`, timers in the future are left queued.
    fn pop_event(&self, only_due: bool) -> Option<AfterEvent> {
        let mut events = self.events.borrow_mut();
        let now = Instant::now();
        let idx = events
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| (e.due.is_some(), e.due, e.id))
            .map(|(i, _)| i)?;
        if only_due && events[idx].due.is_some_and(|d| d > now) {
            return None;
        }
        Some(events.remove(idx))
    }

    fn run_event(&self, event: AfterEvent) {
        if let Some(due) = event.due {
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        match self.eval_script(&event.script) {
            Ok(_) | Err(Flow::Return(_)) | Err(Flow::Break) | Err(Flow::Continue) => {}
            Err(Flow::Exit(code)) => self.exit_code.set(Some(code)),
            Err(Flow::Error(msg)) => {
                tracing::warn!(target: "rtk::headless", "background error: {msg}");
            }
        }
    }

    /// Run every event that is already due (the `update` command).
    fn process_due_events(&self) {
        while self.exit_code.get().is_none() {
            match self.pop_event(true) {
                Some(e) => self.run_event(e),
                None => break,
            }
        }
    }

    fn request_exit(&self, code: i32) {
        self.exit_code.set(Some(code));
    }
}

fn proc_usage(name: &str, def: &ProcDef) -> String {
    let mut usage = format!("wrong # args: should be \"{name}");
    for (param, default) in &def.params {
        match default {
            _ if param == "args" => usage.push_str(" ?arg ...?"),
            Some(_) => usage.push_str(&format!(" ?{param}?")),
            None => usage.push_str(&format!(" {param}")),
        }
    }
    usage.push('"');
    usage
}

// ── Backend ───────────────────────────────────────────────────────────────────

impl Backend for HeadlessInterp {
    fn eval(&self, script: &str) -> Result<(), String> {
        let out = self.eval_script(script);
        let (result, status) = match out {
            Ok(v) | Err(Flow::Return(v)) => (v, Ok(())),
            Err(Flow::Exit(code)) => {
                self.request_exit(code);
                (String::new(), Ok(()))
            }
            Err(Flow::Break) => {
                let msg = "invoked \"break\" outside of a loop".to_owned();
                (msg.clone(), Err(msg))
            }
            Err(Flow::Continue) => {
                let msg = "invoked \"continue\" outside of a loop".to_owned();
                (msg.clone(), Err(msg))
            }
            Err(Flow::Error(msg)) => (msg.clone(), Err(msg)),
        };
        *self.result.borrow_mut() = result;
        status
    }

    fn result(&self) -> String {
        self.result.borrow().clone()
    }

    fn set_result(&self, value: &str) {
        *self.result.borrow_mut() = value.to_owned();
    }

    fn create_command(
        &self,
        name: &str,
        proc: CommandProc,
        on_delete: DeleteProc,
    ) -> Result<(), String> {
        self.define(name, Cmd::Host(proc), Some(on_delete));
        Ok(())
    }

    fn delete_command(&self, name: &str) -> Result<(), String> {
        self.remove_command(name)
    }

    fn link_var(&self, name: &str, target: LinkTarget) -> Result<(), String> {
        let key = name.trim_start_matches("::").to_owned();
        let mut links = self.links.borrow_mut();
        if links.contains_key(&key) {
            return Err(format!("can't link \"{name}\": variable is already linked"));
        }
        let link = match target {
            LinkTarget::Int(c) => Link::Int(c),
            LinkTarget::Double(c) => Link::Double(c),
            LinkTarget::Text(initial) => Link::Text(Some(initial)),
        };
        self.frames.borrow_mut()[0].vars.remove(&key);
        links.insert(key, link);
        Ok(())
    }

    fn unlink_var(&self, name: &str) {
        let key = name.trim_start_matches("::");
        let removed = self.links.borrow_mut().remove(key);
        // The variable survives with its last linked value, as in Tcl.
        if let Some(link) = removed {
            self.frames.borrow_mut()[0].vars.insert(key.to_owned(), link.read());
        }
    }

    fn update_linked_var(&self, _name: &str) {
        // No variable traces exist here, so there is nobody to notify.
    }

    fn set_text_buffer(&self, name: &str, text: &str) {
        let key = name.trim_start_matches("::");
        if let Some(Link::Text(buf)) = self.links.borrow_mut().get_mut(key) {
            *buf = Some(text.to_owned());
        }
    }

    fn text_buffer(&self, name: &str) -> Option<String> {
        let key = name.trim_start_matches("::");
        match self.links.borrow().get(key) {
            Some(Link::Text(buf)) => buf.clone(),
            _ => None,
        }
    }

    fn main_loop(&self) {
        while self.exit_code.get().is_none() {
            match self.pop_event(false) {
                Some(event) => self.run_event(event),
                None => break,
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(f: impl Fn(&[String]) -> Result<String, String> + 'static) -> CommandProc {
        Rc::new(f)
    }

    fn eval(interp: &HeadlessInterp, script: &str) -> String {
        interp.eval(script).unwrap_or_else(|e| panic!("{script}: {e}"));
        interp.result()
    }

    #[test]
    fn set_and_read_back() {
        let i = HeadlessInterp::new();
        assert_eq!(eval(&i, "set x 5"), "5");
        assert_eq!(eval(&i, "set x"), "5");
        assert_eq!(eval(&i, "set y $x$x"), "55");
    }

    #[test]
    fn errors_leave_message_as_result() {
        let i = HeadlessInterp::new();
        let err = i.eval("nosuchcmd 1 2").unwrap_err();
        assert_eq!(err, "invalid command name \"nosuchcmd\"");
        assert_eq!(i.result(), err);
    }

    #[test]
    fn host_command_and_deleter() {
        let i = HeadlessInterp::new();
        let deleted = Rc::new(Cell::new(false));
        let flag = Rc::clone(&deleted);
        i.create_command(
            "ns::hello",
            proc(|args| Ok(format!("hi {}", args[1..].join(",")))),
            Box::new(move || flag.set(true)),
        )
        .unwrap();
        assert_eq!(eval(&i, "ns::hello a b"), "hi a,b");
        i.delete_command("ns::hello").unwrap();
        assert!(deleted.get());
        assert!(i.eval("ns::hello").is_err());
    }

    #[test]
    fn rename_to_empty_runs_deleter() {
        let i = HeadlessInterp::new();
        let deleted = Rc::new(Cell::new(0));
        let flag = Rc::clone(&deleted);
        i.create_command("cb", proc(|_| Ok(String::new())), Box::new(move || {
            flag.set(flag.get() + 1)
        }))
        .unwrap();
        eval(&i, "rename cb {}");
        assert_eq!(deleted.get(), 1);
        assert!(!i.has_command("cb"));
    }

    #[test]
    fn host_command_can_reenter_eval() {
        let i = Rc::new(HeadlessInterp::new());
        let weak = Rc::downgrade(&i);
        i.create_command(
            "twice",
            proc(move |args| {
                let interp = weak.upgrade().ok_or("gone")?;
                interp.eval(&format!("expr {{{} * 2}}", args[1]))?;
                Ok(interp.result())
            }),
            Box::new(|| {}),
        )
        .unwrap();
        assert_eq!(eval(&i, "set r [twice 21]"), "42");
    }

    #[test]
    fn int_link_is_live() {
        let i = HeadlessInterp::new();
        let cell = Rc::new(Cell::new(3));
        i.link_var("rtk::variable0", LinkTarget::Int(Rc::clone(&cell))).unwrap();
        assert_eq!(eval(&i, "set rtk::variable0"), "3");
        eval(&i, "set rtk::variable0 7");
        assert_eq!(cell.get(), 7);
        assert!(i.eval("set rtk::variable0 abc").is_err());
        assert_eq!(cell.get(), 7);
    }

    #[test]
    fn text_link_uses_mirror_buffer() {
        let i = HeadlessInterp::new();
        i.link_var("v", LinkTarget::Text("init".into())).unwrap();
        assert_eq!(eval(&i, "set v"), "init");
        eval(&i, "set v changed");
        assert_eq!(i.text_buffer("v").as_deref(), Some("changed"));
        i.set_text_buffer("v", "from host");
        assert_eq!(eval(&i, "set v"), "from host");
    }

    #[test]
    fn unlink_keeps_last_value() {
        let i = HeadlessInterp::new();
        let cell = Rc::new(Cell::new(1.5));
        i.link_var("d", LinkTarget::Double(Rc::clone(&cell))).unwrap();
        assert_eq!(eval(&i, "set d"), "1.5");
        i.unlink_var("d");
        eval(&i, "set d 9");
        assert_eq!(cell.get(), 1.5);
        assert_eq!(eval(&i, "set d"), "9");
    }

    #[test]
    fn double_link_formats_integral_values() {
        let i = HeadlessInterp::new();
        i.link_var("d", LinkTarget::Double(Rc::new(Cell::new(3.0)))).unwrap();
        assert_eq!(eval(&i, "set d"), "3.0");
    }

    #[test]
    fn main_loop_drains_after_queue() {
        let i = HeadlessInterp::new();
        eval(&i, "after 1 {puts second}; after idle {puts first}");
        assert_eq!(i.pending_events(), 2);
        i.main_loop();
        assert_eq!(i.take_output(), ["first", "second"]);
        assert_eq!(i.pending_events(), 0);
    }

    #[test]
    fn exit_stops_main_loop() {
        let i = HeadlessInterp::new();
        eval(&i, "after idle {exit 3}; after 1 {puts never}");
        i.main_loop();
        assert_eq!(i.exit_code(), Some(3));
        assert!(i.take_output().is_empty());
    }
}
