//! A recorded Tk widget set.
//!
//! Widgets exist only as a path, a class and an option table.  Nothing is
//! drawn; geometry managers just mark a widget as managed.  What matters to
//! the binding layer is that widget commands, `-command` callbacks,
//! `-variable`/`-textvariable` links and `bind` scripts behave like Tk's.

use std::collections::{BTreeMap, HashMap};

use super::commands::{resolve_index, wrong_args};
use super::{Cmd, Flow, HeadlessInterp};
use crate::decode::format_list;

type CmdResult = Result<String, Flow>;

/// Widget creation commands and the class each one produces.
const CLASSES: &[(&str, &str)] = &[
    ("button", "Button"),
    ("canvas", "Canvas"),
    ("checkbutton", "Checkbutton"),
    ("entry", "Entry"),
    ("frame", "Frame"),
    ("label", "Label"),
    ("labelframe", "Labelframe"),
    ("listbox", "Listbox"),
    ("menu", "Menu"),
    ("menubutton", "Menubutton"),
    ("message", "Message"),
    ("panedwindow", "Panedwindow"),
    ("radiobutton", "Radiobutton"),
    ("scale", "Scale"),
    ("scrollbar", "Scrollbar"),
    ("spinbox", "Spinbox"),
    ("text", "Text"),
    ("toplevel", "Toplevel"),
];

struct Widget {
    class: &'static str,
    options: BTreeMap<String, String>,
    /// Entry content when no `-textvariable` is configured.
    text: String,
    manager: Option<&'static str>,
}

impl Widget {
    fn new(class: &'static str) -> Self {
        Self { class, options: BTreeMap::new(), text: String::new(), manager: None }
    }
}

pub(super) struct TkState {
    widgets: BTreeMap<String, Widget>,
    /// `(tag, sequence)` → script.
    bindings: HashMap<(String, String), String>,
    focus: Option<String>,
    title: String,
    geometry: String,
}

impl Default for TkState {
    fn default() -> Self {
        let mut widgets = BTreeMap::new();
        let mut root = Widget::new("Toplevel");
        root.manager = Some("wm");
        widgets.insert(".".to_owned(), root);
        Self {
            widgets,
            bindings: HashMap::new(),
            focus: None,
            title: "rtk".to_owned(),
            geometry: "200x200+0+0".to_owned(),
        }
    }
}

pub(super) fn register_all(interp: &HeadlessInterp) {
    for &(name, _) in CLASSES {
        interp.define_builtin(name, cmd_create);
    }
    let table: &[(&str, super::Builtin)] = &[
        ("pack", cmd_manage),
        ("grid", cmd_manage),
        ("place", cmd_manage),
        ("destroy", cmd_destroy),
        ("bind", cmd_bind),
        ("event", cmd_event),
        ("focus", cmd_focus),
        ("wm", cmd_wm),
        ("winfo", cmd_winfo),
    ];
    for &(name, f) in table {
        interp.define_builtin(name, f);
    }
    interp.define(".", Cmd::Widget, None);
}

fn parent_of(path: &str) -> Option<&str> {
    match path.rfind('.') {
        Some(0) if path.len() > 1 => Some("."),
        Some(i) if i > 0 => Some(&path[..i]),
        _ => None,
    }
}

fn bad_path(path: &str) -> Flow {
    Flow::Error(format!("bad window path name \"{path}\""))
}

/// Split `-option value` pairs.
fn option_pairs(args: &[String]) -> Result<Vec<(String, String)>, Flow> {
    let mut pairs = Vec::new();
    let mut it = args.iter();
    while let Some(opt) = it.next() {
        if !opt.starts_with('-') {
            return Err(Flow::Error(format!("unknown option \"{opt}\"")));
        }
        let value = it
            .next()
            .ok_or_else(|| Flow::Error(format!("value for \"{opt}\" missing")))?;
        pairs.push((opt.clone(), value.clone()));
    }
    Ok(pairs)
}

// ── Widget creation and widget commands ───────────────────────────────────────

fn cmd_create(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    let class = CLASSES
        .iter()
        .find(|(name, _)| *name == w[0])
        .map(|&(_, class)| class)
        .ok_or_else(|| Flow::Error(format!("invalid command name \"{}\"", w[0])))?;
    let Some(path) = w.get(1) else {
        return Err(wrong_args(&format!("{} pathName ?-option value ...?", w[0])));
    };
    let parent = parent_of(path).ok_or_else(|| bad_path(path))?;
    let pairs = option_pairs(&w[2..])?;
    {
        let mut tk = interp.tk.borrow_mut();
        if !tk.widgets.contains_key(parent) {
            return Err(bad_path(path));
        }
        if tk.widgets.contains_key(path.as_str()) {
            return Err(Flow::Error(format!(
                "window name \"{}\" already exists in parent",
                &path[path.rfind('.').map_or(0, |i| i + 1)..]
            )));
        }
        let mut widget = Widget::new(class);
        widget.options.extend(pairs);
        tk.widgets.insert(path.clone(), widget);
    }
    interp.define(path, Cmd::Widget, None);
    tracing::trace!(target: "rtk::headless", "created {class} {path}");
    Ok(path.clone())
}

pub(super) fn widget_command(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    let path = &w[0];
    let class = interp
        .tk
        .borrow()
        .widgets
        .get(path.as_str())
        .map(|wd| wd.class)
        .ok_or_else(|| Flow::Error(format!("invalid command name \"{path}\"")))?;
    let Some(sub) = w.get(1) else {
        return Err(wrong_args(&format!("{path} option ?arg ...?")));
    };
    let args = &w[2..];

    match sub.as_str() {
        "configure" | "config" => configure(interp, path, args),
        "cget" => {
            let [opt] = args else {
                return Err(wrong_args(&format!("{path} cget option")));
            };
            option(interp, path, opt)
                .ok_or_else(|| Flow::Error(format!("unknown option \"{opt}\"")))
        }
        "invoke" => invoke(interp, path, class),
        "get" if class == "Entry" || class == "Spinbox" => entry_text(interp, path),
        "insert" if class == "Entry" || class == "Spinbox" => {
            let [index, text] = args else {
                return Err(wrong_args(&format!("{path} insert index text")));
            };
            let mut chars: Vec<char> = entry_text(interp, path)?.chars().collect();
            let at = if index == "end" {
                chars.len()
            } else {
                resolve_index(index, chars.len() + 1)?.unwrap_or(chars.len())
            };
            chars.splice(at..at, text.chars());
            set_entry_text(interp, path, &chars.into_iter().collect::<String>())?;
            Ok(String::new())
        }
        "delete" if class == "Entry" || class == "Spinbox" => {
            let (first, last) = match args {
                [first] => (first, None),
                [first, last] => (first, Some(last)),
                _ => return Err(wrong_args(&format!("{path} delete firstIndex ?lastIndex?"))),
            };
            let mut chars: Vec<char> = entry_text(interp, path)?.chars().collect();
            let len = chars.len();
            let start = resolve_index(first, len + 1)?.unwrap_or(len).min(len);
            let end = match last {
                Some(l) if l == "end" => len,
                Some(l) => resolve_index(l, len + 1)?.unwrap_or(len).min(len),
                None => (start + 1).min(len),
            };
            if start < end {
                chars.drain(start..end);
            }
            set_entry_text(interp, path, &chars.into_iter().collect::<String>())?;
            Ok(String::new())
        }
        // Drawing, selection and scrolling have nothing to record.
        _ => Ok(String::new()),
    }
}

fn option(interp: &HeadlessInterp, path: &str, opt: &str) -> Option<String> {
    interp
        .tk
        .borrow()
        .widgets
        .get(path)
        .and_then(|wd| wd.options.get(opt).cloned())
}

fn configure(interp: &HeadlessInterp, path: &str, args: &[String]) -> CmdResult {
    let mut tk = interp.tk.borrow_mut();
    let widget = tk.widgets.get_mut(path).ok_or_else(|| bad_path(path))?;
    match args {
        [] => {
            let entries: Vec<String> = widget
                .options
                .iter()
                .map(|(k, v)| format_list(&[k.as_str(), v.as_str()]))
                .collect();
            Ok(format_list(&entries))
        }
        [opt] => Ok(format_list(&[
            opt.as_str(),
            widget.options.get(opt).map(String::as_str).unwrap_or(""),
        ])),
        _ => {
            widget.options.extend(option_pairs(args)?);
            Ok(String::new())
        }
    }
}

/// Button-like activation: update the widget's variable, then run its
/// `-command` at global level.
fn invoke(interp: &HeadlessInterp, path: &str, class: &str) -> CmdResult {
    if option(interp, path, "-state").as_deref() == Some("disabled") {
        return Ok(String::new());
    }
    if let Some(var) = option(interp, path, "-variable") {
        match class {
            "Checkbutton" => {
                let on = option(interp, path, "-onvalue").unwrap_or_else(|| "1".to_owned());
                let off = option(interp, path, "-offvalue").unwrap_or_else(|| "0".to_owned());
                let current = interp.get_var(&global(&var)).unwrap_or_default();
                let next = if current == on { off } else { on };
                interp.set_var(&global(&var), &next).map_err(Flow::Error)?;
            }
            "Radiobutton" => {
                let value = option(interp, path, "-value").unwrap_or_default();
                interp.set_var(&global(&var), &value).map_err(Flow::Error)?;
            }
            _ => {}
        }
    }
    match option(interp, path, "-command") {
        Some(script) if !script.is_empty() => interp.eval_script(&script),
        _ => Ok(String::new()),
    }
}

/// Widget variables always live in the global namespace.
fn global(var: &str) -> String {
    if var.contains("::") {
        var.to_owned()
    } else {
        format!("::{var}")
    }
}

fn entry_text(interp: &HeadlessInterp, path: &str) -> CmdResult {
    match option(interp, path, "-textvariable") {
        Some(var) => Ok(interp.get_var(&global(&var)).unwrap_or_default()),
        None => Ok(interp
            .tk
            .borrow()
            .widgets
            .get(path)
            .map(|wd| wd.text.clone())
            .unwrap_or_default()),
    }
}

fn set_entry_text(interp: &HeadlessInterp, path: &str, text: &str) -> Result<(), Flow> {
    match option(interp, path, "-textvariable") {
        Some(var) => {
            interp.set_var(&global(&var), text).map_err(Flow::Error)?;
        }
        None => {
            if let Some(wd) = interp.tk.borrow_mut().widgets.get_mut(path) {
                wd.text = text.to_owned();
            }
        }
    }
    Ok(())
}

// ── Geometry and lifetime ─────────────────────────────────────────────────────

fn cmd_manage(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    let manager: &'static str = match w[0].as_str() {
        "grid" => "grid",
        "place" => "place",
        _ => "pack",
    };
    let mut args = &w[1..];
    let forget = match args.first().map(String::as_str) {
        Some("forget") => {
            args = &args[1..];
            true
        }
        Some("configure") => {
            args = &args[1..];
            false
        }
        _ => false,
    };
    let split = args.iter().position(|a| a.starts_with('-')).unwrap_or(args.len());
    let (paths, opts) = args.split_at(split);
    if paths.is_empty() {
        return Err(wrong_args(&format!("{manager} option arg ?arg ...?")));
    }
    if !forget {
        option_pairs(opts)?;
    }
    let mut tk = interp.tk.borrow_mut();
    for path in paths {
        let widget = tk.widgets.get_mut(path.as_str()).ok_or_else(|| bad_path(path))?;
        widget.manager = if forget { None } else { Some(manager) };
    }
    Ok(String::new())
}

fn cmd_destroy(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    for path in &w[1..] {
        let doomed: Vec<String> = {
            let tk = interp.tk.borrow();
            if !tk.widgets.contains_key(path.as_str()) {
                continue;
            }
            let prefix = if path == "." { ".".to_owned() } else { format!("{path}.") };
            tk.widgets
                .keys()
                .filter(|p| *p == path || p.starts_with(&prefix))
                .cloned()
                .collect()
        };
        {
            let mut tk = interp.tk.borrow_mut();
            for p in &doomed {
                tk.widgets.remove(p.as_str());
                tk.bindings.retain(|(tag, _), _| tag != p);
                if tk.focus.as_deref() == Some(p.as_str()) {
                    tk.focus = None;
                }
            }
        }
        for p in &doomed {
            // Already gone if the script renamed the widget command away.
            let _ = interp.remove_command(p);
        }
        if path == "." {
            interp.request_exit(0);
        }
    }
    Ok(String::new())
}

// ── Events ────────────────────────────────────────────────────────────────────

fn cmd_bind(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    match w.len() {
        2 => {
            let tk = interp.tk.borrow();
            let mut seqs: Vec<&String> = tk
                .bindings
                .keys()
                .filter(|(tag, _)| *tag == w[1])
                .map(|(_, seq)| seq)
                .collect();
            seqs.sort();
            Ok(format_list(&seqs.iter().map(|s| s.as_str()).collect::<Vec<_>>()))
        }
        3 => {
            let key = (w[1].clone(), w[2].clone());
            Ok(interp.tk.borrow().bindings.get(&key).cloned().unwrap_or_default())
        }
        4 => {
            let key = (w[1].clone(), w[2].clone());
            let mut tk = interp.tk.borrow_mut();
            let script = &w[3];
            if script.is_empty() {
                tk.bindings.remove(&key);
            } else if let Some(more) = script.strip_prefix('+') {
                let entry = tk.bindings.entry(key).or_default();
                if !entry.is_empty() {
                    entry.push('\n');
                }
                entry.push_str(more);
            } else {
                tk.bindings.insert(key, script.clone());
            }
            Ok(String::new())
        }
        _ => Err(wrong_args("bind window ?pattern? ?command?")),
    }
}

/// Options of `event generate` and the `%` field each one fills.
const EVENT_FIELDS: &[(&str, char)] = &[
    ("-x", 'x'),
    ("-y", 'y'),
    ("-rootx", 'X'),
    ("-rooty", 'Y'),
    ("-button", 'b'),
    ("-keysym", 'K'),
    ("-keycode", 'k'),
    ("-width", 'w'),
    ("-height", 'h'),
    ("-delta", 'D'),
    ("-data", 'd'),
    ("-state", 's'),
];

fn cmd_event(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.get(1).map(String::as_str) != Some("generate") || w.len() < 4 {
        return Err(wrong_args("event generate window event ?-option value ...?"));
    }
    let (path, sequence) = (&w[2], &w[3]);
    let class = interp
        .tk
        .borrow()
        .widgets
        .get(path.as_str())
        .map(|wd| wd.class)
        .ok_or_else(|| bad_path(path))?;

    let mut fields: HashMap<char, String> = HashMap::new();
    fields.insert('W', path.clone());
    for (opt, value) in option_pairs(&w[4..])? {
        if let Some(&(_, field)) = EVENT_FIELDS.iter().find(|(o, _)| *o == opt) {
            fields.insert(field, value);
        }
    }

    for tag in [path.as_str(), class, "all"] {
        let script = interp
            .tk
            .borrow()
            .bindings
            .get(&(tag.to_owned(), sequence.clone()))
            .cloned();
        if let Some(script) = script {
            match interp.eval_script(&percent_subst(&script, &fields)) {
                Ok(_) | Err(Flow::Continue) => {}
                Err(Flow::Break) => break,
                Err(e) => return Err(e),
            }
        }
    }
    Ok(String::new())
}

/// Replace `%c` fields in a binding script; unknown fields become `??`.
fn percent_subst(script: &str, fields: &HashMap<char, String>) -> String {
    let mut out = String::with_capacity(script.len());
    let mut chars = script.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(f) => match fields.get(&f) {
                Some(v) => out.push_str(&format_list(&[v.as_str()])),
                None => out.push_str("??"),
            },
            None => out.push('%'),
        }
    }
    out
}

fn cmd_focus(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    match w.get(1) {
        None => Ok(interp.tk.borrow().focus.clone().unwrap_or_default()),
        Some(path) => {
            let mut tk = interp.tk.borrow_mut();
            if !tk.widgets.contains_key(path.as_str()) {
                return Err(bad_path(path));
            }
            tk.focus = Some(path.clone());
            Ok(String::new())
        }
    }
}

fn cmd_wm(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.len() < 3 {
        return Err(wrong_args("wm option window ?arg ...?"));
    }
    if !interp.tk.borrow().widgets.contains_key(w[2].as_str()) {
        return Err(bad_path(&w[2]));
    }
    let mut tk = interp.tk.borrow_mut();
    let slot = match w[1].as_str() {
        "title" => &mut tk.title,
        "geometry" => &mut tk.geometry,
        // protocol, resizable, minsize and friends are accepted silently.
        _ => return Ok(String::new()),
    };
    match w.get(3) {
        Some(value) => {
            *slot = value.clone();
            Ok(String::new())
        }
        None => Ok(slot.clone()),
    }
}

fn cmd_winfo(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    let (Some(sub), Some(path)) = (w.get(1), w.get(2)) else {
        return Err(wrong_args("winfo option ?arg ...?"));
    };
    let tk = interp.tk.borrow();
    if sub == "exists" {
        return Ok(u8::from(tk.widgets.contains_key(path.as_str())).to_string());
    }
    let widget = tk.widgets.get(path.as_str()).ok_or_else(|| bad_path(path))?;
    match sub.as_str() {
        "class" => Ok(widget.class.to_owned()),
        "parent" => Ok(parent_of(path).unwrap_or("").to_owned()),
        "children" => {
            let children: Vec<&str> = tk
                .widgets
                .keys()
                .filter(|p| parent_of(p) == Some(path.as_str()))
                .map(String::as_str)
                .collect();
            Ok(format_list(&children))
        }
        "toplevel" => {
            let mut top = path.as_str();
            while top != "." && tk.widgets.get(top).is_some_and(|wd| wd.class != "Toplevel") {
                top = parent_of(top).unwrap_or(".");
            }
            Ok(top.to_owned())
        }
        "ismapped" | "viewable" => Ok(u8::from(widget.manager.is_some()).to_string()),
        "manager" => Ok(widget.manager.unwrap_or("").to_owned()),
        other => Err(Flow::Error(format!(
            "bad option \"{other}\": must be children, class, exists, ismapped, manager, \
             parent, toplevel, or viewable"
        ))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
