//! Option fragments and constants.
//!
//! Options are literal expressions (` -text "OK"`) merged into a widget
//! command with `-`:
//!
//! ```no_run
//! use rtk::{button, options::{command, relief, text, RAISED}};
//!
//! button(".ok") - text("OK") - relief(RAISED) - command("exit");
//! ```

use crate::callback::IntoCallback;
use crate::decode::{format_double, list_element};
use crate::error::Result;
use crate::expr::Expr;
use crate::session::Session;

// ── Quoting ───────────────────────────────────────────────────────────────────

/// Escape `\ " $ [ ]` so `text` can sit inside a double-quoted word.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '$' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A quoted string option: ` -name "value"`.
fn quoted(name: &str, value: &str) -> Expr {
    Expr::literal(format!(" -{name} \"{}\"", quote(value)))
}

/// A bare option: ` -name value`.
fn bare(name: &str, value: impl std::fmt::Display) -> Expr {
    Expr::literal(format!(" -{name} {value}"))
}

/// Any option; `value` is quoted as one list element.
pub fn opt(name: &str, value: &str) -> Expr {
    Expr::literal(format!(" -{name} {}", list_element(value)))
}

/// A positional argument, quoted as one list element.
pub fn arg(value: &str) -> Expr {
    Expr::literal(format!(" {}", list_element(value)))
}

// ── Text and appearance ───────────────────────────────────────────────────────

pub fn text(value: &str) -> Expr {
    quoted("text", value)
}

/// The `-label` of a menu entry.
pub fn menulabel(value: &str) -> Expr {
    quoted("label", value)
}

pub fn title(value: &str) -> Expr {
    quoted("title", value)
}

pub fn background(color: &str) -> Expr {
    quoted("background", color)
}

pub fn foreground(color: &str) -> Expr {
    quoted("foreground", color)
}

pub fn font(spec: &str) -> Expr {
    quoted("font", spec)
}

pub fn relief(style: &str) -> Expr {
    bare("relief", style)
}

pub fn state(value: &str) -> Expr {
    bare("state", value)
}

pub fn anchor(value: &str) -> Expr {
    bare("anchor", value)
}

pub fn justify(value: &str) -> Expr {
    bare("justify", value)
}

// ── Geometry ──────────────────────────────────────────────────────────────────

pub fn width(n: i64) -> Expr {
    bare("width", n)
}

pub fn height(n: i64) -> Expr {
    bare("height", n)
}

pub fn borderwidth(n: i64) -> Expr {
    bare("borderwidth", n)
}

pub fn padx(n: i64) -> Expr {
    bare("padx", n)
}

pub fn pady(n: i64) -> Expr {
    bare("pady", n)
}

pub fn side(value: &str) -> Expr {
    bare("side", value)
}

pub fn fill(value: &str) -> Expr {
    bare("fill", value)
}

pub fn expand(on: bool) -> Expr {
    bare("expand", u8::from(on))
}

pub fn row(n: i64) -> Expr {
    bare("row", n)
}

pub fn column(n: i64) -> Expr {
    bare("column", n)
}

pub fn sticky(value: &str) -> Expr {
    bare("sticky", value)
}

pub fn from(x: f64) -> Expr {
    bare("from", format_double(x))
}

pub fn to(x: f64) -> Expr {
    bare("to", format_double(x))
}

// ── Commands and variables ────────────────────────────────────────────────────

/// ` -command { name }`: a Tcl script or a registered callback name.
pub fn command(name: &str) -> Expr {
    Expr::literal(format!(" -command {{ {name} }}"))
}

/// Register `f` on the current session and use it as `-command`.
pub fn command_fn<M>(f: impl IntoCallback<M>) -> Result<Expr> {
    let name = Session::current()?.register(f)?;
    Ok(command(&name))
}

/// ` -validatecommand { name %P ... }` with the given substitution fields.
pub fn validatecommand(name: &str, fields: &[ValidateField]) -> Expr {
    let mut script = name.to_owned();
    for f in fields {
        script.push(' ');
        script.push_str(f.code());
    }
    Expr::literal(format!(" -validatecommand {{ {script} }}"))
}

pub fn variable(name: &str) -> Expr {
    bare("variable", name)
}

pub fn textvariable(name: &str) -> Expr {
    bare("textvariable", name)
}

pub fn value(v: &str) -> Expr {
    quoted("value", v)
}

// ── Constants ─────────────────────────────────────────────────────────────────

pub const LEFT: &str = "left";
pub const RIGHT: &str = "right";
pub const TOP: &str = "top";
pub const BOTTOM: &str = "bottom";
pub const X: &str = "x";
pub const Y: &str = "y";
pub const BOTH: &str = "both";
pub const NONE: &str = "none";
pub const RAISED: &str = "raised";
pub const SUNKEN: &str = "sunken";
pub const FLAT: &str = "flat";
pub const GROOVE: &str = "groove";
pub const RIDGE: &str = "ridge";
pub const NORMAL: &str = "normal";
pub const DISABLED: &str = "disabled";
pub const END: &str = "end";
pub const ALL: &str = "all";

// ── Substitution fields ───────────────────────────────────────────────────────

/// `%` fields of an event binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventField {
    /// `%A` character
    Char,
    /// `%b` button number
    Button,
    /// `%D` mouse wheel delta
    Delta,
    /// `%f` focus flag
    Focus,
    /// `%h` height
    Height,
    /// `%k` keycode
    Keycode,
    /// `%K` keysym
    Keysym,
    /// `%m` mode
    Mode,
    /// `%N` keysym as a number
    KeysymNum,
    /// `%s` state
    State,
    /// `%T` event type
    Type,
    /// `%w` width
    Width,
    /// `%W` window path
    Window,
    /// `%x` x coordinate
    X,
    /// `%X` root x coordinate
    RootX,
    /// `%y` y coordinate
    Y,
    /// `%Y` root y coordinate
    RootY,
}

impl EventField {
    pub fn code(self) -> &'static str {
        match self {
            EventField::Char => "%A",
            EventField::Button => "%b",
            EventField::Delta => "%D",
            EventField::Focus => "%f",
            EventField::Height => "%h",
            EventField::Keycode => "%k",
            EventField::Keysym => "%K",
            EventField::Mode => "%m",
            EventField::KeysymNum => "%N",
            EventField::State => "%s",
            EventField::Type => "%T",
            EventField::Width => "%w",
            EventField::Window => "%W",
            EventField::X => "%x",
            EventField::RootX => "%X",
            EventField::Y => "%y",
            EventField::RootY => "%Y",
        }
    }
}

/// `%` fields of an entry validation command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateField {
    /// `%d` action: 1 insert, 0 delete, -1 other
    Action,
    /// `%i` index of the change
    Index,
    /// `%P` value if the edit is allowed
    NewValue,
    /// `%s` value before the edit
    OldValue,
    /// `%S` text being inserted or deleted
    Change,
    /// `%v` current `-validate` mode
    Mode,
    /// `%V` what triggered validation
    Trigger,
    /// `%W` entry path
    Widget,
}

impl ValidateField {
    pub fn code(self) -> &'static str {
        match self {
            ValidateField::Action => "%d",
            ValidateField::Index => "%i",
            ValidateField::NewValue => "%P",
            ValidateField::OldValue => "%s",
            ValidateField::Change => "%S",
            ValidateField::Mode => "%v",
            ValidateField::Trigger => "%V",
            ValidateField::Widget => "%W",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
