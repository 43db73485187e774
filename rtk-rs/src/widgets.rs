//! Widget vocabulary: starters for the common Tk commands.
//!
//! Each function only formats the first words of a command; options are
//! merged in with `-`, and widget subcommands are aimed at a path with `<<`:
//!
//! ```no_run
//! use rtk::widgets::*;
//! use rtk::options::*;
//!
//! frame(".mbar") - borderwidth(1) - relief(RAISED);
//! pack(".mbar") - fill(X);
//! entry(".e") - width(20);
//! ".e" << insert(END, "initial text");
//! # Ok::<(), rtk::TkError>(())
//! ```

use crate::decode::list_element;
use crate::expr::Expr;
use crate::options::{quote, EventField};

macro_rules! widget_starters {
    ($($name:ident => $cmd:literal),* $(,)?) => {
        $(
            #[doc = concat!("`", $cmd, " <path>`")]
            pub fn $name(path: &str) -> Expr {
                Expr::starter(format!(concat!($cmd, " {}"), path))
            }
        )*
    };
}

widget_starters! {
    button => "button",
    canvas => "canvas",
    checkbutton => "checkbutton",
    entry => "entry",
    frame => "frame",
    label => "label",
    labelframe => "labelframe",
    listbox => "listbox",
    menu => "menu",
    menubutton => "menubutton",
    message => "message",
    panedwindow => "panedwindow",
    radiobutton => "radiobutton",
    scale => "scale",
    scrollbar => "scrollbar",
    spinbox => "spinbox",
    textw => "text",
    toplevel => "toplevel",
}

// ── Geometry and windows ──────────────────────────────────────────────────────

/// `pack <paths>`; several paths may be given separated by spaces.
pub fn pack(paths: &str) -> Expr {
    Expr::starter(format!("pack {paths}"))
}

pub fn grid(paths: &str) -> Expr {
    Expr::starter(format!("grid {paths}"))
}

pub fn place(path: &str) -> Expr {
    Expr::starter(format!("place {path}"))
}

pub fn destroy(paths: &str) -> Expr {
    Expr::starter(format!("destroy {paths}"))
}

pub fn focus(path: &str) -> Expr {
    Expr::starter(format!("focus {path}"))
}

/// `wm <option> <path>`; further arguments are appended with `-`.
pub fn wm(option: &str, path: &str) -> Expr {
    Expr::starter(format!("wm {option} {path}"))
}

/// `winfo <option> ... <path>`: the path stays last, after anything
/// appended.
pub fn winfo(option: &str, path: &str) -> Expr {
    Expr::with_suffix(format!("winfo {option}"), format!(" {path}"))
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Bind `sequence` on `tag` to the command `name`, passing the requested
/// event fields as arguments.
pub fn bind(tag: &str, sequence: &str, name: &str, fields: &[EventField]) -> Expr {
    let mut script = name.to_owned();
    for f in fields {
        script.push(' ');
        script.push_str(f.code());
    }
    Expr::starter(format!("bind {tag} {sequence} {{ {script} }}"))
}

/// `event generate <path> <sequence>`; event options are appended with `-`.
pub fn event_generate(path: &str, sequence: &str) -> Expr {
    Expr::starter(format!("event generate {path} {sequence}"))
}

pub fn update() -> Expr {
    Expr::starter("update")
}

pub fn after_idle(script: &str) -> Expr {
    Expr::starter(format!("after idle {{ {script} }}"))
}

pub fn after(ms: u64, script: &str) -> Expr {
    Expr::starter(format!("after {ms} {{ {script} }}"))
}

// ── Widget subcommands ────────────────────────────────────────────────────────

pub fn configure() -> Expr {
    Expr::starter("configure")
}

pub fn cget(option: &str) -> Expr {
    Expr::starter(format!("cget -{}", option.trim_start_matches('-')))
}

pub fn invoke() -> Expr {
    Expr::starter("invoke")
}

pub fn get() -> Expr {
    Expr::starter("get")
}

pub fn get_range(first: &str, last: &str) -> Expr {
    Expr::starter(format!("get {first} {last}"))
}

/// `insert <index> "<text>"`.
pub fn insert(index: &str, text: &str) -> Expr {
    Expr::starter(format!("insert {index} \"{}\"", quote(text)))
}

pub fn delete(first: &str, last: &str) -> Expr {
    Expr::starter(format!("delete {first} {last}"))
}

/// Any Tcl script, evaluated as-is.
pub fn eval(script: &str) -> Expr {
    Expr::starter(script)
}

/// `set <name> <value>`.
pub fn set(name: &str, value: &str) -> Expr {
    Expr::starter(format!("set {name} {}", list_element(value)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::options::*;
    use crate::session::Session;

    /// Starters dropped in these tests go to a session that submits nothing.
    fn record_only() {
        Session::install(Session::headless(Config { evaluate: false, ..Config::default() }).unwrap());
    }

    #[test]
    fn starters_format_commands() {
        record_only();
        assert_eq!(button(".b").value(), "button .b");
        assert_eq!(textw(".t").value(), "text .t");
        assert_eq!(
            (frame(".f") - borderwidth(1) - relief(RAISED)).value(),
            "frame .f -borderwidth 1 -relief raised"
        );
        assert_eq!(cget("text").value(), "cget -text");
        assert_eq!(set("v", "a b").value(), "set v {a b}");
    }

    #[test]
    fn winfo_keeps_path_last() {
        record_only();
        let e = winfo("containing", ".") - arg("10") - arg("20");
        assert_eq!(e.value(), "winfo containing 10 20 .");
    }

    #[test]
    fn bind_lists_fields() {
        record_only();
        let e = bind(".c", "<Button-1>", "rtk::callback3", &[EventField::X, EventField::Y]);
        assert_eq!(e.value(), "bind .c <Button-1> { rtk::callback3 %x %y }");
    }

    #[test]
    fn subcommands_take_a_path() {
        record_only();
        let e = ".e" << insert(END, "say \"hi\"");
        assert_eq!(e.value(), ".e insert end \"say \\\"hi\\\"\"");
    }
}
