//! Expressions: pending commands and the literal fragments merged into them.
//!
//! A *starter* expression owns a [`Command`] (shared between clones) and is
//! evaluated when one of its conversions is called, or when the last clone
//! is dropped.  A literal expression is plain text such as an option
//! (`" -text \"OK\""`); it is never submitted by itself.
//!
//! ```no_run
//! use rtk::{button, pack, options::text};
//!
//! let b = button(".b") - text("Hello");
//! let path = b.text()?;
//! pack(&path);
//! # Ok::<(), rtk::TkError>(())
//! ```

use std::ops::{Shl, Sub};
use std::rc::Rc;

use crate::command::Command;
use crate::decode::{parse_bool, parse_double, parse_int, FromTcl, ListResult};
use crate::error::{Result, TkError};
use crate::session::Session;

// ── Composite values ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rect {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl Rect {
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i64 {
        self.y2 - self.y1
    }
}

// ── Expr ──────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Expr {
    kind: Kind,
}

#[derive(Clone)]
enum Kind {
    Starter(Rc<Command>),
    Literal(String),
}

impl Expr {
    /// A pending command for the current session.
    pub fn starter(text: impl Into<String>) -> Self {
        Self::from_command(Command::new(text))
    }

    /// A pending command whose `suffix` stays at the end.
    pub fn with_suffix(text: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::from_command(Command::with_suffix(text, suffix))
    }

    /// A pending command for an explicit session.
    pub fn bound(session: &Session, text: impl Into<String>) -> Self {
        Self::from_command(Command::bound(session, text))
    }

    /// A fragment to be merged into a command.
    pub fn literal(text: impl Into<String>) -> Self {
        Self { kind: Kind::Literal(text.into()) }
    }

    fn from_command(cmd: Command) -> Self {
        Self { kind: Kind::Starter(Rc::new(cmd)) }
    }

    pub fn is_starter(&self) -> bool {
        matches!(self.kind, Kind::Starter(_))
    }

    /// The unevaluated text: the literal, or the command as it stands.
    pub fn value(&self) -> String {
        match &self.kind {
            Kind::Starter(cmd) => cmd.text(),
            Kind::Literal(s) => s.clone(),
        }
    }

    // ── Conversions ──────────────────────────────────────────────────────

    /// Submit the command (once) without reading its result.
    pub fn run(&self) -> Result<()> {
        match &self.kind {
            Kind::Starter(cmd) => cmd.evaluate_once(),
            Kind::Literal(_) => Ok(()),
        }
    }

    /// The result text.  A literal is its own value.
    pub fn text(&self) -> Result<String> {
        match &self.kind {
            Kind::Starter(cmd) => cmd.evaluate_text(),
            Kind::Literal(s) => Ok(s.clone()),
        }
    }

    pub fn int(&self) -> Result<i64> {
        parse_int(&self.text()?)
    }

    pub fn int32(&self) -> Result<i32> {
        i32::from_tcl(&self.text()?)
    }

    pub fn double(&self) -> Result<f64> {
        parse_double(&self.text()?)
    }

    pub fn boolean(&self) -> Result<bool> {
        parse_bool(&self.text()?)
    }

    /// Any [`FromTcl`] type.
    pub fn get<T: FromTcl>(&self) -> Result<T> {
        T::from_tcl(&self.text()?)
    }

    /// The result read as a list.
    pub fn list(&self) -> Result<ListResult> {
        ListResult::parse(&self.text()?)
    }

    /// The result as `x y`; an empty result is the origin.
    pub fn point(&self) -> Result<Point> {
        let c = self.coords(2, "Point")?;
        Ok(Point::new(c[0], c[1]))
    }

    /// The result as `x1 y1 x2 y2`; an empty result is all zeros.
    pub fn rect(&self) -> Result<Rect> {
        let c = self.coords(4, "Rect")?;
        Ok(Rect::new(c[0], c[1], c[2], c[3]))
    }

    fn coords(&self, needed: usize, what: &str) -> Result<Vec<i64>> {
        let text = self.text()?;
        if text.trim().is_empty() {
            return Ok(vec![0; needed]);
        }
        let list = ListResult::parse(&text)?;
        if list.len() < needed {
            return Err(TkError::conversion(format!(
                "cannot convert the result list to {what}: expected {needed} elements, got {}",
                list.len()
            )));
        }
        list.items()[..needed].iter().map(|item| coordinate(item)).collect()
    }

    // ── Combination ──────────────────────────────────────────────────────

    /// Put `word` and a space in front.
    pub fn prefixed(self, word: &str) -> Expr {
        match self.kind {
            Kind::Starter(cmd) => {
                cmd.prepend(" ");
                cmd.prepend(word);
                Expr { kind: Kind::Starter(cmd) }
            }
            Kind::Literal(s) => Expr::literal(format!("{word} {s}")),
        }
    }

    /// Same as `self - other`.
    pub fn with(self, other: Expr) -> Expr {
        self - other
    }
}

/// Integer, or a real rounded to the nearest integer.
fn coordinate(item: &str) -> Result<i64> {
    parse_int(item).or_else(|_| parse_double(item).map(|x| x.round() as i64))
}

impl Sub for Expr {
    type Output = Expr;

    /// Merge `rhs` into `self`'s command.
    fn sub(self, rhs: Expr) -> Expr {
        match self.kind {
            Kind::Starter(cmd) => {
                match rhs.kind {
                    Kind::Starter(other) => cmd.absorb(&other),
                    Kind::Literal(s) => cmd.append(&s),
                }
                Expr { kind: Kind::Starter(cmd) }
            }
            Kind::Literal(l) => match rhs.kind {
                Kind::Starter(cmd) => {
                    cmd.prepend(&l);
                    Expr { kind: Kind::Starter(cmd) }
                }
                Kind::Literal(r) => Expr::literal(format!("{l}{r}")),
            },
        }
    }
}

impl Shl<Expr> for &str {
    type Output = Expr;

    /// `".t" << insert(end, "x")` submits `.t insert end x`.
    fn shl(self, rhs: Expr) -> Expr {
        rhs.prefixed(self)
    }
}

impl Shl<Expr> for &String {
    type Output = Expr;

    fn shl(self, rhs: Expr) -> Expr {
        rhs.prefixed(self)
    }
}

impl Shl<Expr> for String {
    type Output = Expr;

    fn shl(self, rhs: Expr) -> Expr {
        rhs.prefixed(&self)
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value())
    }
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Kind::Starter(cmd) => f.debug_tuple("Starter").field(cmd).finish(),
            Kind::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
        }
    }
}

macro_rules! try_from_expr {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl TryFrom<Expr> for $ty {
                type Error = TkError;

                fn try_from(e: Expr) -> Result<$ty> {
                    e.$method()
                }
            }
        )*
    };
}

try_from_expr! {
    i64 => int,
    i32 => int32,
    f64 => double,
    bool => boolean,
    String => text,
    Point => point,
    Rect => rect,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn session() -> Session {
        Session::headless(Config::default()).unwrap()
    }

    #[test]
    fn numeric_conversions() {
        let s = session();
        assert_eq!(s.expr("set a 42").int().unwrap(), 42);
        assert_eq!(s.expr("set a 3.14").double().unwrap(), 3.14);
        assert!(s.expr("set a yes").boolean().unwrap());
        let bad = s.expr("set a abc");
        assert!(matches!(bad.int(), Err(TkError::TypeConversion(_))));
        assert!(matches!(bad.double(), Err(TkError::TypeConversion(_))));
    }

    #[test]
    fn conversions_share_one_submission() {
        let s = session();
        s.eval("set n 0").unwrap();
        let e = s.expr("incr n");
        assert_eq!(e.int().unwrap(), 1);
        assert_eq!(e.text().unwrap(), "1");
        assert_eq!(e.clone().double().unwrap(), 1.0);
        drop(e);
        assert_eq!(s.eval("set n").unwrap(), "1");
    }

    #[test]
    fn point_conversion() {
        let s = session();
        assert_eq!(s.expr("list").point().unwrap(), Point::new(0, 0));
        assert_eq!(s.expr("list 10 20").point().unwrap(), Point::new(10, 20));
        assert_eq!(s.expr("list 1.6 -2 9").point().unwrap(), Point::new(2, -2));
        assert!(matches!(s.expr("list 5").point(), Err(TkError::TypeConversion(_))));
        assert!(matches!(s.expr("list a b").point(), Err(TkError::TypeConversion(_))));
    }

    #[test]
    fn rect_conversion() {
        let s = session();
        let r = s.expr("list 1 2 3 4").rect().unwrap();
        assert_eq!(r, Rect::new(1, 2, 3, 4));
        assert_eq!((r.width(), r.height()), (2, 2));
        assert_eq!(s.expr("set x {}").rect().unwrap(), Rect::default());
        assert!(matches!(s.expr("list 1 2 3").rect(), Err(TkError::TypeConversion(_))));
    }

    #[test]
    fn minus_appends_literals() {
        let s = session();
        let e = s.expr("list a") - Expr::literal(" b") - Expr::literal(" c");
        assert_eq!(e.value(), "list a b c");
        assert_eq!(e.text().unwrap(), "a b c");
    }

    #[test]
    fn minus_absorbs_other_starter() {
        let s = session();
        s.eval("set n 0").unwrap();
        let a = s.expr("list x");
        let b = s.expr(" [incr n]");
        let joined = a - b;
        assert_eq!(joined.text().unwrap(), "x 1");
        drop(joined);
        assert_eq!(s.eval("set n").unwrap(), "1");
    }

    #[test]
    fn literal_combinations() {
        let l = Expr::literal(" -a 1") - Expr::literal(" -b 2");
        assert!(!l.is_starter());
        assert_eq!(l.value(), " -a 1 -b 2");
        assert_eq!(l.clone().prefixed("x").value(), "x  -a 1 -b 2");
        let s = session();
        let e = Expr::literal("list ") - s.expr("a b");
        assert!(e.is_starter());
        assert_eq!(e.text().unwrap(), "a b");
    }

    #[test]
    fn shift_prefixes_a_word() {
        let s = session();
        s.eval("proc show {args} {return $args}").unwrap();
        let e = "show" << s.expr("insert end x");
        assert_eq!(e.value(), "show insert end x");
        assert_eq!(e.text().unwrap(), "insert end x");
        let owned = String::from("show");
        assert_eq!((&owned << s.expr("a")).text().unwrap(), "a");
    }

    #[test]
    fn try_from_conversions() {
        let s = session();
        let n: i64 = s.expr("expr {6 * 7}").try_into().unwrap();
        assert_eq!(n, 42);
        let p: Point = s.expr("list 3 4").try_into().unwrap();
        assert_eq!(p, Point::new(3, 4));
        let t: String = s.expr("string toupper hi").try_into().unwrap();
        assert_eq!(t, "HI");
    }

    #[test]
    fn list_access() {
        let s = session();
        let l = s.expr("list 1 {two words} 3.5").list().unwrap();
        assert_eq!(l.len(), 3);
        assert_eq!(l.get::<String>(1).unwrap(), "two words");
        assert_eq!(s.expr("list 7").get::<i32>().unwrap(), 7);
    }

    #[test]
    fn display_shows_pending_text() {
        let s = session();
        let e = s.expr("set a 1") - Expr::literal("0");
        assert_eq!(e.to_string(), "set a 10");
        e.run().unwrap();
        assert_eq!(s.eval("set a").unwrap(), "10");
    }
}
