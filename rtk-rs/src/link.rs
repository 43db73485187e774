//! The variable link bridge.
//!
//! Host variables are shared cells ([`IntVar`], [`DoubleVar`], [`TextVar`]).
//! Linking one gives it an interpreter name `<ns>::variable<id>`; the id
//! counter is shared by all three kinds.  Numeric links are live in both
//! directions.  Text links go through an interpreter-owned mirror buffer and
//! are only copied by the two sync passes:
//!
//! - [`Session::sync_to_interpreter`]: host strings into mirror buffers
//!   (before the event loop starts, and after each callback),
//! - [`Session::sync_to_host`]: mirror buffers into host strings (before
//!   each callback).
//!
//! Links are keyed by the address of the shared cell.  The table holds a
//! clone of the cell, so the address stays valid while it is linked.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::backend::LinkTarget;
use crate::error::Result;
use crate::session::Session;

// ── Host variables ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct IntVar(Rc<Cell<i64>>);

impl IntVar {
    pub fn new(value: i64) -> Self {
        Self(Rc::new(Cell::new(value)))
    }

    pub fn get(&self) -> i64 {
        self.0.get()
    }

    pub fn set(&self, value: i64) {
        self.0.set(value);
    }
}

#[derive(Debug, Clone, Default)]
pub struct DoubleVar(Rc<Cell<f64>>);

impl DoubleVar {
    pub fn new(value: f64) -> Self {
        Self(Rc::new(Cell::new(value)))
    }

    pub fn get(&self) -> f64 {
        self.0.get()
    }

    pub fn set(&self, value: f64) {
        self.0.set(value);
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextVar(Rc<RefCell<String>>);

impl TextVar {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Rc::new(RefCell::new(value.into())))
    }

    pub fn get(&self) -> String {
        self.0.borrow().clone()
    }

    pub fn set(&self, value: impl Into<String>) {
        *self.0.borrow_mut() = value.into();
    }
}

// ── Tables ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct LinkTables {
    next: usize,
    ints: BTreeMap<usize, (IntVar, String)>,
    doubles: BTreeMap<usize, (DoubleVar, String)>,
    texts: BTreeMap<usize, (TextVar, String)>,
}

impl LinkTables {
    fn len(&self) -> usize {
        self.ints.len() + self.doubles.len() + self.texts.len()
    }
}

/// A host variable that can be linked to an interpreter variable.
pub trait Linkable: Clone {
    #[doc(hidden)]
    fn link_into(&self, session: &Session) -> Result<String>;
    #[doc(hidden)]
    fn unlink_from(&self, session: &Session);
    #[doc(hidden)]
    fn linked_name(&self, session: &Session) -> Option<String>;
}

macro_rules! impl_linkable {
    ($ty:ty, $table:ident, $target:expr) => {
        impl Linkable for $ty {
            fn link_into(&self, session: &Session) -> Result<String> {
                let key = Rc::as_ptr(&self.0) as usize;
                if let Some(name) = self.linked_name(session) {
                    return Ok(name);
                }
                let name = session.next_variable_name();
                let target: fn(&Self) -> LinkTarget = $target;
                session
                    .backend()
                    .link_var(&name, target(self))
                    .map_err(|msg| session.interpreter_error(msg))?;
                session.inner.links.borrow_mut().$table.insert(key, (self.clone(), name.clone()));
                tracing::debug!(target: "rtk::link", "linked {name}");
                Ok(name)
            }

            fn unlink_from(&self, session: &Session) {
                let key = Rc::as_ptr(&self.0) as usize;
                let removed = session.inner.links.borrow_mut().$table.remove(&key);
                if let Some((_, name)) = removed {
                    session.backend().unlink_var(&name);
                    tracing::debug!(target: "rtk::link", "unlinked {name}");
                }
            }

            fn linked_name(&self, session: &Session) -> Option<String> {
                let key = Rc::as_ptr(&self.0) as usize;
                session.inner.links.borrow().$table.get(&key).map(|(_, name)| name.clone())
            }
        }
    };
}

impl_linkable!(IntVar, ints, |v| LinkTarget::Int(v.0.clone()));
impl_linkable!(DoubleVar, doubles, |v| LinkTarget::Double(v.0.clone()));
impl_linkable!(TextVar, texts, |v| LinkTarget::Text(v.get()));

// ── Session API ───────────────────────────────────────────────────────────────

impl Session {
    /// Link `var` and return its interpreter name.  Linking a variable that
    /// is already linked returns the existing name.
    pub fn link<V: Linkable>(&self, var: &V) -> Result<String> {
        var.link_into(self)
    }

    /// Remove the link of `var`; a no-op if it is not linked.
    pub fn unlink<V: Linkable>(&self, var: &V) {
        var.unlink_from(self);
    }

    /// Link `var` until the returned guard is dropped.
    ///
    /// If `var` is already linked the guard reuses that name and leaves the
    /// existing link in place when dropped.
    pub fn link_scoped<V: Linkable>(&self, var: &V) -> Result<LinkGuard<V>> {
        let owned = var.linked_name(self).is_none();
        let name = self.link(var)?;
        Ok(LinkGuard { session: self.clone(), var: var.clone(), name, owned })
    }

    /// Number of live links of all kinds.
    pub fn link_count(&self) -> usize {
        self.inner.links.borrow().len()
    }

    fn next_variable_name(&self) -> String {
        let mut links = self.inner.links.borrow_mut();
        let id = links.next;
        links.next += 1;
        format!("{}{id}", self.config().variable_prefix())
    }

    /// Publish host values: refresh every text mirror buffer and notify the
    /// interpreter of every link.
    pub fn sync_to_interpreter(&self) {
        let (texts, numeric): (Vec<(String, String)>, Vec<String>) = {
            let links = self.inner.links.borrow();
            let texts = links.texts.values().map(|(v, n)| (n.clone(), v.get())).collect();
            let numeric = links
                .ints
                .values()
                .map(|(_, n)| n.clone())
                .chain(links.doubles.values().map(|(_, n)| n.clone()))
                .collect();
            (texts, numeric)
        };
        tracing::trace!(
            target: "rtk::link",
            texts = texts.len(),
            numeric = numeric.len(),
            "sync to interpreter"
        );
        let backend = self.backend();
        for (name, value) in &texts {
            backend.set_text_buffer(name, value);
            backend.update_linked_var(name);
        }
        for name in &numeric {
            backend.update_linked_var(name);
        }
    }

    /// Copy every text mirror buffer into its host string; a null buffer
    /// reads as empty.  Numeric links need no copy.
    pub fn sync_to_host(&self) {
        let texts: Vec<(TextVar, String)> =
            self.inner.links.borrow().texts.values().cloned().collect();
        tracing::trace!(target: "rtk::link", texts = texts.len(), "sync to host");
        for (var, name) in texts {
            let value = self.backend().text_buffer(&name).unwrap_or_default();
            match var.0.try_borrow_mut() {
                Ok(mut s) => *s = value,
                Err(_) => {
                    tracing::warn!(target: "rtk::link", "{name}: host string is borrowed, not updated")
                }
            }
        }
    }
}

// ── LinkGuard ─────────────────────────────────────────────────────────────────

/// A link that is removed when the guard is dropped.
pub struct LinkGuard<V: Linkable> {
    session: Session,
    var: V,
    name: String,
    /// Whether this guard created the link and so removes it.
    owned: bool,
}

impl<V: Linkable> LinkGuard<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var(&self) -> &V {
        &self.var
    }
}

impl<V: Linkable> Drop for LinkGuard<V> {
    fn drop(&mut self) {
        if self.owned {
            self.session.unlink(&self.var);
        }
    }
}

impl<V: Linkable> std::fmt::Display for LinkGuard<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
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
    fn names_share_one_counter() {
        let s = session();
        let a = s.link(&IntVar::new(1)).unwrap();
        let b = s.link(&TextVar::new("x")).unwrap();
        let c = s.link(&DoubleVar::new(0.5)).unwrap();
        assert_eq!([a, b, c], ["rtk::variable0", "rtk::variable1", "rtk::variable2"]);
        assert_eq!(s.link_count(), 3);
    }

    #[test]
    fn relinking_returns_existing_name() {
        let s = session();
        let v = IntVar::new(0);
        let first = s.link(&v).unwrap();
        assert_eq!(s.link(&v.clone()).unwrap(), first);
        assert_eq!(s.link_count(), 1);
    }

    #[test]
    fn numeric_links_are_live() {
        let s = session();
        let n = IntVar::new(3);
        let x = DoubleVar::new(1.0);
        let nn = s.link(&n).unwrap();
        let xn = s.link(&x).unwrap();
        assert_eq!(s.eval(&format!("set {nn}")).unwrap(), "3");
        s.eval(&format!("set {nn} 7; set {xn} 2.5")).unwrap();
        assert_eq!(n.get(), 7);
        assert_eq!(x.get(), 2.5);
        n.set(11);
        assert_eq!(s.eval(&format!("set {nn}")).unwrap(), "11");
        assert!(s.eval(&format!("set {nn} abc")).is_err());
        assert_eq!(n.get(), 11);
    }

    #[test]
    fn text_links_need_sync() {
        let s = session();
        let t = TextVar::new("hello");
        let name = s.link(&t).unwrap();
        assert_eq!(s.eval(&format!("set {name}")).unwrap(), "hello");

        t.set("changed");
        assert_eq!(s.eval(&format!("set {name}")).unwrap(), "hello");
        s.sync_to_interpreter();
        assert_eq!(s.eval(&format!("set {name}")).unwrap(), "changed");

        s.eval(&format!("set {name} {{from tcl}}")).unwrap();
        assert_eq!(t.get(), "changed");
        s.sync_to_host();
        assert_eq!(t.get(), "from tcl");
    }

    #[test]
    fn unlink_stops_synchronisation() {
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
        assert_eq!(s.link_count(), 0);
        // second unlink is a no-op
        s.unlink(&count);
    }

    #[test]
    fn guard_unlinks_on_drop() {
        let s = session();
        let t = TextVar::new("a");
        {
            let g = s.link_scoped(&t).unwrap();
            assert_eq!(g.name(), "rtk::variable0");
            assert_eq!(s.link_count(), 1);
        }
        assert_eq!(s.link_count(), 0);
        // unlinked text keeps its last interpreter value
        assert_eq!(s.eval("set rtk::variable0").unwrap(), "a");
    }

    #[test]
    fn guard_leaves_earlier_link_alone() {
        let s = session();
        let t = TextVar::new("a");
        let name = s.link(&t).unwrap();
        {
            let g = s.link_scoped(&t).unwrap();
            assert_eq!(g.name(), name);
        }
        assert_eq!(s.link_count(), 1);
        s.unlink(&t);
        assert_eq!(s.link_count(), 0);
    }

    #[test]
    fn callbacks_see_fresh_text_and_publish_changes() {
        let s = session();
        let input = TextVar::new("");
        let output = TextVar::new("");
        let in_name = s.link(&input).unwrap();
        let out_name = s.link(&output).unwrap();
        let (i, o) = (input.clone(), output.clone());
        let cb = s.register(move || o.set(i.get().to_uppercase())).unwrap();

        s.eval(&format!("set {in_name} shout; {cb}")).unwrap();
        assert_eq!(input.get(), "shout");
        assert_eq!(s.eval(&format!("set {out_name}")).unwrap(), "SHOUT");
    }
}
