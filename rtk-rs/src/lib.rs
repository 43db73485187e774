//! Fluent bindings for an embedded Tcl/Tk interpreter.
//!
//! Host code builds interpreter commands out of expressions instead of
//! formatting script text by hand.  A command is submitted once, when its
//! value is first needed or when the expression is dropped, and its result
//! is read back as a typed value:
//!
//! ```
//! use rtk::{Config, Session};
//!
//! let s = Session::headless(Config::default())?;
//! let area = s.expr("expr {6 * 7}").int()?;
//! assert_eq!(area, 42);
//! # Ok::<(), rtk::TkError>(())
//! ```
//!
//! Host closures become interpreter commands through the callback bridge
//! ([`Session::register`]) and host variables are shared with the
//! interpreter through the link bridge ([`Session::link`]).
//!
//! # Backends
//!
//! Without features the crate runs a small in-process Tcl interpreter that
//! records widgets instead of drawing them; build with `--features tk` to
//! drive the system Tcl/Tk 8.6 libraries.
//!
//! # Debugging
//!
//! - `RUST_LOG=rtk=debug`: every submitted command, callback and link.
//! - `RUST_LOG=rtk=trace`: also sync passes and callback dispatch.
//! - `RTK_DUMP_COMMANDS=1`: copy each command verbatim to stderr.

use std::io::Write;
use std::sync::Once;

pub mod backend;
pub mod callback;
pub mod cli;
pub mod command;
pub mod config;
pub mod decode;
pub mod error;
pub mod expr;
pub mod link;
pub mod options;
pub mod session;
pub mod widgets;

pub use callback::{CallbackHandle, CallbackReturn, IntoCallback, Params};
pub use command::Command;
pub use config::{Config, ConfigError};
pub use decode::{FromTcl, ListResult};
pub use error::{Result, TkError};
pub use expr::{Expr, Point, Rect};
pub use link::{DoubleVar, IntVar, LinkGuard, Linkable, TextVar};
pub use options::quote;
pub use session::Session;
pub use widgets::*;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing unless `RUST_LOG` is set; safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

/// Tell the interpreter library where the program lives (`argv[0]`), then
/// open the current session.
pub fn init(argv0: &str) -> Result<Session> {
    #[cfg(feature = "tk")]
    backend::tcl::find_executable(argv0);
    tracing::debug!(target: "rtk", argv0, "init");
    Session::current()
}

/// Publish linked variables and run the current session's event loop.
pub fn run_event_loop() -> Result<()> {
    Session::current()?.run_event_loop();
    Ok(())
}

/// Evaluate `script` on the current session right away.
pub fn eval_now(script: &str) -> Result<String> {
    Session::current()?.eval(script)
}

/// Copy every command of the current session to `stream`; `None` stops.
pub fn set_dump_stream(stream: Option<Box<dyn Write>>) -> Result<()> {
    Session::current()?.set_dump_stream(stream);
    Ok(())
}
