use std::path::Path;
use std::process::ExitCode;

use rtk::cli::{self, CliArgs, ConfigFile};
use rtk::decode::format_list;
use rtk::{Config, Session, TkError};

const USAGE: &str = "Usage: rtk [-dnq] [-F[<config>]] [-c<cmd>] [<script> [<arg> ...]]";

fn main() -> ExitCode {
    rtk::init_tracing();

    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("rtk: {e}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("rtk: {e}");
            return ExitCode::FAILURE;
        }
    };

    let argv0 = std::env::args().next().unwrap_or_else(|| "rtk".to_owned());
    match run(&argv0, &args, config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("rtk: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Defaults, then the config file, then `RTK_*`, then command-line flags.
fn load_config(args: &CliArgs) -> Result<Config, TkError> {
    let mut config = Config::default();

    let path = match &args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(p) => Some(p.clone()),
        ConfigFile::Search => cli::find_user_config(),
    };
    if let Some(path) = path {
        let text = std::fs::read_to_string(&path)?;
        for e in config.apply_str(&text) {
            eprintln!("rtk: {}: {e}", path.display());
        }
        tracing::debug!(target: "rtk::main", "loaded config {}", path.display());
    }
    for e in config.apply_env() {
        eprintln!("rtk: environment: {e}");
    }
    if args.dump {
        config.dump_commands = true;
    }
    if args.no_eval {
        config.evaluate = false;
    }
    config.validate()?;
    Ok(config)
}

fn run(argv0: &str, args: &CliArgs, config: Config) -> Result<ExitCode, TkError> {
    #[cfg(feature = "tk")]
    let session = {
        rtk::backend::tcl::find_executable(argv0);
        Session::tk(config)?
    };
    #[cfg(not(feature = "tk"))]
    let session = Session::headless(config)?;
    Session::install(session.clone());

    let script_name = args
        .script
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| argv0.to_owned());
    session.eval(&format!(
        "set argv0 {}; set argv {}; set argc {}",
        format_list(&[script_name]),
        format_list(&[format_list(&args.script_args)]),
        args.script_args.len()
    ))?;

    if let Some(path) = &args.script {
        run_file(&session, path)?;
    }
    if let Some(cmd) = &args.command {
        let result = session.eval(cmd)?;
        if !result.is_empty() {
            println!("{result}");
        }
    }
    flush_output(&session);

    if !args.no_loop {
        session.run_event_loop();
        flush_output(&session);
    }

    Ok(ExitCode::from(exit_status(&session)))
}

/// 1 if a dropped command failed, otherwise the interpreter's `exit` code.
fn exit_status(session: &Session) -> u8 {
    if let Some(e) = session.take_deferred_error() {
        eprintln!("rtk: {e}");
        return 1;
    }
    let code = session
        .headless_interp()
        .and_then(|h| h.exit_code())
        .unwrap_or(0);
    u8::try_from(code).unwrap_or(1)
}

fn run_file(session: &Session, path: &Path) -> Result<(), TkError> {
    let script = std::fs::read_to_string(path)?;
    tracing::debug!(target: "rtk::main", "running {}", path.display());
    session.eval(&script).map(drop)
}

/// Headless `puts` output is captured; print it.
fn flush_output(session: &Session) {
    if let Some(h) = session.headless_interp() {
        for line in h.take_output() {
            println!("{line}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::headless(Config::default()).unwrap()
    }

    #[test]
    fn status_follows_interpreter_exit() {
        let s = session();
        assert_eq!(exit_status(&s), 0);
        s.eval("exit 4").unwrap();
        assert_eq!(exit_status(&s), 4);
    }

    #[test]
    fn failed_dropped_command_fails_the_run() {
        let s = session();
        drop(s.expr("error {lost on drop}"));
        assert_eq!(exit_status(&s), 1);
        // the error is reported once
        assert_eq!(exit_status(&s), 0);
    }
}
