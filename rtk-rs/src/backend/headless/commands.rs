//! Built-in commands of the headless interpreter.
//!
//! Error messages follow Tcl's wording so scripts and tests written against
//! the real library read the same here.

use std::rc::Rc;
use std::time::{Duration, Instant};

use super::expr::{eval_cond, eval_expr};
use super::{Cmd, Flow, HeadlessInterp, ProcDef};
use crate::decode::{format_list, parse_int, parse_list};

type CmdResult = Result<String, Flow>;

pub(super) fn register_all(interp: &HeadlessInterp) {
    let table: &[(&str, super::Builtin)] = &[
        ("set", cmd_set),
        ("unset", cmd_unset),
        ("incr", cmd_incr),
        ("append", cmd_append),
        ("list", cmd_list),
        ("llength", cmd_llength),
        ("lindex", cmd_lindex),
        ("lappend", cmd_lappend),
        ("concat", cmd_concat),
        ("join", cmd_join),
        ("string", cmd_string),
        ("expr", cmd_expr),
        ("if", cmd_if),
        ("while", cmd_while),
        ("for", cmd_for),
        ("foreach", cmd_foreach),
        ("proc", cmd_proc),
        ("return", cmd_return),
        ("break", cmd_break),
        ("continue", cmd_continue),
        ("error", cmd_error),
        ("catch", cmd_catch),
        ("eval", cmd_eval),
        ("subst", cmd_subst),
        ("puts", cmd_puts),
        ("rename", cmd_rename),
        ("namespace", cmd_namespace),
        ("info", cmd_info),
        ("global", cmd_global),
        ("after", cmd_after),
        ("update", cmd_update),
        ("exit", cmd_exit),
    ];
    for &(name, f) in table {
        interp.define_builtin(name, f);
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

pub(super) fn wrong_args(usage: &str) -> Flow {
    Flow::Error(format!("wrong # args: should be \"{usage}\""))
}

/// Longest string `string repeat` may build.
const MAX_STRING_LEN: usize = i32::MAX as usize;

fn list(text: &str) -> Result<Vec<String>, Flow> {
    parse_list(text).map_err(Flow::from)
}

fn int(text: &str) -> Result<i64, Flow> {
    parse_int(text).map_err(Flow::from)
}

/// Resolve a Tcl index (`3`, `end`, `end-1`) against a sequence of `len`
/// elements; `None` when it falls outside.
pub(super) fn resolve_index(text: &str, len: usize) -> Result<Option<usize>, Flow> {
    let bad = || {
        Flow::Error(format!(
            "bad index \"{text}\": must be integer?[+-]integer? or end?[+-]integer?"
        ))
    };
    let t = text.trim();
    let idx = if let Some(rest) = t.strip_prefix("end") {
        let end = len as i64 - 1;
        match rest {
            "" => end,
            _ => match rest.strip_prefix('-') {
                Some(n) => end.checked_sub(parse_int(n).map_err(|_| bad())?),
                None => {
                    let n = parse_int(rest.strip_prefix('+').ok_or_else(bad)?).map_err(|_| bad())?;
                    end.checked_add(n)
                }
            }
            .ok_or_else(bad)?,
        }
    } else {
        parse_int(t).map_err(|_| bad())?
    };
    Ok(usize::try_from(idx).ok().filter(|&i| i < len))
}

/// Glob match supporting `*`, `?` and `\` escapes.
pub(super) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_at(&p, &t)
}

fn glob_at(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => (0..=t.len()).any(|i| glob_at(&p[1..], &t[i..])),
        Some('?') => !t.is_empty() && glob_at(&p[1..], &t[1..]),
        Some('\\') if p.len() > 1 => t.first() == Some(&p[1]) && glob_at(&p[2..], &t[1..]),
        Some(c) => t.first() == Some(c) && glob_at(&p[1..], &t[1..]),
    }
}

/// Run one loop body; `Ok(false)` means `break`.
fn loop_body(interp: &HeadlessInterp, body: &str) -> Result<bool, Flow> {
    match interp.eval_script(body) {
        Ok(_) | Err(Flow::Continue) => Ok(true),
        Err(Flow::Break) => Ok(false),
        Err(e) => Err(e),
    }
}

// ── Variables and lists ───────────────────────────────────────────────────────

fn cmd_set(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    match w.len() {
        2 => interp.get_var(&w[1]).map_err(Flow::Error),
        3 => interp.set_var(&w[1], &w[2]).map_err(Flow::Error),
        _ => Err(wrong_args("set varName ?newValue?")),
    }
}

fn cmd_unset(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    let mut names = &w[1..];
    let nocomplain = names.first().is_some_and(|a| a == "-nocomplain");
    if nocomplain {
        names = &names[1..];
    }
    for name in names {
        if let Err(e) = interp.unset_var(name) {
            if !nocomplain {
                return Err(Flow::Error(e));
            }
        }
    }
    Ok(String::new())
}

fn cmd_incr(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if !(2..=3).contains(&w.len()) {
        return Err(wrong_args("incr varName ?increment?"));
    }
    let amount = match w.get(2) {
        Some(a) => int(a)?,
        None => 1,
    };
    let current = match interp.get_var(&w[1]) {
        Ok(v) => int(&v)?,
        Err(_) => 0,
    };
    interp
        .set_var(&w[1], &current.wrapping_add(amount).to_string())
        .map_err(Flow::Error)
}

fn cmd_append(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.len() < 2 {
        return Err(wrong_args("append varName ?value ...?"));
    }
    let mut value = interp.get_var(&w[1]).unwrap_or_default();
    for part in &w[2..] {
        value.push_str(part);
    }
    interp.set_var(&w[1], &value).map_err(Flow::Error)
}

fn cmd_list(_: &HeadlessInterp, w: &[String]) -> CmdResult {
    Ok(format_list(&w[1..]))
}

fn cmd_llength(_: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.len() != 2 {
        return Err(wrong_args("llength list"));
    }
    Ok(list(&w[1])?.len().to_string())
}

fn cmd_lindex(_: &HeadlessInterp, w: &[String]) -> CmdResult {
    match w.len() {
        2 => Ok(w[1].clone()),
        3 => {
            let items = list(&w[1])?;
            Ok(resolve_index(&w[2], items.len())?
                .map(|i| items[i].clone())
                .unwrap_or_default())
        }
        _ => Err(wrong_args("lindex list ?index ...?")),
    }
}

fn cmd_lappend(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.len() < 2 {
        return Err(wrong_args("lappend varName ?value ...?"));
    }
    let mut items = match interp.get_var(&w[1]) {
        Ok(v) => list(&v)?,
        Err(_) => Vec::new(),
    };
    items.extend(w[2..].iter().cloned());
    interp.set_var(&w[1], &format_list(&items)).map_err(Flow::Error)
}

fn cmd_concat(_: &HeadlessInterp, w: &[String]) -> CmdResult {
    Ok(concat(&w[1..]))
}

fn concat(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn cmd_join(_: &HeadlessInterp, w: &[String]) -> CmdResult {
    if !(2..=3).contains(&w.len()) {
        return Err(wrong_args("join list ?joinString?"));
    }
    let sep = w.get(2).map(String::as_str).unwrap_or(" ");
    Ok(list(&w[1])?.join(sep))
}

fn cmd_string(_: &HeadlessInterp, w: &[String]) -> CmdResult {
    let Some(sub) = w.get(1) else {
        return Err(wrong_args("string subcommand ?arg ...?"));
    };
    let args = &w[2..];
    let arity = |n: usize, usage: &str| {
        if args.len() == n {
            Ok(())
        } else {
            Err(wrong_args(&format!("string {sub} {usage}")))
        }
    };
    match sub.as_str() {
        "length" => {
            arity(1, "string")?;
            Ok(args[0].chars().count().to_string())
        }
        "equal" => {
            arity(2, "string1 string2")?;
            Ok(u8::from(args[0] == args[1]).to_string())
        }
        "compare" => {
            arity(2, "string1 string2")?;
            Ok((args[0].cmp(&args[1]) as i8).to_string())
        }
        "match" => {
            arity(2, "pattern string")?;
            Ok(u8::from(glob_match(&args[0], &args[1])).to_string())
        }
        "toupper" => {
            arity(1, "string")?;
            Ok(args[0].to_uppercase())
        }
        "tolower" => {
            arity(1, "string")?;
            Ok(args[0].to_lowercase())
        }
        "trim" | "trimleft" | "trimright" => {
            if args.is_empty() || args.len() > 2 {
                return Err(wrong_args(&format!("string {sub} string ?chars?")));
            }
            let set: Vec<char> = match args.get(1) {
                Some(chars) => chars.chars().collect(),
                None => vec![' ', '\t', '\n', '\r'],
            };
            let s = args[0].as_str();
            Ok(match sub.as_str() {
                "trimleft" => s.trim_start_matches(&set[..]),
                "trimright" => s.trim_end_matches(&set[..]),
                _ => s.trim_matches(&set[..]),
            }
            .to_owned())
        }
        "index" => {
            arity(2, "string charIndex")?;
            let chars: Vec<char> = args[0].chars().collect();
            Ok(resolve_index(&args[1], chars.len())?
                .map(|i| chars[i].to_string())
                .unwrap_or_default())
        }
        "range" => {
            arity(3, "string first last")?;
            let chars: Vec<char> = args[0].chars().collect();
            let first = resolve_bound(&args[1], chars.len())?.max(0) as usize;
            let last = resolve_bound(&args[2], chars.len())?;
            if last < first as i64 || first >= chars.len() {
                return Ok(String::new());
            }
            let last = (last as usize).min(chars.len() - 1);
            Ok(chars[first..=last].iter().collect())
        }
        "first" => {
            arity(2, "needleString haystackString")?;
            Ok(match args[1].find(args[0].as_str()) {
                Some(byte) => args[1][..byte].chars().count() as i64,
                None => -1,
            }
            .to_string())
        }
        "repeat" => {
            arity(2, "string count")?;
            let n = usize::try_from(int(&args[1])?.max(0)).unwrap_or(usize::MAX);
            match args[0].len().checked_mul(n) {
                Some(total) if total <= MAX_STRING_LEN => Ok(args[0].repeat(n)),
                _ => Err(Flow::error("result would exceed maximum string length")),
            }
        }
        other => Err(Flow::Error(format!(
            "unknown or ambiguous subcommand \"{other}\": must be compare, equal, first, \
             index, length, match, range, repeat, tolower, toupper, trim, trimleft, or trimright"
        ))),
    }
}

/// Like [`resolve_index`] but keeps out-of-range positions for clamping.
fn resolve_bound(text: &str, len: usize) -> Result<i64, Flow> {
    let bad = || Flow::Error(format!("bad index \"{text}\""));
    let t = text.trim();
    let end = len as i64 - 1;
    match t.strip_prefix("end") {
        Some("") => Ok(end),
        Some(rest) => match rest.strip_prefix('-') {
            Some(n) => end.checked_sub(int(n)?).ok_or_else(bad),
            None => Err(bad()),
        },
        None => int(t),
    }
}

// ── Control flow ──────────────────────────────────────────────────────────────

fn cmd_expr(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.len() < 2 {
        return Err(wrong_args("expr arg ?arg ...?"));
    }
    eval_expr(interp, &concat(&w[1..]))
}

fn cmd_if(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    let mut i = 1;
    loop {
        let cond = w
            .get(i)
            .ok_or_else(|| Flow::error("wrong # args: no expression after \"if\" argument"))?;
        i += 1;
        if w.get(i).is_some_and(|t| t == "then") {
            i += 1;
        }
        let body = w.get(i).ok_or_else(|| {
            Flow::Error(format!("wrong # args: no script following \"{cond}\" argument"))
        })?;
        i += 1;
        if eval_cond(interp, cond)? {
            return interp.eval_script(body);
        }
        match w.get(i).map(String::as_str) {
            None => return Ok(String::new()),
            Some("elseif") => i += 1,
            Some("else") => {
                return match w.get(i + 1) {
                    Some(body) => interp.eval_script(body),
                    None => Err(Flow::error("wrong # args: no script following \"else\" argument")),
                };
            }
            Some(body) => return interp.eval_script(body),
        }
    }
}

fn cmd_while(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.len() != 3 {
        return Err(wrong_args("while test command"));
    }
    while eval_cond(interp, &w[1])? {
        if !loop_body(interp, &w[2])? {
            break;
        }
    }
    Ok(String::new())
}

fn cmd_for(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.len() != 5 {
        return Err(wrong_args("for start test next command"));
    }
    interp.eval_script(&w[1])?;
    while eval_cond(interp, &w[2])? {
        if !loop_body(interp, &w[4])? {
            break;
        }
        interp.eval_script(&w[3])?;
    }
    Ok(String::new())
}

fn cmd_foreach(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.len() != 4 {
        return Err(wrong_args("foreach varList list command"));
    }
    let vars = list(&w[1])?;
    if vars.is_empty() {
        return Err(Flow::error("foreach varlist is empty"));
    }
    let items = list(&w[2])?;
    for chunk in items.chunks(vars.len()) {
        for (n, var) in vars.iter().enumerate() {
            let value = chunk.get(n).map(String::as_str).unwrap_or("");
            interp.set_var(var, value).map_err(Flow::Error)?;
        }
        if !loop_body(interp, &w[3])? {
            break;
        }
    }
    Ok(String::new())
}

fn cmd_proc(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.len() != 4 {
        return Err(wrong_args("proc name args body"));
    }
    let mut params = Vec::new();
    for spec in list(&w[2])? {
        let parts = list(&spec)?;
        match parts.as_slice() {
            [name] => params.push((name.clone(), None)),
            [name, default] => params.push((name.clone(), Some(default.clone()))),
            _ => {
                return Err(Flow::Error(format!(
                    "too many fields in argument specifier \"{spec}\""
                )))
            }
        }
    }
    let def = ProcDef { params, body: w[3].clone() };
    interp.define(&w[1], Cmd::Proc(Rc::new(def)), None);
    Ok(String::new())
}

fn cmd_return(_: &HeadlessInterp, w: &[String]) -> CmdResult {
    match w.len() {
        1 => Err(Flow::Return(String::new())),
        2 => Err(Flow::Return(w[1].clone())),
        _ => Err(wrong_args("return ?value?")),
    }
}

fn cmd_break(_: &HeadlessInterp, _: &[String]) -> CmdResult {
    Err(Flow::Break)
}

fn cmd_continue(_: &HeadlessInterp, _: &[String]) -> CmdResult {
    Err(Flow::Continue)
}

fn cmd_error(_: &HeadlessInterp, w: &[String]) -> CmdResult {
    match w.get(1) {
        Some(msg) => Err(Flow::Error(msg.clone())),
        None => Err(wrong_args("error message ?errorInfo? ?errorCode?")),
    }
}

fn cmd_catch(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if !(2..=3).contains(&w.len()) {
        return Err(wrong_args("catch script ?resultVarName?"));
    }
    let (code, value) = match interp.eval_script(&w[1]) {
        Ok(v) => (0, v),
        Err(Flow::Error(msg)) => (1, msg),
        Err(Flow::Return(v)) => (2, v),
        Err(Flow::Break) => (3, String::new()),
        Err(Flow::Continue) => (4, String::new()),
        Err(exit @ Flow::Exit(_)) => return Err(exit),
    };
    if let Some(var) = w.get(2) {
        interp.set_var(var, &value).map_err(Flow::Error)?;
    }
    Ok(code.to_string())
}

fn cmd_eval(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.len() < 2 {
        return Err(wrong_args("eval arg ?arg ...?"));
    }
    interp.eval_script(&concat(&w[1..]))
}

fn cmd_subst(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.len() != 2 {
        return Err(wrong_args("subst string"));
    }
    interp.subst_text(&w[1])
}

// ── Output and introspection ──────────────────────────────────────────────────

fn cmd_puts(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    let mut args = &w[1..];
    if args.first().is_some_and(|a| a == "-nonewline") {
        args = &args[1..];
    }
    let text = match args {
        [text] | [_, text] => text,
        _ => return Err(wrong_args("puts ?-nonewline? ?channelId? string")),
    };
    if let [channel, _] = args {
        if channel != "stdout" && channel != "stderr" {
            return Err(Flow::Error(format!("can not find channel named \"{channel}\"")));
        }
    }
    interp.output.borrow_mut().push(text.clone());
    Ok(String::new())
}

fn cmd_rename(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if w.len() != 3 {
        return Err(wrong_args("rename oldName newName"));
    }
    interp.rename_command(&w[1], &w[2]).map_err(Flow::Error)?;
    Ok(String::new())
}

fn cmd_namespace(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    match w.get(1).map(String::as_str) {
        Some("eval") if w.len() >= 4 => interp.eval_script(&concat(&w[3..])),
        Some("eval") => Err(wrong_args("namespace eval name arg ?arg...?")),
        Some("current") => Ok("::".to_owned()),
        Some("exists") if w.len() == 3 => Ok("1".to_owned()),
        Some(other) => Err(Flow::Error(format!(
            "unknown or ambiguous subcommand \"{other}\": must be current, eval, or exists"
        ))),
        None => Err(wrong_args("namespace subcommand ?arg ...?")),
    }
}

fn cmd_info(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    match (w.get(1).map(String::as_str), w.len()) {
        (Some("exists"), 3) => Ok(u8::from(interp.var_exists(&w[2])).to_string()),
        (Some("commands" | "procs"), 2 | 3) => {
            let procs_only = w[1] == "procs";
            let pattern = w.get(2).map(|p| p.trim_start_matches("::"));
            let names: Vec<String> = interp
                .command_names()
                .into_iter()
                .filter(|n| pattern.map_or(true, |p| glob_match(p, n)))
                .filter(|n| !procs_only || interp.is_proc(n))
                .collect();
            Ok(format_list(&names))
        }
        (Some("level"), 2) => Ok((interp.frames.borrow().len() - 1).to_string()),
        (Some(sub @ ("exists" | "commands" | "procs" | "level")), _) => {
            Err(wrong_args(&format!("info {sub} ?arg?")))
        }
        (Some(other), _) => Err(Flow::Error(format!(
            "unknown or ambiguous subcommand \"{other}\": must be commands, exists, level, or procs"
        ))),
        (None, _) => Err(wrong_args("info subcommand ?arg ...?")),
    }
}

fn cmd_global(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    if interp.in_proc() {
        for name in &w[1..] {
            interp.declare_global(name);
        }
    }
    Ok(String::new())
}

// ── Events ────────────────────────────────────────────────────────────────────

fn cmd_after(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    let Some(first) = w.get(1) else {
        return Err(wrong_args("after option ?arg ...?"));
    };
    match first.as_str() {
        "idle" if w.len() >= 3 => {
            let id = interp.schedule(None, concat(&w[2..]));
            Ok(format!("after#{id}"))
        }
        "cancel" if w.len() == 3 => {
            if let Some(id) = w[2].strip_prefix("after#").and_then(|n| n.parse().ok()) {
                interp.cancel_event(id);
            }
            Ok(String::new())
        }
        "info" => Ok(format_list(&interp.event_ids())),
        _ => {
            let ms = u64::try_from(int(first)?).unwrap_or(0);
            let delay = Duration::from_millis(ms);
            if w.len() == 2 {
                std::thread::sleep(delay);
                return Ok(String::new());
            }
            let id = interp.schedule(Some(Instant::now() + delay), concat(&w[2..]));
            Ok(format!("after#{id}"))
        }
    }
}

fn cmd_update(interp: &HeadlessInterp, w: &[String]) -> CmdResult {
    match w.get(1).map(String::as_str) {
        None | Some("idletasks") if w.len() <= 2 => {
            interp.process_due_events();
            Ok(String::new())
        }
        _ => Err(wrong_args("update ?idletasks?")),
    }
}

fn cmd_exit(_: &HeadlessInterp, w: &[String]) -> CmdResult {
    let code = match w.get(1) {
        Some(c) => i32::try_from(int(c)?).unwrap_or(1),
        None => 0,
    };
    Err(Flow::Exit(code))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
