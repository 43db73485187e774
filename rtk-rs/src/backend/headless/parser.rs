//! Script evaluation: the Tcl word-parsing and substitution rules.
//!
//! Parsing and evaluation happen in one pass, like Tcl's own `Tcl_Eval`:
//! each command's words are substituted as they are scanned and the command
//! is invoked as soon as its terminator is reached.

use super::{Flow, HeadlessInterp};
use crate::decode::backslash;

impl HeadlessInterp {
    /// Evaluate a whole script in the current frame.
    pub(crate) fn eval_script(&self, script: &str) -> Result<String, Flow> {
        let chars: Vec<char> = script.chars().collect();
        self.run(&chars, 0, false).map(|(result, _)| result)
    }

    /// Perform `$`, `[…]` and backslash substitution over `text`.
    pub(crate) fn subst_text(&self, text: &str) -> Result<String, Flow> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut i = 0;
        while i < chars.len() {
            i = match chars[i] {
                '$' => self.subst_var(&chars, i, &mut out)?,
                '[' => self.subst_cmd(&chars, i, &mut out)?,
                '\\' => backslash(&chars, i, &mut out),
                c => {
                    out.push(c);
                    i + 1
                }
            };
        }
        Ok(out)
    }

    /// Evaluate commands starting at `pos`.  When `nested`, evaluation stops
    /// at the `]` closing a command substitution and its index is returned.
    fn run(&self, chars: &[char], mut pos: usize, nested: bool) -> Result<(String, usize), Flow> {
        let mut result = String::new();

        loop {
            while pos < chars.len() && (chars[pos].is_whitespace() || chars[pos] == ';') {
                pos += 1;
            }
            if pos >= chars.len() {
                if nested {
                    return Err(Flow::error("missing close-bracket"));
                }
                return Ok((result, pos));
            }
            if nested && chars[pos] == ']' {
                return Ok((result, pos));
            }
            if chars[pos] == '#' {
                while pos < chars.len() && chars[pos] != '\n' {
                    if chars[pos] == '\\' {
                        pos += 1;
                    }
                    pos += 1;
                }
                continue;
            }

            let mut words = Vec::new();
            loop {
                while pos < chars.len() {
                    match chars[pos] {
                        ' ' | '\t' => pos += 1,
                        '\\' if chars.get(pos + 1) == Some(&'\n') => pos += 2,
                        _ => break,
                    }
                }
                match chars.get(pos) {
                    None if nested => return Err(Flow::error("missing close-bracket")),
                    None | Some('\n') | Some(';') => break,
                    Some(']') if nested => break,
                    _ => {}
                }
                let (word, next) = self.parse_word(chars, pos, nested)?;
                words.push(word);
                pos = next;
            }

            if !words.is_empty() {
                result = self.invoke(&words)?;
            }
        }
    }

    fn parse_word(&self, chars: &[char], pos: usize, nested: bool) -> Result<(String, usize), Flow> {
        let ends_word = |i: usize| match chars.get(i) {
            None => true,
            Some(&c) => c.is_whitespace() || c == ';' || (nested && c == ']'),
        };

        match chars[pos] {
            '{' => {
                let end = matching_brace(chars, pos)?;
                let mut word = String::new();
                let mut i = pos + 1;
                while i < end {
                    if chars[i] == '\\' && chars.get(i + 1) == Some(&'\n') {
                        i = backslash(chars, i, &mut word);
                    } else if chars[i] == '\\' && i + 1 < end {
                        word.push(chars[i]);
                        word.push(chars[i + 1]);
                        i += 2;
                    } else {
                        word.push(chars[i]);
                        i += 1;
                    }
                }
                if !ends_word(end + 1) {
                    return Err(Flow::error("extra characters after close-brace"));
                }
                Ok((word, end + 1))
            }
            '"' => {
                let mut word = String::new();
                let mut i = pos + 1;
                loop {
                    i = match chars.get(i) {
                        None => return Err(Flow::error("missing \"")),
                        Some('"') => break,
                        Some('$') => self.subst_var(chars, i, &mut word)?,
                        Some('[') => self.subst_cmd(chars, i, &mut word)?,
                        Some('\\') => backslash(chars, i, &mut word),
                        Some(&c) => {
                            word.push(c);
                            i + 1
                        }
                    };
                }
                if !ends_word(i + 1) {
                    return Err(Flow::error("extra characters after close-quote"));
                }
                Ok((word, i + 1))
            }
            _ => {
                let mut word = String::new();
                let mut i = pos;
                while !ends_word(i) {
                    i = match chars[i] {
                        '$' => self.subst_var(chars, i, &mut word)?,
                        '[' => self.subst_cmd(chars, i, &mut word)?,
                        '\\' => backslash(chars, i, &mut word),
                        c => {
                            word.push(c);
                            i + 1
                        }
                    };
                }
                Ok((word, i))
            }
        }
    }

    /// Substitute the variable reference at `chars[i] == '$'`.
    pub(crate) fn subst_var(&self, chars: &[char], i: usize, out: &mut String) -> Result<usize, Flow> {
        let (name, next) = match chars.get(i + 1) {
            Some('{') => {
                let close = chars[i + 2..]
                    .iter()
                    .position(|&c| c == '}')
                    .ok_or_else(|| Flow::error("missing close-brace for variable name"))?;
                let name: String = chars[i + 2..i + 2 + close].iter().collect();
                (name, i + 3 + close)
            }
            _ => {
                let mut j = i + 1;
                while j < chars.len() {
                    if chars[j].is_alphanumeric() || chars[j] == '_' {
                        j += 1;
                    } else if chars[j] == ':' && chars.get(j + 1) == Some(&':') {
                        j += 2;
                    } else {
                        break;
                    }
                }
                (chars[i + 1..j].iter().collect(), j)
            }
        };
        if name.is_empty() && next == i + 1 {
            out.push('$');
            return Ok(i + 1);
        }
        let value = self.get_var(&name).map_err(Flow::Error)?;
        out.push_str(&value);
        Ok(next)
    }

    /// Substitute the command at `chars[i] == '['`.
    pub(crate) fn subst_cmd(&self, chars: &[char], i: usize, out: &mut String) -> Result<usize, Flow> {
        let (result, close) = self.run(chars, i + 1, true)?;
        out.push_str(&result);
        Ok(close + 1)
    }
}

/// Index of the `}` matching the `{` at `open`.
pub(crate) fn matching_brace(chars: &[char], open: usize) -> Result<usize, Flow> {
    let mut depth = 0;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(Flow::error("missing close-brace"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run(script: &str) -> Result<String, Flow> {
        HeadlessInterp::new().eval_script(script)
    }

    #[test]
    fn braces_suppress_substitution() {
        assert_eq!(run("set a {$x [y]}").unwrap(), "$x [y]");
    }

    #[test]
    fn nested_braces_are_kept() {
        assert_eq!(run("set a {x {y z}}").unwrap(), "x {y z}");
    }

    #[test]
    fn quotes_substitute() {
        assert_eq!(run("set x 1; set y \"a $x [set x] b\"").unwrap(), "a 1 1 b");
    }

    #[test]
    fn command_substitution_nests() {
        assert_eq!(run("set a [list [list a b] c]").unwrap(), "{a b} c");
    }

    #[test]
    fn namespaced_and_braced_variable_names() {
        assert_eq!(run("set rtk::v 4; set x $rtk::v").unwrap(), "4");
        assert_eq!(run("set {a b} 5; set x ${a b}").unwrap(), "5");
    }

    #[test]
    fn lone_dollar_is_literal() {
        assert_eq!(run("set x $").unwrap(), "$");
    }

    #[test]
    fn comments_and_separators() {
        assert_eq!(run("# comment\nset a 1 ; set b 2\n").unwrap(), "2");
    }

    #[test]
    fn backslash_newline_joins_words() {
        assert_eq!(run("set a \\\n    7").unwrap(), "7");
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(run("set a {x").unwrap_err(), Flow::error("missing close-brace"));
        assert_eq!(run("set a [set b").unwrap_err(), Flow::error("missing close-bracket"));
        assert_eq!(run("set a \"x").unwrap_err(), Flow::error("missing \""));
        assert_eq!(
            run("set a {x}y").unwrap_err(),
            Flow::error("extra characters after close-brace")
        );
    }

    #[test]
    fn missing_variable() {
        assert_eq!(
            run("set a $nope").unwrap_err(),
            Flow::error("can't read \"nope\": no such variable")
        );
    }

    #[test]
    fn subst_text_handles_all_forms() {
        let i = HeadlessInterp::new();
        i.eval_script("set n 3").unwrap();
        assert_eq!(i.subst_text("n=$n [set n]\\t!").unwrap(), "n=3 3\t!");
    }
}
