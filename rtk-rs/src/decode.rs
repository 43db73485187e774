//! Result decoding: typed values and list elements out of interpreter text.
//!
//! Every interpreter result is a string.  Numbers follow Tcl's spelling
//! rules (surrounding whitespace allowed, `0x`/`0o`/`0b` radix prefixes);
//! lists follow Tcl's list syntax (whitespace separated, `{…}` and `"…"`
//! grouping, backslash escapes).

use crate::error::{Result, TkError};

// ── Scalar conversion ─────────────────────────────────────────────────────────

/// A host type that can be read out of an interpreter string.
pub trait FromTcl: Sized {
    fn from_tcl(text: &str) -> Result<Self>;
}

impl FromTcl for i64 {
    fn from_tcl(text: &str) -> Result<Self> {
        parse_int(text)
    }
}

impl FromTcl for i32 {
    fn from_tcl(text: &str) -> Result<Self> {
        let wide = parse_int(text)?;
        i32::try_from(wide).map_err(|_| {
            TkError::conversion(format!("integer value too large to represent: \"{text}\""))
        })
    }
}

impl FromTcl for f64 {
    fn from_tcl(text: &str) -> Result<Self> {
        parse_double(text)
    }
}

impl FromTcl for bool {
    fn from_tcl(text: &str) -> Result<Self> {
        parse_bool(text)
    }
}

impl FromTcl for String {
    fn from_tcl(text: &str) -> Result<Self> {
        Ok(text.to_owned())
    }
}

/// Parse a Tcl integer.
pub fn parse_int(text: &str) -> Result<i64> {
    parse_int_opt(text)
        .ok_or_else(|| TkError::conversion(format!("expected integer but got \"{text}\"")))
}

fn parse_int_opt(text: &str) -> Option<i64> {
    let t = text.trim();
    let (negative, body) = match t.as_bytes().first()? {
        b'-' => (true, &t[1..]),
        b'+' => (false, &t[1..]),
        _ => (false, t),
    };
    let (radix, digits) = match body.get(..2) {
        Some("0x" | "0X") => (16, &body[2..]),
        Some("0o" | "0O") => (8, &body[2..]),
        Some("0b" | "0B") => (2, &body[2..]),
        _ => (10, body),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    // Parse the magnitude as u64 so i64::MIN survives the sign flip.
    let magnitude = u64::from_str_radix(digits, radix).ok()?;
    if negative {
        0i64.checked_sub_unsigned(magnitude)
    } else {
        i64::try_from(magnitude).ok()
    }
}

/// Parse a Tcl floating-point number (integers are accepted too).
pub fn parse_double(text: &str) -> Result<f64> {
    let t = text.trim();
    if let Some(n) = parse_int_opt(t) {
        return Ok(n as f64);
    }
    // Rust accepts "infinity"/"nan" spellings that Tcl also understands,
    // but not a bare sign or an empty string.
    match t.parse::<f64>() {
        Ok(x) if !t.is_empty() => Ok(x),
        _ => Err(TkError::conversion(format!(
            "expected floating-point number but got \"{text}\""
        ))),
    }
}

/// Parse a Tcl boolean: any integer, or `true/false/yes/no/on/off`.
pub fn parse_bool(text: &str) -> Result<bool> {
    let t = text.trim();
    if let Some(n) = parse_int_opt(t) {
        return Ok(n != 0);
    }
    match t.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" => Ok(false),
        _ => Err(TkError::conversion(format!("expected boolean value but got \"{text}\""))),
    }
}

/// Format a double the way Tcl does: integral values keep a `.0`.
pub fn format_double(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

// ── List parsing ──────────────────────────────────────────────────────────────

/// Split `text` into Tcl list elements.
pub fn parse_list(text: &str) -> Result<Vec<String>> {
    let chars: Vec<char> = text.chars().collect();
    let mut items = Vec::new();
    let mut i = 0;

    loop {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        match chars[i] {
            '{' => {
                let mut depth = 1;
                let start = i + 1;
                i += 1;
                while i < chars.len() {
                    match chars[i] {
                        '\\' => i += 1,
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(TkError::conversion("unmatched open brace in list"));
                }
                items.push(chars[start..i].iter().collect());
                i += 1;
                if i < chars.len() && !chars[i].is_whitespace() {
                    return Err(TkError::conversion(format!(
                        "list element in braces followed by \"{}\" instead of space",
                        trailing_word(&chars[i..])
                    )));
                }
            }
            '"' => {
                let mut item = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(TkError::conversion("unmatched open quote in list")),
                        Some('"') => break,
                        Some('\\') => i = backslash(&chars, i, &mut item),
                        Some(&c) => {
                            item.push(c);
                            i += 1;
                        }
                    }
                }
                items.push(item);
                i += 1;
                if i < chars.len() && !chars[i].is_whitespace() {
                    return Err(TkError::conversion(format!(
                        "list element in quotes followed by \"{}\" instead of space",
                        trailing_word(&chars[i..])
                    )));
                }
            }
            _ => {
                let mut item = String::new();
                while i < chars.len() && !chars[i].is_whitespace() {
                    if chars[i] == '\\' {
                        i = backslash(&chars, i, &mut item);
                    } else {
                        item.push(chars[i]);
                        i += 1;
                    }
                }
                items.push(item);
            }
        }
    }

    Ok(items)
}

fn trailing_word(chars: &[char]) -> String {
    chars.iter().take_while(|c| !c.is_whitespace()).collect()
}

/// Decode one backslash sequence starting at `chars[i] == '\\'`, push the
/// result onto `out`, and return the index just past the sequence.
pub(crate) fn backslash(chars: &[char], i: usize, out: &mut String) -> usize {
    let Some(&c) = chars.get(i + 1) else {
        out.push('\\');
        return i + 1;
    };
    match c {
        'n' => out.push('\n'),
        't' => out.push('\t'),
        'r' => out.push('\r'),
        'a' => out.push('\x07'),
        'b' => out.push('\x08'),
        'f' => out.push('\x0c'),
        'v' => out.push('\x0b'),
        '\n' => {
            // backslash-newline plus leading whitespace collapses to a space
            let mut j = i + 2;
            while j < chars.len() && (chars[j] == ' ' || chars[j] == '\t') {
                j += 1;
            }
            out.push(' ');
            return j;
        }
        'x' | 'u' => {
            let max = if c == 'x' { 2 } else { 4 };
            let hex: String = chars[i + 2..]
                .iter()
                .take(max)
                .take_while(|h| h.is_ascii_hexdigit())
                .collect();
            if hex.is_empty() {
                out.push(c);
                return i + 2;
            }
            if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                out.push(ch);
            }
            return i + 2 + hex.len();
        }
        other => out.push(other),
    }
    i + 2
}

// ── List formatting ───────────────────────────────────────────────────────────

/// Quote one element so that [`parse_list`] reads it back unchanged.
pub fn list_element(item: &str) -> String {
    if item.is_empty() {
        return "{}".to_owned();
    }
    let special = |c: char| c.is_whitespace() || "{}[]$\";\\".contains(c);
    if !item.chars().any(special) && !item.starts_with('#') {
        return item.to_owned();
    }
    if braces_balanced(item) && !item.ends_with('\\') {
        return format!("{{{item}}}");
    }
    let mut out = String::with_capacity(item.len() + 8);
    for c in item.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if special(c) || c == '#' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Join elements into a well-formed list string.
pub fn format_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|s| list_element(s.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn braces_balanced(s: &str) -> bool {
    let mut depth = 0i32;
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

// ── ListResult ────────────────────────────────────────────────────────────────

/// A list-shaped result, parsed once and indexed many times.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListResult {
    items: Vec<String>,
}

impl ListResult {
    /// Parse `text`; fails with `TypeConversion` when it is not a list.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self { items: parse_list(text)? })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Typed element at `index`.
    pub fn get<T: FromTcl>(&self, index: usize) -> Result<T> {
        let item = self
            .items
            .get(index)
            .ok_or_else(|| TkError::range(format!("list index {index} out of range")))?;
        T::from_tcl(item)
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn into_items(self) -> Vec<String> {
        self.items
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ints() {
        assert_eq!(parse_int("42").unwrap(), 42);
        assert_eq!(parse_int("  -7 ").unwrap(), -7);
        assert_eq!(parse_int("0x1F").unwrap(), 31);
        assert_eq!(parse_int("0b101").unwrap(), 5);
        assert_eq!(parse_int("-9223372036854775808").unwrap(), i64::MIN);
    }

    #[test]
    fn bad_ints_are_conversion_errors() {
        for bad in ["abc", "", "3.14", "12abc", "-", "0x"] {
            let err = parse_int(bad).unwrap_err();
            assert!(matches!(err, TkError::TypeConversion(_)), "{bad:?}");
        }
        assert_eq!(
            parse_int("abc").unwrap_err().to_string(),
            "expected integer but got \"abc\""
        );
    }

    #[test]
    fn i32_range_is_checked() {
        assert_eq!(i32::from_tcl("2147483647").unwrap(), i32::MAX);
        assert!(matches!(i32::from_tcl("2147483648"), Err(TkError::TypeConversion(_))));
    }

    #[test]
    fn doubles() {
        assert_eq!(parse_double("3.14").unwrap(), 3.14);
        assert_eq!(parse_double("42").unwrap(), 42.0);
        assert_eq!(parse_double(" 1e3 ").unwrap(), 1000.0);
        assert!(matches!(parse_double("abc"), Err(TkError::TypeConversion(_))));
        assert!(parse_double("").is_err());
    }

    #[test]
    fn booleans() {
        assert!(parse_bool("1").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("Yes").unwrap());
        assert!(!parse_bool("off").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn double_formatting() {
        assert_eq!(format_double(3.0), "3.0");
        assert_eq!(format_double(-0.5), "-0.5");
        assert_eq!(format_double(1e20), "100000000000000000000");
    }

    #[test]
    fn simple_list() {
        assert_eq!(parse_list("10 20").unwrap(), ["10", "20"]);
        assert_eq!(parse_list("  a\tb\nc  ").unwrap(), ["a", "b", "c"]);
        assert!(parse_list("").unwrap().is_empty());
    }

    #[test]
    fn braced_and_quoted_elements() {
        assert_eq!(parse_list("a {b c} d").unwrap(), ["a", "b c", "d"]);
        assert_eq!(parse_list("{a {b}} x").unwrap(), ["a {b}", "x"]);
        assert_eq!(parse_list(r#""hello world" x"#).unwrap(), ["hello world", "x"]);
        assert_eq!(parse_list("{}").unwrap(), [""]);
    }

    #[test]
    fn backslashes_in_bare_words() {
        assert_eq!(parse_list(r"a\ b c").unwrap(), ["a b", "c"]);
        assert_eq!(parse_list(r"\x41é").unwrap(), ["Aé"]);
    }

    #[test]
    fn malformed_lists() {
        assert!(matches!(parse_list("{a b"), Err(TkError::TypeConversion(_))));
        assert!(matches!(parse_list("{a}b"), Err(TkError::TypeConversion(_))));
        assert!(matches!(parse_list("\"abc"), Err(TkError::TypeConversion(_))));
    }

    #[test]
    fn element_quoting() {
        assert_eq!(list_element("plain"), "plain");
        assert_eq!(list_element(""), "{}");
        assert_eq!(list_element("a b"), "{a b}");
        assert_eq!(list_element("a}b"), r"a\}b");
        assert_eq!(format_list(&["x", "y z", ""]), "x {y z} {}");
    }

    #[test]
    fn list_result_access() {
        let l = ListResult::parse("1 2.5 three").unwrap();
        assert_eq!(l.len(), 3);
        assert_eq!(l.get::<i64>(0).unwrap(), 1);
        assert_eq!(l.get::<f64>(1).unwrap(), 2.5);
        assert_eq!(l.get::<String>(2).unwrap(), "three");
        assert!(matches!(l.get::<i64>(2), Err(TkError::TypeConversion(_))));
        assert!(matches!(l.get::<i64>(3), Err(TkError::Range(_))));
    }
}
