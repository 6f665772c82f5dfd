//! Best-effort completion of a truncated JSON document.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    /// A backslash at this byte offset.
    Backslash(usize),
    /// A `\u` escape starting at this byte offset, `digits` hex digits in.
    Unicode { start: usize, digits: u8, value: u32 },
}

/// Incrementally scans JSON text and can produce a closed version of the
/// prefix seen so far.
///
/// The repaired text, if it parses, decodes to values whose strings are
/// prefixes of what the complete document will hold: incomplete escapes are
/// dropped rather than guessed.
#[derive(Debug, Clone)]
pub struct JsonAutoCloser {
    buf: String,
    stack: Vec<char>,
    in_string: bool,
    string_is_key: bool,
    last_string_was_key: bool,
    last_sig: Option<char>,
    escape: Escape,
    /// Start of a complete high-surrogate escape still waiting for its pair.
    high_surrogate: Option<usize>,
}

impl Default for JsonAutoCloser {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonAutoCloser {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            stack: Vec::new(),
            in_string: false,
            string_is_key: false,
            last_string_was_key: false,
            last_sig: None,
            escape: Escape::None,
            high_surrogate: None,
        }
    }

    pub fn raw(&self) -> &str {
        &self.buf
    }

    pub fn push(&mut self, fragment: &str) {
        for c in fragment.chars() {
            let offset = self.buf.len();
            self.buf.push(c);
            if self.in_string {
                self.scan_string_char(c, offset);
            } else {
                self.scan_structural_char(c);
            }
        }
    }

    fn scan_string_char(&mut self, c: char, offset: usize) {
        match self.escape {
            Escape::Backslash(start) => {
                if c == 'u' {
                    self.escape = Escape::Unicode { start, digits: 0, value: 0 };
                } else {
                    self.escape = Escape::None;
                    self.high_surrogate = None;
                }
            }
            Escape::Unicode { start, digits, value } => {
                let value = (value << 4) | c.to_digit(16).unwrap_or(0);
                let digits = digits + 1;
                if digits == 4 {
                    self.escape = Escape::None;
                    self.high_surrogate = if (0xD800..=0xDBFF).contains(&value) {
                        Some(start)
                    } else {
                        None
                    };
                } else {
                    self.escape = Escape::Unicode { start, digits, value };
                }
            }
            Escape::None => match c {
                '\\' => self.escape = Escape::Backslash(offset),
                '"' => {
                    self.in_string = false;
                    self.high_surrogate = None;
                    self.last_string_was_key = self.string_is_key;
                    self.last_sig = Some('"');
                }
                _ => self.high_surrogate = None,
            },
        }
    }

    fn scan_structural_char(&mut self, c: char) {
        match c {
            '{' | '[' => {
                self.stack.push(c);
                self.last_sig = Some(c);
            }
            '}' | ']' => {
                self.stack.pop();
                self.last_sig = Some(c);
            }
            '"' => {
                self.in_string = true;
                self.escape = Escape::None;
                self.high_surrogate = None;
                self.string_is_key = self.stack.last() == Some(&'{')
                    && matches!(self.last_sig, Some('{') | Some(','));
            }
            c if c.is_whitespace() => {}
            c => self.last_sig = Some(c),
        }
    }

    /// The buffered prefix with open strings, dangling tokens and open
    /// containers closed. Empty when nothing structural has arrived.
    pub fn repaired(&self) -> String {
        let mut out = self.buf.clone();

        if self.in_string {
            let cut = match self.escape {
                Escape::Backslash(start) | Escape::Unicode { start, .. } => {
                    Some(self.high_surrogate.unwrap_or(start))
                }
                Escape::None => self.high_surrogate,
            };
            if let Some(cut) = cut {
                out.truncate(cut);
            }
            out.push('"');
            if self.string_is_key {
                out.push_str(": null");
            }
        } else {
            trim_trailing_token(&mut out);
            truncate_end_whitespace(&mut out);
            match out.chars().last() {
                Some(',') => {
                    out.pop();
                }
                Some(':') => out.push_str("null"),
                Some('"') if self.last_string_was_key => out.push_str(": null"),
                _ => {}
            }
        }

        for open in self.stack.iter().rev() {
            out.push(if *open == '{' { '}' } else { ']' });
        }
        out
    }
}

fn truncate_end_whitespace(s: &mut String) {
    let len = s.trim_end().len();
    s.truncate(len);
}

/// Complete a trailing literal prefix (`tr` -> `true`) or strip the
/// unfinished tail of a number (`1.` -> `1`, `-` -> nothing).
fn trim_trailing_token(s: &mut String) {
    truncate_end_whitespace(s);
    let token_start = s
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        .last()
        .map(|(i, _)| i);
    let Some(start) = token_start else { return };

    let token = s[start..].to_string();
    for literal in ["true", "false", "null"] {
        if literal.starts_with(token.as_str()) {
            s.truncate(start);
            s.push_str(literal);
            return;
        }
    }

    let keep = token.trim_end_matches(|c: char| matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    let keep_len = keep.len();
    s.truncate(start + keep_len);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repair(text: &str) -> String {
        let mut closer = JsonAutoCloser::new();
        closer.push(text);
        closer.repaired()
    }

    fn parses(text: &str) -> serde_json::Value {
        serde_json::from_str(&repair(text)).unwrap()
    }

    #[test]
    fn test_open_string_value() {
        assert_eq!(parses(r#"{"thought": "The sch"#)["thought"], "The sch");
    }

    #[test]
    fn test_partial_key_and_colon() {
        assert_eq!(parses(r#"{"a": 1, "tho"#), serde_json::json!({"a": 1, "tho": null}));
        assert_eq!(parses(r#"{"a": 1, "b""#), serde_json::json!({"a": 1, "b": null}));
        assert_eq!(parses(r#"{"a": "#), serde_json::json!({"a": null}));
        assert_eq!(parses(r#"{"a": 1,"#), serde_json::json!({"a": 1}));
    }

    #[test]
    fn test_dangling_literals_and_numbers() {
        assert_eq!(parses(r#"{"a": tr"#)["a"], true);
        assert_eq!(parses(r#"{"a": nu"#)["a"], serde_json::Value::Null);
        assert_eq!(parses(r#"{"a": 1.5e"#)["a"], 1.5);
        assert_eq!(parses(r#"{"a": -"#)["a"], serde_json::Value::Null);
        assert_eq!(parses(r#"[1, 2"#), serde_json::json!([1, 2]));
    }

    #[test]
    fn test_nested_containers() {
        let v = parses(r#"{"a": {"b": [1, {"c": "x"#);
        assert_eq!(v, serde_json::json!({"a": {"b": [1, {"c": "x"}]}}));
    }

    #[test]
    fn test_drops_incomplete_escapes() {
        assert_eq!(parses(r#"{"t": "line\"#)["t"], "line");
        assert_eq!(parses(r#"{"t": "caf\u00"#)["t"], "caf");
        assert_eq!(parses(r#"{"t": "café"#)["t"], "café");
        assert_eq!(parses(r#"{"t": "a\"b"#)["t"], "a\"b");
    }

    #[test]
    fn test_drops_unpaired_high_surrogate() {
        assert_eq!(parses(r#"{"t": "x\ud83d"#)["t"], "x");
        assert_eq!(parses(r#"{"t": "x\ud83d\u"#)["t"], "x");
        assert_eq!(parses(r#"{"t": "x😀"#)["t"], "x\u{1F600}");
    }

    #[test]
    fn test_string_with_structural_chars() {
        assert_eq!(parses(r#"{"t": "a, {b}: [c"#)["t"], "a, {b}: [c");
    }

    #[test]
    fn test_nothing_yet() {
        assert_eq!(repair(""), "");
        assert_eq!(repair("   "), "");
    }

    #[test]
    fn test_complete_document_unchanged() {
        let text = r#"{"a": [1, 2], "b": "c"}"#;
        assert_eq!(repair(text), text);
    }
}
