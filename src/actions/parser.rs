//! Parser turning free-form model replies into validated action records.
//!
//! Model output arrives wrapped in XML-ish tags, code fences, full-width
//! punctuation, JSON-style keys, or with unescaped quotes inside string
//! arguments. The parser strips the wrappers, extracts the first balanced
//! `do(...)`/`finish(...)` call, and parses it with a literal-only argument
//! grammar. Arbitrary expressions never evaluate; anything that is not a
//! literal fails validation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// The enumerated `do` action names.
pub const ACTION_NAMES: &[&str] = &[
    "Launch",
    "Tap",
    "Double Tap",
    "Long Press",
    "Swipe",
    "Type",
    "Type_Name",
    "Back",
    "Home",
    "Wait",
    "Take_over",
    "Note",
    "Call_API",
    "Interact",
];

/// String-typed arguments that the permissive fallback extracts between the
/// first quote and the last matching quote, tolerating unescaped quotes
/// inside (a common model mistake).
const LOOSE_STRING_KEYS: &[&str] = &["message", "text", "app", "action", "duration"];

/// Raised when a model reply cannot be converted to an action record. The
/// original reply is kept for the retry prompt and for post-mortems.
#[derive(Error, Debug)]
#[error("failed to parse action: {reason} (raw: {raw:?})")]
pub struct ParseError {
    pub reason: String,
    pub raw: String,
}

impl ParseError {
    fn new(reason: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

/// Parse a raw model reply into an action record.
pub fn parse_action(response: &str) -> Result<Value, ParseError> {
    let stripped = strip_wrappers(response);

    // Some third-party models output a JSON object directly.
    if stripped.starts_with('{') && stripped.ends_with('}') {
        if let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(&stripped) {
            if !map.contains_key("_metadata") {
                let metadata = if map.contains_key("message") && !map.contains_key("action") {
                    "finish"
                } else {
                    "do"
                };
                map.insert("_metadata".to_string(), json!(metadata));
            }
            let action = Value::Object(map);
            validate_action(&action).map_err(|reason| ParseError::new(reason, response))?;
            return Ok(action);
        }
    }

    let call = extract_first_call(&stripped);
    let call = normalize_common_typos(&call);

    let action = match parse_call_strict(&call) {
        Ok(action) => action,
        Err(strict_err) => fallback_parse_call(&call).ok_or_else(|| {
            ParseError::new(format!("not a do()/finish() call: {strict_err}"), response)
        })?,
    };

    validate_action(&action).map_err(|reason| ParseError::new(reason, response))?;
    Ok(action)
}

/// Helper for creating `do` actions.
pub fn do_action(action: &str, params: &[(&str, Value)]) -> Value {
    let mut map = Map::new();
    map.insert("_metadata".to_string(), json!("do"));
    map.insert("action".to_string(), json!(action));
    for (key, value) in params {
        map.insert(key.to_string(), value.clone());
    }
    Value::Object(map)
}

/// Helper for creating `finish` actions.
pub fn finish_action(message: Option<&str>) -> Value {
    let mut map = Map::new();
    map.insert("_metadata".to_string(), json!("finish"));
    if let Some(msg) = message {
        map.insert("message".to_string(), json!(msg));
    }
    Value::Object(map)
}

fn validate_action(action: &Value) -> Result<(), String> {
    match action.get("_metadata").and_then(|v| v.as_str()) {
        Some("finish") => Ok(()),
        Some("do") => {
            let name = action
                .get("action")
                .and_then(|v| v.as_str())
                .ok_or_else(|| "do() is missing the action name".to_string())?;
            if ACTION_NAMES.contains(&name) {
                Ok(())
            } else {
                Err(format!("unknown action: {name}"))
            }
        }
        other => Err(format!("unknown action type: {other:?}")),
    }
}

/// Remove XML-ish tags and unwrap a fenced code block if present.
fn strip_wrappers(text: &str) -> String {
    static FENCE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)```(?:python|json)?\s*(.*?)\s*```").unwrap());

    let mut t = text.trim().to_string();
    for tag in [
        "<think>",
        "</think>",
        "<answer>",
        "</answer>",
        "<tool_call>",
        "</tool_call>",
    ] {
        t = t.replace(tag, " ");
    }

    if let Some(caps) = FENCE_RE.captures(&t) {
        if let Some(inner) = caps.get(1) {
            t = inner.as_str().to_string();
        }
    }

    t.trim().to_string()
}

/// Extract the first balanced `do(...)`/`finish(...)` call, honoring string
/// literals (with escapes) when tracking paren depth.
fn extract_first_call(text: &str) -> String {
    let start = ["do(", "finish("]
        .iter()
        .filter_map(|prefix| text.find(prefix))
        .min();
    let start = match start {
        Some(idx) => idx,
        None => return text.to_string(),
    };

    let mut in_quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0i32;

    for (i, ch) in text[start..].char_indices() {
        if let Some(q) = in_quote {
            if escaped {
                escaped = false;
                continue;
            }
            match ch {
                '\\' => escaped = true,
                c if c == q => in_quote = None,
                _ => {}
            }
            continue;
        }

        match ch {
            '\'' | '"' => in_quote = Some(ch),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return text[start..start + i + ch.len_utf8()].trim().to_string();
                }
            }
            _ => {}
        }
    }

    text[start..].trim().to_string()
}

/// Normalize smart quotes and, outside string literals, full-width commas
/// and colons; rewrite JSON-style keys to keyword-argument form; drop a
/// trailing semicolon.
fn normalize_common_typos(text: &str) -> String {
    static KEY_QUOTED: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#""(element|start|end|app|text|message|duration)"\s*:\s*"#).unwrap()
    });
    static KEY_TRAILING_QUOTE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"\b(element|start|end|app|text|message|duration)"\s*:\s*"#).unwrap()
    });
    static KEY_BARE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\b(element|start|end|app|text|message|duration)\s*:\s*").unwrap()
    });

    let t = text
        .trim()
        .replace('\u{201c}', "\"")
        .replace('\u{201d}', "\"")
        .replace('\u{2018}', "'")
        .replace('\u{2019}', "'");

    // Full-width separators become ASCII only outside string literals, so
    // Chinese punctuation inside message/text survives.
    let mut normalized = String::with_capacity(t.len());
    let mut in_quote: Option<char> = None;
    let mut escaped = false;
    for ch in t.chars() {
        if let Some(q) = in_quote {
            normalized.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                in_quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => {
                in_quote = Some(ch);
                normalized.push(ch);
            }
            '\u{ff0c}' => normalized.push(','),
            '\u{ff1a}' => normalized.push(':'),
            _ => normalized.push(ch),
        }
    }

    let t = KEY_QUOTED.replace_all(&normalized, "$1=");
    let t = KEY_TRAILING_QUOTE.replace_all(&t, "$1=");
    let t = KEY_BARE.replace_all(&t, "$1=");

    t.trim().trim_end_matches(';').trim().to_string()
}

/// Strict parse of `do(key=literal, ...)` / `finish(...)`.
fn parse_call_strict(text: &str) -> Result<Value, String> {
    let mut cursor = Cursor::new(text);

    cursor.skip_ws();
    let name = cursor.parse_ident()?;
    let metadata = match name.as_str() {
        "do" => "do",
        "finish" => "finish",
        other => return Err(format!("expected do or finish, got {other}")),
    };

    cursor.skip_ws();
    cursor.expect('(')?;

    let mut map = Map::new();
    map.insert("_metadata".to_string(), json!(metadata));

    loop {
        cursor.skip_ws();
        if cursor.eat(')') {
            break;
        }

        let key = cursor.parse_ident()?;
        cursor.skip_ws();
        cursor.expect('=')?;
        let value = cursor.parse_literal()?;
        map.insert(key, value);

        cursor.skip_ws();
        if cursor.eat(',') {
            continue;
        }
        cursor.expect(')')?;
        break;
    }

    cursor.skip_ws();
    if !cursor.at_end() {
        return Err("trailing characters after call".to_string());
    }

    Ok(Value::Object(map))
}

/// Permissive fallback for replies the strict parser rejects, typically
/// unescaped quotes inside string arguments.
fn fallback_parse_call(text: &str) -> Option<Value> {
    let t = text.trim();
    if !(t.starts_with("do(") || t.starts_with("finish(")) {
        return None;
    }

    let open = t.find('(')?;
    let close = t.rfind(')')?;
    if close <= open {
        return None;
    }

    let metadata = if t[..open].trim() == "do" {
        "do"
    } else {
        "finish"
    };
    let args_str = t[open + 1..close].trim();

    let mut map = Map::new();
    map.insert("_metadata".to_string(), json!(metadata));

    if args_str.is_empty() {
        return Some(Value::Object(map));
    }

    for part in split_top_level_args(args_str) {
        let (key, raw_val) = match part.find('=') {
            Some(idx) => (&part[..idx], &part[idx + 1..]),
            None => match part.find(':') {
                Some(idx) => (&part[..idx], &part[idx + 1..]),
                None => continue,
            },
        };

        let key = key.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
        let raw_val = raw_val.trim();

        if LOOSE_STRING_KEYS.contains(&key.as_str()) {
            map.insert(key, json!(parse_loose_string(raw_val)));
            continue;
        }

        let value = match parse_whole_literal(raw_val) {
            Some(v) => v,
            None => json!(parse_loose_string(raw_val)),
        };
        map.insert(key, value);
    }

    Some(Value::Object(map))
}

/// Split argument text on top-level commas, honoring quotes, escapes, and
/// bracket/brace depth.
fn split_top_level_args(arg_str: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut buf = String::new();
    let mut depth_square = 0i32;
    let mut depth_curly = 0i32;
    let mut in_quote: Option<char> = None;
    let mut escaped = false;

    for ch in arg_str.chars() {
        if escaped {
            buf.push(ch);
            escaped = false;
            continue;
        }

        if ch == '\\' {
            buf.push(ch);
            escaped = true;
            continue;
        }

        if let Some(q) = in_quote {
            buf.push(ch);
            if ch == q {
                in_quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' => {
                buf.push(ch);
                in_quote = Some(ch);
            }
            '[' => {
                depth_square += 1;
                buf.push(ch);
            }
            ']' => {
                depth_square = (depth_square - 1).max(0);
                buf.push(ch);
            }
            '{' => {
                depth_curly += 1;
                buf.push(ch);
            }
            '}' => {
                depth_curly = (depth_curly - 1).max(0);
                buf.push(ch);
            }
            ',' if depth_square == 0 && depth_curly == 0 => {
                let part = buf.trim().to_string();
                if !part.is_empty() {
                    parts.push(part);
                }
                buf.clear();
            }
            _ => buf.push(ch),
        }
    }

    let tail = buf.trim().to_string();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

/// Extract a string value between the first quote and the LAST matching
/// quote, tolerating unescaped quotes in between.
fn parse_loose_string(value: &str) -> String {
    let v = value.trim();
    if v.is_empty() {
        return String::new();
    }

    let first = match v.chars().next() {
        Some(c @ ('\'' | '"')) => c,
        _ => return v.to_string(),
    };

    let end = v.rfind(first).unwrap_or(0);
    let inner = if end > 0 { &v[1..end] } else { &v[1..] };

    inner
        .replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\t", "\t")
        .trim()
        .to_string()
}

/// Parse a string that must be exactly one literal.
fn parse_whole_literal(text: &str) -> Option<Value> {
    let mut cursor = Cursor::new(text);
    cursor.skip_ws();
    let value = cursor.parse_literal().ok()?;
    cursor.skip_ws();
    if cursor.at_end() {
        Some(value)
    } else {
        None
    }
}

/// Character cursor for the literal-only expression grammar.
struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(format!(
                "expected '{expected}' at position {}, found {:?}",
                self.pos,
                self.peek()
            ))
        }
    }

    fn parse_ident(&mut self) -> Result<String, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(format!("expected identifier at position {start}"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    /// Literal grammar: string, number, list, dict, bool, or none.
    fn parse_literal(&mut self) -> Result<Value, String> {
        self.skip_ws();
        match self.peek() {
            Some('\'' | '"') => self.parse_string().map(Value::String),
            Some('[') => self.parse_list(),
            Some('{') => self.parse_dict(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() => {
                let word = self.parse_ident()?;
                match word.as_str() {
                    "True" | "true" => Ok(json!(true)),
                    "False" | "false" => Ok(json!(false)),
                    "None" | "null" | "none" => Ok(Value::Null),
                    other => Err(format!("not a literal: {other}")),
                }
            }
            other => Err(format!("unexpected token: {other:?}")),
        }
    }

    fn parse_string(&mut self) -> Result<String, String> {
        let quote = self.bump().ok_or("unexpected end of input")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err("unterminated escape".to_string()),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err("unterminated string".to_string()),
            }
        }
    }

    fn parse_number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '+')
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if let Ok(n) = text.parse::<i64>() {
            return Ok(json!(n));
        }
        text.parse::<f64>()
            .map(|f| json!(f))
            .map_err(|_| format!("invalid number: {text}"))
    }

    fn parse_list(&mut self) -> Result<Value, String> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(']') {
                break;
            }
            items.push(self.parse_literal()?);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            self.expect(']')?;
            break;
        }
        Ok(Value::Array(items))
    }

    fn parse_dict(&mut self) -> Result<Value, String> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.eat('}') {
                break;
            }
            let key = match self.parse_literal()? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.skip_ws();
            self.expect(':')?;
            let value = self.parse_literal()?;
            map.insert(key, value);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            self.expect('}')?;
            break;
        }
        Ok(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_do_tap() {
        let action = parse_action(r#"do(action="Tap", element=[100, 200])"#).unwrap();
        assert_eq!(action["_metadata"], "do");
        assert_eq!(action["action"], "Tap");
        assert_eq!(action["element"], json!([100, 200]));
    }

    #[test]
    fn test_parse_finish_with_message() {
        let action = parse_action(r#"finish(message="Task completed")"#).unwrap();
        assert_eq!(action["_metadata"], "finish");
        assert_eq!(action["message"], "Task completed");
    }

    #[test]
    fn test_parse_finish_without_args() {
        let action = parse_action("finish()").unwrap();
        assert_eq!(action["_metadata"], "finish");
        assert!(action.get("message").is_none());
    }

    #[test]
    fn test_parse_xml_wrapped_reply() {
        let action = parse_action(
            r#"<think>home</think><answer>do(action="Launch", app="微信")</answer>"#,
        )
        .unwrap();
        assert_eq!(action["_metadata"], "do");
        assert_eq!(action["action"], "Launch");
        assert_eq!(action["app"], "微信");
    }

    #[test]
    fn test_parse_fenced_code_block_with_chatter() {
        let raw = "好的，``` python\n do( action = \"Tap\" , element= [ 500, 500 ] ) ```\n";
        let action = parse_action(raw).unwrap();
        assert_eq!(action["_metadata"], "do");
        assert_eq!(action["action"], "Tap");
        assert_eq!(action["element"], json!([500, 500]));
    }

    #[test]
    fn test_parse_smart_quotes_preserving_fullwidth_text() {
        let raw = "do(action=\u{201c}Type\u{201d}, text=\u{201c}你好\u{ff0c}世界\u{201d})";
        let action = parse_action(raw).unwrap();
        assert_eq!(action["_metadata"], "do");
        assert_eq!(action["action"], "Type");
        // Full-width punctuation inside the string argument is preserved.
        assert_eq!(action["text"], "你好\u{ff0c}世界");
    }

    #[test]
    fn test_parse_trailing_semicolon() {
        let action = parse_action(r#"do(action="Back");"#).unwrap();
        assert_eq!(action["action"], "Back");
    }

    #[test]
    fn test_parse_fullwidth_separators_between_args() {
        let raw = "do(action=\"Swipe\"\u{ff0c} start=[500, 700]\u{ff0c} end=[500, 300])";
        let action = parse_action(raw).unwrap();
        assert_eq!(action["action"], "Swipe");
        assert_eq!(action["start"], json!([500, 700]));
        assert_eq!(action["end"], json!([500, 300]));
    }

    #[test]
    fn test_parse_json_style_keys() {
        let action = parse_action(r#"do(action="Tap", "element": [300, 400])"#).unwrap();
        assert_eq!(action["action"], "Tap");
        assert_eq!(action["element"], json!([300, 400]));
    }

    #[test]
    fn test_parse_paren_inside_string() {
        let action = parse_action(r#"do(action="Type", text="a)b(c")"#).unwrap();
        assert_eq!(action["text"], "a)b(c");
    }

    #[test]
    fn test_fallback_unescaped_quotes_in_message() {
        let raw = r#"finish(message="He said "done" already")"#;
        let action = parse_action(raw).unwrap();
        assert_eq!(action["_metadata"], "finish");
        assert_eq!(action["message"], r#"He said "done" already"#);
    }

    #[test]
    fn test_parse_bare_json_object_do() {
        let action = parse_action(r#"{"action": "Tap", "element": [10, 20]}"#).unwrap();
        assert_eq!(action["_metadata"], "do");
        assert_eq!(action["action"], "Tap");
    }

    #[test]
    fn test_parse_bare_json_object_finish() {
        let action = parse_action(r#"{"message": "all done"}"#).unwrap();
        assert_eq!(action["_metadata"], "finish");
        assert_eq!(action["message"], "all done");
    }

    #[test]
    fn test_parse_surrounding_prose() {
        let raw = "I will tap the search box now. do(action=\"Tap\", element=[480, 120]) and wait.";
        let action = parse_action(raw).unwrap();
        assert_eq!(action["action"], "Tap");
        assert_eq!(action["element"], json!([480, 120]));
    }

    #[test]
    fn test_parse_is_idempotent_on_stripped_input() {
        let stripped = r#"do(action="Tap", element=[500, 500])"#;
        let first = parse_action(stripped).unwrap();
        let second = parse_action(stripped).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_action_name_is_rejected() {
        let err = parse_action(r#"do(action="Fly", element=[1, 2])"#).unwrap_err();
        assert!(err.reason.contains("unknown action"));
    }

    #[test]
    fn test_garbage_is_rejected_with_raw_attached() {
        let err = parse_action("I cannot help with that.").unwrap_err();
        assert_eq!(err.raw, "I cannot help with that.");
    }

    #[test]
    fn test_non_literal_argument_is_rejected_by_strict_parser() {
        // `1+2` is an expression, not a literal; the fallback turns it into
        // a loose string rather than evaluating it.
        let action = parse_action(r#"do(action="Wait", duration=open("x"))"#);
        // Never evaluates; either rejected or kept as an opaque string.
        if let Ok(a) = action {
            assert!(a["duration"].is_string());
        }
    }

    #[test]
    fn test_do_and_finish_helpers() {
        let action = do_action("Tap", &[("element", json!([100, 200]))]);
        assert_eq!(action["_metadata"], "do");
        assert_eq!(action["action"], "Tap");

        let finish = finish_action(Some("Done"));
        assert_eq!(finish["_metadata"], "finish");
        assert_eq!(finish["message"], "Done");
    }

    #[test]
    fn test_single_quoted_strings() {
        let action = parse_action(r#"do(action='Launch', app='bilibili')"#).unwrap();
        assert_eq!(action["action"], "Launch");
        assert_eq!(action["app"], "bilibili");
    }

    #[test]
    fn test_trailing_comma_is_tolerated() {
        let action = parse_action(r#"do(action="Tap", element=[5, 6],)"#).unwrap();
        assert_eq!(action["element"], json!([5, 6]));
    }
}
