//! Template expression translation.
//!
//! Expressions are written with `$` variables, `->` property access, `::`
//! static access, `.` string concatenation and `[ ... => ... ]` arrays. They are
//! classified recursively and re-emitted as JavaScript expressions.

use crate::parser::balanced::{TopLevel, extract_balanced, find_top_level, is_quoted, is_wrapped, split_params};
use lazy_static::lazy_static;
use regex::Regex;

/// Nesting level past which an expression is emitted as an opaque token rewrite.
pub const MAX_DEPTH: usize = 10;

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"^-?(\d+(\.\d+)?|\.\d+)([eE][-+]?\d+)?$").unwrap();
    static ref VARIABLE: Regex = Regex::new(r"^\$[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref IDENT: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref INTERPOLATED_VAR: Regex = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

/// Template helpers that exist on the runtime under a different name.
const HELPER_FUNCTIONS: &[(&str, &str)] = &[
    ("route", "App.View.route"),
    ("url", "App.Helper.url"),
    ("asset", "App.Helper.asset"),
    ("config", "App.Helper.config"),
    ("date", "App.Helper.date"),
    ("now", "App.Helper.now"),
    ("old", "App.Helper.old"),
    ("trans", "App.Helper.trans"),
    ("__", "App.Helper.trans"),
    ("count", "App.Helper.count"),
    ("json_encode", "JSON.stringify"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayItem {
    /// Already translated key (`"name"`, `0`, `[k]`)
    pub key: Option<String>,
    pub value: Expr,
}

/// Classification of one expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Array(Vec<ArrayItem>),
    Call { name: String, args: Vec<Expr> },
    MethodCall { object: Box<Expr>, method: String, args: Vec<Expr>, is_static: bool },
    Property { object: Box<Expr>, name: String, is_static: bool },
    Index { object: Box<Expr>, key: Box<Expr> },
    Ternary { condition: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Concat(Vec<Expr>),
    /// String, number, boolean or null
    Literal(String),
    /// Variable name without its sigil
    Variable(String),
    /// Anything else: emitted through a flat token rewrite
    Opaque(String),
}

/// Classify an expression
pub fn classify(text: &str) -> Expr {
    classify_at(text, 0)
}

/// Translate an expression to JavaScript
///
/// ```
/// use oneview_compiler::expr::translate;
///
/// assert_eq!(translate("$user->name"), "user.name");
/// assert_eq!(translate("'Hi ' . $name"), "'Hi ' + name");
/// ```
pub fn translate(text: &str) -> String {
    classify(text).emit()
}

fn classify_at(text: &str, depth: usize) -> Expr {
    let text = text.trim();
    if depth > MAX_DEPTH {
        return Expr::Opaque(text.to_string());
    }

    // 1. array / object literal
    if is_wrapped(text, b'[') {
        return classify_array(&text[1..text.len() - 1], depth);
    }

    // 2-5. call, method, property and index chains spanning the whole text
    if let Some(chain) = parse_chain(text, depth) {
        return chain;
    }

    // 6. ternary
    if let Some((q, c)) = find_ternary(text) {
        return Expr::Ternary {
            condition: Box::new(classify_at(&text[..q], depth + 1)),
            then: Box::new(classify_at(&text[q + 1..c], depth + 1)),
            otherwise: Box::new(classify_at(&text[c + 1..], depth + 1)),
        };
    }

    // 7. concatenation
    let dots = concat_points(text);
    if !dots.is_empty() {
        let mut parts = Vec::with_capacity(dots.len() + 1);
        let mut start = 0;
        for dot in dots {
            parts.push(classify_at(&text[start..dot], depth + 1));
            start = dot + 1;
        }
        parts.push(classify_at(&text[start..], depth + 1));
        return Expr::Concat(parts);
    }

    // 8. leaves
    classify_leaf(text)
}

fn classify_leaf(text: &str) -> Expr {
    let lower = text.to_ascii_lowercase();
    if is_quoted(text) || NUMBER.is_match(text) {
        Expr::Literal(text.to_string())
    } else if matches!(lower.as_str(), "true" | "false" | "null") {
        Expr::Literal(lower)
    } else if VARIABLE.is_match(text) {
        Expr::Variable(text[1..].to_string())
    } else {
        Expr::Opaque(text.to_string())
    }
}

fn classify_array(inner: &str, depth: usize) -> Expr {
    let items = split_params(inner)
        .into_iter()
        .map(|item| match split_key_value(item) {
            Some((key, value)) => ArrayItem {
                key: Some(translate_key(key, depth)),
                value: classify_at(value, depth + 1),
            },
            None => ArrayItem { key: None, value: classify_at(item, depth + 1) },
        })
        .collect();
    Expr::Array(items)
}

/// Split `key => value` (or `key: value`) at the top level
fn split_key_value(item: &str) -> Option<(&str, &str)> {
    if let Some(i) = find_top_level(item, "=>") {
        return Some((item[..i].trim(), item[i + 2..].trim()));
    }
    if find_ternary(item).is_some() {
        return None;
    }
    let bytes = item.as_bytes();
    TopLevel::new(item)
        .find(|&i| {
            bytes[i] == b':' && bytes.get(i + 1) != Some(&b':') && (i == 0 || bytes[i - 1] != b':')
        })
        .map(|i| (item[..i].trim(), item[i + 1..].trim()))
}

fn translate_key(key: &str, depth: usize) -> String {
    if is_quoted(key) || NUMBER.is_match(key) {
        key.to_string()
    } else if IDENT.is_match(key) {
        format!("\"{}\"", key)
    } else {
        format!("[{}]", classify_at(key, depth + 1).emit())
    }
}

fn ident_end(bytes: &[u8], from: usize) -> usize {
    let mut end = from;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    end
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn parse_args(inner: &str, depth: usize) -> Vec<Expr> {
    split_params(inner).into_iter().map(|p| classify_at(p, depth + 1)).collect()
}

/// Parse `primary (-> name | :: name | (args) | [key])*` covering all of `text`.
fn parse_chain(text: &str, depth: usize) -> Option<Expr> {
    let bytes = text.as_bytes();
    let mut i;
    let mut expr;
    let mut has_postfix = false;

    match *bytes.first()? {
        b'$' if bytes.get(1).is_some_and(|&b| is_ident_start(b)) => {
            i = ident_end(bytes, 1);
            expr = Expr::Variable(text[1..i].to_string());
        }
        b if is_ident_start(b) || b == b'\\' => {
            let start = if b == b'\\' { 1 } else { 0 };
            i = ident_end(bytes, start);
            // Namespaced names: Foo\Bar
            while bytes.get(i) == Some(&b'\\') {
                i = ident_end(bytes, i + 1);
            }
            let name = text[start..i].replace('\\', ".");
            match bytes.get(i) {
                Some(b'(') => {
                    let (inner, next) = extract_balanced(text, i).ok()?;
                    expr = Expr::Call { name, args: parse_args(inner, depth) };
                    i = next;
                    has_postfix = true;
                }
                Some(b':') if bytes.get(i + 1) == Some(&b':') => expr = Expr::Opaque(name),
                _ => return None,
            }
        }
        _ => return None,
    }

    while i < bytes.len() {
        let (is_static, skip) = if text[i..].starts_with("->") {
            (false, 2)
        } else if text[i..].starts_with("?->") {
            (false, 3)
        } else if text[i..].starts_with("::") {
            (true, 2)
        } else {
            (false, 0)
        };

        if skip > 0 {
            let mut start = i + skip;
            if is_static && bytes.get(start) == Some(&b'$') {
                start += 1;
            }
            if !bytes.get(start).is_some_and(|&b| is_ident_start(b)) {
                return None;
            }
            let end = ident_end(bytes, start);
            let name = text[start..end].to_string();
            if bytes.get(end) == Some(&b'(') {
                let (inner, next) = extract_balanced(text, end).ok()?;
                expr = Expr::MethodCall { object: Box::new(expr), method: name, args: parse_args(inner, depth), is_static };
                i = next;
            } else {
                expr = Expr::Property { object: Box::new(expr), name, is_static };
                i = end;
            }
        } else if bytes[i] == b'[' {
            let (inner, next) = extract_balanced(text, i).ok()?;
            expr = Expr::Index { object: Box::new(expr), key: Box::new(classify_at(inner, depth + 1)) };
            i = next;
        } else if bytes[i] == b'(' {
            // $callback(...) or f(a)(b)
            let (inner, next) = extract_balanced(text, i).ok()?;
            let name = match &expr {
                Expr::Variable(v) => v.clone(),
                other => other.emit(),
            };
            expr = Expr::Call { name, args: parse_args(inner, depth) };
            i = next;
        } else {
            return None;
        }
        has_postfix = true;
    }

    has_postfix.then_some(expr)
}

/// Offsets of the first top-level `?` and the first top-level `:` after it
fn find_ternary(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let question = TopLevel::new(text).find(|&i| {
        bytes[i] == b'?'
            && !matches!(bytes.get(i + 1), Some(b'?' | b'-' | b':'))
            && (i == 0 || bytes[i - 1] != b'?')
    })?;
    let colon = TopLevel::new(text).find(|&i| {
        i > question && bytes[i] == b':' && bytes.get(i + 1) != Some(&b':') && bytes[i - 1] != b':'
    })?;
    Some((question, colon))
}

/// Top-level `.` concatenation operators
fn concat_points(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    TopLevel::new(text).filter(|&i| is_concat_dot(bytes, i)).collect()
}

fn is_concat_dot(bytes: &[u8], i: usize) -> bool {
    if bytes[i] != b'.' {
        return false;
    }
    let prev = i.checked_sub(1).map(|p| bytes[p]);
    let next = bytes.get(i + 1).copied();
    // 1.5 or a leading .5
    let decimal = next.is_some_and(|b| b.is_ascii_digit())
        && prev.is_none_or(|b| {
            b.is_ascii_digit() || !(b.is_ascii_alphanumeric() || matches!(b, b'_' | b'\'' | b'"' | b')' | b']'))
        });
    !decimal && next != Some(b'.') && prev != Some(b'.') && next != Some(b'=')
}

impl Expr {
    /// Emit JavaScript for this expression
    pub fn emit(&self) -> String {
        match self {
            Expr::Array(items) => {
                if items.iter().all(|item| item.key.is_none()) {
                    let values: Vec<String> = items.iter().map(|item| item.value.emit()).collect();
                    format!("[{}]", values.join(", "))
                } else {
                    let pairs: Vec<String> = items
                        .iter()
                        .enumerate()
                        .map(|(index, item)| {
                            let key = item.key.clone().unwrap_or_else(|| index.to_string());
                            format!("{}: {}", key, item.value.emit())
                        })
                        .collect();
                    format!("{{{}}}", pairs.join(", "))
                }
            }
            Expr::Call { name, args } => format!("{}({})", helper_name(name), emit_args(args)),
            Expr::MethodCall { object, method, args, .. } => {
                format!("{}.{}({})", object.emit(), method, emit_args(args))
            }
            Expr::Property { object, name, .. } => format!("{}.{}", object.emit(), name),
            Expr::Index { object, key } => format!("{}[{}]", object.emit(), key.emit()),
            Expr::Ternary { condition, then, otherwise } => {
                format!("{} ? {} : {}", condition.emit(), then.emit(), otherwise.emit())
            }
            Expr::Concat(parts) => parts
                .iter()
                .map(|part| match part {
                    Expr::Ternary { .. } => format!("({})", part.emit()),
                    _ => part.emit(),
                })
                .collect::<Vec<_>>()
                .join(" + "),
            Expr::Literal(text) => emit_literal(text),
            Expr::Variable(name) => name.clone(),
            Expr::Opaque(text) => rewrite_tokens(text),
        }
    }
}

fn emit_args(args: &[Expr]) -> String {
    args.iter().map(Expr::emit).collect::<Vec<_>>().join(", ")
}

/// Runtime name for a template helper, or the name itself
fn helper_name(name: &str) -> &str {
    HELPER_FUNCTIONS.iter().find(|(php, _)| *php == name).map_or(name, |(_, js)| *js)
}

/// Double-quoted strings interpolating `$var` or `{$expr}` become template literals
fn emit_literal(text: &str) -> String {
    if !text.starts_with('"') || !text.contains('$') {
        return text.to_string();
    }

    let mut rest = &text[1..text.len() - 1];
    let mut body = String::with_capacity(text.len() + 8);
    let mut interpolated = false;
    while let Some(at) = rest.find("{$") {
        let Ok((inner, next)) = extract_balanced(rest, at) else {
            break;
        };
        interpolated |= interpolate_vars(&rest[..at], &mut body);
        body.push_str("${");
        // Nested double-quoted strings get the flat rewrite so interpolation cannot recurse.
        if inner.contains('"') {
            body.push_str(&rewrite_tokens(inner));
        } else {
            body.push_str(&translate(inner));
        }
        body.push('}');
        interpolated = true;
        rest = &rest[next..];
    }
    interpolated |= interpolate_vars(rest, &mut body);

    if interpolated { format!("`{}`", body) } else { text.to_string() }
}

/// Append `text` with backticks escaped and bare `$var` turned into `${var}`
fn interpolate_vars(text: &str, out: &mut String) -> bool {
    let escaped = text.replace('`', "\\`");
    let found = INTERPOLATED_VAR.is_match(&escaped);
    out.push_str(&INTERPOLATED_VAR.replace_all(&escaped, "$${$1}"));
    found
}

/// Flat rewrite of an expression that matched no structured rule:
/// `$x` to `x`, `->` / `::` to `.`, `.` concatenation to `+`, `?:` to `||`.
/// String literals are copied untouched.
pub fn rewrite_tokens(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\'' | b'"' | b'`' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i] != b {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                out.push_str(&text[start..i]);
            }
            b'$' if bytes.get(i + 1).is_some_and(|&n| is_ident_start(n)) => {
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'>') => {
                out.push('.');
                i += 2;
            }
            b'?' if bytes.get(i + 1) == Some(&b'-') && bytes.get(i + 2) == Some(&b'>') => {
                out.push_str("?.");
                i += 3;
            }
            b'?' if bytes.get(i + 1) == Some(&b':') => {
                out.push_str("||");
                i += 2;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                out.push('.');
                i += 2;
            }
            b'.' if bytes.get(i + 1) == Some(&b'=') => {
                out.push_str("+=");
                i += 2;
            }
            b'.' if is_concat_dot(bytes, i) => {
                out.push('+');
                i += 1;
            }
            b if is_ident_start(b) => {
                let end = ident_end(bytes, i);
                let name = &text[i..end];
                let before = &text[..i];
                let member = before.ends_with("->") || before.ends_with("::") || before.ends_with('.');
                let bound = before.ends_with(|c: char| c == '$' || c == '\\' || c.is_ascii_alphanumeric());
                let called = text[end..].trim_start().starts_with('(');
                if called && !member && !bound {
                    out.push_str(helper_name(name));
                } else {
                    out.push_str(name);
                }
                i = end;
            }
            _ => {
                let len = text[i..].chars().next().map_or(1, char::len_utf8);
                out.push_str(&text[i..i + len]);
                i += len;
            }
        }
    }

    out
}

/// Strip a leading `$` from a variable name
pub fn var_name(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('$').unwrap_or(text)
}

/// Identifiers an expression reads: every `$name`, plus bare names that are
/// neither member accesses nor function calls. Strings are skipped.
pub fn referenced_names(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut names = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if matches!(b, b'\'' | b'"' | b'`') {
            i += 1;
            while i < bytes.len() && bytes[i] != b {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i += 1;
            continue;
        }

        let sigil = b == b'$' && bytes.get(i + 1).is_some_and(|&n| is_ident_start(n));
        if !sigil && !is_ident_start(b) {
            i += 1;
            continue;
        }

        let start = if sigil { i + 1 } else { i };
        let end = ident_end(bytes, start);
        let member = !sigil
            && (text[..i].ends_with("->") || text[..i].ends_with("::") || text[..i].ends_with('.'));
        let call = !sigil && bytes.get(end) == Some(&b'(');
        let inside_word = !sigil && i > 0 && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_');
        if !member && !call && !inside_word {
            names.push(&text[start..end]);
        }
        i = end.max(i + 1);
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_names() {
        assert_eq!(referenced_names("$user->name . count($items)"), vec!["user", "items"]);
        assert_eq!(referenced_names("x > 1 && 'y' == label"), vec!["x", "label"]);
        assert_eq!(referenced_names("App::config(\"z\")"), vec!["App"]);
    }

    #[test]
    fn test_variable_and_literals() {
        assert_eq!(classify("$name"), Expr::Variable("name".into()));
        assert_eq!(classify("'hi'"), Expr::Literal("'hi'".into()));
        assert_eq!(classify("42"), Expr::Literal("42".into()));
        assert_eq!(classify("TRUE"), Expr::Literal("true".into()));
        assert_eq!(classify("NULL").emit(), "null");
    }

    #[test]
    fn test_array_list() {
        assert_eq!(translate("[1, $a, 'x']"), "[1, a, 'x']");
    }

    #[test]
    fn test_array_keys() {
        assert_eq!(translate("['id' => $user->id, name => 'x', 3 => true]"), "{'id': user.id, \"name\": 'x', 3: true}");
        assert_eq!(translate("[title: $t]"), "{\"title\": t}");
    }

    #[test]
    fn test_function_call() {
        assert!(matches!(classify("format($a, [1, 2])"), Expr::Call { ref name, ref args } if name == "format" && args.len() == 2));
        assert_eq!(translate("format($a, [1, 2])"), "format(a, [1, 2])");
        assert_eq!(translate("route('home')"), "App.View.route('home')");
    }

    #[test]
    fn test_method_and_property_chain() {
        assert!(matches!(classify("$user->profile->name"), Expr::Property { .. }));
        assert_eq!(translate("$user->getName($x)->first"), "user.getName(x).first");
        assert!(matches!(classify("Str::upper($a)"), Expr::MethodCall { is_static: true, .. }));
        assert_eq!(translate("Str::upper($a)"), "Str.upper(a)");
    }

    #[test]
    fn test_index() {
        assert_eq!(translate("$items[$i]['name']"), "items[i]['name']");
    }

    #[test]
    fn test_ternary() {
        assert!(matches!(classify("$a ? 'x' : 'y'"), Expr::Ternary { .. }));
        assert_eq!(translate("$a > 1 ? $b->c : 'none'"), "a > 1 ? b.c : 'none'");
    }

    #[test]
    fn test_null_coalesce_is_not_ternary() {
        assert!(matches!(classify("$a ?? 'x'"), Expr::Opaque(_)));
        assert_eq!(translate("$a ?? 'x'"), "a ?? 'x'");
    }

    #[test]
    fn test_concat() {
        assert_eq!(translate("'Hello ' . $user->name . '!'"), "'Hello ' + user.name + '!'");
        assert_eq!(translate("'a' . ($x ? 'b' : 'c')"), "'a' + (x ? 'b' : 'c')");
        assert_eq!(translate("'v' . ($x ? 'b' : 'c')"), "'v' + (x ? 'b' : 'c')");
    }

    #[test]
    fn test_ternary_inside_concat_is_wrapped() {
        let expr = Expr::Concat(vec![Expr::Literal("'a'".into()), classify("$x ? 1 : 2")]);
        assert_eq!(expr.emit(), "'a' + (x ? 1 : 2)");
    }

    #[test]
    fn test_decimal_is_not_concat() {
        assert_eq!(classify("1.5"), Expr::Literal("1.5".into()));
        assert_eq!(translate("$price * 1.5"), "price * 1.5");
    }

    #[test]
    fn test_opaque_rewrite() {
        assert_eq!(translate("$count > 1 && !$user->banned"), "count > 1 && !user.banned");
        assert_eq!(translate("$a ?: 'x'"), "a || 'x'");
        assert_eq!(translate("$s .= 'x'"), "s += 'x'");
        assert_eq!(translate("'$keep' == $a"), "'$keep' == a");
    }

    #[test]
    fn test_interpolated_string() {
        assert_eq!(translate("\"Hi $name\""), "`Hi ${name}`");
        assert_eq!(translate("\"plain\""), "\"plain\"");
    }

    #[test]
    fn test_braced_interpolation() {
        assert_eq!(translate("\"Hi {$user->name}!\""), "`Hi ${user.name}!`");
        assert_eq!(translate("\"{$user}\""), "`${user}`");
        assert_eq!(translate("\"{$a['k']} and $b\""), "`${a['k']} and ${b}`");
        assert_eq!(translate("\"cost: {$price}\" . $unit"), "`cost: ${price}` + unit");
    }

    #[test]
    fn test_helpers_inside_larger_expressions() {
        assert_eq!(translate("count($items) > 0"), "App.Helper.count(items) > 0");
        assert_eq!(translate("!count($items) && $open"), "!App.Helper.count(items) && open");
        assert_eq!(translate("$list->count() > 0"), "list.count() > 0");
        assert_eq!(translate("Cache::count() + $count"), "Cache.count() + count");
        assert_eq!(translate("recount($a) == 'count(x)'"), "recount(a) == 'count(x)'");
    }

    #[test]
    fn test_depth_ceiling() {
        let deep = format!("{}$x{}", "[".repeat(20), "]".repeat(20));
        // Beyond the ceiling the rest is emitted as a flat rewrite instead of recursing.
        let out = translate(&deep);
        assert!(out.contains('x'));
        assert!(!out.contains('$'));
    }
}
