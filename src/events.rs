//! Event binding compilation.
//!
//! `@click(save(@event, $id), $count++)` is split into ordered handler entries.
//! Each entry is either an inline callback or a named handler with positional
//! parameters, and the list is emitted as a JavaScript array literal that the
//! runtime walks in order.
//!
//! Entry classification follows [`classify_entry`]:
//!
//! | # | Entry shape                                          | Result                         |
//! |---|------------------------------------------------------|--------------------------------|
//! | 1 | empty                                                | skipped                        |
//! | 2 | contains a top-level `;`                             | one arrow per statement        |
//! | 3 | `name(...)` spanning the entry, no sigil             | named handler                  |
//! | 4 | bare identifier (not `true`/`false`/`null`)          | named handler, no params       |
//! | 5 | `$name(...)` spanning the entry                      | named if the args hold a call, else arrow |
//! | 6 | lone literal, or a call followed by `(`/`[`          | ambiguous: literal fallback    |
//! | 7 | anything else                                        | arrow, event param if mentioned |

use crate::expr::{self, var_name};
use crate::parser::balanced::{extract_balanced, is_quoted, is_wrapped, split_params, split_top_level};
use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;

lazy_static! {
    static ref EVENT_TOKEN: Regex = Regex::new(r"(?:[@$]|\b)(?:event|Event|EVENT)\b").unwrap();
    static ref SENTINEL_CALL: Regex = Regex::new(r"^@(attr|prop|val|value)\s*\(").unwrap();
    static ref INLINE_SENTINEL: Regex =
        Regex::new(r#"@(attr|prop|val|value)\s*\(\s*(?:'([^']*)'|"([^"]*)"|([^)]*))\s*\)"#).unwrap();
    static ref LITERAL: Regex = Regex::new(r"^(-?\d+(\.\d+)?|true|false|null|TRUE|FALSE|NULL)$").unwrap();
    static ref IDENT: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref VARIABLE: Regex = Regex::new(r"^\$[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Value resolved by the runtime when the handler fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelKind {
    Event,
    Attr,
    Prop,
    Value,
}

impl SentinelKind {
    fn marker(&self) -> &'static str {
        match self {
            SentinelKind::Event => "@EVENT",
            SentinelKind::Attr => "#ATTR",
            SentinelKind::Prop => "#PROP",
            SentinelKind::Value => "#VALUE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Literal(String),
    VariableRef(String),
    NestedHandler(Box<HandlerEntry>),
    Sentinel(SentinelKind, Option<String>),
    Array(Vec<Param>),
    /// Computed argument, evaluated lazily by the runtime
    Expression { code: String, uses_event_param: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandlerEntry {
    ArrowExpression { code: String, uses_event_param: bool },
    NamedHandler { name: String, params: Vec<Param> },
    /// Entry that could not be classified, passed as a literal value
    Literal(String),
}

/// Entries plus the raw text of every entry that fell back to a literal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub entries: Vec<HandlerEntry>,
    pub ambiguous: Vec<String>,
}

/// Parse an event binding into ordered handler entries
///
/// ```
/// use oneview_compiler::events::{parse, HandlerEntry, Param, SentinelKind};
///
/// let entries = parse("save(EVENT, id)");
/// assert_eq!(
///     entries,
///     vec![HandlerEntry::NamedHandler {
///         name: "save".into(),
///         params: vec![Param::Sentinel(SentinelKind::Event, None), Param::VariableRef("id".into())],
///     }]
/// );
/// ```
pub fn parse(text: &str) -> Vec<HandlerEntry> {
    analyze(text).entries
}

/// Parse an event binding, also reporting ambiguous entries
pub fn analyze(text: &str) -> Analysis {
    let mut text = text.trim();
    if is_wrapped(text, b'(') {
        text = text[1..text.len() - 1].trim();
    }

    let mut analysis = Analysis::default();
    for entry in split_params(text) {
        classify_entry(entry, &mut analysis);
    }
    analysis
}

/// Compile an event binding to a JavaScript array literal
pub fn compile(text: &str) -> String {
    emit_entries(&parse(text))
}

pub fn emit_entries(entries: &[HandlerEntry]) -> String {
    let items: Vec<String> = entries.iter().map(emit_entry).collect();
    format!("[{}]", items.join(","))
}

/// Classify one comma-separated entry (see the table in the module docs)
pub fn classify_entry(entry: &str, analysis: &mut Analysis) {
    let entry = entry.trim();

    // 1
    if entry.is_empty() {
        return;
    }

    // 2
    let statements = split_top_level(entry, b';');
    if statements.len() > 1 || entry.ends_with(';') {
        for statement in statements {
            analysis.entries.push(arrow(statement));
        }
        return;
    }

    // 3, 5, 6 (call shapes)
    if let Some(call) = leading_call(entry) {
        if call.end == entry.len() {
            if !call.sigil {
                analysis.entries.push(HandlerEntry::NamedHandler { name: call.name, params: parse_params(call.args, 0) });
                return;
            }
            if count_calls(call.args) > 0 {
                analysis.entries.push(HandlerEntry::NamedHandler { name: call.name, params: parse_params(call.args, 0) });
            } else {
                analysis.entries.push(arrow(entry));
            }
            return;
        }
        if matches!(entry.as_bytes()[call.end], b'(' | b'[') {
            ambiguous(entry, analysis);
            return;
        }
    }

    // 4, 6 (lone values)
    if is_quoted(entry) || LITERAL.is_match(entry) {
        ambiguous(entry, analysis);
        return;
    }
    if IDENT.is_match(entry) && !is_event_token(entry) {
        analysis.entries.push(HandlerEntry::NamedHandler { name: entry.to_string(), params: Vec::new() });
        return;
    }

    // 7
    analysis.entries.push(arrow(entry));
}

fn ambiguous(entry: &str, analysis: &mut Analysis) {
    analysis.entries.push(HandlerEntry::Literal(entry.to_string()));
    analysis.ambiguous.push(entry.to_string());
}

fn arrow(code: &str) -> HandlerEntry {
    let (code, uses_event_param) = translate_with_event(code);
    HandlerEntry::ArrowExpression { code, uses_event_param }
}

/// Translate an inline expression, normalising event tokens to `event`
fn translate_with_event(code: &str) -> (String, bool) {
    let tokens = event_tokens(code);
    let uses_event_param = !tokens.is_empty();
    let mut normalized = String::with_capacity(code.len());
    let mut last = 0;
    for token in tokens {
        normalized.push_str(&code[last..token.start]);
        normalized.push_str("event");
        last = token.end;
    }
    normalized.push_str(&code[last..]);
    let code = INLINE_SENTINEL.replace_all(&normalized, |caps: &regex::Captures| {
        let kind = sentinel_kind(&caps[1]);
        let payload = caps.get(2).or(caps.get(3)).or(caps.get(4)).map(|m| m.as_str().trim()).filter(|p| !p.is_empty());
        json_string(&sentinel_marker(kind, payload))
    });
    (expr::translate(&code), uses_event_param)
}

/// Event tokens outside string literals that are not a member name (`$form->event`)
fn event_tokens(code: &str) -> Vec<Range<usize>> {
    let strings = string_spans(code);
    EVENT_TOKEN
        .find_iter(code)
        .filter(|m| !strings.iter().any(|s| s.contains(&m.start())))
        .filter(|m| {
            let sigil = matches!(code.as_bytes()[m.start()], b'$' | b'@');
            let before = &code[..m.start()];
            let trimmed = before.trim_end();
            sigil || !(trimmed.ends_with("->") || trimmed.ends_with("::") || before.ends_with('.'))
        })
        .map(|m| m.range())
        .collect()
}

/// Byte ranges of quoted string literals, quotes included
fn string_spans(code: &str) -> Vec<Range<usize>> {
    let bytes = code.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let q = bytes[i];
        if !matches!(q, b'\'' | b'"' | b'`') {
            i += 1;
            continue;
        }
        let start = i;
        i += 1;
        while i < bytes.len() && bytes[i] != q {
            if bytes[i] == b'\\' {
                i += 1;
            }
            i += 1;
        }
        i = (i + 1).min(bytes.len());
        spans.push(start..i);
    }
    spans
}

fn is_event_token(text: &str) -> bool {
    matches!(text, "event" | "Event" | "EVENT" | "@event" | "@Event" | "@EVENT" | "$event" | "$Event" | "$EVENT")
}

fn sentinel_kind(name: &str) -> SentinelKind {
    match name {
        "attr" => SentinelKind::Attr,
        "prop" => SentinelKind::Prop,
        _ => SentinelKind::Value,
    }
}

fn sentinel_marker(kind: SentinelKind, payload: Option<&str>) -> String {
    match payload {
        Some(p) => format!("{}:{}", kind.marker(), p),
        None => kind.marker().to_string(),
    }
}

/// A call at the start of an entry: `name(args)` or `$name(args)`
struct LeadingCall<'a> {
    name: String,
    args: &'a str,
    sigil: bool,
    /// Offset just past the closing paren
    end: usize,
}

fn leading_call(entry: &str) -> Option<LeadingCall<'_>> {
    let bytes = entry.as_bytes();
    let sigil = bytes.first() == Some(&b'$');
    let start = usize::from(sigil);
    if !bytes.get(start).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') {
        return None;
    }
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    let name = entry[start..end].to_string();
    while end < bytes.len() && bytes[end] == b' ' {
        end += 1;
    }
    if bytes.get(end) != Some(&b'(') {
        return None;
    }
    let (args, next) = extract_balanced(entry, end).ok()?;
    Some(LeadingCall { name, args, sigil, end: next })
}

/// Count `name(` call patterns outside string literals
fn count_calls(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\'' || b == b'"' {
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
        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let prefixed = start > 0 && matches!(bytes[start - 1], b'@' | b'>' | b':');
            let mut j = i;
            while j < bytes.len() && bytes[j] == b' ' {
                j += 1;
            }
            if bytes.get(j) == Some(&b'(') && !prefixed {
                count += 1;
            }
            continue;
        }
        i += 1;
    }
    count
}

fn parse_params(text: &str, depth: usize) -> Vec<Param> {
    split_params(text).into_iter().map(|param| parse_param(param, depth)).collect()
}

fn parse_param(param: &str, depth: usize) -> Param {
    let param = param.trim();

    // Too deep to structure: hand the text to the expression translator as is.
    if depth > expr::MAX_DEPTH {
        let (code, uses_event_param) = translate_with_event(param);
        return Param::Expression { code, uses_event_param };
    }

    if is_event_token(param) {
        return Param::Sentinel(SentinelKind::Event, None);
    }

    if let Some(caps) = SENTINEL_CALL.captures(param) {
        let open = caps.get(0).map_or(0, |m| m.end() - 1);
        if let Ok((inner, next)) = extract_balanced(param, open)
            && next == param.len()
        {
            let payload = expr::var_name(inner.trim());
            let payload = crate::parser::balanced::unquote(payload);
            let payload = (!payload.is_empty()).then(|| payload.to_string());
            return Param::Sentinel(sentinel_kind(&caps[1]), payload);
        }
    }

    if is_wrapped(param, b'[') {
        return Param::Array(parse_params(&param[1..param.len() - 1], depth + 1));
    }

    if let Some(call) = leading_call(param)
        && call.end == param.len()
        && (!call.sigil || count_calls(call.args) > 0)
    {
        return Param::NestedHandler(Box::new(HandlerEntry::NamedHandler {
            name: call.name,
            params: parse_params(call.args, depth + 1),
        }));
    }

    if is_quoted(param) || LITERAL.is_match(param) {
        return Param::Literal(expr::translate(param));
    }

    if VARIABLE.is_match(param) || IDENT.is_match(param) {
        return Param::VariableRef(var_name(param).to_string());
    }

    let (code, uses_event_param) = translate_with_event(param);
    Param::Expression { code, uses_event_param }
}

fn json_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

fn arrow_fn(code: &str, uses_event_param: bool) -> String {
    if uses_event_param { format!("(event) => {}", code) } else { format!("() => {}", code) }
}

fn emit_entry(entry: &HandlerEntry) -> String {
    match entry {
        HandlerEntry::ArrowExpression { code, uses_event_param } => arrow_fn(code, *uses_event_param),
        HandlerEntry::NamedHandler { name, params } => {
            let params: Vec<String> = params.iter().map(emit_param).collect();
            format!("{{\"handler\":{},\"params\":[{}]}}", json_string(name), params.join(","))
        }
        HandlerEntry::Literal(text) => expr::translate(text),
    }
}

fn emit_param(param: &Param) -> String {
    match param {
        Param::Literal(value) => value.clone(),
        Param::VariableRef(name) => format!("() => {}", name),
        Param::NestedHandler(entry) => emit_entry(entry),
        Param::Sentinel(kind, payload) => json_string(&sentinel_marker(*kind, payload.as_deref())),
        Param::Array(items) => {
            let items: Vec<String> = items.iter().map(emit_param).collect();
            format!("[{}]", items.join(","))
        }
        Param::Expression { code, uses_event_param } => arrow_fn(code, *uses_event_param),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, params: Vec<Param>) -> HandlerEntry {
        HandlerEntry::NamedHandler { name: name.into(), params }
    }

    #[test]
    fn test_named_with_event_sentinel() {
        assert_eq!(
            parse("save(EVENT, id)"),
            vec![named("save", vec![Param::Sentinel(SentinelKind::Event, None), Param::VariableRef("id".into())])]
        );
    }

    #[test]
    fn test_plain_expression_has_no_event_param() {
        let entries = parse("$count++");
        assert_eq!(entries, vec![HandlerEntry::ArrowExpression { code: "count++".into(), uses_event_param: false }]);
        assert_eq!(compile("count++"), "[() => count++]");
    }

    #[test]
    fn test_event_token_in_expression() {
        assert_eq!(compile("$value = $event->target->value"), "[(event) => value = event.target.value]");
    }

    #[test]
    fn test_order_is_preserved() {
        let entries = parse("$a++, handle(), $b--");
        assert!(matches!(&entries[0], HandlerEntry::ArrowExpression { code, .. } if code == "a++"));
        assert!(matches!(&entries[1], HandlerEntry::NamedHandler { name, params } if name == "handle" && params.is_empty()));
        assert!(matches!(&entries[2], HandlerEntry::ArrowExpression { code, .. } if code == "b--"));
    }

    #[test]
    fn test_semicolon_statements() {
        let entries = parse("$a++; $setB($a * 2), test($a, $b)");
        assert_eq!(entries.len(), 3);
        assert!(matches!(&entries[0], HandlerEntry::ArrowExpression { code, .. } if code == "a++"));
        assert!(matches!(&entries[1], HandlerEntry::ArrowExpression { code, .. } if code == "setB(a * 2)"));
        assert!(matches!(&entries[2], HandlerEntry::NamedHandler { name, .. } if name == "test"));
    }

    #[test]
    fn test_sentinels() {
        let entries = parse("track(@event, @attr('data-id'), @prop('value'), @val('email'), @value(name), @attr())");
        let HandlerEntry::NamedHandler { params, .. } = &entries[0] else { panic!("expected named handler") };
        assert_eq!(
            params,
            &vec![
                Param::Sentinel(SentinelKind::Event, None),
                Param::Sentinel(SentinelKind::Attr, Some("data-id".into())),
                Param::Sentinel(SentinelKind::Prop, Some("value".into())),
                Param::Sentinel(SentinelKind::Value, Some("email".into())),
                Param::Sentinel(SentinelKind::Value, Some("name".into())),
                Param::Sentinel(SentinelKind::Attr, None),
            ]
        );
        assert_eq!(
            emit_entries(&entries),
            r##"[{"handler":"track","params":["@EVENT","#ATTR:data-id","#PROP:value","#VALUE:email","#VALUE:name","#ATTR"]}]"##
        );
    }

    #[test]
    fn test_nested_handlers() {
        let entries = parse("nestedCall(outerFunc($count, @event), innerFunc(@attr('type')))");
        let HandlerEntry::NamedHandler { params, .. } = &entries[0] else { panic!("expected named handler") };
        assert!(matches!(&params[0], Param::NestedHandler(inner) if matches!(inner.as_ref(), HandlerEntry::NamedHandler { name, .. } if name == "outerFunc")));
        assert!(matches!(&params[1], Param::NestedHandler(_)));
    }

    #[test]
    fn test_sigil_call_with_nested_call_is_named() {
        let entries = parse("$setCount(nestedCall($count, $count + 1))");
        assert!(matches!(&entries[0], HandlerEntry::NamedHandler { name, .. } if name == "setCount"));

        let entries = parse("$setCount($count + 1)");
        assert!(matches!(&entries[0], HandlerEntry::ArrowExpression { code, uses_event_param: false } if code == "setCount(count + 1)"));
    }

    #[test]
    fn test_params_emit_lazily() {
        assert_eq!(
            compile("processData($count + 10, 'x', [1, $a])"),
            r#"[{"handler":"processData","params":[() => count + 10,'x',[1,() => a]]}]"#
        );
    }

    #[test]
    fn test_ambiguous_entries_fall_back_to_literals() {
        let analysis = analyze("'just text', 42, make(1)(2)");
        assert_eq!(analysis.ambiguous, vec!["'just text'", "42", "make(1)(2)"]);
        assert!(analysis.entries.iter().all(|e| matches!(e, HandlerEntry::Literal(_))));
    }

    #[test]
    fn test_bare_identifier_is_named() {
        assert_eq!(parse("toggle"), vec![named("toggle", vec![])]);
    }

    #[test]
    fn test_deeply_nested_params_degrade_to_expression() {
        let depth = 100_000;
        let js = compile(&format!("save({}1{})", "[".repeat(depth), "]".repeat(depth)));
        assert!(js.starts_with(&format!(r#"[{{"handler":"save","params":{}() => ["#, "[".repeat(12))));
        assert!(js.ends_with("]}]"));
        assert_eq!(js.matches('[').count(), depth + 2);
    }

    #[test]
    fn test_member_and_quoted_event_are_not_event_tokens() {
        assert_eq!(compile("$form->event = 1"), "[() => form.event = 1]");
        assert_eq!(compile("$label = 'Event'"), "[() => label = 'Event']");
        assert_eq!(
            compile("$form->event = $event->target->value"),
            "[(event) => form.event = event.target.value]"
        );
        assert_eq!(compile("$log('@event ' . $Event->type)"), "[(event) => log('@event ' + event.type)]");
    }

    #[test]
    fn test_outer_parens_and_empty_entries() {
        assert_eq!(parse("(go(), )").len(), 1);
        assert!(parse("").is_empty());
    }
}
