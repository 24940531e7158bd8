//! Meta directives: declarations lifted out of the template before the body is built.
//!
//! `@extends`, `@vars`, `@let`/`@const`, `@useState`, `@fetch`, `@await`,
//! `@register`, `@onInit`, `@viewType` and `@subscribe` never render anything;
//! they shape the view definition around the render function.

use crate::error::{Diagnostic, ErrorKind};
use crate::expr::{self, var_name};
use crate::parser::balanced::{TopLevel, extract_balanced, is_quoted, is_wrapped, split_params, unquote};
use crate::parser::directives::{DirectiveKind, MetaKind, RawKind};
use crate::parser::tokenizer::{Span, Token};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

lazy_static! {
    static ref SCRIPT_TAG: Regex = Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").unwrap();
    static ref STYLE_TAG: Regex = Regex::new(r"(?is)<style\b([^>]*)>(.*?)</style\s*>").unwrap();
    static ref LINK_TAG: Regex = Regex::new(r"(?is)<link\b([^>]*?)/?>").unwrap();
    static ref ATTRIBUTE: Regex =
        Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#).unwrap();
    static ref IMPORT_LINE: Regex = Regex::new(r"(?m)^[ \t]*import\b[^\n]*$").unwrap();
    static ref EXPORT_DEFAULT: Regex = Regex::new(r"export\s+default\s*").unwrap();
}

/// Parent named by `@extends`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParentView {
    /// `@extends('layouts.base')`
    Literal(String),
    /// Decided at runtime, already translated
    Expression(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extends {
    pub parent: ParentView,
    /// Translated data expression passed to the parent
    pub data: Option<String>,
}

/// One `@vars` entry, destructured from the view's data object
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub default: Option<String>,
}

/// `@let` / `@const` declaration that is not a state hook
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub keyword: &'static str,
    pub target: String,
    pub value: Option<String>,
    /// Plain identifier declared, when the target is one
    pub name: Option<String>,
}

/// Reactive state: `[$count, $setCount] = useState(0)`
#[derive(Debug, Clone, PartialEq)]
pub struct StateHook {
    pub name: String,
    pub setter: String,
    pub initial: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchConfig {
    Json(Value),
    /// Translated JavaScript expression
    Expression(String),
}

/// A stylesheet the view attaches while mounted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StyleResource {
    Code { content: String, attributes: BTreeMap<String, Value> },
    Href { href: String },
}

/// An external script loaded for the view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptResource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub src: String,
}

/// A `<script src>` / `<link>` element recorded for the runtime
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub tag: String,
    pub uuid: String,
    pub attrs: BTreeMap<String, String>,
}

/// Everything `@register` contributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registration {
    /// Object literal source for user-defined methods
    pub user_defined: Option<String>,
    /// Module-level `import` lines
    pub imports: Vec<String>,
    /// Inline script run inside the view function
    pub scripts: Vec<String>,
    pub script_resources: Vec<ScriptResource>,
    pub styles: Vec<StyleResource>,
    pub resources: Vec<Resource>,
    /// Per-section script objects from the JSON form
    pub section_scripts: Map<String, Value>,
}

impl Registration {
    fn merge(&mut self, other: Registration) {
        if other.user_defined.is_some() {
            self.user_defined = other.user_defined;
        }
        self.imports.extend(other.imports);
        self.scripts.extend(other.scripts);
        self.script_resources.extend(other.script_resources);
        self.styles.extend(other.styles);
        self.resources.extend(other.resources);
        self.section_scripts.extend(other.section_scripts);
    }
}

/// Side-channel declarations of one view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewMeta {
    pub extends: Option<Extends>,
    pub vars: Vec<VarDecl>,
    pub declarations: Vec<Declaration>,
    pub states: Vec<StateHook>,
    pub fetch: Option<FetchConfig>,
    pub has_fetch: bool,
    pub has_await: bool,
    pub registration: Registration,
    pub init: Vec<String>,
    pub view_type: Option<String>,
    pub subscribe: Option<bool>,
}

impl ViewMeta {
    pub fn view_type(&self) -> &str {
        self.view_type.as_deref().unwrap_or("view")
    }

    pub fn has_vars(&self) -> bool {
        !self.vars.is_empty()
    }

    /// Whether the view re-renders on state changes: explicit, else when it declares data
    pub fn subscribes(&self) -> bool {
        self.subscribe.unwrap_or(!self.vars.is_empty() || !self.states.is_empty())
    }

    /// Names the data object can update: `@vars` plus plain `@let` names
    pub fn variable_list(&self) -> Vec<&str> {
        let lets = self
            .declarations
            .iter()
            .filter(|d| d.keyword == "let")
            .filter_map(|d| d.name.as_deref());
        self.vars.iter().map(|v| v.name.as_str()).chain(lets).collect()
    }

    /// Every name declared in the view's scope
    pub fn declared_names(&self) -> Vec<&str> {
        let mut names = self.variable_list();
        names.extend(self.declarations.iter().filter_map(|d| d.name.as_deref()));
        names.extend(self.states.iter().map(|s| s.name.as_str()));
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Pull meta directives out of the token stream.
///
/// Returns the collected declarations and the remaining body tokens.
pub fn extract(tokens: Vec<Token>, diagnostics: &mut Vec<Diagnostic>) -> (ViewMeta, Vec<Token>) {
    let mut meta = ViewMeta::default();
    let mut body = Vec::with_capacity(tokens.len());

    for token in tokens {
        match token {
            Token::Directive { kind: DirectiveKind::Meta(kind), args, span, raw_name, .. } => {
                apply_meta(&mut meta, kind, args.as_deref(), span, &raw_name, diagnostics);
            }
            Token::Directive { kind: DirectiveKind::Raw(RawKind::Register), args, span, .. } => {
                let args = args.unwrap_or_default();
                match parse_register_json(&args) {
                    Ok(registration) => meta.registration.merge(registration),
                    Err(reason) => malformed(diagnostics, "register", &reason, span),
                }
            }
            Token::RawBlock { kind: RawKind::Register, content, .. } => {
                meta.registration.merge(parse_register_block(&content));
            }
            Token::Directive { kind: DirectiveKind::Raw(RawKind::OnInit), args, .. } => {
                add_init(&mut meta, &args.unwrap_or_default());
            }
            Token::RawBlock { kind: RawKind::OnInit, content, .. } => {
                add_init(&mut meta, &content);
            }
            other => body.push(other),
        }
    }

    (meta, body)
}

fn malformed(diagnostics: &mut Vec<Diagnostic>, directive: &str, reason: &str, span: Span) {
    warn!(directive, reason, "malformed meta payload");
    diagnostics.push(
        Diagnostic::warning(
            ErrorKind::MalformedMetaPayload,
            format!("'@{}' payload could not be parsed: {}", directive, reason),
            span,
        )
        .with_directive(directive),
    );
}

fn apply_meta(
    meta: &mut ViewMeta,
    kind: MetaKind,
    args: Option<&str>,
    span: Span,
    raw_name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let args = args.unwrap_or("").trim();
    match kind {
        MetaKind::Extends => {
            let parts = split_params(args);
            let Some(parent) = parts.first() else {
                malformed(diagnostics, raw_name, "missing parent view", span);
                return;
            };
            let parent = if is_quoted(parent) {
                ParentView::Literal(unquote(parent).to_string())
            } else {
                ParentView::Expression(expr::translate(parent))
            };
            let data = parts.get(1).map(|d| expr::translate(d));
            meta.extends = Some(Extends { parent, data });
        }
        MetaKind::Vars => {
            for part in split_params(args) {
                let (name, default) = match split_assignment(part) {
                    Some((lhs, rhs)) => (lhs, Some(expr::translate(rhs))),
                    None => (part, None),
                };
                meta.vars.push(VarDecl { name: var_name(name).to_string(), default });
            }
        }
        MetaKind::Let | MetaKind::Const => {
            let keyword = if kind == MetaKind::Let { "let" } else { "const" };
            for part in split_params(args) {
                declare(meta, keyword, part);
            }
        }
        MetaKind::UseState => {
            let parts = split_params(args);
            if parts.len() != 3 {
                malformed(diagnostics, raw_name, "expected (value, name, setter)", span);
                return;
            }
            meta.states.push(StateHook {
                initial: expr::translate(parts[0]),
                name: var_name(unquote(parts[1])).to_string(),
                setter: var_name(unquote(parts[2])).to_string(),
            });
        }
        MetaKind::Fetch => {
            meta.has_fetch = true;
            if args.is_empty() {
                return;
            }
            meta.fetch = Some(match serde_json::from_str::<Value>(args) {
                Ok(json) => FetchConfig::Json(json),
                Err(_) => FetchConfig::Expression(expr::translate(args)),
            });
        }
        MetaKind::Await => meta.has_await = true,
        MetaKind::ViewType => {
            let value = unquote(args);
            if value.is_empty() {
                malformed(diagnostics, raw_name, "missing view type", span);
            } else {
                meta.view_type = Some(value.to_string());
            }
        }
        MetaKind::Subscribe => meta.subscribe = Some(true),
        MetaKind::DontSubscribe => meta.subscribe = Some(false),
    }
}

fn declare(meta: &mut ViewMeta, keyword: &'static str, part: &str) {
    let Some((lhs, rhs)) = split_assignment(part) else {
        let name = var_name(part).to_string();
        meta.declarations.push(Declaration { keyword, target: name.clone(), value: None, name: Some(name) });
        return;
    };

    if is_wrapped(lhs, b'[')
        && let Some(initial) = use_state_argument(rhs)
    {
        let names = split_params(&lhs[1..lhs.len() - 1]);
        if let [name, setter] = names.as_slice() {
            meta.states.push(StateHook {
                name: var_name(name).to_string(),
                setter: var_name(setter).to_string(),
                initial: expr::translate(initial),
            });
            return;
        }
    }

    let name = expr::classify(lhs);
    let name = match name {
        expr::Expr::Variable(ref n) => Some(n.clone()),
        _ => None,
    };
    meta.declarations.push(Declaration {
        keyword,
        target: expr::translate(lhs),
        value: Some(expr::translate(rhs)),
        name,
    });
}

/// `useState(init)` spanning the whole right-hand side
fn use_state_argument(rhs: &str) -> Option<&str> {
    let open = rhs.find('(')?;
    if rhs[..open].trim() != "useState" {
        return None;
    }
    let (inner, next) = extract_balanced(rhs, open).ok()?;
    (next == rhs.len()).then_some(inner)
}

/// Split `lhs = rhs` on the first top-level plain assignment
fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    TopLevel::new(text)
        .find(|&i| {
            bytes[i] == b'='
                && !matches!(bytes.get(i + 1), Some(b'=' | b'>'))
                && !(i > 0 && matches!(bytes[i - 1], b'=' | b'!' | b'<' | b'>' | b'+' | b'-' | b'*' | b'/' | b'.' | b'%' | b'&' | b'|' | b'^' | b'?'))
        })
        .map(|i| (text[..i].trim(), text[i + 1..].trim()))
}

fn add_init(meta: &mut ViewMeta, code: &str) {
    for caps in STYLE_TAG.captures_iter(code) {
        meta.registration.styles.push(StyleResource::Code {
            content: caps[2].trim().to_string(),
            attributes: style_attributes(&caps[1]),
        });
    }
    let code = STYLE_TAG.replace_all(code, "");
    let code = code.trim();
    if !code.is_empty() {
        meta.init.push(code.to_string());
    }
}

fn parse_attributes(attrs: &str) -> BTreeMap<String, String> {
    ATTRIBUTE
        .captures_iter(attrs)
        .map(|caps| {
            let value = caps.get(2).or(caps.get(3)).or(caps.get(4)).map_or("", |m| m.as_str());
            (caps[1].to_string(), value.to_string())
        })
        .collect()
}

fn style_attributes(attrs: &str) -> BTreeMap<String, Value> {
    parse_attributes(attrs)
        .into_iter()
        .map(|(k, v)| {
            let value = if v.is_empty() { Value::Bool(true) } else { Value::String(v) };
            (k, value)
        })
        .collect()
}

/// Parse an `@register ... @endregister` body.
///
/// A pure function: every call starts from an empty registration.
pub fn parse_register_block(content: &str) -> Registration {
    let mut reg = Registration::default();
    let mut uuid = 0;

    for caps in SCRIPT_TAG.captures_iter(content) {
        let attrs = parse_attributes(&caps[1]);
        if let Some(src) = attrs.get("src") {
            reg.script_resources.push(ScriptResource { kind: "src", src: src.clone() });
            reg.resources.push(Resource { tag: "script".into(), uuid: format!("script-{}", uuid), attrs });
            uuid += 1;
            continue;
        }
        parse_script_body(&caps[2], &mut reg);
    }

    for caps in STYLE_TAG.captures_iter(content) {
        reg.styles.push(StyleResource::Code {
            content: caps[2].trim().to_string(),
            attributes: style_attributes(&caps[1]),
        });
    }

    for caps in LINK_TAG.captures_iter(content) {
        let attrs = parse_attributes(&caps[1]);
        let is_stylesheet = attrs.get("rel").is_some_and(|r| r.eq_ignore_ascii_case("stylesheet"));
        if let (true, Some(href)) = (is_stylesheet, attrs.get("href")) {
            reg.styles.push(StyleResource::Href { href: href.clone() });
            reg.resources.push(Resource { tag: "link".into(), uuid: format!("link-{}", uuid), attrs });
            uuid += 1;
        }
    }

    reg
}

fn parse_script_body(script: &str, reg: &mut Registration) {
    let mut rest = script.to_string();

    for m in IMPORT_LINE.find_iter(script) {
        reg.imports.push(m.as_str().trim().to_string());
        rest = rest.replacen(m.as_str(), "", 1);
    }

    if let Some(m) = EXPORT_DEFAULT.find(&rest) {
        let open = m.end();
        if rest.as_bytes().get(open) == Some(&b'{') {
            let (object, next) = match extract_balanced(&rest, open) {
                Ok((_, next)) => (rest[open..next].to_string(), next),
                Err(_) => (rest[open..].to_string(), rest.len()),
            };
            reg.user_defined = Some(object);
            let mut end = next;
            if rest.as_bytes().get(end) == Some(&b';') {
                end += 1;
            }
            rest.replace_range(m.start()..end, "");
        }
    }

    let rest = rest.trim();
    if !rest.is_empty() {
        reg.scripts.push(rest.to_string());
    }
}

/// Parse the JSON form `@register({...})`
pub fn parse_register_json(args: &str) -> Result<Registration, String> {
    let value: Value = serde_json::from_str(args.trim()).map_err(|e| e.to_string())?;
    let Value::Object(mut object) = value else {
        return Err("expected a JSON object".into());
    };

    let mut reg = Registration::default();

    if let Some(Value::Array(resources)) = object.remove("resources") {
        for (index, resource) in resources.into_iter().enumerate() {
            let Value::Object(fields) = resource else { continue };
            let tag = fields.get("tag").and_then(Value::as_str).unwrap_or("script").to_string();
            let attrs = match fields.get("attrs") {
                Some(Value::Object(attrs)) => attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.as_str().map_or_else(|| v.to_string(), str::to_string)))
                    .collect(),
                _ => BTreeMap::new(),
            };
            if tag == "script"
                && let Some(src) = attrs.get("src")
            {
                reg.script_resources.push(ScriptResource { kind: "src", src: src.clone() });
            }
            reg.resources.push(Resource { uuid: format!("{}-{}", tag, index), tag, attrs });
        }
    }

    if let Some(Value::Object(css)) = object.remove("css") {
        for inline in string_list(css.get("inline")) {
            reg.styles.push(StyleResource::Code { content: inline, attributes: BTreeMap::new() });
        }
        for href in string_list(css.get("external")) {
            reg.styles.push(StyleResource::Href { href });
        }
    }

    if let Some(Value::Object(sections)) = object.remove("sections") {
        reg.section_scripts = sections;
    }

    if !object.is_empty() {
        reg.user_defined = Some(Value::Object(object).to_string());
    }

    Ok(reg)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokenizer::tokenize;

    fn meta_of(source: &str) -> (ViewMeta, Vec<Token>, Vec<Diagnostic>) {
        let tokenized = tokenize(source);
        let mut diagnostics = tokenized.diagnostics;
        let (meta, body) = extract(tokenized.tokens, &mut diagnostics);
        (meta, body, diagnostics)
    }

    #[test]
    fn test_extends_literal_and_expression() {
        let (meta, body, _) = meta_of("@extends('layouts.base')\n<p>x</p>");
        assert_eq!(meta.extends.unwrap().parent, ParentView::Literal("layouts.base".into()));
        assert!(body.iter().all(|t| matches!(t, Token::Text { .. })));

        let (meta, _, _) = meta_of("@extends($layout, ['title' => $t])");
        let extends = meta.extends.unwrap();
        assert_eq!(extends.parent, ParentView::Expression("layout".into()));
        assert_eq!(extends.data.as_deref(), Some("{'title': t}"));
    }

    #[test]
    fn test_vars() {
        let (meta, _, _) = meta_of("@vars($user, $count = 0, $title = 'Hi')");
        assert_eq!(meta.vars.len(), 3);
        assert_eq!(meta.vars[0], VarDecl { name: "user".into(), default: None });
        assert_eq!(meta.vars[1].default.as_deref(), Some("0"));
        assert_eq!(meta.vars[2].default.as_deref(), Some("'Hi'"));
    }

    #[test]
    fn test_let_state_hook() {
        let (meta, _, _) = meta_of("@let([$count, $setCount] = useState(0))");
        assert_eq!(meta.states, vec![StateHook { name: "count".into(), setter: "setCount".into(), initial: "0".into() }]);
        assert!(meta.subscribes());
    }

    #[test]
    fn test_let_and_const() {
        let (meta, _, _) = meta_of("@let($a = 1, $b = $a == 2)@const($label = 'x')");
        assert_eq!(meta.declarations.len(), 3);
        assert_eq!(meta.declarations[1].value.as_deref(), Some("a == 2"));
        assert_eq!(meta.declarations[2].keyword, "const");
        assert_eq!(meta.variable_list(), vec!["a", "b"]);
    }

    #[test]
    fn test_use_state_three_args() {
        let (meta, _, diags) = meta_of("@useState(0, $count, $setCount) @useState(1)");
        assert_eq!(meta.states[0].setter, "setCount");
        assert_eq!(diags[0].kind, ErrorKind::MalformedMetaPayload);
    }

    #[test]
    fn test_fetch_json_and_expression() {
        let (meta, _, _) = meta_of(r#"@fetch({"url": "/api/users"})"#);
        assert!(meta.has_fetch);
        assert!(matches!(meta.fetch, Some(FetchConfig::Json(ref v)) if v["url"] == "/api/users"));

        let (meta, _, _) = meta_of("@fetch(['url' => $endpoint])");
        assert_eq!(meta.fetch, Some(FetchConfig::Expression("{'url': endpoint}".into())));
    }

    #[test]
    fn test_await_view_type_subscribe() {
        let (meta, _, _) = meta_of("@await @viewType('page') @dontsubscribe @vars($a)");
        assert!(meta.has_await);
        assert_eq!(meta.view_type(), "page");
        assert!(!meta.subscribes());
    }

    #[test]
    fn test_register_block() {
        let block = r#"
<script src="https://cdn.example.com/lib.js"></script>
<script>
import { format } from '@app/helpers/utils.js';
const local = 1;
export default {
    mounted() { console.log('x'); }
};
</script>
<style scoped>.a { color: red; }</style>
<link rel="stylesheet" href="/css/app.css">
"#;
        let reg = parse_register_block(block);
        assert_eq!(reg.imports, vec!["import { format } from '@app/helpers/utils.js';"]);
        assert!(reg.user_defined.as_deref().unwrap().contains("mounted()"));
        assert_eq!(reg.scripts, vec!["const local = 1;"]);
        assert_eq!(reg.script_resources[0].src, "https://cdn.example.com/lib.js");
        assert_eq!(reg.styles.len(), 2);
        assert!(matches!(&reg.styles[0], StyleResource::Code { attributes, .. } if attributes["scoped"] == Value::Bool(true)));
        assert_eq!(reg.resources.len(), 2);
        assert_eq!(reg.resources[1].uuid, "link-1");
    }

    #[test]
    fn test_register_parser_holds_no_state() {
        let first = parse_register_block("<script>export default { a() {} }</script>");
        let second = parse_register_block("<style>.b {}</style>");
        assert!(first.styles.is_empty());
        assert!(second.user_defined.is_none());
    }

    #[test]
    fn test_register_json() {
        let reg = parse_register_json(r#"{"resources": [{"tag": "script", "attrs": {"src": "/a.js"}}], "css": {"inline": ".x{}", "external": ["/b.css"]}, "sections": {"content": {"k": 1}}, "greet": "hi"}"#).unwrap();
        assert_eq!(reg.resources[0].uuid, "script-0");
        assert_eq!(reg.styles.len(), 2);
        assert!(reg.section_scripts.contains_key("content"));
        assert_eq!(reg.user_defined.as_deref(), Some(r#"{"greet":"hi"}"#));
    }

    #[test]
    fn test_malformed_register_degrades() {
        let (meta, _, diags) = meta_of("@register({not json})");
        assert_eq!(meta.registration, Registration::default());
        assert_eq!(diags[0].kind, ErrorKind::MalformedMetaPayload);
        assert!(!diags[0].is_error());
    }

    #[test]
    fn test_on_init() {
        let (meta, _, _) = meta_of("@onInit(console.log('ready'))");
        assert_eq!(meta.init, vec!["console.log('ready')"]);

        let (meta, _, _) = meta_of("@oninit <style>.x{}</style> start(); @endoninit");
        assert_eq!(meta.init, vec!["start();"]);
        assert_eq!(meta.registration.styles.len(), 1);
    }
}
