//! Template body emission.
//!
//! The body becomes the content of one JavaScript template literal. Control
//! flow is emitted as `${...}` interpolations that call into the runtime and
//! return nested template literals.

use super::GenerateOptions;
use crate::ast::*;
use crate::events;
use crate::expr::{self, rewrite_tokens, var_name};
use crate::parser::balanced::{TopLevel, find_top_level, is_quoted, split_params, unquote};
use crate::sections::{self, Section, SectionMode, SectionRegistry};
use crate::transform::TransformMetadata;
use serde_json::{Map, Value};
use tracing::debug;

/// Escape literal text for a JavaScript template literal
pub fn escape_template(text: &str) -> String {
    text.replace('\\', "\\\\").replace('`', "\\`").replace("${", "\\${")
}

/// Emitted body plus the sections met along the way
#[derive(Debug, Clone)]
pub struct RenderedBody {
    pub content: String,
    pub sections: SectionRegistry,
}

pub struct BodyEmitter<'a> {
    namespace: &'a str,
    attr_prefix: &'a str,
    metadata: &'a TransformMetadata,
    waits_for_data: bool,
    omit_static_sections: bool,
    section_scripts: Option<&'a Map<String, Value>>,
}

impl<'a> BodyEmitter<'a> {
    pub fn new(options: &'a GenerateOptions, metadata: &'a TransformMetadata) -> Self {
        Self {
            namespace: &options.runtime_namespace,
            attr_prefix: &options.attr_prefix,
            metadata,
            waits_for_data: false,
            omit_static_sections: false,
            section_scripts: None,
        }
    }

    /// The view awaits or fetches data before its real render
    pub fn waits_for_data(mut self, waits: bool) -> Self {
        self.waits_for_data = waits;
        self
    }

    /// Leave static sections out of the body (the prerender pass already emitted them)
    pub fn omit_static_sections(mut self, omit: bool) -> Self {
        self.omit_static_sections = omit;
        self
    }

    pub fn with_section_scripts(mut self, scripts: &'a Map<String, Value>) -> Self {
        self.section_scripts = Some(scripts);
        self
    }

    pub fn emit(&self, nodes: &[Node]) -> RenderedBody {
        let mut sections = SectionRegistry::new();
        let content = self.nested(nodes, &mut sections);
        RenderedBody { content, sections }
    }

    fn nested(&self, nodes: &[Node], sections: &mut SectionRegistry) -> String {
        let mut out = String::new();
        for node in nodes {
            self.emit_node(node, &mut out, sections);
        }
        out
    }

    fn emit_node(&self, node: &Node, out: &mut String, sections: &mut SectionRegistry) {
        let ns = self.namespace;
        match node {
            Node::Text(text) => out.push_str(&escape_template(&text.content)),
            Node::Echo(echo) => {
                let code = expr::translate(&echo.expr);
                if echo.escaped {
                    out.push_str(&format!("${{{}.escString({})}}", ns, code));
                } else {
                    out.push_str(&format!("${{{}}}", code));
                }
            }
            Node::Inline(inline) => self.emit_inline(inline, out),
            Node::Event(event) => {
                out.push_str(&format!("${{this.__addEventConfig(\"{}\", {})}}", event.event, events::compile(&event.args)));
            }
            Node::Php(php) => {
                let code = rewrite_tokens(php.code.trim());
                if code.is_empty() {
                    return;
                }
                let terminator = if code.ends_with(';') || code.ends_with('}') { "" } else { ";" };
                out.push_str(&format!("${{{}.execute(() => {{\n{}{}\nreturn '';\n}})}}", ns, code, terminator));
            }
            Node::Conditional(cond) => self.emit_conditional(cond, out, sections),
            Node::Loop(lp) => self.emit_loop(lp, out, sections),
            Node::Switch(switch) => self.emit_switch(switch, out, sections),
            Node::Section(section) => self.emit_section(section, out, sections),
            Node::Scoped(scoped) => self.emit_scoped(scoped, out, sections),
        }
    }

    fn emit_inline(&self, inline: &InlineNode, out: &mut String) {
        let ns = self.namespace;
        let args = inline.args.as_deref().unwrap_or("");
        let code = match inline.kind {
            InlineKind::Yield => sections::yield_call(ns, args),
            InlineKind::UseBlock => format!("${{this.__useBlock({})}}", translate_params(args)),
            InlineKind::Include => format!("${{{}.renderView(this.__include({}))}}", ns, translate_params(args)),
            InlineKind::IncludeIf => format!("${{{}.renderView(this.__includeif({}))}}", ns, translate_params(args)),
            InlineKind::IncludeWhen => format!("${{{}.renderView(this.__includewhen({}))}}", ns, translate_params(args)),
            InlineKind::Json => format!("${{{}.json({})}}", ns, translate_params(args)),
            InlineKind::Csrf => format!(r#"<input type="hidden" name="_token" value="${{{}.getCsrfToken()}}">"#, ns),
            InlineKind::Method => {
                let method = unquote(args).to_ascii_uppercase();
                format!(r#"<input type="hidden" name="_method" value="{}">"#, escape_template(&method))
            }
            InlineKind::Bind => format!(r#"{}binding="{}""#, self.attr_prefix, escape_template(var_name(unquote(args)))),
            InlineKind::WrapAttr => "${this.wrapattr()}".to_string(),
        };
        out.push_str(&code);
    }

    fn emit_conditional(&self, cond: &ConditionalNode, out: &mut String, sections: &mut SectionRegistry) {
        let mut chain = String::new();
        for (index, branch) in cond.branches.iter().enumerate() {
            let body = self.nested(&branch.body, sections);
            match &branch.condition {
                Some(condition) => {
                    let test = if index == 0 { self.opening_test(cond.kind, condition) } else { expr::translate(condition) };
                    let keyword = if index == 0 { "if" } else { " else if" };
                    chain.push_str(&format!("{}({}){{ return `{}`; }}", keyword, test, body));
                }
                None => chain.push_str(&format!(" else {{ return `{}`; }}", body)),
            }
        }
        out.push_str(&format!("${{{}.execute(() => {{ {}\nreturn '';\n}})}}", self.namespace, chain));
    }

    fn opening_test(&self, kind: BlockKind, condition: &str) -> String {
        let ns = self.namespace;
        match kind {
            BlockKind::Unless => format!("!({})", expr::translate(condition)),
            BlockKind::Isset => format!("{}.isSet({})", ns, translate_params(condition)),
            BlockKind::Empty => format!("{}.isEmpty({})", ns, translate_params(condition)),
            BlockKind::HasSection => format!("{}.hasSection({})", ns, section_name_literal(condition)),
            _ => expr::translate(condition),
        }
    }

    fn emit_loop(&self, lp: &LoopNode, out: &mut String, sections: &mut SectionRegistry) {
        let ns = self.namespace;
        let body = self.nested(&lp.body, sections);
        match lp.kind {
            BlockKind::Foreach => {
                let (iterable, key, value) = split_foreach(&lp.header);
                let key = key.unwrap_or("__loopKey");
                out.push_str(&format!(
                    "${{{}.foreach({}, ({}, {}, __loopIndex, loop) => `{}`)}}",
                    ns,
                    expr::translate(iterable),
                    value,
                    key,
                    body
                ));
            }
            BlockKind::For => {
                out.push_str(&format!(
                    "${{{}.execute(() => {{\nlet __forOutputContent__ = ``;\nfor({}) {{\n__forOutputContent__ += `{}`;\n}}\nreturn __forOutputContent__;\n}})}}",
                    ns,
                    for_header(&lp.header),
                    body
                ));
            }
            _ => {
                out.push_str(&format!(
                    "${{{}.execute(() => {{\nlet __whileOutputContent__ = ``;\nwhile({}) {{\n__whileOutputContent__ += `{}`;\n}}\nreturn __whileOutputContent__;\n}})}}",
                    ns,
                    expr::translate(&lp.header),
                    body
                ));
            }
        }
    }

    fn emit_switch(&self, switch: &SwitchNode, out: &mut String, sections: &mut SectionRegistry) {
        let mut cases = String::new();
        for case in &switch.cases {
            match &case.label {
                Some(label) => cases.push_str(&format!("\ncase {}:", expr::translate(label))),
                None => cases.push_str("\ndefault:"),
            }
            cases.push_str(&format!("\n__switchOutputContent__ += `{}`;", self.nested(&case.body, sections)));
            if case.breaks {
                cases.push_str("\nbreak;");
            }
        }
        out.push_str(&format!(
            "${{{}.execute(() => {{\nlet __switchOutputContent__ = '';\nswitch({}) {{{}\n}}\nreturn __switchOutputContent__;\n}})}}",
            self.namespace,
            expr::translate(&switch.subject),
            cases
        ));
    }

    fn emit_section(&self, node: &SectionNode, out: &mut String, sections: &mut SectionRegistry) {
        let (mode, body) = match &node.content {
            SectionContent::Short(value) => (SectionMode::Short, expr::translate(value)),
            SectionContent::Long(body) => (SectionMode::Long, format!("`{}`", self.nested(body, sections))),
        };

        let mut section = Section::new(node.name.clone(), mode, body)
            .with_vars(self.metadata.section_uses_vars(&node.name), self.waits_for_data);
        if let Some(script) = self.section_scripts.and_then(|s| s.get(&node.name)) {
            section = section.with_script(script.clone());
        }

        let call = sections::section_call(self.namespace, &section);
        let omitted = self.omit_static_sections && section.is_static();
        if let Err(duplicate) = sections.register(section) {
            debug!(section = %duplicate.0, "duplicate section skipped");
            return;
        }
        if !omitted {
            out.push_str(&call);
        }
    }

    fn emit_scoped(&self, scoped: &ScopedNode, out: &mut String, sections: &mut SectionRegistry) {
        let ns = self.namespace;
        let body = self.nested(&scoped.body, sections);
        let params = split_params(scoped.args.as_deref().unwrap_or(""));
        match scoped.kind {
            BlockKind::Wrap => {
                let tag = params.first().map_or_else(|| "null".to_string(), |p| expr::translate(p));
                let attrs = params.get(1).map_or_else(|| "{}".to_string(), |p| expr::translate(p));
                out.push_str(&format!(
                    "${{{ns}.startWrapper({}, {}, __VIEW_ID__)}}{}${{{ns}.endWrapper(__VIEW_ID__)}}",
                    tag,
                    attrs,
                    body,
                    ns = ns
                ));
            }
            BlockKind::Block => {
                let name = params.first().map_or_else(|| "''".to_string(), |p| section_name_literal(p));
                let attrs = params.get(1).map_or_else(|| "{}".to_string(), |p| expr::translate(p));
                out.push_str(&format!("${{this.__block({}, {}, `{}`)}}", name, attrs, body));
            }
            _ => {
                let watched: Vec<String> = params.iter().map(|p| format!("'{}'", var_name(unquote(p)))).collect();
                out.push_str(&format!("${{this.__follow([{}], () => `{}`)}}", watched.join(", "), body));
            }
        }
    }
}

fn translate_params(args: &str) -> String {
    split_params(args).into_iter().map(expr::translate).collect::<Vec<_>>().join(", ")
}

fn section_name_literal(name: &str) -> String {
    let name = name.trim();
    if is_quoted(name) { name.to_string() } else { expr::translate(name) }
}

/// `$items as $key => $value` into (iterable, key, value)
fn split_foreach(header: &str) -> (&str, Option<&str>, &str) {
    let lower = header.to_ascii_lowercase();
    let Some(at) = TopLevel::new(header).find(|&i| lower[i..].starts_with(" as ")) else {
        return (header, None, "item");
    };
    let binding = &header[at + 4..];
    match find_top_level(binding, "=>") {
        Some(arrow) => (&header[..at], Some(var_name(&binding[..arrow])), var_name(&binding[arrow + 2..])),
        None => (&header[..at], None, var_name(binding)),
    }
}

/// `$i = 0; $i < 10; $i++` into a JavaScript `for` header
fn for_header(header: &str) -> String {
    let bytes = header.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    for i in TopLevel::new(header) {
        if bytes[i] == b';' {
            parts.push(&header[start..i]);
            start = i + 1;
        }
    }
    parts.push(&header[start..]);

    parts
        .iter()
        .enumerate()
        .map(|(index, part)| {
            let part = part.trim();
            if part.is_empty() {
                return String::new();
            }
            let code = expr::translate(part);
            if index == 0 && !code.starts_with("let ") && !code.starts_with("var ") {
                format!("let {}", code)
            } else {
                code
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DirectiveParser, Parser};
    use crate::transform::standard_plugins;

    fn body(source: &str) -> RenderedBody {
        let mut diagnostics = Vec::new();
        let mut ast = DirectiveParser::new().parse(source, &mut diagnostics).unwrap();
        let mut transformer = standard_plugins();
        transformer.transform(&mut ast);
        let options = GenerateOptions::default();
        BodyEmitter::new(&options, &transformer.metadata).emit(&ast.nodes)
    }

    #[test]
    fn test_escape_template() {
        assert_eq!(escape_template("a `b` ${c} \\d"), "a \\`b\\` \\${c} \\\\d");
    }

    #[test]
    fn test_echo() {
        assert_eq!(body("<b>{{ $name }}</b>").content, "<b>${App.View.escString(name)}</b>");
        assert_eq!(body("{!! $html !!}").content, "${html}");
    }

    #[test]
    fn test_plain_text_unchanged() {
        let source = "<div class=\"card\">\n  <p>Hello world</p>\n</div>";
        assert_eq!(body(source).content, source);
    }

    #[test]
    fn test_if_chain() {
        let out = body("@if($x > 1) A @elseif($x == 1) B @else C @endif").content;
        insta::assert_snapshot!(out, @r"
        ${App.View.execute(() => { if(x > 1){ return ` A `; } else if(x == 1){ return ` B `; } else { return ` C `; }
        return '';
        })}
        ");
    }

    #[test]
    fn test_unless_and_isset() {
        assert!(body("@unless($ok) no @endunless").content.contains("if(!(ok))"));
        assert!(body("@isset($user) y @endisset").content.contains("if(App.View.isSet(user))"));
        assert!(body("@empty($list) none @endempty").content.contains("if(App.View.isEmpty(list))"));
    }

    #[test]
    fn test_foreach() {
        let out = body("@foreach(items as i => v)<li>{{v}}</li>@endforeach").content;
        assert_eq!(out, "${App.View.foreach(items, (v, i, __loopIndex, loop) => `<li>${App.View.escString(v)}</li>`)}");
        let out = body("@foreach($users as $user) x @endforeach").content;
        assert!(out.starts_with("${App.View.foreach(users, (user, __loopKey, __loopIndex, loop) => `"));
    }

    #[test]
    fn test_for_and_while() {
        let out = body("@for($i = 0; $i < 3; $i++) {{ $i }} @endfor").content;
        assert!(out.contains("for(let i = 0; i < 3; i++) {"));
        assert!(out.contains("__forOutputContent__ += ` ${App.View.escString(i)} `;"));
        let out = body("@while($n > 0) x @endwhile").content;
        assert!(out.contains("while(n > 0) {"));
    }

    #[test]
    fn test_switch() {
        let out = body("@switch($role) @case('admin') A @break @default D @endswitch").content;
        assert!(out.contains("switch(role) {\ncase 'admin':\n__switchOutputContent__ += ` A "));
        assert!(out.contains("`;\nbreak;\ndefault:\n__switchOutputContent__ += ` D `;\n}"));
    }

    #[test]
    fn test_sections_registered() {
        let rendered = body("@section('title', 'Home') @section('content') <p>x</p> @endsection");
        assert_eq!(rendered.sections.names(), vec!["title", "content"]);
        assert!(rendered.content.contains("${App.View.section('title', 'Home', 'short')}"));
        assert!(rendered.content.contains("${App.View.section('content', ` <p>x</p> `, 'long')}"));
    }

    #[test]
    fn test_inline_directives() {
        assert_eq!(body("@yield('content')").content, "${App.View.yield('content')}");
        assert_eq!(
            body("@include('partials.footer', ['year' => $y])").content,
            "${App.View.renderView(this.__include('partials.footer', {'year': y}))}"
        );
        assert_eq!(body("@method('put')").content, r#"<input type="hidden" name="_method" value="PUT">"#);
        assert_eq!(body("<input @bind($email)>").content, r#"<input data-binding="email">"#);
        assert!(body("@csrf").content.contains("App.View.getCsrfToken()"));
    }

    #[test]
    fn test_event_binding() {
        assert_eq!(
            body("<button @click($count++)>+</button>").content,
            "<button ${this.__addEventConfig(\"click\", [() => count++])}>+</button>"
        );
    }

    #[test]
    fn test_scoped_blocks() {
        assert!(body("@wrap('div') x @endwrap").content.starts_with("${App.View.startWrapper('div', {}, __VIEW_ID__)}"));
        assert_eq!(body("@follow($a, $b)x @endfollow").content, "${this.__follow(['a', 'b'], () => `x `)}");
        assert_eq!(body("@block('card')x @endblock").content, "${this.__block('card', {}, `x `)}");
    }

    #[test]
    fn test_php_block() {
        let out = body("@php $total = $a + 1; @endphp").content;
        assert_eq!(out, "${App.View.execute(() => {\ntotal = a + 1;\nreturn '';\n})}");
    }
}
