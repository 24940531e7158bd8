//! View module emission: the exported function that builds the view engine
//! instance and registers its definition with `self.setup(path, {...})`.

use super::body::{BodyEmitter, escape_template};
use super::output::Output;
use super::{GenerateOptions, GenerateResult, Generator};
use crate::ast::Ast;
use crate::meta::{Declaration, FetchConfig, ParentView, Resource, StateHook, StyleResource, VarDecl, ViewMeta};
use crate::sections::{self, BODY_SECTION, SectionMode, SectionRegistry};
use crate::transform::TransformMetadata;
use serde::Serialize;
use serde_json::Value;

/// Metadata of one section in the view definition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub mode: SectionMode,
    pub preloader: bool,
    pub uses_vars: bool,
}

/// Everything the generated module registers about a view, as data
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDefinition {
    pub path: String,
    pub function_name: String,
    pub parent_view: Option<String>,
    pub view_type: String,
    pub sections: Vec<SectionInfo>,
    pub has_await_data: bool,
    pub has_fetch_data: bool,
    pub fetch_config: Option<Value>,
    pub uses_vars: bool,
    pub has_prerender: bool,
    pub subscribe: bool,
    pub variables: Vec<String>,
    pub states: Vec<String>,
    pub user_defined: Option<String>,
    pub resources: Vec<Resource>,
    pub styles: Vec<StyleResource>,
}

/// Exported function name of a view: `web.demo-if` becomes `WebDemoIf`
pub fn view_function_name(view_path: &str) -> String {
    let name: String = view_path
        .split(|c: char| c == '.' || c == '-' || c == '_' || c == '/')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect();
    if name.is_empty() { "View".to_string() } else { name }
}

/// JavaScript module generator for a parsed view
pub struct ViewGenerator;

impl ViewGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ViewGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-view facts shared by the emitters
struct Plan<'a> {
    meta: &'a ViewMeta,
    options: &'a GenerateOptions,
    function_name: String,
    waits_for_data: bool,
    uses_vars: bool,
    has_prerender: bool,
}

impl Generator for ViewGenerator {
    fn generate(&self, ast: &Ast, metadata: &TransformMetadata, options: &GenerateOptions) -> GenerateResult {
        let meta = &ast.meta;
        let waits_for_data = meta.has_await || meta.has_fetch;
        let uses_vars = !meta.variable_list().is_empty();
        let has_prerender =
            waits_for_data && uses_vars && (metadata.any_section_uses_vars() || metadata.body_uses_vars);

        let plan = Plan {
            meta,
            options,
            function_name: options.function_name.clone().unwrap_or_else(|| view_function_name(&options.view_path)),
            waits_for_data,
            uses_vars,
            has_prerender,
        };

        let rendered = BodyEmitter::new(options, metadata)
            .waits_for_data(waits_for_data)
            .omit_static_sections(has_prerender)
            .with_section_scripts(&meta.registration.section_scripts)
            .emit(&ast.nodes);

        let code = plan.module(&rendered.content, &rendered.sections);
        let definition = plan.definition(&rendered.sections);

        GenerateResult { code, definition }
    }
}

impl Plan<'_> {
    fn ns(&self) -> &str {
        &self.options.runtime_namespace
    }

    fn definition(&self, sections: &SectionRegistry) -> ViewDefinition {
        let meta = self.meta;
        ViewDefinition {
            path: self.options.view_path.clone(),
            function_name: self.function_name.clone(),
            parent_view: meta.extends.as_ref().map(|e| match &e.parent {
                ParentView::Literal(name) => name.clone(),
                ParentView::Expression(code) => code.clone(),
            }),
            view_type: meta.view_type().to_string(),
            sections: sections
                .iter()
                .map(|s| SectionInfo { name: s.name.clone(), mode: s.mode, preloader: s.preloader, uses_vars: s.uses_vars })
                .collect(),
            has_await_data: meta.has_await,
            has_fetch_data: meta.has_fetch,
            fetch_config: meta.fetch.as_ref().map(|f| match f {
                FetchConfig::Json(value) => value.clone(),
                FetchConfig::Expression(code) => Value::String(code.clone()),
            }),
            uses_vars: self.uses_vars,
            has_prerender: self.has_prerender,
            subscribe: meta.subscribes(),
            variables: meta.variable_list().into_iter().map(str::to_string).collect(),
            states: meta.states.iter().map(|s| s.name.clone()).collect(),
            user_defined: meta.registration.user_defined.clone(),
            resources: meta.registration.resources.clone(),
            styles: meta.registration.styles.clone(),
        }
    }

    fn module(&self, body: &str, sections: &SectionRegistry) -> String {
        let meta = self.meta;
        let ns = self.ns();
        let path = escape_js(&self.options.view_path);
        let mut output = Output::new();

        for import in &meta.registration.imports {
            output.line(0, import);
        }
        if !meta.registration.imports.is_empty() {
            output.newline();
        }

        output.line(0, &format!("export function {}($$$DATA$$$ = {{}}, systemData = {{}}) {{", self.function_name));
        output.line(1, "const {App, View} = systemData;");
        output.line(1, &format!("const __VIEW_PATH__ = '{}';", path));
        output.line(1, &format!("const __VIEW_ID__ = $$$DATA$$$.__SSR_VIEW_ID__ || {}.generateViewId();", ns));
        output.line(1, &format!("const __VIEW_TYPE__ = '{}';", escape_js(meta.view_type())));
        output.line(1, "const self = new View.Engine();");
        output.line(1, "const __STATE__ = new View.State(self);");
        output.newline();
        output.lines(1, STATE_HELPERS);
        output.newline();
        output.line(1, "if(typeof $$$DATA$$$.__SSR_VIEW_ID__ !== 'undefined'){");
        output.line(2, "delete $$$DATA$$$.__SSR_VIEW_ID__;");
        output.line(1, "}");
        output.line(1, "const __UPDATE_DATA_TRAIT__ = {};");

        self.emit_vars(&mut output, &meta.vars);
        self.emit_declarations(&mut output, &meta.declarations);
        let list: Vec<String> = meta.variable_list().iter().map(|n| format!("\"{}\"", n)).collect();
        output.line(1, &format!("const __VARIABLE_LIST__ = [{}];", list.join(", ")));
        for state in &meta.states {
            self.emit_state(&mut output, state);
        }
        for script in &meta.registration.scripts {
            output.lines(1, script);
        }

        output.newline();
        output.line(1, &format!("self.setup('{}', {{", path));
        self.emit_setup(&mut output, body, sections);
        output.line(1, "});");
        output.line(1, "return self;");
        output.push("}");
        output.newline();
        output.finish()
    }

    fn emit_vars(&self, output: &mut Output, vars: &[VarDecl]) {
        if vars.is_empty() {
            return;
        }
        let bindings: Vec<String> = vars
            .iter()
            .map(|v| match &v.default {
                Some(default) => format!("{} = {}", v.name, default),
                None => v.name.clone(),
            })
            .collect();
        output.line(1, &format!("let {{{}}} = $$$DATA$$$;", bindings.join(", ")));
        for var in vars {
            output.line(1, &format!("__UPDATE_DATA_TRAIT__.{0} = value => {0} = value;", var.name));
        }
    }

    fn emit_declarations(&self, output: &mut Output, declarations: &[Declaration]) {
        for decl in declarations {
            match &decl.value {
                Some(value) => output.line(1, &format!("{} {} = {};", decl.keyword, decl.target, value)),
                None => output.line(1, &format!("{} {};", decl.keyword, decl.target)),
            }
            if decl.keyword == "let"
                && let Some(name) = &decl.name
            {
                output.line(1, &format!("__UPDATE_DATA_TRAIT__.{0} = value => {0} = value;", name));
            }
        }
    }

    fn emit_state(&self, output: &mut Output, state: &StateHook) {
        let key = &state.name;
        output.line(1, &format!("const set${0} = __STATE__.__register('{0}');", key));
        output.line(1, &format!("let {} = null;", key));
        output.line(1, &format!("const {} = (state) => {{", state.setter));
        output.line(2, &format!("{} = state;", key));
        output.line(2, &format!("set${}(state);", key));
        output.line(1, "};");
        output.line(1, &format!("__STATE__.__setters__.{0} = {0};", state.setter));
        output.line(1, &format!("const update${} = (value) => {{", key));
        output.line(2, "if(__STATE__._canUpdateStateByKey){");
        output.line(3, &format!("updateStateByKey('{}', value);", key));
        output.line(3, &format!("{} = value;", key));
        output.line(2, "}");
        output.line(1, "};");
    }

    fn state_updates(&self) -> Vec<String> {
        let mut lines: Vec<String> =
            self.meta.states.iter().map(|s| format!("update${}({});", s.name, s.initial)).collect();
        if !lines.is_empty() {
            lines.push("lockUpdateRealState();".to_string());
        }
        lines
    }

    fn emit_setup(&self, output: &mut Output, body: &str, sections: &SectionRegistry) {
        let meta = self.meta;
        let reg = &meta.registration;

        let (super_view, has_super) = match &meta.extends {
            Some(extends) => match &extends.parent {
                ParentView::Literal(name) => (format!("'{}'", escape_js(name)), true),
                ParentView::Expression(code) => (code.clone(), true),
            },
            None => ("null".to_string(), false),
        };
        let fetch = match &meta.fetch {
            Some(FetchConfig::Json(value)) => value.to_string(),
            Some(FetchConfig::Expression(code)) => code.clone(),
            None => "null".to_string(),
        };
        let prerender_sections =
            if self.has_prerender { sections.prerender_names(self.waits_for_data) } else { Vec::new() };

        let entries = [
            ("superView", super_view),
            ("hasSuperView", has_super.to_string()),
            ("viewType", "__VIEW_TYPE__".to_string()),
            ("sections", sections.metadata_json()),
            ("hasAwaitData", meta.has_await.to_string()),
            ("hasFetchData", meta.has_fetch.to_string()),
            ("subscribe", meta.subscribes().to_string()),
            ("fetch", fetch),
            ("data", "$$$DATA$$$".to_string()),
            ("viewId", "__VIEW_ID__".to_string()),
            ("path", "__VIEW_PATH__".to_string()),
            ("usesVars", self.uses_vars.to_string()),
            ("hasSections", (!sections.is_empty()).to_string()),
            ("hasSectionPreload", sections.has_preload().to_string()),
            ("hasPrerender", self.has_prerender.to_string()),
            ("renderLongSections", json_list(&sections.long_names())),
            ("renderSections", json_list(&sections.names())),
            ("prerenderSections", json_list(&prerender_sections)),
            ("userDefined", reg.user_defined.clone().unwrap_or_else(|| "{}".to_string())),
            ("scripts", to_json(&reg.script_resources)),
            ("styles", to_json(&reg.styles)),
            ("resources", to_json(&reg.resources)),
        ];
        for (key, value) in entries {
            output.line(2, &format!("{}: {},", key, value));
        }

        let updates = self.state_updates();
        output.line(2, "commitConstructorData: function() {");
        output.lines(3, &updates.join("\n"));
        output.line(2, "},");
        output.line(2, "updateVariableData: function(data) {");
        output.lines(3, UPDATE_VARIABLE_LOOP);
        output.lines(3, &updates.join("\n"));
        output.line(2, "},");
        output.line(2, "updateVariableItem: function(key, value) {");
        output.line(3, "this.data[key] = value;");
        output.line(3, "if (typeof __UPDATE_DATA_TRAIT__[key] === \"function\") {");
        output.line(4, "__UPDATE_DATA_TRAIT__[key](value);");
        output.line(3, "}");
        output.line(2, "},");
        output.line(2, "loadServerData: function(data = this.data) {");
        output.lines(3, LOAD_SERVER_VARIABLES);
        output.lines(3, &updates.join("\n"));
        output.line(2, "},");

        output.indent(2);
        output.push("prerender: ");
        output.push(&self.prerender_function(sections));
        output.line(0, ",");

        output.indent(2);
        output.push("render: ");
        output.push(&self.render_function(&format!("`{}`", body)));
        output.line(0, ",");

        output.line(2, &format!("init: function() {{{}}},", wrap_code(&meta.init.join("\n"))));
        output.line(2, "destroy: function() {},");
        self.emit_css(output);
    }

    fn prerender_function(&self, sections: &SectionRegistry) -> String {
        if !self.has_prerender {
            return "function() { return null; }".to_string();
        }
        let ns = self.ns();
        let parts: Vec<String> = sections.iter().filter_map(|s| sections::prerender_call(ns, s)).collect();
        let content = if parts.is_empty() {
            format!("`{}`", sections::preloader(ns))
        } else {
            format!("`\n{}\n`", parts.join("\n"))
        };
        self.render_function(&content)
    }

    /// Render wrapper shared by `render` and `prerender`
    fn render_function(&self, content: &str) -> String {
        let ns = self.ns();
        let tail = match &self.meta.extends {
            Some(extends) => format!(
                "{}.section('{}', __outputRenderedContent__, 'long');\n            return {};",
                ns,
                BODY_SECTION,
                sections::extend_call(ns, &extends.parent, extends.data.as_deref())
            ),
            None => "return __outputRenderedContent__;".to_string(),
        };
        format!(
            "function() {{\n            let __outputRenderedContent__ = '';\n            try {{\n                __outputRenderedContent__ = {};\n            }} catch(e) {{\n                __outputRenderedContent__ = this.__showError(e.message);\n                console.warn(e);\n            }}\n            {}\n        }}",
            content, tail
        )
    }

    fn emit_css(&self, output: &mut Output) {
        let attr = format!("{}view-name", self.options.attr_prefix);
        let path = escape_js(&self.options.view_path);
        let mut inline = Vec::new();
        let mut external = Vec::new();
        for style in &self.meta.registration.styles {
            match style {
                StyleResource::Code { content, .. } => inline.push(content.as_str()),
                StyleResource::Href { href } => external.push(href.as_str()),
            }
        }

        output.line(2, "addCss: function() {");
        if !inline.is_empty() {
            output.line(3, &format!("if (!document.querySelector('style[{}=\"{}\"]')) {{", attr, path));
            output.line(4, "const style = document.createElement('style');");
            output.line(4, &format!("style.setAttribute('{}', '{}');", attr, path));
            output.line(4, &format!("style.textContent = `{}`;", escape_template(&inline.join("\n"))));
            output.line(4, "document.head.appendChild(style);");
            output.line(3, "}");
        }
        if !external.is_empty() {
            output.line(3, &format!("{}.forEach(url => {{", to_json(&external)));
            output.line(4, &format!("if (!document.querySelector(`link[href=\"${{url}}\"][{}=\"{}\"]`)) {{", attr, path));
            output.line(5, "const link = document.createElement('link');");
            output.line(5, "link.rel = 'stylesheet';");
            output.line(5, "link.href = url;");
            output.line(5, &format!("link.setAttribute('{}', '{}');", attr, path));
            output.line(5, "document.head.appendChild(link);");
            output.line(4, "}");
            output.line(3, "});");
        }
        output.line(2, "},");
        output.line(2, "removeCss: function() {");
        output.line(3, &format!("document.querySelectorAll('style[{}=\"{}\"]').forEach(style => style.remove());", attr, path));
        output.line(3, &format!("document.querySelectorAll('link[{}=\"{}\"]').forEach(link => link.remove());", attr, path));
        output.line(2, "}");
    }
}

const STATE_HELPERS: &str = "const useState = (value) => {
    return __STATE__.__useState(value);
};
const updateRealState = (state) => {
    __STATE__.__updateRealState(state);
};
const lockUpdateRealState = () => {
    __STATE__.__lockUpdateRealState();
};
const updateStateByKey = (key, state) => {
    __STATE__.__updateStateByKey(key, state);
};";

const UPDATE_VARIABLE_LOOP: &str = "for (const key in data) {
    if (data.hasOwnProperty(key)) {
        this.updateVariableItem(key, data[key]);
    }
}";

/// Server-rendered views skip `render`; their declared vars are re-applied from the payload
const LOAD_SERVER_VARIABLES: &str = "__VARIABLE_LIST__.forEach(key => {
    if (typeof data[key] !== 'undefined' && typeof __UPDATE_DATA_TRAIT__[key] === \"function\") {
        __UPDATE_DATA_TRAIT__[key](data[key]);
    }
});";

fn escape_js(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

fn wrap_code(code: &str) -> String {
    if code.is_empty() { String::new() } else { format!(" {} ", code) }
}

fn json_list(items: &[&str]) -> String {
    to_json(&items)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DirectiveParser, Parser};
    use crate::transform::standard_plugins;

    fn generate(source: &str, view_path: &str) -> GenerateResult {
        let mut diagnostics = Vec::new();
        let mut ast = DirectiveParser::new().parse(source, &mut diagnostics).unwrap();
        let mut transformer = standard_plugins();
        transformer.transform(&mut ast);
        let options = GenerateOptions { view_path: view_path.to_string(), ..Default::default() };
        ViewGenerator::new().generate(&ast, &transformer.metadata, &options)
    }

    #[test]
    fn test_module_shape() {
        let result = generate("<p>{{ $name }}</p>", "web.home");
        let code = &result.code;
        assert!(code.starts_with("export function WebHome($$$DATA$$$ = {}, systemData = {}) {\n"));
        assert!(code.contains("    const __VIEW_PATH__ = 'web.home';\n"));
        assert!(code.contains("    self.setup('web.home', {\n"));
        assert!(code.contains("__outputRenderedContent__ = `<p>${App.View.escString(name)}</p>`;"));
        assert!(code.contains("        superView: null,\n"));
        assert!(code.contains("        prerender: function() { return null; },\n"));
        assert!(code.ends_with("    return self;\n}\n"));
    }

    #[test]
    fn test_vars_and_state() {
        let result = generate("@vars($user, $count = 0)@let([$open, $setOpen] = useState(false))x", "web.panel");
        let code = &result.code;
        assert!(code.contains("    let {user, count = 0} = $$$DATA$$$;\n"));
        assert!(code.contains("    __UPDATE_DATA_TRAIT__.count = value => count = value;\n"));
        assert!(code.contains("    const __VARIABLE_LIST__ = [\"user\", \"count\"];\n"));
        assert!(code.contains("    const set$open = __STATE__.__register('open');\n"));
        assert!(code.contains("    __STATE__.__setters__.setOpen = setOpen;\n"));
        assert!(code.contains("            update$open(false);\n            lockUpdateRealState();\n"));
        assert_eq!(result.definition.states, vec!["open"]);
        assert!(result.definition.uses_vars);
    }

    #[test]
    fn test_load_server_data_reapplies_vars_and_state() {
        let result = generate("@vars($user)@let([$open, $setOpen] = useState(false))x", "web.panel");
        let code = &result.code;
        let start = code.find("        loadServerData: function(data = this.data) {\n").unwrap();
        let end = start + code[start..].find("        },\n").unwrap();
        assert_eq!(
            &code[start..end],
            [
                "        loadServerData: function(data = this.data) {",
                "            __VARIABLE_LIST__.forEach(key => {",
                "                if (typeof data[key] !== 'undefined' && typeof __UPDATE_DATA_TRAIT__[key] === \"function\") {",
                "                    __UPDATE_DATA_TRAIT__[key](data[key]);",
                "                }",
                "            });",
                "            update$open(false);",
                "            lockUpdateRealState();",
                "",
            ]
            .join("\n")
        );
        assert!(!code.contains("loadServerData: function() {}"));
    }

    #[test]
    fn test_inheriting_view_delegates_to_parent() {
        let result = generate("@extends('layouts.base')@section('title', 'Home')", "web.home");
        let code = &result.code;
        assert!(code.contains("        superView: 'layouts.base',\n        hasSuperView: true,\n"));
        assert!(code.contains("App.View.section('document.body', __outputRenderedContent__, 'long');"));
        assert!(code.contains("return App.View.extendView('layouts.base');"));
        assert_eq!(result.definition.parent_view.as_deref(), Some("layouts.base"));
        assert_eq!(result.definition.sections[0].mode, SectionMode::Short);
    }

    #[test]
    fn test_prerender_when_waiting_on_data() {
        let source = "@await @vars($user)@section('static', 'Hi')@section('profile') {{ $user }} @endsection";
        let result = generate(source, "web.profile");
        let code = &result.code;
        assert!(result.definition.has_prerender);
        assert!(code.contains("        hasPrerender: true,\n"));
        assert!(code.contains("        prerenderSections: [\"profile\"],\n"));
        assert!(code.contains("${App.View.section('static', 'Hi', 'short')}\n${App.View.section('profile', `<div class=\"data-preloader\""));
    }

    #[test]
    fn test_no_prerender_without_wait() {
        let result = generate("@vars($user)@section('profile') {{ $user }} @endsection", "web.profile");
        assert!(!result.definition.has_prerender);
        assert!(result.code.contains("        prerenderSections: [],\n"));
    }

    #[test]
    fn test_imports_hoisted_and_css_hooks() {
        let source = "@register\n<script>\nimport { a } from './a.js';\nexport default { go() {} };\n</script>\n<style>.x { color: red; }</style>\n@endregister<p></p>";
        let code = generate(source, "web.styled").code;
        assert!(code.starts_with("import { a } from './a.js';\n\nexport function WebStyled("));
        assert!(code.contains("go() {}"));
        assert!(code.contains("style.setAttribute('data-view-name', 'web.styled');"));
        assert!(code.contains("document.querySelectorAll('style[data-view-name=\"web.styled\"]')"));
    }

    #[test]
    fn test_definition_serializes_camel_case() {
        let result = generate("@fetch({\"url\": \"/api\"})<p></p>", "web.list");
        let json = serde_json::to_value(&result.definition).unwrap();
        assert_eq!(json["functionName"], "WebList");
        assert_eq!(json["hasFetchData"], true);
        assert_eq!(json["fetchConfig"]["url"], "/api");
        assert_eq!(json["viewType"], "view");
    }

    #[test]
    fn test_view_function_name() {
        assert_eq!(view_function_name("web.demo-if"), "WebDemoIf");
        assert_eq!(view_function_name("layouts.base"), "LayoutsBase");
        assert_eq!(view_function_name(""), "View");
    }

    #[test]
    fn test_json_list() {
        assert_eq!(json_list(&["a", "b"]), r#"["a","b"]"#);
        assert_eq!(json_list(&[]), "[]");
    }
}
