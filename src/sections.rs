//! Sections and yields for template inheritance.
//!
//! A child view fills named sections; its parent renders them at matching
//! `@yield` points. The registry is built fresh for every compilation.

use crate::expr;
use crate::meta::ParentView;
use crate::parser::balanced::{is_quoted, split_params, unquote};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Markup rendered in place of content that waits on data
pub fn preloader(namespace: &str) -> String {
    format!(
        r#"<div class="data-preloader" ref="${{__VIEW_ID__}}" data-view-name="${{__VIEW_PATH__}}">${{{}.text('loading')}}</div>"#,
        namespace
    )
}

/// Section the inheriting view's own body is registered under
pub const BODY_SECTION: &str = "document.body";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionMode {
    /// `@section('name', value)`: one expression
    Short,
    /// `@section('name') ... @endsection`: a rendered body
    Long,
}

impl SectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionMode::Short => "short",
            SectionMode::Long => "long",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    pub mode: SectionMode,
    pub preloader: bool,
    pub uses_vars: bool,
    /// JavaScript expression producing the content
    pub body: String,
    pub script: Value,
}

impl Section {
    pub fn new(name: impl Into<String>, mode: SectionMode, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode,
            preloader: false,
            uses_vars: false,
            body: body.into(),
            script: Value::Object(Map::new()),
        }
    }

    /// Mark whether the body reads view data; a data-bound section in a
    /// view that waits on data shows the preloader first.
    pub fn with_vars(mut self, uses_vars: bool, waits_for_data: bool) -> Self {
        self.uses_vars = uses_vars;
        self.preloader = uses_vars && waits_for_data;
        self
    }

    pub fn with_script(mut self, script: Value) -> Self {
        self.script = script;
        self
    }

    /// Static sections never read view data
    pub fn is_static(&self) -> bool {
        !self.uses_vars
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("section '{0}' is already defined in this view")]
pub struct DuplicateSection(pub String);

#[derive(Serialize)]
struct SectionEntry<'a> {
    #[serde(rename = "type")]
    mode: SectionMode,
    preloader: bool,
    #[serde(rename = "useVars")]
    uses_vars: bool,
    script: &'a Value,
}

/// Ordered, name-unique collection of the sections one view defines
#[derive(Debug, Clone, Default)]
pub struct SectionRegistry {
    sections: Vec<Section>,
}

impl SectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a section; names must be unique within the view
    pub fn register(&mut self, section: Section) -> Result<(), DuplicateSection> {
        if self.contains(&section.name) {
            return Err(DuplicateSection(section.name));
        }
        self.sections.push(section);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn long_names(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|s| s.mode == SectionMode::Long)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Sections the prerender pass has to deal with
    pub fn prerender_names(&self, waits_for_data: bool) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|s| s.preloader || (waits_for_data && s.uses_vars))
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn has_preload(&self) -> bool {
        self.sections.iter().any(|s| s.preloader)
    }

    pub fn any_uses_vars(&self) -> bool {
        self.sections.iter().any(|s| s.uses_vars)
    }

    /// The `sections` object of the view setup, in definition order
    pub fn metadata_json(&self) -> String {
        let entries: Vec<String> = self
            .sections
            .iter()
            .map(|s| {
                let entry = SectionEntry { mode: s.mode, preloader: s.preloader, uses_vars: s.uses_vars, script: &s.script };
                format!(
                    "{}:{}",
                    Value::String(s.name.clone()),
                    serde_json::to_string(&entry).unwrap_or_else(|_| "{}".into())
                )
            })
            .collect();
        format!("{{{}}}", entries.join(","))
    }
}

/// Quote a section name as a JavaScript string, translating dynamic names
fn name_literal(name: &str) -> String {
    if is_quoted(name) {
        name.to_string()
    } else if name.starts_with('$') || name.contains('(') {
        expr::translate(name)
    } else {
        format!("'{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

/// `${App.View.section('name', body, 'mode')}`
pub fn section_call(namespace: &str, section: &Section) -> String {
    format!(
        "${{{}.section({}, {}, '{}')}}",
        namespace,
        name_literal(&section.name),
        section.body,
        section.mode.as_str()
    )
}

/// The section as rendered by the prerender pass: the real body when static,
/// the preloader when it waits on data.
pub fn prerender_call(namespace: &str, section: &Section) -> Option<String> {
    if section.is_static() {
        Some(section_call(namespace, section))
    } else if section.preloader {
        let placeholder = Section::new(section.name.clone(), SectionMode::Long, format!("`{}`", preloader(namespace)));
        Some(section_call(namespace, &placeholder))
    } else {
        None
    }
}

/// `@yield(name, default?)` resolved through the runtime
pub fn yield_call(namespace: &str, args: &str) -> String {
    let params = split_params(args);
    let name = params.first().map_or_else(|| "''".to_string(), |n| name_literal(n));
    match params.get(1) {
        Some(default) => format!("${{{}.yield({}, {})}}", namespace, name, expr::translate(default)),
        None => format!("${{{}.yield({})}}", namespace, name),
    }
}

/// Delegate rendering to the parent view
pub fn extend_call(namespace: &str, parent: &ParentView, data: Option<&str>) -> String {
    let parent = match parent {
        ParentView::Literal(name) => format!("'{}'", name),
        ParentView::Expression(code) => code.clone(),
    };
    match data {
        Some(data) => format!("{}.extendView({}, {})", namespace, parent, data),
        None => format!("{}.extendView({})", namespace, parent),
    }
}

/// Section name from the first `@section` parameter
pub fn section_name(param: &str) -> String {
    unquote(param).to_string()
}
