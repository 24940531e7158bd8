//! The directive table: every `@name` the compiler understands, keyed by alias.

use lazy_static::lazy_static;
use std::collections::HashMap;

/// Families of paired block directives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    If,
    Unless,
    Isset,
    Empty,
    HasSection,
    Foreach,
    For,
    While,
    Switch,
    Section,
    Wrap,
    Block,
    Follow,
}

impl BlockKind {
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::Unless => "unless",
            BlockKind::Isset => "isset",
            BlockKind::Empty => "empty",
            BlockKind::HasSection => "hasSection",
            BlockKind::Foreach => "foreach",
            BlockKind::For => "for",
            BlockKind::While => "while",
            BlockKind::Switch => "switch",
            BlockKind::Section => "section",
            BlockKind::Wrap => "wrap",
            BlockKind::Block => "block",
            BlockKind::Follow => "follow",
        }
    }

    /// Conditional families accept `@elseif` / `@else`
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            BlockKind::If | BlockKind::Unless | BlockKind::Isset | BlockKind::Empty | BlockKind::HasSection
        )
    }

    /// Whether a closer of kind `closer` ends a frame of this kind.
    /// `@hasSection` closes with `@endif`.
    pub fn closed_by(&self, closer: BlockKind) -> bool {
        *self == closer || (*self == BlockKind::HasSection && closer == BlockKind::If)
    }

    /// Name of the directive that closes this block
    pub fn closer_name(&self) -> &'static str {
        match self {
            BlockKind::If | BlockKind::HasSection => "endif",
            BlockKind::Unless => "endunless",
            BlockKind::Isset => "endisset",
            BlockKind::Empty => "endempty",
            BlockKind::Foreach => "endforeach",
            BlockKind::For => "endfor",
            BlockKind::While => "endwhile",
            BlockKind::Switch => "endswitch",
            BlockKind::Section => "endsection",
            BlockKind::Wrap => "endwrap",
            BlockKind::Block => "endblock",
            BlockKind::Follow => "endfollow",
        }
    }
}

/// Mid-block directives: continue the top frame without popping it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    ElseIf,
    Else,
    Case,
    Default,
    Break,
}

impl Branch {
    pub fn name(&self) -> &'static str {
        match self {
            Branch::ElseIf => "elseif",
            Branch::Else => "else",
            Branch::Case => "case",
            Branch::Default => "default",
            Branch::Break => "break",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineKind {
    Yield,
    UseBlock,
    Include,
    IncludeIf,
    IncludeWhen,
    Json,
    Csrf,
    Method,
    Bind,
    WrapAttr,
}

/// Directives pulled out of the body before the tree is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    Extends,
    Vars,
    Let,
    Const,
    UseState,
    Fetch,
    Await,
    ViewType,
    Subscribe,
    DontSubscribe,
}

/// Directives whose body is taken verbatim up to a matching `@end<name>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Verbatim,
    Php,
    Register,
    OnInit,
}

impl RawKind {
    pub fn closer_name(&self) -> &'static str {
        match self {
            RawKind::Verbatim => "endverbatim",
            RawKind::Php => "endphp",
            RawKind::Register => "endregister",
            RawKind::OnInit => "endoninit",
        }
    }

    /// Whether `@name(args)` is a complete directive on its own
    pub fn accepts_inline_args(&self) -> bool {
        !matches!(self, RawKind::Verbatim)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Open(BlockKind),
    Branch(Branch),
    Close(BlockKind),
    Inline(InlineKind),
    Meta(MetaKind),
    Raw(RawKind),
    /// DOM event binding, carrying the event type
    Event(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct DirectiveSpec {
    /// Canonical name
    pub name: &'static str,
    pub kind: DirectiveKind,
}

/// Event types accepted as `@type` bindings.
pub const EVENT_TYPES: &[&str] = &[
    // mouse
    "click", "dblclick", "mousedown", "mouseup", "mouseover", "mouseout", "mousemove", "mouseenter",
    "mouseleave", "contextmenu", "wheel",
    // keyboard
    "keydown", "keyup", "keypress",
    // form
    "change", "submit", "input", "reset", "invalid",
    // focus
    "focus", "blur", "focusin", "focusout",
    // selection
    "select", "selectstart", "selectionchange",
    // touch
    "touchstart", "touchmove", "touchend", "touchcancel",
    // drag
    "drag", "dragstart", "dragend", "dragover", "dragenter", "dragleave", "drop",
    // media
    "play", "pause", "ended", "volumechange", "timeupdate", "canplay", "loadeddata",
    // window
    "scroll", "resize", "load", "unload", "beforeunload", "error", "abort",
    // clipboard
    "copy", "cut", "paste",
    // pointer
    "pointerdown", "pointerup", "pointermove", "pointerover", "pointerout", "pointerenter",
    "pointerleave", "pointercancel",
    // animation and transition
    "animationstart", "animationend", "animationiteration", "transitionend",
];

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn build_registry() -> HashMap<String, DirectiveSpec> {
    let mut map = HashMap::new();
    let mut add = |aliases: &[&str], name: &'static str, kind: DirectiveKind| {
        for alias in aliases {
            map.insert(alias.to_string(), DirectiveSpec { name, kind });
        }
    };

    use BlockKind as B;
    use DirectiveKind as D;

    add(&["if"], "if", D::Open(B::If));
    add(&["elseif", "elseIf"], "elseif", D::Branch(Branch::ElseIf));
    add(&["else"], "else", D::Branch(Branch::Else));
    add(&["endif", "endIf"], "endif", D::Close(B::If));
    add(&["unless"], "unless", D::Open(B::Unless));
    add(&["endunless", "endUnless"], "endunless", D::Close(B::Unless));
    add(&["isset"], "isset", D::Open(B::Isset));
    add(&["endisset", "endIsset"], "endisset", D::Close(B::Isset));
    add(&["empty"], "empty", D::Open(B::Empty));
    add(&["endempty", "endEmpty"], "endempty", D::Close(B::Empty));
    add(&["hasSection", "hassection", "HasSection"], "hasSection", D::Open(B::HasSection));

    add(&["foreach", "forEach", "ForEach"], "foreach", D::Open(B::Foreach));
    add(&["endforeach", "endForeach", "endForEach", "EndForeach"], "endforeach", D::Close(B::Foreach));
    add(&["for"], "for", D::Open(B::For));
    add(&["endfor", "endFor"], "endfor", D::Close(B::For));
    add(&["while"], "while", D::Open(B::While));
    add(&["endwhile", "endWhile"], "endwhile", D::Close(B::While));

    add(&["switch"], "switch", D::Open(B::Switch));
    add(&["case"], "case", D::Branch(Branch::Case));
    add(&["default"], "default", D::Branch(Branch::Default));
    add(&["break"], "break", D::Branch(Branch::Break));
    add(&["endswitch", "endSwitch"], "endswitch", D::Close(B::Switch));

    add(&["section", "Section"], "section", D::Open(B::Section));
    add(&["endsection", "endSection", "EndSection", "stop", "show"], "endsection", D::Close(B::Section));

    add(&["wrap", "wrapper", "Wrap", "Wrapper"], "wrap", D::Open(B::Wrap));
    add(&["endwrap", "endwrapper", "endWrap", "endWrapper", "EndWrap", "EndWrapper"], "endwrap", D::Close(B::Wrap));
    add(&["block", "Block"], "block", D::Open(B::Block));
    add(&["endblock", "endBlock", "EndBlock"], "endblock", D::Close(B::Block));
    add(&["follow", "watch", "Follow", "Watch"], "follow", D::Open(B::Follow));
    add(&["endfollow", "endwatch", "endFollow", "endWatch", "EndFollow", "EndWatch"], "endfollow", D::Close(B::Follow));

    add(&["yield"], "yield", D::Inline(InlineKind::Yield));
    add(&["useBlock", "useblock", "mount", "mountBlock", "mountblock"], "useBlock", D::Inline(InlineKind::UseBlock));
    add(&["include"], "include", D::Inline(InlineKind::Include));
    add(&["includeIf", "includeif"], "includeIf", D::Inline(InlineKind::IncludeIf));
    add(&["includeWhen", "includewhen"], "includeWhen", D::Inline(InlineKind::IncludeWhen));
    add(&["json"], "json", D::Inline(InlineKind::Json));
    add(&["csrf"], "csrf", D::Inline(InlineKind::Csrf));
    add(&["method"], "method", D::Inline(InlineKind::Method));
    add(&["bind", "model", "val", "value"], "bind", D::Inline(InlineKind::Bind));
    add(&["wrapattr", "wrapAttr"], "wrapattr", D::Inline(InlineKind::WrapAttr));

    add(&["extends"], "extends", D::Meta(MetaKind::Extends));
    add(&["vars"], "vars", D::Meta(MetaKind::Vars));
    add(&["let"], "let", D::Meta(MetaKind::Let));
    add(&["const"], "const", D::Meta(MetaKind::Const));
    add(&["useState", "usestate"], "useState", D::Meta(MetaKind::UseState));
    add(&["fetch"], "fetch", D::Meta(MetaKind::Fetch));
    add(&["await"], "await", D::Meta(MetaKind::Await));
    add(&["viewType", "viewtype"], "viewType", D::Meta(MetaKind::ViewType));
    add(&["subscribe"], "subscribe", D::Meta(MetaKind::Subscribe));
    add(&["dontsubscribe", "dontSubscribe", "DontSubscribe"], "dontsubscribe", D::Meta(MetaKind::DontSubscribe));

    add(&["verbatim"], "verbatim", D::Raw(RawKind::Verbatim));
    add(&["php"], "php", D::Raw(RawKind::Php));
    add(&["register", "Register"], "register", D::Raw(RawKind::Register));
    add(&["onInit", "oninit", "OnInit"], "onInit", D::Raw(RawKind::OnInit));

    // Events go last so a structural directive of the same name wins.
    for &event in EVENT_TYPES {
        let cap = capitalize(event);
        let aliases = [
            event.to_string(),
            cap.clone(),
            format!("on{}", cap),
            format!("On{}", cap),
            format!("on{}", event),
        ];
        for alias in aliases {
            map.entry(alias).or_insert(DirectiveSpec { name: event, kind: D::Event(event) });
        }
    }

    map
}

lazy_static! {
    static ref REGISTRY: HashMap<String, DirectiveSpec> = build_registry();
}

/// Resolve a directive name (any accepted spelling) to its spec
pub fn lookup(name: &str) -> Option<DirectiveSpec> {
    REGISTRY.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve_to_one_spec() {
        for alias in ["endblock", "endBlock", "EndBlock"] {
            let spec = lookup(alias).unwrap();
            assert_eq!(spec.name, "endblock");
            assert_eq!(spec.kind, DirectiveKind::Close(BlockKind::Block));
        }
        assert_eq!(lookup("watch").unwrap().kind, DirectiveKind::Open(BlockKind::Follow));
        assert_eq!(lookup("mount").unwrap().name, "useBlock");
    }

    #[test]
    fn test_event_spellings() {
        for alias in ["click", "Click", "onClick", "OnClick", "onclick"] {
            assert!(matches!(lookup(alias).map(|s| s.kind), Some(DirectiveKind::Event("click"))));
        }
        assert!(matches!(lookup("onMouseenter").map(|s| s.kind), Some(DirectiveKind::Event("mouseenter"))));
    }

    #[test]
    fn test_unknown() {
        assert!(lookup("media").is_none());
        assert!(lookup("CLICK").is_none());
    }

    #[test]
    fn test_has_section_closes_with_endif() {
        assert!(BlockKind::HasSection.closed_by(BlockKind::If));
        assert!(!BlockKind::If.closed_by(BlockKind::Foreach));
    }
}
