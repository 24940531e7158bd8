use oneview_compiler::{CompileError, CompileOptions, ErrorKind, Pipeline, Severity};

fn strict() -> Pipeline {
    Pipeline::standard()
}

fn lenient() -> Pipeline {
    Pipeline::new(CompileOptions { strict: false, ..Default::default() })
}

fn structure_error(source: &str) -> oneview_compiler::Diagnostic {
    match strict().compile(source, "web.broken") {
        Err(CompileError::Structure(diag)) => diag,
        Err(other) => panic!("expected a structural error, got {}", other),
        Ok(_) => panic!("expected {:?} to fail", source),
    }
}

#[test]
fn test_mismatched_close_names_the_opener() {
    let diag = structure_error("@if($x > 1) A @endforeach");
    assert_eq!(diag.kind, ErrorKind::MismatchedClose);
    assert_eq!(diag.directive.as_deref(), Some("if"));
    assert_eq!(diag.severity, Severity::Error);
}

#[test]
fn test_close_without_opener() {
    let diag = structure_error("text @endwhile");
    assert_eq!(diag.kind, ErrorKind::MismatchedClose);
}

#[test]
fn test_unterminated_block() {
    let diag = structure_error("@foreach($items as $item) {{ $item }}");
    assert_eq!(diag.kind, ErrorKind::UnterminatedBlock);
    assert_eq!(diag.directive.as_deref(), Some("foreach"));
}

#[test]
fn test_misplaced_branch() {
    let diag = structure_error("@for($i = 0; $i < 2; $i++) @else @endfor");
    assert_eq!(diag.kind, ErrorKind::MisplacedBranch);
}

#[test]
fn test_rendered_error_points_at_source() {
    let source = "<ul>\n@foreach($items as $item)\n<li></li>\n@endif";
    let err = strict().compile(source, "web.list").unwrap_err();
    let rendered = err.render(source, "list.blade.php");
    assert!(rendered.contains("list.blade.php:"));
    assert!(rendered.contains("error:"));
}

#[test]
fn test_lenient_ignores_stray_closer() {
    let result = lenient().compile("@if($a) A @endforeach B @endif", "web.stray").unwrap();
    assert!(result.diagnostics.iter().any(|d| d.kind == ErrorKind::MismatchedClose && d.severity == Severity::Warning));
    assert!(result.code.contains("if(a){ return ` A  B `; }"));
}

#[test]
fn test_lenient_closes_open_blocks() {
    let result = lenient().compile("@while($n > 0) tick", "web.open").unwrap();
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].kind, ErrorKind::UnterminatedBlock);
    assert!(result.code.contains("while(n > 0) {"));
}

#[test]
fn test_deep_nesting_resolves() {
    let depth = 40;
    let source = format!("{}x{}", "@if($a) ".repeat(depth), " @endif".repeat(depth));
    let result = strict().compile(&source, "web.deep").unwrap();
    assert_eq!(result.code.matches("App.View.execute(").count(), depth);
    assert!(result.diagnostics.is_empty());
}

#[test]
fn test_runaway_nesting_is_an_error() {
    let depth = 2000;
    let source = format!("{}x{}", "@if($a) ".repeat(depth), " @endif".repeat(depth));
    let diag = structure_error(&source);
    assert_eq!(diag.kind, ErrorKind::NestingTooDeep);
    assert_eq!(diag.directive.as_deref(), Some("if"));

    let err = lenient().compile(&source, "web.deep").unwrap_err();
    assert!(matches!(err, CompileError::Structure(ref d) if d.kind == ErrorKind::NestingTooDeep));
}

#[test]
fn test_runaway_nesting_does_not_stop_the_next_view() {
    let pipeline = strict();
    let source = format!("{}x", "@foreach($rows as $row) ".repeat(10_000));
    assert!(pipeline.compile(&source, "web.deep").is_err());
    assert!(pipeline.compile("@if($a) x @endif", "web.flat").is_ok());
}

#[test]
fn test_every_family_pairs_up() {
    let source = [
        "@unless($a) u @endunless",
        "@isset($b) i @endisset",
        "@empty($c) e @endempty",
        "@hasSection('side') h @endif",
        "@switch($d) @case(1) one @break @default other @endswitch",
        "@wrap('div') w @endwrap",
        "@block('card') b @endblock",
        "@follow($e) f @endfollow",
        "@php $x = 1; @endphp",
    ]
    .join("\n");
    let result = strict().compile(&source, "web.families").unwrap();
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert!(result.code.contains("App.View.startWrapper('div', {}, __VIEW_ID__)"));
    assert!(result.code.contains("this.__block('card', {}, ` b `)"));
    assert!(result.code.contains("this.__follow(['e'], () => ` f `)"));
}
