#[cfg(test)]
/// Parser unit tests.
///
/// These cover declaration recovery, byte ranges, reference extraction and the
/// guarantee that a failed rule leaves the cursor untouched.
mod tests {
    use super::*;

    fn only_unit(source: &str) -> Node {
        let mut units = parse_unit(source);
        assert_eq!(units.len(), 1, "expected a single unit, got {units:#?}");
        units.remove(0)
    }

    fn text(source: &str, span: Span) -> &str {
        span.text(source).unwrap()
    }

    #[test]
    fn test_class_with_methods() {
        let source = r#"<?php
namespace App\Io;

use App\Time\Clock;

final class Disk extends Base implements Storage, \Countable
{
    private Clock $clock;

    public function __construct(Clock $clock) { $this->clock = $clock; }

    public function read(string $path, int ...$flags): ?string
    {
        return file_get_contents($path);
    }

    protected static function &cache(array &$into = [], $mode = self::MODE) {}

    abstract public function count(): int;
}
"#;
        let unit = only_unit(source);
        assert_eq!(unit.name, "App\\Io");
        let class = &unit.children[0];
        assert_eq!(class.name, "App\\Io\\Disk");
        let NodeKind::Class(info) = &class.kind else {
            panic!("expected class, got {:?}", class.kind);
        };
        assert!(info.is_final);
        assert_eq!(info.parent.as_deref(), Some("App\\Io\\Base"));
        assert_eq!(info.interfaces, vec!["App\\Io\\Storage".to_string(), "Countable".to_string()]);

        let methods: Vec<_> = class.methods().map(|(node, _)| node.name.as_str()).collect();
        assert_eq!(methods, vec!["__construct", "read", "cache", "count"]);

        let (_, read) = class.methods().nth(1).unwrap();
        assert_eq!(read.signature.return_type.as_deref(), Some("?string"));
        assert_eq!(read.signature.params[0].type_hint.as_deref(), Some("string"));
        assert!(read.signature.params[1].variadic);

        let (_, cache) = class.methods().nth(2).unwrap();
        assert!(cache.is_static);
        assert!(cache.signature.by_ref);
        assert_eq!(cache.visibility, Visibility::Protected);
        assert!(cache.signature.params[0].by_ref);
        assert_eq!(cache.signature.params[0].default.as_deref(), Some("[]"));
        assert_eq!(cache.signature.params[1].default.as_deref(), Some("\\App\\Io\\Disk::MODE"));

        let (_, count) = class.methods().nth(3).unwrap();
        assert!(count.is_abstract);

        assert!(class.types.contains("App\\Time\\Clock"));
        assert!(class.functions.contains("file_get_contents"));
    }

    #[test]
    fn test_node_range_spans_keyword_to_closing_brace() {
        let source = "<?php\nabstract class Shape { public function area(): float { return 0.0; } }\ntrait T {}\n";
        let unit = only_unit(source);
        let shape = &unit.children[0];
        assert!(text(source, shape.span).starts_with("abstract class Shape"));
        assert!(text(source, shape.span).ends_with('}'));
        assert_eq!(text(source, shape.signature), "abstract class Shape");

        let (area, _) = shape.methods().next().unwrap();
        assert_eq!(text(source, area.signature), "public function area(): float");
        assert!(shape.span.contains(area.span));
        assert_eq!(text(source, unit.children[1].span), "trait T {}");
    }

    #[test]
    fn test_children_never_overlap() {
        let source = "<?php\nclass A { function a() {} function b() {} }\nclass B {}\nfunction f() {}\n";
        let unit = only_unit(source);
        for pair in unit.children.windows(2) {
            assert!(!pair[0].span.overlaps(pair[1].span));
        }
        for child in &unit.children {
            assert!(unit.span.contains(child.span));
        }
    }

    #[test]
    fn test_signature_types_are_qualified() {
        let source = r#"<?php
namespace App;
use Vendor\Http\Request as Req;
interface Handler {
    public function handle(Req $request, ?Response $fallback = null, self|int $n = 0): static|Result;
}
"#;
        let unit = only_unit(source);
        let (_, handle) = unit.children[0].methods().next().unwrap();
        let params = &handle.signature.params;
        assert_eq!(params[0].type_hint.as_deref(), Some("\\Vendor\\Http\\Request"));
        assert_eq!(params[1].type_hint.as_deref(), Some("?\\App\\Response"));
        assert_eq!(params[1].default.as_deref(), Some("null"));
        assert_eq!(params[2].type_hint.as_deref(), Some("\\App\\Handler|int"));
        assert_eq!(handle.signature.return_type.as_deref(), Some("static|\\App\\Result"));
    }

    #[test]
    fn test_references_from_bodies() {
        let source = r#"<?php
namespace App;
use App\Io\Disk;
use function App\Util\slugify;

function render(array $items): string
{
    $disk = new Disk();
    $clock = Clock::system();
    try {
        $out = array_map(fn ($x) => slugify($x), $items);
    } catch (NotFound | \RuntimeException $e) {
        return '';
    }
    if ($disk instanceof Cache) { echo count($items); }
    $disk->write(implode(',', $out));
    return helper\format($out);
}
"#;
        let unit = only_unit(source);
        let render = &unit.children[0];
        let types: Vec<_> = render.types.iter().map(String::as_str).collect();
        assert_eq!(
            types,
            vec!["App\\Cache", "App\\Clock", "App\\Io\\Disk", "App\\NotFound", "RuntimeException"]
        );
        let functions: Vec<_> = render.functions.iter().map(String::as_str).collect();
        assert_eq!(
            functions,
            vec!["App\\Util\\slugify", "App\\helper\\format", "array_map", "count", "implode"]
        );
    }

    #[test]
    fn test_malformed_declaration_is_skipped() {
        let source = "<?php\nclass { broken\nfunction ok() {}\nclass Good {}\n";
        let unit = only_unit(source);
        let names: Vec<_> = unit.children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["ok", "Good"]);
    }

    #[test]
    fn test_unclosed_class_does_not_swallow_file() {
        let source = "<?php\nclass Open {\nfunction later() {}\n";
        let unit = only_unit(source);
        assert_eq!(unit.children.len(), 1);
        assert_eq!(unit.children[0].name, "later");
        assert!(matches!(unit.children[0].kind, NodeKind::Function(_)));
    }

    #[test]
    fn test_braced_namespaces() {
        let source = "<?php\nnamespace A { class X {} }\nnamespace { function g() {} }\n";
        let units = parse_unit(source);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].children[0].name, "A\\X");
        assert_eq!(units[1].name, "");
        assert_eq!(units[1].children[0].name, "g");
    }

    #[test]
    fn test_statement_namespaces_split_units() {
        let source = "<?php\nnamespace A;\nclass X {}\nnamespace B;\nclass X {}\n";
        let units = parse_unit(source);
        let names: Vec<_> = units.iter().map(|u| u.children[0].name.as_str()).collect();
        assert_eq!(names, vec!["A\\X", "B\\X"]);
    }

    #[test]
    fn test_group_use_and_aliases() {
        let source = "<?php\nnamespace App;\nuse Lib\\{Reader, Writer as Out};\nuse function Lib\\helpers\\dump;\n";
        let unit = only_unit(source);
        let NodeKind::Namespace { uses } = &unit.kind else {
            panic!("expected namespace");
        };
        assert_eq!(uses.len(), 3);
        assert_eq!(uses[0].path, "Lib\\Reader");
        assert_eq!(uses[1].alias, "Out");
        assert_eq!(uses[2].kind, UseKind::Function);
    }

    #[test]
    fn test_trait_use_in_class() {
        let source = "<?php\nclass Job { use Retries, Logs { Logs::log insteadof Retries; } }\n";
        let unit = only_unit(source);
        let NodeKind::Class(info) = &unit.children[0].kind else {
            panic!("expected class");
        };
        assert_eq!(info.traits, vec!["Retries".to_string(), "Logs".to_string()]);
    }

    #[test]
    fn test_failed_rule_restores_position() {
        let mut parser = Parser::new("<?php class { }");
        let before = parser.stream.position();
        assert!(parser.class_decl().is_none());
        assert_eq!(parser.stream.position(), before);
        assert!(parser.method().is_none());
        assert_eq!(parser.stream.position(), before);
    }

    #[test]
    fn test_parse_context() {
        let context = parse_context("namespace App;\nuse App\\Io\\Disk;\nuse Lib\\Clock as Time;\n").unwrap();
        assert_eq!(context.namespace, "App");
        assert_eq!(context.resolve_class("Time"), "Lib\\Clock");

        let source = "namespace App;\n$x = 1;\n";
        assert_eq!(parse_context(source), Err(source.find('$').unwrap()));
    }

    #[test]
    fn test_references_in_fragment() {
        let context = Context::new("App").with_use(UseImport::new(UseKind::Class, "App\\Io\\Disk"));
        let refs = references_in("$d = new Disk();\necho strtoupper($d->read('a'));\n", &context);
        assert!(refs.types.contains("App\\Io\\Disk"));
        assert!(refs.functions.contains("strtoupper"));
        assert!(!refs.functions.contains("read"));
    }

    #[test]
    fn test_empty_and_markup_only_input() {
        assert!(parse_unit("").is_empty());
        assert!(parse_unit("<html></html>").is_empty());
    }

    type Rule = fn(&mut Parser<'_>) -> bool;

    const RULES: [(&str, Rule); 8] = [
        ("namespace_header", |p| p.namespace_header().is_some()),
        ("use_decl", |p| p.use_decl().is_some()),
        ("declaration", |p| p.declaration().is_some()),
        ("class_decl", |p| p.class_decl().is_some()),
        ("interface_decl", |p| p.interface_decl().is_some()),
        ("trait_decl", |p| p.trait_decl().is_some()),
        ("function_decl", |p| p.function_decl().is_some()),
        ("method", |p| p.method().is_some()),
    ];

    proptest::proptest! {
        /// Started at any token, a rule that fails leaves the cursor where it was.
        #[test]
        fn failed_rules_never_move_the_cursor(body in "[a-zA-Z0-9_ {}();$\\\\&|?=,:\n]{0,80}") {
            let source = format!("<?php\n{body}");
            let count = Parser::new(&source).stream.tokens().len();
            for start in 0..count {
                for (name, rule) in RULES {
                    let mut parser = Parser::new(&source);
                    parser.stream.seek(start);
                    if !rule(&mut parser) {
                        proptest::prop_assert_eq!(parser.stream.position(), start, "{} from token {}", name, start);
                    }
                }
            }
        }
    }
}

