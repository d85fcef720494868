//! Property-based tests for Lens
//!
//! These tests use proptest to verify invariants across many randomly
//! generated inputs, catching edge cases that hand-written tests might miss.

use lens::ast::{Node, NodeKind};
use lens::evaluator::CoverageMap;
use lens::evaluator::compare::normalize;
use lens::parser;
use proptest::prelude::*;

fn all_nodes(nodes: &[Node]) -> Vec<&Node> {
    let mut out = Vec::new();
    for node in nodes {
        node.walk(&mut |n| out.push(n));
    }
    out
}

// =============================================================================
// Structural parser
// =============================================================================

proptest! {
    /// Any text parses, and every span stays inside the source.
    #[test]
    fn parse_unit_is_total(body in "[a-zA-Z0-9_ {}();$\\\\'\"\n/*#<?>=,:-]{0,200}") {
        let source = format!("<?php\n{body}");
        let units = parser::parse_unit(&source);
        for node in all_nodes(&units) {
            prop_assert!(node.span.start <= node.span.end);
            prop_assert!(node.span.end <= source.len());
        }
    }

    /// Junk in front of a class never hides the class, and junk inside method bodies never hides a method.
    #[test]
    fn declarations_survive_surrounding_noise(
        noise in "[a-z0-9_ ;=+$]{0,40}",
        body in "[a-z0-9_ ;=+()$]{0,40}",
        methods in prop::collection::btree_set("m_[a-z0-9_]{0,8}", 1..5),
    ) {
        let mut source = format!("<?php\nnamespace App;\n\n{noise};\n\nfinal class Subject\n{{\n");
        for method in &methods {
            source.push_str(&format!("    public function {method}(int $a = 1): void\n    {{\n        {body}\n    }}\n\n"));
        }
        source.push_str("}\n");

        let units = parser::parse_unit(&source);
        let nodes = all_nodes(&units);
        let class = nodes
            .iter()
            .find(|n| n.name == "App\\Subject" && matches!(n.kind, NodeKind::Class(_)));
        prop_assert!(class.is_some(), "class missing from {:?}", units);
        let class = class.copied().unwrap();
        prop_assert!(source[class.span.start..].starts_with("final class") || source[class.span.start..].starts_with("class"));
        prop_assert!(source[..class.span.end].ends_with('}'), "class span does not end with a closing brace");

        let found: Vec<&str> = class.methods().map(|(node, _)| node.name.as_str()).collect();
        let expected: Vec<&str> = methods.iter().map(String::as_str).collect();
        prop_assert_eq!(found, expected);
    }

    /// Parsing the same text twice yields the same tree.
    #[test]
    fn parse_unit_is_deterministic(body in "[a-zA-Z_ {}();$\\\\\n]{0,120}") {
        let source = format!("<?php\nnamespace N;\n{body}");
        prop_assert_eq!(parser::parse_unit(&source), parser::parse_unit(&source));
    }
}

// =============================================================================
// Coverage and output comparison
// =============================================================================

proptest! {
    /// Merging the same coverage twice doubles every hit count.
    #[test]
    fn coverage_merge_twice_doubles(
        hits in prop::collection::btree_map(("[a-c]\\.php", 1u32..50), 1u64..1000, 0..20)
    ) {
        let mut once = CoverageMap::new();
        for ((file, line), count) in &hits {
            once.record(file.clone(), *line, *count);
        }
        let mut twice = CoverageMap::new();
        twice.merge(&once);
        twice.merge(&once);
        for ((file, line), _) in &hits {
            prop_assert_eq!(twice.hits(file, *line), 2 * once.hits(file, *line));
        }
    }

    /// Output normalization is idempotent and ignores line-ending style.
    #[test]
    fn normalize_is_idempotent(lines in prop::collection::vec("[a-z ]{0,8}", 0..6)) {
        let unix = lines.join("\n");
        let windows = lines.join("\r\n");
        let once = normalize(&unix);
        prop_assert_eq!(normalize(&once), once.clone());
        prop_assert_eq!(normalize(&windows), once);
    }
}
