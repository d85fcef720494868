//! Structural tree for PHP source.
//!
//! The parser only recovers declarations: namespaces, classes, interfaces, traits, methods and
//! functions. Bodies are opaque; what survives of them is the set of external symbols they reference.
//!
//! ## Notes
//! - Every node carries a full byte range (first keyword/modifier through the closing brace) and a
//!   signature range (through the last header token).
//! - Type and function names are stored fully qualified, without a leading `\`.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Spans
// ============================================================================

/// Byte range `[start, end)` in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both.
    pub fn merge(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The text this span covers, if it is in bounds.
    pub fn text<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.start..self.end)
    }
}

// ============================================================================
// Tags
// ============================================================================

/// Well-known tag names.
pub mod tags {
    /// The node is the target of at least one fixture.
    pub const REQUIRES_MOCK: &str = "requires-mock";
    /// At least one line of the node was executed during evaluation.
    pub const COVERED: &str = "covered";
}

/// An open set of string tags attached to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tags(BTreeSet<String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, tag: impl Into<String>) {
        self.0.insert(tag.into());
    }

    pub fn has(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// A parsed declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    /// Fully qualified for types and functions; the namespace name for namespaces (empty = global).
    pub name: String,
    pub span: Span,
    pub signature: Span,
    pub children: Vec<Node>,
    /// Referenced type names, resolved.
    pub types: BTreeSet<String>,
    /// Referenced free-function names, resolved.
    pub functions: BTreeSet<String>,
    pub tags: Tags,
}

/// Declaration kind plus its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeKind {
    Namespace { uses: Vec<UseImport> },
    Class(ClassInfo),
    Interface { extends: Vec<String> },
    Trait { uses: Vec<String> },
    Method(MethodSignature),
    Function(Signature),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Namespace { .. } => "namespace",
            NodeKind::Class(_) => "class",
            NodeKind::Interface { .. } => "interface",
            NodeKind::Trait { .. } => "trait",
            NodeKind::Method(_) => "method",
            NodeKind::Function(_) => "function",
        }
    }
}

impl Node {
    /// Classes, interfaces and traits.
    pub fn is_type(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Class(_) | NodeKind::Interface { .. } | NodeKind::Trait { .. }
        )
    }

    /// Method children with their signatures.
    pub fn methods(&self) -> impl Iterator<Item = (&Node, &MethodSignature)> {
        self.children.iter().filter_map(|child| match &child.kind {
            NodeKind::Method(signature) => Some((child, signature)),
            _ => None,
        })
    }

    /// Depth-first, pre-order traversal including `self`.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Node)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Mutable depth-first traversal including `self`.
    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut Node)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }
}

/// Class header details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassInfo {
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_readonly: bool,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    /// Traits pulled in with `use` inside the class body.
    pub traits: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        })
    }
}

/// A method declaration's modifiers plus its callable signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodSignature {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    pub signature: Signature,
}

/// Parameter list and return type.
///
/// ## Notes
/// - Type and default-value texts are rewritten so they mean the same thing from any namespace;
///   `self` and `parent` are replaced by the declaring class and its parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub by_ref: bool,
    pub params: Vec<Param>,
    /// Return type text with class names fully qualified (`?\App\Clock`, `int|false`, `static`).
    pub return_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Param {
    /// Without the leading `$`.
    pub name: String,
    /// Type constraint text with class names fully qualified.
    pub type_hint: Option<String>,
    pub by_ref: bool,
    pub variadic: bool,
    /// Default value source text, with class names in `Name::` and `new Name` fully qualified.
    pub default: Option<String>,
}

// ============================================================================
// Name resolution
// ============================================================================

/// What a `use` statement imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UseKind {
    #[default]
    Class,
    Function,
    Const,
}

/// One imported name: `use App\Io\File as Disk;` is `{ path: "App\Io\File", alias: "Disk" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UseImport {
    pub kind: UseKind,
    pub path: String,
    pub alias: String,
}

impl UseImport {
    /// Import with the default alias (the last segment of `path`).
    pub fn new(kind: UseKind, path: impl Into<String>) -> Self {
        let path = path.into().trim_start_matches('\\').to_string();
        let alias = last_segment(&path).to_string();
        Self { kind, path, alias }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Whether the alias differs from the default one.
    pub fn has_explicit_alias(&self) -> bool {
        self.alias != last_segment(&self.path)
    }
}

/// Namespace plus imports in effect at some point of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Context {
    /// Empty for the global namespace.
    pub namespace: String,
    pub uses: Vec<UseImport>,
}

impl Context {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into().trim_start_matches('\\').to_string(),
            uses: Vec::new(),
        }
    }

    pub fn with_use(mut self, import: UseImport) -> Self {
        self.uses.push(import);
        self
    }

    /// Resolve a class-like name with PHP's rules.
    pub fn resolve_class(&self, name: &str) -> String {
        if let Some(qualified) = name.strip_prefix('\\') {
            return qualified.to_string();
        }
        let (first, rest) = split_first_segment(name);
        if first.eq_ignore_ascii_case("namespace") {
            return match rest {
                Some(rest) => self.qualify(rest),
                None => self.namespace.clone(),
            };
        }
        let import = self
            .uses
            .iter()
            .find(|u| u.kind == UseKind::Class && u.alias.eq_ignore_ascii_case(first));
        match (import, rest) {
            (Some(import), Some(rest)) => format!("{}\\{}", import.path, rest),
            (Some(import), None) => import.path.clone(),
            (None, _) => self.qualify(name),
        }
    }

    /// Resolve a function name.
    ///
    /// Unqualified names without a `use function` import are returned as written: PHP falls back
    /// to the global function at runtime, so the namespaced candidate cannot be decided statically.
    pub fn resolve_function(&self, name: &str) -> String {
        if let Some(qualified) = name.strip_prefix('\\') {
            return qualified.to_string();
        }
        if name.contains('\\') {
            return self.resolve_class(name);
        }
        self.uses
            .iter()
            .find(|u| u.kind == UseKind::Function && u.alias.eq_ignore_ascii_case(name))
            .map_or_else(|| name.to_string(), |import| import.path.clone())
    }

    /// Prefix `name` with the current namespace.
    pub fn qualify(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}\\{}", self.namespace, name)
        }
    }
}

/// `App\Io\File` -> `File`.
pub fn last_segment(name: &str) -> &str {
    name.rsplit('\\').next().unwrap_or(name)
}

/// `App\Io\File` -> `App\Io`; empty for unqualified names.
pub fn namespace_of(name: &str) -> &str {
    let name = name.trim_start_matches('\\');
    name.rfind('\\').map_or("", |index| &name[..index])
}

fn split_first_segment(name: &str) -> (&str, Option<&str>) {
    match name.split_once('\\') {
        Some((first, rest)) => (first, Some(rest)),
        None => (name, None),
    }
}

const RESERVED_TYPE_NAMES: &[&str] = &[
    "self", "static", "parent", "int", "integer", "float", "double", "string", "bool", "boolean", "array",
    "callable", "iterable", "object", "mixed", "void", "null", "never", "false", "true", "resource",
];

/// `self`/`static`/`parent` and scalar or pseudo types never name a declaration.
pub fn is_reserved_type_name(name: &str) -> bool {
    RESERVED_TYPE_NAMES.iter().any(|reserved| reserved.eq_ignore_ascii_case(name))
}
