// Parser core types and the unit-level loop.
//
// This file is `include!`'d into `crate::parser` to keep all parser methods in a single module.
// Namespace and `use` state (`context`) is only updated after a rule has succeeded, so a failed
// attempt never leaks into name resolution.

/// External symbols referenced by a region of code, resolved against its context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    pub types: BTreeSet<String>,
    pub functions: BTreeSet<String>,
}

impl References {
    /// Record a class-like name as written; reserved names are ignored.
    pub fn add_type(&mut self, name: &str, context: &Context) {
        if name.is_empty() || is_reserved_type_name(name) {
            return;
        }
        self.types.insert(context.resolve_class(name));
    }

    pub fn add_function(&mut self, name: &str, context: &Context) {
        self.functions.insert(context.resolve_function(name));
    }

    pub fn extend(&mut self, other: &References) {
        self.types.extend(other.types.iter().cloned());
        self.functions.extend(other.functions.iter().cloned());
    }

    fn absorb(&mut self, node: &Node) {
        self.types.extend(node.types.iter().cloned());
        self.functions.extend(node.functions.iter().cloned());
    }
}

/// Accumulates one namespace node while the unit loop runs.
struct UnitBuilder {
    name: String,
    span: Option<Span>,
    signature: Span,
    uses: Vec<UseImport>,
    children: Vec<Node>,
    refs: References,
}

impl UnitBuilder {
    fn new(name: String, header: Option<Span>) -> Self {
        Self {
            name,
            span: header,
            signature: header.unwrap_or_default(),
            uses: Vec::new(),
            children: Vec::new(),
            refs: References::default(),
        }
    }

    fn touch(&mut self, span: Span) {
        self.span = Some(self.span.map_or(span, |current| current.merge(span)));
    }

    fn push(&mut self, node: Node) {
        self.touch(node.span);
        self.refs.absorb(&node);
        self.children.push(node);
    }

    /// `None` for an implicit global unit that never saw any item.
    fn finish(self) -> Option<Node> {
        let span = self.span?;
        Some(Node {
            kind: NodeKind::Namespace { uses: self.uses },
            name: self.name,
            span,
            signature: if self.signature.is_empty() {
                Span::new(span.start, span.start)
            } else {
                self.signature
            },
            children: self.children,
            types: self.refs.types,
            functions: self.refs.functions,
            tags: Tags::new(),
        })
    }
}

/// Parser state.
///
/// ## Notes
/// - The token buffer is index-addressable; every rule is wrapped in [`Parser::attempt`].
/// - `current_type` names the class/interface/trait whose members are being parsed, so `self` in
///   signatures can be rewritten to it.
pub struct Parser<'a> {
    source: &'a str,
    stream: TokenStream,
    context: Context,
    current_type: Option<(String, Option<String>)>,
}

impl<'a> Parser<'a> {
    /// Create a parser over freshly scanned `source`.
    pub fn new(source: &'a str) -> Self {
        Self::with_tokens(source, lexer::lex(source))
    }

    /// Create a parser over tokens previously scanned from `source`.
    pub fn with_tokens(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            stream: TokenStream::new(tokens),
            context: Context::default(),
            current_type: None,
        }
    }

    /// Parse the whole input into namespace nodes. Never fails.
    ///
    /// Code outside any `namespace` statement lands in a node named `""` (the global namespace).
    pub fn parse_unit(mut self) -> Vec<Node> {
        let mut units = Vec::new();
        let mut current = UnitBuilder::new(String::new(), None);

        while !self.stream.is_at_end() {
            if let Some(header) = self.namespace_header() {
                units.extend(std::mem::replace(&mut current, UnitBuilder::new(String::new(), None)).finish());
                self.context = Context::new(header.name.clone());

                let mut unit = UnitBuilder::new(self.context.namespace.clone(), Some(header.span));
                if header.braced {
                    while !self.stream.is_at_end() && !self.stream.check(TokenKind::RBrace) {
                        self.unit_item(&mut unit);
                    }
                    if let Some(close) = self.stream.eat(TokenKind::RBrace) {
                        unit.touch(close.span);
                    }
                    units.extend(unit.finish());
                    self.context = Context::default();
                } else {
                    current = unit;
                }
                continue;
            }
            self.unit_item(&mut current);
        }

        units.extend(current.finish());
        units
    }

    /// One unit-level item: a `use` import, a declaration, or a skipped token.
    fn unit_item(&mut self, unit: &mut UnitBuilder) {
        let start = self.stream.peek().span;
        if let Some(imports) = self.use_decl() {
            unit.touch(start.merge(self.previous_span()));
            self.context.uses.extend(imports.iter().cloned());
            unit.uses.extend(imports);
            return;
        }
        if let Some(node) = self.declaration() {
            unit.push(node);
            return;
        }
        if self.stream.check(TokenKind::LBrace) {
            if let Some(end) = self.skip_block(&mut unit.refs) {
                unit.touch(Span::new(start.start, end));
                return;
            }
        }
        self.skip_token(&mut unit.refs);
        unit.touch(start);
    }

    /// Parse a context-only preamble: namespace and `use` statements and nothing else.
    ///
    /// Returns the byte offset of the first token that is neither.
    pub fn parse_context(mut self) -> Result<Context, usize> {
        while !self.stream.is_at_end() {
            let checkpoint = self.stream.position();
            if let Some(header) = self.namespace_header() {
                if header.braced {
                    return Err(self.stream.tokens()[checkpoint].span.start);
                }
                self.context = Context {
                    namespace: header.name,
                    uses: std::mem::take(&mut self.context.uses),
                };
                continue;
            }
            if let Some(imports) = self.use_decl() {
                self.context.uses.extend(imports);
                continue;
            }
            return Err(self.stream.peek().span.start);
        }
        Ok(self.context)
    }
}

/// `namespace Name;` or `namespace Name {`.
struct NamespaceHeader {
    name: String,
    span: Span,
    braced: bool,
}
