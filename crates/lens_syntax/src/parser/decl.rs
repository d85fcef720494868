// Declaration rules: namespaces, imports, classes, interfaces, traits, methods and functions.
//
// Every rule is wrapped in `attempt`; references gathered by a rule live in a local
// `References` until the rule succeeds.

/// Members of a class-like body.
struct Members {
    children: Vec<Node>,
    traits: Vec<String>,
    end: usize,
}

impl<'a> Parser<'a> {
    // ========================================================================
    // Namespaces and imports
    // ========================================================================

    fn namespace_header(&mut self) -> Option<NamespaceHeader> {
        self.attempt(|p| {
            let start = p.stream.eat_keyword(Keyword::Namespace)?.span;
            let name = p
                .stream
                .eat(TokenKind::Name)
                .map(|t| t.text.trim_start_matches('\\').to_string())
                .unwrap_or_default();
            let braced = if p.stream.eat(TokenKind::Semicolon).is_some() {
                false
            } else {
                p.stream.eat(TokenKind::LBrace)?;
                true
            };
            Some(NamespaceHeader {
                name,
                span: start.merge(p.previous_span()),
                braced,
            })
        })
    }

    /// `use A\B [as C], ...;`, `use function ...;`, `use const ...;` and group uses.
    fn use_decl(&mut self) -> Option<Vec<UseImport>> {
        self.attempt(|p| {
            p.stream.eat_keyword(Keyword::Use)?;
            let kind = p.use_kind(UseKind::Class);
            let mut imports = Vec::new();
            loop {
                let prefix = p.stream.eat(TokenKind::Name)?.text;
                if p.stream.check(TokenKind::Backslash) && p.stream.peek_at(1).kind == TokenKind::LBrace {
                    p.stream.advance(2);
                    while !p.stream.check(TokenKind::RBrace) {
                        let member_kind = p.use_kind(kind);
                        let member = p.stream.eat(TokenKind::Name)?.text;
                        imports.push(p.use_clause(member_kind, format!("{prefix}\\{member}"))?);
                        if p.stream.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                    p.stream.eat(TokenKind::RBrace)?;
                } else {
                    imports.push(p.use_clause(kind, prefix)?);
                }
                if p.stream.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            p.stream.eat(TokenKind::Semicolon)?;
            Some(imports)
        })
    }

    fn use_kind(&mut self, default: UseKind) -> UseKind {
        if self.stream.eat_keyword(Keyword::Function).is_some() {
            UseKind::Function
        } else if self.stream.eat_keyword(Keyword::Const).is_some() {
            UseKind::Const
        } else {
            default
        }
    }

    fn use_clause(&mut self, kind: UseKind, path: String) -> Option<UseImport> {
        let import = UseImport::new(kind, path);
        if self.stream.eat_keyword(Keyword::As).is_some() {
            let alias = self.word()?;
            Some(import.with_alias(alias.text))
        } else {
            Some(import)
        }
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn declaration(&mut self) -> Option<Node> {
        if let Some(node) = self.class_decl() {
            return Some(node);
        }
        if let Some(node) = self.interface_decl() {
            return Some(node);
        }
        if let Some(node) = self.trait_decl() {
            return Some(node);
        }
        self.function_decl()
    }

    fn class_decl(&mut self) -> Option<Node> {
        self.attempt(|p| {
            let start = p.stream.peek().span.start;
            let mut info = ClassInfo::default();
            loop {
                if p.stream.eat_keyword(Keyword::Abstract).is_some() {
                    info.is_abstract = true;
                } else if p.stream.eat_keyword(Keyword::Final).is_some() {
                    info.is_final = true;
                } else if p.stream.eat_keyword(Keyword::Readonly).is_some() {
                    info.is_readonly = true;
                } else {
                    break;
                }
            }
            p.stream.eat_keyword(Keyword::Class)?;
            let short = p.identifier()?;
            let name = p.context.qualify(&short.text);

            let mut refs = References::default();
            if p.stream.eat_keyword(Keyword::Extends).is_some() {
                let parent = p.stream.eat(TokenKind::Name)?;
                refs.add_type(&parent.text, &p.context);
                info.parent = Some(p.context.resolve_class(&parent.text));
            }
            if p.stream.eat_keyword(Keyword::Implements).is_some() {
                info.interfaces = p.name_list(&mut refs)?;
            }
            let signature = Span::new(start, p.previous_span().end);

            let members = p.members(&name, info.parent.clone(), &mut refs)?;
            info.traits = members.traits.clone();
            Some(type_node(NodeKind::Class(info), name, start, signature, members, refs))
        })
    }

    fn interface_decl(&mut self) -> Option<Node> {
        self.attempt(|p| {
            let start = p.stream.eat_keyword(Keyword::Interface)?.span.start;
            let short = p.identifier()?;
            let name = p.context.qualify(&short.text);
            let mut refs = References::default();
            let extends = if p.stream.eat_keyword(Keyword::Extends).is_some() {
                p.name_list(&mut refs)?
            } else {
                Vec::new()
            };
            let signature = Span::new(start, p.previous_span().end);
            let members = p.members(&name, None, &mut refs)?;
            Some(type_node(NodeKind::Interface { extends }, name, start, signature, members, refs))
        })
    }

    fn trait_decl(&mut self) -> Option<Node> {
        self.attempt(|p| {
            let start = p.stream.eat_keyword(Keyword::Trait)?.span.start;
            let short = p.identifier()?;
            let name = p.context.qualify(&short.text);
            let signature = Span::new(start, p.previous_span().end);
            let mut refs = References::default();
            let members = p.members(&name, None, &mut refs)?;
            let uses = members.traits.clone();
            Some(type_node(NodeKind::Trait { uses }, name, start, signature, members, refs))
        })
    }

    fn function_decl(&mut self) -> Option<Node> {
        self.attempt(|p| {
            let start = p.stream.eat_keyword(Keyword::Function)?.span.start;
            let by_ref = p.stream.eat(TokenKind::Ampersand).is_some();
            let short = p.identifier()?;
            let name = p.context.qualify(&short.text);
            let mut refs = References::default();
            let (params, return_type) = p.callable_tail(&mut refs)?;
            let signature = Span::new(start, p.previous_span().end);
            let end = p.skip_block(&mut refs)?;
            Some(Node {
                kind: NodeKind::Function(Signature {
                    by_ref,
                    params,
                    return_type,
                }),
                name,
                span: Span::new(start, end),
                signature,
                children: Vec::new(),
                types: refs.types,
                functions: refs.functions,
                tags: Tags::new(),
            })
        })
    }

    // ========================================================================
    // Class-like bodies
    // ========================================================================

    /// `{ Member* }` with `owner` as the meaning of `self`.
    fn members(&mut self, owner: &str, parent: Option<String>, refs: &mut References) -> Option<Members> {
        self.stream.eat(TokenKind::LBrace)?;
        let previous = self.current_type.replace((owner.to_string(), parent));
        let members = self.member_list(refs);
        self.current_type = previous;
        members
    }

    fn member_list(&mut self, refs: &mut References) -> Option<Members> {
        let mut children = Vec::new();
        let mut traits = Vec::new();
        loop {
            match self.stream.peek().kind {
                TokenKind::Eof => return None,
                TokenKind::RBrace => {
                    let end = self.stream.next_token().span.end;
                    return Some(Members { children, traits, end });
                }
                _ => {}
            }
            if let Some(method) = self.method() {
                children.push(method);
            } else if let Some(names) = self.trait_use(refs) {
                traits.extend(names);
            } else if self.stream.check(TokenKind::LBrace) {
                self.skip_block(refs)?;
            } else {
                self.skip_token(refs);
            }
        }
    }

    /// `use A, B;` or `use A, B { ... }` inside a class-like body.
    fn trait_use(&mut self, refs: &mut References) -> Option<Vec<String>> {
        self.attempt(|p| {
            p.stream.eat_keyword(Keyword::Use)?;
            let mut local = References::default();
            let names = p.name_list(&mut local)?;
            if p.stream.eat(TokenKind::Semicolon).is_none() {
                p.skip_block(&mut local)?;
            }
            refs.extend(&local);
            Some(names)
        })
    }

    fn method(&mut self) -> Option<Node> {
        self.attempt(|p| {
            let start = p.stream.peek().span.start;
            let mut method = MethodSignature {
                visibility: Visibility::Public,
                is_static: false,
                is_final: false,
                is_abstract: false,
                signature: Signature::default(),
            };
            while let TokenKind::Keyword(keyword) = p.stream.peek().kind {
                match keyword {
                    Keyword::Public => method.visibility = Visibility::Public,
                    Keyword::Protected => method.visibility = Visibility::Protected,
                    Keyword::Private => method.visibility = Visibility::Private,
                    Keyword::Static => method.is_static = true,
                    Keyword::Final => method.is_final = true,
                    Keyword::Abstract => method.is_abstract = true,
                    _ => break,
                }
                p.stream.advance(1);
            }
            p.stream.eat_keyword(Keyword::Function)?;
            method.signature.by_ref = p.stream.eat(TokenKind::Ampersand).is_some();
            let name = p.word()?.text;

            let mut refs = References::default();
            let (params, return_type) = p.callable_tail(&mut refs)?;
            method.signature.params = params;
            method.signature.return_type = return_type;
            let signature = Span::new(start, p.previous_span().end);
            let end = match p.stream.eat(TokenKind::Semicolon) {
                Some(semicolon) => semicolon.span.end,
                None => p.skip_block(&mut refs)?,
            };

            Some(Node {
                kind: NodeKind::Method(method),
                name,
                span: Span::new(start, end),
                signature,
                children: Vec::new(),
                types: refs.types,
                functions: refs.functions,
                tags: Tags::new(),
            })
        })
    }

    // ========================================================================
    // Signatures
    // ========================================================================

    /// `( Params ) (: Type)?`
    fn callable_tail(&mut self, refs: &mut References) -> Option<(Vec<Param>, Option<String>)> {
        let params = self.param_list(refs)?;
        let return_type = if self.stream.eat(TokenKind::Colon).is_some() {
            Some(self.type_expr(refs)?)
        } else {
            None
        };
        Some((params, return_type))
    }

    fn param_list(&mut self, refs: &mut References) -> Option<Vec<Param>> {
        self.stream.eat(TokenKind::LParen)?;
        let mut params = Vec::new();
        while self.stream.eat(TokenKind::RParen).is_none() {
            params.push(self.param(refs)?);
            if self.stream.eat(TokenKind::Comma).is_none() {
                self.stream.eat(TokenKind::RParen)?;
                break;
            }
        }
        Some(params)
    }

    fn param(&mut self, refs: &mut References) -> Option<Param> {
        self.skip_attributes();
        // Constructor promotion modifiers do not change the callable signature.
        while let TokenKind::Keyword(Keyword::Public | Keyword::Protected | Keyword::Private | Keyword::Readonly) =
            self.stream.peek().kind
        {
            self.stream.advance(1);
        }
        let type_hint = self.type_expr(refs);
        let by_ref = self.stream.eat(TokenKind::Ampersand).is_some();
        let variadic = self.stream.eat(TokenKind::Ellipsis).is_some();
        let variable = self.stream.eat(TokenKind::Variable)?;
        let default = if self.stream.eat(TokenKind::Equals).is_some() {
            Some(self.default_value(refs)?)
        } else {
            None
        };
        Some(Param {
            name: variable.text.trim_start_matches('$').to_string(),
            type_hint,
            by_ref,
            variadic,
            default,
        })
    }

    /// `?T`, `A|B`, `A&B`, `(A&B)|null`; rendered fully qualified.
    fn type_expr(&mut self, refs: &mut References) -> Option<String> {
        self.attempt(|p| {
            let from = p.stream.position();
            let mut names = Vec::new();
            p.stream.eat(TokenKind::Question);
            p.type_atom(&mut names)?;
            while p.joins_type() {
                p.stream.advance(1);
                p.type_atom(&mut names)?;
            }
            let to = p.stream.position();
            for name in &names {
                refs.add_type(name, &p.context);
            }
            Some(p.render(from, to, |_, _| true))
        })
    }

    /// `|` always continues a type; `&` only when another type follows (not `&$param`).
    fn joins_type(&self) -> bool {
        match self.stream.peek().kind {
            TokenKind::Pipe => true,
            TokenKind::Ampersand => matches!(
                self.stream.peek_at(1).kind,
                TokenKind::Name | TokenKind::LParen | TokenKind::Keyword(Keyword::Static)
            ),
            _ => false,
        }
    }

    fn type_atom(&mut self, names: &mut Vec<String>) -> Option<()> {
        match self.stream.peek().kind {
            TokenKind::Name => {
                names.push(self.stream.next_token().text.clone());
                Some(())
            }
            TokenKind::Keyword(Keyword::Static) => {
                self.stream.advance(1);
                Some(())
            }
            TokenKind::LParen => {
                self.stream.advance(1);
                self.type_atom(names)?;
                while self.joins_type() {
                    self.stream.advance(1);
                    self.type_atom(names)?;
                }
                self.stream.eat(TokenKind::RParen).map(|_| ())
            }
            _ => None,
        }
    }

    /// Tokens up to the next `,` or `)` at nesting depth zero.
    fn default_value(&mut self, refs: &mut References) -> Option<String> {
        let from = self.stream.position();
        let mut depth = 0usize;
        loop {
            let token = self.stream.peek();
            match (token.kind, token.text.as_str()) {
                (TokenKind::Eof, _) => return None,
                (TokenKind::Comma | TokenKind::RParen, _) if depth == 0 => break,
                (TokenKind::RBrace, _) if depth == 0 => return None,
                (TokenKind::LParen | TokenKind::LBrace, _) | (TokenKind::Opaque, "[" | "#[") => depth += 1,
                (TokenKind::RParen | TokenKind::RBrace, _) | (TokenKind::Opaque, "]") => {
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            }
            self.skip_token(refs);
        }
        let to = self.stream.position();
        if to == from {
            return None;
        }
        Some(self.render(from, to, |tokens, index| {
            let class_access = tokens.get(index + 1).is_some_and(|t| t.kind == TokenKind::DoubleColon);
            let instantiation = index > 0 && tokens[index - 1].is_keyword(Keyword::New);
            class_access || instantiation
        }))
    }

    /// `Name (, Name)*`, resolved.
    fn name_list(&mut self, refs: &mut References) -> Option<Vec<String>> {
        let mut names = Vec::new();
        loop {
            let name = self.stream.eat(TokenKind::Name)?;
            refs.add_type(&name.text, &self.context);
            names.push(self.context.resolve_class(&name.text));
            if self.stream.eat(TokenKind::Comma).is_none() {
                return Some(names);
            }
        }
    }
}

/// Build a class-like node; its reference sets include those of its members.
fn type_node(kind: NodeKind, name: String, start: usize, signature: Span, members: Members, refs: References) -> Node {
    let mut refs = refs;
    for child in &members.children {
        refs.absorb(child);
    }
    Node {
        kind,
        name,
        span: Span::new(start, members.end),
        signature,
        children: members.children,
        types: refs.types,
        functions: refs.functions,
        tags: Tags::new(),
    }
}
