// Token-stream helpers: checkpoints, skipping, and rendering source text with class names
// rewritten to their fully qualified form.

impl<'a> Parser<'a> {
    // ========================================================================
    // Helpers
    // ========================================================================

    /// Run `rule`; on `None` the cursor goes back exactly where it was.
    fn attempt<T>(&mut self, rule: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let checkpoint = self.stream.position();
        let result = rule(self);
        if result.is_none() {
            self.stream.seek(checkpoint);
        }
        result
    }

    /// Span of the last consumed token.
    fn previous_span(&self) -> Span {
        self.stream.previous().map_or_else(Span::default, |t| t.span)
    }

    /// Unqualified name token (declaration names).
    fn identifier(&mut self) -> Option<Token> {
        let token = self.stream.peek();
        if token.kind == TokenKind::Name && !token.text.contains('\\') {
            Some(self.stream.next_token().clone())
        } else {
            None
        }
    }

    /// Identifier or reserved word (method names and aliases may be keywords).
    fn word(&mut self) -> Option<Token> {
        let token = self.stream.peek();
        if token.is_word() && !token.text.contains('\\') {
            Some(self.stream.next_token().clone())
        } else {
            None
        }
    }

    /// Skip one token, recording any reference it forms with its neighbours.
    fn skip_token(&mut self, refs: &mut References) {
        let index = self.stream.position();
        reference_at(self.stream.tokens(), index, &self.context, refs);
        self.stream.advance(1);
    }

    /// Skip a balanced `{ ... }` block as a unit, recording references inside it.
    ///
    /// Returns the end offset of the closing brace, or `None` (cursor untouched) when the block
    /// is not closed before end of input.
    fn skip_block(&mut self, refs: &mut References) -> Option<usize> {
        if !self.stream.check(TokenKind::LBrace) {
            return None;
        }
        let open = self.stream.position();
        let close = self.matching_brace(open)?;
        let tokens = self.stream.tokens();
        for index in open + 1..close {
            reference_at(tokens, index, &self.context, refs);
        }
        let end = tokens[close].span.end;
        self.stream.seek(close + 1);
        Some(end)
    }

    /// Index of the `}` matching the `{` at `open`.
    fn matching_brace(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (index, token) in self.stream.tokens().iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(index);
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
        }
        None
    }

    /// Skip `#[...]` attribute groups.
    fn skip_attributes(&mut self) {
        while self.stream.peek().kind == TokenKind::Opaque && self.stream.peek().text == "#[" {
            let mut depth = 0usize;
            loop {
                let token = self.stream.next_token();
                match (token.kind, token.text.as_str()) {
                    (TokenKind::Eof, _) => return,
                    (TokenKind::Opaque, "#[" | "[") => depth += 1,
                    (TokenKind::Opaque, "]") => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// A class name as it must be written to mean the same thing from any namespace.
    fn qualified_type_name(&self, name: &str) -> String {
        let current = self.current_type.as_ref();
        if name.eq_ignore_ascii_case("self") {
            if let Some((owner, _)) = current {
                return format!("\\{owner}");
            }
        }
        if name.eq_ignore_ascii_case("parent") {
            if let Some((_, Some(parent))) = current {
                return format!("\\{parent}");
            }
        }
        if is_reserved_type_name(name) {
            return name.to_string();
        }
        format!("\\{}", self.context.resolve_class(name))
    }

    /// Source text of tokens `[from, to)`, keeping the original spacing between tokens and
    /// qualifying every name token for which `qualify(tokens, index)` holds.
    fn render(&self, from: usize, to: usize, qualify: impl Fn(&[Token], usize) -> bool) -> String {
        let tokens = self.stream.tokens();
        let mut out = String::new();
        let mut cursor: Option<usize> = None;
        for index in from..to.min(tokens.len()) {
            let token = &tokens[index];
            if let Some(end) = cursor {
                out.push_str(self.source.get(end..token.span.start).unwrap_or(" "));
            }
            if token.kind == TokenKind::Name && qualify(tokens, index) {
                out.push_str(&self.qualified_type_name(&token.text));
            } else {
                out.push_str(&token.text);
            }
            cursor = Some(token.span.end);
        }
        out
    }
}
