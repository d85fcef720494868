/// Parse PHP source into namespace nodes.
///
/// This is the main public entrypoint for structural parsing. It never fails: malformed
/// declarations are skipped token by token.
#[tracing::instrument(skip_all, fields(source_len = source.len()))]
pub fn parse_unit(source: &str) -> Vec<Node> {
    Parser::new(source).parse_unit()
}

/// Parse a preamble that may only contain a `namespace` statement and `use` imports.
///
/// ## Errors
/// Returns the byte offset of the first token that is neither.
pub fn parse_context(source: &str) -> Result<Context, usize> {
    Parser::new(source).parse_context()
}

/// Collect the external symbols referenced by `tokens`, resolved in `context`.
pub fn collect_references(tokens: &[Token], context: &Context) -> References {
    let mut refs = References::default();
    for index in 0..tokens.len() {
        reference_at(tokens, index, context, &mut refs);
    }
    refs
}

/// Scan `source` (a code fragment, no open tag needed) and collect its references.
pub fn references_in(source: &str, context: &Context) -> References {
    collect_references(&lexer::lex(source), context)
}
