// Reference extraction over opaque regions.
//
// Works on one token at a time with its neighbours, so the same rules apply whether a body is
// skipped as a block or token by token.

/// Names that look like calls or type hints but belong to the language itself.
const LANGUAGE_CONSTRUCTS: &[&str] = &[
    "array", "list", "isset", "unset", "empty", "eval", "exit", "die", "echo", "print", "return", "include",
    "include_once", "require", "require_once", "if", "elseif", "else", "while", "do", "for", "foreach",
    "switch", "case", "default", "break", "continue", "match", "fn", "catch", "try", "finally", "throw",
    "yield", "from", "global", "clone", "declare", "goto", "and", "or", "xor", "endif", "endwhile", "endfor",
    "endforeach", "endswitch", "enddeclare", "__halt_compiler",
];

fn is_language_construct(name: &str) -> bool {
    LANGUAGE_CONSTRUCTS.iter().any(|construct| construct.eq_ignore_ascii_case(name)) || is_reserved_type_name(name)
}

/// Record the reference (if any) that the token at `index` forms with its neighbours.
fn reference_at(tokens: &[Token], index: usize, context: &Context, refs: &mut References) {
    let Some(token) = tokens.get(index) else {
        return;
    };
    let next = tokens.get(index + 1);
    match token.kind {
        TokenKind::Keyword(Keyword::New | Keyword::Instanceof) => {
            if let Some(name) = next.filter(|t| t.kind == TokenKind::Name) {
                refs.add_type(&name.text, context);
            }
        }
        // Anonymous class headers and trait uses inside them.
        TokenKind::Keyword(Keyword::Extends | Keyword::Implements | Keyword::Use) => {
            name_list_at(tokens, index + 1, context, refs);
        }
        TokenKind::Name => name_reference(tokens, index, context, refs),
        _ => {}
    }
}

fn name_reference(tokens: &[Token], index: usize, context: &Context, refs: &mut References) {
    let name = tokens[index].text.as_str();
    let kind_at = |i: Option<usize>| i.and_then(|i| tokens.get(i)).map(|t| t.kind);
    let previous = kind_at(index.checked_sub(1));
    let next = kind_at(Some(index + 1));

    // `$obj->name`, `Foo::name`
    if matches!(previous, Some(TokenKind::Arrow | TokenKind::DoubleColon)) {
        return;
    }

    match next {
        Some(TokenKind::DoubleColon) => refs.add_type(name, context),
        Some(TokenKind::LParen) => {
            if name.eq_ignore_ascii_case("catch") {
                name_list_at(tokens, index + 2, context, refs);
                return;
            }
            let declared_or_built = matches!(
                previous,
                Some(TokenKind::Keyword(Keyword::Function | Keyword::New))
            );
            let attribute = index > 0 && tokens[index - 1].text == "#[";
            if !declared_or_built && !attribute && !is_language_construct(name) {
                refs.add_function(name, context);
            }
        }
        Some(TokenKind::Variable) if !is_language_construct(name) => refs.add_type(name, context),
        Some(TokenKind::Ampersand | TokenKind::Ellipsis) if !is_language_construct(name) => {
            let hinted = tokens[index + 2..]
                .iter()
                .take(2)
                .find(|t| t.kind != TokenKind::Ellipsis)
                .is_some_and(|t| t.kind == TokenKind::Variable);
            if hinted {
                refs.add_type(name, context);
            }
        }
        _ => {
            // Closure return types: `): Name` and `): ?Name`.
            let return_hint = match previous {
                Some(TokenKind::Colon) => kind_at(index.checked_sub(2)) == Some(TokenKind::RParen),
                Some(TokenKind::Question) => {
                    kind_at(index.checked_sub(2)) == Some(TokenKind::Colon)
                        && kind_at(index.checked_sub(3)) == Some(TokenKind::RParen)
                }
                _ => false,
            };
            if return_hint {
                refs.add_type(name, context);
            }
        }
    }
}

/// `Name ((, | |) Name)*` starting at `index`; anything else ends the list.
fn name_list_at(tokens: &[Token], index: usize, context: &Context, refs: &mut References) {
    let mut index = index;
    while let Some(token) = tokens.get(index) {
        if token.kind != TokenKind::Name {
            return;
        }
        refs.add_type(&token.text, context);
        match tokens.get(index + 1).map(|t| t.kind) {
            Some(TokenKind::Comma | TokenKind::Pipe) => index += 2,
            _ => return,
        }
    }
}
