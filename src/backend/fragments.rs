//! Typed PHP fragments for generated classes.
//!
//! Every identifier, type and default value that ends up in generated source passes through one of
//! these builders. `validate` rejects anything that is not a well-formed PHP fragment before a
//! single byte is rendered, so malformed input surfaces as an error instead of a harness that PHP
//! refuses to load.

use lens_syntax::ast::{Param, Visibility};
use thiserror::Error;

use super::writer::{BraceStyle, PhpWriter};

/// A fragment that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {what} `{text}`")]
pub struct InvalidFragment {
    pub what: &'static str,
    pub text: String,
}

impl InvalidFragment {
    fn new(what: &'static str, text: &str) -> Self {
        Self {
            what,
            text: text.to_string(),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// A PHP label: `[A-Za-z_\x80-\xff][A-Za-z0-9_\x80-\xff]*`.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic() || !c.is_ascii())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric() || !c.is_ascii())
}

/// `Name`, `App\Name` or `\App\Name`.
pub fn is_qualified_name(text: &str) -> bool {
    let text = text.strip_prefix('\\').unwrap_or(text);
    !text.is_empty() && text.split('\\').all(is_identifier)
}

/// Nullable, union, intersection and DNF types: `?A`, `A|B`, `A&B`, `(A&B)|null`.
pub fn is_type_expression(text: &str) -> bool {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix('?') {
        return is_qualified_name(inner.trim());
    }
    !text.is_empty()
        && text.split('|').all(|member| {
            let member = member.trim();
            let member = member
                .strip_prefix('(')
                .and_then(|m| m.strip_suffix(')'))
                .unwrap_or(member);
            member.split('&').all(|atom| is_qualified_name(atom.trim()))
        })
}

/// A constant expression whose brackets balance outside of string literals.
pub fn is_default_value(text: &str) -> bool {
    let mut depth = Vec::new();
    let mut quote = None;
    let mut escaped = false;
    for c in text.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth.push(c),
            ')' | ']' | '}' => {
                let open = depth.pop();
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if open != Some(expected) {
                    return false;
                }
            }
            ';' => return false,
            _ => {}
        }
    }
    !text.trim().is_empty() && depth.is_empty() && quote.is_none()
}

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterFragment {
    /// Without the `$`.
    pub name: String,
    pub type_hint: Option<String>,
    pub by_ref: bool,
    pub variadic: bool,
    pub default: Option<String>,
}

impl ParameterFragment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_hint: None,
            by_ref: false,
            variadic: false,
            default: None,
        }
    }

    pub fn with_type(mut self, type_hint: impl Into<String>) -> Self {
        self.type_hint = Some(type_hint.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn by_reference(mut self) -> Self {
        self.by_ref = true;
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn from_param(param: &Param) -> Self {
        Self {
            name: param.name.clone(),
            type_hint: param.type_hint.clone(),
            by_ref: param.by_ref,
            variadic: param.variadic,
            default: param.default.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), InvalidFragment> {
        if !is_identifier(&self.name) {
            return Err(InvalidFragment::new("parameter name", &self.name));
        }
        if let Some(type_hint) = &self.type_hint {
            if !is_type_expression(type_hint) {
                return Err(InvalidFragment::new("parameter type", type_hint));
            }
        }
        if let Some(default) = &self.default {
            if self.variadic || !is_default_value(default) {
                return Err(InvalidFragment::new("default value", default));
            }
        }
        Ok(())
    }

    /// `?\App\Clock &...$name = null`
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(type_hint) = &self.type_hint {
            out.push_str(type_hint);
            out.push(' ');
        }
        if self.by_ref {
            out.push('&');
        }
        if self.variadic {
            out.push_str("...");
        }
        out.push('$');
        out.push_str(&self.name);
        if let Some(default) = &self.default {
            out.push_str(" = ");
            out.push_str(default);
        }
        out
    }
}

// ============================================================================
// Methods
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodFragment {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub by_ref: bool,
    pub params: Vec<ParameterFragment>,
    pub return_type: Option<String>,
    /// Body statements, one per line.
    pub body: Vec<String>,
}

impl MethodFragment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_static: false,
            by_ref: false,
            params: Vec::new(),
            return_type: None,
            body: Vec::new(),
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn with_by_ref(mut self, by_ref: bool) -> Self {
        self.by_ref = by_ref;
        self
    }

    pub fn with_param(mut self, param: ParameterFragment) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = ParameterFragment>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_return_type(mut self, return_type: Option<String>) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.body.push(statement.into());
        self
    }

    pub fn validate(&self) -> Result<(), InvalidFragment> {
        if !is_identifier(&self.name) {
            return Err(InvalidFragment::new("method name", &self.name));
        }
        for param in &self.params {
            param.validate()?;
        }
        if let Some(return_type) = &self.return_type {
            if !is_type_expression(return_type) {
                return Err(InvalidFragment::new("return type", return_type));
            }
        }
        Ok(())
    }

    pub fn header(&self) -> String {
        let params: Vec<_> = self.params.iter().map(ParameterFragment::render).collect();
        let mut header = format!(
            "{}{} function {}{}({})",
            self.visibility,
            if self.is_static { " static" } else { "" },
            if self.by_ref { "&" } else { "" },
            self.name,
            params.join(", ")
        );
        if let Some(return_type) = &self.return_type {
            header.push_str(": ");
            header.push_str(return_type);
        }
        header
    }

    pub fn render(&self, writer: &mut PhpWriter) {
        writer.block(&self.header(), BraceStyle::NextLine, |w| {
            for statement in &self.body {
                w.writeln(statement);
            }
        });
    }
}

// ============================================================================
// Classes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFragment {
    /// Empty for the global namespace.
    pub namespace: String,
    pub name: String,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    /// Property declarations, rendered verbatim before the methods.
    pub properties: Vec<String>,
    pub methods: Vec<MethodFragment>,
}

impl ClassFragment {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            extends: None,
            implements: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn extending(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn implementing(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    pub fn with_property(mut self, declaration: impl Into<String>) -> Self {
        self.properties.push(declaration.into());
        self
    }

    pub fn with_method(mut self, method: MethodFragment) -> Self {
        self.methods.push(method);
        self
    }

    /// Fully qualified name, without a leading `\`.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}\\{}", self.namespace, self.name)
        }
    }

    pub fn validate(&self) -> Result<(), InvalidFragment> {
        if !self.namespace.is_empty() && !is_qualified_name(&self.namespace) {
            return Err(InvalidFragment::new("namespace", &self.namespace));
        }
        if !is_identifier(&self.name) {
            return Err(InvalidFragment::new("class name", &self.name));
        }
        for parent in self.extends.iter().chain(&self.implements) {
            if !is_qualified_name(parent) {
                return Err(InvalidFragment::new("parent type", parent));
            }
        }
        self.methods.iter().try_for_each(MethodFragment::validate)
    }

    /// Validate, then render as a braced namespace block.
    pub fn render(&self) -> Result<String, InvalidFragment> {
        self.validate()?;
        let mut header = format!("class {}", self.name);
        if let Some(parent) = &self.extends {
            header.push_str(" extends ");
            header.push_str(parent);
        }
        if !self.implements.is_empty() {
            header.push_str(" implements ");
            header.push_str(&self.implements.join(", "));
        }

        let mut writer = PhpWriter::default();
        writer.block(&format!("namespace {}", self.namespace), BraceStyle::SameLine, |w| {
            w.block(&header, BraceStyle::NextLine, |w| {
                for property in &self.properties {
                    w.writeln(property);
                }
                for (index, method) in self.methods.iter().enumerate() {
                    if index > 0 || !self.properties.is_empty() {
                        w.newline();
                    }
                    method.render(w);
                }
            });
        });
        Ok(writer.finish())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_and_name_validation() {
        assert!(is_identifier("_read2"));
        assert!(is_identifier("café"));
        assert!(!is_identifier("2read"));
        assert!(!is_identifier("read-all"));
        assert!(is_qualified_name("\\App\\Io\\Disk"));
        assert!(!is_qualified_name("App\\\\Disk"));
        assert!(!is_qualified_name("\\"));
    }

    #[test]
    fn test_type_expressions() {
        for valid in ["int", "?\\App\\Clock", "\\A|\\B|null", "\\A&\\B", "(\\A&\\B)|null", "static"] {
            assert!(is_type_expression(valid), "{valid}");
        }
        for invalid in ["", "?", "A|", "int $x", "array<int>"] {
            assert!(!is_type_expression(invalid), "{invalid}");
        }
    }

    #[test]
    fn test_default_values() {
        assert!(is_default_value("[1, [2]]"));
        assert!(is_default_value("'a;b)'"));
        assert!(is_default_value("\\App\\Disk::MODE"));
        assert!(!is_default_value("[1"));
        assert!(!is_default_value("1; exit()"));
        assert!(!is_default_value("  "));
    }

    #[test]
    fn test_parameter_rendering() {
        let param = ParameterFragment::new("items")
            .with_type("array")
            .by_reference()
            .with_default("[]");
        assert_eq!(param.render(), "array &$items = []");
        assert_eq!(ParameterFragment::new("rest").variadic().render(), "...$rest");
    }

    #[test]
    fn test_variadic_parameter_rejects_default() {
        let param = ParameterFragment::new("rest").variadic().with_default("[]");
        assert_eq!(param.validate().unwrap_err().what, "default value");
    }

    #[test]
    fn test_method_header() {
        let method = MethodFragment::new("cache")
            .with_static(true)
            .with_by_ref(true)
            .with_param(ParameterFragment::new("key").with_type("string"))
            .with_return_type(Some("?array".to_string()));
        assert_eq!(method.header(), "public static function &cache(string $key): ?array");
    }

    #[test]
    fn test_class_render_rejects_bad_method_name() {
        let class = ClassFragment::new("Lens\\Mock", "Disk").with_method(MethodFragment::new("not a name"));
        let err = class.render().unwrap_err();
        assert_eq!(err.what, "method name");
    }

    #[test]
    fn test_class_render_layout() {
        let class = ClassFragment::new("Lens\\Mock\\App", "Clock")
            .implementing("\\App\\Clock")
            .with_property("private int $n = 0;")
            .with_method(MethodFragment::new("now").with_statement("return 1;"));
        insta::assert_snapshot!(class.render().unwrap(), @r"
        namespace Lens\Mock\App {
            class Clock implements \App\Clock
            {
                private int $n = 0;

                public function now()
                {
                    return 1;
                }
            }
        }
        ");
    }
}
