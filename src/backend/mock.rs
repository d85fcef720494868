//! Mock class generation.
//!
//! A mock of `App\Io\Disk` is the class `Lens\Mock\App\Io\Disk`, which extends the target (or
//! implements it, for interfaces) and overrides every public instance method so that each call is
//! forwarded to the agent injected with `lensAttach`.
//!
//! ## Notes
//! - The constructor is replaced by one that only registers the instance with the agent, so the
//!   target's dependencies never have to be built.
//! - Static, final and private methods are left alone. Abstract non-public methods still get a
//!   forwarding body, otherwise the mock could not be instantiated.
//! - In record mode each method returns a placeholder that satisfies its return type where one
//!   exists (`''` for `string`, `$this` for `static`, ...).

use std::fmt;

use lens_syntax::ast::{Visibility, last_segment, namespace_of};
use serde::Serialize;
use thiserror::Error;

use super::fragments::{ClassFragment, InvalidFragment, MethodFragment, ParameterFragment};
use super::surface::{SurfaceError, SurfaceMethod, SurfaceProvider, TypeKind, TypeSurface};
use super::writer::php_string;

/// Namespace prefix of every generated mock.
pub const MOCK_NAMESPACE: &str = "Lens\\Mock";

/// Fully qualified name of the agent runtime class inside the harness.
pub const AGENT_CLASS: &str = "\\Lens\\Runtime\\Agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MockMode {
    Record,
    Replay,
}

impl fmt::Display for MockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MockMode::Record => "record",
            MockMode::Replay => "replay",
        })
    }
}

#[derive(Debug, Error)]
pub enum MockError {
    #[error("cannot mock `{0}`: no class or interface with that name is known")]
    UnknownType(String),

    #[error("cannot mock `{0}`: final classes cannot be extended")]
    FinalType(String),

    #[error("cannot mock `{0}`: traits have no instances")]
    TraitType(String),

    #[error("generated mock for `{target}` is malformed: {source}")]
    InvalidFragment {
        target: String,
        #[source]
        source: InvalidFragment,
    },

    #[error(transparent)]
    Surface(SurfaceError),
}

/// Generated mock class source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MockSource {
    /// The mocked type, without a leading `\`.
    pub target: String,
    /// The generated class, without a leading `\`.
    pub class_name: String,
    pub mode: MockMode,
    /// A braced `namespace ... { }` block, ready to be embedded in a harness file.
    pub source: String,
}

/// `App\Io\Disk` -> `Lens\Mock\App\Io\Disk`.
pub fn mock_class_name(target: &str) -> String {
    format!("{MOCK_NAMESPACE}\\{}", target.trim_start_matches('\\'))
}

/// Look `type_name` up through `provider`, then [`build`] its mock.
pub fn build_for(provider: &dyn SurfaceProvider, type_name: &str, mode: MockMode) -> Result<MockSource, MockError> {
    let surface = provider.surface(type_name).map_err(|e| match e {
        SurfaceError::Unknown(name) => MockError::UnknownType(name),
        other => MockError::Surface(other),
    })?;
    build(&surface, mode)
}

/// Generate the mock class for `surface`.
///
/// ## Errors
/// - [`MockError::FinalType`] / [`MockError::TraitType`] when the type cannot be substituted.
/// - [`MockError::InvalidFragment`] when a name, type or default value would not be valid PHP.
pub fn build(surface: &TypeSurface, mode: MockMode) -> Result<MockSource, MockError> {
    let target = surface.name.trim_start_matches('\\').to_string();
    match surface.kind {
        TypeKind::Trait => return Err(MockError::TraitType(target)),
        TypeKind::Class if surface.is_final => return Err(MockError::FinalType(target)),
        _ => {}
    }

    let namespace = match namespace_of(&target) {
        "" => MOCK_NAMESPACE.to_string(),
        ns => format!("{MOCK_NAMESPACE}\\{ns}"),
    };
    let mut class = ClassFragment::new(namespace, last_segment(&target))
        .with_property(format!("private static ?{AGENT_CLASS} $lensAgent = null;"))
        .with_method(
            MethodFragment::new("lensAttach")
                .with_static(true)
                .with_param(ParameterFragment::new("agent").with_type(AGENT_CLASS))
                .with_return_type(Some("void".to_string()))
                .with_statement("self::$lensAgent = $agent;"),
        );
    class = match surface.kind {
        TypeKind::Interface => class.implementing(format!("\\{target}")),
        _ => class.extending(format!("\\{target}")),
    };

    let builder = MethodBuilder {
        target: &target,
        kind: surface.kind,
        mode,
    };
    if let Some(constructor) = builder.constructor(surface) {
        class = class.with_method(constructor);
    }
    for method in &surface.methods {
        if let Some(fragment) = builder.method(method) {
            class = class.with_method(fragment);
        }
    }

    let source = class.render().map_err(|source| MockError::InvalidFragment {
        target: target.clone(),
        source,
    })?;
    Ok(MockSource {
        class_name: class.qualified_name(),
        target,
        mode,
        source,
    })
}

struct MethodBuilder<'a> {
    target: &'a str,
    kind: TypeKind,
    mode: MockMode,
}

impl MethodBuilder<'_> {
    fn target_literal(&self) -> String {
        php_string(self.target)
    }

    /// `None` when the target's constructor is final and cannot be replaced.
    fn constructor(&self, surface: &TypeSurface) -> Option<MethodFragment> {
        let declared = surface.method("__construct");
        if declared.is_some_and(|m| m.signature.is_final) {
            return None;
        }
        let mut fragment = MethodFragment::new("__construct")
            .with_statement(format!("self::$lensAgent?->register($this, {});", self.target_literal()));
        // Abstract and interface constructors are the only ones PHP checks for compatibility.
        if let Some(method) = declared.filter(|m| m.signature.is_abstract || self.kind == TypeKind::Interface) {
            fragment = fragment.with_params(method.signature.signature.params.iter().map(ParameterFragment::from_param));
        }
        Some(fragment)
    }

    fn method(&self, method: &SurfaceMethod) -> Option<MethodFragment> {
        let sig = &method.signature;
        let name = method.name.as_str();
        // Interface methods are abstract whether or not the declaration says so.
        let is_abstract = sig.is_abstract || self.kind == TypeKind::Interface;
        if name.eq_ignore_ascii_case("__construct") || sig.is_final || sig.visibility == Visibility::Private {
            return None;
        }
        if sig.visibility != Visibility::Public && !is_abstract {
            return None;
        }
        if sig.is_static && !is_abstract {
            return None;
        }

        let fragment = MethodFragment::new(name)
            .with_visibility(sig.visibility)
            .with_static(sig.is_static)
            .with_by_ref(sig.signature.by_ref)
            .with_params(sig.signature.params.iter().map(ParameterFragment::from_param))
            .with_return_type(sig.signature.return_type.clone());

        if sig.is_static {
            let message = php_string(&format!("{}::{}() is static and cannot be scripted", self.target, name));
            return Some(fragment.with_statement(format!("throw new \\Lens\\Runtime\\ProtocolViolation({message});")));
        }
        if name.eq_ignore_ascii_case("__destruct") {
            return Some(fragment);
        }

        let call = match self.mode {
            MockMode::Replay => format!(
                "self::$lensAgent->replay($this, {}, __FUNCTION__, func_get_args())",
                self.target_literal()
            ),
            MockMode::Record => format!(
                "self::$lensAgent->record($this, {}, __FUNCTION__, func_get_args(), {})",
                self.target_literal(),
                placeholder(sig.signature.return_type.as_deref(), self.target)
            ),
        };
        let returns = sig.signature.return_type.as_deref().map(str::trim);
        let fragment = match returns {
            Some(t) if t.eq_ignore_ascii_case("void") || t.eq_ignore_ascii_case("never") => {
                fragment.with_statement(format!("{call};"))
            }
            _ if sig.signature.by_ref => fragment
                .with_statement(format!("$result = {call};"))
                .with_statement("return $result;"),
            _ => fragment.with_statement(format!("return {call};")),
        };
        Some(fragment)
    }
}

/// A record-mode return value that satisfies `return_type` where one exists.
fn placeholder(return_type: Option<&str>, target: &str) -> String {
    let Some(return_type) = return_type.map(str::trim) else {
        return "null".to_string();
    };
    if return_type.starts_with('?') {
        return "null".to_string();
    }
    let members: Vec<&str> = return_type.split('|').map(str::trim).collect();
    if members
        .iter()
        .any(|m| m.eq_ignore_ascii_case("null") || m.eq_ignore_ascii_case("mixed"))
    {
        return "null".to_string();
    }
    let first = members[0].trim_start_matches('(');
    let first = first.split('&').next().unwrap_or(first).trim_end_matches(')');
    let literal = match first.to_ascii_lowercase().as_str() {
        "int" => "0",
        "float" => "0.0",
        "string" => "''",
        "bool" | "false" => "false",
        "true" => "true",
        "array" | "iterable" => "[]",
        "static" | "self" | "object" => "$this",
        _ if first.trim_start_matches('\\').eq_ignore_ascii_case(target) => "$this",
        _ => "null",
    };
    literal.to_string()
}
