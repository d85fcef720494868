//! Public surfaces of mockable types.
//!
//! A [`TypeSurface`] is everything the mock builder needs to know about a class or interface: its
//! kind, whether it can be extended, and the methods a subclass would have to override. Surfaces
//! come from a [`SurfaceProvider`]; the evaluator's project index is one, and a [`SurfaceCache`]
//! filled by [`ReflectionProvider`] (which asks PHP itself) is another.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use lens_syntax::ast::{MethodSignature, Param, Signature, Visibility};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Interface,
    Trait,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurfaceMethod {
    pub name: String,
    pub signature: MethodSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSurface {
    /// Fully qualified, without a leading `\`.
    pub name: String,
    pub kind: TypeKind,
    pub is_final: bool,
    pub is_abstract: bool,
    /// Own methods first, then inherited ones not overridden along the way.
    pub methods: Vec<SurfaceMethod>,
}

impl TypeSurface {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into().trim_start_matches('\\').to_string(),
            kind,
            is_final: false,
            is_abstract: kind == TypeKind::Interface,
            methods: Vec::new(),
        }
    }

    pub fn with_final(mut self, is_final: bool) -> Self {
        self.is_final = is_final;
        self
    }

    pub fn with_method(mut self, name: impl Into<String>, signature: MethodSignature) -> Self {
        self.add_method(name, signature);
        self
    }

    /// Method names are case-insensitive in PHP.
    pub fn method(&self, name: &str) -> Option<&SurfaceMethod> {
        self.methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Add a method unless one with the same name is already present; returns whether it was added.
    pub fn add_method(&mut self, name: impl Into<String>, signature: MethodSignature) -> bool {
        let name = name.into();
        if self.method(&name).is_some() {
            return false;
        }
        self.methods.push(SurfaceMethod { name, signature });
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("unknown type `{0}`")]
    Unknown(String),

    #[error("could not reflect `{type_name}`: {message}")]
    Reflection { type_name: String, message: String },
}

/// Where type surfaces come from.
pub trait SurfaceProvider {
    fn surface(&self, type_name: &str) -> Result<TypeSurface, SurfaceError>;
}

impl<P: SurfaceProvider + ?Sized> SurfaceProvider for &P {
    fn surface(&self, type_name: &str) -> Result<TypeSurface, SurfaceError> {
        (**self).surface(type_name)
    }
}

/// Surfaces looked up ahead of time, keyed by case-insensitive type name.
///
/// Lookups stay synchronous for the mock builder; [`ReflectionProvider::resolve`] fills the cache
/// beforehand. Failed lookups are kept too, so a type is asked about at most once.
#[derive(Debug, Clone, Default)]
pub struct SurfaceCache {
    entries: BTreeMap<String, Result<TypeSurface, SurfaceError>>,
}

impl SurfaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(type_name: &str) -> String {
        type_name.trim_start_matches('\\').to_ascii_lowercase()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(&Self::key(type_name))
    }

    pub fn insert(&mut self, type_name: &str, outcome: Result<TypeSurface, SurfaceError>) {
        self.entries.insert(Self::key(type_name), outcome);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SurfaceProvider for SurfaceCache {
    fn surface(&self, type_name: &str) -> Result<TypeSurface, SurfaceError> {
        self.entries
            .get(&Self::key(type_name))
            .cloned()
            .unwrap_or_else(|| Err(SurfaceError::Unknown(type_name.trim_start_matches('\\').to_string())))
    }
}

// ============================================================================
// Reflection
// ============================================================================

/// Prints the surface of `$argv[1]` as JSON, after requiring the autoloader in `$argv[2]`.
const REFLECT_PHP: &str = r#"
$type = $argv[1];
$autoload = $argv[2] ?? '';
if ($autoload !== '') {
    require $autoload;
}
if (!class_exists($type) && !interface_exists($type) && !trait_exists($type)) {
    echo json_encode(['error' => "unknown type {$type}"]);
    exit(0);
}
$class = new ReflectionClass($type);
$qualify = function (string $name, ReflectionClass $declaring): string {
    $lower = strtolower($name);
    if ($lower === 'self') {
        return '\\' . $declaring->getName();
    }
    if ($lower === 'parent') {
        $parent = $declaring->getParentClass();
        return $parent === false ? 'parent' : '\\' . $parent->getName();
    }
    return $name;
};
$render = function (?ReflectionType $type, ReflectionClass $declaring) use (&$render, $qualify): ?string {
    if ($type === null) {
        return null;
    }
    if ($type instanceof ReflectionUnionType) {
        $members = array_map(function ($member) use ($render, $declaring) {
            $text = $render($member, $declaring);
            return $member instanceof ReflectionIntersectionType ? "({$text})" : $text;
        }, $type->getTypes());
        return implode('|', $members);
    }
    if ($type instanceof ReflectionIntersectionType) {
        return implode('&', array_map(fn ($member) => $render($member, $declaring), $type->getTypes()));
    }
    $name = $type->getName();
    $lower = strtolower($name);
    if ($lower === 'self' || $lower === 'parent') {
        $name = $qualify($name, $declaring);
    } elseif ($lower !== 'static' && !$type->isBuiltin()) {
        $name = '\\' . $name;
    }
    $nullable = $type->allowsNull() && $lower !== 'mixed' && $lower !== 'null';
    return $nullable ? "?{$name}" : $name;
};
$methods = [];
foreach ($class->getMethods() as $method) {
    $declaring = $method->getDeclaringClass();
    $params = [];
    foreach ($method->getParameters() as $param) {
        $default = null;
        if ($param->isDefaultValueAvailable()) {
            if ($param->isDefaultValueConstant()) {
                $constant = $param->getDefaultValueConstantName();
                $parts = explode('::', $constant, 2);
                $default = count($parts) === 2
                    ? ltrim($qualify($parts[0], $declaring), '\\') . '::' . $parts[1]
                    : $constant;
                $default = '\\' . ltrim($default, '\\');
            } else {
                $default = var_export($param->getDefaultValue(), true);
            }
        } elseif ($param->isOptional() && !$param->isVariadic()) {
            $default = 'null';
        }
        $params[] = [
            'name' => $param->getName(),
            'type_hint' => $render($param->getType(), $declaring),
            'by_ref' => $param->isPassedByReference(),
            'variadic' => $param->isVariadic(),
            'default' => $default,
        ];
    }
    $returnType = $method->getReturnType();
    if ($returnType === null && method_exists($method, 'getTentativeReturnType')) {
        $returnType = $method->getTentativeReturnType();
    }
    $methods[] = [
        'name' => $method->getName(),
        'visibility' => $method->isPublic() ? 'public' : ($method->isProtected() ? 'protected' : 'private'),
        'is_static' => $method->isStatic(),
        'is_final' => $method->isFinal(),
        'is_abstract' => $method->isAbstract(),
        'by_ref' => $method->returnsReference(),
        'params' => $params,
        'return_type' => $render($returnType, $declaring),
    ];
}
echo json_encode([
    'name' => $class->getName(),
    'kind' => $class->isInterface() ? 'interface' : ($class->isTrait() ? 'trait' : 'class'),
    'is_final' => $class->isFinal(),
    'is_abstract' => $class->isAbstract(),
    'methods' => $methods,
]);
"#;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reflected {
    Missing { error: String },
    Found(ReflectedType),
}

#[derive(Debug, Deserialize)]
struct ReflectedType {
    name: String,
    kind: TypeKind,
    is_final: bool,
    is_abstract: bool,
    methods: Vec<ReflectedMethod>,
}

#[derive(Debug, Deserialize)]
struct ReflectedMethod {
    name: String,
    visibility: String,
    is_static: bool,
    is_final: bool,
    is_abstract: bool,
    by_ref: bool,
    params: Vec<ReflectedParam>,
    return_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReflectedParam {
    name: String,
    type_hint: Option<String>,
    by_ref: bool,
    variadic: bool,
    default: Option<String>,
}

impl From<ReflectedType> for TypeSurface {
    fn from(reflected: ReflectedType) -> Self {
        let mut surface = TypeSurface::new(reflected.name, reflected.kind).with_final(reflected.is_final);
        surface.is_abstract = reflected.is_abstract;
        for method in reflected.methods {
            let visibility = match method.visibility.as_str() {
                "protected" => Visibility::Protected,
                "private" => Visibility::Private,
                _ => Visibility::Public,
            };
            let params = method
                .params
                .into_iter()
                .map(|p| Param {
                    name: p.name,
                    type_hint: p.type_hint,
                    by_ref: p.by_ref,
                    variadic: p.variadic,
                    default: p.default,
                })
                .collect();
            let signature = MethodSignature {
                visibility,
                is_static: method.is_static,
                is_final: method.is_final,
                is_abstract: method.is_abstract,
                signature: Signature {
                    by_ref: method.by_ref,
                    params,
                    return_type: method.return_type,
                },
            };
            surface.add_method(method.name, signature);
        }
        surface
    }
}

/// Default wall-clock limit for one reflection process.
pub const DEFAULT_REFLECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Surfaces read from the PHP interpreter with `ReflectionClass`.
///
/// ## Notes
/// - Used for vendor and built-in types the project index cannot see.
/// - Runs one short-lived `php -r` process per type, from `working_dir`, killed when it outlives
///   the timeout or when the lookup is dropped.
#[derive(Debug, Clone)]
pub struct ReflectionProvider {
    php: PathBuf,
    autoload: Option<PathBuf>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl ReflectionProvider {
    pub fn new(php: impl Into<PathBuf>, autoload: Option<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            php: php.into(),
            autoload,
            working_dir: working_dir.into(),
            timeout: DEFAULT_REFLECTION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reflect `type_name` in a fresh interpreter.
    ///
    /// ## Errors
    /// - [`SurfaceError::Unknown`] when PHP cannot load the type.
    /// - [`SurfaceError::Reflection`] when the interpreter fails, times out or prints garbage.
    pub async fn reflect(&self, type_name: &str) -> Result<TypeSurface, SurfaceError> {
        let type_name = type_name.trim_start_matches('\\');
        let failed = |message: String| SurfaceError::Reflection {
            type_name: type_name.to_string(),
            message,
        };
        let autoload = self
            .autoload
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut command = Command::new(&self.php);
        command
            .arg("-r")
            .arg(REFLECT_PHP)
            .arg("--")
            .arg(type_name)
            .arg(autoload)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = command
            .spawn()
            .map_err(|e| failed(format!("failed to run {}: {e}", self.php.display())))?;

        let output = match time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(failed(e.to_string())),
            Err(_) => return Err(failed(format!("timed out after {}s", self.timeout.as_secs_f64()))),
        };
        if !output.status.success() {
            return Err(failed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Self::decode(type_name, &output.stdout)
    }

    /// Reflect every type in `type_names` that `cache` has no answer for yet.
    pub async fn resolve(&self, type_names: &[String], cache: &mut SurfaceCache) {
        for type_name in type_names {
            if cache.contains(type_name) {
                continue;
            }
            let outcome = self.reflect(type_name).await;
            if let Err(SurfaceError::Reflection { message, .. }) = &outcome {
                warn!(type_name = %type_name, message = %message, "reflection failed");
            }
            cache.insert(type_name, outcome);
        }
    }

    /// Decode the JSON printed by the reflection script.
    fn decode(type_name: &str, stdout: &[u8]) -> Result<TypeSurface, SurfaceError> {
        let reflected: Reflected = serde_json::from_slice(stdout).map_err(|e| SurfaceError::Reflection {
            type_name: type_name.to_string(),
            message: format!("unreadable reflection output: {e}"),
        })?;
        match reflected {
            Reflected::Missing { error } => {
                debug!(type_name, error, "reflection found no such type");
                Err(SurfaceError::Unknown(type_name.to_string()))
            }
            Reflected::Found(found) => Ok(found.into()),
        }
    }
}
