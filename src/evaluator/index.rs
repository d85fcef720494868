//! Structural index of the project under test.
//!
//! Every `*.php` file below the source root is parsed once. The index answers three questions for
//! the evaluator: where a type or function is declared, which symbols a case depends on
//! (transitively), and what a project type's mockable surface looks like.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lens_syntax::ast::{Node, NodeKind};
use lens_syntax::parser::{self, References};
use tracing::{debug, warn};

use crate::backend::{SurfaceCache, SurfaceError, SurfaceProvider, TypeKind, TypeSurface};

/// Find `*.php` files below `path`, sorted. Hidden directories, `vendor` and `node_modules` are skipped.
pub fn discover_php_files(path: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if path.is_file() {
        if is_php(path) {
            files.push(path.to_path_buf());
        }
    } else if path.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                let entry_path = entry.path();
                if entry_path.is_dir() {
                    let name = entry_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                    if !name.starts_with('.') && name != "vendor" && name != "node_modules" {
                        files.extend(discover_php_files(&entry_path));
                    }
                } else if is_php(&entry_path) {
                    files.push(entry_path);
                }
            }
        }
    }

    files.sort();
    files
}

fn is_php(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("php"))
}

/// One parsed project file.
#[derive(Debug, Clone)]
pub struct IndexedFile {
    pub path: PathBuf,
    pub source: String,
    /// Namespace nodes.
    pub units: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
struct Address {
    file: usize,
    unit: usize,
    child: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectIndex {
    files: Vec<IndexedFile>,
    /// Lowercased fully qualified name → declaration; the first declaration wins.
    types: BTreeMap<String, Address>,
    functions: BTreeMap<String, Address>,
}

impl ProjectIndex {
    /// Parse every PHP file below `source_root`.
    ///
    /// ## Errors
    /// When the root does not exist or a file cannot be read.
    pub fn load(source_root: &Path) -> io::Result<Self> {
        let root = fs::canonicalize(source_root)?;
        let mut sources = Vec::new();
        for path in discover_php_files(&root) {
            let source = fs::read_to_string(&path)?;
            sources.push((path, source));
        }
        Ok(Self::from_sources(sources))
    }

    pub fn from_sources(sources: impl IntoIterator<Item = (PathBuf, String)>) -> Self {
        let mut index = Self::default();
        for (path, source) in sources {
            let units = parser::parse_unit(&source);
            index.add(IndexedFile { path, source, units });
        }
        index
    }

    fn add(&mut self, file: IndexedFile) {
        let file_index = self.files.len();
        for (unit_index, unit) in file.units.iter().enumerate() {
            for (child_index, child) in unit.children.iter().enumerate() {
                let table = match child.kind {
                    NodeKind::Function(_) => &mut self.functions,
                    _ if child.is_type() => &mut self.types,
                    _ => continue,
                };
                let address = Address {
                    file: file_index,
                    unit: unit_index,
                    child: child_index,
                };
                let key = child.name.to_ascii_lowercase();
                if table.contains_key(&key) {
                    debug!(name = %child.name, file = %file.path.display(), "duplicate declaration ignored");
                } else {
                    table.insert(key, address);
                }
            }
        }
        self.files.push(file);
    }

    pub fn files(&self) -> &[IndexedFile] {
        &self.files
    }

    fn node(&self, address: Address) -> &Node {
        &self.files[address.file].units[address.unit].children[address.child]
    }

    fn namespace(&self, address: Address) -> &str {
        &self.files[address.file].units[address.unit].name
    }

    /// A class, interface or trait by fully qualified name (case-insensitive).
    pub fn find_type(&self, name: &str) -> Option<&Node> {
        self.types.get(&key(name)).map(|address| self.node(*address))
    }

    /// A function as PHP would resolve a call to `name` from `namespace`: the namespaced
    /// candidate first, then the global one.
    pub fn find_function(&self, name: &str, namespace: &str) -> Option<&Node> {
        self.function_address(name, namespace).map(|address| self.node(address))
    }

    fn function_address(&self, name: &str, namespace: &str) -> Option<Address> {
        let name = name.trim_start_matches('\\');
        if !namespace.is_empty() && !name.contains('\\') {
            let candidate = format!("{namespace}\\{name}");
            if let Some(address) = self.functions.get(&key(&candidate)) {
                return Some(*address);
            }
        }
        self.functions.get(&key(name)).copied()
    }

    /// Every symbol reachable from `refs`, following project declarations transitively.
    ///
    /// Names with no project declaration (vendor or built-in symbols) are kept but not expanded.
    /// Functions found in the project are reported by their declared name.
    pub fn dependencies(&self, refs: &References, namespace: &str) -> References {
        let mut found = References::default();
        let mut types: Vec<String> = refs.types.iter().cloned().collect();
        let mut functions: Vec<(String, String)> =
            refs.functions.iter().map(|f| (f.clone(), namespace.to_string())).collect();
        let mut seen_functions = BTreeSet::new();

        while !types.is_empty() || !functions.is_empty() {
            while let Some(name) = types.pop() {
                if found.types.iter().any(|t| t.eq_ignore_ascii_case(&name)) {
                    continue;
                }
                found.types.insert(name.clone());
                if let Some(address) = self.types.get(&key(&name)) {
                    self.expand(*address, &mut types, &mut functions);
                }
            }
            while let Some((name, from)) = functions.pop() {
                if !seen_functions.insert((key(&name), key(&from))) {
                    continue;
                }
                match self.function_address(&name, &from) {
                    Some(address) => {
                        if found.functions.insert(self.node(address).name.clone()) {
                            self.expand(address, &mut types, &mut functions);
                        }
                    }
                    None => {
                        found.functions.insert(name);
                    }
                }
            }
        }
        found
    }

    fn expand(&self, address: Address, types: &mut Vec<String>, functions: &mut Vec<(String, String)>) {
        let namespace = self.namespace(address);
        self.node(address).walk(&mut |node| {
            types.extend(node.types.iter().cloned());
            functions.extend(node.functions.iter().map(|f| (f.clone(), namespace.to_string())));
        });
    }

    /// Tag a project type; returns `false` when the type is not declared in the project.
    pub fn tag_type(&mut self, name: &str, tag: &str) -> bool {
        let Some(address) = self.types.get(&key(name)).copied() else {
            return false;
        };
        self.files[address.file].units[address.unit].children[address.child]
            .tags
            .set(tag);
        true
    }

    /// Ancestors of `type_name`, followed through project types, that the project does not declare.
    ///
    /// A type the project does not declare at all is its own only entry. These are the names a
    /// [`SurfaceProvider`] outside the index has to answer for before the type can be mocked.
    pub fn external_types(&self, type_name: &str) -> Vec<String> {
        let Some(node) = self.find_type(type_name) else {
            return vec![type_name.trim_start_matches('\\').to_string()];
        };
        let mut external = Vec::new();
        self.collect_external(node, &mut BTreeSet::new(), &mut external);
        external
    }

    fn collect_external(&self, node: &Node, visited: &mut BTreeSet<String>, external: &mut Vec<String>) {
        if !visited.insert(key(&node.name)) {
            return;
        }
        for ancestor in ancestors(node) {
            match self.find_type(ancestor) {
                Some(parent) => self.collect_external(parent, visited, external),
                None => {
                    let name = ancestor.trim_start_matches('\\');
                    if !external.iter().any(|e| e.eq_ignore_ascii_case(name)) {
                        external.push(name.to_string());
                    }
                }
            }
        }
    }

    /// Surfaces of project types, with ancestors outside the project looked up in `external`.
    pub fn with_external<E: SurfaceProvider>(&self, external: E) -> ProjectSurfaces<'_, E> {
        ProjectSurfaces { index: self, external }
    }

    fn surface_with(&self, type_name: &str, external: &dyn SurfaceProvider) -> Result<TypeSurface, SurfaceError> {
        let unknown = || SurfaceError::Unknown(type_name.trim_start_matches('\\').to_string());
        let node = self.find_type(type_name).ok_or_else(unknown)?;
        let mut surface = match &node.kind {
            NodeKind::Class(info) => {
                let mut surface = TypeSurface::new(&node.name, TypeKind::Class).with_final(info.is_final);
                surface.is_abstract = info.is_abstract;
                surface
            }
            NodeKind::Interface { .. } => TypeSurface::new(&node.name, TypeKind::Interface),
            NodeKind::Trait { .. } => TypeSurface::new(&node.name, TypeKind::Trait),
            _ => return Err(unknown()),
        };
        self.collect_methods(node, &mut surface, &mut BTreeSet::new(), external);
        Ok(surface)
    }

    fn collect_methods(
        &self,
        node: &Node,
        surface: &mut TypeSurface,
        visited: &mut BTreeSet<String>,
        external: &dyn SurfaceProvider,
    ) {
        if !visited.insert(key(&node.name)) {
            return;
        }
        let is_interface = matches!(node.kind, NodeKind::Interface { .. });
        for (method, signature) in node.methods() {
            let mut signature = signature.clone();
            // Interface members are abstract whether or not they say so.
            signature.is_abstract |= is_interface;
            surface.add_method(method.name.clone(), signature);
        }

        for ancestor in ancestors(node) {
            match self.find_type(ancestor) {
                Some(parent) => self.collect_methods(parent, surface, visited, external),
                None => {
                    if !visited.insert(key(ancestor)) {
                        continue;
                    }
                    // Already flattened: PHP reflection lists inherited methods too.
                    match external.surface(ancestor) {
                        Ok(inherited) => {
                            for method in inherited.methods {
                                surface.add_method(method.name, method.signature);
                            }
                        }
                        Err(error) => warn!(
                            type_name = %node.name,
                            ancestor = %ancestor,
                            %error,
                            "methods inherited from outside the project are not mocked"
                        ),
                    }
                }
            }
        }
    }
}

/// Own methods come first, then traits, then the parent chain, then interfaces.
fn ancestors(node: &Node) -> Vec<&String> {
    match &node.kind {
        NodeKind::Class(info) => info
            .traits
            .iter()
            .chain(&info.parent)
            .chain(&info.interfaces)
            .collect(),
        NodeKind::Interface { extends } => extends.iter().collect(),
        NodeKind::Trait { uses } => uses.iter().collect(),
        _ => Vec::new(),
    }
}

fn key(name: &str) -> String {
    name.trim_start_matches('\\').to_ascii_lowercase()
}

/// Project-only surfaces; ancestors outside the project contribute nothing.
impl SurfaceProvider for ProjectIndex {
    fn surface(&self, type_name: &str) -> Result<TypeSurface, SurfaceError> {
        self.surface_with(type_name, &SurfaceCache::new())
    }
}

/// A [`ProjectIndex`] backed by another provider for everything the project does not declare.
#[derive(Debug, Clone)]
pub struct ProjectSurfaces<'a, E> {
    index: &'a ProjectIndex,
    external: E,
}

impl<E: SurfaceProvider> SurfaceProvider for ProjectSurfaces<'_, E> {
    fn surface(&self, type_name: &str) -> Result<TypeSurface, SurfaceError> {
        if self.index.find_type(type_name).is_some() {
            return self.index.surface_with(type_name, &self.external);
        }
        debug!(type_name, "type not declared in the project, using reflection");
        self.external.surface(type_name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{MockMode, build_for};
    use lens_syntax::ast::{MethodSignature, Signature, Visibility};

    fn index() -> ProjectIndex {
        ProjectIndex::from_sources([
            (
                PathBuf::from("/app/src/Io/Disk.php"),
                "<?php\nnamespace App\\Io;\n\nuse App\\Util\\Paths;\n\nclass Disk extends Store implements Readable\n{\n    use Logs;\n\n    public function read(string $path): string\n    {\n        return file_get_contents(Paths::join($path));\n    }\n}\n"
                    .to_string(),
            ),
            (
                PathBuf::from("/app/src/Io/Store.php"),
                "<?php\nnamespace App\\Io;\n\nabstract class Store\n{\n    public function read(string $path): string { return ''; }\n    abstract protected function flush(): void;\n    public function size(): int { return 0; }\n}\n\ninterface Readable\n{\n    public function read(string $path): string;\n    public function exists(string $path): bool;\n}\n\ntrait Logs\n{\n    public function log(string $message): void { error_log($message); }\n}\n"
                    .to_string(),
            ),
            (
                PathBuf::from("/app/src/Util/Paths.php"),
                "<?php\nnamespace App\\Util;\n\nfinal class Paths\n{\n    public static function join(string $path): string { return normalize($path); }\n}\n\nfunction normalize(string $path): string { return trim($path, '/'); }\n"
                    .to_string(),
            ),
        ])
    }

    #[test]
    fn test_find_type_is_case_insensitive() {
        let index = index();
        assert_eq!(index.find_type("\\app\\io\\DISK").unwrap().name, "App\\Io\\Disk");
        assert!(index.find_type("App\\Io\\Missing").is_none());
    }

    #[test]
    fn test_find_function_falls_back_to_global() {
        let index = index();
        assert_eq!(index.find_function("normalize", "App\\Util").unwrap().name, "App\\Util\\normalize");
        assert!(index.find_function("normalize", "App\\Io").is_none());
        assert_eq!(index.find_function("App\\Util\\normalize", "").unwrap().name, "App\\Util\\normalize");
    }

    #[test]
    fn test_dependencies_are_transitive() {
        let index = index();
        let mut refs = References::default();
        refs.types.insert("App\\Io\\Disk".to_string());
        let deps = index.dependencies(&refs, "App");
        for name in ["App\\Io\\Disk", "App\\Io\\Store", "App\\Io\\Readable", "App\\Io\\Logs", "App\\Util\\Paths"] {
            assert!(deps.types.contains(name), "missing {name}: {deps:?}");
        }
        assert!(deps.functions.contains("App\\Util\\normalize"), "{deps:?}");
        assert!(deps.functions.contains("file_get_contents"), "{deps:?}");
    }

    #[test]
    fn test_surface_includes_inherited_methods() {
        let surface = index().surface("App\\Io\\Disk").unwrap();
        assert_eq!(surface.kind, TypeKind::Class);
        let names: Vec<&str> = surface.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["read", "log", "flush", "size", "exists"]);

        let flush = surface.method("flush").unwrap();
        assert!(flush.signature.is_abstract);
        assert_eq!(flush.signature.visibility, Visibility::Protected);
        assert!(surface.method("exists").unwrap().signature.is_abstract);
        assert!(!surface.method("read").unwrap().signature.is_abstract);
    }

    #[test]
    fn test_interface_and_final_surfaces() {
        let index = index();
        let readable = index.surface("App\\Io\\Readable").unwrap();
        assert_eq!(readable.kind, TypeKind::Interface);
        assert!(readable.methods.iter().all(|m| m.signature.is_abstract));
        assert!(index.surface("App\\Util\\Paths").unwrap().is_final);
        assert!(matches!(index.surface("App\\Nope"), Err(SurfaceError::Unknown(name)) if name == "App\\Nope"));
    }

    fn vendor_method() -> MethodSignature {
        MethodSignature {
            visibility: Visibility::Public,
            is_static: false,
            is_final: false,
            is_abstract: false,
            signature: Signature::default(),
        }
    }

    #[test]
    fn test_ancestors_outside_the_project_come_from_the_external_provider() {
        let index = ProjectIndex::from_sources([(
            PathBuf::from("/app/src/Repo.php"),
            "<?php\nnamespace App;\n\nclass Repo extends \\Vendor\\Base implements \\Countable\n{\n    public function find(): array { return []; }\n}\n"
                .to_string(),
        )]);
        assert_eq!(index.external_types("App\\Repo"), ["Vendor\\Base", "Countable"]);
        assert_eq!(index.external_types("\\Vendor\\Base"), ["Vendor\\Base"]);

        let mut external = SurfaceCache::new();
        external.insert(
            "Vendor\\Base",
            Ok(TypeSurface::new("Vendor\\Base", TypeKind::Class)
                .with_method("connect", vendor_method())
                .with_method("find", vendor_method())),
        );
        let surfaces = index.with_external(&external);
        let surface = surfaces.surface("App\\Repo").unwrap();
        let names: Vec<&str> = surface.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["find", "connect"]);
        assert_eq!(surfaces.surface("Vendor\\Base").unwrap().name, "Vendor\\Base");

        let mock = build_for(&surfaces, "App\\Repo", MockMode::Replay).unwrap();
        assert!(mock.source.contains("function connect("), "{}", mock.source);

        // Without the external provider only the project's own methods are known.
        let names: Vec<String> = index.surface("App\\Repo").unwrap().methods.into_iter().map(|m| m.name).collect();
        assert_eq!(names, ["find"]);
    }

    #[test]
    fn test_tag_type() {
        let mut index = index();
        assert!(index.tag_type("App\\Io\\Disk", "requires-mock"));
        assert!(!index.tag_type("Vendor\\Thing", "requires-mock"));
        assert!(index.find_type("App\\Io\\Disk").unwrap().tags.has("requires-mock"));
    }

    #[test]
    fn test_load_discovers_sorted_php_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::create_dir_all(dir.path().join("vendor")).unwrap();
        fs::write(dir.path().join("b/Two.php"), "<?php\nclass Two {}\n").unwrap();
        fs::write(dir.path().join("One.php"), "<?php\nclass One {}\n").unwrap();
        fs::write(dir.path().join("vendor/Skip.php"), "<?php\nclass Skip {}\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "class Nope {}").unwrap();

        let index = ProjectIndex::load(dir.path()).unwrap();
        let names: Vec<String> = index
            .files()
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["One.php", "Two.php"]);
        assert!(index.find_type("Two").is_some());
        assert!(index.find_type("Skip").is_none());
    }
}
