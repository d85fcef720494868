//! Harness assembly.
//!
//! Every case runs as two generated files in its own cache directory:
//!
//! - `harness.php`: the autoload bootstrap, the agent runtime, one mock class per scripted type and
//!   a capture call that runs the subject and prints the report after [`SENTINEL`].
//! - `subject.php`: the case's code under its original namespace and imports, with every mocked
//!   type pointed at its mock class.
//!
//! ## Notes
//! - All of `harness.php` uses braced namespace blocks, since it mixes several namespaces.
//! - Only names in the subject itself are re-aliased. Project code that builds its own instances
//!   of a mocked type still gets the real class.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lens_syntax::ast::{Context, UseImport, UseKind, last_segment, namespace_of};
use lens_syntax::lexer::{self, Keyword, TokenKind};
use lens_syntax::spec::{CallRecord, Case, Fixture};

use super::agent::{Identity, Strictness};
use super::mock::{MOCK_NAMESPACE, MockMode, MockSource};
use super::writer::{BraceStyle, PhpWriter, php_string};

/// Line printed right before the JSON report.
pub const SENTINEL: &str = "@@lens-report@@";

pub const HARNESS_FILE: &str = "harness.php";
pub const SUBJECT_FILE: &str = "subject.php";

/// `Lens\Runtime\{ProtocolViolation, Agent, Capture}`.
const RUNTIME: &str = include_str!("runtime.php");

/// Everything a harness needs besides the case itself.
#[derive(Debug, Clone)]
pub struct HarnessPlan {
    pub autoload: Option<PathBuf>,
    pub mode: MockMode,
    pub mocks: Vec<MockSource>,
    /// Scripts for replay mode; ignored when recording.
    pub fixtures: Vec<Fixture>,
    pub strictness: Strictness,
    pub coverage: bool,
}

/// The two generated files of one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessFiles {
    pub harness: String,
    pub subject: String,
}

impl HarnessFiles {
    /// Write both files into `dir`, creating it if needed. Returns the harness path.
    pub fn write(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let harness = dir.join(HARNESS_FILE);
        fs::write(&harness, &self.harness)?;
        fs::write(dir.join(SUBJECT_FILE), &self.subject)?;
        Ok(harness)
    }
}

/// Group fixtures by the instance they script: the n-th fixture of a type is `Type#n`.
pub fn scripts(fixtures: &[Fixture]) -> BTreeMap<String, Vec<&CallRecord>> {
    let mut ordinals: BTreeMap<&str, usize> = BTreeMap::new();
    let mut scripts = BTreeMap::new();
    for fixture in fixtures {
        let ordinal = ordinals.entry(fixture.target.as_str()).or_default();
        let identity = Identity::new(fixture.target.as_str(), *ordinal);
        *ordinal += 1;
        scripts.insert(identity.to_string(), fixture.calls.iter().collect());
    }
    scripts
}

/// Generate `harness.php` and `subject.php` for `case`.
///
/// ## Errors
/// Only if the scripts cannot be encoded as JSON.
pub fn assemble(case: &Case, plan: &HarnessPlan) -> Result<HarnessFiles, serde_json::Error> {
    let scripts = match plan.mode {
        MockMode::Replay => serde_json::to_string(&scripts(&plan.fixtures))?,
        MockMode::Record => "{}".to_string(),
    };
    let targets: Vec<&str> = plan.mocks.iter().map(|m| m.target.as_str()).collect();

    let mut w = PhpWriter::default();
    w.writeln("<?php");
    w.newline();
    if let Some(autoload) = &plan.autoload {
        w.block("namespace", BraceStyle::SameLine, |w| {
            w.writeln(&format!("require_once {};", php_string(&autoload.to_string_lossy())));
        });
        w.newline();
    }
    w.write_lines(runtime_body());
    for mock in &plan.mocks {
        w.newline();
        w.write_lines(&mock.source);
    }
    w.newline();
    w.block("namespace", BraceStyle::SameLine, |w| {
        let classes: Vec<String> = plan.mocks.iter().map(|m| php_string(&m.class_name)).collect();
        w.writeln(&format!(
            "$lensAgent = new \\Lens\\Runtime\\Agent({}, json_decode({}, true), {});",
            plan.mode == MockMode::Replay,
            php_string(&scripts),
            plan.strictness == Strictness::Arguments,
        ));
        w.writeln(&format!(
            "\\Lens\\Runtime\\Capture::run($lensAgent, [{}], __DIR__ . {}, {}, {});",
            classes.join(", "),
            php_string(&format!("/{SUBJECT_FILE}")),
            plan.coverage,
            php_string(SENTINEL),
        ));
    });

    Ok(HarnessFiles {
        harness: w.finish(),
        subject: subject_source(case, &targets),
    })
}

fn runtime_body() -> &'static str {
    let runtime = RUNTIME.trim_start();
    runtime.strip_prefix("<?php").unwrap_or(runtime).trim()
}

/// The subject file: original namespace and imports, mocked types re-aliased to their mocks.
pub fn subject_source(case: &Case, mocked: &[&str]) -> String {
    let context = &case.context;
    let is_mocked = |name: &str| mocked.iter().any(|m| m.eq_ignore_ascii_case(name));

    let mut w = PhpWriter::default();
    w.writeln("<?php");
    w.newline();
    if !context.namespace.is_empty() {
        w.writeln(&format!("namespace {};", context.namespace));
        w.newline();
    }

    let mut imports: Vec<String> = Vec::new();
    for import in &context.uses {
        if import.kind == UseKind::Class && is_mocked(&import.path) {
            imports.push(mock_import(&import.path, &import.alias));
        } else {
            imports.push(use_statement(import));
        }
    }
    // Same-namespace targets are reachable without an import; shadow them with one.
    for target in mocked {
        let short = last_segment(target);
        let shadowed = context
            .uses
            .iter()
            .any(|u| u.kind == UseKind::Class && u.alias.eq_ignore_ascii_case(short));
        if !shadowed && namespace_of(target).eq_ignore_ascii_case(&context.namespace) {
            imports.push(mock_import(target, short));
        }
    }
    for import in &imports {
        w.writeln(import);
    }
    if !imports.is_empty() {
        w.newline();
    }

    w.write(&rewrite_qualified_names(&case.subject, context, &is_mocked));
    let mut source = w.finish();
    if !source.ends_with('\n') {
        source.push('\n');
    }
    source
}

fn mock_path(target: &str) -> String {
    format!("{MOCK_NAMESPACE}\\{}", target.trim_start_matches('\\'))
}

/// Mock imports always spell out their alias.
fn mock_import(target: &str, alias: &str) -> String {
    format!("use {} as {alias};", mock_path(target))
}

fn use_statement(import: &UseImport) -> String {
    let keyword = match import.kind {
        UseKind::Class => "use",
        UseKind::Function => "use function",
        UseKind::Const => "use const",
    };
    if import.has_explicit_alias() {
        format!("{keyword} {} as {};", import.path, import.alias)
    } else {
        format!("{keyword} {};", import.path)
    }
}

/// Point qualified class names (`\App\Disk`, `Io\Disk`) that resolve to a mocked type at its mock.
///
/// Unqualified names are covered by the imports. Function calls and member names are left alone.
fn rewrite_qualified_names(subject: &str, context: &Context, is_mocked: &dyn Fn(&str) -> bool) -> String {
    let tokens = lexer::lex(subject);
    let mut out = String::with_capacity(subject.len());
    let mut copied = 0;
    for (index, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Name || !token.text.contains('\\') {
            continue;
        }
        let previous = index.checked_sub(1).map(|i| &tokens[i].kind);
        if matches!(previous, Some(TokenKind::Arrow | TokenKind::DoubleColon)) {
            continue;
        }
        let is_call = tokens.get(index + 1).is_some_and(|next| next.kind == TokenKind::LParen);
        if is_call && previous != Some(&TokenKind::Keyword(Keyword::New)) {
            continue;
        }
        let resolved = context.resolve_class(&token.text);
        if !is_mocked(&resolved) {
            continue;
        }
        out.push_str(&subject[copied..token.span.start]);
        out.push('\\');
        out.push_str(&mock_path(&resolved));
        copied = token.span.end;
    }
    out.push_str(&subject[copied..]);
    out
}
