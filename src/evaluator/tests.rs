// Evaluator tests against a fake interpreter.
//
// The "interpreter" is a shell script that ignores the harness and prints a canned report, so these
// tests exercise scheduling, classification, trace re-validation and coverage without PHP.

#![cfg(unix)]

use super::*;
use crate::backend::SENTINEL;
use crate::backend::Strictness;
use lens_syntax::spec;
use serde_json::{Value, json};
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

const DISK: &str = "<?php\nnamespace App;\n\nclass Disk\n{\n    public function load(): string\n    {\n        return 'real';\n    }\n\n    public function save(string $data): void\n    {\n    }\n}\n";

const DISK_TEST: &str = "<?php\nnamespace App;\n\n// Test: reads\n$disk = new Disk();\necho $disk->load();\n\n// Mock App\\Disk\nload() => \"hello\"\nsave(\"x\")\n\n// Output\nhello\n";

struct Project {
    dir: TempDir,
    paths: ProjectPaths,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/Disk.php"), DISK).unwrap();
        let paths = ProjectPaths::new(dir.path());
        Self { dir, paths }
    }

    fn disk_path(&self) -> String {
        fs::canonicalize(self.dir.path().join("src/Disk.php"))
            .unwrap()
            .to_string_lossy()
            .into_owned()
    }

    /// Install a fake interpreter running `body`.
    fn php(&self, body: &str) -> PathBuf {
        let path = self.dir.path().join("fake-php");
        let script = format!(
            "#!/bin/sh\nif [ \"$1\" = \"-r\" ]; then echo '{{\"error\": \"not found\"}}'; exit 0; fi\n{body}\n"
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// A fake interpreter that prints `report` after the sentinel.
    fn reporting(&self, report: Value) -> PathBuf {
        self.php(&format!("cat <<'LENS'\n\n{SENTINEL}\n{report}\nLENS"))
    }

    fn evaluator(&self, php: PathBuf) -> Evaluator {
        let config = EvaluatorConfig::new()
            .with_php(php)
            .with_jobs(2)
            .with_timeout(Duration::from_secs(10));
        Evaluator::new(self.paths.clone(), config).unwrap()
    }
}

fn suite(source: &str) -> Vec<NamedSuite> {
    vec![NamedSuite {
        name: "disk".to_string(),
        suite: spec::parse(source).unwrap(),
    }]
}

fn report(output: &str, calls: &[(&str, &str)]) -> Value {
    let calls: Vec<Value> = calls
        .iter()
        .map(|(method, arg)| {
            let args = if arg.is_empty() { json!([]) } else { json!([arg]) };
            json!({"identity": "App\\Disk#0", "method": method, "args": args})
        })
        .collect();
    json!({
        "output": output,
        "exception": null,
        "fatal": null,
        "instances": ["App\\Disk#0"],
        "calls": calls,
        "coverage": {}
    })
}

fn only_verdict(evaluation: &Evaluation) -> &Verdict {
    &evaluation.suites[0].cases[0].result.verdict
}

#[tokio::test]
async fn test_passing_case() {
    let project = Project::new();
    let mut report = report("hello\n", &[("load", ""), ("save", "x")]);
    report["coverage"] = json!({ project.disk_path(): {"8": 1} });
    let mut evaluator = project.evaluator(project.reporting(report));

    let evaluation = evaluator.run(suite(DISK_TEST)).await.unwrap();
    assert_eq!(only_verdict(&evaluation), &Verdict::Pass);
    assert!(evaluation.is_success());
    assert_eq!(evaluation.summary().total(), 1);

    let case = &evaluation.suites[0].cases[0];
    assert_eq!(case.result.actual.as_ref().unwrap().output, "hello\n");
    assert!(case.result.dependencies.types.contains("App\\Disk"));

    assert_eq!(evaluation.coverage.hits(&project.disk_path(), 8), 1);
    let disk = evaluation.snapshot.declaration("App\\Disk").unwrap();
    assert_eq!(disk.tags, ["covered", "requires-mock"]);
    assert_eq!(evaluation.snapshot.declaration("App\\Disk::load").unwrap().tags, ["covered"]);

    let harness_dir = project.dir.path().join(".lens/harness/disk-1");
    let harness = fs::read_to_string(harness_dir.join("harness.php")).unwrap();
    assert!(harness.contains("class Disk extends \\App\\Disk"));
    let subject = fs::read_to_string(harness_dir.join("subject.php")).unwrap();
    assert!(subject.contains("use Lens\\Mock\\App\\Disk as Disk;"));
}

#[tokio::test]
async fn test_output_mismatch_keeps_actual_output() {
    let project = Project::new();
    let mut evaluator = project.evaluator(project.reporting(report("hullo\n", &[("load", ""), ("save", "x")])));

    let evaluation = evaluator.run(suite(DISK_TEST)).await.unwrap();
    match only_verdict(&evaluation) {
        Verdict::Fail(Failure::Mismatch(Mismatch::Output { expected, actual })) => {
            assert_eq!(expected, "hello");
            assert_eq!(actual, "hullo");
        }
        other => panic!("unexpected verdict {other:?}"),
    }
    assert!(!evaluation.is_success());
}

#[tokio::test]
async fn test_out_of_order_call_is_a_protocol_violation() {
    let project = Project::new();
    let mut evaluator = project.evaluator(project.reporting(report("", &[("save", "x")])));

    let evaluation = evaluator.run(suite(DISK_TEST)).await.unwrap();
    match only_verdict(&evaluation) {
        Verdict::Fail(Failure::Protocol(violation)) => {
            assert_eq!(violation.expected().unwrap().method, "load");
            assert_eq!(violation.actual().unwrap().method, "save");
        }
        other => panic!("unexpected verdict {other:?}"),
    }
}

#[tokio::test]
async fn test_unconsumed_calls_fail_the_case() {
    let project = Project::new();
    let mut evaluator = project.evaluator(project.reporting(report("hello", &[("load", "")])));

    let evaluation = evaluator.run(suite(DISK_TEST)).await.unwrap();
    assert!(matches!(
        only_verdict(&evaluation),
        Verdict::Fail(Failure::Protocol(ProtocolViolation::Unconsumed { .. }))
    ));
}

#[tokio::test]
async fn test_argument_strictness() {
    let project = Project::new();
    let php = project.reporting(report("hello", &[("load", ""), ("save", "y")]));
    let config = EvaluatorConfig::new()
        .with_php(&php)
        .with_strictness(Strictness::Arguments);
    let mut strict = Evaluator::new(project.paths.clone(), config).unwrap();
    let evaluation = strict.run(suite(DISK_TEST)).await.unwrap();
    assert!(matches!(
        only_verdict(&evaluation),
        Verdict::Fail(Failure::Protocol(ProtocolViolation::ArgumentMismatch { .. }))
    ));

    let mut lenient = project.evaluator(php);
    let evaluation = lenient.run(suite(DISK_TEST)).await.unwrap();
    assert_eq!(only_verdict(&evaluation), &Verdict::Pass);
}

#[tokio::test]
async fn test_slow_harness_is_a_process_error() {
    let project = Project::new();
    let config = EvaluatorConfig::new()
        .with_php(project.php("sleep 5"))
        .with_timeout(Duration::from_millis(300));
    let mut evaluator = Evaluator::new(project.paths.clone(), config).unwrap();

    let evaluation = evaluator.run(suite(DISK_TEST)).await.unwrap();
    assert_eq!(
        only_verdict(&evaluation),
        &Verdict::Error(ProcessError::TimedOut {
            limit: Duration::from_millis(300)
        })
    );
    assert_eq!(evaluation.summary().errors, 1);
    assert!(evaluation.suites[0].cases[0].result.actual.is_none());
}

#[tokio::test]
async fn test_killed_interpreter_is_a_crash() {
    let project = Project::new();
    let mut evaluator = project.evaluator(project.php("kill -9 $$"));

    let evaluation = evaluator.run(suite(DISK_TEST)).await.unwrap();
    assert!(matches!(
        only_verdict(&evaluation),
        Verdict::Error(ProcessError::Crashed { signal: 9, .. })
    ));
}

#[tokio::test]
async fn test_missing_report_is_internal() {
    let project = Project::new();
    let mut evaluator = project.evaluator(project.php("echo 'PHP Parse error: unexpected token' >&2; exit 255"));

    let error = evaluator.run(suite(DISK_TEST)).await.unwrap_err();
    match error {
        EvaluationError::Internal { case, message } => {
            assert_eq!(case, "reads");
            assert!(message.contains("unexpected token"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_fatal_in_generated_harness_is_internal() {
    let project = Project::new();
    let harness = project.dir.path().join(".lens/harness/disk-1/harness.php");
    let mut report = report("", &[]);
    report["fatal"] = json!({"message": "Cannot redeclare class", "file": harness.to_string_lossy(), "line": 40});
    let mut evaluator = project.evaluator(project.reporting(report));

    let error = evaluator.run(suite(DISK_TEST)).await.unwrap_err();
    assert!(matches!(error, EvaluationError::Internal { .. }), "{error:?}");
}

#[tokio::test]
async fn test_coverage_merges_across_cases() {
    let project = Project::new();
    let mut report = report("", &[]);
    report["coverage"] = json!({ project.disk_path(): {"8": 1, "12": 2}, "/elsewhere/vendor/x.php": {"1": 1} });
    let mut evaluator = project.evaluator(project.reporting(report));

    let source = "<?php\n// Test\necho '';\n// Output\n\n// Test\necho '';\n// Output\n";
    let evaluation = evaluator.run(suite(source)).await.unwrap();
    assert_eq!(evaluation.summary().passed, 2);
    assert_eq!(evaluation.coverage.hits(&project.disk_path(), 8), 2);
    assert_eq!(evaluation.coverage.hits(&project.disk_path(), 12), 4);
    assert_eq!(evaluation.coverage.files().count(), 1);
}

#[tokio::test]
async fn test_unknown_fixture_target() {
    let project = Project::new();
    let mut evaluator = project.evaluator(project.reporting(report("", &[])));
    let source = "<?php\n// Test\necho 1;\n// Mock App\\Missing\n// Output\n1\n";

    match evaluator.run(suite(source)).await.unwrap_err() {
        EvaluationError::Mock {
            source: MockError::UnknownType(name),
            ..
        } => assert_eq!(name, "App\\Missing"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_shutdown_discards_the_run() {
    let project = Project::new();
    let mut evaluator = project.evaluator(project.php("sleep 5"));

    let result = evaluator.run_until(suite(DISK_TEST), async {}).await;
    assert!(matches!(result, Err(EvaluationError::Pool(PoolError::Cancelled))));
}

#[tokio::test]
async fn test_capture_fixtures_keeps_instance_order() {
    let project = Project::new();
    let report = json!({
        "output": "",
        "exception": null,
        "fatal": null,
        "instances": ["App\\Disk#1", "App\\Disk#0", "App\\Disk#2"],
        "calls": [
            {"identity": "App\\Disk#1", "method": "save", "args": ["x"]},
            {"identity": "App\\Disk#0", "method": "load", "args": []},
            {"identity": "App\\Disk#0", "method": "load", "args": []}
        ],
        "coverage": {}
    });
    let evaluator = project.evaluator(project.reporting(report));
    let suites = suite(DISK_TEST);
    let case = &suites[0].suite.cases[0];

    let fixtures = evaluator.capture_fixtures("disk", 0, case).await.unwrap();
    let rendered: Vec<String> = fixtures.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        [
            "// Mock \\App\\Disk\nload()\nload()\n",
            "// Mock \\App\\Disk\nsave(\"x\")\n",
            "// Mock \\App\\Disk\n",
        ]
    );
    let harness = fs::read_to_string(project.dir.path().join(".lens/harness/disk-1/harness.php")).unwrap();
    assert!(harness.contains("self::$lensAgent->record($this, 'App\\\\Disk', __FUNCTION__, func_get_args(), '')"));
}

#[tokio::test]
async fn test_colliding_suite_names_get_their_own_harness() {
    let project = Project::new();
    // Echoes whatever the case's subject file echoes.
    let php = project.php(&format!(
        r#"for last; do :; done
out=$(sed -n "s/.*echo '\([a-z]*\)';.*/\1/p" "$(dirname "$last")/subject.php")
printf '\n%s\n{{"output":"%s","exception":null,"fatal":null,"instances":[],"calls":[],"coverage":{{}}}}\n' '{SENTINEL}' "$out""#
    ));
    let mut evaluator = project.evaluator(php);
    let named = |name: &str, word: &str| NamedSuite {
        name: name.to_string(),
        suite: spec::parse(&format!("<?php\n// Test: prints\necho '{word}';\n\n// Output\n{word}\n")).unwrap(),
    };

    let evaluation = evaluator
        .run(vec![named("io/disk", "one"), named("io-disk", "two"), named("IO.disk", "three")])
        .await
        .unwrap();
    for suite in &evaluation.suites {
        let result = &suite.cases[0].result;
        assert_eq!(result.verdict, Verdict::Pass, "{}: {result:?}", suite.name);
    }

    let harness = project.dir.path().join(".lens/harness");
    for dir in ["io-disk-1", "io-disk-1~2", "IO-disk-1~3"] {
        assert!(harness.join(dir).join("subject.php").is_file(), "missing {dir}");
    }
}

#[test]
fn test_unique_dir_names() {
    let mut used = BTreeSet::new();
    assert_eq!(unique_dir_name(&mut used, "io/disk", 0), "io-disk-1");
    assert_eq!(unique_dir_name(&mut used, "io.disk", 0), "io-disk-1~2");
    assert_eq!(unique_dir_name(&mut used, "IO-DISK", 0), "IO-DISK-1~3");
    assert_eq!(unique_dir_name(&mut used, "io-disk", 1), "io-disk-2");
}
