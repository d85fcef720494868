//! End-to-end tests against a real PHP interpreter
//!
//! Every test returns early when `php` is not on `PATH`.

use std::fs;
use std::path::Path;
use std::process::Command;

use lens::evaluator::{Failure, NamedSuite, Verdict};
use lens::{Evaluator, EvaluatorConfig, ProjectPaths, spec};

const CLOCK: &str = r#"<?php
namespace App;

interface Clock
{
    public function now(): int;
}
"#;

const GREETER: &str = r#"<?php
namespace App;

class Greeter
{
    public function __construct(private Clock $clock)
    {
    }

    public function greet(string $name): string
    {
        if ($this->clock->now() < 12) {
            return "Good morning, {$name}";
        }
        return "Hello, {$name}";
    }
}
"#;

const TESTS: &str = r#"<?php
namespace App;

// Test: morning
$greeter = new Greeter(new Clock());
echo $greeter->greet('Ada');

// Mock Clock
now() => 9

// Output
Good morning, Ada

// Test: afternoon
$greeter = new Greeter(new Clock());
echo $greeter->greet('Ada');

// Mock Clock
now() => 15

// Output
Hello, Ada

// Test: broken clock
$greeter = new Greeter(new Clock());
echo $greeter->greet('Ada');

// Mock Clock
now() throws \RuntimeException "stopped"

// Output
expect exception \RuntimeException "stopped"

// Test: clock never read
echo 'nothing';

// Mock Clock
now() => 1

// Output
nothing
"#;

fn php_available() -> bool {
    Command::new("php").arg("-v").output().is_ok_and(|o| o.status.success())
}

fn write_project(root: &Path) {
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("src/Clock.php"), CLOCK).unwrap();
    fs::write(root.join("src/Greeter.php"), GREETER).unwrap();
    // No Composer here; a tiny autoloader does the same job.
    fs::write(
        root.join("autoload.php"),
        "<?php\nspl_autoload_register(function ($class) {\n    $file = __DIR__ . '/src/' . substr(strrchr('\\\\' . $class, '\\\\'), 1) . '.php';\n    if (is_file($file)) {\n        require_once $file;\n    }\n});\n",
    )
    .unwrap();
}

#[tokio::test]
async fn test_cases_run_against_php() {
    if !php_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let paths = ProjectPaths::new(dir.path()).with_autoload(Some(dir.path().join("autoload.php")));
    let config = EvaluatorConfig::new().with_coverage(false).with_jobs(2);
    let mut evaluator = Evaluator::new(paths, config).unwrap();
    let suite = NamedSuite {
        name: "greeter".to_string(),
        suite: spec::parse(TESTS).unwrap(),
    };

    let evaluation = evaluator.run(vec![suite]).await.unwrap();
    let verdicts: Vec<(String, &Verdict)> = evaluation.suites[0]
        .cases
        .iter()
        .map(|c| (c.case.title(), &c.result.verdict))
        .collect();

    assert_eq!(verdicts[0].1, &Verdict::Pass, "{verdicts:?}");
    assert_eq!(verdicts[1].1, &Verdict::Pass, "{verdicts:?}");
    assert_eq!(verdicts[2].1, &Verdict::Pass, "{verdicts:?}");
    assert!(
        matches!(verdicts[3].1, Verdict::Fail(Failure::Protocol(_))),
        "{verdicts:?}"
    );
    assert_eq!(evaluation.summary().passed, 3);
}
