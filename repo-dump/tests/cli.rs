use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, NamedTempFile};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

fn repo_dump() -> Command {
    let mut cmd = Command::cargo_bin("repo-dump").expect("Binary exists");
    // Keep the developer's environment out of the run.
    cmd.env_remove("GITHUB_TOKEN")
        .env_remove("GITHUB_API_URL")
        .env_remove("REPO_DUMP_CACHE_DIR");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    repo_dump()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dump").and(predicate::str::contains("clear-cache")));
}

#[test]
fn test_invalid_repository_fails_without_network() {
    repo_dump()
        .args(["dump", "not a repo!", "--no-cache"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("invalid repository"));
}

#[test]
fn test_invalid_pattern_fails_without_network() {
    repo_dump()
        .args(["dump", "octo/demo", "--no-cache", "--pattern", "(["])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid path pattern"));
}

#[test]
fn test_unknown_config_key_is_reported() {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(config.path(), "max_file_size: 10\nupload_to: s3\n").expect("Writing temp config failed");

    repo_dump()
        .args(["dump", "octo/demo", "--no-cache", "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config YAML"));
}

#[test]
fn test_clear_cache_removes_only_snapshots() {
    let dir = tempdir().unwrap();
    write(dir.path().join("octo_demo_main.json"), "{}").unwrap();
    write(dir.path().join("octo_demo_dev.json"), "{}").unwrap();
    write(dir.path().join("README.txt"), "not a snapshot").unwrap();

    repo_dump()
        .args(["clear-cache", "--cache-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Cleared snapshot cache"));

    assert!(!dir.path().join("octo_demo_main.json").exists());
    assert!(!dir.path().join("octo_demo_dev.json").exists());
    assert!(dir.path().join("README.txt").exists());
}

#[test]
fn test_clear_cache_on_missing_dir_succeeds() {
    let dir = tempdir().unwrap();
    repo_dump()
        .args(["clear-cache", "--cache-dir"])
        .arg(dir.path().join("absent"))
        .assert()
        .success();
}

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn test_emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use repo_dump::cli::{run, Cli, Commands};

    let dir = tempdir().unwrap();
    let cli = Cli {
        command: Commands::ClearCache {
            cache_dir: Some(dir.path().to_path_buf()),
            config: None,
        },
    };

    run(cli).await.expect("clearing an empty cache succeeds");

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
