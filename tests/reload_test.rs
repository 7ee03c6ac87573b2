// tests/reload_test.rs — Integration test: loading, unloading and hot reload

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use switchboard::core::runtime::Runtime;
use switchboard::core::types::RouteOutcome;
use switchboard::infra::config::RouterConfig;
use switchboard::infra::errors::PluginError;
use switchboard::plugins::manager::{Candidate, PluginManager};
use switchboard::plugins::watcher::{HotReloadWatcher, ReloadEvent, ReloadWorker};

fn manager(dir: &Path) -> Arc<PluginManager> {
    Arc::new(PluginManager::new(dir, "_plugin.rhai", &[]).unwrap())
}

fn write(dir: &Path, file: &str, body: &str) -> PathBuf {
    let path = dir.join(file);
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_get_after_load_has_candidate_name() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "finance_plugin.rhai", r#"fn handle(q) { "ok" }"#);
    let m = manager(dir.path());

    for candidate in m.discover() {
        let descriptor = m.load(&candidate).unwrap();
        assert_eq!(descriptor.name, candidate.name);
        assert_eq!(m.get(&candidate.name).unwrap().name(), candidate.name);
    }
}

#[test]
fn test_contract_violations_leave_registry_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "good_plugin.rhai", r#"fn handle(q) { q }"#);
    let none = write(dir.path(), "none_plugin.rhai", r#"fn helper(q) { q }"#);
    let two = write(
        dir.path(),
        "two_plugin.rhai",
        "fn handle(q) { q }\nfn handle(q, c) { q }",
    );
    let m = manager(dir.path());
    m.load_path(&dir.path().join("good_plugin.rhai")).unwrap();
    let before = m.names();

    for path in [none, two] {
        let err = m.load_path(&path).unwrap_err();
        assert!(matches!(err, PluginError::ContractViolation { .. }), "{err}");
    }
    assert_eq!(m.names(), before);
}

#[test]
fn test_unload_then_reload_gives_new_instance() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "search_plugin.rhai", r#"fn handle(q) { "v1" }"#);
    let m = manager(dir.path());
    m.load_all();
    let first = m.get("search").unwrap();

    assert!(m.unload("search"));
    assert!(m.get("search").is_none());
    assert!(!m.unload("search"));

    std::fs::write(&path, r#"fn handle(q) { "v2" }"#).unwrap();
    m.load(&Candidate {
        name: "search".into(),
        path,
    })
    .unwrap();
    let second = m.get("search").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.handle("q", None).unwrap(), "v2");
    // The old instance is still callable by whoever holds it.
    assert_eq!(first.handle("q", None).unwrap(), "v1");
}

#[test]
fn test_reload_one_picks_up_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "notes_plugin.rhai", r#"fn version() { "1.0.0" } fn handle(q) { q }"#);
    let m = manager(dir.path());
    m.load_all();

    std::fs::write(&path, r#"fn version() { "1.1.0" } fn handle(q) { q }"#).unwrap();
    let d = m.reload_one("notes").unwrap();
    assert_eq!(d.version, "1.1.0");
    assert_eq!(m.len(), 1);
}

#[tokio::test]
async fn test_debounce_one_vs_two_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "task_plugin.rhai", r#"fn handle(q) { q }"#);
    let m = manager(dir.path());
    m.load_all();

    let mut worker = ReloadWorker::new(m.clone(), Duration::from_secs(2));
    let t0 = Instant::now();
    worker.process(ReloadEvent::changed(&path, "task", t0)).await;
    worker
        .process(ReloadEvent::changed(&path, "task", t0 + Duration::from_millis(500)))
        .await;
    assert_eq!(worker.reloads(), 1);

    worker
        .process(ReloadEvent::changed(&path, "task", t0 + Duration::from_secs(3)))
        .await;
    assert_eq!(worker.reloads(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_routing_during_bulk_reload_never_misses() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "task_plugin.rhai", r#"fn handle(q) { "task" }"#);
    write(dir.path(), "calendar_plugin.rhai", r#"fn handle(q) { "calendar" }"#);
    let rt = Arc::new(Runtime::new(
        manager(dir.path()),
        &RouterConfig::default(),
        None,
        Duration::from_millis(100),
    ));
    rt.load_plugins();

    let reloader = {
        let rt = rt.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                rt.reload_all().await.unwrap();
            }
        })
    };

    let mut callers = Vec::new();
    for _ in 0..4 {
        let rt = rt.clone();
        callers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let d = rt.route("add a task", None).await;
                assert_eq!(d.outcome, RouteOutcome::Handled);
                assert_eq!(d.plugin.as_deref(), Some("task"));
                assert!(d.result.success);
            }
        }));
    }

    reloader.await.unwrap();
    for c in callers {
        c.await.unwrap();
    }
    assert_eq!(rt.statistics().invocations("task"), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_hot_reloads_edited_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "echo_plugin.rhai", r#"fn handle(q) { "old" }"#);
    let m = manager(dir.path());
    m.load_all();

    let mut watcher = HotReloadWatcher::new(m.clone(), Duration::from_millis(50));
    watcher.start().unwrap();
    // Give the OS watcher a moment to arm.
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Replace atomically so the watcher never sees a half-written file.
    let staged = write(dir.path(), "echo.staged", r#"fn handle(q) { "new" }"#);
    std::fs::rename(&staged, &path).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let current = m.get("echo").unwrap().handle("x", None).unwrap();
        if current == "new" {
            break;
        }
        assert!(Instant::now() < deadline, "plugin was not reloaded in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    watcher.stop().await;
    assert!(!watcher.is_watching());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_unloads_deleted_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "echo_plugin.rhai", r#"fn handle(q) { q }"#);
    let m = manager(dir.path());
    m.load_all();

    let mut watcher = HotReloadWatcher::new(m.clone(), Duration::from_millis(50));
    watcher.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    std::fs::remove_file(&path).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while m.contains("echo") {
        assert!(Instant::now() < deadline, "plugin was not unloaded in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    watcher.stop().await;
}
