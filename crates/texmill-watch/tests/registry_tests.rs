#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use texmill_build::CompileRequest;
use texmill_core::toolchain::StaticResolver;
use texmill_core::{Error, WorkspacePolicy};
use texmill_log::DiagnosticCode;
use texmill_watch::WatchRegistry;

fn registry() -> WatchRegistry {
    WatchRegistry::new(Arc::new(StaticResolver::new()), WorkspacePolicy::unrestricted(), 2000)
}

fn sleeper(reg: &WatchRegistry) -> String {
    reg.spawn(Path::new("sleep"), vec!["30".into()], Path::new("main.tex"), None)
        .unwrap()
        .id
}

async fn wait_until_exited(reg: &WatchRegistry, id: &str) {
    for _ in 0..100 {
        if reg.is_running(id) == Some(false) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("session {} never exited", id);
}

#[tokio::test]
async fn test_start_list_stop() {
    let reg = registry();
    let id = sleeper(&reg);

    let listed = reg.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert!(listed[0].running);
    assert!(listed[0].pid.is_some());

    assert!(reg.stop(&id));
    assert!(reg.list().is_empty());
    assert!(!reg.stop(&id));
}

#[tokio::test]
async fn test_exited_session_stays_until_stopped() {
    let reg = registry();
    let info = reg
        .spawn(
            Path::new("sh"),
            vec!["-c".into(), "echo first; echo; echo second >&2".into()],
            Path::new("main.tex"),
            None,
        )
        .unwrap();

    wait_until_exited(&reg, &info.id).await;

    let listed = reg.list();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].running);

    let mut lines = reg.tail(&info.id, None).unwrap();
    lines.sort();
    assert_eq!(lines, vec!["first", "second"]);

    assert!(reg.stop(&info.id));
    assert!(reg.list().is_empty());
}

#[tokio::test]
async fn test_output_is_complete_once_not_running() {
    let reg = WatchRegistry::new(
        Arc::new(StaticResolver::new()),
        WorkspacePolicy::unrestricted(),
        5000,
    );
    for _ in 0..5 {
        let info = reg
            .spawn(Path::new("seq"), vec!["1".into(), "3000".into()], Path::new("main.tex"), None)
            .unwrap();

        wait_until_exited(&reg, &info.id).await;

        let lines = reg.tail(&info.id, Some(5000)).unwrap();
        assert_eq!(lines.len(), 3000);
        assert_eq!(lines.last().map(String::as_str), Some("3000"));
        reg.stop(&info.id);
    }
}

#[tokio::test]
async fn test_tail_unknown_session_fails() {
    let reg = registry();
    let err = reg.tail("does-not-exist", Some(10)).unwrap_err();
    assert!(matches!(err, Error::UnknownSession(ref id) if id == "does-not-exist"));
    assert!(err.to_string().contains("does-not-exist"));
}

#[tokio::test]
async fn test_buffer_keeps_only_latest_lines() {
    let reg = WatchRegistry::new(
        Arc::new(StaticResolver::new()),
        WorkspacePolicy::unrestricted(),
        5,
    );
    let info = reg
        .spawn(
            Path::new("sh"),
            vec!["-c".into(), "for i in 1 2 3 4 5 6 7 8; do echo line$i; done".into()],
            Path::new("main.tex"),
            None,
        )
        .unwrap();

    wait_until_exited(&reg, &info.id).await;

    let lines = reg.tail(&info.id, None).unwrap();
    assert_eq!(lines, vec!["line4", "line5", "line6", "line7", "line8"]);
    assert_eq!(reg.tail(&info.id, Some(2)).unwrap(), vec!["line7", "line8"]);
    reg.stop(&info.id);
}

#[tokio::test]
async fn test_ids_are_unique_under_concurrency() {
    let reg = Arc::new(registry());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let reg = reg.clone();
        handles.push(tokio::spawn(async move { sleeper(&reg) }));
    }
    let mut ids = Vec::new();
    for h in handles {
        ids.push(h.await.unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(reg.list().len(), 8);

    for id in &ids {
        assert!(reg.stop(id));
    }
    assert!(reg.list().is_empty());
}

#[tokio::test]
async fn test_start_runs_latexmk_in_watch_mode() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("main.tex");
    std::fs::write(&root, "").unwrap();

    // `echo` stands in for latexmk and prints the arguments it was given.
    let resolver = StaticResolver::new().with_tool("latexmk", "echo");
    let reg = WatchRegistry::new(Arc::new(resolver), WorkspacePolicy::unrestricted(), 100);

    let mut req = CompileRequest::new(&root);
    req.shell_escape = true;
    let info = reg.start(&req).unwrap();

    assert_eq!(info.command, "echo");
    assert!(info.args.contains(&"-pvc".to_string()));
    assert_eq!(info.policy_warnings[0].code, Some(DiagnosticCode::ShellEscapeDisabled));
    assert_eq!(info.root, texmill_core::paths::normalize(&root));

    wait_until_exited(&reg, &info.id).await;
    let lines = reg.tail(&info.id, None).unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("-pvc"));
    assert!(!lines[0].contains("-shell-escape"));
}

#[tokio::test]
async fn test_start_outside_workspace_is_rejected() {
    let reg = WatchRegistry::new(
        Arc::new(StaticResolver::new()),
        WorkspacePolicy::with_root("/definitely/not/here"),
        100,
    );
    let err = reg.start(&CompileRequest::new(PathBuf::from("/etc/main.tex"))).unwrap_err();
    assert!(matches!(err, Error::OutsideWorkspace { .. }));
    assert!(reg.list().is_empty());
}

#[tokio::test]
async fn test_missing_program_is_a_spawn_error() {
    let reg = registry();
    let err = reg
        .spawn(Path::new("texmill-no-such-program"), vec![], Path::new("main.tex"), None)
        .unwrap_err();
    assert!(matches!(err, Error::Spawn { .. }));
}

#[tokio::test]
async fn test_info_serializes_camel_case() {
    let reg = registry();
    let id = sleeper(&reg);
    let json = serde_json::to_value(&reg.list()[0]).unwrap();
    assert_eq!(json["running"], true);
    assert!(json["startedAt"].as_u64().unwrap() > 0);
    assert!(json.get("policyWarnings").is_none());
    reg.stop(&id);
}
