//! Injector behavior against real child processes: exit codes,
//! signals, stderr, the buffer cap, and the time budget.

#![cfg(unix)]

use std::sync::Arc;

use tempfile::TempDir;
use twokc::errors::BrokerError;
use twokc::grant::GrantManager;
use twokc::inject::{InjectionOptions, Injector, MAX_BUFFER_BYTES};
use twokc::request::{AccessRequest, RequestStatus};
use twokc::store::SecretStore;

struct Rig {
    _dir: TempDir,
    store: Arc<SecretStore>,
    grants: Arc<GrantManager>,
    injector: Injector,
}

fn rig() -> Rig {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SecretStore::new(dir.path().join("secrets.json")));
    let grants = Arc::new(GrantManager::new());
    let injector = Injector::new(store.clone(), grants.clone());
    Rig {
        _dir: dir,
        store,
        grants,
        injector,
    }
}

fn grant_over(rig: &Rig, uuids: Vec<String>) -> String {
    let mut req = AccessRequest::create(&uuids, "test", "T-1", Some(120)).unwrap();
    req.status = RequestStatus::Approved;
    rig.grants.create_grant(&req).unwrap().id
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

#[test]
fn child_exit_code_is_forwarded() {
    let r = rig();
    let uuid = r.store.add("k", "v", &[]).unwrap();
    let grant = grant_over(&r, vec![uuid]);

    let result = r
        .injector
        .inject(&grant, &sh("exit 7"), &InjectionOptions::default())
        .unwrap();
    assert_eq!(result.exit_code, Some(7));
}

#[test]
fn signaled_child_reports_no_exit_code() {
    let r = rig();
    let uuid = r.store.add("k", "v", &[]).unwrap();
    let grant = grant_over(&r, vec![uuid]);

    let result = r
        .injector
        .inject(&grant, &sh("kill -9 $$"), &InjectionOptions::default())
        .unwrap();
    assert_eq!(result.exit_code, None);
}

#[test]
fn stderr_is_captured_and_redacted() {
    let r = rig();
    let uuid = r.store.add("k", "sw0rdfish", &[]).unwrap();
    let grant = grant_over(&r, vec![uuid]);

    let options = InjectionOptions {
        env_var_name: Some("SECRET".into()),
        timeout_ms: None,
    };
    let result = r
        .injector
        .inject(&grant, &sh("echo \"err: $SECRET\" >&2"), &options)
        .unwrap();

    assert_eq!(result.stdout, "");
    assert_eq!(result.stderr, "err: [REDACTED]\n");
}

#[test]
fn spawn_failure_carries_the_underlying_message() {
    let r = rig();
    let uuid = r.store.add("k", "v", &[]).unwrap();
    let grant = grant_over(&r, vec![uuid]);

    let err = r
        .injector
        .inject(
            &grant,
            &["/nonexistent/definitely-not-a-binary".into()],
            &InjectionOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, BrokerError::SpawnFailure(_)));

    // The exit guard still consumed the grant.
    assert!(!r.grants.validate_grant(&grant));
}

#[test]
fn timeout_kills_the_child() {
    let r = rig();
    let uuid = r.store.add("k", "v", &[]).unwrap();
    let grant = grant_over(&r, vec![uuid]);

    let options = InjectionOptions {
        env_var_name: None,
        timeout_ms: Some(200),
    };
    let started = std::time::Instant::now();
    let err = r.injector.inject(&grant, &sh("sleep 30"), &options).unwrap_err();

    assert!(matches!(err, BrokerError::Timeout(200)));
    assert!(
        started.elapsed() < std::time::Duration::from_secs(5),
        "the 30s sleep must not run to completion"
    );
}

#[test]
fn buffer_cap_aborts_and_names_the_limit() {
    let r = rig();
    let uuid = r.store.add("k", "v", &[]).unwrap();
    let grant = grant_over(&r, vec![uuid]);

    // A hair over the 10 MiB cap, written in one stream.
    let script = format!("head -c {} /dev/zero", MAX_BUFFER_BYTES + 4096);
    let err = r
        .injector
        .inject(&grant, &sh(&script), &InjectionOptions::default())
        .unwrap_err();

    match err {
        BrokerError::BufferExceeded { limit } => assert_eq!(limit, MAX_BUFFER_BYTES),
        other => panic!("expected BufferExceeded, got {other}"),
    }
}

#[test]
fn output_under_the_cap_passes() {
    let r = rig();
    let uuid = r.store.add("k", "v", &[]).unwrap();
    let grant = grant_over(&r, vec![uuid]);

    let result = r
        .injector
        .inject(
            &grant,
            &sh("head -c 65536 /dev/zero | tr '\\0' 'a'"),
            &InjectionOptions::default(),
        )
        .unwrap();
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout.len(), 65536);
}

#[test]
fn parent_env_is_visible_to_the_child() {
    let r = rig();
    let uuid = r.store.add("k", "v", &[]).unwrap();
    let grant = grant_over(&r, vec![uuid]);

    std::env::set_var("INJECT_TEST_PASSTHROUGH", "carried");
    let result = r
        .injector
        .inject(
            &grant,
            &sh("printenv INJECT_TEST_PASSTHROUGH"),
            &InjectionOptions::default(),
        )
        .unwrap();
    std::env::remove_var("INJECT_TEST_PASSTHROUGH");

    assert_eq!(result.stdout, "carried\n");
}

#[test]
fn used_grant_rejects_a_second_injection() {
    let r = rig();
    let uuid = r.store.add("k", "v", &[]).unwrap();
    let grant = grant_over(&r, vec![uuid]);

    r.injector
        .inject(&grant, &sh("true"), &InjectionOptions::default())
        .unwrap();

    let err = r
        .injector
        .inject(&grant, &sh("true"), &InjectionOptions::default())
        .unwrap_err();
    assert!(matches!(err, BrokerError::GrantNotValid(_)));
}
