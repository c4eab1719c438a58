//! Security property tests
//!
//! Injection safety of the shell bridge and single-winner semantics for
//! concurrent confirmation resolution.

use realitybot::{ConfirmationRegistry, Decision, PendingAction, ShellBridge};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn chat_arguments_cannot_inject_commands() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let canary = dir.path().join("canary");
    std::fs::write(&canary, b"alive").expect("write canary");

    // If the argument were ever passed through a shell, the `;` would chain
    // an rm of the canary file. It must arrive as one inert literal.
    let hostile = format!("; rm -f {}", canary.display());
    let bridge = ShellBridge::new(Duration::from_secs(5));
    let out = bridge
        .run(&["echo".to_string(), hostile.clone()])
        .await
        .expect("run");

    assert_eq!(out.stdout, hostile);
    assert!(canary.exists(), "injection executed: canary was deleted");
}

#[tokio::test]
async fn timed_out_process_is_terminated() {
    let bridge = ShellBridge::new(Duration::from_millis(200));
    let started = std::time::Instant::now();
    let result = bridge.run(&["sleep".to_string(), "60".to_string()]).await;

    assert!(result.is_err());
    // The call must return at the timeout, not after the child's runtime
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn concurrent_resolutions_have_exactly_one_winner() {
    let registry = Arc::new(ConfirmationRegistry::new(Duration::from_secs(120)));
    let token = registry.create(
        1,
        PendingAction {
            command: "removeuser".to_string(),
            args: vec!["alice".to_string()],
        },
    );

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        let token = token.clone();
        tasks.push(tokio::spawn(async move {
            registry.resolve(&token, Decision::Confirm, 1)
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.expect("join").is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1, "token resolved more than once");
}
