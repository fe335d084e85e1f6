// ABOUTME: Invocation context tests: once-per-invocation memoization and the
// ABOUTME: per-host run cache.

mod support;

use relevo::entity::EntityError;
use relevo::exec::Run;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use support::{context, ok, runner, ScriptedExecutor};

#[tokio::test]
async fn once_runs_the_operation_a_single_time() {
    let ctx = context("deploy", &["h1", "h2"]);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let calls = Arc::clone(&calls);
        let result = ctx
            .once("service.update.app", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            })
            .await;
        assert_eq!(result.unwrap(), true);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn once_replays_failures_to_later_callers() {
    let ctx = context("deploy", &["h1"]);

    let first = ctx
        .once("stack.update.web", || async {
            Err(EntityError::Remote("network unreachable".to_string()))
        })
        .await;
    assert!(first.is_err());

    let second = ctx
        .once("stack.update.web", || async {
            panic!("a stored failure must be replayed, not retried")
        })
        .await;
    assert!(matches!(second, Err(EntityError::Remote(_))));
}

#[tokio::test]
async fn distinct_keys_are_independent() {
    let ctx = context("deploy", &["h1"]);

    let a = ctx.once("a", || async { Ok(true) }).await.unwrap();
    let b = ctx.once("b", || async { Ok(false) }).await.unwrap();
    assert!(a);
    assert!(!b);
}

#[tokio::test]
async fn cached_runs_reach_the_transport_once() {
    let ctx = context("deploy", &["h1"]);
    let executor = ScriptedExecutor::new(
        "h1",
        vec![("docker info".to_string(), ok("swarm: active"))],
    );
    let runner = runner(Arc::clone(&executor), ctx);

    let first = runner
        .run(Run::command("docker info").use_cache(true))
        .await
        .unwrap();
    let second = runner
        .run(Run::command("docker info").use_cache(true))
        .await
        .unwrap();

    assert_eq!(first.text(), "swarm: active");
    assert_eq!(second.text(), first.text());
    executor.assert_exhausted();
}

#[tokio::test]
async fn cache_salt_separates_otherwise_identical_runs() {
    let ctx = context("deploy", &["h1"]);
    let executor = ScriptedExecutor::new(
        "h1",
        vec![
            ("docker info".to_string(), ok("first")),
            ("docker info".to_string(), ok("second")),
        ],
    );
    let runner = runner(Arc::clone(&executor), ctx);

    let a = runner
        .run(Run::command("docker info").use_cache(true).cache_salt("a"))
        .await
        .unwrap();
    let b = runner
        .run(Run::command("docker info").use_cache(true).cache_salt("b"))
        .await
        .unwrap();

    assert_eq!(a.text(), "first");
    assert_eq!(b.text(), "second");
    executor.assert_exhausted();
}
