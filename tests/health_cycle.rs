//! Failure commit, mark-down and timed revival across units of work.

use std::sync::Arc;

use upstream_balancer::clock::{Clock, ManualClock};
use upstream_balancer::health::{leader, FailureRecord};
use upstream_balancer::WorkerId;

mod common;
use common::{pool, seeded, stored_host};

#[tokio::test]
async fn test_post_process_marks_host_down_at_threshold() {
    let clock = Arc::new(ManualClock::new(1_000));
    let mut primary = pool("primary", 0, &["a1"]);
    primary.max_fails = 2;
    let (upstream, connector) = seeded(vec![primary, pool("backup", 1, &["b1"])], clock.clone()).await;
    connector.set_reachable("b1", true);

    for expected in 1..=2 {
        let mut ctx = upstream.begin();
        upstream.connect(&mut ctx).await.unwrap();
        upstream.post_process(ctx).unwrap().await.unwrap();

        let a1 = stored_host(&upstream, "primary", "a1");
        assert_eq!(a1.failcount, expected);
        assert_eq!(a1.lastfail, 1_000);
        assert_eq!(a1.up, expected < 2);
    }

    // The next unit of work never touches the down host.
    connector.clear_attempts();
    let mut ctx = upstream.begin();
    upstream.connect(&mut ctx).await.unwrap();
    assert_eq!(connector.attempts(), vec!["b1"]);
    assert!(upstream.post_process(ctx).is_none());
}

#[tokio::test]
async fn test_down_host_revived_after_failed_timeout() {
    let clock = Arc::new(ManualClock::new(1_000));
    let mut primary = pool("primary", 0, &["a1"]);
    primary.max_fails = 1;
    primary.failed_timeout = 30;
    let (upstream, connector) = seeded(vec![primary, pool("backup", 1, &["b1"])], clock.clone()).await;
    connector.set_reachable("b1", true);

    let mut ctx = upstream.begin();
    upstream.connect(&mut ctx).await.unwrap();
    upstream.post_process(ctx).unwrap().await.unwrap();
    assert!(!stored_host(&upstream, "primary", "a1").up);

    clock.advance(29);
    assert!(upstream.reconcile().await.unwrap().revived.is_empty());
    assert!(!stored_host(&upstream, "primary", "a1").up);

    clock.advance(1);
    let report = upstream.reconcile().await.unwrap();
    assert_eq!(report.revived, vec![("primary".to_string(), "a1".to_string())]);
    let a1 = stored_host(&upstream, "primary", "a1");
    assert!(a1.up);
    assert_eq!(a1.failcount, 0);
    assert_eq!(a1.lastfail, 0);

    connector.set_reachable("a1", true);
    let mut ctx = upstream.begin();
    let (conn, _) = upstream.connect(&mut ctx).await.unwrap();
    assert_eq!(conn, "a1");
}

#[tokio::test]
async fn test_manually_downed_host_stays_down() {
    let clock = Arc::new(ManualClock::new(1_000));
    let (upstream, _connector) = seeded(vec![pool("primary", 0, &["a1"])], clock.clone()).await;

    let mut ctx = upstream.begin();
    upstream.down_host(&mut ctx, "primary", "a1").await.unwrap();

    clock.advance(86_400);
    assert!(upstream.reconcile().await.unwrap().revived.is_empty());
    assert!(!stored_host(&upstream, "primary", "a1").up);
}

#[tokio::test]
async fn test_late_commit_does_not_revive_manually_downed_host() {
    let clock = Arc::new(ManualClock::new(1_000));
    let (upstream, _connector) = seeded(vec![pool("primary", 0, &["a1"])], clock.clone()).await;

    // A request read the table and failed on a1 before the operator downed it.
    let mut ctx = upstream.begin();
    upstream.connect(&mut ctx).await.unwrap_err();

    let mut admin = upstream.begin();
    upstream.down_host(&mut admin, "primary", "a1").await.unwrap();
    upstream.post_process(ctx).unwrap().await.unwrap();

    let a1 = stored_host(&upstream, "primary", "a1");
    assert!(!a1.up);
    assert_eq!(a1.lastfail, 0);

    clock.advance(3_600);
    assert!(upstream.reconcile().await.unwrap().revived.is_empty());
    assert!(!stored_host(&upstream, "primary", "a1").up);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commits_are_not_lost() {
    let clock = Arc::new(ManualClock::new(1_000));
    let mut primary = pool("primary", 0, &["a1"]);
    primary.max_fails = 100;
    let (upstream, _connector) = seeded(vec![primary], clock).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let upstream = upstream.clone();
        handles.push(tokio::spawn(async move {
            let mut record = FailureRecord::new();
            record.record("primary", "a1");
            upstream.commit(&record).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(stored_host(&upstream, "primary", "a1").failcount, 16);
}

#[tokio::test]
async fn test_only_one_worker_reconciles() {
    let clock = Arc::new(ManualClock::new(1_000));
    let mut primary = pool("primary", 0, &["a1"]);
    primary.hosts[0].up = false;
    primary.hosts[0].lastfail = 900;
    primary.failed_timeout = 60;
    let (upstream, _connector) = seeded(vec![primary], clock.clone()).await;

    let workers: Vec<WorkerId> = (0..3).map(|_| WorkerId::new()).collect();
    for worker in &workers {
        leader::register(upstream.registry(), *worker, clock.now()).unwrap();
    }

    let mut leaders = 0;
    for worker in &workers {
        if upstream.background_tick(*worker).await.is_some() {
            leaders += 1;
        }
    }
    assert_eq!(leaders, 1);
    assert_eq!(leader::current(upstream.registry()).unwrap(), workers.last().copied());
    assert!(stored_host(&upstream, "primary", "a1").up);
}
