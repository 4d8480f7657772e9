//! Concurrency properties over a shared SQLite file.
//!
//! Two engines opened on the same database stand in for two daemon
//! processes racing on the same queues.

mod common;

use common::{create_with_members, db_url, open_engine, OWNER, T0};
use queuetrackr_core::application::QueueEngine;
use queuetrackr_core::domain::{DomainError, QueueEvent};
use queuetrackr_core::error::AppError;
use queuetrackr_core::port::time_provider::mocks::ManualClock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

const NO_SHOW_MS: i64 = 120_000;

type Racers = (
    tempfile::TempDir,
    Arc<ManualClock>,
    Arc<QueueEngine>,
    Arc<QueueEngine>,
);

async fn two_engines(codes: &[&str]) -> Racers {
    let dir = tempfile::tempdir().unwrap();
    let url = db_url(&dir);
    let clock = Arc::new(ManualClock::new(T0));
    let a = Arc::new(open_engine(&url, clock.clone(), "a", codes).await);
    let b = Arc::new(open_engine(&url, clock.clone(), "b", &["Q9999"]).await);
    (dir, clock, a, b)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_auto_advances_commit_once() {
    let (_dir, clock, a, b) = two_engines(&["Q1000"]).await;
    let queue = create_with_members(&a, "Desk", &["m1", "m2", "m3", "m4"]).await;
    let id = queue.id().to_string();

    a.start_queue(&id, OWNER).await.unwrap();
    let served = a.move_next(&id, OWNER).await.unwrap();
    let lock = served.next_lock_until().unwrap();
    clock.set(lock + 1);

    let mut set = JoinSet::new();
    for i in 0..16 {
        let engine = if i % 2 == 0 { a.clone() } else { b.clone() };
        let id = id.clone();
        set.spawn(async move { engine.auto_advance(&id, lock).await });
    }

    let mut committed = 0;
    while let Some(result) = set.join_next().await {
        if result.unwrap().unwrap().is_changed() {
            committed += 1;
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(a.get_queue(&id).await.unwrap().current_index(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_manual_advances_hit_the_lock() {
    let (_dir, _clock, a, b) = two_engines(&["Q1000"]).await;
    let members: Vec<String> = (0..10).map(|i| format!("m{}", i)).collect();
    let refs: Vec<&str> = members.iter().map(String::as_str).collect();
    let queue = create_with_members(&a, "Desk", &refs).await;
    let id = queue.id().to_string();
    a.start_queue(&id, OWNER).await.unwrap();

    let mut set = JoinSet::new();
    for i in 0..8 {
        let engine = if i % 2 == 0 { a.clone() } else { b.clone() };
        let id = id.clone();
        set.spawn(async move { engine.move_next(&id, OWNER).await });
    }

    let (mut ok, mut locked) = (0, 0);
    while let Some(result) = set.join_next().await {
        match result.unwrap() {
            Ok(_) => ok += 1,
            Err(AppError::Domain(DomainError::Locked { .. })) => locked += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!((ok, locked), (1, 7));
    assert_eq!(a.get_queue(&id).await.unwrap().current_index(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_are_all_kept() {
    let (_dir, _clock, a, b) = two_engines(&["Q1000"]).await;
    let queue = create_with_members(&a, "Desk", &[]).await;
    let id = queue.id().to_string();

    let mut set = JoinSet::new();
    for i in 0..8 {
        let engine = if i % 2 == 0 { a.clone() } else { b.clone() };
        let id = id.clone();
        set.spawn(async move { engine.join(&id, &format!("member-{}", i)).await });
    }
    while let Some(result) = set.join_next().await {
        result.unwrap().unwrap();
    }

    let queue = b.get_queue(&id).await.unwrap();
    assert_eq!(queue.len(), 8);
    let mut members = queue.members().to_vec();
    members.sort();
    members.dedup();
    assert_eq!(members.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_advance_is_lost_or_doubled() {
    let (_dir, _clock, a, b) = two_engines(&["Q1000"]).await;
    let members: Vec<String> = (0..40).map(|i| format!("m{}", i)).collect();
    let refs: Vec<&str> = members.iter().map(String::as_str).collect();
    let queue = create_with_members(&a, "Desk", &refs).await;
    let id = queue.id().to_string();
    a.start_queue(&id, OWNER).await.unwrap();

    // owners on both "processes" alternate proceed and next
    let mut set = JoinSet::new();
    for i in 0..4 {
        let engine = if i % 2 == 0 { a.clone() } else { b.clone() };
        let id = id.clone();
        set.spawn(async move {
            let mut advanced = 0usize;
            let mut last_seen = 0usize;
            for _ in 0..5 {
                engine.proceed_now(&id, OWNER).await.unwrap();
                match engine.move_next(&id, OWNER).await {
                    Ok(queue) => {
                        assert!(queue.current_index() > last_seen);
                        last_seen = queue.current_index();
                        advanced += 1;
                    }
                    Err(AppError::Domain(DomainError::Locked { .. })) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            advanced
        });
    }

    let mut total = 0;
    while let Some(result) = set.join_next().await {
        total += result.unwrap();
    }
    assert!(total >= 1);
    assert_eq!(a.get_queue(&id).await.unwrap().current_index(), total);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dueling_sweeps_advance_each_queue_once() {
    let codes = ["Q1001", "Q1002", "Q1003", "Q1004", "Q1005"];
    let (_dir, clock, a, b) = two_engines(&codes).await;

    let mut ids = Vec::new();
    for n in 0..5 {
        let queue = create_with_members(&a, &format!("Desk {}", n), &["x", "y", "z"]).await;
        a.start_queue(queue.id(), OWNER).await.unwrap();
        a.move_next(queue.id(), OWNER).await.unwrap();
        ids.push(queue.id().to_string());
    }
    clock.set(T0 + NO_SHOW_MS);

    let sweep_a = a.advance_sweeper(Duration::from_secs(1));
    let sweep_b = b.advance_sweeper(Duration::from_secs(1));
    let (report_a, report_b) = tokio::join!(sweep_a.tick(), sweep_b.tick());

    assert_eq!(report_a.committed + report_b.committed, 5);
    assert_eq!(report_a.failed + report_b.failed, 0);
    for id in ids {
        assert_eq!(a.get_queue(&id).await.unwrap().current_index(), 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_polls_report_each_turn_once() {
    let codes: Vec<String> = (0..10).map(|n| format!("Q{}", 2000 + n)).collect();
    let code_refs: Vec<&str> = codes.iter().map(String::as_str).collect();
    let (_dir, _clock, a, b) = two_engines(&code_refs).await;

    for n in 0..10 {
        let queue = create_with_members(&a, &format!("Desk {}", n), &["x", "y", "z"]).await;
        let id = queue.id().to_string();
        a.start_queue(&id, OWNER).await.unwrap();
        assert!(a.poll_events(&id, "y").await.unwrap().is_empty());
        a.move_next(&id, OWNER).await.unwrap();

        let mut set = JoinSet::new();
        for i in 0..4 {
            let engine = if i % 2 == 0 { a.clone() } else { b.clone() };
            let id = id.clone();
            set.spawn(async move { engine.poll_events(&id, "y").await });
        }

        let mut turns = 0;
        while let Some(result) = set.join_next().await {
            turns += result
                .unwrap()
                .unwrap()
                .iter()
                .filter(|e| matches!(e, QueueEvent::YourTurnNow { .. }))
                .count();
        }
        assert_eq!(turns, 1, "queue {} reported the turn {} times", n, turns);
        assert!(b.poll_events(&id, "y").await.unwrap().is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_break_and_auto_advance_race_has_one_winner() {
    let codes: Vec<String> = (0..10).map(|n| format!("Q{}", 3000 + n)).collect();
    let code_refs: Vec<&str> = codes.iter().map(String::as_str).collect();
    let (_dir, clock, a, b) = two_engines(&code_refs).await;

    let mut ids = Vec::new();
    for n in 0..10 {
        let queue = create_with_members(&a, &format!("Desk {}", n), &["x", "y", "z"]).await;
        a.start_queue(queue.id(), OWNER).await.unwrap();
        a.move_next(queue.id(), OWNER).await.unwrap();
        ids.push(queue.id().to_string());
    }
    let lock = T0 + NO_SHOW_MS;
    clock.set(lock);

    for id in ids {
        let owner = {
            let (a, id) = (a.clone(), id.clone());
            tokio::spawn(async move { a.start_break(&id, OWNER, 5).await })
        };
        let sweep = {
            let (b, id) = (b.clone(), id.clone());
            tokio::spawn(async move { b.auto_advance(&id, lock).await })
        };

        let break_started = match owner.await.unwrap() {
            Ok(_) => true,
            Err(AppError::Domain(DomainError::Locked { .. })) => false,
            Err(e) => panic!("unexpected error: {}", e),
        };
        let advanced = sweep.await.unwrap().unwrap().is_changed();
        assert!(break_started ^ advanced, "break {} advance {}", break_started, advanced);

        let queue = a.get_queue(&id).await.unwrap();
        if break_started {
            // the break won: the expired lock is gone and the pointer stayed
            assert!(queue.is_on_break());
            assert_eq!(queue.current_index(), 1);
            assert_eq!(queue.next_lock_until(), None);
        } else {
            assert!(!queue.is_on_break());
            assert_eq!(queue.current_index(), 2);
            assert_eq!(queue.next_lock_until(), Some(lock + NO_SHOW_MS));
        }
    }
}
