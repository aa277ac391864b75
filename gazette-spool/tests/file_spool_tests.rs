#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use gazette_common::models::ContentId;
use gazette_spool::{FileJobSpool, Job, JobSpool, SpoolError};

async fn spool_in(dir: &tempfile::TempDir) -> FileJobSpool {
    let spool = FileJobSpool::new(dir.path().join("spool")).expect("valid path");
    spool.init().await.expect("Failed to init spool");
    spool
}

#[tokio::test]
async fn test_job_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir).await;

    let id = spool
        .enqueue(Job::new(ContentId(1), Utc::now()))
        .await
        .unwrap();
    assert_eq!(spool.list().await.unwrap(), vec![id.clone()]);

    assert!(spool.claim(&id).await.unwrap());
    assert!(!spool.claim(&id).await.unwrap(), "second claim loses");
    assert!(spool.list().await.unwrap().is_empty());
    assert_eq!(spool.in_flight().await.unwrap(), vec![id.clone()]);

    let job = spool.read(&id).await.unwrap();
    assert!(job.claimed_at.is_some());
    assert_eq!(job.content_id, ContentId(1));

    spool.complete(&id).await.unwrap();
    assert!(spool.in_flight().await.unwrap().is_empty());
    assert!(matches!(
        spool.read(&id).await,
        Err(SpoolError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_jobs_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let not_before = Utc::now() + Duration::hours(2);

    let id = {
        let spool = spool_in(&dir).await;
        spool
            .enqueue(Job::new(ContentId(42), not_before))
            .await
            .unwrap()
    };

    let reopened = spool_in(&dir).await;
    let job = reopened.read(&id).await.unwrap();
    assert_eq!(job.content_id, ContentId(42));
    assert_eq!(
        job.not_before.timestamp_millis(),
        not_before.timestamp_millis()
    );
    assert!(reopened.due(Utc::now()).await.unwrap().is_empty());
    assert_eq!(
        reopened
            .due(not_before + Duration::seconds(1))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_claim_race_between_instances() {
    let dir = tempfile::tempdir().unwrap();
    let first = Arc::new(spool_in(&dir).await);
    let second = Arc::new(FileJobSpool::new(first.path()).unwrap());

    let id = first
        .enqueue(Job::new(ContentId(5), Utc::now()))
        .await
        .unwrap();

    let (a, b) = tokio::join!(first.claim(&id), second.claim(&id));
    let winners = [a.unwrap(), b.unwrap()].iter().filter(|won| **won).count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_reschedule_and_recover_stale() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir).await;
    let now = Utc::now();

    let id = spool.enqueue(Job::new(ContentId(9), now)).await.unwrap();
    assert!(spool.claim(&id).await.unwrap());

    let job = spool.read(&id).await.unwrap();
    spool
        .reschedule(&id, &job.retry_at(now + Duration::minutes(5), "store down"))
        .await
        .unwrap();

    let requeued = spool.read(&id).await.unwrap();
    assert_eq!(requeued.attempts, 1);
    assert_eq!(requeued.claimed_at, None);
    assert!(spool.in_flight().await.unwrap().is_empty());
    assert!(spool.due(now).await.unwrap().is_empty());

    // A worker that claimed and died leaves an in-flight file behind
    assert!(spool.claim(&id).await.unwrap());
    assert_eq!(spool.recover_stale(Duration::hours(1)).await.unwrap(), 0);
    assert_eq!(spool.recover_stale(Duration::zero()).await.unwrap(), 1);
    assert_eq!(spool.list().await.unwrap(), vec![id]);
}

#[tokio::test]
async fn test_cancel_only_affects_queued_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir).await;

    let queued = spool
        .enqueue(Job::new(ContentId(1), Utc::now()))
        .await
        .unwrap();
    let running = spool
        .enqueue(Job::new(ContentId(2), Utc::now()))
        .await
        .unwrap();
    assert!(spool.claim(&running).await.unwrap());

    assert!(spool.cancel(&queued).await.unwrap());
    assert!(!spool.cancel(&queued).await.unwrap());
    assert!(!spool.cancel(&running).await.unwrap());
    assert_eq!(spool.in_flight().await.unwrap(), vec![running]);
}

#[tokio::test]
async fn test_init_sweeps_leftovers() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir).await;

    tokio::fs::write(spool.path().join(".tmp_01ARZ3NDEKTSV4RRFFQ69G5FAV.job"), b"partial")
        .await
        .unwrap();
    tokio::fs::write(
        spool.path().join("01ARZ3NDEKTSV4RRFFQ69G5FAV.job.deleted"),
        b"gone",
    )
    .await
    .unwrap();

    spool.init().await.unwrap();

    let mut entries = tokio::fs::read_dir(spool.path()).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn test_due_orders_by_trigger_time() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir).await;
    let now = Utc::now();

    spool
        .enqueue(Job::new(ContentId(2), now - Duration::minutes(1)))
        .await
        .unwrap();
    spool
        .enqueue(Job::new(ContentId(1), now - Duration::minutes(10)))
        .await
        .unwrap();
    spool
        .enqueue(Job::new(ContentId(3), now + Duration::minutes(10)))
        .await
        .unwrap();

    let due: Vec<_> = spool
        .due(now)
        .await
        .unwrap()
        .into_iter()
        .map(|(_, job)| job.content_id)
        .collect();
    assert_eq!(due, vec![ContentId(1), ContentId(2)]);
}

#[tokio::test]
async fn test_claimed_job_is_never_seen_unstamped() {
    let dir = tempfile::tempdir().unwrap();
    let spool = Arc::new(spool_in(&dir).await);
    let watcher = Arc::new(FileJobSpool::new(spool.path()).unwrap());

    for n in 0..20 {
        let id = spool
            .enqueue(Job::new(ContentId(n), Utc::now()))
            .await
            .unwrap();

        let (claimed, recovered) = tokio::join!(
            spool.claim(&id),
            watcher.recover_stale(Duration::hours(1))
        );
        assert!(claimed.unwrap());
        assert_eq!(recovered.unwrap(), 0, "fresh claim requeued");
        assert!(spool.read(&id).await.unwrap().claimed_at.is_some());
        spool.complete(&id).await.unwrap();
    }

    assert!(spool.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_interrupted_claim_is_requeued_on_init() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir).await;

    let id = spool
        .enqueue(Job::new(ContentId(3), Utc::now()))
        .await
        .unwrap();
    tokio::fs::rename(
        spool.path().join(format!("{id}.job")),
        spool.path().join(format!("{id}.job.claiming")),
    )
    .await
    .unwrap();
    assert!(spool.list().await.unwrap().is_empty());
    assert!(spool.in_flight().await.unwrap().is_empty());

    spool.init().await.unwrap();

    assert_eq!(spool.list().await.unwrap(), vec![id.clone()]);
    assert!(spool.claim(&id).await.unwrap());
}
