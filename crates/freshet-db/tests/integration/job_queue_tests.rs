use std::time::Duration;

use freshet_core::error::AppError;
use freshet_core::job::{EnqueueOutcome, FailOutcome, JobStatus, RetryPolicy, ScrapeJob};
use freshet_core::job_queue::JobQueue;
use freshet_core::resource::{ResourceKind, ResourceRef};
use freshet_db::PgJobQueue;
use sqlx::PgPool;

use crate::integration::common::setup_test_db;

fn queue(pool: PgPool) -> PgJobQueue {
    PgJobQueue::new(pool, RetryPolicy::default(), Duration::from_secs(300))
}

/// Retry policy without backoff, so a failed job is immediately claimable.
fn instant(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        multiplier: 2.0,
        max_delay: Duration::ZERO,
    }
}

fn job(kind: ResourceKind, locator: &str) -> ScrapeJob {
    ScrapeJob::new(ResourceRef::new(kind, locator), 3)
}

#[tokio::test]
async fn enqueue_and_read_back() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    let submitted = ScrapeJob::new(
        ResourceRef::new(ResourceKind::Category, "https://shop.example.com/navigation/1")
            .with_parent("nav-1"),
        3,
    );
    let outcome = repo.enqueue(submitted.clone()).await.unwrap();
    assert_eq!(outcome, EnqueueOutcome::Enqueued);

    let stored = repo.get_job(&submitted.id).await.unwrap().unwrap();
    assert_eq!(stored.kind, ResourceKind::Category);
    assert_eq!(stored.locator, "https://shop.example.com/navigation/1");
    assert_eq!(stored.parent_id.as_deref(), Some("nav-1"));
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.attempts, 0);
    assert_eq!(stored.max_attempts, 3);
    assert!(stored.worker_id.is_none());
}

#[tokio::test]
async fn equivalent_locators_deduplicate() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    let first = repo
        .enqueue(job(ResourceKind::Product, "https://shop.example.com/products/1"))
        .await
        .unwrap();
    let second = repo
        .enqueue(job(ResourceKind::Product, "HTTPS://Shop.Example.com/products/1/"))
        .await
        .unwrap();

    assert_eq!(first, EnqueueOutcome::Enqueued);
    assert_eq!(second, EnqueueOutcome::Deduplicated);
    assert_eq!(repo.count_by_status(JobStatus::Pending).await.unwrap(), 1);
}

#[tokio::test]
async fn same_locator_different_kind_is_distinct() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    let locator = "https://shop.example.com/collections/fiction";
    repo.enqueue(job(ResourceKind::Category, locator)).await.unwrap();
    let outcome = repo.enqueue(job(ResourceKind::Product, locator)).await.unwrap();

    assert_eq!(outcome, EnqueueOutcome::Enqueued);
    assert_eq!(repo.list_jobs(None, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn running_job_blocks_resubmission() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    let j = job(ResourceKind::Navigation, "https://shop.example.com/en-gb");
    repo.enqueue(j.clone()).await.unwrap();
    repo.claim("worker-1").await.unwrap().unwrap();

    assert_eq!(repo.enqueue(j).await.unwrap(), EnqueueOutcome::Deduplicated);
}

#[tokio::test]
async fn claim_leases_to_one_worker() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    repo.enqueue(job(ResourceKind::Product, "https://shop.example.com/products/1"))
        .await
        .unwrap();

    let claimed = repo
        .claim("worker-1")
        .await
        .unwrap()
        .expect("Should claim the job");
    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.worker_id.as_deref(), Some("worker-1"));
    assert!(claimed.leased_until.is_some());

    assert!(repo.claim("worker-2").await.unwrap().is_none());
}

#[tokio::test]
async fn claim_returns_none_when_empty() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    assert!(repo.claim("worker-1").await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_claims_never_share_a_job() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    for n in 0..5 {
        repo.enqueue(job(
            ResourceKind::Product,
            &format!("https://shop.example.com/products/{n}"),
        ))
        .await
        .unwrap();
    }

    let mut handles = Vec::new();
    for w in 0..5 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.claim(&format!("worker-{w}")).await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        if let Some(job) = handle.await.unwrap() {
            ids.push(job.id);
        }
    }
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

#[tokio::test]
async fn expired_lease_is_redelivered() {
    let (pool, _container) = setup_test_db().await;
    let repo = PgJobQueue::new(pool, RetryPolicy::default(), Duration::from_millis(200));

    repo.enqueue(job(ResourceKind::Product, "https://shop.example.com/products/1"))
        .await
        .unwrap();
    let first = repo.claim("worker-1").await.unwrap().unwrap();
    assert!(repo.claim("worker-2").await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(400)).await;

    let second = repo.claim("worker-2").await.unwrap().expect("lease expired");
    assert_eq!(second.id, first.id);
    assert_eq!(second.worker_id.as_deref(), Some("worker-2"));
}

#[tokio::test]
async fn ack_removes_job() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    let j = job(ResourceKind::Product, "https://shop.example.com/products/1");
    repo.enqueue(j.clone()).await.unwrap();
    let claimed = repo.claim("worker-1").await.unwrap().unwrap();
    repo.ack(&claimed.id, "worker-1").await.unwrap();

    assert!(repo.get_job(&j.id).await.unwrap().is_none());
    // Resolved jobs no longer block the id.
    assert_eq!(repo.enqueue(j).await.unwrap(), EnqueueOutcome::Enqueued);
}

#[tokio::test]
async fn fail_schedules_backoff() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    repo.enqueue(job(ResourceKind::Product, "https://shop.example.com/products/1"))
        .await
        .unwrap();
    let claimed = repo.claim("worker-1").await.unwrap().unwrap();

    let outcome = repo.fail(&claimed.id, "worker-1", "HTTP 503").await.unwrap();
    assert_eq!(
        outcome,
        FailOutcome::Retrying {
            attempt: 1,
            delay: Duration::from_secs(2)
        }
    );

    let stored = repo.get_job(&claimed.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.last_error.as_deref(), Some("HTTP 503"));
    assert!(stored.worker_id.is_none());
    assert!(stored.next_run_at.unwrap() > stored.updated_at);

    // Not due until the backoff elapses.
    assert!(repo.claim("worker-1").await.unwrap().is_none());
}

#[tokio::test]
async fn exhausted_job_is_kept_as_failed() {
    let (pool, _container) = setup_test_db().await;
    let repo = PgJobQueue::new(pool, instant(3), Duration::from_secs(300));

    repo.enqueue(job(ResourceKind::Product, "https://shop.example.com/products/1"))
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    while let Some(claimed) = repo.claim("worker-1").await.unwrap() {
        outcomes.push(repo.fail(&claimed.id, "worker-1", "boom").await.unwrap());
    }

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[2], FailOutcome::Exhausted { attempts: 3 });
    let failed = repo.list_jobs(Some(JobStatus::Failed), 10).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 3);
    assert_eq!(repo.count_by_status(JobStatus::Failed).await.unwrap(), 1);
}

#[tokio::test]
async fn failed_job_is_not_redelivered_on_resubmit() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    let j = ScrapeJob::new(
        ResourceRef::new(ResourceKind::Product, "https://shop.example.com/products/1"),
        1,
    );
    repo.enqueue(j.clone()).await.unwrap();
    let claimed = repo.claim("worker-1").await.unwrap().unwrap();
    assert!(!repo.fail(&claimed.id, "worker-1", "boom").await.unwrap().will_retry());

    assert_eq!(repo.enqueue(j.clone()).await.unwrap(), EnqueueOutcome::Deduplicated);

    let kept = repo.get_job(&j.id).await.unwrap().unwrap();
    assert_eq!(kept.status, JobStatus::Failed);
    assert_eq!(kept.attempts, 1);
    assert_eq!(kept.last_error.as_deref(), Some("boom"));
    assert!(repo.claim("worker-2").await.unwrap().is_none());
}

#[tokio::test]
async fn retry_failed_revives_with_fresh_attempts() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    let j = ScrapeJob::new(
        ResourceRef::new(ResourceKind::Product, "https://shop.example.com/products/1"),
        1,
    );
    repo.enqueue(j.clone()).await.unwrap();
    assert!(repo.retry_failed(&j.id).await.unwrap().is_none());

    let claimed = repo.claim("worker-1").await.unwrap().unwrap();
    repo.fail(&claimed.id, "worker-1", "boom").await.unwrap();

    let revived = repo.retry_failed(&j.id).await.unwrap().expect("failed job");
    assert_eq!(revived.status, JobStatus::Pending);
    assert_eq!(revived.attempts, 0);
    assert_eq!(revived.last_error.as_deref(), Some("boom"));

    let again = repo.claim("worker-2").await.unwrap().unwrap();
    assert_eq!(again.id, j.id);
    assert!(repo.retry_failed("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn outcome_from_expired_lease_holder_is_rejected() {
    let (pool, _container) = setup_test_db().await;
    let repo = PgJobQueue::new(pool, RetryPolicy::default(), Duration::from_millis(200));

    repo.enqueue(job(ResourceKind::Product, "https://shop.example.com/products/1"))
        .await
        .unwrap();
    let first = repo.claim("worker-1").await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    repo.claim("worker-2").await.unwrap().expect("lease expired");

    let err = repo.fail(&first.id, "worker-1", "late").await.unwrap_err();
    assert!(matches!(err, AppError::LeaseLost { .. }));
    let err = repo.ack(&first.id, "worker-1").await.unwrap_err();
    assert!(matches!(err, AppError::LeaseLost { .. }));

    let stored = repo.get_job(&first.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Running);
    assert_eq!(stored.worker_id.as_deref(), Some("worker-2"));
    assert_eq!(stored.attempts, 0);
    assert!(stored.last_error.is_none());

    repo.ack(&first.id, "worker-2").await.unwrap();
    assert!(repo.get_job(&first.id).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_burst_enqueues_once() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.enqueue(job(ResourceKind::Product, "https://shop.example.com/products/1"))
                .await
                .unwrap()
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }
    let enqueued = outcomes
        .iter()
        .filter(|o| **o == EnqueueOutcome::Enqueued)
        .count();
    let deduplicated = outcomes
        .iter()
        .filter(|o| **o == EnqueueOutcome::Deduplicated)
        .count();

    assert_eq!(enqueued, 1);
    assert_eq!(deduplicated, 9);
    assert_eq!(repo.list_jobs(None, 100).await.unwrap().len(), 1);
}

#[tokio::test]
async fn fail_unknown_job_is_not_found() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    let err = repo.fail("missing", "worker-1", "boom").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn release_worker_jobs_returns_them_to_pending() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    for n in 0..2 {
        repo.enqueue(job(
            ResourceKind::Product,
            &format!("https://shop.example.com/products/{n}"),
        ))
        .await
        .unwrap();
    }
    repo.claim("worker-1").await.unwrap().unwrap();
    repo.claim("worker-1").await.unwrap().unwrap();

    let released = repo.release_worker_jobs("worker-1").await.unwrap();
    assert_eq!(released, 2);
    assert_eq!(repo.count_by_status(JobStatus::Pending).await.unwrap(), 2);
    assert_eq!(repo.count_by_status(JobStatus::Running).await.unwrap(), 0);
}

#[tokio::test]
async fn list_jobs_filters_by_status() {
    let (pool, _container) = setup_test_db().await;
    let repo = queue(pool);

    for n in 0..3 {
        repo.enqueue(job(
            ResourceKind::Product,
            &format!("https://shop.example.com/products/{n}"),
        ))
        .await
        .unwrap();
    }
    repo.claim("worker-1").await.unwrap().unwrap();

    assert_eq!(repo.list_jobs(None, 10).await.unwrap().len(), 3);
    assert_eq!(
        repo.list_jobs(Some(JobStatus::Running), 10).await.unwrap().len(),
        1
    );
    assert_eq!(repo.list_jobs(None, 2).await.unwrap().len(), 2);
}
