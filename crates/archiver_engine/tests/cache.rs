use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use archiver_engine::{CacheStage, FailureKind, StageCache, StageError};

#[tokio::test]
async fn identical_calls_compute_once() {
    let cache = StageCache::new();
    let runs = AtomicUsize::new(0);

    for _ in 0..3 {
        let value: String = cache
            .get_or_compute(CacheStage::Polish, &["<p>x</p>"], || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok("polished".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "polished");
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(cache.computations(), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn failures_are_replayed_not_retried() {
    let cache = StageCache::new();
    let runs = AtomicUsize::new(0);

    let first = cache
        .get_or_compute::<String, _, _>(CacheStage::Embed, &["https://a", "<p/>", "polished"], || async {
            runs.fetch_add(1, Ordering::SeqCst);
            Err(StageError::new(FailureKind::Embed, "exit code 1"))
        })
        .await
        .unwrap_err();
    let second = cache
        .get_or_compute::<String, _, _>(CacheStage::Embed, &["https://a", "<p/>", "polished"], || async {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok("would succeed now".to_string())
        })
        .await
        .unwrap_err();

    assert_eq!(first, second);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stages_and_arguments_are_kept_apart() {
    let cache = StageCache::new();
    let a: String = cache
        .get_or_compute(CacheStage::Markdown, &["<p/>", "polished"], || async { Ok("a".to_string()) })
        .await
        .unwrap();
    let b: String = cache
        .get_or_compute(CacheStage::Markdown, &["<p/>", "rendered"], || async { Ok("b".to_string()) })
        .await
        .unwrap();
    let c: String = cache
        .get_or_compute(CacheStage::Polish, &["<p/>", "polished"], || async { Ok("c".to_string()) })
        .await
        .unwrap();
    assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("a", "b", "c"));
    assert_eq!(cache.computations(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_calls_are_coalesced() {
    let cache = Arc::new(StageCache::new());
    let runs = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(CacheStage::Render, &["https://example.com"], || async {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42_u32)
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 42);
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn type_mismatch_under_one_key_is_an_internal_error() {
    let cache = StageCache::new();
    let _: u32 = cache
        .get_or_compute(CacheStage::Pdf, &["<html/>"], || async { Ok(1_u32) })
        .await
        .unwrap();
    let err = cache
        .get_or_compute::<String, _, _>(CacheStage::Pdf, &["<html/>"], || async { Ok(String::new()) })
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Internal);
}
