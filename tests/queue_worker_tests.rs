use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use discorgeous::playback::PlaybackError;
use discorgeous::queue::{SpeakJob, SpeakQueue};
use discorgeous::tts::TtsError;
use discorgeous::voice::VoiceError;

fn job(text: &str, dedupe_key: &str) -> SpeakJob {
    SpeakJob::new(text, "", false, Duration::ZERO, dedupe_key)
}

/// Handler that records every processed text on a channel.
fn recording_handler(
    tx: mpsc::UnboundedSender<String>,
) -> discorgeous::queue::PlaybackHandler {
    Arc::new(move |_token, job| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(job.text.clone());
            Ok::<(), PlaybackError>(())
        })
    })
}

async fn recv_timeout<T>(rx: &mut mpsc::UnboundedReceiver<T>, millis: u64) -> Option<T> {
    tokio::time::timeout(Duration::from_millis(millis), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn jobs_are_processed_in_fifo_order() {
    let queue = Arc::new(SpeakQueue::new(10, Duration::ZERO));
    let (tx, mut rx) = mpsc::unbounded_channel();
    queue.set_playback_handler(recording_handler(tx));
    queue.start();

    queue.enqueue(job("one", "")).unwrap();
    queue.enqueue(job("two", "")).unwrap();
    queue.enqueue(job("three", "")).unwrap();

    assert_eq!(recv_timeout(&mut rx, 1000).await.as_deref(), Some("one"));
    assert_eq!(recv_timeout(&mut rx, 1000).await.as_deref(), Some("two"));
    assert_eq!(recv_timeout(&mut rx, 1000).await.as_deref(), Some("three"));

    queue.stop().await;
}

#[tokio::test]
async fn dedupe_key_reusable_after_completion() {
    let queue = Arc::new(SpeakQueue::new(10, Duration::ZERO));
    let (tx, mut rx) = mpsc::unbounded_channel();
    queue.set_playback_handler(recording_handler(tx));

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    queue.set_job_completed_callback(Arc::new(move |job| {
        let _ = done_tx.send(job.id.clone());
    }));
    queue.start();

    queue.enqueue(job("A", "k")).unwrap();
    recv_timeout(&mut done_rx, 1000).await.expect("first done");

    // The key left the index at dequeue, so it can be reused
    queue.enqueue(job("B", "k")).unwrap();
    recv_timeout(&mut done_rx, 1000).await.expect("second done");

    assert_eq!(recv_timeout(&mut rx, 100).await.as_deref(), Some("A"));
    assert_eq!(recv_timeout(&mut rx, 100).await.as_deref(), Some("B"));

    queue.stop().await;
}

#[tokio::test]
async fn interrupt_cancels_in_flight_job() {
    let queue = Arc::new(SpeakQueue::new(10, Duration::ZERO));

    let (started_tx, mut started_rx) = mpsc::unbounded_channel::<()>();
    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(String, bool)>();

    // Blocks on its token; reports (text, was_cancelled) when it returns
    queue.set_playback_handler(Arc::new(move |token: CancellationToken, job| {
        let started_tx = started_tx.clone();
        let result_tx = result_tx.clone();
        Box::pin(async move {
            let _ = started_tx.send(());
            if job.text == "long" {
                token.cancelled().await;
                let _ = result_tx.send((job.text.clone(), true));
                return Err(PlaybackError::Voice(VoiceError::Cancelled));
            }
            let _ = result_tx.send((job.text.clone(), false));
            Ok::<(), PlaybackError>(())
        })
    }));
    queue.start();

    queue.enqueue(job("long", "")).unwrap();
    recv_timeout(&mut started_rx, 1000)
        .await
        .expect("long job started");

    // Interrupt, then enqueue the urgent job - the ingress order
    queue.interrupt();
    queue.enqueue(job("Urgent", "")).unwrap();

    let (text, cancelled) = recv_timeout(&mut result_rx, 1000).await.expect("first result");
    assert_eq!(text, "long");
    assert!(cancelled);

    let (text, cancelled) = recv_timeout(&mut result_rx, 1000).await.expect("second result");
    assert_eq!(text, "Urgent");
    assert!(!cancelled);

    queue.stop().await;
}

#[tokio::test]
async fn idle_callback_fires_after_queue_drains() {
    let queue = Arc::new(SpeakQueue::new(10, Duration::from_millis(50)));

    let processing = Arc::new(AtomicUsize::new(0));
    let idle_during_processing = Arc::new(AtomicUsize::new(0));

    let (idle_tx, mut idle_rx) = mpsc::unbounded_channel::<()>();
    {
        let processing = processing.clone();
        let idle_during_processing = idle_during_processing.clone();
        queue.set_idle_callback(Arc::new(move || {
            if processing.load(Ordering::SeqCst) > 0 {
                idle_during_processing.fetch_add(1, Ordering::SeqCst);
            }
            let _ = idle_tx.send(());
        }));
    }

    {
        let processing = processing.clone();
        queue.set_playback_handler(Arc::new(move |_token, _job| {
            let processing = processing.clone();
            Box::pin(async move {
                processing.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                processing.fetch_sub(1, Ordering::SeqCst);
                Ok::<(), PlaybackError>(())
            })
        }));
    }
    queue.start();

    queue.enqueue(job("speak", "")).unwrap();

    // Fires within a small multiple of the timeout once the job is done
    recv_timeout(&mut idle_rx, 1000).await.expect("idle fired");
    assert_eq!(idle_during_processing.load(Ordering::SeqCst), 0);

    queue.stop().await;
}

#[tokio::test]
async fn expired_jobs_are_skipped_at_dequeue() {
    let queue = Arc::new(SpeakQueue::new(10, Duration::ZERO));

    let (block_tx, mut block_rx) = mpsc::unbounded_channel::<()>();
    let (tx, mut rx) = mpsc::unbounded_channel();

    // First job holds the worker long enough for the second to expire
    queue.set_playback_handler(Arc::new(move |_token, job| {
        let tx = tx.clone();
        let block_tx = block_tx.clone();
        Box::pin(async move {
            let _ = block_tx.send(());
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(job.text.clone());
            Ok::<(), PlaybackError>(())
        })
    }));
    queue.start();

    queue.enqueue(job("blocker", "")).unwrap();
    recv_timeout(&mut block_rx, 1000).await.expect("started");

    queue
        .enqueue(SpeakJob::new("stale", "", false, Duration::from_millis(1), ""))
        .unwrap();
    queue.enqueue(job("fresh", "")).unwrap();

    assert_eq!(recv_timeout(&mut rx, 1000).await.as_deref(), Some("blocker"));
    // "stale" was dropped at dequeue time
    assert_eq!(recv_timeout(&mut rx, 1000).await.as_deref(), Some("fresh"));
    assert!(recv_timeout(&mut rx, 100).await.is_none());

    queue.stop().await;
}

#[tokio::test]
async fn shutdown_callback_fires_once_after_worker_exit() {
    let queue = Arc::new(SpeakQueue::new(10, Duration::ZERO));

    let shutdown_count = Arc::new(AtomicUsize::new(0));
    {
        let shutdown_count = shutdown_count.clone();
        queue.set_shutdown_callback(Arc::new(move || {
            shutdown_count.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    queue.set_playback_handler(recording_handler(tx));
    queue.start();

    queue.enqueue(job("last words", "")).unwrap();
    recv_timeout(&mut rx, 1000).await.expect("handled");

    queue.stop().await;
    assert_eq!(shutdown_count.load(Ordering::SeqCst), 1);

    // Enqueues after stop are refused
    assert!(queue.enqueue(job("too late", "")).is_err());
}

#[tokio::test]
async fn cancelled_synthesis_counts_as_cancelled() {
    // A handler error chain built from a cancelled stage is not a failure
    let err = PlaybackError::Synthesis(TtsError::Cancelled);
    assert!(err.is_cancelled());

    let err = PlaybackError::Synthesis(TtsError::SynthesisFailed("boom".into()));
    assert!(!err.is_cancelled());
}
