use chrono::NaiveDate;
use futures_util::StreamExt;
use pricecast::application::ml::{
    CancellationFlag, NullObserver, NumericBackend, TrainingObserver, progress_channel,
};
use pricecast::application::prediction_service::{OverlapPolicy, PredictionService};
use pricecast::domain::errors::PipelineError;
use pricecast::domain::market::PriceSeries;
use pricecast::domain::ml::{EpochEvent, ModelSpec};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn ramp() -> PriceSeries {
    let closes: Vec<f64> = (10..=20).map(|v| v as f64).collect();
    PriceSeries::from_closes(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), &closes).unwrap()
}

fn quick_spec() -> ModelSpec {
    ModelSpec::compact().with_epochs(4).with_seed(Some(21))
}

/// Holds the training thread at the end of the first epoch until released.
struct GateObserver {
    release: Mutex<mpsc::Receiver<()>>,
}

impl GateObserver {
    fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(Self {
                release: Mutex::new(rx),
            }),
            tx,
        )
    }
}

impl TrainingObserver for GateObserver {
    fn on_epoch_end(&self, event: &EpochEvent) {
        if event.epoch == 1 {
            let _ = self.release.lock().unwrap().recv();
        }
    }
}

/// Requests cancellation once the given epoch has finished.
struct CancelAfter {
    epoch: usize,
    flag: CancellationFlag,
}

impl TrainingObserver for CancelAfter {
    fn on_epoch_end(&self, event: &EpochEvent) {
        if event.epoch == self.epoch {
            self.flag.cancel();
        }
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

#[tokio::test]
async fn test_overlapping_request_is_rejected() {
    let backend = NumericBackend::standalone();
    let service = Arc::new(PredictionService::new(Arc::clone(&backend), quick_spec()));
    let (gate, release) = GateObserver::new();

    let first = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .predict_observed("FIRST", ramp(), gate, CancellationFlag::new())
                .await
        })
    };
    wait_until(|| service.is_busy()).await;

    let err = service.predict("SECOND", ramp()).await.unwrap_err();
    assert_eq!(err, PipelineError::SessionBusy);
    assert_eq!(err.user_message(), "A prediction is already running for this session");

    release.send(()).unwrap();
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.symbol, "FIRST");
    assert!(!service.is_busy());
    assert_eq!(backend.live_buffers(), 0);
}

#[tokio::test]
async fn test_queued_request_waits_for_the_first() {
    let service = Arc::new(
        PredictionService::new(NumericBackend::standalone(), quick_spec())
            .with_overlap_policy(OverlapPolicy::Queue),
    );
    let (gate, release) = GateObserver::new();

    let first = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .predict_observed("FIRST", ramp(), gate, CancellationFlag::new())
                .await
        })
    };
    wait_until(|| service.is_busy()).await;

    let second = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.predict("SECOND", ramp()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!second.is_finished());

    release.send(()).unwrap();
    assert!(first.await.unwrap().is_ok());
    assert_eq!(second.await.unwrap().unwrap().symbol, "SECOND");
}

#[tokio::test]
async fn test_cancellation_stops_at_epoch_boundary() {
    let backend = NumericBackend::standalone();
    let service = PredictionService::new(
        Arc::clone(&backend),
        ModelSpec::compact().with_epochs(50).with_seed(Some(4)),
    );
    let flag = CancellationFlag::new();
    let observer = Arc::new(CancelAfter {
        epoch: 3,
        flag: flag.clone(),
    });

    let err = service
        .predict_observed("CANCEL", ramp(), observer, flag)
        .await
        .unwrap_err();

    assert_eq!(err, PipelineError::Cancelled { completed_epochs: 3 });
    assert!(!service.is_busy());
    assert_eq!(backend.live_buffers(), 0);
}

#[tokio::test]
async fn test_timeout_cancels_training() {
    let backend = NumericBackend::standalone();
    let service = PredictionService::new(
        Arc::clone(&backend),
        ModelSpec::compact().with_epochs(10_000_000).with_seed(Some(4)),
    )
    .with_timeout(Some(Duration::from_millis(50)));

    let err = service.predict("SLOW", ramp()).await.unwrap_err();
    assert_eq!(err, PipelineError::TimedOut { after_ms: 50 });

    // The worker stops at its next epoch boundary and releases the session
    wait_until(|| !service.is_busy()).await;
    assert_eq!(backend.live_buffers(), 0);
}

#[tokio::test]
async fn test_progress_stream_delivers_every_epoch() {
    let service = PredictionService::new(NumericBackend::standalone(), quick_spec());
    let (observer, events) = progress_channel();

    let report = service
        .predict_observed("STREAM", ramp(), Arc::new(observer), CancellationFlag::new())
        .await
        .unwrap();

    let events: Vec<EpochEvent> = events.collect().await;
    assert_eq!(events.len(), 4);
    assert_eq!(
        events.iter().map(|e| e.epoch).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert!(events.iter().all(|e| e.total_epochs == 4 && e.loss.is_finite()));
    assert_eq!(report.training.final_loss, Some(events[3].loss));
}

#[tokio::test]
async fn test_sessions_do_not_block_each_other() {
    let backend = NumericBackend::standalone();
    let first = PredictionService::new(Arc::clone(&backend), quick_spec());
    let second = PredictionService::new(Arc::clone(&backend), quick_spec());

    let (a, b) = tokio::join!(
        first.predict_observed("A", ramp(), Arc::new(NullObserver), CancellationFlag::new()),
        second.predict_observed("B", ramp(), Arc::new(NullObserver), CancellationFlag::new()),
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(backend.live_buffers(), 0);
}
