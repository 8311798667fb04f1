//! Tokio implementation of the scheduling seam.
//!
//! Every periodic read runs in its own task that awaits the read before the
//! next tick, so reads of one range never overlap. Results are sent back over
//! an unbounded channel to whoever owns the [`PollManager`](crate::PollManager).
//!
//! Cancelling only stops a task between reads. A read already on the wire is
//! allowed to finish and its result is discarded, so the transport never sees
//! a request abandoned halfway.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::poll::Scheduler;
use crate::transport::{ReadCompletion, ReadRequest, RegisterReader};

/// Spawns read tasks on the current tokio runtime.
pub struct TaskScheduler<R: RegisterReader + ?Sized + 'static> {
    reader: Arc<R>,
    completions: mpsc::UnboundedSender<ReadCompletion>,
}

impl<R: RegisterReader + ?Sized + 'static> TaskScheduler<R> {
    /// Create a scheduler and the receiver its completions arrive on.
    pub fn new(reader: Arc<R>) -> (Self, mpsc::UnboundedReceiver<ReadCompletion>) {
        let (completions, rx) = mpsc::unbounded_channel();
        (
            Self {
                reader,
                completions,
            },
            rx,
        )
    }
}

/// Stops one periodic read task. Dropping it stops the task as well.
#[derive(Debug)]
pub struct PollHandle {
    stop: watch::Sender<bool>,
}

impl<R: RegisterReader + ?Sized + 'static> Scheduler for TaskScheduler<R> {
    type Handle = PollHandle;

    fn schedule_periodic(&mut self, request: ReadRequest, interval: Duration) -> PollHandle {
        let reader = Arc::clone(&self.reader);
        let completions = self.completions.clone();
        let (stop, mut stopped) = watch::channel(false);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }
                trace!(range = %request.key, "Polling");

                let result = reader.read(&request).await;
                if *stopped.borrow() {
                    trace!(range = %request.key, "Poll cancelled during read");
                    break;
                }
                if completions
                    .send(ReadCompletion::new(request.clone(), result))
                    .is_err()
                {
                    debug!(range = %request.key, "Completion receiver dropped, stopping poll");
                    break;
                }
            }
        });

        PollHandle { stop }
    }

    fn cancel(&mut self, handle: PollHandle) {
        // The task may already be gone
        let _ = handle.stop.send(true);
    }

    fn submit_once(&mut self, request: ReadRequest) {
        let reader = Arc::clone(&self.reader);
        let completions = self.completions.clone();

        tokio::spawn(async move {
            let result = reader.read(&request).await;
            // Receiver gone means the device is shutting down
            let _ = completions.send(ReadCompletion::new(request, result));
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::ReadError;
    use crate::range::{RangeKey, ReadFunction};
    use crate::transport::ReadPurpose;

    #[derive(Default)]
    struct CountingReader {
        delay: Duration,
        reads: AtomicUsize,
        finished: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl RegisterReader for CountingReader {
        async fn read(&self, request: &ReadRequest) -> Result<Vec<u8>, ReadError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0u8; usize::from(request.key.count) * 2])
        }
    }

    fn request(purpose: ReadPurpose) -> ReadRequest {
        ReadRequest {
            key: RangeKey::new(ReadFunction::HoldingRegisters, 100, 26),
            max_tries: 3,
            purpose,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_reads_until_cancelled() {
        let reader = Arc::new(CountingReader::default());
        let (mut scheduler, mut rx) = TaskScheduler::new(Arc::clone(&reader));

        let handle = scheduler.schedule_periodic(request(ReadPurpose::Poll), Duration::from_secs(5));

        // First read is immediate
        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.request.purpose, ReadPurpose::Poll);
        assert_eq!(completion.result.unwrap().len(), 52);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(reader.reads.load(Ordering::SeqCst), 3);

        scheduler.cancel(handle);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(reader.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_reads_never_overlap() {
        let reader = Arc::new(CountingReader {
            delay: Duration::from_secs(8),
            ..Default::default()
        });
        let (mut scheduler, mut rx) = TaskScheduler::new(Arc::clone(&reader));

        let handle = scheduler.schedule_periodic(request(ReadPurpose::Poll), Duration::from_secs(5));

        for _ in 0..3 {
            assert!(rx.recv().await.unwrap().result.is_ok());
        }
        scheduler.cancel(handle);

        assert_eq!(reader.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_lets_read_in_progress_finish() {
        let reader = Arc::new(CountingReader {
            delay: Duration::from_secs(2),
            ..Default::default()
        });
        let (mut scheduler, mut rx) = TaskScheduler::new(Arc::clone(&reader));

        let handle = scheduler.schedule_periodic(request(ReadPurpose::Poll), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
        scheduler.cancel(handle);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
        assert_eq!(reader.finished.load(Ordering::SeqCst), 1);
        // The result of the cancelled poll is dropped
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_stops_polling() {
        let reader = Arc::new(CountingReader::default());
        let (mut scheduler, mut rx) = TaskScheduler::new(Arc::clone(&reader));

        let handle = scheduler.schedule_periodic(request(ReadPurpose::Poll), Duration::from_secs(5));
        assert!(rx.recv().await.unwrap().result.is_ok());
        drop(handle);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_once() {
        let reader = Arc::new(CountingReader::default());
        let (mut scheduler, mut rx) = TaskScheduler::new(Arc::clone(&reader));

        scheduler.submit_once(request(ReadPurpose::Refresh));

        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.request.purpose, ReadPurpose::Refresh);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
    }
}
