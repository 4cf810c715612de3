//! Poll coordinator: run an async producer on a fixed period and publish
//! `data` / `loading` / `error` for readers.
//!
//! State transitions:
//! - creation → `Active`:   timer armed, optional immediate attempt
//! - `Active` → `Idle`:     [`Poller::pause`], in-flight attempt still lands
//! - `Idle` → `Active`:     [`Poller::resume`], first tick one period later
//! - any → `TornDown`:      [`Poller::shutdown`] or drop, state frozen
//!
//! A tick that fires while the previous attempt is still running is skipped,
//! so at most one attempt is ever in flight.

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Default delay between timer fires.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(400);

/// Callback invoked with the failure of every failed attempt.
pub type ErrorCallback<E> = Arc<dyn Fn(&E) + Send + Sync>;

type Producer<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Configuration for a [`Poller`].
pub struct PollConfig<E> {
    /// Period of the timer. Measured between fires, not between completions.
    pub interval: Duration,
    /// Run one attempt right away instead of waiting for the first tick.
    pub immediate: bool,
    pub on_error: Option<ErrorCallback<E>>,
}

impl<E> Default for PollConfig<E> {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            immediate: true,
            on_error: None,
        }
    }
}

impl<E> Clone for PollConfig<E> {
    fn clone(&self) -> Self {
        Self {
            interval: self.interval,
            immediate: self.immediate,
            on_error: self.on_error.clone(),
        }
    }
}

impl<E> fmt::Debug for PollConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollConfig")
            .field("interval", &self.interval)
            .field("immediate", &self.immediate)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<E> PollConfig<E> {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&E) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

/// What readers see. A success clears `error`; a failure keeps `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState<T, E> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<E>,
}

impl<T, E> Default for PollState<T, E> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

/// Lifecycle of a [`Poller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Timer armed.
    Active,
    /// Paused; no new attempts are scheduled.
    Idle,
    /// Terminal. No attempt starts and no state changes.
    TornDown,
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Idle => write!(f, "idle"),
            Self::TornDown => write!(f, "torn-down"),
        }
    }
}

/// Command channel value read by the driver task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    /// Timer runs with its first fire one period after the instant.
    Armed(Instant),
    Paused,
    Stopped,
}

struct Shared<T, E> {
    producer: Producer<T, E>,
    state: watch::Sender<PollState<T, E>>,
    /// Cleared exactly once, under the state lock, at teardown.
    alive: AtomicBool,
    in_flight: AtomicBool,
    on_error: Option<ErrorCallback<E>>,
}

impl<T, E> Shared<T, E> {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn tear_down(&self) {
        self.state.send_if_modified(|_| {
            self.alive.store(false, Ordering::Release);
            false
        });
    }
}

impl<T, E> Shared<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Apply `f` to the state unless the poller has been torn down.
    fn write(&self, f: impl FnOnce(&mut PollState<T, E>)) {
        self.state.send_if_modified(|state| {
            if !self.is_alive() {
                return false;
            }
            f(state);
            true
        });
    }

    /// Start one attempt if none is running.
    fn launch(self: &Arc<Self>) {
        if !self.is_alive() {
            return;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("previous poll attempt still in flight, skipping tick");
            return;
        }

        self.write(|state| state.loading = true);
        let attempt = match panic::catch_unwind(AssertUnwindSafe(|| (self.producer)())) {
            Ok(attempt) => attempt,
            Err(_) => {
                self.abandon();
                return;
            }
        };
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            match AssertUnwindSafe(attempt).catch_unwind().await {
                Ok(outcome) => shared.finish(outcome),
                Err(_) => shared.abandon(),
            }
        });
    }

    /// Release a panicked attempt so later ticks can run.
    fn abandon(&self) {
        tracing::warn!("poll attempt panicked, keeping previous state");
        self.write(|state| state.loading = false);
        self.in_flight.store(false, Ordering::Release);
    }

    fn finish(&self, outcome: Result<T, E>) {
        match outcome {
            Ok(value) => self.write(|state| {
                state.data = Some(value);
                state.error = None;
                state.loading = false;
            }),
            Err(error) => {
                if self.is_alive() {
                    tracing::debug!("poll attempt failed");
                    if let Some(callback) = &self.on_error {
                        callback(&error);
                    }
                }
                self.write(|state| {
                    state.error = Some(error);
                    state.loading = false;
                });
            }
        }
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Handle to a running poll loop.
///
/// Dropping the handle tears the loop down.
pub struct Poller<T, E> {
    shared: Arc<Shared<T, E>>,
    schedule: watch::Sender<Schedule>,
    state: watch::Receiver<PollState<T, E>>,
    driver: JoinHandle<()>,
}

impl<T, E> Poller<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Start polling `producer`. Must be called from within a Tokio runtime.
    ///
    /// With `immediate` set, the first attempt is launched before this
    /// returns.
    pub fn spawn<F, Fut>(producer: F, config: PollConfig<E>) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let period = config.interval.max(Duration::from_millis(1));
        let (state_tx, state_rx) = watch::channel(PollState::default());
        let shared = Arc::new(Shared {
            producer: Arc::new(move || producer().boxed()),
            state: state_tx,
            alive: AtomicBool::new(true),
            in_flight: AtomicBool::new(false),
            on_error: config.on_error,
        });

        let (schedule_tx, schedule_rx) = watch::channel(Schedule::Armed(Instant::now()));

        if config.immediate {
            shared.launch();
        }

        let driver = tokio::spawn(drive(Arc::clone(&shared), schedule_rx, period));
        tracing::debug!(interval_ms = period.as_millis() as u64, "poller started");

        Self {
            shared,
            schedule: schedule_tx,
            state: state_rx,
            driver,
        }
    }

    /// Stop scheduling new attempts. An attempt already running finishes and
    /// its result is still applied. No-op unless active.
    pub fn pause(&self) {
        let paused = self.schedule.send_if_modified(|schedule| match schedule {
            Schedule::Armed(_) => {
                *schedule = Schedule::Paused;
                true
            }
            _ => false,
        });
        if paused {
            tracing::debug!("poller paused");
        }
    }

    /// Re-arm the timer; the next attempt fires one full period from now.
    /// No-op unless paused.
    pub fn resume(&self) {
        let resumed = self.schedule.send_if_modified(|schedule| match schedule {
            Schedule::Paused => {
                *schedule = Schedule::Armed(Instant::now());
                true
            }
            _ => false,
        });
        if resumed {
            tracing::debug!("poller resumed");
        }
    }

    /// Tear the poller down. Safe to call more than once; afterwards no
    /// attempt starts and the published state never changes again.
    pub fn shutdown(&self) {
        self.shared.tear_down();
        let stopped = self.schedule.send_if_modified(|schedule| {
            if *schedule == Schedule::Stopped {
                false
            } else {
                *schedule = Schedule::Stopped;
                true
            }
        });
        if stopped {
            tracing::debug!("poller torn down");
        }
    }

    pub fn status(&self) -> PollStatus {
        match *self.schedule.borrow() {
            Schedule::Armed(_) => PollStatus::Active,
            Schedule::Paused => PollStatus::Idle,
            Schedule::Stopped => PollStatus::TornDown,
        }
    }

    /// A receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<PollState<T, E>> {
        self.state.clone()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PollState<T, E>
    where
        T: Clone,
        E: Clone,
    {
        self.state.borrow().clone()
    }

    /// Returns `true` once the driver task has exited.
    pub fn is_finished(&self) -> bool {
        self.driver.is_finished()
    }
}

impl<T, E> Drop for Poller<T, E> {
    fn drop(&mut self) {
        self.shared.tear_down();
        self.schedule.send_replace(Schedule::Stopped);
    }
}

fn ticker(armed_at: Instant, period: Duration) -> Interval {
    let mut interval = time::interval_at(armed_at + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(ticker: &mut Option<(Instant, Interval)>) {
    match ticker {
        Some((_, interval)) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Background task owning the timer.
async fn drive<T, E>(
    shared: Arc<Shared<T, E>>,
    mut schedule: watch::Receiver<Schedule>,
    period: Duration,
) where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let mut armed: Option<(Instant, Interval)> = None;

    loop {
        let current = *schedule.borrow_and_update();
        match current {
            Schedule::Armed(at) => {
                if armed.as_ref().map(|(since, _)| *since) != Some(at) {
                    armed = Some((at, ticker(at, period)));
                }
            }
            Schedule::Paused => armed = None,
            Schedule::Stopped => break,
        }

        // Control changes win over a tick that is ready at the same time.
        tokio::select! {
            biased;
            changed = schedule.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = next_tick(&mut armed) => {
                if matches!(*schedule.borrow(), Schedule::Armed(_)) {
                    shared.launch();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn counting(calls: Arc<AtomicUsize>) -> impl Fn() -> futures::future::Ready<Result<u32, String>> {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(42))
        }
    }

    fn slow(
        calls: Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl Fn() -> BoxFuture<'static, Result<u32, String>> {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                time::sleep(delay).await;
                Ok(7)
            }
            .boxed()
        }
    }

    /// Let spawned tasks run without reaching the next tick.
    async fn settle() {
        time::sleep(Duration::from_millis(1)).await;
    }

    fn every(ms: u64) -> PollConfig<String> {
        PollConfig::default().interval(Duration::from_millis(ms))
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_attempt_on_creation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn(counting(calls.clone()), every(1000).immediate(true));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(poller.state().data, Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn no_attempt_before_first_tick_when_not_immediate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn(counting(calls.clone()), every(1000).immediate(false));

        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(poller.state(), PollState::default());

        time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_repeatedly_at_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let _poller = Poller::spawn(counting(calls.clone()), every(500));

        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_millis(1500)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_toggles_around_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn(counting(calls), every(500));

        assert!(poller.state().loading);
        settle().await;

        let state = poller.state();
        assert!(!state.loading);
        assert_eq!(state.data, Some(42));
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_data_and_success_clears_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reported = Arc::new(Mutex::new(Vec::new()));

        let producer = {
            let calls = calls.clone();
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                futures::future::ready(match n {
                    0 => Err("boom".to_string()),
                    1 => Ok(1u32),
                    _ => Err("again".to_string()),
                })
            }
        };
        let config = {
            let reported = reported.clone();
            every(500).on_error(move |e: &String| reported.lock().unwrap().push(e.clone()))
        };
        let poller = Poller::spawn(producer, config);

        settle().await;
        let state = poller.state();
        assert_eq!(state.error.as_deref(), Some("boom"));
        assert_eq!(state.data, None);
        assert!(!state.loading);

        time::sleep(Duration::from_millis(500)).await;
        settle().await;
        let state = poller.state();
        assert_eq!(state.data, Some(1));
        assert_eq!(state.error, None);

        time::sleep(Duration::from_millis(500)).await;
        settle().await;
        let state = poller.state();
        assert_eq!(state.data, Some(1));
        assert_eq!(state.error.as_deref(), Some("again"));

        assert_eq!(*reported.lock().unwrap(), vec!["boom", "again"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_and_resume_rearms() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn(counting(calls.clone()), every(500));

        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        poller.pause();
        assert_eq!(poller.status(), PollStatus::Idle);
        time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        poller.resume();
        assert_eq!(poller.status(), PollStatus::Active);
        time::sleep(Duration::from_millis(499)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_millis(551)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_while_active_is_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn(counting(calls.clone()), every(500).immediate(false));

        time::sleep(Duration::from_millis(400)).await;
        poller.resume();
        time::sleep(Duration::from_millis(150)).await;
        // The first schedule still fired at 500 ms.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_lets_in_flight_attempt_land() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn(slow(calls.clone(), Duration::from_millis(100)), every(500));

        settle().await;
        poller.pause();
        assert!(poller.state().loading);

        time::sleep(Duration::from_millis(200)).await;
        let state = poller.state();
        assert_eq!(state.data, Some(7));
        assert!(!state.loading);

        time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_freezes_state() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn(slow(calls.clone(), Duration::from_millis(100)), every(500));

        settle().await;
        assert!(poller.state().loading);

        poller.shutdown();
        poller.shutdown();
        assert_eq!(poller.status(), PollStatus::TornDown);

        time::sleep(Duration::from_millis(3000)).await;
        let state = poller.state();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(state.loading);
        assert_eq!(state.data, None);
        assert!(poller.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_after_shutdown_is_not_reported() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let producer = || {
            async {
                time::sleep(Duration::from_millis(100)).await;
                Err::<u32, String>("late".to_string())
            }
            .boxed()
        };
        let config = {
            let reported = reported.clone();
            every(500).on_error(move |e: &String| reported.lock().unwrap().push(e.clone()))
        };
        let poller = Poller::spawn(producer, config);

        settle().await;
        assert!(poller.state().loading);
        poller.shutdown();

        time::sleep(Duration::from_millis(300)).await;
        assert!(reported.lock().unwrap().is_empty());
        assert_eq!(poller.state().error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_at_tick_boundary_prevents_attempt() {
        for _ in 0..50 {
            let calls = Arc::new(AtomicUsize::new(0));
            let poller = Poller::spawn(counting(calls.clone()), every(500).immediate(false));

            time::sleep(Duration::from_millis(500)).await;
            if calls.load(Ordering::SeqCst) != 0 {
                continue;
            }
            poller.pause();

            time::sleep(Duration::from_millis(5000)).await;
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_attempt_does_not_stall_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let producer = {
            let calls = calls.clone();
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        panic!("attempt blew up");
                    }
                    Ok::<u32, String>(5)
                }
                .boxed()
            }
        };
        let poller = Poller::spawn(producer, every(100));

        settle().await;
        assert!(!poller.state().loading);

        time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        let state = poller.state();
        assert!(calls.load(Ordering::SeqCst) > 1);
        assert_eq!(state.data, Some(5));
        assert!(!state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_producer_call_does_not_stall_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let producer = {
            let calls = calls.clone();
            move || {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("producer blew up");
                }
                futures::future::ready(Ok::<u32, String>(9))
            }
        };
        let poller = Poller::spawn(producer, every(100));

        assert!(!poller.state().loading);
        time::sleep(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(poller.state().data, Some(9));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn(counting(calls.clone()), every(500));

        settle().await;
        drop(poller);

        time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_do_not_overlap() {
        let calls = Arc::new(AtomicUsize::new(0));
        let _poller = Poller::spawn(slow(calls.clone(), Duration::from_millis(1200)), every(500));

        // Ticks at 500 and 1000 land while the first attempt runs.
        time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_millis(450)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_updates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn(counting(calls), every(500).immediate(false));
        let mut rx = poller.subscribe();

        let state = rx.wait_for(|s| s.data.is_some()).await.unwrap().clone();
        assert_eq!(state.data, Some(42));
        assert!(!state.loading);
    }
}
