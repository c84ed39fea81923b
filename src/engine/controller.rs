//! Async driver: runs one `SignEngine` on a dedicated tokio task.
//!
//! Every input (tracker ticks and user commands) goes through one mpsc
//! queue, so frames, commands and timer expiries are applied strictly in
//! arrival order. Deadlines are awaited with `sleep_until` and always
//! processed before a command that arrives after them.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::announce::Announcer;
use crate::models::{GestureTemplate, HandFrame, TestRecord};
use crate::{log_info, log_warn};

use super::events::EngineEvent;
use super::sign_engine::{EngineSnapshot, SignEngine};

const ENABLE_LOGS: bool = true;

const COMMAND_QUEUE_DEPTH: usize = 256;
const EVENT_BUFFER: usize = 256;

type EngineTask = Box<dyn FnOnce(&mut SignEngine, std::time::Instant) -> Vec<EngineEvent> + Send>;

enum EngineCommand {
    Execute(EngineTask),
}

#[derive(Clone)]
pub struct EngineController {
    commands: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
    cancel_token: CancellationToken,
    handle: Arc<Mutex<Option<JoinHandle<SignEngine>>>>,
}

impl EngineController {
    pub fn spawn(engine: SignEngine, announcer: Arc<dyn Announcer>) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(engine_loop(
            engine,
            command_rx,
            events.clone(),
            announcer,
            cancel_token.clone(),
        ));

        Self {
            commands,
            events,
            cancel_token,
            handle: Arc::new(Mutex::new(Some(handle))),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn submit_frame(&self, hands: Vec<HandFrame>) -> Result<()> {
        self.send(Box::new(move |engine, now| engine.on_frame(hands, now)))
            .await
    }

    pub async fn tracker_failed(&self, message: String) -> Result<()> {
        self.send(Box::new(move |engine, _| engine.on_tracker_failed(message)))
            .await
    }

    pub async fn tracker_ready(&self) -> Result<()> {
        self.send(Box::new(|engine, _| engine.on_tracker_ready()))
            .await
    }

    pub async fn start_test(&self, target: String) -> Result<()> {
        self.request(move |engine, now| fallible(engine.start_test(&target, now)))
            .await?
    }

    /// Quiz on a random least-tested sign.
    pub async fn start_quiz(&self) -> Result<()> {
        self.request(|engine, now| fallible(engine.start_quiz(&mut rand::thread_rng(), now)))
            .await?
    }

    pub async fn cancel_test(&self) -> Result<()> {
        self.request(|engine, _| ((), engine.cancel_test())).await
    }

    pub async fn begin_recording(&self, name: String) -> Result<()> {
        self.request(move |engine, now| fallible(engine.begin_recording(&name, now)))
            .await?
    }

    pub async fn cancel_recording(&self) -> Result<()> {
        self.request(|engine, now| ((), engine.cancel_recording(now)))
            .await
    }

    pub async fn delete_template(&self, name: String) -> Result<()> {
        self.request(move |engine, _| fallible(engine.delete_template(&name)))
            .await?
    }

    pub async fn clear_templates(&self) -> Result<usize> {
        self.request(|engine, _| {
            let removed = engine.templates().len();
            (removed, engine.clear_templates())
        })
        .await
    }

    pub async fn reset_results(&self) -> Result<()> {
        self.request(|engine, _| ((), engine.reset_results())).await
    }

    pub async fn set_confidence_threshold(&self, value: f32) -> Result<()> {
        self.request(move |engine, now| fallible(engine.set_confidence_threshold(value, now)))
            .await?
    }

    pub async fn set_recognition_enabled(&self, enabled: bool) -> Result<()> {
        self.request(move |engine, now| ((), engine.set_recognition_enabled(enabled, now)))
            .await
    }

    pub async fn set_announcements_enabled(&self, enabled: bool) -> Result<()> {
        self.request(move |engine, _| {
            engine.set_announcements_enabled(enabled);
            ((), Vec::new())
        })
        .await
    }

    pub async fn set_test_mode(&self, enabled: bool) -> Result<()> {
        self.request(move |engine, _| ((), engine.set_test_mode(enabled)))
            .await
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        self.request(|engine, _| (engine.snapshot(), Vec::new()))
            .await
    }

    pub async fn templates(&self) -> Result<Vec<GestureTemplate>> {
        self.request(|engine, _| (engine.templates().iter().cloned().collect(), Vec::new()))
            .await
    }

    pub async fn results(&self) -> Result<Vec<TestRecord>> {
        self.request(|engine, _| (engine.ledger().records().to_vec(), Vec::new()))
            .await
    }

    /// Stops the engine task and hands the engine back. Commands already
    /// queued behind the shutdown are dropped.
    pub async fn shutdown(&self) -> Result<SignEngine> {
        self.cancel_token.cancel();
        let handle = self
            .handle
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("engine already shut down"))?;
        handle.await.context("engine task failed to join")
    }

    async fn send(&self, task: EngineTask) -> Result<()> {
        self.commands
            .send(EngineCommand::Execute(task))
            .await
            .map_err(|_| anyhow!("engine is not running"))
    }

    async fn request<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SignEngine, std::time::Instant) -> (T, Vec<EngineEvent>) + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Box::new(move |engine, now| {
            let (value, events) = task(engine, now);
            let _ = reply_tx.send(value);
            events
        }))
        .await?;

        reply_rx
            .await
            .map_err(|_| anyhow!("engine stopped before replying"))
    }
}

fn fallible(result: Result<Vec<EngineEvent>>) -> (Result<()>, Vec<EngineEvent>) {
    match result {
        Ok(events) => (Ok(()), events),
        Err(err) => (Err(err), Vec::new()),
    }
}

async fn engine_loop(
    mut engine: SignEngine,
    mut commands: mpsc::Receiver<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
    announcer: Arc<dyn Announcer>,
    cancel_token: CancellationToken,
) -> SignEngine {
    log_info!("engine loop started");

    loop {
        let deadline = engine.next_deadline().map(Instant::from_std);

        tokio::select! {
            _ = cancel_token.cancelled() => {
                log_info!("engine loop shutting down");
                break;
            }
            _ = sleep_until_deadline(deadline) => {
                let now = Instant::now().into_std();
                publish(engine.poll_timers(now), &events, announcer.as_ref());
            }
            command = commands.recv() => {
                let Some(EngineCommand::Execute(task)) = command else {
                    log_warn!("all engine handles dropped; stopping");
                    break;
                };
                let now = Instant::now().into_std();
                publish(engine.poll_timers(now), &events, announcer.as_ref());
                publish(task(&mut engine, now), &events, announcer.as_ref());
            }
        }
    }

    engine
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn publish(batch: Vec<EngineEvent>, events: &broadcast::Sender<EngineEvent>, announcer: &dyn Announcer) {
    for event in batch {
        if let EngineEvent::Announcement { text } = &event {
            announcer.announce(text);
        }
        // No subscribers is fine.
        let _ = events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use super::*;
    use crate::db::MemoryStore;
    use crate::engine::{EngineConfig, TestOutcome, TestSessionState};
    use crate::models::{LandmarkPoint, HAND_LANDMARK_COUNT};

    #[derive(Default)]
    struct CollectingAnnouncer {
        said: StdMutex<Vec<String>>,
    }

    impl Announcer for CollectingAnnouncer {
        fn announce(&self, text: &str) {
            self.said.lock().unwrap().push(text.to_string());
        }
    }

    fn hand(curl: f32) -> HandFrame {
        HandFrame::new(
            (0..HAND_LANDMARK_COUNT)
                .map(|i| {
                    let t = i as f32;
                    LandmarkPoint::new(0.5 + 0.01 * t, 0.8 - 0.02 * t + curl * (t * 0.7).sin(), 0.0)
                })
                .collect(),
        )
    }

    fn spawn() -> (EngineController, Arc<CollectingAnnouncer>) {
        let engine =
            SignEngine::open(EngineConfig::default(), Arc::new(MemoryStore::new())).unwrap();
        let announcer = Arc::new(CollectingAnnouncer::default());
        (EngineController::spawn(engine, announcer.clone()), announcer)
    }

    async fn record(controller: &EngineController, name: &str, frame: HandFrame) {
        controller.submit_frame(vec![frame]).await.unwrap();
        controller.begin_recording(name.to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3600)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn recording_commits_after_capture_window() {
        let (controller, announcer) = spawn();
        record(&controller, "hello", hand(0.0)).await;

        let snapshot = controller.snapshot().await.unwrap();
        assert_eq!(snapshot.template_count, 1);
        assert!(snapshot.recognition_active);
        assert_eq!(
            announcer.said.lock().unwrap().as_slice(),
            ["Sign \"hello\" has been saved"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_test_times_out() {
        let (controller, announcer) = spawn();
        record(&controller, "A", hand(0.0)).await;
        let mut events = controller.subscribe();

        controller.start_test("A".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(7100)).await;

        let results = controller.results().await.unwrap();
        assert_eq!((results[0].tested, results[0].correct), (1, 0));
        assert!(announcer
            .said
            .lock()
            .unwrap()
            .ends_with(&["Show me the sign for \"A\"".into(), "Time's up. Try again.".into()]));

        let mut outcome = None;
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::TestResolved { outcome: o, .. } = event {
                outcome = Some(o);
            }
        }
        assert_eq!(outcome, Some(TestOutcome::TimedOut));

        tokio::time::sleep(Duration::from_secs(2)).await;
        let snapshot = controller.snapshot().await.unwrap();
        assert_eq!(snapshot.test_state, TestSessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn streak_of_frames_passes_test() {
        let (controller, _) = spawn();
        record(&controller, "A", hand(0.0)).await;

        controller.start_test("A".into()).await.unwrap();
        for _ in 0..5 {
            controller.submit_frame(vec![hand(0.0)]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(33)).await;
        }

        let snapshot = controller.snapshot().await.unwrap();
        assert_eq!(
            snapshot.test_state,
            TestSessionState::Cooldown(TestOutcome::Correct)
        );
        let results = controller.results().await.unwrap();
        assert_eq!(results[0].accuracy, 100.0);

        // The superseded timeout must not count a second attempt.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(controller.results().await.unwrap()[0].tested, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_commands_surface_errors() {
        let (controller, _) = spawn();
        assert!(controller.start_test("missing".into()).await.is_err());
        assert!(controller.begin_recording("A".into()).await.is_err());
        assert!(controller.set_confidence_threshold(0.01).await.is_err());
        assert!(controller.delete_template("missing".into()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_engine_state() {
        let (controller, _) = spawn();
        record(&controller, "A", hand(0.0)).await;

        let engine = controller.shutdown().await.unwrap();
        assert!(engine.templates().contains("A"));
        assert!(controller.shutdown().await.is_err());
        assert!(controller.snapshot().await.is_err());
    }
}
