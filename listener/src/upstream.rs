use crate::error::Error;
use crate::source::NotificationSource;
use events::{decode, HandlerRegistry, RawNotification};
use log::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Observable lifecycle of an [`UpstreamListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerStatus {
    Stopped,
    Listening,
    Stopping,
}

/// `done` flips to `true` when the receive loop exits. A closed channel means
/// the loop task is gone without signalling, which is just as final.
enum State {
    Stopped,
    Listening {
        cancel: CancellationToken,
        done: watch::Receiver<bool>,
    },
    Stopping {
        done: watch::Receiver<bool>,
    },
}

impl State {
    /// Settle a `Stopping` state whose loop has already exited, as happens
    /// when a `stop` future is dropped before it finishes waiting.
    fn settle(&mut self) {
        if let State::Stopping { done } = self {
            if loop_exited(done) {
                *self = State::Stopped;
            }
        }
    }
}

fn loop_exited(done: &watch::Receiver<bool>) -> bool {
    *done.borrow() || done.has_changed().is_err()
}

/// Drives a [`NotificationSource`] and dispatches every decoded event to the
/// handlers registered for its channel.
///
/// `Stopped -> Listening -> Stopping -> Stopped`. The receive loop runs as its
/// own task; [`UpstreamListener::stop`] cancels it and waits for the loop to
/// signal that it has exited, so the subscription is never used half torn
/// down. Every concurrent `stop` waits on that same signal.
pub struct UpstreamListener {
    handlers: Arc<HandlerRegistry>,
    retry_delay: Duration,
    state: Mutex<State>,
}

impl UpstreamListener {
    pub fn new(handlers: Arc<HandlerRegistry>) -> Self {
        Self {
            handlers,
            retry_delay: DEFAULT_RETRY_DELAY,
            state: Mutex::new(State::Stopped),
        }
    }

    /// Delay before reading again after a transport error.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn status(&self) -> ListenerStatus {
        let mut state = self.state.lock();
        state.settle();
        match *state {
            State::Stopped => ListenerStatus::Stopped,
            State::Listening { .. } => ListenerStatus::Listening,
            State::Stopping { .. } => ListenerStatus::Stopping,
        }
    }

    /// Spawn the receive loop over an established subscription.
    ///
    /// Must be called from within a tokio runtime. Fails if the listener is
    /// not currently stopped.
    pub fn start<S: NotificationSource>(&self, source: S) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.settle();
        if !matches!(*state, State::Stopped) {
            warn!("Listener already started, rejecting duplicate start");
            return Err(Error::already_listening());
        }

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(receive_loop(
            source,
            Arc::clone(&self.handlers),
            cancel.clone(),
            self.retry_delay,
            done_tx,
        ));

        *state = State::Listening {
            cancel,
            done: done_rx,
        };
        info!("Upstream listener started");
        Ok(())
    }

    /// Cancel the receive loop and wait until it has exited.
    ///
    /// A no-op when the listener is already stopped. A caller that arrives
    /// while another is stopping waits for the same loop exit. Dropping the
    /// returned future early leaves the loop cancelled; the listener settles
    /// to `Stopped` once the loop has exited.
    pub async fn stop(&self) {
        let mut done = {
            let mut state = self.state.lock();
            let done = match &*state {
                State::Stopped => return,
                State::Stopping { done } => done.clone(),
                State::Listening { cancel, done } => {
                    debug!("Stopping upstream listener");
                    cancel.cancel();
                    done.clone()
                }
            };
            if matches!(*state, State::Listening { .. }) {
                *state = State::Stopping { done: done.clone() };
            }
            done
        };

        // An Err means the sender is gone without signalling (the loop
        // panicked).
        let _ = done.wait_for(|exited| *exited).await;

        let mut state = self.state.lock();
        if matches!(*state, State::Stopping { .. }) {
            *state = State::Stopped;
            info!("Upstream listener stopped");
        }
    }
}

async fn receive_loop<S: NotificationSource>(
    mut source: S,
    handlers: Arc<HandlerRegistry>,
    cancel: CancellationToken,
    retry_delay: Duration,
    done: watch::Sender<bool>,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = source.recv() => next,
        };

        match next {
            Ok(raw) => dispatch(&handlers, raw).await,
            Err(e) => {
                if cancel.is_cancelled() {
                    break;
                }
                error!("Error waiting for notification: {e}");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
        }
    }

    info!("Notification loop stopping");
    let _ = done.send(true);
}

async fn dispatch(handlers: &HandlerRegistry, raw: RawNotification) {
    let event = match decode(&raw) {
        Ok(event) => event,
        Err(e) => {
            error!(
                "Error parsing notification payload on channel {}: {e}; payload: {}",
                raw.channel, raw.payload
            );
            return;
        }
    };

    debug!(
        "Dispatching {} on {} (record {}) from channel {}",
        event.operation, event.table, event.record_id, raw.channel
    );
    handlers.dispatch(&raw.channel, &event).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ListenerErrorKind;
    use async_trait::async_trait;
    use events::{ChangeEvent, EventHandler};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    const CHANNEL: &str = "timeline_posts";

    /// Replays whatever the test pushes; once the test side hangs up it blocks
    /// forever like an idle subscription.
    struct ScriptedSource {
        script: mpsc::UnboundedReceiver<Result<RawNotification, Error>>,
    }

    #[async_trait]
    impl NotificationSource for ScriptedSource {
        async fn recv(&mut self) -> Result<RawNotification, Error> {
            match self.script.recv().await {
                Some(next) => next,
                None => std::future::pending().await,
            }
        }
    }

    struct Forward(mpsc::UnboundedSender<ChangeEvent>);

    #[async_trait]
    impl EventHandler for Forward {
        async fn handle(&self, event: &ChangeEvent) -> Result<(), events::Error> {
            self.0
                .send(event.clone())
                .map_err(|_| events::Error::handler("test receiver gone"))
        }
    }

    fn payload(post_id: i64) -> String {
        format!(
            r#"{{"timestamp": 1687347000.5, "operation": "INSERT", "table": "posts",
                 "post_id": {post_id}, "agent_id": 3, "content": "post {post_id}"}}"#
        )
    }

    /// Announces each event, then takes `delay` before finishing it.
    struct Slow {
        started: mpsc::UnboundedSender<i64>,
        finished: Arc<AtomicBool>,
        delay: Duration,
    }

    #[async_trait]
    impl EventHandler for Slow {
        async fn handle(&self, event: &ChangeEvent) -> Result<(), events::Error> {
            let _ = self.started.send(event.record_id);
            tokio::time::sleep(self.delay).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A running listener whose only handler is busy with post 1.
    async fn busy_listener() -> (
        Arc<UpstreamListener>,
        mpsc::UnboundedSender<Result<RawNotification, Error>>,
        Arc<AtomicBool>,
    ) {
        let (script_tx, script_rx) = mpsc::unbounded_channel();
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let finished = Arc::new(AtomicBool::new(false));

        let handlers = Arc::new(HandlerRegistry::new());
        handlers.register(
            CHANNEL,
            Arc::new(Slow {
                started: started_tx,
                finished: Arc::clone(&finished),
                delay: Duration::from_millis(200),
            }),
        );

        let listener = Arc::new(UpstreamListener::new(handlers));
        listener
            .start(ScriptedSource { script: script_rx })
            .unwrap();
        script_tx
            .send(Ok(RawNotification::new(CHANNEL, payload(1))))
            .unwrap();
        assert_eq!(started_rx.recv().await, Some(1));

        (listener, script_tx, finished)
    }

    fn setup() -> (
        UpstreamListener,
        ScriptedSource,
        mpsc::UnboundedSender<Result<RawNotification, Error>>,
        mpsc::UnboundedReceiver<ChangeEvent>,
    ) {
        let (script_tx, script_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let handlers = Arc::new(HandlerRegistry::new());
        handlers.register(CHANNEL, Arc::new(Forward(event_tx)));

        let listener = UpstreamListener::new(handlers).with_retry_delay(Duration::from_millis(10));
        (
            listener,
            ScriptedSource { script: script_rx },
            script_tx,
            event_rx,
        )
    }

    #[tokio::test]
    async fn dispatches_decoded_events_to_channel_handlers() {
        let (listener, source, script, mut events) = setup();
        listener.start(source).unwrap();

        script
            .send(Ok(RawNotification::new(CHANNEL, payload(1))))
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.record_id, 1);
        assert_eq!(event.owner_id, 3);
        assert_eq!(event.content, "post 1");

        listener.stop().await;
    }

    #[tokio::test]
    async fn notifications_on_other_channels_reach_no_handler() {
        let (listener, source, script, mut events) = setup();
        listener.start(source).unwrap();

        script
            .send(Ok(RawNotification::new("unrelated", payload(1))))
            .unwrap();
        script
            .send(Ok(RawNotification::new(CHANNEL, payload(2))))
            .unwrap();

        assert_eq!(events.recv().await.unwrap().record_id, 2);
        listener.stop().await;
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_and_the_next_one_processed() {
        let (listener, source, script, mut events) = setup();
        listener.start(source).unwrap();

        let missing_content =
            r#"{"timestamp": 1, "operation": "INSERT", "table": "posts", "post_id": 9, "agent_id": 1}"#;
        let bad_timestamp = r#"{"timestamp": "yesterday", "operation": "INSERT", "table": "posts",
                               "post_id": 10, "agent_id": 1, "content": "x"}"#;
        script
            .send(Ok(RawNotification::new(CHANNEL, missing_content)))
            .unwrap();
        script
            .send(Ok(RawNotification::new(CHANNEL, bad_timestamp)))
            .unwrap();
        script
            .send(Ok(RawNotification::new(CHANNEL, payload(11))))
            .unwrap();

        assert_eq!(events.recv().await.unwrap().record_id, 11);
        assert_eq!(listener.status(), ListenerStatus::Listening);
        listener.stop().await;
    }

    #[tokio::test]
    async fn transport_errors_are_retried() {
        let (listener, source, script, mut events) = setup();
        listener.start(source).unwrap();

        script
            .send(Err(Error::transport(std::io::Error::other("connection reset"))))
            .unwrap();
        script
            .send(Ok(RawNotification::new(CHANNEL, payload(5))))
            .unwrap();

        assert_eq!(events.recv().await.unwrap().record_id, 5);
        listener.stop().await;
    }

    #[tokio::test]
    async fn stop_waits_for_the_loop_and_is_idempotent() {
        let (listener, source, _script, _events) = setup();
        listener.start(source).unwrap();
        assert_eq!(listener.status(), ListenerStatus::Listening);

        listener.stop().await;
        assert_eq!(listener.status(), ListenerStatus::Stopped);

        listener.stop().await;
        assert_eq!(listener.status(), ListenerStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_on_a_listener_that_never_started_is_a_no_op() {
        let (listener, _source, _script, _events) = setup();
        listener.stop().await;
        assert_eq!(listener.status(), ListenerStatus::Stopped);
    }

    #[tokio::test]
    async fn stopped_loop_reads_no_further_notifications() {
        let (listener, source, script, mut events) = setup();
        listener.start(source).unwrap();
        listener.stop().await;

        // The loop dropped the source on exit, so this send may fail.
        let _ = script.send(Ok(RawNotification::new(CHANNEL, payload(1))));
        let received =
            tokio::time::timeout(Duration::from_millis(50), events.recv()).await;
        assert!(received.is_err());
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let (listener, source, _script, _events) = setup();
        listener.start(source).unwrap();

        let (_other_tx, other_rx) = mpsc::unbounded_channel();
        let err = listener
            .start(ScriptedSource { script: other_rx })
            .unwrap_err();

        assert_eq!(err.error_kind, ListenerErrorKind::AlreadyListening);
        listener.stop().await;
    }

    #[tokio::test]
    async fn listener_can_be_restarted_after_stop() {
        let (listener, source, _script, _events) = setup();
        listener.start(source).unwrap();
        listener.stop().await;

        let (restart_tx, restart_rx) = mpsc::unbounded_channel();
        listener
            .start(ScriptedSource { script: restart_rx })
            .unwrap();
        assert_eq!(listener.status(), ListenerStatus::Listening);

        drop(restart_tx);
        listener.stop().await;
    }

    #[tokio::test]
    async fn concurrent_stops_both_wait_for_the_in_flight_handler() {
        let (listener, _script, finished) = busy_listener().await;

        let first = tokio::spawn({
            let listener = Arc::clone(&listener);
            async move { listener.stop().await }
        });
        tokio::task::yield_now().await;

        listener.stop().await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(listener.status(), ListenerStatus::Stopped);

        first.await.unwrap();
        assert_eq!(listener.status(), ListenerStatus::Stopped);
    }

    #[tokio::test]
    async fn abandoned_stop_is_finished_by_the_next_stop() {
        let (listener, _script, finished) = busy_listener().await;

        let abandoned = tokio::time::timeout(Duration::from_millis(20), listener.stop()).await;
        assert!(abandoned.is_err());
        assert_eq!(listener.status(), ListenerStatus::Stopping);

        listener.stop().await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(listener.status(), ListenerStatus::Stopped);

        let (_restart_tx, restart_rx) = mpsc::unbounded_channel();
        listener
            .start(ScriptedSource { script: restart_rx })
            .unwrap();
        listener.stop().await;
    }

    #[tokio::test]
    async fn abandoned_stop_settles_once_the_loop_exits() {
        let (listener, _script, finished) = busy_listener().await;

        let abandoned = tokio::time::timeout(Duration::from_millis(20), listener.stop()).await;
        assert!(abandoned.is_err());

        tokio::time::timeout(Duration::from_secs(2), async {
            while listener.status() != ListenerStatus::Stopped {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("listener never settled");
        assert!(finished.load(Ordering::SeqCst));

        let (_restart_tx, restart_rx) = mpsc::unbounded_channel();
        listener
            .start(ScriptedSource { script: restart_rx })
            .unwrap();
        assert_eq!(listener.status(), ListenerStatus::Listening);
        listener.stop().await;
    }
}
