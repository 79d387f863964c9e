//! Client-side view of one job's progress.

use crate::{HubConnection, TopicSubscriber};
use adpulse_core::JobId;
use adpulse_domain::HubEvent;
use serde::Serialize;

/// Where the observed job stands, as far as this client knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObserverState {
    Idle,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ObserverState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Serializable copy of an observer's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverSnapshot {
    pub job_id: Option<JobId>,
    pub state: ObserverState,
    pub progress: i16,
    pub step: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Tracks a single job through the hub.
///
/// Holds at most one subscription at a time and gives it back as soon as
/// the job reaches a terminal state, when the watched id changes, or when
/// the observer is dropped.
pub struct ProgressObserver<S: TopicSubscriber> {
    subscriber: S,
    job_id: Option<JobId>,
    subscribed: bool,
    state: ObserverState,
    progress: i16,
    step: Option<String>,
    result: Option<serde_json::Value>,
    error: Option<String>,
}

impl<S: TopicSubscriber> ProgressObserver<S> {
    #[must_use]
    pub const fn new(subscriber: S) -> Self {
        Self {
            subscriber,
            job_id: None,
            subscribed: false,
            state: ObserverState::Idle,
            progress: 0,
            step: None,
            result: None,
            error: None,
        }
    }

    /// Starts following `job_id`.
    ///
    /// `None` or a blank id resets to [`ObserverState::Idle`]. Watching the
    /// current id again changes nothing.
    pub fn watch(&mut self, job_id: Option<JobId>) {
        let job_id = job_id.filter(|id| !id.is_blank());
        if job_id.is_some() && job_id == self.job_id {
            return;
        }

        self.release();
        self.reset();

        if let Some(id) = job_id {
            self.subscriber.subscribe(&id);
            self.subscribed = true;
            self.state = ObserverState::Processing;
            self.job_id = Some(id);
        }
    }

    /// Folds one hub event into the state. Returns `true` if anything changed.
    pub fn apply(&mut self, event: &HubEvent) -> bool {
        if self.state.is_terminal() || self.job_id.as_ref() != Some(event.job_id()) {
            return false;
        }

        match event {
            HubEvent::Progress(payload) => {
                self.progress = payload.progress;
                self.step.clone_from(&payload.step);
            }
            HubEvent::Completed(payload) => {
                self.state = ObserverState::Completed;
                self.progress = 100;
                self.result = Some(payload.result.clone());
            }
            HubEvent::Error(payload) => {
                self.state = ObserverState::Failed;
                self.error = Some(payload.error.clone());
            }
            HubEvent::Cancelled(_) => {
                self.state = ObserverState::Cancelled;
            }
        }

        if self.state.is_terminal() {
            self.release();
        }
        true
    }

    /// Applies events from `connection` until the job ends or the connection
    /// closes, and returns the final state.
    pub async fn follow(&mut self, connection: &mut HubConnection) -> ObserverState {
        while self.state == ObserverState::Processing {
            let Some(event) = connection.recv().await else {
                break;
            };
            self.apply(&event);
        }
        self.state
    }

    /// Releases the subscription. Equivalent to dropping the observer.
    pub fn dispose(self) {}

    #[must_use]
    pub const fn state(&self) -> ObserverState {
        self.state
    }

    #[must_use]
    pub const fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    #[must_use]
    pub const fn progress(&self) -> i16 {
        self.progress
    }

    #[must_use]
    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    #[must_use]
    pub const fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn snapshot(&self) -> ObserverSnapshot {
        ObserverSnapshot {
            job_id: self.job_id.clone(),
            state: self.state,
            progress: self.progress,
            step: self.step.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }

    fn release(&mut self) {
        if self.subscribed {
            if let Some(id) = &self.job_id {
                self.subscriber.unsubscribe(id);
            }
            self.subscribed = false;
        }
    }

    fn reset(&mut self) {
        self.job_id = None;
        self.state = ObserverState::Idle;
        self.progress = 0;
        self.step = None;
        self.result = None;
        self.error = None;
    }
}

impl<S: TopicSubscriber> Drop for ProgressObserver<S> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FanoutHub;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records subscribe/unsubscribe calls in order.
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    impl TopicSubscriber for Recorder {
        fn subscribe(&self, job_id: &JobId) {
            self.0.lock().push(format!("+{job_id}"));
        }

        fn unsubscribe(&self, job_id: &JobId) {
            self.0.lock().push(format!("-{job_id}"));
        }
    }

    fn id(s: &str) -> Option<JobId> {
        Some(JobId::from(s))
    }

    #[test]
    fn test_watch_and_switch() {
        let recorder = Recorder::default();
        let mut observer = ProgressObserver::new(recorder.clone());
        assert_eq!(observer.state(), ObserverState::Idle);

        observer.watch(id("J1"));
        assert_eq!(observer.state(), ObserverState::Processing);
        observer.watch(id("J1"));
        observer.watch(id("J2"));

        assert_eq!(recorder.calls(), vec!["+J1", "-J1", "+J2"]);
        assert_eq!(observer.job_id().map(JobId::as_str), Some("J2"));
    }

    #[test]
    fn test_empty_id_resets_to_idle() {
        let recorder = Recorder::default();
        let mut observer = ProgressObserver::new(recorder.clone());
        observer.watch(id("J1"));
        observer.apply(&HubEvent::progress(JobId::from("J1"), 30, None));

        observer.watch(id("  "));
        assert_eq!(observer.state(), ObserverState::Idle);
        assert_eq!(observer.progress(), 0);
        assert!(observer.job_id().is_none());

        observer.watch(None);
        assert_eq!(recorder.calls(), vec!["+J1", "-J1"]);
    }

    #[test]
    fn test_progress_then_completion() {
        let recorder = Recorder::default();
        let mut observer = ProgressObserver::new(recorder.clone());
        observer.watch(id("J1"));

        assert!(observer.apply(&HubEvent::progress(
            JobId::from("J1"),
            40,
            Some("detecting objects".into())
        )));
        assert_eq!(observer.progress(), 40);
        assert_eq!(observer.step(), Some("detecting objects"));

        assert!(observer.apply(&HubEvent::completed(
            JobId::from("J1"),
            serde_json::json!({"score": 0.8})
        )));
        assert_eq!(observer.state(), ObserverState::Completed);
        assert_eq!(observer.progress(), 100);
        assert_eq!(observer.result(), Some(&serde_json::json!({"score": 0.8})));
        assert_eq!(recorder.calls(), vec!["+J1", "-J1"]);

        // Terminal: later events are ignored and nothing is unsubscribed twice.
        assert!(!observer.apply(&HubEvent::progress(JobId::from("J1"), 10, None)));
        drop(observer);
        assert_eq!(recorder.calls(), vec!["+J1", "-J1"]);
    }

    #[test]
    fn test_error_and_cancel_are_terminal() {
        let mut observer = ProgressObserver::new(Recorder::default());
        observer.watch(id("J2"));
        observer.apply(&HubEvent::error(JobId::from("J2"), "decode failed"));
        assert_eq!(observer.state(), ObserverState::Failed);
        assert_eq!(observer.error(), Some("decode failed"));

        let mut observer = ProgressObserver::new(Recorder::default());
        observer.watch(id("J3"));
        observer.apply(&HubEvent::cancelled(JobId::from("J3")));
        assert_eq!(observer.state(), ObserverState::Cancelled);
    }

    #[test]
    fn test_events_for_other_jobs_are_ignored() {
        let mut observer = ProgressObserver::new(Recorder::default());
        observer.watch(id("J1"));
        assert!(!observer.apply(&HubEvent::progress(JobId::from("J2"), 90, None)));
        assert_eq!(observer.progress(), 0);
    }

    #[test]
    fn test_dispose_unsubscribes() {
        let recorder = Recorder::default();
        let mut observer = ProgressObserver::new(recorder.clone());
        observer.watch(id("J1"));
        observer.dispose();
        assert_eq!(recorder.calls(), vec!["+J1", "-J1"]);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut observer = ProgressObserver::new(Recorder::default());
        observer.watch(id("J1"));
        let value = serde_json::to_value(observer.snapshot()).unwrap();
        assert_eq!(value["jobId"], "J1");
        assert_eq!(value["state"], "processing");
    }

    #[tokio::test]
    async fn test_follow_through_hub() {
        let hub = Arc::new(FanoutHub::new());
        let mut connection = hub.connect();
        let mut observer = ProgressObserver::new(connection.handle().clone());
        observer.watch(id("J1"));
        assert_eq!(hub.subscriber_count(&JobId::from("J1")), 1);

        hub.broadcast(&HubEvent::progress(JobId::from("J1"), 40, None));
        hub.broadcast(&HubEvent::completed(JobId::from("J1"), serde_json::json!({})));

        let state = observer.follow(&mut connection).await;
        assert_eq!(state, ObserverState::Completed);
        assert_eq!(hub.subscriber_count(&JobId::from("J1")), 0);
    }
}
