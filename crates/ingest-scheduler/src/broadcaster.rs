use ingest_domain::{JobRunId, JobRunStatus, ScheduleId};

/// A state change on a [`ingest_domain::JobRun`], fanned out after the DB
/// write that caused it. Ordering relative to other events is best-effort.
#[derive(Debug, Clone)]
pub enum JobRunEvent {
    Created { job_run_id: JobRunId, schedule_id: Option<ScheduleId> },
    Claimed { job_run_id: JobRunId, claimed_by: String },
    Started { job_run_id: JobRunId },
    Progress { job_run_id: JobRunId, message: String },
    Completed { job_run_id: JobRunId, status: JobRunStatus },
    Cancelled { job_run_id: JobRunId },
}

/// Fan-out of job-run state changes to external subscribers. Implementations
/// must not block the caller on a slow or absent subscriber — [`NoopBroadcaster`]
/// is accepted wherever a broadcaster is required and no subscriber exists.
pub trait EventBroadcaster: Send + Sync {
    fn publish(&self, event: JobRunEvent);
}

/// Discards every event. The default when no subscriber is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

impl EventBroadcaster for NoopBroadcaster {
    fn publish(&self, _event: JobRunEvent) {}
}

/// Broadcasts to in-process subscribers (e.g. an HTTP layer streaming job-run
/// events to a UI) over a `tokio::sync::broadcast` channel. Publishing to a
/// channel with no receivers is a no-op; a full channel drops the oldest
/// event rather than blocking the publisher.
pub struct ChannelBroadcaster {
    sender: tokio::sync::broadcast::Sender<JobRunEvent>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobRunEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBroadcaster for ChannelBroadcaster {
    fn publish(&self, event: JobRunEvent) {
        // `send` only errors when there are zero receivers; that's expected
        // whenever no subscriber has connected yet, so it's intentionally
        // ignored rather than logged.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_accepts_any_event() {
        let b = NoopBroadcaster;
        b.publish(JobRunEvent::Started { job_run_id: JobRunId::new() });
    }

    #[test]
    fn channel_broadcaster_delivers_to_subscriber() {
        let b = ChannelBroadcaster::new(8);
        let mut rx = b.subscribe();
        b.publish(JobRunEvent::Started { job_run_id: JobRunId::new() });
        assert!(matches!(rx.try_recv(), Ok(JobRunEvent::Started { .. })));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let b = ChannelBroadcaster::new(8);
        b.publish(JobRunEvent::Started { job_run_id: JobRunId::new() });
    }
}
