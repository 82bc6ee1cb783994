use crate::ArchiveEvent;

/// Receives human-readable stage transitions from a running pipeline.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ArchiveEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: ArchiveEvent) {}
}

impl<F> ProgressSink for F
where
    F: Fn(ArchiveEvent) + Send + Sync,
{
    fn emit(&self, event: ArchiveEvent) {
        self(event)
    }
}
