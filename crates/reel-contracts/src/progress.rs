/// Sink for the pipeline's human-readable status line.
///
/// Milestones arrive in program order, one per pipeline phase. The text is
/// for display only; callers must not branch on it.
pub trait ProgressSink {
    fn update(&mut self, message: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(&str),
{
    fn update(&mut self, message: &str) {
        self(message)
    }
}
