use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use harvest_import::{ImporterOperation, OperationId, OperationReporter, OperationStatus};
use indexmap::IndexMap;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Shows one progress bar per running import operation.
pub struct OperationProgress {
    /// The multi-progress bar. Usually, this is the global multi-progress bar.
    multi_progress: MultiProgress,
    /// The progress bar that is used as an anchor for placing other progress.
    anchor: ProgressBar,
    /// Progress bars of running operations, in the order they started.
    bars: Mutex<IndexMap<OperationId, ProgressBar>>,
}

impl OperationProgress {
    pub fn new(multi_progress: MultiProgress, anchor: ProgressBar) -> Self {
        Self {
            multi_progress,
            anchor,
            bars: Mutex::new(IndexMap::new()),
        }
    }

    /// A reporter that draws nothing, for non-interactive output
    pub fn hidden() -> Self {
        let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let anchor = multi_progress.add(ProgressBar::hidden());
        Self::new(multi_progress, anchor)
    }

    pub fn progress_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "  {spinner:.green} {prefix:20!} [{bar:30.cyan/blue}] {pos:>7}/{len:7} {wide_msg:.dim}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━╾─")
    }

    /// Operations that currently have a progress bar
    pub fn active(&self) -> Vec<OperationId> {
        self.bars().keys().copied().collect()
    }

    /// The number of documents received, as last reported for `id`
    pub fn position(&self, id: OperationId) -> Option<u64> {
        self.bars().get(&id).map(ProgressBar::position)
    }

    fn bars(&self) -> MutexGuard<'_, IndexMap<OperationId, ProgressBar>> {
        self.bars.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn message(operation: &ImporterOperation) -> String {
        let mut message = format!("{} integrated", operation.documents_integrated);
        if operation.retry_count > 0 {
            message.push_str(&format!(", retry {}", operation.retry_count));
        }
        if let Some(query) = &operation.query {
            message.push_str(&format!(" ({query})"));
        }
        message
    }

    fn update(pb: &ProgressBar, operation: &ImporterOperation) {
        if operation.total_document_count > 0 {
            pb.set_length(operation.total_document_count);
        }
        pb.set_position(operation.documents_received);
        pb.set_message(Self::message(operation));
    }
}

impl OperationReporter for OperationProgress {
    fn on_dispatched(&self, operation: &ImporterOperation) {
        let mut bars = self.bars();
        if let Some(pb) = bars.get(&operation.id) {
            // A follow-up fetch of a running operation
            Self::update(pb, operation);
            return;
        }

        let pb = self.multi_progress.insert_after(
            bars.last().map(|(_, pb)| pb).unwrap_or(&self.anchor),
            ProgressBar::hidden(),
        );
        pb.set_style(Self::progress_style());
        pb.set_prefix(operation.importer.clone());
        Self::update(&pb, operation);
        pb.enable_steady_tick(Duration::from_millis(100));

        bars.insert(operation.id, pb);
    }

    fn on_progress(&self, operation: &ImporterOperation) {
        if let Some(pb) = self.bars().get(&operation.id) {
            Self::update(pb, operation);
        }
    }

    fn on_finished(&self, operation: &ImporterOperation) {
        let Some(pb) = self.bars().shift_remove(&operation.id) else {
            return;
        };
        Self::update(&pb, operation);
        match operation.status {
            OperationStatus::Terminated => pb.finish_and_clear(),
            status => {
                let reason = operation.message.as_deref().unwrap_or("no details");
                pb.abandon_with_message(format!("{status}: {reason}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use harvest_import::NewOperation;

    use super::*;

    fn operation(importer: &str) -> ImporterOperation {
        ImporterOperation::new(NewOperation::new(importer).with_query("graphene"))
    }

    #[test]
    fn test_bars_follow_operations() {
        let reporter = OperationProgress::hidden();
        let mut first = operation("crossref");
        let second = operation("arxiv");

        reporter.on_dispatched(&first);
        reporter.on_dispatched(&second);
        assert_eq!(reporter.active(), vec![first.id, second.id]);

        first.documents_received = 25;
        first.total_document_count = 100;
        reporter.on_progress(&first);
        reporter.on_dispatched(&first);
        assert_eq!(reporter.position(first.id), Some(25));
        assert_eq!(reporter.active().len(), 2);

        first.status = OperationStatus::Terminated;
        reporter.on_finished(&first);
        assert_eq!(reporter.active(), vec![second.id]);
        assert_eq!(reporter.position(first.id), None);
    }

    #[test]
    fn test_unknown_operations_are_ignored() {
        let reporter = OperationProgress::hidden();
        let mut op = operation("crossref");

        reporter.on_progress(&op);
        op.status = OperationStatus::Failed;
        reporter.on_finished(&op);
        assert!(reporter.active().is_empty());
    }

    #[test]
    fn test_message_mentions_retries() {
        let mut op = operation("crossref");
        op.documents_integrated = 3;
        assert_eq!(OperationProgress::message(&op), "3 integrated (graphene)");

        op.retry_count = 2;
        assert_eq!(
            OperationProgress::message(&op),
            "3 integrated, retry 2 (graphene)"
        );
    }
}
