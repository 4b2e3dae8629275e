use crate::operation::ImporterOperation;

/// Receives progress of import operations.
///
/// Every callback gets a snapshot of the operation taken while the
/// controller held its lock.
pub trait OperationReporter: Send + Sync {
    /// A fetch was submitted for the operation
    fn on_dispatched(&self, operation: &ImporterOperation);

    /// A batch was applied to the operation
    fn on_progress(&self, operation: &ImporterOperation);

    /// The operation reached a terminal status
    fn on_finished(&self, operation: &ImporterOperation);
}

/// A reporter that ignores every update
#[derive(Debug, Default)]
pub struct NoOpOperationReporter;

impl OperationReporter for NoOpOperationReporter {
    fn on_dispatched(&self, _operation: &ImporterOperation) {}

    fn on_progress(&self, _operation: &ImporterOperation) {}

    fn on_finished(&self, _operation: &ImporterOperation) {}
}
