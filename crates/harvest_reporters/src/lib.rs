//! Terminal reporters for harvest import operations

mod operation;

pub use operation::OperationProgress;
