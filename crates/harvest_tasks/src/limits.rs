use std::num::NonZero;

/// Defines how many workers the dispatcher runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Limit {
    /// There is an upper limit.
    Max(NonZero<usize>),

    /// Use a heuristic to determine the limit.
    #[default]
    Default,
}

impl From<usize> for Limit {
    fn from(value: usize) -> Self {
        NonZero::new(value).map(Limit::Max).unwrap_or(Limit::Default)
    }
}

impl From<Option<usize>> for Limit {
    fn from(value: Option<usize>) -> Self {
        value.map(Limit::from).unwrap_or_default()
    }
}

impl Limit {
    /// Resolves the limit to a concrete number of workers.
    ///
    /// The heuristic uses the available parallelism of the machine and falls
    /// back to a single worker when that cannot be determined.
    pub fn resolve(self) -> usize {
        match self {
            Limit::Max(max) => max.get(),
            Limit::Default => std::thread::available_parallelism()
                .map(NonZero::get)
                .unwrap_or(1),
        }
    }
}
