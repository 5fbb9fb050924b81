use thiserror::Error;

use busline_events::CancelReason;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("entity not found")]
    NotFound,

    #[error("entity already exists")]
    AlreadyExists,

    #[error("repository requires a {0} predicate")]
    MissingPredicate(&'static str),
}

#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    /// The transaction closure failed; nothing was committed.
    #[error(transparent)]
    Aborted(anyhow::Error),

    /// Repository `index` (in `Repositories::members` order) refused the commit.
    #[error("commit failed in repository {index}: {source}")]
    Commit {
        index: usize,
        #[source]
        source: RepositoryError,
    },

    #[error("unit of work not started: {0}")]
    Cancelled(CancelReason),
}
