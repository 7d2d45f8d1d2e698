/// Failure of a persistence collaborator (document store, catalog store).
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Unique key conflict: {0}")]
    Conflict(String),
    #[error("Store backend failure: {0}")]
    Backend(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;
