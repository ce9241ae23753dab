//! Catalog error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Discovery worker could not be started
    #[error("failed to spawn discovery worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// Bus or descriptor error
    #[error(transparent)]
    Contract(#[from] contracts::ContractError),
}

/// Catalog Result alias
pub type Result<T> = std::result::Result<T, CatalogError>;
