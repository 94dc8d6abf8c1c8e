use thiserror::Error;

use crate::address::{AddressError, EventAddress};

#[derive(Error, Debug)]
pub enum Error {
    /// Tried to attach under an address the tree has not resolved
    #[error("parent node {0} not found")]
    ParentNotFound(EventAddress),

    #[error("node {0} not found")]
    NodeNotFound(EventAddress),

    #[error("invalid address: {0}")]
    Address(#[from] AddressError),
}

pub type Result<T> = std::result::Result<T, Error>;
