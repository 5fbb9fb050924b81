//! Infrastructure layer: in-memory persistence with unit-of-work semantics.
//!
//! - [`Repository`]: staged/durable collections for one entity type
//! - [`UnitOfWork`]: atomic commit over a bundle of repositories

pub mod error;
pub mod repository;
pub mod unit_of_work;


pub use error::{RepositoryError, UnitOfWorkError};
pub use repository::{Predicate, Repository, RepositoryBuilder, Transactional};
pub use unit_of_work::{Repositories, UnitOfWork};
