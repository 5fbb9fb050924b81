//! One logical transaction over several repositories.
//!
//! Commit is two-phase across the whole bundle: every member validates before
//! any member persists, so a constraint violation anywhere leaves every
//! durable collection untouched.

use busline_events::{Context, EventSource, SharedEvent};
use tracing::debug;

use crate::error::UnitOfWorkError;
use crate::repository::{Repository, Transactional};

/// A bundle of repositories taking part in a unit of work.
///
/// ```ignore
/// struct Repos { users: Repository<User>, orders: Repository<Order> }
///
/// impl Repositories for Repos {
///     fn members(&mut self) -> Vec<&mut dyn Transactional> {
///         vec![&mut self.users as &mut dyn Transactional, &mut self.orders]
///     }
/// }
/// ```
pub trait Repositories {
    /// Members in commit order; events are concatenated in this order.
    fn members(&mut self) -> Vec<&mut dyn Transactional>;
}

impl<E: EventSource + Clone> Repositories for Repository<E> {
    fn members(&mut self) -> Vec<&mut dyn Transactional> {
        let member: &mut dyn Transactional = self;
        vec![member]
    }
}

macro_rules! impl_repositories_for_tuple {
    ($($name:ident . $idx:tt),+) => {
        impl<$($name: Transactional),+> Repositories for ($($name,)+) {
            fn members(&mut self) -> Vec<&mut dyn Transactional> {
                vec![$(&mut self.$idx as &mut dyn Transactional),+]
            }
        }
    };
}

impl_repositories_for_tuple!(A.0, B.1);
impl_repositories_for_tuple!(A.0, B.1, C.2);
impl_repositories_for_tuple!(A.0, B.1, C.2, D.3);

pub struct UnitOfWork<R> {
    repos: R,
}

struct ResetOnDrop<'a, R: Repositories> {
    repos: &'a mut R,
}

impl<R: Repositories> ResetOnDrop<'_, R> {
    fn reset(&mut self) {
        for member in self.repos.members() {
            member.reset();
        }
    }
}

impl<R: Repositories> Drop for ResetOnDrop<'_, R> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<R: Repositories> UnitOfWork<R> {
    pub fn new(repos: R) -> Self {
        Self { repos }
    }

    /// Read access between transactions.
    pub fn repositories(&self) -> &R {
        &self.repos
    }

    pub fn into_inner(self) -> R {
        self.repos
    }

    /// Run `f` against a clean staged state and commit what it staged.
    ///
    /// Returns the events harvested from every member, in member order. When
    /// `f` fails nothing is committed. Staged state is discarded on every
    /// exit path, panics included.
    pub fn run<F>(&mut self, ctx: &Context, f: F) -> Result<Vec<SharedEvent>, UnitOfWorkError>
    where
        F: FnOnce(&mut R) -> anyhow::Result<()>,
    {
        if let Some(reason) = ctx.err() {
            return Err(UnitOfWorkError::Cancelled(reason));
        }

        let mut guard = ResetOnDrop {
            repos: &mut self.repos,
        };
        guard.reset();

        if let Err(err) = f(&mut *guard.repos) {
            debug!(error = %err, "unit of work aborted");
            return Err(UnitOfWorkError::Aborted(err));
        }

        let events = commit(&mut *guard.repos)?;
        debug!(events = events.len(), "unit of work committed");
        Ok(events)
    }
}

fn commit<R: Repositories>(repos: &mut R) -> Result<Vec<SharedEvent>, UnitOfWorkError> {
    let mut members = repos.members();

    for (index, member) in members.iter().enumerate() {
        member
            .validate()
            .map_err(|source| UnitOfWorkError::Commit { index, source })?;
    }

    let mut events = Vec::new();
    for member in members.iter_mut() {
        events.extend(member.persist());
    }
    Ok(events)
}
