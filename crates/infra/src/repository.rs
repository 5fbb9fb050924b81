//! Generic in-memory repository with a staged working set.
//!
//! Entities live in two collections:
//!
//! - **durable**: the committed state
//! - **staged**: entities added or looked up during the current transaction
//!
//! Lookups copy durable entities into the staged set, so mutations stay
//! invisible to the durable state until [`Repository::save`]. Two predicates
//! drive every decision: *identity* (same logical entity) and *constraint*
//! (would duplicate a uniqueness rule, e.g. same email).

use busline_core::{Entity, same_identity};
use busline_events::{EventSource, SharedEvent};

use crate::error::RepositoryError;

pub type Predicate<E> = Box<dyn Fn(&E, &E) -> bool + Send + Sync>;

/// A participant in a multi-repository commit.
///
/// `validate` must not change anything; `persist` must not fail once
/// `validate` has succeeded.
pub trait Transactional {
    fn validate(&self) -> Result<(), RepositoryError>;

    /// Move the staged set into the durable state and return the harvested
    /// events.
    fn persist(&mut self) -> Vec<SharedEvent>;

    fn save(&mut self) -> Result<Vec<SharedEvent>, RepositoryError> {
        self.validate()?;
        Ok(self.persist())
    }

    /// Discard the staged set.
    fn reset(&mut self);
}

pub struct Repository<E> {
    durable: Vec<E>,
    staged: Vec<E>,
    identity: Predicate<E>,
    constraint: Predicate<E>,
}

pub struct RepositoryBuilder<E> {
    identity: Option<Predicate<E>>,
    constraint: Option<Predicate<E>>,
}

impl<E> RepositoryBuilder<E> {
    pub fn identity(mut self, f: impl Fn(&E, &E) -> bool + Send + Sync + 'static) -> Self {
        self.identity = Some(Box::new(f));
        self
    }

    pub fn constraint(mut self, f: impl Fn(&E, &E) -> bool + Send + Sync + 'static) -> Self {
        self.constraint = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Result<Repository<E>, RepositoryError> {
        let identity = self
            .identity
            .ok_or(RepositoryError::MissingPredicate("identity"))?;
        let constraint = self
            .constraint
            .ok_or(RepositoryError::MissingPredicate("constraint"))?;

        Ok(Repository {
            durable: Vec::new(),
            staged: Vec::new(),
            identity,
            constraint,
        })
    }
}

impl<E> Repository<E> {
    pub fn builder() -> RepositoryBuilder<E> {
        RepositoryBuilder {
            identity: None,
            constraint: None,
        }
    }

    pub fn new(
        identity: impl Fn(&E, &E) -> bool + Send + Sync + 'static,
        constraint: impl Fn(&E, &E) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            durable: Vec::new(),
            staged: Vec::new(),
            identity: Box::new(identity),
            constraint: Box::new(constraint),
        }
    }

    /// Committed entities, in insertion order.
    pub fn durable(&self) -> &[E] {
        &self.durable
    }

    /// Entities touched by the current transaction.
    pub fn staged(&self) -> &[E] {
        &self.staged
    }

    /// Number of committed entities.
    pub fn len(&self) -> usize {
        self.durable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durable.is_empty()
    }

    pub fn reset(&mut self) {
        self.staged.clear();
    }
}

impl<E: Entity + 'static> Repository<E> {
    /// Identity by [`Entity::id`].
    pub fn by_id(constraint: impl Fn(&E, &E) -> bool + Send + Sync + 'static) -> Self {
        Self::new(same_identity::<E>, constraint)
    }
}

impl<E: EventSource + Clone> Repository<E> {
    /// Stage a new entity unless it collides with a durable or staged one.
    pub fn add(&mut self, entity: E) -> Result<(), RepositoryError> {
        let collides = self
            .durable
            .iter()
            .chain(self.staged.iter())
            .any(|existing| (self.constraint)(&entity, existing));

        if collides {
            return Err(RepositoryError::AlreadyExists);
        }

        self.staged.push(entity);
        Ok(())
    }

    /// First entity matching `matches`, staged first.
    ///
    /// A durable match is copied into the staged set; repeated lookups return
    /// that same staged copy. Durable entities already staged under the same
    /// identity are skipped, so a staged edit is never shadowed by a fresh copy.
    pub fn find_one(&mut self, matches: impl Fn(&E) -> bool) -> Result<&mut E, RepositoryError> {
        if let Some(idx) = self.staged.iter().position(&matches) {
            return Ok(&mut self.staged[idx]);
        }

        let found = self
            .durable
            .iter()
            .filter(|durable| !self.staged.iter().any(|s| (self.identity)(s, *durable)))
            .find(|e| matches(*e))
            .cloned()
            .ok_or(RepositoryError::NotFound)?;

        let idx = self.staged.len();
        self.staged.push(found);
        Ok(&mut self.staged[idx])
    }

    /// Every entity matching `matches`: staged matches first, then durable
    /// matches not already represented by identity, each copied into the
    /// staged set.
    pub fn find_all(&mut self, matches: impl Fn(&E) -> bool) -> Vec<&mut E> {
        let mut picked: Vec<usize> = self
            .staged
            .iter()
            .enumerate()
            .filter(|(_, e)| matches(*e))
            .map(|(idx, _)| idx)
            .collect();

        for durable in &self.durable {
            if !matches(durable) {
                continue;
            }
            let seen = picked
                .iter()
                .any(|&idx| (self.identity)(&self.staged[idx], durable));
            if seen {
                continue;
            }

            self.staged.push(durable.clone());
            picked.push(self.staged.len() - 1);
        }

        // `picked` is ascending: staged hits first, then appended copies.
        self.staged
            .iter_mut()
            .enumerate()
            .filter(|(idx, _)| picked.binary_search(idx).is_ok())
            .map(|(_, e)| e)
            .collect()
    }

    /// Reject the commit if any staged entity would duplicate a different
    /// durable or staged entity.
    pub fn validate(&self) -> Result<(), RepositoryError> {
        for (idx, staged) in self.staged.iter().enumerate() {
            let conflict = self
                .durable
                .iter()
                .chain(self.staged[idx + 1..].iter())
                .filter(|other| !(self.identity)(*other, staged))
                .any(|other| (self.constraint)(other, staged));

            if conflict {
                return Err(RepositoryError::AlreadyExists);
            }
        }
        Ok(())
    }

    /// Commit the staged set, all or nothing.
    ///
    /// On failure nothing changes, the staged set included, so the caller can
    /// fix it up and retry.
    pub fn save(&mut self) -> Result<Vec<SharedEvent>, RepositoryError> {
        Transactional::save(self)
    }

    fn persist(&mut self) -> Vec<SharedEvent> {
        let mut events = Vec::new();

        for mut entity in std::mem::take(&mut self.staged) {
            events.extend(entity.take_events());

            match self.durable.iter().position(|d| (self.identity)(d, &entity)) {
                Some(idx) => self.durable[idx] = entity,
                None => self.durable.push(entity),
            }
        }

        events
    }
}

impl<E: EventSource + Clone> Transactional for Repository<E> {
    fn validate(&self) -> Result<(), RepositoryError> {
        Repository::validate(self)
    }

    fn persist(&mut self) -> Vec<SharedEvent> {
        Repository::persist(self)
    }

    fn reset(&mut self) {
        Repository::reset(self)
    }
}

impl<E> core::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Repository")
            .field("durable", &self.durable.len())
            .field("staged", &self.staged.len())
            .finish_non_exhaustive()
    }
}
