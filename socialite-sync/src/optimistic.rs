//! Optimistic local mutations.
//!
//! A mutation is applied to local state first, then confirmed by the remote
//! service. If the remote call fails (or the work is discarded before it
//! runs) exactly the applied change is undone.

use crate::error::{SyncError, SyncResult};
use socialite_store::{ChangeSet, Mergeable, MutationGuard, Shared};
use tracing::warn;

/// Applies `apply`, runs `remote`, and undoes the change with `revert` if
/// `remote` fails. `apply` returns whatever `revert` needs to undo it.
pub fn run_optimistic<U, R>(
    apply: impl FnOnce() -> U,
    revert: impl FnOnce(U),
    remote: impl FnOnce() -> SyncResult<R>,
) -> SyncResult<R> {
    let undo = apply();
    match remote() {
        Ok(value) => Ok(value),
        Err(err) => {
            revert(undo);
            Err(err)
        }
    }
}

type Revert<T, U> = Box<dyn FnOnce(&mut T, &mut ChangeSet<<T as Mergeable>::Field>, U) + Send>;

/// An applied-but-unconfirmed change to one entity.
///
/// Holds the entity's mutation slot until settled, so a second mutation of
/// the same entity fails fast with [`SyncError::MutationInFlight`]. Dropping
/// an unsettled mutation reverts it.
pub struct OptimisticMutation<T: Mergeable, U: Send + 'static> {
    guard: MutationGuard<T>,
    undo: Option<(U, Revert<T, U>)>,
}

impl<T: Mergeable, U: Send + 'static> OptimisticMutation<T, U> {
    /// Claims `entity` and applies the local change. Local state is not
    /// touched when the claim fails.
    pub fn begin(
        entity: &Shared<T>,
        apply: impl FnOnce(&mut T, &mut ChangeSet<T::Field>) -> U,
        revert: impl FnOnce(&mut T, &mut ChangeSet<T::Field>, U) + Send + 'static,
    ) -> SyncResult<Self> {
        let guard = entity
            .begin_mutation()
            .ok_or_else(|| SyncError::MutationInFlight(entity.id().clone()))?;
        let undo = entity.update(apply);
        Ok(Self {
            guard,
            undo: Some((undo, Box::new(revert))),
        })
    }

    pub fn entity(&self) -> &Shared<T> {
        self.guard.entity()
    }

    /// Keeps the change on success, reverts it on failure. Either way the
    /// outcome is handed back.
    pub fn settle<R>(mut self, outcome: SyncResult<R>) -> SyncResult<R> {
        match outcome {
            Ok(value) => {
                self.undo = None;
                Ok(value)
            }
            Err(err) => {
                warn!(entity = %self.entity().id(), error = %err, "remote rejected change, reverting");
                self.revert();
                Err(err)
            }
        }
    }

    fn revert(&mut self) {
        if let Some((undo, revert)) = self.undo.take() {
            self.guard
                .entity()
                .update(move |state, changes| revert(state, changes, undo));
        }
    }
}

impl<T: Mergeable, U: Send + 'static> Drop for OptimisticMutation<T, U> {
    fn drop(&mut self) {
        if self.undo.is_some() {
            warn!(entity = %self.entity().id(), "mutation abandoned before settling, reverting");
            self.revert();
        }
    }
}
