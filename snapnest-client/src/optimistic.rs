//! Local display state that changes before the remote write confirms it.

/// The state as it was before an optimistic change.
#[must_use = "a snapshot that is dropped can no longer be rolled back to"]
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Snapshot<S>(S);

#[derive(Clone, Eq, PartialEq, Debug, Hash, Default)]
pub struct Optimistic<S> {
    state: S,
}

impl<S: Clone> Optimistic<S> {
    #[must_use]
    pub fn new(state: S) -> Self {
        Self { state }
    }

    #[must_use]
    pub fn get(&self) -> &S {
        &self.state
    }

    /// Overwrites the state with confirmed data.
    pub fn set(&mut self, state: S) {
        self.state = state;
    }

    pub fn apply(&mut self, change: impl FnOnce(&mut S)) -> Snapshot<S> {
        let snapshot = Snapshot(self.state.clone());
        change(&mut self.state);
        snapshot
    }

    pub fn rollback(&mut self, snapshot: Snapshot<S>) {
        self.state = snapshot.0;
    }

    /// Keeps the change when `result` succeeded and restores `snapshot`
    /// otherwise.
    pub fn settle<T, E>(&mut self, snapshot: Snapshot<S>, result: &Result<T, E>) {
        if result.is_err() {
            self.rollback(snapshot);
        }
    }

    /// Applies `change`, awaits `effect` and rolls back if it failed.
    pub async fn run<T, E>(
        &mut self,
        change: impl FnOnce(&mut S),
        effect: impl Future<Output = Result<T, E>>,
    ) -> Result<T, E> {
        let snapshot = self.apply(change);
        let result = effect.await;
        self.settle(snapshot, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::optimistic::Optimistic;

    #[test]
    fn rollback_restores_the_snapshot_exactly() {
        let mut count = Optimistic::new(41);

        let snapshot = count.apply(|count| *count += 1);
        assert_eq!(*count.get(), 42);

        count.rollback(snapshot);
        assert_eq!(*count.get(), 41);
    }

    #[tokio::test]
    async fn run_keeps_successful_changes() {
        let mut tags = Optimistic::new(vec!["sea"]);

        let result: Result<u8, &str> = tags.run(|tags| tags.push("sun"), async { Ok(1) }).await;

        assert_eq!(result, Ok(1));
        assert_eq!(tags.get(), &["sea", "sun"]);
    }

    #[tokio::test]
    async fn run_reverts_failed_changes() {
        let mut tags = Optimistic::new(vec!["sea"]);

        let result: Result<(), &str> = tags
            .run(|tags| tags.clear(), async { Err("offline") })
            .await;

        assert_eq!(result, Err("offline"));
        assert_eq!(tags.get(), &["sea"]);
    }
}
