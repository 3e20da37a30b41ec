// ── Loading flags ──
//
// One in-flight counter per operation category. A category reads as
// loading while its counter is above zero, so overlapping calls of the
// same kind do not clear each other's flag.

use std::collections::BTreeMap;

use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};
use tokio::sync::watch;

/// Operation category a loading flag is kept for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LoadingKind {
    System,
    Meters,
    Details,
    Readings,
    Daily,
    Mqtt,
    Delete,
    Scan,
}

/// Snapshot of every loading flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadingState {
    in_flight: BTreeMap<LoadingKind, u32>,
}

impl LoadingState {
    pub fn is_loading(&self, kind: LoadingKind) -> bool {
        self.in_flight.get(&kind).is_some_and(|n| *n > 0)
    }

    pub fn any(&self) -> bool {
        self.in_flight.values().any(|n| *n > 0)
    }

    /// Categories currently loading, in declaration order.
    pub fn active(&self) -> Vec<LoadingKind> {
        LoadingKind::iter().filter(|k| self.is_loading(*k)).collect()
    }

    fn enter(&mut self, kind: LoadingKind) {
        *self.in_flight.entry(kind).or_insert(0) += 1;
    }

    fn leave(&mut self, kind: LoadingKind) {
        if let Some(n) = self.in_flight.get_mut(&kind) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                self.in_flight.remove(&kind);
            }
        }
    }
}

/// Clears its loading flag when dropped, whatever way the scope ends.
#[must_use = "the loading flag clears as soon as the guard is dropped"]
pub struct LoadingGuard<'a> {
    state: &'a watch::Sender<LoadingState>,
    kind: LoadingKind,
}

impl<'a> LoadingGuard<'a> {
    pub(crate) fn enter(state: &'a watch::Sender<LoadingState>, kind: LoadingKind) -> Self {
        state.send_modify(|s| s.enter(kind));
        Self { state, kind }
    }

    pub fn kind(&self) -> LoadingKind {
        self.kind
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let kind = self.kind;
        self.state.send_modify(|s| s.leave(kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_sets_and_clears_flag() {
        let (tx, _) = watch::channel(LoadingState::default());
        {
            let _guard = LoadingGuard::enter(&tx, LoadingKind::Meters);
            assert!(tx.borrow().is_loading(LoadingKind::Meters));
            assert!(!tx.borrow().is_loading(LoadingKind::Scan));
        }
        assert!(!tx.borrow().any());
    }

    #[test]
    fn overlapping_calls_keep_flag_until_last_finishes() {
        let (tx, _) = watch::channel(LoadingState::default());
        let first = LoadingGuard::enter(&tx, LoadingKind::Readings);
        let second = LoadingGuard::enter(&tx, LoadingKind::Readings);
        drop(first);
        assert!(tx.borrow().is_loading(LoadingKind::Readings));
        drop(second);
        assert!(!tx.borrow().is_loading(LoadingKind::Readings));
    }

    #[test]
    fn flag_clears_on_early_return() {
        fn failing(tx: &watch::Sender<LoadingState>) -> Result<(), &'static str> {
            let _guard = LoadingGuard::enter(tx, LoadingKind::Delete);
            Err::<(), _>("wrong code")?;
            Ok(())
        }

        let (tx, _) = watch::channel(LoadingState::default());
        assert!(failing(&tx).is_err());
        assert!(!tx.borrow().is_loading(LoadingKind::Delete));
    }

    #[test]
    fn active_lists_in_declaration_order() {
        let (tx, _) = watch::channel(LoadingState::default());
        let _scan = LoadingGuard::enter(&tx, LoadingKind::Scan);
        let _system = LoadingGuard::enter(&tx, LoadingKind::System);
        assert_eq!(tx.borrow().active(), vec![LoadingKind::System, LoadingKind::Scan]);
        assert_eq!(LoadingKind::Mqtt.to_string(), "mqtt");
    }
}
