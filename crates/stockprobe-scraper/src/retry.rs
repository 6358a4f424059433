//! Per-run retry accounting.
//!
//! Each stage owns a [`RetryState`] for the length of one pipeline run and
//! threads it through its loops by `&mut`. Counters are per [`RetryKind`]
//! and are reset once the item they guard succeeds or is given up.
//!
//! | Kind | Guards | Reset |
//! |------|--------|-------|
//! | `CategorySelectorMiss` | one category page | after the page yields links or is abandoned |
//! | `ProductSelectorMiss` | one listing page | after the grid is found or the page is abandoned |
//! | `ProbeTransient` | one product probe | before every product |

/// What a retry counter is guarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryKind {
    CategorySelectorMiss,
    ProductSelectorMiss,
    ProbeTransient,
}

impl RetryKind {
    const fn index(self) -> usize {
        match self {
            RetryKind::CategorySelectorMiss => 0,
            RetryKind::ProductSelectorMiss => 1,
            RetryKind::ProbeTransient => 2,
        }
    }
}

impl std::fmt::Display for RetryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryKind::CategorySelectorMiss => write!(f, "category_selector_miss"),
            RetryKind::ProductSelectorMiss => write!(f, "product_selector_miss"),
            RetryKind::ProbeTransient => write!(f, "probe_transient"),
        }
    }
}

/// Failed-attempt counters, each bounded by the same attempt budget.
///
/// A budget of 3 allows three attempts in total: the first try and two
/// retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    budget: u32,
    failures: [u32; 3],
}

impl RetryState {
    /// A budget of zero is treated as one attempt.
    #[must_use]
    pub fn new(budget: u32) -> Self {
        Self {
            budget: budget.max(1),
            failures: [0; 3],
        }
    }

    #[must_use]
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Failed attempts recorded for `kind` since its last reset.
    #[must_use]
    pub fn failures(&self, kind: RetryKind) -> u32 {
        self.failures[kind.index()]
    }

    /// Records one failed attempt and returns whether another is allowed.
    pub fn record_failure(&mut self, kind: RetryKind) -> bool {
        let count = &mut self.failures[kind.index()];
        *count = count.saturating_add(1);
        *count < self.budget
    }

    pub fn reset(&mut self, kind: RetryKind) {
        self.failures[kind.index()] = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_of_three_allows_three_attempts() {
        let mut state = RetryState::new(3);
        assert!(state.record_failure(RetryKind::CategorySelectorMiss));
        assert!(state.record_failure(RetryKind::CategorySelectorMiss));
        assert!(!state.record_failure(RetryKind::CategorySelectorMiss));
        assert_eq!(state.failures(RetryKind::CategorySelectorMiss), 3);
    }

    #[test]
    fn kinds_are_counted_independently() {
        let mut state = RetryState::new(3);
        state.record_failure(RetryKind::ProbeTransient);
        state.record_failure(RetryKind::ProbeTransient);
        assert_eq!(state.failures(RetryKind::ProbeTransient), 2);
        assert_eq!(state.failures(RetryKind::ProductSelectorMiss), 0);
        assert!(state.record_failure(RetryKind::ProductSelectorMiss));
    }

    #[test]
    fn reset_restores_full_budget() {
        let mut state = RetryState::new(2);
        state.record_failure(RetryKind::ProbeTransient);
        assert!(!state.record_failure(RetryKind::ProbeTransient));
        state.reset(RetryKind::ProbeTransient);
        assert_eq!(state.failures(RetryKind::ProbeTransient), 0);
        assert!(state.record_failure(RetryKind::ProbeTransient));
    }

    #[test]
    fn zero_budget_still_allows_first_attempt() {
        let mut state = RetryState::new(0);
        assert_eq!(state.budget(), 1);
        assert!(!state.record_failure(RetryKind::CategorySelectorMiss));
    }

    #[test]
    fn separate_states_do_not_share_counts() {
        let mut first = RetryState::new(3);
        let second = RetryState::new(3);
        first.record_failure(RetryKind::ProbeTransient);
        assert_eq!(second.failures(RetryKind::ProbeTransient), 0);
    }
}
