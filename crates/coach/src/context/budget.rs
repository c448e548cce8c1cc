//! Token budgeting for the conversation history window.
//!
//! Must-keep content (system prompt with profile, memories and protocols,
//! plus the current user turn) is always sent. History fills whatever the
//! budget leaves after the response reserve, newest first, and stops at the
//! first message that does not fit so the window is always a contiguous
//! suffix of the log.

use serde::{Deserialize, Serialize};

/// Token budget configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Total tokens for one request, prompt plus reply.
    pub context: usize,
    /// Tokens held back for the reply.
    pub response_reserve: usize,
}

impl TokenBudget {
    pub fn new(context: usize, response_reserve: usize) -> Self {
        Self {
            context,
            response_reserve,
        }
    }

    /// Tokens left for history once `must_keep` is paid for.
    pub fn available_for_history(&self, must_keep: usize) -> usize {
        self.context
            .saturating_sub(self.response_reserve)
            .saturating_sub(must_keep)
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            context: 8000,
            response_reserve: 1000,
        }
    }
}

/// Outcome of history selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryWindow {
    /// Index into the chronological history where the kept suffix begins.
    pub start: usize,
    /// Messages kept.
    pub included: usize,
    /// Older messages left out.
    pub dropped: usize,
    /// Tokens used by the kept messages.
    pub tokens: usize,
    /// Tokens that were available for history.
    pub available: usize,
    /// Must-keep content alone exhausted the budget.
    pub degraded: bool,
}

/// Select the longest suffix of `costs` (chronological, oldest first) whose
/// total fits in what `budget` leaves after `must_keep`.
///
/// Walks newest to oldest and stops at the first message that does not fit.
pub fn select_history(budget: &TokenBudget, must_keep: usize, costs: &[usize]) -> HistoryWindow {
    let available = budget.available_for_history(must_keep);
    let degraded = must_keep + budget.response_reserve >= budget.context;

    let mut used = 0;
    let mut start = costs.len();
    for (idx, cost) in costs.iter().enumerate().rev() {
        if used + cost > available {
            break;
        }
        used += cost;
        start = idx;
    }

    HistoryWindow {
        start,
        included: costs.len() - start,
        dropped: start,
        tokens: used,
        available,
        degraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everything_fits() {
        let window = select_history(&TokenBudget::new(100, 10), 20, &[10, 10, 10]);
        assert_eq!(window.start, 0);
        assert_eq!(window.included, 3);
        assert_eq!(window.dropped, 0);
        assert_eq!(window.tokens, 30);
        assert_eq!(window.available, 70);
        assert!(!window.degraded);
    }

    #[test]
    fn keeps_newest_suffix() {
        // 12 messages of 14 tokens; 115 available fits exactly 8
        let costs = vec![14; 12];
        let budget = TokenBudget::new(115 + 50 + 100, 100);
        let window = select_history(&budget, 50, &costs);
        assert_eq!(window.included, 8);
        assert_eq!(window.start, 4);
        assert_eq!(window.tokens, 112);
    }

    #[test]
    fn stops_at_first_overflow_without_gaps() {
        // the 50-token message blocks older small ones even though they'd fit
        let costs = [5, 5, 50, 10];
        let window = select_history(&TokenBudget::new(40, 0), 0, &costs);
        assert_eq!(window.start, 3);
        assert_eq!(window.included, 1);
        assert_eq!(window.tokens, 10);
    }

    #[test]
    fn must_keep_over_budget_degrades_to_empty() {
        let window = select_history(&TokenBudget::new(100, 20), 500, &[1, 1]);
        assert_eq!(window.included, 0);
        assert_eq!(window.dropped, 2);
        assert_eq!(window.available, 0);
        assert!(window.degraded);
    }

    #[test]
    fn empty_history() {
        let window = select_history(&TokenBudget::default(), 100, &[]);
        assert_eq!(window.included, 0);
        assert_eq!(window.dropped, 0);
        assert!(!window.degraded);
    }

    #[test]
    fn never_exceeds_available() {
        let costs: Vec<usize> = (1..40).map(|i| (i * 7) % 23 + 1).collect();
        for context in (0..400).step_by(13) {
            let budget = TokenBudget::new(context, 30);
            let window = select_history(&budget, 25, &costs);
            assert!(window.tokens <= window.available);
            assert_eq!(window.tokens, costs[window.start..].iter().sum::<usize>());
        }
    }

    #[test]
    fn shrinking_budget_never_adds_messages() {
        let costs: Vec<usize> = (0..30).map(|i| 3 + (i * 5) % 17).collect();
        let mut previous = usize::MAX;
        for context in (0..600).rev() {
            let window = select_history(&TokenBudget::new(context, 40), 60, &costs);
            assert!(window.included <= previous);
            previous = window.included;
        }
    }
}
