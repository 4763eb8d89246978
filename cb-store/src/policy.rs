//! Copy-conflict policy state machine
//!
//! When a copy destination already exists the resolver either applies a
//! standing "all" decision or asks its [`DecisionSource`] for a fresh one.
//! "Once" decisions cover a single item and fall back to `Unknown`.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyPolicy {
    #[default]
    Unknown,
    ReplaceOnce,
    ReplaceAll,
    SkipOnce,
    SkipAll,
}

/// What to do with the conflicting item at hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    Replace,
    Skip,
}

impl CopyPolicy {
    /// Standing policies apply without asking.
    #[inline]
    pub const fn is_standing(self) -> bool {
        matches!(self, CopyPolicy::ReplaceAll | CopyPolicy::SkipAll)
    }

    /// Action implied by a decided policy. `Unknown` replaces, matching the
    /// unattended default.
    #[inline]
    pub const fn action(self) -> ConflictAction {
        match self {
            CopyPolicy::SkipOnce | CopyPolicy::SkipAll => ConflictAction::Skip,
            CopyPolicy::Unknown | CopyPolicy::ReplaceOnce | CopyPolicy::ReplaceAll => {
                ConflictAction::Replace
            }
        }
    }

    /// State carried to the next conflicting item after `decision` was
    /// applied to the current one.
    #[inline]
    pub const fn after(decision: CopyPolicy) -> CopyPolicy {
        if decision.is_standing() {
            decision
        } else {
            CopyPolicy::Unknown
        }
    }

    /// Pure transition: `(state, decision) -> (action, next state)`.
    /// A standing state ignores `decision`.
    pub const fn transition(self, decision: CopyPolicy) -> (ConflictAction, CopyPolicy) {
        if self.is_standing() {
            (self.action(), self)
        } else {
            (decision.action(), Self::after(decision))
        }
    }
}

/// Supplies a decision for one conflicting item, e.g. a terminal prompt.
pub trait DecisionSource {
    fn decide(&mut self, item: &Path) -> CopyPolicy;
}

impl<F> DecisionSource for F
where
    F: FnMut(&Path) -> CopyPolicy,
{
    fn decide(&mut self, item: &Path) -> CopyPolicy {
        self(item)
    }
}

/// Source for unattended runs: replace everything on first conflict.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unattended;

impl DecisionSource for Unattended {
    fn decide(&mut self, _item: &Path) -> CopyPolicy {
        CopyPolicy::ReplaceAll
    }
}

/// Session-scoped resolver threading the policy through every conflict.
pub struct ConflictResolver {
    policy: CopyPolicy,
    source: Box<dyn DecisionSource + Send>,
    prompts: usize,
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("policy", &self.policy)
            .field("prompts", &self.prompts)
            .finish_non_exhaustive()
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::unattended()
    }
}

impl ConflictResolver {
    pub fn new(source: impl DecisionSource + Send + 'static) -> Self {
        Self {
            policy: CopyPolicy::Unknown,
            source: Box::new(source),
            prompts: 0,
        }
    }

    pub fn unattended() -> Self {
        Self::new(Unattended)
    }

    /// Pick the interactive source only when a live terminal can answer.
    pub fn for_terminal(interactive: bool, source: impl DecisionSource + Send + 'static) -> Self {
        if interactive {
            Self::new(source)
        } else {
            Self::unattended()
        }
    }

    pub fn policy(&self) -> CopyPolicy {
        self.policy
    }

    /// Number of times the decision source was consulted.
    pub fn prompts(&self) -> usize {
        self.prompts
    }

    /// Resolve one conflict on `item`.
    pub fn resolve(&mut self, item: &Path) -> ConflictAction {
        let decision = if self.policy.is_standing() {
            self.policy
        } else {
            self.prompts += 1;
            self.source.decide(item)
        };

        let (action, next) = self.policy.transition(decision);
        self.policy = next;
        action
    }
}
