// SnapTrace - Snippet Execution Tracer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Definite-assignment state.

use std::collections::BTreeSet;

use snaptrace_common::SourceRange;

/// The set of variables definitely assigned at a program point.
///
/// Variables are identified by the range of their declaring identifier. An
/// unreachable state is the identity of [`FlowState::meet`]: joining with it
/// yields the other operand. Every variable counts as assigned in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowState {
    assigned: BTreeSet<SourceRange>,
    unreachable: bool,
}

impl FlowState {
    /// The state after a jump.
    pub fn unreachable() -> Self {
        Self { assigned: BTreeSet::new(), unreachable: true }
    }

    /// Whether no path reaches this point.
    pub fn is_unreachable(&self) -> bool {
        self.unreachable
    }

    /// Marks the variable declared at `declaration` as assigned.
    pub fn assign(&mut self, declaration: SourceRange) {
        self.assigned.insert(declaration);
    }

    /// Whether the variable declared at `declaration` is definitely assigned.
    pub fn is_assigned(&self, declaration: &SourceRange) -> bool {
        self.unreachable || self.assigned.contains(declaration)
    }

    /// The state at a join point: assigned on both incoming paths.
    pub fn meet(&self, other: &Self) -> Self {
        match (self.unreachable, other.unreachable) {
            (true, _) => other.clone(),
            (_, true) => self.clone(),
            _ => Self {
                assigned: self.assigned.intersection(&other.assigned).copied().collect(),
                unreachable: false,
            },
        }
    }

    /// Adds every assignment of `other`. Used for `finally` blocks, which run
    /// on every path out of a `try`.
    pub fn include(&mut self, other: &Self) {
        if other.unreachable {
            *self = Self::unreachable();
        } else {
            self.assigned.extend(other.assigned.iter().copied());
        }
    }
}

/// Jump targets collected while walking a loop body.
#[derive(Debug, Clone)]
pub struct LoopFrame {
    /// Join of the states at every `break`.
    pub breaks: FlowState,
    /// Join of the states at every `continue`.
    pub continues: FlowState,
}

impl Default for LoopFrame {
    fn default() -> Self {
        Self { breaks: FlowState::unreachable(), continues: FlowState::unreachable() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meet_intersects_and_ignores_unreachable() {
        let (a, b) = (SourceRange::new(0, 1), SourceRange::new(5, 6));
        let mut left = FlowState::default();
        left.assign(a);
        left.assign(b);
        let mut right = FlowState::default();
        right.assign(b);

        let joined = left.meet(&right);
        assert!(!joined.is_assigned(&a));
        assert!(joined.is_assigned(&b));

        assert_eq!(FlowState::unreachable().meet(&left), left);
        assert_eq!(left.meet(&FlowState::unreachable()), left);
        assert!(FlowState::unreachable().meet(&FlowState::unreachable()).is_unreachable());
    }

    #[test]
    fn test_unreachable_assigns_everything() {
        let a = SourceRange::new(0, 1);
        assert!(FlowState::unreachable().is_assigned(&a));
        assert!(!FlowState::default().is_assigned(&a));
    }

    #[test]
    fn test_finally_assignments_are_included() {
        let a = SourceRange::new(0, 1);
        let mut after_try = FlowState::default();
        let mut finally = FlowState::default();
        finally.assign(a);
        after_try.include(&finally);
        assert!(after_try.is_assigned(&a));

        after_try.include(&FlowState::unreachable());
        assert!(after_try.is_unreachable());
    }
}
