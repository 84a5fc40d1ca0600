// Copyright (c) 2025 - Cowboy AI, Inc.
//! Single Path Lifecycle
//!
//! ```text
//!          Add / Authorize
//!  Absent ────────────────▶ Present
//!     ▲                        │
//!     └──── Remove / Revoke ───┘
//! ```
//!
//! Repeating an input in the state it leads to is accepted and yields
//! [`PathEffect::Nothing`]; neither `add` nor `remove` ever fails on state.

use super::{StateMachine, TransitionResult};

/// Whether a path's rule exists at the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathState {
    Absent,
    Present,
}

impl PathState {
    pub fn from_presence(present: bool) -> Self {
        if present {
            Self::Present
        } else {
            Self::Absent
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathCommand {
    Add,
    Remove,
}

/// Provider call the transition requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathEffect {
    Authorize,
    Revoke,
    Nothing,
}

impl StateMachine for PathState {
    type Input = PathCommand;
    type Output = PathEffect;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        Ok(match (self, input) {
            (PathState::Absent, PathCommand::Add) => (PathState::Present, PathEffect::Authorize),
            (PathState::Present, PathCommand::Add) => (PathState::Present, PathEffect::Nothing),
            (PathState::Present, PathCommand::Remove) => (PathState::Absent, PathEffect::Revoke),
            (PathState::Absent, PathCommand::Remove) => (PathState::Absent, PathEffect::Nothing),
        })
    }

    fn valid_inputs(&self) -> Vec<Self::Input> {
        vec![PathCommand::Add, PathCommand::Remove]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(PathState::Absent, PathCommand::Add, PathState::Present, PathEffect::Authorize)]
    #[test_case(PathState::Present, PathCommand::Add, PathState::Present, PathEffect::Nothing ; "add is idempotent")]
    #[test_case(PathState::Present, PathCommand::Remove, PathState::Absent, PathEffect::Revoke)]
    #[test_case(PathState::Absent, PathCommand::Remove, PathState::Absent, PathEffect::Nothing ; "remove of absent path")]
    fn test_transition(from: PathState, command: PathCommand, to: PathState, effect: PathEffect) {
        assert_eq!(from.transition(&command).unwrap(), (to, effect));
    }
}
