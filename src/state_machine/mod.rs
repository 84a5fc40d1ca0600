// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Lifecycles in this crate are modelled as pure transition functions:
//! given a state and an input they return the next state and an output, and
//! touch nothing else. Whoever drives the machine applies the output.
//!
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! # Machines
//!
//! - [`instance_lifecycle`] - compute instance states as reported by providers
//! - [`path_lifecycle`] - a single permitted path, absent or present
//!
//! # Example
//!
//! ```rust
//! use cim_topology::state_machine::path_lifecycle::{PathCommand, PathEffect, PathState};
//! use cim_topology::state_machine::StateMachine;
//!
//! let (state, effect) = PathState::Absent.transition(&PathCommand::Add).unwrap();
//! assert_eq!(state, PathState::Present);
//! assert_eq!(effect, PathEffect::Authorize);
//!
//! // Adding again is a no-op
//! let (_, effect) = state.transition(&PathCommand::Add).unwrap();
//! assert_eq!(effect, PathEffect::Nothing);
//! ```

pub mod instance_lifecycle;
pub mod path_lifecycle;

/// Next state and output, or why the input was refused
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Refused transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The input is not accepted in this state
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The state is terminal and accepts no further input
    #[error("State {0} is terminal")]
    Terminal(String),
}

/// Pure lifecycle: states are values, transitions are functions of them
pub trait StateMachine: Sized + Clone {
    type Input;

    /// Effect for the driver of the machine to apply; `()` if none
    type Output;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Whether `input` would be accepted
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// All inputs accepted from the current state
    fn valid_inputs(&self) -> Vec<Self::Input>
    where
        Self::Input: Clone,
    {
        Vec::new()
    }
}

/// Record of one applied transition
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<S, I> {
    pub from: S,
    pub to: S,
    pub input: I,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<S, I> Transition<S, I> {
    pub fn new(from: S, to: S, input: I, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            from,
            to,
            input,
            timestamp,
        }
    }
}

/// Machine that remembers how it got to its current state
#[derive(Debug, Clone)]
pub struct StateMachineWithHistory<FSM: StateMachine> {
    pub current: FSM,

    /// Oldest first
    pub history: Vec<Transition<FSM, FSM::Input>>,
}

impl<FSM: StateMachine> StateMachineWithHistory<FSM> {
    pub fn new(initial: FSM) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    /// Apply `input`, recording the transition
    ///
    /// A rejected input leaves both the state and the history untouched.
    pub fn transition_with_history(
        &mut self,
        input: FSM::Input,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> TransitionResult<FSM::Output> {
        let from = self.current.clone();
        let (to, output) = self.current.transition(&input)?;

        self.history
            .push(Transition::new(from, to.clone(), input, timestamp));

        self.current = to;
        Ok(output)
    }

    pub fn get_history(&self) -> &[Transition<FSM, FSM::Input>] {
        &self.history
    }

    pub fn current_state(&self) -> &FSM {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Switch {
        Off,
        On,
        Broken,
    }

    #[derive(Debug, Clone)]
    enum SwitchInput {
        Press,
        Smash,
    }

    impl StateMachine for Switch {
        type Input = SwitchInput;
        type Output = ();

        fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
            match (self, input) {
                (Switch::Broken, _) => Err(TransitionError::Terminal("Broken".to_string())),
                (_, SwitchInput::Smash) => Ok((Switch::Broken, ())),
                (Switch::Off, SwitchInput::Press) => Ok((Switch::On, ())),
                (Switch::On, SwitchInput::Press) => Ok((Switch::Off, ())),
            }
        }
    }

    #[test]
    fn test_simple_transition() {
        let (new_state, _) = Switch::Off.transition(&SwitchInput::Press).unwrap();
        assert_eq!(new_state, Switch::On);
        assert!(!Switch::Broken.can_transition(&SwitchInput::Press));
    }

    #[test]
    fn test_state_machine_with_history() {
        let mut fsm = StateMachineWithHistory::new(Switch::Off);

        fsm.transition_with_history(SwitchInput::Press, Utc::now())
            .unwrap();
        fsm.transition_with_history(SwitchInput::Smash, Utc::now())
            .unwrap();
        assert_eq!(*fsm.current_state(), Switch::Broken);
        assert_eq!(fsm.get_history().len(), 2);
        assert_eq!(fsm.get_history()[0].from, Switch::Off);
        assert_eq!(fsm.get_history()[1].to, Switch::Broken);
    }

    #[test]
    fn test_rejected_input_keeps_history() {
        let mut fsm = StateMachineWithHistory::new(Switch::Broken);
        assert!(fsm
            .transition_with_history(SwitchInput::Press, Utc::now())
            .is_err());
        assert!(fsm.get_history().is_empty());
        assert_eq!(*fsm.current_state(), Switch::Broken);
    }
}
