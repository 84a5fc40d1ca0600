// Copyright (c) 2025 - Cowboy AI, Inc.
//! Instance Lifecycle State Machine
//!
//! Provider-side lifecycle of a compute instance. The in-memory provider
//! drives every instance through this machine; real providers report the
//! same states.
//!
//! # States
//!
//! ```text
//!            Boot            Stop             Halt
//!  Pending ───────▶ Running ───────▶ Stopping ───────▶ Stopped
//!     ▲                │                                  │
//!     └────────────────┼──────────── Start ───────────────┘
//!                      │
//!   Terminate from Pending / Running / Stopping / Stopped
//!                      ▼
//!               ShuttingDown ──── Reap ────▶ Terminated
//! ```
//!
//! `Terminated` is terminal. `Terminate` on an instance that is already
//! shutting down is accepted and changes nothing.

use super::{StateMachine, TransitionError, TransitionResult};
use crate::domain::InstanceState;

/// Lifecycle command (FSM input)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceCommand {
    /// Finish booting
    Boot,
    /// Request a stop
    Stop,
    /// Finish stopping
    Halt,
    /// Start a stopped instance
    Start,
    /// Request termination
    Terminate,
    /// Finish terminating
    Reap,
}

impl StateMachine for InstanceState {
    type Input = InstanceCommand;
    type Output = ();

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use InstanceCommand::*;
        use InstanceState::*;

        let next = match (self, input) {
            (Terminated, _) => return Err(TransitionError::Terminal(self.to_string())),

            (Pending, Boot) => Running,
            (Running, Stop) => Stopping,
            (Stopping, Halt) => Stopped,
            (Stopped, Start) => Pending,

            (Pending | Running | Stopping | Stopped, Terminate) => ShuttingDown,
            (ShuttingDown, Terminate) => ShuttingDown,
            (ShuttingDown, Reap) => Terminated,

            (from, command) => {
                return Err(TransitionError::InvalidTransition {
                    from: from.to_string(),
                    to: format!("{:?}", command),
                })
            }
        };

        Ok((next, ()))
    }

    fn valid_inputs(&self) -> Vec<Self::Input> {
        use InstanceCommand::*;
        use InstanceState::*;

        match self {
            Pending => vec![Boot, Terminate],
            Running => vec![Stop, Terminate],
            Stopping => vec![Halt, Terminate],
            Stopped => vec![Start, Terminate],
            ShuttingDown => vec![Terminate, Reap],
            Terminated => Vec::new(),
        }
    }
}

/// Command that advances `state` one step towards `Running`, if any
pub fn step_towards_service(state: InstanceState) -> Option<InstanceCommand> {
    match state {
        InstanceState::Pending => Some(InstanceCommand::Boot),
        InstanceState::Stopping => Some(InstanceCommand::Halt),
        InstanceState::Stopped => Some(InstanceCommand::Start),
        _ => None,
    }
}
