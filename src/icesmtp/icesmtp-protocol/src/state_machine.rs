/*
 * icesmtp - SMTP protocol engine
 * Copyright (C) 2022 viridIT SAS
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or any later version.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * this program. If not, see https://www.gnu.org/licenses/.
 *
*/

use crate::command::{is_command_allowed, Verb};
use icesmtp_common::State;

/// An attempt to move the session to a state the transition table does
/// not allow. The machine is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid state transition from {from} to {attempted}")]
pub struct StateTransitionError {
    /// The state the machine was in.
    pub from: State,
    /// The state that was requested.
    pub attempted: State,
}

/// Enforces the legal SMTP command sequences of RFC 5321.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    state: State,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// The states reachable from a given state.
#[must_use]
pub const fn allowed_transitions(state: State) -> &'static [State] {
    match state {
        State::Disconnected => &[State::Connected],
        State::Connected => &[State::Greeted, State::Terminated, State::Aborted],
        State::Greeted => &[State::Identified, State::Terminating, State::Aborted],
        State::Identified => &[
            State::Identified,
            State::MailFrom,
            State::StartTls,
            State::Terminating,
            State::Aborted,
        ],
        State::MailFrom => &[
            State::RcptTo,
            State::Identified,
            State::Terminating,
            State::Aborted,
        ],
        State::RcptTo => &[
            State::RcptTo,
            State::Data,
            State::Identified,
            State::Terminating,
            State::Aborted,
        ],
        State::Data => &[State::DataDone, State::Aborted],
        State::DataDone => &[State::Identified, State::Terminating, State::Aborted],
        State::StartTls => &[State::Greeted, State::Aborted],
        State::Terminating => &[State::Terminated],
        State::Terminated | State::Aborted => &[],
    }
}

impl StateMachine {
    /// A machine in the `Disconnected` state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: State::Disconnected,
        }
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Move to `next` if the transition table allows it.
    ///
    /// # Errors
    ///
    /// * the transition is not in the table; the state is unchanged
    pub fn transition(&mut self, next: State) -> Result<(), StateTransitionError> {
        if !allowed_transitions(self.state).contains(&next) {
            return Err(StateTransitionError {
                from: self.state,
                attempted: next,
            });
        }
        tracing::trace!(from = %self.state, to = %next, "state transition");
        self.state = next;
        Ok(())
    }

    /// The state a *successful* command leads to. Failed commands never
    /// change state, so the engine only calls this after the handler
    /// produced a positive outcome.
    ///
    /// # Errors
    ///
    /// * the derived transition is not in the table
    pub fn transition_for_command(&mut self, verb: Verb) -> Result<State, StateTransitionError> {
        let next = self.next_state_for(verb);
        if next != self.state {
            self.transition(next)?;
        }
        Ok(self.state)
    }

    const fn next_state_for(&self, verb: Verb) -> State {
        match verb {
            Verb::Helo | Verb::Ehlo => State::Identified,
            Verb::Mail => State::MailFrom,
            Verb::Rcpt => State::RcptTo,
            Verb::Data => State::Data,
            Verb::Rset => {
                if self.state.in_transaction() {
                    State::Identified
                } else {
                    self.state
                }
            }
            Verb::Quit => State::Terminating,
            Verb::Starttls => State::StartTls,
            _ => self.state,
        }
    }

    /// Return to `Identified` at the end of a transaction. A no-op
    /// outside transactions and `DataDone`.
    pub fn reset(&mut self) {
        if self.state.in_transaction() || self.state == State::DataDone {
            let _ = self.transition(State::Identified);
        }
    }

    /// `Disconnected` to `Connected`.
    ///
    /// # Errors
    ///
    /// * the session is already connected
    pub fn connect(&mut self) -> Result<(), StateTransitionError> {
        self.transition(State::Connected)
    }

    /// `Connected` to `Greeted`, once the 220 greeting is out.
    ///
    /// # Errors
    ///
    /// * the greeting was already sent, or no connection is active
    pub fn greet(&mut self) -> Result<(), StateTransitionError> {
        self.transition(State::Greeted)
    }

    /// `Data` to `DataDone`, once the terminator has been consumed.
    ///
    /// # Errors
    ///
    /// * the session is not receiving message content
    pub fn data_complete(&mut self) -> Result<(), StateTransitionError> {
        self.transition(State::DataDone)
    }

    /// `StartTls` back to `Greeted`: after the TLS upgrade the client
    /// must re-identify with EHLO (RFC 3207 section 4.2).
    ///
    /// # Errors
    ///
    /// * no STARTTLS negotiation is in progress
    pub fn tls_complete(&mut self) -> Result<(), StateTransitionError> {
        self.transition(State::Greeted)
    }

    /// Move to the clean terminal state.
    ///
    /// # Errors
    ///
    /// * the current state does not lead to `Terminated`
    pub fn terminate(&mut self) -> Result<(), StateTransitionError> {
        self.transition(State::Terminated)
    }

    /// Move to the forced terminal state.
    ///
    /// # Errors
    ///
    /// * the session already reached a terminal state
    pub fn abort(&mut self) -> Result<(), StateTransitionError> {
        self.transition(State::Aborted)
    }

    /// True if `verb` may be dispatched in the current state.
    #[must_use]
    pub fn is_command_allowed(&self, verb: Verb) -> bool {
        is_command_allowed(self.state, verb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::allowed_commands;

    const ALL_STATES: [State; 12] = [
        State::Disconnected,
        State::Connected,
        State::Greeted,
        State::Identified,
        State::MailFrom,
        State::RcptTo,
        State::Data,
        State::DataDone,
        State::StartTls,
        State::Terminating,
        State::Terminated,
        State::Aborted,
    ];

    fn machine_at(state: State) -> StateMachine {
        StateMachine { state }
    }

    #[test]
    fn connect_and_greet() {
        let mut machine = StateMachine::new();
        machine.connect().unwrap();
        assert_eq!(machine.state(), State::Connected);
        machine.greet().unwrap();
        assert_eq!(machine.state(), State::Greeted);
    }

    #[test]
    fn double_connect_fails() {
        let mut machine = StateMachine::new();
        machine.connect().unwrap();
        let err = machine.connect().unwrap_err();
        assert_eq!(err.from, State::Connected);
        assert_eq!(err.attempted, State::Connected);
    }

    #[test]
    fn failed_transition_does_not_mutate() {
        let mut machine = machine_at(State::Greeted);
        assert!(machine.transition(State::Data).is_err());
        assert_eq!(machine.state(), State::Greeted);
    }

    #[test]
    fn full_transaction_walk() {
        let mut machine = machine_at(State::Greeted);
        machine.transition_for_command(Verb::Ehlo).unwrap();
        assert_eq!(machine.state(), State::Identified);
        machine.transition_for_command(Verb::Mail).unwrap();
        assert_eq!(machine.state(), State::MailFrom);
        machine.transition_for_command(Verb::Rcpt).unwrap();
        machine.transition_for_command(Verb::Rcpt).unwrap();
        assert_eq!(machine.state(), State::RcptTo);
        machine.transition_for_command(Verb::Data).unwrap();
        assert_eq!(machine.state(), State::Data);
        machine.data_complete().unwrap();
        assert_eq!(machine.state(), State::DataDone);
        machine.reset();
        assert_eq!(machine.state(), State::Identified);
    }

    #[test]
    fn quit_walk() {
        let mut machine = machine_at(State::Identified);
        machine.transition_for_command(Verb::Quit).unwrap();
        assert_eq!(machine.state(), State::Terminating);
        machine.terminate().unwrap();
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn rset_outside_transaction_keeps_state() {
        let mut machine = machine_at(State::Greeted);
        machine.transition_for_command(Verb::Rset).unwrap();
        assert_eq!(machine.state(), State::Greeted);

        let mut machine = machine_at(State::MailFrom);
        machine.transition_for_command(Verb::Rset).unwrap();
        assert_eq!(machine.state(), State::Identified);
    }

    #[test]
    fn starttls_returns_to_greeted() {
        let mut machine = machine_at(State::Identified);
        machine.transition_for_command(Verb::Starttls).unwrap();
        assert_eq!(machine.state(), State::StartTls);
        machine.tls_complete().unwrap();
        assert_eq!(machine.state(), State::Greeted);
    }

    #[test]
    fn terminal_states_are_dead_ends() {
        for state in [State::Terminated, State::Aborted] {
            assert!(allowed_transitions(state).is_empty());
            let mut machine = machine_at(state);
            assert!(machine.abort().is_err());
            assert_eq!(machine.state(), state);
        }
    }

    // Every command the table allows in a state leads, on success, to a
    // state the transition table also allows.
    #[test]
    fn table_closure() {
        for state in ALL_STATES {
            for &verb in allowed_commands(state) {
                let mut machine = machine_at(state);
                let next = machine
                    .transition_for_command(verb)
                    .unwrap_or_else(|e| panic!("{state} + {verb}: {e}"));
                assert!(
                    next == state || allowed_transitions(state).contains(&next),
                    "{state} + {verb} leads to {next} outside the table"
                );
            }
        }
    }

    #[test]
    fn abort_allowed_mid_data() {
        let mut machine = machine_at(State::Data);
        machine.abort().unwrap();
        assert_eq!(machine.state(), State::Aborted);
    }
}
