//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable
//! Given-When-Then syntax. Several actions can be applied in sequence; the
//! effects of the last one are what effect assertions see.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use conference_core::effect::Effect;
use conference_core::reducer::Reducer;

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S, &S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use conference_testing::ReducerTest;
///
/// ReducerTest::new(SeatReducer)
///     .given_state(state_with_seats(1))
///     .when_action(SeatAction::Register)
///     .then_state(|state| assert_eq!(state.conference.seats_available, 0))
///     .then_effects(|effects| assert!(effects.is_empty()))
///     .run();
/// ```
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    initial_state: Option<R::State>,
    actions: Vec<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
    effect_assertions: Vec<EffectAssertion<R::Action>>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::State: Clone,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to apply (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Add several actions, applied in order (When)
    #[must_use]
    pub fn when_actions<I>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = R::Action>,
    {
        self.actions.extend(actions);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.then_transition(move |_, after| assertion(after))
    }

    /// Add an assertion comparing the initial and resulting state (Then)
    #[must_use]
    pub fn then_transition<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State, &R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Assert the state was left untouched (Then)
    #[must_use]
    pub fn then_state_unchanged(self) -> Self
    where
        R::State: PartialEq + std::fmt::Debug,
    {
        self.then_transition(|before, after| {
            assert_eq!(before, after, "Expected the state to be unchanged");
        })
    }

    /// Add an assertion about the effects of the last action (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<R::Action>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state or actions are missing, or if any assertion
    /// fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self)
    where
        R::Environment: Default,
    {
        let env = R::Environment::default();
        let initial = self
            .initial_state
            .expect("Initial state must be set with given_state()");
        assert!(
            !self.actions.is_empty(),
            "At least one action must be set with when_action()"
        );

        let mut state = initial.clone();
        let mut effects = Vec::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env).into_vec();
        }

        for assertion in self.state_assertions {
            assertion(&initial, &state);
        }

        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use conference_core::effect::Effect;

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects contains anything but `Effect::None`.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conference_core::{SmallVec, smallvec};

    #[derive(Clone, Debug, PartialEq)]
    struct Seats {
        available: u32,
    }

    #[derive(Clone, Debug)]
    enum SeatAction {
        Take,
        Release,
    }

    struct SeatReducer;

    impl Reducer for SeatReducer {
        type State = Seats;
        type Action = SeatAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Seats,
            action: SeatAction,
            _env: &(),
        ) -> SmallVec<[Effect<SeatAction>; 4]> {
            match action {
                SeatAction::Take if state.available > 0 => {
                    state.available -= 1;
                    SmallVec::new()
                },
                SeatAction::Take => SmallVec::new(),
                SeatAction::Release => {
                    state.available += 1;
                    smallvec![Effect::None]
                },
            }
        }
    }

    #[test]
    fn take_then_release_restores_state() {
        ReducerTest::new(SeatReducer)
            .given_state(Seats { available: 1 })
            .when_actions([SeatAction::Take, SeatAction::Release])
            .then_state_unchanged()
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn take_with_no_seats_is_a_no_op() {
        ReducerTest::new(SeatReducer)
            .given_state(Seats { available: 0 })
            .when_action(SeatAction::Take)
            .then_state(|state| assert_eq!(state.available, 0))
            .then_effects(|effects| assert!(effects.is_empty()))
            .run();
    }

    #[test]
    fn transition_sees_both_states() {
        ReducerTest::new(SeatReducer)
            .given_state(Seats { available: 3 })
            .when_action(SeatAction::Take)
            .then_transition(|before, after| {
                assert_eq!(before.available - after.available, 1);
            })
            .run();
    }
}
