//! Feature machines
//!
//! One module per screen. Each defines its State, Action, Mutation and
//! SideEffect types, a [`Feature`](crate::machine::Feature) implementation
//! holding its collaborators, and a `start` helper that builds the
//! [`StateMachine`](crate::machine::StateMachine) with the right initial
//! state and action.
//!
//! Side effects only describe intent; `destination()` on each side effect
//! type maps it to a [`Destination`](crate::navigation::Destination) for
//! [`forward_effects`](crate::navigation::forward_effects).

pub mod bartender;
pub mod discovery;
pub mod drink_detail;
pub mod drink_list;
pub mod favorites;
pub mod search;
pub mod shake;
