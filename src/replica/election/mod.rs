mod election_state;
mod state_change_listener;
mod timers;

pub(crate) use election_state::CurrentLeader;
pub(crate) use election_state::ElectionState;
pub(crate) use state_change_listener::ElectionStateChangeListener;
pub(crate) use state_change_listener::ElectionStateSnapshot;
pub(crate) use timers::stop_signal;
pub(crate) use timers::ElectionTimer;
pub(crate) use timers::{StopCheck, Stopper};
