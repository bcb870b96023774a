mod election_timer;
pub(crate) mod stop_signal;
mod time;

#[cfg(test)]
mod test_utils;

pub(crate) use election_timer::ElectionTimer;
pub(crate) use stop_signal::{StopCheck, Stopper};
