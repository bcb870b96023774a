use crate::replica::ElectionStateChangeListener;
use crate::replica::ElectionStateSnapshot;

/// A change in this replica's role, as observed locally.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ElectionEvent {
    Leader,
    Candidate,
    Follower(FollowerEventData),
    FollowerNoLeader,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FollowerEventData {
    pub leader_server_id: String,
}

/// Consuming this is subtle. Intermediate events aren't queued: if several changes happen between
/// two calls to `next_event()`, only the most recent one is returned.
#[derive(Clone)]
pub struct ElectionEventListener {
    election_state_change_listener: ElectionStateChangeListener,
}

impl ElectionEventListener {
    pub(crate) fn new(election_state_change_listener: ElectionStateChangeListener) -> Self {
        ElectionEventListener {
            election_state_change_listener,
        }
    }

    /// Waits for the next role change. `None` once the replica is gone.
    pub async fn next_event(&mut self) -> Option<ElectionEvent> {
        self.election_state_change_listener
            .next()
            .await
            .map(ElectionEvent::from)
    }

    pub fn current(&self) -> ElectionEvent {
        ElectionEvent::from(self.election_state_change_listener.current())
    }
}

// ------- Conversions --------

impl From<ElectionStateSnapshot> for ElectionEvent {
    fn from(election_state: ElectionStateSnapshot) -> Self {
        match election_state {
            ElectionStateSnapshot::Leader => ElectionEvent::Leader,
            ElectionStateSnapshot::Candidate => ElectionEvent::Candidate,
            ElectionStateSnapshot::Follower(leader_id) => ElectionEvent::Follower(FollowerEventData {
                leader_server_id: leader_id.into_inner(),
            }),
            ElectionStateSnapshot::FollowerNoLeader => ElectionEvent::FollowerNoLeader,
        }
    }
}
