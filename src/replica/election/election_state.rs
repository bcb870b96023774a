use crate::replica::election::state_change_listener::{
    self, ElectionStateChangeListener, ElectionStateChangeNotifier, ElectionStateSnapshot,
};
use crate::replica::{ServerId, ServerRole, Term};
use std::collections::HashSet;
use std::fmt;

/// ElectionState is responsible for holding state specific to the stage in an election. Its
/// methods are responsible for "what" to do. It is NOT responsible for validating terms or peers,
/// or knowing "when" to do something.
pub(crate) struct ElectionState {
    state: State,
    my_server_id: ServerId,
    state_change_notifier: ElectionStateChangeNotifier,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum CurrentLeader {
    Me,
    Other(ServerId),
    Unknown,
}

impl ElectionState {
    /// `new_follower()` creates a new ElectionState instance that starts out as a follower with no
    /// known leader.
    pub(crate) fn new_follower(my_server_id: ServerId) -> (Self, ElectionStateChangeListener) {
        let initial_state = State::Follower(FollowerState { leader: None });
        let (notifier, listener) = state_change_listener::new(Self::current_state_impl(&initial_state));

        let election_state = ElectionState {
            state: initial_state,
            my_server_id,
            state_change_notifier: notifier,
        };

        (election_state, listener)
    }

    pub(crate) fn transition_to_follower(&mut self, new_leader: Option<ServerId>) {
        self.state = State::Follower(FollowerState { leader: new_leader });
        self.notify_new_state();
    }

    pub(crate) fn transition_to_candidate_and_vote_for_self(&mut self, term: Term) {
        let mut cs = CandidateState {
            term,
            received_votes_from: HashSet::with_capacity(3),
        };
        cs.add_received_vote(self.my_server_id.clone());

        self.state = State::Candidate(cs);
        self.notify_new_state();
    }

    pub(crate) fn transition_to_leader(&mut self) {
        self.state = State::Leader;
        self.notify_new_state();
    }

    pub(crate) fn is_leader(&self) -> bool {
        matches!(self.state, State::Leader)
    }

    pub(crate) fn role(&self) -> ServerRole {
        match self.state {
            State::Leader => ServerRole::Leader,
            State::Candidate(_) => ServerRole::Candidate,
            State::Follower(_) => ServerRole::Follower,
        }
    }

    pub(crate) fn current_leader(&self) -> CurrentLeader {
        match &self.state {
            State::Leader => CurrentLeader::Me,
            State::Candidate(_) => CurrentLeader::Unknown,
            State::Follower(FollowerState { leader: None }) => CurrentLeader::Unknown,
            State::Follower(FollowerState { leader: Some(leader) }) => CurrentLeader::Other(leader.clone()),
        }
    }

    pub(crate) fn leader_id(&self) -> Option<ServerId> {
        match self.current_leader() {
            CurrentLeader::Me => Some(self.my_server_id.clone()),
            CurrentLeader::Other(leader) => Some(leader),
            CurrentLeader::Unknown => None,
        }
    }

    /// Forget the leader, but stay follower. Return true if there was a leader to forget.
    pub(crate) fn clear_leader_if_follower(&mut self) -> bool {
        if let State::Follower(fs) = &mut self.state {
            if fs.leader.take().is_some() {
                self.notify_new_state();
                return true;
            }
        }
        false
    }

    /// Return number of votes received if still a candidate for `term`, or None if we've moved on.
    pub(crate) fn add_vote_if_candidate(&mut self, term: Term, vote_from: ServerId) -> Option<usize> {
        match &mut self.state {
            State::Candidate(cs) if cs.term == term => Some(cs.add_received_vote(vote_from)),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn current_state(&self) -> ElectionStateSnapshot {
        Self::current_state_impl(&self.state)
    }

    fn current_state_impl(state: &State) -> ElectionStateSnapshot {
        match state {
            State::Leader => ElectionStateSnapshot::Leader,
            State::Candidate(_) => ElectionStateSnapshot::Candidate,
            State::Follower(FollowerState { leader: None }) => ElectionStateSnapshot::FollowerNoLeader,
            State::Follower(FollowerState { leader: Some(leader) }) => ElectionStateSnapshot::Follower(leader.clone()),
        }
    }

    fn notify_new_state(&self) {
        self.state_change_notifier
            .notify_new_state(Self::current_state_impl(&self.state));
    }
}

impl fmt::Debug for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Leader => write!(f, "Leader"),
            State::Candidate(cs) => write!(
                f,
                "Candidate(Term={:?}, Votes={})",
                cs.term,
                cs.received_votes_from.len()
            ),
            State::Follower(FollowerState { leader: Some(leader) }) => write!(f, "Follower(Leader={})", leader),
            State::Follower(FollowerState { leader: None }) => write!(f, "Follower(Leader=None)"),
        }
    }
}

enum State {
    Leader,
    Candidate(CandidateState),
    Follower(FollowerState),
}

struct CandidateState {
    term: Term,
    received_votes_from: HashSet<ServerId>,
}

struct FollowerState {
    leader: Option<ServerId>,
}

impl CandidateState {
    /// `add_received_vote()` returns the number of unique votes we've received after adding the
    /// provided `vote_from`
    fn add_received_vote(&mut self, vote_from: ServerId) -> usize {
        self.received_votes_from.insert(vote_from);
        self.received_votes_from.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn votes_only_count_for_the_open_election() {
        let (mut es, _listener) = ElectionState::new_follower(ServerId::new("me"));
        assert_eq!(None, es.add_vote_if_candidate(Term::new(1), ServerId::new("a")));

        es.transition_to_candidate_and_vote_for_self(Term::new(2));
        assert_eq!(None, es.add_vote_if_candidate(Term::new(1), ServerId::new("a")));
        assert_eq!(Some(2), es.add_vote_if_candidate(Term::new(2), ServerId::new("a")));
        // Duplicate votes don't count twice.
        assert_eq!(Some(2), es.add_vote_if_candidate(Term::new(2), ServerId::new("a")));

        es.transition_to_leader();
        assert_eq!(None, es.add_vote_if_candidate(Term::new(2), ServerId::new("b")));
        assert_eq!(Some(ServerId::new("me")), es.leader_id());
    }

    #[tokio::test]
    async fn listener_observes_transitions() {
        let (mut es, mut listener) = ElectionState::new_follower(ServerId::new("me"));
        assert_eq!(ElectionStateSnapshot::FollowerNoLeader, listener.current());

        es.transition_to_follower(Some(ServerId::new("a")));
        assert_eq!(
            Some(ElectionStateSnapshot::Follower(ServerId::new("a"))),
            listener.next().await
        );

        assert!(es.clear_leader_if_follower());
        assert!(!es.clear_leader_if_follower());
        assert_eq!(Some(ElectionStateSnapshot::FollowerNoLeader), listener.next().await);
    }
}
