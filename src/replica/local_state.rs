use crate::replica::peers::ServerId;
use std::fmt;

#[derive(Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub(crate) struct Term(u64);

impl Term {
    pub(crate) fn new(term: u64) -> Self {
        Term(term)
    }

    pub(crate) fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn incr(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// TermState holds the current term and who we voted for in it. Both are in memory only and are
/// lost when the process restarts.
///
/// Store methods are CAS-like: they return true if we mutated state.
pub(crate) struct TermState {
    current_term: Term,
    voted_for_this_term: Option<ServerId>,
    my_server_id: ServerId,
}

impl TermState {
    pub(crate) fn new(my_server_id: ServerId) -> Self {
        TermState {
            current_term: Term::new(0),
            voted_for_this_term: None,
            my_server_id,
        }
    }

    /// Set current term to `new_term` iff it is larger than current term. Clears our vote.
    pub(crate) fn store_term_if_increased(&mut self, new_term: Term) -> bool {
        if new_term <= self.current_term {
            false
        } else {
            self.current_term = new_term;
            self.voted_for_this_term = None;
            true
        }
    }

    /// Store our vote for `expected_term` iff that is still the current term and we have not voted
    /// for anyone else in it. Voting again for the same server is a no-op that returns true.
    pub(crate) fn store_vote_for_term_if_unvoted(&mut self, expected_term: Term, vote: ServerId) -> bool {
        if expected_term != self.current_term {
            return false;
        }

        match &self.voted_for_this_term {
            None => {
                self.voted_for_this_term.replace(vote);
                true
            }
            Some(existing) => *existing == vote,
        }
    }

    /// Return the new term. Used when transitioning to candidate.
    pub(crate) fn increment_term_and_vote_for_self(&mut self) -> Term {
        self.current_term.incr();
        self.voted_for_this_term.replace(self.my_server_id.clone());

        self.current_term
    }

    pub(crate) fn current_term(&self) -> Term {
        self.current_term
    }

    pub(crate) fn voted_for(&self) -> Option<&ServerId> {
        self.voted_for_this_term.as_ref()
    }
}
