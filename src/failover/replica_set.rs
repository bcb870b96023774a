use std::collections::HashSet;

/// The replicas a client knows about and the one it currently talks to.
#[derive(Clone, Debug)]
pub struct ReplicaSet {
    addresses: Vec<String>,
    current: usize,
    // Replicas that failed since the last success. Cleared once every replica has been tried.
    tried: HashSet<String>,
}

impl ReplicaSet {
    /// `primary` is tried first. Blank and duplicate entries are ignored.
    pub fn new(primary: impl Into<String>, others: impl IntoIterator<Item = String>) -> Self {
        let mut replica_set = ReplicaSet {
            addresses: Vec::new(),
            current: 0,
            tried: HashSet::new(),
        };
        replica_set.add(primary.into());
        for address in others {
            replica_set.add(address);
        }

        replica_set
    }

    pub fn current(&self) -> Option<&str> {
        self.addresses.get(self.current).map(String::as_str)
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub(crate) fn add(&mut self, address: String) -> bool {
        let address = address.trim().to_string();
        if address.is_empty() || self.addresses.contains(&address) {
            return false;
        }

        self.addresses.push(address);
        true
    }

    /// Replace the known set with what a replica reported, keeping the current replica.
    pub(crate) fn refresh<'a>(&mut self, reported: impl IntoIterator<Item = &'a str>) {
        let current = match self.current() {
            Some(current) => current.to_string(),
            None => {
                for address in reported {
                    self.add(address.to_string());
                }
                return;
            }
        };

        let mut refreshed = ReplicaSet::new(current.clone(), reported.into_iter().map(str::to_string));
        refreshed.current = 0;
        refreshed.tried = self.tried.drain().filter(|a| refreshed.addresses.contains(a)).collect();
        *self = refreshed;
    }

    pub(crate) fn record_success(&mut self) {
        self.tried.clear();
    }

    /// Mark the current replica as failed and move to one that hasn't been tried yet, starting
    /// over once all of them have. Returns whether the current replica changed.
    pub(crate) fn fail_over(&mut self) -> bool {
        let failed = match self.current() {
            Some(failed) => failed.to_string(),
            None => return false,
        };
        self.tried.insert(failed);

        let len = self.addresses.len();
        let untried = (1..len)
            .map(|offset| (self.current + offset) % len)
            .find(|&i| !self.tried.contains(&self.addresses[i]));
        let next = match untried {
            Some(next) => next,
            None => {
                self.tried.clear();
                (self.current + 1) % len
            }
        };

        let changed = next != self.current;
        self.current = next;
        changed
    }
}
