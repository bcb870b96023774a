use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// ServerId...or ReplicaId. Same thing, but the rest of the chat backend calls it server id.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct ServerId(String);

impl ServerId {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        ServerId(id.into())
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role label a replica advertises about itself over the wire.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ServerRole {
    Leader,
    Follower,
    Candidate,
}

impl ServerRole {
    pub(crate) fn as_label(&self) -> &'static str {
        match self {
            ServerRole::Leader => "leader",
            ServerRole::Follower => "follower",
            ServerRole::Candidate => "candidate",
        }
    }

    pub(crate) fn from_label(label: &str) -> Option<Self> {
        match label {
            "leader" => Some(ServerRole::Leader),
            "follower" => Some(ServerRole::Follower),
            "candidate" => Some(ServerRole::Candidate),
            _ => None,
        }
    }
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ServerInfo {
    pub(crate) server_id: ServerId,
    pub(crate) address: String,
    pub(crate) role: ServerRole,
}

/// Where to reach a peer. Cheap to hand to a spawned RPC task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct PeerTarget {
    pub(crate) id: ServerId,
    pub(crate) address: String,
}

/// PeerTable maps server id to address and never holds two ids for the same address.
#[derive(Clone, Debug, Default)]
pub(crate) struct PeerTable {
    address_by_id: HashMap<ServerId, String>,
    id_by_address: HashMap<String, ServerId>,
}

impl PeerTable {
    pub(crate) fn new() -> Self {
        PeerTable::default()
    }

    /// Insert `id -> address`. If another id already owns `address`, the new mapping wins and the
    /// older id is evicted and returned.
    pub(crate) fn insert_newest_wins(&mut self, id: ServerId, address: String) -> Option<ServerId> {
        let evicted = match self.id_by_address.get(&address) {
            Some(owner) if *owner != id => {
                let owner = owner.clone();
                self.remove(&owner);
                Some(owner)
            }
            _ => None,
        };

        // The id may be moving to a new address.
        if let Some(old_address) = self.address_by_id.insert(id.clone(), address.clone()) {
            if old_address != address {
                self.id_by_address.remove(&old_address);
            }
        }
        self.id_by_address.insert(address, id);

        evicted
    }

    /// Insert `id -> address` only if no other id owns `address` yet.
    ///
    /// Return true if the table now contains the mapping.
    pub(crate) fn insert_first_wins(&mut self, id: ServerId, address: String) -> bool {
        match self.id_by_address.get(&address) {
            Some(owner) => *owner == id,
            None => {
                if let Some(old_address) = self.address_by_id.insert(id.clone(), address.clone()) {
                    self.id_by_address.remove(&old_address);
                }
                self.id_by_address.insert(address, id);
                true
            }
        }
    }

    pub(crate) fn remove(&mut self, id: &ServerId) -> Option<String> {
        let address = self.address_by_id.remove(id)?;
        self.id_by_address.remove(&address);
        Some(address)
    }

    pub(crate) fn address(&self, id: &ServerId) -> Option<&str> {
        self.address_by_id.get(id).map(|a| a.as_str())
    }

    pub(crate) fn contains(&self, id: &ServerId) -> bool {
        self.address_by_id.contains_key(id)
    }

    #[cfg(test)]
    pub(crate) fn contains_address(&self, address: &str) -> bool {
        self.id_by_address.contains_key(address)
    }

    pub(crate) fn len(&self) -> usize {
        self.address_by_id.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.address_by_id.is_empty()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = &ServerId> {
        self.address_by_id.keys()
    }

    /// Peers in id order. Ordering keeps fan-out and logs deterministic.
    pub(crate) fn targets(&self) -> Vec<PeerTarget> {
        let mut targets: Vec<PeerTarget> = self
            .address_by_id
            .iter()
            .map(|(id, address)| PeerTarget {
                id: id.clone(),
                address: address.clone(),
            })
            .collect();
        targets.sort_by(|a, b| a.id.cmp(&b.id));
        targets
    }

    pub(crate) fn to_btree_map(&self) -> BTreeMap<String, String> {
        self.address_by_id
            .iter()
            .map(|(id, address)| (id.as_str().to_string(), address.clone()))
            .collect()
    }
}

/// Membership is the replica's view of the cluster: the peer table plus everything we know about
/// each server (ourselves included).
pub(crate) struct Membership {
    my_info: ServerInfo,
    peers: PeerTable,
    servers_info: HashMap<ServerId, ServerInfo>,
    seed_peers: Vec<PeerTarget>,
}

impl Membership {
    pub(crate) fn new(my_id: ServerId, my_address: String, seed_peers: Vec<PeerTarget>) -> Self {
        let my_info = ServerInfo {
            server_id: my_id,
            address: my_address,
            role: ServerRole::Follower,
        };

        let mut membership = Membership {
            my_info,
            peers: PeerTable::new(),
            servers_info: HashMap::new(),
            seed_peers: Vec::new(),
        };
        for seed in seed_peers.iter() {
            membership.add_peer(seed.id.clone(), seed.address.clone(), ServerRole::Follower);
        }
        membership.seed_peers = seed_peers;

        membership
    }

    pub(crate) fn my_id(&self) -> &ServerId {
        &self.my_info.server_id
    }

    pub(crate) fn my_address(&self) -> &str {
        &self.my_info.address
    }

    pub(crate) fn set_my_role(&mut self, role: ServerRole) {
        self.my_info.role = role;
    }

    pub(crate) fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub(crate) fn seed_peers(&self) -> &[PeerTarget] {
        &self.seed_peers
    }

    fn is_me(&self, id: &ServerId, address: &str) -> bool {
        *id == self.my_info.server_id || address == self.my_info.address
    }

    /// Add or update a peer using the newest-wins address rule. Returns the ids that were evicted
    /// because they shared the address.
    pub(crate) fn add_peer(&mut self, id: ServerId, address: String, role: ServerRole) -> Vec<ServerId> {
        if self.is_me(&id, &address) {
            return Vec::new();
        }

        let mut evicted = Vec::new();
        if let Some(old_id) = self.peers.insert_newest_wins(id.clone(), address.clone()) {
            self.servers_info.remove(&old_id);
            evicted.push(old_id);
        }
        self.servers_info.insert(
            id.clone(),
            ServerInfo {
                server_id: id,
                address,
                role,
            },
        );

        evicted
    }

    /// Add a peer only if we've never heard of its id or its address.
    pub(crate) fn add_peer_if_unknown(&mut self, info: &ServerInfo) -> bool {
        if self.is_me(&info.server_id, &info.address) || self.peers.contains(&info.server_id) {
            return false;
        }
        if !self.peers.insert_first_wins(info.server_id.clone(), info.address.clone()) {
            return false;
        }
        self.servers_info.insert(info.server_id.clone(), info.clone());
        true
    }

    pub(crate) fn remove_peer(&mut self, id: &ServerId) -> bool {
        self.servers_info.remove(id);
        self.peers.remove(id).is_some()
    }

    pub(crate) fn update_peer_role(&mut self, id: &ServerId, role: ServerRole) {
        if let Some(info) = self.servers_info.get_mut(id) {
            info.role = role;
        }
    }

    /// Replace the whole peer table with the view handed to us by a running cluster. Address
    /// collisions keep the first entry seen. Returns the entries that were dropped as duplicates.
    pub(crate) fn replace_from_join(
        &mut self,
        servers: Vec<ServerInfo>,
        server_addresses: Vec<(ServerId, String)>,
    ) -> Vec<ServerInfo> {
        let mut peers = PeerTable::new();
        let mut servers_info = HashMap::with_capacity(servers.len());
        let mut dropped = Vec::new();

        let address_only = server_addresses.into_iter().map(|(server_id, address)| ServerInfo {
            server_id,
            address,
            role: ServerRole::Follower,
        });

        for info in servers.into_iter().chain(address_only) {
            if self.is_me(&info.server_id, &info.address) {
                continue;
            }
            if peers.contains(&info.server_id) {
                // Already listed, the `servers` entry carries the better role info.
                continue;
            }
            if peers.insert_first_wins(info.server_id.clone(), info.address.clone()) {
                servers_info.insert(info.server_id.clone(), info);
            } else {
                dropped.push(info);
            }
        }

        self.peers = peers;
        self.servers_info = servers_info;
        self.my_info.role = ServerRole::Follower;

        dropped
    }

    /// Every server we know of, ourselves first.
    pub(crate) fn servers(&self) -> Vec<ServerInfo> {
        let mut others: Vec<ServerInfo> = self.servers_info.values().cloned().collect();
        others.sort_by(|a, b| a.server_id.cmp(&b.server_id));

        let mut servers = Vec::with_capacity(others.len() + 1);
        servers.push(self.my_info.clone());
        servers.extend(others);
        servers
    }

    /// Peers that are not suspected down, de-duplicated by address.
    pub(crate) fn active_targets(&self, down_peers: &HashSet<ServerId>) -> Vec<PeerTarget> {
        let mut seen_addresses = HashSet::new();
        self.peers
            .targets()
            .into_iter()
            .filter(|t| !down_peers.contains(&t.id))
            .filter(|t| seen_addresses.insert(t.address.clone()))
            .collect()
    }

    /// Number of peers not suspected down. Does not count ourselves.
    pub(crate) fn active_peer_count(&self, down_peers: &HashSet<ServerId>) -> usize {
        let down_members = self.peers.ids().filter(|id| down_peers.contains(*id)).count();
        self.peers.len() - down_members
    }
}

/// Parse the static seed list. Entries look like `id:host:port`. An entry with a single colon is
/// ambiguous (it is most likely a bare `host:port`) so it gets a synthetic id, as does anything
/// else that doesn't parse. Entries pointing at our own address are skipped.
pub(crate) fn parse_seed_peers(entries: &[String], my_address: &str) -> Vec<PeerTarget> {
    let mut targets: Vec<PeerTarget> = Vec::with_capacity(entries.len());

    for raw in entries {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }

        let target = match entry.split_once(':') {
            Some((id, address)) if !id.is_empty() && address.contains(':') => PeerTarget {
                id: ServerId::new(id),
                address: address.to_string(),
            },
            _ => PeerTarget {
                id: ServerId::new(format!("seed-{}", entry)),
                address: entry.to_string(),
            },
        };

        if target.address == my_address || targets.iter().any(|t| t.address == target.address) {
            continue;
        }
        targets.push(target);
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ServerId {
        ServerId::new(s)
    }

    fn info(server_id: &str, address: &str, role: ServerRole) -> ServerInfo {
        ServerInfo {
            server_id: id(server_id),
            address: address.to_string(),
            role,
        }
    }

    #[test]
    fn newest_mapping_wins_and_evicts_older_id() {
        let mut table = PeerTable::new();
        assert_eq!(None, table.insert_newest_wins(id("a"), "h:1".into()));
        assert_eq!(Some(id("a")), table.insert_newest_wins(id("b"), "h:1".into()));

        assert!(!table.contains(&id("a")));
        assert_eq!(Some("h:1"), table.address(&id("b")));
        assert_eq!(1, table.len());
    }

    #[test]
    fn moving_id_to_new_address_frees_old_address() {
        let mut table = PeerTable::new();
        table.insert_newest_wins(id("a"), "h:1".into());
        table.insert_newest_wins(id("a"), "h:2".into());

        assert!(!table.contains_address("h:1"));
        assert!(table.insert_first_wins(id("b"), "h:1".into()));
        assert_eq!(2, table.len());
    }

    #[test]
    fn first_mapping_wins_on_join() {
        let mut table = PeerTable::new();
        assert!(table.insert_first_wins(id("a"), "h:1".into()));
        assert!(!table.insert_first_wins(id("b"), "h:1".into()));
        // Re-inserting the same mapping is fine.
        assert!(table.insert_first_wins(id("a"), "h:1".into()));

        assert_eq!(Some("h:1"), table.address(&id("a")));
        assert!(!table.contains(&id("b")));
    }

    #[test]
    fn seed_parsing() {
        let entries = vec![
            "s2:127.0.0.1:5002".to_string(),
            "127.0.0.1:5003".to_string(),
            "localhost".to_string(),
            "s1:127.0.0.1:5001".to_string(),
            "  ".to_string(),
            "dup:127.0.0.1:5002".to_string(),
        ];

        let seeds = parse_seed_peers(&entries, "127.0.0.1:5001");

        assert_eq!(
            vec![
                PeerTarget {
                    id: id("s2"),
                    address: "127.0.0.1:5002".into()
                },
                PeerTarget {
                    id: id("seed-127.0.0.1:5003"),
                    address: "127.0.0.1:5003".into()
                },
                PeerTarget {
                    id: id("seed-localhost"),
                    address: "localhost".into()
                },
            ],
            seeds
        );
    }

    #[test]
    fn join_replaces_table_without_duplicate_addresses() {
        let seeds = parse_seed_peers(&["127.0.0.1:5001".to_string()], "127.0.0.1:5003");
        let mut membership = Membership::new(id("c"), "127.0.0.1:5003".into(), seeds);

        let dropped = membership.replace_from_join(
            vec![
                info("a", "127.0.0.1:5001", ServerRole::Leader),
                info("b", "127.0.0.1:5002", ServerRole::Follower),
                info("b-old", "127.0.0.1:5002", ServerRole::Follower),
                info("c", "127.0.0.1:5003", ServerRole::Follower),
            ],
            vec![
                (id("d"), "127.0.0.1:5004".to_string()),
                (id("zombie"), "127.0.0.1:5001".to_string()),
            ],
        );

        let dropped_ids: Vec<_> = dropped.iter().map(|i| i.server_id.as_str()).collect();
        assert_eq!(vec!["b-old", "zombie"], dropped_ids);

        let peers = membership.peers().to_btree_map();
        assert_eq!(3, peers.len());
        assert_eq!(Some(&"127.0.0.1:5001".to_string()), peers.get("a"));
        assert_eq!(Some(&"127.0.0.1:5002".to_string()), peers.get("b"));
        assert_eq!(Some(&"127.0.0.1:5004".to_string()), peers.get("d"));

        // Seed placeholder is gone, we are listed first as follower.
        let servers = membership.servers();
        assert_eq!(id("c"), servers[0].server_id);
        assert_eq!(ServerRole::Follower, servers[0].role);
        assert_eq!(ServerRole::Leader, servers[1].role);
    }

    #[test]
    fn add_peer_never_adds_self() {
        let mut membership = Membership::new(id("a"), "h:1".into(), Vec::new());
        membership.add_peer(id("a"), "h:9".into(), ServerRole::Follower);
        membership.add_peer(id("x"), "h:1".into(), ServerRole::Follower);
        assert_eq!(0, membership.peers().len());
    }

    #[test]
    fn active_targets_skip_down_peers() {
        let mut membership = Membership::new(id("a"), "h:1".into(), Vec::new());
        membership.add_peer(id("b"), "h:2".into(), ServerRole::Follower);
        membership.add_peer(id("c"), "h:3".into(), ServerRole::Follower);

        let mut down = HashSet::new();
        down.insert(id("b"));

        assert_eq!(1, membership.active_peer_count(&down));
        let targets = membership.active_targets(&down);
        assert_eq!(1, targets.len());
        assert_eq!(id("c"), targets[0].id);
    }
}
