use std::collections::HashMap;
use std::fmt;

use domain::Identity;

/// 进程内唯一的连接标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct PresenceEntry {
    connection: ConnectionId,
    admitted: u64,
}

/// 在线身份集合
///
/// 每个身份最多出现一次，并记住持有它的连接。
/// 只由 `ConnectionHub` 在其串行决策路径上修改，对外只提供拷贝出来的快照。
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    members: HashMap<Identity, PresenceEntry>,
    next_seq: u64,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入在线集合；已存在时只更新持有连接，保留原有的加入顺序
    pub fn admit(&mut self, identity: Identity, connection: ConnectionId) {
        if let Some(entry) = self.members.get_mut(&identity) {
            entry.connection = connection;
            return;
        }
        let admitted = self.next_seq;
        self.next_seq += 1;
        self.members.insert(
            identity,
            PresenceEntry {
                connection,
                admitted,
            },
        );
    }

    /// 移出在线集合，不存在时什么也不做
    pub fn evict(&mut self, identity: &Identity) {
        self.members.remove(identity);
    }

    /// 当前在线身份，按加入先后排列
    pub fn snapshot(&self) -> Vec<Identity> {
        let mut entries: Vec<_> = self.members.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.admitted);
        entries
            .into_iter()
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    pub fn holder(&self, identity: &Identity) -> Option<ConnectionId> {
        self.members.get(identity).map(|entry| entry.connection)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.members.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
