// Room membership: the ordered member list and, on the host, the table that
// maps member names to their channels.
//
// Invariants (checked by `debug_check` in debug builds and by the property
// tests below):
// - `members` is never empty while a room exists, and `members[0]` is the
//   host. The host has no channel and is never removed.
// - The table's keys are exactly `members[1..]` on the host. A client keeps
//   an empty table and only mirrors the host's snapshots.
// - No name appears twice, and no channel is mapped by two names.
// - `members.len() <= max_members` is enforced by `admit`.
//
// Removal looks the channel up with a linear scan; rooms hold at most eight
// members, so a reverse index would cost more than it saves.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::transport::ChannelId;

/// Why a join request was refused.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AdmitError {
    #[error("room full")]
    RoomFull,
    #[error("name already taken")]
    NameTaken,
    /// The channel already belongs to a member; a repeated join is ignored.
    #[error("channel already joined")]
    AlreadyJoined,
}

#[derive(Clone, Debug, Default)]
pub struct Membership {
    members: Vec<String>,
    table: BTreeMap<String, ChannelId>,
}

impl Membership {
    /// A fresh room containing only its host.
    pub fn with_host(host: String) -> Self {
        Self {
            members: vec![host],
            table: BTreeMap::new(),
        }
    }

    /// Member names in join order, host first.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn channel_of(&self, name: &str) -> Option<ChannelId> {
        self.table.get(name).copied()
    }

    pub fn member_for(&self, channel: ChannelId) -> Option<&str> {
        self.table
            .iter()
            .find(|(_, ch)| **ch == channel)
            .map(|(name, _)| name.as_str())
    }

    /// Channels of every non-host member, in join order.
    pub fn channels(&self) -> Vec<ChannelId> {
        self.members
            .iter()
            .skip(1)
            .filter_map(|name| self.channel_of(name))
            .collect()
    }

    /// Add `name` on `channel` at the end of the member list.
    pub fn admit(&mut self, name: String, channel: ChannelId, max_members: usize) -> Result<(), AdmitError> {
        if self.member_for(channel).is_some() {
            return Err(AdmitError::AlreadyJoined);
        }
        if self.members.len() >= max_members {
            return Err(AdmitError::RoomFull);
        }
        if self.members.contains(&name) {
            return Err(AdmitError::NameTaken);
        }
        self.table.insert(name.clone(), channel);
        self.members.push(name);
        self.debug_check();
        Ok(())
    }

    /// Remove whoever is on `channel`. Returns their name, or `None` if the
    /// channel never completed a join.
    pub fn remove_channel(&mut self, channel: ChannelId) -> Option<String> {
        let name = self.member_for(channel)?.to_owned();
        self.table.remove(&name);
        self.members.retain(|m| *m != name);
        self.debug_check();
        Some(name)
    }

    /// Client side: adopt the host's snapshot wholesale.
    pub fn replace_snapshot(&mut self, players: Vec<String>) {
        self.table.clear();
        self.members = players;
    }

    fn debug_check(&self) {
        debug_assert!(!self.members.is_empty(), "room lost its host");
        debug_assert_eq!(self.table.len() + 1, self.members.len());
        debug_assert!(self.table.keys().all(|name| self.members[1..].contains(name)));
    }
}
