use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuildId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(pub u64);

/// A resolved guild member or user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub is_bot: bool,
}

impl Actor {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{Actor, ActorId};

    #[test]
    fn mention_uses_platform_id_syntax() {
        let actor = Actor { id: ActorId(42), name: "maria".to_string(), is_bot: false };
        assert_eq!(actor.mention(), "<@42>");
    }
}
