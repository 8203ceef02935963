use async_trait::async_trait;
use thiserror::Error;

use orderly_core::config::NameTieBreak;
use orderly_core::domain::actor::{Actor, ActorId, GuildId};

use crate::transport::TransportError;

/// User lookups the resolver needs. `known_users` is the locally cached set
/// the platform client has already seen; `guild_members` is the wider (and
/// slower) listing.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn known_users(&self) -> Result<Vec<Actor>, TransportError>;
    async fn guild_members(&self, guild: &GuildId) -> Result<Vec<Actor>, TransportError>;
    async fn fetch_by_id(&self, id: &ActorId) -> Result<Option<Actor>, TransportError>;
}

#[async_trait]
impl<D> MemberDirectory for std::sync::Arc<D>
where
    D: MemberDirectory + ?Sized,
{
    async fn known_users(&self) -> Result<Vec<Actor>, TransportError> {
        (**self).known_users().await
    }

    async fn guild_members(&self, guild: &GuildId) -> Result<Vec<Actor>, TransportError> {
        (**self).guild_members(guild).await
    }

    async fn fetch_by_id(&self, id: &ActorId) -> Result<Option<Actor>, TransportError> {
        (**self).fetch_by_id(id).await
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no user or member matches `{identifier}`")]
    NotFound { identifier: String },
    #[error("`{identifier}` matches {count} members and tie-breaking is disabled")]
    Ambiguous { identifier: String, count: usize },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Turns the storefront's customer reference (a name or a raw numeric id)
/// into a platform actor.
///
/// Name collisions resolve per the configured tie-break: `FirstMatch` keeps
/// the historical pick-the-first behavior (listing order, no further
/// ordering), `RejectAmbiguous` refuses so the caller can alert an admin
/// instead of messaging the wrong person.
pub struct ActorResolver<D> {
    directory: D,
    guild: GuildId,
    tie_break: NameTieBreak,
}

impl<D> ActorResolver<D>
where
    D: MemberDirectory,
{
    pub fn new(directory: D, guild: GuildId, tie_break: NameTieBreak) -> Self {
        Self { directory, guild, tie_break }
    }

    pub async fn resolve(&self, identifier: &str) -> Result<Actor, ResolveError> {
        let needle = identifier.trim();

        let cached = self.directory.known_users().await?;
        if let Some(actor) = self.pick_by_name(&cached, needle)? {
            return Ok(actor);
        }

        let members = self.directory.guild_members(&self.guild).await?;
        if let Some(actor) = self.pick_by_name(&members, needle)? {
            return Ok(actor);
        }

        if let Ok(numeric) = needle.parse::<u64>() {
            if let Some(actor) = self.directory.fetch_by_id(&ActorId(numeric)).await? {
                return Ok(actor);
            }
        }

        Err(ResolveError::NotFound { identifier: identifier.to_string() })
    }

    fn pick_by_name(
        &self,
        candidates: &[Actor],
        needle: &str,
    ) -> Result<Option<Actor>, ResolveError> {
        let matches: Vec<&Actor> = candidates
            .iter()
            .filter(|actor| actor.name.eq_ignore_ascii_case(needle))
            .collect();

        match (matches.len(), self.tie_break) {
            (0, _) => Ok(None),
            (1, _) | (_, NameTieBreak::FirstMatch) => Ok(Some(matches[0].clone())),
            (count, NameTieBreak::RejectAmbiguous) => {
                Err(ResolveError::Ambiguous { identifier: needle.to_string(), count })
            }
        }
    }
}

/// Static directory used by tests and local wiring.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDirectory {
    pub cached: Vec<Actor>,
    pub members: Vec<Actor>,
}

#[async_trait]
impl MemberDirectory for InMemoryDirectory {
    async fn known_users(&self) -> Result<Vec<Actor>, TransportError> {
        Ok(self.cached.clone())
    }

    async fn guild_members(&self, _guild: &GuildId) -> Result<Vec<Actor>, TransportError> {
        Ok(self.members.clone())
    }

    async fn fetch_by_id(&self, id: &ActorId) -> Result<Option<Actor>, TransportError> {
        Ok(self
            .cached
            .iter()
            .chain(self.members.iter())
            .find(|actor| &actor.id == id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use orderly_core::config::NameTieBreak;
    use orderly_core::domain::actor::{Actor, ActorId, GuildId};

    use super::{ActorResolver, InMemoryDirectory, ResolveError};

    fn actor(id: u64, name: &str) -> Actor {
        Actor { id: ActorId(id), name: name.to_string(), is_bot: false }
    }

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory {
            cached: vec![actor(1, "Ana"), actor(2, "bruno")],
            members: vec![actor(3, "ana"), actor(4, "Carla"), actor(5, "carla")],
        }
    }

    fn resolver(tie_break: NameTieBreak) -> ActorResolver<InMemoryDirectory> {
        ActorResolver::new(directory(), GuildId(9), tie_break)
    }

    #[tokio::test]
    async fn cached_users_are_checked_before_guild_members() {
        let resolved = resolver(NameTieBreak::FirstMatch).resolve("ana").await.expect("resolve");
        assert_eq!(resolved.id, ActorId(1), "cache entry wins over guild member");
    }

    #[tokio::test]
    async fn falls_back_to_guild_members_then_numeric_id() {
        let resolver = resolver(NameTieBreak::FirstMatch);

        let member = resolver.resolve("Carla").await.expect("resolve member");
        assert_eq!(member.id, ActorId(4));

        let by_id = resolver.resolve("5").await.expect("resolve by id");
        assert_eq!(by_id.id, ActorId(5));
    }

    #[tokio::test]
    async fn first_match_takes_listing_order_on_collision() {
        let resolved = resolver(NameTieBreak::FirstMatch).resolve("carla").await.expect("resolve");
        assert_eq!(resolved.id, ActorId(4));
    }

    #[tokio::test]
    async fn reject_ambiguous_surfaces_the_collision() {
        let error = resolver(NameTieBreak::RejectAmbiguous)
            .resolve("carla")
            .await
            .expect_err("collision should fail");
        assert_eq!(
            error,
            ResolveError::Ambiguous { identifier: "carla".to_string(), count: 2 }
        );
    }

    #[tokio::test]
    async fn unknown_identifier_is_not_found() {
        let error = resolver(NameTieBreak::FirstMatch)
            .resolve("nobody")
            .await
            .expect_err("unknown name");
        assert!(matches!(error, ResolveError::NotFound { .. }));
    }
}
