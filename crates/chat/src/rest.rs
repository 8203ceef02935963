use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use orderly_core::domain::actor::{Actor, ActorId, ChannelId, GuildId, MessageId, RoleId};

use crate::transport::{ChannelMessage, ChatTransport, SentMessage, TransportError};

const PRIVATE_THREAD_TYPE: u8 = 12;

/// ChatTransport over the platform REST API.
pub struct RestChatTransport {
    client: Client,
    base_url: String,
    token: SecretString,
}

#[derive(Debug, Deserialize)]
struct IdPayload {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    id: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct MemberPayload {
    #[serde(default)]
    roles: Vec<String>,
    user: Option<UserPayload>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct RateLimitPayload {
    #[serde(default)]
    retry_after: f64,
}

impl RestChatTransport {
    pub fn new(base_url: impl Into<String>, token: SecretString) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), token }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bot {}", self.token.expose_secret()))
    }

    async fn check(&self, response: Response) -> Result<Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .json::<RateLimitPayload>()
                .await
                .map(|payload| payload.retry_after)
                .unwrap_or(1.0);
            return Err(TransportError::RateLimited {
                retry_after: Duration::from_secs_f64(retry_after.max(0.0)),
            });
        }

        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(message));
        }

        Err(TransportError::Api { status: status.as_u16(), message })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let response =
            builder.send().await.map_err(|error| TransportError::Network(error.to_string()))?;
        self.check(response).await
    }

    async fn json<T>(&self, response: Response) -> Result<T, TransportError>
    where
        T: serde::de::DeserializeOwned,
    {
        response.json::<T>().await.map_err(|error| TransportError::Network(error.to_string()))
    }

    /// The bot's own identity; used to filter self-originated events.
    pub async fn current_user(&self) -> Result<Actor, TransportError> {
        let response = self.send(self.request(Method::GET, "/users/@me")).await?;
        let payload: UserPayload = self.json(response).await?;
        Ok(Actor {
            id: ActorId(parse_id(&payload.id)?),
            name: payload.username,
            is_bot: payload.bot,
        })
    }

    async fn open_dm_channel(&self, actor: &ActorId) -> Result<ChannelId, TransportError> {
        let response = self
            .send(
                self.request(Method::POST, "/users/@me/channels")
                    .json(&json!({ "recipient_id": actor.0.to_string() })),
            )
            .await?;
        let payload: IdPayload = self.json(response).await?;
        Ok(ChannelId(parse_id(&payload.id)?))
    }
}

fn parse_id(raw: &str) -> Result<u64, TransportError> {
    raw.parse::<u64>()
        .map_err(|_| TransportError::Network(format!("non-numeric id in response: `{raw}`")))
}

/// Reactions are path segments; percent-encode the non-ASCII emoji bytes.
fn encode_emoji(emoji: &str) -> String {
    let mut encoded = String::with_capacity(emoji.len() * 3);
    for byte in emoji.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(*byte as char)
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

#[async_trait::async_trait]
impl ChatTransport for RestChatTransport {
    async fn send_direct(
        &self,
        actor: &Actor,
        content: &str,
    ) -> Result<SentMessage, TransportError> {
        let dm_channel = self.open_dm_channel(&actor.id).await?;
        let message = self.send_channel(&dm_channel, content).await?;
        Ok(SentMessage { channel: dm_channel, message })
    }

    async fn send_channel(
        &self,
        channel: &ChannelId,
        content: &str,
    ) -> Result<MessageId, TransportError> {
        let response = self
            .send(
                self.request(Method::POST, &format!("/channels/{}/messages", channel.0))
                    .json(&json!({ "content": content })),
            )
            .await?;
        let payload: IdPayload = self.json(response).await?;
        Ok(MessageId(parse_id(&payload.id)?))
    }

    async fn add_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
    ) -> Result<(), TransportError> {
        self.send(self.request(
            Method::PUT,
            &format!(
                "/channels/{}/messages/{}/reactions/{}/@me",
                channel.0,
                message.0,
                encode_emoji(emoji)
            ),
        ))
        .await?;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
        actor: &ActorId,
    ) -> Result<(), TransportError> {
        self.send(self.request(
            Method::DELETE,
            &format!(
                "/channels/{}/messages/{}/reactions/{}/{}",
                channel.0,
                message.0,
                encode_emoji(emoji),
                actor.0
            ),
        ))
        .await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<(), TransportError> {
        self.send(
            self.request(Method::DELETE, &format!("/channels/{}/messages/{}", channel.0, message.0)),
        )
        .await?;
        Ok(())
    }

    async fn create_private_thread(
        &self,
        parent: &ChannelId,
        name: &str,
        participants: &[ActorId],
    ) -> Result<ChannelId, TransportError> {
        let response = self
            .send(
                self.request(Method::POST, &format!("/channels/{}/threads", parent.0))
                    .json(&json!({ "name": name, "type": PRIVATE_THREAD_TYPE })),
            )
            .await?;
        let payload: IdPayload = self.json(response).await?;
        let thread = ChannelId(parse_id(&payload.id)?);

        for participant in participants {
            self.send(self.request(
                Method::PUT,
                &format!("/channels/{}/thread-members/{}", thread.0, participant.0),
            ))
            .await?;
        }

        Ok(thread)
    }

    async fn archive_thread(&self, thread: &ChannelId) -> Result<(), TransportError> {
        self.send(
            self.request(Method::PATCH, &format!("/channels/{}", thread.0))
                .json(&json!({ "archived": true })),
        )
        .await?;
        Ok(())
    }

    async fn member_has_role(
        &self,
        guild: &GuildId,
        actor: &ActorId,
        role: &RoleId,
    ) -> Result<bool, TransportError> {
        let response = self
            .send(self.request(Method::GET, &format!("/guilds/{}/members/{}", guild.0, actor.0)))
            .await;

        let response = match response {
            Ok(response) => response,
            Err(TransportError::NotFound(_)) => return Ok(false),
            Err(error) => return Err(error),
        };

        let payload: MemberPayload = self.json(response).await?;
        let role_id = role.0.to_string();
        Ok(payload.roles.iter().any(|candidate| candidate == &role_id))
    }

    async fn recent_messages(
        &self,
        channel: &ChannelId,
        limit: u16,
    ) -> Result<Vec<ChannelMessage>, TransportError> {
        let response = self
            .send(self.request(
                Method::GET,
                &format!("/channels/{}/messages?limit={}", channel.0, limit.clamp(1, 100)),
            ))
            .await?;
        let payload: Vec<MessagePayload> = self.json(response).await?;

        payload
            .into_iter()
            .map(|message| {
                Ok(ChannelMessage { id: MessageId(parse_id(&message.id)?), content: message.content })
            })
            .collect()
    }
}

/// Directory lookups over the same REST surface. There is no local user
/// cache on this transport, so `known_users` is empty and resolution falls
/// through to the guild listing.
#[async_trait::async_trait]
impl crate::directory::MemberDirectory for RestChatTransport {
    async fn known_users(&self) -> Result<Vec<Actor>, TransportError> {
        Ok(Vec::new())
    }

    async fn guild_members(&self, guild: &GuildId) -> Result<Vec<Actor>, TransportError> {
        let response = self
            .send(self.request(Method::GET, &format!("/guilds/{}/members?limit=1000", guild.0)))
            .await?;
        let payload: Vec<MemberPayload> = self.json(response).await?;

        Ok(payload
            .into_iter()
            .filter_map(|member| member.user)
            .map(|user| {
                Ok(Actor {
                    id: ActorId(parse_id(&user.id)?),
                    name: user.username,
                    is_bot: user.bot,
                })
            })
            .collect::<Result<Vec<_>, TransportError>>()?)
    }

    async fn fetch_by_id(&self, id: &ActorId) -> Result<Option<Actor>, TransportError> {
        let response = self.send(self.request(Method::GET, &format!("/users/{}", id.0))).await;
        let response = match response {
            Ok(response) => response,
            Err(TransportError::NotFound(_)) => return Ok(None),
            Err(error) => return Err(error),
        };

        let payload: UserPayload = self.json(response).await?;
        Ok(Some(Actor {
            id: ActorId(parse_id(&payload.id)?),
            name: payload.username,
            is_bot: payload.bot,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::encode_emoji;

    #[test]
    fn emoji_is_percent_encoded_for_path_segments() {
        assert_eq!(encode_emoji("✅"), "%E2%9C%85");
        assert_eq!(encode_emoji("x"), "x");
    }
}
