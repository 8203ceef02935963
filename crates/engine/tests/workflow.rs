//! End-to-end workflow scenarios driven through the engine's event queue
//! against recording fakes.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, Mutex};

use orderly_chat::directory::InMemoryDirectory;
use orderly_chat::events::{ChatEvent, MessageCreatedEvent, ReactionAddedEvent};
use orderly_chat::transport::{ChannelMessage, ChatTransport, SentMessage, TransportError};
use orderly_core::config::NameTieBreak;
use orderly_core::domain::actor::{Actor, ActorId, ChannelId, GuildId, MessageId, RoleId};
use orderly_core::domain::order::{
    Currency, CustomerRef, ItemDetail, LineItem, Order, OrderId, OrderStatus, PaymentMethod,
};
use orderly_db::repositories::{InMemoryOrderRepository, OrderRepository};
use orderly_engine::{Engine, EngineConfig, EngineEvent, EngineHandle};

const GUILD: u64 = 1;
const ADMIN_ROLE: u64 = 2;
const ADMIN_CHANNEL: u64 = 100;
const WORKER_CHANNEL: u64 = 200;
const BOT: u64 = 1;
const CUSTOMER: u64 = 7;
const ADMIN: u64 = 50;
const WORKER_A: u64 = 60;
const WORKER_B: u64 = 61;

#[derive(Default)]
struct State {
    next_message: u64,
    next_thread: u64,
    directs: Vec<(u64, String, u64, u64)>,
    posts: Vec<(u64, u64, String)>,
    reactions: Vec<(u64, u64, String)>,
    removed_reactions: Vec<(u64, u64, String, u64)>,
    deleted: Vec<(u64, u64)>,
    threads: Vec<(u64, String, Vec<u64>)>,
    archived: Vec<u64>,
    admins: HashSet<u64>,
    fail_direct: VecDeque<TransportError>,
    fail_channel: VecDeque<TransportError>,
}

struct RecordingTransport {
    state: Mutex<State>,
}

impl RecordingTransport {
    fn new(admins: &[u64]) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                next_message: 1_000,
                next_thread: 500,
                admins: admins.iter().copied().collect(),
                ..State::default()
            }),
        })
    }

    async fn directs_to(&self, actor: u64) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .directs
            .iter()
            .filter(|(to, ..)| *to == actor)
            .map(|(_, content, ..)| content.clone())
            .collect()
    }

    async fn last_direct_to(&self, actor: u64) -> Option<(u64, u64)> {
        let state = self.state.lock().await;
        state
            .directs
            .iter()
            .rev()
            .find(|(to, ..)| *to == actor)
            .map(|(_, _, message, channel)| (*channel, *message))
    }

    async fn posts_in(&self, channel: u64) -> Vec<(u64, String)> {
        let state = self.state.lock().await;
        state
            .posts
            .iter()
            .filter(|(ch, ..)| *ch == channel)
            .map(|(_, id, content)| (*id, content.clone()))
            .collect()
    }

    async fn last_post_in(&self, channel: u64) -> Option<(u64, String)> {
        self.posts_in(channel).await.into_iter().last()
    }

    async fn reactions_on(&self, message: u64) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .reactions
            .iter()
            .filter(|(_, id, _)| *id == message)
            .map(|(_, _, emoji)| emoji.clone())
            .collect()
    }

    async fn removed_reactions(&self) -> Vec<(u64, String)> {
        let state = self.state.lock().await;
        state
            .removed_reactions
            .iter()
            .map(|(_, _, emoji, actor)| (*actor, emoji.clone()))
            .collect()
    }

    async fn threads(&self) -> Vec<(u64, Vec<u64>)> {
        let state = self.state.lock().await;
        state.threads.iter().map(|(id, _, members)| (*id, members.clone())).collect()
    }

    async fn archived(&self) -> Vec<u64> {
        self.state.lock().await.archived.clone()
    }

    async fn deleted(&self) -> Vec<(u64, u64)> {
        self.state.lock().await.deleted.clone()
    }

    async fn fail_next_direct(&self, error: TransportError) {
        self.state.lock().await.fail_direct.push_back(error);
    }

    async fn fail_next_channel_send(&self, error: TransportError) {
        self.state.lock().await.fail_channel.push_back(error);
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_direct(
        &self,
        actor: &Actor,
        content: &str,
    ) -> Result<SentMessage, TransportError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.fail_direct.pop_front() {
            return Err(error);
        }
        state.next_message += 1;
        let message = state.next_message;
        let channel = 9_000 + actor.id.0;
        state.directs.push((actor.id.0, content.to_string(), message, channel));
        Ok(SentMessage { channel: ChannelId(channel), message: MessageId(message) })
    }

    async fn send_channel(
        &self,
        channel: &ChannelId,
        content: &str,
    ) -> Result<MessageId, TransportError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.fail_channel.pop_front() {
            return Err(error);
        }
        state.next_message += 1;
        let message = state.next_message;
        state.posts.push((channel.0, message, content.to_string()));
        Ok(MessageId(message))
    }

    async fn add_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.reactions.push((channel.0, message.0, emoji.to_string()));
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
        actor: &ActorId,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.removed_reactions.push((channel.0, message.0, emoji.to_string(), actor.0));
        Ok(())
    }

    async fn delete_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.deleted.push((channel.0, message.0));
        Ok(())
    }

    async fn create_private_thread(
        &self,
        _parent: &ChannelId,
        name: &str,
        participants: &[ActorId],
    ) -> Result<ChannelId, TransportError> {
        let mut state = self.state.lock().await;
        state.next_thread += 1;
        let thread = state.next_thread;
        state
            .threads
            .push((thread, name.to_string(), participants.iter().map(|id| id.0).collect()));
        Ok(ChannelId(thread))
    }

    async fn archive_thread(&self, thread: &ChannelId) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.archived.push(thread.0);
        Ok(())
    }

    async fn member_has_role(
        &self,
        _guild: &GuildId,
        actor: &ActorId,
        _role: &RoleId,
    ) -> Result<bool, TransportError> {
        Ok(self.state.lock().await.admins.contains(&actor.0))
    }

    async fn recent_messages(
        &self,
        channel: &ChannelId,
        limit: u16,
    ) -> Result<Vec<ChannelMessage>, TransportError> {
        let state = self.state.lock().await;
        let deleted: HashSet<u64> = state.deleted.iter().map(|(_, id)| *id).collect();
        Ok(state
            .posts
            .iter()
            .rev()
            .filter(|(ch, id, _)| *ch == channel.0 && !deleted.contains(id))
            .take(usize::from(limit))
            .map(|(_, id, content)| ChannelMessage { id: MessageId(*id), content: content.clone() })
            .collect())
    }
}

fn directory() -> Arc<InMemoryDirectory> {
    Arc::new(InMemoryDirectory {
        cached: vec![Actor { id: ActorId(CUSTOMER), name: "ana".to_string(), is_bot: false }],
        members: vec![
            Actor { id: ActorId(ADMIN), name: "aria".to_string(), is_bot: false },
            Actor { id: ActorId(WORKER_A), name: "wren".to_string(), is_bot: false },
            Actor { id: ActorId(WORKER_B), name: "wade".to_string(), is_bot: false },
        ],
    })
}

fn config() -> EngineConfig {
    EngineConfig {
        guild: GuildId(GUILD),
        admin_role: RoleId(ADMIN_ROLE),
        admin_channel: ChannelId(ADMIN_CHANNEL),
        worker_channel: ChannelId(WORKER_CHANNEL),
        bot_user: ActorId(BOT),
        rate_limit_backoff: Duration::ZERO,
        pacing_delay: Duration::ZERO,
        stale_after: chrono::Duration::hours(24),
        reason_timeout: Duration::from_secs(300),
        archive_delay: Duration::from_millis(50),
        stage_ttl: chrono::Duration::hours(72),
        purge_scan_limit: 50,
    }
}

fn order(id: &str) -> Order {
    let now = Utc::now();
    Order {
        id: OrderId(id.to_string()),
        items: vec![LineItem {
            name: "Leveling 50-60".to_string(),
            detail: ItemDetail::Leveling {
                start_level: 50,
                end_level: 60,
                job: "Dragoon".to_string(),
            },
            quantity: 1,
            unit_price: Decimal::new(2_500, 2),
        }],
        currency: Currency::Usd,
        total: Decimal::new(2_500, 2),
        payment_method: PaymentMethod::Pix,
        customer: CustomerRef("ana".to_string()),
        status: OrderStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

struct Harness {
    engine: Engine,
    receiver: mpsc::Receiver<EngineEvent>,
    transport: Arc<RecordingTransport>,
    repository: Arc<InMemoryOrderRepository>,
}

async fn harness(orders: Vec<Order>) -> Harness {
    let transport = RecordingTransport::new(&[ADMIN]);
    let repository = Arc::new(InMemoryOrderRepository::new());
    for order in orders {
        repository.insert(order).await.expect("insert");
    }
    let (handle, receiver) = EngineHandle::channel(64);
    let engine = Engine::new(
        transport.clone(),
        repository.clone(),
        directory(),
        config(),
        handle,
        NameTieBreak::FirstMatch,
    )
    .with_started_at(Utc::now() - chrono::Duration::hours(1));

    Harness { engine, receiver, transport, repository }
}

fn reaction(channel: u64, message: u64, actor: u64, emoji: &str) -> EngineEvent {
    EngineEvent::Chat(ChatEvent::ReactionAdded(ReactionAddedEvent {
        channel_id: ChannelId(channel),
        message_id: MessageId(message),
        actor_id: ActorId(actor),
        emoji: emoji.to_string(),
        guild_id: Some(GuildId(GUILD)),
    }))
}

fn message(channel: u64, actor: u64, content: &str) -> EngineEvent {
    EngineEvent::Chat(ChatEvent::MessageCreated(MessageCreatedEvent {
        channel_id: ChannelId(channel),
        actor_id: ActorId(actor),
        content: content.to_string(),
    }))
}

async fn status_of(repository: &InMemoryOrderRepository, id: &str) -> OrderStatus {
    repository
        .find_by_id(&OrderId(id.to_string()))
        .await
        .expect("find")
        .expect("order exists")
        .status
}

/// Inserts the order (the feed only ever reports rows that exist) and runs
/// the insert dispatch.
async fn dispatch_order(h: &mut Harness, order: Order) {
    h.repository.insert(order.clone()).await.expect("insert");
    h.engine.process(EngineEvent::OrderInserted(order)).await.expect("dispatch");
}

/// Drives an inserted order up to `processing` with the admin self-assigned,
/// returning the thread id and the current status message id.
async fn drive_to_processing(h: &mut Harness, id: &str) -> (u64, u64) {
    dispatch_order(h, order(id)).await;
    let (approval_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("approval post");

    h.engine.process(reaction(ADMIN_CHANNEL, approval_msg, ADMIN, "✅")).await.expect("approve");
    let (dm_channel, instructions) =
        h.transport.last_direct_to(CUSTOMER).await.expect("payment instructions");

    h.engine
        .process(reaction(dm_channel, instructions, CUSTOMER, "✅"))
        .await
        .expect("self-report");
    let (verify_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("verification post");

    h.engine.process(reaction(ADMIN_CHANNEL, verify_msg, ADMIN, "✅")).await.expect("verify");
    let (decision_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("decision prompt");

    h.engine.process(reaction(ADMIN_CHANNEL, decision_msg, ADMIN, "👑")).await.expect("self-assign");

    let threads = h.transport.threads().await;
    let thread = threads.last().expect("thread created").0;
    let (status_msg, _) = h.transport.last_post_in(thread).await.expect("status line");
    (thread, status_msg)
}

#[tokio::test]
async fn happy_path_reaches_completed_with_purge_and_archive() {
    let mut h = harness(vec![]).await;
    let (thread, status_msg) = drive_to_processing(&mut h, "ord-happy1").await;
    assert_eq!(status_of(&h.repository, "ord-happy1").await, OrderStatus::Processing);

    // Customer confirmed twice along the way: confirmation + instructions +
    // confirmed notice.
    let dms = h.transport.directs_to(CUSTOMER).await;
    assert!(dms[0].contains("New Order Confirmed"));
    assert!(dms[1].contains("approved"));
    assert!(dms[2].contains("Payment confirmed"));

    // Client signs off; status line is re-posted with her flag set.
    h.engine.process(reaction(thread, status_msg, CUSTOMER, "✅")).await.expect("client confirm");
    let (status_msg, content) = h.transport.last_post_in(thread).await.expect("updated line");
    assert!(content.contains("**completion**"));

    // Worker (the self-assigned admin) signs off; order finalizes.
    h.engine.process(reaction(thread, status_msg, ADMIN, "✅")).await.expect("worker confirm");
    assert_eq!(status_of(&h.repository, "ord-happy1").await, OrderStatus::Completed);

    // Stage posts mentioning the display id were purged from the channels.
    let display = OrderId("ord-happy1".to_string()).display();
    let deleted: HashSet<u64> = h.transport.deleted().await.into_iter().map(|(_, id)| id).collect();
    for (id, content) in h.transport.posts_in(ADMIN_CHANNEL).await {
        if content.contains(&display) && !content.contains("complete!") {
            assert!(deleted.contains(&id), "stage post `{content}` should be purged");
        }
    }

    // The archive timer fires through the queue and archives the thread.
    let due = h.receiver.recv().await.expect("archive event");
    assert!(matches!(due, EngineEvent::ArchiveDue { .. }));
    h.engine.process(due).await.expect("archive");
    assert_eq!(h.transport.archived().await, vec![thread]);
}

#[tokio::test]
async fn admin_reject_cancels_and_opens_no_further_stage() {
    let mut h = harness(vec![]).await;
    dispatch_order(&mut h, order("ord-rej1")).await;
    let (approval_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("approval post");

    h.engine.process(reaction(ADMIN_CHANNEL, approval_msg, ADMIN, "❌")).await.expect("reject");

    assert_eq!(status_of(&h.repository, "ord-rej1").await, OrderStatus::Cancelled);
    let dms = h.transport.directs_to(CUSTOMER).await;
    assert!(dms.last().expect("cancel notice").contains("cancelled"));

    // The approval message is gone and further reactions on it do nothing.
    assert!(h.transport.deleted().await.contains(&(ADMIN_CHANNEL, approval_msg)));
    h.engine.process(reaction(ADMIN_CHANNEL, approval_msg, ADMIN, "✅")).await.expect("noop");
    assert_eq!(status_of(&h.repository, "ord-rej1").await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn duplicate_inserts_notify_exactly_once() {
    let mut h = harness(vec![]).await;
    let order = order("ord-dup1");
    dispatch_order(&mut h, order.clone()).await;
    h.engine.process(EngineEvent::OrderInserted(order)).await.expect("second");

    assert_eq!(h.transport.directs_to(CUSTOMER).await.len(), 1);
    assert_eq!(h.transport.posts_in(ADMIN_CHANNEL).await.len(), 1);
}

#[tokio::test]
async fn backlog_orders_are_absorbed_silently() {
    let mut h = harness(vec![]).await;
    let mut stale = order("ord-old1");
    stale.created_at = Utc::now() - chrono::Duration::hours(6);

    h.engine.process(EngineEvent::OrderInserted(stale)).await.expect("backlog");

    assert!(h.transport.directs_to(CUSTOMER).await.is_empty());
    assert!(h.transport.posts_in(ADMIN_CHANNEL).await.is_empty());
}

#[tokio::test]
async fn unresolved_customer_degrades_to_admin_alert() {
    let mut h = harness(vec![]).await;
    let mut unknown = order("ord-ghost1");
    unknown.customer = CustomerRef("nobody".to_string());

    dispatch_order(&mut h, unknown).await;

    let posts = h.transport.posts_in(ADMIN_CHANNEL).await;
    assert_eq!(posts.len(), 1);
    assert!(posts[0].1.contains("Could not resolve customer"));
    assert!(h.transport.directs_to(CUSTOMER).await.is_empty());

    // No approval stage opened: an admin approve reaction is a no-op.
    h.engine.process(reaction(ADMIN_CHANNEL, posts[0].0, ADMIN, "✅")).await.expect("noop");
    assert_eq!(status_of(&h.repository, "ord-ghost1").await, OrderStatus::Pending);
}

#[tokio::test]
async fn rate_limited_dm_is_retried_once() {
    let mut h = harness(vec![]).await;
    h.transport
        .fail_next_direct(TransportError::RateLimited { retry_after: Duration::from_secs(1) })
        .await;

    dispatch_order(&mut h, order("ord-rl1")).await;

    let dms = h.transport.directs_to(CUSTOMER).await;
    assert_eq!(dms.len(), 1, "retry should deliver exactly one confirmation");
    assert_eq!(h.transport.posts_in(ADMIN_CHANNEL).await.len(), 1);
}

#[tokio::test]
async fn unauthorized_reactors_change_nothing() {
    let mut h = harness(vec![]).await;
    dispatch_order(&mut h, order("ord-auth1")).await;
    let (approval_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("post");

    // A non-admin approving the order is silently ignored.
    h.engine.process(reaction(ADMIN_CHANNEL, approval_msg, WORKER_A, "✅")).await.expect("noop");
    assert_eq!(status_of(&h.repository, "ord-auth1").await, OrderStatus::Pending);

    // The bot's own reaction is ignored before routing.
    h.engine.process(reaction(ADMIN_CHANNEL, approval_msg, BOT, "✅")).await.expect("noop");
    assert_eq!(status_of(&h.repository, "ord-auth1").await, OrderStatus::Pending);

    // Someone other than the customer cannot self-report payment.
    h.engine.process(reaction(ADMIN_CHANNEL, approval_msg, ADMIN, "✅")).await.expect("approve");
    let (dm_channel, instructions) = h.transport.last_direct_to(CUSTOMER).await.expect("dm");
    h.engine.process(reaction(dm_channel, instructions, WORKER_A, "✅")).await.expect("noop");
    assert_eq!(status_of(&h.repository, "ord-auth1").await, OrderStatus::AwaitingPayment);
}

#[tokio::test]
async fn resolved_stage_message_no_longer_routes() {
    let mut h = harness(vec![]).await;
    dispatch_order(&mut h, order("ord-excl1")).await;
    let (approval_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("post");

    h.engine.process(reaction(ADMIN_CHANNEL, approval_msg, ADMIN, "✅")).await.expect("approve");
    assert_eq!(status_of(&h.repository, "ord-excl1").await, OrderStatus::AwaitingPayment);

    // Re-approving the already-resolved message must not re-fire the stage:
    // the status would be rejected anyway, but no new DM may go out either.
    let dm_count = h.transport.directs_to(CUSTOMER).await.len();
    h.engine.process(reaction(ADMIN_CHANNEL, approval_msg, ADMIN, "✅")).await.expect("noop");
    assert_eq!(h.transport.directs_to(CUSTOMER).await.len(), dm_count);
    assert_eq!(status_of(&h.repository, "ord-excl1").await, OrderStatus::AwaitingPayment);
}

#[tokio::test]
async fn payment_rejection_by_admin_reopens_confirmation() {
    let mut h = harness(vec![]).await;
    dispatch_order(&mut h, order("ord-verif1")).await;
    let (approval_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("post");
    h.engine.process(reaction(ADMIN_CHANNEL, approval_msg, ADMIN, "✅")).await.expect("approve");
    let (dm_channel, instructions) = h.transport.last_direct_to(CUSTOMER).await.expect("dm");
    h.engine.process(reaction(dm_channel, instructions, CUSTOMER, "✅")).await.expect("report");
    let (verify_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("verify post");

    // Admin disputes the payment.
    h.engine.process(reaction(ADMIN_CHANNEL, verify_msg, ADMIN, "❌")).await.expect("dispute");
    assert_eq!(status_of(&h.repository, "ord-verif1").await, OrderStatus::AwaitingPayment);

    let (dm_channel, not_confirmed) = h.transport.last_direct_to(CUSTOMER).await.expect("notice");
    assert!(h.transport.directs_to(CUSTOMER).await.last().expect("dm").contains("could not confirm"));

    // The fresh notice is a live payment-confirmation stage again.
    h.engine.process(reaction(dm_channel, not_confirmed, CUSTOMER, "✅")).await.expect("re-report");
    let (_, verify_again) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("second verify");
    assert!(verify_again.contains("reports payment"));
}

#[tokio::test]
async fn first_worker_claims_and_second_is_reverted() {
    let mut h = harness(vec![]).await;
    dispatch_order(&mut h, order("ord-work1")).await;
    let (approval_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("post");
    h.engine.process(reaction(ADMIN_CHANNEL, approval_msg, ADMIN, "✅")).await.expect("approve");
    let (dm_channel, instructions) = h.transport.last_direct_to(CUSTOMER).await.expect("dm");
    h.engine.process(reaction(dm_channel, instructions, CUSTOMER, "✅")).await.expect("report");
    let (verify_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("verify");
    h.engine.process(reaction(ADMIN_CHANNEL, verify_msg, ADMIN, "✅")).await.expect("confirm");
    let (decision_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("decision");

    // Admin hands the order to the worker channel.
    h.engine.process(reaction(ADMIN_CHANNEL, decision_msg, ADMIN, "👷")).await.expect("forward");
    let (work_msg, work_post) = h.transport.last_post_in(WORKER_CHANNEL).await.expect("work post");
    assert!(work_post.contains("Work available"));
    assert_eq!(h.transport.reactions_on(work_msg).await, vec!["✅".to_string()]);

    // First claimant wins and the order starts processing.
    h.engine.process(reaction(WORKER_CHANNEL, work_msg, WORKER_A, "✅")).await.expect("claim");
    assert_eq!(status_of(&h.repository, "ord-work1").await, OrderStatus::Processing);
    let threads = h.transport.threads().await;
    assert_eq!(threads.len(), 1);
    assert!(threads[0].1.contains(&CUSTOMER) && threads[0].1.contains(&WORKER_A));

    // The second worker's reaction is retracted; no second thread.
    h.engine.process(reaction(WORKER_CHANNEL, work_msg, WORKER_B, "✅")).await.expect("late claim");
    assert_eq!(h.transport.removed_reactions().await, vec![(WORKER_B, "✅".to_string())]);
    assert_eq!(h.transport.threads().await.len(), 1);
}

#[tokio::test]
async fn completion_action_is_fixed_by_the_first_signal() {
    let mut h = harness(vec![]).await;
    let (thread, status_msg) = drive_to_processing(&mut h, "ord-fix1").await;

    // Worker asks to cancel; the record is now a cancellation.
    h.engine.process(reaction(thread, status_msg, ADMIN, "❌")).await.expect("worker cancel");
    let (status_msg, content) = h.transport.last_post_in(thread).await.expect("line");
    assert!(content.contains("**cancellation**"));

    // The client's opposing approve is dropped: no new status line appears.
    let posts_before = h.transport.posts_in(thread).await.len();
    h.engine.process(reaction(thread, status_msg, CUSTOMER, "✅")).await.expect("ignored");
    assert_eq!(h.transport.posts_in(thread).await.len(), posts_before);
    assert_eq!(status_of(&h.repository, "ord-fix1").await, OrderStatus::Processing);

    // Matching reject from the client finalizes the cancellation.
    h.engine.process(reaction(thread, status_msg, CUSTOMER, "❌")).await.expect("client cancel");
    assert_eq!(status_of(&h.repository, "ord-fix1").await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn outsider_reactions_never_touch_the_completion_record() {
    let mut h = harness(vec![]).await;
    let (thread, status_msg) = drive_to_processing(&mut h, "ord-out1").await;

    let posts_before = h.transport.posts_in(thread).await.len();
    h.engine.process(reaction(thread, status_msg, WORKER_B, "✅")).await.expect("outsider");
    assert_eq!(h.transport.posts_in(thread).await.len(), posts_before);
    assert_eq!(status_of(&h.repository, "ord-out1").await, OrderStatus::Processing);
}

#[tokio::test]
async fn failed_finalization_keeps_the_record_for_an_idempotent_retry() {
    let mut h = harness(vec![]).await;
    let (thread, status_msg) = drive_to_processing(&mut h, "ord-retry1").await;

    h.engine.process(reaction(thread, status_msg, CUSTOMER, "✅")).await.expect("client");
    let (status_msg, _) = h.transport.last_post_in(thread).await.expect("line");

    // The client DM during finalization blows up; the thread is told to
    // retry and the record survives with both flags set.
    h.transport
        .fail_next_direct(TransportError::Api { status: 500, message: "boom".to_string() })
        .await;
    h.engine.process(reaction(thread, status_msg, ADMIN, "✅")).await.expect("worker");
    let (status_msg, retry_notice) = {
        let posts = h.transport.posts_in(thread).await;
        (posts[posts.len() - 2].0, posts.last().expect("notice").1.clone())
    };
    assert!(retry_notice.contains("failed partway"));

    // Status was already committed; the retry only replays the side effects.
    assert_eq!(status_of(&h.repository, "ord-retry1").await, OrderStatus::Completed);

    h.engine.process(reaction(thread, status_msg, ADMIN, "✅")).await.expect("retry");
    let archive = h.receiver.recv().await.expect("archive scheduled after retry");
    h.engine.process(archive).await.expect("archive");
    assert_eq!(h.transport.archived().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_prompt_times_out_without_changing_status() {
    let mut h = harness(vec![]).await;
    dispatch_order(&mut h, order("ord-tmo1")).await;
    let (approval_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("post");
    h.engine.process(reaction(ADMIN_CHANNEL, approval_msg, ADMIN, "✅")).await.expect("approve");
    let (dm_channel, instructions) = h.transport.last_direct_to(CUSTOMER).await.expect("dm");

    h.engine.process(reaction(dm_channel, instructions, CUSTOMER, "❌")).await.expect("cancel req");
    assert!(h
        .transport
        .directs_to(CUSTOMER)
        .await
        .last()
        .expect("prompt")
        .contains("Reply here with a short reason"));

    // Paused time fast-forwards to the scheduled timeout.
    let timeout = h.receiver.recv().await.expect("timeout event");
    assert!(matches!(timeout, EngineEvent::PromptTimeout { .. }));
    h.engine.process(timeout).await.expect("timeout");

    assert!(h
        .transport
        .directs_to(CUSTOMER)
        .await
        .last()
        .expect("notice")
        .contains("did not receive a cancellation reason"));
    assert_eq!(status_of(&h.repository, "ord-tmo1").await, OrderStatus::AwaitingPayment);
}

#[tokio::test]
async fn cancellation_reason_is_forwarded_to_admins() {
    let mut h = harness(vec![]).await;
    dispatch_order(&mut h, order("ord-rsn1")).await;
    let (approval_msg, _) = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("post");
    h.engine.process(reaction(ADMIN_CHANNEL, approval_msg, ADMIN, "✅")).await.expect("approve");
    let (dm_channel, instructions) = h.transport.last_direct_to(CUSTOMER).await.expect("dm");
    h.engine.process(reaction(dm_channel, instructions, CUSTOMER, "❌")).await.expect("cancel req");

    h.engine
        .process(message(dm_channel, CUSTOMER, "found it cheaper elsewhere"))
        .await
        .expect("reason");

    let posts = h.transport.posts_in(ADMIN_CHANNEL).await;
    let reason_post = &posts.last().expect("reason post").1;
    assert!(reason_post.contains("requests cancellation"));
    assert!(reason_post.contains("found it cheaper elsewhere"));

    // The prompt is consumed: the next message is not captured again.
    h.engine.process(message(dm_channel, CUSTOMER, "hello?")).await.expect("noise");
    assert_eq!(h.transport.posts_in(ADMIN_CHANNEL).await.len(), posts.len());
}

#[tokio::test]
async fn stale_sweep_reminds_pending_customers() {
    let mut old = order("ord-stale1");
    old.created_at = Utc::now() - chrono::Duration::hours(30);
    let mut fresh = order("ord-fresh1");
    fresh.created_at = Utc::now() - chrono::Duration::hours(1);
    let mut h = harness(vec![old, fresh]).await;

    h.engine.process(EngineEvent::StaleSweep).await.expect("sweep");

    let dms = h.transport.directs_to(CUSTOMER).await;
    assert_eq!(dms.len(), 1, "only the stale order is reminded");
    assert!(dms[0].contains("Reminder"));
    assert!(dms[0].contains(&OrderId("ord-stale1".to_string()).display()));
}

#[tokio::test]
async fn status_override_is_role_gated_and_validates_the_status() {
    let mut h = harness(vec![order("ord-cmd1")]).await;

    // Non-admin: silently ignored.
    h.engine.process(message(ADMIN_CHANNEL, WORKER_A, "!status ord-cmd1 completed")).await.expect("noop");
    assert_eq!(status_of(&h.repository, "ord-cmd1").await, OrderStatus::Pending);
    assert!(h.transport.posts_in(ADMIN_CHANNEL).await.is_empty());

    // Unknown status: enumerated error reply.
    h.engine.process(message(ADMIN_CHANNEL, ADMIN, "!status ord-cmd1 shipped")).await.expect("cmd");
    let reply = h.transport.last_post_in(ADMIN_CHANNEL).await.expect("reply").1;
    assert!(reply.contains("Unknown status `shipped`"));
    assert!(reply.contains("`awaiting_payment`"));

    // Unknown order id.
    h.engine.process(message(ADMIN_CHANNEL, ADMIN, "!status ord-nope completed")).await.expect("cmd");
    assert!(h
        .transport
        .last_post_in(ADMIN_CHANNEL)
        .await
        .expect("reply")
        .1
        .contains("No order matches"));

    // Valid override.
    h.engine.process(message(ADMIN_CHANNEL, ADMIN, "!status ord-cmd1 processing")).await.expect("cmd");
    assert_eq!(status_of(&h.repository, "ord-cmd1").await, OrderStatus::Processing);
    assert!(h
        .transport
        .last_post_in(ADMIN_CHANNEL)
        .await
        .expect("reply")
        .1
        .contains("status changed"));
}

#[tokio::test]
async fn stale_archive_generations_do_not_archive() {
    let mut h = harness(vec![]).await;
    let (thread, _) = drive_to_processing(&mut h, "ord-arch1").await;

    h.engine
        .process(EngineEvent::ArchiveDue {
            order_id: OrderId("ord-arch1".to_string()),
            thread: ChannelId(thread),
            generation: 999,
        })
        .await
        .expect("stale archive");

    assert!(h.transport.archived().await.is_empty());
}

#[tokio::test]
async fn complete_command_reposts_the_status_line() {
    let mut h = harness(vec![]).await;
    let (thread, status_msg) = drive_to_processing(&mut h, "ord-cmd2").await;

    h.engine.process(message(thread, CUSTOMER, "!complete")).await.expect("command");

    let (new_status, content) = h.transport.last_post_in(thread).await.expect("line");
    assert_ne!(new_status, status_msg, "status line is re-posted under a new id");
    assert!(content.contains("Sign-off for order"));

    // The re-posted line is live: reactions on it count.
    h.engine.process(reaction(thread, new_status, CUSTOMER, "✅")).await.expect("confirm");
    let (_, updated) = h.transport.last_post_in(thread).await.expect("updated");
    assert!(updated.contains("**completion**"));
}
