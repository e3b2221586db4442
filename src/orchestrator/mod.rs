//! Synchronization orchestrator.
//!
//! One inbound event is one unit of work: classify it, run one database
//! transaction that mutates and reads back everything the fan-out needs,
//! then reconcile the displayed message of every affected member.
//!
//! Concurrent events for the same family are not serialised. Each sees a
//! consistent snapshot of its own transaction and the last commit wins;
//! a member who acted on a stale view simply sees the newer state on the
//! next round.

use futures::future::join_all;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::db::family_repo::{self, DirectoryError};
use crate::db::{member_view, product_repo};
use crate::models::{ChatId, FamilyId, Member, MessageId, Product, ProductId};
use crate::parser::parse_list;
use crate::router::{self, Action};
use crate::transport::{CallbackEvent, ChatTransport, InboundEvent, Keyboard, TransportError};
use crate::ui;

#[cfg(test)]
mod tests;

/// What handling one event amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// State changed and the family's views were reconciled.
    Synced { recipients: usize },
    /// Only the requesting member's view was touched.
    Replied,
    ProductNotFound,
    /// The requester isn't bound to a family.
    NoFamily,
    JoinRejected,
    /// Unknown input or nothing to do.
    Ignored,
    /// The unit of work failed; the requester got a failure notice.
    Failed,
}

/// Errors that abort a unit of work.
#[derive(Debug)]
pub enum SyncError {
    Database(sqlx::Error),
    Directory(DirectoryError),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Database(e) => write!(f, "Database error: {}", e),
            SyncError::Directory(e) => write!(f, "Family directory error: {}", e),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Database(e) => Some(e),
            SyncError::Directory(e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Database(e)
    }
}

impl From<DirectoryError> for SyncError {
    fn from(e: DirectoryError) -> Self {
        SyncError::Directory(e)
    }
}

/// Which product mutation a callback asked for.
#[derive(Debug, Clone, Copy)]
enum ProductChange {
    ToggleBought,
    Delete,
}

/// Coordinates the family directory, the list store and the chat transport.
pub struct Orchestrator<T> {
    pool: SqlitePool,
    transport: T,
    bot_username: String,
}

impl<T: ChatTransport> Orchestrator<T> {
    pub fn new(pool: SqlitePool, transport: T, bot_username: impl Into<String>) -> Self {
        Self {
            pool,
            transport,
            bot_username: bot_username.into(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Starts a transaction holding the write lock from its first statement,
    /// so concurrent writers queue on the busy timeout.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin_with("BEGIN IMMEDIATE").await
    }

    /// Handles one inbound event end to end. Never fails: errors are logged
    /// and reported to the requesting member.
    pub async fn handle(&self, event: InboundEvent) -> Outcome {
        let action = router::classify(&event);
        tracing::debug!("Event from {} classified as {:?}", event.chat_id(), action);

        // Dismiss the client's loading indicator whatever happens next.
        if let InboundEvent::Callback(callback) = &event {
            if let Err(e) = self.transport.answer_callback(&callback.callback_id).await {
                tracing::warn!("Failed to answer callback {}: {}", callback.callback_id, e);
            }
        }

        match self.dispatch(&event, action).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Failed to handle event from {}: {}", event.chat_id(), e);
                self.notify(event.chat_id(), ui::FAILURE).await;
                Outcome::Failed
            }
        }
    }

    async fn dispatch(&self, event: &InboundEvent, action: Action) -> Result<Outcome, SyncError> {
        let chat_id = event.chat_id();
        let actor = event.sender_name();

        match (action, event) {
            (Action::AddProducts(text), _) => self.add_products(chat_id, actor, &text).await,
            (Action::Start, _) => self.start(chat_id, actor).await,
            (Action::JoinFamily(code), _) => self.join_family(chat_id, actor, &code).await,
            (Action::CreateFamily, _) => self.create_family(chat_id, actor).await,
            (Action::ToggleBought(id), InboundEvent::Callback(cb)) => {
                self.change_product(cb, id, ProductChange::ToggleBought)
                    .await
            }
            (Action::ConfirmDeleteProduct(id), InboundEvent::Callback(cb)) => {
                self.change_product(cb, id, ProductChange::Delete).await
            }
            (Action::EditProduct(id), InboundEvent::Callback(cb)) => {
                self.show_product(cb, id, false).await
            }
            (Action::DeleteProduct(id), InboundEvent::Callback(cb)) => {
                self.show_product(cb, id, true).await
            }
            (Action::ToggleEditMode, InboundEvent::Callback(cb)) => self.toggle_edit_mode(cb).await,
            (Action::ConfirmClear, InboundEvent::Callback(cb)) => self.confirm_clear(cb).await,
            (Action::ClearAll, InboundEvent::Callback(cb)) => self.clear_all(cb).await,
            (Action::Refresh, InboundEvent::Callback(cb)) => self.refresh(cb, None).await,
            _ => Ok(Outcome::Ignored),
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn start(&self, chat_id: ChatId, name: &str) -> Result<Outcome, SyncError> {
        let mut conn = self.pool.acquire().await?;
        family_repo::ensure_member(&mut conn, chat_id, name).await?;
        drop(conn);

        self.notify(chat_id, ui::WELCOME).await;
        Ok(Outcome::Replied)
    }

    async fn create_family(&self, chat_id: ChatId, name: &str) -> Result<Outcome, SyncError> {
        let mut tx = self.begin_write().await?;
        let code = family_repo::create_family(&mut tx, chat_id, name).await?;
        tx.commit().await?;

        let keyboard = ui::invite_keyboard(&self.bot_username, &code);
        if let Err(e) = self
            .transport
            .send_message(chat_id, ui::FAMILY_CREATED, Some(&keyboard))
            .await
        {
            tracing::warn!("Failed to send invite to {}: {}", chat_id, e);
        }
        Ok(Outcome::Replied)
    }

    async fn join_family(
        &self,
        chat_id: ChatId,
        name: &str,
        code: &str,
    ) -> Result<Outcome, SyncError> {
        let mut tx = self.begin_write().await?;
        if !family_repo::join_family(&mut tx, chat_id, code, name).await? {
            tx.rollback().await?;
            tracing::info!("{} tried to join with an unknown invite code", chat_id);
            self.notify(chat_id, ui::JOIN_REJECTED).await;
            return Ok(Outcome::JoinRejected);
        }

        let Some((member, family_id)) = family_member(&mut tx, chat_id).await? else {
            return Err(SyncError::Database(sqlx::Error::RowNotFound));
        };
        let products = product_repo::list_ordered(&mut tx, family_id).await?;
        tx.commit().await?;

        let keyboard = ui::list_keyboard(&products, member.mode);
        match self
            .transport
            .send_message(chat_id, ui::JOINED, Some(&keyboard))
            .await
        {
            Ok(message_id) => self.persist_views(&[member.with_last_message(message_id)]).await,
            Err(e) => tracing::warn!("Failed to acknowledge join for {}: {}", chat_id, e),
        }
        Ok(Outcome::Replied)
    }

    // ------------------------------------------------------------------
    // Family-wide changes
    // ------------------------------------------------------------------

    async fn add_products(
        &self,
        chat_id: ChatId,
        actor: &str,
        text: &str,
    ) -> Result<Outcome, SyncError> {
        let names = parse_list(text);
        if names.is_empty() {
            return Ok(Outcome::Ignored);
        }

        let mut tx = self.begin_write().await?;
        let Some((_, family_id)) = family_member(&mut tx, chat_id).await? else {
            drop(tx);
            return Ok(self.deny_no_family(chat_id).await);
        };
        product_repo::add_products(&mut tx, family_id, &names).await?;
        let products = product_repo::list_ordered(&mut tx, family_id).await?;
        let roster = family_repo::get_members_of(&mut tx, family_id).await?;
        tx.commit().await?;

        tracing::info!(
            "{} added {} item(s) to family {}",
            chat_id,
            names.len(),
            family_id
        );

        // A longer list goes to the bottom of the chat as a fresh message.
        let text = ui::list_updated(actor);
        let rounds = roster
            .into_iter()
            .map(|member| self.resend(member, &text, &products));
        let results = join_all(rounds).await;

        let recipients = results.iter().filter(|(_, delivered)| *delivered).count();
        let changed: Vec<Member> = results
            .into_iter()
            .filter_map(|(member, _)| member)
            .collect();
        self.persist_views(&changed).await;

        Ok(Outcome::Synced { recipients })
    }

    async fn change_product(
        &self,
        cb: &CallbackEvent,
        product_id: ProductId,
        change: ProductChange,
    ) -> Result<Outcome, SyncError> {
        let mut tx = self.begin_write().await?;
        let Some((member, family_id)) = family_member(&mut tx, cb.chat_id).await? else {
            drop(tx);
            return Ok(self.deny_no_family(cb.chat_id).await);
        };

        let changed = match change {
            ProductChange::ToggleBought => {
                product_repo::toggle_bought(&mut tx, family_id, product_id).await?
            }
            ProductChange::Delete => {
                product_repo::delete_product(&mut tx, family_id, product_id).await?
            }
        };
        let products = product_repo::list_ordered(&mut tx, family_id).await?;

        let product = match changed {
            Some(product) => product,
            None => {
                tx.commit().await?;
                tracing::debug!(
                    "Product {} not in family {} for {:?}",
                    product_id,
                    family_id,
                    change
                );
                self.show_list(&member, cb.message_id, ui::PRODUCT_MISSING, &products)
                    .await;
                return Ok(Outcome::ProductNotFound);
            }
        };

        let roster = family_repo::get_members_of(&mut tx, family_id).await?;
        tx.commit().await?;

        let notice = match change {
            ProductChange::ToggleBought => ui::toggled_notice(&cb.sender_name, &product),
            ProductChange::Delete => ui::removed_notice(&cb.sender_name, &product),
        };
        Ok(self.edit_all(roster, &notice, &products).await)
    }

    async fn clear_all(&self, cb: &CallbackEvent) -> Result<Outcome, SyncError> {
        let mut tx = self.begin_write().await?;
        let Some((_, family_id)) = family_member(&mut tx, cb.chat_id).await? else {
            drop(tx);
            return Ok(self.deny_no_family(cb.chat_id).await);
        };
        let removed = product_repo::delete_all(&mut tx, family_id).await?;
        let roster = family_repo::get_members_of(&mut tx, family_id).await?;
        tx.commit().await?;

        tracing::info!(
            "{} cleared {} item(s) from family {}",
            cb.chat_id,
            removed,
            family_id
        );
        Ok(self
            .edit_all(roster, &ui::cleared_notice(&cb.sender_name), &[])
            .await)
    }

    // ------------------------------------------------------------------
    // Requester-only views
    // ------------------------------------------------------------------

    async fn toggle_edit_mode(&self, cb: &CallbackEvent) -> Result<Outcome, SyncError> {
        let mut tx = self.begin_write().await?;
        let Some((mut member, family_id)) = family_member(&mut tx, cb.chat_id).await? else {
            drop(tx);
            return Ok(self.deny_no_family(cb.chat_id).await);
        };
        let mode = member.mode.toggled();
        member_view::set_mode(&mut tx, &mut member, mode).await?;
        let products = product_repo::list_ordered(&mut tx, family_id).await?;
        tx.commit().await?;

        let target = member.last_message_id.unwrap_or(cb.message_id);
        let header = ui::list_header(&products, mode);
        self.show_list(&member, target, &header, &products).await;
        Ok(Outcome::Replied)
    }

    async fn refresh(&self, cb: &CallbackEvent, notice: Option<&str>) -> Result<Outcome, SyncError> {
        let mut conn = self.pool.acquire().await?;
        let Some((member, family_id)) = family_member(&mut conn, cb.chat_id).await? else {
            drop(conn);
            return Ok(self.deny_no_family(cb.chat_id).await);
        };
        let products = product_repo::list_ordered(&mut conn, family_id).await?;
        drop(conn);

        let header = match notice {
            Some(notice) => notice.to_string(),
            None => ui::list_header(&products, member.mode),
        };
        self.show_list(&member, cb.message_id, &header, &products)
            .await;
        Ok(Outcome::Replied)
    }

    /// Product card (`confirm == false`) or delete confirmation on the tapped message.
    async fn show_product(
        &self,
        cb: &CallbackEvent,
        product_id: ProductId,
        confirm: bool,
    ) -> Result<Outcome, SyncError> {
        let mut conn = self.pool.acquire().await?;
        let Some((_, family_id)) = family_member(&mut conn, cb.chat_id).await? else {
            drop(conn);
            return Ok(self.deny_no_family(cb.chat_id).await);
        };
        let product = product_repo::find_product(&mut conn, family_id, product_id).await?;
        drop(conn);

        let product = match product {
            Some(product) => product,
            None => {
                self.refresh(cb, Some(ui::PRODUCT_MISSING)).await?;
                return Ok(Outcome::ProductNotFound);
            }
        };

        let (text, keyboard) = if confirm {
            (
                ui::confirm_delete_prompt(&product),
                ui::confirm_delete_keyboard(&product),
            )
        } else {
            (
                ui::product_card(&product),
                ui::product_card_keyboard(&product),
            )
        };
        if let Err(e) = self
            .transport
            .edit_message_text(cb.chat_id, cb.message_id, &text, Some(&keyboard))
            .await
        {
            log_edit_failure(cb.chat_id, cb.message_id, &e);
        }
        Ok(Outcome::Replied)
    }

    async fn confirm_clear(&self, cb: &CallbackEvent) -> Result<Outcome, SyncError> {
        let keyboard = ui::confirm_clear_keyboard();
        if let Err(e) = self
            .transport
            .edit_message_keyboard(cb.chat_id, cb.message_id, &keyboard)
            .await
        {
            log_edit_failure(cb.chat_id, cb.message_id, &e);
        }
        Ok(Outcome::Replied)
    }

    // ------------------------------------------------------------------
    // Message reconciliation
    // ------------------------------------------------------------------

    /// Edits every member's tracked message in place, sending a fresh one
    /// where there is none or the edit fails.
    async fn edit_all(&self, roster: Vec<Member>, text: &str, products: &[Product]) -> Outcome {
        let rounds = roster.into_iter().map(|member| async move {
            let keyboard = ui::list_keyboard(products, member.mode);
            let shown = self
                .reconcile(member.chat_id, member.last_message_id, text, &keyboard)
                .await;
            (member, shown)
        });
        let results = join_all(rounds).await;

        let recipients = results.iter().filter(|(_, shown)| shown.is_some()).count();
        let changed: Vec<Member> = results
            .into_iter()
            .filter_map(|(member, shown)| match shown {
                Some(id) if member.last_message_id != Some(id) => {
                    Some(member.with_last_message(id))
                }
                _ => None,
            })
            .collect();
        self.persist_views(&changed).await;

        Outcome::Synced { recipients }
    }

    /// Deletes the member's tracked message and sends a fresh list.
    ///
    /// Returns the member if their tracked id changed, and whether the new
    /// message was delivered.
    async fn resend(
        &self,
        mut member: Member,
        text: &str,
        products: &[Product],
    ) -> (Option<Member>, bool) {
        let previous = member.last_message_id;
        if let Some(message_id) = previous {
            match self.transport.delete_message(member.chat_id, message_id).await {
                Ok(()) => member.last_message_id = None,
                Err(e) => tracing::warn!(
                    "Failed to delete message {} for {}: {}",
                    message_id,
                    member.chat_id,
                    e
                ),
            }
        }

        let keyboard = ui::list_keyboard(products, member.mode);
        let delivered = match self
            .transport
            .send_message(member.chat_id, text, Some(&keyboard))
            .await
        {
            Ok(message_id) => {
                member.last_message_id = Some(message_id);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to send list to {}: {}", member.chat_id, e);
                false
            }
        };

        let changed = member.last_message_id != previous;
        (changed.then_some(member), delivered)
    }

    /// Shows the list on `target` for one member and tracks the result.
    async fn show_list(&self, member: &Member, target: MessageId, text: &str, products: &[Product]) {
        let keyboard = ui::list_keyboard(products, member.mode);
        let shown = self
            .reconcile(member.chat_id, Some(target), text, &keyboard)
            .await;

        if let Some(id) = shown {
            if member.last_message_id != Some(id) {
                self.persist_views(&[member.clone().with_last_message(id)])
                    .await;
            }
        }
    }

    /// Edit-in-place over resend. Returns the id of the message now showing
    /// the view, or `None` if the member could not be reached.
    async fn reconcile(
        &self,
        chat_id: ChatId,
        target: Option<MessageId>,
        text: &str,
        keyboard: &Keyboard,
    ) -> Option<MessageId> {
        if let Some(message_id) = target {
            match self
                .transport
                .edit_message_text(chat_id, message_id, text, Some(keyboard))
                .await
            {
                Ok(()) | Err(TransportError::NotModified) => return Some(message_id),
                Err(e) => log_edit_failure(chat_id, message_id, &e),
            }
        }

        match self
            .transport
            .send_message(chat_id, text, Some(keyboard))
            .await
        {
            Ok(message_id) => Some(message_id),
            Err(e) => {
                tracing::warn!("Failed to send list to {}: {}", chat_id, e);
                None
            }
        }
    }

    /// Persists tracked message ids after a send/edit round.
    async fn persist_views(&self, members: &[Member]) {
        if members.is_empty() {
            return;
        }

        let result = async {
            let mut tx = self.begin_write().await?;
            member_view::update_last_message_ids(&mut tx, members).await?;
            tx.commit().await
        }
        .await;

        if let Err(e) = result {
            tracing::error!(
                "Failed to record message ids for {} member(s): {}",
                members.len(),
                e
            );
        }
    }

    async fn deny_no_family(&self, chat_id: ChatId) -> Outcome {
        self.notify(chat_id, ui::NO_FAMILY).await;
        Outcome::NoFamily
    }

    /// Plain text reply without a keyboard.
    async fn notify(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.transport.send_message(chat_id, text, None).await {
            tracing::warn!("Failed to notify {}: {}", chat_id, e);
        }
    }
}

/// The requester and their family, or `None` if they have none.
async fn family_member(
    conn: &mut SqliteConnection,
    chat_id: ChatId,
) -> Result<Option<(Member, FamilyId)>, sqlx::Error> {
    let member = family_repo::get_member(conn, chat_id).await?;
    Ok(member.and_then(|m| m.family_id.map(|family_id| (m, family_id))))
}

fn log_edit_failure(chat_id: ChatId, message_id: MessageId, e: &TransportError) {
    tracing::warn!(
        "Failed to edit message {} for {}: {}",
        message_id,
        chat_id,
        e
    );
}
