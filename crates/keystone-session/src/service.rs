//! Request dispatch for the Session Service.

use std::sync::Arc;

use keystone_protocol::{
    AccountInfo, CredentialError, EconomyError, PermissionError, Request,
    Response, ServiceError, Tier, TokenAuthority,
};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    AdmissionController, AdventureOutcome, ConnectionSession, IdentityDirectory,
    PlayerState, Roster, SessionRegistry, SpaceReport,
};

/// Shared state behind every session connection.
pub struct SessionService<D> {
    directory: Arc<D>,
    admission: AdmissionController<D>,
    roster: Mutex<Roster>,
    registry: Arc<Mutex<SessionRegistry>>,
    tokens: TokenAuthority,
}

impl<D: IdentityDirectory> SessionService<D> {
    pub fn new(
        directory: Arc<D>,
        tokens: TokenAuthority,
        roster: Roster,
        admin_bypass: bool,
    ) -> Self {
        let registry = Arc::new(Mutex::new(SessionRegistry::new()));
        let admission = AdmissionController::new(
            Arc::clone(&directory),
            tokens.clone(),
            Arc::clone(&registry),
            admin_bypass,
        );
        Self {
            directory,
            admission,
            roster: Mutex::new(roster),
            registry,
            tokens,
        }
    }

    /// Admits `session` and refreshes the player's mirrored tier from the
    /// account info the Identity Service returned.
    pub async fn admit(
        &self,
        session: &mut ConnectionSession,
        username: &str,
        token: &str,
    ) -> Result<AccountInfo, ServiceError> {
        let info = self.admission.admit(session, username, token).await?;
        self.roster.lock().await.set_tier(username, info.tier);
        Ok(info)
    }

    /// Releases `session`'s slot and presence.
    pub async fn close(&self, session: &mut ConnectionSession) {
        self.admission.close(session).await;
    }

    pub fn admission(&self) -> &AdmissionController<D> {
        &self.admission
    }

    /// Handles one request from an admitted connection.
    ///
    /// Never fails: every domain error becomes a failure response.
    pub async fn dispatch(&self, session: &ConnectionSession, req: Request) -> Response {
        tracing::debug!(conn_id = %session.conn_id, action = %req.action, "session request");
        self.try_dispatch(session, req)
            .await
            .unwrap_or_else(ServiceError::into_response)
    }

    async fn try_dispatch(
        &self,
        session: &ConnectionSession,
        req: Request,
    ) -> Result<Response, ServiceError> {
        if !session.is_admitted() {
            return Err(ServiceError::Unauthenticated);
        }
        let username = req.username.as_str();
        if session.username.as_deref() != Some(username) {
            return Err(ServiceError::UsernameMismatch);
        }
        let token = req.token_str();
        if !self.tokens.verify(token, username) {
            return Err(CredentialError::InvalidToken.into());
        }
        let target = req.target_user.as_deref().unwrap_or_default();

        match req.action.as_str() {
            "adventure" => {
                if session.is_admin() {
                    return Err(PermissionError::AdminCannotAdventure.into());
                }
                self.adventure(username, token).await
            }
            "store" | "remove" | "sell" | "list_items" | "space"
                if session.is_admin() =>
            {
                Err(PermissionError::AdminHasNoInventory.into())
            }
            "store" => {
                let (item, space) =
                    self.roster.lock().await.commit_pending(username)?;
                Ok(Response::ok(format!(
                    "Item stored successfully: {} [ID: {}]",
                    item.definition.name, item.id
                ))
                .with_data(json!({
                    "used_space": space.used,
                    "max_space": space.max,
                    "item_name": item.definition.name,
                    "item_type": item.definition.kind,
                    "item_weight": item.definition.weight,
                    "item_value": item.definition.value,
                })))
            }
            "remove" => {
                let mut roster = self.roster.lock().await;
                let id = item_id(&roster, username, &req)?;
                let (item, space) = roster.drop_item(username, id)?;
                drop(roster);
                Ok(Response::ok(format!(
                    "Item removed successfully: {}",
                    item.definition.name
                ))
                .with_data(json!({
                    "removed_item": item,
                    "used_space": space.used,
                    "max_space": space.max,
                })))
            }
            "sell" => {
                let mut roster = self.roster.lock().await;
                let id = item_id(&roster, username, &req)?;
                let (item, balance, space) = roster.sell_item(username, id)?;
                drop(roster);
                Ok(Response::ok(format!(
                    "Item sold successfully: {} for ${}",
                    item.definition.name, item.definition.value
                ))
                .with_data(json!({
                    "item_value": item.definition.value,
                    "sold_item": item,
                    "new_balance": balance,
                    "used_space": space.used,
                    "max_space": space.max,
                })))
            }
            "list_items" => {
                let roster = self.roster.lock().await;
                let items = roster.list(username)?;
                let space = roster.space(username)?;
                Ok(Response::ok("Inventory retrieved successfully").with_data(json!({
                    "inventory": items,
                    "total_items": items.len(),
                    "used_space": space.used,
                    "max_space": space.max,
                })))
            }
            "space" => {
                let SpaceReport { used, max, available, tier } =
                    self.roster.lock().await.space(username)?;
                Ok(Response::ok(format!("Space: {used}/{max}")).with_data(json!({
                    "used_space": used,
                    "max_space": max,
                    "available_space": available,
                    "player_type": tier,
                })))
            }
            "list_users" => self.list_users(session.is_admin()).await,
            "modify_type" => {
                let new_type = req.new_type.as_deref().unwrap_or_default();
                self.modify_type(session, token, target, new_type).await
            }
            "remove_user" => self.remove_user(session, token, target).await,
            other => Err(ServiceError::UnknownAction(other.to_string())),
        }
    }

    async fn adventure(&self, username: &str, token: &str) -> Result<Response, ServiceError> {
        let receipt = self.directory.debit_energy(username, token).await?;
        tracing::debug!(%username, remaining = receipt.remaining_energy, "energy debited");

        let known = self.roster.lock().await.contains(username);
        if !known {
            let tier = match self.directory.account_info(username, token).await {
                Ok(info) => info.tier,
                Err(e) => {
                    tracing::warn!(%username, error = %e, "tier lookup failed, defaulting to Freemium");
                    Tier::Freemium
                }
            };
            self.roster.lock().await.ensure_player(username, tier);
        }

        let outcome = {
            let mut roster = self.roster.lock().await;
            roster.roll_adventure(username, &mut rand::rng())?
        };
        Ok(match outcome {
            AdventureOutcome::Item(item) => Response::ok(format!(
                "Adventure complete! Found item: {}",
                item.definition.name
            ))
            .with_data(json!({
                "type": "item",
                "item": item,
                "message": "Use command 'store' to store this item in your inventory",
            })),
            AdventureOutcome::Cash { amount, total_balance } => {
                Response::ok(format!("Adventure complete! Found money: ${amount}"))
                    .with_data(json!({
                        "type": "money",
                        "amount": amount,
                        "total_balance": total_balance,
                    }))
            }
        })
    }

    async fn list_users(&self, is_admin: bool) -> Result<Response, ServiceError> {
        if is_admin {
            let usernames: Vec<String> = self
                .roster
                .lock()
                .await
                .usernames()
                .map(str::to_string)
                .collect();
            let registry = self.registry.lock().await;
            let users: Vec<_> = usernames
                .iter()
                .map(|name| json!({"username": name, "is_online": registry.is_online(name)}))
                .collect();
            return Ok(Response::ok("All users retrieved (admin view)")
                .with_data(json!({ "users": users })));
        }

        let online = self.registry.lock().await.list_online();
        let users: Vec<_> = online
            .iter()
            .map(|name| json!({ "username": name }))
            .collect();
        Ok(Response::ok("Online users retrieved").with_data(json!({ "users": users })))
    }

    /// Forwards a tier change, then mirrors it locally.
    async fn modify_type(
        &self,
        session: &ConnectionSession,
        token: &str,
        target: &str,
        new_type: &str,
    ) -> Result<Response, ServiceError> {
        let acting = self.require_admin(session, target, "modify your type")?;
        let tier: Tier = new_type.parse().map_err(|_| ServiceError::InvalidTier)?;

        let change = self
            .directory
            .change_tier(acting, token, target, new_type)
            .await
            .map_err(|e| {
                e.into_service_error(Some("Failed to modify type of user from auth server"))
            })?;
        if change.new_type != tier {
            tracing::warn!(%target, requested = %tier, applied = %change.new_type, "identity applied a different tier");
        }
        self.roster.lock().await.set_tier(target, change.new_type);

        tracing::info!(%acting, %target, tier = %change.new_type, "tier changed on both services");
        Ok(Response::ok(format!(
            "User type modified successfully on both servers: {target} -> {}",
            change.new_type
        ))
        .with_data(json!({
            "target_user": target,
            "new_type": change.new_type,
        })))
    }

    /// Forwards an account removal, then drops the local player and
    /// presence.
    async fn remove_user(
        &self,
        session: &ConnectionSession,
        token: &str,
        target: &str,
    ) -> Result<Response, ServiceError> {
        let acting = self.require_admin(session, target, "remove yourself")?;

        self.directory
            .remove_account(acting, token, target)
            .await
            .map_err(|e| e.into_service_error(Some("Failed to remove user from auth server")))?;

        let remaining = {
            let mut roster = self.roster.lock().await;
            roster.remove(target);
            roster.len()
        };
        self.registry.lock().await.mark_offline(target);

        tracing::info!(%acting, %target, "user removed from both services");
        Ok(Response::ok(format!(
            "User removed successfully from both servers: {target}"
        ))
        .with_data(json!({
            "removed_user": target,
            "remaining_users": remaining,
        })))
    }

    fn require_admin<'a>(
        &self,
        session: &'a ConnectionSession,
        target: &str,
        self_action: &'static str,
    ) -> Result<&'a str, ServiceError> {
        if !session.is_admin() {
            return Err(PermissionError::AdminRequired.into());
        }
        let acting = session.username.as_deref().unwrap_or_default();
        if target == acting {
            return Err(PermissionError::SelfModification(self_action).into());
        }
        Ok(acting)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Snapshot of every player, for persistence.
    pub async fn records(&self) -> Vec<PlayerState> {
        self.roster.lock().await.records()
    }

    pub async fn player(&self, username: &str) -> Option<PlayerState> {
        self.roster.lock().await.get(username).cloned()
    }

    pub async fn online_users(&self) -> Vec<String> {
        self.registry.lock().await.list_online()
    }

    pub async fn connection_count(&self) -> u32 {
        self.admission.connection_count().await
    }
}

/// Resolves the request's `itemId` for a player known to exist.
fn item_id(roster: &Roster, username: &str, req: &Request) -> Result<Uuid, ServiceError> {
    if !roster.contains(username) {
        return Err(CredentialError::NotFound("Player").into());
    }
    req.item_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or_else(|| EconomyError::ItemNotFound.into())
}
