//! Bootstrap-token admission (§4.5).
//!
//! Generates short-lived, bounded-use node-registration credentials and validates them
//! atomically against expiry and use-count, registering the node as a side effect.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;

use crate::error::{Error, Result};
use crate::ids::GroupId;

use super::model::{BootstrapToken, CreateGroup, CreateTarget, Target, TargetStatus};
use super::repositories::{BootstrapTokenRepository, GroupRepository, TargetRepository};

/// Generates a bootstrap token: 32 random bytes from the OS CSPRNG, URL-safe base64,
/// no padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Result of a successful `register_node` call.
#[derive(Debug, Clone)]
pub struct RegisteredNode {
    pub target: Target,
    pub group_id: GroupId,
    pub token_uses: u32,
    pub token_remaining: u32,
}

/// Parameters for `register_node`.
#[derive(Debug, Clone)]
pub struct RegisterNodeRequest {
    pub token: String,
    pub hostname: String,
    pub ip_address: String,
    pub group_id: Option<GroupId>,
    pub labels: super::model::StringMap,
    pub metadata: super::model::DynamicMap,
}

/// Stateless service wrapping the token-admission flow over a [`Store`](super::repositories::Store).
///
/// Holds no state of its own; every operation takes the store explicitly so the service
/// is cheap to construct and share (mirrors `TemplateEngine`'s unit-struct shape).
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenAdmissionService;

impl TokenAdmissionService {
    pub fn new() -> Self {
        Self
    }

    /// Validates `token` against `store`, consuming one use iff it is usable.
    ///
    /// Distinguishes not-found from expired/exhausted by re-checking the returned
    /// record, since the atomic update itself cannot distinguish "token never existed"
    /// from "token exists but wasn't touched" (§4.5: the repository layer owns
    /// atomicity, this layer owns the error taxonomy).
    pub async fn validate_and_consume<S>(&self, store: &S, token: &str) -> Result<BootstrapToken>
    where
        S: BootstrapTokenRepository,
    {
        let now = Utc::now();
        let before = store
            .get_by_token(token)
            .await?
            .ok_or_else(|| Error::InvalidToken)?;

        if before.expires_at <= now {
            return Err(Error::TokenExpired);
        }
        if before.uses >= before.max_uses {
            return Err(Error::TokenExhausted);
        }

        let after = store
            .validate_and_consume(token, now)
            .await?
            .ok_or_else(|| Error::InvalidToken)?;

        if after.uses == before.uses {
            // Another concurrent caller won the race for the last use between our
            // pre-check and the atomic update.
            return Err(Error::TokenExhausted);
        }

        Ok(after)
    }

    /// Validates the token and registers a new Target as one logical unit (§4.5): "if
    /// any step fails, the whole transaction rolls back — including the token
    /// consumption."
    ///
    /// The in-memory store has no real transaction boundary, and the `Store` traits
    /// expose no cross-repository transaction hook for a backend to provide one either
    /// — so this method compensates explicitly: if target/group creation fails after
    /// the token was already consumed, it un-consumes the token via
    /// `BootstrapTokenRepository::compensate_use` before surfacing the error, so the
    /// token is left exactly as if `register_node` had never been called. A
    /// `sqlx::Transaction`-backed `Store` may still wrap the whole method in a real
    /// transaction for atomicity against concurrent readers; this compensation is what
    /// keeps the *token's* state correct regardless.
    pub async fn register_node<S>(&self, store: &S, req: RegisterNodeRequest) -> Result<RegisteredNode>
    where
        S: BootstrapTokenRepository + TargetRepository + GroupRepository,
    {
        let token = self.validate_and_consume(store, &req.token).await?;

        match self.create_target_and_group(store, &req).await {
            Ok((target, group_id)) => Ok(RegisteredNode {
                target,
                group_id,
                token_uses: token.uses,
                token_remaining: token.remaining_uses(),
            }),
            Err(err) => {
                if let Err(compensate_err) = store.compensate_use(&req.token).await {
                    tracing::error!(
                        error = %compensate_err,
                        "failed to compensate bootstrap token use after register_node failure"
                    );
                }
                Err(err)
            }
        }
    }

    async fn create_target_and_group<S>(
        &self,
        store: &S,
        req: &RegisterNodeRequest,
    ) -> Result<(Target, GroupId)>
    where
        S: TargetRepository + GroupRepository,
    {
        let target = store
            .create(CreateTarget {
                hostname: req.hostname.clone(),
                ip_address: req.ip_address.clone(),
                status: Some(TargetStatus::Active),
                labels: req.labels.clone(),
                metadata: req.metadata.clone(),
            })
            .await?;

        let group_id = match &req.group_id {
            Some(gid) => {
                store.link_group(&target.id, gid, false).await?;
                gid.clone()
            }
            None => {
                let group = store
                    .create(CreateGroup {
                        name: req.hostname.clone(),
                        description: None,
                        priority: None,
                        is_default_own: true,
                        parent_id: None,
                        metadata: super::model::StringMap::new(),
                    })
                    .await?;
                store.link_group(&target.id, &group.id, true).await?;
                group.id
            }
        };

        Ok((target, group_id))
    }
}
