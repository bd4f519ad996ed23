//! Login and account lifecycle

use std::sync::Arc;

use chrono::Utc;
use slate_db::CreateSession;
use slate_types::{normalize_email, PromoOutcome, UserEntitlement};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::crypto::hash_token;
use crate::identity::{IdentityError, IdentityTokenVerifier};
use crate::promo::{PromoService, RedeemRequest};
use crate::resolver::EntitlementResolver;
use crate::stores::Stores;
use crate::token::{EntitlementClaims, IssuedToken, TokenIssuer};
use crate::{EngineError, EngineResult};

/// Login input
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Identity provider ID token
    pub id_token: String,
    /// Promo code to apply on login
    pub coupon_code: Option<String>,
    pub ip_address: Option<String>,
}

/// Login output
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub entitlement: UserEntitlement,
    pub token: IssuedToken,
    /// Present when a coupon was submitted
    pub promo: Option<PromoOutcome>,
}

/// Account service
#[derive(Clone)]
pub struct AccountService {
    stores: Stores,
    resolver: EntitlementResolver,
    promo: PromoService,
    tokens: Arc<TokenIssuer>,
    verifier: Arc<dyn IdentityTokenVerifier>,
}

impl AccountService {
    pub fn new(
        stores: Stores,
        resolver: EntitlementResolver,
        promo: PromoService,
        tokens: Arc<TokenIssuer>,
        verifier: Arc<dyn IdentityTokenVerifier>,
    ) -> Self {
        Self {
            stores,
            resolver,
            promo,
            tokens,
            verifier,
        }
    }

    /// Exchange an identity token for an entitlement credential.
    ///
    /// Banned identities are refused before anything is created. The ban
    /// check and the first-login create share the user's lock with the
    /// sweeper's final delete, so a removed account is never recreated.
    #[instrument(skip(self, request))]
    pub async fn login(&self, request: LoginRequest) -> EngineResult<LoginResult> {
        let identity = self
            .verifier
            .verify_id_token(&request.id_token)
            .await
            .map_err(|e| match e {
                IdentityError::InvalidToken | IdentityError::TokenExpired => {
                    EngineError::InvalidCredentials
                }
                other => EngineError::Identity(other),
            })?;
        let email = normalize_email(&identity.email);

        let guard = self.resolver.locks().lock(&identity.uid).await;
        if self.stores.bans.is_banned(&identity.uid, &email).await? {
            warn!(user_id = %identity.uid, "Login attempt by deleted account");
            return Err(EngineError::AccountPermanentlyDeleted);
        }
        self.resolver
            .get_or_create_held(&guard, &identity.uid, &email)
            .await?;
        drop(guard);

        let mut promo = None;
        if let Some(code) = request.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) {
            let redeemed = self
                .promo
                .redeem(RedeemRequest {
                    code: code.to_string(),
                    user_id: identity.uid.clone(),
                    email: email.clone(),
                    source_ip: request.ip_address.clone(),
                })
                .await;
            match redeemed {
                Ok(result) => promo = Some(result.outcome),
                // Login still succeeds on the current tier.
                Err(e) => warn!(error = %e, "Coupon could not be applied at login"),
            }
        }

        let (entitlement, token) = self.issue_session(&identity.uid, request.ip_address).await?;
        info!(user_id = %identity.uid, tier = %entitlement.tier, "User logged in");

        Ok(LoginResult {
            entitlement,
            token,
            promo,
        })
    }

    /// Verify a credential; accounts removed since issuance are refused
    pub async fn authenticate(&self, token: &str) -> EngineResult<EntitlementClaims> {
        let claims = self.tokens.verify(token)?;
        match self.resolver.get_entitlement(&claims.sub).await {
            Ok(_) => Ok(claims),
            Err(EngineError::UserNotFound) => Err(EngineError::InvalidToken),
            Err(e) => Err(e),
        }
    }

    /// Start the deletion grace period
    pub async fn request_deletion(&self, user_id: &str) -> EngineResult<UserEntitlement> {
        self.resolver.schedule_deletion(user_id, Utc::now()).await
    }

    /// Withdraw a pending deletion
    pub async fn cancel_deletion(&self, user_id: &str) -> EngineResult<UserEntitlement> {
        self.resolver.cancel_deletion(user_id).await
    }

    /// Credential for the current snapshot, recorded as a session
    async fn issue_session(
        &self,
        user_id: &str,
        ip_address: Option<String>,
    ) -> EngineResult<(UserEntitlement, IssuedToken)> {
        let guard = self.resolver.locks().lock(user_id).await;
        let entitlement = self.resolver.active_entitlement(&guard, user_id).await?;

        let token = self.tokens.issue(&entitlement)?;
        self.stores
            .sessions
            .create(CreateSession {
                id: Uuid::new_v4(),
                user_id: entitlement.user_id.to_string(),
                token_hash: hash_token(&token.token),
                ip_address,
                expires_at: token.expires_at,
            })
            .await?;
        Ok((entitlement, token))
    }
}
