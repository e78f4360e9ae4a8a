//! The process-wide authentication manager.
//!
//! Ties the user store, session store, brute-force limiter, and cookie
//! signing together, and fans session-invalidation notices out to the
//! WebSocket hub.

use std::net::IpAddr;

use chrono::{Duration, Utc};
use tokio::sync::broadcast;
use tracing::{info, warn};

use peerdeck_data::{SessionRow, SessionStore, UserRecord, UserStore, UserUpdate};

use crate::capability::{AuthedUser, Capability};
use crate::error::AuthError;
use crate::lockout::{FailureOutcome, LoginRateLimiter};
use crate::password::{hash_password, verify_password, PasswordCheck};
use crate::session::{issue_session_id, parse_signed_cookie, sign_session_id};

const SESSION_TTL_DAYS: i64 = 7;
const INVALIDATION_CHANNEL_CAPACITY: usize = 64;

/// Successful login result.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// The session row created for the login.
    pub session: SessionRow,
    /// Signed cookie value to set on the response.
    pub cookie_value: String,
}

/// Authentication manager shared by the HTTP layer and the WebSocket hub.
pub struct AuthManager {
    users: UserStore,
    sessions: SessionStore,
    limiter: LoginRateLimiter,
    secret: String,
    bcrypt_cost: u32,
    auth_enabled: bool,
    invalidations: broadcast::Sender<i64>,
}

impl AuthManager {
    /// Construct the manager.
    #[must_use]
    pub fn new(
        users: UserStore,
        sessions: SessionStore,
        secret: String,
        bcrypt_cost: u32,
        auth_enabled: bool,
    ) -> Self {
        let (invalidations, _) = broadcast::channel(INVALIDATION_CHANNEL_CAPACITY);
        Self {
            users,
            sessions,
            limiter: LoginRateLimiter::new(),
            secret,
            bcrypt_cost,
            auth_enabled,
            invalidations,
        }
    }

    /// Whether authentication is enforced.
    #[must_use]
    pub fn auth_enabled(&self) -> bool {
        self.auth_enabled
    }

    /// Subscribe to user-invalidation notices (user ids whose sessions were
    /// destroyed); the hub force-closes matching sockets.
    #[must_use]
    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<i64> {
        self.invalidations.subscribe()
    }

    /// Make sure the built-in admin account exists, seeding its credential
    /// from configuration. A plaintext config credential is stored as-is and
    /// migrated to bcrypt on first successful login.
    ///
    /// # Errors
    ///
    /// Fails when the user store is unreachable.
    pub async fn ensure_admin(
        &self,
        admin_username: &str,
        config_password: Option<&str>,
    ) -> Result<(), AuthError> {
        if self.users.by_username(admin_username).await?.is_some() {
            return Ok(());
        }
        info!(username = admin_username, "creating built-in admin account");
        self.users
            .create(&peerdeck_data::NewUser {
                username: admin_username.to_string(),
                password_hash: config_password.map(str::to_string),
                is_admin: true,
                capabilities: Vec::new(),
            })
            .await?;
        Ok(())
    }

    /// Attempt a password login from `ip`.
    ///
    /// Failed attempts observe the exponential delay schedule; locked-out
    /// callers short-circuit with [`AuthError::RateLimited`] regardless of
    /// password validity.
    ///
    /// # Errors
    ///
    /// [`AuthError::RateLimited`], [`AuthError::InvalidCredentials`],
    /// [`AuthError::AccountDisabled`], or a store failure.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ip: IpAddr,
    ) -> Result<LoginOutcome, AuthError> {
        self.limiter.pre_check(ip)?;

        let user = self.users.by_username(username).await?;
        let Some(user) = user else {
            self.register_failure(ip).await;
            return Err(AuthError::InvalidCredentials);
        };
        if user.disabled {
            self.register_failure(ip).await;
            return Err(AuthError::AccountDisabled);
        }
        let Some(stored) = user.password_hash.as_deref() else {
            self.register_failure(ip).await;
            return Err(AuthError::InvalidCredentials);
        };

        match verify_password(password, stored) {
            PasswordCheck::Mismatch => {
                self.register_failure(ip).await;
                Err(AuthError::InvalidCredentials)
            }
            check => {
                if check == PasswordCheck::MatchNeedsMigration {
                    self.migrate_plaintext(&user, password).await;
                }
                self.limiter.record_success(ip);
                self.users.record_login(user.id).await?;
                self.open_session(&user).await
            }
        }
    }

    async fn migrate_plaintext(&self, user: &UserRecord, password: &str) {
        match hash_password(password, self.bcrypt_cost) {
            Ok(hashed) => {
                let update = UserUpdate {
                    password_hash: Some(Some(hashed)),
                    ..UserUpdate::default()
                };
                if let Err(err) = self.users.update(user.id, &update).await {
                    warn!(error = %err, user = %user.username, "plaintext migration failed");
                } else {
                    info!(user = %user.username, "migrated plaintext credential to bcrypt");
                }
            }
            Err(err) => {
                // The configured plaintext may not meet the policy; keep it
                // until the user sets a proper password.
                warn!(error = %err, user = %user.username, "plaintext credential not migrated");
            }
        }
    }

    async fn open_session(&self, user: &UserRecord) -> Result<LoginOutcome, AuthError> {
        let session = SessionRow {
            session_id: issue_session_id(),
            user_id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin,
            expires_at: Utc::now() + Duration::days(SESSION_TTL_DAYS),
        };
        self.sessions.create(&session).await?;
        let cookie_value = sign_session_id(&session.session_id, &self.secret);
        Ok(LoginOutcome {
            session,
            cookie_value,
        })
    }

    async fn register_failure(&self, ip: IpAddr) {
        match self.limiter.record_failure(ip) {
            FailureOutcome::Delay(seconds) => {
                tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;
            }
            FailureOutcome::Blocked(until) => {
                warn!(ip = %ip, until = %until, "ip blocked after repeated login failures");
            }
        }
    }

    /// Resolve a signed cookie value into an authenticated principal.
    ///
    /// With authentication disabled every caller is an administrator.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidSession`] for bad cookies, expired sessions, or
    /// users that vanished or got disabled since login.
    pub async fn validate_cookie(&self, cookie_value: &str) -> Result<AuthedUser, AuthError> {
        if !self.auth_enabled {
            return Ok(AuthedUser::auth_disabled());
        }
        let session_id = parse_signed_cookie(cookie_value, &self.secret)
            .ok_or(AuthError::InvalidSession)?;
        let session = self
            .sessions
            .get(&session_id)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        let user = self.users.by_id(session.user_id).await?;
        let Some(user) = user else {
            self.sessions.delete(&session_id).await?;
            return Err(AuthError::InvalidSession);
        };
        if user.disabled {
            self.sessions.delete(&session_id).await?;
            return Err(AuthError::InvalidSession);
        }
        Ok(authed_from_record(&user))
    }

    /// Verify HTTP Basic credentials for the compatibility surface: an admin
    /// password, or any username with an admin API key as the password.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] unless an admin matches.
    pub async fn verify_basic(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthedUser, AuthError> {
        if !self.auth_enabled {
            return Ok(AuthedUser::auth_disabled());
        }
        if let Some(user) = self.users.by_api_key(password).await? {
            if user.is_admin && !user.disabled {
                return Ok(authed_from_record(&user));
            }
        }
        if let Some(user) = self.users.by_username(username).await? {
            if user.is_admin && !user.disabled {
                if let Some(stored) = user.password_hash.as_deref() {
                    if verify_password(password, stored) != PasswordCheck::Mismatch {
                        return Ok(authed_from_record(&user));
                    }
                }
            }
        }
        Err(AuthError::InvalidCredentials)
    }

    /// Verify a bare API key (Torznab surface). Admin keys only.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] unless an admin key matches.
    pub async fn verify_api_key(&self, api_key: &str) -> Result<AuthedUser, AuthError> {
        if !self.auth_enabled {
            return Ok(AuthedUser::auth_disabled());
        }
        match self.users.by_api_key(api_key).await? {
            Some(user) if user.is_admin && !user.disabled => Ok(authed_from_record(&user)),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    /// Destroy a single session (logout).
    ///
    /// # Errors
    ///
    /// Fails when the session store is unreachable.
    pub async fn logout(&self, cookie_value: &str) -> Result<(), AuthError> {
        if let Some(session_id) = parse_signed_cookie(cookie_value, &self.secret) {
            self.sessions.delete(&session_id).await?;
        }
        Ok(())
    }

    /// Destroy every session of a user after a credential or capability
    /// change. Unless the change was a self-edit, live sockets bound to the
    /// user are notified for force-close.
    ///
    /// # Errors
    ///
    /// Fails when the session store is unreachable.
    pub async fn invalidate_user(&self, user_id: i64, self_edit: bool) -> Result<u64, AuthError> {
        let destroyed = self.sessions.delete_for_user(user_id).await?;
        if destroyed > 0 {
            info!(user_id, destroyed, "destroyed sessions after account change");
        }
        if !self_edit {
            let _ = self.invalidations.send(user_id);
        }
        Ok(destroyed)
    }
}

fn authed_from_record(user: &UserRecord) -> AuthedUser {
    AuthedUser {
        user_id: Some(user.id),
        username: user.username.clone(),
        is_admin: user.is_admin,
        capabilities: user
            .capabilities
            .iter()
            .filter_map(|label| Capability::parse(label))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerdeck_data::{open_memory_pool, NewUser};

    async fn manager(auth_enabled: bool) -> AuthManager {
        let users_pool = open_memory_pool().await.unwrap();
        let users = UserStore::new(users_pool).await.unwrap();
        let sessions = SessionStore::new(open_memory_pool().await.unwrap()).await.unwrap();
        AuthManager::new(users, sessions, "test-secret".to_string(), 4, auth_enabled)
    }

    fn ip() -> IpAddr {
        IpAddr::from([127, 0, 0, 1])
    }

    #[tokio::test]
    async fn login_and_validate_round_trip() {
        let manager = manager(true).await;
        manager.ensure_admin("admin", Some("s3cret!pw")).await.unwrap();

        let outcome = manager.login("admin", "s3cret!pw", ip()).await.unwrap();
        let principal = manager.validate_cookie(&outcome.cookie_value).await.unwrap();
        assert!(principal.is_admin);
        assert_eq!(principal.username, "admin");

        // The plaintext config credential migrated to bcrypt on login.
        let user = manager.users.by_username("admin").await.unwrap().unwrap();
        assert!(user.password_hash.unwrap().starts_with("$2"));
    }

    #[tokio::test]
    async fn bad_password_observes_delay_then_fails() {
        let manager = manager(true).await;
        manager.ensure_admin("admin", Some("s3cret!pw")).await.unwrap();
        let started = std::time::Instant::now();
        let err = manager.login("admin", "wrong", ip()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(started.elapsed() >= std::time::Duration::from_secs(1));
    }

    #[tokio::test]
    async fn invalidation_destroys_sessions_and_notifies() {
        let manager = manager(true).await;
        manager.ensure_admin("admin", Some("s3cret!pw")).await.unwrap();
        let outcome = manager.login("admin", "s3cret!pw", ip()).await.unwrap();

        let mut notices = manager.subscribe_invalidations();
        let destroyed = manager
            .invalidate_user(outcome.session.user_id, false)
            .await
            .unwrap();
        assert_eq!(destroyed, 1);
        assert_eq!(notices.recv().await.unwrap(), outcome.session.user_id);
        assert!(manager.validate_cookie(&outcome.cookie_value).await.is_err());
    }

    #[tokio::test]
    async fn auth_disabled_grants_admin_everywhere() {
        let manager = manager(false).await;
        let principal = manager.validate_cookie("garbage").await.unwrap();
        assert!(principal.is_admin);
        assert!(manager.verify_basic("anyone", "anything").await.is_ok());
        assert!(manager.verify_api_key("anything").await.is_ok());
    }

    #[tokio::test]
    async fn basic_auth_accepts_admin_api_key_as_password() {
        let manager = manager(true).await;
        let admin = manager
            .users
            .create(&NewUser {
                username: "root".to_string(),
                password_hash: None,
                is_admin: true,
                capabilities: Vec::new(),
            })
            .await
            .unwrap();
        manager
            .users
            .update(
                admin.id,
                &UserUpdate {
                    api_key: Some(Some("api-key-1".to_string())),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();

        assert!(manager.verify_basic("whatever", "api-key-1").await.is_ok());
        assert!(manager.verify_api_key("api-key-1").await.is_ok());
        assert!(manager.verify_api_key("nope").await.is_err());
    }
}
