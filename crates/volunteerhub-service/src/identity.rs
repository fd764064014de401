//! Identity bootstrap and credential verification.
//!
//! Bootstrap is idempotent on replay for the same email: the existing user
//! is returned and no duplicate Account is created. User and Account are
//! written in a single transaction.

use uuid::Uuid;
use volunteerhub_core::types::{CreateAccount, CreateUser};
use volunteerhub_core::{
    hash_password, verify_password, AggregateStore, Error, Provider, Result, StoreTransaction,
    User,
};

use crate::context::{with_tx_retry, ServiceContext};

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub name: String,
    pub password: String,
    pub image: Option<String>,
}

/// Identity asserted by an external OAuth provider. The transport layer has
/// already validated the provider response.
#[derive(Debug, Clone)]
pub struct ProviderLogin {
    pub provider: Provider,
    pub provider_id: String,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
}

/// Register a user with email credentials.
pub async fn register<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    input: RegisterInput,
) -> Result<User> {
    if input.email.is_empty() || input.name.is_empty() {
        return Err(Error::bad_request("Email and name are required"));
    }
    if input.password.is_empty() {
        return Err(Error::bad_request("Password is required"));
    }
    let password_hash = hash_password(&input.password)?;
    // The email doubles as the provider id for the EMAIL provider.
    bootstrap(
        ctx,
        Provider::Email,
        &input.email,
        &input.email,
        &input.name,
        input.image.as_deref(),
        &password_hash,
    )
    .await
}

/// Find-or-create a user from a provider-asserted identity.
///
/// Provider-managed users never log in with a password, so the credential
/// slot is filled with a random placeholder hash.
pub async fn login_or_create_account<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    login: ProviderLogin,
) -> Result<User> {
    if login.email.is_empty() || login.provider_id.is_empty() {
        return Err(Error::bad_request("Provider identity is incomplete"));
    }
    let password_hash = hash_password(&Uuid::new_v4().to_string())?;
    bootstrap(
        ctx,
        login.provider,
        &login.provider_id,
        &login.email,
        &login.name,
        login.image.as_deref(),
        &password_hash,
    )
    .await
}

async fn bootstrap<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    provider: Provider,
    provider_id: &str,
    email: &str,
    name: &str,
    image: Option<&str>,
    password_hash: &str,
) -> Result<User> {
    with_tx_retry(ctx.config(), "bootstrap_identity", || {
        try_bootstrap(ctx, provider, provider_id, email, name, image, password_hash)
    })
    .await
}

async fn try_bootstrap<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    provider: Provider,
    provider_id: &str,
    email: &str,
    name: &str,
    image: Option<&str>,
    password_hash: &str,
) -> Result<User> {
    let mut tx = ctx.store().begin().await?;

    if let Some(existing) = tx.find_user_by_email(email).await? {
        tx.abort().await?;
        tracing::debug!(user_id = %existing.id, "bootstrap replay, returning existing user");
        return Ok(existing);
    }

    let user = tx
        .insert_user(CreateUser {
            email: email.to_string(),
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            image: image.map(|s| s.to_string()),
        })
        .await?;
    tx.insert_account(CreateAccount {
        provider,
        provider_id: provider_id.to_string(),
        user_id: user.id.clone(),
    })
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, %provider, "created user and account");
    Ok(user)
}

/// Verify email credentials. `NotFound` if no EMAIL account exists for the
/// address, `Unauthorized` on password mismatch. No side effects.
pub async fn verify_credentials<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    email: &str,
    password: &str,
) -> Result<User> {
    let account = ctx
        .store()
        .get_account(Provider::Email, email)
        .await?
        .ok_or_else(|| Error::not_found("No account exists for this email"))?;
    let user = ctx
        .store()
        .get_user(&account.user_id)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;

    match verify_password(password, &user.password_hash) {
        Ok(()) => Ok(user),
        Err(Error::InvalidCredentials) => {
            Err(Error::unauthorized("Invalid email or password"))
        }
        Err(other) => Err(other),
    }
}
