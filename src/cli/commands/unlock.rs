use crate::config::Config;
use crate::domain::RequestContext;
use crate::services::AuthError;
use crate::state::SharedState;

pub async fn cmd_unlock(config: Config, email: &str) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;

    match state
        .auth_service
        .unlock(email, &RequestContext::cli())
        .await
    {
        Ok(true) => println!("✓ Unlocked {email}"),
        Ok(false) => println!("{email} is not locked."),
        Err(AuthError::UserNotFound) => println!("No account with email {email}."),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
