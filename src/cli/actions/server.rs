use crate::{
    api,
    api::handlers::auth::AuthConfig,
    cli::{actions::Action, globals::GlobalArgs},
    directory::{ldap::LdapDirectory, DirectorySettings},
};
use anyhow::Result;
use std::sync::Arc;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port, dsn } => {
            let auth_config = AuthConfig::new(globals.frontend_base_url.clone())
                .with_session_ttl_seconds(globals.session_ttl_minutes * 60);

            let directory = Arc::new(LdapDirectory::new(DirectorySettings::from_globals(globals)));

            api::new(port, dsn, auth_config, directory).await?;
        }
    }

    Ok(())
}
