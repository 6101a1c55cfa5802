//! OAuth2 installed-flow authentication for the Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::path::Path;
use tracing::{debug, info};
use yup_oauth2::ApplicationSecret;

use crate::error::{GmailError, Result};

/// Read, label and trash access; never permanent deletion
pub const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

pub const CLIENT_ID_VAR: &str = "GMAIL_SWEEPER_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "GMAIL_SWEEPER_CLIENT_SECRET";
pub const REDIRECT_URI_VAR: &str = "GMAIL_SWEEPER_REDIRECT_URI";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Build an authenticated Gmail hub
///
/// The client secret is read from `credentials_path` when that file exists,
/// otherwise from the `GMAIL_SWEEPER_*` environment variables. The first run
/// opens a browser for consent; the resulting token is cached at
/// `token_cache_path` and refreshed by yup-oauth2 afterwards.
pub async fn initialize_gmail_hub(credentials_path: &Path, token_cache_path: &Path) -> Result<GmailHub> {
    let secret = read_secret(credentials_path).await?;

    if let Some(parent) = token_cache_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| GmailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Obtain the token up front so concurrent requests never race the consent flow
    auth.token(&[MODIFY_SCOPE])
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }
    info!("Authenticated with Gmail");

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| GmailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

async fn read_secret(credentials_path: &Path) -> Result<ApplicationSecret> {
    if credentials_path.exists() {
        debug!("Reading client secret from {:?}", credentials_path);
        return yup_oauth2::read_application_secret(credentials_path)
            .await
            .map_err(|e| GmailError::AuthError(format!("Failed to read credentials: {}", e)));
    }

    debug!("{:?} not found, reading client secret from environment", credentials_path);
    load_credentials_from_env().map_err(|e| {
        GmailError::AuthError(format!(
            "No credentials file at {:?} and {}",
            credentials_path, e
        ))
    })
}

/// Build a client secret from `GMAIL_SWEEPER_CLIENT_ID`,
/// `GMAIL_SWEEPER_CLIENT_SECRET` and the optional
/// `GMAIL_SWEEPER_REDIRECT_URI` (default `http://localhost:8080`)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var(CLIENT_ID_VAR)
        .map_err(|_| GmailError::ConfigError(format!("{} not set", CLIENT_ID_VAR)))?;
    let client_secret = env::var(CLIENT_SECRET_VAR)
        .map_err(|_| GmailError::ConfigError(format!("{} not set", CLIENT_SECRET_VAR)))?;
    let redirect_uri =
        env::var(REDIRECT_URI_VAR).unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Restrict the token cache to its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    // ACLs on Windows already scope the user profile
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_read_secret_from_file() {
        let credentials_json = r#"{
            "installed": {
                "client_id": "file-client-id",
                "project_id": "sweeper",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "file-secret",
                "redirect_uris": ["http://localhost"]
            }
        }"#;

        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), credentials_json)
            .await
            .unwrap();

        let secret = read_secret(temp_file.path()).await.unwrap();
        assert_eq!(secret.client_id, "file-client-id");
        assert_eq!(secret.client_secret, "file-secret");
    }

    #[tokio::test]
    async fn test_secure_token_file() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "token").await.unwrap();

        secure_token_file(temp_file.path()).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = tokio::fs::metadata(temp_file.path()).await.unwrap();
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }
    }

    // Single test so the process-wide variables are not raced by another test
    #[test]
    fn test_load_credentials_from_env() {
        env::set_var(CLIENT_ID_VAR, "env-id");
        env::set_var(CLIENT_SECRET_VAR, "env-secret");
        env::set_var(REDIRECT_URI_VAR, "http://localhost:9999");

        let secret = load_credentials_from_env().unwrap();
        assert_eq!(secret.client_id, "env-id");
        assert_eq!(secret.client_secret, "env-secret");
        assert_eq!(secret.redirect_uris[0], "http://localhost:9999");

        env::remove_var(REDIRECT_URI_VAR);
        let secret = load_credentials_from_env().unwrap();
        assert_eq!(secret.redirect_uris[0], "http://localhost:8080");

        env::remove_var(CLIENT_ID_VAR);
        env::remove_var(CLIENT_SECRET_VAR);
        assert!(matches!(
            load_credentials_from_env(),
            Err(GmailError::ConfigError(_))
        ));
    }
}
