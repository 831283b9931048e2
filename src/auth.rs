//! OAuth2 installed-app flow for the Drive metadata scope.
//!
//! Client secrets are read from `client_secret.json` in the working
//! directory. A token is cached under `~/.credentials/` and refreshed on
//! later runs; the first run prints a consent URL and reads the
//! authorization code from stdin.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::PathBuf;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
const SCOPE: &str = "https://www.googleapis.com/auth/drive.metadata.readonly";

const TOKEN_FILE: &str = "drive-audit.json";

#[derive(Debug, Deserialize)]
pub struct ClientSecret {
    pub installed: InstalledSecret,
}

#[derive(Debug, Deserialize)]
pub struct InstalledSecret {
    pub client_id: String,
    pub client_secret: String,
}

/// Token as cached on disk and as returned by the token endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

pub fn load_client_secret(path: &str) -> Result<ClientSecret> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {} (download it from the API console)", path))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path))
}

fn token_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".credentials").join(TOKEN_FILE))
}

fn store_token(token: &Token) -> Result<()> {
    let path = token_path()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(token)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    eprintln!("Token stored to {}", path.display());
    Ok(())
}

fn token_request(client: &Client, params: &[(&str, &str)]) -> Result<Token> {
    let response = client
        .post(TOKEN_URL)
        .form(params)
        .send()
        .context("token request failed")?;
    if !response.status().is_success() {
        anyhow::bail!("token endpoint returned {}", response.status());
    }
    response.json().context("failed to parse token response")
}

fn refresh(client: &Client, secret: &InstalledSecret, refresh_token: &str) -> Result<Token> {
    let token = token_request(
        client,
        &[
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ],
    )?;
    // The refresh response omits the refresh token; keep the one we have.
    Ok(Token {
        access_token: token.access_token,
        refresh_token: Some(refresh_token.to_string()),
    })
}

fn consent_url(secret: &InstalledSecret) -> Result<String> {
    let url = reqwest::Url::parse_with_params(
        AUTH_URL,
        &[
            ("client_id", secret.client_id.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("response_type", "code"),
            ("scope", SCOPE),
            ("access_type", "offline"),
        ],
    )?;
    Ok(url.into())
}

fn new_token(client: &Client, secret: &InstalledSecret) -> Result<Token> {
    eprintln!("Authorize this app by visiting this url:");
    eprintln!("{}", consent_url(secret)?);
    eprint!("Enter the code from that page here: ");
    std::io::stderr().flush()?;

    let mut code = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut code)
        .context("failed to read authorization code")?;

    let token = token_request(
        client,
        &[
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("code", code.trim()),
            ("redirect_uri", REDIRECT_URI),
            ("grant_type", "authorization_code"),
        ],
    )?;
    store_token(&token)?;
    Ok(token)
}

/// Produce a usable access token: cached-and-refreshed when possible,
/// interactive consent otherwise.
pub fn authorize(client: &Client, secret: &InstalledSecret) -> Result<String> {
    let cached = token_path()
        .ok()
        .and_then(|p| std::fs::read_to_string(p).ok())
        .and_then(|content| serde_json::from_str::<Token>(&content).ok());

    let token = match cached {
        Some(Token {
            refresh_token: Some(ref refresh_token),
            ..
        }) => refresh(client, secret, refresh_token)?,
        Some(token) => token,
        None => new_token(client, secret)?,
    };

    Ok(token.access_token)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_secret_parsing() {
        let json = r#"{
            "installed": {
                "client_id": "id.apps.googleusercontent.com",
                "client_secret": "shhh",
                "redirect_uris": ["urn:ietf:wg:oauth:2.0:oob"]
            }
        }"#;
        let secret: ClientSecret = serde_json::from_str(json).unwrap();
        assert_eq!(secret.installed.client_id, "id.apps.googleusercontent.com");
        assert_eq!(secret.installed.client_secret, "shhh");
    }

    #[test]
    fn test_token_roundtrip_without_refresh_token() {
        let token: Token = serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(token.access_token, "abc");
        assert!(token.refresh_token.is_none());
        let json = serde_json::to_string(&token).unwrap();
        assert!(!json.contains("refresh_token"));
    }

    #[test]
    fn test_consent_url_carries_scope_and_client() {
        let secret = InstalledSecret {
            client_id: "my-client".to_string(),
            client_secret: "shhh".to_string(),
        };
        let url = consent_url(&secret).unwrap();
        assert!(url.starts_with(AUTH_URL));
        assert!(url.contains("client_id=my-client"));
        assert!(url.contains("drive.metadata.readonly"));
        assert!(!url.contains("shhh"));
    }
}
