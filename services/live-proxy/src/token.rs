//! Bearer token acquisition for upstream connections.

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{program}' exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("'{0}' did not print a token")]
    Empty(String),
}

/// Defines the contract for anything that can hand out an access token.
///
/// A fresh token is requested for every relayed connection.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<SecretString, TokenError>;
}

/// A fixed token, typically from the environment.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<SecretString, TokenError> {
        Ok(SecretString::from(self.0.clone()))
    }
}

/// Asks the Google Cloud CLI for the active account's token
/// (`gcloud auth print-access-token`).
pub struct GcloudToken {
    program: String,
}

impl GcloudToken {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl TokenSource for GcloudToken {
    async fn access_token(&self) -> Result<SecretString, TokenError> {
        tracing::info!(program = %self.program, "Generating access token...");
        let output = Command::new(&self.program)
            .args(["auth", "print-access-token"])
            .output()
            .await
            .map_err(|source| TokenError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TokenError::CommandFailed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(TokenError::Empty(self.program.clone()));
        }
        tracing::info!("Access token generated.");
        Ok(SecretString::from(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn test_static_token() {
        let token = StaticToken::new("abc").access_token().await.unwrap();
        assert_eq!(token.expose_secret(), "abc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output_is_trimmed() {
        // `echo` stands in for gcloud and prints its arguments back.
        let token = GcloudToken::new("echo").access_token().await.unwrap();
        assert_eq!(token.expose_secret(), "auth print-access-token");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command() {
        let err = GcloudToken::new("false").access_token().await.unwrap_err();
        assert!(matches!(err, TokenError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = GcloudToken::new("definitely-not-a-real-gcloud-binary")
            .access_token()
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Spawn { .. }));
        assert!(err.to_string().contains("definitely-not-a-real-gcloud-binary"));
    }
}
