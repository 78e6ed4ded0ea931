//! Configuration types and CLI/environment parsing for the transcription gateway.
//!
//! Can be configured via environment variables or command line arguments using `clap`.

use std::{collections::HashMap, time::Duration};

use clap::Parser;
use gateway_types::UserId;

/// The configuration for the transcription gateway.
#[derive(Parser, Debug, Clone)]
pub struct GatewayConfig {
    /// The port the gateway listens on.
    #[clap(long, env = "GATEWAY_PORT", default_value = "3000")]
    pub port: u16,

    /// Maximum number of transcription tasks in flight across all users at once.
    #[clap(long, env = "GATEWAY_MAX_CONCURRENT", default_value = "5")]
    pub max_concurrent: usize,

    /// Hard deadline for a single transcription task.
    #[clap(
        long,
        env = "GATEWAY_PER_TASK_TIMEOUT",
        default_value = "60s",
        value_parser = humantime::parse_duration
    )]
    pub per_task_timeout: Duration,

    /// Reference transcriber cost constant: bytes per "word" of audio.
    #[clap(long, env = "GATEWAY_BYTES_PER_WORD", default_value = "16000")]
    pub bytes_per_word: u64,

    /// Reference transcriber cost constant: milliseconds charged per "word" of audio.
    #[clap(long, env = "GATEWAY_MS_PER_WORD", default_value = "250")]
    pub ms_per_word: u64,

    /// Default transcription-millisecond budget for a user seen for the first time.
    #[clap(long, env = "GATEWAY_INITIAL_BUDGET_MS", default_value = "1000")]
    pub initial_budget_ms: u64,

    /// Static bearer-token table: `token=user,token=user,...`.
    ///
    /// Not a production secret store; stands in for whatever credential backend a concrete
    /// deployment plugs into the `AuthResolver` seam.
    #[clap(long, env = "GATEWAY_AUTH_TOKENS", value_parser = parse_auth_tokens)]
    pub auth_tokens: HashMap<String, UserId>,
}

/// Parses a `token=user,token=user` list into a token → [`UserId`] table.
fn parse_auth_tokens(raw: &str) -> Result<HashMap<String, UserId>, String> {
    raw.split(',')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (token, user) = pair
                .split_once('=')
                .ok_or_else(|| format!("invalid token entry (expected token=user): {pair}"))?;
            if token.is_empty() {
                return Err(format!("empty token in entry: {pair}"));
            }
            Ok((token.to_owned(), UserId::new(user)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_entries() {
        let tokens = parse_auth_tokens("a=user-a,b=user-b").unwrap();
        assert_eq!(tokens.get("a"), Some(&UserId::new("user-a")));
        assert_eq!(tokens.get("b"), Some(&UserId::new("user-b")));
    }

    #[test]
    fn rejects_entry_without_equals() {
        assert!(parse_auth_tokens("a").is_err());
    }

    #[test]
    fn rejects_empty_token() {
        assert!(parse_auth_tokens("=user-a").is_err());
    }
}
