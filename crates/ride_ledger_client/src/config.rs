use crate::ProviderError;
use secrecy::SecretString;

pub const DEFAULT_BASE_URL: &str = "https://api.onepeloton.com";

#[derive(Clone, Debug)]
pub struct Config {
    pub session_id: SecretString,
    pub user_id: String,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Reads configuration values through `get` so tests never touch the
    /// process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, ProviderError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let session = get("RIDE_LEDGER_SESSION_ID")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Config("RIDE_LEDGER_SESSION_ID missing".into()))?;
        let user_id = get("RIDE_LEDGER_USER_ID")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Config("RIDE_LEDGER_USER_ID missing".into()))?;
        let base_url = get("RIDE_LEDGER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        Ok(Self {
            session_id: SecretString::new(session.into()),
            user_id,
            base_url,
        })
    }
}
