use secrecy::{ExposeSecret, SecretString};

/// Environment variable holding the metering account user name
pub const USERNAME_ENV: &str = "SPOTLEDGER_USERNAME";
/// Environment variable holding the metering account password
pub const PASSWORD_ENV: &str = "SPOTLEDGER_PASSWORD";

/// Login for the consumption provider
#[derive(Debug)]
pub struct Credential {
    pub username: String,
    pub secret: SecretString,
}

impl Credential {
    pub fn new<U: Into<String>, S: Into<String>>(username: U, secret: S) -> Self {
        Self {
            username: username.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    pub fn expose_secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

/// Source of the stored credential; `None` when the user never entered one
pub trait CredentialProvider: Send + Sync {
    fn get_credential(&self) -> Option<Credential>;
}

/// Reads `SPOTLEDGER_USERNAME` / `SPOTLEDGER_PASSWORD`
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialProvider;

impl CredentialProvider for EnvCredentialProvider {
    fn get_credential(&self) -> Option<Credential> {
        let username = std::env::var(USERNAME_ENV).ok()?;
        let secret = std::env::var(PASSWORD_ENV).ok()?;
        if username.trim().is_empty() || secret.is_empty() {
            return None;
        }
        Some(Credential::new(username.trim(), secret))
    }
}

/// Fixed credential, mostly for tests and embedding
#[derive(Debug)]
pub struct StaticCredentialProvider {
    credential: Option<(String, SecretString)>,
}

impl StaticCredentialProvider {
    pub fn new<U: Into<String>, S: Into<String>>(username: U, secret: S) -> Self {
        Self {
            credential: Some((username.into(), SecretString::from(secret.into()))),
        }
    }

    pub fn absent() -> Self {
        Self { credential: None }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn get_credential(&self) -> Option<Credential> {
        self.credential
            .as_ref()
            .map(|(user, secret)| Credential::new(user.clone(), secret.expose_secret()))
    }
}
