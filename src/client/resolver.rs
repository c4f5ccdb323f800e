use super::{Client, ClientConfig, ClientMode};
use crate::backend::Backend;
use crate::query::Repository;
use std::sync::Arc;

/// Chooses between the production handle and the shared test double.
///
/// The mode is fixed when the resolver is built (normally from
/// [`ClientConfig::from_env`]); [`ClientResolver::resolve`] only reads it.
#[derive(Clone, Debug)]
pub struct ClientResolver {
    mode: ClientMode,
    production: Client,
    test_double: Option<Client>,
}

impl ClientResolver {
    /// The production handle always runs in production mode; test-mode
    /// session handling only applies to a registered test double.
    pub fn new(config: &ClientConfig, production: Arc<dyn Backend>) -> Self {
        let production_config = config.clone().mode(ClientMode::Production);
        Self {
            mode: config.mode,
            production: Client::new(production, &production_config),
            test_double: None,
        }
    }

    /// Registers the test double used when the resolver runs in test mode.
    pub fn with_test_double(mut self, backend: Arc<dyn Backend>, config: &ClientConfig) -> Self {
        let config = config.clone().mode(ClientMode::Test);
        self.test_double = Some(Client::new(backend, &config));
        self
    }

    /// Resolver that always hands out `client`.
    pub fn fixed(client: Client) -> Self {
        Self {
            mode: client.mode(),
            production: client,
            test_double: None,
        }
    }

    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    /// Client to use for the current call.
    ///
    /// In test mode without a registered double this is the production
    /// handle, still in production mode.
    pub fn resolve(&self) -> Client {
        match (&self.mode, &self.test_double) {
            (ClientMode::Test, Some(double)) => double.clone(),
            _ => self.production.clone(),
        }
    }

    pub fn repository(&self, table: impl Into<String>) -> Repository {
        self.resolve().from_table(table)
    }
}

impl From<Client> for ClientResolver {
    fn from(client: Client) -> Self {
        Self::fixed(client)
    }
}
