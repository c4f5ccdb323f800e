use crate::client::{Client, ClientResolver};
use crate::query::Repository;
use std::fmt;
use std::sync::Arc;

pub type RepositoryFactory = Arc<dyn Fn(&str) -> Repository + Send + Sync>;

/// Where entity operations get their repository from.
///
/// The variant is chosen once by the caller; swapping the source changes the
/// backend without touching any call site.
#[derive(Clone)]
pub enum RepositorySource {
    /// A ready repository, used as-is for every call.
    Instance(Repository),
    /// Builds a repository for the configured table on every call.
    Factory(RepositoryFactory),
    /// Resolves the client on every call and binds it to the configured table.
    Config(ClientResolver),
}

impl RepositorySource {
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&str) -> Repository + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(factory))
    }

    /// Repository for `table` (ignored by [`RepositorySource::Instance`]).
    pub fn resolve(&self, table: &str) -> Repository {
        match self {
            Self::Instance(repository) => repository.clone(),
            Self::Factory(factory) => factory(table),
            Self::Config(resolver) => resolver.repository(table),
        }
    }
}

impl From<Repository> for RepositorySource {
    fn from(repository: Repository) -> Self {
        Self::Instance(repository)
    }
}

impl From<ClientResolver> for RepositorySource {
    fn from(resolver: ClientResolver) -> Self {
        Self::Config(resolver)
    }
}

impl From<Client> for RepositorySource {
    fn from(client: Client) -> Self {
        Self::Config(ClientResolver::fixed(client))
    }
}

impl fmt::Debug for RepositorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(repository) => f
                .debug_tuple("Instance")
                .field(&repository.table())
                .finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
            Self::Config(resolver) => f.debug_tuple("Config").field(&resolver.mode()).finish(),
        }
    }
}
