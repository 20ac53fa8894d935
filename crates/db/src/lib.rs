pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_url, DbPool};
pub use repositories::{
    DecisionRepository, InMemoryDecisionRepository, InMemoryMessageRepository, MessageRepository,
    RepositoryError, SqlDecisionRepository, SqlMessageRepository, StoredMessage,
};
