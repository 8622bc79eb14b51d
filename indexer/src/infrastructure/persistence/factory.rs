use sea_orm::DatabaseConnection;

use crate::infrastructure::persistence::connection::DbPool;
use crate::infrastructure::persistence::repositories::{
    BlockRepository, ChainRepository, DenomRepository, EpochRepository, FailedBlockRepository,
    Repositories,
};

/// Factory for creating repositories
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create all repositories over one shared connection pool
    pub fn create_repositories(db_pool: &DbPool) -> Repositories {
        let conn = db_pool.get_connection().clone();

        Repositories::new(
            Self::create_chain_repository(conn.clone()),
            Self::create_block_repository(conn.clone()),
            Self::create_failed_block_repository(conn.clone()),
            Self::create_denom_repository(conn.clone()),
            Self::create_epoch_repository(conn),
        )
    }

    pub fn create_chain_repository(conn: DatabaseConnection) -> ChainRepository {
        ChainRepository::new(conn)
    }

    pub fn create_block_repository(conn: DatabaseConnection) -> BlockRepository {
        BlockRepository::new(conn)
    }

    pub fn create_failed_block_repository(conn: DatabaseConnection) -> FailedBlockRepository {
        FailedBlockRepository::new(conn)
    }

    pub fn create_denom_repository(conn: DatabaseConnection) -> DenomRepository {
        DenomRepository::new(conn)
    }

    pub fn create_epoch_repository(conn: DatabaseConnection) -> EpochRepository {
        EpochRepository::new(conn)
    }
}
