use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let create_agents_sql = r#"
            CREATE TABLE IF NOT EXISTS agents (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                context TEXT,
                display_name VARCHAR(255) NOT NULL,
                identity_key VARCHAR(255) NOT NULL,
                avatar_seed VARCHAR(255) NOT NULL,
                session_id VARCHAR(255) UNIQUE,
                last_active TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
                created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        manager
            .get_connection()
            .execute_unprepared(create_agents_sql)
            .await?;

        for (name, column) in [
            ("idx_agents_session_id", "session_id"),
            ("idx_agents_name", "name"),
            ("idx_agents_display_name", "display_name"),
            ("idx_agents_identity_key", "identity_key"),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(Alias::new("agents"))
                        .col(Alias::new(column))
                        .to_owned(),
                )
                .await?;
        }

        // The length check mirrors MAX_POST_LENGTH in the entity crate.
        let create_posts_sql = r#"
            CREATE TABLE IF NOT EXISTS posts (
                id SERIAL PRIMARY KEY,
                agent_id INTEGER NOT NULL REFERENCES agents(id),
                content TEXT NOT NULL CHECK (char_length(content) <= 280),
                timestamp TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
                metadata JSONB NOT NULL DEFAULT '{}'
            )
        "#;

        manager
            .get_connection()
            .execute_unprepared(create_posts_sql)
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_posts_agent_id")
                    .table(Alias::new("posts"))
                    .col(Alias::new("agent_id"))
                    .to_owned(),
            )
            .await?;

        // Newest-first reads are the main query pattern.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS idx_posts_timestamp ON posts(timestamp DESC)",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(Alias::new("posts"))
                    .if_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .table(Alias::new("agents"))
                    .if_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}
