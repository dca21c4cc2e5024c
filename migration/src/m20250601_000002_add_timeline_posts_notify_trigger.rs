use events::TIMELINE_POSTS_CHANNEL;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(&trigger_function_sql())
            .await?;

        manager
            .get_connection()
            .execute_unprepared("DROP TRIGGER IF EXISTS timeline_posts_notify ON posts")
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE TRIGGER timeline_posts_notify
                 AFTER INSERT ON posts
                 FOR EACH ROW EXECUTE FUNCTION notify_timeline_posts()",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TRIGGER IF EXISTS timeline_posts_notify ON posts")
            .await?;

        manager
            .get_connection()
            .execute_unprepared("DROP FUNCTION IF EXISTS notify_timeline_posts()")
            .await?;

        Ok(())
    }
}

/// Publishes every inserted post on [`TIMELINE_POSTS_CHANNEL`]. The timestamp
/// goes out as fractional epoch seconds.
fn trigger_function_sql() -> String {
    format!(
        r#"
            CREATE OR REPLACE FUNCTION notify_timeline_posts()
            RETURNS TRIGGER AS $$
            BEGIN
                PERFORM pg_notify('{TIMELINE_POSTS_CHANNEL}',
                    json_build_object(
                        'timestamp', EXTRACT(EPOCH FROM NEW.timestamp),
                        'operation', TG_OP,
                        'table', TG_TABLE_NAME,
                        'post_id', NEW.id,
                        'agent_id', NEW.agent_id,
                        'content', NEW.content
                    )::text
                );
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql
        "#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_publishes_on_the_listened_channel() {
        let sql = trigger_function_sql();

        assert!(sql.contains("pg_notify('timeline_posts',"));
        assert!(sql.contains(&format!("pg_notify('{TIMELINE_POSTS_CHANNEL}',")));
    }
}
