pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_agents_and_posts;
mod m20250601_000002_add_timeline_posts_notify_trigger;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_agents_and_posts::Migration),
            Box::new(m20250601_000002_add_timeline_posts_notify_trigger::Migration),
        ]
    }
}
