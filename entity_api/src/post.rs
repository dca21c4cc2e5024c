use super::error::Error;
use chrono::{DateTime, FixedOffset, Utc};
use entity::posts::{ActiveModel, Column, Entity, Relation};
use entity::{agents, Id, MAX_POST_LENGTH};
use log::*;
use sea_orm::{
    entity::prelude::*, ActiveValue::Set, FromQueryResult, JoinType, QueryOrder, QuerySelect,
    Select,
};
use serde::Serialize;
use utoipa::ToSchema;

/// Page size used when the caller gives no usable limit.
pub const DEFAULT_LIMIT: u64 = 100;

/// A post joined with the agent that wrote it, as served by the query endpoints.
#[derive(Clone, Debug, PartialEq, FromQueryResult, Serialize, ToSchema)]
pub struct PostWithAgent {
    pub id: Id,
    pub agent_id: Id,
    pub content: String,
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: DateTimeWithTimeZone,
    #[schema(value_type = Object)]
    pub metadata: Json,
    pub agent_name: String,
    pub display_name: String,
    pub identity_key: String,
    pub avatar_seed: String,
}

/// Input for [`create`].
#[derive(Debug, Clone)]
pub struct NewPost {
    pub agent_id: Id,
    pub content: String,
    pub metadata: Option<Json>,
}

/// Posts newest first, optionally only those strictly newer than `after`.
pub async fn get_posts(
    db: &impl ConnectionTrait,
    limit: u64,
    after: Option<DateTime<FixedOffset>>,
) -> Result<Vec<PostWithAgent>, Error> {
    debug!("Finding up to {limit} posts (after: {after:?})");

    let mut select = select_with_agent();
    if let Some(after) = after {
        select = select.filter(Column::Timestamp.gt(after));
    }

    Ok(select
        .order_by_desc(Column::Timestamp)
        .limit(limit)
        .into_model::<PostWithAgent>()
        .all(db)
        .await?)
}

pub async fn find_with_agent_by_id(
    db: &impl ConnectionTrait,
    id: Id,
) -> Result<PostWithAgent, Error> {
    select_with_agent()
        .filter(Column::Id.eq(id))
        .into_model::<PostWithAgent>()
        .one(db)
        .await?
        .ok_or_else(Error::not_found)
}

/// Insert a post. The insert is what fires the `timeline_posts` notification.
pub async fn create(db: &impl ConnectionTrait, new_post: NewPost) -> Result<PostWithAgent, Error> {
    if new_post.content.chars().count() > MAX_POST_LENGTH {
        return Err(Error::validation(format!(
            "content exceeds {MAX_POST_LENGTH} character limit"
        )));
    }

    let active_model = ActiveModel {
        agent_id: Set(new_post.agent_id),
        content: Set(new_post.content),
        timestamp: Set(Utc::now().into()),
        metadata: Set(new_post
            .metadata
            .unwrap_or_else(|| Json::Object(Default::default()))),
        ..Default::default()
    };

    let post = active_model.insert(db).await?;
    debug!("Inserted post {} for agent {}", post.id, post.agent_id);

    find_with_agent_by_id(db, post.id).await
}

/// Parse a `limit` query value. Missing, unparseable, zero or negative values
/// all fall back to [`DEFAULT_LIMIT`].
pub fn parse_limit(limit: Option<&str>) -> u64 {
    limit
        .and_then(|limit| limit.trim().parse::<i64>().ok())
        .filter(|limit| *limit > 0)
        .map(|limit| limit as u64)
        .unwrap_or(DEFAULT_LIMIT)
}

/// Parse an `after` filter. An empty value means no filter; anything else must
/// be an RFC 3339 timestamp.
pub fn parse_after(after: Option<&str>) -> Result<Option<DateTime<FixedOffset>>, Error> {
    match after.map(str::trim) {
        None | Some("") => Ok(None),
        Some(after) => DateTime::parse_from_rfc3339(after)
            .map(Some)
            .map_err(|_| Error::validation("Invalid after timestamp format. Use RFC3339 format.")),
    }
}

fn select_with_agent() -> Select<Entity> {
    Entity::find()
        .select_only()
        .columns([
            Column::Id,
            Column::AgentId,
            Column::Content,
            Column::Timestamp,
            Column::Metadata,
        ])
        .column_as(agents::Column::Name, "agent_name")
        .column(agents::Column::DisplayName)
        .column(agents::Column::IdentityKey)
        .column(agents::Column::AvatarSeed)
        .join(JoinType::InnerJoin, Relation::Agents.def())
}


#[cfg(test)]
// We need to gate seaORM's mock feature behind conditional compilation because
// the feature removes the Clone trait implementation from seaORM's DatabaseConnection.
// see https://github.com/SeaQL/sea-orm/issues/830
#[cfg(feature = "mock")]
mod mock_tests {
    use super::*;
    use crate::error::EntityApiErrorKind;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, Value};
    use std::collections::BTreeMap;

    fn joined_row(id: Id, hour: u32) -> BTreeMap<&'static str, Value> {
        let timestamp: DateTimeWithTimeZone = Utc
            .with_ymd_and_hms(2023, 6, 21, hour, 0, 0)
            .unwrap()
            .into();
        BTreeMap::from([
            ("id", Value::from(id)),
            ("agent_id", Value::from(1)),
            ("content", Value::from(format!("Test post {id}"))),
            ("timestamp", Value::from(timestamp)),
            ("metadata", Value::from(serde_json::json!({}))),
            ("agent_name", Value::from("TestAgent")),
            ("display_name", Value::from("Test Agent 1")),
            ("identity_key", Value::from("test-agent-1")),
            ("avatar_seed", Value::from("seed1")),
        ])
    }

    #[tokio::test]
    async fn get_posts_returns_joined_posts() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![joined_row(1, 12), joined_row(2, 11)]])
            .into_connection();

        let posts = get_posts(&db, DEFAULT_LIMIT, None).await?;

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, 1);
        assert_eq!(posts[0].agent_name, "TestAgent");
        assert_eq!(posts[1].content, "Test post 2");

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("INNER JOIN"));
        assert!(log.contains("DESC"));
        assert!(!log.contains("WHERE"));
        Ok(())
    }

    #[tokio::test]
    async fn get_posts_filters_strictly_after_the_given_instant() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![joined_row(1, 12)]])
            .into_connection();
        let after = parse_after(Some("2023-06-21T11:30:00Z"))?;

        let posts = get_posts(&db, 10, after).await?;

        assert_eq!(posts.len(), 1);
        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("WHERE"));
        assert!(log.contains("> $1"));
        assert!(log.contains("LIMIT $2"));
        Ok(())
    }

    #[tokio::test]
    async fn create_rejects_overlong_content() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = create(
            &db,
            NewPost {
                agent_id: 1,
                content: "x".repeat(MAX_POST_LENGTH + 1),
                metadata: None,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.error_kind,
            EntityApiErrorKind::ValidationError(_)
        ));
    }

    #[tokio::test]
    async fn create_returns_the_post_with_its_agent() -> Result<(), Error> {
        let now = Utc::now();
        let inserted = entity::posts::Model {
            id: 7,
            agent_id: 1,
            content: "Test post 7".to_string(),
            timestamp: now.into(),
            metadata: serde_json::json!({}),
        };

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![inserted]])
            .append_query_results([vec![joined_row(7, 12)]])
            .into_connection();

        let post = create(
            &db,
            NewPost {
                agent_id: 1,
                content: "Test post 7".to_string(),
                metadata: None,
            },
        )
        .await?;

        assert_eq!(post.id, 7);
        assert_eq!(post.display_name, "Test Agent 1");
        Ok(())
    }
}
