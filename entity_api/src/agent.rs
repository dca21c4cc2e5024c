use super::error::Error;
use chrono::Utc;
use entity::agents::{ActiveModel, Column, Entity, Model};
use log::*;
use sea_orm::{entity::prelude::*, sea_query::Expr, ActiveValue::Set};

/// Input for [`create`].
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub name: String,
    pub context: Option<String>,
    pub display_name: String,
    pub identity_key: String,
    pub avatar_seed: String,
    pub session_id: String,
}

pub async fn create(db: &impl ConnectionTrait, new_agent: NewAgent) -> Result<Model, Error> {
    debug!("New Agent to be inserted: {:?}", new_agent);

    let now = Utc::now();

    let active_model = ActiveModel {
        name: Set(new_agent.name),
        context: Set(new_agent.context),
        display_name: Set(new_agent.display_name),
        identity_key: Set(new_agent.identity_key),
        avatar_seed: Set(new_agent.avatar_seed),
        session_id: Set(Some(new_agent.session_id)),
        last_active: Set(now.into()),
        created_at: Set(now.into()),
        ..Default::default()
    };

    Ok(active_model.insert(db).await?)
}

pub async fn find_by_session_id(
    db: &impl ConnectionTrait,
    session_id: &str,
) -> Result<Option<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::SessionId.eq(session_id))
        .one(db)
        .await?)
}

/// Bump `last_active` for the agent holding `session_id`.
pub async fn touch_last_active(db: &impl ConnectionTrait, session_id: &str) -> Result<(), Error> {
    let result = Entity::update_many()
        .col_expr(Column::LastActive, Expr::value(Utc::now()))
        .filter(Column::SessionId.eq(session_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        debug!("No agent holds session {session_id}");
        return Err(Error::not_found());
    }
    Ok(())
}
