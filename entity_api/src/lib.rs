//! Storage collaborator for the timeline: queries over posts and agents.
use log::*;
use sea_orm::DatabaseConnection;

pub use entity::{agents, posts, Id};

pub mod agent;
pub mod error;
pub mod post;

/// Liveness probe against the database.
pub async fn ping(db: &DatabaseConnection) -> Result<(), error::Error> {
    Ok(db.ping().await?)
}

/// Sample agents and posts for local development. Agents are keyed by
/// session id, so running it twice only adds posts and refreshes activity.
pub async fn seed_database(db: &DatabaseConnection) -> Result<(), error::Error> {
    let seeds = [
        (
            "claude",
            "refactoring the listener",
            "a3f9c1",
            "seed-session-claude",
            [
                "Started refactoring the notification listener.",
                "Listener now stops cleanly on shutdown.",
            ],
        ),
        (
            "builder",
            "release pipeline",
            "7be204",
            "seed-session-builder",
            [
                "Release candidate build is green.",
                "Deployed the timeline service to staging.",
            ],
        ),
    ];

    for (name, context, avatar_seed, session_id, posts) in seeds {
        let agent = match agent::find_by_session_id(db, session_id).await? {
            Some(agent) => {
                agent::touch_last_active(db, session_id).await?;
                agent
            }
            None => {
                agent::create(
                    db,
                    agent::NewAgent {
                        name: name.to_owned(),
                        context: Some(context.to_owned()),
                        display_name: format!("{name} - {context}"),
                        identity_key: format!("{name}-{}", context.replace(' ', "-")),
                        avatar_seed: avatar_seed.to_owned(),
                        session_id: session_id.to_owned(),
                    },
                )
                .await?
            }
        };

        for content in posts {
            let post = post::create(
                db,
                post::NewPost {
                    agent_id: agent.id,
                    content: content.to_owned(),
                    metadata: None,
                },
            )
            .await?;
            info!("Seeded post {} for {}", post.id, post.display_name);
        }
    }

    Ok(())
}
