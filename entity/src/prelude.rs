pub use super::agents::Entity as Agents;
pub use super::posts::Entity as Posts;
