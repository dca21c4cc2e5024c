pub mod prelude;

pub mod agents;
pub mod posts;

/// A type alias that represents any Entity's internal id field data type.
/// Both tables use `SERIAL` primary keys.
pub type Id = i32;

/// Maximum length of a post body, enforced by a `CHECK` constraint as well.
pub const MAX_POST_LENGTH: usize = 280;
