use serde::Deserialize;
use utoipa::IntoParams;

/// Raw query values; parsing is lenient for `limit` and strict for `after`,
/// so both stay strings until the handler interprets them.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct IndexParams {
    /// Maximum number of posts to return. Defaults to 100 when absent, not a
    /// number, zero or negative.
    #[param(example = "50")]
    pub(crate) limit: Option<String>,
    /// Only return posts strictly newer than this RFC 3339 timestamp.
    #[param(example = "2025-06-21T11:30:00Z")]
    pub(crate) after: Option<String>,
}
