use std::sync::Arc;

use warp::{
    reject::{self, Rejection},
    Filter,
};

use crate::{constants::SESSION_COOKIE, schema::OwnerId};

use super::jwt::{extract_owner_id, AuthError, SessionKeys};

#[derive(Debug)]
pub struct Unauthorized(pub AuthError);

impl reject::Reject for Unauthorized {}

/// Resolves the request's owner or rejects with [`Unauthorized`] before any
/// handler runs.
pub fn with_owner(
    keys: Arc<SessionKeys>,
) -> impl Filter<Extract = (OwnerId,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and_then(move |authorization: Option<String>, cookie: Option<String>| {
            let keys = keys.clone();
            async move {
                extract_owner_id(&keys, authorization.as_deref(), cookie.as_deref()).map_err(|e| {
                    log::debug!("Rejected request: {e}");
                    reject::custom(Unauthorized(e))
                })
            }
        })
}
