//! HTTP surface of the catalog.
//!
//! Every endpoint answers with a JSON envelope `{ "message", "data" }`; errors
//! use `{ "message", "error" }` with the status picked by [`status_of`].

use std::{convert::Infallible, sync::Arc};

use serde::Serialize;
use warp::{
    filters::body::BodyDeserializeError,
    cors::CorsForbidden,
    http::StatusCode,
    reject::{LengthRequired, MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType},
    Filter, Rejection, Reply,
};

use crate::{
    actions::RecipeStore,
    constants::{ALLOWED_HEADERS, ALLOWED_METHODS, MAX_BODY_BYTES},
    error::StoreError,
    form::{Form, FormData},
    gateway::PersistenceGateway,
    jwt::SessionKeys,
    middleware::{with_owner, Unauthorized},
    schema::{OwnerId, RecipeId, RecipeInput},
};

#[derive(Serialize, Debug)]
pub struct ApiResponse<T: Serialize> {
    pub message: String,
    pub data: Vec<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(message: &str, data: Vec<T>) -> Self {
        Self {
            message: message.to_string(),
            data,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
    pub error: &'static str,
}

pub fn routes<G: PersistenceGateway>(
    store: Arc<RecipeStore<G>>,
    keys: Arc<SessionKeys>,
    client_url: Option<&str>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let owner = with_owner(keys);

    let list = warp::path!("recipes")
        .and(warp::get())
        .and(owner.clone())
        .and(with_store(store.clone()))
        .and_then(list_recipes::<G>);

    let get = warp::path!("recipes" / RecipeId)
        .and(warp::get())
        .and(owner.clone())
        .and(with_store(store.clone()))
        .and_then(get_recipe::<G>);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(owner.clone())
        .and(json_body::<FormData>())
        .and(with_store(store.clone()))
        .and_then(create_recipe::<G>);

    let update = warp::path!("recipes" / RecipeId)
        .and(warp::patch())
        .and(owner.clone())
        .and(json_body::<FormData>())
        .and(with_store(store.clone()))
        .and_then(update_recipe::<G>);

    let delete = warp::path!("recipes" / RecipeId)
        .and(warp::delete())
        .and(owner.clone())
        .and(with_store(store.clone()))
        .and_then(delete_recipe::<G>);

    let ingredient_names = warp::path!("ingredients")
        .and(warp::get())
        .and(owner.clone())
        .and(with_store(store.clone()))
        .and_then(list_ingredient_names::<G>);

    let ingredients_by_recipes = warp::path!("ingredients" / "by-recipes")
        .and(warp::post())
        .and(owner)
        .and(json_body::<Vec<RecipeId>>())
        .and(with_store(store))
        .and_then(list_ingredients_by_recipes::<G>);

    let cors = warp::cors()
        .allow_methods(ALLOWED_METHODS.iter().copied())
        .allow_headers(ALLOWED_HEADERS.iter().copied())
        .allow_credentials(true);
    let cors = match client_url {
        Some(origin) => cors.allow_origin(origin),
        None => cors.allow_any_origin(),
    };

    list.or(get)
        .or(create)
        .or(update)
        .or(delete)
        .or(ingredient_names)
        .or(ingredients_by_recipes)
        .recover(handle_rejection)
        .with(cors)
        .recover(handle_rejection)
        .with(warp::log("recipe_catalog::http"))
}

fn with_store<G: PersistenceGateway>(
    store: Arc<RecipeStore<G>>,
) -> impl Filter<Extract = (Arc<RecipeStore<G>>,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

async fn list_recipes<G: PersistenceGateway>(
    owner: OwnerId,
    store: Arc<RecipeStore<G>>,
) -> Result<impl Reply, Rejection> {
    let recipes = store.list(owner).await?;
    Ok(warp::reply::json(&ApiResponse::new("", recipes)))
}

async fn get_recipe<G: PersistenceGateway>(
    id: RecipeId,
    owner: OwnerId,
    store: Arc<RecipeStore<G>>,
) -> Result<impl Reply, Rejection> {
    let recipe = store.get(owner, id).await?;
    Ok(warp::reply::json(&ApiResponse::new("", vec![recipe])))
}

async fn create_recipe<G: PersistenceGateway>(
    owner: OwnerId,
    data: FormData,
    store: Arc<RecipeStore<G>>,
) -> Result<impl Reply, Rejection> {
    let input = RecipeInput::try_from(Form::from_data(data))?;
    let id = store.create(owner, input).await?;
    let recipe = store.get(owner, id).await?;

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::new(
            "Recipe successfully created!",
            vec![recipe],
        )),
        StatusCode::CREATED,
    ))
}

async fn update_recipe<G: PersistenceGateway>(
    id: RecipeId,
    owner: OwnerId,
    data: FormData,
    store: Arc<RecipeStore<G>>,
) -> Result<impl Reply, Rejection> {
    let input = RecipeInput::try_from(Form::from_data(data))?;
    let id = store.update(owner, id, input).await?;
    let recipe = store.get(owner, id).await?;

    Ok(warp::reply::json(&ApiResponse::new(
        "Recipe successfully updated!",
        vec![recipe],
    )))
}

async fn delete_recipe<G: PersistenceGateway>(
    id: RecipeId,
    owner: OwnerId,
    store: Arc<RecipeStore<G>>,
) -> Result<impl Reply, Rejection> {
    store.delete(owner, id).await?;
    Ok(warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT))
}

async fn list_ingredient_names<G: PersistenceGateway>(
    owner: OwnerId,
    store: Arc<RecipeStore<G>>,
) -> Result<impl Reply, Rejection> {
    let names = store.list_ingredient_names(owner).await?;
    Ok(warp::reply::json(&ApiResponse::new("", names)))
}

async fn list_ingredients_by_recipes<G: PersistenceGateway>(
    owner: OwnerId,
    recipe_ids: Vec<RecipeId>,
    store: Arc<RecipeStore<G>>,
) -> Result<impl Reply, Rejection> {
    let ingredients = store
        .list_ingredients_by_recipes(owner, &recipe_ids)
        .await?;
    Ok(warp::reply::json(&ApiResponse::new("", ingredients)))
}

pub fn status_of(error: &StoreError) -> (StatusCode, &'static str) {
    match error {
        StoreError::Validation { .. } => (StatusCode::BAD_REQUEST, "VALIDATION"),
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        StoreError::Auth(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        StoreError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE"),
    }
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, error, message) = if let Some(Unauthorized(e)) = err.find::<Unauthorized>() {
        (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", e.to_string())
    } else if let Some(e) = err.find::<StoreError>() {
        let (status, error) = status_of(e);
        if status.is_server_error() {
            log::error!("{e}");
        }
        (status, error, e.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "NOT_FOUND", format!("Not found"))
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "VALIDATION", e.to_string())
    } else if err.find::<PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "PAYLOAD_TOO_LARGE",
            format!("Payload too large"),
        )
    } else if err.find::<LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            "LENGTH_REQUIRED",
            format!("Content-Length header is required"),
        )
    } else if err.find::<UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "UNSUPPORTED_MEDIA_TYPE",
            format!("Expected a JSON body"),
        )
    } else if let Some(e) = err.find::<CorsForbidden>() {
        (StatusCode::FORBIDDEN, "CORS_FORBIDDEN", e.to_string())
    } else if err.find::<MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED",
            format!("Method not allowed"),
        )
    } else {
        log::error!("Unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL",
            format!("Internal server error"),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorResponse { message, error }),
        status,
    ))
}
