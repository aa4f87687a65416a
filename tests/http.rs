use std::sync::Arc;

use chrono::Duration;
use recipe_catalog::{
    actions::RecipeStore, jwt::SessionKeys, memory::MemoryGateway, routes::routes,
    schema::OwnerId,
};
use serde_json::{json, Value};
use warp::{http::StatusCode, test::request};

struct App {
    store: Arc<RecipeStore<MemoryGateway>>,
    keys: Arc<SessionKeys>,
}

impl App {
    fn new() -> Self {
        Self {
            store: Arc::new(RecipeStore::new(MemoryGateway::new())),
            keys: Arc::new(SessionKeys::new(b"http-test-secret").unwrap()),
        }
    }

    fn bearer(&self, owner: i64) -> String {
        let token = self.keys.issue(OwnerId(owner), Duration::hours(1)).unwrap();
        format!("Bearer {token}")
    }

    async fn send(
        &self,
        method: &str,
        path: &str,
        owner: Option<i64>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let filter = routes(self.store.clone(), self.keys.clone(), None);

        let mut req = request().method(method).path(path);
        if let Some(owner) = owner {
            req = req.header("authorization", self.bearer(owner));
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let res = req.reply(&filter).await;
        (res.status(), parse(res.body()))
    }
}

fn parse(body: &[u8]) -> Value {
    if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body).unwrap()
    }
}

fn pancakes() -> Value {
    json!({
        "name": "Pancakes",
        "cookingTime": "20 min",
        "ingredients": [
            { "name": "flour", "quantity": 200, "unit": "g" },
            { "name": "milk", "quantity": 3, "unit": "dl" }
        ],
        "tags": ["breakfast"]
    })
}

#[tokio::test]
async fn requests_without_a_session_are_unauthorized() {
    let app = App::new();

    let (status, body) = app.send("GET", "/recipes", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let (status, _) = app.send("POST", "/recipes", None, Some(pancakes())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.gateway().recipe_count(), 0);
}

#[tokio::test]
async fn session_cookie_is_accepted() {
    let app = App::new();
    let token = app.keys.issue(OwnerId(3), Duration::hours(1)).unwrap();
    let filter = routes(app.store.clone(), app.keys.clone(), None);

    let res = request()
        .method("GET")
        .path("/recipes")
        .header("cookie", format!("jwt={token}"))
        .reply(&filter)
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(parse(res.body())["data"], json!([]));
}

#[tokio::test]
async fn create_returns_the_stored_recipe() {
    let app = App::new();

    let (status, body) = app.send("POST", "/recipes", Some(1), Some(pancakes())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Recipe successfully created!");

    let recipe = &body["data"][0];
    assert_eq!(recipe["name"], "Pancakes");
    assert_eq!(recipe["cookingTime"], "20 min");
    assert_eq!(recipe["description"], "");
    assert_eq!(recipe["ingredients"].as_array().unwrap().len(), 2);
    assert_eq!(recipe["tags"], json!(["breakfast"]));

    let id = recipe["id"].as_i64().unwrap();
    let (status, body) = app
        .send("GET", &format!("/recipes/{id}"), Some(1), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0], *recipe);
}

#[tokio::test]
async fn create_without_name_is_a_validation_error() {
    let app = App::new();

    let (status, body) = app
        .send("POST", "/recipes", Some(1), Some(json!({ "tags": ["x"] })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION");

    let (status, _) = app
        .send(
            "POST",
            "/recipes",
            Some(1),
            Some(json!({
                "name": "Soup",
                "ingredients": [{ "name": "salt", "quantity": -1 }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.gateway().recipe_count(), 0);
}

#[tokio::test]
async fn unknown_recipe_is_not_found() {
    let app = App::new();

    let (status, body) = app.send("GET", "/recipes/41", Some(1), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");

    let (status, _) = app
        .send("PATCH", "/recipes/41", Some(1), Some(pancakes()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn other_owners_recipe_is_not_found() {
    let app = App::new();
    let (_, body) = app.send("POST", "/recipes", Some(1), Some(pancakes())).await;
    let id = body["data"][0]["id"].as_i64().unwrap();

    let (status, _) = app
        .send("GET", &format!("/recipes/{id}"), Some(2), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.send("GET", "/recipes", Some(2), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn patch_reconciles_and_delete_removes() {
    let app = App::new();
    let (_, body) = app.send("POST", "/recipes", Some(1), Some(pancakes())).await;
    let created = &body["data"][0];
    let id = created["id"].as_i64().unwrap();
    let flour_id = created["ingredients"]
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["name"] == "flour")
        .unwrap()["id"]
        .clone();

    let (status, body) = app
        .send(
            "PATCH",
            &format!("/recipes/{id}"),
            Some(1),
            Some(json!({
                "name": "Crepes",
                "ingredients": [{ "name": "flour", "quantity": 120, "unit": "g" }],
                "tags": ["french"]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let recipe = &body["data"][0];
    assert_eq!(recipe["name"], "Crepes");
    assert_eq!(recipe["tags"], json!(["french"]));
    assert_eq!(recipe["ingredients"][0]["id"], flour_id);
    assert_eq!(recipe["ingredients"][0]["quantity"], 120.0);
    assert_eq!(recipe["ingredients"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .send("DELETE", &format!("/recipes/{id}"), Some(1), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = app
        .send("GET", &format!("/recipes/{id}"), Some(1), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ingredient_endpoints() {
    let app = App::new();
    let (_, body) = app.send("POST", "/recipes", Some(1), Some(pancakes())).await;
    let id = body["data"][0]["id"].as_i64().unwrap();

    let (status, body) = app.send("GET", "/ingredients", Some(1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(["flour", "milk"]));

    let (status, body) = app
        .send(
            "POST",
            "/ingredients/by-recipes",
            Some(1),
            Some(json!([id, 9999])),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let ingredients = body["data"].as_array().unwrap();
    assert_eq!(ingredients.len(), 2);
    assert!(ingredients.iter().all(|i| i["recipeId"] == id));

    let (status, body) = app
        .send("POST", "/ingredients/by-recipes", Some(2), Some(json!([id])))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = App::new();
    let filter = routes(app.store.clone(), app.keys.clone(), None);

    let res = request()
        .method("POST")
        .path("/recipes")
        .header("authorization", app.bearer(1))
        .header("content-type", "application/json")
        .body("{ not json")
        .reply(&filter)
        .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
