mod common;

use anyhow::Result;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

#[tokio::test]
async fn other_tenants_rows_look_absent() -> Result<()> {
    let server = common::spawn_server().await?;
    let north = server.register("doc@north.test", "doctor", "north").await?;
    let south = server.register("doc@south.test", "doctor", "south").await?;

    let patient = server
        .create(
            "/api/patients",
            &north.token,
            json!({ "first_name": "Ada", "last_name": "Lovelace" }),
        )
        .await?;
    let path = format!("/api/patients/{}", patient["id"].as_str().unwrap());

    let res = server.authed(Method::GET, &path, &south.token).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = server
        .authed(Method::PUT, &path, &south.token)
        .json(&json!({ "first_name": "Mallory" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = server
        .authed(Method::DELETE, &path, &south.token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = server
        .authed(Method::GET, "/api/patients", &south.token)
        .send()
        .await?;
    let body: Value = res.json().await?;
    assert!(body["data"].as_array().unwrap().is_empty());

    // The owner still sees the untouched row
    let res = server.authed(Method::GET, &path, &north.token).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["first_name"], "Ada");
    Ok(())
}

#[tokio::test]
async fn admin_rights_stop_at_the_tenant_boundary() -> Result<()> {
    let server = common::spawn_server().await?;
    let north = server.register("doc@north.test", "doctor", "north").await?;
    let south_admin = server.register("admin@south.test", "admin", "south").await?;

    let patient = server
        .create(
            "/api/patients",
            &north.token,
            json!({ "first_name": "Ada", "last_name": "Lovelace" }),
        )
        .await?;
    let path = format!("/api/patients/{}", patient["id"].as_str().unwrap());

    let res = server
        .authed(Method::DELETE, &path, &south_admin.token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = server
        .authed(Method::GET, "/api/users", &south_admin.token)
        .send()
        .await?;
    let body: Value = res.json().await?;
    let users = body["data"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["email"], "admin@south.test");
    Ok(())
}
