#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};

use clinic_records_api::config::AppConfig;
use clinic_records_api::database::MemoryStore;
use clinic_records_api::state::AppState;

pub const PASSWORD: &str = "correct-horse-battery-staple";

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
}

/// A signed-in user as returned by register/login
pub struct Session {
    pub token: String,
    pub user: Value,
}

impl Session {
    pub fn id(&self) -> &str {
        self.user["id"].as_str().unwrap_or_default()
    }
}

/// Boot the real router on an ephemeral port with a fresh in-memory store.
pub async fn spawn_server() -> Result<TestServer> {
    spawn_server_with(AppConfig::for_tests()).await
}

pub async fn spawn_server_with(config: AppConfig) -> Result<TestServer> {
    let state = AppState::new(config, Arc::new(MemoryStore::new()));
    let app = clinic_records_api::app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind test listener")?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let server = TestServer {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?,
    };
    server.wait_ready().await?;
    Ok(server)
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn wait_ready(&self) -> Result<()> {
        for _ in 0..50 {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        anyhow::bail!("server did not become ready on {}", self.base_url)
    }

    /// Request with a bearer token attached
    pub fn authed(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(token)
    }

    pub async fn register(&self, email: &str, role: &str, tenant: &str) -> Result<Session> {
        let res = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "email": email,
                "password": PASSWORD,
                "name": format!("Test {}", role),
                "role": role,
                "tenant_id": tenant,
            }))
            .send()
            .await?;
        anyhow::ensure!(
            res.status() == StatusCode::CREATED,
            "register returned {}",
            res.status()
        );
        session_from(res.json().await?)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let res = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "login returned {}", res.status());
        session_from(res.json().await?)
    }

    /// Create a record as `token` and return its `data`
    pub async fn create(&self, path: &str, token: &str, body: Value) -> Result<Value> {
        let res = self.authed(Method::POST, path, token).json(&body).send().await?;
        anyhow::ensure!(
            res.status() == StatusCode::CREATED,
            "create {} returned {}",
            path,
            res.status()
        );
        let body: Value = res.json().await?;
        Ok(body["data"].clone())
    }
}

fn session_from(body: Value) -> Result<Session> {
    let data = &body["data"];
    let token = data["token"]
        .as_str()
        .context("response carried no token")?
        .to_string();
    Ok(Session {
        token,
        user: data["user"].clone(),
    })
}
