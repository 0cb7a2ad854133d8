use std::time::Duration;

use async_trait::async_trait;
use roadmate_core::error::{AgentError, Result};
use roadmate_core::schema::InputSchema;
use roadmate_core::tool_registry::Tool;
use serde_json::{json, Value};
use url::Url;

const TOOL: &str = "get_restaurant_menu";

/// Fetches the menu of the restaurant this deployment serves from its menu
/// service (`GET {base}/menu`). Without a configured service the built-in
/// house menu is returned.
pub struct GetRestaurantMenuTool {
    client: reqwest::Client,
    endpoint: Option<Url>,
}

impl GetRestaurantMenuTool {
    pub fn new(base: Option<&str>, timeout: Duration) -> Result<Self> {
        let endpoint = base.map(menu_endpoint).transpose()?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("roadmate/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Ok(Self { client, endpoint })
    }
}

fn menu_endpoint(base: &str) -> Result<Url> {
    let url = Url::parse(&format!("{}/menu", base.trim_end_matches('/')))
        .map_err(|e| AgentError::Config(format!("invalid menu API base '{}': {}", base, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AgentError::Config(format!(
            "menu API scheme '{}' is not allowed (only http/https)",
            other
        ))),
    }
}

fn house_menu() -> Value {
    json!({
        "restaurant": "Burger House",
        "categories": [
            {
                "name": "Burgers",
                "items": [
                    {"id": "b1", "name": "Classic Burger", "price": 10.99, "description": "Beef patty, lettuce, tomato", "popular": false},
                    {"id": "b2", "name": "Cheeseburger", "price": 11.99, "description": "Classic burger with cheddar", "popular": true},
                    {"id": "b3", "name": "Bacon Burger", "price": 12.99, "description": "Cheeseburger with crispy bacon", "popular": true}
                ]
            },
            {
                "name": "Sides",
                "items": [
                    {"id": "f1", "name": "Fries", "price": 3.49, "description": "Skin-on, sea salt", "popular": true},
                    {"id": "f2", "name": "Onion Rings", "price": 3.99, "description": "Beer-battered", "popular": false}
                ]
            },
            {
                "name": "Drinks",
                "items": [
                    {"id": "b4", "name": "Milkshake", "price": 5.99, "description": "Vanilla, chocolate or strawberry", "popular": true},
                    {"id": "d1", "name": "Lemonade", "price": 2.99, "description": "House-made", "popular": false}
                ]
            }
        ]
    })
}

#[async_trait]
impl Tool for GetRestaurantMenuTool {
    fn name(&self) -> &str {
        TOOL
    }

    fn description(&self) -> &str {
        "Fetches the restaurant's menu items including names, descriptions, and prices."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
    }

    async fn execute(&self, _args: Value) -> Result<String> {
        let Some(endpoint) = &self.endpoint else {
            return Ok(house_menu().to_string());
        };

        let response = self
            .client
            .get(endpoint.clone())
            .send()
            .await
            .map_err(|e| AgentError::tool_execution(TOOL, format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::tool_execution(
                TOOL,
                format!("Menu service returned HTTP {}", status.as_u16()),
            ));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| AgentError::tool_execution(TOOL, format!("Invalid menu data: {}", e)))?;
        Ok(data.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_builtin_menu_without_service() {
        let tool = GetRestaurantMenuTool::new(None, Duration::from_secs(1)).unwrap();
        let out: Value = serde_json::from_str(&tool.execute(Value::Null).await.unwrap()).unwrap();
        assert_eq!(out["categories"][0]["items"][2]["name"], "Bacon Burger");
    }

    #[tokio::test]
    async fn test_fetches_remote_menu() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/menu");
                then.status(200)
                    .json_body(json!({"items": [{"name": "Soup of the day", "price": 7.5}]}));
            })
            .await;

        let tool = GetRestaurantMenuTool::new(Some(&format!("{}/", server.base_url())), Duration::from_secs(5)).unwrap();
        let out = tool.execute(Value::Null).await.unwrap();
        assert!(out.contains("Soup of the day"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_remote_failure_is_tool_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/menu");
                then.status(503);
            })
            .await;

        let tool = GetRestaurantMenuTool::new(Some(&server.base_url()), Duration::from_secs(5)).unwrap();
        let err = tool.execute(Value::Null).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn test_rejects_non_http_base() {
        assert!(GetRestaurantMenuTool::new(Some("ftp://menus.example.com"), Duration::from_secs(1)).is_err());
        assert!(GetRestaurantMenuTool::new(Some("not a url"), Duration::from_secs(1)).is_err());
    }
}
