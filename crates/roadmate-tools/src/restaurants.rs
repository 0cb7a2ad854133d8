use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use rand::Rng;
use roadmate_core::error::{AgentError, Result};
use roadmate_core::schema::{FieldSpec, FieldType, InputSchema};
use roadmate_core::tool_registry::Tool;
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::{self, Restaurant};

fn unknown_kind(tool: &str, kind: &str) -> AgentError {
    AgentError::tool_execution(
        tool,
        format!(
            "Unknown restaurant type '{}'. Available: {}",
            kind,
            catalog::restaurant_kinds().join(", ")
        ),
    )
}

fn lookup(tool: &str, kind: &str) -> Result<&'static Restaurant> {
    catalog::restaurant_by_kind(kind).ok_or_else(|| unknown_kind(tool, kind))
}

pub struct GetNearbyRestaurantsTool;

#[async_trait]
impl Tool for GetNearbyRestaurantsTool {
    fn name(&self) -> &str {
        "get_nearby_restaurants"
    }

    fn description(&self) -> &str {
        "Get the restaurants near the car that accept orders, with their food type, \
         price point (cheap, moderate, expensive) and a short description."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
    }

    async fn execute(&self, _args: Value) -> Result<String> {
        let list: Vec<String> = catalog::NEARBY
            .iter()
            .map(|r| format!("{} ({}): {} price point - {}", r.name, r.kind, r.price_point, r.description))
            .collect();
        Ok(format!("Nearby restaurants:\n{}", list.join("\n")))
    }
}

pub struct GetMenuTool;

#[async_trait]
impl Tool for GetMenuTool {
    fn name(&self) -> &str {
        "get_menu"
    }

    fn description(&self) -> &str {
        "Get the menu of a nearby restaurant, by food type. Returns item ids, names and prices."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().field(
            FieldSpec::required("restaurant_type", FieldType::String, "Food type of the restaurant")
                .one_of(&["pizza", "burger", "salad"]),
        )
    }

    async fn execute(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Args {
            restaurant_type: String,
        }

        let args: Args = serde_json::from_value(args)
            .map_err(|e| AgentError::tool_execution("get_menu", format!("Invalid arguments: {}", e)))?;
        let restaurant = lookup("get_menu", &args.restaurant_type)?;

        let mut out = format!("{} menu:\n", restaurant.name);
        for item in restaurant.menu {
            out.push_str(&format!(
                "- [{}] {}: {:.2} euros - {}\n",
                item.id, item.name, item.price, item.description
            ));
        }
        Ok(out)
    }
}

/// Places an order and predicts when the car will reach the restaurant.
pub struct PlaceOrderTool {
    tz: Tz,
}

impl PlaceOrderTool {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

/// Minutes until the order is ready, between 5 and 15.
fn estimate_minutes() -> i64 {
    rand::thread_rng().gen_range(5..=15)
}

pub(crate) fn local_clock(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%H:%M").to_string()
}

#[async_trait]
impl Tool for PlaceOrderTool {
    fn name(&self) -> &str {
        "place_order"
    }

    fn description(&self) -> &str {
        "Place a food order at a nearby restaurant. Only call this after the driver has \
         explicitly confirmed the items. Returns the total, the estimated wait and the arrival time."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field(
                FieldSpec::required("restaurant_type", FieldType::String, "Food type of the restaurant")
                    .one_of(&["pizza", "burger", "salad"]),
            )
            .field(
                FieldSpec::required("item_ids", FieldType::Array, "Menu item ids; repeat an id to order more than one")
                    .items(FieldType::String),
            )
    }

    async fn execute(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Args {
            restaurant_type: String,
            item_ids: Vec<String>,
        }

        let args: Args = serde_json::from_value(args)
            .map_err(|e| AgentError::tool_execution("place_order", format!("Invalid arguments: {}", e)))?;
        let restaurant = lookup("place_order", &args.restaurant_type)?;

        if args.item_ids.is_empty() {
            return Err(AgentError::tool_execution("place_order", "No items to order"));
        }

        let mut quantities: BTreeMap<&str, (u32, f64)> = BTreeMap::new();
        for id in &args.item_ids {
            let item = restaurant.item(id).ok_or_else(|| {
                let valid: Vec<&str> = restaurant.menu.iter().map(|i| i.id).collect();
                AgentError::tool_execution(
                    "place_order",
                    format!("Unknown item '{}' at {}. Valid ids: {}", id, restaurant.name, valid.join(", ")),
                )
            })?;
            let entry = quantities.entry(item.name).or_insert((0, item.price));
            entry.0 += 1;
        }

        let total: f64 = quantities.values().map(|(n, price)| *n as f64 * price).sum();
        let lines: Vec<String> = quantities
            .iter()
            .map(|(name, (n, price))| format!("{}x {} ({:.2})", n, name, price))
            .collect();

        let minutes = estimate_minutes();
        let arrival = local_clock(Utc::now() + Duration::minutes(minutes), self.tz);
        let order_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase();

        tracing::info!(restaurant = restaurant.name, order_id = %order_id, "Order placed");
        Ok(format!(
            "Order {} placed at {}: {}. Total: {:.2} euros. Ready in about {} minutes. Estimated arrival time: {}",
            order_id,
            restaurant.name,
            lines.join(", "),
            total,
            minutes,
            arrival
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[tokio::test]
    async fn test_nearby_lists_all_three() {
        let out = GetNearbyRestaurantsTool.execute(json!({})).await.unwrap();
        assert!(out.starts_with("Nearby restaurants:"));
        for name in ["Pizza Palace (pizza)", "Burger House (burger)", "Fresh Greens (salad)"] {
            assert!(out.contains(name));
        }
    }

    #[tokio::test]
    async fn test_menu_shows_ids_and_prices() {
        let out = GetMenuTool
            .execute(json!({"restaurant_type": "burger"}))
            .await
            .unwrap();
        assert!(out.contains("[b3] Bacon Burger: 12.99 euros"));
        assert!(out.contains("Milkshake: 5.99"));
    }

    #[tokio::test]
    async fn test_order_totals_and_arrival_time() {
        let tool = PlaceOrderTool::new(chrono_tz::Europe::Helsinki);
        let out = tool
            .execute(json!({"restaurant_type": "burger", "item_ids": ["b3", "b4", "b4"]}))
            .await
            .unwrap();
        assert!(out.contains("Burger House"));
        assert!(out.contains("1x Bacon Burger (12.99)"));
        assert!(out.contains("2x Milkshake (5.99)"));
        assert!(out.contains("Total: 24.97 euros"));

        let minutes: i64 = out
            .split("Ready in about ")
            .nth(1)
            .and_then(|s| s.split(' ').next())
            .and_then(|s| s.parse().ok())
            .unwrap();
        assert!((5..=15).contains(&minutes));

        let arrival = out.rsplit("Estimated arrival time: ").next().unwrap();
        assert_eq!(arrival.len(), 5);
        assert_eq!(&arrival[2..3], ":");
    }

    #[tokio::test]
    async fn test_order_rejects_unknown_item() {
        let tool = PlaceOrderTool::new(chrono_tz::UTC);
        let err = tool
            .execute(json!({"restaurant_type": "pizza", "item_ids": ["b3"]}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Valid ids: p1, p2, p3, p4"));

        let err = tool
            .execute(json!({"restaurant_type": "pizza", "item_ids": []}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No items"));
    }

    #[test]
    fn test_local_clock_uses_zone() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(local_clock(at, chrono_tz::Europe::Helsinki), "15:00");
        assert_eq!(local_clock(at, chrono_tz::UTC), "12:00");
    }
}
