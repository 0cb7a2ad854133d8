use async_trait::async_trait;
use roadmate_core::error::{AgentError, Result};
use roadmate_core::schema::{FieldSpec, FieldType, InputSchema};
use roadmate_core::tool_registry::Tool;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog;

fn invalid(tool: &str, e: serde_json::Error) -> AgentError {
    AgentError::tool_execution(tool, format!("Invalid arguments: {}", e))
}

fn confirmation(prefix: char) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, id[..6].to_uppercase())
}

pub struct GetHotelsTool;

#[async_trait]
impl Tool for GetHotelsTool {
    fn name(&self) -> &str {
        "get_hotels"
    }

    fn description(&self) -> &str {
        "Find hotels at a destination. Returns a JSON array of hotels with id, name, price per night and rating."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::required("destination", FieldType::String, "City to stay in"))
            .field(
                FieldSpec::optional("preference", FieldType::String, "Kind of hotel")
                    .one_of(&["nice", "budget", "any"])
                    .with_default(json!("nice")),
            )
    }

    async fn execute(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Args {
            destination: String,
            preference: String,
        }

        let args: Args = serde_json::from_value(args).map_err(|e| invalid("get_hotels", e))?;
        let all = catalog::hotels_in(&args.destination);
        let mut matching: Vec<_> = all
            .iter()
            .filter(|h| args.preference == "any" || h.tier == args.preference)
            .cloned()
            .collect();
        if matching.is_empty() {
            matching = all;
        }
        matching.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        Ok(serde_json::to_string(&matching)?)
    }
}

pub struct BookHotelTool;

#[async_trait]
impl Tool for BookHotelTool {
    fn name(&self) -> &str {
        "book_hotel"
    }

    fn description(&self) -> &str {
        "Book a hotel returned by get_hotels, by its id or name."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::required("hotel_identifier", FieldType::String, "Hotel id or name"))
            .field(
                FieldSpec::optional("nights", FieldType::Integer, "Number of nights")
                    .with_default(json!(1)),
            )
    }

    async fn execute(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Args {
            hotel_identifier: String,
            nights: u32,
        }

        let args: Args = serde_json::from_value(args).map_err(|e| invalid("book_hotel", e))?;
        if !(1..=30).contains(&args.nights) {
            return Err(AgentError::tool_execution("book_hotel", "nights must be between 1 and 30"));
        }
        let hotel = catalog::find_hotel(&args.hotel_identifier).ok_or_else(|| {
            AgentError::tool_execution(
                "book_hotel",
                format!("No hotel '{}'. Use an id from get_hotels.", args.hotel_identifier),
            )
        })?;

        Ok(format!(
            "Booked {} at {} for {} night{}. Total: {:.2} euros. Confirmation number: {}",
            hotel.name,
            hotel.address,
            args.nights,
            if args.nights == 1 { "" } else { "s" },
            hotel.price_per_night * args.nights as f64,
            confirmation('H')
        ))
    }
}

pub struct GetRestaurantRecommendationsTool;

#[async_trait]
impl Tool for GetRestaurantRecommendationsTool {
    fn name(&self) -> &str {
        "get_restaurant_recommendations"
    }

    fn description(&self) -> &str {
        "Recommend restaurants at a destination. Returns a JSON array with id, name, cuisine and price range."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::required("destination", FieldType::String, "City to dine in"))
            .field(
                FieldSpec::optional("preference", FieldType::String, "Dining style")
                    .one_of(&["fine_dining", "casual", "any"])
                    .with_default(json!("fine_dining")),
            )
    }

    async fn execute(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Args {
            destination: String,
            preference: String,
        }

        let args: Args =
            serde_json::from_value(args).map_err(|e| invalid("get_restaurant_recommendations", e))?;
        let all = catalog::dining_in(&args.destination);
        let matching: Vec<_> = all
            .iter()
            .filter(|d| args.preference == "any" || d.style == args.preference)
            .cloned()
            .collect();
        let picked = if matching.is_empty() { all } else { matching };
        Ok(serde_json::to_string(&picked)?)
    }
}

pub struct BookRestaurantTool;

#[async_trait]
impl Tool for BookRestaurantTool {
    fn name(&self) -> &str {
        "book_restaurant"
    }

    fn description(&self) -> &str {
        "Reserve a table at a recommended restaurant. Ask the driver for time and party size first."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::required("restaurant_identifier", FieldType::String, "Restaurant id or name"))
            .field(FieldSpec::required("time", FieldType::String, "Reservation time, e.g. 19:30"))
            .field(FieldSpec::required("party_size", FieldType::Integer, "Number of guests"))
    }

    async fn execute(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Args {
            restaurant_identifier: String,
            time: String,
            party_size: u32,
        }

        let args: Args = serde_json::from_value(args).map_err(|e| invalid("book_restaurant", e))?;
        if !(1..=20).contains(&args.party_size) {
            return Err(AgentError::tool_execution(
                "book_restaurant",
                "party_size must be between 1 and 20",
            ));
        }
        let time = args.time.trim();
        if time.is_empty() {
            return Err(AgentError::tool_execution("book_restaurant", "time is required"));
        }
        let spot = catalog::find_dining(&args.restaurant_identifier).ok_or_else(|| {
            AgentError::tool_execution(
                "book_restaurant",
                format!(
                    "No restaurant '{}'. Use an id from get_restaurant_recommendations.",
                    args.restaurant_identifier
                ),
            )
        })?;

        Ok(format!(
            "Table for {} at {} ({}) is confirmed for {}. Confirmation number: {}",
            args.party_size,
            spot.name,
            spot.address,
            time,
            confirmation('R')
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_nice_hotels_first() {
        let out = GetHotelsTool
            .execute(json!({"destination": "Helsinki", "preference": "nice"}))
            .await
            .unwrap();
        let hotels: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(hotels.len(), 2);
        assert_eq!(hotels[0]["id"], "hel-kamp");
    }

    #[tokio::test]
    async fn test_book_hotel_totals_nights() {
        let out = BookHotelTool
            .execute(json!({"hotel_identifier": "tre-lapland", "nights": 2}))
            .await
            .unwrap();
        assert!(out.contains("Lapland Hotels Tampere"));
        assert!(out.contains("2 nights"));
        assert!(out.contains("Total: 358.00 euros"));
        assert!(out.contains("Confirmation number: H-"));

        assert!(BookHotelTool
            .execute(json!({"hotel_identifier": "nowhere", "nights": 1}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_fine_dining_recommendations() {
        let out = GetRestaurantRecommendationsTool
            .execute(json!({"destination": "Helsinki", "preference": "fine_dining"}))
            .await
            .unwrap();
        let spots: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(spots.len(), 3);
        assert!(spots.iter().all(|s| s["style"] == "fine_dining"));
    }

    #[tokio::test]
    async fn test_book_restaurant_validates_party() {
        let out = BookRestaurantTool
            .execute(json!({"restaurant_identifier": "Olo", "time": "19:30", "party_size": 2}))
            .await
            .unwrap();
        assert!(out.starts_with("Table for 2 at Olo"));
        assert!(out.contains("19:30"));

        let err = BookRestaurantTool
            .execute(json!({"restaurant_identifier": "Olo", "time": "19:30", "party_size": 0}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("party_size"));
    }
}
