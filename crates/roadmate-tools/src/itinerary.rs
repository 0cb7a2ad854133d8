use async_trait::async_trait;
use roadmate_core::error::{AgentError, Result};
use roadmate_core::schema::{FieldSpec, FieldType, InputSchema};
use roadmate_core::tool_registry::Tool;
use serde::Deserialize;
use serde_json::Value;

const TOOL: &str = "build_itinerary";

#[derive(Debug, Deserialize)]
struct HotelEntry {
    id: String,
    name: String,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    price_per_night: Option<f64>,
    #[serde(default)]
    rating: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct DiningEntry {
    id: String,
    name: String,
    #[serde(default)]
    cuisine: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

/// Combines hotel and restaurant results into a spoken trip summary.
pub struct BuildItineraryTool;

fn parse_list<T: for<'de> Deserialize<'de>>(field: &str, raw: &str) -> Result<Vec<T>> {
    serde_json::from_str(raw).map_err(|e| {
        AgentError::tool_execution(TOOL, format!("'{}' must be the JSON array returned by the lookup tool: {}", field, e))
    })
}

fn render(destination: Option<&str>, hotels: &[HotelEntry], dining: &[DiningEntry]) -> String {
    let place = destination
        .map(str::to_string)
        .or_else(|| hotels.iter().find_map(|h| h.city.clone()))
        .or_else(|| dining.iter().find_map(|d| d.city.clone()))
        .unwrap_or_else(|| "your destination".into());

    let mut out = format!("Here's your trip to {}.", place);

    match hotels.first() {
        Some(hotel) => {
            out.push_str(&format!(" You'll stay at {}", hotel.name));
            if let Some(rating) = hotel.rating {
                out.push_str(&format!(", rated {:.1}", rating));
            }
            if let Some(price) = hotel.price_per_night {
                out.push_str(&format!(", at {:.0} euros a night", price));
            }
            out.push('.');
            if let Some(alt) = hotels.get(1) {
                out.push_str(&format!(" {} is a good alternative.", alt.name));
            }
        }
        None => out.push_str(" I couldn't find a hotel there."),
    }

    match dining {
        [] => {}
        [dinner] => out.push_str(&format!(" For dinner, I suggest {}.", describe(dinner))),
        [dinner, lunch, ..] => out.push_str(&format!(
            " For dinner on the first evening, I suggest {}, and for the next day, {}.",
            describe(dinner),
            describe(lunch)
        )),
    }

    let mut offers = Vec::new();
    if let Some(hotel) = hotels.first() {
        offers.push(format!("book the hotel ({})", hotel.id));
    }
    if let Some(dinner) = dining.first() {
        offers.push(format!("reserve a table ({})", dinner.id));
    }
    if !offers.is_empty() {
        out.push_str(&format!(" Just say if you'd like me to {}.", offers.join(" or ")));
    }
    out
}

fn describe(d: &DiningEntry) -> String {
    match &d.cuisine {
        Some(cuisine) => format!("{} for {}", d.name, cuisine.to_lowercase()),
        None => d.name.clone(),
    }
}

#[async_trait]
impl Tool for BuildItineraryTool {
    fn name(&self) -> &str {
        TOOL
    }

    fn description(&self) -> &str {
        "Build a spoken trip itinerary from the JSON results of get_hotels and \
         get_restaurant_recommendations. Relay the returned text to the driver as is."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::required("hotels", FieldType::String, "JSON array from get_hotels"))
            .field(FieldSpec::required(
                "restaurants",
                FieldType::String,
                "JSON array from get_restaurant_recommendations",
            ))
            .field(FieldSpec::optional("destination", FieldType::String, "Trip destination"))
    }

    async fn execute(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Args {
            hotels: String,
            restaurants: String,
            destination: Option<String>,
        }

        let args: Args = serde_json::from_value(args)
            .map_err(|e| AgentError::tool_execution(TOOL, format!("Invalid arguments: {}", e)))?;
        let hotels: Vec<HotelEntry> = parse_list("hotels", &args.hotels)?;
        let dining: Vec<DiningEntry> = parse_list("restaurants", &args.restaurants)?;

        Ok(render(args.destination.as_deref(), &hotels, &dining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::travel::{GetHotelsTool, GetRestaurantRecommendationsTool};
    use serde_json::json;

    #[tokio::test]
    async fn test_itinerary_from_lookup_results() {
        let hotels = GetHotelsTool
            .execute(json!({"destination": "Helsinki", "preference": "nice"}))
            .await
            .unwrap();
        let restaurants = GetRestaurantRecommendationsTool
            .execute(json!({"destination": "Helsinki", "preference": "fine_dining"}))
            .await
            .unwrap();

        let text = BuildItineraryTool
            .execute(json!({"hotels": hotels, "restaurants": restaurants}))
            .await
            .unwrap();
        assert!(text.starts_with("Here's your trip to Helsinki."));
        assert!(text.contains("You'll stay at Hotel Kämp, rated 4.8, at 289 euros a night."));
        assert!(text.contains("I suggest Olo for nordic tasting menu"));
        assert!(text.contains("book the hotel (hel-kamp)"));
    }

    #[test]
    fn test_empty_lists() {
        let text = render(Some("Oulu"), &[], &[]);
        assert_eq!(text, "Here's your trip to Oulu. I couldn't find a hotel there.");
    }

    #[tokio::test]
    async fn test_rejects_non_json() {
        let err = BuildItineraryTool
            .execute(json!({"hotels": "Hotel Kämp", "restaurants": "[]"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'hotels' must be the JSON array"));
    }
}
