use async_trait::async_trait;
use roadmate_core::error::{AgentError, Result};
use roadmate_core::schema::{FieldSpec, FieldType, InputSchema};
use roadmate_core::tool_registry::Tool;
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::PARKING;

pub struct GetParkingOptionsTool;

#[async_trait]
impl Tool for GetParkingOptionsTool {
    fn name(&self) -> &str {
        "get_parking_options"
    }

    fn description(&self) -> &str {
        "Find available parking near the driver's destination, with distance, hourly price and free spaces."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().field(FieldSpec::optional(
            "destination",
            FieldType::String,
            "Where the driver is heading; defaults to the current route's destination",
        ))
    }

    async fn execute(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Args {
            destination: Option<String>,
        }

        let args: Args = serde_json::from_value(args).map_err(|e| {
            AgentError::tool_execution("get_parking_options", format!("Invalid arguments: {}", e))
        })?;

        let place = args
            .destination
            .filter(|d| !d.trim().is_empty())
            .map(|d| format!("near {}", d.trim()))
            .unwrap_or_else(|| "near your destination".into());

        let mut out = format!("Parking options {}:\n", place);
        for spot in PARKING {
            let distance = if spot.distance_m >= 1000 {
                format!("{:.1} km", spot.distance_m as f64 / 1000.0)
            } else {
                format!("{} m", spot.distance_m)
            };
            out.push_str(&format!(
                "- {}: {} away, {:.2} euros/hour, {} spaces free{}\n",
                spot.name,
                distance,
                spot.price_per_hour,
                spot.spaces_free,
                if spot.covered { ", covered" } else { "" }
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_lists_spots_with_prices() {
        let out = GetParkingOptionsTool
            .execute(json!({"destination": "Helsinki Cathedral"}))
            .await
            .unwrap();
        assert!(out.starts_with("Parking options near Helsinki Cathedral:"));
        assert!(out.contains("Central Garage: 200 m away, 3.50 euros/hour, 42 spaces free, covered"));
        assert!(out.contains("Riverside Park & Ride: 1.2 km away"));
    }

    #[tokio::test]
    async fn test_destination_optional() {
        let out = GetParkingOptionsTool.execute(json!({})).await.unwrap();
        assert!(out.starts_with("Parking options near your destination:"));
    }
}
