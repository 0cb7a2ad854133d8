//! Agent profiles.
//!
//! A profile is a declarative pairing of a system prompt and the subset of
//! the tool registry the model may use. Two profiles ship built in:
//! `restaurant` (a single restaurant's customer service desk) and `copilot`
//! (an in-car companion with food ordering, parking, travel and calendar
//! services). Config can override either or define new ones.
//!
//! Prompts are templates: `{now}`, `{today}` and `{timezone}` are filled in
//! at the start of every user turn.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AgentError, Result};
use crate::tool_registry::ToolRegistry;

const RESTAURANT_PROMPT: &str = "\
You are a friendly customer service agent for a restaurant.
Help customers with questions about the menu, recommend dishes that fit their tastes,
and take orders, confirming the details back to the customer.

Use the 'get_restaurant_menu' tool whenever the menu is relevant. Never show the raw
menu data, ids or other technical details: summarize the categories, point out
popular items, and offer more detail on request, all in natural language.";

const COPILOT_PROMPT: &str = "\
You are a helpful companion for a driver, speaking through a voice interface.
Current date and time: {now} ({timezone}). Today is {today}.

Keep every answer short, clear and easy to follow while driving.

Food: when the driver is hungry, call 'get_nearby_restaurants' right away and list the
options with their type. When they pick a kind of food, call 'get_menu' for that
restaurant type and read a few items with prices, ending with \"What would you like?\".
Before ordering, repeat the items and total price and ask for confirmation. Only after
an explicit yes, call 'place_order' with the restaurant type and item ids, then state the
total and the arrival time from the result and offer navigation to the restaurant.

Parking: call 'get_parking_options' and give name, distance and price for each spot.

Trips: for a destination, call 'get_hotels' (preference \"nice\") and
'get_restaurant_recommendations' (preference \"fine_dining\"), pass both JSON results to
'build_itinerary', and relay the itinerary text as is. Use 'book_hotel' and
'book_restaurant' when asked, asking for time and party size if missing.

Calendar: use 'get_calendar_events' for the schedule. For new events resolve relative
dates against today's date, send ISO-8601 local times (YYYY-MM-DDTHH:MM:SS) to
'create_calendar_event', default to one hour, and confirm the date and time.";

/// Tools available to the restaurant desk.
pub const RESTAURANT_TOOLS: &[&str] = &["get_restaurant_menu"];

/// Tools available to the in-car companion.
pub const COPILOT_TOOLS: &[&str] = &[
    "get_nearby_restaurants",
    "get_menu",
    "place_order",
    "get_parking_options",
    "get_hotels",
    "book_hotel",
    "get_restaurant_recommendations",
    "build_itinerary",
    "book_restaurant",
    "get_calendar_events",
    "create_calendar_event",
];

/// A resolved agent variant.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub tools: Vec<String>,
}

impl AgentProfile {
    pub fn restaurant() -> Self {
        Self {
            name: "restaurant".into(),
            description: "Restaurant customer service desk".into(),
            system_prompt: RESTAURANT_PROMPT.into(),
            tools: RESTAURANT_TOOLS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn copilot() -> Self {
        Self {
            name: "copilot".into(),
            description: "In-car companion with ordering, parking, travel and calendar".into(),
            system_prompt: COPILOT_PROMPT.into(),
            tools: COPILOT_TOOLS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Fill the prompt template for the given instant.
    pub fn render_system_prompt(&self, now: DateTime<Utc>, tz: Tz) -> String {
        let local = now.with_timezone(&tz);
        self.system_prompt
            .replace("{now}", &local.format("%A, %B %-d, %Y at %H:%M").to_string())
            .replace("{today}", &local.format("%A, %B %-d, %Y").to_string())
            .replace("{timezone}", tz.name())
    }

    /// Every tool the profile names must be registered.
    pub fn validate(&self, registry: &ToolRegistry) -> Result<()> {
        let missing: Vec<&str> = self
            .tools
            .iter()
            .filter(|t| !registry.contains(t))
            .map(|t| t.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Config(format!(
                "agent '{}' references unregistered tools: {}",
                self.name,
                missing.join(", ")
            )))
        }
    }
}

/// Config-file overrides for a profile.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub description: Option<String>,
    pub system_prompt: Option<String>,
    /// Replace the tool list.
    pub tools: Option<Vec<String>>,
    /// Add to the tool list.
    pub extra_tools: Vec<String>,
}

impl ProfileConfig {
    /// Apply this profile's overrides to a base profile.
    pub fn apply_to(&self, base: &AgentProfile) -> AgentProfile {
        let mut p = base.clone();

        if let Some(description) = &self.description {
            p.description = description.clone();
        }
        if let Some(prompt) = &self.system_prompt {
            p.system_prompt = prompt.clone();
        }
        if let Some(tools) = &self.tools {
            p.tools = tools.clone();
        }
        for tool in &self.extra_tools {
            if !p.tools.contains(tool) {
                p.tools.push(tool.clone());
            }
        }

        p
    }
}

pub fn builtin_profiles() -> Vec<AgentProfile> {
    vec![AgentProfile::restaurant(), AgentProfile::copilot()]
}

/// Resolve a profile by name: built-in first, then config overrides. A name
/// only present in config must supply its own prompt.
pub fn resolve_profile(
    name: &str,
    overrides: &HashMap<String, ProfileConfig>,
) -> Result<AgentProfile> {
    let base = builtin_profiles().into_iter().find(|p| p.name == name);
    match (base, overrides.get(name)) {
        (Some(base), Some(o)) => Ok(o.apply_to(&base)),
        (Some(base), None) => Ok(base),
        (None, Some(o)) => {
            let prompt = o.system_prompt.clone().ok_or_else(|| {
                AgentError::Config(format!("agent '{}' needs a system_prompt", name))
            })?;
            let empty = AgentProfile {
                name: name.to_string(),
                description: String::new(),
                system_prompt: prompt,
                tools: Vec::new(),
            };
            Ok(o.apply_to(&empty))
        }
        (None, None) => Err(AgentError::Config(format!("unknown agent '{}'", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_builtin_profiles_share_one_registry_vocabulary() {
        let restaurant = AgentProfile::restaurant();
        let copilot = AgentProfile::copilot();
        assert_eq!(restaurant.tools, vec!["get_restaurant_menu"]);
        assert!(copilot.tools.contains(&"place_order".to_string()));
        assert_eq!(copilot.tools.len(), 11);
    }

    #[test]
    fn test_render_prompt_uses_local_time() {
        let now = Utc.with_ymd_and_hms(2025, 11, 19, 22, 30, 0).unwrap();
        let prompt = AgentProfile::copilot().render_system_prompt(now, chrono_tz::Europe::Helsinki);
        // 22:30 UTC is already the next day in Helsinki.
        assert!(prompt.contains("Thursday, November 20, 2025 at 00:30"));
        assert!(prompt.contains("Europe/Helsinki"));
        assert!(!prompt.contains("{now}"));
    }

    #[test]
    fn test_profile_override_replaces_and_extends() {
        let o = ProfileConfig {
            system_prompt: Some("Be terse.".into()),
            extra_tools: vec!["get_parking_options".into(), "get_restaurant_menu".into()],
            ..Default::default()
        };
        let p = o.apply_to(&AgentProfile::restaurant());
        assert_eq!(p.system_prompt, "Be terse.");
        assert_eq!(p.tools, vec!["get_restaurant_menu", "get_parking_options"]);
    }

    #[test]
    fn test_resolve_profile() {
        let mut overrides = HashMap::new();
        assert_eq!(resolve_profile("copilot", &overrides).unwrap().name, "copilot");
        assert!(resolve_profile("valet", &overrides).is_err());

        overrides.insert(
            "valet".to_string(),
            ProfileConfig {
                tools: Some(vec!["get_parking_options".into()]),
                ..Default::default()
            },
        );
        assert!(resolve_profile("valet", &overrides).is_err());

        overrides.get_mut("valet").unwrap().system_prompt = Some("Park cars.".into());
        let valet = resolve_profile("valet", &overrides).unwrap();
        assert_eq!(valet.tools, vec!["get_parking_options"]);
    }

    #[test]
    fn test_validate_against_registry() {
        let registry = ToolRegistry::new();
        let err = AgentProfile::restaurant().validate(&registry).unwrap_err();
        assert!(err.to_string().contains("get_restaurant_menu"));
    }

    #[test]
    fn test_profile_config_toml() {
        let parsed: ProfileConfig = toml::from_str(
            r#"
            description = "Dev"
            extra_tools = ["get_hotels"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.description.as_deref(), Some("Dev"));
        assert!(parsed.tools.is_none());
    }
}
