pub mod calendar;
pub mod catalog;
pub mod itinerary;
pub mod menu_api;
pub mod parking;
pub mod restaurants;
pub mod travel;

use roadmate_core::config::{AppConfig, CalendarBackend};
use roadmate_core::error::Result;
use roadmate_core::tool_registry::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;

use calendar::{CalendarProvider, GoogleCalendar, InMemoryCalendar};

/// Build the calendar backend selected in config.
pub fn calendar_provider(config: &AppConfig) -> Result<Arc<dyn CalendarProvider>> {
    match config.calendar.backend {
        CalendarBackend::Memory => Ok(Arc::new(InMemoryCalendar::new())),
        CalendarBackend::Google => {
            let timeout = Duration::from_secs(config.tools.http_timeout_secs);
            Ok(Arc::new(GoogleCalendar::new(&config.calendar, config.time_zone()?, timeout)?))
        }
    }
}

/// Register all built-in tools into the registry.
pub fn register_all(registry: &mut ToolRegistry, config: &AppConfig) -> Result<()> {
    let tz = config.time_zone()?;
    let timeout = Duration::from_secs(config.tools.http_timeout_secs);
    let calendar = calendar_provider(config)?;
    let menu_base = config.tools.resolved_menu_api_base();

    registry.register(Arc::new(restaurants::GetNearbyRestaurantsTool))?;
    registry.register(Arc::new(restaurants::GetMenuTool))?;
    registry.register(Arc::new(restaurants::PlaceOrderTool::new(tz)))?;
    registry.register(Arc::new(menu_api::GetRestaurantMenuTool::new(menu_base.as_deref(), timeout)?))?;
    registry.register(Arc::new(parking::GetParkingOptionsTool))?;
    registry.register(Arc::new(travel::GetHotelsTool))?;
    registry.register(Arc::new(travel::BookHotelTool))?;
    registry.register(Arc::new(travel::GetRestaurantRecommendationsTool))?;
    registry.register(Arc::new(travel::BookRestaurantTool))?;
    registry.register(Arc::new(itinerary::BuildItineraryTool))?;
    registry.register(Arc::new(calendar::GetCalendarEventsTool::new(calendar.clone(), tz)))?;
    registry.register(Arc::new(calendar::CreateCalendarEventTool::new(calendar, tz)))?;
    Ok(())
}
