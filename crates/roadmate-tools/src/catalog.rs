//! Static datasets behind the restaurant, travel and parking tools.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MenuItem {
    pub id: &'static str,
    pub name: &'static str,
    pub price: f64,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Restaurant {
    pub name: &'static str,
    /// Food type used to address the restaurant: `pizza`, `burger` or `salad`.
    pub kind: &'static str,
    pub price_point: &'static str,
    pub description: &'static str,
    pub menu: &'static [MenuItem],
}

impl Restaurant {
    pub fn item(&self, id: &str) -> Option<&'static MenuItem> {
        self.menu.iter().find(|i| i.id.eq_ignore_ascii_case(id))
    }
}

pub const NEARBY: &[Restaurant] = &[
    Restaurant {
        name: "Pizza Palace",
        kind: "pizza",
        price_point: "moderate",
        description: "Italian-style pizzas with fresh ingredients",
        menu: &[
            MenuItem { id: "p1", name: "Margherita", price: 9.99, description: "Tomato, mozzarella and basil" },
            MenuItem { id: "p2", name: "Pepperoni", price: 11.49, description: "Spicy pepperoni and mozzarella" },
            MenuItem { id: "p3", name: "Quattro Formaggi", price: 12.49, description: "Four cheeses" },
            MenuItem { id: "p4", name: "Garlic Bread", price: 4.49, description: "Oven-baked with herb butter" },
        ],
    },
    Restaurant {
        name: "Burger House",
        kind: "burger",
        price_point: "cheap",
        description: "Fast and affordable burgers",
        menu: &[
            MenuItem { id: "b1", name: "Classic Burger", price: 10.99, description: "Beef patty, lettuce, tomato" },
            MenuItem { id: "b2", name: "Cheeseburger", price: 11.99, description: "Classic burger with cheddar" },
            MenuItem { id: "b3", name: "Bacon Burger", price: 12.99, description: "Cheeseburger with crispy bacon" },
            MenuItem { id: "b4", name: "Milkshake", price: 5.99, description: "Vanilla, chocolate or strawberry" },
        ],
    },
    Restaurant {
        name: "Fresh Greens",
        kind: "salad",
        price_point: "moderate",
        description: "Healthy salads and fresh options",
        menu: &[
            MenuItem { id: "s1", name: "Caesar Salad", price: 9.49, description: "Romaine, parmesan, croutons" },
            MenuItem { id: "s2", name: "Greek Salad", price: 8.99, description: "Feta, olives, cucumber" },
            MenuItem { id: "s3", name: "Quinoa Bowl", price: 10.49, description: "Quinoa, avocado, roasted vegetables" },
            MenuItem { id: "s4", name: "Green Smoothie", price: 5.49, description: "Spinach, apple and ginger" },
        ],
    },
];

pub fn restaurant_by_kind(kind: &str) -> Option<&'static Restaurant> {
    let kind = kind.trim();
    NEARBY.iter().find(|r| {
        r.kind.eq_ignore_ascii_case(kind) || r.name.eq_ignore_ascii_case(kind)
    })
}

pub fn restaurant_kinds() -> Vec<&'static str> {
    NEARBY.iter().map(|r| r.kind).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct Hotel {
    pub id: String,
    pub name: String,
    pub city: String,
    /// `nice` or `budget`.
    pub tier: &'static str,
    pub price_per_night: f64,
    pub rating: f32,
    pub address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiningSpot {
    pub id: String,
    pub name: String,
    pub city: String,
    pub cuisine: &'static str,
    /// `fine_dining` or `casual`.
    pub style: &'static str,
    pub price_range: &'static str,
    pub address: String,
}

struct HotelSeed(&'static str, &'static str, &'static str, f64, f32, &'static str);
struct DiningSeed(&'static str, &'static str, &'static str, &'static str, &'static str, &'static str);

const HOTELS: &[HotelSeed] = &[
    HotelSeed("hel-kamp", "Hotel Kämp", "nice", 289.0, 4.8, "Pohjoisesplanadi 29, Helsinki"),
    HotelSeed("hel-st-george", "Hotel St. George", "nice", 245.0, 4.7, "Yrjönkatu 13, Helsinki"),
    HotelSeed("hel-omena", "Omena Hotel Helsinki", "budget", 89.0, 4.0, "Eerikinkatu 24, Helsinki"),
    HotelSeed("tre-lapland", "Lapland Hotels Tampere", "nice", 179.0, 4.6, "Yliopistonkatu 44, Tampere"),
    HotelSeed("tre-dream", "Dream Hostel & Hotel", "budget", 69.0, 4.3, "Åkerlundinkatu 2, Tampere"),
    HotelSeed("tku-radisson", "Radisson Blu Marina Palace", "nice", 169.0, 4.4, "Linnankatu 32, Turku"),
];

const DINING: &[DiningSeed] = &[
    DiningSeed("hel-olo", "Olo", "Nordic tasting menu", "fine_dining", "€€€€", "Pohjoisesplanadi 5, Helsinki"),
    DiningSeed("hel-palace", "Palace", "Modern Finnish", "fine_dining", "€€€€", "Eteläranta 10, Helsinki"),
    DiningSeed("hel-savoy", "Savoy", "Classic Finnish", "fine_dining", "€€€", "Eteläesplanadi 14, Helsinki"),
    DiningSeed("hel-kappeli", "Kappeli", "Bistro", "casual", "€€", "Eteläesplanadi 1, Helsinki"),
    DiningSeed("tre-c", "C", "Seasonal Nordic", "fine_dining", "€€€", "Rautatienkatu 19, Tampere"),
    DiningSeed("tre-plevna", "Plevna", "Brewery pub", "casual", "€€", "Itäinenkatu 8, Tampere"),
    DiningSeed("tku-kaskis", "Kaskis", "Nordic tasting menu", "fine_dining", "€€€€", "Kaskenkatu 6a, Turku"),
];

fn same_city(city: &str, destination: &str) -> bool {
    city.eq_ignore_ascii_case(destination.trim())
}

fn slug(destination: &str) -> String {
    destination
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

fn city_of(address: &str) -> &str {
    address.rsplit(", ").next().unwrap_or(address)
}

/// Hotels in a destination. Unknown destinations get a generic selection.
pub fn hotels_in(destination: &str) -> Vec<Hotel> {
    let known: Vec<Hotel> = HOTELS
        .iter()
        .filter(|h| same_city(city_of(h.5), destination))
        .map(|h| Hotel {
            id: h.0.into(),
            name: h.1.into(),
            city: city_of(h.5).into(),
            tier: h.2,
            price_per_night: h.3,
            rating: h.4,
            address: h.5.into(),
        })
        .collect();
    if !known.is_empty() {
        return known;
    }

    let city = destination.trim().to_string();
    let slug = slug(&city);
    vec![
        Hotel {
            id: format!("{}-grand", slug),
            name: format!("Grand Hotel {}", city),
            city: city.clone(),
            tier: "nice",
            price_per_night: 199.0,
            rating: 4.5,
            address: format!("Market Square 1, {}", city),
        },
        Hotel {
            id: format!("{}-central", slug),
            name: format!("{} Central Inn", city),
            city: city.clone(),
            tier: "budget",
            price_per_night: 79.0,
            rating: 4.0,
            address: format!("Station Road 3, {}", city),
        },
    ]
}

/// Restaurants worth a visit in a destination.
pub fn dining_in(destination: &str) -> Vec<DiningSpot> {
    let known: Vec<DiningSpot> = DINING
        .iter()
        .filter(|d| same_city(city_of(d.5), destination))
        .map(|d| DiningSpot {
            id: d.0.into(),
            name: d.1.into(),
            city: city_of(d.5).into(),
            cuisine: d.2,
            style: d.3,
            price_range: d.4,
            address: d.5.into(),
        })
        .collect();
    if !known.is_empty() {
        return known;
    }

    let city = destination.trim().to_string();
    let slug = slug(&city);
    vec![
        DiningSpot {
            id: format!("{}-table", slug),
            name: format!("The {} Table", city),
            city: city.clone(),
            cuisine: "Seasonal local",
            style: "fine_dining",
            price_range: "€€€",
            address: format!("Harbour Street 5, {}", city),
        },
        DiningSpot {
            id: format!("{}-corner", slug),
            name: format!("Corner Bistro {}", city),
            city: city.clone(),
            cuisine: "Bistro",
            style: "casual",
            price_range: "€€",
            address: format!("Main Street 12, {}", city),
        },
    ]
}

/// City encoded in a generated id such as `oulu-grand`.
fn generated_city(id: &str) -> Option<String> {
    let (slug, _) = id.rsplit_once('-')?;
    let mut chars = slug.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

/// Look a hotel up by id or by name in any known city, or by a generated id.
pub fn find_hotel(identifier: &str) -> Option<Hotel> {
    let needle = identifier.trim();
    HOTELS
        .iter()
        .map(|h| city_of(h.5))
        .flat_map(hotels_in)
        .find(|h| h.id.eq_ignore_ascii_case(needle) || h.name.eq_ignore_ascii_case(needle))
        .or_else(|| {
            let city = generated_city(&needle.to_lowercase())?;
            hotels_in(&city).into_iter().find(|h| h.id.eq_ignore_ascii_case(needle))
        })
}

pub fn find_dining(identifier: &str) -> Option<DiningSpot> {
    let needle = identifier.trim();
    DINING
        .iter()
        .map(|d| city_of(d.5))
        .flat_map(dining_in)
        .find(|d| d.id.eq_ignore_ascii_case(needle) || d.name.eq_ignore_ascii_case(needle))
        .or_else(|| {
            let city = generated_city(&needle.to_lowercase())?;
            dining_in(&city).into_iter().find(|d| d.id.eq_ignore_ascii_case(needle))
        })
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParkingSpot {
    pub name: &'static str,
    pub distance_m: u32,
    pub price_per_hour: f64,
    pub spaces_free: u32,
    pub covered: bool,
}

pub const PARKING: &[ParkingSpot] = &[
    ParkingSpot { name: "Central Garage", distance_m: 200, price_per_hour: 3.5, spaces_free: 42, covered: true },
    ParkingSpot { name: "Market Street Lot", distance_m: 450, price_per_hour: 2.0, spaces_free: 12, covered: false },
    ParkingSpot { name: "Riverside Park & Ride", distance_m: 1200, price_per_hour: 1.0, spaces_free: 130, covered: false },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearby_restaurants_have_menus() {
        assert_eq!(restaurant_kinds(), vec!["pizza", "burger", "salad"]);
        let burger = restaurant_by_kind("Burger").unwrap();
        assert_eq!(burger.name, "Burger House");
        assert_eq!(burger.item("b3").unwrap().name, "Bacon Burger");
        assert_eq!(restaurant_by_kind("Fresh Greens").unwrap().kind, "salad");
        assert!(restaurant_by_kind("sushi").is_none());
    }

    #[test]
    fn test_known_city_hotels() {
        let hotels = hotels_in("helsinki");
        assert_eq!(hotels.len(), 3);
        assert!(hotels.iter().all(|h| h.city == "Helsinki"));
    }

    #[test]
    fn test_unknown_city_gets_generic_options() {
        let hotels = hotels_in("Oulu");
        assert_eq!(hotels[0].id, "oulu-grand");
        assert_eq!(dining_in("Oulu")[0].name, "The Oulu Table");
    }

    #[test]
    fn test_find_by_id_or_name() {
        assert_eq!(find_hotel("hotel kämp").unwrap().id, "hel-kamp");
        assert_eq!(find_hotel("tre-lapland").unwrap().city, "Tampere");
        assert_eq!(find_dining("OLO").unwrap().id, "hel-olo");
        assert!(find_hotel("nowhere").is_none());
        assert_eq!(find_hotel("oulu-grand").unwrap().name, "Grand Hotel Oulu");
        assert_eq!(find_dining("oulu-corner").unwrap().name, "Corner Bistro Oulu");
        assert!(find_hotel("tre-missing").is_none());
    }
}
