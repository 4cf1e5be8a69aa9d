//! Keyword table turning a fleet model name into listing attributes.
//!
//! The lower-cased model name is matched against [`KEYWORD_RULES`] in order;
//! each attribute comes from the first matching row that defines it.

use chrono::{Datelike, Utc};

use crate::crm::MAINTENANCE_STATE;
use crate::types::{FleetVehicle, VehicleCategory, VehicleListing};

const IMG_ALTO: &str = "https://images.unsplash.com/photo-1605559424843-9e4c228bf1c2?w=400&h=250&fit=crop";
const IMG_SWIFT: &str = "https://images.unsplash.com/photo-1549399087-7e1c70431fce?w=400&h=250&fit=crop";
const IMG_INNOVA: &str = "https://images.unsplash.com/photo-1611015830912-bf5ec8a2de83?w=400&h=250&fit=crop";
const IMG_SCORPIO: &str = "https://images.unsplash.com/photo-1544636331-e26879cd4d9b?w=400&h=250&fit=crop";

pub const DEFAULT_IMAGE: &str = IMG_SWIFT;
pub const DEFAULT_PRICE: u32 = 15;
pub const DEFAULT_SEATS: u8 = 4;
pub const DEFAULT_LOCATION: &str = "Jaipur";

const FEATURES: [&str; 3] = ["AC", "Driver Included", "GPS Tracking"];

#[derive(Debug, Clone, Copy)]
pub struct KeywordRule {
    pub keyword: &'static str,
    pub category: Option<VehicleCategory>,
    pub seats: Option<u8>,
    pub price: Option<u32>,
    pub image: Option<&'static str>,
}

const fn rule(
    keyword: &'static str,
    category: VehicleCategory,
    seats: Option<u8>,
    price: Option<u32>,
    image: Option<&'static str>,
) -> KeywordRule {
    KeywordRule {
        keyword,
        category: Some(category),
        seats,
        price,
        image,
    }
}

pub const KEYWORD_RULES: [KeywordRule; 8] = [
    rule("alto", VehicleCategory::Hatchback, None, Some(12), Some(IMG_ALTO)),
    rule("swift", VehicleCategory::Hatchback, None, Some(15), Some(IMG_SWIFT)),
    rule("innova", VehicleCategory::Mpv, Some(7), Some(25), Some(IMG_INNOVA)),
    rule("ertiga", VehicleCategory::Mpv, Some(7), None, None),
    rule("scorpio", VehicleCategory::Suv, Some(7), Some(22), Some(IMG_SCORPIO)),
    rule("xuv", VehicleCategory::Suv, Some(7), Some(24), Some(IMG_SCORPIO)),
    rule("dzire", VehicleCategory::Sedan, None, Some(18), Some(IMG_SWIFT)),
    rule("aspire", VehicleCategory::Sedan, None, None, None),
];

/// First value `pick` yields among the rows whose keyword occurs in `name`
fn lookup<T>(name: &str, pick: impl Fn(&KeywordRule) -> Option<T>) -> Option<T> {
    KEYWORD_RULES
        .iter()
        .filter(|r| name.contains(r.keyword))
        .find_map(pick)
}

pub fn category_for(model_name: &str) -> VehicleCategory {
    lookup(&model_name.to_lowercase(), |r| r.category).unwrap_or(VehicleCategory::Hatchback)
}

pub fn seats_for(model_name: &str) -> u8 {
    lookup(&model_name.to_lowercase(), |r| r.seats).unwrap_or(DEFAULT_SEATS)
}

pub fn price_for(model_name: &str) -> u32 {
    lookup(&model_name.to_lowercase(), |r| r.price).unwrap_or(DEFAULT_PRICE)
}

pub fn image_for(model_name: &str) -> &'static str {
    lookup(&model_name.to_lowercase(), |r| r.image).unwrap_or(DEFAULT_IMAGE)
}

/// Split "Toyota Innova Crysta" into ("Toyota", "Innova Crysta")
fn split_model_name(model_name: &str) -> (String, String) {
    let mut words = model_name.split_whitespace();
    let make = words.next().unwrap_or("Unknown").to_string();
    let rest = words.collect::<Vec<_>>().join(" ");
    let model = if rest.is_empty() { "Model".to_string() } else { rest };
    (make, model)
}

/// Build the listing card for a fleet record
pub fn to_listing(vehicle: &FleetVehicle) -> VehicleListing {
    let model_name = vehicle.model_name();
    let (make, model) = split_model_name(model_name);

    VehicleListing {
        id: vehicle.id,
        make,
        model,
        year: Utc::now().year() - 2,
        category: category_for(model_name),
        seats: seats_for(model_name),
        fuel: "Petrol".to_string(),
        transmission: "Manual".to_string(),
        price: price_for(model_name),
        image: image_for(model_name).to_string(),
        features: FEATURES.iter().map(|f| f.to_string()).collect(),
        location: vehicle
            .location
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
        license_plate: vehicle
            .license_plate
            .clone()
            .unwrap_or_else(|| "TBD".to_string()),
        is_available: vehicle.state_name() != Some(MAINTENANCE_STATE),
        remote_id: vehicle.id,
    }
}
