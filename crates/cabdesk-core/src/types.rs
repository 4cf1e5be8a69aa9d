//! ============================================================================
//! Core Types for Cabdesk
//! ============================================================================
//! Booking funnel inputs, CRM records and local vehicle listings.
//! Inputs are serialized camelCase because they double as ledger payloads
//! that the front end reads back.
//! ============================================================================

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rpc::wire::{false_as_default, false_as_none, Many2One};

/// Datetime layout the CRM expects for `date_order` and friends
pub const CRM_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp the way the CRM stores datetimes
pub fn format_crm_datetime(dt: &NaiveDateTime) -> String {
    dt.format(CRM_DATETIME_FORMAT).to_string()
}

/// Current UTC time in CRM datetime format
pub fn crm_now() -> String {
    format_crm_datetime(&Utc::now().naive_utc())
}

// ============================================================================
// Customers
// ============================================================================

/// Data needed to create a customer (partner) record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInput {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// A customer as seen by the booking flow.
/// `remote_id` stays `None` until the CRM has created the record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    #[serde(rename = "id", default)]
    pub remote_id: Option<i64>,
    #[serde(default, deserialize_with = "false_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "false_as_none")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub mobile: Option<String>,
    #[serde(rename = "street", default, deserialize_with = "false_as_none")]
    pub address: Option<String>,
}

impl Customer {
    /// Customer created remotely from the given input
    pub fn created(remote_id: i64, input: &CustomerInput) -> Self {
        Self {
            remote_id: Some(remote_id),
            name: input.name.clone(),
            email: Some(input.email.clone()).filter(|e| !e.trim().is_empty()),
            phone: Some(input.phone.clone()),
            mobile: input.mobile.clone(),
            address: input.address.clone(),
        }
    }
}

// ============================================================================
// Leads
// ============================================================================

/// CRM lead type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadKind {
    /// Booking tracking record
    Opportunity,
    /// Plain website inquiry
    Lead,
}

impl LeadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadKind::Opportunity => "opportunity",
            LeadKind::Lead => "lead",
        }
    }
}

/// Input for a new CRM lead
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadInput {
    pub title: String,
    pub contact_name: String,
    pub email: Option<String>,
    pub phone: String,
    pub description: String,
    pub kind: LeadKind,
    /// Partner the lead is linked to, if already known
    pub partner_id: Option<i64>,
}

impl LeadInput {
    /// Tracking lead describing a booking request
    pub fn for_booking(booking: &BookingInput) -> Self {
        let description = format!(
            "Taxi Booking Request:\n\
             - Vehicle: {}\n\
             - Pickup: {}\n\
             - Destination: {}\n\
             - Pickup Date: {}\n\
             - Return Date: {}\n\
             - Total Amount: ₹{}\n\
             - Payment Method: {}",
            booking.vehicle_type,
            booking.pickup_location,
            booking.drop_location.as_deref().unwrap_or("TBD"),
            optional_datetime(booking.pickup_date.as_ref()),
            optional_datetime(booking.return_date.as_ref()),
            booking.total_amount,
            booking.payment_method.as_str(),
        );

        Self {
            title: format!("Taxi Booking Inquiry - {}", booking.vehicle_type),
            contact_name: booking.name.clone(),
            email: Some(booking.email.clone()),
            phone: booking.phone.clone(),
            description,
            kind: LeadKind::Opportunity,
            partner_id: None,
        }
    }

    /// Lead for a website inquiry, linked to its partner
    pub fn for_inquiry(inquiry: &InquiryInput, partner_id: i64) -> Self {
        Self {
            title: format!("Website Inquiry - {}", inquiry.name),
            contact_name: inquiry.name.clone(),
            email: inquiry.email.clone(),
            phone: inquiry.phone.clone(),
            description: inquiry
                .message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Website inquiry".to_string()),
            kind: LeadKind::Lead,
            partner_id: Some(partner_id),
        }
    }
}

fn optional_datetime(dt: Option<&NaiveDateTime>) -> String {
    dt.map(format_crm_datetime).unwrap_or_else(|| "TBD".to_string())
}

/// A lead after the CRM accepted it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    pub remote_id: i64,
    pub title: String,
    pub contact_name: String,
    pub email: Option<String>,
    pub phone: String,
    pub description: String,
}

// ============================================================================
// Bookings
// ============================================================================

/// How the customer intends to pay
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    #[default]
    CashOnVisit,
    HalfPayment,
    AdvanceBooking,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CashOnVisit => "cash-on-visit",
            PaymentMethod::HalfPayment => "half-payment",
            PaymentMethod::AdvanceBooking => "advance-booking",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cash-on-visit" => Some(Self::CashOnVisit),
            "half-payment" => Some(Self::HalfPayment),
            "advance-booking" => Some(Self::AdvanceBooking),
            _ => None,
        }
    }
}

/// Booking form data handed over by the front end
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingInput {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub pickup_location: String,
    #[serde(default)]
    pub drop_location: Option<String>,
    #[serde(default)]
    pub pickup_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub return_date: Option<NaiveDateTime>,
    /// Display name of the vehicle, e.g. "Maruti Swift"
    pub vehicle_type: String,
    pub total_amount: f64,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub advance_amount: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl BookingInput {
    pub fn customer(&self) -> CustomerInput {
        CustomerInput {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            mobile: self.mobile.clone(),
            address: self.address.clone().filter(|a| !a.trim().is_empty()),
        }
    }
}

/// Identifiers returned by a successful booking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingReceipt {
    pub booking_id: i64,
    /// Present only when the tracking lead was created
    pub lead_id: Option<i64>,
}

/// Sales order state as read back from the CRM
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingStatus {
    #[serde(default, deserialize_with = "false_as_default")]
    pub state: String,
    #[serde(default)]
    pub amount_total: f64,
    #[serde(rename = "partner_id", default, deserialize_with = "false_as_none")]
    pub partner: Option<Many2One>,
}

/// Price breakdown shown before a booking is submitted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookingQuote {
    pub days: u64,
    pub total_price: u64,
    pub advance_due: u64,
}

/// Cap on the advance for `advance-booking`
pub const MAX_ADVANCE: u64 = 500;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

impl BookingQuote {
    /// `price` is the listing's per-unit price; one day costs `price * 100`.
    pub fn compute(
        price: u32,
        pickup: Option<NaiveDateTime>,
        return_date: Option<NaiveDateTime>,
        method: PaymentMethod,
    ) -> Self {
        let days = match (pickup, return_date) {
            (Some(from), Some(to)) => {
                let millis = (to - from).num_milliseconds().abs();
                let days = (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY;
                days.max(1) as u64
            }
            _ => 1,
        };

        // Saturates instead of overflowing on absurd date spans
        let total_price = u64::from(price).saturating_mul(days).saturating_mul(100);
        let advance_due = match method {
            PaymentMethod::CashOnVisit => 0,
            PaymentMethod::HalfPayment => total_price / 2 + total_price % 2,
            PaymentMethod::AdvanceBooking => (total_price / 5)
                .saturating_add(u64::from(total_price % 5 >= 3))
                .min(MAX_ADVANCE),
        };

        Self {
            days,
            total_price,
            advance_due,
        }
    }

    pub fn balance(&self) -> u64 {
        self.total_price - self.advance_due
    }
}

// ============================================================================
// Inquiries & trips
// ============================================================================

/// Quick inquiry form data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InquiryInput {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Records created for an inquiry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InquiryReceipt {
    pub partner_id: i64,
    pub lead_id: i64,
    pub order_id: i64,
}

/// Driver details attached to a trip task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverAssignment {
    pub name: String,
    pub phone: String,
    pub vehicle_number: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}

// ============================================================================
// Fleet
// ============================================================================

/// Fleet vehicle record as returned by `fleet.vehicle.search_read`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetVehicle {
    pub id: i64,
    #[serde(default, deserialize_with = "false_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "false_as_none")]
    pub model_id: Option<Many2One>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub license_plate: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub state_id: Option<Many2One>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub location: Option<String>,
}

impl FleetVehicle {
    /// Compound model name, e.g. "Toyota Innova Crysta"; empty when unset
    pub fn model_name(&self) -> &str {
        self.model_id.as_ref().map(|m| m.name.as_str()).unwrap_or("")
    }

    pub fn state_name(&self) -> Option<&str> {
        self.state_id.as_ref().map(|s| s.name.as_str())
    }
}

/// Vehicle category shown on listing cards
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VehicleCategory {
    Hatchback,
    Sedan,
    #[serde(rename = "MPV")]
    Mpv,
    #[serde(rename = "SUV")]
    Suv,
}

impl VehicleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleCategory::Hatchback => "Hatchback",
            VehicleCategory::Sedan => "Sedan",
            VehicleCategory::Mpv => "MPV",
            VehicleCategory::Suv => "SUV",
        }
    }
}

/// Local vehicle card built from a fleet record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleListing {
    pub id: i64,
    pub make: String,
    pub model: String,
    pub year: i32,
    #[serde(rename = "type")]
    pub category: VehicleCategory,
    pub seats: u8,
    pub fuel: String,
    pub transmission: String,
    /// Indicative price per distance unit
    pub price: u32,
    pub image: String,
    pub features: Vec<String>,
    pub location: String,
    pub license_plate: String,
    pub is_available: bool,
    pub remote_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn booking() -> BookingInput {
        BookingInput {
            name: "Asha Verma".to_string(),
            email: "asha@example.com".to_string(),
            phone: "9876543210".to_string(),
            mobile: None,
            address: Some("  ".to_string()),
            pickup_location: "Jaipur".to_string(),
            drop_location: None,
            pickup_date: Some(at(1, 9)),
            return_date: None,
            vehicle_type: "Maruti Swift".to_string(),
            total_amount: 1500.0,
            payment_method: PaymentMethod::HalfPayment,
            advance_amount: 750.0,
            notes: None,
        }
    }

    #[test]
    fn test_quote_days_round_up() {
        let quote = BookingQuote::compute(15, Some(at(1, 9)), Some(at(3, 10)), PaymentMethod::CashOnVisit);
        assert_eq!(quote.days, 3);
        assert_eq!(quote.total_price, 4500);
        assert_eq!(quote.advance_due, 0);
        assert_eq!(quote.balance(), 4500);
    }

    #[test]
    fn test_quote_same_instant_counts_one_day() {
        let quote = BookingQuote::compute(12, Some(at(1, 9)), Some(at(1, 9)), PaymentMethod::CashOnVisit);
        assert_eq!(quote.days, 1);
        assert_eq!(quote.total_price, 1200);
    }

    #[test]
    fn test_quote_advance_rules() {
        let half = BookingQuote::compute(15, None, None, PaymentMethod::HalfPayment);
        assert_eq!(half.advance_due, 750);

        let small = BookingQuote::compute(12, None, None, PaymentMethod::AdvanceBooking);
        assert_eq!(small.advance_due, 240);

        let capped = BookingQuote::compute(25, Some(at(1, 9)), Some(at(4, 9)), PaymentMethod::AdvanceBooking);
        assert_eq!(capped.total_price, 7500);
        assert_eq!(capped.advance_due, MAX_ADVANCE);
    }

    #[test]
    fn test_quote_saturates_on_extreme_spans() {
        let far_past = NaiveDate::from_ymd_opt(-200_000, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let far_future = NaiveDate::from_ymd_opt(200_000, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let quote = BookingQuote::compute(u32::MAX, Some(far_past), Some(far_future), PaymentMethod::HalfPayment);
        assert_eq!(quote.total_price, u64::MAX);
        assert_eq!(quote.advance_due, u64::MAX / 2 + 1);
        assert_eq!(quote.balance(), u64::MAX / 2);

        let capped = BookingQuote::compute(u32::MAX, Some(far_past), Some(far_future), PaymentMethod::AdvanceBooking);
        assert_eq!(capped.advance_due, MAX_ADVANCE);
    }

    #[test]
    fn test_booking_lead_description() {
        let lead = LeadInput::for_booking(&booking());
        assert_eq!(lead.title, "Taxi Booking Inquiry - Maruti Swift");
        assert_eq!(lead.kind, LeadKind::Opportunity);
        assert!(lead.description.contains("- Destination: TBD"));
        assert!(lead.description.contains("- Pickup Date: 2025-03-01 09:00:00"));
        assert!(lead.description.contains("- Total Amount: ₹1500"));
        assert!(lead.description.contains("- Payment Method: half-payment"));
    }

    #[test]
    fn test_inquiry_lead_defaults_description() {
        let inquiry = InquiryInput {
            name: "Ravi".to_string(),
            email: None,
            phone: "9000000000".to_string(),
            message: None,
        };
        let lead = LeadInput::for_inquiry(&inquiry, 42);
        assert_eq!(lead.kind, LeadKind::Lead);
        assert_eq!(lead.partner_id, Some(42));
        assert_eq!(lead.description, "Website inquiry");
    }

    #[test]
    fn test_blank_address_is_dropped_from_customer() {
        assert_eq!(booking().customer().address, None);
    }

    #[test]
    fn test_customer_from_partner_record_with_false_fields() {
        let customer: Customer = serde_json::from_value(serde_json::json!({
            "id": 7,
            "name": "Asha Verma",
            "email": "asha@example.com",
            "phone": false,
            "mobile": false
        }))
        .unwrap();
        assert_eq!(customer.remote_id, Some(7));
        assert_eq!(customer.phone, None);
        assert_eq!(customer.address, None);
    }

    #[test]
    fn test_booking_input_payload_shape() {
        let json = serde_json::to_value(booking()).unwrap();
        assert_eq!(json["pickupLocation"], "Jaipur");
        assert_eq!(json["paymentMethod"], "half-payment");
    }
}
