//! ============================================================================
//! CRM Service - Customer, lead, booking and fleet operations
//! ============================================================================

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::models;
use crate::config::CrmConfig;
use crate::rpc::{RpcClient, RpcError, RpcRequest};
use crate::types::{
    crm_now, BookingInput, BookingReceipt, BookingStatus, Customer, CustomerInput, DriverAssignment,
    FleetVehicle, InquiryInput, InquiryReceipt, Lead, LeadInput,
};

const CUSTOMER_FIELDS: &[&str] = &["id", "name", "email", "phone", "mobile"];
const VEHICLE_FIELDS: &[&str] = &["id", "name", "model_id", "license_plate", "state_id", "location"];
const STATUS_FIELDS: &[&str] = &["state", "amount_total", "partner_id"];

/// Stage and team every new lead is filed under
const NEW_LEAD_STAGE: i64 = 1;
const DEFAULT_SALES_TEAM: i64 = 1;
const NORMAL_PRIORITY: &str = "1";

/// Fleet vehicle state ids used by `set_vehicle_availability`
const STATE_AVAILABLE: i64 = 1;
const STATE_MAINTENANCE: i64 = 2;

/// Fleet state excluded from availability listings
pub const MAINTENANCE_STATE: &str = "Maintenance";

#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("Failed to create customer: {0}")]
    CustomerCreation(#[source] RpcError),

    #[error("Failed to create sales order: {0}")]
    OrderHeader(#[source] RpcError),

    #[error("Sales order {order_id} created but its line item failed: {source}")]
    OrderLine {
        order_id: i64,
        #[source]
        source: RpcError,
    },

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Typed CRM operations. Cheap to clone.
#[derive(Clone)]
pub struct CrmService {
    rpc: RpcClient,
}

impl CrmService {
    pub fn new(config: CrmConfig) -> Self {
        Self {
            rpc: RpcClient::new(config),
        }
    }

    pub fn with_rpc(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    // ========================================================================
    // Customers
    // ========================================================================

    /// Look a customer up by email. Lookup failures count as "not found".
    pub async fn find_customer(&self, email: &str) -> Option<Customer> {
        let request = RpcRequest::new(models::PARTNER, "search_read")
            .arg(json!([["email", "=", email]]))
            .kwarg("fields", json!(CUSTOMER_FIELDS));

        match self.rpc.execute_as::<Vec<Customer>>(&request).await {
            Ok(customers) => customers.into_iter().next(),
            Err(e) => {
                warn!("Customer lookup for {} failed: {}", email, e);
                None
            }
        }
    }

    pub async fn create_customer(&self, input: &CustomerInput) -> Result<Customer, CrmError> {
        info!("Creating customer {}", input.email);

        let request = RpcRequest::new(models::PARTNER, "create").arg(customer_payload(input));
        let remote_id: i64 = self
            .rpc
            .execute_as(&request)
            .await
            .map_err(CrmError::CustomerCreation)?;

        info!("Customer created with ID {}", remote_id);
        Ok(Customer::created(remote_id, input))
    }

    /// Reuse the customer registered under the input's email, else create one
    async fn find_or_create_customer(&self, input: &CustomerInput) -> Result<i64, CrmError> {
        if !input.email.trim().is_empty() {
            if let Some(id) = self.find_customer(&input.email).await.and_then(|c| c.remote_id) {
                debug!("Reusing customer {} for {}", id, input.email);
                return Ok(id);
            }
        }
        let customer = self.create_customer(input).await?;
        customer
            .remote_id
            .ok_or_else(|| CrmError::CustomerCreation(missing_id(models::PARTNER)))
    }

    /// Probe access by listing a handful of customers
    pub async fn check_access(&self) -> Result<Vec<Customer>, CrmError> {
        let request = RpcRequest::new(models::PARTNER, "search_read")
            .arg(json!([["customer_rank", ">", 0]]))
            .kwarg("fields", json!(["id", "name", "email"]))
            .kwarg("limit", json!(5));

        let partners: Vec<Customer> = self.rpc.execute_as(&request).await?;
        info!("CRM access OK, found {} partners", partners.len());
        Ok(partners)
    }

    // ========================================================================
    // Leads
    // ========================================================================

    pub async fn create_lead(&self, input: &LeadInput) -> Result<Lead, CrmError> {
        info!("Creating CRM lead: {}", input.title);

        let request = RpcRequest::new(models::CRM_LEAD, "create").arg(lead_payload(input));
        let remote_id: i64 = self.rpc.execute_as(&request).await?;

        info!("Lead created with ID {}", remote_id);
        Ok(Lead {
            remote_id,
            title: input.title.clone(),
            contact_name: input.contact_name.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            description: input.description.clone(),
        })
    }

    // ========================================================================
    // Bookings
    // ========================================================================

    /// Create a booking: customer, order header, line item, then a
    /// best-effort tracking lead. Header and line are separate writes; a
    /// line failure leaves the header behind and is reported as
    /// `CrmError::OrderLine`.
    pub async fn create_booking(&self, input: &BookingInput) -> Result<BookingReceipt, CrmError> {
        info!(
            "Creating booking for {} ({})",
            input.email, input.vehicle_type
        );

        let partner_id = self.find_or_create_customer(&input.customer()).await?;

        let note = format!(
            "Taxi Booking - {} to {}",
            input.pickup_location,
            input.drop_location.as_deref().unwrap_or("TBD")
        );
        let order_id = self
            .create_draft_order(partner_id, note)
            .await
            .map_err(CrmError::OrderHeader)?;
        info!("Sales order created with ID {}", order_id);

        let line = RpcRequest::new(models::SALE_ORDER_LINE, "create").arg(json!({
            "order_id": order_id,
            "name": format!("Taxi Service - {}", input.vehicle_type),
            "product_uom_qty": 1,
            "price_unit": input.total_amount,
        }));
        self.rpc
            .execute_as::<i64>(&line)
            .await
            .map_err(|source| CrmError::OrderLine { order_id, source })?;
        debug!("Order line created for order {}", order_id);

        let lead_id = match self.create_lead(&LeadInput::for_booking(input)).await {
            Ok(lead) => Some(lead.remote_id),
            Err(e) => {
                warn!("CRM lead creation failed (booking {} still created): {}", order_id, e);
                None
            }
        };

        Ok(BookingReceipt {
            booking_id: order_id,
            lead_id,
        })
    }

    async fn create_draft_order(&self, partner_id: i64, note: String) -> Result<i64, RpcError> {
        let request = RpcRequest::new(models::SALE_ORDER, "create").arg(json!({
            "partner_id": partner_id,
            "date_order": crm_now(),
            "state": "draft",
            "note": note,
        }));
        self.rpc.execute_as(&request).await
    }

    /// Read back the state of a sales order. Failures yield `None`.
    pub async fn booking_status(&self, order_id: i64) -> Option<BookingStatus> {
        let request = RpcRequest::new(models::SALE_ORDER, "read")
            .arg(json!([order_id]))
            .kwarg("fields", json!(STATUS_FIELDS));

        match self.rpc.execute_as::<Vec<BookingStatus>>(&request).await {
            Ok(rows) => rows.into_iter().next(),
            Err(e) => {
                warn!("Booking status lookup for {} failed: {}", order_id, e);
                None
            }
        }
    }

    // ========================================================================
    // Inquiries & trips
    // ========================================================================

    /// Register a website inquiry: partner, linked lead, draft order
    pub async fn submit_inquiry(&self, input: &InquiryInput) -> Result<InquiryReceipt, CrmError> {
        info!("Submitting inquiry from {}", input.name);

        let name = if input.name.trim().is_empty() {
            "Website Inquiry".to_string()
        } else {
            input.name.clone()
        };
        let customer = CustomerInput {
            name,
            email: input.email.clone().unwrap_or_default(),
            phone: input.phone.clone(),
            mobile: None,
            address: input.message.clone().filter(|m| !m.trim().is_empty()),
        };
        let partner_id = self.find_or_create_customer(&customer).await?;

        let lead = self
            .create_lead(&LeadInput::for_inquiry(input, partner_id))
            .await?;

        let note = format!(
            "Website Inquiry: {}",
            input.message.as_deref().unwrap_or_default()
        );
        let order_id = self.create_draft_order(partner_id, note).await?;

        Ok(InquiryReceipt {
            partner_id,
            lead_id: lead.remote_id,
            order_id,
        })
    }

    /// Create a trip task for a booking with its assigned driver
    pub async fn create_trip(&self, order_id: i64, driver: &DriverAssignment) -> Result<i64, CrmError> {
        let request = RpcRequest::new(models::PROJECT_TASK, "create").arg(json!({
            "name": format!("Trip for Booking #{}", order_id),
            "x_booking_id": order_id,
            "x_driver_name": driver.name,
            "x_driver_phone": driver.phone,
            "x_vehicle_number": driver.vehicle_number,
            "stage_id": 1,
            "user_id": driver.user_id.map(Value::from).unwrap_or(Value::Bool(false)),
        }));
        let task_id: i64 = self.rpc.execute_as(&request).await?;
        info!("Trip task {} created for booking {}", task_id, order_id);
        Ok(task_id)
    }

    // ========================================================================
    // Fleet
    // ========================================================================

    /// Vehicles not under maintenance, optionally limited to one location
    pub async fn list_available_vehicles(
        &self,
        location: Option<&str>,
    ) -> Result<Vec<FleetVehicle>, RpcError> {
        let request = RpcRequest::new(models::FLEET_VEHICLE, "search_read")
            .arg(json!([["state_id.name", "!=", MAINTENANCE_STATE]]))
            .kwarg("fields", json!(VEHICLE_FIELDS));

        let vehicles: Vec<FleetVehicle> = self.rpc.execute_as(&request).await?;
        Ok(match location {
            Some(wanted) => vehicles
                .into_iter()
                .filter(|v| v.location.as_deref() == Some(wanted))
                .collect(),
            None => vehicles,
        })
    }

    /// Like [`Self::list_available_vehicles`] but never fails
    pub async fn get_available_vehicles(&self, location: Option<&str>) -> Vec<FleetVehicle> {
        self.list_available_vehicles(location)
            .await
            .unwrap_or_else(|e| {
                warn!("Fleet listing failed: {}", e);
                Vec::new()
            })
    }

    pub async fn set_vehicle_availability(&self, vehicle_id: i64, available: bool) -> Result<(), CrmError> {
        let state_id = if available {
            STATE_AVAILABLE
        } else {
            STATE_MAINTENANCE
        };
        let request = RpcRequest::new(models::FLEET_VEHICLE, "write")
            .arg(json!([vehicle_id]))
            .arg(json!({ "state_id": state_id }));
        self.rpc.execute(&request).await?;
        info!("Vehicle {} availability set to {}", vehicle_id, available);
        Ok(())
    }
}

/// Minimal partner payload; mobile and street only when they add information
pub fn customer_payload(input: &CustomerInput) -> Value {
    let mut payload = Map::new();
    payload.insert("name".into(), json!(input.name));
    if !input.email.trim().is_empty() {
        payload.insert("email".into(), json!(input.email));
    }
    payload.insert("phone".into(), json!(input.phone));
    payload.insert("is_company".into(), json!(false));
    payload.insert("customer_rank".into(), json!(1));

    if let Some(mobile) = input.mobile.as_deref().filter(|m| *m != input.phone) {
        payload.insert("mobile".into(), json!(mobile));
    }
    if let Some(address) = input.address.as_deref() {
        payload.insert("street".into(), json!(address));
    }
    Value::Object(payload)
}

/// Lead payload, always filed as a new-stage, normal-priority record
pub fn lead_payload(input: &LeadInput) -> Value {
    let mut payload = json!({
        "name": input.title,
        "partner_name": input.contact_name,
        "email_from": input.email,
        "phone": input.phone,
        "mobile": input.phone,
        "description": input.description,
        "stage_id": NEW_LEAD_STAGE,
        "team_id": DEFAULT_SALES_TEAM,
        "type": input.kind.as_str(),
        "priority": NORMAL_PRIORITY,
    });
    if let Some(partner_id) = input.partner_id {
        payload["partner_id"] = json!(partner_id);
    }
    payload
}

fn missing_id(model: &str) -> RpcError {
    RpcError::UnexpectedResult {
        model: model.to_string(),
        method: "create".to_string(),
        detail: "no id returned".to_string(),
    }
}
