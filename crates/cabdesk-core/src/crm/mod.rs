//! ============================================================================
//! CRM Module - Typed domain operations over the RPC client
//! ============================================================================
//! - Customer lookup / creation (res.partner)
//! - Lead creation (crm.lead)
//! - Booking creation: sales order header + line item (sale.order[.line])
//! - Fleet listing and availability (fleet.vehicle)
//! - Inquiry submission and trip tasks
//! ============================================================================

mod service;

pub use service::{customer_payload, lead_payload, CrmError, CrmService, MAINTENANCE_STATE};

/// CRM model names
pub mod models {
    pub const PARTNER: &str = "res.partner";
    pub const SALE_ORDER: &str = "sale.order";
    pub const SALE_ORDER_LINE: &str = "sale.order.line";
    pub const FLEET_VEHICLE: &str = "fleet.vehicle";
    pub const PROJECT_TASK: &str = "project.task";
    pub const CRM_LEAD: &str = "crm.lead";
}
