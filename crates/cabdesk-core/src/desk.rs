//! ============================================================================
//! Booking Desk - Submission entry point for the booking front end
//! ============================================================================
//! Submissions go to the CRM; anything that fails is written to the
//! failed-operation ledger and reported as saved instead of as a raw error.
//! The operator tool replays the ledgers through the same code path.
//! ============================================================================

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::crm::CrmService;
use crate::db::{LedgerDb, LedgerKind, LedgerStats, INQUIRY_SHOWN};
use crate::ledger::{Ledger, RetrySummary};
use crate::types::{BookingInput, BookingReceipt, InquiryInput, InquiryReceipt};

/// What the front end shows after a submission
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionOutcome<T> {
    /// The CRM accepted the submission
    Confirmed(T),
    /// The CRM was unreachable or refused; the input is in the ledger
    Saved { error: String },
}

impl<T> SubmissionOutcome<T> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, SubmissionOutcome::Confirmed(_))
    }
}

pub struct BookingDesk {
    crm: CrmService,
    db: Arc<LedgerDb>,
    bookings: Ledger,
    inquiries: Ledger,
}

impl BookingDesk {
    pub fn new(crm: CrmService, db: Arc<LedgerDb>) -> Self {
        Self {
            bookings: Ledger::new(db.clone(), LedgerKind::Bookings),
            inquiries: Ledger::new(db.clone(), LedgerKind::Inquiries),
            crm,
            db,
        }
    }

    pub fn crm(&self) -> &CrmService {
        &self.crm
    }

    pub fn ledger(&self, kind: LedgerKind) -> &Ledger {
        match kind {
            LedgerKind::Bookings => &self.bookings,
            LedgerKind::Inquiries => &self.inquiries,
        }
    }

    pub async fn submit_booking(&self, input: &BookingInput) -> SubmissionOutcome<BookingReceipt> {
        match self.crm.create_booking(input).await {
            Ok(receipt) => {
                info!("Booking confirmed: order {}", receipt.booking_id);
                SubmissionOutcome::Confirmed(receipt)
            }
            Err(e) => {
                let message = e.to_string();
                self.bookings.record(payload_of(input), message.clone());
                SubmissionOutcome::Saved { error: message }
            }
        }
    }

    pub async fn submit_inquiry(&self, input: &InquiryInput) -> SubmissionOutcome<InquiryReceipt> {
        match self.crm.submit_inquiry(input).await {
            Ok(receipt) => {
                info!("Inquiry received: lead {}", receipt.lead_id);
                if let Err(e) = self.db.set_flag(INQUIRY_SHOWN, true) {
                    error!("Could not persist inquiry flag: {}", e);
                }
                SubmissionOutcome::Confirmed(receipt)
            }
            Err(e) => {
                let message = e.to_string();
                self.inquiries.record(payload_of(input), message.clone());
                SubmissionOutcome::Saved { error: message }
            }
        }
    }

    /// Whether the inquiry prompt was already answered
    pub fn inquiry_shown(&self) -> Result<bool> {
        self.db.flag(INQUIRY_SHOWN)
    }

    pub fn stats(&self) -> Result<LedgerStats> {
        self.db.stats()
    }

    /// Replay saved bookings through the full booking flow.
    ///
    /// A saved entry only holds the original input. An entry that failed at
    /// the line-item step (`CrmError::OrderLine`) already left an order
    /// header in the CRM, so replaying it creates a second header. Check the
    /// order id in the saved error before replaying such entries.
    pub async fn retry_failed_bookings(&self) -> Result<RetrySummary> {
        let crm = &self.crm;
        self.bookings
            .retry_all(|payload| async move {
                let input: BookingInput = serde_json::from_value(payload)
                    .map_err(|e| anyhow!("Unreadable booking payload: {}", e))?;
                let receipt = crm.create_booking(&input).await?;
                info!("Retried booking succeeded: order {}", receipt.booking_id);
                Ok(())
            })
            .await
    }

    pub async fn retry_failed_inquiries(&self) -> Result<RetrySummary> {
        let crm = &self.crm;
        self.inquiries
            .retry_all(|payload| async move {
                let input: InquiryInput = serde_json::from_value(payload)
                    .map_err(|e| anyhow!("Unreadable inquiry payload: {}", e))?;
                let receipt = crm.submit_inquiry(&input).await?;
                info!(
                    "Retried inquiry succeeded: lead {} order {}",
                    receipt.lead_id, receipt.order_id
                );
                Ok(())
            })
            .await
    }
}

fn payload_of<T: Serialize>(input: &T) -> Value {
    serde_json::to_value(input).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::models;
    use crate::testing::{mount_auth, mount_call, rpc_error, rpc_result, test_config};
    use crate::types::PaymentMethod;
    use serde_json::json;
    use wiremock::MockServer;

    fn booking() -> BookingInput {
        BookingInput {
            name: "Asha Verma".to_string(),
            email: "asha@example.com".to_string(),
            phone: "9876543210".to_string(),
            mobile: None,
            address: None,
            pickup_location: "Jaipur".to_string(),
            drop_location: None,
            pickup_date: None,
            return_date: None,
            vehicle_type: "Maruti Swift".to_string(),
            total_amount: 1500.0,
            payment_method: PaymentMethod::AdvanceBooking,
            advance_amount: 300.0,
            notes: None,
        }
    }

    fn desk(server: &MockServer) -> (tempfile::TempDir, BookingDesk) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.redb");
        let db = Arc::new(LedgerDb::open(path.to_str()).unwrap());
        let desk = BookingDesk::new(CrmService::new(test_config(&server.uri())), db);
        (dir, desk)
    }

    async fn mount_booking_flow(server: &MockServer) {
        mount_call(server, models::PARTNER, "search_read", rpc_result(json!([{"id": 7, "name": "Asha"}]))).await;
        mount_call(server, models::SALE_ORDER, "create", rpc_result(json!(100))).await;
        mount_call(server, models::SALE_ORDER_LINE, "create", rpc_result(json!(501))).await;
        mount_call(server, models::CRM_LEAD, "create", rpc_result(json!(33))).await;
    }

    #[tokio::test]
    async fn test_failed_booking_is_saved_to_ledger() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok").await;
        mount_call(&server, models::PARTNER, "search_read", rpc_result(json!([]))).await;
        mount_call(
            &server,
            models::PARTNER,
            "create",
            rpc_error(200, "Odoo Server Error", Some("Invalid email")),
        )
        .await;
        let (_dir, desk) = desk(&server);

        let outcome = desk.submit_booking(&booking()).await;
        assert!(matches!(outcome, SubmissionOutcome::Saved { ref error } if error.contains("Invalid email")));

        let saved = desk.ledger(LedgerKind::Bookings).list().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].payload["email"], "asha@example.com");
        assert_eq!(saved[0].payload["paymentMethod"], "advance-booking");
    }

    #[tokio::test]
    async fn test_line_item_failure_saves_order_id_in_error() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok").await;
        mount_call(&server, models::PARTNER, "search_read", rpc_result(json!([{"id": 7, "name": "Asha"}]))).await;
        mount_call(&server, models::SALE_ORDER, "create", rpc_result(json!(100))).await;
        mount_call(
            &server,
            models::SALE_ORDER_LINE,
            "create",
            rpc_error(200, "Odoo Server Error", Some("Product required")),
        )
        .await;
        let (_dir, desk) = desk(&server);

        let outcome = desk.submit_booking(&booking()).await;
        assert!(!outcome.is_confirmed());

        let saved = desk.ledger(LedgerKind::Bookings).list().unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].error.contains("Sales order 100"), "got {}", saved[0].error);
    }

    #[tokio::test]
    async fn test_confirmed_booking_leaves_ledger_empty() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok").await;
        mount_booking_flow(&server).await;
        let (_dir, desk) = desk(&server);

        let outcome = desk.submit_booking(&booking()).await;
        assert_eq!(
            outcome,
            SubmissionOutcome::Confirmed(BookingReceipt {
                booking_id: 100,
                lead_id: Some(33)
            })
        );
        assert_eq!(desk.stats().unwrap().failed_bookings, 0);
    }

    #[tokio::test]
    async fn test_retry_replays_saved_bookings() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok").await;
        mount_booking_flow(&server).await;
        let (_dir, desk) = desk(&server);

        desk.ledger(LedgerKind::Bookings)
            .record(payload_of(&booking()), "Network error");
        desk.ledger(LedgerKind::Bookings)
            .record(json!({"garbage": true}), "Network error");

        let summary = desk.retry_failed_bookings().await.unwrap();
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert!(summary.failures[0].error.contains("Unreadable booking payload"));

        let left = desk.ledger(LedgerKind::Bookings).list().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].payload, json!({"garbage": true}));
    }

    #[tokio::test]
    async fn test_confirmed_inquiry_sets_flag() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok").await;
        mount_call(&server, models::PARTNER, "search_read", rpc_result(json!([{"id": 12, "name": "Ravi"}]))).await;
        mount_call(&server, models::CRM_LEAD, "create", rpc_result(json!(40))).await;
        mount_call(&server, models::SALE_ORDER, "create", rpc_result(json!(200))).await;
        let (_dir, desk) = desk(&server);
        assert!(!desk.inquiry_shown().unwrap());

        let outcome = desk
            .submit_inquiry(&InquiryInput {
                name: "Ravi".to_string(),
                email: Some("ravi@example.com".to_string()),
                phone: "9000000000".to_string(),
                message: None,
            })
            .await;
        assert!(outcome.is_confirmed());
        assert!(desk.inquiry_shown().unwrap());
    }
}
