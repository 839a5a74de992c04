use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::coupon::code_not_blank;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Confirmed,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses only an admin may hand out.
    pub fn is_admin_decision(self) -> bool {
        matches!(self, BookingStatus::Approved | BookingStatus::Rejected)
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "approved" => Ok(BookingStatus::Approved),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "rejected" => Ok(BookingStatus::Rejected),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Unpaid,
    Paid,
}

impl PaymentState {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Unpaid => "unpaid",
            PaymentState::Paid => "paid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Email of the user who asked for the court.
    pub request_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court_id: Option<Uuid>,
    pub court_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court_type: Option<String>,
    pub date: NaiveDate,
    pub slots: Vec<String>,
    pub price: f64,
    pub status: BookingStatus,
    pub payment: PaymentState,
    /// Payment reference, set once paid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

fn no_blank_slots(slots: &[String]) -> Result<(), ValidationError> {
    if slots.iter().any(|slot| slot.trim().is_empty()) {
        return Err(ValidationError::new("blank_slot"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub court_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub court_name: String,
    pub court_type: Option<String>,
    pub date: NaiveDate,
    #[validate(length(min = 1), custom(function = "no_blank_slots"))]
    pub slots: Vec<String>,
    #[validate(range(min = 0.0))]
    pub price: f64,
    pub user_name: Option<String>,
}

impl NewBooking {
    /// A fresh request: pending and unpaid, owned by `request_by`.
    pub fn into_booking(self, request_by: String, now: DateTime<Utc>) -> Booking {
        Booking {
            request_by,
            user_name: self.user_name,
            court_id: self.court_id,
            court_name: self.court_name,
            court_type: self.court_type,
            date: self.date,
            slots: self.slots,
            price: self.price,
            status: BookingStatus::Pending,
            payment: PaymentState::Unpaid,
            booking_id: None,
            coupon: None,
            created_at: now,
            paid_at: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookingPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BookingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 100))]
    pub booking_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 32), custom(function = "code_not_blank"))]
    pub coupon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1), custom(function = "no_blank_slots"))]
    pub slots: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApproveBooking {
    pub status: BookingStatus,
}
