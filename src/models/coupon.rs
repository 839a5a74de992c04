use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    /// Always upper-case.
    pub code: String,
    /// Percent off, 1..=100.
    pub discount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Codes compare case-insensitively, so store and look them up upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub(crate) fn code_not_blank(code: &str) -> Result<(), ValidationError> {
    if code.trim().is_empty() {
        return Err(ValidationError::new("blank_code"));
    }
    Ok(())
}

impl Coupon {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Discounted price, rounded to cents.
    pub fn apply(&self, price: f64) -> f64 {
        let discounted = price * (100.0 - self.discount) / 100.0;
        (discounted.max(0.0) * 100.0).round() / 100.0
    }

    pub fn quote(&self, price: f64) -> CouponQuote {
        CouponQuote {
            code: self.code.clone(),
            discount: self.discount,
            original_price: price,
            final_price: self.apply(price),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCoupon {
    #[validate(length(min = 1, max = 32), custom(function = "code_not_blank"))]
    pub code: String,
    #[validate(range(min = 1.0, max = 100.0))]
    pub discount: f64,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewCoupon {
    pub fn into_coupon(self) -> Coupon {
        Coupon {
            code: normalize_code(&self.code),
            discount: self.discount,
            description: self.description,
            expires_at: self.expires_at,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CouponPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub discount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyCoupon {
    #[validate(length(min = 1, max = 32), custom(function = "code_not_blank"))]
    pub code: String,
    #[validate(range(min = 0.0))]
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponQuote {
    pub code: String,
    pub discount: f64,
    pub original_price: f64,
    pub final_price: f64,
}
