//! Delivery scheduling and tracking.
//!
//! ```text
//! scheduled -> out_for_delivery -> delivered
//!     |               |
//!     +----> failed <-+
//!              |
//!              +----> scheduled   (re-attempt)
//! ```

use crate::error::{DomainError, Result};
use crate::ids::{DeliveryId, OrderId};
use crate::BoxFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting for a courier slot
    Scheduled,
    /// On the road
    OutForDelivery,
    /// Handed over; the order becomes delivered
    Delivered,
    /// Attempt failed; may be rescheduled
    Failed,
}

impl DeliveryStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    /// Whether a delivery may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::OutForDelivery | Self::Failed)
                | (Self::OutForDelivery, Self::Delivered | Self::Failed)
                | (Self::Failed, Self::Scheduled)
        )
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Conflict`] for a transition the machine forbids.
    pub fn ensure_transition(self, next: Self) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "Delivery cannot move from {self} to {next}"
            )))
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::validation(format!(
                "Unknown delivery status: {other}"
            ))),
        }
    }
}

/// Admin input for scheduling a delivery.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewDelivery {
    /// Paid order to deliver
    pub order_id: OrderId,
    /// Courier name or service
    pub courier: String,
    /// Estimated arrival
    #[serde(default)]
    pub estimated_arrival: Option<DateTime<Utc>>,
}

impl NewDelivery {
    /// Validate and normalize the input.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] for a blank courier.
    pub fn validate(mut self) -> Result<Self> {
        self.courier = self.courier.trim().to_string();
        if self.courier.is_empty() {
            return Err(DomainError::validation("Courier must not be empty"));
        }
        Ok(self)
    }
}

/// A delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Delivery {
    /// Delivery identifier
    pub id: DeliveryId,
    /// Order being delivered
    pub order_id: OrderId,
    /// Courier name or service
    pub courier: String,
    /// Current status
    pub status: DeliveryStatus,
    /// Estimated arrival
    pub estimated_arrival: Option<DateTime<Utc>>,
    /// Scheduling time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

/// One entry in the tracking history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryEvent {
    /// Status entered
    pub status: DeliveryStatus,
    /// Optional courier or admin note
    pub note: Option<String>,
    /// Time of the change
    pub created_at: DateTime<Utc>,
}

/// A delivery with its full history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tracking {
    /// Current state
    pub delivery: Delivery,
    /// Events, oldest first
    pub events: Vec<DeliveryEvent>,
}

/// Delivery storage.
pub trait DeliveryRepository: Send + Sync {
    /// Schedule a delivery for a paid order.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such order
    /// - `Conflict`: order not paid, or already has a delivery
    /// - `Database`: storage failure
    fn create_delivery(&self, delivery: NewDelivery) -> BoxFuture<'_, Result<Delivery>>;

    /// Advance a delivery, recording an event.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such delivery
    /// - `Conflict`: transition not allowed
    /// - `Database`: storage failure
    fn update_status(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        note: Option<String>,
    ) -> BoxFuture<'_, Result<Delivery>>;

    /// Tracking for an order.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the order has no delivery
    /// - `Database`: storage failure
    fn tracking(&self, order: OrderId) -> BoxFuture<'_, Result<Tracking>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeliveryStatus::{Delivered, Failed, OutForDelivery, Scheduled};

    #[test]
    fn happy_path_is_allowed() {
        assert!(Scheduled.ensure_transition(OutForDelivery).is_ok());
        assert!(OutForDelivery.ensure_transition(Delivered).is_ok());
    }

    #[test]
    fn failed_deliveries_can_be_rescheduled() {
        assert!(Scheduled.can_transition_to(Failed));
        assert!(OutForDelivery.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Scheduled));
    }

    #[test]
    fn delivered_is_terminal() {
        for next in [Scheduled, OutForDelivery, Failed, Delivered] {
            assert!(!Delivered.can_transition_to(next));
        }
    }

    #[test]
    fn skipping_the_road_is_rejected() {
        assert!(matches!(
            Scheduled.ensure_transition(Delivered),
            Err(DomainError::Conflict(_))
        ));
    }
}
