//! Named events delivered over a channel.
//!
//! An event is a name plus a JSON payload. The two events the subsystem
//! emits itself are `connected` (sent once when a subscription opens) and
//! `payment` (a status update for an order). Both payloads use camelCase
//! field names on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event name sent once when a subscription is established.
pub const CONNECTED_EVENT: &str = "connected";

/// Event name used for payment status updates.
pub const PAYMENT_EVENT: &str = "payment";

/// A named event with a structured payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    name: String,
    data: serde_json::Value,
}

impl ChannelEvent {
    /// Create an event from a name and an already-built JSON payload.
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Create an event by serializing a typed payload.
    ///
    /// # Errors
    /// Returns the serializer error if `payload` cannot be represented as JSON.
    pub fn from_payload<T: Serialize>(
        name: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(name, serde_json::to_value(payload)?))
    }

    /// The event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The event payload.
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Decode the payload into a typed value.
    pub fn decode<T>(&self) -> Result<T, serde_json::Error>
    where
        T: for<'de> Deserialize<'de>,
    {
        T::deserialize(&self.data)
    }

    /// Render the event as a Server-Sent-Events frame.
    ///
    /// ```
    /// use pulse_guard::ChannelEvent;
    ///
    /// let event = ChannelEvent::new("payment", serde_json::json!({"status": "PAID"}));
    /// assert_eq!(event.to_sse_frame(), "event: payment\ndata: {\"status\":\"PAID\"}\n\n");
    /// ```
    pub fn to_sse_frame(&self) -> String {
        // serde_json never emits raw newlines for a Value, so a single data line is enough.
        format!("event: {}\ndata: {}\n\n", self.name, self.data)
    }
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data)
    }
}

/// Payload of the `connected` confirmation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub message: String,
    pub order_id: String,
}

/// Payload of a `payment` status event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdate {
    pub order_id: String,
    pub status: String,
    pub message: String,
    /// Empty when the payment provider did not return an identifier.
    pub transaction_id: String,
    /// Epoch milliseconds at the moment the update was pushed.
    pub timestamp: i64,
}

impl PaymentUpdate {
    pub fn new(
        order_id: impl Into<String>,
        status: impl Into<String>,
        message: impl Into<String>,
        transaction_id: Option<&str>,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            status: status.into(),
            message: message.into(),
            transaction_id: transaction_id.unwrap_or_default().to_string(),
            timestamp,
        }
    }
}
