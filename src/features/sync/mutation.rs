//! Mutation intents recorded by the offline queue.
//!
//! Each resource type carries its own payload shapes, so a create can only
//! hold a full record, an update only a patch, and a delete only the id of
//! the record it removes.

use chrono::{NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::MarketError;

/// Collections the client writes to while it may be offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Marketplace item for sale
    Listing,
    /// Room or flat offered by a landlord
    Accommodation,
    /// Booking request against an accommodation
    Booking,
    /// Direct message between users
    Message,
}

impl ResourceType {
    /// Get the display name for this resource type.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Listing => "Listing",
            Self::Accommodation => "Accommodation",
            Self::Booking => "Booking",
            Self::Message => "Message",
        }
    }

    /// Lowercase identifier, as persisted.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Accommodation => "accommodation",
            Self::Booking => "booking",
            Self::Message => "message",
        }
    }

    /// Backend table holding records of this type.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Listing => "listings",
            Self::Accommodation => "accommodations",
            Self::Booking => "bookings",
            Self::Message => "messages",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// What a mutation does to its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// A create, update or delete against one resource.
///
/// `N` is the new-record shape and `P` the patch shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Change<N, P> {
    Create { payload: N },
    Update { resource_id: String, payload: P },
    Delete { resource_id: String },
}

impl<N, P> Change<N, P> {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
        }
    }

    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::Create { .. } => None,
            Self::Update { resource_id, .. } | Self::Delete { resource_id } => Some(resource_id),
        }
    }
}

impl<N: Serialize, P: Serialize> Change<N, P> {
    fn payload_json(&self) -> Result<Option<Value>, serde_json::Error> {
        match self {
            Self::Create { payload } => serde_json::to_value(payload).map(Some),
            Self::Update { payload, .. } => serde_json::to_value(payload).map(Some),
            Self::Delete { .. } => Ok(None),
        }
    }
}

impl<N: serde::de::DeserializeOwned, P: serde::de::DeserializeOwned> Change<N, P> {
    fn from_parts(
        operation: OperationKind,
        resource_id: Option<String>,
        payload: Option<Value>,
    ) -> Result<Self, MarketError> {
        let payload = payload.unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        match (operation, resource_id) {
            (OperationKind::Create, None) => Ok(Self::Create {
                payload: serde_json::from_value(payload)
                    .map_err(|e| MarketError::Parse(format!("Invalid create payload: {e}")))?,
            }),
            (OperationKind::Create, Some(_)) => Err(MarketError::Parse(
                "A create must not carry a resource id".to_string(),
            )),
            (OperationKind::Update, Some(resource_id)) => Ok(Self::Update {
                resource_id,
                payload: serde_json::from_value(payload)
                    .map_err(|e| MarketError::Parse(format!("Invalid update payload: {e}")))?,
            }),
            (OperationKind::Delete, Some(resource_id)) => Ok(Self::Delete { resource_id }),
            (kind, None) => Err(MarketError::Parse(format!(
                "A resource id is required for {kind}"
            ))),
        }
    }
}

/// Payload for creating a marketplace listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

/// Payload for updating a listing. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ListingStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Reserved,
    Sold,
}

/// Payload for creating an accommodation offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccommodation {
    pub title: String,
    pub address: String,
    pub monthly_rent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccommodationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_rent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Payload for requesting a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    pub accommodation_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BookingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// Payload for sending a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: String,
    pub receiver_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
}

/// A mutation intent: which resource, which change, with what data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource_type", content = "change", rename_all = "snake_case")]
pub enum Mutation {
    Listing(Change<NewListing, ListingPatch>),
    Accommodation(Change<NewAccommodation, AccommodationPatch>),
    Booking(Change<NewBooking, BookingPatch>),
    Message(Change<NewMessage, MessagePatch>),
}

impl Mutation {
    /// Build a mutation from loosely typed parts, checking the payload
    /// against the resource's shape.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::Parse` if the id presence does not match the
    /// operation or the payload does not fit the resource type.
    pub fn from_parts(
        resource_type: ResourceType,
        operation: OperationKind,
        resource_id: Option<String>,
        payload: Option<Value>,
    ) -> Result<Self, MarketError> {
        Ok(match resource_type {
            ResourceType::Listing => {
                Self::Listing(Change::from_parts(operation, resource_id, payload)?)
            },
            ResourceType::Accommodation => {
                Self::Accommodation(Change::from_parts(operation, resource_id, payload)?)
            },
            ResourceType::Booking => {
                Self::Booking(Change::from_parts(operation, resource_id, payload)?)
            },
            ResourceType::Message => {
                Self::Message(Change::from_parts(operation, resource_id, payload)?)
            },
        })
    }

    #[must_use]
    pub const fn resource_type(&self) -> ResourceType {
        match self {
            Self::Listing(_) => ResourceType::Listing,
            Self::Accommodation(_) => ResourceType::Accommodation,
            Self::Booking(_) => ResourceType::Booking,
            Self::Message(_) => ResourceType::Message,
        }
    }

    #[must_use]
    pub const fn operation(&self) -> OperationKind {
        match self {
            Self::Listing(c) => c.kind(),
            Self::Accommodation(c) => c.kind(),
            Self::Booking(c) => c.kind(),
            Self::Message(c) => c.kind(),
        }
    }

    /// Id of the existing record this mutation targets (update/delete only).
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::Listing(c) => c.resource_id(),
            Self::Accommodation(c) => c.resource_id(),
            Self::Booking(c) => c.resource_id(),
            Self::Message(c) => c.resource_id(),
        }
    }

    /// Request body for the backend; `None` for deletes.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded as JSON.
    pub fn payload_json(&self) -> Result<Option<Value>, serde_json::Error> {
        match self {
            Self::Listing(c) => c.payload_json(),
            Self::Accommodation(c) => c.payload_json(),
            Self::Booking(c) => c.payload_json(),
            Self::Message(c) => c.payload_json(),
        }
    }

    /// Short label such as `listing/create`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.resource_type().as_str(), self.operation())
    }
}

/// A mutation as persisted in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Identity of this entry; two identical writes still get distinct ids
    pub id: Uuid,
    /// Epoch milliseconds at enqueue time
    pub enqueued_at: i64,
    pub mutation: Mutation,
}

impl QueuedMutation {
    /// Stamp a mutation with the current time.
    #[must_use]
    pub fn now(mutation: Mutation) -> Self {
        Self {
            id: Uuid::new_v4(),
            enqueued_at: Utc::now().timestamp_millis(),
            mutation,
        }
    }

    #[must_use]
    pub fn enqueued_at_utc(&self) -> Option<chrono::DateTime<Utc>> {
        chrono::DateTime::from_timestamp_millis(self.enqueued_at)
    }
}
