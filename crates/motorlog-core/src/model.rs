//! Domain records for the vehicle logbook
//!
//! Each record type declares the shape of its stored form next to its
//! serde representation; the two must stay in lock-step, which the
//! round-trip tests below pin down. Shape changes ship as migrations.

use chrono::{DateTime, Utc};
use motorlog_store::schema::{Document, Field, Shape, StructShape};
use motorlog_store::{ContentType, DocumentId, FileName};
use serde::{Deserialize, Serialize};

/// One vehicle in the garage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub name: String,
    pub make: String,
    pub model: String,
    pub year: i64,
    pub vin: Option<String>,
    /// Archived vehicles are hidden from day-to-day views but keep
    /// their history.
    pub archived: bool,
}

impl Vehicle {
    pub fn new(
        name: impl Into<String>,
        make: impl Into<String>,
        model: impl Into<String>,
        year: i64,
    ) -> Self {
        Self {
            name: name.into(),
            make: make.into(),
            model: model.into(),
            year,
            vin: None,
            archived: false,
        }
    }
}

impl Document for Vehicle {
    const COLLECTION: &'static str = "vehicles";

    fn shape() -> StructShape {
        StructShape::new(
            "Vehicle",
            vec![
                Field::new("name", Shape::String),
                Field::new("make", Shape::String),
                Field::new("model", Shape::String),
                Field::new("year", Shape::Int),
                Field::new("vin", Shape::optional(Shape::String)),
                Field::new("archived", Shape::Bool),
            ],
        )
    }
}

/// One fuel fill-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillUp {
    pub vehicle_id: DocumentId,
    pub filled_at: DateTime<Utc>,
    pub odometer_km: i64,
    pub liters: f64,
    pub price_per_liter: f64,
    pub total_price: f64,
    /// Tank not filled to the brim; consumption calculations must span
    /// to the next full fill-up.
    pub partial: bool,
}

impl Document for FillUp {
    const COLLECTION: &'static str = "fill_ups";

    fn shape() -> StructShape {
        StructShape::new(
            "FillUp",
            vec![
                Field::new("vehicle_id", Shape::String),
                Field::new("filled_at", Shape::Timestamp),
                Field::new("odometer_km", Shape::Int),
                Field::new("liters", Shape::Float),
                Field::new("price_per_liter", Shape::Float),
                Field::new("total_price", Shape::Float),
                Field::new("partial", Shape::Bool),
            ],
        )
    }
}

/// A dated event in a vehicle's life: service, repair, inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleEvent {
    pub vehicle_id: DocumentId,
    pub occurred_at: DateTime<Utc>,
    pub kind: String,
    pub odometer_km: Option<i64>,
    pub notes: Option<String>,
    pub cost: Option<f64>,
}

impl Document for VehicleEvent {
    const COLLECTION: &'static str = "vehicle_events";

    fn shape() -> StructShape {
        StructShape::new(
            "VehicleEvent",
            vec![
                Field::new("vehicle_id", Shape::String),
                Field::new("occurred_at", Shape::Timestamp),
                Field::new("kind", Shape::String),
                Field::new("odometer_km", Shape::optional(Shape::Int)),
                Field::new("notes", Shape::optional(Shape::String)),
                Field::new("cost", Shape::optional(Shape::Float)),
            ],
        )
    }
}

/// A photo attached to a vehicle. The binary content lives in the blob
/// store under `file_name`; this record is only the reference and its
/// display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub vehicle_id: DocumentId,
    pub file_name: FileName,
    pub content_type: ContentType,
    pub title: Option<String>,
    pub taken_at: Option<DateTime<Utc>>,
}

impl Document for Photo {
    const COLLECTION: &'static str = "photos";

    fn shape() -> StructShape {
        StructShape::new(
            "Photo",
            vec![
                Field::new("vehicle_id", Shape::String),
                Field::new("file_name", Shape::String),
                Field::new("content_type", Shape::String),
                Field::new("title", Shape::optional(Shape::String)),
                Field::new("taken_at", Shape::optional(Shape::Timestamp)),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motorlog_store::schema::{decode, encode};

    fn vehicle_id() -> DocumentId {
        DocumentId::try_from("veh-1".to_string()).unwrap()
    }

    #[test]
    fn vehicle_round_trips() {
        let vehicle = Vehicle {
            vin: Some("JHMFC1650KX012345".to_string()),
            ..Vehicle::new("Daily", "Honda", "Civic", 2019)
        };
        let doc = encode(&vehicle).unwrap();
        assert_eq!(decode::<Vehicle>(&doc).unwrap(), vehicle);
    }

    #[test]
    fn fill_up_round_trips() {
        let fill_up = FillUp {
            vehicle_id: vehicle_id(),
            filled_at: "2025-06-14T17:42:00Z".parse().unwrap(),
            odometer_km: 48_350,
            liters: 41.7,
            price_per_liter: 1.89,
            total_price: 78.81,
            partial: false,
        };
        let doc = encode(&fill_up).unwrap();
        assert_eq!(decode::<FillUp>(&doc).unwrap(), fill_up);
    }

    #[test]
    fn event_round_trips_with_empty_optionals() {
        let event = VehicleEvent {
            vehicle_id: vehicle_id(),
            occurred_at: "2025-03-02T10:00:00Z".parse().unwrap(),
            kind: "inspection".to_string(),
            odometer_km: None,
            notes: None,
            cost: None,
        };
        let doc = encode(&event).unwrap();
        assert_eq!(decode::<VehicleEvent>(&doc).unwrap(), event);
    }

    #[test]
    fn photo_round_trips() {
        let photo = Photo {
            vehicle_id: vehicle_id(),
            file_name: FileName::new("front-left.jpg").unwrap(),
            content_type: ContentType::new("image/jpeg").unwrap(),
            title: Some("After the respray".to_string()),
            taken_at: None,
        };
        let doc = encode(&photo).unwrap();
        assert_eq!(decode::<Photo>(&doc).unwrap(), photo);
    }
}
