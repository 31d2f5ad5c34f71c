//! Normalization boundary between backend payloads and [`Reservation`].
//!
//! Two shapes are accepted:
//! - the canonical camelCase shape (what `Reservation` serializes to), and
//! - the flat document shape served by the original car-rental backend,
//!   recognisable by its `_id` key.
//!
//! Nothing past this module sees a wire shape.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::model::{CarRef, RentalWindow, RenterRef, Reservation, ReservationHint, ReservationStatus};
use crate::sync::SyncError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyReservation {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    cnic: String,
    #[serde(default)]
    contact_number: String,
    from_date: String,
    end_date: String,
    car_model: String,
    registration_number: String,
    #[serde(default)]
    payment_method: String,
    reservation_status: String,
    rent_car_company: CompanyRef,
    #[serde(default)]
    user: Option<LegacyUser>,
    created_at: String,
    #[serde(default)]
    updated_at: Option<String>,
}

/// `rentCarCompany` is either the bare id or the populated company document.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CompanyRef {
    Id(String),
    Populated {
        #[serde(rename = "_id")]
        id: String,
    },
}

impl CompanyRef {
    fn into_id(self) -> String {
        match self {
            CompanyRef::Id(id) | CompanyRef::Populated { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LegacyUser {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl TryFrom<LegacyReservation> for Reservation {
    type Error = SyncError;

    fn try_from(w: LegacyReservation) -> Result<Self, Self::Error> {
        let status: ReservationStatus = w.reservation_status.parse().map_err(|_| {
            SyncError::Decode(format!(
                "reservation {}: unknown status {:?}",
                w.id, w.reservation_status
            ))
        })?;
        let created_at = parse_timestamp(&w.created_at)?;
        let updated_at = match w.updated_at.as_deref() {
            Some(s) => parse_timestamp(s)?,
            None => created_at,
        };
        let (user_id, email) = w.user.map_or((None, None), |u| (u.id, u.email));

        Ok(Reservation {
            id: w.id,
            company_id: w.rent_car_company.into_id(),
            car: CarRef {
                model: w.car_model,
                registration_number: w.registration_number,
            },
            renter: RenterRef {
                user_id,
                email,
                national_id: w.cnic,
                contact_number: w.contact_number,
            },
            window: RentalWindow {
                start: parse_timestamp(&w.from_date)?,
                end: parse_timestamp(&w.end_date)?,
            },
            payment_method: w.payment_method,
            status,
            created_at,
            updated_at,
        })
    }
}

/// RFC 3339, or a bare `YYYY-MM-DD` taken as midnight UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, SyncError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| SyncError::Decode(format!("unparseable timestamp {s:?}")))
}

pub fn decode_reservation(value: Value) -> Result<Reservation, SyncError> {
    if value.get("_id").is_some() {
        let wire: LegacyReservation =
            serde_json::from_value(value).map_err(|e| SyncError::Decode(e.to_string()))?;
        wire.try_into()
    } else {
        serde_json::from_value(value).map_err(|e| SyncError::Decode(e.to_string()))
    }
}

/// The fields a new-reservation trigger needs, from either shape.
#[derive(Debug, Deserialize)]
struct HintFields {
    #[serde(rename = "companyId", alias = "rentCarCompany")]
    company: CompanyRef,
    #[serde(rename = "_id", alias = "id", default)]
    id: Option<String>,
    #[serde(rename = "carModel", default)]
    car_model: Option<String>,
    #[serde(default)]
    car: Option<HintCar>,
}

#[derive(Debug, Deserialize)]
struct HintCar {
    #[serde(default)]
    model: Option<String>,
}

/// Read only the company reference (and, when present, id and car model)
/// out of a reservation payload. Fails when no company is named.
pub fn decode_reservation_hint(value: Value) -> Result<ReservationHint, SyncError> {
    let fields: HintFields =
        serde_json::from_value(value).map_err(|e| SyncError::Decode(e.to_string()))?;
    let company_id = fields.company.into_id();
    if company_id.trim().is_empty() {
        return Err(SyncError::Decode("reservation names no company".into()));
    }
    Ok(ReservationHint {
        company_id,
        id: fields.id,
        car_model: fields.car_model.or(fields.car.and_then(|c| c.model)),
    })
}

/// Decode a list response: a bare array or `{ "data": [...] }`.
///
/// One bad record fails the whole list.
pub fn decode_list(value: Value) -> Result<Vec<Reservation>, SyncError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items,
            _ => return Err(SyncError::Decode("expected a list of reservations".into())),
        },
        _ => return Err(SyncError::Decode("expected a list of reservations".into())),
    };
    items.into_iter().map(decode_reservation).collect()
}
