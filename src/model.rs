use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::limits::MAX_COMPANY_ID_LEN;
use crate::sync::SyncError;

/// Lifecycle status of a reservation as stored by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 3] = [
        ReservationStatus::Pending,
        ReservationStatus::Confirmed,
        ReservationStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }

    /// Only PENDING → CONFIRMED and PENDING → CANCELLED exist.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (ReservationStatus::Pending, ReservationStatus::Confirmed)
                | (ReservationStatus::Pending, ReservationStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Pending)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ReservationStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or(SyncError::InvalidInput("unknown reservation status"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarRef {
    pub model: String,
    pub registration_number: String,
}

/// The customer behind a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenterRef {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub national_id: String,
    pub contact_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Canonical reservation record. Every backend shape is normalized into this
/// by [`crate::adapter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    pub company_id: String,
    pub car: CarRef,
    pub renter: RenterRef,
    pub window: RentalWindow,
    pub payment_method: String,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Non-empty set of statuses a view shows, kept in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusSet(Vec<ReservationStatus>);

impl StatusSet {
    pub fn new(statuses: impl IntoIterator<Item = ReservationStatus>) -> Result<Self, SyncError> {
        let mut v: Vec<ReservationStatus> = statuses.into_iter().collect();
        v.sort();
        v.dedup();
        if v.is_empty() {
            return Err(SyncError::InvalidInput("status set must not be empty"));
        }
        Ok(Self(v))
    }

    pub fn only(status: ReservationStatus) -> Self {
        Self(vec![status])
    }

    /// Infallible constructor for a fixed, non-empty list.
    pub fn of<const N: usize>(statuses: [ReservationStatus; N]) -> Self {
        const { assert!(N > 0, "status set must not be empty") };
        let mut v = statuses.to_vec();
        v.sort();
        v.dedup();
        Self(v)
    }

    pub fn contains(&self, status: ReservationStatus) -> bool {
        self.0.contains(&status)
    }

    pub fn iter(&self) -> impl Iterator<Item = ReservationStatus> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for StatusSet {
    type Err = SyncError;

    /// Parses `"CONFIRMED,CANCELLED"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let statuses = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(statuses)
    }
}

impl fmt::Display for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, status) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(status.as_str())?;
        }
        Ok(())
    }
}

/// The (company, statuses) scope a view is mounted for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewFilter {
    company_id: String,
    statuses: StatusSet,
}

impl ViewFilter {
    pub fn new(company_id: impl Into<String>, statuses: StatusSet) -> Result<Self, SyncError> {
        let company_id = company_id.into().trim().to_string();
        if company_id.is_empty() {
            return Err(SyncError::InvalidInput("company id must not be empty"));
        }
        if company_id.len() > MAX_COMPANY_ID_LEN {
            return Err(SyncError::InvalidInput("company id too long"));
        }
        Ok(Self { company_id, statuses })
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    pub fn statuses(&self) -> &StatusSet {
        &self.statuses
    }

    /// Whether a record belongs in a store scoped by this filter.
    pub fn admits(&self, reservation: &Reservation) -> bool {
        reservation.company_id == self.company_id && self.statuses.contains(reservation.status)
    }
}

impl fmt::Display for ViewFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "company={} status={}", self.company_id, self.statuses)
    }
}

/// What the client currently shows for one reservation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    Pending,
    Confirmed,
    Cancelled,
    /// Not shown: removed after a successful status change, or excluded by
    /// the latest fetch.
    Removed,
}

impl From<ReservationStatus> for LocalState {
    fn from(status: ReservationStatus) -> Self {
        match status {
            ReservationStatus::Pending => LocalState::Pending,
            ReservationStatus::Confirmed => LocalState::Confirmed,
            ReservationStatus::Cancelled => LocalState::Cancelled,
        }
    }
}

/// Decoded push-channel event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    NewReservation(Reservation),
    /// A new-reservation event whose payload named its company but did not
    /// decode as a whole reservation.
    ReservationHint(ReservationHint),
    /// Any other named event; carried only for logging.
    Other(String),
}

/// What a partial new-reservation payload still tells: whose it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationHint {
    pub company_id: String,
    pub id: Option<String>,
    pub car_model: Option<String>,
}

impl From<&Reservation> for ReservationHint {
    fn from(r: &Reservation) -> Self {
        Self {
            company_id: r.company_id.clone(),
            id: Some(r.id.clone()),
            car_model: Some(r.car.model.clone()),
        }
    }
}
