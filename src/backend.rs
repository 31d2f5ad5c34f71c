use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::adapter;
use crate::fleet::{Car, Company};
use crate::limits::MAX_ERROR_BODY_LEN;
use crate::model::{Reservation, ReservationStatus, ViewFilter};
use crate::sync::SyncError;

/// The remote API the reconciliation core depends on.
#[async_trait]
pub trait ReservationBackend: Send + Sync {
    /// Reservations of one company restricted to the filter's statuses, in
    /// backend order.
    async fn list_reservations(&self, filter: &ViewFilter) -> Result<Vec<Reservation>, SyncError>;

    /// Move one reservation to `status`.
    async fn update_status(&self, id: &str, status: ReservationStatus) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    Put,
    Patch,
}

/// How a multi-valued `status` query parameter is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEncoding {
    /// `status=A&status=B`
    Repeat,
    /// `status[]=A&status[]=B`
    Brackets,
}

/// Paths and conventions of a deployed backend. A `{id}` segment is
/// replaced by the percent-encoded id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub list_path: String,
    pub update_path: String,
    pub update_method: UpdateMethod,
    pub status_encoding: StatusEncoding,
    pub company_path: String,
    /// `PUT` with the whole company profile.
    pub company_update_path: String,
    /// `POST` a new car.
    pub cars_path: String,
    /// `PUT` a car, addressed by registration number.
    pub car_update_path: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            list_path: "/reservations".into(),
            update_path: "/reservations/{id}".into(),
            update_method: UpdateMethod::Patch,
            status_encoding: StatusEncoding::Repeat,
            company_path: "/companies/{id}".into(),
            company_update_path: "/update-company/{id}".into(),
            cars_path: "/api/cars".into(),
            car_update_path: "/api/cars/{id}".into(),
        }
    }
}

impl Endpoints {
    /// The original car-rental backend.
    pub fn legacy() -> Self {
        Self {
            list_path: "/car-rental/reservations".into(),
            update_path: "/update-reservations/{id}".into(),
            update_method: UpdateMethod::Put,
            status_encoding: StatusEncoding::Brackets,
            company_path: "/companies/{id}".into(),
            company_update_path: "/update-company/{id}".into(),
            cars_path: "/api/cars".into(),
            car_update_path: "/api/cars/{id}".into(),
        }
    }

    pub fn from_profile(profile: &str) -> Option<Self> {
        match profile.trim().to_ascii_lowercase().as_str() {
            "standard" | "" => Some(Self::default()),
            "legacy" => Some(Self::legacy()),
            _ => None,
        }
    }

    pub(crate) fn list_query(&self, filter: &ViewFilter) -> Vec<(String, String)> {
        let key = match self.status_encoding {
            StatusEncoding::Repeat => "status",
            StatusEncoding::Brackets => "status[]",
        };
        let mut query = vec![("companyId".to_string(), filter.company_id().to_string())];
        query.extend(
            filter
                .statuses()
                .iter()
                .map(|s| (key.to_string(), s.as_str().to_string())),
        );
        query
    }
}

/// Body of `POST /api/cars`: the car plus its owning company.
#[derive(Serialize)]
struct NewCar<'a> {
    #[serde(flatten)]
    car: &'a Car,
    #[serde(rename = "companyId")]
    company_id: &'a str,
}

/// [`ReservationBackend`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
    endpoints: Endpoints,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, endpoints: Endpoints, timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Network(format!("http client init failed: {e}")))?;
        let base_url = Url::parse(&base_url.into())
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https") && !u.cannot_be_a_base())
            .ok_or(SyncError::InvalidInput("api url must be an absolute http(s) url"))?;
        Ok(Self {
            http,
            base_url,
            endpoints,
            timeout,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Base url joined with `path`; `id` becomes one encoded path segment,
    /// so `/`, `?` and the like in it cannot change the route.
    fn url(&self, path: &str, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejected cannot-be-a-base urls.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            for part in path.split('/').filter(|p| !p.is_empty()) {
                match id {
                    Some(id) if part == "{id}" => segments.push(id),
                    _ => segments.push(part),
                };
            }
        }
        url
    }

    /// Company profile backing the "company details" screen.
    pub async fn fetch_company(&self, company_id: &str) -> Result<Company, SyncError> {
        let resp = self
            .http
            .get(self.url(&self.endpoints.company_path, Some(company_id)))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let body = read_json(resp, self.timeout).await?;
        serde_json::from_value(body).map_err(|e| SyncError::Decode(e.to_string()))
    }

    /// Replace the company profile with `company`, addressed by its id.
    pub async fn update_company(&self, company: &Company) -> Result<(), SyncError> {
        validate_path_id(&company.id, "company id must not be empty")?;
        let url = self.url(&self.endpoints.company_update_path, Some(&company.id));
        self.write(self.http.put(url).json(company)).await?;
        info!("company {} profile updated", company.id);
        Ok(())
    }

    /// Register a new car in `company_id`'s fleet.
    pub async fn add_car(&self, company_id: &str, car: &Car) -> Result<(), SyncError> {
        validate_path_id(company_id, "company id must not be empty")?;
        validate_path_id(&car.registration_number, "registration number must not be empty")?;
        let body = NewCar { car, company_id };
        let url = self.url(&self.endpoints.cars_path, None);
        self.write(self.http.post(url).json(&body)).await?;
        info!("car {} added to company {company_id}", car.registration_number);
        Ok(())
    }

    /// Overwrite the car currently registered as `registration_number`.
    /// `car` may carry a new registration number.
    pub async fn update_car(&self, registration_number: &str, car: &Car) -> Result<(), SyncError> {
        validate_path_id(registration_number, "registration number must not be empty")?;
        let url = self.url(&self.endpoints.car_update_path, Some(registration_number));
        self.write(self.http.put(url).json(car)).await?;
        info!("car {registration_number} updated");
        Ok(())
    }

    async fn write(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, SyncError> {
        let resp = req.send().await.map_err(|e| transport_error(e, self.timeout))?;
        check_status(resp).await
    }
}

fn validate_path_id(id: &str, empty: &'static str) -> Result<(), SyncError> {
    if id.trim().is_empty() {
        return Err(SyncError::InvalidInput(empty));
    }
    Ok(())
}

#[async_trait]
impl ReservationBackend for HttpBackend {
    async fn list_reservations(&self, filter: &ViewFilter) -> Result<Vec<Reservation>, SyncError> {
        let resp = self
            .http
            .get(self.url(&self.endpoints.list_path, None))
            .query(&self.endpoints.list_query(filter))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        adapter::decode_list(read_json(resp, self.timeout).await?)
    }

    async fn update_status(&self, id: &str, status: ReservationStatus) -> Result<(), SyncError> {
        let url = self.url(&self.endpoints.update_path, Some(id));
        let req = match self.endpoints.update_method {
            UpdateMethod::Put => self.http.put(url),
            UpdateMethod::Patch => self.http.patch(url),
        };
        self.write(req.json(&json!({ "status": status }))).await.map(|_| ())
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout(timeout)
    } else {
        SyncError::Network(e.to_string())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let mut message = resp.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY_LEN {
        let mut cut = MAX_ERROR_BODY_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    Err(SyncError::Backend {
        status: status.as_u16(),
        message,
    })
}

async fn read_json(resp: reqwest::Response, timeout: Duration) -> Result<Value, SyncError> {
    let resp = check_status(resp).await?;
    resp.json::<Value>().await.map_err(|e| {
        if e.is_decode() {
            SyncError::Decode(e.to_string())
        } else {
            transport_error(e, timeout)
        }
    })
}
