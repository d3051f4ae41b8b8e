use std::collections::HashSet;

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::{
    ApiError, Error, ErrorBody, Response, ResponseHeaders, UnitSystem,
    client::{Authorization, Client, RequestBody},
    newtypes::VehicleId,
    urls,
};

const SECURITY_PATH: &str = "/security";
const APPLICATION_PATH: &str = "/application";
const BATCH_PATH: &str = "/batch";

/// Vehicle resources that can be read individually or through [`Vehicle::batch`].
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Resource {
    Battery,
    Charge,
    Fuel,
    Info,
    Location,
    Odometer,
    Oil,
    Permissions,
    TirePressure,
    Vin,
}

impl Resource {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Battery => "/battery",
            Self::Charge => "/charge",
            Self::Fuel => "/fuel",
            Self::Info => "/",
            Self::Location => "/location",
            Self::Odometer => "/odometer",
            Self::Oil => "/engine/oil",
            Self::Permissions => "/permissions",
            Self::TirePressure => "/tires/pressure",
            Self::Vin => "/vin",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battery {
    pub percent_remaining: f64,
    pub range: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
    pub is_plugged_in: bool,
    /// One of `CHARGING`, `FULLY_CHARGED` or `NOT_CHARGING`.
    pub state: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fuel {
    pub amount_remaining: f64,
    pub percent_remaining: f64,
    pub range: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Info {
    pub id: VehicleId,
    pub make: String,
    pub model: String,
    pub year: u32,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Odometer {
    pub distance: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Oil {
    pub life_remaining: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Permissions {
    pub permissions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TirePressure {
    pub front_left: f64,
    pub front_right: f64,
    pub back_left: f64,
    pub back_right: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Vin {
    pub vin: String,
}

/// Result of `lock`, `unlock` and `disconnect`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ActionStatus {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum SecurityAction {
    Lock,
    Unlock,
}

#[derive(Serialize)]
struct SecurityRequest {
    action: SecurityAction,
}

#[derive(Serialize)]
struct BatchRequest {
    requests: Vec<BatchPath>,
}

#[derive(Serialize)]
struct BatchPath {
    path: &'static str,
}

#[derive(Deserialize)]
struct RawBatchResponse {
    responses: Vec<BatchEntry>,
}

#[derive(Deserialize)]
struct BatchEntry {
    path: String,
    code: u16,
    #[serde(default)]
    headers: ResponseHeaders,
    #[serde(default)]
    body: serde_json::Value,
}

impl BatchEntry {
    fn decode_into<T: DeserializeOwned>(self, slot: &mut Option<BatchItem<T>>) -> Result<(), Error> {
        let status = StatusCode::from_u16(self.code).map_err(|_| {
            Error::InvalidResponse(format!(
                "batch response for {} has invalid status code {}",
                self.path, self.code
            ))
        })?;
        let item = if status == StatusCode::OK {
            let body =
                serde_json::from_value(self.body).map_err(|err| Error::ResponseDecoding(err))?;
            Ok(Response {
                body,
                headers: self.headers,
            })
        } else {
            let body: ErrorBody =
                serde_json::from_value(self.body).map_err(|err| Error::ResponseDecoding(err))?;
            Err(ApiError::from_body(status, body))
        };
        *slot = Some(item);
        Ok(())
    }
}

/// One resource's outcome within a batch: its own status, headers and body.
pub type BatchItem<T> = Result<Response<T>, ApiError>;

/// Fields are `None` for resources that weren't requested or weren't returned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchResponse {
    /// Headers of the batch call itself.
    pub headers: ResponseHeaders,
    pub battery: Option<BatchItem<Battery>>,
    pub charge: Option<BatchItem<Charge>>,
    pub fuel: Option<BatchItem<Fuel>>,
    pub info: Option<BatchItem<Info>>,
    pub location: Option<BatchItem<Location>>,
    pub odometer: Option<BatchItem<Odometer>>,
    pub oil: Option<BatchItem<Oil>>,
    pub permissions: Option<BatchItem<Permissions>>,
    pub tire_pressure: Option<BatchItem<TirePressure>>,
    pub vin: Option<BatchItem<Vin>>,
}

type BatchDecoder = fn(BatchEntry, &mut BatchResponse) -> Result<(), Error>;

const BATCH_DECODERS: &[(Resource, BatchDecoder)] = &[
    (Resource::Battery, |entry, batch| entry.decode_into(&mut batch.battery)),
    (Resource::Charge, |entry, batch| entry.decode_into(&mut batch.charge)),
    (Resource::Fuel, |entry, batch| entry.decode_into(&mut batch.fuel)),
    (Resource::Info, |entry, batch| entry.decode_into(&mut batch.info)),
    (Resource::Location, |entry, batch| entry.decode_into(&mut batch.location)),
    (Resource::Odometer, |entry, batch| entry.decode_into(&mut batch.odometer)),
    (Resource::Oil, |entry, batch| entry.decode_into(&mut batch.oil)),
    (Resource::Permissions, |entry, batch| entry.decode_into(&mut batch.permissions)),
    (Resource::TirePressure, |entry, batch| entry.decode_into(&mut batch.tire_pressure)),
    (Resource::Vin, |entry, batch| entry.decode_into(&mut batch.vin)),
];

/// A handle on one vehicle, authorized by one access token.
///
/// Every request carries the handle's unit system. Changing it needs
/// `&mut self`, so it can't change under a request that is in flight.
#[derive(Clone)]
pub struct Vehicle {
    client: Client,
    id: VehicleId,
    access_token: String,
    unit_system: UnitSystem,
}

impl Vehicle {
    pub fn new(client: Client, id: VehicleId, access_token: impl Into<String>) -> Vehicle {
        Vehicle {
            client,
            id,
            access_token: access_token.into(),
            unit_system: UnitSystem::default(),
        }
    }

    pub fn with_unit_system(mut self, unit_system: UnitSystem) -> Vehicle {
        self.unit_system = unit_system;
        self
    }

    pub fn id(&self) -> &VehicleId {
        &self.id
    }

    pub fn unit_system(&self) -> UnitSystem {
        self.unit_system
    }

    /// Accepts `metric` or `imperial`. Anything else is rejected and the
    /// current unit system is kept.
    pub fn set_unit_system(&mut self, unit_system: &str) -> Result<(), Error> {
        self.unit_system = unit_system.parse()?;
        Ok(())
    }

    pub async fn battery(&self) -> Result<Response<Battery>, Error> {
        self.get(Resource::Battery).await
    }

    pub async fn charge(&self) -> Result<Response<Charge>, Error> {
        self.get(Resource::Charge).await
    }

    pub async fn fuel(&self) -> Result<Response<Fuel>, Error> {
        self.get(Resource::Fuel).await
    }

    pub async fn info(&self) -> Result<Response<Info>, Error> {
        self.get(Resource::Info).await
    }

    pub async fn location(&self) -> Result<Response<Location>, Error> {
        self.get(Resource::Location).await
    }

    pub async fn odometer(&self) -> Result<Response<Odometer>, Error> {
        self.get(Resource::Odometer).await
    }

    pub async fn oil(&self) -> Result<Response<Oil>, Error> {
        self.get(Resource::Oil).await
    }

    pub async fn permissions(&self) -> Result<Response<Permissions>, Error> {
        self.get(Resource::Permissions).await
    }

    pub async fn tire_pressure(&self) -> Result<Response<TirePressure>, Error> {
        self.get(Resource::TirePressure).await
    }

    pub async fn vin(&self) -> Result<Response<Vin>, Error> {
        self.get(Resource::Vin).await
    }

    pub async fn lock(&self) -> Result<Response<ActionStatus>, Error> {
        self.security(SecurityAction::Lock).await
    }

    pub async fn unlock(&self) -> Result<Response<ActionStatus>, Error> {
        self.security(SecurityAction::Unlock).await
    }

    /// Revokes this application's access to the vehicle.
    pub async fn disconnect(&self) -> Result<Response<ActionStatus>, Error> {
        self.request(Method::DELETE, APPLICATION_PATH, None).await
    }

    /// Whether every permission in `required` has been granted. A
    /// `required:` prefix on an entry is ignored.
    pub async fn has_permissions<S: AsRef<str>>(&self, required: &[S]) -> Result<bool, Error> {
        let granted = self.permissions().await?.into_body().permissions;
        let granted: HashSet<&str> = granted.iter().map(String::as_str).collect();

        Ok(required.iter().all(|permission| {
            let permission = permission.as_ref();
            let permission = permission.strip_prefix("required:").unwrap_or(permission);
            granted.contains(permission)
        }))
    }

    /// Fetches several resources in one round trip. Each requested
    /// resource succeeds or fails on its own.
    pub async fn batch(&self, resources: &[Resource]) -> Result<BatchResponse, Error> {
        if resources.is_empty() {
            return Err(Error::Validation(
                "batch requires at least one resource".to_owned(),
            ));
        }
        let request = BatchRequest {
            requests: resources
                .iter()
                .map(|resource| BatchPath {
                    path: resource.path(),
                })
                .collect(),
        };
        let response: Response<RawBatchResponse> = self
            .request(Method::POST, BATCH_PATH, Some(RequestBody::json(&request)?))
            .await?;

        let mut batch = BatchResponse {
            headers: response.headers,
            ..BatchResponse::default()
        };
        for entry in response.body.responses {
            let decoder = BATCH_DECODERS
                .iter()
                .find(|(resource, _)| resource.path() == entry.path);
            match decoder {
                Some((_, decode)) => decode(entry, &mut batch)?,
                None => warn!(vehicle = %self.id, path = %entry.path, "Ignoring batch response for unknown path"),
            }
        }
        Ok(batch)
    }

    async fn security(&self, action: SecurityAction) -> Result<Response<ActionStatus>, Error> {
        let body = RequestBody::json(&SecurityRequest { action })?;
        self.request(Method::POST, SECURITY_PATH, Some(body)).await
    }

    async fn get<T: DeserializeOwned>(&self, resource: Resource) -> Result<Response<T>, Error> {
        self.request(Method::GET, resource.path(), None).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<Response<T>, Error> {
        let url = urls::vehicle(self.client.config(), &self.id, path);
        self.client
            .execute(
                method,
                &url,
                &Authorization::bearer(&self.access_token),
                Some(self.unit_system),
                body,
            )
            .await
    }
}
