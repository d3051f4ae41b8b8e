use http::Method;
use serde::Deserialize;

use crate::{
    Error, Response,
    client::{Authorization, Client},
    newtypes::{UserId, VehicleId},
    urls::{self, Query},
};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct User {
    pub id: UserId,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct VehicleIds {
    pub vehicles: Vec<VehicleId>,
}

#[derive(Clone, Debug, Default)]
pub struct VinCompatibilityRequest {
    pub vin: String,
    pub scope: Vec<String>,
    /// Falls back to [`Config::default_country`](crate::Config::default_country).
    pub country: Option<String>,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct Compatibility {
    compatible: bool,
}

impl Client {
    pub async fn user_id(&self, access_token: &str) -> Result<Response<User>, Error> {
        self.execute(
            Method::GET,
            &urls::user(self.config()),
            &Authorization::bearer(access_token),
            None,
            None,
        )
        .await
    }

    pub async fn vehicle_ids(&self, access_token: &str) -> Result<Response<VehicleIds>, Error> {
        self.execute(
            Method::GET,
            &urls::vehicles(self.config()),
            &Authorization::bearer(access_token),
            None,
            None,
        )
        .await
    }

    pub async fn is_vin_compatible(&self, request: &VinCompatibilityRequest) -> Result<bool, Error> {
        let mut query = Query::new();
        query.insert("vin", request.vin.clone());
        query.insert("scope", request.scope.join(" "));
        if let Some(country) = request
            .country
            .as_ref()
            .or(self.config().default_country.as_ref())
        {
            query.insert("country", country.clone());
        }

        let response: Response<Compatibility> = self
            .execute(
                Method::GET,
                &urls::compatibility(self.config(), &query)?,
                &Authorization::basic(&request.client_id, &request.client_secret),
                None,
                None,
            )
            .await?;
        Ok(response.compatible)
    }
}
