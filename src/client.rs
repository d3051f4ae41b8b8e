use std::{sync::Arc, time::Duration};

use base64::Engine;
use futures::future::BoxFuture;
use http::{HeaderMap, Method, StatusCode, header};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    ApiError, Error, ErrorBody, Response, ResponseHeaders, UnitSystem,
    newtypes::VehicleId,
    oauth::{AuthClient, Credentials},
    vehicle::Vehicle,
};

const UNIT_SYSTEM_HEADER: &str = "sc-unit-system";
const DATA_AGE_HEADER: &str = "sc-data-age";
const REQUEST_ID_HEADER: &str = "sc-request-id";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Debug)]
pub struct Config {
    pub api_origin: String,
    pub api_version: String,
    pub auth_origin: String,
    pub connect_origin: String,
    /// Country sent with VIN compatibility checks that don't name one.
    pub default_country: Option<String>,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_origin: "https://api.smartcar.com".to_owned(),
            api_version: "1.0".to_owned(),
            auth_origin: "https://auth.smartcar.com".to_owned(),
            connect_origin: "https://connect.smartcar.com".to_owned(),
            default_country: Some("US".to_owned()),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Implementations must not interpret the status code; [`Client`]
/// classifies it.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> BoxFuture<'_, Result<http::Response<Vec<u8>>, Error>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> BoxFuture<'_, Result<http::Response<Vec<u8>>, Error>> {
        (**self).send(request)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> ReqwestTransport {
        ReqwestTransport { client }
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> BoxFuture<'_, Result<http::Response<Vec<u8>>, Error>> {
        Box::pin(async move {
            let request = reqwest::Request::try_from(request).map_err(|err| Error::Http(err))?;
            let response = self
                .client
                .execute(request)
                .await
                .map_err(|err| Error::Http(err))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|err| Error::Http(err))?;

            let mut response = http::Response::new(body.to_vec());
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            Ok(response)
        })
    }
}

pub enum Authorization {
    Basic {
        client_id: String,
        client_secret: String,
    },
    Bearer(String),
}

impl Authorization {
    pub fn basic(client_id: &str, client_secret: &str) -> Authorization {
        Authorization::Basic {
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
        }
    }

    pub fn bearer(access_token: &str) -> Authorization {
        Authorization::Bearer(access_token.to_owned())
    }

    pub fn header_value(&self) -> String {
        match self {
            Authorization::Basic {
                client_id,
                client_secret,
            } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{client_id}:{client_secret}"));
                format!("Basic {encoded}")
            }
            Authorization::Bearer(access_token) => format!("Bearer {access_token}"),
        }
    }
}

pub(crate) enum RequestBody {
    Json(Vec<u8>),
    Form(String),
}

impl RequestBody {
    pub(crate) fn json<Body: Serialize>(body: &Body) -> Result<RequestBody, Error> {
        serde_json::to_vec(body)
            .map(RequestBody::Json)
            .map_err(|err| Error::JsonEncoding(err))
    }

    pub(crate) fn form<Body: Serialize>(body: &Body) -> Result<RequestBody, Error> {
        serde_urlencoded::to_string(body)
            .map(RequestBody::Form)
            .map_err(|err| Error::RequestEncoding(err))
    }

    fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Json(_) => "application/json",
            RequestBody::Form(_) => "application/x-www-form-urlencoded",
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        match self {
            RequestBody::Json(bytes) => bytes,
            RequestBody::Form(form) => form.into_bytes(),
        }
    }
}

/// Clones share the transport and configuration.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: Arc<Config>,
}

impl Client {
    pub fn new(client: reqwest::Client) -> Client {
        Client::with_config(client, Config::default())
    }

    pub fn with_config(client: reqwest::Client, config: Config) -> Client {
        Client::with_transport(ReqwestTransport::new(client), config)
    }

    pub fn with_transport(transport: impl Transport + 'static, config: Config) -> Client {
        Client {
            transport: Arc::new(transport),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn auth(&self, credentials: Credentials) -> AuthClient {
        AuthClient::new(self.clone(), credentials)
    }

    pub fn vehicle(&self, id: VehicleId, access_token: impl Into<String>) -> Vehicle {
        Vehicle::new(self.clone(), id, access_token)
    }

    pub(crate) async fn execute<Target: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        authorization: &Authorization,
        unit_system: Option<UnitSystem>,
        body: Option<RequestBody>,
    ) -> Result<Response<Target>, Error> {
        debug!(%method, %url, "Sending request");
        let request = build_request(method, url, authorization, unit_system, body)?;

        let timeout = self.config.timeout;
        let response = tokio::time::timeout(timeout, self.transport.send(request))
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        debug!(%url, status = %response.status(), "Received response");

        decode_response(response)
    }
}

fn build_request(
    method: Method,
    url: &str,
    authorization: &Authorization,
    unit_system: Option<UnitSystem>,
    body: Option<RequestBody>,
) -> Result<http::Request<Vec<u8>>, Error> {
    let mut request = http::Request::builder()
        .method(method)
        .uri(url)
        .header(header::AUTHORIZATION, authorization.header_value())
        .header(header::USER_AGENT, user_agent());
    if let Some(unit_system) = unit_system {
        request = request.header(UNIT_SYSTEM_HEADER, unit_system.as_str());
    }
    let body = match body {
        Some(body) => {
            request = request.header(header::CONTENT_TYPE, body.content_type());
            body.into_bytes()
        }
        None => Vec::new(),
    };
    request.body(body).map_err(|err| Error::InvalidRequest(err))
}

fn decode_response<Target: DeserializeOwned>(
    response: http::Response<Vec<u8>>,
) -> Result<Response<Target>, Error> {
    let status = response.status();
    if status != StatusCode::OK {
        let body: ErrorBody =
            serde_json::from_slice(response.body()).map_err(|err| Error::ResponseDecoding(err))?;
        return Err(Error::Api(ApiError::from_body(status, body)));
    }

    let headers = response_headers(response.headers());
    let body =
        serde_json::from_slice(response.body()).map_err(|err| Error::ResponseDecoding(err))?;
    Ok(Response { body, headers })
}

fn response_headers(headers: &HeaderMap) -> ResponseHeaders {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };
    ResponseHeaders {
        data_age: get(DATA_AGE_HEADER),
        request_id: get(REQUEST_ID_HEADER),
        unit_system: get(UNIT_SYSTEM_HEADER).and_then(|value| value.parse().ok()),
    }
}

fn user_agent() -> String {
    format!(
        "Smartcar/{} ({}; {}) Rust {}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
        env!("RUSTC_VERSION"),
    )
}
