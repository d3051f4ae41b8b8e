use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::{Error, client::Config, newtypes::VehicleId};

/// Everything but RFC 3986 unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Query parameters, encoded in key order so URLs are deterministic.
pub type Query = BTreeMap<&'static str, String>;

pub fn authorize(config: &Config, query: &Query) -> Result<String, Error> {
    with_query(format!("{}/oauth/authorize", config.connect_origin), query)
}

pub fn token(config: &Config) -> String {
    format!("{}/oauth/token", config.auth_origin)
}

pub fn user(config: &Config) -> String {
    api(config, "user")
}

pub fn vehicles(config: &Config) -> String {
    api(config, "vehicles")
}

/// `path` is a resource path such as `/odometer`; the bare `/` addresses
/// the vehicle itself.
pub fn vehicle(config: &Config, id: &VehicleId, path: &str) -> String {
    format!(
        "{}/{}{}",
        vehicles(config),
        utf8_percent_encode(id.as_str(), PATH_SEGMENT),
        path.trim_end_matches('/')
    )
}

pub fn compatibility(config: &Config, query: &Query) -> Result<String, Error> {
    with_query(api(config, "compatibility"), query)
}

fn api(config: &Config, path: &str) -> String {
    format!("{}/v{}/{}", config.api_origin, config.api_version, path)
}

fn with_query(base: String, query: &Query) -> Result<String, Error> {
    if query.is_empty() {
        return Ok(base);
    }
    let query = serde_urlencoded::to_string(query).map_err(|err| Error::RequestEncoding(err))?;
    Ok(format!("{base}?{query}"))
}
