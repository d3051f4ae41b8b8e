use chrono::{DateTime, TimeDelta, Utc};
use http::Method;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    client::{Authorization, Client, RequestBody},
    urls::{self, Query},
};

/// Smartcar does not report refresh token lifetimes, but documents them as 60 days.
const REFRESH_TOKEN_LIFETIME_DAYS: i64 = 60;

const EXPIRY_GRACE_SECONDS: i64 = 10;

#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: Vec<String>,
    pub test_mode: bool,
}

#[derive(Clone, Debug, Default)]
pub struct AuthorizationUrlOptions {
    pub force_approval: bool,
    pub state: Option<String>,
    pub make_bypass: Option<MakeBypass>,
    pub single_select: Option<SingleSelect>,
    /// Connect feature flags, e.g. `country:DE`.
    pub flags: Vec<String>,
}

/// Skips the brand selector in Connect. Smartcar Pro feature.
#[derive(Clone, Debug)]
pub struct MakeBypass {
    pub make: String,
}

/// Restricts Connect to authorizing a single vehicle, optionally the one
/// with the given VIN. Smartcar Pro feature.
#[derive(Clone, Debug, Default)]
pub struct SingleSelect {
    pub vin: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
struct OauthExchangeRequest<'a> {
    grant_type: &'static str,
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(Clone, Debug, Serialize)]
struct OauthRefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Clone, Debug, Deserialize)]
struct OauthExchangeResponse {
    access_token: String,
    refresh_token: String,
    token_type: String,
    expires_in: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tokens {
    pub access_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds, as reported by the server.
    pub expires_in: i64,
    pub access_expiry: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expiry: DateTime<Utc>,
}

impl Tokens {
    fn issue(response: OauthExchangeResponse, issued_at: DateTime<Utc>) -> Result<Tokens, Error> {
        if response.expires_in <= 0 {
            return Err(Error::InvalidResponse(format!(
                "token endpoint returned non-positive expires_in {}",
                response.expires_in
            )));
        }
        let access_expiry = TimeDelta::try_seconds(response.expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                Error::InvalidResponse(format!(
                    "token endpoint returned out of range expires_in {}",
                    response.expires_in
                ))
            })?;
        let refresh_expiry = TimeDelta::try_days(REFRESH_TOKEN_LIFETIME_DAYS)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                Error::InvalidResponse("refresh token expiry is out of range".to_owned())
            })?;
        Ok(Tokens {
            access_expiry,
            refresh_expiry,
            access_token: response.access_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            refresh_token: response.refresh_token,
        })
    }
}

#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    credentials: Credentials,
}

impl AuthClient {
    pub fn new(client: Client, credentials: Credentials) -> AuthClient {
        AuthClient {
            client,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Builds the Connect URL to send the user's browser to.
    pub fn authorization_url(&self, options: &AuthorizationUrlOptions) -> Result<String, Error> {
        let credentials = &self.credentials;
        if credentials.client_id.is_empty() {
            return Err(Error::Validation("client_id is required".to_owned()));
        }
        if credentials.redirect_uri.is_empty() {
            return Err(Error::Validation("redirect_uri is required".to_owned()));
        }

        let mut query = Query::new();
        query.insert("response_type", "code".to_owned());
        query.insert("client_id", credentials.client_id.clone());
        query.insert("redirect_uri", credentials.redirect_uri.clone());
        let approval_prompt = if options.force_approval {
            "force"
        } else {
            "auto"
        };
        query.insert("approval_prompt", approval_prompt.to_owned());
        if !credentials.scope.is_empty() {
            query.insert("scope", credentials.scope.join(" "));
        }
        if credentials.test_mode {
            query.insert("mode", "test".to_owned());
        }
        if let Some(state) = &options.state {
            query.insert("state", state.clone());
        }
        if let Some(MakeBypass { make }) = &options.make_bypass {
            query.insert("make", make.clone());
        }
        if let Some(SingleSelect { vin }) = &options.single_select {
            query.insert("single_select", "true".to_owned());
            if let Some(vin) = vin {
                query.insert("single_select_vin", vin.clone());
            }
        }
        if !options.flags.is_empty() {
            query.insert("flags", options.flags.join(" "));
        }

        urls::authorize(self.client.config(), &query)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<Tokens, Error> {
        self.exchange(&OauthExchangeRequest {
            grant_type: "authorization_code",
            code,
            redirect_uri: &self.credentials.redirect_uri,
        })
        .await
    }

    /// Both expiries are recomputed, so the result is a fresh pair.
    pub async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<Tokens, Error> {
        self.exchange(&OauthRefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
        })
        .await
    }

    async fn exchange<Body: Serialize>(&self, body: &Body) -> Result<Tokens, Error> {
        let authorization =
            Authorization::basic(&self.credentials.client_id, &self.credentials.client_secret);
        let response = self
            .client
            .execute::<OauthExchangeResponse>(
                Method::POST,
                &urls::token(self.client.config()),
                &authorization,
                None,
                Some(RequestBody::form(body)?),
            )
            .await?;
        Tokens::issue(response.into_body(), Utc::now())
    }
}

/// True once the clock is at least ten seconds past `expiry`. Does not call
/// the API.
pub fn is_token_expired(expiry: DateTime<Utc>) -> bool {
    is_token_expired_at(expiry, Utc::now())
}

pub fn is_token_expired_at(expiry: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expiry
        .checked_add_signed(TimeDelta::seconds(EXPIRY_GRACE_SECONDS))
        .is_some_and(|deadline| now >= deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, testing::FakeTransport};

    fn credentials() -> Credentials {
        Credentials {
            client_id: "client-id".to_owned(),
            client_secret: "client-secret".to_owned(),
            redirect_uri: "https://example.com/callback".to_owned(),
            scope: vec!["read_odometer".to_owned(), "read_vin".to_owned()],
            test_mode: false,
        }
    }

    fn auth(credentials: Credentials) -> AuthClient {
        FakeTransport::new().client().auth(credentials)
    }

    fn assert_within(actual: DateTime<Utc>, expected: DateTime<Utc>) {
        let delta = (actual - expected).abs();
        assert!(
            delta <= TimeDelta::seconds(10),
            "{actual} is not within 10s of {expected}"
        );
    }

    #[test]
    fn authorization_url_requires_client_id() {
        let auth = auth(Credentials {
            client_id: String::new(),
            ..credentials()
        });
        let err = auth
            .authorization_url(&AuthorizationUrlOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err:?}");
    }

    #[test]
    fn authorization_url_requires_redirect_uri() {
        let auth = auth(Credentials {
            redirect_uri: String::new(),
            ..credentials()
        });
        let err = auth
            .authorization_url(&AuthorizationUrlOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err:?}");
    }

    #[test]
    fn authorization_url_defaults() {
        let url = auth(credentials())
            .authorization_url(&AuthorizationUrlOptions::default())
            .unwrap();
        assert_eq!(
            url,
            "https://connect.smartcar.com/oauth/authorize?approval_prompt=auto&client_id=client-id&redirect_uri=https%3A%2F%2Fexample.com%2Fcallback&response_type=code&scope=read_odometer+read_vin"
        );
    }

    #[test]
    fn authorization_url_without_scope() {
        let url = auth(Credentials {
            scope: Vec::new(),
            ..credentials()
        })
        .authorization_url(&AuthorizationUrlOptions::default())
        .unwrap();
        assert_eq!(
            url,
            "https://connect.smartcar.com/oauth/authorize?approval_prompt=auto&client_id=client-id&redirect_uri=https%3A%2F%2Fexample.com%2Fcallback&response_type=code"
        );
    }

    #[test]
    fn authorization_url_force_and_test_mode() {
        let url = auth(Credentials {
            test_mode: true,
            ..credentials()
        })
        .authorization_url(&AuthorizationUrlOptions {
            force_approval: true,
            ..AuthorizationUrlOptions::default()
        })
        .unwrap();
        assert!(url.contains("approval_prompt=force"), "{url}");
        assert!(url.contains("mode=test"), "{url}");
    }

    #[test]
    fn authorization_url_all_options() {
        let url = auth(credentials())
            .authorization_url(&AuthorizationUrlOptions {
                force_approval: true,
                state: Some("state".to_owned()),
                make_bypass: Some(MakeBypass {
                    make: "TESLA".to_owned(),
                }),
                single_select: Some(SingleSelect {
                    vin: Some("12345678901234567".to_owned()),
                }),
                flags: vec!["country:DE".to_owned()],
            })
            .unwrap();
        assert_eq!(
            url,
            "https://connect.smartcar.com/oauth/authorize?approval_prompt=force&client_id=client-id&flags=country%3ADE&make=TESLA&redirect_uri=https%3A%2F%2Fexample.com%2Fcallback&response_type=code&scope=read_odometer+read_vin&single_select=true&single_select_vin=12345678901234567&state=state"
        );
    }

    #[test]
    fn single_select_without_vin() {
        let url = auth(credentials())
            .authorization_url(&AuthorizationUrlOptions {
                single_select: Some(SingleSelect::default()),
                ..AuthorizationUrlOptions::default()
            })
            .unwrap();
        assert!(url.contains("single_select=true"), "{url}");
        assert!(!url.contains("single_select_vin"), "{url}");
    }

    #[tokio::test]
    async fn exchange_code() {
        let transport = FakeTransport::new();
        transport.respond(
            200,
            r#"{"access_token":"A","refresh_token":"R","token_type":"Bearer","expires_in":7200}"#,
        );
        let auth = transport.client().auth(credentials());

        let tokens = auth.exchange_code("the-code").await.unwrap();

        assert_eq!(tokens.access_token, "A");
        assert_eq!(tokens.refresh_token, "R");
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 7200);
        assert_within(tokens.access_expiry, Utc::now() + TimeDelta::hours(2));
        assert_within(tokens.refresh_expiry, Utc::now() + TimeDelta::days(60));

        let request = transport.only_request();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.uri, "https://auth.smartcar.com/oauth/token");
        assert_eq!(
            request.header("authorization"),
            Some("Basic Y2xpZW50LWlkOmNsaWVudC1zZWNyZXQ=")
        );
        assert_eq!(request.header("sc-unit-system"), None);
        assert_eq!(
            request.form(),
            vec![
                ("grant_type".to_owned(), "authorization_code".to_owned()),
                ("code".to_owned(), "the-code".to_owned()),
                (
                    "redirect_uri".to_owned(),
                    "https://example.com/callback".to_owned()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn exchange_refresh_token_resets_both_expiries() {
        let transport = FakeTransport::new();
        transport.respond(
            200,
            r#"{"access_token":"A2","refresh_token":"R2","token_type":"Bearer","expires_in":7200}"#,
        );
        let auth = transport.client().auth(credentials());

        let tokens = auth.exchange_refresh_token("R").await.unwrap();

        assert_eq!(tokens.access_token, "A2");
        assert_within(tokens.access_expiry, Utc::now() + TimeDelta::hours(2));
        assert_within(tokens.refresh_expiry, Utc::now() + TimeDelta::days(60));
        assert_eq!(
            transport.only_request().form(),
            vec![
                ("grant_type".to_owned(), "refresh_token".to_owned()),
                ("refresh_token".to_owned(), "R".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn exchange_propagates_api_errors() {
        let transport = FakeTransport::new();
        transport.respond(
            401,
            r#"{"error":"invalid_client","message":"Invalid client credentials"}"#,
        );
        let auth = transport.client().auth(credentials());

        let err = auth.exchange_code("the-code").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Authentication));
    }

    #[tokio::test]
    async fn exchange_rejects_non_positive_lifetime() {
        let transport = FakeTransport::new();
        transport.respond(
            200,
            r#"{"access_token":"A","refresh_token":"R","token_type":"Bearer","expires_in":0}"#,
        );
        let auth = transport.client().auth(credentials());

        let err = auth.exchange_code("the-code").await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn exchange_rejects_out_of_range_lifetime() {
        let transport = FakeTransport::new();
        transport.respond(
            200,
            r#"{"access_token":"A","refresh_token":"R","token_type":"Bearer","expires_in":10000000000000}"#,
        );
        let auth = transport.client().auth(credentials());

        let err = auth.exchange_code("the-code").await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)), "{err:?}");
    }

    #[test]
    fn token_expiry() {
        let now = Utc::now();
        assert!(!is_token_expired(now));
        assert!(is_token_expired(now - TimeDelta::seconds(10)));
        assert!(!is_token_expired(now + TimeDelta::hours(1)));
    }

    #[test]
    fn token_expiry_grace_window() {
        let expiry = Utc::now();
        assert!(!is_token_expired_at(expiry, expiry + TimeDelta::seconds(9)));
        assert!(is_token_expired_at(expiry, expiry + TimeDelta::seconds(10)));
    }

    #[test]
    fn token_expiry_at_end_of_time() {
        assert!(!is_token_expired_at(DateTime::<Utc>::MAX_UTC, Utc::now()));
    }
}
