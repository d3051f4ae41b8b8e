//! Recording fake transport for unit tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use futures::future::BoxFuture;
use http::{HeaderMap, HeaderName, Method, StatusCode};

use crate::{
    Error,
    client::{Client, Config, Transport},
};

pub(crate) struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn form(&self) -> Vec<(String, String)> {
        serde_urlencoded::from_bytes(&self.body).unwrap()
    }
}

enum Reply {
    Response(http::Response<Vec<u8>>),
    Hang,
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeTransport {
    pub fn new() -> Arc<FakeTransport> {
        Arc::new(FakeTransport::default())
    }

    pub fn client(self: &Arc<Self>) -> Client {
        Client::with_transport(self.clone(), Config::default())
    }

    pub fn respond(&self, status: u16, body: &str) {
        self.respond_with_headers(status, &[], body);
    }

    pub fn respond_with_headers(&self, status: u16, headers: &[(&'static str, &str)], body: &str) {
        let mut response = http::Response::new(body.as_bytes().to_vec());
        *response.status_mut() = StatusCode::from_u16(status).unwrap();
        for (name, value) in headers {
            response.headers_mut().insert(
                HeaderName::try_from(*name).unwrap(),
                value.parse().unwrap(),
            );
        }
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Response(response));
    }

    pub fn hang(&self) {
        self.replies.lock().unwrap().push_back(Reply::Hang);
    }

    pub fn requests(&self) -> std::sync::MutexGuard<'_, Vec<RecordedRequest>> {
        self.requests.lock().unwrap()
    }

    pub fn only_request(&self) -> RecordedRequest {
        let mut requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one request");
        requests.pop().unwrap()
    }
}

impl Transport for FakeTransport {
    fn send(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> BoxFuture<'_, Result<http::Response<Vec<u8>>, Error>> {
        let (parts, body) = request.into_parts();
        self.requests.lock().unwrap().push(RecordedRequest {
            method: parts.method,
            uri: parts.uri.to_string(),
            headers: parts.headers,
            body,
        });
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no canned response left");
        Box::pin(async move {
            match reply {
                Reply::Response(response) => Ok(response),
                Reply::Hang => futures::future::pending().await,
            }
        })
    }
}
