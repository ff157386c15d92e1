use http::header::AUTHORIZATION;

/// Accessors for requests captured by the mock server.
pub trait RequestExt {
    fn query_value(&self, name: &str) -> Option<String>;
    fn bearer_token(&self) -> Option<String>;
    fn header_value(&self, name: &str) -> Option<String>;
}

impl RequestExt for wiremock::Request {
    fn query_value(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    fn bearer_token(&self) -> Option<String> {
        self.header_value(AUTHORIZATION.as_str())
            .and_then(|value| value.strip_prefix("Bearer ").map(str::to_string))
    }

    fn header_value(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}
