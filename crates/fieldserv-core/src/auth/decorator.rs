use reqwest::header::{HeaderValue, InvalidHeaderValue, AUTHORIZATION};

use super::credentials::{Credential, CredentialStore};
use crate::api::ApiRequest;

/// Sets the `Authorization` header from the current credential.
///
/// The header carries the bare access token unless a scheme such as `Bearer`
/// is configured.
#[derive(Debug, Clone, Default)]
pub struct RequestDecorator {
    scheme: Option<String>,
}

impl RequestDecorator {
    pub fn new(scheme: Option<String>) -> Self {
        Self {
            scheme: scheme.filter(|s| !s.trim().is_empty()),
        }
    }

    /// Header value that `credential` produces.
    pub fn header_value(&self, credential: &Credential) -> String {
        match self.scheme {
            Some(ref scheme) => format!("{} {}", scheme, credential.access_token),
            None => credential.access_token.clone(),
        }
    }

    /// Decorate with whatever the store holds right now.
    pub fn decorate(
        &self,
        store: &CredentialStore,
        request: ApiRequest,
    ) -> Result<ApiRequest, InvalidHeaderValue> {
        self.apply(&store.get(), request)
    }

    pub fn apply(
        &self,
        credential: &Credential,
        mut request: ApiRequest,
    ) -> Result<ApiRequest, InvalidHeaderValue> {
        let value = HeaderValue::from_str(&self.header_value(credential))?;
        request.headers.insert(AUTHORIZATION, value);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorization(request: &ApiRequest) -> &str {
        request
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .expect("authorization header set")
    }

    #[test]
    fn test_bare_token() {
        let store = CredentialStore::in_memory();
        store.save("a1", "r1").expect("memory backend");

        let request = RequestDecorator::default()
            .decorate(&store, ApiRequest::get("/tasks"))
            .expect("valid header");
        assert_eq!(authorization(&request), "a1");
        assert_eq!(store.get(), Credential::new("a1", "r1"));
    }

    #[test]
    fn test_empty_when_logged_out() {
        let store = CredentialStore::in_memory();
        let request = RequestDecorator::default()
            .decorate(&store, ApiRequest::get("/tasks"))
            .expect("valid header");
        assert_eq!(authorization(&request), "");
    }

    #[test]
    fn test_scheme_prefix() {
        let decorator = RequestDecorator::new(Some("Bearer".to_string()));
        let request = decorator
            .apply(&Credential::new("a1", "r1"), ApiRequest::get("/tasks"))
            .expect("valid header");
        assert_eq!(authorization(&request), "Bearer a1");

        let blank = RequestDecorator::new(Some("  ".to_string()));
        assert_eq!(blank.header_value(&Credential::new("a1", "r1")), "a1");
    }

    #[test]
    fn test_replaces_existing_header() {
        let decorator = RequestDecorator::default();
        let first = decorator
            .apply(&Credential::new("a1", "r1"), ApiRequest::get("/tasks"))
            .expect("valid header");
        let second = decorator
            .apply(&Credential::new("a2", "r1"), first)
            .expect("valid header");
        assert_eq!(second.headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(authorization(&second), "a2");
    }

    #[test]
    fn test_invalid_token_rejected() {
        let decorator = RequestDecorator::default();
        let result = decorator.apply(&Credential::new("a1\nInjected: x", "r1"), ApiRequest::get("/"));
        assert!(result.is_err());
    }
}
