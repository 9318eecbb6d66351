//! Location providers: the lookup trait and its HTTP implementation.

use super::types::{LocationError, Scope};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Default public instance of the location lookup service.
pub const DEFAULT_BASE_URL: &str = "https://crio-location-selector.onrender.com";

/// Read-only lookups backing the cascade.
#[async_trait]
pub trait LocationService: Send + Sync {
    /// All countries, in service order.
    async fn countries(&self) -> Result<Vec<String>, LocationError>;

    /// States valid for `country`.
    async fn states(&self, country: &str) -> Result<Vec<String>, LocationError>;

    /// Cities valid for the `country` + `state` pair.
    async fn cities(&self, country: &str, state: &str) -> Result<Vec<String>, LocationError>;

    /// Dispatch on a scope.
    async fn lookup(&self, scope: &Scope) -> Result<Vec<String>, LocationError> {
        match scope {
            Scope::Countries => self.countries().await,
            Scope::States { country } => self.states(country).await,
            Scope::Cities { country, state } => self.cities(country, state).await,
        }
    }
}

// ─── HTTP provider ──────────────────────────────────────────────

/// `LocationService` over the remote HTTP API.
///
/// Paths:
/// - `GET /countries`
/// - `GET /country={country}/states`
/// - `GET /country={country}/state={state}/cities`
///
/// The client is blocking (ureq); every call is moved onto the tokio blocking
/// pool so callers never stall the runtime.
#[derive(Clone)]
pub struct HttpLocationService {
    agent: ureq::Agent,
    base: Url,
}

impl HttpLocationService {
    pub fn new(base: Url, timeout: Duration, user_agent: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(user_agent)
            .build();
        Self { agent, base }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build the URL for a scope. Names are percent-encoded as path segments.
    pub fn endpoint(&self, scope: &Scope) -> Result<Url, LocationError> {
        let segments: Vec<String> = match scope {
            Scope::Countries => vec!["countries".into()],
            Scope::States { country } => {
                vec![format!("country={}", country), "states".into()]
            }
            Scope::Cities { country, state } => vec![
                format!("country={}", country),
                format!("state={}", state),
                "cities".into(),
            ],
        };

        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| LocationError::Network(format!("base URL '{}' cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch(&self, scope: Scope) -> Result<Vec<String>, LocationError> {
        let url = self.endpoint(&scope)?;
        let agent = self.agent.clone();
        tracing::debug!(%url, "requesting {}", scope);

        tokio::task::spawn_blocking(move || get_list(&agent, &url))
            .await
            .map_err(|e| LocationError::Network(format!("lookup task aborted: {}", e)))?
    }
}

fn get_list(agent: &ureq::Agent, url: &Url) -> Result<Vec<String>, LocationError> {
    let response = agent.get(url.as_str()).call().map_err(|e| match e {
        ureq::Error::Status(code, _) => LocationError::Status(code),
        ureq::Error::Transport(t) => LocationError::Network(t.to_string()),
    })?;

    response
        .into_json::<Vec<String>>()
        .map_err(|e| LocationError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl LocationService for HttpLocationService {
    async fn countries(&self) -> Result<Vec<String>, LocationError> {
        self.fetch(Scope::Countries).await
    }

    async fn states(&self, country: &str) -> Result<Vec<String>, LocationError> {
        self.fetch(Scope::States { country: country.to_string() }).await
    }

    async fn cities(&self, country: &str, state: &str) -> Result<Vec<String>, LocationError> {
        self.fetch(Scope::Cities {
            country: country.to_string(),
            state: state.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(base: &str) -> HttpLocationService {
        HttpLocationService::new(Url::parse(base).unwrap(), Duration::from_secs(1), "test")
    }

    #[test]
    fn test_countries_endpoint() {
        let url = service(DEFAULT_BASE_URL).endpoint(&Scope::Countries).unwrap();
        assert_eq!(url.as_str(), "https://crio-location-selector.onrender.com/countries");
    }

    #[test]
    fn test_states_endpoint() {
        let url = service(DEFAULT_BASE_URL)
            .endpoint(&Scope::States { country: "India".into() })
            .unwrap();
        assert_eq!(url.path(), "/country=India/states");
    }

    #[test]
    fn test_cities_endpoint_encodes_spaces() {
        let url = service(DEFAULT_BASE_URL)
            .endpoint(&Scope::Cities {
                country: "United States".into(),
                state: "New York".into(),
            })
            .unwrap();
        assert_eq!(url.path(), "/country=United%20States/state=New%20York/cities");
    }

    #[test]
    fn test_slash_in_name_stays_in_one_segment() {
        let url = service(DEFAULT_BASE_URL)
            .endpoint(&Scope::States { country: "A/B".into() })
            .unwrap();
        assert_eq!(url.path(), "/country=A%2FB/states");
    }

    #[test]
    fn test_base_with_path_prefix() {
        let url = service("http://127.0.0.1:9000/api/")
            .endpoint(&Scope::Countries)
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/api/countries");
    }
}
