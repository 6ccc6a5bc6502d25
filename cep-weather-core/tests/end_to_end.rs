//! Both services wired together against mock upstreams.
//!
//! The finder runs on a real socket; the validator is driven in-process and
//! forwards to it over HTTP.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use cep_weather_core::{
    EnrichedResult, FinderConfig, HttpMetrics, NoopPropagation, ValidatorConfig, finder,
    validator, Finder, Validator,
};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Upstreams {
    directory: MockServer,
    weather: MockServer,
}

impl Upstreams {
    async fn start() -> Self {
        Self {
            directory: MockServer::start().await,
            weather: MockServer::start().await,
        }
    }

    async fn known_code(&self, cep: &str, locality: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/ws/{cep}/json/")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cep": cep,
                "logradouro": "Avenida Paulista",
                "localidade": locality,
                "uf": "SP"
            })))
            .mount(&self.directory)
            .await;
    }

    async fn unknown_code(&self, cep: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/ws/{cep}/json/")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "erro": "true" })))
            .mount(&self.directory)
            .await;
    }

    async fn weather_for(&self, query: &str, name: &str, temp_c: f64) {
        Mock::given(method("GET"))
            .and(path("/current.json"))
            .and(query_param("key", "TEST_KEY"))
            .and(query_param("q", query))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "location": { "name": name, "country": "Brazil" },
                "current": { "temp_c": temp_c, "condition": { "text": "Sunny", "code": 1000 } }
            })))
            .mount(&self.weather)
            .await;
    }

    fn finder_config(&self) -> FinderConfig {
        FinderConfig {
            api_key: Some("TEST_KEY".into()),
            postal_base_url: self.directory.uri(),
            weather_base_url: self.weather.uri(),
            ..Default::default()
        }
    }
}

/// Serves the finder on an ephemeral port and returns its `/cep` URL.
async fn spawn_finder(cfg: &FinderConfig) -> String {
    let finder = Finder::new(cfg, Arc::new(NoopPropagation)).expect("finder config");
    let app = finder::router(Arc::new(finder), HttpMetrics::new("e2e_finder").unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/cep")
}

fn validator_app(finder_url: String) -> Router {
    let cfg = ValidatorConfig {
        finder_url,
        response_time_ms: 0,
        ..Default::default()
    };
    let validator = Validator::new(&cfg, Arc::new(NoopPropagation));
    validator::router(Arc::new(validator), HttpMetrics::new("e2e_validator").unwrap())
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(res: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn valid_code_yields_three_temperature_scales() {
    let upstreams = Upstreams::start().await;
    upstreams.known_code("01310-100", "São Paulo").await;
    upstreams.weather_for("Sao Paulo", "Sao Paulo", 23.4).await;

    let finder_url = spawn_finder(&upstreams.finder_config()).await;
    let res = validator_app(finder_url)
        .oneshot(post("/validate", r#"{"cep":"01310-100"}"#))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let result: EnrichedResult = serde_json::from_str(&body_string(res).await).unwrap();
    assert_eq!(result.city, "Sao Paulo");
    assert_eq!(result.temp_c, 23.4);
    assert_eq!(result.temp_f, 23.4 * 1.8 + 32.0);
    assert_eq!(result.temp_k, 23.4 + 273.15);
}

#[tokio::test]
async fn unknown_code_is_relayed_as_not_found() {
    let upstreams = Upstreams::start().await;
    upstreams.unknown_code("99999-999").await;

    let finder_url = spawn_finder(&upstreams.finder_config()).await;
    let res = validator_app(finder_url)
        .oneshot(post("/validate", r#"{"cep":"99999-999"}"#))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(res).await, "Cannot find zipcode");
}

#[tokio::test]
async fn unreachable_weather_service_is_relayed_as_internal_error() {
    let upstreams = Upstreams::start().await;
    upstreams.known_code("01310-100", "São Paulo").await;

    let closed = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let cfg = FinderConfig {
        weather_base_url: format!("http://{closed}"),
        ..upstreams.finder_config()
    };

    let finder_url = spawn_finder(&cfg).await;
    let res = validator_app(finder_url)
        .oneshot(post("/validate", r#"{"cep":"01310-100"}"#))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(res).await, "Internal server error");
}

#[tokio::test]
async fn malformed_body_is_rejected_by_both_services() {
    let upstreams = Upstreams::start().await;
    let finder_url = spawn_finder(&upstreams.finder_config()).await;

    let res = validator_app(finder_url.clone())
        .oneshot(post("/validate", "{\"cep\":"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = reqwest::Client::new()
        .post(&finder_url)
        .header("content-type", "application/json")
        .body("{\"cep\":")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(res.text().await.unwrap(), "Invalid request body");
}
