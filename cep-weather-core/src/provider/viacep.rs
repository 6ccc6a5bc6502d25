use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::{
    error::LookupError,
    model::{PostalLookup, PostalRecord},
    telemetry::TraceContext,
};

use super::{PostalDirectory, success_body};

/// Postal directory client for `GET {base}/ws/{cep}/json/`.
#[derive(Debug, Clone)]
pub struct ViaCepDirectory {
    base_url: Url,
    http: Client,
}

/// The directory's out-of-band "unknown code" marker, absent from the record schema.
/// Seen both as `{"erro": true}` and `{"erro": "true"}`.
#[derive(Debug, Default, Deserialize)]
struct NotFoundFlag {
    #[serde(default)]
    erro: Option<Value>,
}

impl NotFoundFlag {
    fn is_set(&self) -> bool {
        match &self.erro {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

impl ViaCepDirectory {
    pub fn new(base_url: &str) -> Result<Self, LookupError> {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: &str, http: Client) -> Result<Self, LookupError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            http,
        })
    }

    fn record_url(&self, cep: &str) -> Result<Url, LookupError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LookupError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["ws", cep, "json", ""]);
        Ok(url)
    }
}

/// Maps a decoded directory payload to a lookup outcome.
fn classify(body: &[u8]) -> Result<PostalLookup, LookupError> {
    let record: PostalRecord = serde_json::from_slice(body)?;
    let flag: NotFoundFlag = serde_json::from_slice(body)?;

    if flag.is_set() || record.is_blank() {
        Ok(PostalLookup::NotFound)
    } else {
        Ok(PostalLookup::Found(record))
    }
}

#[async_trait]
impl PostalDirectory for ViaCepDirectory {
    async fn lookup(&self, cep: &str, trace: &TraceContext) -> Result<PostalLookup, LookupError> {
        let url = self.record_url(cep)?;

        let res = trace.apply(self.http.get(url)).send().await?;
        let body = success_body(res, "postal-directory").await?;
        let outcome = classify(&body)?;

        if let PostalLookup::Found(record) = &outcome {
            tracing::debug!(cep, locality = %record.locality, "postal code resolved");
        } else {
            tracing::info!(cep, "postal code unknown to directory");
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// An address nothing listens on.
    fn closed_addr() -> std::net::SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    fn paulista() -> serde_json::Value {
        serde_json::json!({
            "cep": "01310-100",
            "logradouro": "Avenida Paulista",
            "complemento": "de 612 a 1510 - lado par",
            "bairro": "Bela Vista",
            "localidade": "São Paulo",
            "uf": "SP",
            "ibge": "3550308",
            "gia": "1004",
            "ddd": "11",
            "siafi": "7107"
        })
    }

    #[test]
    fn classify_detects_both_not_found_signals() {
        assert_eq!(classify(br#"{"erro": true}"#).unwrap(), PostalLookup::NotFound);
        assert_eq!(classify(br#"{"erro": "true"}"#).unwrap(), PostalLookup::NotFound);
        assert_eq!(classify(b"{}").unwrap(), PostalLookup::NotFound);

        // Flag wins even if some record fields are filled in.
        assert_eq!(
            classify(br#"{"cep": "01310-100", "erro": true}"#).unwrap(),
            PostalLookup::NotFound
        );
    }

    #[test]
    fn classify_rejects_non_object_payloads() {
        let err = classify(b"<html>Bad Request</html>").unwrap_err();
        assert_eq!(err.kind(), Failure::Decode);
    }

    #[test]
    fn record_url_keeps_base_path_and_escapes_code() {
        let dir = ViaCepDirectory::new("http://viacep.com.br").unwrap();
        assert_eq!(
            dir.record_url("01310-100").unwrap().as_str(),
            "http://viacep.com.br/ws/01310-100/json/"
        );

        let dir = ViaCepDirectory::new("http://proxy.local/viacep/").unwrap();
        assert_eq!(
            dir.record_url("01 310/100").unwrap().as_str(),
            "http://proxy.local/viacep/ws/01%20310%2F100/json/"
        );
    }

    #[tokio::test]
    async fn lookup_returns_found_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ws/01310-100/json/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paulista()))
            .mount(&server)
            .await;

        let dir = ViaCepDirectory::new(&server.uri()).unwrap();
        let outcome = dir.lookup("01310-100", &TraceContext::new()).await.unwrap();

        match outcome {
            PostalLookup::Found(record) => {
                assert_eq!(record.locality, "São Paulo");
                assert_eq!(record.state_code, "SP");
            }
            PostalLookup::NotFound => panic!("expected a record"),
        }
    }

    #[tokio::test]
    async fn lookup_reports_not_found_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ws/99999-999/json/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "erro": true })))
            .mount(&server)
            .await;

        let dir = ViaCepDirectory::new(&server.uri()).unwrap();
        let outcome = dir.lookup("99999-999", &TraceContext::new()).await.unwrap();
        assert_eq!(outcome, PostalLookup::NotFound);
    }

    #[tokio::test]
    async fn lookup_forwards_trace_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ws/01310-100/json/"))
            .and(header("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paulista()))
            .expect(1)
            .mount(&server)
            .await;

        let mut trace = TraceContext::new();
        trace.insert("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01");

        let dir = ViaCepDirectory::new(&server.uri()).unwrap();
        assert!(dir.lookup("01310-100", &trace).await.is_ok());
    }

    #[tokio::test]
    async fn non_success_status_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string("<h1>Bad Request</h1>"))
            .mount(&server)
            .await;

        let dir = ViaCepDirectory::new(&server.uri()).unwrap();
        let err = dir.lookup("abc", &TraceContext::new()).await.unwrap_err();
        assert_eq!(err.kind(), Failure::Transport);
    }

    #[tokio::test]
    async fn unreachable_directory_is_transport_failure() {
        let dir = ViaCepDirectory::new(&format!("http://{}", closed_addr())).unwrap();
        let err = dir.lookup("01310-100", &TraceContext::new()).await.unwrap_err();
        assert!(matches!(err, LookupError::Transport(_)), "{err:?}");
        assert_eq!(err.kind(), Failure::Transport);
    }
}
