//! Avalanche bulletin adapter (Météo-France DPBRA).
//!
//! Bulletins are XML documents. Only their text content is kept: the
//! structure is flattened, whitespace collapsed, and the image/file names
//! embedded in the document are dropped.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::Html;
use serde::{Deserialize, Serialize};

use super::http::{build_client, endpoint, get_json, get_text};
use crate::error::FetchError;

const SERVICE: &str = "avalanche";
pub const DEFAULT_AVALANCHE_BASE: &str = "https://public-api.meteofrance.fr/public/DPBRA/v1/";

/// Tokens like `carte_risque.png` or `BRA.MONT-BLANC.xml`. The extension
/// must start with a letter so decimal numbers survive.
static FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[\w\-]+\.[a-zA-Z][a-zA-Z0-9]*\b").expect("valid regex"));

static CDATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("valid regex"));

/// A bulletin's extracted text for one weather-space massif.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvalancheBulletin {
    pub range_id: String,
    pub raw_text: String,
}

/// A massif as numbered by the avalanche service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherMassif {
    pub code: String,
    pub title: String,
    /// Département grouping, when reported.
    pub group: Option<String>,
}

/// Access to avalanche risk bulletins.
#[async_trait]
pub trait AvalancheSource: Send + Sync {
    async fn bulletin(&self, weather_id: &str) -> Result<AvalancheBulletin, FetchError>;

    async fn massifs(&self) -> Result<Vec<WeatherMassif>, FetchError>;
}

/// HTTP client for the DPBRA API.
pub struct MeteoFranceClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl MeteoFranceClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(SERVICE, timeout)?,
            base_url: DEFAULT_AVALANCHE_BASE.to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(endpoint(&self.base_url, path))
            .header("apikey", &self.api_key)
            .header(reqwest::header::ACCEPT, "*/*")
    }
}

#[async_trait]
impl AvalancheSource for MeteoFranceClient {
    async fn bulletin(&self, weather_id: &str) -> Result<AvalancheBulletin, FetchError> {
        tracing::debug!(weather_id, "Fetching avalanche bulletin");
        let request = self
            .get("massif/BRA")
            .query(&[("id-massif", weather_id), ("format", "xml")]);
        let xml = get_text(SERVICE, request).await?;

        let raw_text = extract_bulletin_text(&xml);
        if raw_text.is_empty() {
            return Err(FetchError::decode(SERVICE, "bulletin contains no text"));
        }
        Ok(AvalancheBulletin {
            range_id: weather_id.to_string(),
            raw_text,
        })
    }

    async fn massifs(&self) -> Result<Vec<WeatherMassif>, FetchError> {
        let collection: FeatureCollection = get_json(SERVICE, self.get("liste-massifs")).await?;
        Ok(collection
            .features
            .into_iter()
            .map(|f| WeatherMassif {
                code: match f.properties.code {
                    serde_json::Value::String(code) => code,
                    other => other.to_string(),
                },
                title: f.properties.title,
                group: f.properties.departement,
            })
            .collect())
    }
}

/// Flatten an XML bulletin to its text content.
pub fn extract_bulletin_text(xml: &str) -> String {
    // The HTML parser turns CDATA into comments, so unwrap it first.
    let unwrapped = CDATA.replace_all(xml, |caps: &regex::Captures| {
        caps[1].replace('&', "&amp;").replace('<', "&lt;")
    });

    let document = Html::parse_fragment(&unwrapped);
    let text: Vec<&str> = document.root_element().text().collect();
    let joined = text.join(" ");
    let without_files = FILENAME.replace_all(&joined, "");
    without_files.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: MassifProperties,
}

#[derive(Debug, Deserialize)]
struct MassifProperties {
    code: serde_json::Value,
    title: String,
    #[serde(default, rename = "Departemen")]
    departement: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BULLETIN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<BULLETINS_NEIGE_AVALANCHE ID="3" MASSIF="MONT-BLANC">
  <CARTOUCHERISQUE>
    <RISQUE RISQUE1="3" EVOLURISQUE1="" />
    <RESUME>Risque marqué au-dessus de 2200 m.</RESUME>
    <ImageCartoucheRisque>carte_risque.png</ImageCartoucheRisque>
  </CARTOUCHERISQUE>
  <STABILITE><TEXTE><![CDATA[Plaques à vent < 30 cm sur les pentes nord.]]></TEXTE></STABILITE>
  <NEIGEFRAICHE>Cumul de 0.5 m en 48 h.</NEIGEFRAICHE>
</BULLETINS_NEIGE_AVALANCHE>"#;

    #[test]
    fn test_extract_text_flattens_document() {
        let text = extract_bulletin_text(BULLETIN);
        assert!(text.starts_with("Risque marqué au-dessus de 2200 m."));
        assert!(text.contains("Plaques à vent < 30 cm sur les pentes nord."));
        assert!(text.contains("Cumul de 0.5 m en 48 h."));
        assert!(!text.contains("carte_risque"));
        assert!(!text.contains("  "));
    }

    #[test]
    fn test_extract_text_empty_document() {
        assert_eq!(extract_bulletin_text("<?xml version=\"1.0\"?><BRA/>"), "");
    }

    #[tokio::test]
    async fn test_bulletin_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/massif/BRA"))
            .and(query_param("id-massif", "3"))
            .and(query_param("format", "xml"))
            .and(header("apikey", "mf-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BULLETIN))
            .mount(&server)
            .await;

        let client = MeteoFranceClient::new("mf-key", Duration::from_secs(2))
            .unwrap()
            .with_base_url(server.uri());
        let bulletin = client.bulletin("3").await.unwrap();
        assert_eq!(bulletin.range_id, "3");
        assert!(bulletin.raw_text.contains("Risque marqué"));
    }

    #[tokio::test]
    async fn test_bulletin_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(BULLETIN)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = MeteoFranceClient::new("k", Duration::from_millis(50))
            .unwrap()
            .with_base_url(server.uri());
        assert!(client.bulletin("3").await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_massif_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/liste-massifs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {
                        "code": 3, "title": "Mont-Blanc", "Departemen": "Haute-Savoie"
                    }},
                    {"type": "Feature", "properties": {"code": "40", "title": "Cerdagne-Canigou"}}
                ]
            })))
            .mount(&server)
            .await;

        let client = MeteoFranceClient::new("k", Duration::from_secs(2))
            .unwrap()
            .with_base_url(server.uri());
        let massifs = client.massifs().await.unwrap();
        assert_eq!(massifs[0].code, "3");
        assert_eq!(massifs[0].group.as_deref(), Some("Haute-Savoie"));
        assert_eq!(massifs[1].code, "40");
    }
}
