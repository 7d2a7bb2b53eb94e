//! Language-model backed intent classification.
//!
//! The classifier never fails: timeouts, transport errors and unparsable model
//! output all collapse into [`Classification::degraded`].

use cluster_assistant_sdk::{async_trait, Classification, Intent, IntentClassifier, LanguageModel};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::llm::parse_json_object;

/// Confidence assumed when the model omits one
const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Fields as the model is asked to return them
#[derive(Debug, Default, Deserialize)]
struct RawClassification {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default, alias = "google_sheets_url", alias = "sheets_url")]
    sheets_reference: Option<String>,
    #[serde(default)]
    fqdn: Option<String>,
    #[serde(default, alias = "ip_address", alias = "ip")]
    single_ip: Option<String>,
    #[serde(default)]
    subnet: Option<String>,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
}

impl RawClassification {
    fn into_classification(self) -> Classification {
        let intent = self
            .intent
            .as_deref()
            .map(Intent::from_label)
            .unwrap_or(Intent::GeneralChat);

        let confidence = self
            .confidence
            .as_ref()
            .and_then(confidence_value)
            .unwrap_or(DEFAULT_CONFIDENCE);

        Classification {
            sheets_reference: present(self.sheets_reference),
            fqdn: present(self.fqdn),
            single_ip: present(self.single_ip),
            subnet: present(self.subnet),
            ..Classification::new(intent, confidence)
        }
    }
}

/// Models sometimes quote numbers
fn confidence_value(value: &serde_json::Value) -> Option<f32> {
    let confidence: Option<f32> = match value {
        serde_json::Value::Number(n) => n.as_f64().map(|f| f as f32),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    confidence.filter(|f| f.is_finite())
}

/// Empty strings and placeholder nulls count as absent
fn present(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_string())
        .filter(|value| {
            !value.is_empty()
                && !value.eq_ignore_ascii_case("null")
                && !value.eq_ignore_ascii_case("none")
                && !value.ends_with("_if_present")
        })
}

pub fn classification_prompt(user_input: &str) -> String {
    format!(
        r#"Analyze the following user input, determine the intent and extract relevant information.

User Input: "{user_input}"

Possible intents:
1. CREATE_CLUSTER - build an OpenShift cluster from a Google Sheet
2. CREATE_DNS_RECORD - create a single DNS record
3. PARSE_SHEETS - parse a Google Sheet and report cluster info
4. ALLOCATE_IPS - allocate IPs for the nodes in a sheet from a subnet
5. GENERAL_CHAT - general conversation or a help request

Extract if present:
- google_sheets_url: URL of the Google Sheet
- fqdn: fully qualified domain name
- ip_address: IP address
- subnet: subnet in CIDR format

Return a JSON object:
{{
    "intent": "intent_name",
    "google_sheets_url": "url_if_present",
    "fqdn": "fqdn_if_present",
    "ip_address": "ip_if_present",
    "subnet": "subnet_if_present",
    "confidence": 0.95
}}

Only return valid JSON, no additional text."#
    )
}

/// Parse model output into a classification, or explain why it cannot be
pub fn parse_classification(text: &str) -> Result<Classification, String> {
    let raw: RawClassification = parse_json_object(text)?;
    if raw.intent.is_none() {
        return Err("model response has no intent field".to_string());
    }
    Ok(raw.into_classification())
}

pub struct LlmIntentClassifier {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl LlmIntentClassifier {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, text: &str) -> Classification {
        let prompt = classification_prompt(text);

        let response = match tokio::time::timeout(self.timeout, self.model.generate(&prompt)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(model = self.model.name(), error = %e, "Intent classification failed");
                return Classification::degraded(e.to_string());
            }
            Err(_) => {
                warn!(model = self.model.name(), timeout = ?self.timeout, "Intent classification timed out");
                return Classification::degraded(format!(
                    "no response from {} within {:?}",
                    self.model.name(),
                    self.timeout
                ));
            }
        };

        match parse_classification(&response) {
            Ok(classification) => {
                debug!(
                    intent = %classification.intent,
                    confidence = classification.confidence,
                    "Intent classified"
                );
                classification
            }
            Err(reason) => {
                warn!(model = self.model.name(), error = %reason, "Unusable classification response");
                Classification::degraded(reason)
            }
        }
    }
}

/// Classifier used when no language model is configured
#[derive(Debug, Default)]
pub struct UnavailableClassifier;

#[async_trait]
impl IntentClassifier for UnavailableClassifier {
    async fn classify(&self, _text: &str) -> Classification {
        Classification::degraded("no language model configured")
    }
}
