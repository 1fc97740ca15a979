// src/verify/wikidata.rs
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{DateFact, DateProperty, KnowledgeBase, VerifyError};
use crate::config::bot::{NetSection, VerifySection};
use crate::net::{with_retries, RetryPolicy};

/// Wikidata Action API client (`wbsearchentities` + `wbgetentities`).
pub struct WikidataClient {
    http: reqwest::Client,
    api_url: String,
    language: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct SearchResp {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default, rename = "match")]
    matched: Option<SearchMatch>,
}

#[derive(Debug, Deserialize)]
struct SearchMatch {
    text: String,
}

impl WikidataClient {
    pub fn new(verify: &VerifySection, net: &NetSection) -> anyhow::Result<Self> {
        Ok(Self {
            http: crate::net::http_client(net.timeout())?,
            api_url: verify.api_url.clone(),
            language: verify.language.clone(),
            retry: net.retry_policy(),
        })
    }

    async fn get_json(&self, params: &[(&str, &str)]) -> Result<Value, VerifyError> {
        let resp = self.http.get(&self.api_url).query(params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VerifyError::Api(format!("HTTP {status}")));
        }
        let v: Value = resp.json().await?;
        if let Some(err) = v.get("error") {
            return Err(VerifyError::Api(err.to_string()));
        }
        Ok(v)
    }
}

/// Pick the entity only when the search is unambiguous: an exact
/// (case-insensitive) label/alias match, or a single result.
fn pick_entity(name: &str, hits: &[SearchHit]) -> Option<String> {
    let wanted = name.trim().to_lowercase();
    let exact: Vec<&SearchHit> = hits
        .iter()
        .filter(|h| {
            let m = h.matched.as_ref().map(|m| m.text.to_lowercase());
            let l = h.label.as_ref().map(|l| l.to_lowercase());
            m.as_deref() == Some(wanted.as_str()) || l.as_deref() == Some(wanted.as_str())
        })
        .collect();
    match (exact.as_slice(), hits) {
        ([one], _) => Some(one.id.clone()),
        ([], [only]) => Some(only.id.clone()),
        _ => None,
    }
}

/// Extract `time`/`precision` pairs for the verifier's properties from a
/// `wbgetentities` response.
pub(crate) fn parse_date_claims(body: &Value, entity_id: &str) -> Result<Vec<DateFact>, VerifyError> {
    let claims = body
        .get("entities")
        .and_then(|e| e.get(entity_id))
        .and_then(|e| e.get("claims"))
        .ok_or_else(|| VerifyError::Parse(format!("no claims for {entity_id}")))?;

    let mut out = Vec::new();
    for prop in DateProperty::ALL {
        let Some(statements) = claims.get(prop.pid()).and_then(Value::as_array) else {
            continue;
        };
        for st in statements {
            let value = st.pointer("/mainsnak/datavalue/value");
            let Some(time) = value.and_then(|v| v.get("time")).and_then(Value::as_str) else {
                continue;
            };
            let mut fact = DateFact::new(prop, time);
            if let Some(p) = value
                .and_then(|v| v.get("precision"))
                .and_then(Value::as_u64)
            {
                fact = fact.with_precision(p.min(u8::MAX as u64) as u8);
            }
            out.push(fact);
        }
    }
    Ok(out)
}

#[async_trait]
impl KnowledgeBase for WikidataClient {
    async fn resolve_entity(&self, name: &str) -> Result<Option<String>, VerifyError> {
        let params = [
            ("action", "wbsearchentities"),
            ("search", name),
            ("language", self.language.as_str()),
            ("uselang", self.language.as_str()),
            ("type", "item"),
            ("limit", "5"),
            ("format", "json"),
        ];
        let body = with_retries(self.retry, "wikidata.search", || self.get_json(&params)).await?;
        let resp: SearchResp =
            serde_json::from_value(body).map_err(|e| VerifyError::Parse(e.to_string()))?;
        Ok(pick_entity(name, &resp.search))
    }

    async fn date_facts(&self, entity_id: &str) -> Result<Vec<DateFact>, VerifyError> {
        let params = [
            ("action", "wbgetentities"),
            ("ids", entity_id),
            ("props", "claims"),
            ("format", "json"),
        ];
        let body = with_retries(self.retry, "wikidata.entity", || self.get_json(&params)).await?;
        parse_date_claims(&body, entity_id)
    }
}
