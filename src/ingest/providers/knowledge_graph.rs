// src/ingest/providers/knowledge_graph.rs
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

use crate::candidate::DayMonth;
use crate::config::bot::NetSection;
use crate::ingest::types::{RawCandidate, SourceError, SourceProvider};
use crate::net::{with_retries, RetryPolicy};

const RESULT_LIMIT: u32 = 60;

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([+-]?)(\d{1,6})-").unwrap());
static QID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Q\d+$").unwrap());

/// Wikidata SPARQL query: items whose point in time (P585) falls on today's
/// day/month and that are tied to Spain (Q29). Results are already date-scoped.
pub struct KnowledgeGraphProvider {
    http: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl KnowledgeGraphProvider {
    pub fn new(endpoint: &str, net: &NetSection) -> anyhow::Result<Self> {
        Ok(Self {
            http: crate::net::http_client(net.timeout())?,
            endpoint: endpoint.to_string(),
            retry: net.retry_policy(),
        })
    }

    async fn query_once(&self, sparql: &str) -> Result<Value, SourceError> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("query", sparql), ("format", "json")])
            .header(reqwest::header::ACCEPT, "application/sparql-results+json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                provider: "knowledge_graph",
                status,
            });
        }
        Ok(resp.json().await?)
    }
}

pub fn build_query(today: DayMonth) -> String {
    format!(
        r#"SELECT ?item ?itemLabel ?itemDescription ?date ?image WHERE {{
  ?item p:P585 ?st .
  ?st psv:P585 [ wikibase:timeValue ?date ; wikibase:timePrecision 11 ] ;
      wikibase:rank ?rank .
  FILTER(?rank != wikibase:DeprecatedRank)
  ?item (wdt:P17|wdt:P495|wdt:P710|wdt:P1001) wd:Q29 .
  FILTER(MONTH(?date) = {month} && DAY(?date) = {day})
  OPTIONAL {{ ?item wdt:P18 ?image . }}
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "es,en". }}
}}
LIMIT {limit}"#,
        month = today.month,
        day = today.day,
        limit = RESULT_LIMIT,
    )
}

fn year_of(date: &str) -> Option<i32> {
    let caps = YEAR_RE.captures(date)?;
    let y: i32 = caps[2].parse().ok()?;
    if y == 0 {
        return None;
    }
    Some(if &caps[1] == "-" { -y } else { y })
}

fn binding<'a>(row: &'a Value, key: &str) -> Option<&'a str> {
    row.get(key)?.get("value")?.as_str()
}

/// Turn SPARQL JSON bindings into raw candidates, one per item.
/// Rows without a real label (the label service falls back to the Q-id) are skipped.
pub fn parse_bindings(body: &Value) -> Result<Vec<RawCandidate>, SourceError> {
    let rows = body
        .pointer("/results/bindings")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Parse("missing results.bindings".into()))?;

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(item) = binding(row, "item") else { continue };
        let entity_id = item.rsplit('/').next().unwrap_or(item).to_string();
        if !seen.insert(entity_id.clone()) {
            continue;
        }
        let Some(label) = binding(row, "itemLabel").filter(|l| !QID_RE.is_match(l)) else {
            continue;
        };
        let Some(year) = binding(row, "date").and_then(year_of) else {
            continue;
        };
        out.push(RawCandidate::KnowledgeGraph {
            year,
            label: label.to_string(),
            description: binding(row, "itemDescription").map(str::to_string),
            entity_id,
            image_url: binding(row, "image").map(str::to_string),
        });
    }
    Ok(out)
}

#[async_trait]
impl SourceProvider for KnowledgeGraphProvider {
    async fn fetch(&self, today: DayMonth) -> Result<Vec<RawCandidate>, SourceError> {
        let sparql = build_query(today);
        let body = with_retries(self.retry, "sparql", || self.query_once(&sparql)).await?;
        parse_bindings(&body)
    }

    fn name(&self) -> &'static str {
        "knowledge_graph"
    }
}
