// src/ingest/providers/generated.rs
use async_trait::async_trait;
use serde_json::Value;

use crate::analyze::ai_adapter::{strip_code_fence, ChatRequest, DynLlm};
use crate::candidate::{ClaimType, DayMonth};
use crate::ingest::types::{RawCandidate, SourceError, SourceProvider};

const SYSTEM: &str = "Eres un historiador especializado en la historia de España. \
Respondes únicamente con JSON válido, sin comentarios.";

/// Asks the language model for candidate events. Output is unverified and
/// goes through the date verifier when strict mode is on.
pub struct GeneratedProvider {
    llm: DynLlm,
    count: usize,
    temperature: f32,
}

impl GeneratedProvider {
    pub fn new(llm: DynLlm, temperature: f32) -> Self {
        Self {
            llm,
            count: 8,
            temperature,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }
}

pub fn build_prompt(today: DayMonth, count: usize) -> String {
    format!(
        "Propón {count} acontecimientos reales de la historia de España ocurridos un {day} de {month}. \
Devuelve un array JSON de objetos con las claves \"year\" (entero, negativo para antes de Cristo), \
\"text\" (una frase descriptiva), \"entity\" (nombre exacto del artículo de Wikidata o Wikipedia del \
hecho o de la persona) y \"claim_type\" (\"event\", \"birth\" o \"death\"). \
No inventes fechas: si no estás seguro del día exacto, omite el hecho.",
        day = today.day,
        month = today.month_name_es(),
    )
}

fn year_value(v: &Value) -> Option<i32> {
    match v {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse the model answer. Malformed entries are skipped; a non-array answer is an error.
pub fn parse_generated(answer: &str) -> Result<Vec<RawCandidate>, SourceError> {
    let v: Value = serde_json::from_str(strip_code_fence(answer))
        .map_err(|e| SourceError::Parse(format!("generated candidates: {e}")))?;
    let items = match &v {
        Value::Array(a) => a,
        Value::Object(o) => o
            .values()
            .find_map(Value::as_array)
            .ok_or_else(|| SourceError::Parse("generated candidates: no array".into()))?,
        _ => return Err(SourceError::Parse("generated candidates: not an array".into())),
    };

    let out = items
        .iter()
        .filter_map(|it| {
            let year = it.get("year").and_then(year_value)?;
            let text = it.get("text").and_then(Value::as_str)?.to_string();
            let entity = it
                .get("entity")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string);
            let claim_type = it
                .get("claim_type")
                .and_then(Value::as_str)
                .and_then(|c| c.parse::<ClaimType>().ok());
            Some(RawCandidate::Generated {
                year,
                text,
                entity,
                claim_type,
            })
        })
        .collect();
    Ok(out)
}

#[async_trait]
impl SourceProvider for GeneratedProvider {
    async fn fetch(&self, today: DayMonth) -> Result<Vec<RawCandidate>, SourceError> {
        let prompt = build_prompt(today, self.count);
        let answer = self
            .llm
            .complete(ChatRequest {
                system: SYSTEM,
                user: &prompt,
                temperature: self.temperature,
                max_tokens: 1200,
            })
            .await?;
        parse_generated(&answer)
    }

    fn name(&self) -> &'static str {
        "generated"
    }
}
