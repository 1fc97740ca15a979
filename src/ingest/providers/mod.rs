// src/ingest/providers/mod.rs
pub mod generated;
pub mod knowledge_graph;
pub mod scraped;

use anyhow::Result;

use crate::analyze::ai_adapter::DynLlm;
use crate::config::BotConfig;
use crate::ingest::types::SourceProvider;

pub use generated::GeneratedProvider;
pub use knowledge_graph::KnowledgeGraphProvider;
pub use scraped::ScrapeProvider;

/// Enabled providers in source order: knowledge graph, scrape, generated.
/// Order matters for the cross-source merge and for score ties.
pub fn from_config(cfg: &BotConfig, llm: &DynLlm) -> Result<Vec<Box<dyn SourceProvider>>> {
    let mut out: Vec<Box<dyn SourceProvider>> = Vec::new();
    if cfg.sources.knowledge_graph {
        out.push(Box::new(KnowledgeGraphProvider::new(
            &cfg.sources.sparql_endpoint,
            &cfg.net,
        )?));
    }
    if cfg.sources.scrape && !cfg.sources.sites.is_empty() {
        out.push(Box::new(ScrapeProvider::new(&cfg.sources.sites, &cfg.net)?));
    }
    if cfg.sources.generated {
        out.push(Box::new(GeneratedProvider::new(
            llm.clone(),
            cfg.generation.temperature,
        )));
    }
    tracing::info!(
        target: "ingest",
        providers = ?out.iter().map(|p| p.name()).collect::<Vec<_>>(),
        "source providers configured"
    );
    Ok(out)
}
