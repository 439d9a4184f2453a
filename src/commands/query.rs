//! Query command implementation

use super::{IndexSelector, StoreHandles};
use crate::batch::resolve_index;
use crate::config::Config;
use crate::error::Result;
use crate::rerank::create_reranker_chain;
use crate::retrieval::{RetrievalPipeline, RetrievedDocument};
use crate::scoring::create_scorer;
use crate::store::RetrievalMode;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// File ids, or JSON lists of file ids; empty means every file of the index
    pub scope: Vec<String>,
    pub top_k: Option<usize>,
    pub mode: Option<RetrievalMode>,
    pub mmr: bool,
    pub user: Option<String>,
    pub index: IndexSelector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub mode: RetrievalMode,
    pub results: Vec<RetrievedDocument>,
}

pub async fn cmd_query(
    config: &Config,
    stores: &StoreHandles,
    query: &str,
    options: QueryOptions,
) -> Result<QueryResult> {
    let mut settings = config.retrieval.clone();
    if let Some(top_k) = options.top_k {
        settings.top_k = top_k;
    }
    if let Some(mode) = options.mode {
        settings.mode = mode;
    }
    settings.mmr |= options.mmr;

    let scope: Vec<Option<String>> = if options.scope.is_empty() {
        let index = resolve_index(
            &stores.catalog,
            options.index.name.as_deref(),
            options.index.id,
            true,
        )
        .await?;
        let user = config.effective_user(options.user);
        stores
            .catalog
            .list_sources(index.id, user.as_deref())
            .await?
            .into_iter()
            .map(|source| Some(source.id))
            .collect()
    } else {
        options.scope.into_iter().map(Some).collect()
    };

    info!(query = %query, mode = %settings.mode, scope = scope.len(), "Running query");

    let mode = settings.mode;
    let pipeline = RetrievalPipeline::new(
        stores.catalog.clone(),
        stores.vectors.clone(),
        stores.documents.clone(),
        settings,
    )
    .with_rerankers(create_reranker_chain(&config.rerankers)?)
    .with_scorer(create_scorer(&config.scorer)?);

    let results = pipeline.run(query, &scope).await?;

    Ok(QueryResult {
        query: query.to_string(),
        mode,
        results,
    })
}

pub fn print_query_results(result: &QueryResult) {
    println!("\n🔍 Query: {} ({})\n", result.query, result.mode);
    println!("Found {} results:\n", result.results.len());

    for (i, doc) in result.results.iter().enumerate() {
        let source = doc.file_name().unwrap_or(&doc.doc_id);
        match doc.page_label() {
            Some(page) => println!("{}. [score: {:.3}] {} (page {})", i + 1, doc.score, source, page),
            None => println!("{}. [score: {:.3}] {}", i + 1, doc.score, source),
        }

        if let Some(relevance) = doc.relevance {
            println!("   Relevance: {:.2}", relevance);
        }

        let text = doc.text.trim();
        let preview = match text.char_indices().nth(200) {
            Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
            None => text.to_string(),
        };
        println!("   {}\n", preview.replace('\n', " "));
    }
}
