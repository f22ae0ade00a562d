//! Server entry point

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use maktaba_config::load_settings;
use maktaba_llm::{OpenRouterClient, OpenRouterConfig};
use maktaba_search::{
    ChatModel, EmbeddingProvider, GraphResolver, JinaEmbeddingBackend, LexicalClient,
    OpenAiEmbeddingBackend, QueryExpander, Reranker, SearchPipeline, SearchPipelineConfig,
    TranslationMerger, VectorClient,
};
use maktaba_server::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = load_settings(None).context("loading settings")?;
    tracing::info!(environment = ?settings.environment, "Starting search service");

    let persistence = maktaba_persistence::init(&settings.database)
        .await
        .context("connecting to Postgres")?;

    let lexical = Arc::new(LexicalClient::new(settings.lexical.clone()));
    let vector = Arc::new(VectorClient::new(&settings.vector).context("connecting to Qdrant")?);

    let embedder = Arc::new(EmbeddingProvider::new(
        Arc::new(persistence.embedding_cache),
        Arc::new(OpenAiEmbeddingBackend::new(
            &settings.embedding.openai_endpoint,
            settings.embedding.openai_api_key.clone(),
            settings.embedding.max_batch,
        )),
        Arc::new(JinaEmbeddingBackend::new(
            &settings.embedding.jina_endpoint,
            settings.embedding.jina_api_key.clone(),
            settings.embedding.max_batch,
        )),
    ));

    let chat: Arc<dyn ChatModel> = Arc::new(
        OpenRouterClient::new(OpenRouterConfig::new(
            settings.llm.api_key.clone(),
            settings.llm.endpoint.clone(),
        ))
        .context("configuring the LLM client")?,
    );

    let books = Arc::new(persistence.books);
    let pipeline = Arc::new(SearchPipeline::new(
        lexical,
        vector,
        embedder,
        Reranker::new(Arc::clone(&chat), settings.llm.clone()),
        QueryExpander::new(Arc::clone(&chat), settings.llm.fast_model.clone()),
        TranslationMerger::new(Arc::new(persistence.translations), books.clone()),
        settings.graph.url.as_deref().map(GraphResolver::new),
        books,
        Some(Arc::new(persistence.analytics)),
        SearchPipelineConfig {
            base_similarity_threshold: settings.search.base_similarity_threshold,
            debug_stats: !settings.environment.is_production(),
        },
    ));

    let state = AppState::new(pipeline, settings.environment);
    let router = create_router(state, &settings.server.cors_origins);

    let address = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {}", address))?;
    tracing::info!(%address, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("serving")?;

    Ok(())
}
