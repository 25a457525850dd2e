pub mod cli;
pub mod run;
pub mod validate;

use std::sync::Arc;

use crewline_core::api::{AppContext, Crew, CrewEngine, InMemoryStore};

use crate::error::CliError;

/// Engine over an in-memory store seeded with `crews`.
pub async fn engine_with_crews(
    ctx: &AppContext,
    crews: Vec<Crew>,
) -> Result<(Arc<InMemoryStore>, CrewEngine), CliError> {
    let store = Arc::new(InMemoryStore::new());
    for crew in crews {
        store.put_crew(crew).await;
    }
    let engine = ctx.build_engine(store.clone(), store.clone()).await?;
    Ok((store, engine))
}
