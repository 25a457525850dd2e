mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{abc_crew, services, ScriptedRunner};
use crewline_core::api::{
    AppContext, EngineConfig, EngineError, ExecutionStatus, InMemoryStore, Services,
    ServicesFactory, TriggerRequest,
};

struct ScriptedFactory(Arc<ScriptedRunner>);

#[async_trait]
impl ServicesFactory for ScriptedFactory {
    async fn build_services(&self, _cfg: &EngineConfig) -> Result<Services, EngineError> {
        Ok(services(self.0.clone()))
    }
}

#[tokio::test]
async fn every_row_is_mirrored_to_the_events_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut cfg = EngineConfig::default();
    cfg.events_out.enabled = true;
    cfg.events_out.path = path.to_string_lossy().to_string();
    cfg.events_out.drop_when_full = false;

    let runner = Arc::new(ScriptedRunner::new("ok", 10));
    let ctx = AppContext::new(cfg, Some(Arc::new(ScriptedFactory(runner))))
        .await
        .unwrap();
    let store = Arc::new(InMemoryStore::new());
    store.put_crew(abc_crew("abc")).await;
    let engine = ctx.build_engine(store.clone(), store).await.unwrap();

    let id = engine.trigger(TriggerRequest::new("abc")).await.unwrap();
    assert_eq!(engine.wait(id).await.unwrap().status, ExecutionStatus::Completed);

    let mut lines = Vec::new();
    for _ in 0..100 {
        let content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        lines = content.lines().map(str::to_string).collect::<Vec<_>>();
        if lines.len() >= 6 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(lines.len(), 6);
    for (i, line) in lines.iter().enumerate() {
        let row: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(row["execution_id"], id.to_string());
        assert_eq!(row["seq"], (i + 1) as u64);
    }
}

#[tokio::test]
async fn context_without_factory_cannot_build_an_engine() {
    let ctx = AppContext::new(EngineConfig::default(), None).await.unwrap();
    let store = Arc::new(InMemoryStore::new());
    assert!(ctx.build_engine(store.clone(), store).await.is_err());
}
