//! Retrieval over the on-disk and cached registries.

use funnel_retrieval::{
    CachedFileRegistry, FileRegistry, FsFileRegistry, RetrievalConfig, RetrievalTarget,
    RetrieveOptions,
};
use funnel_test_utils::{param_file, reference_date, retriever, ScriptedAdapter};
use std::sync::Arc;

fn options() -> RetrieveOptions {
    RetrieveOptions::new().with_reference_date(reference_date())
}

#[tokio::test]
async fn fs_registry_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(FsFileRegistry::new(dir.path()));
    registry.open().await.unwrap();
    registry.register_file("conv", &param_file("conv")).await.unwrap();

    let adapter = Arc::new(ScriptedAdapter::new());
    let engine = retriever(Arc::clone(&registry), Arc::clone(&adapter), RetrievalConfig::new());
    let target = RetrievalTarget::Node("checkout".into());
    let dsl = "window(1-Nov-25:7-Nov-25).context(channel:google)";

    let first = engine.retrieve("conv", &target, dsl, &options()).await.unwrap();
    assert_eq!(first.days_fetched, 7);
    registry.close().await.unwrap();

    let reopened = Arc::new(FsFileRegistry::new(dir.path()));
    reopened.open().await.unwrap();
    let stored = reopened.get_file("conv").await.unwrap().unwrap();
    assert_eq!(stored.all_dates().len(), 7);
    assert!(stored.check_invariants().is_ok());

    let engine = retriever(reopened, Arc::clone(&adapter), RetrievalConfig::new());
    let second = engine.retrieve("conv", &target, dsl, &options()).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(adapter.call_count().await, 1);
}

#[tokio::test]
async fn cached_registry_sees_its_own_writes() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(CachedFileRegistry::new(FsFileRegistry::new(dir.path()), 64));
    registry.open().await.unwrap();
    registry.register_file("conv", &param_file("conv")).await.unwrap();

    let adapter = Arc::new(ScriptedAdapter::new());
    let engine = retriever(Arc::clone(&registry), Arc::clone(&adapter), RetrievalConfig::new());
    let target = RetrievalTarget::Edge("a->b".into());

    engine
        .retrieve("conv", &target, "window(1-Nov-25:3-Nov-25)", &options())
        .await
        .unwrap();
    let extended = engine
        .retrieve("conv", &target, "window(1-Nov-25:5-Nov-25)", &options())
        .await
        .unwrap();

    assert_eq!(extended.days_fetched, 2);
    assert_eq!(extended.evidence.n, 500);
    assert_eq!(adapter.call_count().await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_to_one_id_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(FsFileRegistry::new(dir.path()));
    registry.open().await.unwrap();
    registry.register_file("conv", &param_file("conv")).await.unwrap();

    let writers: Vec<_> = (0..2)
        .map(|writer| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let file = param_file("conv").with_connection(format!("writer-{writer}"));
                for _ in 0..200 {
                    registry.update_file("conv", &file).await?;
                }
                Ok::<_, funnel_retrieval::RegistryError>(())
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    let stored = registry.get_file("conv").await.unwrap().unwrap();
    assert!(stored.connection.as_deref().is_some_and(|c| c.starts_with("writer-")));
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}
