//! End-to-end runs through the `Nearfile` facade with the hashing embedder,
//! a file-backed store and a manual clock.

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use nearfile_embed::ProviderKind;
use nearfile_retriever::clock::{Clock, ManualClock};
use nearfile_retriever::config::NearfileConfig;
use nearfile_retriever::storage::QueryFilter;
use nearfile_retriever::{Nearfile, NearfileError};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn test_config(store_dir: &Path) -> NearfileConfig {
    let mut config = NearfileConfig::default();
    config.store.path = store_dir.join("index.db");
    config.embedding.provider = ProviderKind::Hash;
    config.embedding.dimension = 256;
    config
}

fn test_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap())
}

async fn open(config: NearfileConfig, clock: &ManualClock) -> nearfile_retriever::Result<Nearfile> {
    let clock: Arc<dyn Clock> = Arc::new(clock.clone());
    Nearfile::open_with_clock(config, clock).await
}

const LIGHTHOUSE: &str = "The lighthouse keeper climbed the stairs at dusk. \
    He trimmed the wick and polished the lens. \
    Fog rolled across the harbor like wet wool. \
    Ships sounded their horns in the distance. \
    By morning the sea was calm again.";

#[tokio::test]
async fn test_locate_ingest_retrieve() -> Result<()> {
    let docs = tempdir()?;
    let store_dir = tempdir()?;
    fs::create_dir_all(docs.path().join("notes/coast"))?;
    let doc = docs.path().join("notes/coast/lighthouse_log.md");
    fs::write(&doc, LIGHTHOUSE)?;
    fs::write(docs.path().join("notes/shopping.txt"), "Milk. Eggs.")?;

    let clock = test_clock();
    let nearfile = open(test_config(store_dir.path()), &clock).await?;

    let found = nearfile.locate(docs.path(), "lighthouse-log.md").await?;
    assert!(found.path.ends_with("notes/coast/lighthouse_log.md"));
    assert!(!found.is_partial());

    let report = nearfile.ingest(&[found.path.clone()]).await?;
    assert_eq!(report.ingested_count, 1);
    assert_eq!(report.chunk_count, 2);
    assert!(report.skipped.is_empty());

    let hits = nearfile
        .retrieve("Fog rolled across the harbor like wet wool.", 5)
        .await?;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_index, 0);
    assert_eq!(hits[0].source_path, found.path);
    assert!(hits[0].text.contains("Fog rolled across the harbor"));
    assert!(hits[0].score >= hits[1].score);
    Ok(())
}

#[tokio::test]
async fn test_reingest_keeps_count_and_filter_scopes() -> Result<()> {
    let docs = tempdir()?;
    let store_dir = tempdir()?;
    let root = docs.path().canonicalize()?;
    let a = root.join("a.txt");
    let b = root.join("sub/b.txt");
    fs::create_dir_all(root.join("sub"))?;
    fs::write(&a, LIGHTHOUSE)?;
    fs::write(&b, "Harbor fog again. The horns sounded twice.")?;

    let clock = test_clock();
    let nearfile = open(test_config(store_dir.path()), &clock).await?;

    nearfile.ingest(&[a.clone(), b.clone()]).await?;
    let before = nearfile.stats().await?;
    assert_eq!(before.live_records, 3);
    assert_eq!(before.distinct_sources, 2);

    clock.advance(Duration::minutes(3));
    nearfile.ingest(&[a.clone(), b.clone()]).await?;
    assert_eq!(nearfile.stats().await?.live_records, 3);

    let scoped = nearfile
        .retrieve_filtered("harbor fog", 10, &QueryFilter::path_prefix(root.join("sub")))
        .await?;
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].source_path, b);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingest_and_retrieve_stay_consistent() -> Result<()> {
    let docs = tempdir()?;
    let store_dir = tempdir()?;
    let root = docs.path().canonicalize()?;

    let mut files = Vec::new();
    for (i, topic) in ["harbor", "orchard", "glacier", "market"].iter().enumerate() {
        let path = root.join(format!("{topic}.md"));
        let text = format!(
            "The {topic} woke early on day {i}. Gulls circled over the {topic}. \
             Someone counted crates near the {topic}. The wind shifted at noon. \
             Rain reached the {topic} by evening. Lamps were lit one by one."
        );
        fs::write(&path, &text)?;
        files.push((path, text));
    }
    let files = Arc::new(files);

    let clock = test_clock();
    let nearfile = Arc::new(open(test_config(store_dir.path()), &clock).await?);
    nearfile.ingest(&[files[0].0.clone()]).await?;
    let chunks_per_file = nearfile.stats().await?.live_records;
    let full = chunks_per_file * files.len() as u64;

    let mut writers = Vec::new();
    for round in 0..4 {
        let nearfile = nearfile.clone();
        let files = files.clone();
        writers.push(tokio::spawn(async move {
            for pass in 0..5 {
                let (path, _) = &files[(round + pass) % files.len()];
                nearfile.ingest(&[path.clone()]).await?;
            }
            let all: Vec<_> = files.iter().map(|(p, _)| p.clone()).collect();
            nearfile.ingest(&all).await?;
            anyhow::Ok(())
        }));
    }

    let mut readers = Vec::new();
    for query in ["gulls circled", "rain by evening", "counted crates", "lamps lit"] {
        let nearfile = nearfile.clone();
        let files = files.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..10 {
                for hit in nearfile.retrieve(query, 5).await? {
                    let (_, text) = files
                        .iter()
                        .find(|(p, _)| *p == hit.source_path)
                        .ok_or_else(|| anyhow::anyhow!("unknown source {:?}", hit.source_path))?;
                    assert!(!hit.text.is_empty());
                    assert!(text.contains(hit.text.trim()), "partial record: {:?}", hit.text);
                    assert!(hit.score.is_finite());
                }
                let live = nearfile.stats().await?.live_records;
                assert!(live >= chunks_per_file && live <= full, "live count {live}");
            }
            anyhow::Ok(())
        }));
    }

    for task in writers.into_iter().chain(readers) {
        task.await??;
    }

    let stats = nearfile.stats().await?;
    assert_eq!(stats.live_records, full);
    assert_eq!(stats.distinct_sources, files.len() as u64);
    Ok(())
}

#[tokio::test]
async fn test_records_expire_after_retention() -> Result<()> {
    let docs = tempdir()?;
    let store_dir = tempdir()?;
    let doc = docs.path().join("log.md");
    fs::write(&doc, LIGHTHOUSE)?;

    let clock = test_clock();
    let nearfile = open(test_config(store_dir.path()), &clock).await?;
    nearfile.ingest(&[doc]).await?;

    clock.advance(Duration::minutes(19));
    assert_eq!(nearfile.retrieve("lighthouse keeper", 3).await?.len(), 2);

    clock.advance(Duration::minutes(1));
    let err = nearfile.retrieve("lighthouse keeper", 3).await.unwrap_err();
    assert!(matches!(err, NearfileError::EmptyIndex { .. }));
    assert_eq!(nearfile.stats().await?.expired_records, 0);
    Ok(())
}

#[tokio::test]
async fn test_index_survives_reopen() -> Result<()> {
    let docs = tempdir()?;
    let store_dir = tempdir()?;
    let doc = docs.path().canonicalize()?.join("log.md");
    fs::write(&doc, LIGHTHOUSE)?;

    let clock = test_clock();
    {
        let nearfile = open(test_config(store_dir.path()), &clock).await?;
        nearfile.ingest(&[doc.clone()]).await?;
    }

    let reopened = open(test_config(store_dir.path()), &clock).await?;
    let stats = reopened.stats().await?;
    assert_eq!(stats.live_records, 2);
    assert_eq!(stats.dimension, Some(256));
    let hits = reopened.retrieve("polished the lens", 1).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_path, doc);
    Ok(())
}

#[tokio::test]
async fn test_reopen_with_other_model_is_rejected_while_live() -> Result<()> {
    let docs = tempdir()?;
    let store_dir = tempdir()?;
    let doc = docs.path().join("log.md");
    fs::write(&doc, LIGHTHOUSE)?;

    let clock = test_clock();
    {
        let nearfile = open(test_config(store_dir.path()), &clock).await?;
        nearfile.ingest(&[doc]).await?;
    }

    let mut other = test_config(store_dir.path());
    other.embedding.dimension = 64;
    let err = open(other.clone(), &clock).await.err().expect("open should fail");
    assert!(
        matches!(err, NearfileError::Embedding { .. }),
        "unexpected error: {err}"
    );

    // Once everything has expired the store is re-stamped for the new model.
    clock.advance(Duration::minutes(21));
    let nearfile = open(other, &clock).await?;
    assert_eq!(nearfile.stats().await?.dimension, Some(64));
    Ok(())
}

#[tokio::test]
async fn test_missing_and_unsupported_are_reported() -> Result<()> {
    let docs = tempdir()?;
    let store_dir = tempdir()?;
    let pdf = docs.path().join("scan.pdf");
    fs::write(&pdf, "%PDF-1.7")?;

    let clock = test_clock();
    let nearfile = open(test_config(store_dir.path()), &clock).await?;

    let report = nearfile
        .ingest(&[pdf, docs.path().join("nowhere.md")])
        .await?;
    assert_eq!(report.ingested_count, 0);
    assert_eq!(report.skipped.len(), 2);

    let err = nearfile.locate(docs.path(), "zzzzqqqq.md").await.unwrap_err();
    assert!(matches!(err, NearfileError::NotFound { .. }));
    Ok(())
}
