//! End-to-end behavior of indexing, deletion and retrieval over the
//! in-memory stores and a temporary SQLite catalog.

use async_trait::async_trait;
use docindex::batch::BatchIndexer;
use docindex::catalog::{CatalogDb, IndexSettings, RelationType};
use docindex::config::RetrievalConfig;
use docindex::coordinator::{AddOutcome, DeleteOutcome, FileRef, IndexCoordinator};
use docindex::embed::HashingEmbedder;
use docindex::error::{Error, Result};
use docindex::loader::PlainTextLoader;
use docindex::rerank::Reranker;
use docindex::retrieval::{RetrievalPipeline, RetrievedDocument, EXTRA_TABLE_TOP_K};
use docindex::scoring::RelevanceScorer;
use docindex::store::{
    ChunkRecord, CollectionInfo, DocumentStore, MemoryDocumentStore, MemoryVectorStore,
    MetadataFilter, RetrievalMode, VectorHit, VectorQuery, VectorStore,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct Calls {
    upserts: AtomicUsize,
    deletes: AtomicUsize,
    queries: AtomicUsize,
    gets: AtomicUsize,
}

impl Calls {
    fn total(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
            + self.queries.load(Ordering::SeqCst)
            + self.gets.load(Ordering::SeqCst)
    }
}

/// Memory vector store that counts calls and can refuse filtered queries
struct CountingVectors {
    inner: MemoryVectorStore,
    calls: Arc<Calls>,
    fail_filtered_queries: bool,
}

#[async_trait]
impl VectorStore for CountingVectors {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        self.calls.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(records).await
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(ids).await
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<VectorHit>> {
        self.calls.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_filtered_queries && query.filter.is_some() {
            return Err(Error::Store("filtered query refused".to_string()));
        }
        self.inner.query(query).await
    }

    async fn info(&self) -> Result<Option<CollectionInfo>> {
        self.inner.info().await
    }
}

struct CountingDocuments {
    inner: MemoryDocumentStore,
    calls: Arc<Calls>,
}

#[async_trait]
impl DocumentStore for CountingDocuments {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        self.calls.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(records).await
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<ChunkRecord>> {
        self.calls.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(ids).await
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(ids).await
    }
}

struct Harness {
    tmp: TempDir,
    catalog: CatalogDb,
    vectors: Arc<CountingVectors>,
    documents: Arc<CountingDocuments>,
    vector_calls: Arc<Calls>,
    document_calls: Arc<Calls>,
    coordinator: IndexCoordinator,
}

impl Harness {
    async fn new() -> Self {
        Self::build(false).await
    }

    async fn build(fail_filtered_queries: bool) -> Self {
        let tmp = TempDir::new().unwrap();
        let catalog = CatalogDb::new(&tmp.path().join("catalog.db")).await.unwrap();
        let index = catalog
            .create_index("File Collection", "FileIndex", &IndexSettings::default())
            .await
            .unwrap();

        let vector_calls = Arc::new(Calls::default());
        let document_calls = Arc::new(Calls::default());
        let vectors = Arc::new(CountingVectors {
            inner: MemoryVectorStore::new(Arc::new(HashingEmbedder::new(256))),
            calls: vector_calls.clone(),
            fail_filtered_queries,
        });
        let documents = Arc::new(CountingDocuments {
            inner: MemoryDocumentStore::new(),
            calls: document_calls.clone(),
        });

        let coordinator = IndexCoordinator::new(
            catalog.clone(),
            index,
            vectors.clone(),
            documents.clone(),
            Arc::new(PlainTextLoader::new(200)),
        );

        Self {
            tmp,
            catalog,
            vectors,
            documents,
            vector_calls,
            document_calls,
            coordinator,
        }
    }

    fn write(&self, name: &str, body: impl AsRef<[u8]>) -> PathBuf {
        let path = self.tmp.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn pipeline(&self, settings: RetrievalConfig) -> RetrievalPipeline {
        RetrievalPipeline::new(
            self.catalog.clone(),
            self.vectors.clone(),
            self.documents.clone(),
            settings,
        )
    }

    async fn chunk_ids(&self, file_id: &str) -> Vec<String> {
        self.catalog
            .target_ids_for_sources(&[file_id.to_string()], RelationType::Document)
            .await
            .unwrap()
    }
}

fn scope(ids: &[&str]) -> Vec<Option<String>> {
    ids.iter().map(|id| Some(id.to_string())).collect()
}

fn doc_ids(docs: &[RetrievedDocument]) -> Vec<String> {
    docs.iter().map(|doc| doc.doc_id.clone()).collect()
}

/// Vector-mode settings; ties keep insertion order there
fn vector_settings(top_k: usize) -> RetrievalConfig {
    RetrievalConfig {
        top_k,
        mode: RetrievalMode::Vector,
        ..RetrievalConfig::default()
    }
}

struct ReverseReranker;

#[async_trait]
impl Reranker for ReverseReranker {
    async fn rerank(
        &self,
        _query: &str,
        mut documents: Vec<RetrievedDocument>,
    ) -> Result<Vec<RetrievedDocument>> {
        documents.reverse();
        Ok(documents)
    }

    fn model_name(&self) -> &str {
        "reverse"
    }
}

/// Passes documents through, remembering the order it received them in
#[derive(Default)]
struct RecordingReranker {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Reranker for RecordingReranker {
    async fn rerank(
        &self,
        _query: &str,
        documents: Vec<RetrievedDocument>,
    ) -> Result<Vec<RetrievedDocument>> {
        *self.seen.lock().unwrap() = doc_ids(&documents);
        Ok(documents)
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

enum Grading {
    Descending,
    OneShort,
    Offline,
}

struct StubScorer(Grading);

#[async_trait]
impl RelevanceScorer for StubScorer {
    async fn score(&self, _query: &str, documents: &[RetrievedDocument]) -> Result<Vec<f32>> {
        match self.0 {
            Grading::Descending => Ok([0.9, 0.6, 0.3, 0.1]
                .into_iter()
                .cycle()
                .take(documents.len())
                .collect()),
            Grading::OneShort => Ok(vec![0.5; documents.len().saturating_sub(1)]),
            Grading::Offline => Err(Error::Scoring("grader offline".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

async fn index_topics(h: &Harness) -> Vec<String> {
    let mut ids = Vec::new();
    for (name, body) in [
        ("a.txt", "tokio runtime scheduling"),
        ("b.txt", "tokio runtime scheduling"),
        ("c.txt", "tokio channels and tasks"),
        ("d.txt", "bread baking"),
    ] {
        let path = h.write(name, body);
        ids.push(h.coordinator.add(&path, false, None).await.unwrap().file_id().to_string());
    }
    ids
}

#[tokio::test]
async fn adding_the_same_file_twice_skips_the_second_time() {
    let h = Harness::new().await;
    let path = h.write("guide.txt", "install the package\n\nthen run the tool");

    let first = h.coordinator.add(&path, false, Some("alice")).await.unwrap();
    let second = h.coordinator.add(&path, false, Some("alice")).await.unwrap();

    assert!(matches!(first, AddOutcome::Indexed { .. }));
    assert!(matches!(second, AddOutcome::Skipped { .. }));

    let sources = h.catalog.list_sources(h.coordinator.index().id, None).await.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].id, first.file_id());
}

#[tokio::test]
async fn reindex_replaces_the_chunk_set() {
    let h = Harness::new().await;
    let path = h.write("notes.txt", "old content about apples");
    let file_id = h.coordinator.add(&path, false, None).await.unwrap().file_id().to_string();
    let old_chunks = h.chunk_ids(&file_id).await;
    assert_eq!(old_chunks.len(), 1);

    h.write(
        "notes.txt",
        "new content about pears\n\nand a second paragraph that is long enough to split \
         into its own chunk because it keeps going well past the limit of the loader which \
         is set to two hundred characters in this harness so it must be cut",
    );
    let outcome = h.coordinator.add(&path, true, None).await.unwrap();
    assert_eq!(outcome.file_id(), file_id);

    let new_chunks = h.chunk_ids(&file_id).await;
    assert!(new_chunks.len() >= 2);
    assert!(old_chunks.iter().all(|id| !new_chunks.contains(id)));

    let relations = h.catalog.relations_for_source(&file_id).await.unwrap();
    let related: HashSet<&str> = relations.iter().map(|r| r.target_id.as_str()).collect();
    let expected: HashSet<&str> = new_chunks.iter().map(String::as_str).collect();
    assert_eq!(related, expected);
    assert_eq!(relations.len(), new_chunks.len() * 2);

    assert!(h.documents.inner.get(&old_chunks).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_cascades_to_catalog_and_stores() {
    let h = Harness::new().await;
    let path = h.write("report.txt", "quarterly numbers\n\nregional breakdown");
    let file_id = h.coordinator.add(&path, false, None).await.unwrap().file_id().to_string();
    let chunks = h.chunk_ids(&file_id).await;
    assert!(!chunks.is_empty());

    let outcome = h
        .coordinator
        .delete(&FileRef::Name("report.txt".into()), None)
        .await
        .unwrap();
    assert!(matches!(outcome, DeleteOutcome::Deleted { .. }));

    assert!(h.catalog.relations_for_source(&file_id).await.unwrap().is_empty());
    assert!(h.chunk_ids(&file_id).await.is_empty());

    let remaining_vectors = h.vectors.inner.ids().await;
    assert!(chunks.iter().all(|id| !remaining_vectors.contains(id)));
    assert!(h.documents.inner.get(&chunks).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_scope_returns_nothing_without_store_calls() {
    let h = Harness::new().await;
    let path = h.write("a.txt", "something to find");
    h.coordinator.add(&path, false, None).await.unwrap();

    let before_vectors = h.vector_calls.total();
    let before_documents = h.document_calls.total();

    let results = h
        .pipeline(RetrievalConfig::default())
        .run("something", &[])
        .await
        .unwrap();
    assert!(results.is_empty());

    let flattened_empty = h
        .pipeline(RetrievalConfig::default())
        .run("something", &scope(&["[]"]))
        .await
        .unwrap();
    assert!(flattened_empty.is_empty());

    assert_eq!(h.vector_calls.total(), before_vectors);
    assert_eq!(h.document_calls.total(), before_documents);
}

#[tokio::test]
async fn json_encoded_scope_matches_flat_scope() {
    let h = Harness::new().await;
    let mut ids = Vec::new();
    for (name, body) in [
        ("a.txt", "rust ownership and borrowing"),
        ("b.txt", "async runtimes and executors"),
        ("c.txt", "ownership of async tasks"),
        ("d.txt", "unrelated cooking recipe"),
    ] {
        let path = h.write(name, body);
        ids.push(h.coordinator.add(&path, false, None).await.unwrap().file_id().to_string());
    }

    let encoded = serde_json::to_string(&[&ids[0], &ids[1]]).unwrap();
    let settings = RetrievalConfig::default();

    let nested = h
        .pipeline(settings.clone())
        .run("ownership async", &scope(&[&encoded, &ids[2]]))
        .await
        .unwrap();
    let flat = h
        .pipeline(settings)
        .run("ownership async", &scope(&[&ids[0], &ids[1], &ids[2]]))
        .await
        .unwrap();

    assert!(!flat.is_empty());
    assert_eq!(nested, flat);

    let excluded: HashSet<String> = h.chunk_ids(&ids[3]).await.into_iter().collect();
    assert!(flat.iter().all(|doc| !excluded.contains(&doc.doc_id)));
}

#[tokio::test]
async fn failed_augmentation_keeps_base_results() {
    let h = Harness::build(true).await;
    let path = h.write(
        "manual.txt",
        "page one about setup\n\nmore setup detail on page one\u{c}page two about teardown",
    );
    let file_id = h.coordinator.add(&path, false, None).await.unwrap().file_id().to_string();

    let base_settings = RetrievalConfig {
        top_k: 1,
        get_extra_table: false,
        ..RetrievalConfig::default()
    };
    let augmented_settings = RetrievalConfig {
        get_extra_table: true,
        ..base_settings.clone()
    };

    let base = h
        .pipeline(base_settings)
        .run("setup", &scope(&[&file_id]))
        .await
        .unwrap();
    let queries_before = h.vector_calls.queries.load(Ordering::SeqCst);

    let augmented = h
        .pipeline(augmented_settings)
        .run("setup", &scope(&[&file_id]))
        .await
        .unwrap();

    assert_eq!(base.len(), 1);
    assert_eq!(augmented, base);
    // first round plus the refused augmentation query
    assert_eq!(h.vector_calls.queries.load(Ordering::SeqCst), queries_before + 2);
}

#[tokio::test]
async fn one_unreadable_file_does_not_stop_the_batch() {
    let h = Harness::new().await;
    let files: Vec<PathBuf> = (1..=5)
        .map(|i| {
            let name = format!("file{}.txt", i);
            if i == 3 {
                h.write(&name, [0xff, 0xfe, 0xfd, 0x00, 0xc3])
            } else {
                h.write(&name, format!("contents of file number {}", i))
            }
        })
        .collect();

    let batch = BatchIndexer::new(h.coordinator);
    let seen = std::sync::Mutex::new(Vec::new());
    let on_file = |current: usize, total: usize, _path: &std::path::Path| {
        seen.lock().unwrap().push((current, total));
    };
    let report = batch.index_files(files, false, None, Some(&on_file)).await;

    assert_eq!(report.indexed, 4);
    assert_eq!(report.errors, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.total_files, 5);
    assert!(!report.success);
    assert_eq!(report.results.len(), 5);
    assert_eq!(report.results[2].file_name, "file3.txt");
    assert!(report.results[2].file_id.is_none());

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen, (1..=5).map(|i| (i, 5)).collect::<Vec<_>>());
}

#[tokio::test]
async fn deleting_a_file_without_chunks_makes_no_store_calls() {
    let h = Harness::new().await;
    let path = h.write("empty.txt", "");

    let outcome = h.coordinator.add(&path, false, None).await.unwrap();
    assert!(matches!(outcome, AddOutcome::Indexed { chunks: 0, .. }));

    let before_vectors = h.vector_calls.total();
    let before_documents = h.document_calls.total();

    let deleted = h
        .coordinator
        .delete(&FileRef::Name("empty.txt".into()), None)
        .await
        .unwrap();
    assert!(matches!(deleted, DeleteOutcome::Deleted { documents: 0, vectors: 0, .. }));

    assert_eq!(h.vector_calls.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(h.document_calls.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(h.vector_calls.total(), before_vectors);
    assert_eq!(h.document_calls.total(), before_documents);
}

#[tokio::test]
async fn folder_ingestion_filters_by_index_file_types() {
    let h = Harness::new().await;
    std::fs::create_dir_all(h.tmp.path().join("docs/sub")).unwrap();
    h.write("docs/a.txt", "alpha");
    h.write("docs/sub/b.txt", "beta");
    h.write("docs/skip.md", "gamma");

    let folder = h.tmp.path().join("docs");
    let batch = BatchIndexer::new(h.coordinator);
    let report = batch.index_folder(&folder, false, None, None).await.unwrap();

    assert!(report.success);
    assert_eq!(report.indexed, 2);
    let names: Vec<&str> = report.results.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);

    let rerun = batch.index_folder(&folder, false, None, None).await.unwrap();
    assert_eq!(rerun.skipped, 2);

    let deleted = batch
        .delete_files(&["a.txt".to_string(), "missing.txt".to_string()], None)
        .await;
    assert_eq!(deleted.deleted, 1);
    assert_eq!(deleted.not_found, 1);
    assert!(deleted.success);
}

#[tokio::test]
async fn extra_tables_append_unseen_page_siblings_in_store_order() {
    let h = Harness::new().await;
    let pad = "and this sentence pads the paragraph so the loader cannot pack two of them into one chunk";
    let page_break = '\u{c}';
    let body = format!(
        "setup begins with the installer {pad}\n\nconfiguration of the daemon {pad}\n\n\
         logging options for the daemon {pad}{page_break}teardown removes everything {pad}"
    );
    let path = h.write("manual.txt", body);
    let file_id = h.coordinator.add(&path, false, None).await.unwrap().file_id().to_string();
    let chunk_ids = h.chunk_ids(&file_id).await;
    assert_eq!(chunk_ids.len(), 4);

    let settings = RetrievalConfig {
        top_k: 1,
        get_extra_table: true,
        ..RetrievalConfig::default()
    };
    let results = h
        .pipeline(settings)
        .run("installer setup", &scope(&[&file_id]))
        .await
        .unwrap();

    let base = &results[0];
    assert!(base.text.starts_with("setup begins"));
    assert_eq!(base.page_label().as_deref(), Some("1"));

    let siblings = h
        .vectors
        .inner
        .query(&VectorQuery {
            text: String::new(),
            top_k: EXTRA_TABLE_TOP_K,
            mode: RetrievalMode::Text,
            scope: Some(chunk_ids),
            filter: Some(MetadataFilter::And(vec![
                MetadataFilter::eq("file_name", "manual.txt"),
                MetadataFilter::is_in("page_label", vec!["1".to_string()]),
            ])),
            mmr_threshold: None,
        })
        .await
        .unwrap();
    let expected: Vec<String> = siblings
        .into_iter()
        .map(|hit| hit.id)
        .filter(|id| *id != base.doc_id)
        .collect();

    assert_eq!(expected.len(), 2);
    assert_eq!(doc_ids(&results[1..]), expected);
    assert!(results[1..].iter().all(|doc| doc.page_label().as_deref() == Some("1")));
    assert!(results[1..].iter().all(|doc| !doc.text.is_empty()));

    let unique: HashSet<&str> = results.iter().map(|doc| doc.doc_id.as_str()).collect();
    assert_eq!(unique.len(), results.len());
}

#[tokio::test]
async fn rerankers_run_in_order_before_truncation() {
    let h = Harness::new().await;
    let ids = index_topics(&h).await;
    let all: Vec<&str> = ids.iter().map(String::as_str).collect();

    let recorder = Arc::new(RecordingReranker::default());
    let plain = h
        .pipeline(vector_settings(10))
        .with_rerankers(vec![recorder.clone() as Arc<dyn Reranker>])
        .run("tokio runtime", &scope(&all))
        .await
        .unwrap();
    let first_round = recorder.seen.lock().unwrap().clone();
    assert_eq!(first_round.len(), 4);
    assert_eq!(doc_ids(&plain), first_round);

    let after_reverse = Arc::new(RecordingReranker::default());
    let chained = h
        .pipeline(vector_settings(2))
        .with_rerankers(vec![
            Arc::new(ReverseReranker) as Arc<dyn Reranker>,
            after_reverse.clone() as Arc<dyn Reranker>,
        ])
        .run("tokio runtime", &scope(&all))
        .await
        .unwrap();

    let reversed: Vec<String> = first_round.iter().rev().cloned().collect();
    assert_eq!(*after_reverse.seen.lock().unwrap(), reversed);
    assert_eq!(doc_ids(&chained), reversed[..2].to_vec());
}

#[tokio::test]
async fn relevance_scores_annotate_without_filtering() {
    let h = Harness::new().await;
    let ids = index_topics(&h).await;
    let all: Vec<&str> = ids.iter().map(String::as_str).collect();

    let base = h
        .pipeline(vector_settings(3))
        .run("tokio runtime", &scope(&all))
        .await
        .unwrap();
    assert_eq!(base.len(), 3);
    assert!(base.iter().all(|doc| doc.relevance.is_none()));

    let graded = h
        .pipeline(vector_settings(3))
        .with_scorer(Some(Arc::new(StubScorer(Grading::Descending))))
        .run("tokio runtime", &scope(&all))
        .await
        .unwrap();
    assert_eq!(doc_ids(&graded), doc_ids(&base));
    let relevance: Vec<Option<f32>> = graded.iter().map(|doc| doc.relevance).collect();
    assert_eq!(relevance, vec![Some(0.9), Some(0.6), Some(0.3)]);

    for grading in [Grading::OneShort, Grading::Offline] {
        let ungraded = h
            .pipeline(vector_settings(3))
            .with_scorer(Some(Arc::new(StubScorer(grading))))
            .run("tokio runtime", &scope(&all))
            .await
            .unwrap();
        assert_eq!(ungraded, base);
    }
}

#[tokio::test]
async fn mmr_skips_duplicate_chunks() {
    let h = Harness::new().await;
    let ids = index_topics(&h).await;
    let all: Vec<&str> = ids.iter().map(String::as_str).collect();

    let plain = h
        .pipeline(vector_settings(2))
        .run("tokio runtime", &scope(&all))
        .await
        .unwrap();
    assert_eq!(plain.len(), 2);
    assert_eq!(plain[0].text, plain[1].text);

    let diverse = h
        .pipeline(RetrievalConfig {
            mmr: true,
            ..vector_settings(2)
        })
        .run("tokio runtime", &scope(&all))
        .await
        .unwrap();
    assert_eq!(diverse.len(), 2);
    assert_eq!(diverse[0].text, "tokio runtime scheduling");
    assert_ne!(diverse[0].text, diverse[1].text);
    assert_ne!(diverse[0].doc_id, diverse[1].doc_id);
}

#[tokio::test]
async fn concurrent_adds_of_one_file_index_it_once() {
    let h = Harness::new().await;
    let path = h.write("shared.txt", "one file\n\nadded from many tasks at once");
    let index_id = h.coordinator.index().id;
    let coordinator = Arc::new(h.coordinator);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = coordinator.clone();
            let path = path.clone();
            tokio::spawn(async move { coordinator.add(&path, false, None).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap().unwrap());
    }

    let indexed: Vec<&AddOutcome> = outcomes
        .iter()
        .filter(|o| matches!(o, AddOutcome::Indexed { .. }))
        .collect();
    assert_eq!(indexed.len(), 1);
    assert_eq!(
        outcomes.iter().filter(|o| matches!(o, AddOutcome::Skipped { .. })).count(),
        7
    );
    let winner = indexed[0].file_id();
    assert!(outcomes.iter().all(|o| o.file_id() == winner));

    let sources = h.catalog.list_sources(index_id, None).await.unwrap();
    assert_eq!(sources.len(), 1);
    let AddOutcome::Indexed { chunks, .. } = indexed[0] else {
        unreachable!()
    };
    assert_eq!(h.vectors.inner.len().await, *chunks);
    assert_eq!(h.documents.inner.len().await, *chunks);
}
