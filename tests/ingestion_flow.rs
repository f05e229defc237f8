use docportal::{
    chunking::ChunkingOptions,
    config::Config,
    embedding::HashingEmbeddingClient,
    index::{FlatIndex, IndexMetadata, VectorIndex, metadata::METADATA_FILE_NAME},
    ingest::{IngestFailure, IngestOptions, IngestStage, IngestionService, QueryError, QueryOptions},
    storage::UploadedFile,
};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _root: TempDir,
    config: Arc<Config>,
    service: IngestionService,
}

fn harness() -> Harness {
    let root = TempDir::new().expect("tempdir");
    let mut config = Config::from_lookup(|_| None).expect("config");
    config.upload_base_dir = root.path().join("data");
    config.index_base_dir = root.path().join("vector_index");
    let config = Arc::new(config);
    let service = IngestionService::with_embedder(
        Arc::clone(&config),
        Arc::new(HashingEmbeddingClient::new(768)),
    );
    Harness {
        _root: root,
        config,
        service,
    }
}

fn three_page_report() -> String {
    let mut text = String::new();
    for page in 1..=3 {
        text.push_str(&format!("Page {page}\n\n"));
        let mut line = 0;
        while text.len() < page * 3000 {
            line += 1;
            text.push_str(&format!(
                "Item {page}-{line} recorded a measurement of {} units at station {}. ",
                page * 1000 + line * 7,
                line % 13
            ));
            if line % 5 == 0 {
                text.push_str("\n\n");
            }
        }
    }
    text
}

fn options(session: &str, use_session_dirs: bool) -> IngestOptions {
    IngestOptions {
        session_id: Some(session.to_string()),
        use_session_dirs,
        chunking: ChunkingOptions::default(),
        k: 5,
    }
}

#[tokio::test]
async fn first_run_indexes_every_chunk_and_rerun_adds_nothing() {
    let h = harness();
    let report = three_page_report();
    let chars = report.chars().count();
    assert!(chars >= 9000);

    let first = h
        .service
        .build_retriever(
            vec![UploadedFile::new("report.txt", report.clone())],
            options("session_report", true),
        )
        .await
        .expect("first ingestion");

    let summary = &first.summary;
    assert!(summary.chunks >= chars.div_ceil(1000));
    assert_eq!(summary.indexed(), summary.chunks);
    assert_eq!(summary.added, 0);
    assert_eq!(first.retriever.len(), summary.chunks);
    assert_eq!(summary.index_dir, h.config.index_base_dir.join("session_report"));
    assert!(FlatIndex::exists(&summary.index_dir));

    let second = h
        .service
        .build_retriever(
            vec![UploadedFile::new("report-copy.txt", report)],
            options("session_report", true),
        )
        .await
        .expect("second ingestion");
    assert_eq!(second.summary.seeded, 0);
    assert_eq!(second.summary.added, 0);
    assert_eq!(second.retriever.len(), summary.chunks);

    let ledger = IndexMetadata::load(&summary.index_dir.join(METADATA_FILE_NAME));
    assert_eq!(ledger.len(), summary.chunks);

    let metrics = h.service.metrics();
    assert_eq!(metrics.ingestions, 2);
    assert_eq!(metrics.vectors_added, summary.chunks as u64);
    assert_eq!(metrics.duplicates_skipped, summary.chunks as u64);
}

#[tokio::test]
async fn shared_directory_serves_every_session() {
    let h = harness();
    let kangaroo = "The kangaroo is a marsupial from australia. Every kangaroo carries a joey in a pouch.";
    let volcano = "A volcano erupts when magma rises. Volcano ash and lava reshape the landscape.";

    let first = h
        .service
        .build_retriever(
            vec![UploadedFile::new("animals.txt", kangaroo)],
            options("session_one", false),
        )
        .await
        .expect("first session");
    let second = h
        .service
        .build_retriever(
            vec![UploadedFile::new("geology.txt", volcano)],
            options("session_two", false),
        )
        .await
        .expect("second session");

    assert_eq!(first.summary.index_dir, h.config.index_base_dir);
    assert_eq!(second.summary.index_dir, h.config.index_base_dir);
    assert_eq!(second.retriever.len(), 2);

    let shared = QueryOptions {
        session_id: None,
        use_session_dirs: false,
        k: 2,
    };
    let answer = h
        .service
        .query("kangaroo marsupial australia", &shared)
        .await
        .expect("query");
    assert_eq!(answer.hits.len(), 2);
    assert_eq!(answer.hits[0].text, kangaroo);

    let answer = h
        .service
        .query("volcano magma lava", &shared)
        .await
        .expect("query");
    assert_eq!(answer.hits[0].text, volcano);
    assert_eq!(answer.hits[0].metadata["original_name"], "geology.txt");
    assert!(answer.hits[0].score > answer.hits[1].score);
}

#[tokio::test]
async fn sessions_are_isolated_when_sessioned() {
    let h = harness();
    h.service
        .build_retriever(
            vec![UploadedFile::new("a.txt", "alpha document body")],
            options("session_a", true),
        )
        .await
        .expect("session a");
    let b = h
        .service
        .build_retriever(
            vec![UploadedFile::new("b.txt", "beta document body")],
            options("session_b", true),
        )
        .await
        .expect("session b");
    assert_eq!(b.retriever.len(), 1);

    let hits = b.retriever.search("alpha").await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "beta document body");
}

#[tokio::test]
async fn unsupported_uploads_fail_with_no_valid_files() {
    let h = harness();
    let error = h
        .service
        .build_retriever(
            vec![
                UploadedFile::new("setup.exe", vec![0x4d_u8, 0x5a]),
                UploadedFile::new("table.csv", "a,b\n1,2\n"),
            ],
            options("session_exe", true),
        )
        .await
        .err()
        .expect("ingestion should fail");
    assert_eq!(error.stage, IngestStage::SaveFiles);
    assert!(matches!(error.source, IngestFailure::NoValidFiles));
    assert!(!FlatIndex::exists(&h.config.index_base_dir.join("session_exe")));
}

#[tokio::test]
async fn corrupt_pdf_fails_during_extraction() {
    let h = harness();
    let error = h
        .service
        .build_retriever(
            vec![
                UploadedFile::new("good.txt", "fine text"),
                UploadedFile::new("broken.pdf", "definitely not a pdf"),
            ],
            options("session_pdf", true),
        )
        .await
        .err()
        .expect("ingestion should fail");
    assert_eq!(error.stage, IngestStage::ExtractText);
    assert!(
        matches!(error.source, IngestFailure::Extraction { ref file, .. } if file == "broken.pdf")
    );

    let metrics = h.service.metrics();
    assert_eq!(metrics.failures, 1);
    assert_eq!(metrics.ingestions, 0);
}

#[tokio::test]
async fn blank_text_files_leave_nothing_to_index() {
    let h = harness();
    let error = h
        .service
        .build_retriever(
            vec![UploadedFile::new("blank.txt", "  \n\n\t")],
            options("session_blank", true),
        )
        .await
        .err()
        .expect("ingestion should fail");
    assert_eq!(error.stage, IngestStage::ExtractText);
    assert!(matches!(error.source, IngestFailure::NoValidFiles));
}

#[tokio::test]
async fn invalid_chunking_is_reported_at_chunk_stage() {
    let h = harness();
    let mut opts = options("session_chunk", true);
    opts.chunking = ChunkingOptions {
        chunk_size: 100,
        chunk_overlap: 100,
    };
    let error = h
        .service
        .build_retriever(vec![UploadedFile::new("a.txt", "some text")], opts)
        .await
        .err()
        .expect("ingestion should fail");
    assert_eq!(error.stage, IngestStage::Chunk);
    assert!(matches!(error.source, IngestFailure::Chunking(_)));
}

#[tokio::test]
async fn hostile_session_ids_are_rejected() {
    let h = harness();
    let error = h
        .service
        .build_retriever(
            vec![UploadedFile::new("a.txt", "text")],
            options("../escape", true),
        )
        .await
        .err()
        .expect("ingestion should fail");
    assert_eq!(error.stage, IngestStage::SaveFiles);
    assert!(matches!(error.source, IngestFailure::Session(_)));
}

#[tokio::test]
async fn queries_need_a_session_and_an_existing_index() {
    let h = harness();
    let sessioned = QueryOptions {
        session_id: None,
        use_session_dirs: true,
        k: 3,
    };
    assert!(matches!(
        h.service.query("anything", &sessioned).await,
        Err(QueryError::MissingSession)
    ));

    let unknown = QueryOptions {
        session_id: Some("session_missing".into()),
        ..sessioned.clone()
    };
    assert!(matches!(
        h.service.query("anything", &unknown).await,
        Err(QueryError::IndexNotFound(_))
    ));

    assert!(matches!(
        h.service.query("   ", &unknown).await,
        Err(QueryError::EmptyQuestion)
    ));
}

#[tokio::test]
async fn generated_sessions_get_their_own_directories() {
    let h = harness();
    let mut opts = options("unused", true);
    opts.session_id = None;
    let outcome = h
        .service
        .build_retriever(vec![UploadedFile::new("notes.txt", "generated session")], opts)
        .await
        .expect("ingestion");
    let session = &outcome.summary.session_id;
    assert!(session.starts_with("session_"));
    assert_eq!(
        outcome.summary.upload_dir,
        h.config.upload_base_dir.join(session)
    );

    let stored: Vec<_> = std::fs::read_dir(&outcome.summary.upload_dir)
        .expect("upload dir")
        .filter_map(Result::ok)
        .collect();
    assert_eq!(stored.len(), 1);
    let name = stored[0].file_name().to_string_lossy().into_owned();
    assert!(name.ends_with(".txt"));
    assert_ne!(name, "notes.txt");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingests_into_one_directory_add_each_chunk_once() {
    let h = harness();
    let service = Arc::new(h.service);
    let report = three_page_report();

    let tasks: Vec<_> = (0..6)
        .map(|copy| {
            let service = Arc::clone(&service);
            let report = report.clone();
            tokio::spawn(async move {
                service
                    .build_retriever(
                        vec![UploadedFile::new(format!("copy-{copy}.txt"), report)],
                        options(&format!("session_copy_{copy}"), false),
                    )
                    .await
                    .expect("ingestion")
                    .summary
            })
        })
        .collect();

    let mut summaries = Vec::new();
    for task in tasks {
        summaries.push(task.await.expect("ingest task"));
    }

    let chunks = summaries[0].chunks;
    assert!(summaries.iter().all(|summary| summary.chunks == chunks));
    let seeded: usize = summaries.iter().map(|summary| summary.seeded).sum();
    let indexed: usize = summaries.iter().map(|summary| summary.indexed()).sum();

    let index = FlatIndex::load_local(&h.config.index_base_dir).expect("shared index");
    assert_eq!(index.len(), chunks);
    assert_eq!(indexed, index.len());
    assert_eq!(seeded, chunks);

    let ledger = IndexMetadata::load(&h.config.index_base_dir.join(METADATA_FILE_NAME));
    assert_eq!(ledger.len(), chunks);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queries_during_shared_ingestion_always_see_a_whole_index() {
    let h = harness();
    let service = Arc::new(h.service);
    service
        .build_retriever(
            vec![UploadedFile::new("seed.txt", "Seed notes about river shipments.")],
            options("session_seed", false),
        )
        .await
        .expect("seed ingestion");

    let writer = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            for round in 0..40 {
                let text = format!("Report {round} tracks shipment {round} bound for harbour {round}.");
                service
                    .build_retriever(
                        vec![UploadedFile::new(format!("report-{round}.txt"), text)],
                        options(&format!("session_round_{round}"), false),
                    )
                    .await
                    .expect("ingestion");
            }
        })
    };

    let shared = QueryOptions {
        session_id: None,
        use_session_dirs: false,
        k: 3,
    };
    let mut served = 0;
    loop {
        let answer = service
            .query("shipment harbour", &shared)
            .await
            .expect("query while ingesting");
        assert!(!answer.hits.is_empty());
        served += 1;
        if writer.is_finished() {
            break;
        }
    }
    writer.await.expect("writer task");

    assert!(served >= 1);
    let index = FlatIndex::load_local(&h.config.index_base_dir).expect("shared index");
    assert_eq!(index.len(), 41);
}
