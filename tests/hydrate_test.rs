mod helpers;

use helpers::{count, engine, paper_doc, snapshot, test_cache, FakeRemote, OWNER};
use macp_sync::cache::notes::{get_note, insert_note};
use macp_sync::cache::papers::get_paper;
use macp_sync::cache::types::{Note, PaperStatus};
use macp_sync::db::migrations::get_last_hydrated;
use macp_sync::error::RemoteError;
use serde_json::json;

fn status_of(cache: &macp_sync::cache::CacheStore, arxiv_id: &str) -> PaperStatus {
    cache
        .blocking(|conn| Ok(get_paper(conn, arxiv_id)?.expect("paper cached").status))
        .unwrap()
}

fn note_markdown(id: i64, body: &str) -> String {
    format!("# Research Note #{id}\n\n**Tags:** none\n**Created:** unknown\n\n{body}")
}

fn cached_note(cache: &macp_sync::cache::CacheStore, id: i64) -> Note {
    cache
        .blocking(|conn| Ok(get_note(conn, id)?.expect("note cached")))
        .unwrap()
}

fn seed_library(remote: &FakeRemote) {
    remote.insert_json(
        ".macp/manifest.json",
        &json!({
            "version": "2.0",
            "papers": {"arxiv_2401.00001": {"title": "Attention"}},
            "analyses": {},
            "notes": {}
        }),
    );
    remote.insert_json(".macp/papers/arxiv_2401.00001.json", &paper_doc("arxiv:2401.00001", "Attention"));
    remote.insert_json(
        ".macp/analyses/arxiv_2401.00001/gemini.json",
        &json!({
            "arxiv_id": "arxiv:2401.00001",
            "model": "gemini-2.0-flash",
            "type": "abstract",
            "summary": "Self-attention replaces recurrence.",
            "key_findings": ["parallel training"],
            "analyzed_at": "2026-01-02T00:00:00+00:00"
        }),
    );
    remote.insert(
        ".macp/notes/note_1.md",
        "# Research Note #1\n\n**Tags:** reading\n**Created:** 2026-01-03T00:00:00+00:00\n\nCheck the ablations.",
    );
}

#[tokio::test]
async fn hydrate_ingests_papers_analyses_and_notes() {
    let remote = FakeRemote::new();
    seed_library(&remote);
    let cache = test_cache();

    let stats = engine(&remote, &cache).hydrate().await.unwrap();

    assert_eq!(stats.root, ".macp");
    assert_eq!((stats.papers, stats.analyses, stats.notes), (1, 1, 1));
    assert_eq!(stats.errors, 0);
    assert_eq!(status_of(&cache, "arxiv:2401.00001"), PaperStatus::Analyzed);

    let owner: Option<String> = cache
        .blocking(|conn| Ok(get_paper(conn, "arxiv:2401.00001")?.unwrap().owner))
        .unwrap();
    assert_eq!(owner.as_deref(), Some(OWNER));
}

#[tokio::test]
async fn hydrate_twice_leaves_cache_unchanged() {
    let remote = FakeRemote::new();
    seed_library(&remote);
    let cache = test_cache();
    let engine = engine(&remote, &cache);

    engine.hydrate().await.unwrap();
    let before = snapshot(&cache);

    let second = engine.hydrate().await.unwrap();
    assert_eq!(snapshot(&cache), before);
    assert_eq!((second.analyses, second.notes), (0, 0));
    assert_eq!(second.skipped, 2); // the analysis and the note
    assert_eq!(count(&cache, "analyses"), 1);
    assert_eq!(count(&cache, "notes"), 1);
}

#[tokio::test]
async fn union_of_manifest_and_listing_tolerates_lost_write() {
    let remote = FakeRemote::new();
    remote.insert_json(
        ".macp/manifest.json",
        &json!({"version": "2.0", "papers": {"2401_99999": {"title": "Lost"}}}),
    );
    // Written but never indexed.
    remote.insert_json(".macp/papers/2401_88888.json", &paper_doc("2401.88888", "Unindexed"));
    let cache = test_cache();

    let stats = engine(&remote, &cache).hydrate().await.unwrap();

    assert_eq!(stats.papers, 1);
    assert_eq!(stats.errors, 1);
    assert_eq!(status_of(&cache, "arxiv:2401.88888"), PaperStatus::Saved);
}

#[tokio::test]
async fn falls_back_to_legacy_root_when_current_has_no_manifest() {
    let remote = FakeRemote::new();
    remote.insert_json(".macp-research/manifest.json", &json!({"version": "1.0", "papers": {}}));
    remote.insert_json(".macp-research/papers/2401.00002.json", &paper_doc("2401.00002", "Legacy"));
    let cache = test_cache();

    let stats = engine(&remote, &cache).hydrate().await.unwrap();

    assert_eq!(stats.root, ".macp-research");
    assert_eq!(stats.papers, 1);
    assert_eq!(count(&cache, "papers"), 1);
}

#[tokio::test]
async fn without_any_manifest_current_root_listing_is_used() {
    let remote = FakeRemote::new();
    remote.insert_json(".macp/papers/2401.00003.json", &paper_doc("2401.00003", "No index"));
    let cache = test_cache();

    let stats = engine(&remote, &cache).hydrate().await.unwrap();
    assert_eq!(stats.root, ".macp");
    assert_eq!(stats.papers, 1);
}

#[tokio::test]
async fn legacy_and_per_agent_analyses_of_same_provider_collapse() {
    let remote = FakeRemote::new();
    seed_library(&remote);
    remote.insert_json(
        ".macp/analyses/arxiv_2401.00001.json",
        &json!({
            "paper": paper_doc("arxiv:2401.00001", "Attention"),
            "analysis": {"provider": "gemini", "summary": "Older copy of the same analysis."},
            "saved_at": "2025-12-01T00:00:00+00:00"
        }),
    );
    remote.insert_json(
        ".macp/analyses/arxiv_2401.00001/consensus.json",
        &json!({"arxiv_id": "arxiv:2401.00001", "agents_compared": ["gemini", "claude"]}),
    );
    let cache = test_cache();

    let stats = engine(&remote, &cache).hydrate().await.unwrap();

    assert_eq!(stats.analyses, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.errors, 0); // consensus.json is not an analysis
    assert_eq!(count(&cache, "analyses"), 1);
}

#[tokio::test]
async fn legacy_analysis_brings_its_paper_along() {
    let remote = FakeRemote::new();
    remote.insert_json(
        ".macp/analyses/2401.00004.json",
        &json!({
            "paper": paper_doc("2401.00004", "Embedded"),
            "analysis": {"provider": "groq", "summary": "s", "key_insights": ["a", "b"]},
            "saved_at": "2025-12-01T00:00:00+00:00"
        }),
    );
    let cache = test_cache();

    let stats = engine(&remote, &cache).hydrate().await.unwrap();

    assert_eq!(stats.analyses, 1);
    assert_eq!(status_of(&cache, "arxiv:2401.00004"), PaperStatus::Analyzed);
}

#[tokio::test]
async fn status_is_never_regressed() {
    let remote = FakeRemote::new();
    let mut cited = paper_doc("2401.00005", "Cited");
    cited["status"] = json!("cited");
    remote.insert_json(".macp/papers/2401.00005.json", &cited);
    remote.insert_json(
        ".macp/analyses/2401.00005/claude.json",
        &json!({"arxiv_id": "2401.00005", "summary": "s"}),
    );
    let cache = test_cache();

    engine(&remote, &cache).hydrate().await.unwrap();
    assert_eq!(status_of(&cache, "arxiv:2401.00005"), PaperStatus::Cited);
}

#[tokio::test]
async fn discovered_paper_is_promoted_to_saved() {
    let remote = FakeRemote::new();
    let mut doc = paper_doc("2401.00006", "Fresh");
    doc["status"] = json!("discovered");
    remote.insert_json(".macp/papers/2401.00006.json", &doc);
    let cache = test_cache();

    engine(&remote, &cache).hydrate().await.unwrap();
    assert_eq!(status_of(&cache, "arxiv:2401.00006"), PaperStatus::Saved);
}

#[tokio::test]
async fn identical_note_bodies_collapse() {
    let remote = FakeRemote::new();
    let body = "# Research Note #{id}\n\n**Tags:** none\n**Created:** unknown\n\nSame text.";
    remote.insert(".macp/notes/note_1.md", &body.replace("{id}", "1"));
    remote.insert(".macp/notes/note_2.md", &body.replace("{id}", "2"));
    remote.insert(".macp/notes/README.txt", "not a note");
    let cache = test_cache();

    let stats = engine(&remote, &cache).hydrate().await.unwrap();

    assert_eq!(stats.notes, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(count(&cache, "notes"), 1);
}

#[tokio::test]
async fn bad_documents_are_counted_not_fatal() {
    let remote = FakeRemote::new();
    remote.insert(".macp/papers/broken.json", "{ not json");
    remote.insert_json(".macp/papers/2401.00007.json", &paper_doc("2401.00007", "Fine"));
    remote.insert(".macp/notes/note_9.md", "just some text");
    remote.fail_gets(
        ".macp/analyses/2401.00007/gemini.json",
        RemoteError::Transient("HTTP 502".into()),
    );
    remote.insert_json(".macp/analyses/2401.00007/gemini.json", &json!({}));
    let cache = test_cache();

    let stats = engine(&remote, &cache).hydrate().await.unwrap();

    assert_eq!(stats.papers, 1);
    assert_eq!(stats.errors, 3);
}

#[tokio::test]
async fn failed_top_level_listing_aborts() {
    let remote = FakeRemote::new();
    remote.insert_json(".macp/papers/2401.00008.json", &paper_doc("2401.00008", "T"));
    remote.fail_lists(".macp/papers", RemoteError::Unauthorized("bad token".into()));
    let cache = test_cache();

    let err = engine(&remote, &cache).hydrate().await.unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized(_)));
    assert_eq!(count(&cache, "papers"), 0);
}

#[tokio::test]
async fn failed_manifest_read_aborts() {
    let remote = FakeRemote::new();
    remote.fail_gets(".macp/manifest.json", RemoteError::Transient("timeout".into()));
    let cache = test_cache();

    assert!(engine(&remote, &cache).hydrate().await.is_err());
}

#[tokio::test]
async fn completed_run_is_recorded() {
    let remote = FakeRemote::new();
    seed_library(&remote);
    let cache = test_cache();

    engine(&remote, &cache).hydrate().await.unwrap();

    let (last, logged): (Option<String>, i64) = cache
        .blocking(|conn| {
            let logged = conn.query_row(
                "SELECT COUNT(*) FROM sync_log WHERE operation = 'hydrate' AND entity_key = '.macp'",
                [],
                |row| row.get(0),
            )?;
            Ok((get_last_hydrated(conn)?, logged))
        })
        .unwrap();
    assert!(last.is_some());
    assert_eq!(logged, 1);
}

#[tokio::test]
async fn hydrated_notes_keep_their_remote_ids() {
    let remote = FakeRemote::new();
    for (id, body) in [(1, "one"), (2, "two"), (10, "ten")] {
        remote.insert(&format!(".macp/notes/note_{id}.md"), &note_markdown(id, body));
    }
    let cache = test_cache();
    let engine = engine(&remote, &cache);

    let stats = engine.hydrate().await.unwrap();
    assert_eq!(stats.notes, 3);
    assert_eq!(cached_note(&cache, 2).content, "two");
    assert_eq!(cached_note(&cache, 10).content, "ten");

    // Saving a hydrated note writes back to the file it came from.
    let outcome = engine.save_note(&cached_note(&cache, 2)).await;
    assert!(outcome.is_written(), "{outcome:?}");
    assert_eq!(remote.content(".macp/notes/note_2.md").unwrap(), note_markdown(2, "two"));
    assert_eq!(remote.content(".macp/notes/note_10.md").unwrap(), note_markdown(10, "ten"));

    // New local notes are numbered after the hydrated ones.
    let next = cache
        .blocking(|conn| {
            insert_note(
                conn,
                &Note {
                    id: None,
                    owner: OWNER.into(),
                    arxiv_id: None,
                    content: "fresh".into(),
                    tags: Vec::new(),
                    created_at: "2026-02-01T00:00:00+00:00".into(),
                    updated_at: "2026-02-01T00:00:00+00:00".into(),
                },
            )
        })
        .unwrap();
    assert_eq!(next, 11);
}

#[tokio::test]
async fn remote_note_body_wins_over_cached_copy() {
    let remote = FakeRemote::new();
    remote.insert(".macp/notes/note_4.md", &note_markdown(4, "first draft"));
    let cache = test_cache();
    let engine = engine(&remote, &cache);
    engine.hydrate().await.unwrap();

    remote.insert(".macp/notes/note_4.md", &note_markdown(4, "edited on GitHub"));
    let stats = engine.hydrate().await.unwrap();

    assert_eq!(stats.notes, 1);
    assert_eq!(count(&cache, "notes"), 1);
    assert_eq!(cached_note(&cache, 4).content, "edited on GitHub");
}

#[tokio::test]
async fn untitled_remote_paper_is_not_cached() {
    let remote = FakeRemote::new();
    remote.insert_json(".macp/papers/2401.00009.json", &json!({"id": "2401.00009", "title": ""}));
    let cache = test_cache();

    let stats = engine(&remote, &cache).hydrate().await.unwrap();

    assert_eq!((stats.papers, stats.errors), (0, 1));
    assert_eq!(count(&cache, "papers"), 0);
}
