use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tempfile::tempdir;
use trinity_memory::prelude::*;
use trinity_memory::{JsonlBackend, MemoryBackend};

fn unbounded_config(path: &Path) -> MemoryConfig {
    let mut config = MemoryConfig::new(path);
    config.retention = RetentionPolicy::default();
    config.auto_prune = false;
    config
}

fn texts(entries: &[MemoryEntry]) -> Vec<&str> {
    entries.iter().map(|entry| entry.text.as_str()).collect()
}

#[test]
fn append_then_read_all_returns_entries_in_write_order() -> Result<(), Box<dyn std::error::Error>>
{
    let dir = tempdir()?;
    let store = MemoryStore::open(unbounded_config(&dir.path().join("memory.jsonl")))?;

    let insight = store.append(NewEntry::observer("load", "cpu 92%"))?;
    let lesson = store.append(NewEntry::conversational(
        "lesson",
        "user prefers concise answers",
    ))?;
    assert!(lesson.seq > insight.seq);

    let entries = store.entries(EntryFilter::all())?;
    assert_eq!(entries, vec![insight.clone(), lesson.clone()]);
    assert_eq!(entries[0].source, AgentSource::Observer);
    assert_eq!(entries[1].category, "lesson");
    Ok(())
}

#[test]
fn read_all_filters_by_source_category_and_window() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let store = MemoryStore::open(unbounded_config(&dir.path().join("memory.jsonl")))?;
    let base = Utc::now() - chrono::Duration::hours(3);

    store.append(NewEntry::observer("load", "cpu 95%").at(base))?;
    store.append(NewEntry::observer("disk", "disk 93%").at(base + chrono::Duration::hours(1)))?;
    store.append(
        NewEntry::conversational("lesson", "answer in French")
            .at(base + chrono::Duration::hours(2)),
    )?;

    let observer = store.entries(EntryFilter::all().source(AgentSource::Observer))?;
    assert_eq!(texts(&observer), vec!["cpu 95%", "disk 93%"]);

    let disk = store.entries(EntryFilter::all().category("disk"))?;
    assert_eq!(texts(&disk), vec!["disk 93%"]);

    let window = store.entries(
        EntryFilter::all()
            .since(base + chrono::Duration::minutes(30))
            .until(base + chrono::Duration::minutes(150)),
    )?;
    assert_eq!(texts(&window), vec!["disk 93%", "answer in French"]);
    Ok(())
}

#[test]
fn oversized_text_is_rejected_without_touching_the_file() -> Result<(), Box<dyn std::error::Error>>
{
    let dir = tempdir()?;
    let path = dir.path().join("memory.jsonl");
    let mut config = unbounded_config(&path);
    config.max_text_chars = 10;
    let store = MemoryStore::open(config)?;
    store.append(NewEntry::observer("load", "cpu 40%"))?;
    let before = fs::read(&path)?;

    let error = store
        .append(NewEntry::observer("load", "x".repeat(11)))
        .expect_err("text over the limit must fail");
    assert!(error.is_validation());
    assert!(matches!(
        error,
        MemoryStoreError::Validation(ValidationError::TextTooLong { len: 11, max: 10 })
    ));

    assert_eq!(fs::read(&path)?, before);
    assert_eq!(store.entries(EntryFilter::all())?.len(), 1);
    Ok(())
}

#[test]
fn concurrent_writers_never_interleave_records() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("memory.jsonl");
    let per_writer = 40;
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [AgentSource::Observer, AgentSource::Conversational]
        .into_iter()
        .map(|source| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<(), MemoryStoreError> {
                let store = MemoryStore::open(unbounded_config(&path))?;
                barrier.wait();
                for index in 0..per_writer {
                    // Long payloads make a torn write visible if locking were broken.
                    let text = format!("{source}-{index:03}-{}", "#".repeat(512));
                    store.append(NewEntry::new(source, "stress", text))?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread panicked")?;
    }

    let reader = MemoryStore::open(unbounded_config(&path))?;
    let entries = reader.entries(EntryFilter::all())?;
    assert_eq!(entries.len(), per_writer * 2);

    let mut seqs: Vec<u64> = entries.iter().map(|entry| entry.seq).collect();
    let in_file_order = seqs.clone();
    seqs.sort_unstable();
    assert_eq!(seqs, in_file_order, "sequence numbers follow write order");
    seqs.dedup();
    assert_eq!(seqs.len(), per_writer * 2, "sequence numbers are unique");

    for source in [AgentSource::Observer, AgentSource::Conversational] {
        let own: Vec<&MemoryEntry> = entries.iter().filter(|entry| entry.source == source).collect();
        assert_eq!(own.len(), per_writer);
        for (index, entry) in own.iter().enumerate() {
            assert!(entry.text.starts_with(&format!("{source}-{index:03}-")));
            assert_eq!(entry.text.len(), format!("{source}-{index:03}-").len() + 512);
        }
        assert!(own.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }
    Ok(())
}

#[test]
fn prune_max_entries_keeps_most_recent_and_is_idempotent() -> Result<(), Box<dyn std::error::Error>>
{
    let dir = tempdir()?;
    let path = dir.path().join("memory.jsonl");
    let store = MemoryStore::open(unbounded_config(&path))?;
    for index in 0..7 {
        store.append(NewEntry::observer("load", format!("sample {index}")))?;
    }

    assert_eq!(store.prune(PruneBound::MaxEntries(3))?, 4);
    let kept = store.entries(EntryFilter::all())?;
    assert_eq!(texts(&kept), vec!["sample 4", "sample 5", "sample 6"]);

    let after_first = fs::read(&path)?;
    assert_eq!(store.prune(PruneBound::MaxEntries(3))?, 0);
    assert_eq!(fs::read(&path)?, after_first, "second prune must not rewrite");
    Ok(())
}

#[test]
fn prune_max_age_drops_old_entries() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let store = MemoryStore::open(unbounded_config(&dir.path().join("memory.jsonl")))?;
    let now = Utc::now();
    store.append(NewEntry::observer("load", "stale").at(now - chrono::Duration::days(3)))?;
    store.append(NewEntry::conversational("lesson", "fresh").at(now))?;

    let removed = store.prune_at(PruneBound::MaxAge(Duration::from_secs(24 * 3600)), now)?;
    assert_eq!(removed, 1);
    assert_eq!(texts(&store.entries(EntryFilter::all())?), vec!["fresh"]);
    Ok(())
}

#[test]
fn sequence_numbers_keep_growing_after_pruning_everything(
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("memory.jsonl");
    let store = MemoryStore::open(unbounded_config(&path))?;
    store.append(NewEntry::observer("load", "one"))?;
    store.append(NewEntry::observer("load", "two"))?;

    assert_eq!(store.prune(PruneBound::MaxEntries(0))?, 2);
    assert!(store.entries(EntryFilter::all())?.is_empty());
    assert_eq!(JsonlBackend::open(&path)?.header()?.base_seq, 2);

    let reopened = MemoryStore::open(unbounded_config(&path))?;
    let next = reopened.append(NewEntry::observer("load", "three"))?;
    assert_eq!(next.seq, 3);
    Ok(())
}

#[test]
fn completed_append_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("memory.jsonl");
    let appended = {
        let store = MemoryStore::open(unbounded_config(&path))?;
        store.append(NewEntry::observer("load", "cpu 92%"))?
    };

    let reopened = MemoryStore::open(unbounded_config(&path))?;
    assert_eq!(reopened.entries(EntryFilter::all())?, vec![appended]);
    Ok(())
}

#[test]
fn torn_append_is_invisible_and_repaired_by_next_writer() -> Result<(), Box<dyn std::error::Error>>
{
    let dir = tempdir()?;
    let path = dir.path().join("memory.jsonl");
    let first = {
        let store = MemoryStore::open(unbounded_config(&path))?;
        store.append(NewEntry::observer("load", "cpu 92%"))?
    };

    // A writer died halfway through its record.
    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(br#"{"type":"entry","seq":2,"timestamp":"2026-"#)?;
    drop(file);

    let reopened = MemoryStore::open(unbounded_config(&path))?;
    assert_eq!(reopened.entries(EntryFilter::all())?, vec![first.clone()]);

    let second = reopened.append(NewEntry::conversational("lesson", "keep it short"))?;
    assert_eq!(second.seq, 2);
    assert_eq!(reopened.entries(EntryFilter::all())?, vec![first, second]);

    let content = fs::read_to_string(&path)?;
    assert!(content.ends_with('\n'));
    assert_eq!(content.lines().count(), 3, "header plus two entries");
    for line in content.lines() {
        serde_json::from_str::<serde_json::Value>(line)?;
    }
    Ok(())
}

#[test]
fn corrupt_complete_line_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("memory.jsonl");
    let store = MemoryStore::open(unbounded_config(&path))?;
    store.append(NewEntry::observer("load", "cpu 10%"))?;

    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(b"not json\n")?;
    drop(file);

    let results: Vec<_> = store.read_all(EntryFilter::all()).iter()?.collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(MemoryStoreError::Corrupt { line: 3, .. })
    ));
    Ok(())
}

#[test]
fn in_memory_and_file_backends_agree() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file_backend: Arc<dyn MemoryBackend> =
        Arc::new(JsonlBackend::open(dir.path().join("memory.jsonl"))?);
    let config = unbounded_config(&dir.path().join("unused.jsonl"));
    let stores = [
        MemoryStore::with_backend(config.clone(), file_backend)?,
        MemoryStore::in_memory(config)?,
    ];

    for store in &stores {
        for index in 0..4 {
            store.append(NewEntry::observer("load", format!("sample {index}")))?;
        }
        store.prune(PruneBound::MaxEntries(2))?;
    }

    let left = stores[0].entries(EntryFilter::all())?;
    let right = stores[1].entries(EntryFilter::all())?;
    assert_eq!(texts(&left), texts(&right));
    assert_eq!(
        left.iter().map(|entry| entry.seq).collect::<Vec<_>>(),
        right.iter().map(|entry| entry.seq).collect::<Vec<_>>()
    );
    Ok(())
}
