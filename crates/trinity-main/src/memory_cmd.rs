use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use trinity_agents::{ConversationTurn, DigestOptions, InsightDigest, LessonRecorder};
use trinity_memory::{AgentSource, EntryFilter, MemoryEntry, MemoryStore, NewEntry, PruneBound};

use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub source: Option<AgentSource>,
    pub category: Option<String>,
    pub since: Option<Duration>,
    pub limit: Option<usize>,
    pub json: bool,
}

fn open_store(settings: &Settings) -> Result<MemoryStore, String> {
    MemoryStore::open(settings.memory.clone()).map_err(|error| error.to_string())
}

pub fn run_note(
    settings: &Settings,
    source: AgentSource,
    category: &str,
    text: &str,
) -> Result<(), String> {
    let store = open_store(settings)?;
    let stored = store
        .append(NewEntry::new(source, category, text))
        .map_err(|error| error.to_string())?;
    println!("stored #{} {}/{}", stored.seq, stored.source, stored.category);
    Ok(())
}

pub fn run_lesson(
    settings: &Settings,
    user_text: String,
    assistant_text: Option<String>,
) -> Result<(), String> {
    let store = Arc::new(open_store(settings)?);
    let recorder = LessonRecorder::new(store);
    let turn = ConversationTurn {
        user_text,
        assistant_text,
    };
    match recorder.record_turn(&turn) {
        Some(stored) => println!("lesson #{}: {}", stored.seq, stored.text),
        None => println!("no lesson recorded"),
    }
    Ok(())
}

pub fn run_list(settings: &Settings, options: &ListOptions) -> Result<(), String> {
    let store = open_store(settings)?;
    let mut filter = EntryFilter::all();
    if let Some(source) = options.source {
        filter = filter.source(source);
    }
    if let Some(category) = &options.category {
        filter = filter.category(category.clone());
    }
    if let Some(since) = options.since {
        // A window reaching past the earliest representable time keeps everything.
        if let Some(since) = chrono::Duration::from_std(since)
            .ok()
            .and_then(|since| Utc::now().checked_sub_signed(since))
        {
            filter = filter.since(since);
        }
    }

    let view = store.read_all(filter);
    let mut shown: VecDeque<MemoryEntry> = VecDeque::new();
    let mut corrupt = 0;
    for item in view.iter().map_err(|error| error.to_string())? {
        match item {
            Ok(entry) => {
                if options.limit == Some(shown.len()) {
                    shown.pop_front();
                }
                if options.limit != Some(0) {
                    shown.push_back(entry);
                }
            }
            Err(error) => {
                corrupt += 1;
                eprintln!("warning: {error}");
            }
        }
    }

    for entry in &shown {
        if options.json {
            let line = serde_json::to_string(entry)
                .map_err(|error| format!("encode entry #{} failed: {error}", entry.seq))?;
            println!("{line}");
        } else {
            println!("{}", format_entry(entry));
        }
    }
    if corrupt > 0 {
        tracing::warn!(corrupt, path = %settings.memory.path.display(), "store has corrupt lines");
    }
    Ok(())
}

fn format_entry(entry: &MemoryEntry) -> String {
    format!(
        "#{} {} {}/{}: {}",
        entry.seq,
        entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        entry.source,
        entry.category,
        entry.text
    )
}

pub fn run_prune(
    settings: &Settings,
    max_entries: Option<usize>,
    max_age: Option<Duration>,
) -> Result<(), String> {
    let store = open_store(settings)?;
    let mut bounds = Vec::new();
    if let Some(age) = max_age {
        bounds.push(PruneBound::MaxAge(age));
    }
    if let Some(count) = max_entries {
        bounds.push(PruneBound::MaxEntries(count));
    }

    let removed = if bounds.is_empty() {
        if settings.memory.retention.is_unbounded() {
            println!("retention policy is unbounded, nothing to prune");
            return Ok(());
        }
        store.apply_retention().map_err(|error| error.to_string())?
    } else {
        let now = Utc::now();
        let mut removed = 0;
        for bound in bounds {
            removed += store
                .prune_at(bound, now)
                .map_err(|error| error.to_string())?;
        }
        removed
    };
    println!("pruned {removed} entries");
    Ok(())
}

pub fn run_context(
    settings: &Settings,
    window: Option<Duration>,
    max_lessons: Option<usize>,
) -> Result<(), String> {
    let store = open_store(settings)?;
    let mut options = DigestOptions::default();
    if let Some(window) = window {
        options.window = window;
    }
    if let Some(max_lessons) = max_lessons {
        options.max_lessons = max_lessons;
    }
    let digest = InsightDigest::gather(&store, &options).map_err(|error| error.to_string())?;
    tracing::debug!(tone = digest.tone.as_str(), lessons = digest.lessons.len(), "gathered digest");
    let section = digest.prompt_section();
    if !section.is_empty() {
        println!("{section}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn format_entry_is_single_line() {
        let entry = MemoryEntry {
            seq: 7,
            timestamp: Utc.with_ymd_and_hms(2026, 5, 1, 12, 30, 0).unwrap(),
            source: AgentSource::Observer,
            category: "load".to_string(),
            text: "system under load | cpu 92.0%".to_string(),
        };
        assert_eq!(
            format_entry(&entry),
            "#7 2026-05-01T12:30:00Z observer/load: system under load | cpu 92.0%"
        );
    }
}
