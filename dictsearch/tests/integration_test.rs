use anyhow::Result;
use dictsearch::{
    CancellationToken, DictionaryDir, EntrySource, MatchRecord, SearchConfig, SearchCoordinator,
    SearchError, SearchResult, SearchStatus, SkipReason, SourceLoader, SourceSelection,
};
use std::fs;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn coordinator(threads: usize) -> Result<SearchCoordinator> {
    Ok(SearchCoordinator::new(SearchConfig {
        thread_count: NonZeroUsize::new(threads).unwrap(),
        ..SearchConfig::default()
    })?)
}

fn sample_sources() -> Vec<EntrySource> {
    vec![
        EntrySource::new("en", vec!["apple fruit", "ant insect"]),
        EntrySource::new("ru", vec!["яблоко фрукт"]),
    ]
}

fn numbered_source(id: &str, lines: usize, word: &str) -> EntrySource {
    EntrySource::new(
        id,
        (0..lines).map(|i| format!("{} {}-{}", word, id, i)),
    )
}

/// Serves "big" at once; "late" only after the token is cancelled
struct GateLoader {
    token: CancellationToken,
    big: EntrySource,
}

impl SourceLoader for GateLoader {
    fn list(&self) -> SearchResult<Vec<String>> {
        Ok(vec!["big".to_string(), "late".to_string()])
    }

    fn load(&self, id: &str) -> SearchResult<EntrySource> {
        match id {
            "big" => Ok(self.big.clone()),
            _ => {
                let _ = self.token.listener().recv();
                Ok(numbered_source(id, 10_000, "ant"))
            }
        }
    }
}

struct SlowLoader(Duration);

impl SourceLoader for SlowLoader {
    fn list(&self) -> SearchResult<Vec<String>> {
        Ok(vec!["slow".to_string()])
    }

    fn load(&self, id: &str) -> SearchResult<EntrySource> {
        thread::sleep(self.0);
        Ok(EntrySource::new(id, vec!["ant insect"]))
    }
}

#[test]
fn test_apple_query() -> Result<()> {
    let out = coordinator(4)?.run("apple", &sample_sources());
    assert_eq!(out.status, SearchStatus::Completed);
    assert_eq!(out.records, vec![MatchRecord::new("en", "apple fruit")]);
    Ok(())
}

#[test]
fn test_whitespace_padded_mixed_case_query() -> Result<()> {
    let out = coordinator(4)?.run("  Ant  ", &sample_sources());
    assert_eq!(out.records, vec![MatchRecord::new("en", "ant insect")]);
    Ok(())
}

#[test]
fn test_zero_sources_launch_nothing() -> Result<()> {
    let out = coordinator(4)?.run("apple", &[]);
    assert_eq!(
        out.status,
        SearchStatus::Skipped(SkipReason::NoSourcesSelected)
    );
    assert!(out.is_empty());
    assert_eq!(out.stats.scanners_launched, 0);

    let out = coordinator(4)?.run_selection("apple", &SourceSelection::new(), Arc::new(SlowLoader(Duration::ZERO)));
    assert_eq!(
        out.status,
        SearchStatus::Skipped(SkipReason::NoSourcesSelected)
    );
    Ok(())
}

#[test]
fn test_empty_queries_launch_nothing() -> Result<()> {
    let coordinator = coordinator(4)?;
    for query in ["", " ", "\t\n", "   \r\n  "] {
        let out = coordinator.run(query, &sample_sources());
        assert_eq!(out.status, SearchStatus::Skipped(SkipReason::EmptyQuery));
        assert!(out.is_empty());
        assert_eq!(out.stats.scanners_launched, 0);
        assert!(matches!(out.into_completed(), Err(SearchError::EmptyQuery)));
    }
    Ok(())
}

#[test]
fn test_no_match_still_scans_every_source() -> Result<()> {
    let sources: Vec<EntrySource> = (0..12)
        .map(|i| numbered_source(&format!("d{}", i), 250, "bee"))
        .collect();

    let out = coordinator(4)?.run("wasp", &sources);
    assert_eq!(out.status, SearchStatus::Completed);
    assert!(out.is_empty());
    assert_eq!(out.stats.scanners_launched, 12);
    assert_eq!(out.stats.scanners_finished, 12);
    assert_eq!(out.stats.lines_scanned, 12 * 250);
    Ok(())
}

#[test]
fn test_whole_token_not_prefix() -> Result<()> {
    let sources = vec![EntrySource::new(
        "en",
        vec!["category a class", "cat feline", "Cat domestic"],
    )];
    let out = coordinator(2)?.run("cat", &sources);
    let lines: Vec<&str> = out.records.iter().map(|r| r.line.as_str()).collect();
    assert_eq!(lines, vec!["cat feline", "Cat domestic"]);
    Ok(())
}

#[test]
fn test_only_a_plain_space_ends_the_token() -> Result<()> {
    let sources = vec![EntrySource::new(
        "en",
        vec!["apple\tfruit", "apple\u{a0}nbsp", "apple\u{3000}ideographic"],
    )];
    let out = coordinator(2)?.run("apple", &sources);
    assert_eq!(out.status, SearchStatus::Completed);
    assert!(out.is_empty());
    assert_eq!(out.stats.lines_scanned, 3);
    Ok(())
}

#[test]
fn test_per_source_order_is_preserved() -> Result<()> {
    let sources: Vec<EntrySource> = (0..6)
        .map(|i| numbered_source(&format!("d{}", i), 2_000, "ant"))
        .collect();

    let out = coordinator(4)?.run("ant", &sources);
    assert_eq!(out.len(), 6 * 2_000);
    for source in &sources {
        let got: Vec<&str> = out.records_for(source.id()).map(|r| r.line.as_str()).collect();
        let expected: Vec<&str> = source.lines().iter().map(String::as_str).collect();
        assert_eq!(got, expected, "order broken for {}", source.id());
    }
    Ok(())
}

#[test]
fn test_completion_observed_only_after_every_scanner() -> Result<()> {
    let coordinator = coordinator(3)?;
    for sources_count in [1, 2, 7, 32] {
        let sources: Vec<EntrySource> = (0..sources_count)
            .map(|i| numbered_source(&format!("d{}", i), 300, "ant"))
            .collect();

        let out = coordinator.run("ant", &sources);
        assert_eq!(out.status, SearchStatus::Completed);
        assert_eq!(out.stats.scanners_launched, sources_count as u64);
        assert_eq!(
            out.stats.finished_at_completion,
            Some(sources_count as u64)
        );
        assert_eq!(out.stats.records_sent, out.stats.records_collected);
    }
    Ok(())
}

#[test]
fn test_bounded_sink_delivers_everything() -> Result<()> {
    let coordinator = SearchCoordinator::new(SearchConfig {
        thread_count: NonZeroUsize::new(4).unwrap(),
        sink_capacity: Some(2),
        ..SearchConfig::default()
    })?;
    let sources: Vec<EntrySource> = (0..8)
        .map(|i| numbered_source(&format!("d{}", i), 1_000, "ant"))
        .collect();

    let out = coordinator.run("ANT", &sources);
    assert_eq!(out.status, SearchStatus::Completed);
    assert_eq!(out.len(), 8_000);
    Ok(())
}

#[test]
fn test_concurrent_runs_do_not_mix() -> Result<()> {
    let coordinator = coordinator(4)?;
    let sources: Vec<EntrySource> = (0..4)
        .flat_map(|i| {
            vec![
                numbered_source(&format!("a{}", i), 500, "ant"),
                numbered_source(&format!("b{}", i), 500, "bee"),
            ]
        })
        .collect();

    thread::scope(|scope| {
        let ants = scope.spawn(|| coordinator.run("ant", &sources));
        let bees = scope.spawn(|| coordinator.run("bee", &sources));
        let ants = ants.join().unwrap();
        let bees = bees.join().unwrap();

        assert_eq!(ants.len(), 2_000);
        assert!(ants.records.iter().all(|r| r.line.starts_with("ant ")));
        assert_eq!(bees.len(), 2_000);
        assert!(bees.records.iter().all(|r| r.line.starts_with("bee ")));
    });
    Ok(())
}

#[test]
fn test_dictionary_dir_selection_with_missing_source() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("en"), "apple fruit\nant insect\n")?;
    fs::write(dir.path().join("de"), "Apfel apple\napple Apfel\n")?;

    let dicts = DictionaryDir::new(dir.path());
    let selection: SourceSelection = ["en", "de", "fr"].into_iter().collect();

    let out = coordinator(2)?.run_selection("apple", &selection, Arc::new(dicts));
    assert_eq!(out.status, SearchStatus::Completed);
    assert_eq!(out.len(), 2);
    assert_eq!(out.records_for("en").count(), 1);
    assert_eq!(out.records_for("de").count(), 1);

    assert_eq!(out.failures.len(), 1);
    assert_eq!(out.failures[0].source_id, "fr");
    assert_eq!(out.stats.sources_failed, 1);
    assert_eq!(out.stats.scanners_launched, 3);
    Ok(())
}

#[test]
fn test_unreadable_encoding_is_a_degraded_result() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("good"), "ant insect\n")?;
    fs::write(dir.path().join("bad"), b"ant \xff\xfe\n")?;

    let config = SearchConfig {
        dictionary_dir: dir.path().to_path_buf(),
        thread_count: NonZeroUsize::new(2).unwrap(),
        ..SearchConfig::default()
    };
    let dicts = DictionaryDir::from_config(&config);
    let selection = SourceSelection::from_patterns(&dicts.list()?, &["*"])?;
    assert_eq!(selection.len(), 2);

    let out = SearchCoordinator::new(config)?.run_selection("ant", &selection, Arc::new(dicts));
    assert_eq!(out.records, vec![MatchRecord::new("good", "ant insect")]);
    assert_eq!(out.failures.len(), 1);
    assert_eq!(out.failures[0].source_id, "bad");
    Ok(())
}

#[test]
fn test_timeout_returns_partial_result() -> Result<()> {
    let coordinator = SearchCoordinator::new(SearchConfig {
        thread_count: NonZeroUsize::new(2).unwrap(),
        max_search_duration: Some(Duration::from_millis(50)),
        ..SearchConfig::default()
    })?;
    let selection: SourceSelection = ["slow"].into_iter().collect();

    let started = Instant::now();
    let out = coordinator.run_selection("ant", &selection, Arc::new(SlowLoader(Duration::from_secs(3))));
    let elapsed = started.elapsed();
    assert_eq!(
        out.status,
        SearchStatus::TimedOut(Duration::from_millis(50))
    );
    assert!(out.is_empty());
    // Returns at the deadline, not when the loader finally gives its source back
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(1_000), "took {:?}", elapsed);
    assert_eq!(out.stats.collected_at_interrupt, Some(0));
    assert!(matches!(out.into_completed(), Err(SearchError::TimedOut(_))));
    Ok(())
}

#[test]
fn test_cancel_mid_scan_returns_promptly() -> Result<()> {
    let coordinator = coordinator(2)?;
    let token = CancellationToken::new();
    let loader = Arc::new(GateLoader {
        token: token.clone(),
        big: numbered_source("big", 10_000, "ant"),
    });
    let selection: SourceSelection = ["big", "late"].into_iter().collect();

    thread::scope(|scope| {
        let search = scope.spawn(|| {
            coordinator.run_selection_with_token("ant", &selection, loader.clone(), &token)
        });

        // "late" keeps the session open until cancelled
        thread::sleep(Duration::from_millis(100));
        assert!(!search.is_finished());

        let cancelled_at = Instant::now();
        token.cancel();
        let out = search.join().unwrap();

        assert!(cancelled_at.elapsed() < Duration::from_secs(5));
        assert_eq!(out.status, SearchStatus::Cancelled);
        assert_eq!(out.stats.finished_at_completion, None);

        // The aggregate is exactly what the collector held when it saw the cancel
        assert_eq!(out.stats.collected_at_interrupt, Some(out.len() as u64));
        assert_eq!(out.stats.records_collected, out.len() as u64);
        assert!(out.records_for("big").count() <= 10_000);
        assert_eq!(out.records_for("late").count(), 0);
    });
    Ok(())
}

#[test]
fn test_spawned_search_can_be_cancelled() -> Result<()> {
    let sources: Vec<EntrySource> = (0..16)
        .map(|i| numbered_source(&format!("d{}", i), 10_000, "ant"))
        .collect();
    let total_lines = 16 * 10_000;

    let handle = coordinator(2)?.spawn("ant", sources)?;
    handle.cancel();

    let started = Instant::now();
    let out = handle.wait()?;
    assert!(started.elapsed() < Duration::from_secs(5));
    match out.status {
        SearchStatus::Cancelled => {
            assert!(out.len() as u64 <= total_lines);
            assert_eq!(out.stats.records_collected, out.len() as u64);
        }
        SearchStatus::Completed => assert_eq!(out.len() as u64, total_lines),
        other => panic!("unexpected status {:?}", other),
    }
    Ok(())
}

#[test]
fn test_dropping_handle_cancels_search() -> Result<()> {
    let handle = coordinator(1)?.spawn("ant", sample_sources())?;
    let token = handle.token().clone();
    drop(handle);
    assert!(token.is_cancelled());
    Ok(())
}
