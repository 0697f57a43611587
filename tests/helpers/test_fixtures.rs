//! Text fixtures and small span utilities.

use std::time::{Duration, Instant};

use async_tagger::{
    AsyncTagger, AsyncTaggerSource, LineRange, Snapshot, SnapshotLineRange, SnapshotSpan, TagSpan,
};

/// Install env_logger once per test binary; later calls are no-ops
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Span over a single line, including its line break
pub fn line_span(snapshot: &Snapshot, line: usize) -> SnapshotSpan {
    lines_span(snapshot, line, 1)
}

/// Span over `count` lines starting at `line`, including the last line break
pub fn lines_span(snapshot: &Snapshot, line: usize, count: usize) -> SnapshotSpan {
    SnapshotLineRange::new(snapshot.clone(), LineRange::new(line, count))
        .extent_including_line_break()
}

/// Every occurrence of `words` starting inside `span`, ordered by position
pub fn word_tags(snapshot: &Snapshot, span: &SnapshotSpan, words: &[String]) -> Vec<TagSpan<String>> {
    let text = snapshot.text();
    let mut tags: Vec<TagSpan<String>> = words
        .iter()
        .flat_map(|word| {
            text.match_indices(word.as_str())
                .filter(|(start, _)| span.span().contains_position(*start))
                .map(|(start, _)| {
                    TagSpan::new(
                        SnapshotSpan::new(snapshot.clone(), start, start + word.len()),
                        word.clone(),
                    )
                })
                .collect::<Vec<_>>()
        })
        .collect();
    tags.sort_by_key(|tag| (tag.span.start(), tag.span.end()));
    tags
}

/// `(start, end, tag)` triples for compact assertions
pub fn describe(tags: &[TagSpan<String>]) -> Vec<(usize, usize, String)> {
    tags.iter()
        .map(|tag| (tag.span.start(), tag.span.end(), tag.tag.clone()))
        .collect()
}

/// Tag texts for compact assertions
pub fn texts(tags: &[TagSpan<String>]) -> Vec<String> {
    tags.iter().map(|tag| tag.span.text().to_string()).collect()
}

/// Handle background posts until `condition` holds, failing after five seconds
pub async fn process_until<S: AsyncTaggerSource>(
    tagger: &mut AsyncTagger<S>,
    condition: impl Fn(&AsyncTagger<S>) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        tagger.process_pending();
        if condition(tagger) {
            return;
        }
        assert!(Instant::now() < deadline, "Timed out waiting for background posts");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
