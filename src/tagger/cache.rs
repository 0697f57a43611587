//! Immutable cache values behind the tagger.
//!
//! - [`BackgroundCacheData`]: authoritative results for the lines the
//!   background has finished on one snapshot.
//! - [`TrackingCacheData`]: the previous answer, re-mappable onto newer
//!   snapshots, used as a bridge while new background work is pending.
//! - [`TagCache`]: the pair the tagger owns. Transitions consume the old value
//!   and return a new one; nothing is mutated in place once published.

use crate::text::{
    LineRange, NormalizedLineRangeCollection, Snapshot, SnapshotLineRange, SnapshotSpan,
    TrackingMode, TrackingSpan,
};

use super::tag::TagSpan;

const LOG_TARGET: &str = "async_tagger::cache";

/// Lines the background has completed on one snapshot, and their tags.
///
/// Every tag starts on a visited line. A visited line with no tags is an
/// authoritative "nothing here", including lines whose computation failed.
#[derive(Debug, Clone)]
pub struct BackgroundCacheData<T> {
    snapshot: Snapshot,
    visited: NormalizedLineRangeCollection,
    tags: Vec<TagSpan<T>>,
}

impl<T: Clone + PartialEq> BackgroundCacheData<T> {
    pub fn new(line_range: &SnapshotLineRange, tags: Vec<TagSpan<T>>) -> Self {
        let data = Self {
            snapshot: line_range.snapshot().clone(),
            visited: NormalizedLineRangeCollection::new(),
            tags: Vec::new(),
        };
        data.merged(line_range.line_range(), tags)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn visited_collection(&self) -> &NormalizedLineRangeCollection {
        &self.visited
    }

    pub fn tags(&self) -> &[TagSpan<T>] {
        &self.tags
    }

    /// Whether every line of `range` has been visited
    pub fn is_complete(&self, range: &LineRange) -> bool {
        self.visited.contains(range)
    }

    /// Mark `line_range` visited with `tags` as its answer.
    ///
    /// Tags that do not start inside `line_range`, or that belong to another
    /// snapshot, are dropped so adjacent chunks never contribute the same tag.
    pub fn merged(mut self, line_range: LineRange, tags: Vec<TagSpan<T>>) -> Self {
        self.tags.retain(|tag| !tag.starts_in(&line_range));

        let before = self.tags.len();
        let offered = tags.len();
        let snapshot = &self.snapshot;
        self.tags.extend(
            tags.into_iter()
                .filter(|tag| tag.span.snapshot() == snapshot && tag.starts_in(&line_range)),
        );
        let accepted = self.tags.len() - before;
        if accepted < offered {
            log::trace!(
                target: LOG_TARGET,
                "Dropped {} tag(s) outside {:?}",
                offered - accepted,
                line_range
            );
        }

        self.tags
            .sort_by_key(|tag| (tag.span.start(), tag.span.end()));
        self.visited.add(line_range);
        self
    }

    /// Convert into a tracking bridge covering everything visited.
    ///
    /// `older` is the bridge this data was built on top of. Its tags survive on
    /// lines this data has not visited, and its span stays covered.
    pub fn create_tracking_cache_data(
        &self,
        older: Option<&TrackingCacheData<T>>,
    ) -> Option<TrackingCacheData<T>> {
        let visited = self.visited.overarching_line_range().map(|overarching| {
            SnapshotLineRange::new(self.snapshot.clone(), overarching)
                .extent_including_line_break()
        });
        let inherited = older.and_then(|older| {
            older
                .tracking_span()
                .span_on(&self.snapshot)
                .filter(|span| !span.is_empty() || older.tracking_span().origin().is_empty())
        });

        let span = match (visited, inherited) {
            (Some(visited), Some(inherited)) => visited.union(&inherited)?,
            (Some(span), None) | (None, Some(span)) => span,
            (None, None) => return None,
        };

        let mut tags = self.tags.clone();
        if let Some(older) = older {
            tags.extend(
                older
                    .tags_on(&self.snapshot)
                    .into_iter()
                    .filter(|tag| !self.visited.contains_line(tag.start_line())),
            );
            tags.sort_by_key(|tag| (tag.span.start(), tag.span.end()));
        }
        Some(TrackingCacheData::new(span, &tags))
    }
}

/// A previous answer expressed with tracking spans.
#[derive(Debug, Clone)]
pub struct TrackingCacheData<T> {
    tracking_span: TrackingSpan,
    tracking_tags: Vec<(TrackingSpan, T)>,
}

impl<T: Clone + PartialEq> TrackingCacheData<T> {
    pub fn new(span: SnapshotSpan, tags: &[TagSpan<T>]) -> Self {
        Self {
            tracking_span: TrackingSpan::new(span, TrackingMode::EdgeInclusive),
            tracking_tags: tags
                .iter()
                .map(|tag| {
                    (
                        TrackingSpan::new(tag.span.clone(), TrackingMode::EdgeExclusive),
                        tag.tag.clone(),
                    )
                })
                .collect(),
        }
    }

    /// The span the cached answer was complete for
    pub fn tracking_span(&self) -> &TrackingSpan {
        &self.tracking_span
    }

    pub fn tracking_tags(&self) -> &[(TrackingSpan, T)] {
        &self.tracking_tags
    }

    /// Whether the cached answer, re-mapped onto `span`'s snapshot, still covers it
    pub fn covers(&self, span: &SnapshotSpan) -> bool {
        self.tracking_span
            .span_on(span.snapshot())
            .is_some_and(|tracked| tracked.contains(span))
    }

    /// The cached tags re-mapped onto `snapshot`. Tags an edit deleted are omitted.
    pub fn tags_on(&self, snapshot: &Snapshot) -> Vec<TagSpan<T>> {
        self.tracking_tags
            .iter()
            .filter_map(|(tracking, tag)| {
                let span = tracking.span_on(snapshot)?;
                if span.is_empty() && !tracking.origin().is_empty() {
                    return None;
                }
                Some(TagSpan::new(span, tag.clone()))
            })
            .collect()
    }
}

/// Result of answering a span from the cache alone
#[derive(Debug, Clone)]
pub struct CacheLookup<T> {
    /// Best available tags for the span
    pub tags: Vec<TagSpan<T>>,
    /// Lines the background has not completed on this snapshot
    pub missing: Vec<LineRange>,
}

/// Background and tracking data owned by the tagger
#[derive(Debug, Clone)]
pub struct TagCache<T> {
    background: Option<BackgroundCacheData<T>>,
    tracking: Option<TrackingCacheData<T>>,
}

impl<T> Default for TagCache<T> {
    fn default() -> Self {
        Self {
            background: None,
            tracking: None,
        }
    }
}

impl<T: Clone + PartialEq> TagCache<T> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(
        background: Option<BackgroundCacheData<T>>,
        tracking: Option<TrackingCacheData<T>>,
    ) -> Self {
        Self {
            background,
            tracking,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.background.is_none() && self.tracking.is_none()
    }

    pub fn background_cache_data(&self) -> Option<&BackgroundCacheData<T>> {
        self.background.as_ref()
    }

    pub fn tracking_cache_data(&self) -> Option<&TrackingCacheData<T>> {
        self.tracking.as_ref()
    }

    /// Move the cache onto `snapshot`.
    ///
    /// Background data for another snapshot stops being authoritative and
    /// becomes the tracking bridge, layered over any existing bridge so lines
    /// not yet recomputed keep their tags.
    pub fn advanced_to(self, snapshot: &Snapshot) -> Self {
        match self.background {
            Some(background) if background.snapshot() != snapshot => {
                log::debug!(
                    target: LOG_TARGET,
                    "Snapshot moved from v{} to v{}; background data becomes tracking data",
                    background.snapshot().version(),
                    snapshot.version()
                );
                let tracking = background.create_tracking_cache_data(self.tracking.as_ref());
                Self::new(None, tracking)
            }
            background => Self::new(background, self.tracking),
        }
    }

    /// Answer `span` from the cache.
    ///
    /// Visited lines are answered from the background data. Remaining lines are
    /// answered from the tracking data where it still covers them, and are
    /// reported as missing either way.
    pub fn lookup(&self, span: &SnapshotSpan) -> CacheLookup<T> {
        let snapshot = span.snapshot();
        let requested = span.line_range().line_range();

        let mut tags = Vec::new();
        let missing = match &self.background {
            Some(background) if background.snapshot() == snapshot => {
                tags.extend(
                    background
                        .tags()
                        .iter()
                        .filter(|tag| answers(&tag.span, span))
                        .cloned(),
                );
                background.visited_collection().missing(&requested)
            }
            _ => vec![requested],
        };

        if let Some(tracking) = &self.tracking
            && !missing.is_empty()
        {
            // Coverage is decided per line; a bridge may cover only part of a gap
            let tracked = tracking.tracking_span().span_on(snapshot);
            let covered: NormalizedLineRangeCollection = missing
                .iter()
                .flat_map(LineRange::lines)
                .filter(|line| {
                    let line_span = clip_to(
                        SnapshotLineRange::new(snapshot.clone(), LineRange::new(*line, 1))
                            .extent_including_line_break(),
                        span,
                    );
                    tracked
                        .as_ref()
                        .is_some_and(|tracked| tracked.contains(&line_span))
                })
                .map(|line| LineRange::new(line, 1))
                .collect();

            if !covered.is_empty() {
                tags.extend(tracking.tags_on(snapshot).into_iter().filter(|tag| {
                    covered.contains_line(tag.start_line()) && answers(&tag.span, span)
                }));
                tags.sort_by_key(|tag| (tag.span.start(), tag.span.end()));
            }
        }

        CacheLookup { tags, missing }
    }

    /// Fold a batch of background results into the cache.
    ///
    /// Returns the new cache and whether the completed lines now answer
    /// differently from what the tracking data predicted.
    pub fn with_background_results(
        self,
        line_range: &SnapshotLineRange,
        tags: Vec<TagSpan<T>>,
    ) -> (Self, bool) {
        let snapshot = line_range.snapshot();
        let (background, tracking) = match self.background {
            Some(background) if background.snapshot() == snapshot => {
                (background.merged(line_range.line_range(), tags), self.tracking)
            }
            Some(stale) => {
                let tracking = stale.create_tracking_cache_data(self.tracking.as_ref());
                (BackgroundCacheData::new(line_range, tags), tracking)
            }
            None => (BackgroundCacheData::new(line_range, tags), self.tracking),
        };

        let range = line_range.line_range();
        let actual: Vec<&TagSpan<T>> = background
            .tags()
            .iter()
            .filter(|tag| tag.starts_in(&range))
            .collect();
        let changed = did_tags_change(tracking.as_ref(), line_range, &actual);

        let tracking = tracking.filter(|tracking| !is_superseded(tracking, &background));
        (Self::new(Some(background), tracking), changed)
    }
}

/// Whether `tag` belongs in the answer for `requested`. Tags merely
/// touching a non-empty request belong to the neighbouring span instead.
fn answers(tag: &SnapshotSpan, requested: &SnapshotSpan) -> bool {
    if requested.is_empty() {
        tag.intersects_with(requested)
    } else if tag.is_empty() {
        tag.snapshot() == requested.snapshot() && requested.span().contains_position(tag.start())
    } else {
        tag.overlaps_with(requested)
    }
}

fn clip_to(span: SnapshotSpan, bounds: &SnapshotSpan) -> SnapshotSpan {
    match span.span().intersection(&bounds.span()) {
        Some(clipped) => SnapshotSpan::from_span(span.snapshot().clone(), clipped),
        None => span,
    }
}

/// Whether `actual` differs from what `tracking` predicted for `completed`.
///
/// Without tracking data covering the completed lines there is no prediction,
/// so the tags are assumed to have changed.
fn did_tags_change<T: Clone + PartialEq>(
    tracking: Option<&TrackingCacheData<T>>,
    completed: &SnapshotLineRange,
    actual: &[&TagSpan<T>],
) -> bool {
    let Some(tracking) = tracking else {
        return true;
    };
    if !tracking.covers(&completed.extent_including_line_break()) {
        return true;
    }

    let range = completed.line_range();
    let predicted: Vec<TagSpan<T>> = tracking
        .tags_on(completed.snapshot())
        .into_iter()
        .filter(|tag| tag.starts_in(&range))
        .collect();

    predicted.len() != actual.len() || actual.iter().any(|tag| !predicted.contains(tag))
}

/// Tracking data is superseded once the background has visited everything it
/// covered, or once it can no longer be mapped onto the background snapshot.
fn is_superseded<T: Clone + PartialEq>(
    tracking: &TrackingCacheData<T>,
    background: &BackgroundCacheData<T>,
) -> bool {
    match tracking.tracking_span().span_on(background.snapshot()) {
        Some(span) => background.is_complete(&span.line_range().line_range()),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TextBuffer;

    fn word_tags(snapshot: &Snapshot, words: &[&str]) -> Vec<TagSpan<String>> {
        let text = snapshot.text();
        let mut tags = Vec::new();
        for word in words {
            for (start, _) in text.match_indices(word) {
                tags.push(TagSpan::new(
                    SnapshotSpan::new(snapshot.clone(), start, start + word.len()),
                    word.to_string(),
                ));
            }
        }
        tags.sort_by_key(|tag| tag.span.start());
        tags
    }

    fn lines(snapshot: &Snapshot, start: usize, count: usize) -> SnapshotLineRange {
        SnapshotLineRange::new(snapshot.clone(), LineRange::new(start, count))
    }

    #[test]
    fn test_background_data_keeps_tags_inside_visited() {
        let snapshot = TextBuffer::new("cat\ndog\ncat").current_snapshot();
        let all = word_tags(&snapshot, &["cat", "dog"]);

        let data = BackgroundCacheData::new(&lines(&snapshot, 0, 1), all.clone());
        assert_eq!(data.tags().len(), 1, "only the tag starting on line 0 is kept");
        assert!(data.is_complete(&LineRange::new(0, 1)));
        assert!(!data.is_complete(&LineRange::new(0, 2)));

        let data = data.merged(LineRange::new(1, 2), all.clone());
        assert_eq!(data.tags(), all.as_slice());
        assert_eq!(data.visited_collection().len(), 1);
    }

    #[test]
    fn test_lookup_reports_missing_lines() {
        let snapshot = TextBuffer::new("cat\ndog\ncat").current_snapshot();
        let background =
            BackgroundCacheData::new(&lines(&snapshot, 0, 1), word_tags(&snapshot, &["cat"]));
        let cache = TagCache::new(Some(background), None);

        let lookup = cache.lookup(&snapshot.extent());
        assert_eq!(lookup.tags.len(), 1);
        assert_eq!(lookup.missing, vec![LineRange::new(1, 2)]);
    }

    #[test]
    fn test_visited_without_tags_is_complete() {
        let snapshot = TextBuffer::new("cat dog bat").current_snapshot();
        let background = BackgroundCacheData::<String>::new(&lines(&snapshot, 0, 1), Vec::new());
        let cache = TagCache::new(Some(background), None);

        let lookup = cache.lookup(&snapshot.extent());
        assert!(lookup.tags.is_empty());
        assert!(lookup.missing.is_empty());
    }

    #[test]
    fn test_advanced_cache_answers_from_tracking_data() {
        let buffer = TextBuffer::new("cat dog\nbat");
        let old = buffer.current_snapshot();
        let background = BackgroundCacheData::new(
            &SnapshotLineRange::for_extent(old.clone()),
            word_tags(&old, &["dog"]),
        );
        let cache = TagCache::new(Some(background), None);

        let new = buffer.insert(0, "a ");
        let cache = cache.advanced_to(&new);
        assert!(cache.background_cache_data().is_none());
        assert!(cache.tracking_cache_data().is_some());

        let lookup = cache.lookup(&new.extent());
        assert_eq!(lookup.missing, vec![LineRange::new(0, 2)]);
        assert_eq!(lookup.tags.len(), 1);
        assert_eq!(lookup.tags[0].span.text(), "dog");
        assert_eq!(lookup.tags[0].span.start(), 6);
    }

    #[test]
    fn test_tracking_data_not_used_when_it_no_longer_covers() {
        let buffer = TextBuffer::new("cat dog\nbat\nrat");
        let old = buffer.current_snapshot();
        let background =
            BackgroundCacheData::new(&lines(&old, 0, 1), word_tags(&old, &["dog"]));
        let cache = TagCache::new(Some(background), None);

        let new = buffer.insert(0, "x");
        let cache = cache.advanced_to(&new);
        let lookup = cache.lookup(&SnapshotLineRange::new(new.clone(), LineRange::new(2, 1)).extent());
        assert!(lookup.tags.is_empty());
        assert_eq!(lookup.missing, vec![LineRange::new(2, 1)]);
    }

    #[test]
    fn test_results_matching_prediction_are_not_a_change() {
        let buffer = TextBuffer::new("cat dog\nbat");
        let old = buffer.current_snapshot();
        let background = BackgroundCacheData::new(
            &SnapshotLineRange::for_extent(old.clone()),
            word_tags(&old, &["cat", "dog"]),
        );
        let cache = TagCache::new(Some(background), None);

        let new = buffer.insert(0, "a ");
        let cache = cache.advanced_to(&new);
        let (cache, changed) = cache.with_background_results(
            &SnapshotLineRange::for_extent(new.clone()),
            word_tags(&new, &["cat", "dog"]),
        );

        assert!(!changed);
        assert!(
            cache.tracking_cache_data().is_none(),
            "fully superseded tracking data is dropped"
        );
        assert_eq!(cache.background_cache_data().unwrap().tags().len(), 2);
    }

    #[test]
    fn test_results_differing_from_prediction_are_a_change() {
        let buffer = TextBuffer::new("cat dog\nbat");
        let old = buffer.current_snapshot();
        let background = BackgroundCacheData::new(
            &SnapshotLineRange::for_extent(old.clone()),
            word_tags(&old, &["cat"]),
        );
        let cache = TagCache::new(Some(background), None).advanced_to(&old);

        let new = buffer.insert(0, "a ");
        let (_, changed) = cache.advanced_to(&new).with_background_results(
            &SnapshotLineRange::for_extent(new.clone()),
            word_tags(&new, &["cat", "dog"]),
        );
        assert!(changed);
    }

    #[test]
    fn test_results_without_tracking_data_are_a_change() {
        let snapshot = TextBuffer::new("cat").current_snapshot();
        let (cache, changed) = TagCache::<String>::empty()
            .with_background_results(&lines(&snapshot, 0, 1), Vec::new());
        assert!(changed);
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_partial_results_keep_tracking_data() {
        let buffer = TextBuffer::new("cat\ndog\nbat");
        let old = buffer.current_snapshot();
        let background = BackgroundCacheData::new(
            &SnapshotLineRange::for_extent(old.clone()),
            word_tags(&old, &["cat", "dog", "bat"]),
        );
        let new = buffer.insert(0, "x");
        let cache = TagCache::new(Some(background), None).advanced_to(&new);

        let (cache, _) = cache.with_background_results(&lines(&new, 0, 1), Vec::new());
        assert!(cache.tracking_cache_data().is_some());

        let lookup = cache.lookup(&new.extent());
        assert_eq!(lookup.missing, vec![LineRange::new(1, 2)]);
        let texts: Vec<_> = lookup.tags.iter().map(|tag| tag.span.text()).collect();
        assert_eq!(texts, vec!["dog", "bat"], "line 0 is authoritative and empty");
    }

    fn texts(tags: &[TagSpan<String>]) -> Vec<&str> {
        tags.iter().map(|tag| tag.span.text()).collect()
    }

    #[test]
    fn test_touching_tags_belong_to_the_neighbouring_span() {
        let snapshot = TextBuffer::new("cat\ndog\n").current_snapshot();
        let background = BackgroundCacheData::new(
            &SnapshotLineRange::for_extent(snapshot.clone()),
            word_tags(&snapshot, &["cat", "dog"]),
        );
        let cache = TagCache::new(Some(background), None);

        let line_zero = lines(&snapshot, 0, 1).extent_including_line_break();
        assert_eq!(texts(&cache.lookup(&line_zero).tags), vec!["cat"]);

        let caret = SnapshotSpan::new(snapshot.clone(), 4, 4);
        assert_eq!(texts(&cache.lookup(&caret).tags), vec!["dog"]);
    }

    #[test]
    fn test_bridge_covering_part_of_a_gap_still_answers() {
        let buffer = TextBuffer::new("cat\ndog\ncat");
        let old = buffer.current_snapshot();
        let background =
            BackgroundCacheData::new(&lines(&old, 0, 2), word_tags(&old, &["cat", "dog"]));
        let new = buffer.insert(0, "x");
        let cache = TagCache::new(Some(background), None).advanced_to(&new);

        let lookup = cache.lookup(&new.extent());
        assert_eq!(lookup.missing, vec![LineRange::new(0, 3)]);
        assert_eq!(texts(&lookup.tags), vec!["cat", "dog"]);
        assert_eq!(lookup.tags[0].span.start(), 1);
    }

    #[test]
    fn test_second_edit_during_partial_recompute_keeps_bridge() {
        let buffer = TextBuffer::new("cat\ndog\ncat\ndog");
        let v1 = buffer.current_snapshot();
        let background = BackgroundCacheData::new(
            &SnapshotLineRange::for_extent(v1.clone()),
            word_tags(&v1, &["cat", "dog"]),
        );

        let v2 = buffer.insert(0, "a ");
        let cache = TagCache::new(Some(background), None).advanced_to(&v2);
        let (cache, changed) =
            cache.with_background_results(&lines(&v2, 0, 1), word_tags(&v2, &["cat", "dog"]));
        assert!(!changed);
        assert_eq!(cache.lookup(&v2.extent()).tags.len(), 4);

        let v3 = buffer.insert(0, "b ");
        let cache = cache.advanced_to(&v3);
        let lookup = cache.lookup(&v3.extent());
        assert_eq!(lookup.missing, vec![LineRange::new(0, 4)]);
        assert_eq!(texts(&lookup.tags), vec!["cat", "dog", "cat", "dog"]);
        assert_eq!(lookup.tags[0].span.start(), 4);
    }

    #[test]
    fn test_bridge_from_stale_results_inherits_older_bridge() {
        let buffer = TextBuffer::new("cat\ndog\ncat");
        let v1 = buffer.current_snapshot();
        let background = BackgroundCacheData::new(
            &SnapshotLineRange::for_extent(v1.clone()),
            word_tags(&v1, &["cat", "dog"]),
        );
        let v2 = buffer.insert(0, "x");
        let cache = TagCache::new(Some(background), None).advanced_to(&v2);
        let (cache, _) = cache.with_background_results(&lines(&v2, 1, 1), Vec::new());

        // Results for v3 arrive while the cache still holds partial v2 data
        let v3 = buffer.insert(0, "y");
        let (cache, _) = cache.with_background_results(&lines(&v3, 0, 1), Vec::new());
        let lookup = cache.lookup(&v3.extent());
        assert_eq!(lookup.missing, vec![LineRange::new(1, 2)]);
        assert_eq!(texts(&lookup.tags), vec!["cat"], "line 1 was recomputed empty on v2");
    }

    #[test]
    fn test_destroyed_tracking_region_falls_through() {
        let buffer = TextBuffer::new("cat\ndog\nbird\n");
        let old = buffer.current_snapshot();
        let background =
            BackgroundCacheData::new(&lines(&old, 0, 2), word_tags(&old, &["cat", "dog"]));
        let new = buffer.delete(0, 8);
        let cache = TagCache::new(Some(background), None).advanced_to(&new);

        let line_zero = lines(&new, 0, 1).extent_including_line_break();
        let lookup = cache.lookup(&line_zero);
        assert!(lookup.tags.is_empty());
        assert_eq!(lookup.missing, vec![LineRange::new(0, 1)]);
    }
}
