//! Cross-source deduplication with completeness-ranked merging.
//!
//! Records are grouped by normalized DOI, then normalized URL, then fuzzy
//! title within a year tolerance. Groups are the transitive closure of those
//! links, so a record that matches two partial groups joins them. Each group
//! collapses into one [`MergedRecord`]: the most complete member wins and its
//! missing fields are filled from the others.

use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::DedupConfig;
use crate::models::{MatchKind, MergedRecord, NormalizedRecord, SourceRef};
use crate::utils::identifiers::{normalize_doi, normalize_url, title_key, title_similarity};

/// Summary of one deduplication pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    pub input: usize,
    pub output: usize,
    /// Records folded into another record's group
    pub merged_away: usize,
    /// Multi-record groups by the strongest criterion that formed them
    pub groups_by_kind: BTreeMap<MatchKind, usize>,
}

/// Grouping keys derived from one record
#[derive(Debug, Default)]
struct Fingerprint {
    doi: Option<String>,
    url: Option<String>,
    title: Option<String>,
    years: Option<(i32, i32)>,
}

impl Fingerprint {
    fn of(merged: &MergedRecord) -> Self {
        let record = &merged.record;
        let title = record
            .title
            .as_deref()
            .map(title_key)
            .filter(|key| key.split(' ').count() >= 2);

        Self {
            doi: record.doi.as_deref().and_then(|d| normalize_doi(d).ok()),
            url: record.url.as_deref().and_then(|u| normalize_url(u).ok()),
            title,
            years: merged.year_span.or_else(|| record.year().map(|y| (y, y))),
        }
    }
}

/// Union-find over record indices, tracking per component the strongest
/// link kind, the DOIs it carries and its publication year span
struct Components {
    parent: Vec<usize>,
    size: Vec<usize>,
    kind: Vec<Option<MatchKind>>,
    dois: Vec<BTreeSet<String>>,
    years: Vec<Option<(i32, i32)>>,
}

impl Components {
    fn new(fingerprints: &[Fingerprint]) -> Self {
        let n = fingerprints.len();
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
            kind: vec![None; n],
            dois: fingerprints
                .iter()
                .map(|fp| fp.doi.iter().cloned().collect())
                .collect(),
            years: fingerprints.iter().map(|fp| fp.years).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize, kind: MatchKind) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            self.kind[ra] = strongest(self.kind[ra], Some(kind));
            return;
        }

        let (root, child) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[child] = root;
        self.size[root] += self.size[child];
        self.kind[root] = strongest(strongest(self.kind[root], self.kind[child]), Some(kind));
        let moved = std::mem::take(&mut self.dois[child]);
        self.dois[root].extend(moved);
        self.years[root] = widen(self.years[root], self.years[child]);
    }

    /// Fuzzy links never join two components that already carry DOIs, since
    /// those DOIs are necessarily different, nor components whose combined
    /// years would span more than `year_tolerance`
    fn may_fuzzy_link(&mut self, a: usize, b: usize, year_tolerance: i32) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb || !(self.dois[ra].is_empty() || self.dois[rb].is_empty()) {
            return false;
        }
        match widen(self.years[ra], self.years[rb]) {
            Some((min, max)) => max - min <= year_tolerance,
            None => true,
        }
    }
}

fn widen(a: Option<(i32, i32)>, b: Option<(i32, i32)>) -> Option<(i32, i32)> {
    match (a, b) {
        (Some((a0, a1)), Some((b0, b1))) => Some((a0.min(b0), a1.max(b1))),
        (x, None) => x,
        (None, y) => y,
    }
}

fn strongest(a: Option<MatchKind>, b: Option<MatchKind>) -> Option<MatchKind> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// The deduplication engine
#[derive(Debug, Clone)]
pub struct Deduplicator {
    similarity_threshold: f64,
    year_tolerance: i32,
    source_priority: Vec<String>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(&DedupConfig::default())
    }
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            year_tolerance: config.year_tolerance as i32,
            source_priority: config.source_priority.clone(),
        }
    }

    /// Collapse duplicate records into merged records. Never discards input.
    pub fn dedupe(&self, records: Vec<NormalizedRecord>) -> Vec<MergedRecord> {
        self.dedupe_with_report(records).0
    }

    pub fn dedupe_with_report(
        &self,
        records: Vec<NormalizedRecord>,
    ) -> (Vec<MergedRecord>, DedupReport) {
        self.dedupe_merged(records.into_iter().map(MergedRecord::singleton).collect())
    }

    /// Deduplicate already merged records, preserving their source lists.
    ///
    /// Running this over the output of [`dedupe`](Self::dedupe) returns it unchanged.
    pub fn dedupe_merged(&self, records: Vec<MergedRecord>) -> (Vec<MergedRecord>, DedupReport) {
        let input = records.len();
        let fingerprints: Vec<Fingerprint> =
            records.iter().map(Fingerprint::of).collect();
        let mut components = Components::new(&fingerprints);

        self.link_exact(&mut components, &fingerprints, |fp| fp.doi.as_deref(), MatchKind::Doi);
        self.link_exact(&mut components, &fingerprints, |fp| fp.url.as_deref(), MatchKind::Url);
        self.link_titles(&mut components, &fingerprints);

        // Groups in first-seen order, members in input order
        let mut group_index: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<(usize, MergedRecord)>> = Vec::new();
        for (idx, record) in records.into_iter().enumerate() {
            let root = components.find(idx);
            let slot = *group_index.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push((idx, record));
        }

        let mut report = DedupReport {
            input,
            ..Default::default()
        };
        let mut merged = Vec::with_capacity(groups.len());
        for members in groups {
            let Some(&(first, _)) = members.first() else {
                continue;
            };
            let root = components.find(first);
            let kind = components.kind[root];
            let Some(record) = self.merge_group(members, kind) else {
                continue;
            };
            if record.matched_by != MatchKind::Singleton {
                *report.groups_by_kind.entry(record.matched_by).or_default() += 1;
            }
            merged.push(record);
        }

        report.output = merged.len();
        report.merged_away = input - merged.len();
        tracing::info!(
            "[dedup] {} records -> {} groups ({} merged away)",
            report.input,
            report.output,
            report.merged_away
        );
        (merged, report)
    }

    fn link_exact<F>(
        &self,
        components: &mut Components,
        fingerprints: &[Fingerprint],
        key: F,
        kind: MatchKind,
    ) where
        F: Fn(&Fingerprint) -> Option<&str>,
    {
        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        for (idx, fp) in fingerprints.iter().enumerate() {
            if let Some(k) = key(fp) {
                match first_seen.get(k) {
                    Some(&first) => components.union(first, idx, kind),
                    None => {
                        first_seen.insert(k, idx);
                    }
                }
            }
        }
    }

    /// Fuzzy title pass.
    ///
    /// Candidates are visited in order of key length. The indel ratio of keys
    /// with lengths `m <= n` is at most `2m / (m + n)`, so once `n` passes
    /// `m * (2 - r) / r` no later candidate can reach the threshold `r`.
    fn link_titles(&self, components: &mut Components, fingerprints: &[Fingerprint]) {
        let ratio = (self.similarity_threshold / 100.0).clamp(f64::EPSILON, 1.0);
        let mut order: Vec<(usize, &str)> = fingerprints
            .iter()
            .enumerate()
            .filter_map(|(idx, fp)| fp.title.as_deref().map(|t| (idx, t)))
            .collect();
        order.sort_by_key(|(idx, title)| (title.chars().count(), *idx));

        let lengths: Vec<usize> = order.iter().map(|(_, t)| t.chars().count()).collect();
        for p in 0..order.len() {
            let (a, title_a) = order[p];
            let max_len = (lengths[p] as f64 * (2.0 - ratio) / ratio + 1e-9).floor() as usize;
            for q in (p + 1)..order.len() {
                if lengths[q] > max_len {
                    break;
                }
                let (b, title_b) = order[q];
                if !components.may_fuzzy_link(a, b, self.year_tolerance) {
                    continue;
                }
                if title_similarity(title_a, title_b) >= self.similarity_threshold {
                    tracing::debug!("[dedup] fuzzy title match: {:?} ~ {:?}", title_a, title_b);
                    components.union(a, b, MatchKind::Title);
                }
            }
        }
    }

    fn priority(&self, source: &str) -> usize {
        self.source_priority
            .iter()
            .position(|s| s.eq_ignore_ascii_case(source))
            .unwrap_or(self.source_priority.len())
    }

    /// Merge one group: canonical first, then fill-only from the rest in rank order
    fn merge_group(
        &self,
        mut members: Vec<(usize, MergedRecord)>,
        link_kind: Option<MatchKind>,
    ) -> Option<MergedRecord> {
        members.sort_by_cached_key(|(order, record)| {
            (
                Reverse(record.completeness()),
                self.priority(record.canonical_source()),
                *order,
            )
        });

        let mut members = members.into_iter().map(|(_, record)| record);
        let canonical = members.next()?;
        let donors: Vec<MergedRecord> = members.collect();
        if donors.is_empty() {
            return Some(canonical);
        }

        let MergedRecord {
            record,
            mut sources,
            mut backfilled,
            matched_by,
            mut year_span,
            abstract_quality,
            citations,
            relevance_score,
        } = canonical;

        let mut kind = strongest(link_kind, Some(matched_by)).unwrap_or(MatchKind::Singleton);
        let mut builder = record.to_builder();
        for donor in &donors {
            for field in builder.fill_missing_from(&donor.record) {
                let origin = donor
                    .backfilled
                    .get(&field)
                    .cloned()
                    .unwrap_or_else(|| donor.canonical_source().to_string());
                backfilled.insert(field, origin);
            }
            sources.extend(donor.sources.iter().map(|s| SourceRef {
                name: s.name.clone(),
                canonical: false,
            }));
            kind = kind.min(donor.matched_by);
            year_span = widen(year_span, donor.year_span);
        }

        Some(MergedRecord {
            record: builder.build(),
            sources,
            backfilled,
            matched_by: kind,
            year_span,
            abstract_quality,
            citations,
            relevance_score,
        })
    }
}
