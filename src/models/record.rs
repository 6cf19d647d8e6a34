//! Bibliographic records as reported by a source and after normalization.

use chrono::{DateTime, Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::Field;

/// Publication type of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Journal,
    Conference,
    Preprint,
    Book,
    BookChapter,
    Thesis,
    Report,
    Dataset,
    #[serde(untagged)]
    Other(String),
}

impl RecordType {
    /// Map a free-text type tag from any source onto a record type.
    ///
    /// Covers Crossref, OpenAlex, Semantic Scholar, PubMed and BibTeX
    /// vocabularies; anything else is kept verbatim (lower-cased) as `Other`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let folded: String = tag
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();

        let kind = match folded.as_str() {
            "" => return None,
            "journal" | "journalarticle" | "article" | "review" | "reviewarticle" => {
                RecordType::Journal
            }
            "conference" | "conferencepaper" | "proceedingsarticle" | "inproceedings"
            | "proceedings" | "conferencearticle" => RecordType::Conference,
            "preprint" | "postedcontent" | "eprint" => RecordType::Preprint,
            "book" | "monograph" | "editedbook" => RecordType::Book,
            "bookchapter" | "chapter" | "bookpart" | "booksection" | "incollection" => {
                RecordType::BookChapter
            }
            "thesis" | "dissertation" | "phdthesis" | "mastersthesis" => RecordType::Thesis,
            "report" | "techreport" | "reportcomponent" => RecordType::Report,
            "dataset" => RecordType::Dataset,
            _ => RecordType::Other(tag.trim().to_lowercase()),
        };
        Some(kind)
    }

    pub fn id(&self) -> &str {
        match self {
            RecordType::Journal => "journal",
            RecordType::Conference => "conference",
            RecordType::Preprint => "preprint",
            RecordType::Book => "book",
            RecordType::BookChapter => "book_chapter",
            RecordType::Thesis => "thesis",
            RecordType::Report => "report",
            RecordType::Dataset => "dataset",
            RecordType::Other(s) => s,
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

static YEAR_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})[-/.](\d{1,2})$").expect("valid regex"));
static MONTH_NAME_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\b").expect("valid regex")
});
static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[5-9]\d{2}|20\d{2})\b").expect("valid regex"));

/// A publication date with the precision the source provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PublicationDate {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl PublicationDate {
    /// Parse the date formats emitted by literature APIs.
    ///
    /// Accepts RFC 3339 timestamps, `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY-MM`,
    /// PubMed-style `2021 Mar 15`, `March 2021`, and a bare year. Returns
    /// `None` when no plausible year can be found.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }

        if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
            return Some(Self::from_naive(ts.date_naive()));
        }

        let head = s.get(..10).unwrap_or(s);
        for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"] {
            if let Ok(date) = NaiveDate::parse_from_str(head, fmt) {
                return Some(Self::from_naive(date));
            }
        }
        for fmt in ["%Y %b %d", "%d %B %Y", "%d %b %Y", "%B %d, %Y", "%b %d, %Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                return Some(Self::from_naive(date));
            }
        }

        if let Some(caps) = YEAR_MONTH.captures(s) {
            let year = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            if (1..=12).contains(&month) {
                return Some(Self {
                    year,
                    month: Some(month),
                    day: None,
                });
            }
        }

        let year: i32 = YEAR.captures(s)?[1].parse().ok()?;
        let month = MONTH_NAME_YEAR
            .captures(s)
            .and_then(|caps| month_from_name(&caps[1]));
        Some(Self {
            year,
            month,
            day: None,
        })
    }

    fn from_naive(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: Some(date.month()),
            day: Some(date.day()),
        }
    }

    /// Whole months elapsed between this date and `now`.
    ///
    /// A missing month or day is taken as the first of the period. The result
    /// is negative for dates in the future.
    pub fn months_until(&self, now: NaiveDate) -> i64 {
        let month = self.month.unwrap_or(1) as i64;
        let day = self.day.unwrap_or(1);
        let mut months = (now.year() as i64 - self.year as i64) * 12 + (now.month() as i64 - month);
        if now.day() < day {
            months -= 1;
        }
        months
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Citation data shipped by the originating source alongside the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineCitations {
    pub citation_count: u32,
    pub reference_count: Option<u32>,
}

/// One paper as reported by one source.
///
/// Produced by collector collaborators; never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    /// Source name (e.g. "semantic", "openalex")
    pub source: String,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Authors (semicolon-separated)
    pub authors: Option<String>,
    pub venue: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub date: Option<String>,
    pub publisher: Option<String>,
    pub issn: Option<String>,
    pub language: Option<String>,
    /// Keywords (semicolon-separated)
    pub keywords: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    pub citation_count: Option<u32>,
    pub reference_count: Option<u32>,
}

impl RawRecord {
    pub fn builder(source: impl Into<String>) -> RawRecordBuilder {
        RawRecordBuilder {
            record: RawRecord {
                source: source.into(),
                ..Default::default()
            },
        }
    }

    /// Inline citation data, if the source supplied a count
    pub fn inline_citations(&self) -> Option<InlineCitations> {
        self.citation_count.map(|citation_count| InlineCitations {
            citation_count,
            reference_count: self.reference_count,
        })
    }
}

/// Builder for constructing RawRecord values
#[derive(Debug, Clone)]
pub struct RawRecordBuilder {
    record: RawRecord,
}

macro_rules! text_setters {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name(mut self, value: impl Into<String>) -> Self {
                self.record.$name = Some(value.into());
                self
            }
        )*
    };
}

impl RawRecordBuilder {
    text_setters!(
        title, authors, venue, volume, issue, pages, date, publisher, issn, language, keywords,
        doi, url, record_type,
    );

    pub fn abstract_text(mut self, value: impl Into<String>) -> Self {
        self.record.abstract_text = Some(value.into());
        self
    }

    pub fn citations(mut self, count: u32) -> Self {
        self.record.citation_count = Some(count);
        self
    }

    pub fn references(mut self, count: u32) -> Self {
        self.record.reference_count = Some(count);
        self
    }

    pub fn build(self) -> RawRecord {
        self.record
    }
}

/// The tracked fields of a normalized record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    Doi,
    Title,
    Authors,
    Date,
    Abstract,
    Venue,
    Volume,
    Issue,
    Publisher,
    Url,
    Pages,
    RecordType,
    Issn,
    Language,
    Keywords,
}

impl RecordField {
    pub const ALL: [RecordField; 15] = [
        RecordField::Doi,
        RecordField::Title,
        RecordField::Authors,
        RecordField::Date,
        RecordField::Abstract,
        RecordField::Venue,
        RecordField::Volume,
        RecordField::Issue,
        RecordField::Publisher,
        RecordField::Url,
        RecordField::Pages,
        RecordField::RecordType,
        RecordField::Issn,
        RecordField::Language,
        RecordField::Keywords,
    ];

    /// Completeness weight: critical 5, important 3, everything else 1
    pub fn weight(&self) -> u32 {
        match self {
            RecordField::Doi | RecordField::Title | RecordField::Authors | RecordField::Date => 5,
            RecordField::Abstract
            | RecordField::Venue
            | RecordField::Volume
            | RecordField::Issue
            | RecordField::Publisher => 3,
            _ => 1,
        }
    }
}

/// A record mapped into the fixed schema.
///
/// Built through [`NormalizedRecordBuilder`], which computes the completeness
/// score; the score always reflects the fields the record was built with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub source: String,
    pub title: Field<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Field<String>,
    pub authors: Field<Vec<String>>,
    pub doi: Field<String>,
    pub url: Field<String>,
    pub venue: Field<String>,
    pub volume: Field<String>,
    pub issue: Field<String>,
    pub pages: Field<String>,
    pub publisher: Field<String>,
    pub issn: Field<String>,
    pub language: Field<String>,
    pub date: Field<String>,
    pub keywords: Field<Vec<String>>,
    #[serde(rename = "type")]
    pub record_type: Field<RecordType>,
    pub inline_citations: Option<InlineCitations>,
    completeness: u32,
}

impl NormalizedRecord {
    pub fn builder(source: impl Into<String>) -> NormalizedRecordBuilder {
        NormalizedRecordBuilder {
            record: NormalizedRecord {
                source: source.into(),
                title: Field::Missing,
                abstract_text: Field::Missing,
                authors: Field::Missing,
                doi: Field::Missing,
                url: Field::Missing,
                venue: Field::Missing,
                volume: Field::Missing,
                issue: Field::Missing,
                pages: Field::Missing,
                publisher: Field::Missing,
                issn: Field::Missing,
                language: Field::Missing,
                date: Field::Missing,
                keywords: Field::Missing,
                record_type: Field::Missing,
                inline_citations: None,
                completeness: 0,
            },
        }
    }

    /// Start a builder pre-populated with this record's fields
    pub fn to_builder(&self) -> NormalizedRecordBuilder {
        NormalizedRecordBuilder {
            record: self.clone(),
        }
    }

    pub fn completeness(&self) -> u32 {
        self.completeness
    }

    pub fn has(&self, field: RecordField) -> bool {
        match field {
            RecordField::Doi => self.doi.is_present(),
            RecordField::Title => self.title.is_present(),
            RecordField::Authors => self.authors.is_present(),
            RecordField::Date => self.date.is_present(),
            RecordField::Abstract => self.abstract_text.is_present(),
            RecordField::Venue => self.venue.is_present(),
            RecordField::Volume => self.volume.is_present(),
            RecordField::Issue => self.issue.is_present(),
            RecordField::Publisher => self.publisher.is_present(),
            RecordField::Url => self.url.is_present(),
            RecordField::Pages => self.pages.is_present(),
            RecordField::RecordType => self.record_type.is_present(),
            RecordField::Issn => self.issn.is_present(),
            RecordField::Language => self.language.is_present(),
            RecordField::Keywords => self.keywords.is_present(),
        }
    }

    /// Sum of field weights for present fields, +1 when volume and issue are both present
    fn score(&self) -> u32 {
        let base: u32 = RecordField::ALL
            .iter()
            .filter(|f| self.has(**f))
            .map(RecordField::weight)
            .sum();
        let bonus = u32::from(self.volume.is_present() && self.issue.is_present());
        base + bonus
    }

    pub fn publication_date(&self) -> Option<PublicationDate> {
        self.date.as_deref().and_then(PublicationDate::parse)
    }

    pub fn year(&self) -> Option<i32> {
        self.publication_date().map(|d| d.year)
    }

    /// True when the record carries no DOI, URL or title
    pub fn lacks_identifiers(&self) -> bool {
        self.doi.is_missing() && self.url.is_missing() && self.title.is_missing()
    }
}

impl AsRef<NormalizedRecord> for NormalizedRecord {
    fn as_ref(&self) -> &NormalizedRecord {
        self
    }
}

/// Builder for [`NormalizedRecord`]
#[derive(Debug, Clone)]
pub struct NormalizedRecordBuilder {
    record: NormalizedRecord,
}

macro_rules! field_setters {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name(mut self, value: Option<&str>) -> Self {
                self.record.$name = Field::text(value);
                self
            }
        )*
    };
}

macro_rules! fill_fields {
    ($target:expr, $donor:expr, $filled:ident; $($name:ident => $field:expr),* $(,)?) => {
        $(
            if $target.$name.fill_from(&$donor.$name) {
                $filled.push($field);
            }
        )*
    };
}

impl NormalizedRecordBuilder {
    field_setters!(
        title, abstract_text, doi, url, venue, volume, issue, pages, publisher, issn, language,
        date,
    );

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        let cleaned = authors
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        self.record.authors = Field::list(cleaned);
        self
    }

    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        let cleaned = keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        self.record.keywords = Field::list(cleaned);
        self
    }

    pub fn record_type(mut self, record_type: Option<RecordType>) -> Self {
        self.record.record_type = record_type.into();
        self
    }

    pub fn inline_citations(mut self, inline: Option<InlineCitations>) -> Self {
        self.record.inline_citations = inline;
        self
    }

    /// Fill every missing field from `donor`, never overwriting present values.
    ///
    /// Returns the fields that were filled.
    pub fn fill_missing_from(&mut self, donor: &NormalizedRecord) -> Vec<RecordField> {
        let mut filled = Vec::new();
        let target = &mut self.record;
        fill_fields!(target, donor, filled;
            doi => RecordField::Doi,
            title => RecordField::Title,
            authors => RecordField::Authors,
            date => RecordField::Date,
            abstract_text => RecordField::Abstract,
            venue => RecordField::Venue,
            volume => RecordField::Volume,
            issue => RecordField::Issue,
            publisher => RecordField::Publisher,
            url => RecordField::Url,
            pages => RecordField::Pages,
            record_type => RecordField::RecordType,
            issn => RecordField::Issn,
            language => RecordField::Language,
            keywords => RecordField::Keywords,
        );
        if target.inline_citations.is_none() {
            target.inline_citations = donor.inline_citations;
        }
        filled
    }

    pub fn build(mut self) -> NormalizedRecord {
        self.record.completeness = self.record.score();
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_from_tag() {
        assert_eq!(RecordType::from_tag("journal-article"), Some(RecordType::Journal));
        assert_eq!(RecordType::from_tag("JournalArticle"), Some(RecordType::Journal));
        assert_eq!(
            RecordType::from_tag("proceedings-article"),
            Some(RecordType::Conference)
        );
        assert_eq!(RecordType::from_tag("posted-content"), Some(RecordType::Preprint));
        assert_eq!(
            RecordType::from_tag("Erratum"),
            Some(RecordType::Other("erratum".to_string()))
        );
        assert_eq!(RecordType::from_tag("  "), None);
    }

    #[test]
    fn test_record_type_serde() {
        let parsed: Vec<RecordType> =
            serde_json::from_str(r#"["journal", "book_chapter", "poster"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                RecordType::Journal,
                RecordType::BookChapter,
                RecordType::Other("poster".to_string())
            ]
        );
    }

    #[test]
    fn test_publication_date_formats() {
        let full = PublicationDate::parse("2021-03-15").unwrap();
        assert_eq!((full.year, full.month, full.day), (2021, Some(3), Some(15)));

        let ts = PublicationDate::parse("2020-06-01T12:00:00Z").unwrap();
        assert_eq!((ts.year, ts.month), (2020, Some(6)));

        let pubmed = PublicationDate::parse("2019 Nov 04").unwrap();
        assert_eq!((pubmed.year, pubmed.month, pubmed.day), (2019, Some(11), Some(4)));

        let year_month = PublicationDate::parse("2018-07").unwrap();
        assert_eq!((year_month.year, year_month.month), (2018, Some(7)));

        let worded = PublicationDate::parse("Spring issue, March 2017").unwrap();
        assert_eq!((worded.year, worded.month), (2017, Some(3)));

        let year = PublicationDate::parse("2015").unwrap();
        assert_eq!((year.year, year.month), (2015, None));

        assert!(PublicationDate::parse("unknown").is_none());
        assert!(PublicationDate::parse("").is_none());
    }

    #[test]
    fn test_months_until() {
        let now = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let date = PublicationDate::parse("2022-06-15").unwrap();
        assert_eq!(date.months_until(now), 24);

        let date = PublicationDate::parse("2022-06-20").unwrap();
        assert_eq!(date.months_until(now), 23);

        let year_only = PublicationDate::parse("2024").unwrap();
        assert_eq!(year_only.months_until(now), 5);

        let future = PublicationDate::parse("2025-01-01").unwrap();
        assert!(future.months_until(now) < 0);
    }

    #[test]
    fn test_raw_record_builder() {
        let raw = RawRecord::builder("semantic")
            .title("Test Paper")
            .doi("10.1234/test")
            .citations(12)
            .build();

        assert_eq!(raw.source, "semantic");
        assert_eq!(raw.title.as_deref(), Some("Test Paper"));
        assert_eq!(
            raw.inline_citations(),
            Some(InlineCitations {
                citation_count: 12,
                reference_count: None
            })
        );
    }

    #[test]
    fn test_raw_record_deserialize() {
        let raw: RawRecord = serde_json::from_str(
            r#"{"source": "crossref", "title": "A", "abstract": "B", "type": "journal-article"}"#,
        )
        .unwrap();
        assert_eq!(raw.abstract_text.as_deref(), Some("B"));
        assert_eq!(raw.record_type.as_deref(), Some("journal-article"));
        assert!(raw.doi.is_none());
    }

    #[test]
    fn test_completeness_weights() {
        let record = NormalizedRecord::builder("test")
            .doi(Some("10.1/x"))
            .title(Some("Foo"))
            .build();
        assert_eq!(record.completeness(), 10);

        let record = record
            .to_builder()
            .volume(Some("4"))
            .issue(Some("2"))
            .url(Some("https://example.org/x"))
            .build();
        // 10 + volume 3 + issue 3 + bonus 1 + url 1
        assert_eq!(record.completeness(), 18);
    }

    #[test]
    fn test_completeness_is_monotonic() {
        let base = NormalizedRecord::builder("test").title(Some("Foo")).build();
        let mut previous = base.completeness();
        let mut builder = base.to_builder();

        let steps: Vec<fn(NormalizedRecordBuilder) -> NormalizedRecordBuilder> = vec![
            |b| b.issue(Some("3")),
            |b| b.pages(Some("1-10")),
            |b| b.volume(Some("12")),
            |b| b.authors(vec!["Ada Lovelace".to_string()]),
            |b| b.record_type(Some(RecordType::Journal)),
            |b| b.keywords(vec!["ml".to_string()]),
            |b| b.abstract_text(Some("Text")),
        ];

        for step in steps {
            builder = step(builder);
            let score = builder.clone().build().completeness();
            assert!(score >= previous, "score dropped from {previous} to {score}");
            previous = score;
        }
    }

    #[test]
    fn test_blank_fields_do_not_score() {
        let record = NormalizedRecord::builder("test")
            .title(Some("  "))
            .abstract_text(Some(""))
            .authors(vec!["  ".to_string()])
            .build();
        assert_eq!(record.completeness(), 0);
        assert!(record.lacks_identifiers());
    }

    #[test]
    fn test_fill_missing_from() {
        let canonical = NormalizedRecord::builder("a")
            .title(Some("Kept Title"))
            .build();
        let donor = NormalizedRecord::builder("b")
            .title(Some("Other Title"))
            .venue(Some("Nature"))
            .build();

        let mut builder = canonical.to_builder();
        let filled = builder.fill_missing_from(&donor);
        let merged = builder.build();

        assert_eq!(filled, vec![RecordField::Venue]);
        assert_eq!(merged.title.as_deref(), Some("Kept Title"));
        assert_eq!(merged.venue.as_deref(), Some("Nature"));
        assert_eq!(merged.source, "a");
    }
}
