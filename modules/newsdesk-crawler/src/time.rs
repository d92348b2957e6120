//! Publish-time extraction. Deterministic rules only, tried in priority
//! order: JSON-LD, meta tags, the URL path, then a multilingual keyword
//! scan over the body text. Every result is normalized to UTC.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use scraper::{Html, Selector};

/// JSON-LD fields that can carry a publication instant, in check order.
const JSON_LD_TIME_FIELDS: &[&str] = &[
    "datePublished",
    "dateModified",
    "dateCreated",
    "publishDate",
    "uploadDate",
    "publicationDate",
    "publishedDate",
    "date",
];

/// Meta tag selectors in priority order: Open Graph, Schema.org itemprops,
/// plain meta names, Dublin Core, Twitter.
const META_SELECTORS: &[&str] = &[
    r#"meta[property="article:published_time"]"#,
    r#"meta[property="article:modified_time"]"#,
    r#"meta[property="og:published_time"]"#,
    r#"meta[property="og:updated_time"]"#,
    r#"meta[itemprop="datePublished"]"#,
    r#"meta[itemprop="dateModified"]"#,
    r#"meta[name="pubdate"]"#,
    r#"meta[name="publish_date"]"#,
    r#"meta[name="date"]"#,
    r#"meta[name="article:published"]"#,
    r#"meta[name="article:published_time"]"#,
    r#"meta[name="DC.date"]"#,
    r#"meta[name="DC.date.created"]"#,
    r#"meta[name="DC.date.issued"]"#,
    r#"meta[name="twitter:created_at"]"#,
];

/// Publication-date keywords per language, used to locate the candidate
/// element in the body text scan.
const DATE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "zh",
        &[
            "发布时间",
            "发布日期",
            "发表时间",
            "发表日期",
            "上传时间",
            "更新时间",
        ],
    ),
    (
        "ru",
        &[
            "Опубликовано",
            "опубликовано",
            "дата публикации",
            "обновлено",
            "Добавлено",
            "Создано",
        ],
    ),
    (
        "kk",
        &[
            "Жарияланған",
            "Жариялану уақыты",
            "жарияланды",
            "жаңартылды",
            "Қосылған",
            "Жасалған",
        ],
    ),
    (
        "en",
        &[
            "Published",
            "Publish date",
            "Date published",
            "Updated",
            "Last updated",
            "Posted",
        ],
    ),
];

/// Month names for locales chrono cannot parse: Russian and Kazakh, plus
/// English for uniformity. Genitive and nominative forms both included.
const MONTH_NAMES: &[(&str, u32)] = &[
    // Russian (genitive then nominative)
    ("января", 1), ("февраля", 2), ("марта", 3), ("апреля", 4), ("мая", 5), ("июня", 6),
    ("июля", 7), ("августа", 8), ("сентября", 9), ("октября", 10), ("ноября", 11), ("декабря", 12),
    ("январь", 1), ("февраль", 2), ("март", 3), ("апрель", 4), ("май", 5), ("июнь", 6),
    ("июль", 7), ("август", 8), ("сентябрь", 9), ("октябрь", 10), ("ноябрь", 11), ("декабрь", 12),
    // Kazakh
    ("қаңтар", 1), ("ақпан", 2), ("наурыз", 3), ("сәуір", 4), ("мамыр", 5), ("маусым", 6),
    ("шілде", 7), ("тамыз", 8), ("қыркүйек", 9), ("қазан", 10), ("қараша", 11), ("желтоқсан", 12),
    // English
    ("january", 1), ("february", 2), ("march", 3), ("april", 4), ("may", 5), ("june", 6),
    ("july", 7), ("august", 8), ("september", 9), ("october", 10), ("november", 11), ("december", 12),
];

static ISO_DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}").expect("valid regex")
});
static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("valid regex"));
static NATURAL_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // "20 мая 2024", "14 шілде 2023", "July 14, 2023"
    Regex::new(r"(?i)(\d{1,2})\s+([\p{L}]+),?\s+(\d{4})|([\p{L}]+)\s+(\d{1,2}),?\s+(\d{4})")
        .expect("valid regex")
});

/// URL path date patterns. Year bounds are validated after matching.
static URL_DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"/(\d{4})[/-](\d{2})[/-](\d{2})/",
        r"/(\d{4})(\d{2})(\d{2})/",
        r"/(\d{4})[/-](\d{2})/",
        r"/(\d{2})[/-](\d{2})[/-](\d{4})/",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

pub struct TimeExtractor;

impl TimeExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract a publish time, trying each method in priority order.
    pub fn extract_publish_time(&self, html: &str, url: &str) -> Option<DateTime<Utc>> {
        let doc = Html::parse_document(html);

        if let Some(dt) = self.from_json_ld(&doc) {
            return Some(dt);
        }
        if let Some(dt) = self.from_meta_tags(&doc) {
            return Some(dt);
        }
        if let Some(dt) = self.from_url(url) {
            return Some(dt);
        }
        self.from_body_text(&doc)
    }

    fn from_json_ld(&self, doc: &Html) -> Option<DateTime<Utc>> {
        let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
        for script in doc.select(&selector) {
            let raw = script.text().collect::<String>();
            let Ok(data) = serde_json::from_str::<serde_json::Value>(&raw) else {
                continue;
            };
            let mut fields = Vec::new();
            collect_json_ld_times(&data, 5, &mut fields);
            for value in fields {
                if let Some(dt) = parse_datetime_str(&value) {
                    return Some(dt);
                }
            }
        }
        None
    }

    fn from_meta_tags(&self, doc: &Html) -> Option<DateTime<Utc>> {
        for selector_str in META_SELECTORS {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            if let Some(meta) = doc.select(&selector).next() {
                if let Some(content) = meta.value().attr("content") {
                    if let Some(dt) = parse_datetime_str(content) {
                        return Some(dt);
                    }
                }
            }
        }
        None
    }

    /// Date from the URL path. Years outside (2000, 2100) are rejected so
    /// article ids do not masquerade as dates.
    pub fn from_url(&self, url: &str) -> Option<DateTime<Utc>> {
        let path = url::Url::parse(url).map(|u| u.path().to_string()).unwrap_or_else(|_| url.to_string());

        for re in URL_DATE_PATTERNS.iter() {
            let Some(caps) = re.captures(&path) else {
                continue;
            };
            let groups: Vec<&str> = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect();
            let parsed = match groups.as_slice() {
                [a, b, c] => {
                    // /DD/MM/YYYY/ has the year in the last group
                    let (y, m, d) = if a.len() == 2 && c.len() == 4 {
                        (c, b, a)
                    } else {
                        (a, b, c)
                    };
                    make_date(y, m, d)
                }
                [y, m] => make_date(y, m, "1"),
                _ => None,
            };
            if parsed.is_some() {
                return parsed;
            }
        }
        None
    }

    fn from_body_text(&self, doc: &Html) -> Option<DateTime<Utc>> {
        let candidate_selector = Selector::parse("time, span, div, p, small, td").ok()?;

        // <time datetime="..."> wins when present.
        if let Ok(time_selector) = Selector::parse("time[datetime]") {
            for el in doc.select(&time_selector) {
                if let Some(dt) = el.value().attr("datetime").and_then(parse_datetime_str) {
                    return Some(dt);
                }
            }
        }

        for (_lang, keywords) in DATE_KEYWORDS {
            for keyword in *keywords {
                for el in doc.select(&candidate_selector) {
                    let text: String = el.text().collect::<Vec<_>>().join(" ");
                    if !text.contains(keyword) {
                        continue;
                    }
                    // Keyword labels sit next to the date; keep the scan local.
                    if text.len() > 400 {
                        continue;
                    }
                    if let Some(dt) = extract_date_from_text(&text) {
                        return Some(dt);
                    }
                }
            }
        }
        None
    }
}

impl Default for TimeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively collect candidate time strings from JSON-LD data.
fn collect_json_ld_times(data: &serde_json::Value, depth: u32, out: &mut Vec<String>) {
    if depth == 0 {
        return;
    }
    match data {
        serde_json::Value::Object(map) => {
            for field in JSON_LD_TIME_FIELDS {
                if let Some(serde_json::Value::String(s)) = map.get(*field) {
                    out.push(s.clone());
                }
            }
            for value in map.values() {
                collect_json_ld_times(value, depth - 1, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_ld_times(item, depth - 1, out);
            }
        }
        _ => {}
    }
}

/// Parse a datetime string in any of the common site formats.
/// Naive values are assumed UTC; a bare `Z` suffix means UTC.
pub fn parse_datetime_str(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // RFC 3339 / ISO with offset, normalizing the bare-Z form.
    let normalized = if let Some(stripped) = trimmed.strip_suffix('Z') {
        format!("{stripped}+00:00")
    } else {
        trimmed.to_string()
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }

    // Naive forms, assumed UTC.
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}

/// Pull a date out of free text: ISO patterns first, then natural-language
/// forms with the multilingual month table.
pub fn extract_date_from_text(text: &str) -> Option<DateTime<Utc>> {
    if let Some(m) = ISO_DATETIME_RE.find(text) {
        if let Some(dt) = parse_datetime_str(&m.as_str().replace(' ', "T")) {
            return Some(dt);
        }
    }
    if let Some(m) = ISO_DATE_RE.find(text) {
        if let Some(dt) = parse_datetime_str(m.as_str()) {
            return Some(dt);
        }
    }

    let caps = NATURAL_DATE_RE.captures(text)?;
    let (day, month_name, year) = if caps.get(1).is_some() {
        (caps.get(1)?.as_str(), caps.get(2)?.as_str(), caps.get(3)?.as_str())
    } else {
        (caps.get(5)?.as_str(), caps.get(4)?.as_str(), caps.get(6)?.as_str())
    };
    let month = lookup_month(month_name)?;
    let day: u32 = day.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn lookup_month(name: &str) -> Option<u32> {
    let lowered = name.to_lowercase();
    MONTH_NAMES
        .iter()
        .find(|(n, _)| *n == lowered)
        .map(|(_, m)| *m)
}

fn make_date(y: &str, m: &str, d: &str) -> Option<DateTime<Utc>> {
    let year: i32 = y.parse().ok()?;
    let month: u32 = m.parse().ok()?;
    let day: u32 = d.parse().ok()?;
    if year <= 2000 || year >= 2100 {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn og_published_time_is_extracted_as_utc() {
        let html = r#"<html><head>
            <meta property="article:published_time" content="2024-05-20T08:30:00Z">
        </head><body></body></html>"#;
        let dt = TimeExtractor::new()
            .extract_publish_time(html, "https://example.com/story")
            .unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 5, 20, 8, 30, 0).unwrap());
    }

    #[test]
    fn url_date_extraction() {
        let extractor = TimeExtractor::new();
        let dt = extractor
            .from_url("https://news.example.com/2023/07/14/story")
            .unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 7, 14, 0, 0, 0).unwrap());

        let dt = extractor
            .from_url("https://news.example.com/2023-07-14/story")
            .unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 7, 14, 0, 0, 0).unwrap());

        let dt = extractor
            .from_url("https://news.example.com/20230714/story")
            .unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 7, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn url_date_day_month_year_order() {
        let dt = TimeExtractor::new()
            .from_url("https://example.ru/14/07/2023/story")
            .unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 7, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn url_year_bounds_rejected() {
        let extractor = TimeExtractor::new();
        assert!(extractor.from_url("https://example.com/1999/07/14/a").is_none());
        assert!(extractor.from_url("https://example.com/2100/07/14/a").is_none());
    }

    #[test]
    fn json_ld_takes_priority_over_meta() {
        let html = r#"<html><head>
            <script type="application/ld+json">
              {"@type":"NewsArticle","datePublished":"2024-01-02T10:00:00+00:00"}
            </script>
            <meta property="article:published_time" content="2024-03-04T10:00:00Z">
        </head><body></body></html>"#;
        let dt = TimeExtractor::new()
            .extract_publish_time(html, "https://example.com/a")
            .unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap());
    }

    #[test]
    fn json_ld_nested_graph() {
        let html = r#"<html><head>
            <script type="application/ld+json">
              {"@graph":[{"@type":"WebPage"},{"@type":"Article","datePublished":"2024-06-01"}]}
            </script>
        </head><body></body></html>"#;
        let dt = TimeExtractor::new()
            .extract_publish_time(html, "https://example.com/a")
            .unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn naive_datetime_assumed_utc() {
        let dt = parse_datetime_str("2024-05-20T08:30:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 5, 20, 8, 30, 0).unwrap());
    }

    #[test]
    fn offset_datetime_converted_to_utc() {
        let dt = parse_datetime_str("2024-05-20T10:30:00+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 5, 20, 8, 30, 0).unwrap());
    }

    #[test]
    fn dotted_and_slashed_dates_parse() {
        assert_eq!(
            parse_datetime_str("14.07.2023").unwrap(),
            Utc.with_ymd_and_hms(2023, 7, 14, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_datetime_str("2023/07/14").unwrap(),
            Utc.with_ymd_and_hms(2023, 7, 14, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn body_text_keyword_scan_russian() {
        let html = r#"<html><body>
            <div class="content">Some article text.</div>
            <span>Опубликовано: 2023-11-05 14:30:00</span>
        </body></html>"#;
        let dt = TimeExtractor::new()
            .extract_publish_time(html, "https://example.ru/story")
            .unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 11, 5, 14, 30, 0).unwrap());
    }

    #[test]
    fn natural_language_russian_month() {
        let dt = extract_date_from_text("Опубликовано 20 мая 2024").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap());
    }

    #[test]
    fn natural_language_kazakh_month() {
        let dt = extract_date_from_text("Жарияланған 14 шілде 2023").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 7, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn natural_language_english_month_first() {
        let dt = extract_date_from_text("Published July 14, 2023").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 7, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn no_date_yields_none() {
        let html = "<html><body><p>Nothing dated here.</p></body></html>";
        assert!(TimeExtractor::new()
            .extract_publish_time(html, "https://example.com/about")
            .is_none());
    }
}
