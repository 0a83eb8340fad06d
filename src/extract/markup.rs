//! Raw-markup strategy: headline from `h1`, body from article paragraph
//! selectors, date from `time`/`itemprop` attributes, authors from bylines.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::{ExtractionStrategy, FetchedPage, PartialRecord, StrategyKind};
use crate::dates::parse_publish_date;
use crate::error::StrategyError;
use crate::text::{clean_text, split_authors};

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().map(|s| Selector::parse(s).unwrap()).collect()
}

static HEADLINE: Lazy<Vec<Selector>> =
    Lazy::new(|| selectors(&["article h1", "h1[itemprop=headline]", "h1"]));

/// Tried in order; the first selector matching at least two paragraphs wins.
static BODY: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "[itemprop=articleBody] p",
        "article p",
        ".article-body p",
        ".story-content p",
        ".artText p",
        ".content p",
        "main p",
    ])
});

static DATE: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "time[datetime]",
        "[itemprop=datePublished]",
        ".publish-date",
        ".published-date",
        ".article-date",
    ])
});

static BYLINE: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "[rel=author]",
        "[itemprop=author] [itemprop=name]",
        "[itemprop=author]",
        ".byline",
        ".author-name",
        ".author",
    ])
});

static HTML_ROOT: Lazy<Selector> = Lazy::new(|| Selector::parse("html").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupStrategy;

impl ExtractionStrategy for MarkupStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Markup
    }

    fn extract(&self, page: &FetchedPage) -> Result<PartialRecord, StrategyError> {
        if page.html.trim().is_empty() {
            return Err(StrategyError::EmptyDocument);
        }
        let document = Html::parse_document(&page.html);

        Ok(PartialRecord {
            headline: first_text(&document, &HEADLINE),
            body_text: body(&document),
            authors: authors(&document),
            publish_date: publish_date(&document),
            language: document
                .select(&HTML_ROOT)
                .next()
                .and_then(|html| html.value().attr("lang"))
                .map(super::metadata::language_code)
                .filter(|l| !l.is_empty()),
            ..PartialRecord::default()
        })
    }
}

fn element_text(el: &ElementRef) -> String {
    clean_text(&el.text().collect::<String>())
}

fn first_text(document: &Html, list: &[Selector]) -> Option<String> {
    list.iter().find_map(|sel| {
        document
            .select(sel)
            .map(|el| element_text(&el))
            .find(|t| !t.is_empty())
    })
}

fn body(document: &Html) -> Option<String> {
    BODY.iter().find_map(|sel| {
        let paragraphs: Vec<String> = document
            .select(sel)
            .map(|p| element_text(&p))
            .filter(|t| !t.is_empty())
            .collect();
        (paragraphs.len() >= 2).then(|| paragraphs.join("\n\n"))
    })
}

fn publish_date(document: &Html) -> Option<chrono::NaiveDateTime> {
    DATE.iter()
        .flat_map(|sel| document.select(sel))
        .find_map(|el| {
            let v = el.value();
            v.attr("datetime")
                .or_else(|| v.attr("content"))
                .and_then(parse_publish_date)
                .or_else(|| parse_publish_date(&element_text(&el)))
        })
}

fn authors(document: &Html) -> Vec<String> {
    BYLINE
        .iter()
        .find_map(|sel| {
            let names: Vec<String> = document
                .select(sel)
                .flat_map(|el| {
                    let raw = el
                        .value()
                        .attr("content")
                        .map(str::to_string)
                        .unwrap_or_else(|| element_text(&el));
                    split_authors(&raw)
                })
                .collect();
            (!names.is_empty()).then_some(names)
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn run(html: &str) -> PartialRecord {
        MarkupStrategy
            .extract(&FetchedPage {
                url: "https://example.com/a".to_string(),
                html: html.to_string(),
            })
            .unwrap()
    }

    #[test]
    fn test_extracts_markup_fields() {
        let html = r#"<html lang="en"><body>
          <h1>Site logo text</h1>
          <article>
            <h1>  Auto sales hit record in April </h1>
            <div class="byline">By <a rel="author" href="/author/rahul">Rahul Mehta</a></div>
            <time datetime="2025-05-02T08:00:00Z">2 May 2025</time>
            <p>Passenger vehicle sales rose 12 per cent.</p>
            <p>Two-wheeler sales also grew.</p>
          </article>
        </body></html>"#;
        let partial = run(html);
        assert_eq!(partial.headline.as_deref(), Some("Auto sales hit record in April"));
        assert_eq!(partial.authors, vec!["Rahul Mehta"]);
        assert_eq!(
            partial.publish_date,
            NaiveDate::from_ymd_opt(2025, 5, 2).unwrap().and_hms_opt(8, 0, 0)
        );
        assert_eq!(
            partial.body_text.as_deref(),
            Some("Passenger vehicle sales rose 12 per cent.\n\nTwo-wheeler sales also grew.")
        );
        assert_eq!(partial.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_single_paragraph_is_not_a_body() {
        let partial = run("<html><body><article><p>Only one.</p></article></body></html>");
        assert_eq!(partial.body_text, None);
    }

    #[test]
    fn test_date_from_element_text() {
        let partial = run(r#"<html><body><span class="publish-date">2025-05-02 14:10</span></body></html>"#);
        assert_eq!(
            partial.publish_date,
            NaiveDate::from_ymd_opt(2025, 5, 2).unwrap().and_hms_opt(14, 10, 0)
        );
    }
}
