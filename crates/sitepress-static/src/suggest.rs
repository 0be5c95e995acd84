//! Internal link suggestions for a built site.
//!
//! A page is suggested as a link source for another page when its text
//! mentions terms from the other page's title or keywords and it does not
//! link there yet. Matching is plain word matching; suggestions are meant to
//! be reviewed by hand.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;

use crate::audit::{load_pages, meta, selector, title, url_path, AuditConfig, AuditError};

/// Shortest word treated as a topic term.
const MIN_TERM_LENGTH: usize = 3;

/// Characters of context kept on each side of a match.
const SNIPPET_RADIUS: usize = 60;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{L}[\p{L}-]*\p{L}").expect("valid word pattern"));

static TEXT: LazyLock<Selector> = LazyLock::new(|| {
    selector("p, h1, h2, h3, h4, h5, h6, li, td, th, blockquote, figcaption")
});

/// Words too common to say anything about a page's topic.
const STOPWORDS: &[&str] = &[
    // Portuguese
    "ainda", "algum", "alguma", "algumas", "alguns", "aquela", "aquele", "aqueles", "aqui",
    "assim", "até", "cada", "com", "como", "das", "dela", "dele", "deles", "depois", "desta",
    "deste", "dos", "ela", "elas", "ele", "eles", "entre", "essa", "essas", "esse", "esses",
    "esta", "está", "estão", "estas", "este", "estes", "foi", "foram", "isso", "isto", "mais",
    "mas", "mesmo", "meu", "minha", "muito", "nas", "nem", "nos", "nossa", "nosso", "num",
    "numa", "onde", "outra", "outro", "para", "pela", "pelas", "pelo", "pelos", "pode", "porque",
    "quando", "que", "qual", "quem", "seja", "sem", "ser", "seu", "seus", "sobre", "sua", "suas",
    "também", "tem", "têm", "toda", "todas", "todo", "todos", "uma", "umas", "uns",
    // English
    "about", "and", "are", "but", "for", "from", "has", "have", "into", "its", "not", "our",
    "that", "the", "their", "this", "was", "were", "with", "you", "your",
];

/// A page that mentions another page's topic without linking to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSuggestion {
    /// Page that should receive the link
    pub target: String,

    /// Title of the target page
    pub target_title: String,

    /// Page whose text mentions the target's topic
    pub source: String,

    /// Topic terms found in the source text, sorted
    pub terms: Vec<String>,

    /// Text around the first match
    pub snippet: String,

    /// Whether no other page links to the target yet
    pub orphan: bool,
}

/// What one page is about and where it links.
struct Topic {
    relative: PathBuf,
    title: String,
    terms: Vec<(String, Regex)>,
    text: String,
    links: BTreeSet<PathBuf>,
}

/// Suggest internal links between the pages under `output_dir`.
///
/// Suggestions are grouped by target page (in path order); within a target,
/// sources matching more terms come first.
pub fn suggest_links(
    output_dir: &Path,
    config: &AuditConfig,
) -> Result<Vec<LinkSuggestion>, AuditError> {
    let pages = load_pages(output_dir)?;

    let stopwords: BTreeSet<String> = STOPWORDS
        .iter()
        .map(|w| w.to_string())
        .chain(config.stopwords.iter().map(|w| w.to_lowercase()))
        .collect();

    let topics: Vec<Topic> = pages
        .iter()
        .map(|page| {
            let title = title(&page.doc)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| url_path(&page.relative));
            let keywords = meta(&page.doc, "keywords").flatten().unwrap_or_default();
            let text = page
                .doc
                .select(&TEXT)
                .flat_map(|el| el.text())
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();

            Topic {
                relative: page.relative.clone(),
                terms: topic_terms(&title, keywords, &stopwords),
                title,
                text,
                links: page.linked_pages(output_dir),
            }
        })
        .collect();

    let inbound: BTreeSet<&PathBuf> = topics
        .iter()
        .flat_map(|t| t.links.iter().filter(move |l| **l != t.relative))
        .collect();

    let mut suggestions = Vec::new();

    for target in &topics {
        if target.terms.is_empty() {
            continue;
        }

        let orphan =
            target.relative != Path::new("index.html") && !inbound.contains(&target.relative);
        let mut found = Vec::new();

        for source in &topics {
            if source.relative == target.relative || source.links.contains(&target.relative) {
                continue;
            }

            let matches: Vec<(&str, regex::Match)> = target
                .terms
                .iter()
                .filter_map(|(term, pattern)| pattern.find(&source.text).map(|m| (term.as_str(), m)))
                .collect();

            let Some((_, first)) = matches.first() else {
                continue;
            };

            let mut terms: Vec<String> = matches.iter().map(|(t, _)| t.to_string()).collect();
            terms.sort();

            found.push(LinkSuggestion {
                target: url_path(&target.relative),
                target_title: target.title.clone(),
                source: url_path(&source.relative),
                snippet: snippet(&source.text, first.start(), first.end()),
                terms,
                orphan,
            });
        }

        found.sort_by(|a, b| {
            b.terms
                .len()
                .cmp(&a.terms.len())
                .then_with(|| a.source.cmp(&b.source))
        });
        suggestions.extend(found);
    }

    tracing::debug!("{} link suggestions", suggestions.len());

    Ok(suggestions)
}

/// Words of the title plus comma-separated keywords, each with a whole-word pattern.
fn topic_terms(title: &str, keywords: &str, stopwords: &BTreeSet<String>) -> Vec<(String, Regex)> {
    let title = title.to_lowercase();
    let from_title = WORD.find_iter(&title).map(|m| m.as_str().to_string());
    let from_keywords = keywords.split(',').map(|k| k.trim().to_lowercase());

    from_title
        .chain(from_keywords)
        .filter(|term| term.chars().count() >= MIN_TERM_LENGTH && !stopwords.contains(term))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter_map(|term| {
            let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(&term))).ok()?;
            Some((term, pattern))
        })
        .collect()
}

/// Whitespace-collapsed text around `start..end`.
fn snippet(text: &str, start: usize, end: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(SNIPPET_RADIUS - 1)
        .map_or(0, |(i, _)| i);
    let to = text[end..]
        .char_indices()
        .nth(SNIPPET_RADIUS)
        .map_or(text.len(), |(i, _)| end + i);

    format!(
        "...{}...",
        text[from..to].split_whitespace().collect::<Vec<_>>().join(" ")
    )
}
