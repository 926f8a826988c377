//! Page-range sources from retrieved document chunks.
//!
//! Chunk text carries page markers of two shapes, `<<12>>` and
//! `--- Page 12 ---`.  A chunk with at least one marker becomes a source
//! spanning its lowest to highest page.

use std::sync::LazyLock;

use regex::Regex;

use fr_domain::citation::SourceInfo;

static ANGLE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<<(\d+)>>").expect("valid page marker regex"));
static PAGE_BANNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)---\s*page\s+(\d+)\s*---").expect("valid page banner regex")
});

/// Every page number mentioned in `text`, in order of appearance per
/// marker shape.  Numbers that overflow are ignored.
pub fn extract_pages(text: &str) -> Vec<u32> {
    let mut pages = Vec::new();
    for re in [&*ANGLE_MARKER, &*PAGE_BANNER] {
        pages.extend(
            re.captures_iter(text)
                .filter_map(|c| c.get(1))
                .filter_map(|m| m.as_str().parse::<u32>().ok()),
        );
    }
    pages
}

/// Build a source for one chunk, or `None` when it names no page.
pub fn source_for_chunk(
    document_name: &str,
    doc_id: &str,
    chunk: &str,
    score: Option<f64>,
) -> Option<SourceInfo> {
    let pages = extract_pages(chunk);
    let page_start = *pages.iter().min()?;
    let page_end = *pages.iter().max()?;
    Some(SourceInfo {
        document_name: document_name.to_owned(),
        doc_id: doc_id.to_owned(),
        page_start,
        page_end,
        relevance_score: score.unwrap_or(0.0),
    })
}

/// Sort by descending relevance and keep the best `max`.
pub fn rank_sources(mut sources: Vec<SourceInfo>, max: usize) -> Vec<SourceInfo> {
    sources.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    sources.truncate(max);
    sources
}
