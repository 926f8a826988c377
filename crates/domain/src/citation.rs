use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Citations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A citation placeholder produced when a message completes.
///
/// `citation_number` is 1-based and follows the order in which the
/// placeholders appear in the final message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationStub {
    pub citation_number: u32,
    pub file_id: String,
    pub quote: String,
    /// The placeholder text the provider put in the message, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub marker: String,
}

impl CitationStub {
    pub fn new(citation_number: u32, file_id: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            citation_number,
            file_id: file_id.into(),
            quote: quote.into(),
            marker: String::new(),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// The short display form used in `update` frames: the placeholder
    /// text when there is one, else the quote, e.g. `"[1] 【4:0†source】"`.
    pub fn label(&self) -> String {
        let shown = if self.marker.trim().is_empty() { &self.quote } else { &self.marker };
        format!("[{}] {}", self.citation_number, shown)
    }
}

/// A citation stub plus whatever enrichment could be attached to it.
///
/// The enrichment fields are all-or-nothing in practice: a stub whose file
/// lookup failed keeps every optional field unset.  Unset fields are
/// omitted on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationRecord {
    pub citation_number: u32,
    pub file_id: String,
    pub quote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_chunk_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl CitationRecord {
    /// True once any enrichment field has been attached.
    pub fn is_enriched(&self) -> bool {
        self.file_name.is_some() || self.full_chunk_content.is_some() || self.relevance_score.is_some()
    }

    pub fn label(&self) -> String {
        format!("[{}] {}", self.citation_number, self.quote)
    }
}

impl From<CitationStub> for CitationRecord {
    fn from(stub: CitationStub) -> Self {
        Self {
            citation_number: stub.citation_number,
            file_id: stub.file_id,
            quote: stub.quote,
            file_name: None,
            full_chunk_content: None,
            relevance_score: None,
        }
    }
}

impl From<&CitationStub> for CitationRecord {
    fn from(stub: &CitationStub) -> Self {
        stub.clone().into()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sources
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A document page range that contributed to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub document_name: String,
    pub doc_id: String,
    pub page_start: u32,
    pub page_end: u32,
    #[serde(default)]
    pub relevance_score: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
