//! Local markdown knowledge collections exposed to the agent as tools.
//!
//! Each immediate subdirectory of the knowledge root is a collection;
//! dropping a folder of `.md` files makes its content discoverable via
//! the list/search/read operations. The gateway only advertises these
//! tools at launch; the agent runtime invokes them.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::runtime::ToolDefinition;

const MARKDOWN_SUFFIXES: [&str; 2] = ["md", "markdown"];
const DEFAULT_TOP_K: usize = 5;
const SNIPPET_SIZE: usize = 200;

#[derive(Debug, Clone)]
struct KnowledgeDoc {
    collection: String,
    path: PathBuf,
    title: String,
    content: String,
}

/// Read-only view over the knowledge root.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    root: PathBuf,
}

impl KnowledgeBase {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Definitions for the allow-listed knowledge tools.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "list_knowledge_collections".to_string(),
                description: "List available knowledge collections and their document counts."
                    .to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            },
            ToolDefinition {
                name: "search_knowledge".to_string(),
                description: "Search knowledge markdown files for a query.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "collection": {"type": "string"},
                        "top_k": {"type": "integer"}
                    },
                    "required": ["query"]
                }),
            },
            ToolDefinition {
                name: "read_knowledge_document".to_string(),
                description: "Return the full text of a knowledge document.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "collection": {"type": "string"},
                        "document": {"type": "string"}
                    },
                    "required": ["collection", "document"]
                }),
            },
        ]
    }

    /// Collections and their document counts.
    pub fn list_collections(&self) -> serde_json::Value {
        let collections: Vec<serde_json::Value> = self
            .iter_collections()
            .into_iter()
            .map(|(name, path)| {
                let documents = count_markdown_files(&path);
                json!({"name": name, "path": path.display().to_string(), "documents": documents})
            })
            .collect();
        json!({
            "knowledge_root": self.root.display().to_string(),
            "collections": collections,
        })
    }

    /// Rank documents for `query` and return the top matches with
    /// snippets centered on the first occurrence.
    pub fn search(
        &self,
        query: &str,
        collection: Option<&str>,
        top_k: Option<usize>,
    ) -> serde_json::Value {
        if query.trim().is_empty() {
            return json!({"error": "Query must be a non-empty string."});
        }
        let docs = self.load_documents(collection);
        if let Some(collection) = collection {
            if !docs.iter().any(|doc| doc.collection == collection) {
                return json!({"error": format!("Collection '{collection}' not found.")});
            }
        }

        let mut scored: Vec<(f64, &KnowledgeDoc)> = docs
            .iter()
            .filter_map(|doc| {
                let score = score_document(&doc.content, query);
                (score > 0.0).then_some((score, doc))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let top_k = top_k.unwrap_or(DEFAULT_TOP_K).max(1);
        let results: Vec<serde_json::Value> = scored
            .iter()
            .take(top_k)
            .map(|(score, doc)| {
                json!({
                    "collection": doc.collection,
                    "document": doc.path.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
                    "title": doc.title,
                    "path": doc.path.display().to_string(),
                    "score": score,
                    "snippet": extract_snippet(&doc.content, query),
                })
            })
            .collect();

        json!({"query": query, "collection": collection, "results": results})
    }

    /// Full text of one document.
    pub fn read_document(&self, collection: &str, document: &str) -> serde_json::Value {
        if collection.is_empty() || document.is_empty() {
            return json!({"error": "Collection and document parameters are required."});
        }
        let target = self.root.join(collection).join(document);
        if !target.exists() || !is_markdown(&target) {
            return json!({
                "error": format!("Document '{document}' not found in collection '{collection}'.")
            });
        }
        match fs::read_to_string(&target) {
            Ok(content) => json!({
                "collection": collection,
                "document": document,
                "path": target.display().to_string(),
                "content": content,
            }),
            Err(error) => json!({"error": format!("Unable to read document: {error}")}),
        }
    }

    fn iter_collections(&self) -> Vec<(String, PathBuf)> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut collections: Vec<(String, PathBuf)> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                (!name.starts_with('.')).then_some((name, entry.path()))
            })
            .collect();
        collections.sort_by(|a, b| a.0.cmp(&b.0));
        collections
    }

    fn load_documents(&self, collection: Option<&str>) -> Vec<KnowledgeDoc> {
        let targets = match collection {
            Some(name) => vec![(name.to_string(), self.root.join(name))],
            None => self.iter_collections(),
        };
        let mut docs = Vec::new();
        for (collection_name, collection_path) in targets {
            if !collection_path.is_dir() {
                continue;
            }
            let mut files = markdown_files(&collection_path);
            files.sort();
            for file_path in files {
                let Ok(content) = fs::read_to_string(&file_path) else {
                    continue;
                };
                let title = file_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .replace('_', " ");
                docs.push(KnowledgeDoc {
                    collection: collection_name.clone(),
                    path: file_path,
                    title,
                    content,
                });
            }
        }
        docs
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MARKDOWN_SUFFIXES.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn markdown_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return files;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(markdown_files(&path));
        } else if is_markdown(&path) {
            files.push(path);
        }
    }
    files
}

fn count_markdown_files(dir: &Path) -> usize {
    markdown_files(dir).len()
}

/// Term-frequency score weighted by term length, over whitespace- and
/// punctuation-split query terms.
fn score_document(content: &str, query: &str) -> f64 {
    let text = content.to_lowercase();
    let mut score = 0.0;
    for term in query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
    {
        let occurrences = text.matches(term).count();
        if occurrences > 0 {
            score += (occurrences * term.len()) as f64;
        }
    }
    score
}

fn summarize_content(content: &str, limit: usize) -> String {
    let text = content.trim().replace('\n', " ");
    if text.chars().count() <= limit {
        return text;
    }
    let truncated: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{}...", truncated.trim_end())
}

/// Snippet centered on the first occurrence of the query, falling back to
/// a summary when the query never appears verbatim.
fn extract_snippet(content: &str, query: &str) -> String {
    let lowered = content.to_lowercase();
    let query_lower = query.to_lowercase();
    let Some(index) = lowered.find(&query_lower) else {
        return summarize_content(content, SNIPPET_SIZE);
    };
    let start = index.saturating_sub(SNIPPET_SIZE / 2);
    let end = (index + query_lower.len() + SNIPPET_SIZE / 2).min(content.len());
    let start = floor_char_boundary(content, start);
    let end = floor_char_boundary(content, end);
    let mut snippet = content[start..end].trim().replace('\n', " ");
    if start > 0 {
        snippet = format!("...{snippet}");
    }
    if end < content.len() {
        snippet.push_str("...");
    }
    snippet
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
