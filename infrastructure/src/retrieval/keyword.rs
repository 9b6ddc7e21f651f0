//! In-memory keyword retrieval over plain-text documents.
//!
//! Documents are split into passages at blank lines. A passage scores one
//! point per distinct prompt keyword it contains; the best passages of the
//! requested collections are returned, ties keeping document order.

use parley_application::ports::retrieval::{RetrievalClient, RetrievalReply, RetrievalRequest};
use parley_domain::{ResultInfo, RetrievalResult};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, warn};

/// Passages returned per request unless configured otherwise.
pub const DEFAULT_RETRIEVAL_SIZE: usize = 3;

const MIN_KEYWORD_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "and", "are", "but", "can", "for", "from", "had", "has", "have", "how", "not", "that", "the",
    "this", "was", "were", "what", "when", "where", "which", "who", "why", "with", "you", "your",
];

const INDEXED_EXTENSIONS: &[&str] = &["txt", "md"];

#[derive(Debug, Clone)]
struct Passage {
    file: String,
    title: String,
    /// 1-based first line.
    from: i32,
    to: i32,
    text: String,
    words: HashSet<String>,
}

impl Passage {
    fn to_result(&self) -> ResultInfo {
        let to = (self.to != self.from).then_some(self.to);
        ResultInfo::new(&self.file, &self.text)
            .with_title(&self.title)
            .with_lines(self.from, to)
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn keywords(prompt: &str) -> HashSet<String> {
    words(prompt)
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Split `contents` into blank-line separated passages with line ranges.
fn passages(file: &str, title: &str, contents: &str) -> Vec<Passage> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut start = 0;

    let mut flush = |current: &mut Vec<&str>, start: usize, end: usize| {
        if current.is_empty() {
            return;
        }
        let text = current.join("\n");
        out.push(Passage {
            file: file.to_string(),
            title: title.to_string(),
            from: i32::try_from(start).unwrap_or(i32::MAX),
            to: i32::try_from(end).unwrap_or(i32::MAX),
            words: words(&text).collect(),
            text,
        });
        current.clear();
    };

    let mut last = 0;
    for (index, line) in contents.lines().enumerate() {
        let number = index + 1;
        if line.trim().is_empty() {
            flush(&mut current, start, last);
        } else {
            if current.is_empty() {
                start = number;
            }
            current.push(line.trim_end());
            last = number;
        }
    }
    flush(&mut current, start, last);
    out
}

/// Title from a leading markdown heading, else the file stem.
fn document_title(path: &Path, contents: &str) -> String {
    contents
        .lines()
        .find(|l| !l.trim().is_empty())
        .and_then(|l| l.trim().strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_default()
}

/// Keyword search over named in-memory collections.
#[derive(Debug)]
pub struct KeywordRetrievalClient {
    collections: RwLock<BTreeMap<String, Vec<Passage>>>,
    retrieval_size: usize,
}

impl Default for KeywordRetrievalClient {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordRetrievalClient {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            retrieval_size: DEFAULT_RETRIEVAL_SIZE,
        }
    }

    pub fn with_retrieval_size(mut self, size: usize) -> Self {
        self.retrieval_size = size;
        self
    }

    /// Add one document to `collection`, creating the collection if needed.
    pub fn add_document(&self, collection: &str, file: &str, title: &str, contents: &str) {
        let passages = passages(file, title, contents);
        debug!(
            "Indexed {} passages of {} into {}",
            passages.len(),
            file,
            collection
        );
        if let Ok(mut collections) = self.collections.write() {
            collections
                .entry(collection.to_string())
                .or_default()
                .extend(passages);
        }
    }

    /// Index every `.txt` and `.md` file below `dir` into `collection`.
    ///
    /// Returns the number of documents indexed. Unreadable files are
    /// skipped with a warning.
    pub fn index_directory(&self, collection: &str, dir: &Path) -> io::Result<usize> {
        let mut pending = vec![dir.to_path_buf()];
        let mut files = Vec::new();
        while let Some(current) = pending.pop() {
            for entry in std::fs::read_dir(&current)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                } else if path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| INDEXED_EXTENSIONS.contains(&e))
                {
                    files.push(path);
                }
            }
        }
        files.sort();

        let mut indexed = 0;
        for path in files {
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    let file = path
                        .strip_prefix(dir)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .into_owned();
                    let title = document_title(&path, &contents);
                    self.add_document(collection, &file, &title, &contents);
                    indexed += 1;
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(indexed)
    }

    /// Names of all known collections.
    pub fn collections(&self) -> Vec<String> {
        self.collections
            .read()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Best passages for `prompt` within `collections`.
    pub fn search(&self, collections: &[String], prompt: &str) -> RetrievalResult {
        let keywords = keywords(prompt);
        if keywords.is_empty() || self.retrieval_size == 0 {
            return Vec::new();
        }
        let Ok(index) = self.collections.read() else {
            return Vec::new();
        };

        let mut scored: Vec<(usize, &Passage)> = collections
            .iter()
            .filter_map(|name| index.get(name))
            .flatten()
            .map(|p| (keywords.iter().filter(|k| p.words.contains(*k)).count(), p))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(self.retrieval_size)
            .map(|(_, p)| p.to_result())
            .collect()
    }
}

impl RetrievalClient for KeywordRetrievalClient {
    fn request(&self, request: RetrievalRequest, reply: RetrievalReply) {
        let results = self.search(&request.collections, &request.prompt);
        debug!(
            "Retrieved {} passages for session {}",
            results.len(),
            request.session_id
        );
        reply.send(request.session_id, results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_domain::SessionId;
    use std::sync::{Arc, Mutex};

    const GUIDE: &str = "# Garden guide\n\nTomatoes need full sun.\nWater tomatoes daily.\n\nBasil grows well beside tomatoes.\n\nRoses need pruning in spring.";

    fn client() -> KeywordRetrievalClient {
        let client = KeywordRetrievalClient::new();
        client.add_document("garden", "guide.md", "Garden guide", GUIDE);
        client.add_document("kitchen", "recipes.txt", "", "Tomato soup needs tomatoes.");
        client
    }

    #[test]
    fn passages_carry_line_ranges() {
        let passages = passages("guide.md", "Garden guide", GUIDE);
        assert_eq!(passages.len(), 4);
        assert_eq!((passages[1].from, passages[1].to), (3, 4));
        assert_eq!(passages[2].text, "Basil grows well beside tomatoes.");
    }

    #[test]
    fn best_passage_first_and_only_requested_collections() {
        let results = client().search(&["garden".to_string()], "How should I water tomatoes?");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "Tomatoes need full sun.\nWater tomatoes daily.");
        assert_eq!(results[0].from, Some(3));
        assert_eq!(results[0].to, Some(4));
        assert_eq!(results[0].title, "Garden guide");
        assert_eq!(results[1].from, Some(6));
        assert_eq!(results[1].to, None);
    }

    #[test]
    fn stop_words_and_unknown_collections_match_nothing() {
        let client = client();
        assert!(client.search(&["garden".to_string()], "what is the").is_empty());
        assert!(client.search(&["attic".to_string()], "tomatoes").is_empty());
    }

    #[test]
    fn retrieval_size_caps_results() {
        let client = KeywordRetrievalClient::new().with_retrieval_size(1);
        client.add_document("garden", "guide.md", "", GUIDE);
        assert_eq!(client.search(&["garden".to_string()], "tomatoes").len(), 1);
    }

    #[test]
    fn request_replies_with_session_id() {
        let seen = Arc::new(Mutex::new(None));
        let reply = {
            let seen = seen.clone();
            RetrievalReply::new(move |id, results| {
                *seen.lock().unwrap() = Some((id, results.len()));
            })
        };
        let id = SessionId::generate();
        client().request(
            RetrievalRequest {
                session_id: id.clone(),
                collections: vec!["kitchen".to_string()],
                prompt: "tomatoes".to_string(),
            },
            reply,
        );
        assert_eq!(*seen.lock().unwrap(), Some((id, 1)));
    }

    #[test]
    fn index_directory_reads_text_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "Comets have tails.").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("deep.md"), "# Deep\n\nComets orbit.").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let client = KeywordRetrievalClient::new();
        assert_eq!(client.index_directory("space", dir.path()).unwrap(), 2);
        assert_eq!(client.collections(), vec!["space".to_string()]);

        let results = client.search(&["space".to_string()], "comets");
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.title == "Deep"));
        assert!(results.iter().any(|r| r.file == "notes.txt" && r.title == "notes"));
    }
}
