use serde::{Deserialize, Serialize};

/// Configuration for heading-scoped chunking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters before a section is subdivided
    pub max_chunk_chars: usize,
    /// Notes shorter than this are kept whole
    pub min_standalone_chars: usize,
    /// Character overlap carried across fixed-size splits
    pub overlap_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 6000,
            min_standalone_chars: 1000,
            overlap_chars: 200,
        }
    }
}

/// A heading-scoped passage of a note, the unit of embedding and indexing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteChunk {
    /// Vault-relative path of the source note
    pub source_path: String,
    /// Heading context, composed as `"Section > Subsection"`; empty for
    /// whole-note and preamble chunks
    pub heading_path: String,
    pub content: String,
    /// 0-based position within the note's final chunk list
    pub ordinal: usize,
}

impl NoteChunk {
    /// Stable chunk identifier: `"<path>#<ordinal>"`
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}#{}", self.source_path, self.ordinal)
    }
}

/// Splits note text into heading-scoped chunks
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Chunk a note. Always yields at least one chunk.
    ///
    /// Short notes are returned whole. Longer notes split at depth-2
    /// headings; sections over the size limit subdivide at depth-3, then
    /// fall back to fixed-size splitting with overlap. Depth-1 titles and
    /// headings deeper than 3 never trigger a split.
    #[must_use]
    pub fn chunk(&self, text: &str, source_path: &str) -> Vec<NoteChunk> {
        if char_len(text) < self.config.min_standalone_chars {
            return vec![NoteChunk {
                source_path: source_path.to_string(),
                heading_path: String::new(),
                content: text.to_string(),
                ordinal: 0,
            }];
        }

        let sections = split_sections(text, 2);
        if sections.iter().all(|s| s.heading.is_none()) {
            // No depth-2 headings anywhere: keep the note whole.
            return vec![NoteChunk {
                source_path: source_path.to_string(),
                heading_path: String::new(),
                content: text.to_string(),
                ordinal: 0,
            }];
        }

        let mut pieces: Vec<(String, String)> = Vec::new();
        for section in sections {
            match section.heading {
                None => {
                    // Preamble before the first section heading; skipped when blank.
                    if !section.body.trim().is_empty() {
                        pieces.push((String::new(), section.body));
                    }
                }
                Some(heading) => {
                    self.push_section(&mut pieces, heading, &section.body);
                }
            }
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(ordinal, (heading_path, content))| NoteChunk {
                source_path: source_path.to_string(),
                heading_path,
                content,
                ordinal,
            })
            .collect()
    }

    fn push_section(&self, pieces: &mut Vec<(String, String)>, heading: String, body: &str) {
        if char_len(body) <= self.config.max_chunk_chars {
            pieces.push((heading, body.to_string()));
            return;
        }

        let subsections = split_sections(body, 3);
        let has_subheadings = subsections.iter().any(|s| s.heading.is_some());
        if !has_subheadings {
            for part in split_fixed(body, self.config.max_chunk_chars, self.config.overlap_chars) {
                pieces.push((heading.clone(), part));
            }
            return;
        }

        for sub in subsections {
            let path = match &sub.heading {
                None => heading.clone(),
                Some(sub_heading) => format!("{heading} > {sub_heading}"),
            };
            if char_len(&sub.body) <= self.config.max_chunk_chars {
                if !sub.body.trim().is_empty() {
                    pieces.push((path, sub.body));
                }
            } else {
                for part in
                    split_fixed(&sub.body, self.config.max_chunk_chars, self.config.overlap_chars)
                {
                    pieces.push((path.clone(), part));
                }
            }
        }
    }
}

struct Section {
    heading: Option<String>,
    body: String,
}

/// Split text at headings of exactly `depth`, skipping fenced code blocks.
///
/// The heading line itself stays at the top of its section's body so the
/// chunk text keeps its own title. Text before the first matching heading
/// becomes a heading-less leading section.
fn split_sections(text: &str, depth: usize) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current_heading: Option<String> = None;
    let mut current_body = String::new();
    let mut in_fence = false;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        if !in_fence {
            if let Some(heading) = heading_at_depth(line, depth) {
                if current_heading.is_some() || !current_body.is_empty() {
                    sections.push(Section {
                        heading: current_heading.take(),
                        body: std::mem::take(&mut current_body),
                    });
                }
                current_heading = Some(heading);
            }
        }

        current_body.push_str(line);
    }

    if current_heading.is_some() || !current_body.is_empty() {
        sections.push(Section {
            heading: current_heading,
            body: current_body,
        });
    }

    sections
}

/// Extract the heading text when `line` is an ATX heading of exactly `depth`
fn heading_at_depth(line: &str, depth: usize) -> Option<String> {
    let trimmed = line.trim_end();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes != depth {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    // Drop optional closing hashes ("## Title ##").
    let title = rest.trim().trim_end_matches('#').trim_end();
    if title.is_empty() {
        return None;
    }
    Some(title.to_string())
}

/// Fixed-size splitting over char boundaries with a trailing overlap window
fn split_fixed(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let overlap = overlap_chars.min(max_chars.saturating_sub(1));
    let step = max_chars - overlap;

    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = offsets.len() - 1;

    let mut parts = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + max_chars).min(total);
        parts.push(text[offsets[start]..offsets[end]].to_string());
        if end == total {
            break;
        }
        start += step;
    }
    parts
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunker() -> Chunker {
        Chunker::new(ChunkerConfig::default())
    }

    fn small_chunker() -> Chunker {
        // Shrunk limits so tests exercise every split path with short fixtures.
        Chunker::new(ChunkerConfig {
            max_chunk_chars: 120,
            min_standalone_chars: 40,
            overlap_chars: 20,
        })
    }

    #[test]
    fn short_note_is_one_chunk_equal_to_input() {
        let text = "# Title\n\na short note about tea";
        let chunks = chunker().chunk(text, "notes/tea.md");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].heading_path, "");
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].id(), "notes/tea.md#0");
    }

    #[test]
    fn splits_at_depth_two_headings() {
        let filler = "lorem ipsum dolor sit amet\n".repeat(3);
        let text = format!("# Note\n\nintro\n\n## First\n\n{filler}\n## Second\n\n{filler}");
        let chunks = small_chunker().chunk(&text, "n.md");

        let non_preamble: Vec<_> = chunks.iter().filter(|c| !c.heading_path.is_empty()).collect();
        assert_eq!(non_preamble.len(), 2);
        assert_eq!(non_preamble[0].heading_path, "First");
        assert_eq!(non_preamble[1].heading_path, "Second");
        assert!(non_preamble[0].content.contains("## First"));

        // Preamble keeps the depth-1 title embedded.
        assert_eq!(chunks[0].heading_path, "");
        assert!(chunks[0].content.contains("# Note"));
    }

    #[test]
    fn blank_preamble_is_omitted() {
        let filler = "x".repeat(60);
        let text = format!("\n\n## Only\n\n{filler}");
        let chunks = small_chunker().chunk(&text, "n.md");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading_path, "Only");
    }

    #[test]
    fn long_note_without_headings_stays_whole() {
        let text = "no headings here\n".repeat(100);
        let chunks = small_chunker().chunk(&text, "n.md");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
    }

    #[test]
    fn deep_headings_do_not_split() {
        let filler = "word ".repeat(20);
        let text = format!("#### Too deep\n\n{filler}\n##### Deeper\n\n{filler}");
        let chunks = small_chunker().chunk(&text, "n.md");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn oversized_section_subdivides_at_depth_three() {
        let filler = "abcdefghij ".repeat(12);
        let text =
            format!("## Area\n\nintro {filler}\n### Alpha\n\n{filler}\n### Beta\n\n{filler}");
        let chunks = small_chunker().chunk(&text, "n.md");

        let paths: Vec<&str> = chunks.iter().map(|c| c.heading_path.as_str()).collect();
        assert!(paths.contains(&"Area"));
        assert!(paths.contains(&"Area > Alpha"));
        assert!(paths.contains(&"Area > Beta"));
    }

    #[test]
    fn oversized_section_without_subheadings_splits_fixed_with_overlap() {
        let body = "0123456789".repeat(40);
        let text = format!("## Big\n{body}\n## Tail\nshort tail section");
        let chunks = small_chunker().chunk(&text, "n.md");

        let big: Vec<_> = chunks.iter().filter(|c| c.heading_path == "Big").collect();
        assert!(big.len() > 1);
        for pair in big.windows(2) {
            let prev_chars: Vec<char> = pair[0].content.chars().collect();
            let overlap: String = prev_chars[prev_chars.len() - 20..].iter().collect();
            assert!(pair[1].content.starts_with(&overlap));
        }
    }

    #[test]
    fn headings_inside_code_fences_are_ignored() {
        let filler = "filler line\n".repeat(10);
        let text = format!("## Real\n\n{filler}```\n## Not a heading\n```\n{filler}");
        let chunks = small_chunker().chunk(&text, "n.md");
        assert!(chunks.iter().all(|c| c.heading_path != "Not a heading"));
    }

    #[test]
    fn ordinals_are_sequential_over_final_list() {
        let filler = "yak shaving notes\n".repeat(4);
        let text = format!("intro\n\n## A\n\n{filler}\n## B\n\n{filler}\n## C\n\n{filler}");
        let chunks = small_chunker().chunk(&text, "n.md");
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
        }
    }

    #[test]
    fn three_note_corpus_example() {
        // doc1: two depth-2 sections, doc2: no headings, doc3: short.
        let filler = "some sentence about gardening\n".repeat(3);
        let doc1 = format!("## One\n\n{filler}\n## Two\n\n{filler}");
        let doc2 = "plain text ".repeat(30);
        let doc3 = "tiny";

        let c = small_chunker();
        let total =
            c.chunk(&doc1, "a.md").len() + c.chunk(&doc2, "b.md").len() + c.chunk(doc3, "c.md").len();
        assert_eq!(total, 4);
    }

    #[test]
    fn fixed_split_respects_multibyte_boundaries() {
        let text = "héllo wörld ünïcode ".repeat(30);
        for part in split_fixed(&text, 50, 10) {
            // Would panic on a broken char boundary; also sanity-check sizes.
            assert!(part.chars().count() <= 50);
        }
    }
}
