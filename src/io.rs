use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use phylotree::tree::Tree;
use tracing::debug;

use crate::error::{FlipCutError, Result};
use crate::source::SourceTree;
use crate::supertree::Supertree;

/// Read every tree in a Newick or NEXUS file.
///
/// Newick files may hold several `;`-terminated trees. NEXUS files are
/// recognised by their `#NEXUS` header; trees come from `TREE` statements
/// and leaf labels are mapped through a `TRANSLATE` table when present.
/// Paths ending in `.gz` are decompressed. Bracket comments, including BEAST
/// `[&...]` annotations, are dropped before parsing.
pub fn read_trees<P: AsRef<Path>>(path: P) -> Result<Vec<SourceTree>> {
    let path = path.as_ref();
    let mut content = String::new();
    if path.to_string_lossy().ends_with(".gz") {
        GzDecoder::new(File::open(path)?).read_to_string(&mut content)?;
    } else {
        File::open(path)?.read_to_string(&mut content)?;
    }
    let trees = parse_trees(&content)?;
    debug!(path = %path.display(), trees = trees.len(), "read input trees");
    Ok(trees)
}

/// Parse Newick or NEXUS text, see [`read_trees`].
pub fn parse_trees(content: &str) -> Result<Vec<SourceTree>> {
    let content = strip_comments(content);
    let is_nexus = content.trim_start().to_ascii_uppercase().starts_with("#NEXUS");

    let (newicks, translate) = if is_nexus {
        nexus_trees(&content)
    } else {
        let newicks = statements(&content).map(|s| format!("{s};")).collect();
        (newicks, HashMap::new())
    };

    let trees = newicks
        .iter()
        .enumerate()
        .map(|(idx, newick)| {
            let mut tree =
                Tree::from_newick(newick).map_err(|source| FlipCutError::TreeNewick { tree: idx, source })?;
            if !translate.is_empty() {
                rename_leaf_nodes(&mut tree, &translate);
            }
            Ok(tree)
        })
        .collect::<Result<Vec<_>>>()?;

    SourceTree::from_phylo_trees(&trees)
}

/// Write one Newick line per supertree.
///
/// A path ending in `.gz` is gzip-compressed and `-` writes to stdout.
pub fn write_supertrees<P: AsRef<Path>>(path: P, trees: &[Supertree]) -> io::Result<()> {
    let p = path.as_ref();
    let mut out: Box<dyn Write> = if p.as_os_str() == "-" {
        Box::new(BufWriter::new(io::stdout().lock()))
    } else if p.to_string_lossy().ends_with(".gz") {
        let enc = GzEncoder::new(File::create(p)?, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    for tree in trees {
        writeln!(&mut out, "{}", tree.to_newick())?;
    }
    out.flush()?;
    Ok(())
}

/// Drop `[...]` comments. BEAST writes `:[&rate=0.1]2.45`, which becomes `:2.45`.
fn strip_comments(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => result.push(ch),
            _ => {}
        }
    }
    result
}

/// Non-empty `;`-separated statements, trimmed.
fn statements(text: &str) -> impl Iterator<Item = &str> {
    text.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// Newick strings of the `TREE` statements plus the `TRANSLATE` table.
fn nexus_trees(content: &str) -> (Vec<String>, HashMap<String, String>) {
    let mut newicks = Vec::new();
    let mut translate = HashMap::new();
    let mut in_trees = false;

    for statement in statements(content) {
        let upper = statement.to_ascii_uppercase();
        if upper.starts_with("BEGIN") {
            in_trees = upper.split_whitespace().nth(1) == Some("TREES");
        } else if upper.starts_with("END") {
            in_trees = false;
        } else if in_trees && upper.starts_with("TRANSLATE") {
            translate.extend(parse_translate(&statement["TRANSLATE".len()..]));
        } else if in_trees && (upper.starts_with("TREE") || upper.starts_with("UTREE")) {
            if let Some((_, body)) = statement.split_once('=') {
                newicks.push(format!("{};", body.trim()));
            }
        }
    }
    (newicks, translate)
}

/// `1 'Homo sapiens', 2 Pan` → {"1": "Homo sapiens", "2": "Pan"}
fn parse_translate(table: &str) -> HashMap<String, String> {
    table
        .split(',')
        .filter_map(|entry| {
            let (id, label) = entry.trim().split_once(char::is_whitespace)?;
            Some((id.to_string(), label.trim().trim_matches('\'').to_string()))
        })
        .collect()
}

/// Relabel leaves through `translate`; labels without an entry are kept.
pub fn rename_leaf_nodes(phylo_tree: &mut Tree, translate: &HashMap<String, String>) {
    for leaf_id in phylo_tree.get_leaves() {
        if let Ok(node) = phylo_tree.get_mut(&leaf_id) {
            if let Some(label) = node.name.as_ref().and_then(|n| translate.get(n)) {
                node.name = Some(label.clone());
            }
        }
    }
}
