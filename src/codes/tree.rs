//! The hierarchical taxonomy of clinical codes.
//!
//! ICD-10 and OPCS-4 definitions are shipped as a nested document: the root
//! carries the full list of group names, and each category covers a
//! lexicographic range of codes, optionally excluding some groups for
//! everything at or below it. Leaves are the canonical codes themselves.
//!
//! Sibling ranges never overlap, so after sorting each level by range the
//! code lookup is a binary-search descent from the root.

use crate::Result;
use itertools::Itertools;
use qu::ick_use::*;
use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::{fmt, io};

/// Lexicographic range of codes with equal-length bounds.
///
/// A code is inside the range when it is at least `start` and its prefix of
/// the bound length is at most `end`. A single code is a range with
/// `start == end`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CodeRange {
    start: String,
    end: String,
}

impl CodeRange {
    fn new(start: String, end: String) -> Result<Self> {
        ensure!(
            start.len() == end.len(),
            "range bounds '{}' and '{}' have different lengths",
            start,
            end
        );
        ensure!(
            start <= end,
            "range bounds '{}' and '{}' are not in ascending order",
            start,
            end
        );
        Ok(Self { start, end })
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    /// Whether `code` falls inside this range.
    pub fn contains(&self, code: &str) -> bool {
        // Bounds and codes are plain ASCII, so byte comparison is the
        // lexicographic comparison.
        let code = code.as_bytes();
        let trunc = &code[..self.end.len().min(code.len())];
        code >= self.start.as_bytes() && trunc <= self.end.as_bytes()
    }

    fn overlaps(&self, other: &CodeRange) -> bool {
        self.contains(&other.start) || other.contains(&self.start)
    }
}

impl fmt::Display for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

// Document shape, prior to validation and sorting.

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRange {
    Point(String),
    Bounds(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    name: String,
    docs: String,
    index: RawRange,
    #[serde(default)]
    exclude: Option<BTreeSet<String>>,
    #[serde(default)]
    categories: Option<Vec<RawCategory>>,
}

#[derive(Debug, Deserialize)]
struct RawTree {
    groups: BTreeSet<String>,
    categories: Vec<RawCategory>,
}

/// One node of the taxonomy.
///
/// A category with no children is a canonical code; `name` is then the
/// spelling returned by the parser. The `exclude` set removes groups from
/// this category and everything below it.
#[derive(Debug)]
pub struct Category {
    name: String,
    docs: String,
    range: CodeRange,
    children: Vec<Category>,
    exclude: BTreeSet<String>,
}

impl Category {
    fn build(raw: RawCategory) -> Result<Self> {
        let range = match raw.index {
            RawRange::Point(start) => CodeRange::new(start.clone(), start),
            RawRange::Bounds(bounds) => {
                ensure!(
                    bounds.len() == 2,
                    "expected a two-element [start, end] range, got {} elements",
                    bounds.len()
                );
                let mut bounds = bounds.into_iter();
                CodeRange::new(bounds.next().unwrap(), bounds.next().unwrap())
            }
        };
        let range = range.with_context(|| format!("in category '{}'", raw.name))?;
        let children = build_children(raw.categories.unwrap_or_default())
            .with_context(|| format!("in category '{}'", raw.name))?;
        Ok(Category {
            name: raw.name,
            docs: raw.docs,
            range,
            children,
            exclude: raw.exclude.unwrap_or_default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn docs(&self) -> &str {
        &self.docs
    }

    pub fn range(&self) -> &CodeRange {
        &self.range
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn random_code<'a, R: Rng>(&'a self, rng: &mut R) -> &'a str {
        if self.is_leaf() {
            &self.name
        } else {
            let child = &self.children[rng.gen_range(0..self.children.len())];
            child.random_code(rng)
        }
    }

    /// Collect `(name, docs)` for every leaf below this category that is a
    /// member of `group`.
    fn collect_group<'a>(&'a self, group: &str, out: &mut Vec<(&'a str, &'a str)>) {
        if self.exclude.contains(group) {
            return;
        }
        if self.is_leaf() {
            out.push((&self.name, &self.docs));
        }
        for child in &self.children {
            child.collect_group(group, out);
        }
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<(&'a str, &'a str)>) {
        if self.is_leaf() {
            out.push((&self.name, &self.docs));
        }
        for child in &self.children {
            child.collect_leaves(out);
        }
    }
}

/// Build one level of the tree: construct, sort by range, and reject
/// overlapping siblings.
fn build_children(raw: Vec<RawCategory>) -> Result<Vec<Category>> {
    let mut children = raw
        .into_iter()
        .map(Category::build)
        .collect::<Result<Vec<_>>>()?;
    children.sort_by(|a, b| a.range.cmp(&b.range));
    for (a, b) in children.iter().tuple_windows() {
        ensure!(
            !a.range.overlaps(&b.range),
            "categories '{}' ({}) and '{}' ({}) have overlapping ranges",
            a.name,
            a.range,
            b.name,
            b.range
        );
    }
    Ok(children)
}

/// A whole code taxonomy: the declared group names plus the sorted category
/// tree.
#[derive(Debug)]
pub struct CodeTree {
    groups: BTreeSet<String>,
    categories: Vec<Category>,
}

impl CodeTree {
    /// Read a taxonomy from a YAML document.
    ///
    /// The document is validated here: every category needs `name`, `docs`
    /// and `index`; range bounds must have equal lengths; sibling ranges must
    /// not overlap. Categories are sorted on load, so the document itself
    /// does not have to be.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let raw: RawTree = serde_yaml::from_reader(reader).context("malformed taxonomy document")?;
        let categories = build_children(raw.categories)?;
        Ok(CodeTree {
            groups: raw.groups,
            categories,
        })
    }

    /// Every group name declared by this taxonomy.
    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    /// Find the leaf for `code`, along with the groups that survive the
    /// exclusions on the path down to it.
    ///
    /// `code` must already be in canonical form (see
    /// [`preprocess`](crate::codes::preprocess)). Returns `None` when the
    /// code does not resolve to a leaf.
    pub(crate) fn locate(&self, code: &str) -> Option<(&Category, BTreeSet<&str>)> {
        let mut groups: BTreeSet<&str> = self.groups.iter().map(String::as_str).collect();
        let mut level = &self.categories;
        loop {
            // The greatest sibling whose range starts at or before the code
            // is the only candidate that can contain it.
            let pos = level.partition_point(|c| c.range.start.as_str() <= code);
            let category = level[..pos].last()?;
            if !category.range.contains(code) {
                return None;
            }
            for group in &category.exclude {
                groups.remove(group.as_str());
            }
            if category.is_leaf() {
                return Some((category, groups));
            }
            level = &category.children;
        }
    }

    /// Flat list of every canonical code with its documentation.
    pub fn all_codes_and_docs(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        for category in &self.categories {
            category.collect_leaves(&mut out);
        }
        out
    }

    /// The codes belonging to `group`, with their documentation. Fails for a
    /// group the taxonomy does not declare.
    pub fn codes_in_group(&self, group: &str) -> Result<Vec<(&str, &str)>> {
        ensure!(
            self.groups.contains(group),
            "group '{}' is not declared by this taxonomy",
            group
        );
        let mut out = Vec::new();
        for category in &self.categories {
            category.collect_group(group, &mut out);
        }
        Ok(out)
    }

    /// A random canonical code, chosen uniformly at each level of the tree.
    pub fn random_code<R: Rng>(&self, rng: &mut R) -> &str {
        let category = &self.categories[rng.gen_range(0..self.categories.len())];
        category.random_code(rng)
    }
}
