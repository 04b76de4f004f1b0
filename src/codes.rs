//! Clinical code values and the caching code parser.
//!
//! Raw code strings from the episode data are noisy (stray dots, spaces,
//! lowercase), so they are canonicalised before being looked up in the
//! relevant [`CodeTree`]. Successful lookups are memoised per taxonomy: the
//! same canonical string is only ever walked through the tree once.

mod tree;

pub use tree::{Category, CodeRange, CodeTree};

use crate::intern::{StrId, StringInterner};
use crate::Result;
use qu::ick_use::*;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Canonicalise a raw code string: drop whitespace and punctuation, and
/// uppercase what remains. Returns `None` when nothing remains, which the
/// parser maps to the null code.
pub fn preprocess(raw: &str) -> Option<String> {
    let canonical: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if canonical.is_empty() {
        None
    } else {
        Some(canonical)
    }
}

/// Whether a raw string parses as a diagnosis (ICD-10) or a procedure
/// (OPCS-4).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CodeKind {
    Diagnosis,
    Procedure,
}

/// The interned payload of a successfully parsed code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeEntry {
    pub name: StrId,
    pub docs: StrId,
    pub groups: BTreeSet<StrId>,
}

/// A parsed clinical code.
///
/// `Null` means the source cell was empty (or SQL NULL); `Invalid` means the
/// raw string did not resolve in the taxonomy. Both flow through the rest of
/// the pipeline as ordinary values and belong to no group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClinicalCode {
    Null,
    Invalid { raw: StrId },
    Valid(Arc<CodeEntry>),
}

impl ClinicalCode {
    pub fn is_null(&self) -> bool {
        matches!(self, ClinicalCode::Null)
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ClinicalCode::Valid(_))
    }

    /// The canonical spelling for a valid code, the raw string for an
    /// invalid one, and the empty string for null.
    pub fn name<'a>(&self, strings: &'a StringInterner) -> Result<&'a str> {
        match self {
            ClinicalCode::Null => Ok(""),
            ClinicalCode::Invalid { raw } => strings.lookup(*raw),
            ClinicalCode::Valid(entry) => strings.lookup(entry.name),
        }
    }

    pub fn docs<'a>(&self, strings: &'a StringInterner) -> Result<&'a str> {
        match self {
            ClinicalCode::Null => Ok(""),
            ClinicalCode::Invalid { .. } => Ok("Unknown"),
            ClinicalCode::Valid(entry) => strings.lookup(entry.docs),
        }
    }

    /// The ids of the groups this code belongs to. Empty for null and
    /// invalid codes.
    pub fn group_ids(&self) -> impl Iterator<Item = StrId> + '_ {
        let groups = match self {
            ClinicalCode::Valid(entry) => Some(&entry.groups),
            _ => None,
        };
        groups.into_iter().flatten().copied()
    }

    pub fn groups(&self) -> impl Iterator<Item = CodeGroup> + '_ {
        self.group_ids().map(CodeGroup)
    }
}

/// A named set of codes, as declared by a taxonomy. Equality and ordering
/// are over the interned name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CodeGroup(StrId);

impl CodeGroup {
    pub fn new(name: &str, strings: &mut StringInterner) -> Self {
        CodeGroup(strings.intern(name))
    }

    pub fn name<'a>(&self, strings: &'a StringInterner) -> Result<&'a str> {
        strings.lookup(self.0)
    }

    pub fn contains(&self, code: &ClinicalCode) -> bool {
        match code {
            ClinicalCode::Valid(entry) => entry.groups.contains(&self.0),
            _ => false,
        }
    }
}

/// An ordered collection of groups treated as one higher-level category at
/// the extraction stage (for example "any ACS code").
#[derive(Debug, Clone, Default)]
pub struct Metagroup {
    groups: Vec<CodeGroup>,
}

impl Metagroup {
    pub fn new<S: AsRef<str>>(names: &[S], strings: &mut StringInterner) -> Self {
        Metagroup {
            groups: names
                .iter()
                .map(|name| CodeGroup::new(name.as_ref(), strings))
                .collect(),
        }
    }

    pub fn push(&mut self, group: CodeGroup) {
        self.groups.push(group);
    }

    /// Whether any member group contains the code.
    pub fn contains(&self, code: &ClinicalCode) -> bool {
        self.groups.iter().any(|group| group.contains(code))
    }

    pub fn contains_group(&self, group: CodeGroup) -> bool {
        self.groups.contains(&group)
    }
}

/// Parses raw diagnosis and procedure strings against their taxonomies,
/// memoising results.
///
/// Both taxonomies intern into the same string pool, so a group name shared
/// between the diagnosis and procedure files is deliberately treated as one
/// group.
pub struct CodeParser {
    diagnoses: CodeTree,
    procedures: CodeTree,
    diagnosis_cache: HashMap<String, Arc<CodeEntry>>,
    procedure_cache: HashMap<String, Arc<CodeEntry>>,
    tree_descents: usize,
}

impl CodeParser {
    pub fn new(diagnoses: CodeTree, procedures: CodeTree) -> Self {
        CodeParser {
            diagnoses,
            procedures,
            diagnosis_cache: HashMap::new(),
            procedure_cache: HashMap::new(),
            tree_descents: 0,
        }
    }

    /// Load both taxonomies from their YAML files.
    pub fn from_files(diagnoses: &Path, procedures: &Path) -> Result<Self> {
        let diagnoses = CodeTree::from_reader(fs::File::open(diagnoses)?)
            .with_context(|| format!("loading diagnosis codes from \"{}\"", diagnoses.display()))?;
        let procedures = CodeTree::from_reader(fs::File::open(procedures)?).with_context(|| {
            format!("loading procedure codes from \"{}\"", procedures.display())
        })?;
        Ok(Self::new(diagnoses, procedures))
    }

    /// Parse a raw code string into a [`ClinicalCode`].
    ///
    /// Two raw strings with the same canonical form always parse to the same
    /// value; after the first parse the result comes straight from the memo
    /// table.
    pub fn parse(
        &mut self,
        kind: CodeKind,
        raw: &str,
        strings: &mut StringInterner,
    ) -> ClinicalCode {
        let Some(canonical) = preprocess(raw) else {
            return ClinicalCode::Null;
        };
        let (tree, cache) = match kind {
            CodeKind::Diagnosis => (&self.diagnoses, &mut self.diagnosis_cache),
            CodeKind::Procedure => (&self.procedures, &mut self.procedure_cache),
        };
        if let Some(entry) = cache.get(&canonical) {
            return ClinicalCode::Valid(entry.clone());
        }
        self.tree_descents += 1;
        match tree.locate(&canonical) {
            Some((leaf, groups)) => {
                let entry = Arc::new(CodeEntry {
                    name: strings.intern(leaf.name()),
                    docs: strings.intern(leaf.docs()),
                    groups: groups.into_iter().map(|g| strings.intern(g)).collect(),
                });
                cache.insert(canonical, entry.clone());
                ClinicalCode::Valid(entry)
            }
            None => ClinicalCode::Invalid {
                raw: strings.intern(&canonical),
            },
        }
    }

    fn tree(&self, kind: CodeKind) -> &CodeTree {
        match kind {
            CodeKind::Diagnosis => &self.diagnoses,
            CodeKind::Procedure => &self.procedures,
        }
    }

    /// Every group declared by either taxonomy, interned.
    pub fn all_groups(&self, strings: &mut StringInterner) -> BTreeSet<CodeGroup> {
        self.group_names()
            .into_iter()
            .map(|name| CodeGroup(strings.intern(name)))
            .collect()
    }

    /// The union of the group names of both taxonomies, sorted.
    pub fn group_names(&self) -> BTreeSet<&str> {
        self.diagnoses
            .groups()
            .iter()
            .chain(self.procedures.groups())
            .map(String::as_str)
            .collect()
    }

    /// A random canonical code from one of the taxonomies.
    pub fn random_code<R: Rng>(&self, kind: CodeKind, rng: &mut R) -> &str {
        self.tree(kind).random_code(rng)
    }

    /// Number of memoised canonical strings for one taxonomy.
    pub fn cache_size(&self, kind: CodeKind) -> usize {
        match kind {
            CodeKind::Diagnosis => self.diagnosis_cache.len(),
            CodeKind::Procedure => self.procedure_cache.len(),
        }
    }

    /// How many times a parse has had to walk a tree (i.e. missed the memo
    /// table).
    pub fn tree_descents(&self) -> usize {
        self.tree_descents
    }
}
