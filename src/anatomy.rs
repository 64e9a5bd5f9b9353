// 🫁 Anatomy Classification - free text → (site, sub-site)
// Taxonomy as data: one ordered table entry per site, each with its own
// patterns and closed modifier table.
//
// Priority order (fixed):
//   spleen → thymus → artery → bone marrow → pancreas → duodenum/duod → ln
//
// Exactly one site may match. Zero sites, several sites, or a known site
// with an unknown modifier are all `UnclassifiedAnatomy`. Whatever word
// follows a modifier site is read as its modifier, whatever the punctuation
// in between, so a written sub-site is never dropped.

use crate::error::{ReconcileError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SITES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Site {
    Spleen,
    Thymus,
    Artery,
    BoneMarrow,
    Pancreas,
    Duodenum,
    LymphNode,
}

impl Site {
    /// Coarse name, used only as the destination directory
    pub fn short_form(&self) -> &'static str {
        match self {
            Site::Spleen => "Spleen",
            Site::Thymus => "Thymus",
            Site::Artery => "Artery",
            Site::BoneMarrow => "Bone Marrow",
            Site::Pancreas => "Pancreas",
            Site::Duodenum => "Duodenum",
            Site::LymphNode => "Lymph node",
        }
    }

    /// Long form when no modifier follows the site keyword
    pub fn bare_long_form(&self) -> &'static str {
        match self {
            Site::Spleen => "Spleen",
            Site::Thymus => "Thymus",
            Site::Artery => "Artery",
            Site::BoneMarrow => "Bone-Marrow",
            Site::Pancreas => "Pancreas",
            Site::Duodenum => "Duodenum",
            Site::LymphNode => "Lymph-node",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_form())
    }
}

/// Classified anatomy: short form for grouping, long form for the filename
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnatomyLabel {
    pub site: Site,
    long_form: String,
}

impl AnatomyLabel {
    pub fn new(site: Site, long_form: impl Into<String>) -> Self {
        AnatomyLabel {
            site,
            long_form: long_form.into(),
        }
    }

    pub fn short_form(&self) -> &'static str {
        self.site.short_form()
    }

    pub fn long_form(&self) -> &str {
        &self.long_form
    }
}

// ============================================================================
// TAXONOMY TABLE
// ============================================================================

/// One accepted modifier group for a site
///
/// `{Cap}` in the template is replaced by the matched word, capitalized.
struct ModifierRule {
    words: &'static [&'static str],
    template: &'static str,
}

/// How a site keyword shows up in the text
enum SitePattern {
    /// Anywhere, never followed by a modifier
    Bare(Regex),
    /// Left-bounded by a non-letter, then one of:
    ///   - a modifier glued straight on ("pancreashead")
    ///   - punctuation or spaces, then the next word as the modifier
    ///   - a digit or the end of the text (no modifier)
    Modified(Regex),
}

struct SiteRule {
    site: Site,
    /// Tried in order; the first that matches supplies the modifier
    patterns: Vec<SitePattern>,
    modifiers: &'static [ModifierRule],
}

impl SiteRule {
    /// `None` when the site keyword is absent, else the optional modifier
    fn find<'t>(&self, text: &'t str) -> Option<Option<&'t str>> {
        self.patterns.iter().find_map(|pattern| match pattern {
            SitePattern::Bare(regex) => regex.find(text).map(|_| None),
            SitePattern::Modified(regex) => regex
                .find_iter(text)
                .find_map(|keyword| self.modifier_after(&text[keyword.end()..])),
        })
    }

    /// `None` when the keyword runs on into letters that are not one of
    /// this site's modifiers (e.g. "duod" inside "duodenum")
    fn modifier_after<'t>(&self, tail: &'t str) -> Option<Option<&'t str>> {
        let glued = leading_word(tail);
        if !glued.is_empty() {
            return self.knows(glued).then_some(Some(glued));
        }

        let rest = tail.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
        let word = leading_word(rest);
        Some((!word.is_empty()).then_some(word))
    }

    fn knows(&self, word: &str) -> bool {
        self.modifiers.iter().any(|rule| rule.words.contains(&word))
    }

    fn long_form(&self, modifier: Option<&str>, text: &str) -> Result<String> {
        let Some(word) = modifier else {
            return Ok(self.site.bare_long_form().to_string());
        };

        self.modifiers
            .iter()
            .find(|rule| rule.words.contains(&word))
            .map(|rule| rule.template.replace("{Cap}", &capitalize(word)))
            .ok_or_else(|| {
                ReconcileError::unclassified(
                    text,
                    format!("unknown {} location '{}'", self.site.short_form(), word),
                )
            })
    }
}

/// Leading run of lowercase ASCII letters
fn leading_word(text: &str) -> &str {
    let end = text
        .find(|c: char| !c.is_ascii_lowercase())
        .unwrap_or(text.len());
    &text[..end]
}

const PANCREAS_MODIFIERS: &[ModifierRule] = &[
    ModifierRule {
        words: &["unsure"],
        template: "Pancreas-Unsure-of-orientation",
    },
    ModifierRule {
        words: &["head", "tail", "body"],
        template: "{Cap}-of-pancreas",
    },
];

const DUODENUM_MODIFIERS: &[ModifierRule] = &[
    ModifierRule {
        words: &["unsure"],
        template: "Duodenum-Unsure-of-orientation",
    },
    ModifierRule {
        words: &["distal", "mid", "proximal"],
        template: "Duodenum-{Cap}-one-third",
    },
    ModifierRule {
        words: &["prox"],
        template: "Duodenum-Proximal-one-third",
    },
];

const LYMPH_NODE_MODIFIERS: &[ModifierRule] = &[
    ModifierRule {
        words: &["sma"],
        template: "Lymph-node-SMA",
    },
    ModifierRule {
        words: &["head", "tail", "body"],
        template: "Lymph-node-{Cap}-of-pancreas",
    },
    ModifierRule {
        words: &["mesentery", "mesentary", "mestentery"],
        template: "Lymph-node-Mesentery",
    },
];

/// Keyword that takes no modifier
fn bare_pattern(keyword: &str) -> SitePattern {
    SitePattern::Bare(Regex::new(keyword).expect("Invalid anatomy keyword regex"))
}

/// Keyword preceded by a non-letter; the modifier is read after the match
fn modifier_pattern(keyword: &str) -> SitePattern {
    SitePattern::Modified(
        Regex::new(&format!(r"(?:^|[^a-z]){}", keyword))
            .expect("Invalid anatomy modifier regex"),
    )
}

static SITE_RULES: Lazy<Vec<SiteRule>> = Lazy::new(|| {
    vec![
        SiteRule {
            site: Site::Spleen,
            patterns: vec![bare_pattern("spleen")],
            modifiers: &[],
        },
        SiteRule {
            site: Site::Thymus,
            patterns: vec![bare_pattern("thymus")],
            modifiers: &[],
        },
        SiteRule {
            site: Site::Artery,
            patterns: vec![bare_pattern("artery")],
            modifiers: &[],
        },
        SiteRule {
            site: Site::BoneMarrow,
            patterns: vec![bare_pattern(r"bone[\s_-]*marrow")],
            modifiers: &[],
        },
        SiteRule {
            site: Site::Pancreas,
            patterns: vec![modifier_pattern("pancreas")],
            modifiers: PANCREAS_MODIFIERS,
        },
        SiteRule {
            site: Site::Duodenum,
            patterns: vec![modifier_pattern("duodenum"), modifier_pattern("duod")],
            modifiers: DUODENUM_MODIFIERS,
        },
        SiteRule {
            site: Site::LymphNode,
            patterns: vec![modifier_pattern("ln")],
            modifiers: LYMPH_NODE_MODIFIERS,
        },
    ]
});

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct AnatomyClassifier;

impl AnatomyClassifier {
    pub fn new() -> Self {
        AnatomyClassifier
    }

    /// Classify free anatomy text
    ///
    /// ```
    /// use histology_curation::AnatomyClassifier;
    ///
    /// let label = AnatomyClassifier::new().classify("pancreas - head").unwrap();
    /// assert_eq!(label.short_form(), "Pancreas");
    /// assert_eq!(label.long_form(), "Head-of-pancreas");
    /// ```
    pub fn classify(&self, raw: &str) -> Result<AnatomyLabel> {
        let text = raw.to_lowercase();

        let hits: Vec<(&SiteRule, Option<&str>)> = SITE_RULES
            .iter()
            .filter_map(|rule| rule.find(&text).map(|modifier| (rule, modifier)))
            .collect();

        match hits.as_slice() {
            [] => Err(ReconcileError::unclassified(raw, "no anatomy site recognized")),
            [(rule, modifier)] => {
                let long_form = rule.long_form(*modifier, raw)?;
                Ok(AnatomyLabel::new(rule.site, long_form))
            }
            several => {
                let sites: Vec<&str> = several
                    .iter()
                    .map(|(rule, _)| rule.site.short_form())
                    .collect();
                Err(ReconcileError::unclassified(
                    raw,
                    format!("ambiguous, matches {}", sites.join(", ")),
                ))
            }
        }
    }

    /// Sites in priority order
    pub fn sites(&self) -> Vec<Site> {
        SITE_RULES.iter().map(|rule| rule.site).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
