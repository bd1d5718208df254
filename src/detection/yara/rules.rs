//! YARA-like rule definitions.
//!
//! A rule is a list of named atoms (text, hex or regex patterns with
//! modifiers) and a condition tree over those atoms. Rules are plain data
//! until [`YaraEngine`](super::engine::YaraEngine) compiles them.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Pattern type for an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Literal text
    Text,
    /// Space-separated hex bytes, e.g. `4D 5A`
    Hex,
    /// Regular expression over the raw bytes
    Regex,
}

/// Encodings an atom is searched in.
///
/// In rule files either flag may be omitted: `wide` defaults to off, and
/// `ascii` defaults to on unless `wide` was set, as with [`Atom::wide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EncodingFlags")]
pub struct Encodings {
    /// Single-byte encoding
    pub ascii: bool,
    /// UTF-16LE encoding
    pub wide: bool,
}

impl Default for Encodings {
    fn default() -> Self {
        Self {
            ascii: true,
            wide: false,
        }
    }
}

#[derive(Deserialize)]
struct EncodingFlags {
    #[serde(default)]
    ascii: Option<bool>,
    #[serde(default)]
    wide: bool,
}

impl From<EncodingFlags> for Encodings {
    fn from(flags: EncodingFlags) -> Self {
        Self {
            ascii: flags.ascii.unwrap_or(!flags.wide),
            wide: flags.wide,
        }
    }
}

/// A single pattern inside a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atom {
    /// Atom identifier (e.g., "$mz_header")
    pub id: String,
    /// The pattern source
    pub pattern: String,
    /// How `pattern` is interpreted
    pub pattern_type: PatternType,
    /// ASCII case-insensitive matching
    #[serde(default)]
    pub nocase: bool,
    #[serde(default)]
    pub encodings: Encodings,
    /// Match must not be bordered by alphanumeric characters
    #[serde(default)]
    pub fullword: bool,
    /// Match must start at this byte offset
    #[serde(default)]
    pub anchor: Option<usize>,
}

impl Atom {
    fn new(id: &str, pattern: &str, pattern_type: PatternType) -> Self {
        Self {
            id: id.to_string(),
            pattern: pattern.to_string(),
            pattern_type,
            nocase: false,
            encodings: Encodings::default(),
            fullword: false,
            anchor: None,
        }
    }

    /// Create a literal text atom.
    pub fn text(id: &str, pattern: &str) -> Self {
        Self::new(id, pattern, PatternType::Text)
    }

    /// Create a hex byte atom.
    pub fn hex(id: &str, hex: &str) -> Self {
        Self::new(id, hex, PatternType::Hex)
    }

    /// Create a regex atom.
    pub fn regex(id: &str, pattern: &str) -> Self {
        Self::new(id, pattern, PatternType::Regex)
    }

    /// Match ignoring ASCII case.
    pub fn nocase(mut self) -> Self {
        self.nocase = true;
        self
    }

    /// Search the UTF-16LE form instead of the single-byte form.
    /// Chain [`Atom::ascii`] afterwards to search both.
    pub fn wide(mut self) -> Self {
        self.encodings.wide = true;
        self.encodings.ascii = false;
        self
    }

    /// Also search the single-byte form.
    pub fn ascii(mut self) -> Self {
        self.encodings.ascii = true;
        self
    }

    /// Require the match to be delimited by non-alphanumeric characters.
    pub fn fullword(mut self) -> Self {
        self.fullword = true;
        self
    }

    /// Require the match to start at `offset`.
    pub fn at(mut self, offset: usize) -> Self {
        self.anchor = Some(offset);
        self
    }

    /// Byte form of a text or hex atom in each requested encoding.
    pub(crate) fn literal_variants(&self) -> Result<Vec<LiteralBytes>, String> {
        let bytes = match self.pattern_type {
            PatternType::Text => self.pattern.as_bytes().to_vec(),
            PatternType::Hex => parse_hex(&self.pattern)?,
            PatternType::Regex => return Ok(Vec::new()),
        };

        let mut variants = Vec::new();
        if self.encodings.ascii {
            variants.push(LiteralBytes {
                bytes: bytes.clone(),
                wide: false,
            });
        }
        if self.encodings.wide {
            variants.push(LiteralBytes {
                bytes: to_wide(&bytes),
                wide: true,
            });
        }
        Ok(variants)
    }

    /// Check modifier combinations and pattern syntax that do not need a regex engine.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.pattern.is_empty() {
            return Err(format!("atom {} has an empty pattern", self.id));
        }
        if !self.encodings.ascii && !self.encodings.wide {
            return Err(format!("atom {} has no encoding selected", self.id));
        }
        if self.pattern_type == PatternType::Hex {
            if self.nocase || self.fullword || self.encodings.wide {
                return Err(format!(
                    "atom {}: nocase, wide and fullword are not allowed on hex patterns",
                    self.id
                ));
            }
            parse_hex(&self.pattern).map_err(|e| format!("atom {}: {}", self.id, e))?;
        }
        if self.pattern_type == PatternType::Text && !self.pattern.is_ascii() && self.nocase {
            return Err(format!(
                "atom {}: nocase is only supported for ASCII text",
                self.id
            ));
        }
        Ok(())
    }
}

/// One encoded form of a literal atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LiteralBytes {
    pub bytes: Vec<u8>,
    pub wide: bool,
}

/// Parse a hex string like `"4D 5A"` into bytes.
pub(crate) fn parse_hex(hex: &str) -> Result<Vec<u8>, String> {
    let compact = hex.replace([' ', '\n', '\r', '\t'], "");
    if compact.contains('?') {
        return Err("hex wildcards are not supported".to_string());
    }
    if compact.is_empty() {
        return Err("empty hex pattern".to_string());
    }
    hex::decode(&compact).map_err(|e| format!("invalid hex: {}", e))
}

/// Encode bytes as UTF-16LE, one code unit per input byte.
pub(crate) fn to_wide(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().flat_map(|&b| [b, 0]).collect()
}

/// Rule metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMeta {
    /// Rule description
    pub description: Option<String>,
    /// Category (e.g., "ransomware", "webshell")
    pub category: Option<String>,
}

/// The atoms a counting condition ranges over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomSet {
    /// Every atom declared in the rule
    Them,
    /// A named subset
    Atoms(Vec<String>),
}

/// Condition tree over atom presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// The named atom was found
    Atom(String),
    /// At least `count` atoms of `of` were found
    AtLeast { count: usize, of: AtomSet },
    /// Every child holds
    And(Vec<Condition>),
    /// Some child holds
    Or(Vec<Condition>),
}

impl Condition {
    pub fn atom(id: &str) -> Self {
        Condition::Atom(id.to_string())
    }

    pub fn at_least(count: usize, of: &[&str]) -> Self {
        Condition::AtLeast {
            count,
            of: AtomSet::Atoms(of.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub fn at_least_of_them(count: usize) -> Self {
        Condition::AtLeast {
            count,
            of: AtomSet::Them,
        }
    }

    /// `any of them`
    pub fn any_of_them() -> Self {
        Self::at_least_of_them(1)
    }

    /// Resolve atom names to rule-local indices.
    pub(crate) fn compile(&self, atoms: &HashMap<&str, usize>) -> Result<CompiledCondition, String> {
        let lookup = |id: &str| {
            atoms
                .get(id)
                .copied()
                .ok_or_else(|| format!("condition references undeclared atom {}", id))
        };

        match self {
            Condition::Atom(id) => Ok(CompiledCondition::Present(lookup(id)?)),
            Condition::AtLeast { count, of } => {
                let mut indices = match of {
                    AtomSet::Them => atoms.values().copied().collect::<Vec<_>>(),
                    AtomSet::Atoms(ids) => ids
                        .iter()
                        .map(|id| lookup(id))
                        .collect::<Result<Vec<_>, _>>()?,
                };
                indices.sort_unstable();
                indices.dedup();

                if *count == 0 {
                    return Err("at-least threshold must be greater than 0".to_string());
                }
                if *count > indices.len() {
                    return Err(format!(
                        "at-least threshold {} exceeds the {} atom(s) it ranges over",
                        count,
                        indices.len()
                    ));
                }
                Ok(CompiledCondition::AtLeast {
                    count: *count,
                    atoms: indices,
                })
            }
            Condition::And(children) | Condition::Or(children) => {
                if children.is_empty() {
                    return Err("and/or needs at least one operand".to_string());
                }
                let compiled = children
                    .iter()
                    .map(|c| c.compile(atoms))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(match self {
                    Condition::And(_) => CompiledCondition::And(compiled),
                    _ => CompiledCondition::Or(compiled),
                })
            }
        }
    }
}

/// Condition tree with atoms resolved to indices into a presence vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CompiledCondition {
    Present(usize),
    AtLeast { count: usize, atoms: Vec<usize> },
    And(Vec<CompiledCondition>),
    Or(Vec<CompiledCondition>),
}

impl CompiledCondition {
    /// Evaluate bottom-up against the presence of each rule atom.
    pub fn evaluate(&self, present: &[bool]) -> bool {
        match self {
            CompiledCondition::Present(idx) => present[*idx],
            CompiledCondition::AtLeast { count, atoms } => {
                atoms.iter().filter(|&&idx| present[idx]).count() >= *count
            }
            CompiledCondition::And(children) => children.iter().all(|c| c.evaluate(present)),
            CompiledCondition::Or(children) => children.iter().any(|c| c.evaluate(present)),
        }
    }
}

/// A YARA-like detection rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YaraRule {
    /// Rule name
    pub name: String,
    /// Rule metadata
    #[serde(default)]
    pub meta: RuleMeta,
    /// Atoms, in declaration order
    pub strings: Vec<Atom>,
    /// Condition for matching
    pub condition: Condition,
}

impl YaraRule {
    /// Create a new rule that fires on any of its atoms.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            meta: RuleMeta::default(),
            strings: Vec::new(),
            condition: Condition::any_of_them(),
        }
    }

    /// Set rule description.
    pub fn with_description(mut self, desc: &str) -> Self {
        self.meta.description = Some(desc.to_string());
        self
    }

    /// Set rule category.
    pub fn with_category(mut self, category: &str) -> Self {
        self.meta.category = Some(category.to_string());
        self
    }

    /// Add an atom.
    pub fn with_string(mut self, atom: Atom) -> Self {
        self.strings.push(atom);
        self
    }

    /// Set the condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Validate atoms and resolve the condition.
    pub(crate) fn compile_condition(&self) -> Result<CompiledCondition, String> {
        if self.name.trim().is_empty() {
            return Err("rule name is empty".to_string());
        }
        if self.strings.is_empty() {
            return Err("rule declares no atoms".to_string());
        }

        let mut seen = HashSet::new();
        for atom in &self.strings {
            if !seen.insert(atom.id.as_str()) {
                return Err(format!("atom {} is declared twice", atom.id));
            }
            atom.validate()?;
        }

        let index: HashMap<&str, usize> = self
            .strings
            .iter()
            .enumerate()
            .map(|(i, atom)| (atom.id.as_str(), i))
            .collect();

        self.condition.compile(&index)
    }
}

/// Result of a rule match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    /// Name of the matched rule
    pub rule_name: String,
    /// Rule metadata
    pub meta: RuleMeta,
    /// Ids of the atoms that were found
    pub matched_atoms: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_of_four() -> YaraRule {
        YaraRule::new("calls")
            .with_string(Atom::text("$a", "eval("))
            .with_string(Atom::text("$b", "exec("))
            .with_string(Atom::text("$c", "system("))
            .with_string(Atom::text("$d", "fopen("))
            .with_condition(Condition::at_least_of_them(3))
    }

    #[test]
    fn test_modifier_builders() {
        let atom = Atom::text("$r", "bitcoin").nocase().wide().ascii();
        assert!(atom.encodings.ascii && atom.encodings.wide);
        assert!(atom.nocase);

        let atom = Atom::text("$w", "wallet").wide();
        assert!(!atom.encodings.ascii && atom.encodings.wide);

        let atom = Atom::hex("$mz", "4D 5A").at(0);
        assert_eq!(atom.anchor, Some(0));
        assert!(!atom.nocase);
    }

    #[test]
    fn test_literal_variants() {
        let atom = Atom::text("$a", "ab").wide().ascii();
        let variants = atom.literal_variants().unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].bytes, b"ab");
        assert_eq!(variants[1].bytes, b"a\0b\0");
        assert!(variants[1].wide);

        let hex = Atom::hex("$elf", "7F 45 4C 46").literal_variants().unwrap();
        assert_eq!(hex[0].bytes, vec![0x7F, 0x45, 0x4C, 0x46]);
    }

    #[test]
    fn test_parse_hex_errors() {
        assert!(parse_hex("4D 5").is_err());
        assert!(parse_hex("4D ?? 5A").is_err());
        assert!(parse_hex("  ").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_at_least_evaluation() {
        let compiled = three_of_four().compile_condition().unwrap();
        assert!(compiled.evaluate(&[true, true, true, false]));
        assert!(compiled.evaluate(&[true, false, true, true]));
        assert!(!compiled.evaluate(&[true, false, false, true]));
    }

    #[test]
    fn test_compound_evaluation() {
        let rule = YaraRule::new("compound")
            .with_string(Atom::text("$marker", "<?php"))
            .with_string(Atom::text("$x", "cmd"))
            .with_string(Atom::text("$y", "shell"))
            .with_string(Atom::text("$z", "upload"))
            .with_condition(Condition::And(vec![
                Condition::Or(vec![Condition::atom("$marker")]),
                Condition::at_least(2, &["$x", "$y", "$z"]),
            ]));
        let compiled = rule.compile_condition().unwrap();

        assert!(compiled.evaluate(&[true, true, false, true]));
        assert!(!compiled.evaluate(&[false, true, true, true]));
        assert!(!compiled.evaluate(&[true, false, false, true]));
    }

    #[test]
    fn test_undeclared_atom_rejected() {
        let rule = YaraRule::new("broken")
            .with_string(Atom::text("$a", "x"))
            .with_condition(Condition::atom("$missing"));
        let err = rule.compile_condition().unwrap_err();
        assert!(err.contains("$missing"));
    }

    #[test]
    fn test_malformed_rules_rejected() {
        let duplicate = YaraRule::new("dup")
            .with_string(Atom::text("$a", "x"))
            .with_string(Atom::text("$a", "y"));
        assert!(duplicate.compile_condition().is_err());

        let threshold = YaraRule::new("too_many")
            .with_string(Atom::text("$a", "x"))
            .with_condition(Condition::at_least_of_them(2));
        assert!(threshold.compile_condition().is_err());

        let zero = YaraRule::new("zero")
            .with_string(Atom::text("$a", "x"))
            .with_condition(Condition::at_least_of_them(0));
        assert!(zero.compile_condition().is_err());

        let empty_or = YaraRule::new("empty_or")
            .with_string(Atom::text("$a", "x"))
            .with_condition(Condition::Or(vec![]));
        assert!(empty_or.compile_condition().is_err());

        let empty_pattern = YaraRule::new("empty").with_string(Atom::text("$a", ""));
        assert!(empty_pattern.compile_condition().is_err());

        let hex_nocase = YaraRule::new("hex").with_string(Atom::hex("$a", "4D5A").nocase());
        assert!(hex_nocase.compile_condition().is_err());

        let no_atoms = YaraRule::new("bare");
        assert!(no_atoms.compile_condition().is_err());
    }

    #[test]
    fn test_rule_json_shape() {
        let json = r#"{
            "name": "json_rule",
            "strings": [
                { "id": "$a", "pattern": "evil", "pattern_type": "text", "nocase": true },
                { "id": "$b", "pattern": "4D 5A", "pattern_type": "hex", "anchor": 0 }
            ],
            "condition": { "or": [ { "atom": "$a" }, { "atom": "$b" } ] }
        }"#;
        let rule: YaraRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.strings[1].anchor, Some(0));
        assert!(rule.strings[0].encodings.ascii);
        assert!(rule.compile_condition().is_ok());
    }

    #[test]
    fn test_partial_encodings_json() {
        let wide_only: Atom = serde_json::from_str(
            r#"{ "id": "$w", "pattern": "wallet", "pattern_type": "text", "encodings": { "wide": true } }"#,
        )
        .unwrap();
        assert_eq!(wide_only.encodings, Atom::text("$w", "wallet").wide().encodings);

        let both: Atom = serde_json::from_str(
            r#"{ "id": "$b", "pattern": "wallet", "pattern_type": "text", "encodings": { "wide": true, "ascii": true } }"#,
        )
        .unwrap();
        assert!(both.encodings.ascii && both.encodings.wide);

        let empty: Atom = serde_json::from_str(
            r#"{ "id": "$e", "pattern": "wallet", "pattern_type": "text", "encodings": {} }"#,
        )
        .unwrap();
        assert_eq!(empty.encodings, Encodings::default());
    }
}
