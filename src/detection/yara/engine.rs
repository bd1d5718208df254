//! YARA-like rule engine for scanning content.
//!
//! The corpus is compiled once: every unanchored literal atom of every rule
//! goes into one of two Aho-Corasick automata (case-sensitive and ASCII
//! case-insensitive), so a scan walks the content once per case mode no
//! matter how many rules are loaded. Anchored atoms are compared in place
//! and regex atoms run individually.

use aho_corasick::AhoCorasick;
use regex::bytes::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use super::corpus;
use super::rules::{CompiledCondition, PatternType, RuleMatch, YaraRule};
use crate::core::error::{Error, Result};

/// Byte used in the narrowed wide view where a code unit is not ASCII.
const NARROW_GAP: u8 = b'\n';

/// Where a pattern hit lands in the presence index.
#[derive(Debug, Clone, Copy)]
struct AtomRef {
    rule: usize,
    atom: usize,
    fullword: bool,
    wide: bool,
}

/// One multi-pattern automaton and the atoms behind each of its patterns.
struct LiteralSet {
    automaton: AhoCorasick,
    /// Indexed by automaton pattern id; identical byte strings share an entry.
    targets: Vec<Vec<AtomRef>>,
}

impl LiteralSet {
    fn build(patterns: Vec<(Vec<u8>, Vec<AtomRef>)>, nocase: bool) -> Result<Option<Self>> {
        if patterns.is_empty() {
            return Ok(None);
        }

        let (bytes, targets): (Vec<_>, Vec<_>) = patterns.into_iter().unzip();
        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(nocase)
            .build(&bytes)
            .map_err(|e| Error::corpus_compile("<corpus>", e.to_string()))?;

        Ok(Some(Self { automaton, targets }))
    }

    fn mark(&self, data: &[u8], present: &mut [Vec<bool>]) {
        for hit in self.automaton.find_overlapping_iter(data) {
            for target in &self.targets[hit.pattern().as_usize()] {
                if present[target.rule][target.atom] {
                    continue;
                }
                if target.fullword && !is_fullword(data, hit.start(), hit.end(), target.wide) {
                    continue;
                }
                present[target.rule][target.atom] = true;
            }
        }
    }
}

/// Groups literal patterns so each distinct byte string is searched once.
#[derive(Default)]
struct LiteralSetBuilder {
    index: HashMap<Vec<u8>, usize>,
    patterns: Vec<(Vec<u8>, Vec<AtomRef>)>,
}

impl LiteralSetBuilder {
    fn add(&mut self, bytes: Vec<u8>, nocase: bool, target: AtomRef) {
        let key = if nocase {
            bytes.to_ascii_lowercase()
        } else {
            bytes.clone()
        };
        match self.index.get(&key) {
            Some(&idx) => self.patterns[idx].1.push(target),
            None => {
                self.index.insert(key, self.patterns.len());
                self.patterns.push((bytes, vec![target]));
            }
        }
    }

    fn len(&self) -> usize {
        self.patterns.len()
    }
}

/// Literal atom that must start at a fixed offset.
struct AnchoredLiteral {
    target: AtomRef,
    offset: usize,
    bytes: Vec<u8>,
    nocase: bool,
}

impl AnchoredLiteral {
    fn matches(&self, data: &[u8]) -> bool {
        let end = match self.offset.checked_add(self.bytes.len()) {
            Some(end) => end,
            None => return false,
        };
        let window = match data.get(self.offset..end) {
            Some(window) => window,
            None => return false,
        };

        let equal = if self.nocase {
            window.eq_ignore_ascii_case(&self.bytes)
        } else {
            window == self.bytes.as_slice()
        };
        equal && (!self.target.fullword || is_fullword(data, self.offset, end, self.target.wide))
    }
}

/// Regex atom, evaluated over the raw bytes and/or the narrowed wide views.
struct RegexAtom {
    rule: usize,
    atom: usize,
    regex: Regex,
    ascii: bool,
    wide: bool,
    fullword: bool,
    anchor: Option<usize>,
}

impl RegexAtom {
    fn matches(&self, data: &[u8], wide_views: &mut Option<[Vec<u8>; 2]>) -> bool {
        if self.ascii && regex_hit(&self.regex, data, self.anchor, self.fullword) {
            return true;
        }
        if !self.wide {
            return false;
        }

        let views = wide_views.get_or_insert_with(|| [narrow_wide(data, 0), narrow_wide(data, 1)]);
        match self.anchor {
            Some(offset) => {
                let view = &views[offset % 2];
                regex_hit(&self.regex, view, Some(offset / 2), self.fullword)
            }
            None => views
                .iter()
                .any(|view| regex_hit(&self.regex, view, None, self.fullword)),
        }
    }
}

/// A rule with its condition resolved against atom indices.
struct CompiledRule {
    rule: YaraRule,
    condition: CompiledCondition,
}

/// YARA-like scanning engine.
///
/// Immutable after construction; share it behind an `Arc`.
pub struct YaraEngine {
    /// Compiled rules, in corpus order
    rules: Vec<CompiledRule>,
    /// Rules indexed by name
    rules_by_name: HashMap<String, usize>,
    exact: Option<LiteralSet>,
    nocase: Option<LiteralSet>,
    anchored: Vec<AnchoredLiteral>,
    regexes: Vec<RegexAtom>,
}

impl YaraEngine {
    /// Compile a rule list into an engine.
    ///
    /// Any malformed rule fails the whole corpus; nothing is skipped.
    pub fn from_rules(rules: Vec<YaraRule>) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        let mut rules_by_name = HashMap::new();
        let mut exact = LiteralSetBuilder::default();
        let mut nocase = LiteralSetBuilder::default();
        let mut anchored = Vec::new();
        let mut regexes = Vec::new();

        for (rule_idx, rule) in rules.into_iter().enumerate() {
            if rules_by_name.contains_key(&rule.name) {
                return Err(Error::corpus_compile(&rule.name, "duplicate rule name"));
            }

            let condition = rule
                .compile_condition()
                .map_err(|reason| Error::corpus_compile(&rule.name, reason))?;

            for (atom_idx, atom) in rule.strings.iter().enumerate() {
                if atom.pattern_type == PatternType::Regex {
                    regexes.push(RegexAtom {
                        rule: rule_idx,
                        atom: atom_idx,
                        regex: build_regex(&atom.pattern, atom.nocase, atom.anchor.is_some())
                            .map_err(|e| {
                                Error::corpus_compile(&rule.name, format!("atom {}: {}", atom.id, e))
                            })?,
                        ascii: atom.encodings.ascii,
                        wide: atom.encodings.wide,
                        fullword: atom.fullword,
                        anchor: atom.anchor,
                    });
                    continue;
                }

                let variants = atom
                    .literal_variants()
                    .map_err(|reason| Error::corpus_compile(&rule.name, reason))?;
                for variant in variants {
                    let target = AtomRef {
                        rule: rule_idx,
                        atom: atom_idx,
                        fullword: atom.fullword,
                        wide: variant.wide,
                    };
                    match atom.anchor {
                        Some(offset) => anchored.push(AnchoredLiteral {
                            target,
                            offset,
                            bytes: variant.bytes,
                            nocase: atom.nocase,
                        }),
                        None if atom.nocase => nocase.add(variant.bytes, true, target),
                        None => exact.add(variant.bytes, false, target),
                    }
                }
            }

            rules_by_name.insert(rule.name.clone(), rule_idx);
            compiled.push(CompiledRule { rule, condition });
        }

        log::debug!(
            "Compiled {} literal pattern(s), {} anchored atom(s), {} regex atom(s)",
            exact.len() + nocase.len(),
            anchored.len(),
            regexes.len()
        );

        let engine = Self {
            rules: compiled,
            rules_by_name,
            exact: LiteralSet::build(exact.patterns, false)?,
            nocase: LiteralSet::build(nocase.patterns, true)?,
            anchored,
            regexes,
        };
        log::info!("Loaded {} detection rule(s)", engine.rule_count());
        Ok(engine)
    }

    /// Create an engine with the built-in corpus.
    pub fn with_default_rules() -> Result<Self> {
        Self::from_rules(corpus::default_rules())
    }

    /// Load rules from a JSON file (an array of rules).
    pub fn from_rules_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;

        let rules: Vec<YaraRule> = serde_json::from_str(&content).map_err(|e| {
            Error::corpus_compile(path.display().to_string(), format!("Failed to parse rules: {}", e))
        })?;

        Self::from_rules(rules)
    }

    /// Get the number of loaded rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Get a rule by name.
    pub fn get_rule(&self, name: &str) -> Option<&YaraRule> {
        self.rules_by_name
            .get(name)
            .and_then(|&idx| self.rules.get(idx))
            .map(|compiled| &compiled.rule)
    }

    /// List all rule names, in corpus order.
    pub fn list_rules(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.rule.name.as_str()).collect()
    }

    /// Scan data against all rules. Matches come back in corpus order.
    pub fn scan(&self, data: &[u8]) -> Vec<RuleMatch> {
        let mut present: Vec<Vec<bool>> = self
            .rules
            .iter()
            .map(|r| vec![false; r.rule.strings.len()])
            .collect();

        for set in [&self.exact, &self.nocase].into_iter().flatten() {
            set.mark(data, &mut present);
        }

        for anchored in &self.anchored {
            let target = anchored.target;
            if !present[target.rule][target.atom] && anchored.matches(data) {
                present[target.rule][target.atom] = true;
            }
        }

        let mut wide_views = None;
        for regex in &self.regexes {
            if !present[regex.rule][regex.atom] && regex.matches(data, &mut wide_views) {
                present[regex.rule][regex.atom] = true;
            }
        }

        self.rules
            .iter()
            .zip(present)
            .filter(|(compiled, present)| compiled.condition.evaluate(present))
            .map(|(compiled, present)| RuleMatch {
                rule_name: compiled.rule.name.clone(),
                meta: compiled.rule.meta.clone(),
                matched_atoms: compiled
                    .rule
                    .strings
                    .iter()
                    .zip(present)
                    .filter(|(_, found)| *found)
                    .map(|(atom, _)| atom.id.clone())
                    .collect(),
            })
            .collect()
    }

    /// Names of the rules that fire on `data`.
    pub fn matching_rule_names(&self, data: &[u8]) -> HashSet<String> {
        self.scan(data).into_iter().map(|m| m.rule_name).collect()
    }
}

fn build_regex(pattern: &str, nocase: bool, anchored: bool) -> std::result::Result<Regex, regex::Error> {
    let source = if anchored {
        format!("^(?:{})", pattern)
    } else {
        pattern.to_string()
    };
    RegexBuilder::new(&source)
        .unicode(false)
        .case_insensitive(nocase)
        .build()
}

fn regex_hit(regex: &Regex, haystack: &[u8], anchor: Option<usize>, fullword: bool) -> bool {
    match anchor {
        Some(offset) => haystack
            .get(offset..)
            .and_then(|tail| regex.find(tail))
            .map_or(false, |m| {
                !fullword || is_fullword(haystack, offset + m.start(), offset + m.end(), false)
            }),
        None => regex
            .find_iter(haystack)
            .any(|m| !fullword || is_fullword(haystack, m.start(), m.end(), false)),
    }
}

/// Collapse UTF-16LE code units starting at `parity` into single bytes.
/// Units with a non-zero high byte become [`NARROW_GAP`].
fn narrow_wide(data: &[u8], parity: usize) -> Vec<u8> {
    data.get(parity..)
        .unwrap_or_default()
        .chunks_exact(2)
        .map(|unit| if unit[1] == 0 { unit[0] } else { NARROW_GAP })
        .collect()
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
}

/// True when `data[start..end]` is not bordered by alphanumeric characters.
fn is_fullword(data: &[u8], start: usize, end: usize, wide: bool) -> bool {
    if wide {
        let before = start >= 2 && data[start - 1] == 0 && is_word_byte(data[start - 2]);
        let after = end + 1 < data.len() && data[end + 1] == 0 && is_word_byte(data[end]);
        !before && !after
    } else {
        let before = start > 0 && is_word_byte(data[start - 1]);
        let after = end < data.len() && is_word_byte(data[end]);
        !before && !after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::yara::rules::{Atom, Condition};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn wide(text: &str) -> Vec<u8> {
        text.bytes().flat_map(|b| [b, 0]).collect()
    }

    fn three_of_four_engine() -> YaraEngine {
        YaraEngine::from_rules(vec![YaraRule::new("calls")
            .with_string(Atom::text("$a", "eval("))
            .with_string(Atom::text("$b", "exec("))
            .with_string(Atom::text("$c", "system("))
            .with_string(Atom::text("$d", "fopen("))
            .with_condition(Condition::at_least_of_them(3))])
        .unwrap()
    }

    #[test]
    fn test_default_rules() {
        let engine = YaraEngine::with_default_rules().unwrap();
        assert_eq!(
            engine.list_rules(),
            vec![
                "suspicious_executable",
                "suspicious_script_content",
                "ransomware_patterns",
                "malicious_urls",
                "suspicious_powershell",
                "potential_backdoor",
            ]
        );
        assert!(engine.get_rule("malicious_urls").is_some());
        assert!(engine.get_rule("nonexistent").is_none());
    }

    #[test]
    fn test_three_of_four_threshold() {
        let engine = three_of_four_engine();

        let hits = engine.scan(b"x = eval($a); exec($b); system($c);");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matched_atoms, vec!["$a", "$b", "$c"]);

        assert!(engine.scan(b"eval(1); fopen(2); system(3)").len() == 1);
        assert!(engine.scan(b"eval(1); fopen(2);").is_empty());
        assert!(engine.scan(b"").is_empty());
    }

    #[test]
    fn test_onion_url_alone_matches() {
        let engine = YaraEngine::with_default_rules().unwrap();
        let names = engine.matching_rule_names(b"visit http://abcdefghij234567.onion/index now");
        assert!(names.contains("malicious_urls"));
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_wide_url_matches() {
        let engine = YaraEngine::with_default_rules().unwrap();
        let mut data = vec![0xFFu8];
        data.extend(wide("see https://mirror.example.ru/payload for details"));
        assert!(engine.matching_rule_names(&data).contains("malicious_urls"));
    }

    #[test]
    fn test_wallet_regex() {
        let engine = YaraEngine::with_default_rules().unwrap();
        let names = engine.matching_rule_names(b"send to bitcoin1A2b3C4d5E6f7G8h9J0kLmNoPqRs");
        assert!(names.contains("malicious_urls"));
    }

    #[test]
    fn test_anchored_headers() {
        let engine = YaraEngine::with_default_rules().unwrap();

        let hits = engine.scan(b"MZ\x90\x00\x03\x00");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rule_name, "suspicious_executable");
        assert_eq!(hits[0].matched_atoms, vec!["$mz_header"]);

        assert!(engine
            .matching_rule_names(b"\x7FELF\x02\x01")
            .contains("suspicious_executable"));
        assert!(engine.scan(b"xxMZ not at the start").is_empty());
    }

    #[test]
    fn test_ransomware_nocase_and_wide() {
        let engine = YaraEngine::with_default_rules().unwrap();

        let ascii = b"YOUR FILES HAVE BEEN ENCRYPTED. Send BITCOIN to decrypt.";
        assert!(engine.matching_rule_names(ascii).contains("ransomware_patterns"));

        let utf16 = wide("Your files have been encrypted; pay in bitcoin to this wallet");
        assert!(engine.matching_rule_names(&utf16).contains("ransomware_patterns"));

        assert!(!engine
            .matching_rule_names(b"bitcoin and wallet only")
            .contains("ransomware_patterns"));
    }

    #[test]
    fn test_fullword() {
        let engine = YaraEngine::from_rules(vec![YaraRule::new("word")
            .with_string(Atom::text("$a", "shell_exec").fullword())])
        .unwrap();

        assert_eq!(engine.scan(b"call shell_exec($x)").len(), 1);
        assert_eq!(engine.scan(b"shell_exec").len(), 1);
        assert!(engine.scan(b"myshell_exec2").is_empty());
        assert!(engine.scan(b"shell_execute").is_empty());
        assert!(engine.scan(b"Xshell_exec").is_empty());
        // A later, properly delimited occurrence still counts.
        assert_eq!(engine.scan(b"shell_execs; shell_exec()").len(), 1);
    }

    #[test]
    fn test_wide_fullword() {
        let engine = YaraEngine::from_rules(vec![YaraRule::new("wide_word")
            .with_string(Atom::text("$a", "cmd").wide().fullword())])
        .unwrap();

        assert_eq!(engine.scan(&wide("run cmd now")).len(), 1);
        assert_eq!(engine.scan(&wide("cmd.exe")).len(), 1);
        assert!(engine.scan(&wide("xcmd now")).is_empty());
        assert!(engine.scan(&wide("run cmd2")).is_empty());
        // The wide form alone is searched.
        assert!(engine.scan(b"run cmd now").is_empty());

        let text = wide("a cmd b");
        assert!(is_fullword(&text, 4, 10, true));
        let text = wide("acmd b");
        assert!(!is_fullword(&text, 2, 8, true));
        let text = wide("a cmdb");
        assert!(!is_fullword(&text, 4, 10, true));
    }

    #[test]
    fn test_anchored_regex() {
        let engine = YaraEngine::from_rules(vec![
            YaraRule::new("ascii_at_3").with_string(Atom::regex("$r", "ab+c").at(3)),
            YaraRule::new("wide_at_3").with_string(Atom::regex("$w", "ab+c").wide().at(3)),
        ])
        .unwrap();

        let names = engine.matching_rule_names(b"XYZabbc");
        assert!(names.contains("ascii_at_3"));
        assert!(!names.contains("wide_at_3"));

        assert!(engine.matching_rule_names(b"XYabbcZ").is_empty());
        assert!(engine.matching_rule_names(b"XYZQabbc").is_empty());

        // Odd offset: the odd-parity view, one unit past its start.
        let mut data = b"XYZ".to_vec();
        data.extend(wide("abbc"));
        let names = engine.matching_rule_names(&data);
        assert!(names.contains("wide_at_3"));
        assert!(!names.contains("ascii_at_3"));

        let mut shifted = b"XYZQQ".to_vec();
        shifted.extend(wide("abbc"));
        assert!(!engine.matching_rule_names(&shifted).contains("wide_at_3"));
    }

    #[test]
    fn test_shared_pattern_across_atoms() {
        let engine = YaraEngine::from_rules(vec![YaraRule::new("pages")
            .with_string(Atom::text("$upper", "<%@ Page").nocase())
            .with_string(Atom::text("$lower", "<%@ page").nocase())
            .with_condition(Condition::at_least_of_them(2))])
        .unwrap();

        let hits = engine.scan(b"<%@ PAGE Language=\"C#\" %>");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matched_atoms, vec!["$upper", "$lower"]);
    }

    #[test]
    fn test_compile_errors() {
        let duplicate = vec![
            YaraRule::new("same").with_string(Atom::text("$a", "x")),
            YaraRule::new("same").with_string(Atom::text("$a", "y")),
        ];
        assert!(matches!(
            YaraEngine::from_rules(duplicate),
            Err(Error::CorpusCompile { .. })
        ));

        let bad_regex =
            vec![YaraRule::new("bad_regex").with_string(Atom::regex("$r", "(unclosed"))];
        match YaraEngine::from_rules(bad_regex) {
            Err(Error::CorpusCompile { rule, .. }) => assert_eq!(rule, "bad_regex"),
            _ => panic!("expected a corpus compile error"),
        }

        let bad_hex = vec![YaraRule::new("bad_hex").with_string(Atom::hex("$h", "4D 5"))];
        assert!(YaraEngine::from_rules(bad_hex).is_err());

        let undeclared = vec![YaraRule::new("undeclared")
            .with_string(Atom::text("$a", "x"))
            .with_condition(Condition::atom("$b"))];
        assert!(YaraEngine::from_rules(undeclared).is_err());
    }

    #[test]
    fn test_empty_corpus() {
        let engine = YaraEngine::from_rules(Vec::new()).unwrap();
        assert_eq!(engine.rule_count(), 0);
        assert!(engine.scan(b"anything").is_empty());
    }

    #[test]
    fn test_scan_is_deterministic() {
        let engine = YaraEngine::with_default_rules().unwrap();
        let data = b"<?php shell_exec($cmd); upload(); connect(); eval($x); exec($y);";
        assert_eq!(engine.scan(data), engine.scan(data));
    }

    #[test]
    fn test_from_rules_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{
                "name": "from_json",
                "meta": {{ "description": "json rule", "category": "test" }},
                "strings": [
                    {{ "id": "$a", "pattern": "needle", "pattern_type": "text", "nocase": true }}
                ],
                "condition": {{ "atom": "$a" }}
            }}]"#
        )
        .unwrap();

        let engine = YaraEngine::from_rules_file(file.path()).unwrap();
        let hits = engine.scan(b"haystack NEEDLE haystack");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].meta.category.as_deref(), Some("test"));
    }

    #[test]
    fn test_from_rules_file_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            YaraEngine::from_rules_file(file.path()),
            Err(Error::CorpusCompile { .. })
        ));
    }

    #[test]
    fn test_narrow_wide() {
        assert_eq!(narrow_wide(b"a\0b\0", 0), b"ab");
        assert_eq!(narrow_wide(b"xa\0b\0", 1), b"ab");
        assert_eq!(narrow_wide(b"a\x01b\0", 0), b"\nb");
    }
}
