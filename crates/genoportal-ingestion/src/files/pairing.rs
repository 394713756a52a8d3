//! FASTQ paired-end classification.
//!
//! Read 1 / read 2 are recognised by an isolated `R1` / `R2` token delimited
//! by `.`, `_`, `-` or the ends of the name, e.g. `sample_R1_001.fastq.gz`.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref READ_ONE: Regex = Regex::new(r"(?i)(^|[._-])(r)1([._-]|$)").unwrap();
    static ref READ_TWO: Regex = Regex::new(r"(?i)(^|[._-])(r)2([._-]|$)").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PairedEnd {
    One,
    Two,
}

impl PairedEnd {
    /// Value stored in `paired_end`.
    pub fn as_str(&self) -> &'static str {
        match self {
            PairedEnd::One => "1",
            PairedEnd::Two => "2",
        }
    }

    pub fn mate(&self) -> PairedEnd {
        match self {
            PairedEnd::One => PairedEnd::Two,
            PairedEnd::Two => PairedEnd::One,
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            PairedEnd::One => &READ_ONE,
            PairedEnd::Two => &READ_TWO,
        }
    }
}

/// `Some` only when exactly one of the two tokens is present.
pub fn classify_paired_end(name: &str) -> Option<PairedEnd> {
    match (READ_ONE.is_match(name), READ_TWO.is_match(name)) {
        (true, false) => Some(PairedEnd::One),
        (false, true) => Some(PairedEnd::Two),
        _ => None,
    }
}

/// The name the mate of `name` must carry, keeping the token's case.
pub fn expected_mate(name: &str, end: PairedEnd) -> String {
    let digit = end.mate().as_str();
    end.pattern()
        .replacen(name, 1, format!("${{1}}${{2}}{}${{3}}", digit).as_str())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify_paired_end("sample_R1_001.fastq.gz"), Some(PairedEnd::One));
        assert_eq!(classify_paired_end("sample.r2.fastq.gz"), Some(PairedEnd::Two));
        assert_eq!(classify_paired_end("R1-sample.fq.gz"), Some(PairedEnd::One));
        assert_eq!(classify_paired_end("sample_abc.fastq.gz"), None);
        assert_eq!(classify_paired_end("sample_R1_R2.fastq.gz"), None);
        assert_eq!(classify_paired_end("sample_R12_001.fastq.gz"), None);
        assert_eq!(classify_paired_end("sampleR1.fastq.gz"), None);
    }

    #[test]
    fn test_expected_mate() {
        assert_eq!(expected_mate("sample_R1_001.fastq.gz", PairedEnd::One), "sample_R2_001.fastq.gz");
        assert_eq!(expected_mate("sample_r2.fastq.gz", PairedEnd::Two), "sample_r1.fastq.gz");

        let name = "lane1-R1-run.fastq.gz";
        let mate = expected_mate(name, PairedEnd::One);
        assert_eq!(classify_paired_end(&mate), Some(PairedEnd::Two));
        assert_eq!(expected_mate(&mate, PairedEnd::Two), name);
    }
}
