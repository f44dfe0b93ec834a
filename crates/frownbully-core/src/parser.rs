//! Extracts `label: NN.N%` scores from a textual inference report.

use crate::types::PredictionSet;
use regex::Regex;
use std::sync::OnceLock;

static SCORE_LINE: OnceLock<Regex> = OnceLock::new();

fn score_line() -> &'static Regex {
    SCORE_LINE.get_or_init(|| {
        Regex::new(r"([\w\s]+):\s*([\d.]+)%").expect("score line pattern is valid")
    })
}

/// Parse a report into a [`PredictionSet`].
///
/// Lines without a `label: number%` match, or with an unparseable number,
/// are skipped. Percentages are divided by 100. A label seen twice keeps
/// its last value. Empty or absent input yields an empty set.
pub fn parse<'a>(text: impl Into<Option<&'a str>>) -> PredictionSet {
    let Some(text) = text.into().filter(|t| !t.trim().is_empty()) else {
        tracing::warn!("no inference results received");
        return PredictionSet::new();
    };

    let mut set = PredictionSet::new();
    for line in text.lines() {
        let Some(caps) = score_line().captures(line) else {
            continue;
        };
        let label = caps[1].trim();
        if label.is_empty() {
            continue;
        }
        let Ok(percent) = caps[2].parse::<f64>() else {
            tracing::debug!(line, "skipping line with malformed percentage");
            continue;
        };
        set.insert(label, percent / 100.0);
    }

    tracing::info!(results = ?set, "parsed inference results");
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn test_parse_two_labels() {
        let set = parse("Frown Line: 72.5%\nChin: 10%\n");
        assert_eq!(set.len(), 2);
        assert!(close(set.get("Frown Line"), 0.725));
        assert!(close(set.get("Chin"), 0.10));
    }

    #[test]
    fn test_parse_empty_and_none() {
        assert!(parse("").is_empty());
        assert!(parse(None).is_empty());
        assert!(parse("   \n\n").is_empty());
    }

    #[test]
    fn test_parse_full_report() {
        let report = "\n### Detected Wrinkle Types ###\n\
                      Frown Line: 72.50% confidence\n\
                      Forehead: 31.07% confidence\n";
        let set = parse(report);
        assert_eq!(set.len(), 2);
        assert!(close(set.get("Frown Line"), 0.725));
        assert!(close(set.get("Forehead"), 0.3107));
    }

    #[test]
    fn test_parse_no_detections_message() {
        assert!(parse("\nNo wrinkles detected above the threshold.\n").is_empty());
    }

    #[test]
    fn test_unmatched_lines_are_skipped() {
        let set = parse("garbage\nChin 40%\nChin: forty%\nMasseter: 5%\n");
        assert_eq!(set.len(), 1);
        assert!(close(set.get("Masseter"), 0.05));
    }

    #[test]
    fn test_malformed_number_is_skipped() {
        let set = parse("Chin: 1.2.3%\nForehead: 20%");
        assert_eq!(set.get("Chin"), None);
        assert!(close(set.get("Forehead"), 0.2));
    }

    #[test]
    fn test_last_occurrence_wins() {
        let set = parse("Chin: 10%\nChin: 65%\n");
        assert_eq!(set.len(), 1);
        assert!(close(set.get("Chin"), 0.65));
    }

    #[test]
    fn test_percent_range_maps_to_unit_interval() {
        for tenths in 0..=1000 {
            let p = tenths as f64 / 10.0;
            let set = parse(format!("Chin: {p}%").as_str());
            assert!(close(set.get("Chin"), p / 100.0), "p = {p}");
        }
    }

    #[test]
    fn test_over_one_hundred_is_clamped() {
        assert_eq!(parse("Chin: 150%").get("Chin"), Some(1.0));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let text = "Frown Line: 72.5%\nChin: 10%\nnoise\nChin: 11%";
        assert_eq!(parse(text), parse(text));
    }
}
