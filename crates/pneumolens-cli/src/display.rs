//! Terminal rendering for one-shot `predict` and `ask` runs.

use std::path::Path;

use pneumolens_core::{Answer, Label, Prediction};

const BAR_WIDTH: usize = 30;

/// Vertical card for a single classification.
pub fn prediction_card(image: &Path, prediction: &Prediction, backend: &str) -> String {
    let filled = ((prediction.confidence.clamp(0.0, 1.0) * BAR_WIDTH as f32).round()) as usize;
    let bar = format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled));
    let verdict = match prediction.label {
        Label::Pneumonia => "PNEUMONIA",
        Label::Normal => "NORMAL",
    };

    let mut out = String::new();
    out.push_str(&format!("  {:<12} {}\n", "image", image.display()));
    out.push_str(&format!("  {:<12} {}\n", "backend", backend));
    out.push_str(&format!("  {:<12} {}\n", "prediction", verdict));
    out.push_str(&format!(
        "  {:<12} {:.4}  [{bar}]\n",
        "confidence", prediction.confidence
    ));
    out
}

/// Answer text with a trailing newline, indented like the cards.
pub fn answer_text(answer: &Answer) -> String {
    let mut out = String::new();
    for line in answer.answer.lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_shows_verdict_and_bar() {
        let p = Prediction::from_confidence(0.9);
        let card = prediction_card(Path::new("chest.png"), &p, "native");
        assert!(card.contains("PNEUMONIA"));
        assert!(card.contains("0.9000"));
        assert!(card.contains(&"#".repeat(27)));
        assert!(card.contains("native"));
    }

    #[test]
    fn half_confidence_is_normal() {
        let p = Prediction::from_confidence(0.5);
        let card = prediction_card(Path::new("x.png"), &p, "native");
        assert!(card.contains("NORMAL"));
        assert!(card.contains(&format!("[{}{}]", "#".repeat(15), ".".repeat(15))));
    }

    #[test]
    fn answer_lines_indented() {
        let a = Answer::new("Q: q\nContext: c");
        assert_eq!(answer_text(&a), "  Q: q\n  Context: c\n");
    }
}
