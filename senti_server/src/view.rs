use minijinja::{context, Environment};
use senti::{Analysis, SentimentResult};
use serde::Serialize;

const FORM_TEMPLATE: &str = "form.html";

#[derive(Serialize)]
struct ScoresView {
    negative: f64,
    neutral: f64,
    positive: f64,
    compound: f64,
    custom: f64,
}

impl From<&SentimentResult> for ScoresView {
    fn from(result: &SentimentResult) -> Self {
        Self {
            negative: result.negative(),
            neutral: result.neutral(),
            positive: result.positive(),
            compound: result.compound(),
            custom: result.custom(),
        }
    }
}

/// Renders analyses into the form page.
pub struct View {
    env: Environment<'static>,
}

impl View {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(FORM_TEMPLATE, include_str!("../templates/form.html"))?;
        Ok(Self { env })
    }

    pub fn render(&self, analysis: &Analysis) -> Result<String, minijinja::Error> {
        let sentiment = analysis.result.as_ref().map(ScoresView::from);
        self.env.get_template(FORM_TEMPLATE)?.render(context! {
            sentiment => sentiment,
            sentiment_text => analysis.label.as_str(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use senti::{Analyzer, LexiconScorer, PartialResult, Scorer};

    struct HalfScorer;

    impl Scorer for HalfScorer {
        fn score(&self, _text: &str) -> PartialResult {
            PartialResult {
                custom: Some(0.5),
                ..Default::default()
            }
        }
    }

    #[test]
    fn test_render_empty() {
        let html = View::new().unwrap().render(&Analysis::default()).unwrap();
        assert!(html.contains("name=\"user_text\""));
        assert!(html.contains("<h2 id=\"label\">Neutral:</h2>"));
        assert!(!html.contains("id=\"scores\""));
    }

    #[test]
    fn test_render_result() {
        let analyzer = Analyzer::new(LexiconScorer::default(), HalfScorer);
        let analysis = analyzer.analyze(Some("I hate this")).unwrap();
        let html = View::new().unwrap().render(&analysis).unwrap();
        assert!(html.contains("<h2 id=\"label\">Negative:</h2>"));
        assert!(html.contains("id=\"scores\""));
        assert!(html.contains("<td>Compound</td><td>-0.5719</td>"));
        assert!(html.contains("<td>Custom</td><td>0.5</td>"));
    }
}
